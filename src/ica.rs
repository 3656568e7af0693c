//! ICA artifact removal.
//!
//! FastICA (linfa-ica, logcosh contrast) is fitted on `[T, C]` data.  The
//! mixing matrix is recovered by least squares from the training sources,
//!
//! ```text
//!   A = Xcᵀ · S · (Sᵀ · S)⁻¹          [C, K]
//! ```
//!
//! and cleaning subtracts only the excluded components,
//!
//! ```text
//!   X' = X − A[:, ex] · S[:, ex]ᵀ
//! ```
//!
//! so an empty exclusion set leaves the signal untouched, whatever the
//! number of fitted components.
use anyhow::{anyhow, bail, Result};
use linfa::prelude::*;
use linfa_ica::fast_ica::FastIca;
use ndarray::{concatenate, Array2, Axis};

use crate::config::{IcaConfig, IcaFitOn};
use crate::epoch::{data_driven_threshold, epoch, max_ptp};
use crate::recording::Recording;

/// A fitted decomposition plus the components selected for removal.
pub struct Ica {
    model: FastIca<f64>,
    /// `[C, K]`.
    pub mixing: Array2<f64>,
    pub n_components: usize,
    /// Excess kurtosis of each component over the training data.
    pub kurtosis: Vec<f64>,
    /// Sorted component indices removed by [`Ica::apply`].
    pub exclude: Vec<usize>,
}

impl Ica {
    /// Fit on `rec` as configured by `cfg.fit_on`.
    pub fn fit(rec: &Recording, cfg: &IcaConfig) -> Result<Self> {
        let x = match cfg.fit_on {
            IcaFitOn::Continuous => rec.data.t().mapv(|v| v as f64),
            IcaFitOn::FixedEpochs { duration, mad_k } => fixed_epoch_training_set(rec, duration, mad_k)?,
        };
        Self::fit_matrix(x, cfg)
    }

    /// Fit on a `[T, C]` training matrix.
    pub fn fit_matrix(x: Array2<f64>, cfg: &IcaConfig) -> Result<Self> {
        let (n_t, n_ch) = x.dim();
        if n_ch == 0 || n_t <= n_ch {
            bail!("ICA needs more samples than channels, got {n_t} x {n_ch}");
        }
        let max_k = if is_average_referenced(&x) { n_ch - 1 } else { n_ch };
        let k = cfg.n_components.min(max_k);
        if k < cfg.n_components {
            log::warn!("ICA: {} components requested, data rank allows {k}", cfg.n_components);
        }
        if k == 0 {
            bail!("ICA: no components to fit");
        }

        let dataset = DatasetBase::from(x.clone());
        let model = FastIca::params()
            .ncomponents(k)
            .max_iter(cfg.max_iter)
            .tol(cfg.tol)
            .random_state(cfg.random_state)
            .fit(&dataset)
            .map_err(|e| anyhow!("FastICA failed: {e}"))?;

        let sources = model.predict(&x);
        let mixing = mixing_matrix(&x, &sources)?;
        let kurtosis: Vec<f64> = sources.columns().into_iter().map(|c| kurtosis(&c.to_vec())).collect();

        let mut exclude: Vec<usize> = cfg.exclude.iter().copied().filter(|&c| c < k).collect();
        if exclude.len() < cfg.exclude.len() {
            log::warn!("ICA: ignoring exclusions beyond component {}", k - 1);
        }
        if let Some(thr) = cfg.kurtosis_threshold {
            exclude.extend(kurtosis.iter().enumerate().filter(|(_, v)| v.abs() > thr).map(|(i, _)| i));
        }
        exclude.sort_unstable();
        exclude.dedup();

        log::info!("ICA: {k} components on {n_t} samples, excluding {exclude:?}");
        Ok(Self { model, mixing, n_components: k, kurtosis, exclude })
    }

    /// Source time courses of `data` (`[C, T]`), shape `[T, K]`.
    pub fn sources(&self, data: &Array2<f32>) -> Array2<f64> {
        self.model.predict(&data.t().mapv(|v| v as f64))
    }

    /// Remove the excluded components from `rec` in place.
    pub fn apply(&self, rec: &mut Recording) -> Result<()> {
        if self.exclude.is_empty() {
            return Ok(());
        }
        if rec.n_channels() != self.mixing.nrows() {
            bail!("ICA was fitted on {} channels, recording has {}", self.mixing.nrows(), rec.n_channels());
        }
        let s = self.sources(&rec.data).select(Axis(1), &self.exclude);
        let a = self.mixing.select(Axis(1), &self.exclude);
        let artifact = a.dot(&s.t());
        rec.data.zip_mut_with(&artifact, |x, &art| *x -= art as f32);
        Ok(())
    }
}

/// Concatenated non-overlapping windows of `duration` seconds, minus those
/// above the robust peak-to-peak threshold.  Returns `[T', C]`.
fn fixed_epoch_training_set(rec: &Recording, duration: f32, mad_k: f32) -> Result<Array2<f64>> {
    let n = (duration * rec.sfreq).round() as usize;
    let epochs = epoch(&rec.data, n);
    let Some(thr) = data_driven_threshold(&epochs, mad_k) else {
        bail!("recording shorter than one {duration} s ICA window");
    };
    let kept: Vec<_> = epochs
        .axis_iter(Axis(0))
        .filter(|e| max_ptp(*e).0 <= thr)
        .map(|e| e.t().mapv(|v| v as f64))
        .collect();
    log::debug!(
        "ICA training set: {}/{} windows under {:.1} µV",
        kept.len(),
        epochs.dim().0,
        thr * 1e6
    );
    let views: Vec<_> = kept.iter().map(|e| e.view()).collect();
    Ok(concatenate(Axis(0), &views)?)
}

/// Channel mean is zero at every sample, i.e. one dimension is lost.
fn is_average_referenced(x: &Array2<f64>) -> bool {
    let scale = x.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let Some(mean) = x.mean_axis(Axis(1)) else {
        return false;
    };
    scale > 0.0 && mean.iter().all(|m| m.abs() <= 1e-5 * scale)
}

/// `A = Xcᵀ · S · (Sᵀ · S)⁻¹`.
fn mixing_matrix(x: &Array2<f64>, sources: &Array2<f64>) -> Result<Array2<f64>> {
    let Some(mean) = x.mean_axis(Axis(0)) else {
        bail!("empty training matrix");
    };
    let xc = x - &mean;
    let sts_inv = invert(&sources.t().dot(sources))?;
    Ok(xc.t().dot(sources).dot(&sts_inv))
}

/// Gauss-Jordan inverse with partial pivoting.
fn invert(m: &Array2<f64>) -> Result<Array2<f64>> {
    let n = m.nrows();
    if n != m.ncols() {
        bail!("matrix must be square");
    }
    let mut aug = concatenate(Axis(1), &[m.view(), Array2::<f64>::eye(n).view()])?;
    for i in 0..n {
        let pivot_row = (i..n)
            .max_by(|&a, &b| aug[[a, i]].abs().total_cmp(&aug[[b, i]].abs()))
            .unwrap_or(i);
        if pivot_row != i {
            for j in 0..2 * n {
                aug.swap([i, j], [pivot_row, j]);
            }
        }
        let pivot = aug[[i, i]];
        if pivot.abs() < 1e-12 {
            bail!("matrix is singular");
        }
        aug.row_mut(i).mapv_inplace(|v| v / pivot);
        let row_i = aug.row(i).to_owned();
        for k in (0..n).filter(|&k| k != i) {
            let f = aug[[k, i]];
            aug.row_mut(k).scaled_add(-f, &row_i);
        }
    }
    Ok(aug.slice(ndarray::s![.., n..]).to_owned())
}

/// Excess kurtosis `m4 / m2² − 3`; zero for short or flat signals.
pub fn kurtosis(x: &[f64]) -> f64 {
    if x.len() < 4 {
        return 0.0;
    }
    let n = x.len() as f64;
    let mean = x.iter().sum::<f64>() / n;
    let m2 = x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let m4 = x.iter().map(|v| (v - mean).powi(4)).sum::<f64>() / n;
    if m2 < 1e-30 {
        return 0.0;
    }
    m4 / (m2 * m2) - 3.0
}
