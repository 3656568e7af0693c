//! Evoked comparison plots (standalone plotly HTML).
use std::path::Path;

use anyhow::{Context, Result};
use plotly::common::Mode;
use plotly::layout::Axis;
use plotly::{Layout, Plot, Scatter};

use crate::config::PlotConfig;
use crate::evoked::Evoked;

/// One line per evoked: the mean over `cfg.picks`, in µV, against time.
///
/// Trace names carry the condition label and the number of averaged
/// epochs.  The file is overwritten if it exists.
pub fn plot_evokeds(evokeds: &[&Evoked], cfg: &PlotConfig, title: &str, path: &Path) -> Result<()> {
    let mut plot = Plot::new();
    for ev in evokeds {
        let trace = ev.pick_mean(&cfg.picks)?;
        let x: Vec<f64> = ev.times().iter().map(|&t| t as f64).collect();
        let y: Vec<f64> = trace.iter().map(|&v| v as f64 * 1e6).collect();
        plot.add_trace(
            Scatter::new(x, y)
                .mode(Mode::Lines)
                .name(&format!("{} (N={})", ev.comment, ev.nave)),
        );
    }

    let mut y_axis = Axis::new().title("Amplitude (µV)");
    if let Some((lo, hi)) = cfg.ylim_uv {
        y_axis = y_axis.range(vec![lo, hi]);
    }
    let layout = Layout::new()
        .title(format!("<b>{title}</b> ({})", cfg.picks.join(" + ")))
        .x_axis(Axis::new().title("Time (s)"))
        .y_axis(y_axis);
    plot.set_layout(layout);

    std::fs::write(path, plot.to_html()).with_context(|| format!("writing plot {}", path.display()))?;
    log::debug!("wrote {}", path.display());
    Ok(())
}
