//! Standard 10-20 / 10-10 electrode layout.
//!
//! Positions are stored as spherical angles on an idealised head
//! (`polar` from the vertex, `azimuth` clockwise from the nose, degrees) and
//! projected onto the plane with the azimuthal-equidistant mapping used by
//! topographic plots:
//!
//! ```text
//!   r = polar / 180
//!   x = r · sin(azimuth)      (right positive)
//!   y = r · cos(azimuth)      (nose positive)
//! ```
//!
//! so Cz sits at the origin and the 90° ring (Fpz, T7, Oz, T8) at r = 0.5.
use anyhow::Result;
use ndarray::Array2;

use crate::config::OnMissing;
use crate::recording::Recording;

/// `(name, polar°, azimuth°)`.  Old temporal names (T3, T4, T5, T6) are
/// listed next to their modern equivalents.
const STANDARD_1020: &[(&str, f32, f32)] = &[
    ("Cz", 0.0, 0.0),
    ("Fpz", 90.0, 0.0),
    ("Fp1", 90.0, -18.0),
    ("Fp2", 90.0, 18.0),
    ("AFz", 67.5, 0.0),
    ("AF3", 74.0, -23.0),
    ("AF4", 74.0, 23.0),
    ("AF7", 90.0, -36.0),
    ("AF8", 90.0, 36.0),
    ("Fz", 45.0, 0.0),
    ("F1", 50.0, -20.0),
    ("F2", 50.0, 20.0),
    ("F3", 60.0, -39.8),
    ("F4", 60.0, 39.8),
    ("F5", 70.0, -49.0),
    ("F6", 70.0, 49.0),
    ("F7", 90.0, -54.0),
    ("F8", 90.0, 54.0),
    ("FCz", 22.5, 0.0),
    ("FC1", 33.0, -45.0),
    ("FC2", 33.0, 45.0),
    ("FC3", 52.0, -61.0),
    ("FC4", 52.0, 61.0),
    ("FC5", 72.0, -69.0),
    ("FC6", 72.0, 69.0),
    ("FT7", 90.0, -72.0),
    ("FT8", 90.0, 72.0),
    ("FT9", 112.5, -72.0),
    ("FT10", 112.5, 72.0),
    ("C1", 22.5, -90.0),
    ("C2", 22.5, 90.0),
    ("C3", 45.0, -90.0),
    ("C4", 45.0, 90.0),
    ("C5", 67.5, -90.0),
    ("C6", 67.5, 90.0),
    ("T7", 90.0, -90.0),
    ("T8", 90.0, 90.0),
    ("T3", 90.0, -90.0),
    ("T4", 90.0, 90.0),
    ("A1", 120.0, -90.0),
    ("A2", 120.0, 90.0),
    ("M1", 115.0, -100.0),
    ("M2", 115.0, 100.0),
    ("CPz", 22.5, 180.0),
    ("CP1", 33.0, -135.0),
    ("CP2", 33.0, 135.0),
    ("CP3", 52.0, -119.0),
    ("CP4", 52.0, 119.0),
    ("CP5", 72.0, -111.0),
    ("CP6", 72.0, 111.0),
    ("TP7", 90.0, -108.0),
    ("TP8", 90.0, 108.0),
    ("TP9", 112.5, -108.0),
    ("TP10", 112.5, 108.0),
    ("Pz", 45.0, 180.0),
    ("P1", 50.0, -160.0),
    ("P2", 50.0, 160.0),
    ("P3", 60.0, -140.2),
    ("P4", 60.0, 140.2),
    ("P5", 70.0, -131.0),
    ("P6", 70.0, 131.0),
    ("P7", 90.0, -126.0),
    ("P8", 90.0, 126.0),
    ("T5", 90.0, -126.0),
    ("T6", 90.0, 126.0),
    ("POz", 67.5, 180.0),
    ("PO3", 74.0, -157.0),
    ("PO4", 74.0, 157.0),
    ("PO7", 90.0, -144.0),
    ("PO8", 90.0, 144.0),
    ("Oz", 90.0, 180.0),
    ("O1", 90.0, -162.0),
    ("O2", 90.0, 162.0),
    ("Iz", 112.5, 180.0),
];

/// Projected 2-D position of a standard electrode; case-insensitive.
pub fn position(name: &str) -> Option<[f32; 2]> {
    let wanted = name.trim().to_lowercase();
    STANDARD_1020
        .iter()
        .find(|(n, _, _)| n.to_lowercase() == wanted)
        .map(|&(_, polar, az)| {
            let r = polar / 180.0;
            let az = az.to_radians();
            [r * az.sin(), r * az.cos()]
        })
}

/// Attach standard positions to every channel of `rec`.
///
/// Channels outside the layout get `NaN` coordinates and are reported
/// through `on_missing`.
pub fn set_montage(rec: &mut Recording, on_missing: OnMissing) -> Result<()> {
    let mut pos = Array2::<f32>::from_elem((rec.n_channels(), 2), f32::NAN);
    let mut missing = Vec::new();
    for (i, name) in rec.ch_names.iter().enumerate() {
        match position(name) {
            Some([x, y]) => {
                pos[[i, 0]] = x;
                pos[[i, 1]] = y;
            }
            None => missing.push(name.clone()),
        }
    }
    on_missing.handle("set_montage", &missing)?;
    rec.chan_pos = Some(pos);
    Ok(())
}
