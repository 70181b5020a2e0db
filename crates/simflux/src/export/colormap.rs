//! Colormaps and value normalisation for mesh colouring.
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Error;

const VIRIDIS: [[f64; 3]; 9] = [
    [68.0, 1.0, 84.0],
    [71.0, 44.0, 122.0],
    [59.0, 81.0, 139.0],
    [44.0, 113.0, 142.0],
    [33.0, 144.0, 141.0],
    [39.0, 173.0, 129.0],
    [92.0, 200.0, 99.0],
    [170.0, 220.0, 50.0],
    [253.0, 231.0, 37.0],
];

/// Maps values in `[0, 1]` to colours.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Colormap {
    Grayscale,
    Hot,
    #[default]
    Viridis,
}

impl Colormap {
    /// Colour at `t` with channels in `[0, 1]`. `t` is clamped; NaN maps to 0.
    pub fn rgb(&self, t: f64) -> [f64; 3] {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        match self {
            Colormap::Grayscale => [t; 3],
            Colormap::Hot => [
                (3.0 * t).clamp(0.0, 1.0),
                (3.0 * t - 1.0).clamp(0.0, 1.0),
                (3.0 * t - 2.0).clamp(0.0, 1.0),
            ],
            Colormap::Viridis => {
                let x = t * (VIRIDIS.len() - 1) as f64;
                let i = (x.floor() as usize).min(VIRIDIS.len() - 2);
                let f = x - i as f64;
                let (a, b) = (VIRIDIS[i], VIRIDIS[i + 1]);
                [0, 1, 2].map(|c| (a[c] + (b[c] - a[c]) * f) / 255.0)
            }
        }
    }

    /// Colour at `t` as 8-bit channels.
    pub fn rgb8(&self, t: f64) -> [u8; 3] {
        self.rgb(t).map(|c| (c * 255.0).round() as u8)
    }
}

impl FromStr for Colormap {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gray" | "grey" | "grayscale" | "greyscale" => Ok(Colormap::Grayscale),
            "hot" => Ok(Colormap::Hot),
            "viridis" => Ok(Colormap::Viridis),
            other => Err(Error::InvalidConfig(format!("unknown colormap '{other}'"))),
        }
    }
}

/// Rescales `values` into `[0, 1]`.
///
/// With `log` set, values are mapped through `log10` first and non-positive values become
/// NaN. Missing bounds default to the finite extrema of the (transformed) values; explicit
/// bounds are given untransformed.
pub fn normalize(values: &[f64], min: Option<f64>, max: Option<f64>, log: bool) -> Vec<f64> {
    let transform = |v: f64| {
        if !log {
            v
        } else if v > 0.0 {
            v.log10()
        } else {
            f64::NAN
        }
    };
    let scaled: Vec<f64> = values.iter().map(|&v| transform(v)).collect();
    let (data_lo, data_hi) = scaled
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let lo = min.map(transform).unwrap_or(data_lo);
    let hi = max.map(transform).unwrap_or(data_hi);
    let span = hi - lo;

    scaled
        .into_iter()
        .map(|v| {
            if !v.is_finite() {
                0.0
            } else if !(span.is_finite() && span > 0.0) {
                0.5
            } else {
                ((v - lo) / span).clamp(0.0, 1.0)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colormap_endpoints() {
        assert_eq!(Colormap::Grayscale.rgb8(1.0), [255, 255, 255]);
        assert_eq!(Colormap::Hot.rgb8(0.0), [0, 0, 0]);
        assert_eq!(Colormap::Hot.rgb8(1.0), [255, 255, 255]);
        assert_eq!(Colormap::Viridis.rgb8(0.0), [68, 1, 84]);
        assert_eq!(Colormap::Viridis.rgb8(1.0), [253, 231, 37]);
        assert_eq!(Colormap::Viridis.rgb8(f64::NAN), [68, 1, 84]);
    }

    #[test]
    fn parses_names() {
        assert_eq!("Hot".parse::<Colormap>().unwrap(), Colormap::Hot);
        assert!("jet".parse::<Colormap>().is_err());
    }

    #[test]
    fn normalize_linear_and_log() {
        assert_eq!(normalize(&[1.0, 2.0, 3.0], None, None, false), vec![0.0, 0.5, 1.0]);
        let log = normalize(&[1.0, 10.0, 100.0, -1.0], None, None, true);
        assert_eq!(log, vec![0.0, 0.5, 1.0, 0.0]);
        let clamped = normalize(&[0.0, 5.0, 10.0], Some(2.0), Some(4.0), false);
        assert_eq!(clamped, vec![0.0, 1.0, 1.0]);
        assert_eq!(normalize(&[3.0, 3.0], None, None, false), vec![0.5, 0.5]);
    }
}
