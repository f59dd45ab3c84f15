//! Edge-effect decay of impedance with distance from a stressor
//!
//! Two shapes are supported:
//!
//! - exponential: `impedance_max * exp(-d / lambda_decay)`
//! - proportional: `max(impedance_max - k_value * d, 0)`
//!
//! A result of zero or less means the stressor has no effect at that cell.

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;

use crate::layer::ImpedanceLayer;
use crate::maybe_rayon::*;
use habiscape_core::{Error, Result};

/// Decline type as spelled in impedance configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineType {
    Exponential,
    Proportional,
}

impl DeclineType {
    /// Configuration key holding this type's constant
    pub fn section(&self) -> &'static str {
        match self {
            DeclineType::Exponential => "exp_decline",
            DeclineType::Proportional => "prop_decline",
        }
    }
}

impl FromStr for DeclineType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exp_decline" | "exponential" => Ok(DeclineType::Exponential),
            "prop_decline" | "proportional" => Ok(DeclineType::Proportional),
            other => Err(Error::Config(format!(
                "unknown decline type '{}', expected exp_decline or prop_decline",
                other
            ))),
        }
    }
}

impl fmt::Display for DeclineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section())
    }
}

/// A decay shape with its constant.
///
/// Use [`DecayProfile::exponential`] or [`DecayProfile::proportional`] to
/// build one; both reject non-positive constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecayProfile {
    /// Exponential decline; `lambda_decay` is the e-folding distance in map units
    Exponential { lambda_decay: f64 },
    /// Linear decline; `k_value` is impedance lost per map unit
    Proportional { k_value: f64 },
}

impl DecayProfile {
    pub fn exponential(lambda_decay: f64) -> Result<Self> {
        check_positive("lambda_decay", lambda_decay)?;
        Ok(DecayProfile::Exponential { lambda_decay })
    }

    pub fn proportional(k_value: f64) -> Result<Self> {
        check_positive("k_value", k_value)?;
        Ok(DecayProfile::Proportional { k_value })
    }

    /// Impedance at distance `proximity` from the stressor
    #[inline]
    pub fn apply(&self, proximity: f64, impedance_max: f64) -> f64 {
        match *self {
            DecayProfile::Exponential { lambda_decay } => {
                impedance_max * (-proximity / lambda_decay).exp()
            }
            DecayProfile::Proportional { k_value } => {
                (impedance_max - k_value * proximity).max(0.0)
            }
        }
    }
}

impl fmt::Display for DecayProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecayProfile::Exponential { lambda_decay } => {
                write!(f, "exp_decline(lambda_decay={})", lambda_decay)
            }
            DecayProfile::Proportional { k_value } => write!(f, "prop_decline(k_value={})", k_value),
        }
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason: "must be a finite value greater than zero".into(),
        })
    }
}

/// Apply `profile` to every cell of a distance layer.
///
/// Cells without a distance stay empty, as do cells where the decayed value
/// is zero, negative or not finite.
pub fn apply_decay(
    distances: &ImpedanceLayer,
    impedance_max: f64,
    profile: &DecayProfile,
) -> ImpedanceLayer {
    let (rows, cols) = distances.shape();

    let data: Vec<Option<f64>> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![None; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let Some(d) = distances.get(row, col) else {
                    continue;
                };
                let v = profile.apply(d, impedance_max);
                if v.is_finite() && v > 0.0 {
                    *out = Some(v);
                }
            }
            row_data
        })
        .collect();

    let values = Array2::from_shape_vec((rows, cols), data)
        .unwrap_or_else(|_| Array2::from_elem((rows, cols), None));
    ImpedanceLayer::new(values, *distances.transform(), distances.crs().cloned())
}
