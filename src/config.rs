//! Configuration read by the element and its owning system.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::material::ContinuumElastic;
use crate::prelude::*;

/// System-wide settings handed to `setup_initial`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Gravitational acceleration
    pub gravity: Vector3,
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            gravity: Vector3::new(0., -9.8, 0.),
        }
    }
}

impl SystemConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Per-element settings, everything except the node handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brick9Config {
    /// Element edge lengths along x, y, z
    pub dimensions: Vector3,
    /// Structural damping coefficient
    #[serde(default)]
    pub alpha_damp: f64,
    /// Include the gravity load in the internal forces
    #[serde(default)]
    pub gravity_on: bool,
    pub material: ContinuumElastic,
}

impl Brick9Config {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Brick9Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_dimensions(&self.dimensions)?;
        validate_alpha(self.alpha_damp)?;
        self.material.validate()
    }
}

pub(crate) fn validate_dimensions(dims: &Vector3) -> Result<()> {
    if dims.iter().all(|&l| l > 0. && l.is_finite()) {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "element dimensions must be positive, got ({}, {}, {})",
            dims.x, dims.y, dims.z
        )))
    }
}

pub(crate) fn validate_alpha(alpha: f64) -> Result<()> {
    if alpha >= 0. && alpha.is_finite() {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "structural damping must be non-negative, got {}",
            alpha
        )))
    }
}
