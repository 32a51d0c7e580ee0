//! Continuum material shared between elements.
//!
//! The element only needs the density and an isotropic linear elastic law
//! (St. Venant-Kirchhoff when applied to Green-Lagrange strain).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::prelude::*;

/// Isotropic elastic continuum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuumElastic {
    /// Young's modulus
    pub young: f64,
    /// Poisson's ratio, -1 < ν < 0.5
    pub poisson: f64,
    /// Mass density
    pub density: f64,
}

impl ContinuumElastic {
    /// Create a new material.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMaterial` if the properties are not physically admissible.
    pub fn new(young: f64, poisson: f64, density: f64) -> Result<Self> {
        let material = Self {
            young,
            poisson,
            density,
        };
        material.validate()?;
        Ok(material)
    }

    /// Check the properties; used for materials read from configuration.
    pub fn validate(&self) -> Result<()> {
        if !(self.young > 0.0) || !self.young.is_finite() {
            return Err(Error::InvalidMaterial(format!(
                "Young's modulus must be positive, got {}",
                self.young
            )));
        }
        if !(self.poisson > -1.0 && self.poisson < 0.5) {
            return Err(Error::InvalidMaterial(format!(
                "Poisson's ratio must be in range (-1, 0.5), got {}",
                self.poisson
            )));
        }
        if !(self.density > 0.0) || !self.density.is_finite() {
            return Err(Error::InvalidMaterial(format!(
                "density must be positive, got {}",
                self.density
            )));
        }
        Ok(())
    }

    /// Shear modulus G = E / (2(1 + ν)).
    pub fn shear_modulus(&self) -> f64 {
        self.young / (2.0 * (1.0 + self.poisson))
    }

    /// Lamé's first parameter λ = Eν / ((1+ν)(1-2ν)).
    pub fn lame_lambda(&self) -> f64 {
        let (e, nu) = (self.young, self.poisson);
        e * nu / ((1.0 + nu) * (1.0 - 2.0 * nu))
    }

    /// Lamé's second parameter μ = G.
    pub fn lame_mu(&self) -> f64 {
        self.shear_modulus()
    }

    /// 3D constitutive matrix in Voigt notation.
    ///
    /// Strain ordering is [ε11, ε22, ε33, γ12, γ23, γ13] with engineering shear.
    pub fn constitutive_3d(&self) -> Matrix6 {
        let lambda = self.lame_lambda();
        let mu = self.lame_mu();
        let c11 = lambda + 2.0 * mu;
        let c12 = lambda;

        #[rustfmt::skip]
        let d = Matrix6::new(
            c11, c12, c12, 0.0, 0.0, 0.0,
            c12, c11, c12, 0.0, 0.0, 0.0,
            c12, c12, c11, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, mu,  0.0, 0.0,
            0.0, 0.0, 0.0, 0.0, mu,  0.0,
            0.0, 0.0, 0.0, 0.0, 0.0, mu,
        );
        d
    }
}
