use std::ops::{AddAssign, Mul};

use itertools::iproduct;
use nalgebra::DVector;

use crate::error::Result;
use crate::prelude::izip;

pub struct Quadrature {
    pub points: DVector<f64>,
    pub weights: DVector<f64>,
}

impl Quadrature {
    pub fn gauss(order: usize) -> Self {
        let gl_rule = gauss_quad::GaussLegendre::init(order);
        Quadrature {
            points: DVector::from_iterator(order, gl_rule.nodes.into_iter().rev()),
            weights: DVector::from_iterator(order, gl_rule.weights.into_iter().rev()),
        }
    }

    /// Integrate over the parametric cube [-1, 1]^3 with the tensor-product rule.
    ///
    /// The integrand is evaluated at every (x, y, z) point and accumulated into
    /// `init` scaled by the product of the three 1-D weights. Evaluation stops at
    /// the first error.
    pub fn integrate_cube<T, F>(&self, init: T, mut integrand: F) -> Result<T>
    where
        T: AddAssign + Mul<f64, Output = T>,
        F: FnMut(f64, f64, f64) -> Result<T>,
    {
        let rule = || izip!(self.points.as_slice(), self.weights.as_slice());
        let mut acc = init;
        for ((&x, &wx), (&y, &wy), (&z, &wz)) in iproduct!(rule(), rule(), rule()) {
            acc += integrand(x, y, z)? * (wx * wy * wz);
        }
        Ok(acc)
    }
}
