//! Nine-node brick element with curvature DOFs for flexible multibody
//! dynamics.
//!
//! The element exposes its mass matrix, internal forces, tangent Jacobians
//! and gravity load through [`element::ElementGeneric`], and accepts
//! distributed volume loads through [`element::LoadableUvw`].

pub mod config;
pub mod element;
pub mod error;
pub mod material;
pub mod prelude;

pub use error::{Error, Result};
