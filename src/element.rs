//! Element interfaces consumed by a global assembler.
//!
//! An assembler holds elements as `Box<dyn ElementGeneric>` and never needs to
//! know the concrete element type. The required call order is:
//!
//! 1. configure the element (nodes, dimensions, material, ...)
//! 2. `setup_initial` once
//! 3. `update` whenever the node state changed
//! 4. any number of queries (forces, matrices, loads)
//!
//! Queries read the kinematics cached by the last `update`.

use crate::config::SystemConfig;
use crate::error::Result;
use crate::prelude::*;

pub mod brick9;
pub mod interp;
pub mod node;
pub mod quadrature;

use node::{NodeHandle, Variables};

/// Generic finite element as seen by the assembler and time integrator.
pub trait ElementGeneric: Send + Sync {
    /// Number of nodes of this element.
    fn n_nodes(&self) -> usize;

    /// Number of degrees of freedom of this element.
    fn n_dofs(&self) -> usize;

    /// Number of coordinates of the n-th node used by this element, zero if
    /// the element has no such node.
    fn node_ndofs(&self, n: usize) -> usize;

    /// Access the n-th node of this element.
    fn node_n(&self, n: usize) -> Option<NodeHandle>;

    /// Capture the reference configuration and the constant element matrices.
    fn setup_initial(&mut self, system: &SystemConfig) -> Result<()>;

    /// Refresh the cached kinematics from the current node state.
    fn update(&mut self) -> Result<()>;

    /// Fill `md` with the current position DOFs of the element nodes.
    fn state_block(&self, md: &mut VectorD) -> Result<()>;

    /// Set `m` to the element mass matrix.
    fn compute_mmatrix_global(&self, m: &mut MatrixD) -> Result<()>;

    /// Set `h` to Kfactor * K + Rfactor * R + Mfactor * M.
    fn compute_krm_matrices_global(
        &mut self,
        h: &mut MatrixD,
        kfactor: f64,
        rfactor: f64,
        mfactor: f64,
    ) -> Result<()>;

    /// Set `fi` to the generalized internal forces acting on the nodes.
    fn compute_internal_forces(&self, fi: &mut VectorD) -> Result<()>;
}

/// Volume element that distributed loads can be applied to.
pub trait LoadableUvw {
    /// Number of coordinates in the interpolated field.
    fn field_ncoords(&self) -> usize;

    /// Number of DOF blocks, one per node.
    fn sub_blocks(&self) -> usize;

    /// Offset of the n-th block of DOFs in the global vector.
    fn sub_block_offset(&self, nblock: usize) -> Result<usize>;

    /// Size of the n-th block of DOFs in the global vector.
    fn sub_block_size(&self, nblock: usize) -> Result<usize>;

    fn loadable_ndof_x(&self) -> usize;

    fn loadable_ndof_w(&self) -> usize;

    /// Write the position DOFs into `md` starting at `block_offset`.
    fn loadable_state_block_x(&self, block_offset: usize, md: &mut VectorD) -> Result<()>;

    /// Write the velocity DOFs into `md` starting at `block_offset`.
    fn loadable_state_block_w(&self, block_offset: usize, md: &mut VectorD) -> Result<()>;

    /// Append the variables of every node.
    fn loadable_variables(&self, vars: &mut Vec<Variables>);

    /// Evaluate N'*F at parametric coordinates (u, v, w), each in -1..+1.
    ///
    /// `f` has `field_ncoords` entries. The generalized load is written to `qi`
    /// and det[J0] is returned for use as a quadrature weight. When a state is
    /// supplied the load is evaluated for that state without touching the
    /// element's own.
    #[allow(clippy::too_many_arguments)]
    fn compute_nf(
        &self,
        u: f64,
        v: f64,
        w: f64,
        qi: &mut VectorD,
        f: &VectorD,
        state_x: Option<&VectorD>,
        state_w: Option<&VectorD>,
    ) -> Result<f64>;

    /// Material density, used by volume gravity loaders.
    fn density(&self) -> Result<f64>;
}
