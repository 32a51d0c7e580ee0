#![allow(non_snake_case)]

//! Nine-node brick with curvature DOFs.
//!
//! Eight corner nodes carry positions; a central node carries the curvature
//! vectors r_xx, r_yy, r_zz. The element uses a total Lagrangian formulation
//! with Green-Lagrange strain, a St. Venant-Kirchhoff material and structural
//! damping proportional to the strain rate.
//!
//! DOF ordering: `e[3n + k]` is component `k` of shape function `n`, with
//! n = 0..8 for the corners and n = 8, 9, 10 for r_xx, r_yy, r_zz.

use std::sync::Arc;

use log::{debug, log_enabled, trace, warn, Level};

use crate::config::{validate_alpha, validate_dimensions, Brick9Config, SystemConfig};
use crate::error::{ensure_finite, Error, Result};
use crate::material::ContinuumElastic;
use crate::prelude::*;

use super::interp::{
    shape_functions, shape_functions_derivative_x, shape_functions_derivative_y,
    shape_functions_derivative_z, NUM_SHAPE_FUNCTIONS,
};
use super::node::{NodeCurv, NodeHandle, NodeXyz, SharedNode, Variables};
use super::quadrature::Quadrature;
use super::{ElementGeneric, LoadableUvw};

pub const NUM_CORNER_NODES: usize = 8;
pub const NUM_NODES: usize = NUM_CORNER_NODES + 1;
pub const NUM_DOFS: usize = 3 * NUM_SHAPE_FUNCTIONS;

/// Gauss points per direction for every element integral
pub const QUADRATURE_ORDER: usize = 3;

/// Voigt component -> tensor indices, [11, 22, 33, 12, 23, 13]
const VOIGT: [(usize, usize); 6] = [(0, 0), (1, 1), (2, 2), (0, 1), (1, 2), (0, 2)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupState {
    Uninitialized,
    Ready,
}

//------------------------------------------------------------------------------
// Reference Jacobian
//------------------------------------------------------------------------------

/// Jacobian of the reference map at one parametric point, together with the
/// shape function derivatives used to build it.
#[derive(Debug, Clone)]
pub struct ReferenceJacobian {
    pub det: f64,
    pub Nx: Matrix1x11,
    pub Ny: Matrix1x11,
    pub Nz: Matrix1x11,
    pub Nx_d0: RowVector3,
    pub Ny_d0: RowVector3,
    pub Nz_d0: RowVector3,
}

impl ReferenceJacobian {
    /// J0 = [Nx*d0; Ny*d0; Nz*d0]
    pub fn matrix(&self) -> Matrix3 {
        Matrix3::from_rows(&[self.Nx_d0, self.Ny_d0, self.Nz_d0])
    }

    /// Shape function gradients with respect to the reference coordinates.
    pub fn material_gradients(&self) -> Result<Matrix3x11> {
        let J0inv = self
            .matrix()
            .try_inverse()
            .ok_or(Error::NumericalFailure("reference Jacobian inverse"))?;
        Ok(J0inv * Matrix3x11::from_rows(&[self.Nx, self.Ny, self.Nz]))
    }
}

/// Kinematic and stress state at one quadrature point.
struct PointKinematics {
    det_j0: f64,
    /// Material shape function gradients (3 x 11)
    grad: Matrix3x11,
    /// Strain-displacement matrix (6 x 33)
    B: Matrix6x33,
    /// Second Piola-Kirchhoff stress including damping, Voigt order
    stress: Vector6,
}

//------------------------------------------------------------------------------
// Element
//------------------------------------------------------------------------------

#[derive(Debug)]
pub struct Brick9 {
    nodes: Vec<SharedNode<NodeXyz>>,
    central_node: Option<SharedNode<NodeCurv>>,
    material: Option<Arc<ContinuumElastic>>,
    dimensions: Vector3,
    gravity_on: bool,
    alpha: f64,
    state: SetupState,

    grav_force: Vector33,
    mass_matrix: Matrix33,
    jacobian_matrix: Matrix33,

    d0: Matrix11x3,
    d: Matrix11x3,
    d0d0T: Matrix11,
    ddT: Matrix11,
    d_dt: Vector33,
    E_eps: Matrix6,
}

impl Default for Brick9 {
    fn default() -> Self {
        Self::new()
    }
}

impl Brick9 {
    pub fn new() -> Self {
        Brick9 {
            nodes: Vec::with_capacity(NUM_CORNER_NODES),
            central_node: None,
            material: None,
            dimensions: Vector3::zeros(),
            gravity_on: false,
            alpha: 0.,
            state: SetupState::Uninitialized,
            grav_force: Vector33::zeros(),
            mass_matrix: Matrix33::zeros(),
            jacobian_matrix: Matrix33::zeros(),
            d0: Matrix11x3::zeros(),
            d: Matrix11x3::zeros(),
            d0d0T: Matrix11::zeros(),
            ddT: Matrix11::zeros(),
            d_dt: Vector33::zeros(),
            E_eps: Matrix6::zeros(),
        }
    }

    //--------------------------------------------------------------------------
    // Configuration
    //--------------------------------------------------------------------------

    /// Assign the eight corner nodes and the central curvature node.
    ///
    /// Nodes can only be assigned once.
    pub fn set_nodes(
        &mut self,
        corners: [SharedNode<NodeXyz>; NUM_CORNER_NODES],
        central: SharedNode<NodeCurv>,
    ) -> Result<()> {
        if !self.nodes.is_empty() || self.central_node.is_some() {
            return Err(Error::Configuration(
                "element nodes are already assigned".to_string(),
            ));
        }
        self.nodes = Vec::from(corners);
        self.central_node = Some(central);
        Ok(())
    }

    pub fn set_dimensions(&mut self, dimensions: Vector3) {
        self.warn_if_ready("dimensions");
        self.dimensions = dimensions;
    }

    pub fn set_material(&mut self, material: Arc<ContinuumElastic>) {
        self.warn_if_ready("material");
        self.material = Some(material);
    }

    /// Include the precomputed gravity load in the internal forces.
    pub fn set_gravity_on(&mut self, gravity_on: bool) {
        self.gravity_on = gravity_on;
    }

    pub fn set_alpha_damp(&mut self, alpha: f64) {
        self.warn_if_ready("alpha_damp");
        self.alpha = alpha;
    }

    /// Apply dimensions, damping, gravity flag and material from a config.
    pub fn apply_config(&mut self, config: &Brick9Config) -> Result<()> {
        config.validate()?;
        self.set_dimensions(config.dimensions);
        self.set_alpha_damp(config.alpha_damp);
        self.set_gravity_on(config.gravity_on);
        self.set_material(Arc::new(config.material.clone()));
        Ok(())
    }

    fn warn_if_ready(&self, what: &str) {
        if self.state == SetupState::Ready {
            warn!(
                "brick9: {} changed after setup_initial, cached matrices are stale",
                what
            );
        }
    }

    //--------------------------------------------------------------------------
    // Accessors
    //--------------------------------------------------------------------------

    pub fn dimensions(&self) -> &Vector3 {
        &self.dimensions
    }

    pub fn material(&self) -> Option<&Arc<ContinuumElastic>> {
        self.material.as_ref()
    }

    pub fn is_gravity_on(&self) -> bool {
        self.gravity_on
    }

    pub fn alpha_damp(&self) -> f64 {
        self.alpha
    }

    pub fn state(&self) -> SetupState {
        self.state
    }

    pub fn corner_node(&self, i: usize) -> Option<&SharedNode<NodeXyz>> {
        self.nodes.get(i)
    }

    pub fn central_node(&self) -> Option<&SharedNode<NodeCurv>> {
        self.central_node.as_ref()
    }

    /// Node `n` of the element: 0..8 are corners, 8 is the central node.
    pub fn node(&self, n: usize) -> Option<NodeHandle> {
        match n {
            0..=7 => self.nodes.get(n).cloned().map(NodeHandle::Xyz),
            8 => self.central_node.clone().map(NodeHandle::Curv),
            _ => None,
        }
    }

    /// Density of the assigned material.
    pub fn density(&self) -> Result<f64> {
        self.material
            .as_ref()
            .map(|m| m.density)
            .ok_or_else(|| Error::Configuration("material is not assigned".to_string()))
    }

    /// Constitutive matrix captured at setup.
    pub fn e_eps(&self) -> Result<&Matrix6> {
        self.ensure_ready("e_eps")?;
        Ok(&self.E_eps)
    }

    pub fn mass_matrix(&self) -> Result<&Matrix33> {
        self.ensure_ready("mass_matrix")?;
        Ok(&self.mass_matrix)
    }

    /// Gravity load computed at setup, whether or not it is switched on.
    pub fn gravity_force(&self) -> Result<&Vector33> {
        self.ensure_ready("gravity_force")?;
        Ok(&self.grav_force)
    }

    /// Jacobian from the last call to `compute_internal_jacobians`.
    pub fn jacobian_matrix(&self) -> Result<&Matrix33> {
        self.ensure_ready("jacobian_matrix")?;
        Ok(&self.jacobian_matrix)
    }

    /// Reference nodal coordinate matrix d0 (11 x 3).
    pub fn reference_coords(&self) -> Result<&Matrix11x3> {
        self.ensure_ready("reference_coords")?;
        Ok(&self.d0)
    }

    /// Nodal coordinate matrix d (11 x 3) cached by the last update.
    pub fn current_coords(&self) -> Result<&Matrix11x3> {
        self.ensure_ready("current_coords")?;
        Ok(&self.d)
    }

    fn ensure_ready(&self, operation: &'static str) -> Result<()> {
        match self.state {
            SetupState::Ready => Ok(()),
            SetupState::Uninitialized => Err(Error::NotInitialized(operation)),
        }
    }

    fn ensure_nodes(&self) -> Result<&SharedNode<NodeCurv>> {
        match &self.central_node {
            Some(central) if self.nodes.len() == NUM_CORNER_NODES => Ok(central),
            _ => Err(Error::Configuration(
                "element nodes are not assigned".to_string(),
            )),
        }
    }

    fn validate_configuration(&self) -> Result<Arc<ContinuumElastic>> {
        self.ensure_nodes()?;
        validate_dimensions(&self.dimensions)?;
        validate_alpha(self.alpha)?;
        let material = self
            .material
            .clone()
            .ok_or_else(|| Error::Configuration("material is not assigned".to_string()))?;
        material.validate()?;
        Ok(material)
    }

    //--------------------------------------------------------------------------
    // Lifecycle
    //--------------------------------------------------------------------------

    /// Capture the reference configuration, the constitutive matrix, the mass
    /// matrix and the gravity load.
    ///
    /// On failure the element stays uninitialized.
    pub fn setup_initial(&mut self, system: &SystemConfig) -> Result<()> {
        let material = self.validate_configuration()?;

        self.d0 = self.calc_coord_matrix()?;
        self.d0d0T = self.d0 * self.d0.transpose();
        self.d = self.d0;
        self.ddT = self.d0d0T;
        self.d_dt = self.calc_coord_deriv_matrix()?;
        self.E_eps = material.constitutive_3d();
        self.state = SetupState::Ready;

        if let Err(err) = self.compute_reference_integrals(&system.gravity) {
            self.state = SetupState::Uninitialized;
            return Err(err);
        }

        if log_enabled!(Level::Debug) {
            debug!(
                "brick9 setup: dimensions = ({}, {}, {}), volume = {:.6e}, density = {}",
                self.dimensions.x,
                self.dimensions.y,
                self.dimensions.z,
                self.volume()?,
                material.density
            );
        }
        Ok(())
    }

    fn compute_reference_integrals(&mut self, gravity: &Vector3) -> Result<()> {
        self.compute_mass_matrix()?;
        self.compute_gravity_force(gravity)
    }

    /// Refresh d, d*d' and d_dt from the current node state.
    pub fn update(&mut self) -> Result<()> {
        self.ensure_ready("update")?;
        self.d = self.calc_coord_matrix()?;
        self.ddT = self.d * self.d.transpose();
        self.d_dt = self.calc_coord_deriv_matrix()?;
        ensure_finite(self.d.iter().chain(self.d_dt.iter()), "node state")?;
        trace!(
            "brick9 update: |d - d0| = {:.3e}, |d_dt| = {:.3e}",
            (self.d - self.d0).norm(),
            self.d_dt.norm()
        );
        Ok(())
    }

    //--------------------------------------------------------------------------
    // Kinematics
    //--------------------------------------------------------------------------

    /// Nodal coordinate matrix (11 x 3) read from the nodes: corner positions
    /// followed by r_xx, r_yy, r_zz.
    pub fn calc_coord_matrix(&self) -> Result<Matrix11x3> {
        let central = self.ensure_nodes()?;
        let mut d = Matrix11x3::zeros();
        for (i, node) in self.nodes.iter().enumerate() {
            d.set_row(i, &node.read().pos.transpose());
        }
        for (i, r) in central.read().curvatures().iter().enumerate() {
            d.set_row(NUM_CORNER_NODES + i, &r.transpose());
        }
        Ok(d)
    }

    /// Nodal velocities stacked in DOF order (33).
    pub fn calc_coord_deriv_matrix(&self) -> Result<Vector33> {
        let central = self.ensure_nodes()?;
        let mut d_dt = Vector33::zeros();
        for (i, node) in self.nodes.iter().enumerate() {
            d_dt.fixed_rows_mut::<3>(3 * i).copy_from(&node.read().pos_dt);
        }
        for (i, r) in central.read().curvatures_dt().iter().enumerate() {
            d_dt.fixed_rows_mut::<3>(3 * (NUM_CORNER_NODES + i))
                .copy_from(r);
        }
        Ok(d_dt)
    }

    /// det[J0] at parametric point (x, y, z).
    pub fn calc_det_j0(&self, x: f64, y: f64, z: f64) -> Result<f64> {
        Ok(self.calc_det_j0_with_derivatives(x, y, z)?.det)
    }

    /// Reference Jacobian at (x, y, z), failing on a non-positive determinant.
    pub fn calc_det_j0_with_derivatives(
        &self,
        x: f64,
        y: f64,
        z: f64,
    ) -> Result<ReferenceJacobian> {
        self.ensure_ready("calc_det_j0")?;
        let Nx = shape_functions_derivative_x(&self.dimensions, x, y, z);
        let Ny = shape_functions_derivative_y(&self.dimensions, x, y, z);
        let Nz = shape_functions_derivative_z(&self.dimensions, x, y, z);
        let mut rj = ReferenceJacobian {
            det: 0.,
            Nx_d0: Nx * self.d0,
            Ny_d0: Ny * self.d0,
            Nz_d0: Nz * self.d0,
            Nx,
            Ny,
            Nz,
        };
        rj.det = rj.matrix().determinant();
        if !(rj.det > 0.) {
            return Err(Error::DegenerateGeometry {
                det: rj.det,
                x,
                y,
                z,
            });
        }
        Ok(rj)
    }

    fn point_kinematics(&self, x: f64, y: f64, z: f64) -> Result<PointKinematics> {
        let rj = self.calc_det_j0_with_derivatives(x, y, z)?;
        let grad = rj.material_gradients()?;

        // Green-Lagrange strain from the change in nodal Gram matrix
        let E: Matrix3 = 0.5 * grad * (self.ddT - self.d0d0T) * grad.transpose();
        let strain = Vector6::new(
            E[(0, 0)],
            E[(1, 1)],
            E[(2, 2)],
            2. * E[(0, 1)],
            2. * E[(1, 2)],
            2. * E[(0, 2)],
        );

        // Deformation gradient
        let F: Matrix3 = (grad * self.d).transpose();
        let B = strain_displacement(&grad, &F);

        let strain_dt = B * self.d_dt;
        let stress = self.E_eps * (strain + strain_dt * self.alpha);

        Ok(PointKinematics {
            det_j0: rj.det,
            grad,
            B,
            stress,
        })
    }

    //--------------------------------------------------------------------------
    // Integrals
    //--------------------------------------------------------------------------

    /// Reference volume, the integral of det[J0].
    pub fn volume(&self) -> Result<f64> {
        Quadrature::gauss(QUADRATURE_ORDER).integrate_cube(0., |x, y, z| self.calc_det_j0(x, y, z))
    }

    /// Consistent mass matrix M = ∫ ρ S'S det[J0], with S = N ⊗ I3.
    pub fn compute_mass_matrix(&mut self) -> Result<()> {
        self.ensure_ready("compute_mass_matrix")?;
        let rho = self.density()?;
        let M = Quadrature::gauss(QUADRATURE_ORDER).integrate_cube(
            Matrix33::zeros(),
            |x, y, z| {
                let S = shape_functions(&self.dimensions, x, y, z).expand();
                let det_j0 = self.calc_det_j0(x, y, z)?;
                Ok(S.transpose() * S * (rho * det_j0))
            },
        )?;
        ensure_finite(M.iter(), "mass matrix")?;
        self.mass_matrix = M;
        Ok(())
    }

    /// Gravity load Fg = ∫ ρ S'g det[J0].
    pub fn compute_gravity_force(&mut self, gravity: &Vector3) -> Result<()> {
        self.ensure_ready("compute_gravity_force")?;
        let rho = self.density()?;
        let Fg = Quadrature::gauss(QUADRATURE_ORDER).integrate_cube(
            Vector33::zeros(),
            |x, y, z| {
                let S = shape_functions(&self.dimensions, x, y, z).expand();
                let det_j0 = self.calc_det_j0(x, y, z)?;
                Ok(S.transpose() * gravity * (rho * det_j0))
            },
        )?;
        ensure_finite(Fg.iter(), "gravity force")?;
        self.grav_force = Fg;
        Ok(())
    }

    /// Generalized internal forces Fi = -∫ B'σ det[J0], plus gravity when on.
    pub fn internal_forces(&self) -> Result<Vector33> {
        self.ensure_ready("compute_internal_forces")?;
        let mut Fi = Quadrature::gauss(QUADRATURE_ORDER).integrate_cube(
            Vector33::zeros(),
            |x, y, z| {
                let pk = self.point_kinematics(x, y, z)?;
                Ok(-(pk.B.transpose() * pk.stress) * pk.det_j0)
            },
        )?;
        if self.gravity_on {
            Fi += self.grav_force;
        }
        ensure_finite(Fi.iter(), "internal forces")?;
        Ok(Fi)
    }

    /// Kfactor * K + Rfactor * R where K = -∂Fi/∂e and R = -∂Fi/∂e_dt.
    ///
    /// The result is also cached and available from `jacobian_matrix`.
    pub fn compute_internal_jacobians(&mut self, kfactor: f64, rfactor: f64) -> Result<&Matrix33> {
        self.ensure_ready("compute_internal_jacobians")?;
        let J = Quadrature::gauss(QUADRATURE_ORDER).integrate_cube(
            Matrix33::zeros(),
            |x, y, z| {
                let pk = self.point_kinematics(x, y, z)?;
                let material = pk.B.transpose() * self.E_eps * pk.B;
                let geometric =
                    (pk.grad.transpose() * pk.stress.voigt_to_tensor() * pk.grad).expand();
                Ok((material * (kfactor + rfactor * self.alpha) + geometric * kfactor) * pk.det_j0)
            },
        )?;
        ensure_finite(J.iter(), "Jacobian matrix")?;
        self.jacobian_matrix = J;
        Ok(&self.jacobian_matrix)
    }

    /// H = Kfactor * K + Rfactor * R + Mfactor * M.
    pub fn krm_matrices(&mut self, kfactor: f64, rfactor: f64, mfactor: f64) -> Result<Matrix33> {
        self.compute_internal_jacobians(kfactor, rfactor)?;
        Ok(self.jacobian_matrix + self.mass_matrix * mfactor)
    }

    /// Generalized load N'*F for a point force density F at (u, v, w), with det[J0].
    pub fn nf(&self, u: f64, v: f64, w: f64, F: &Vector3) -> Result<(Vector33, f64)> {
        let det_j0 = self.calc_det_j0(u, v, w)?;
        let S = shape_functions(&self.dimensions, u, v, w).expand();
        Ok((S.transpose() * F, det_j0))
    }

    /// Current positions of all nodes in DOF order.
    pub fn state_x(&self) -> Result<Vector33> {
        let d = self.calc_coord_matrix()?;
        Ok(Vector33::from_iterator(d.transpose().iter().copied()))
    }

    /// Current velocities of all nodes in DOF order.
    pub fn state_w(&self) -> Result<Vector33> {
        self.calc_coord_deriv_matrix()
    }
}

/// Derivative of the Voigt Green-Lagrange strain with respect to the DOFs.
fn strain_displacement(grad: &Matrix3x11, F: &Matrix3) -> Matrix6x33 {
    let mut B = Matrix6x33::zeros();
    for (v, &(i, j)) in VOIGT.iter().enumerate() {
        for n in 0..NUM_SHAPE_FUNCTIONS {
            for k in 0..3 {
                B[(v, 3 * n + k)] = if i == j {
                    grad[(i, n)] * F[(k, i)]
                } else {
                    grad[(i, n)] * F[(k, j)] + grad[(j, n)] * F[(k, i)]
                };
            }
        }
    }
    B
}

fn to_dynamic(m: &Matrix33) -> MatrixD {
    MatrixD::from_column_slice(NUM_DOFS, NUM_DOFS, m.as_slice())
}

fn write_block(md: &mut VectorD, offset: usize, block: &Vector33) -> Result<()> {
    if md.len() < offset + NUM_DOFS {
        return Err(Error::DimensionMismatch {
            expected: offset + NUM_DOFS,
            actual: md.len(),
        });
    }
    md.rows_mut(offset, NUM_DOFS).copy_from(block);
    Ok(())
}

fn check_len(v: &VectorD, expected: usize) -> Result<()> {
    if v.len() == expected {
        Ok(())
    } else {
        Err(Error::DimensionMismatch {
            expected,
            actual: v.len(),
        })
    }
}

//------------------------------------------------------------------------------
// Assembler interfaces
//------------------------------------------------------------------------------

impl ElementGeneric for Brick9 {
    fn n_nodes(&self) -> usize {
        NUM_NODES
    }

    fn n_dofs(&self) -> usize {
        NUM_DOFS
    }

    fn node_ndofs(&self, n: usize) -> usize {
        match n {
            0..=7 => NodeXyz::NDOF,
            8 => NodeCurv::NDOF,
            _ => 0,
        }
    }

    fn node_n(&self, n: usize) -> Option<NodeHandle> {
        self.node(n)
    }

    fn setup_initial(&mut self, system: &SystemConfig) -> Result<()> {
        Brick9::setup_initial(self, system)
    }

    fn update(&mut self) -> Result<()> {
        Brick9::update(self)
    }

    fn state_block(&self, md: &mut VectorD) -> Result<()> {
        *md = VectorD::from_column_slice(self.state_x()?.as_slice());
        Ok(())
    }

    fn compute_mmatrix_global(&self, m: &mut MatrixD) -> Result<()> {
        *m = to_dynamic(self.mass_matrix()?);
        Ok(())
    }

    fn compute_krm_matrices_global(
        &mut self,
        h: &mut MatrixD,
        kfactor: f64,
        rfactor: f64,
        mfactor: f64,
    ) -> Result<()> {
        *h = to_dynamic(&self.krm_matrices(kfactor, rfactor, mfactor)?);
        Ok(())
    }

    fn compute_internal_forces(&self, fi: &mut VectorD) -> Result<()> {
        *fi = VectorD::from_column_slice(self.internal_forces()?.as_slice());
        Ok(())
    }
}

impl LoadableUvw for Brick9 {
    fn field_ncoords(&self) -> usize {
        3
    }

    fn sub_blocks(&self) -> usize {
        NUM_NODES
    }

    fn sub_block_offset(&self, nblock: usize) -> Result<usize> {
        self.node(nblock)
            .map(|node| node.offset_w())
            .ok_or_else(|| Error::Configuration(format!("element has no node {}", nblock)))
    }

    fn sub_block_size(&self, nblock: usize) -> Result<usize> {
        match self.node_ndofs(nblock) {
            0 => Err(Error::Configuration(format!("element has no node {}", nblock))),
            ndof => Ok(ndof),
        }
    }

    fn loadable_ndof_x(&self) -> usize {
        NUM_DOFS
    }

    fn loadable_ndof_w(&self) -> usize {
        NUM_DOFS
    }

    fn loadable_state_block_x(&self, block_offset: usize, md: &mut VectorD) -> Result<()> {
        write_block(md, block_offset, &self.state_x()?)
    }

    fn loadable_state_block_w(&self, block_offset: usize, md: &mut VectorD) -> Result<()> {
        write_block(md, block_offset, &self.state_w()?)
    }

    fn loadable_variables(&self, vars: &mut Vec<Variables>) {
        vars.extend((0..NUM_NODES).filter_map(|n| self.node(n)).map(|n| n.variables()));
    }

    fn compute_nf(
        &self,
        u: f64,
        v: f64,
        w: f64,
        qi: &mut VectorD,
        f: &VectorD,
        state_x: Option<&VectorD>,
        state_w: Option<&VectorD>,
    ) -> Result<f64> {
        check_len(f, 3)?;
        for state in [state_x, state_w].into_iter().flatten() {
            check_len(state, NUM_DOFS)?;
        }
        let (q, det_j0) = self.nf(u, v, w, &Vector3::new(f[0], f[1], f[2]))?;
        *qi = VectorD::from_column_slice(q.as_slice());
        Ok(det_j0)
    }

    fn density(&self) -> Result<f64> {
        Brick9::density(self)
    }
}

//------------------------------------------------------------------------------
// Testing
//------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::interp::corner_coordinates;
    use approx::assert_relative_eq;

    type Corners = [SharedNode<NodeXyz>; NUM_CORNER_NODES];

    /// Axis-aligned box with one corner at the origin.
    fn box_nodes(size: Vector3) -> (Corners, SharedNode<NodeCurv>) {
        let corners = std::array::from_fn(|i| {
            let p = corner_coordinates(i);
            NodeXyz::shared(Vector3::new(
                0.5 * (p.x + 1.) * size.x,
                0.5 * (p.y + 1.) * size.y,
                0.5 * (p.z + 1.) * size.z,
            ))
        });
        let central = NodeCurv::shared(Vector3::zeros(), Vector3::zeros(), Vector3::zeros());
        (corners, central)
    }

    fn brick(size: Vector3, material: ContinuumElastic) -> (Brick9, Corners, SharedNode<NodeCurv>) {
        let (corners, central) = box_nodes(size);
        let mut elem = Brick9::new();
        elem.set_nodes(corners.clone(), central.clone()).unwrap();
        elem.set_dimensions(size);
        elem.set_material(Arc::new(material));
        (elem, corners, central)
    }

    fn steel_like() -> ContinuumElastic {
        ContinuumElastic::new(1e3, 0.3, 7.).unwrap()
    }

    fn perturb(corners: &Corners, central: &SharedNode<NodeCurv>, dof: usize, h: f64) {
        if dof < 3 * NUM_CORNER_NODES {
            corners[dof / 3].write().pos[dof % 3] += h;
        } else {
            let c = dof - 3 * NUM_CORNER_NODES;
            central.write().curvature_mut(c / 3)[c % 3] += h;
        }
    }

    fn perturb_velocity(corners: &Corners, central: &SharedNode<NodeCurv>, dof: usize, h: f64) {
        if dof < 3 * NUM_CORNER_NODES {
            corners[dof / 3].write().pos_dt[dof % 3] += h;
        } else {
            let c = dof - 3 * NUM_CORNER_NODES;
            let mut node = central.write();
            match c / 3 {
                0 => node.curv_xx_dt[c % 3] += h,
                1 => node.curv_yy_dt[c % 3] += h,
                _ => node.curv_zz_dt[c % 3] += h,
            }
        }
    }

    /// Moderate, non-symmetric deformation of every DOF.
    fn deform(corners: &Corners, central: &SharedNode<NodeCurv>) {
        for (i, node) in corners.iter().enumerate() {
            let s = i as f64 + 1.;
            node.write().pos += Vector3::new(
                0.02 * s.sin(),
                0.015 * (2. * s).cos(),
                -0.01 * (3. * s).sin(),
            );
        }
        let mut c = central.write();
        c.curv_xx += Vector3::new(0.01, 0.02, 0.);
        c.curv_yy += Vector3::new(-0.01, 0.005, 0.015);
        c.curv_zz += Vector3::new(0., -0.02, 0.01);
    }

    #[test]
    fn test_reference_jacobian_of_box() {
        let size = Vector3::new(2., 1., 0.5);
        let (mut elem, _, _) = brick(size, steel_like());
        elem.setup_initial(&SystemConfig::default()).unwrap();

        let rj = elem.calc_det_j0_with_derivatives(0.3, -0.2, 0.7).unwrap();
        assert_relative_eq!(rj.matrix(), Matrix3::from_diagonal(&(size * 0.5)), epsilon = 1e-14);
        assert_relative_eq!(rj.det, 0.125, epsilon = 1e-14);
        assert_relative_eq!(elem.volume().unwrap(), 1., epsilon = 1e-13);
    }

    #[test]
    fn test_queries_before_setup() {
        let (mut elem, _, _) = brick(Vector3::new(1., 1., 1.), steel_like());
        assert!(matches!(elem.update(), Err(Error::NotInitialized("update"))));
        assert!(matches!(
            elem.internal_forces(),
            Err(Error::NotInitialized(_))
        ));
        assert!(matches!(
            elem.compute_internal_jacobians(1., 0.),
            Err(Error::NotInitialized(_))
        ));
        assert!(matches!(
            elem.calc_det_j0(0., 0., 0.),
            Err(Error::NotInitialized(_))
        ));
        assert_eq!(elem.state(), SetupState::Uninitialized);
    }

    #[test]
    fn test_setup_requires_configuration() {
        let mut elem = Brick9::new();
        assert!(matches!(
            elem.setup_initial(&SystemConfig::default()),
            Err(Error::Configuration(_))
        ));

        let (corners, central) = box_nodes(Vector3::new(1., 1., 1.));
        elem.set_nodes(corners.clone(), central.clone()).unwrap();
        assert!(matches!(
            elem.set_nodes(corners, central),
            Err(Error::Configuration(_))
        ));

        // Missing dimensions
        elem.set_material(Arc::new(steel_like()));
        assert!(matches!(
            elem.setup_initial(&SystemConfig::default()),
            Err(Error::Configuration(_))
        ));

        elem.set_dimensions(Vector3::new(1., 1., 1.));
        elem.set_alpha_damp(-0.1);
        assert!(matches!(
            elem.setup_initial(&SystemConfig::default()),
            Err(Error::Configuration(_))
        ));

        elem.set_alpha_damp(0.);
        elem.setup_initial(&SystemConfig::default()).unwrap();
        assert_eq!(elem.state(), SetupState::Ready);
    }

    #[test]
    fn test_inverted_element_is_rejected() {
        let (corners, central) = box_nodes(Vector3::new(1., 1., 1.));
        for node in corners.iter() {
            node.write().pos.x *= -1.;
        }
        let mut elem = Brick9::new();
        elem.set_nodes(corners, central).unwrap();
        elem.set_dimensions(Vector3::new(1., 1., 1.));
        elem.set_material(Arc::new(steel_like()));

        let res = elem.setup_initial(&SystemConfig::default());
        assert!(matches!(res, Err(Error::DegenerateGeometry { det, .. }) if det < 0.));
        assert_eq!(elem.state(), SetupState::Uninitialized);
    }

    #[test]
    fn test_reference_state_is_stress_free() {
        let (mut elem, _, _) = brick(Vector3::new(1., 0.8, 1.2), steel_like());
        elem.setup_initial(&SystemConfig::default()).unwrap();
        elem.update().unwrap();
        let Fi = elem.internal_forces().unwrap();
        assert_relative_eq!(Fi, Vector33::zeros(), epsilon = 1e-10);
    }

    #[test]
    fn test_curved_reference_configuration() {
        let size = Vector3::new(2., 1., 0.5);
        let (mut elem, corners, central) = brick(size, steel_like());
        let kappa = Vector3::new(0., 0.1, -0.05);
        central.write().curv_xx = kappa;
        elem.setup_initial(&SystemConfig::default()).unwrap();

        // The curvature DOFs are the second derivative of position along X
        let d0 = *elem.reference_coords().unwrap();
        let r = |s: f64| shape_functions(&size, s, 0.4, -0.3) * d0;
        let h = 1e-2;
        let r_XX = (r(0.1 + h) - 2. * r(0.1) + r(0.1 - h)) / (h * h) * 4. / (size.x * size.x);
        assert_relative_eq!(r_XX.transpose(), kappa, epsilon = 1e-9);

        // A curved reference is stress free
        elem.update().unwrap();
        assert_relative_eq!(elem.internal_forces().unwrap(), Vector33::zeros(), epsilon = 1e-10);

        // So is a rigid rotation of it, with the curvatures rotated along
        let R = nalgebra::Rotation3::from_axis_angle(&Vector3::z_axis(), 0.3);
        for node in corners.iter() {
            let mut n = node.write();
            n.pos = R * n.initial_pos();
        }
        central.write().curv_xx = R * kappa;
        elem.update().unwrap();
        assert!(elem.internal_forces().unwrap().amax() < 1e-9);

        // Straightening the element loads the curvature DOFs
        for node in corners.iter() {
            let mut n = node.write();
            n.pos = n.initial_pos();
        }
        central.write().curv_xx = Vector3::zeros();
        elem.update().unwrap();
        let Fi = elem.internal_forces().unwrap();
        assert!(Fi.fixed_rows::<3>(3 * NUM_CORNER_NODES).norm() > 1e-3);
    }

    #[test]
    fn test_update_rejects_non_finite_state() {
        let (mut elem, corners, _) = brick(Vector3::new(1., 1., 1.), steel_like());
        elem.setup_initial(&SystemConfig::default()).unwrap();

        corners[2].write().pos.y = f64::NAN;
        assert!(matches!(
            elem.update(),
            Err(Error::NumericalFailure("node state"))
        ));

        corners[2].write().pos.y = 1.;
        corners[5].write().pos_dt.z = f64::INFINITY;
        assert!(matches!(
            elem.update(),
            Err(Error::NumericalFailure(_))
        ));
    }

    #[test]
    fn test_mass_matrix_properties() {
        let (mut elem, _, _) = brick(Vector3::new(2., 1., 0.5), steel_like());
        elem.setup_initial(&SystemConfig::default()).unwrap();
        let M = *elem.mass_matrix().unwrap();

        assert_relative_eq!(M, M.transpose(), epsilon = 1e-12);
        assert!(to_dynamic(&M).cholesky().is_some());

        // Rigid translation carries the full element mass
        for k in 0..3 {
            let mut u = Vector33::zeros();
            for n in 0..NUM_CORNER_NODES {
                u[3 * n + k] = 1.;
            }
            assert_relative_eq!((u.transpose() * M * u)[0], 7., epsilon = 1e-11);
        }
    }

    #[test]
    fn test_gravity_force_total() {
        let (mut elem, _, _) = brick(Vector3::new(2., 1., 0.5), steel_like());
        elem.setup_initial(&SystemConfig::default()).unwrap();
        let Fg = *elem.gravity_force().unwrap();

        let total = (0..NUM_CORNER_NODES)
            .map(|n| Fg.fixed_rows::<3>(3 * n).into_owned())
            .fold(Vector3::zeros(), |acc, f| acc + f);
        assert_relative_eq!(total, Vector3::new(0., -9.8 * 7., 0.), epsilon = 1e-11);

        // The flag only decides whether the load reaches the internal forces
        elem.set_gravity_on(true);
        assert_relative_eq!(elem.internal_forces().unwrap(), Fg, epsilon = 1e-10);
        elem.set_gravity_on(false);
        assert_relative_eq!(elem.internal_forces().unwrap(), Vector33::zeros(), epsilon = 1e-10);
    }

    #[test]
    fn test_stiffness_matches_finite_differences() {
        let (mut elem, corners, central) = brick(Vector3::new(1., 0.8, 1.2), steel_like());
        elem.setup_initial(&SystemConfig::default()).unwrap();
        deform(&corners, &central);
        elem.update().unwrap();
        let K = *elem.compute_internal_jacobians(1., 0.).unwrap();

        assert_relative_eq!(K, K.transpose(), epsilon = 1e-9 * K.amax());

        let h = 1e-6;
        let mut K_fd = Matrix33::zeros();
        for j in 0..NUM_DOFS {
            perturb(&corners, &central, j, h);
            elem.update().unwrap();
            let fp = elem.internal_forces().unwrap();
            perturb(&corners, &central, j, -2. * h);
            elem.update().unwrap();
            let fm = elem.internal_forces().unwrap();
            perturb(&corners, &central, j, h);
            K_fd.set_column(j, &(-(fp - fm) / (2. * h)));
        }
        assert_relative_eq!(K, K_fd, epsilon = 1e-6 * K.amax());
    }

    #[test]
    fn test_damping_matches_finite_differences() {
        let (mut elem, corners, central) = brick(Vector3::new(1., 1., 1.), steel_like());
        elem.set_alpha_damp(0.05);
        elem.setup_initial(&SystemConfig::default()).unwrap();
        deform(&corners, &central);
        elem.update().unwrap();
        let R = *elem.compute_internal_jacobians(0., 1.).unwrap();

        let h = 1e-3;
        let mut R_fd = Matrix33::zeros();
        for j in 0..NUM_DOFS {
            perturb_velocity(&corners, &central, j, h);
            elem.update().unwrap();
            let fp = elem.internal_forces().unwrap();
            perturb_velocity(&corners, &central, j, -2. * h);
            elem.update().unwrap();
            let fm = elem.internal_forces().unwrap();
            perturb_velocity(&corners, &central, j, h);
            R_fd.set_column(j, &(-(fp - fm) / (2. * h)));
        }
        assert_relative_eq!(R, R_fd, epsilon = 1e-8 * R.amax());
    }

    #[test]
    fn test_damping_force_at_reference() {
        let (mut elem, corners, _) = brick(Vector3::new(1., 1., 1.), steel_like());
        elem.set_alpha_damp(0.02);
        elem.setup_initial(&SystemConfig::default()).unwrap();
        for (i, node) in corners.iter().enumerate() {
            node.write().pos_dt = Vector3::new(0.1 * i as f64, -0.05, 0.02 * (i % 3) as f64);
        }
        elem.update().unwrap();

        let Fi = elem.internal_forces().unwrap();
        let R = *elem.compute_internal_jacobians(0., 1.).unwrap();
        let v = elem.state_w().unwrap();
        assert_relative_eq!(Fi, -(R * v), epsilon = 1e-10);
    }

    #[test]
    fn test_krm_combination() {
        let (mut elem, corners, central) = brick(Vector3::new(1., 1., 1.), steel_like());
        elem.set_alpha_damp(0.01);
        elem.setup_initial(&SystemConfig::default()).unwrap();
        deform(&corners, &central);
        elem.update().unwrap();

        let K = *elem.compute_internal_jacobians(1., 0.).unwrap();
        let R = *elem.compute_internal_jacobians(0., 1.).unwrap();
        let M = *elem.mass_matrix().unwrap();
        let H = elem.krm_matrices(2., 0.5, 3.).unwrap();
        assert_relative_eq!(H, K * 2. + R * 0.5 + M * 3., epsilon = 1e-9 * H.amax());
    }

    #[test]
    fn test_nf_projection() {
        let (mut elem, _, _) = brick(Vector3::new(2., 1., 0.5), steel_like());
        elem.setup_initial(&SystemConfig::default()).unwrap();
        let F = Vector3::new(1., 2., 3.);
        let (q, det) = elem.nf(0.2, -0.4, 0.6, &F).unwrap();
        assert_relative_eq!(det, 0.125, epsilon = 1e-14);

        let N = shape_functions(elem.dimensions(), 0.2, -0.4, 0.6);
        for n in 0..NUM_SHAPE_FUNCTIONS {
            for k in 0..3 {
                assert_relative_eq!(q[3 * n + k], N[n] * F[k], epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn test_loadable_blocks() {
        let (mut elem, corners, central) = brick(Vector3::new(1., 1., 1.), steel_like());
        for (i, node) in corners.iter().enumerate() {
            node.write().set_offsets(3 * i, 3 * i);
        }
        central.write().set_offsets(24, 24);
        elem.setup_initial(&SystemConfig::default()).unwrap();

        assert_eq!(elem.sub_blocks(), 9);
        assert_eq!(elem.sub_block_offset(8).unwrap(), 24);
        assert_eq!(elem.sub_block_size(8).unwrap(), 9);
        assert_eq!(elem.sub_block_size(3).unwrap(), 3);
        assert!(matches!(elem.sub_block_offset(9), Err(Error::Configuration(_))));
        assert!(matches!(elem.sub_block_size(9), Err(Error::Configuration(_))));
        assert_eq!(elem.node_ndofs(9), 0);

        let mut vars = Vec::new();
        elem.loadable_variables(&mut vars);
        assert_eq!(vars.len(), 9);
        assert_eq!(vars.iter().map(|v| v.ndof).sum::<usize>(), NUM_DOFS);

        let mut x = VectorD::zeros(40);
        elem.loadable_state_block_x(5, &mut x).unwrap();
        assert_eq!(x[5 + 3 * 6], 1.);
        assert_eq!(x[5 + 3 * 6 + 1], 1.);
        assert_eq!(x[5 + 3 * 6 + 2], 1.);

        let mut short = VectorD::zeros(20);
        assert!(matches!(
            elem.loadable_state_block_w(0, &mut short),
            Err(Error::DimensionMismatch { expected: 33, actual: 20 })
        ));

        let mut qi = VectorD::zeros(0);
        let bad_f = VectorD::zeros(2);
        assert!(elem.compute_nf(0., 0., 0., &mut qi, &bad_f, None, None).is_err());
    }
}
