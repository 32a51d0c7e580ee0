use crate::prelude::*;

//------------------------------------------------------------------------------
// Lagrange Polynomials
//------------------------------------------------------------------------------

pub fn lagrange_polynomial(x: f64, xs: &[f64]) -> Vec<f64> {
    xs.iter()
        .enumerate()
        .map(|(j, &xj)| {
            xs.iter()
                .enumerate()
                .filter(|(m, _)| *m != j)
                .map(|(_, &xm)| (x - xm) / (xj - xm))
                .product()
        })
        .collect()
}

pub fn lagrange_polynomial_derivative(x: f64, xs: &[f64]) -> Vec<f64> {
    xs.iter()
        .enumerate()
        .map(|(j, &sj)| {
            xs.iter()
                .enumerate()
                .filter(|(i, _)| *i != j)
                .map(|(i, &si)| {
                    1.0 / (sj - si)
                        * xs.iter()
                            .enumerate()
                            .filter(|(m, _)| *m != i && *m != j)
                            .map(|(_, &sm)| (x - sm) / (sj - sm))
                            .product::<f64>()
                })
                .sum()
        })
        .collect()
}

//------------------------------------------------------------------------------
// Brick Shape Functions
//------------------------------------------------------------------------------

/// Number of shape functions: 8 corners + 3 curvature terms
pub const NUM_SHAPE_FUNCTIONS: usize = 11;

/// Nodes of the 1-D linear interpolant along each parametric axis
const LINEAR_NODES: [f64; 2] = [-1., 1.];

/// Index into `LINEAR_NODES` along (x, y, z) for each corner node
const CORNER_INDEX: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

/// Parametric coordinates of corner node `i`.
///
/// # Panics
///
/// Panics if `i` is not a corner index (0..8).
pub fn corner_coordinates(i: usize) -> Vector3 {
    let [ix, iy, iz] = CORNER_INDEX[i];
    Vector3::new(LINEAR_NODES[ix], LINEAR_NODES[iy], LINEAR_NODES[iz])
}

/// Fill the 8 corner entries with products of 1-D factors.
fn corner_products(fx: &[f64], fy: &[f64], fz: &[f64]) -> Matrix1x11 {
    let mut n = Matrix1x11::zeros();
    for (i, &[ix, iy, iz]) in CORNER_INDEX.iter().enumerate() {
        n[i] = fx[ix] * fy[iy] * fz[iz];
    }
    n
}

/// Curvature basis term along one axis, zero on the faces s = ±1.
///
/// With X = length * s / 2 its second derivative in X is one, so the
/// coefficient is the second derivative of position along that axis.
fn curvature_basis(length: f64, s: f64) -> f64 {
    0.125 * length * length * (s * s - 1.)
}

fn curvature_basis_derivative(length: f64, s: f64) -> f64 {
    0.25 * length * length * s
}

/// Shape functions N = [N1, ..., N8, Nxx, Nyy, Nzz] at (x, y, z) in [-1, 1]^3.
///
/// The corner functions are trilinear; the last three scale the central node
/// curvature vectors by the squared element dimensions.
pub fn shape_functions(dims: &Vector3, x: f64, y: f64, z: f64) -> Matrix1x11 {
    let lx = lagrange_polynomial(x, &LINEAR_NODES);
    let ly = lagrange_polynomial(y, &LINEAR_NODES);
    let lz = lagrange_polynomial(z, &LINEAR_NODES);
    let mut n = corner_products(&lx, &ly, &lz);
    n[8] = curvature_basis(dims.x, x);
    n[9] = curvature_basis(dims.y, y);
    n[10] = curvature_basis(dims.z, z);
    n
}

pub fn shape_functions_derivative_x(dims: &Vector3, x: f64, y: f64, z: f64) -> Matrix1x11 {
    let dlx = lagrange_polynomial_derivative(x, &LINEAR_NODES);
    let ly = lagrange_polynomial(y, &LINEAR_NODES);
    let lz = lagrange_polynomial(z, &LINEAR_NODES);
    let mut n = corner_products(&dlx, &ly, &lz);
    n[8] = curvature_basis_derivative(dims.x, x);
    n
}

pub fn shape_functions_derivative_y(dims: &Vector3, x: f64, y: f64, z: f64) -> Matrix1x11 {
    let lx = lagrange_polynomial(x, &LINEAR_NODES);
    let dly = lagrange_polynomial_derivative(y, &LINEAR_NODES);
    let lz = lagrange_polynomial(z, &LINEAR_NODES);
    let mut n = corner_products(&lx, &dly, &lz);
    n[9] = curvature_basis_derivative(dims.y, y);
    n
}

pub fn shape_functions_derivative_z(dims: &Vector3, x: f64, y: f64, z: f64) -> Matrix1x11 {
    let lx = lagrange_polynomial(x, &LINEAR_NODES);
    let ly = lagrange_polynomial(y, &LINEAR_NODES);
    let dlz = lagrange_polynomial_derivative(z, &LINEAR_NODES);
    let mut n = corner_products(&lx, &ly, &dlz);
    n[10] = curvature_basis_derivative(dims.z, z);
    n
}

//------------------------------------------------------------------------------
// Testing
//------------------------------------------------------------------------------
