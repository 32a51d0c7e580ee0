use nalgebra::{Const, Dyn};

pub use itertools::izip;

//------------------------------------------------------------------------------
// Types
//------------------------------------------------------------------------------

/// Matrix (3 x 3)
pub type Matrix3 = nalgebra::Matrix3<f64>;

/// Matrix (6 x 6)
pub type Matrix6 = nalgebra::Matrix6<f64>;

/// Row vector of shape function values (1 x Shape functions)
pub type Matrix1x11 = nalgebra::SMatrix<f64, 1, 11>;

/// Shape function gradients (3 x Shape functions)
pub type Matrix3x11 = nalgebra::SMatrix<f64, 3, 11>;

/// Nodal coordinates in matrix form (Shape functions x 3)
pub type Matrix11x3 = nalgebra::SMatrix<f64, 11, 3>;

/// Gram matrix of nodal coordinates (Shape functions x Shape functions)
pub type Matrix11 = nalgebra::SMatrix<f64, 11, 11>;

/// Expanded shape functions (3 x DOFs)
pub type Matrix3x33 = nalgebra::SMatrix<f64, 3, 33>;

/// Strain-displacement matrix (6 x DOFs)
pub type Matrix6x33 = nalgebra::SMatrix<f64, 6, 33>;

/// Element matrix (DOFs x DOFs)
pub type Matrix33 = nalgebra::SMatrix<f64, 33, 33>;

/// Matrix (DOFs x DOFs), global or element sized
pub type MatrixD = nalgebra::OMatrix<f64, Dyn, Dyn>;

pub type RowVector3 = nalgebra::RowVector3<f64>;

pub type Vector3 = nalgebra::Vector3<f64>;
pub type Vector6 = nalgebra::Vector6<f64>;

/// Column vector (Element DOFs)
pub type Vector33 = nalgebra::OVector<f64, Const<33>>;

/// Column vector (Degrees of Freedom)
pub type VectorD = nalgebra::DVector<f64>;

//------------------------------------------------------------------------------
// Traits
//------------------------------------------------------------------------------

pub trait ShapeExpandExt {
    fn expand(&self) -> Matrix3x33;
}

impl ShapeExpandExt for Matrix1x11 {
    /// Kronecker product with the 3x3 identity: [N1*eye(3), N2*eye(3), ...]
    fn expand(&self) -> Matrix3x33 {
        Matrix3x33::from_fn(|k, c| if c % 3 == k { self[c / 3] } else { 0. })
    }
}

pub trait NodalBlockExt {
    fn expand(&self) -> Matrix33;
}

impl NodalBlockExt for Matrix11 {
    /// Kronecker product with the 3x3 identity, one 3x3 block per node pair
    fn expand(&self) -> Matrix33 {
        Matrix33::from_fn(|r, c| if r % 3 == c % 3 { self[(r / 3, c / 3)] } else { 0. })
    }
}

pub trait VoigtExt {
    fn voigt_to_tensor(&self) -> Matrix3;
}

impl VoigtExt for Vector6 {
    /// Symmetric tensor from [s11, s22, s33, s12, s23, s13]
    fn voigt_to_tensor(&self) -> Matrix3 {
        Matrix3::new(
            self[0], self[3], self[5], self[3], self[1], self[4], self[5], self[4], self[2],
        )
    }
}
