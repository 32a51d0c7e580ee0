use std::sync::Arc;

use parking_lot::RwLock;

use crate::prelude::*;

/// Node handle shared between the mesh and every element that references it.
pub type SharedNode<N> = Arc<RwLock<N>>;

/// Location and width of a node's block in the global DOF vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Variables {
    pub offset: usize,
    pub ndof: usize,
}

//------------------------------------------------------------------------------
// Position node
//------------------------------------------------------------------------------

/// Corner node with three translational DOFs.
#[derive(Debug, Clone, Default)]
pub struct NodeXyz {
    pub pos: Vector3,
    pub pos_dt: Vector3,
    x0: Vector3,
    offset_x: usize,
    offset_w: usize,
}

impl NodeXyz {
    pub const NDOF: usize = 3;

    pub fn new(pos: Vector3) -> Self {
        NodeXyz {
            pos,
            x0: pos,
            ..Default::default()
        }
    }

    pub fn shared(pos: Vector3) -> SharedNode<Self> {
        Arc::new(RwLock::new(Self::new(pos)))
    }

    /// Position at construction
    pub fn initial_pos(&self) -> Vector3 {
        self.x0
    }

    pub fn offset_x(&self) -> usize {
        self.offset_x
    }

    pub fn offset_w(&self) -> usize {
        self.offset_w
    }

    /// Assign the node's place in the global position and velocity vectors.
    pub fn set_offsets(&mut self, offset_x: usize, offset_w: usize) {
        self.offset_x = offset_x;
        self.offset_w = offset_w;
    }

    pub fn variables(&self) -> Variables {
        Variables {
            offset: self.offset_w,
            ndof: Self::NDOF,
        }
    }
}

//------------------------------------------------------------------------------
// Curvature node
//------------------------------------------------------------------------------

/// Central node carrying the curvature vectors r_xx, r_yy, r_zz (nine DOFs).
#[derive(Debug, Clone, Default)]
pub struct NodeCurv {
    pub curv_xx: Vector3,
    pub curv_yy: Vector3,
    pub curv_zz: Vector3,
    pub curv_xx_dt: Vector3,
    pub curv_yy_dt: Vector3,
    pub curv_zz_dt: Vector3,
    offset_x: usize,
    offset_w: usize,
}

impl NodeCurv {
    pub const NDOF: usize = 9;

    pub fn new(curv_xx: Vector3, curv_yy: Vector3, curv_zz: Vector3) -> Self {
        NodeCurv {
            curv_xx,
            curv_yy,
            curv_zz,
            ..Default::default()
        }
    }

    pub fn shared(curv_xx: Vector3, curv_yy: Vector3, curv_zz: Vector3) -> SharedNode<Self> {
        Arc::new(RwLock::new(Self::new(curv_xx, curv_yy, curv_zz)))
    }

    pub fn curvatures(&self) -> [Vector3; 3] {
        [self.curv_xx, self.curv_yy, self.curv_zz]
    }

    pub fn curvatures_dt(&self) -> [Vector3; 3] {
        [self.curv_xx_dt, self.curv_yy_dt, self.curv_zz_dt]
    }

    /// Mutable access to curvature vector `i` (0 = xx, 1 = yy, 2 = zz).
    ///
    /// # Panics
    ///
    /// Panics if `i > 2`.
    pub fn curvature_mut(&mut self, i: usize) -> &mut Vector3 {
        match i {
            0 => &mut self.curv_xx,
            1 => &mut self.curv_yy,
            2 => &mut self.curv_zz,
            _ => panic!("curvature index {} out of range 0..3", i),
        }
    }

    pub fn offset_x(&self) -> usize {
        self.offset_x
    }

    pub fn offset_w(&self) -> usize {
        self.offset_w
    }

    pub fn set_offsets(&mut self, offset_x: usize, offset_w: usize) {
        self.offset_x = offset_x;
        self.offset_w = offset_w;
    }

    pub fn variables(&self) -> Variables {
        Variables {
            offset: self.offset_w,
            ndof: Self::NDOF,
        }
    }
}

//------------------------------------------------------------------------------
// Handle
//------------------------------------------------------------------------------

/// Either kind of node referenced by an element.
#[derive(Debug, Clone)]
pub enum NodeHandle {
    Xyz(SharedNode<NodeXyz>),
    Curv(SharedNode<NodeCurv>),
}

impl NodeHandle {
    pub fn ndof(&self) -> usize {
        match self {
            NodeHandle::Xyz(_) => NodeXyz::NDOF,
            NodeHandle::Curv(_) => NodeCurv::NDOF,
        }
    }

    pub fn offset_x(&self) -> usize {
        match self {
            NodeHandle::Xyz(n) => n.read().offset_x(),
            NodeHandle::Curv(n) => n.read().offset_x(),
        }
    }

    pub fn offset_w(&self) -> usize {
        match self {
            NodeHandle::Xyz(n) => n.read().offset_w(),
            NodeHandle::Curv(n) => n.read().offset_w(),
        }
    }

    pub fn variables(&self) -> Variables {
        match self {
            NodeHandle::Xyz(n) => n.read().variables(),
            NodeHandle::Curv(n) => n.read().variables(),
        }
    }
}
