//! Dense matrix payload type

use nalgebra::DMatrix;
use std::fmt;

/// Dense column-major `f32` matrix carried on matrix streams
pub type Matrix = DMatrix<f32>;

/// Row and column count of a matrix
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Shape {
    pub rows: usize,
    pub cols: usize,
}

impl Shape {
    pub fn of(matrix: &Matrix) -> Self {
        Self {
            rows: matrix.nrows(),
            cols: matrix.ncols(),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}
