use std::fmt;

pub use self::matrix::Matrix;
pub use self::vector::Vector;

mod matrix;
mod vector;

pub type Value = f64;

pub trait ValueType {
    const ZERO: Self;
    const ONE: Self;
}

impl ValueType for f64 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MatrixError {
    /// The operands of `operation` have incompatible shapes.
    DimensionMismatch {
        operation: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },
    IndexOutOfRange {
        row: usize,
        column: usize,
        shape: (usize, usize),
    },
    /// A matrix or vector was requested with zero rows or columns.
    EmptyDimension,
    /// `rows * columns` values cannot be stored.
    TooLarge { rows: usize, columns: usize },
}

impl fmt::Display for MatrixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionMismatch {
                operation,
                left,
                right,
            } => write!(
                f,
                "dimension mismatch in {operation}: {}x{} and {}x{}",
                left.0, left.1, right.0, right.1
            ),
            Self::IndexOutOfRange { row, column, shape } => write!(
                f,
                "index ({row}, {column}) out of range for {}x{} matrix",
                shape.0, shape.1
            ),
            Self::EmptyDimension => write!(f, "dimensions must be at least 1"),
            Self::TooLarge { rows, columns } => {
                write!(f, "a {rows}x{columns} matrix is too large")
            }
        }
    }
}

impl std::error::Error for MatrixError {}
