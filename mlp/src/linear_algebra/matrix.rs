use std::fmt;
use std::mem;
use std::ops::{Div, DivAssign, Mul, MulAssign, Neg};

use serde::{Deserialize, Serialize};

use super::{MatrixError, Value, ValueType, Vector};

/// A dense, row-major matrix with at least one row and one column.
#[derive(Clone, Deserialize, PartialEq, Serialize)]
#[serde(try_from = "MatrixData", into = "MatrixData")]
pub struct Matrix {
    rows: usize,
    columns: usize,
    values: Vec<Value>,
}

impl Matrix {
    pub fn zeros(rows: usize, columns: usize) -> Result<Self, MatrixError> {
        Self::filled(rows, columns, Value::ZERO)
    }

    pub fn ones(rows: usize, columns: usize) -> Result<Self, MatrixError> {
        Self::filled(rows, columns, Value::ONE)
    }

    pub fn filled(rows: usize, columns: usize, value: Value) -> Result<Self, MatrixError> {
        let len = checked_len(rows, columns)?;
        Ok(Self::from_parts(rows, columns, vec![value; len]))
    }

    pub fn from_vec(rows: usize, columns: usize, values: Vec<Value>) -> Result<Self, MatrixError> {
        if values.len() != checked_len(rows, columns)? {
            return Err(MatrixError::DimensionMismatch {
                operation: "from_vec",
                left: (rows, columns),
                right: (1, values.len()),
            });
        }
        Ok(Self::from_parts(rows, columns, values))
    }

    /// Builds a matrix from a slice of equally sized rows.
    pub fn from_rows<R: AsRef<[Value]>>(rows: &[R]) -> Result<Self, MatrixError> {
        let columns = rows.first().map_or(0, |row| row.as_ref().len());
        let len = checked_len(rows.len(), columns)?;

        let mut values = Vec::with_capacity(len);
        for row in rows {
            let row = row.as_ref();
            if row.len() != columns {
                return Err(MatrixError::DimensionMismatch {
                    operation: "from_rows",
                    left: (1, columns),
                    right: (1, row.len()),
                });
            }
            values.extend_from_slice(row);
        }

        Ok(Self::from_parts(rows.len(), columns, values))
    }

    pub fn identity(size: usize) -> Result<Self, MatrixError> {
        let mut result = Self::zeros(size, size)?;
        for i in 0..size {
            result.values[i * size + i] = Value::ONE;
        }
        Ok(result)
    }

    /// Callers guarantee `values.len() == rows * columns` and non-zero dimensions.
    pub(crate) fn from_parts(rows: usize, columns: usize, values: Vec<Value>) -> Self {
        debug_assert!(rows > 0 && columns > 0 && values.len() == rows * columns);
        Self {
            rows,
            columns,
            values,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.columns)
    }

    pub fn get(&self, row: usize, column: usize) -> Result<Value, MatrixError> {
        let index = self.index_of(row, column)?;
        Ok(self.values[index])
    }

    pub fn set(&mut self, row: usize, column: usize, value: Value) -> Result<(), MatrixError> {
        let index = self.index_of(row, column)?;
        self.values[index] = value;
        Ok(())
    }

    pub fn row(&self, row: usize) -> Result<&[Value], MatrixError> {
        if row >= self.rows {
            return Err(self.out_of_range(row, 0));
        }
        Ok(&self.values[row * self.columns..(row + 1) * self.columns])
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[Value]> {
        self.values.chunks_exact(self.columns)
    }

    pub fn iter_rows_mut(&mut self) -> impl Iterator<Item = &mut [Value]> {
        self.values.chunks_exact_mut(self.columns)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Value> {
        self.values.iter_mut()
    }

    pub fn add(&self, other: &Self) -> Result<Self, MatrixError> {
        self.zip_with("add", other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Self) -> Result<Self, MatrixError> {
        self.zip_with("sub", other, |a, b| a - b)
    }

    /// Element-wise product.
    pub fn hadamard(&self, other: &Self) -> Result<Self, MatrixError> {
        self.zip_with("hadamard", other, |a, b| a * b)
    }

    /// Combines two equally shaped matrices element by element.
    pub fn zip_map(
        &self,
        other: &Self,
        f: impl Fn(Value, Value) -> Value,
    ) -> Result<Self, MatrixError> {
        self.zip_with("zip_map", other, f)
    }

    pub fn multiply(&self, other: &Self) -> Result<Self, MatrixError> {
        if self.columns != other.rows {
            return Err(MatrixError::DimensionMismatch {
                operation: "multiply",
                left: self.shape(),
                right: other.shape(),
            });
        }

        let mut values = vec![Value::ZERO; self.rows * other.columns];
        for (row, result_row) in self.iter_rows().zip(values.chunks_exact_mut(other.columns)) {
            for (&a, other_row) in row.iter().zip(other.iter_rows()) {
                result_row
                    .iter_mut()
                    .zip(other_row)
                    .for_each(|(r, &b)| *r += a * b);
            }
        }

        Ok(Self::from_parts(self.rows, other.columns, values))
    }

    pub fn transpose(&self) -> Self {
        let mut values = Vec::with_capacity(self.values.len());
        for column in 0..self.columns {
            for row in 0..self.rows {
                values.push(self.values[row * self.columns + column]);
            }
        }
        Self::from_parts(self.columns, self.rows, values)
    }

    /// Returns a scaled copy, leaving `self` untouched.
    pub fn scale(&self, k: Value) -> Self {
        self * k
    }

    pub fn scale_in_place(&mut self, k: Value) {
        *self *= k;
    }

    pub fn map(&self, f: impl Fn(Value) -> Value) -> Self {
        Self::from_parts(
            self.rows,
            self.columns,
            self.values.iter().map(|&x| f(x)).collect(),
        )
    }

    /// Adds `vector` to every row.
    pub fn add_row_vector(&self, vector: &Vector) -> Result<Self, MatrixError> {
        if vector.len() != self.columns {
            return Err(MatrixError::DimensionMismatch {
                operation: "add_row_vector",
                left: self.shape(),
                right: (1, vector.len()),
            });
        }

        let mut result = self.clone();
        for row in result.iter_rows_mut() {
            row.iter_mut().zip(vector).for_each(|(x, b)| *x += b);
        }
        Ok(result)
    }

    pub fn column_sums(&self) -> Vector {
        self.iter_rows()
            .fold(Vector::zeros(self.columns), |mut sum, row| {
                sum.iter_mut().zip(row).for_each(|(s, x)| *s += x);
                sum
            })
    }

    pub fn sum(&self) -> Value {
        self.values.iter().sum()
    }

    /// Collects the given rows, in order, into a new matrix.
    pub fn gather_rows(&self, indices: &[usize]) -> Result<Self, MatrixError> {
        let len = checked_len(indices.len(), self.columns)?;

        let mut values = Vec::with_capacity(len);
        for &index in indices {
            values.extend_from_slice(self.row(index)?);
        }
        Ok(Self::from_parts(indices.len(), self.columns, values))
    }

    fn zip_with(
        &self,
        operation: &'static str,
        other: &Self,
        f: impl Fn(Value, Value) -> Value,
    ) -> Result<Self, MatrixError> {
        self.check_same_shape(operation, other)?;
        let values = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(&a, &b)| f(a, b))
            .collect();
        Ok(Self::from_parts(self.rows, self.columns, values))
    }

    fn check_same_shape(&self, operation: &'static str, other: &Self) -> Result<(), MatrixError> {
        if self.shape() != other.shape() {
            return Err(MatrixError::DimensionMismatch {
                operation,
                left: self.shape(),
                right: other.shape(),
            });
        }
        Ok(())
    }

    fn index_of(&self, row: usize, column: usize) -> Result<usize, MatrixError> {
        if row >= self.rows || column >= self.columns {
            return Err(self.out_of_range(row, column));
        }
        Ok(row * self.columns + column)
    }

    fn out_of_range(&self, row: usize, column: usize) -> MatrixError {
        MatrixError::IndexOutOfRange {
            row,
            column,
            shape: self.shape(),
        }
    }
}

/// The number of values in a `rows x columns` matrix, bounded by the largest possible allocation.
fn checked_len(rows: usize, columns: usize) -> Result<usize, MatrixError> {
    if rows == 0 || columns == 0 {
        return Err(MatrixError::EmptyDimension);
    }
    rows.checked_mul(columns)
        .filter(|&len| len <= isize::MAX as usize / mem::size_of::<Value>())
        .ok_or(MatrixError::TooLarge { rows, columns })
}

macro_rules! value_op_impl {
    ($op:ident, $op_method:ident, $op_assign:ident, $op_assign_method:ident) => {
        impl $op<Value> for Matrix {
            type Output = Matrix;

            fn $op_method(mut self, rhs: Value) -> Self::Output {
                self.$op_assign_method(rhs);
                self
            }
        }

        impl $op<Value> for &Matrix {
            type Output = Matrix;

            fn $op_method(self, rhs: Value) -> Self::Output {
                self.clone().$op_method(rhs)
            }
        }

        impl $op_assign<Value> for Matrix {
            fn $op_assign_method(&mut self, rhs: Value) {
                for x in self.values.iter_mut() {
                    (*x).$op_assign_method(rhs)
                }
            }
        }
    };
}

value_op_impl!(Mul, mul, MulAssign, mul_assign);
value_op_impl!(Div, div, DivAssign, div_assign);

impl Neg for Matrix {
    type Output = Matrix;

    fn neg(self) -> Self::Output {
        self * -Value::ONE
    }
}

impl Neg for &Matrix {
    type Output = Matrix;

    fn neg(self) -> Self::Output {
        self * -Value::ONE
    }
}

#[derive(Deserialize, Serialize)]
struct MatrixData {
    rows: usize,
    columns: usize,
    values: Vec<Value>,
}

impl TryFrom<MatrixData> for Matrix {
    type Error = MatrixError;

    fn try_from(data: MatrixData) -> Result<Self, Self::Error> {
        Self::from_vec(data.rows, data.columns, data.values)
    }
}

impl From<Matrix> for MatrixData {
    fn from(matrix: Matrix) -> Self {
        Self {
            rows: matrix.rows,
            columns: matrix.columns,
            values: matrix.values,
        }
    }
}

impl fmt::Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (r, row) in self.iter_rows().enumerate() {
            write!(f, "{}", if r == 0 { "[" } else { " " })?;
            for (c, value) in row.iter().enumerate() {
                write!(f, "{value:?}")?;
                if c + 1 < self.columns {
                    write!(f, " ")?;
                }
            }
            write!(f, "{}", if r + 1 < self.rows { "\n" } else { "]" })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(rows: &[&[Value]]) -> Matrix {
        Matrix::from_rows(rows).unwrap()
    }

    #[test]
    fn transpose() {
        let a = m(&[&[1.0, 2.0, 3.0, 4.0], &[5.0, 6.0, 7.0, 8.0]]);
        let b = m(&[&[1.0, 5.0], &[2.0, 6.0], &[3.0, 7.0], &[4.0, 8.0]]);
        assert_eq!(a.transpose(), b);
        assert_eq!(a.transpose().transpose(), a);
        assert_eq!(a.shape(), (2, 4));
    }

    #[test]
    fn multiply() {
        let a = m(&[&[1.0, 2.0, 3.0, 4.0], &[5.0, 6.0, 7.0, 8.0]]);
        let b = m(&[
            &[1.0, 5.0, 9.0],
            &[2.0, 6.0, 10.0],
            &[3.0, 7.0, 11.0],
            &[4.0, 8.0, 12.0],
        ]);
        let c = m(&[&[30.0, 70.0, 110.0], &[70.0, 174.0, 278.0]]);
        assert_eq!(a.multiply(&b).unwrap(), c);
    }

    #[test]
    fn multiply_identity() {
        let a = m(&[&[1.5, -2.0, 3.0], &[4.0, 0.25, -6.0]]);
        assert_eq!(a.multiply(&Matrix::identity(3).unwrap()).unwrap(), a);
        assert_eq!(Matrix::identity(2).unwrap().multiply(&a).unwrap(), a);
    }

    #[test]
    fn multiply_mismatch() {
        let a = Matrix::zeros(2, 3).unwrap();
        let b = Matrix::zeros(4, 2).unwrap();
        assert_eq!(
            a.multiply(&b),
            Err(MatrixError::DimensionMismatch {
                operation: "multiply",
                left: (2, 3),
                right: (4, 2),
            })
        );
    }

    #[test]
    fn add_commutes() {
        let a = m(&[&[1.0, 2.0], &[3.0, 4.0]]);
        let b = m(&[&[-0.5, 8.0], &[0.0, 0.25]]);
        assert_eq!(a.add(&b).unwrap(), b.add(&a).unwrap());
        assert_eq!(a.add(&b).unwrap(), m(&[&[0.5, 10.0], &[3.0, 4.25]]));
        assert!(a.add(&Matrix::zeros(2, 3).unwrap()).is_err());
    }

    #[test]
    fn element_access() {
        let mut a = Matrix::zeros(2, 3).unwrap();
        a.set(1, 2, 7.0).unwrap();
        assert_eq!(a.get(1, 2), Ok(7.0));
        assert_eq!(a.row(1).unwrap(), &[0.0, 0.0, 7.0]);
        assert_eq!(
            a.get(2, 0),
            Err(MatrixError::IndexOutOfRange {
                row: 2,
                column: 0,
                shape: (2, 3),
            })
        );
        assert!(a.set(0, 3, 1.0).is_err());
    }

    #[test]
    fn construction_errors() {
        assert_eq!(Matrix::zeros(0, 3), Err(MatrixError::EmptyDimension));
        assert_eq!(Matrix::zeros(3, 0), Err(MatrixError::EmptyDimension));
        assert!(Matrix::from_vec(2, 2, vec![1.0; 3]).is_err());
        assert!(Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]).is_err());
    }

    #[test]
    fn oversized_dimensions() {
        let too_large = Err(MatrixError::TooLarge {
            rows: usize::MAX,
            columns: 2,
        });
        assert_eq!(Matrix::from_vec(usize::MAX, 2, Vec::new()), too_large);
        assert_eq!(Matrix::zeros(usize::MAX, 2), too_large);
        assert!(matches!(
            Matrix::filled(usize::MAX, 1, 1.0),
            Err(MatrixError::TooLarge { .. })
        ));

        let json = r#"{"rows":4294967296,"columns":4294967296,"values":[]}"#;
        assert!(serde_json::from_str::<Matrix>(json).is_err());
    }

    #[test]
    fn scale_does_not_alias() {
        let a = m(&[&[1.0, -2.0]]);
        let b = a.scale(3.0);
        assert_eq!(a, m(&[&[1.0, -2.0]]));
        assert_eq!(b, m(&[&[3.0, -6.0]]));

        let mut c = a.clone();
        c.scale_in_place(0.5);
        assert_eq!(c, m(&[&[0.5, -1.0]]));
        assert_eq!(-&a, m(&[&[-1.0, 2.0]]));
    }

    #[test]
    fn broadcast_and_reduce() {
        let a = m(&[&[1.0, 2.0], &[3.0, 4.0], &[5.0, 6.0]]);
        let b = a.add_row_vector(&Vector::from([10.0, 20.0])).unwrap();
        assert_eq!(b, m(&[&[11.0, 22.0], &[13.0, 24.0], &[15.0, 26.0]]));
        assert_eq!(a.column_sums(), Vector::from([9.0, 12.0]));
        assert!(a.add_row_vector(&Vector::zeros(3)).is_err());
    }

    #[test]
    fn gather_rows() {
        let a = m(&[&[1.0, 2.0], &[3.0, 4.0], &[5.0, 6.0]]);
        assert_eq!(
            a.gather_rows(&[2, 0]).unwrap(),
            m(&[&[5.0, 6.0], &[1.0, 2.0]])
        );
        assert!(matches!(
            a.gather_rows(&[3]),
            Err(MatrixError::IndexOutOfRange { row: 3, .. })
        ));
    }

    #[test]
    fn deserialize_checks_shape() {
        let json = r#"{"rows":2,"columns":2,"values":[1.0,2.0,3.0]}"#;
        assert!(serde_json::from_str::<Matrix>(json).is_err());

        let json = r#"{"rows":1,"columns":2,"values":[1.0,2.0]}"#;
        let a: Matrix = serde_json::from_str(json).unwrap();
        assert_eq!(a, m(&[&[1.0, 2.0]]));
    }

    #[test]
    fn debug_format() {
        let a = m(&[&[1.0, 2.0], &[3.0, 4.0]]);
        assert_eq!(format!("{a:?}"), "[1.0 2.0\n 3.0 4.0]");
    }
}
