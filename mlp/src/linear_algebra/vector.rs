use std::fmt;
use std::ops::{Deref, DerefMut, Div, DivAssign, Mul, MulAssign, Neg};

use serde::{Deserialize, Serialize};

use super::{MatrixError, Value, ValueType};

#[derive(Clone, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Vector(Vec<Value>);

impl Vector {
    pub fn zeros(len: usize) -> Self {
        Self(vec![Value::ZERO; len])
    }

    pub fn ones(len: usize) -> Self {
        Self(vec![Value::ONE; len])
    }

    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn add(&self, b: &Self) -> Result<Self, MatrixError> {
        self.check_len("add", b)?;
        Ok(self.zip_with(b, |a, b| a + b))
    }

    pub fn sub(&self, b: &Self) -> Result<Self, MatrixError> {
        self.check_len("sub", b)?;
        Ok(self.zip_with(b, |a, b| a - b))
    }

    pub fn zip_map(
        &self,
        b: &Self,
        f: impl Fn(Value, Value) -> Value,
    ) -> Result<Self, MatrixError> {
        self.check_len("zip_map", b)?;
        Ok(self.zip_with(b, f))
    }

    pub fn sum(&self) -> Value {
        self.iter().sum()
    }

    fn zip_with(&self, b: &Self, f: impl Fn(Value, Value) -> Value) -> Self {
        Self(self.iter().zip(b.iter()).map(|(&a, &b)| f(a, b)).collect())
    }

    fn check_len(&self, operation: &'static str, b: &Self) -> Result<(), MatrixError> {
        if self.len() != b.len() {
            return Err(MatrixError::DimensionMismatch {
                operation,
                left: (1, self.len()),
                right: (1, b.len()),
            });
        }
        Ok(())
    }
}

macro_rules! value_op_impl {
    ($op:ident, $op_method:ident, $op_assign:ident, $op_assign_method:ident) => {
        impl $op<Value> for Vector {
            type Output = Vector;

            fn $op_method(mut self, rhs: Value) -> Self::Output {
                self.$op_assign_method(rhs);
                self
            }
        }

        impl $op<Value> for &Vector {
            type Output = Vector;

            fn $op_method(self, rhs: Value) -> Self::Output {
                self.clone().$op_method(rhs)
            }
        }

        impl $op_assign<Value> for Vector {
            fn $op_assign_method(&mut self, rhs: Value) {
                for r in self.iter_mut() {
                    (*r).$op_assign_method(rhs)
                }
            }
        }
    };
}

value_op_impl!(Mul, mul, MulAssign, mul_assign);
value_op_impl!(Div, div, DivAssign, div_assign);

impl Neg for Vector {
    type Output = Vector;

    fn neg(self) -> Self::Output {
        self * -Value::ONE
    }
}

impl Neg for &Vector {
    type Output = Vector;

    fn neg(self) -> Self::Output {
        self * -Value::ONE
    }
}

impl Deref for Vector {
    type Target = [Value];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Vector {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<Value>> for Vector {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl<const N: usize> From<[Value; N]> for Vector {
    fn from(values: [Value; N]) -> Self {
        Self(values.to_vec())
    }
}

impl<'a> IntoIterator for &'a Vector {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a> IntoIterator for &'a mut Vector {
    type Item = &'a mut Value;
    type IntoIter = std::slice::IterMut<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl fmt::Debug for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (x, value) in self.iter().enumerate() {
            write!(f, "{value:?}")?;
            if x + 1 < self.len() {
                write!(f, " ")?;
            }
        }
        write!(f, "]")
    }
}
