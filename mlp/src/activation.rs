use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::linear_algebra::{Matrix, Value};
use crate::network::NetworkError;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Identity,
    Sigmoid,
    Relu,
    Tanh,
    /// Row-wise normalization into a probability distribution. Only valid on the
    /// output layer of a network trained with cross-entropy.
    Softmax,
}

impl Activation {
    pub const ALL: [Activation; 5] = [
        Activation::Identity,
        Activation::Sigmoid,
        Activation::Relu,
        Activation::Tanh,
        Activation::Softmax,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Sigmoid => "sigmoid",
            Self::Relu => "relu",
            Self::Tanh => "tanh",
            Self::Softmax => "softmax",
        }
    }

    pub fn activate(self, matrix: &mut Matrix) {
        match self {
            Self::Identity => {}
            Self::Sigmoid => matrix.values_mut().for_each(|x| *x = sigmoid(*x)),
            Self::Relu => matrix.values_mut().for_each(|x| *x = relu(*x)),
            Self::Tanh => matrix.values_mut().for_each(|x| *x = tanh(*x)),
            Self::Softmax => matrix.iter_rows_mut().for_each(softmax),
        }
    }

    /// The derivative at the pre-activation value `x`.
    ///
    /// Softmax reports 1 here: its gradient is folded into the cross-entropy
    /// loss gradient, which is already taken with respect to the pre-activation.
    pub fn derivative(self, x: Value) -> Value {
        match self {
            Self::Identity | Self::Softmax => 1.0,
            Self::Sigmoid => sigmoid_prime(x),
            Self::Relu => relu_prime(x),
            Self::Tanh => tanh_prime(x),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Activation {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "identity" | "linear" => Ok(Self::Identity),
            "sigmoid" => Ok(Self::Sigmoid),
            "relu" => Ok(Self::Relu),
            "tanh" => Ok(Self::Tanh),
            "softmax" => Ok(Self::Softmax),
            _ => Err(NetworkError::InvalidTopology(format!(
                "unsupported activation function: {s}"
            ))),
        }
    }
}

pub fn sigmoid(x: Value) -> Value {
    1.0 / (1.0 + (-x).exp())
}

pub fn sigmoid_prime(x: Value) -> Value {
    let s = sigmoid(x);
    s * (1.0 - s)
}

pub fn relu(x: Value) -> Value {
    x.max(0.0)
}

pub fn relu_prime(x: Value) -> Value {
    match x > 0.0 {
        true => 1.0,
        false => 0.0,
    }
}

pub fn tanh(x: Value) -> Value {
    x.tanh()
}

pub fn tanh_prime(x: Value) -> Value {
    let x_tanh = x.tanh();
    1.0 - x_tanh * x_tanh
}

fn softmax(row: &mut [Value]) {
    // Shift by the maximum so exp() cannot overflow.
    let max = row.iter().copied().fold(Value::NEG_INFINITY, Value::max);

    let mut sum = 0.0;
    for x in row.iter_mut() {
        *x = (*x - max).exp();
        sum += *x;
    }

    row.iter_mut().for_each(|x| *x /= sum);
}
