use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::linear_algebra::{Matrix, MatrixError, Value};
use crate::network::NetworkError;

/// Probabilities are clamped to this before taking their logarithm.
const MIN_PROBABILITY: Value = 1e-12;

/// The loss a network is trained against. Gradients are taken with respect to the network's
/// outputs, so parameters are updated by subtracting them.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Loss {
    #[default]
    MeanSquaredError,
    /// Categorical cross-entropy over a Softmax output layer. Its gradient is taken with
    /// respect to the Softmax pre-activation.
    CrossEntropy,
}

impl Loss {
    pub fn name(self) -> &'static str {
        match self {
            Self::MeanSquaredError => "mse",
            Self::CrossEntropy => "cross_entropy",
        }
    }

    pub fn loss(self, outputs: &Matrix, labels: &Matrix) -> Result<Value, MatrixError> {
        match self {
            Self::MeanSquaredError => mse(outputs, labels),
            Self::CrossEntropy => cross_entropy(outputs, labels),
        }
    }

    pub fn gradient(self, outputs: &Matrix, labels: &Matrix) -> Result<Matrix, MatrixError> {
        match self {
            Self::MeanSquaredError => mse_prime(outputs, labels),
            Self::CrossEntropy => softmax_cross_entropy_prime(outputs, labels),
        }
    }
}

impl fmt::Display for Loss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Loss {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mse" | "mean_squared_error" => Ok(Self::MeanSquaredError),
            "cross_entropy" => Ok(Self::CrossEntropy),
            _ => Err(NetworkError::InvalidTopology(format!(
                "unsupported loss function: {s}"
            ))),
        }
    }
}

/// Calculates the Mean Squared Error, summed over outputs and averaged over the batch.
pub fn mse(outputs: &Matrix, labels: &Matrix) -> Result<Value, MatrixError> {
    let error = labels.sub(outputs)?;
    Ok(error.values().map(|x| x * x).sum::<Value>() / outputs.rows() as Value)
}

/// Calculates the derivative of the Mean Squared Error function.
pub fn mse_prime(outputs: &Matrix, labels: &Matrix) -> Result<Matrix, MatrixError> {
    Ok(outputs.sub(labels)? * 2.0 / outputs.rows() as Value)
}

/// Calculates the categorical cross-entropy, averaged over the batch.
pub fn cross_entropy(outputs: &Matrix, labels: &Matrix) -> Result<Value, MatrixError> {
    let log_likelihood = labels.zip_map(outputs, |t, o| t * o.max(MIN_PROBABILITY).ln())?;
    Ok(-log_likelihood.sum() / outputs.rows() as Value)
}

/// The gradient of the cross-entropy with respect to the pre-activation of a Softmax layer.
pub fn softmax_cross_entropy_prime(
    outputs: &Matrix,
    labels: &Matrix,
) -> Result<Matrix, MatrixError> {
    Ok(outputs.sub(labels)? / outputs.rows() as Value)
}
