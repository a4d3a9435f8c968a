use serde::{Deserialize, Serialize};

use crate::linear_algebra::Value;
use crate::network::NetworkError;

/// Parameters for [`Network::train_with`](crate::Network::train_with).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: Value,
    /// Samples per gradient update. 1 updates after every sample.
    pub batch_size: usize,
    pub l2_reg: Value,
    /// Reorder the samples at the start of every epoch.
    pub shuffle: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 1000,
            learning_rate: 0.01,
            batch_size: 1,
            l2_reg: 0.0,
            shuffle: false,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), NetworkError> {
        if self.batch_size == 0 {
            return Err(NetworkError::InvalidConfig("batch size must be at least 1"));
        }

        if !self.learning_rate.is_finite() || self.learning_rate < 0.0 {
            return Err(NetworkError::InvalidConfig(
                "learning rate must be finite and non-negative",
            ));
        }

        if !self.l2_reg.is_finite() || self.l2_reg < 0.0 {
            return Err(NetworkError::InvalidConfig(
                "l2 regularization must be finite and non-negative",
            ));
        }

        Ok(())
    }
}
