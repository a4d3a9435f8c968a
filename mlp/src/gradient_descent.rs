use serde::{Deserialize, Serialize};

use crate::linear_algebra::{Matrix, MatrixError, Value, Vector};

/// A strategy for applying gradients to a layer's parameters.
///
/// `layer` identifies which layer of a network the parameters belong to, so that stateful
/// strategies can keep separate buffers per layer. `t` is the 1-based step count.
pub trait GradientDescent {
    #[allow(clippy::too_many_arguments)]
    fn descend(
        &mut self,
        layer: usize,
        t: usize,
        weight_gradients: &Matrix,
        bias_gradients: &Vector,
        weights: &mut Matrix,
        biases: &mut Vector,
        rate: Value,
        l2_reg: Value,
    ) -> Result<(), MatrixError>;
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Adam {
    beta1: Value,
    beta2: Value,
    epsilon: Value,
    moments: Vec<Option<AdamMoments>>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct AdamMoments {
    weight_momentum: Matrix,
    weight_rms: Matrix,
    bias_momentum: Vector,
    bias_rms: Vector,
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.9, 0.999, 1e-8)
    }
}

impl Adam {
    pub fn new(beta1: Value, beta2: Value, epsilon: Value) -> Self {
        Self {
            beta1,
            beta2,
            epsilon,
            moments: Vec::new(),
        }
    }

    /// The moments for `layer`, reset to zero if the layer's shape has changed since they were
    /// last used.
    fn moments_mut(&mut self, layer: usize, weights: &Matrix, biases: &Vector) -> &mut AdamMoments {
        if self.moments.len() <= layer {
            self.moments.resize_with(layer + 1, || None);
        }

        let slot = &mut self.moments[layer];
        let fits = slot.as_ref().map_or(false, |moments| {
            moments.weight_momentum.shape() == weights.shape()
                && moments.bias_momentum.len() == biases.len()
        });
        if !fits {
            *slot = None;
        }

        slot.get_or_insert_with(|| AdamMoments {
            weight_momentum: weights.scale(0.0),
            weight_rms: weights.scale(0.0),
            bias_momentum: Vector::zeros(biases.len()),
            bias_rms: Vector::zeros(biases.len()),
        })
    }
}

impl GradientDescent for Adam {
    fn descend(
        &mut self,
        layer: usize,
        t: usize,
        weight_gradients: &Matrix,
        bias_gradients: &Vector,
        weights: &mut Matrix,
        biases: &mut Vector,
        rate: Value,
        l2_reg: Value,
    ) -> Result<(), MatrixError> {
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let t = i32::try_from(t.max(1)).unwrap_or(i32::MAX);

        check_shapes(weight_gradients, bias_gradients, weights, biases)?;

        // L2 regularization ====================

        let weight_gradients = weight_gradients.add(&weights.scale(l2_reg))?;

        let moments = self.moments_mut(layer, weights, biases);

        // Momentum update ======================

        moments.weight_momentum = moments
            .weight_momentum
            .scale(beta1)
            .add(&weight_gradients.scale(1.0 - beta1))?;

        moments.bias_momentum = (&moments.bias_momentum * beta1).add(&(bias_gradients * (1.0 - beta1)))?;

        // RMS update ===========================

        let weight_gradients_squared = weight_gradients.map(|x| x * x);
        moments.weight_rms = moments
            .weight_rms
            .scale(beta2)
            .add(&weight_gradients_squared.scale(1.0 - beta2))?;

        let bias_gradients_squared = Vector::new(bias_gradients.iter().map(|x| x * x).collect());
        moments.bias_rms = (&moments.bias_rms * beta2).add(&(bias_gradients_squared * (1.0 - beta2)))?;

        // Correction for bias ==================

        let momentum_correction = 1.0 - beta1.powi(t);
        let rms_correction = 1.0 - beta2.powi(t);

        let step = |m: Value, v: Value| {
            rate * (m / momentum_correction) / ((v / rms_correction).sqrt() + epsilon)
        };

        // Descend gradients ====================

        let weight_steps = moments.weight_momentum.zip_map(&moments.weight_rms, step)?;
        *weights = weights.sub(&weight_steps)?;

        let bias_steps = moments.bias_momentum.zip_map(&moments.bias_rms, step)?;
        *biases = biases.sub(&bias_steps)?;

        Ok(())
    }
}

fn check_shapes(
    weight_gradients: &Matrix,
    bias_gradients: &Vector,
    weights: &Matrix,
    biases: &Vector,
) -> Result<(), MatrixError> {
    if weight_gradients.shape() != weights.shape() {
        return Err(MatrixError::DimensionMismatch {
            operation: "descend",
            left: weights.shape(),
            right: weight_gradients.shape(),
        });
    }
    if bias_gradients.len() != biases.len() {
        return Err(MatrixError::DimensionMismatch {
            operation: "descend",
            left: (1, biases.len()),
            right: (1, bias_gradients.len()),
        });
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct SimpleGradientDescent;

impl GradientDescent for SimpleGradientDescent {
    fn descend(
        &mut self,
        _layer: usize,
        _t: usize,
        weight_gradients: &Matrix,
        bias_gradients: &Vector,
        weights: &mut Matrix,
        biases: &mut Vector,
        rate: Value,
        l2_reg: Value,
    ) -> Result<(), MatrixError> {
        check_shapes(weight_gradients, bias_gradients, weights, biases)?;

        let weight_steps = weight_gradients.add(&weights.scale(l2_reg))?.scale(rate);
        *weights = weights.sub(&weight_steps)?;
        *biases = biases.sub(&(bias_gradients * rate))?;
        Ok(())
    }
}
