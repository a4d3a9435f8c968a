use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::trace_span;

use crate::activation::Activation;
use crate::gradient_descent::{GradientDescent, SimpleGradientDescent};
use crate::linear_algebra::{Matrix, MatrixError, Value, Vector};
use crate::network::NetworkError;

/// A fully connected layer followed by an activation function.
///
/// `weights` is `inputs x outputs`, so a batch of row-major samples propagates
/// as `inputs · weights + biases`.
#[derive(Clone, Debug, Serialize)]
pub struct Layer {
    weights: Matrix,
    biases: Vector,
    activation: Activation,
    #[serde(skip_serializing)]
    cache: Option<LayerCache>,
}

/// Values from the most recent forward pass, consumed by the next backward pass.
#[derive(Clone, Debug)]
struct LayerCache {
    inputs: Matrix,
    pre_activation: Matrix,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayerGradients {
    pub weights: Matrix,
    pub biases: Vector,
    /// The gradient with respect to this layer's inputs, to be passed to the previous layer.
    pub inputs: Matrix,
}

impl Layer {
    pub fn new(weights: Matrix, biases: Vector, activation: Activation) -> Result<Self, NetworkError> {
        if biases.len() != weights.columns() {
            return Err(NetworkError::InvalidTopology(format!(
                "layer has {} outputs but {} biases",
                weights.columns(),
                biases.len()
            )));
        }

        Ok(Self {
            weights,
            biases,
            activation,
            cache: None,
        })
    }

    pub fn random(
        inputs: usize,
        outputs: usize,
        activation: Activation,
        rng: &mut impl Rng,
    ) -> Result<Self, NetworkError> {
        if inputs == 0 || outputs == 0 {
            return Err(NetworkError::InvalidTopology(format!(
                "layer sizes must be at least 1, got {inputs} inputs and {outputs} outputs"
            )));
        }

        let mut weights = Matrix::zeros(inputs, outputs)?;

        match activation {
            Activation::Relu => {
                // He initialization.
                let deviation = (2.0 / inputs as Value).sqrt();
                weights
                    .values_mut()
                    .for_each(|x| *x = rng.sample::<Value, _>(StandardNormal) * deviation);
            }
            _ => {
                // Glorot initialization.
                let range = 6.0f64.sqrt() / (inputs as Value + outputs as Value).sqrt();
                let uniform_distribution = Uniform::new(-range, range);
                weights
                    .values_mut()
                    .for_each(|x| *x = uniform_distribution.sample(rng));
            }
        }

        Self::new(weights, Vector::zeros(outputs), activation)
    }

    pub fn inputs(&self) -> usize {
        self.weights.rows()
    }

    pub fn outputs(&self) -> usize {
        self.weights.columns()
    }

    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    pub fn biases(&self) -> &Vector {
        &self.biases
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Whether a forward pass is cached and waiting for its backward pass.
    pub fn is_primed(&self) -> bool {
        self.cache.is_some()
    }

    /// Replaces the parameters with ones of the same shape.
    pub(crate) fn set_parameters(&mut self, weights: Matrix, biases: Vector) {
        debug_assert_eq!(weights.shape(), self.weights.shape());
        debug_assert_eq!(biases.len(), self.biases.len());
        self.weights = weights;
        self.biases = biases;
    }

    /// Computes the outputs for `inputs` without touching the cache.
    pub fn propagate(&self, inputs: &Matrix) -> Result<Matrix, NetworkError> {
        let mut outputs = self.fully_connected(inputs)?;
        self.activation.activate(&mut outputs);
        Ok(outputs)
    }

    /// Computes the outputs for `inputs`, caching what the backward pass needs.
    pub fn forward(&mut self, inputs: &Matrix) -> Result<Matrix, NetworkError> {
        let _span = trace_span!("Layer::forward", rows = inputs.rows()).entered();

        let pre_activation = self.fully_connected(inputs)?;

        let mut outputs = pre_activation.clone();
        self.activation.activate(&mut outputs);

        self.cache = Some(LayerCache {
            inputs: inputs.clone(),
            pre_activation,
        });

        Ok(outputs)
    }

    /// Computes the gradients of this layer from the gradient of its outputs, consuming the
    /// cached forward pass. The weights are not modified.
    pub fn gradients(&mut self, output_gradients: &Matrix) -> Result<LayerGradients, NetworkError> {
        let _span = trace_span!("Layer::gradients", rows = output_gradients.rows()).entered();

        let cache = self.cache.as_ref().ok_or(NetworkError::MissingForwardPass)?;

        if output_gradients.shape() != cache.pre_activation.shape() {
            return Err(MatrixError::DimensionMismatch {
                operation: "Layer::gradients",
                left: cache.pre_activation.shape(),
                right: output_gradients.shape(),
            }
            .into());
        }

        let activation = self.activation;
        let derivatives = cache.pre_activation.map(|x| activation.derivative(x));
        let fully_connected_gradients = output_gradients.hadamard(&derivatives)?;

        let weight_gradients = cache
            .inputs
            .transpose()
            .multiply(&fully_connected_gradients)?;
        let bias_gradients = fully_connected_gradients.column_sums();
        let input_gradients = fully_connected_gradients.multiply(&self.weights.transpose())?;

        self.cache = None;

        Ok(LayerGradients {
            weights: weight_gradients,
            biases: bias_gradients,
            inputs: input_gradients,
        })
    }

    /// Backpropagates `output_gradients` and takes a plain gradient-descent step. Returns the
    /// gradient with respect to the inputs, computed from the weights before the update.
    pub fn backward(
        &mut self,
        output_gradients: &Matrix,
        learning_rate: Value,
    ) -> Result<Matrix, NetworkError> {
        let gradients = self.gradients(output_gradients)?;

        SimpleGradientDescent.descend(
            0,
            1,
            &gradients.weights,
            &gradients.biases,
            &mut self.weights,
            &mut self.biases,
            learning_rate,
            0.0,
        )?;

        Ok(gradients.inputs)
    }

    fn fully_connected(&self, inputs: &Matrix) -> Result<Matrix, NetworkError> {
        if inputs.columns() != self.inputs() {
            return Err(MatrixError::DimensionMismatch {
                operation: "Layer::forward",
                left: inputs.shape(),
                right: self.weights.shape(),
            }
            .into());
        }

        Ok(inputs.multiply(&self.weights)?.add_row_vector(&self.biases)?)
    }
}

impl PartialEq for Layer {
    fn eq(&self, other: &Self) -> bool {
        self.weights == other.weights
            && self.biases == other.biases
            && self.activation == other.activation
    }
}

/// A layer as stored on disk, before its shape and activation are checked.
#[derive(Deserialize)]
pub(crate) struct LayerData {
    weights: Matrix,
    biases: Vector,
    activation: String,
}

impl TryFrom<LayerData> for Layer {
    type Error = NetworkError;

    fn try_from(data: LayerData) -> Result<Self, Self::Error> {
        Self::new(data.weights, data.biases, data.activation.parse()?)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn test_layer(activation: Activation) -> Layer {
        let weights = Matrix::from_rows(&[[0.5, -1.0, 0.25], [1.5, 0.75, -0.5]]).unwrap();
        Layer::new(weights, Vector::from([0.1, -0.2, 0.3]), activation).unwrap()
    }

    fn test_inputs() -> Matrix {
        Matrix::from_rows(&[[1.0, 2.0], [-0.5, 0.25], [0.0, -1.0]]).unwrap()
    }

    #[test]
    fn forward_identity() {
        let mut layer = test_layer(Activation::Identity);
        let outputs = layer.forward(&Matrix::from_rows(&[[1.0, 2.0]]).unwrap()).unwrap();
        let expected = Matrix::from_rows(&[[3.6, 0.3, -0.45]]).unwrap();
        assert!(outputs.sub(&expected).unwrap().values().all(|x| x.abs() < 1e-12));
        assert!(layer.is_primed());
    }

    #[test]
    fn propagate_matches_forward() {
        let mut layer = test_layer(Activation::Tanh);
        let propagated = layer.propagate(&test_inputs()).unwrap();
        assert!(!layer.is_primed());
        assert_eq!(layer.forward(&test_inputs()).unwrap(), propagated);
    }

    #[test]
    fn forward_rejects_wrong_input_width() {
        let mut layer = test_layer(Activation::Sigmoid);
        let result = layer.forward(&Matrix::zeros(2, 3).unwrap());
        assert!(matches!(
            result,
            Err(NetworkError::Matrix(MatrixError::DimensionMismatch { .. }))
        ));
    }

    #[test]
    fn backward_requires_forward() {
        let mut layer = test_layer(Activation::Sigmoid);
        let gradients = Matrix::ones(3, 3).unwrap();
        assert_eq!(
            layer.backward(&gradients, 0.1),
            Err(NetworkError::MissingForwardPass)
        );

        layer.forward(&test_inputs()).unwrap();
        assert!(layer.backward(&gradients, 0.1).is_ok());
        // The cache is consumed by the first backward pass.
        assert_eq!(
            layer.backward(&gradients, 0.1),
            Err(NetworkError::MissingForwardPass)
        );
    }

    #[test]
    fn backward_rejects_wrong_gradient_shape() {
        let mut layer = test_layer(Activation::Sigmoid);
        layer.forward(&test_inputs()).unwrap();
        assert!(layer.backward(&Matrix::ones(3, 2).unwrap(), 0.1).is_err());
        // A rejected gradient leaves the cache in place.
        assert!(layer.is_primed());
    }

    #[test]
    fn mismatched_biases() {
        let weights = Matrix::zeros(2, 3).unwrap();
        assert!(matches!(
            Layer::new(weights, Vector::zeros(2), Activation::Relu),
            Err(NetworkError::InvalidTopology(_))
        ));
    }

    #[test]
    fn zero_learning_rate_keeps_weights() {
        let mut layer = test_layer(Activation::Relu);
        layer.forward(&test_inputs()).unwrap();
        layer.backward(&Matrix::ones(3, 3).unwrap(), 0.0).unwrap();
        assert_eq!(layer, test_layer(Activation::Relu));
    }

    #[test]
    fn backward_descends() {
        let mut layer = test_layer(Activation::Identity);
        layer.forward(&test_inputs()).unwrap();
        let gradients = layer.clone().gradients(&Matrix::ones(3, 3).unwrap()).unwrap();
        let input_gradients = layer.backward(&Matrix::ones(3, 3).unwrap(), 0.5).unwrap();

        let original = test_layer(Activation::Identity);
        let expected_weights = original.weights.sub(&gradients.weights.scale(0.5)).unwrap();
        assert_eq!(layer.weights, expected_weights);
        assert_eq!(
            layer.biases,
            original.biases.sub(&(&gradients.biases * 0.5)).unwrap()
        );
        // Input gradients use the weights from before the update.
        assert_eq!(input_gradients, gradients.inputs);
        assert_eq!(
            input_gradients,
            Matrix::ones(3, 3).unwrap().multiply(&original.weights.transpose()).unwrap()
        );
    }

    // Checks the analytic gradients of L = sum(outputs ⊙ G) against central differences.
    #[test]
    fn gradients_match_finite_differences() {
        let g = Matrix::from_rows(&[[0.3, -1.2, 0.5], [1.0, 0.1, -0.4], [-0.7, 0.9, 0.2]]).unwrap();
        let inputs = test_inputs();
        let h = 1e-6;

        for activation in [Activation::Sigmoid, Activation::Tanh, Activation::Identity] {
            let layer = test_layer(activation);
            let objective = |layer: &Layer, inputs: &Matrix| {
                layer.propagate(inputs).unwrap().hadamard(&g).unwrap().sum()
            };

            let mut primed = layer.clone();
            primed.forward(&inputs).unwrap();
            let gradients = primed.gradients(&g).unwrap();

            for row in 0..layer.inputs() {
                for column in 0..layer.outputs() {
                    let w = layer.weights.get(row, column).unwrap();
                    let mut plus = layer.clone();
                    plus.weights.set(row, column, w + h).unwrap();
                    let mut minus = layer.clone();
                    minus.weights.set(row, column, w - h).unwrap();

                    let numeric = (objective(&plus, &inputs) - objective(&minus, &inputs)) / (2.0 * h);
                    let analytic = gradients.weights.get(row, column).unwrap();
                    assert!((numeric - analytic).abs() < 1e-6, "{activation} weight ({row}, {column})");
                }
            }

            for column in 0..layer.outputs() {
                let mut plus = layer.clone();
                plus.biases[column] += h;
                let mut minus = layer.clone();
                minus.biases[column] -= h;

                let numeric = (objective(&plus, &inputs) - objective(&minus, &inputs)) / (2.0 * h);
                assert!((numeric - gradients.biases[column]).abs() < 1e-6, "{activation} bias {column}");
            }

            for row in 0..inputs.rows() {
                for column in 0..inputs.columns() {
                    let x = inputs.get(row, column).unwrap();
                    let mut plus = inputs.clone();
                    plus.set(row, column, x + h).unwrap();
                    let mut minus = inputs.clone();
                    minus.set(row, column, x - h).unwrap();

                    let numeric = (objective(&layer, &plus) - objective(&layer, &minus)) / (2.0 * h);
                    let analytic = gradients.inputs.get(row, column).unwrap();
                    assert!((numeric - analytic).abs() < 1e-6, "{activation} input ({row}, {column})");
                }
            }
        }
    }

    #[test]
    fn random_initialization() {
        let mut rng = StdRng::seed_from_u64(7);

        let layer = Layer::random(4, 6, Activation::Sigmoid, &mut rng).unwrap();
        let range = 6.0f64.sqrt() / 10.0f64.sqrt();
        assert_eq!(layer.weights.shape(), (4, 6));
        assert!(layer.weights.values().all(|x| x.abs() <= range));
        assert_eq!(layer.biases, Vector::zeros(6));

        let layer = Layer::random(8, 3, Activation::Relu, &mut rng).unwrap();
        assert!(layer.weights.values().any(|&x| x != 0.0));

        assert!(Layer::random(0, 3, Activation::Relu, &mut rng).is_err());
        assert!(Layer::random(3, 0, Activation::Relu, &mut rng).is_err());
    }
}
