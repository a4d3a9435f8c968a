use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, trace_span};

use crate::activation::Activation;
use crate::config::TrainingConfig;
use crate::gradient_descent::{GradientDescent, SimpleGradientDescent};
use crate::layer::{Layer, LayerData, LayerGradients};
use crate::linear_algebra::{Matrix, MatrixError, Value};
use crate::loss::Loss;

#[derive(Clone, Debug, PartialEq)]
pub enum NetworkError {
    Matrix(MatrixError),
    InvalidTopology(String),
    /// A backward pass was requested without a preceding forward pass.
    MissingForwardPass,
    InvalidConfig(&'static str),
    Io(String),
    Serialization(String),
}

impl From<MatrixError> for NetworkError {
    fn from(error: MatrixError) -> Self {
        NetworkError::Matrix(error)
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Matrix(error) => write!(f, "{error}"),
            Self::InvalidTopology(reason) => write!(f, "invalid topology: {reason}"),
            Self::MissingForwardPass => write!(f, "backward pass without a forward pass"),
            Self::InvalidConfig(reason) => write!(f, "invalid training configuration: {reason}"),
            Self::Io(error) => write!(f, "i/o error: {error}"),
            Self::Serialization(error) => write!(f, "serialization error: {error}"),
        }
    }
}

impl std::error::Error for NetworkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Matrix(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LayerSpec {
    pub size: usize,
    pub activation: Activation,
}

impl LayerSpec {
    pub fn new(size: usize, activation: Activation) -> Self {
        Self { size, activation }
    }
}

/// The shape of a network: its input width, then each layer's width and activation in order.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Topology {
    pub inputs: usize,
    pub layers: Vec<LayerSpec>,
    #[serde(default)]
    pub loss: Loss,
}

impl Topology {
    pub fn validate(&self) -> Result<(), NetworkError> {
        if self.inputs == 0 {
            return Err(NetworkError::InvalidTopology(
                "input size must be at least 1".to_owned(),
            ));
        }

        if let Some(index) = self.layers.iter().position(|layer| layer.size == 0) {
            return Err(NetworkError::InvalidTopology(format!(
                "layer {index} has size 0"
            )));
        }

        check_activations(
            self.layers.iter().map(|layer| layer.activation),
            self.loss,
        )
    }
}

/// A feed-forward stack of fully connected layers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Network {
    layers: Vec<Layer>,
    loss: Loss,
}

impl Network {
    pub fn random(topology: &Topology, rng: &mut impl Rng) -> Result<Self, NetworkError> {
        topology.validate()?;

        let mut inputs = topology.inputs;
        let mut layers = Vec::with_capacity(topology.layers.len());
        for spec in &topology.layers {
            layers.push(Layer::random(inputs, spec.size, spec.activation, rng)?);
            inputs = spec.size;
        }

        let network = Self::from_layers(layers, topology.loss)?;
        debug!(
            inputs = topology.inputs,
            layers = topology.layers.len(),
            loss = %topology.loss,
            "Network created."
        );
        Ok(network)
    }

    /// Assembles a network from existing layers, checking that consecutive layers chain.
    pub fn from_layers(layers: Vec<Layer>, loss: Loss) -> Result<Self, NetworkError> {
        for (index, pair) in layers.windows(2).enumerate() {
            if pair[0].outputs() != pair[1].inputs() {
                return Err(NetworkError::InvalidTopology(format!(
                    "layer {index} has {} outputs but layer {} has {} inputs",
                    pair[0].outputs(),
                    index + 1,
                    pair[1].inputs()
                )));
            }
        }

        check_activations(layers.iter().map(Layer::activation), loss)?;

        Ok(Self { layers, loss })
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn loss_function(&self) -> Loss {
        self.loss
    }

    pub fn inputs(&self) -> usize {
        self.layers[0].inputs()
    }

    pub fn outputs(&self) -> usize {
        self.layers[self.layers.len() - 1].outputs()
    }

    pub fn topology(&self) -> Topology {
        Topology {
            inputs: self.inputs(),
            layers: self
                .layers
                .iter()
                .map(|layer| LayerSpec::new(layer.outputs(), layer.activation()))
                .collect(),
            loss: self.loss,
        }
    }

    /// Runs `inputs` through every layer. One sample per row.
    pub fn predict(&self, inputs: &Matrix) -> Result<Matrix, NetworkError> {
        self.layers
            .iter()
            .try_fold(inputs.clone(), |outputs, layer| layer.propagate(&outputs))
    }

    /// The loss of the network's predictions on a dataset.
    pub fn loss(&self, inputs: &Matrix, labels: &Matrix) -> Result<Value, NetworkError> {
        self.check_samples(inputs, labels)?;
        let outputs = self.predict(inputs)?;
        Ok(self.loss.loss(&outputs, labels)?)
    }

    /// Trains with per-sample gradient descent, visiting samples in order. Returns the mean
    /// loss of each epoch.
    pub fn train(
        &mut self,
        inputs: &Matrix,
        labels: &Matrix,
        epochs: usize,
        learning_rate: Value,
    ) -> Result<Vec<Value>, NetworkError> {
        let config = TrainingConfig {
            epochs,
            learning_rate,
            ..Default::default()
        };

        self.train_with(
            inputs,
            labels,
            &config,
            &mut SimpleGradientDescent,
            &mut rand::thread_rng(),
        )
    }

    /// Trains according to `config`. Each epoch's loss is the mean of its batch losses, each
    /// measured before that batch's update. `rng` is only used when shuffling.
    pub fn train_with(
        &mut self,
        inputs: &Matrix,
        labels: &Matrix,
        config: &TrainingConfig,
        gradient_descent: &mut impl GradientDescent,
        rng: &mut impl Rng,
    ) -> Result<Vec<Value>, NetworkError> {
        config.validate()?;
        self.check_samples(inputs, labels)?;

        let mut order: Vec<usize> = (0..inputs.rows()).collect();
        let mut losses = Vec::with_capacity(config.epochs);
        let mut t = 0;

        for epoch in 1..=config.epochs {
            if config.shuffle {
                order.shuffle(rng);
            }

            let mut loss_sum = 0.0;
            let mut batches = 0;

            for batch in order.chunks(config.batch_size) {
                t += 1;

                let batch_inputs = inputs.gather_rows(batch)?;
                let batch_labels = labels.gather_rows(batch)?;

                loss_sum += self.train_batch(
                    t,
                    &batch_inputs,
                    &batch_labels,
                    config.learning_rate,
                    config.l2_reg,
                    gradient_descent,
                )?;
                batches += 1;
            }

            let loss = loss_sum / batches as Value;
            debug!(epoch, loss, "Epoch complete.");
            losses.push(loss);
        }

        Ok(losses)
    }

    /// Runs one forward and backward pass over a batch and applies the resulting update.
    /// Returns the batch loss from before the update.
    pub fn train_batch(
        &mut self,
        t: usize,
        inputs: &Matrix,
        labels: &Matrix,
        rate: Value,
        l2_reg: Value,
        gradient_descent: &mut impl GradientDescent,
    ) -> Result<Value, NetworkError> {
        let _span = trace_span!("Network::train_batch", t, rows = inputs.rows()).entered();

        self.check_samples(inputs, labels)?;

        // Propagate forward ====================

        let outputs = self.forward(inputs)?;
        let loss = self.loss.loss(&outputs, labels)?;

        // Propagate backward ===================

        let mut output_gradients = self.loss.gradient(&outputs, labels)?;
        let mut layer_gradients = Vec::with_capacity(self.layers.len());

        for layer in self.layers.iter_mut().rev() {
            let LayerGradients {
                weights,
                biases,
                inputs,
            } = layer.gradients(&output_gradients)?;

            layer_gradients.push((weights, biases));
            output_gradients = inputs;
        }

        // Descend gradients ====================

        // Updates are staged so that a failure leaves every layer untouched.
        let mut updates = Vec::with_capacity(self.layers.len());
        let layers = self.layers.iter().enumerate();
        for ((index, layer), (weight_gradients, bias_gradients)) in
            layers.zip(layer_gradients.into_iter().rev())
        {
            let mut weights = layer.weights().clone();
            let mut biases = layer.biases().clone();
            gradient_descent.descend(
                index,
                t,
                &weight_gradients,
                &bias_gradients,
                &mut weights,
                &mut biases,
                rate,
                l2_reg,
            )?;
            updates.push((weights, biases));
        }

        for (layer, (weights, biases)) in self.layers.iter_mut().zip(updates) {
            layer.set_parameters(weights, biases);
        }

        trace!(t, loss, "Batch trained.");

        Ok(loss)
    }

    fn forward(&mut self, inputs: &Matrix) -> Result<Matrix, NetworkError> {
        self.layers
            .iter_mut()
            .try_fold(inputs.clone(), |outputs, layer| layer.forward(&outputs))
    }

    fn check_samples(&self, inputs: &Matrix, labels: &Matrix) -> Result<(), NetworkError> {
        let expected = (inputs.rows(), self.outputs());
        if inputs.columns() != self.inputs() || labels.shape() != expected {
            return Err(MatrixError::DimensionMismatch {
                operation: "Network::train",
                left: inputs.shape(),
                right: labels.shape(),
            }
            .into());
        }
        Ok(())
    }
}

fn check_activations(
    activations: impl ExactSizeIterator<Item = Activation>,
    loss: Loss,
) -> Result<(), NetworkError> {
    let count = activations.len();
    if count == 0 {
        return Err(NetworkError::InvalidTopology(
            "network must have at least one layer".to_owned(),
        ));
    }

    let mut last = Activation::Identity;
    for (index, activation) in activations.enumerate() {
        if activation == Activation::Softmax && index + 1 != count {
            return Err(NetworkError::InvalidTopology(format!(
                "softmax is only supported on the output layer, found on layer {index}"
            )));
        }
        last = activation;
    }

    match (last, loss) {
        (Activation::Softmax, Loss::CrossEntropy) => Ok(()),
        (Activation::Softmax, _) => Err(NetworkError::InvalidTopology(format!(
            "a softmax output layer requires cross-entropy loss, not {loss}"
        ))),
        (_, Loss::CrossEntropy) => Err(NetworkError::InvalidTopology(format!(
            "cross-entropy loss requires a softmax output layer, not {last}"
        ))),
        _ => Ok(()),
    }
}

/// A network as stored on disk. Validation happens outside of serde so that topology errors
/// keep their kind.
#[derive(Deserialize)]
pub(crate) struct NetworkData {
    layers: Vec<LayerData>,
    loss: Option<String>,
}

impl TryFrom<NetworkData> for Network {
    type Error = NetworkError;

    fn try_from(data: NetworkData) -> Result<Self, Self::Error> {
        let layers = data
            .layers
            .into_iter()
            .map(Layer::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let loss = match data.loss {
            Some(name) => name.parse()?,
            None => Loss::default(),
        };
        Self::from_layers(layers, loss)
    }
}
