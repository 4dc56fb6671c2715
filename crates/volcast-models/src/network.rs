//! Feed-forward network regressor.
//!
//! Dense hidden layers with a per-layer activation and optional dropout,
//! followed by a single linear output unit. Trained with mini-batch gradient
//! descent (SGD with momentum or Adam) on MSE or MAE loss.

use crate::error::{ModelError, Result};
use crate::regressor::{Regressor, check_features, check_training_data};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Activation function of a hidden layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// Rectified linear unit
    #[default]
    Relu,
    /// Logistic sigmoid
    Sigmoid,
    /// Hyperbolic tangent
    Tanh,
    /// Identity
    Linear,
}

impl FromStr for Activation {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "relu" => Ok(Self::Relu),
            "sigmoid" => Ok(Self::Sigmoid),
            "tanh" => Ok(Self::Tanh),
            "linear" => Ok(Self::Linear),
            other => Err(ModelError::Config(format!("unknown activation '{other}'"))),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Relu => "relu",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::Linear => "linear",
        };
        f.write_str(name)
    }
}

impl Activation {
    fn apply(self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Self::Relu => z.mapv(|v| v.max(0.0)),
            Self::Sigmoid => z.mapv(|v| 1.0 / (1.0 + (-v).exp())),
            Self::Tanh => z.mapv(f64::tanh),
            Self::Linear => z.clone(),
        }
    }

    fn derivative(self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Self::Relu => z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Self::Sigmoid => z.mapv(|v| {
                let s = 1.0 / (1.0 + (-v).exp());
                s * (1.0 - s)
            }),
            Self::Tanh => z.mapv(|v| 1.0 - v.tanh().powi(2)),
            Self::Linear => Array2::ones(z.raw_dim()),
        }
    }
}

/// Training loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Loss {
    /// Mean squared error
    #[default]
    Mse,
    /// Mean absolute error
    Mae,
}

/// Gradient-descent optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Optimizer {
    /// Stochastic gradient descent with momentum
    Sgd {
        /// Step size
        learning_rate: f64,
        /// Momentum coefficient in `[0, 1)`
        momentum: f64,
    },
    /// Adam
    Adam {
        /// Step size
        learning_rate: f64,
        /// First-moment decay
        beta1: f64,
        /// Second-moment decay
        beta2: f64,
        /// Numerical stabilizer
        epsilon: f64,
    },
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::Adam {
            learning_rate: 0.01,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

impl Optimizer {
    const fn learning_rate(&self) -> f64 {
        match self {
            Self::Sgd { learning_rate, .. } | Self::Adam { learning_rate, .. } => *learning_rate,
        }
    }
}

/// One hidden layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Number of units (default: 4)
    pub neurons: usize,
    /// Activation (default: relu)
    pub activation: Activation,
    /// Dropout rate applied after the activation; 0 disables it
    pub dropout: f64,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            neurons: 4,
            activation: Activation::Relu,
            dropout: 0.0,
        }
    }
}

/// Network configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnnConfig {
    /// Hidden layers, input side first (default: two layers of 4 relu units)
    pub hidden_layers: Vec<LayerConfig>,
    /// Seed for weight initialization, shuffling and dropout (default: 42)
    pub random_seed: u64,
    /// Training loss (default: mse)
    pub loss: Loss,
    /// Optimizer (default: Adam, learning rate 0.01)
    pub optimizer: Optimizer,
    /// Passes over the training data (default: 200)
    pub epochs: usize,
    /// Rows per gradient step (default: 32)
    pub batch_size: usize,
    /// Scale inputs to zero mean and unit variance (default: true)
    pub standardize_inputs: bool,
}

impl Default for DnnConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![LayerConfig::default(); 2],
            random_seed: 42,
            loss: Loss::Mse,
            optimizer: Optimizer::default(),
            epochs: 200,
            batch_size: 32,
            standardize_inputs: true,
        }
    }
}

fn option_usize(key: &str, value: &Value) -> Result<usize> {
    value
        .as_u64()
        .map(|v| v as usize)
        .ok_or_else(|| ModelError::Config(format!("{key} must be a non-negative integer, got {value}")))
}

/// Upper bound on `hid_layers_num` in flat options.
pub const MAX_HIDDEN_LAYERS: usize = 64;

fn option_f64(key: &str, value: &Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| ModelError::Config(format!("{key} must be a number, got {value}")))
}

impl DnnConfig {
    /// Build a configuration from flat option keys.
    ///
    /// Recognized keys: `hid_layers_num` (default 2, at most
    /// [`MAX_HIDDEN_LAYERS`]), `neurons_num_layer{i}`
    /// (default 4), `activation_layer{i}` (default `relu`),
    /// `dropout_layer{i}` (default 0) for `i` in `1..=hid_layers_num`, and
    /// `random_seed` (default 42). Any other key, including a layer key beyond
    /// `hid_layers_num`, is rejected. Training options keep their defaults.
    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let n_layers = match options.get("hid_layers_num") {
            Some(value) => option_usize("hid_layers_num", value)?,
            None => 2,
        };
        if n_layers > MAX_HIDDEN_LAYERS {
            return Err(ModelError::Config(format!(
                "hid_layers_num must be at most {MAX_HIDDEN_LAYERS}, got {n_layers}"
            )));
        }
        let mut config = Self {
            hidden_layers: vec![LayerConfig::default(); n_layers],
            ..Default::default()
        };

        for (key, value) in options {
            if key == "hid_layers_num" {
                continue;
            }
            if key == "random_seed" {
                config.random_seed = option_usize(key, value)? as u64;
                continue;
            }

            let (field, layer) = ["neurons_num_layer", "activation_layer", "dropout_layer"]
                .iter()
                .find_map(|prefix| {
                    key.strip_prefix(prefix)
                        .and_then(|rest| rest.parse::<usize>().ok())
                        .map(|layer| (*prefix, layer))
                })
                .ok_or_else(|| ModelError::UnknownOption(key.clone()))?;
            if layer == 0 || layer > n_layers {
                return Err(ModelError::UnknownOption(key.clone()));
            }

            let target = &mut config.hidden_layers[layer - 1];
            match field {
                "neurons_num_layer" => target.neurons = option_usize(key, value)?,
                "activation_layer" => {
                    target.activation = value
                        .as_str()
                        .ok_or_else(|| ModelError::Config(format!("{key} must be a string")))?
                        .parse()?;
                }
                _ => target.dropout = option_f64(key, value)?,
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Check every option.
    pub fn validate(&self) -> Result<()> {
        for (i, layer) in self.hidden_layers.iter().enumerate() {
            if layer.neurons == 0 {
                return Err(ModelError::Config(format!(
                    "layer {} must have at least one neuron",
                    i + 1
                )));
            }
            if !(0.0..1.0).contains(&layer.dropout) {
                return Err(ModelError::Config(format!(
                    "layer {} dropout must be in [0, 1), got {}",
                    i + 1,
                    layer.dropout
                )));
            }
        }
        let lr = self.optimizer.learning_rate();
        if !(lr.is_finite() && lr > 0.0) {
            return Err(ModelError::Config(format!(
                "learning rate must be positive, got {lr}"
            )));
        }
        match self.optimizer {
            Optimizer::Sgd { momentum, .. } if !(0.0..1.0).contains(&momentum) => {
                return Err(ModelError::Config(format!(
                    "momentum must be in [0, 1), got {momentum}"
                )));
            }
            Optimizer::Adam { beta1, beta2, .. }
                if !(0.0..1.0).contains(&beta1) || !(0.0..1.0).contains(&beta2) =>
            {
                return Err(ModelError::Config(
                    "Adam betas must be in [0, 1)".to_string(),
                ));
            }
            _ => {}
        }
        if self.epochs == 0 {
            return Err(ModelError::Config("epochs must be positive".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ModelError::Config("batch_size must be positive".to_string()));
        }
        Ok(())
    }
}

/// Mean and standard deviation per column; zero deviations become 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Scaler {
    mean: Array1<f64>,
    std: Array1<f64>,
}

impl Scaler {
    fn fit(x: &Array2<f64>) -> Self {
        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let std = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 1e-12 { s } else { 1.0 });
        Self { mean, std }
    }

    fn identity(n: usize) -> Self {
        Self {
            mean: Array1::zeros(n),
            std: Array1::ones(n),
        }
    }

    fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean) / &self.std
    }
}

/// Optimizer state for one parameter tensor.
#[derive(Debug, Clone)]
struct Moments<D: ndarray::Dimension> {
    first: ndarray::Array<f64, D>,
    second: ndarray::Array<f64, D>,
}

impl<D: ndarray::Dimension> Moments<D> {
    fn zeros(shape: D) -> Self {
        Self {
            first: ndarray::Array::zeros(shape.clone()),
            second: ndarray::Array::zeros(shape),
        }
    }

    /// Apply one update to `param` from `grad`; `step` is 1-based.
    fn update(
        &mut self,
        param: &mut ndarray::Array<f64, D>,
        grad: &ndarray::Array<f64, D>,
        optimizer: &Optimizer,
        step: i32,
    ) {
        match *optimizer {
            Optimizer::Sgd {
                learning_rate,
                momentum,
            } => {
                self.first = &self.first * momentum - grad * learning_rate;
                *param += &self.first;
            }
            Optimizer::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => {
                self.first = &self.first * beta1 + grad * (1.0 - beta1);
                self.second = &self.second * beta2 + &grad.mapv(|g| g * g) * (1.0 - beta2);
                let m_hat = &self.first / (1.0 - beta1.powi(step));
                let v_hat = &self.second / (1.0 - beta2.powi(step));
                *param -= &(m_hat / (v_hat.mapv(f64::sqrt) + epsilon) * learning_rate);
            }
        }
    }
}

/// Feed-forward network regressor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedForwardNetwork {
    config: DnnConfig,
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    scaler: Option<Scaler>,
    target_mean: f64,
    target_std: f64,
    final_loss: Option<f64>,
}

/// Activations of one forward pass.
struct Pass {
    /// Layer inputs: the network input, then each hidden layer's output
    inputs: Vec<Array2<f64>>,
    /// Pre-activations of the hidden layers
    z: Vec<Array2<f64>>,
    /// Dropout masks (scaled), one per hidden layer
    masks: Vec<Option<Array2<f64>>>,
    output: Array1<f64>,
}

impl Default for FeedForwardNetwork {
    fn default() -> Self {
        Self::new(DnnConfig::default())
    }
}

impl FeedForwardNetwork {
    /// Create an unfitted network.
    pub const fn new(config: DnnConfig) -> Self {
        Self {
            config,
            weights: Vec::new(),
            biases: Vec::new(),
            scaler: None,
            target_mean: 0.0,
            target_std: 1.0,
            final_loss: None,
        }
    }

    /// Get the configuration.
    pub const fn config(&self) -> &DnnConfig {
        &self.config
    }

    /// Training loss (in standardized target units) after the last epoch.
    pub const fn final_loss(&self) -> Option<f64> {
        self.final_loss
    }

    fn initialize(&mut self, n_features: usize, rng: &mut StdRng) {
        let mut sizes = vec![n_features];
        sizes.extend(self.config.hidden_layers.iter().map(|l| l.neurons));
        sizes.push(1);

        self.weights.clear();
        self.biases.clear();
        for pair in sizes.windows(2) {
            let (n_in, n_out) = (pair[0], pair[1]);
            // Glorot uniform
            let limit = (6.0 / (n_in + n_out) as f64).sqrt();
            self.weights.push(Array2::from_shape_fn((n_in, n_out), |_| {
                rng.gen_range(-limit..limit)
            }));
            self.biases.push(Array1::zeros(n_out));
        }
    }

    fn forward(&self, x: &Array2<f64>, mut rng: Option<&mut StdRng>) -> Pass {
        let n_hidden = self.config.hidden_layers.len();
        let mut inputs = vec![x.clone()];
        let mut z_values = Vec::with_capacity(n_hidden);
        let mut masks = Vec::with_capacity(n_hidden);

        for (i, layer) in self.config.hidden_layers.iter().enumerate() {
            let z = inputs[i].dot(&self.weights[i]) + &self.biases[i];
            let mut a = layer.activation.apply(&z);

            let mask = match rng.as_deref_mut() {
                Some(rng) if layer.dropout > 0.0 => {
                    let keep = 1.0 - layer.dropout;
                    let mask = Array2::from_shape_fn(a.raw_dim(), |_| {
                        if rng.gen_bool(keep) { 1.0 / keep } else { 0.0 }
                    });
                    a *= &mask;
                    Some(mask)
                }
                _ => None,
            };

            z_values.push(z);
            masks.push(mask);
            inputs.push(a);
        }

        let output = (inputs[n_hidden].dot(&self.weights[n_hidden]) + &self.biases[n_hidden])
            .column(0)
            .to_owned();
        Pass {
            inputs,
            z: z_values,
            masks,
            output,
        }
    }

    fn loss(&self, pred: &Array1<f64>, y: &Array1<f64>) -> f64 {
        let diff = pred - y;
        match self.config.loss {
            Loss::Mse => diff.mapv(|d| d * d).mean().unwrap_or(0.0),
            Loss::Mae => diff.mapv(f64::abs).mean().unwrap_or(0.0),
        }
    }

    fn gradients(&self, pass: &Pass, y: &Array1<f64>) -> Vec<(Array2<f64>, Array1<f64>)> {
        let n = y.len() as f64;
        let diff = &pass.output - y;
        let output_grad = match self.config.loss {
            Loss::Mse => diff * (2.0 / n),
            Loss::Mae => diff.mapv(f64::signum) / n,
        };

        let mut delta = output_grad.insert_axis(Axis(1));
        let mut grads = Vec::with_capacity(self.weights.len());
        for i in (0..self.weights.len()).rev() {
            grads.push((pass.inputs[i].t().dot(&delta), delta.sum_axis(Axis(0))));
            if i > 0 {
                let layer = &self.config.hidden_layers[i - 1];
                let mut next = delta.dot(&self.weights[i].t()) * layer.activation.derivative(&pass.z[i - 1]);
                if let Some(mask) = &pass.masks[i - 1] {
                    next *= mask;
                }
                delta = next;
            }
        }
        grads.reverse();
        grads
    }
}

impl Regressor for FeedForwardNetwork {
    fn name(&self) -> &str {
        "network"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.config.validate()?;
        check_training_data(x, y)?;

        let mut rng = StdRng::seed_from_u64(self.config.random_seed);
        self.initialize(x.ncols(), &mut rng);

        let scaler = if self.config.standardize_inputs {
            Scaler::fit(x)
        } else {
            Scaler::identity(x.ncols())
        };
        let x_scaled = scaler.transform(x);
        self.scaler = Some(scaler);

        // The target is always scaled for training and mapped back on predict
        self.target_mean = y.mean().unwrap_or(0.0);
        let target_std = y.std(0.0);
        self.target_std = if target_std > 1e-12 { target_std } else { 1.0 };
        let y_scaled = y.mapv(|v| (v - self.target_mean) / self.target_std);

        let mut weight_moments: Vec<Moments<ndarray::Ix2>> =
            self.weights.iter().map(|w| Moments::zeros(w.raw_dim())).collect();
        let mut bias_moments: Vec<Moments<ndarray::Ix1>> =
            self.biases.iter().map(|b| Moments::zeros(b.raw_dim())).collect();

        let n = x.nrows();
        let optimizer = self.config.optimizer;
        let mut indices: Vec<usize> = (0..n).collect();
        let mut step = 0i32;

        for epoch in 0..self.config.epochs {
            indices.shuffle(&mut rng);
            for batch in indices.chunks(self.config.batch_size) {
                let x_batch = x_scaled.select(Axis(0), batch);
                let y_batch = y_scaled.select(Axis(0), batch);

                let pass = self.forward(&x_batch, Some(&mut rng));
                let grads = self.gradients(&pass, &y_batch);

                step = step.saturating_add(1);
                for (i, (grad_w, grad_b)) in grads.into_iter().enumerate() {
                    weight_moments[i].update(&mut self.weights[i], &grad_w, &optimizer, step);
                    bias_moments[i].update(&mut self.biases[i], &grad_b, &optimizer, step);
                }
            }

            if epoch + 1 == self.config.epochs {
                let pass = self.forward(&x_scaled, None);
                let loss = self.loss(&pass.output, &y_scaled);
                self.final_loss = Some(loss);
                tracing::debug!(epochs = self.config.epochs, loss, "network trained");
            }
        }
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let scaler = self.scaler.as_ref().ok_or(ModelError::NotFitted)?;
        check_features(x, scaler.mean.len())?;
        let pass = self.forward(&scaler.transform(x), None);
        Ok(pass.output.mapv(|v| v * self.target_std + self.target_mean))
    }

    fn is_fitted(&self) -> bool {
        self.scaler.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rstest::rstest;
    use serde_json::json;

    fn options(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_default_options() {
        let config = DnnConfig::from_options(&Map::new()).unwrap();
        assert_eq!(config.hidden_layers.len(), 2);
        assert!(config.hidden_layers.iter().all(|l| l.neurons == 4
            && l.activation == Activation::Relu
            && l.dropout == 0.0));
        assert_eq!(config.random_seed, 42);
    }

    #[test]
    fn test_layer_options() {
        let config = DnnConfig::from_options(&options(json!({
            "hid_layers_num": 3,
            "neurons_num_layer2": 16,
            "activation_layer3": "tanh",
            "dropout_layer1": 0.2,
            "random_seed": 7
        })))
        .unwrap();
        assert_eq!(config.hidden_layers.len(), 3);
        assert_eq!(config.hidden_layers[1].neurons, 16);
        assert_eq!(config.hidden_layers[2].activation, Activation::Tanh);
        assert_eq!(config.hidden_layers[0].dropout, 0.2);
        assert_eq!(config.random_seed, 7);
    }

    #[rstest]
    #[case(json!({"learning_rate": 0.1}))]
    #[case(json!({"neurons_num_layer3": 8}))]
    #[case(json!({"hid_layers_num": 1, "dropout_layer2": 0.1}))]
    #[case(json!({"neurons_num_layer0": 8}))]
    fn test_unknown_options_rejected(#[case] raw: Value) {
        assert!(matches!(
            DnnConfig::from_options(&options(raw)),
            Err(ModelError::UnknownOption(_))
        ));
    }

    #[rstest]
    #[case(json!({"neurons_num_layer1": 0}))]
    #[case(json!({"dropout_layer1": 1.0}))]
    #[case(json!({"activation_layer1": "softmax"}))]
    #[case(json!({"hid_layers_num": -1}))]
    #[case(json!({"hid_layers_num": 65}))]
    #[case(json!({"hid_layers_num": 1_000_000_000u64}))]
    fn test_invalid_values_rejected(#[case] raw: Value) {
        assert!(matches!(
            DnnConfig::from_options(&options(raw)),
            Err(ModelError::Config(_))
        ));
    }

    #[test]
    fn test_validate_training_options() {
        let config = DnnConfig {
            epochs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = DnnConfig {
            optimizer: Optimizer::Sgd {
                learning_rate: 0.0,
                momentum: 0.9,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    fn linear_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((64, 2), |(i, j)| ((i * (j + 3)) % 17) as f64);
        let y = x.column(0).mapv(|v| 2.0 * v) + x.column(1).mapv(|v| -v) + 5.0;
        (x, y)
    }

    #[rstest]
    #[case(Optimizer::default(), Loss::Mse)]
    #[case(Optimizer::Sgd { learning_rate: 0.01, momentum: 0.9 }, Loss::Mse)]
    #[case(Optimizer::default(), Loss::Mae)]
    fn test_network_fits_linear_target(#[case] optimizer: Optimizer, #[case] loss: Loss) {
        let (x, y) = linear_data();
        let mut model = FeedForwardNetwork::new(DnnConfig {
            hidden_layers: vec![LayerConfig {
                neurons: 8,
                activation: Activation::Linear,
                dropout: 0.0,
            }],
            optimizer,
            loss,
            epochs: 300,
            batch_size: 16,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();

        let pred = model.predict(&x).unwrap();
        let mae = (&pred - &y).mapv(f64::abs).mean().unwrap();
        let spread = (&y - y.mean().unwrap()).mapv(f64::abs).mean().unwrap();
        assert!(mae < 0.2 * spread, "mae {mae} vs spread {spread}");
    }

    #[test]
    fn test_dropout_training_is_deterministic() {
        let (x, y) = linear_data();
        let config = DnnConfig {
            hidden_layers: vec![LayerConfig {
                neurons: 6,
                activation: Activation::Sigmoid,
                dropout: 0.3,
            }],
            epochs: 20,
            ..Default::default()
        };
        let mut a = FeedForwardNetwork::new(config.clone());
        let mut b = FeedForwardNetwork::new(config);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
        assert!(a.final_loss().is_some());
    }

    #[test]
    fn test_predict_before_fit() {
        let model = FeedForwardNetwork::default();
        assert!(matches!(
            model.predict(&array![[1.0, 2.0]]),
            Err(ModelError::NotFitted)
        ));
    }
}
