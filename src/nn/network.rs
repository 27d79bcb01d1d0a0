//! Shared residual policy/value network.
//!
//! One convolutional trunk feeds a policy head per [`GameKind`] and a single
//! value head. Training runs on `Autodiff<NdArray>`; search and evaluation
//! use plain `NdArray` snapshots taken with `valid()`.

use burn::backend::{Autodiff, NdArray};
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d};
use burn::tensor::activation::{relu, softmax, tanh};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use serde::{Deserialize, Serialize};

use super::traits::{EncodedState, Evaluator, Prediction};
use crate::core::EvaluationError;
use crate::games::{GameKind, BOARD_SIZE, INPUT_CHANNELS};

/// Backend for search and evaluation.
pub type InferenceBackend = NdArray<f32>;

/// Backend for gradient steps.
pub type TrainingBackend = Autodiff<InferenceBackend>;

/// Network architecture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Input planes (history length x planes per position).
    pub input_channels: usize,
    /// Trunk width.
    pub channels: usize,
    /// Residual blocks in the trunk.
    pub residual_blocks: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            input_channels: INPUT_CHANNELS,
            channels: 256,
            residual_blocks: 4,
        }
    }
}

impl NetworkConfig {
    /// A narrow single-block network for tests and quick runs.
    #[must_use]
    pub fn tiny() -> Self {
        Self {
            input_channels: INPUT_CHANNELS,
            channels: 8,
            residual_blocks: 1,
        }
    }

    /// Shape of one encoded input.
    #[must_use]
    pub fn input_shape(&self) -> [usize; 3] {
        [self.input_channels, BOARD_SIZE, BOARD_SIZE]
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> GameNet<B> {
        GameNet::new(self, device)
    }
}

fn conv3x3<B: Backend>(input: usize, output: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([input, output], [3, 3])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init(device)
}

fn conv1x1<B: Backend>(input: usize, output: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([input, output], [1, 1]).init(device)
}

// =============================================================================
// Building blocks
// =============================================================================

#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
}

impl<B: Backend> ResidualBlock<B> {
    fn new(channels: usize, device: &B::Device) -> Self {
        Self {
            conv1: conv3x3(channels, channels, device),
            bn1: BatchNormConfig::new(channels).init(device),
            conv2: conv3x3(channels, channels, device),
            bn2: BatchNormConfig::new(channels).init(device),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.bn1.forward(self.conv1.forward(input.clone())));
        let x = self.bn2.forward(self.conv2.forward(x));
        relu(x + input)
    }
}

#[derive(Module, Debug)]
pub struct PolicyHead<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    fc: Linear<B>,
}

impl<B: Backend> PolicyHead<B> {
    fn new(channels: usize, action_size: usize, device: &B::Device) -> Self {
        Self {
            conv: conv1x1(channels, 2, device),
            bn: BatchNormConfig::new(2).init(device),
            fc: LinearConfig::new(2 * BOARD_SIZE * BOARD_SIZE, action_size).init(device),
        }
    }

    /// Raw logits, `[batch, action_size]`.
    fn forward(&self, trunk: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = relu(self.bn.forward(self.conv.forward(trunk)));
        self.fc.forward(x.flatten::<2>(1, 3))
    }
}

#[derive(Module, Debug)]
pub struct ValueHead<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    fc1: Linear<B>,
    fc2: Linear<B>,
}

impl<B: Backend> ValueHead<B> {
    fn new(channels: usize, device: &B::Device) -> Self {
        Self {
            conv: conv1x1(channels, 1, device),
            bn: BatchNormConfig::new(1).init(device),
            fc1: LinearConfig::new(BOARD_SIZE * BOARD_SIZE, 256).init(device),
            fc2: LinearConfig::new(256, 1).init(device),
        }
    }

    /// Values in `[-1, 1]`, `[batch, 1]`.
    fn forward(&self, trunk: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = relu(self.bn.forward(self.conv.forward(trunk)));
        let x = relu(self.fc1.forward(x.flatten::<2>(1, 3)));
        tanh(self.fc2.forward(x))
    }
}

// =============================================================================
// GameNet
// =============================================================================

/// Residual trunk with per-game policy heads and a shared value head.
#[derive(Module, Debug)]
pub struct GameNet<B: Backend> {
    stem: Conv2d<B>,
    stem_bn: BatchNorm<B, 2>,
    blocks: Vec<ResidualBlock<B>>,
    chess_policy: PolicyHead<B>,
    checkers_policy: PolicyHead<B>,
    value: ValueHead<B>,
}

impl<B: Backend> GameNet<B> {
    /// Freshly initialized weights.
    pub fn new(config: &NetworkConfig, device: &B::Device) -> Self {
        Self {
            stem: conv3x3(config.input_channels, config.channels, device),
            stem_bn: BatchNormConfig::new(config.channels).init(device),
            blocks: (0..config.residual_blocks)
                .map(|_| ResidualBlock::new(config.channels, device))
                .collect(),
            chess_policy: PolicyHead::new(
                config.channels,
                GameKind::Chess.action_size(),
                device,
            ),
            checkers_policy: PolicyHead::new(
                config.channels,
                GameKind::Checkers.action_size(),
                device,
            ),
            value: ValueHead::new(config.channels, device),
        }
    }

    /// Policy logits for `kind` and values, for a `[batch, C, 8, 8]` input.
    pub fn forward(&self, input: Tensor<B, 4>, kind: GameKind) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let mut x = relu(self.stem_bn.forward(self.stem.forward(input)));
        for block in &self.blocks {
            x = block.forward(x);
        }
        let head = match kind {
            GameKind::Chess => &self.chess_policy,
            GameKind::Checkers => &self.checkers_policy,
        };
        (head.forward(x.clone()), self.value.forward(x))
    }

    /// Trainable parameter count.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.num_params()
    }

    /// Weights and bias of the final value layer, for detecting updates.
    #[must_use]
    pub fn fingerprint(&self) -> Vec<f32> {
        let fc2 = &self.value.fc2;
        let mut values = fc2
            .weight
            .val()
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_default();
        if let Some(bias) = &fc2.bias {
            values.extend(bias.val().into_data().to_vec::<f32>().unwrap_or_default());
        }
        values
    }
}

/// Stack encoded states into one `[batch, C, 8, 8]` tensor.
///
/// Callers check shapes first; the states are assumed to agree.
pub fn batch_tensor<B: Backend>(
    states: &[&EncodedState],
    channels: usize,
    device: &B::Device,
) -> Tensor<B, 4> {
    let mut flat = Vec::with_capacity(states.len() * channels * BOARD_SIZE * BOARD_SIZE);
    for state in states {
        flat.extend_from_slice(&state.tensor);
    }
    let data = TensorData::new(flat, [states.len(), channels, BOARD_SIZE, BOARD_SIZE]);
    Tensor::from_data(data, device)
}

// =============================================================================
// Evaluator over a network snapshot
// =============================================================================

/// Inference-mode network snapshot implementing [`Evaluator`].
#[derive(Debug)]
pub struct NetworkEvaluator {
    net: GameNet<InferenceBackend>,
    config: NetworkConfig,
    device: <InferenceBackend as Backend>::Device,
}

impl NetworkEvaluator {
    pub fn new(net: GameNet<InferenceBackend>, config: NetworkConfig) -> Self {
        Self {
            net,
            config,
            device: Default::default(),
        }
    }

    /// Fresh random network, mostly for tests.
    pub fn random(config: NetworkConfig) -> Self {
        let device = Default::default();
        Self {
            net: GameNet::new(&config, &device),
            config,
            device,
        }
    }

    #[must_use]
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }
}

fn backend_error(err: impl std::fmt::Debug) -> EvaluationError {
    EvaluationError::Backend(format!("{err:?}"))
}

impl Evaluator for NetworkEvaluator {
    fn evaluate(
        &self,
        state: &EncodedState,
        kind: GameKind,
    ) -> Result<Prediction, EvaluationError> {
        self.evaluate_batch(std::slice::from_ref(state), kind)?
            .pop()
            .ok_or_else(|| EvaluationError::Backend("empty network output".to_string()))
    }

    fn evaluate_batch(
        &self,
        states: &[EncodedState],
        kind: GameKind,
    ) -> Result<Vec<Prediction>, EvaluationError> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let expected = self.config.input_shape();
        if let Some(bad) = states.iter().find(|s| !s.has_shape(&expected)) {
            return Err(EvaluationError::ShapeMismatch {
                expected: expected.to_vec(),
                actual: bad.shape.clone(),
            });
        }

        let refs: Vec<&EncodedState> = states.iter().collect();
        let input = batch_tensor::<InferenceBackend>(&refs, self.config.input_channels, &self.device);
        let (logits, values) = self.net.forward(input, kind);

        let policy = softmax(logits, 1)
            .into_data()
            .to_vec::<f32>()
            .map_err(backend_error)?;
        let values = values.into_data().to_vec::<f32>().map_err(backend_error)?;

        policy
            .chunks(kind.action_size())
            .zip(values)
            .map(|(probs, value)| {
                if !value.is_finite() || probs.iter().any(|p| !p.is_finite()) {
                    return Err(EvaluationError::NonFinite);
                }
                Ok(Prediction {
                    policy: probs.to_vec(),
                    value,
                })
            })
            .collect()
    }
}
