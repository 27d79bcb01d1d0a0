//! Gradient steps and checkpoints for one network.
//!
//! A `TrainingManager` owns a network on the autodiff backend and its Adam
//! optimizer. Malformed batches and numeric failures never escape a training
//! step: they are reported to diagnostics and the step is dropped before any
//! weight changes.

use std::fs;
use std::path::Path;

use burn::module::{AutodiffModule, Module};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::record::{DefaultRecorder, Recorder};
use burn::tensor::activation::log_softmax;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::replay_buffer::Experience;
use crate::core::{CheckpointError, SharedDiagnostics, TrainingError};
use crate::games::GameKind;
use crate::nn::{
    batch_tensor, EncodedState, GameNet, InferenceBackend, NetworkConfig, NetworkEvaluator,
    TrainingBackend,
};

const COMPONENT: &str = "training";
const MODEL_FILE: &str = "model";
const OPTIMIZER_FILE: &str = "optimizer";
const METADATA_FILE: &str = "metadata.json";

type TrainingDevice = <TrainingBackend as Backend>::Device;
type AdamOptimizer = OptimizerAdaptor<Adam, GameNet<TrainingBackend>, TrainingBackend>;

/// Losses from one training step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LossReport {
    pub total_loss: f32,
    pub policy_loss: f32,
    pub value_loss: f32,
}

impl LossReport {
    /// The report returned for a dropped step.
    #[must_use]
    pub fn zero() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.total_loss.is_finite() && self.policy_loss.is_finite() && self.value_loss.is_finite()
    }
}

/// Losses and accuracy on a batch without updating weights.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchEvaluation {
    pub loss: LossReport,
    /// Mean absolute error of the value head.
    pub value_mae: f32,
    /// Fraction of examples whose most likely move matches the target's.
    pub policy_accuracy: f32,
}

/// Architecture and training progress.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub parameter_count: usize,
    pub network: NetworkConfig,
    pub learning_rate: f64,
    pub steps: u64,
    pub backend: String,
}

#[derive(Serialize, Deserialize)]
struct CheckpointMetadata {
    generation: u64,
    steps: u64,
    learning_rate: f64,
    network: NetworkConfig,
}

/// Validated batch, flattened for tensor construction.
struct PreparedBatch<'a> {
    states: Vec<&'a EncodedState>,
    policies: Vec<f32>,
    values: Vec<f32>,
}

pub struct TrainingManager {
    net: GameNet<TrainingBackend>,
    optimizer: AdamOptimizer,
    config: NetworkConfig,
    learning_rate: f64,
    steps: u64,
    device: TrainingDevice,
    diagnostics: SharedDiagnostics,
}

impl std::fmt::Debug for TrainingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingManager")
            .field("config", &self.config)
            .field("learning_rate", &self.learning_rate)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

impl TrainingManager {
    /// Fresh network and optimizer.
    pub fn new(config: NetworkConfig, learning_rate: f64, diagnostics: SharedDiagnostics) -> Self {
        let device = TrainingDevice::default();
        Self {
            net: GameNet::new(&config, &device),
            optimizer: AdamConfig::new().init(),
            config,
            learning_rate,
            steps: 0,
            device,
            diagnostics,
        }
    }

    /// One gradient step on `batch` through the `kind` head.
    ///
    /// Returns [`LossReport::zero`] and leaves the weights untouched when the
    /// batch is malformed or the loss is not finite.
    pub fn train_step(&mut self, batch: &[Experience], kind: GameKind) -> LossReport {
        match self.try_train_step(batch, kind) {
            Ok(report) => {
                self.steps += 1;
                debug!(
                    step = self.steps,
                    game = %kind,
                    total = report.total_loss,
                    policy = report.policy_loss,
                    value = report.value_loss,
                    "training step"
                );
                report
            }
            Err(err) => {
                self.diagnostics
                    .warn(COMPONENT, &format!("dropped {kind} training step: {err}"));
                LossReport::zero()
            }
        }
    }

    fn try_train_step(
        &mut self,
        batch: &[Experience],
        kind: GameKind,
    ) -> Result<LossReport, TrainingError> {
        let prepared = self.prepare(batch, kind)?;
        let n = prepared.states.len();
        let width = kind.action_size();

        let states =
            batch_tensor::<TrainingBackend>(&prepared.states, self.config.input_channels, &self.device);
        let policy_targets = Tensor::<TrainingBackend, 2>::from_data(
            TensorData::new(prepared.policies, [n, width]),
            &self.device,
        );
        let value_targets = Tensor::<TrainingBackend, 2>::from_data(
            TensorData::new(prepared.values, [n, 1]),
            &self.device,
        );

        let (logits, values) = self.net.forward(states, kind);
        let policy_loss = -(policy_targets * log_softmax(logits, 1)).sum_dim(1).mean();
        let diff = values - value_targets;
        let value_loss = (diff.clone() * diff).mean();
        let total = policy_loss.clone() + value_loss.clone();

        let report = LossReport {
            total_loss: scalar(total.clone())?,
            policy_loss: scalar(policy_loss)?,
            value_loss: scalar(value_loss)?,
        };
        if !report.is_finite() {
            return Err(TrainingError::NonFiniteLoss);
        }

        let grads = GradientsParams::from_grads(total.backward(), &self.net);
        self.net = self
            .optimizer
            .step(self.learning_rate, self.net.clone(), grads);
        Ok(report)
    }

    /// Losses, value error and top-1 agreement on `batch`, without an update.
    pub fn evaluate_batch(
        &self,
        batch: &[Experience],
        kind: GameKind,
    ) -> Result<BatchEvaluation, TrainingError> {
        let prepared = self.prepare(batch, kind)?;
        let n = prepared.states.len();
        let width = kind.action_size();

        let net = self.net.valid();
        let device = <InferenceBackend as Backend>::Device::default();
        let states =
            batch_tensor::<InferenceBackend>(&prepared.states, self.config.input_channels, &device);
        let (logits, values) = net.forward(states, kind);

        let log_probs = log_softmax(logits, 1)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| TrainingError::Backend(format!("{e:?}")))?;
        let predicted = values
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| TrainingError::Backend(format!("{e:?}")))?;

        let mut policy_loss = 0.0;
        let mut value_loss = 0.0;
        let mut value_mae = 0.0;
        let mut agree = 0usize;
        for i in 0..n {
            let target = &prepared.policies[i * width..(i + 1) * width];
            let row = &log_probs[i * width..(i + 1) * width];
            policy_loss -= target.iter().zip(row).map(|(t, l)| t * l).sum::<f32>();
            if argmax(target) == argmax(row) {
                agree += 1;
            }
            let err = predicted[i] - prepared.values[i];
            value_loss += err * err;
            value_mae += err.abs();
        }
        let n = n as f32;
        let loss = LossReport {
            total_loss: (policy_loss + value_loss) / n,
            policy_loss: policy_loss / n,
            value_loss: value_loss / n,
        };
        if !loss.is_finite() {
            return Err(TrainingError::NonFiniteLoss);
        }

        Ok(BatchEvaluation {
            loss,
            value_mae: value_mae / n,
            policy_accuracy: agree as f32 / n,
        })
    }

    /// Check every experience and flatten targets.
    fn prepare<'a>(
        &self,
        batch: &'a [Experience],
        kind: GameKind,
    ) -> Result<PreparedBatch<'a>, TrainingError> {
        if batch.is_empty() {
            return Err(TrainingError::EmptyBatch);
        }

        let width = kind.action_size();
        let expected = self.config.input_shape();
        let expected_len: usize = expected.iter().product();
        let mut prepared = PreparedBatch {
            states: Vec::with_capacity(batch.len()),
            policies: Vec::with_capacity(batch.len() * width),
            values: Vec::with_capacity(batch.len()),
        };

        for (index, exp) in batch.iter().enumerate() {
            if exp.game != kind {
                return Err(TrainingError::MixedGameKinds {
                    expected: kind.to_string(),
                    found: exp.game.to_string(),
                });
            }
            if !exp.state.has_shape(&expected) {
                return Err(TrainingError::ShapeMismatch {
                    index,
                    expected: expected_len,
                    actual: exp.state.len(),
                });
            }
            let reward = exp.reward.ok_or(TrainingError::MissingReward { index })?;
            if !reward.is_finite() {
                return Err(TrainingError::MalformedPolicy {
                    index,
                    reason: format!("non-finite reward {reward}"),
                });
            }
            let dense = exp
                .dense_policy(width)
                .map_err(|reason| TrainingError::MalformedPolicy { index, reason })?;

            prepared.states.push(&exp.state);
            prepared.policies.extend(dense);
            prepared.values.push(reward.clamp(-1.0, 1.0));
        }
        Ok(prepared)
    }

    /// Write weights, optimizer state and metadata into `dir`.
    pub fn save_checkpoint(&self, dir: &Path, generation: u64) -> Result<(), CheckpointError> {
        fs::create_dir_all(dir).map_err(|e| CheckpointError::io(dir, e))?;
        let recorder = DefaultRecorder::new();

        self.net
            .clone()
            .save_file(dir.join(MODEL_FILE), &recorder)
            .map_err(|e| CheckpointError::Record(e.to_string()))?;
        <DefaultRecorder as Recorder<TrainingBackend>>::record(
            &recorder,
            self.optimizer.to_record(),
            dir.join(OPTIMIZER_FILE),
        )
        .map_err(|e| CheckpointError::Record(e.to_string()))?;

        let metadata = CheckpointMetadata {
            generation,
            steps: self.steps,
            learning_rate: self.learning_rate,
            network: self.config,
        };
        let path = dir.join(METADATA_FILE);
        let text = serde_json::to_string_pretty(&metadata)?;
        fs::write(&path, text).map_err(|e| CheckpointError::io(path, e))?;

        debug!(dir = %dir.display(), generation, "saved checkpoint");
        Ok(())
    }

    /// Restore from a directory written by [`TrainingManager::save_checkpoint`].
    ///
    /// Returns the recorded generation. Missing optimizer state is not an
    /// error; the optimizer then starts fresh.
    pub fn load_checkpoint(&mut self, dir: &Path) -> Result<u64, CheckpointError> {
        let path = dir.join(METADATA_FILE);
        if !path.exists() {
            return Err(CheckpointError::Missing(path));
        }
        let text = fs::read_to_string(&path).map_err(|e| CheckpointError::io(&path, e))?;
        let metadata: CheckpointMetadata = serde_json::from_str(&text)?;

        let recorder = DefaultRecorder::new();
        let net = GameNet::new(&metadata.network, &self.device)
            .load_file(dir.join(MODEL_FILE), &recorder, &self.device)
            .map_err(|e| CheckpointError::Record(e.to_string()))?;

        let optimizer: AdamOptimizer = match <DefaultRecorder as Recorder<TrainingBackend>>::load(
            &recorder,
            dir.join(OPTIMIZER_FILE),
            &self.device,
        ) {
            Ok(record) => AdamConfig::new().init().load_record(record),
            Err(err) => {
                self.diagnostics.warn(
                    COMPONENT,
                    &format!("optimizer state not restored, starting fresh: {err}"),
                );
                AdamConfig::new().init()
            }
        };

        self.net = net;
        self.optimizer = optimizer;
        self.config = metadata.network;
        self.steps = metadata.steps;
        self.learning_rate = metadata.learning_rate;
        info!(dir = %dir.display(), generation = metadata.generation, "loaded checkpoint");
        Ok(metadata.generation)
    }

    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    /// Successful training steps so far.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    #[must_use]
    pub fn network_config(&self) -> &NetworkConfig {
        &self.config
    }

    #[must_use]
    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            parameter_count: self.net.parameter_count(),
            network: self.config,
            learning_rate: self.learning_rate,
            steps: self.steps,
            backend: "ndarray".to_string(),
        }
    }

    /// Inference snapshot of the current weights.
    #[must_use]
    pub fn evaluator(&self) -> NetworkEvaluator {
        NetworkEvaluator::new(self.net.valid(), self.config)
    }

    /// Take `other`'s weights. The optimizer restarts, since its moments
    /// belong to the old weights.
    ///
    /// The copy goes through a record into a freshly built network. A
    /// module clone would keep sharing the BatchNorm running statistics.
    pub fn copy_weights_from(&mut self, other: &TrainingManager) {
        self.net = GameNet::new(&other.config, &self.device)
            .load_record(other.net.clone().into_record());
        self.config = other.config;
        self.optimizer = AdamConfig::new().init();
    }

    /// Fresh random weights and optimizer.
    pub fn reinitialize(&mut self) {
        self.net = GameNet::new(&self.config, &self.device);
        self.optimizer = AdamConfig::new().init();
        self.steps = 0;
    }

    /// See [`GameNet::fingerprint`].
    #[must_use]
    pub fn fingerprint(&self) -> Vec<f32> {
        self.net.fingerprint()
    }
}

fn scalar(tensor: Tensor<TrainingBackend, 1>) -> Result<f32, TrainingError> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| TrainingError::Backend(format!("{e:?}")))?
        .first()
        .copied()
        .ok_or_else(|| TrainingError::Backend("empty loss tensor".to_string()))
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
            if v > bv {
                (i, v)
            } else {
                (bi, bv)
            }
        })
        .0
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::{CapturingDiagnostics, GameRng};
    use crate::games::{CheckersGame, Game};
    use crate::nn::Evaluator;

    fn manager() -> (TrainingManager, Arc<CapturingDiagnostics>) {
        let diagnostics = Arc::new(CapturingDiagnostics::new());
        let manager = TrainingManager::new(NetworkConfig::tiny(), 0.001, diagnostics.clone());
        (manager, diagnostics)
    }

    fn checkers_batch(n: usize, seed: u64) -> Vec<Experience> {
        let game = CheckersGame::new();
        let mut rng = GameRng::new(seed);
        let mut board = game.create_board();
        let mut batch = Vec::new();
        for _ in 0..n {
            let moves = game.legal_moves(&board);
            if moves.is_empty() {
                board = game.create_board();
                continue;
            }
            let policy: Vec<(usize, f32)> = moves
                .iter()
                .map(|m| (game.move_index(&board, m), 1.0 / moves.len() as f32))
                .collect();
            let state = game.board_to_tensor(&board, &[]);
            let reward = rng.gen_unit() * 2.0 - 1.0;
            batch.push(
                Experience::new(state, policy, "test", GameKind::Checkers).with_reward(reward),
            );
            let mv = rng.choose(&moves).cloned().unwrap();
            game.make_move(&mut board, &mv).unwrap();
        }
        batch
    }

    #[test]
    fn test_train_step_updates_weights() {
        let (mut manager, diagnostics) = manager();
        let batch = checkers_batch(8, 1);
        let before = manager.fingerprint();

        let report = manager.train_step(&batch, GameKind::Checkers);

        assert!(report.is_finite());
        assert!(!report.is_zero());
        assert!(report.policy_loss > 0.0);
        assert_eq!(manager.steps(), 1);
        assert_ne!(manager.fingerprint(), before);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_malformed_batches_are_dropped() {
        let (mut manager, diagnostics) = manager();
        let before = manager.fingerprint();

        assert!(manager.train_step(&[], GameKind::Checkers).is_zero());

        let mut batch = checkers_batch(4, 2);
        batch[1].reward = None;
        assert!(manager.train_step(&batch, GameKind::Checkers).is_zero());

        let batch = checkers_batch(4, 3);
        assert!(manager.train_step(&batch, GameKind::Chess).is_zero());

        let mut batch = checkers_batch(4, 4);
        batch[0].policy.push((5000, 0.1));
        assert!(manager.train_step(&batch, GameKind::Checkers).is_zero());

        let mut batch = checkers_batch(4, 5);
        batch[2].state = EncodedState::zeros(vec![14, 8, 8]);
        assert!(manager.train_step(&batch, GameKind::Checkers).is_zero());

        assert_eq!(manager.steps(), 0);
        assert_eq!(manager.fingerprint(), before);
        assert_eq!(diagnostics.count(COMPONENT), 5);
    }

    #[test]
    fn test_evaluate_batch_does_not_update() {
        let (manager, _) = manager();
        let batch = checkers_batch(6, 6);
        let before = manager.fingerprint();

        let eval = manager.evaluate_batch(&batch, GameKind::Checkers).unwrap();

        assert!(eval.loss.is_finite());
        assert!(eval.value_mae >= 0.0);
        assert!((0.0..=1.0).contains(&eval.policy_accuracy));
        assert_eq!(manager.fingerprint(), before);
        assert!(matches!(
            manager.evaluate_batch(&[], GameKind::Checkers),
            Err(TrainingError::EmptyBatch)
        ));
    }

    #[test]
    fn test_copy_weights_and_reinitialize() {
        let (mut a, _) = manager();
        let (mut b, _) = manager();
        assert_ne!(a.fingerprint(), b.fingerprint());

        b.copy_weights_from(&a);
        assert_eq!(a.fingerprint(), b.fingerprint());

        // Training the copy leaves the source alone
        let source = a.fingerprint();
        b.train_step(&checkers_batch(8, 7), GameKind::Checkers);
        assert_eq!(a.fingerprint(), source);
        assert_ne!(b.fingerprint(), source);

        a.reinitialize();
        assert_ne!(a.fingerprint(), source);
        assert_eq!(a.steps(), 0);
    }

    #[test]
    fn test_training_a_copy_keeps_source_predictions() {
        let (mut source, _) = manager();
        source.train_step(&checkers_batch(8, 9), GameKind::Checkers);
        let (mut copy, _) = manager();
        copy.copy_weights_from(&source);

        let state = checkers_batch(1, 10).remove(0).state;
        let before = source
            .evaluator()
            .evaluate(&state, GameKind::Checkers)
            .unwrap();
        assert_eq!(
            copy.evaluator().evaluate(&state, GameKind::Checkers).unwrap(),
            before
        );

        for seed in 0..5 {
            copy.train_step(&checkers_batch(8, 20 + seed), GameKind::Checkers);
        }

        let after = source
            .evaluator()
            .evaluate(&state, GameKind::Checkers)
            .unwrap();
        assert_eq!(after.value, before.value);
        assert_eq!(after.policy, before.policy);
        assert_ne!(
            copy.evaluator().evaluate(&state, GameKind::Checkers).unwrap(),
            before
        );
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let (mut trained, _) = manager();
        trained.train_step(&checkers_batch(8, 8), GameKind::Checkers);
        trained.set_learning_rate(0.0005);
        trained.save_checkpoint(dir.path(), 7).unwrap();

        let (mut restored, _) = manager();
        let generation = restored.load_checkpoint(dir.path()).unwrap();

        assert_eq!(generation, 7);
        assert_eq!(restored.steps(), 1);
        assert_eq!(restored.learning_rate(), 0.0005);
        assert_eq!(restored.fingerprint(), trained.fingerprint());
    }

    #[test]
    fn test_load_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let (mut manager, _) = manager();
        assert!(matches!(
            manager.load_checkpoint(&dir.path().join("nope")),
            Err(CheckpointError::Missing(_))
        ));
    }

    #[test]
    fn test_model_info() {
        let (manager, _) = manager();
        let info = manager.model_info();
        assert!(info.parameter_count > 0);
        assert_eq!(info.network, NetworkConfig::tiny());
        assert_eq!(info.backend, "ndarray");
    }
}
