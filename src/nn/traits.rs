//! Evaluator interface between the search and the network.
//!
//! MCTS only ever sees an [`Evaluator`]: the trained network, a frozen
//! snapshot of it, or the [`UniformEvaluator`] baseline used in tests.

use serde::{Deserialize, Serialize};

use crate::core::EvaluationError;
use crate::games::GameKind;

/// Encoded game state as a flat tensor for network input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncodedState {
    /// Flattened tensor data (row-major order).
    pub tensor: Vec<f32>,

    /// Shape of the tensor, `[channels, height, width]`.
    pub shape: Vec<usize>,
}

impl EncodedState {
    /// Create a new encoded state.
    pub fn new(tensor: Vec<f32>, shape: Vec<usize>) -> Self {
        debug_assert_eq!(
            tensor.len(),
            shape.iter().product::<usize>(),
            "Tensor length must match shape product"
        );
        Self { tensor, shape }
    }

    /// Create a zero-filled encoded state with the given shape.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let size = shape.iter().product();
        Self {
            tensor: vec![0.0; size],
            shape,
        }
    }

    /// Get the total number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tensor.len()
    }

    /// Check if the tensor is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tensor.is_empty()
    }

    /// Get element at a flat index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<f32> {
        self.tensor.get(index).copied()
    }

    /// Whether the shape matches and the data length agrees with it.
    #[must_use]
    pub fn has_shape(&self, shape: &[usize]) -> bool {
        self.shape == shape && self.tensor.len() == shape.iter().product::<usize>()
    }
}

/// One forward pass: a probability distribution over the game's action
/// space and a value in `[-1, 1]` for the side to move.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub policy: Vec<f32>,
    pub value: f32,
}

impl Prediction {
    /// Uniform policy over `action_size` actions with a neutral value.
    pub fn uniform(action_size: usize) -> Self {
        let policy = if action_size == 0 {
            vec![]
        } else {
            vec![1.0 / action_size as f32; action_size]
        };
        Self { policy, value: 0.0 }
    }
}

/// Something that can score positions for the search.
pub trait Evaluator: Send {
    /// Predict policy and value for one encoded position of `kind`.
    fn evaluate(&self, state: &EncodedState, kind: GameKind)
        -> Result<Prediction, EvaluationError>;

    /// Batch prediction. The default evaluates one state at a time.
    fn evaluate_batch(
        &self,
        states: &[EncodedState],
        kind: GameKind,
    ) -> Result<Vec<Prediction>, EvaluationError> {
        states.iter().map(|s| self.evaluate(s, kind)).collect()
    }
}

/// Uniform policy and zero value (baseline for testing).
#[derive(Clone, Copy, Debug, Default)]
pub struct UniformEvaluator;

impl Evaluator for UniformEvaluator {
    fn evaluate(
        &self,
        _state: &EncodedState,
        kind: GameKind,
    ) -> Result<Prediction, EvaluationError> {
        Ok(Prediction::uniform(kind.action_size()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_state_new() {
        let state = EncodedState::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
        assert_eq!(state.len(), 4);
        assert_eq!(state.shape, vec![2, 2]);
        assert_eq!(state.get(0), Some(1.0));
        assert_eq!(state.get(3), Some(4.0));
        assert_eq!(state.get(4), None);
        assert!(state.has_shape(&[2, 2]));
        assert!(!state.has_shape(&[4]));
    }

    #[test]
    fn test_encoded_state_zeros() {
        let state = EncodedState::zeros(vec![3, 4]);
        assert_eq!(state.len(), 12);
        assert!(state.tensor.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_uniform_evaluator() {
        let state = EncodedState::zeros(vec![1]);
        let prediction = UniformEvaluator.evaluate(&state, GameKind::Checkers).unwrap();
        assert_eq!(prediction.policy.len(), 1000);
        assert_eq!(prediction.value, 0.0);
        let sum: f32 = prediction.policy.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_evaluate_batch_default() {
        let states = vec![EncodedState::zeros(vec![1]); 3];
        let predictions = UniformEvaluator
            .evaluate_batch(&states, GameKind::Chess)
            .unwrap();
        assert_eq!(predictions.len(), 3);
        assert!(predictions.iter().all(|p| p.policy.len() == 4672));
    }

    #[test]
    fn test_prediction_uniform_empty() {
        assert!(Prediction::uniform(0).policy.is_empty());
    }
}
