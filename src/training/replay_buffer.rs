//! Experiences and the shared replay buffer.
//!
//! An experience records one decision point from a match:
//! - the encoded position the mover saw
//! - the search's visit distribution (the policy target)
//! - the final game result from the mover's perspective, filled in when
//!   the match ends
//!
//! The buffer is a bounded FIFO shared by every agent in the league.

use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{CheckpointError, GameRng};
use crate::games::GameKind;
use crate::nn::EncodedState;

/// Histogram bins over the reward range `[-1, 1]`.
pub const REWARD_BINS: usize = 10;

/// One training example.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    /// Encoded position from the mover's side.
    pub state: EncodedState,

    /// Sparse policy target: `(action index, probability)`.
    pub policy: Vec<(usize, f32)>,

    /// Final reward for the mover. `None` until the match ends.
    pub reward: Option<f32>,

    /// Name of the agent that made the move.
    pub actor: String,

    /// Game this position belongs to.
    pub game: GameKind,
}

impl Experience {
    /// Create an experience without a reward yet.
    pub fn new(
        state: EncodedState,
        policy: Vec<(usize, f32)>,
        actor: impl Into<String>,
        game: GameKind,
    ) -> Self {
        Self {
            state,
            policy,
            reward: None,
            actor: actor.into(),
            game,
        }
    }

    /// Set the reward.
    pub fn with_reward(mut self, reward: f32) -> Self {
        self.reward = Some(reward);
        self
    }

    /// Dense policy target over `action_size` actions.
    pub fn dense_policy(&self, action_size: usize) -> Result<Vec<f32>, String> {
        let mut dense = vec![0.0; action_size];
        for &(index, p) in &self.policy {
            if !p.is_finite() || p < 0.0 {
                return Err(format!("probability {p} at index {index}"));
            }
            let slot = dense
                .get_mut(index)
                .ok_or_else(|| format!("index {index} outside action space {action_size}"))?;
            *slot += p;
        }
        Ok(dense)
    }

    /// Shannon entropy of the policy target (nats).
    #[must_use]
    pub fn policy_entropy(&self) -> f32 {
        self.policy
            .iter()
            .filter(|(_, p)| *p > 0.0)
            .map(|(_, p)| -p * p.ln())
            .sum()
    }
}

/// Bounded FIFO of experiences.
#[derive(Clone, Debug)]
pub struct ReplayBuffer {
    experiences: VecDeque<Experience>,
    capacity: usize,
}

impl ReplayBuffer {
    /// Create a new buffer holding at most `capacity` experiences.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            experiences: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    /// Add an experience, evicting the oldest when full.
    pub fn add(&mut self, experience: Experience) {
        if self.experiences.len() >= self.capacity {
            self.experiences.pop_front();
        }
        self.experiences.push_back(experience);
    }

    /// Add experiences in order.
    pub fn extend(&mut self, experiences: impl IntoIterator<Item = Experience>) {
        for experience in experiences {
            self.add(experience);
        }
    }

    /// Sample `min(batch_size, len)` experiences uniformly without
    /// replacement.
    pub fn sample(&self, batch_size: usize, rng: &mut GameRng) -> Vec<Experience> {
        rng.sample_indices(self.experiences.len(), batch_size)
            .into_iter()
            .map(|i| self.experiences[i].clone())
            .collect()
    }

    /// Get the number of experiences in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.experiences.len()
    }

    /// Check if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiences.is_empty()
    }

    /// Get the maximum capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.experiences.len() >= self.capacity
    }

    /// Clear all experiences.
    pub fn clear(&mut self) {
        self.experiences.clear();
    }

    /// Iterate oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.experiences.iter()
    }

    /// The `n` most recent experiences, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Experience> {
        self.experiences
            .iter()
            .skip(self.experiences.len().saturating_sub(n))
    }

    /// Size, reward distribution and per-game counts.
    #[must_use]
    pub fn statistics(&self) -> BufferStats {
        let rewards: Vec<f32> = self.experiences.iter().filter_map(|e| e.reward).collect();
        let (reward_mean, reward_std) = mean_std(&rewards);

        let mut reward_histogram = [0usize; REWARD_BINS];
        for r in &rewards {
            let bin = ((r + 1.0) / 2.0 * REWARD_BINS as f32).floor();
            let bin = (bin.max(0.0) as usize).min(REWARD_BINS - 1);
            reward_histogram[bin] += 1;
        }

        let mut per_game = BTreeMap::new();
        for e in &self.experiences {
            *per_game.entry(e.game).or_insert(0) += 1;
        }

        BufferStats {
            size: self.len(),
            capacity: self.capacity,
            utilization: self.len() as f64 / self.capacity as f64,
            reward_mean,
            reward_std,
            reward_histogram,
            per_game,
        }
    }

    /// Policy target entropy over the buffer.
    #[must_use]
    pub fn quality(&self) -> BufferQuality {
        let entropies: Vec<f32> = self.experiences.iter().map(|e| e.policy_entropy()).collect();
        let (policy_entropy_mean, policy_entropy_std) = mean_std(&entropies);
        let rewarded = self.experiences.iter().filter(|e| e.reward.is_some()).count();
        BufferQuality {
            policy_entropy_mean,
            policy_entropy_std,
            rewarded_fraction: if self.is_empty() {
                0.0
            } else {
                rewarded as f64 / self.len() as f64
            },
        }
    }

    /// Write a snapshot with bincode.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CheckpointError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| CheckpointError::io(path, e))?;
        let snapshot = Snapshot {
            capacity: self.capacity,
            experiences: self.experiences.iter().cloned().collect(),
        };
        bincode::serialize_into(BufWriter::new(file), &snapshot)?;
        Ok(())
    }

    /// Read a snapshot written by [`ReplayBuffer::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CheckpointError::Missing(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|e| CheckpointError::io(path, e))?;
        let snapshot: Snapshot = bincode::deserialize_from(BufReader::new(file))?;
        let mut buffer = Self::new(snapshot.capacity);
        buffer.extend(snapshot.experiences);
        Ok(buffer)
    }
}

impl Default for ReplayBuffer {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    capacity: usize,
    experiences: Vec<Experience>,
}

/// Buffer summary written into generation stats.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BufferStats {
    pub size: usize,
    pub capacity: usize,
    pub utilization: f64,
    pub reward_mean: f64,
    pub reward_std: f64,
    /// Counts over 10 equal bins spanning `[-1, 1]`.
    pub reward_histogram: [usize; REWARD_BINS],
    pub per_game: BTreeMap<GameKind, usize>,
}

/// Policy target quality.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BufferQuality {
    pub policy_entropy_mean: f64,
    pub policy_entropy_std: f64,
    pub rewarded_fraction: f64,
}

fn mean_std(values: &[f32]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|&v| (f64::from(v) - mean).powi(2))
        .sum::<f64>()
        / n;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_experience(reward: f32, game: GameKind) -> Experience {
        Experience::new(
            EncodedState::zeros(vec![4]),
            vec![(0, 0.5), (1, 0.5)],
            "champion",
            game,
        )
        .with_reward(reward)
    }

    #[test]
    fn test_fifo_eviction() {
        let mut buffer = ReplayBuffer::new(3);
        for i in 0..5 {
            buffer.add(make_experience(i as f32 / 10.0, GameKind::Chess));
        }

        assert_eq!(buffer.len(), 3);
        assert!(buffer.is_full());
        let rewards: Vec<f32> = buffer.iter().filter_map(|e| e.reward).collect();
        assert_eq!(rewards, vec![0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_sample_without_replacement() {
        let mut buffer = ReplayBuffer::new(100);
        for i in 0..10 {
            buffer.add(make_experience(i as f32 / 10.0, GameKind::Chess));
        }
        let mut rng = GameRng::new(1);

        let batch = buffer.sample(4, &mut rng);
        assert_eq!(batch.len(), 4);
        let mut rewards: Vec<i32> = batch
            .iter()
            .map(|e| (e.reward.unwrap() * 10.0).round() as i32)
            .collect();
        rewards.sort_unstable();
        rewards.dedup();
        assert_eq!(rewards.len(), 4);

        // Oversized request returns everything
        assert_eq!(buffer.sample(50, &mut rng).len(), 10);
        assert!(ReplayBuffer::new(5).sample(3, &mut rng).is_empty());
    }

    #[test]
    fn test_recent() {
        let mut buffer = ReplayBuffer::new(10);
        for i in 0..6 {
            buffer.add(make_experience(i as f32 / 10.0, GameKind::Checkers));
        }
        let recent: Vec<f32> = buffer.recent(2).filter_map(|e| e.reward).collect();
        assert_eq!(recent, vec![0.4, 0.5]);
        assert_eq!(buffer.recent(100).count(), 6);
    }

    #[test]
    fn test_statistics() {
        let mut buffer = ReplayBuffer::new(10);
        buffer.add(make_experience(1.0, GameKind::Chess));
        buffer.add(make_experience(-1.0, GameKind::Checkers));
        buffer.add(make_experience(0.0, GameKind::Checkers));
        buffer.add(Experience::new(
            EncodedState::zeros(vec![4]),
            vec![(0, 1.0)],
            "alpha",
            GameKind::Chess,
        ));

        let stats = buffer.statistics();
        assert_eq!(stats.size, 4);
        assert_relative_eq!(stats.utilization, 0.4);
        assert_relative_eq!(stats.reward_mean, 0.0);
        assert_relative_eq!(stats.reward_std, (2.0f64 / 3.0).sqrt(), epsilon = 1e-9);
        assert_eq!(stats.reward_histogram[0], 1);
        assert_eq!(stats.reward_histogram[5], 1);
        assert_eq!(stats.reward_histogram[9], 1);
        assert_eq!(stats.per_game[&GameKind::Chess], 2);
        assert_eq!(stats.per_game[&GameKind::Checkers], 2);

        let json = serde_json::to_string(&stats).unwrap();
        let back: BufferStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }

    #[test]
    fn test_quality() {
        let mut buffer = ReplayBuffer::new(10);
        buffer.add(make_experience(0.5, GameKind::Chess));
        let quality = buffer.quality();
        assert_relative_eq!(quality.policy_entropy_mean, 2.0f64.ln(), epsilon = 1e-6);
        assert_relative_eq!(quality.rewarded_fraction, 1.0);
    }

    #[test]
    fn test_dense_policy() {
        let exp = make_experience(0.0, GameKind::Checkers);
        let dense = exp.dense_policy(4).unwrap();
        assert_eq!(dense, vec![0.5, 0.5, 0.0, 0.0]);
        assert!(exp.dense_policy(1).is_err());

        let mut bad = exp;
        bad.policy = vec![(0, f32::NAN)];
        assert!(bad.dense_policy(4).is_err());
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffer.bin");

        let mut buffer = ReplayBuffer::new(8);
        buffer.add(make_experience(0.25, GameKind::Chess));
        buffer.add(make_experience(-0.5, GameKind::Checkers));
        buffer.save(&path).unwrap();

        let loaded = ReplayBuffer::load(&path).unwrap();
        assert_eq!(loaded.capacity(), 8);
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            loaded.iter().collect::<Vec<_>>(),
            buffer.iter().collect::<Vec<_>>()
        );

        assert!(matches!(
            ReplayBuffer::load(dir.path().join("missing.bin")),
            Err(CheckpointError::Missing(_))
        ));
    }
}
