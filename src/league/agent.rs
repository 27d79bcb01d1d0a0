//! League agents.
//!
//! Every agent owns a [`TrainingManager`] and per-game results. Its role
//! carries the extra bookkeeping the league keeps for it: promotions and
//! title defenses for the Champion, a specialization and loss history for
//! the trainees, baseline scores for the Wildcard.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::{CheckpointError, SharedDiagnostics};
use crate::games::GameKind;
use crate::nn::{NetworkConfig, NetworkEvaluator};
use crate::training::{Experience, LossReport, TrainingManager};

const AGENT_FILE: &str = "agent.json";

/// Losses kept per trainee.
pub const RECENT_LOSSES: usize = 100;

/// Scores used by [`Agent::baseline_trend`].
pub const TREND_WINDOW: usize = 5;

// =============================================================================
// Statistics
// =============================================================================

/// Results in one game kind, from this agent's perspective.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GameStats {
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub games_played: u32,
    pub total_reward: f64,
}

impl GameStats {
    #[must_use]
    pub fn win_rate(&self) -> f64 {
        if self.games_played == 0 {
            0.0
        } else {
            f64::from(self.wins) / f64::from(self.games_played)
        }
    }

    #[must_use]
    pub fn average_reward(&self) -> f64 {
        if self.games_played == 0 {
            0.0
        } else {
            self.total_reward / f64::from(self.games_played)
        }
    }
}

// =============================================================================
// Roles
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromotionRecord {
    pub generation: u64,
    pub promoted_from: String,
    pub win_rate: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChampionRecord {
    pub promotion_history: Vec<PromotionRecord>,
    pub defense_wins: u32,
    pub defense_losses: u32,
}

impl ChampionRecord {
    /// Share of title defenses won; 1.0 before any defense.
    #[must_use]
    pub fn defense_rate(&self) -> f64 {
        let total = self.defense_wins + self.defense_losses;
        if total == 0 {
            1.0
        } else {
            f64::from(self.defense_wins) / f64::from(total)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Specialization {
    Opening,
    Endgame,
}

impl fmt::Display for Specialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Specialization::Opening => "opening",
            Specialization::Endgame => "endgame",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraineeRecord {
    pub specialization: Specialization,
    pub training_iterations: u64,
    pub recent_losses: VecDeque<f32>,
}

impl TraineeRecord {
    #[must_use]
    pub fn new(specialization: Specialization) -> Self {
        Self {
            specialization,
            training_iterations: 0,
            recent_losses: VecDeque::with_capacity(RECENT_LOSSES),
        }
    }

    /// Mean of the kept losses.
    #[must_use]
    pub fn average_loss(&self) -> f32 {
        if self.recent_losses.is_empty() {
            0.0
        } else {
            self.recent_losses.iter().sum::<f32>() / self.recent_losses.len() as f32
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaselineScore {
    pub opponent: String,
    pub score: f64,
    pub generation: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WildcardRecord {
    pub baselines: Vec<BaselineScore>,
    pub resets: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AgentRole {
    Champion(ChampionRecord),
    Trainee(TraineeRecord),
    Wildcard(WildcardRecord),
}

impl AgentRole {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            AgentRole::Champion(_) => "champion",
            AgentRole::Trainee(_) => "trainee",
            AgentRole::Wildcard(_) => "wildcard",
        }
    }
}

// =============================================================================
// Agent
// =============================================================================

/// Snapshot of an agent for summaries and checkpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub name: String,
    pub role: AgentRole,
    pub stats: BTreeMap<GameKind, GameStats>,
    pub win_rates: BTreeMap<GameKind, f64>,
    pub average_rewards: BTreeMap<GameKind, f64>,
    pub parameter_count: usize,
    pub training_steps: u64,
}

#[derive(Serialize, Deserialize)]
struct AgentFile {
    name: String,
    role: AgentRole,
    stats: BTreeMap<GameKind, GameStats>,
}

pub struct Agent {
    name: String,
    role: AgentRole,
    trainer: TrainingManager,
    stats: BTreeMap<GameKind, GameStats>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("role", &self.role.label())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Agent {
    pub fn new(name: impl Into<String>, role: AgentRole, trainer: TrainingManager) -> Self {
        Self {
            name: name.into(),
            role,
            trainer,
            stats: GameKind::ALL
                .iter()
                .map(|&kind| (kind, GameStats::default()))
                .collect(),
        }
    }

    pub fn champion(network: NetworkConfig, learning_rate: f64, diagnostics: SharedDiagnostics) -> Self {
        Self::new(
            "Champion",
            AgentRole::Champion(ChampionRecord::default()),
            TrainingManager::new(network, learning_rate, diagnostics),
        )
    }

    pub fn trainee(
        name: impl Into<String>,
        specialization: Specialization,
        network: NetworkConfig,
        learning_rate: f64,
        diagnostics: SharedDiagnostics,
    ) -> Self {
        Self::new(
            name,
            AgentRole::Trainee(TraineeRecord::new(specialization)),
            TrainingManager::new(network, learning_rate, diagnostics),
        )
    }

    pub fn wildcard(network: NetworkConfig, learning_rate: f64, diagnostics: SharedDiagnostics) -> Self {
        Self::new(
            "Wildcard",
            AgentRole::Wildcard(WildcardRecord::default()),
            TrainingManager::new(network, learning_rate, diagnostics),
        )
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn role(&self) -> &AgentRole {
        &self.role
    }

    #[must_use]
    pub fn trainer(&self) -> &TrainingManager {
        &self.trainer
    }

    pub fn trainer_mut(&mut self) -> &mut TrainingManager {
        &mut self.trainer
    }

    /// Inference snapshot for match play.
    #[must_use]
    pub fn evaluator(&self) -> NetworkEvaluator {
        self.trainer.evaluator()
    }

    #[must_use]
    pub fn stats(&self, kind: GameKind) -> GameStats {
        self.stats.get(&kind).cloned().unwrap_or_default()
    }

    /// Record a finished game. `reward` is from this agent's perspective.
    pub fn record_game(&mut self, kind: GameKind, reward: f32) {
        let stats = self.stats.entry(kind).or_default();
        stats.games_played += 1;
        stats.total_reward += f64::from(reward);
        if reward > 0.0 {
            stats.wins += 1;
        } else if reward < 0.0 {
            stats.losses += 1;
        } else {
            stats.draws += 1;
        }
    }

    #[must_use]
    pub fn win_rate(&self, kind: GameKind) -> f64 {
        self.stats(kind).win_rate()
    }

    #[must_use]
    pub fn average_reward(&self, kind: GameKind) -> f64 {
        self.stats(kind).average_reward()
    }

    /// Mean of the per-game win rates, each game weighted equally.
    #[must_use]
    pub fn average_win_rate(&self) -> f64 {
        GameKind::ALL.iter().map(|&k| self.win_rate(k)).sum::<f64>() / GameKind::ALL.len() as f64
    }

    /// One training step through the trainer, recorded for trainees.
    pub fn train(&mut self, batch: &[Experience], kind: GameKind) -> LossReport {
        let report = self.trainer.train_step(batch, kind);
        if let AgentRole::Trainee(record) = &mut self.role {
            record.training_iterations += 1;
            if record.recent_losses.len() == RECENT_LOSSES {
                record.recent_losses.pop_front();
            }
            record.recent_losses.push_back(report.total_loss);
        }
        report
    }

    /// Take `other`'s weights. Statistics and role stay.
    pub fn copy_weights_from(&mut self, other: &Agent) {
        self.trainer.copy_weights_from(&other.trainer);
    }

    /// Take the challenger's weights and log the promotion.
    pub fn promote_from(&mut self, challenger: &Agent, generation: u64, win_rate: f64) {
        self.copy_weights_from(challenger);
        if let AgentRole::Champion(record) = &mut self.role {
            record.promotion_history.push(PromotionRecord {
                generation,
                promoted_from: challenger.name.clone(),
                win_rate,
            });
        }
        info!(
            agent = %self.name,
            from = %challenger.name,
            generation,
            win_rate,
            "promoted"
        );
    }

    pub fn record_defense(&mut self, won: bool) {
        if let AgentRole::Champion(record) = &mut self.role {
            if won {
                record.defense_wins += 1;
            } else {
                record.defense_losses += 1;
            }
        }
    }

    /// See [`ChampionRecord::defense_rate`]. 1.0 for other roles.
    #[must_use]
    pub fn defense_rate(&self) -> f64 {
        match &self.role {
            AgentRole::Champion(record) => record.defense_rate(),
            _ => 1.0,
        }
    }

    /// Fresh random weights and optimizer.
    pub fn reset_to_fresh(&mut self) {
        self.trainer.reinitialize();
        if let AgentRole::Wildcard(record) = &mut self.role {
            record.resets += 1;
        }
    }

    pub fn record_baseline(&mut self, opponent: &str, score: f64, generation: u64) {
        if let AgentRole::Wildcard(record) = &mut self.role {
            record.baselines.push(BaselineScore {
                opponent: opponent.to_string(),
                score,
                generation,
            });
        }
    }

    /// Least-squares slope of the last [`TREND_WINDOW`] scores against
    /// `opponent`. Zero with fewer than two scores.
    #[must_use]
    pub fn baseline_trend(&self, opponent: &str) -> f64 {
        let AgentRole::Wildcard(record) = &self.role else {
            return 0.0;
        };
        let scores: Vec<f64> = record
            .baselines
            .iter()
            .filter(|b| b.opponent == opponent)
            .map(|b| b.score)
            .collect();
        let recent = &scores[scores.len().saturating_sub(TREND_WINDOW)..];
        slope(recent)
    }

    /// Write weights, optimizer, statistics and role into `dir`.
    pub fn save(&self, dir: &Path, generation: u64) -> Result<(), CheckpointError> {
        self.trainer.save_checkpoint(dir, generation)?;
        let file = AgentFile {
            name: self.name.clone(),
            role: self.role.clone(),
            stats: self.stats.clone(),
        };
        let path = dir.join(AGENT_FILE);
        let text = serde_json::to_string_pretty(&file)?;
        fs::write(&path, text).map_err(|e| CheckpointError::io(path, e))
    }

    /// Restore from a directory written by [`Agent::save`]. Returns the
    /// recorded generation.
    pub fn load(&mut self, dir: &Path) -> Result<u64, CheckpointError> {
        let path = dir.join(AGENT_FILE);
        if !path.exists() {
            return Err(CheckpointError::Missing(path));
        }
        let text = fs::read_to_string(&path).map_err(|e| CheckpointError::io(&path, e))?;
        let file: AgentFile = serde_json::from_str(&text)?;

        let generation = self.trainer.load_checkpoint(dir)?;
        self.role = file.role;
        self.stats = file.stats;
        Ok(generation)
    }

    #[must_use]
    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            name: self.name.clone(),
            role: self.role.clone(),
            stats: self.stats.clone(),
            win_rates: GameKind::ALL.iter().map(|&k| (k, self.win_rate(k))).collect(),
            average_rewards: GameKind::ALL
                .iter()
                .map(|&k| (k, self.average_reward(k)))
                .collect(),
            parameter_count: self.trainer.model_info().parameter_count,
            training_steps: self.trainer.steps(),
        }
    }
}

fn slope(ys: &[f64]) -> f64 {
    if ys.len() < 2 {
        return 0.0;
    }
    let n = ys.len() as f64;
    let sum_x: f64 = (0..ys.len()).map(|i| i as f64).sum();
    let sum_xx: f64 = (0..ys.len()).map(|i| (i * i) as f64).sum();
    let sum_y: f64 = ys.iter().sum();
    let sum_xy: f64 = ys.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator == 0.0 {
        0.0
    } else {
        (n * sum_xy - sum_x * sum_y) / denominator
    }
}
