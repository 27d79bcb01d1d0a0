//! The league loop.
//!
//! ## Generation phases
//!
//! 1. **Games**: `games_per_generation` matches from a fixed roster fill the
//!    replay buffer
//! 2. **Training**: Champion, Alpha and Beta train on sampled batches
//! 3. **Challenger** (every `challenger_interval`): the better trainee plays
//!    the Champion and replaces it above `challenger_threshold`
//! 4. **Wildcard** (every `wildcard_interval`): a freshly initialized agent
//!    measures the Champion's absolute strength
//! 5. **Save** (every `save_interval`)
//!
//! Phases never overlap. Cancellation is only observed between generations.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::agent::{Agent, AgentSummary, Specialization};
use super::competition::{Competition, MatchStatistics};
use super::matches::MatchConfig;
use crate::core::{
    retry, Backoff, CheckpointError, ConfigError, GameRng, GameRngState, LeagueConfig,
    SharedDiagnostics,
};
use crate::games::{ChessGame, GameKind};
use crate::training::{BufferStats, Experience, ReplayBuffer};

const COMPONENT: &str = "league";
const SAVE_ATTEMPTS: u32 = 2;
/// Roster matches per game kind: self-play plus both trainee orders.
const ROSTER_PER_KIND: usize = 3;

/// Trainee that may challenge the Champion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Challenger {
    Alpha,
    Beta,
}

/// One entry of the append-only champion log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChampionChange {
    pub generation: u64,
    pub promoted_from: String,
    pub win_rate: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChallengerResult {
    pub challenger: String,
    pub win_rate: f64,
    pub promoted: bool,
}

/// What happened in one generation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub generation: u64,
    pub experiences: usize,
    /// Mean total loss per trained agent; empty when training was skipped.
    pub losses: Vec<(String, f32)>,
    pub challenger: Option<ChallengerResult>,
    pub wildcard_win_rate: Option<f64>,
    pub saved: bool,
}

/// Contents of `training_stats_gen_{g}.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingStats {
    pub generation: u64,
    pub champion_history: Vec<ChampionChange>,
    pub buffer_stats: BufferStats,
    pub agent_stats: Vec<AgentSummary>,
    pub competition_stats: MatchStatistics,
    /// Sampling stream position, so a resumed run draws the same batches.
    #[serde(default)]
    pub rng: Option<GameRngState>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingSummary {
    /// Generations completed.
    pub generation: u64,
    pub champion_changes: usize,
    pub buffer_utilization: f64,
    pub champion_defense_rate: f64,
    pub wildcard_trend: f64,
    pub matches_played: usize,
    pub agents: Vec<AgentSummary>,
}

pub struct LeagueManager {
    config: LeagueConfig,
    champion: Agent,
    alpha: Agent,
    beta: Agent,
    wildcard: Agent,
    buffer: ReplayBuffer,
    competition: Competition,
    generation: u64,
    champion_history: Vec<ChampionChange>,
    rng: GameRng,
    cancel: Arc<AtomicBool>,
    diagnostics: SharedDiagnostics,
}

impl LeagueManager {
    pub fn new(config: LeagueConfig, diagnostics: SharedDiagnostics) -> Result<Self, ConfigError> {
        config.validate()?;
        if !config.uses_cpu() {
            diagnostics.warn(
                COMPONENT,
                &format!("device `{}` is not available, using cpu", config.device),
            );
        }

        let lr = config.learning_rate;
        let net = config.network;
        let champion = Agent::champion(net, lr, diagnostics.clone());
        let mut alpha = Agent::trainee("Alpha", Specialization::Opening, net, lr, diagnostics.clone());
        let mut beta = Agent::trainee("Beta", Specialization::Endgame, net, lr, diagnostics.clone());
        let wildcard = Agent::wildcard(net, lr, diagnostics.clone());
        alpha.copy_weights_from(&champion);
        beta.copy_weights_from(&champion);

        let mut rng = GameRng::new(config.seed);
        let competition = Competition::new(
            MatchConfig::from(&config),
            rng.fork().seed(),
            diagnostics.clone(),
        )
        .with_chess(ChessGame::with_shaping(config.reward_shaping.clone()));

        info!(
            parameters = champion.trainer().model_info().parameter_count,
            buffer_capacity = config.buffer_capacity,
            "league initialized"
        );

        Ok(Self {
            buffer: ReplayBuffer::new(config.buffer_capacity),
            config,
            champion,
            alpha,
            beta,
            wildcard,
            competition,
            generation: 0,
            champion_history: Vec::new(),
            rng,
            cancel: Arc::new(AtomicBool::new(false)),
            diagnostics,
        })
    }

    /// Set to stop [`LeagueManager::run`] after the current generation.
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run up to `num_generations` generations. Returns one report per
    /// completed generation.
    pub fn run(&mut self, num_generations: u64) -> Vec<GenerationReport> {
        info!(generations = num_generations, start = self.generation, "league run started");
        let mut reports = Vec::new();
        for _ in 0..num_generations {
            if self.cancel.load(Ordering::SeqCst) {
                info!(generation = self.generation, "league run cancelled");
                break;
            }
            reports.push(self.run_generation());
        }
        reports
    }

    /// Run every phase of one generation in order.
    pub fn run_generation(&mut self) -> GenerationReport {
        let generation = self.generation;
        info!(generation, "generation started");
        let mut report = GenerationReport {
            generation,
            ..GenerationReport::default()
        };

        report.experiences = self.play_games();
        report.losses = self.train();

        if (generation + 1) % self.config.challenger_interval == 0 {
            report.challenger = Some(self.challenger_phase());
        }
        if (generation + 1) % self.config.wildcard_interval == 0 {
            report.wildcard_win_rate = Some(self.wildcard_phase());
        }
        if (generation + 1) % self.config.save_interval == 0 {
            match self.save_checkpoint(generation) {
                Ok(()) => report.saved = true,
                Err(err) => self.diagnostics.warn(
                    COMPONENT,
                    &format!("checkpoint for generation {generation} failed: {err}"),
                ),
            }
        }

        self.generation = generation + 1;
        info!(
            generation,
            buffer = self.buffer.len(),
            defense_rate = self.champion.defense_rate(),
            alpha_win_rate = self.alpha.average_win_rate(),
            beta_win_rate = self.beta.average_win_rate(),
            "generation finished"
        );
        report
    }

    /// Play `games_per_generation` matches, cycling through the roster:
    /// Champion self-play, Alpha vs Beta, then Beta vs Alpha for each game
    /// kind. Returns the experiences added.
    fn play_games(&mut self) -> usize {
        let mut total = 0;
        for slot in 0..self.config.games_per_generation {
            let kind = GameKind::ALL[(slot / ROSTER_PER_KIND) % GameKind::ALL.len()];
            let buffer = Some(&mut self.buffer);
            let result = match slot % ROSTER_PER_KIND {
                0 => self
                    .competition
                    .play_self_match(&mut self.champion, kind, buffer),
                1 => self
                    .competition
                    .play_match(&mut self.alpha, &mut self.beta, kind, buffer),
                _ => self
                    .competition
                    .play_match(&mut self.beta, &mut self.alpha, kind, buffer),
            };
            total += result.moves;
        }
        info!(
            matches = self.config.games_per_generation,
            experiences = total,
            buffer = self.buffer.len(),
            "games generated"
        );
        total
    }

    fn train(&mut self) -> Vec<(String, f32)> {
        if self.buffer.len() < self.config.batch_size {
            info!(
                buffer = self.buffer.len(),
                batch_size = self.config.batch_size,
                "not enough experiences, skipping training"
            );
            return Vec::new();
        }

        let steps = self.config.training_steps_per_generation;
        let batch_size = self.config.batch_size;
        let mut losses = Vec::with_capacity(3);
        for agent in [&mut self.champion, &mut self.alpha, &mut self.beta] {
            let mut total = 0.0;
            for _ in 0..steps {
                let batch = self.buffer.sample(batch_size, &mut self.rng);
                total += train_mixed(agent, &batch);
            }
            let mean = if steps == 0 { 0.0 } else { total / steps as f32 };
            info!(agent = agent.name(), loss = mean, "trained");
            losses.push((agent.name().to_string(), mean));
        }
        losses
    }

    /// Trainee with the higher average win rate; Beta on ties.
    #[must_use]
    pub fn select_challenger(&self) -> Challenger {
        if self.alpha.average_win_rate() > self.beta.average_win_rate() {
            Challenger::Alpha
        } else {
            Challenger::Beta
        }
    }

    fn challenger_phase(&mut self) -> ChallengerResult {
        let challenger = self.select_challenger();
        let contender = match challenger {
            Challenger::Alpha => &self.alpha,
            Challenger::Beta => &self.beta,
        };
        let report = self.competition.evaluate_agents(
            contender,
            &self.champion,
            &GameKind::ALL,
            self.config.challenger_eval_games,
        );
        let name = contender.name().to_string();
        let win_rate = report.win_rate();
        let promoted = self.apply_challenger_result(challenger, win_rate);
        ChallengerResult {
            challenger: name,
            win_rate,
            promoted,
        }
    }

    /// Promote `challenger` if `win_rate` beats the threshold, otherwise
    /// count a successful defense. Returns whether a promotion happened.
    pub fn apply_challenger_result(&mut self, challenger: Challenger, win_rate: f64) -> bool {
        let generation = self.generation;
        if win_rate > self.config.challenger_threshold {
            let contender = match challenger {
                Challenger::Alpha => &self.alpha,
                Challenger::Beta => &self.beta,
            };
            self.champion.promote_from(contender, generation, win_rate);
            self.champion_history.push(ChampionChange {
                generation,
                promoted_from: contender.name().to_string(),
                win_rate,
            });
            self.alpha.copy_weights_from(&self.champion);
            self.beta.copy_weights_from(&self.champion);
            true
        } else {
            self.champion.record_defense(true);
            info!(generation, win_rate, "champion defended");
            false
        }
    }

    fn wildcard_phase(&mut self) -> f64 {
        self.wildcard.reset_to_fresh();
        let win_rate = self
            .competition
            .evaluate_agents(
                &self.champion,
                &self.wildcard,
                &GameKind::ALL,
                self.config.wildcard_eval_games,
            )
            .win_rate();
        let champion = self.champion.name().to_string();
        self.wildcard.record_baseline(&champion, win_rate, self.generation);
        info!(
            win_rate,
            trend = self.wildcard.baseline_trend(&champion),
            "wildcard baseline"
        );
        win_rate
    }

    // =========================================================================
    // Checkpoints
    // =========================================================================

    fn agent_dir(&self, agent: &Agent, generation: u64) -> PathBuf {
        self.config.checkpoint_dir.join(format!(
            "{}_gen_{generation}",
            agent.name().to_lowercase()
        ))
    }

    fn stats_path(&self, generation: u64) -> PathBuf {
        self.config
            .checkpoint_dir
            .join(format!("training_stats_gen_{generation}.json"))
    }

    fn buffer_path(&self, generation: u64) -> PathBuf {
        self.config
            .checkpoint_dir
            .join(format!("replay_buffer_gen_{generation}.bin"))
    }

    /// Save the trained agents, the league statistics and the buffer.
    ///
    /// A failing agent or buffer write is reported and skipped; the
    /// statistics file must be written.
    pub fn save_checkpoint(&self, generation: u64) -> Result<(), CheckpointError> {
        let dir = &self.config.checkpoint_dir;
        fs::create_dir_all(dir).map_err(|e| CheckpointError::io(dir, e))?;

        for agent in [&self.champion, &self.alpha, &self.beta] {
            let path = self.agent_dir(agent, generation);
            let saved = retry(
                |_| agent.save(&path, generation),
                SAVE_ATTEMPTS,
                Backoff::Fixed(Duration::from_millis(50)),
            );
            if let Err(err) = saved {
                self.diagnostics.warn(
                    COMPONENT,
                    &format!("saving {} failed: {err}", agent.name()),
                );
            }
        }
        if let Err(err) = self.buffer.save(self.buffer_path(generation)) {
            self.diagnostics
                .warn(COMPONENT, &format!("saving replay buffer failed: {err}"));
        }

        let stats = TrainingStats {
            generation,
            champion_history: self.champion_history.clone(),
            buffer_stats: self.buffer.statistics(),
            agent_stats: self.agents().map(Agent::summary).collect(),
            competition_stats: self.competition.match_statistics(),
            rng: Some(self.rng.state()),
        };
        let path = self.stats_path(generation);
        let text = serde_json::to_string_pretty(&stats)?;
        fs::write(&path, text).map_err(|e| CheckpointError::io(&path, e))?;

        info!(generation, dir = %dir.display(), "checkpoint saved");
        Ok(())
    }

    /// Restore agents, champion history and the generation counter from
    /// the checkpoint of `generation`. Training resumes with the next one.
    pub fn load_checkpoint(&mut self, generation: u64) -> Result<u64, CheckpointError> {
        let path = self.stats_path(generation);
        if !path.exists() {
            return Err(CheckpointError::Missing(path));
        }
        let text = fs::read_to_string(&path).map_err(|e| CheckpointError::io(&path, e))?;
        let stats: TrainingStats = serde_json::from_str(&text)?;

        let dirs: Vec<PathBuf> = [&self.champion, &self.alpha, &self.beta]
            .into_iter()
            .map(|a| self.agent_dir(a, generation))
            .collect();
        self.champion.load(&dirs[0])?;
        self.alpha.load(&dirs[1])?;
        self.beta.load(&dirs[2])?;

        match ReplayBuffer::load(self.buffer_path(generation)) {
            Ok(buffer) => self.buffer = buffer,
            Err(err) => warn!(%err, "replay buffer not restored, starting empty"),
        }

        if let Some(state) = &stats.rng {
            self.rng = GameRng::from_state(state);
        }
        self.champion_history = stats.champion_history;
        self.generation = stats.generation + 1;
        info!(generation = stats.generation, "checkpoint loaded");
        Ok(stats.generation)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[must_use]
    pub fn training_summary(&self) -> TrainingSummary {
        TrainingSummary {
            generation: self.generation,
            champion_changes: self.champion_history.len(),
            buffer_utilization: self.buffer.statistics().utilization,
            champion_defense_rate: self.champion.defense_rate(),
            wildcard_trend: self.wildcard.baseline_trend(self.champion.name()),
            matches_played: self.competition.matches_played(),
            agents: self.agents().map(Agent::summary).collect(),
        }
    }

    /// Generations completed.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn config(&self) -> &LeagueConfig {
        &self.config
    }

    #[must_use]
    pub fn champion_history(&self) -> &[ChampionChange] {
        &self.champion_history
    }

    #[must_use]
    pub fn champion(&self) -> &Agent {
        &self.champion
    }

    #[must_use]
    pub fn challenger(&self, which: Challenger) -> &Agent {
        match which {
            Challenger::Alpha => &self.alpha,
            Challenger::Beta => &self.beta,
        }
    }

    pub fn challenger_mut(&mut self, which: Challenger) -> &mut Agent {
        match which {
            Challenger::Alpha => &mut self.alpha,
            Challenger::Beta => &mut self.beta,
        }
    }

    #[must_use]
    pub fn wildcard(&self) -> &Agent {
        &self.wildcard
    }

    #[must_use]
    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut ReplayBuffer {
        &mut self.buffer
    }

    #[must_use]
    pub fn competition(&self) -> &Competition {
        &self.competition
    }

    /// Champion, Alpha, Beta, Wildcard.
    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        [&self.champion, &self.alpha, &self.beta, &self.wildcard].into_iter()
    }

    #[must_use]
    pub fn checkpoint_dir(&self) -> &Path {
        &self.config.checkpoint_dir
    }
}

/// Train on each game kind present in `batch`, one forward pass per kind.
fn train_mixed(agent: &mut Agent, batch: &[Experience]) -> f32 {
    let mut loss = 0.0;
    for kind in GameKind::ALL {
        let part: Vec<Experience> = batch.iter().filter(|e| e.game == kind).cloned().collect();
        if !part.is_empty() {
            loss += agent.train(&part, kind).total_loss;
        }
    }
    loss
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CapturingDiagnostics;
    use crate::games::{CheckersGame, Game};
    use crate::nn::NetworkConfig;

    fn tiny_config(dir: &Path) -> LeagueConfig {
        LeagueConfig::default()
            .with_network(NetworkConfig::tiny())
            .with_mcts_simulations(2)
            .with_max_moves(4)
            .with_batch_size(4)
            .with_training_steps(1)
            .with_eval_games(1, 1)
            .with_intervals(1, 1, 1)
            .with_checkpoint_dir(dir)
    }

    #[test]
    fn test_trainees_start_from_champion() {
        let dir = tempfile::tempdir().unwrap();
        let manager =
            LeagueManager::new(tiny_config(dir.path()), Arc::new(CapturingDiagnostics::new()))
                .unwrap();
        let champion = manager.champion().trainer().fingerprint();
        assert_eq!(manager.challenger(Challenger::Alpha).trainer().fingerprint(), champion);
        assert_eq!(manager.challenger(Challenger::Beta).trainer().fingerprint(), champion);
        assert_eq!(manager.agents().count(), 4);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = LeagueConfig::default().with_batch_size(0);
        assert!(LeagueManager::new(config, Arc::new(CapturingDiagnostics::new())).is_err());
    }

    #[test]
    fn test_unknown_device_warns() {
        let dir = tempfile::tempdir().unwrap();
        let diagnostics = Arc::new(CapturingDiagnostics::new());
        let config = LeagueConfig {
            device: "cuda".to_string(),
            ..tiny_config(dir.path())
        };
        LeagueManager::new(config, diagnostics.clone()).unwrap();
        assert_eq!(diagnostics.count(COMPONENT), 1);
    }

    #[test]
    fn test_challenger_selection() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager =
            LeagueManager::new(tiny_config(dir.path()), Arc::new(CapturingDiagnostics::new()))
                .unwrap();
        assert_eq!(manager.select_challenger(), Challenger::Beta);

        manager
            .challenger_mut(Challenger::Alpha)
            .record_game(GameKind::Chess, 1.0);
        assert_eq!(manager.select_challenger(), Challenger::Alpha);
    }

    #[test]
    fn test_cancelled_run_plays_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager =
            LeagueManager::new(tiny_config(dir.path()), Arc::new(CapturingDiagnostics::new()))
                .unwrap();
        manager.cancel_handle().store(true, Ordering::SeqCst);

        assert!(manager.run(3).is_empty());
        assert_eq!(manager.generation(), 0);
        assert!(manager.buffer().is_empty());
    }

    #[test]
    fn test_train_mixed_splits_by_kind() {
        let mut agent = Agent::champion(
            NetworkConfig::tiny(),
            0.001,
            Arc::new(CapturingDiagnostics::new()),
        );
        assert_eq!(train_mixed(&mut agent, &[]), 0.0);
        assert_eq!(agent.trainer().steps(), 0);

        let mut batch = start_experiences(&ChessGame::new(), 3);
        batch.extend(start_experiences(&CheckersGame::new(), 3));
        let loss = train_mixed(&mut agent, &batch);
        assert!(loss > 0.0 && loss.is_finite());
        assert_eq!(agent.trainer().steps(), 2);

        train_mixed(&mut agent, &start_experiences(&CheckersGame::new(), 4));
        assert_eq!(agent.trainer().steps(), 3);
    }

    fn start_experiences<G: Game>(game: &G, n: usize) -> Vec<Experience> {
        let board = game.create_board();
        let moves = game.legal_moves(&board);
        let policy: Vec<(usize, f32)> = moves
            .iter()
            .map(|m| (game.move_index(&board, m), 1.0 / moves.len() as f32))
            .collect();
        (0..n)
            .map(|i| {
                let reward = if i % 2 == 0 { 1.0 } else { -1.0 };
                let state = game.board_to_tensor(&board, &[]);
                Experience::new(state, policy.clone(), "Champion", game.kind()).with_reward(reward)
            })
            .collect()
    }
}
