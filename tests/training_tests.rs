//! Training pipeline: experiences through the buffer into the network.

use std::sync::Arc;

use proptest::prelude::*;
use rust_cheche::core::{CapturingDiagnostics, GameRng};
use rust_cheche::games::{ChessGame, Game, GameKind};
use rust_cheche::nn::{EncodedState, NetworkConfig};
use rust_cheche::training::{Experience, ReplayBuffer, TrainingManager};

/// Experiences from a short deterministic chess game, rewards alternating
/// by side.
fn chess_experiences(count: usize) -> Vec<Experience> {
    let game = ChessGame::new();
    let mut board = game.create_board();
    let mut history = Vec::new();
    let mut out = Vec::with_capacity(count);

    while out.len() < count {
        if game.is_game_over(&board) {
            board = game.create_board();
            history.clear();
        }
        let moves = game.legal_moves(&board);
        let p = 1.0 / moves.len() as f32;
        let policy = moves.iter().map(|m| (game.move_index(&board, m), p)).collect();
        let state = game.board_to_tensor(&board, &history);
        let side = game.current_player(&board);
        out.push(
            Experience::new(state, policy, "Champion", GameKind::Chess)
                .with_reward(f32::from(side) * 0.5),
        );

        let mv = moves[out.len() % moves.len()];
        history.push(board.clone());
        if history.len() > 7 {
            history.remove(0);
        }
        game.make_move(&mut board, &mv).unwrap();
    }
    out
}

fn experience_with_reward(reward: f32) -> Experience {
    let state = EncodedState::zeros(vec![112, 8, 8]);
    Experience::new(state, vec![(0, 1.0)], "Alpha", GameKind::Checkers).with_reward(reward)
}

// =============================================================================
// Buffer To Network
// =============================================================================

#[test]
fn test_sampled_batches_train_the_network() {
    let mut buffer = ReplayBuffer::new(1000);
    buffer.extend(chess_experiences(100));
    assert_eq!(buffer.len(), 100);

    let diagnostics = Arc::new(CapturingDiagnostics::new());
    let mut manager = TrainingManager::new(NetworkConfig::tiny(), 0.001, diagnostics.clone());
    let before = manager.fingerprint();
    let mut rng = GameRng::new(7);

    for _ in 0..5 {
        let batch = buffer.sample(16, &mut rng);
        assert_eq!(batch.len(), 16);
        let report = manager.train_step(&batch, GameKind::Chess);
        assert!(report.is_finite());
        assert!(report.total_loss > 0.0);
    }

    assert_eq!(manager.steps(), 5);
    assert_ne!(manager.fingerprint(), before);
    assert!(diagnostics.is_empty());
}

#[test]
fn test_evaluation_reports_accuracy_range() {
    let manager = TrainingManager::new(
        NetworkConfig::tiny(),
        0.001,
        Arc::new(CapturingDiagnostics::new()),
    );
    let batch = chess_experiences(12);

    let evaluation = manager.evaluate_batch(&batch, GameKind::Chess).unwrap();

    assert!(evaluation.loss.is_finite());
    assert!((0.0..=1.0).contains(&evaluation.policy_accuracy));
    assert!(evaluation.value_mae >= 0.0);
}

#[test]
fn test_buffer_survives_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("buffer.bin");
    let mut buffer = ReplayBuffer::new(50);
    buffer.extend(chess_experiences(20));

    buffer.save(&path).unwrap();
    let restored = ReplayBuffer::load(&path).unwrap();

    assert_eq!(restored.len(), 20);
    assert_eq!(restored.capacity(), 50);
    assert!(restored.iter().eq(buffer.iter()));
}

// =============================================================================
// Eviction
// =============================================================================

proptest! {
    #[test]
    fn prop_buffer_keeps_newest(capacity in 1usize..20, added in 0usize..60) {
        let mut buffer = ReplayBuffer::new(capacity);
        for i in 0..added {
            buffer.add(experience_with_reward(i as f32 / 100.0));
        }

        prop_assert_eq!(buffer.len(), added.min(capacity));
        let first = added.saturating_sub(capacity);
        for (offset, experience) in buffer.iter().enumerate() {
            let expected = (first + offset) as f32 / 100.0;
            prop_assert_eq!(experience.reward, Some(expected));
        }
    }
}
