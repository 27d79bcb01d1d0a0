//! Rules engine behavior shared by every game.

use std::fmt::Debug;

use rust_cheche::games::{CheckersGame, ChessBoard, ChessGame, Game, GameKind, TinyGame};

fn assert_copy_isolated<G: Game>(game: &G)
where
    G::Board: PartialEq + Debug,
{
    let board = game.create_board();
    let mut copy = game.copy_board(&board);
    let mv = game.legal_moves(&copy)[0].clone();
    game.make_move(&mut copy, &mv).unwrap();

    assert_ne!(board, copy);
    assert_eq!(board, game.create_board());
}

fn assert_tensor_deterministic<G: Game>(game: &G) {
    let board = game.create_board();
    let first = game.board_to_tensor(&board, &[]);
    let second = game.board_to_tensor(&game.copy_board(&board), &[]);

    assert_eq!(first, second);
    assert_eq!(first.shape, vec![112, 8, 8]);
    assert!(first.tensor.iter().all(|v| v.is_finite()));
}

// =============================================================================
// Shared Contract
// =============================================================================

#[test]
fn test_copies_are_independent() {
    assert_copy_isolated(&ChessGame::new());
    assert_copy_isolated(&CheckersGame::new());
    assert_copy_isolated(&TinyGame);
}

#[test]
fn test_encoding_is_deterministic() {
    assert_tensor_deterministic(&ChessGame::new());
    assert_tensor_deterministic(&CheckersGame::new());
    assert_tensor_deterministic(&TinyGame);
}

#[test]
fn test_start_positions() {
    let chess = ChessGame::new();
    let checkers = CheckersGame::new();

    assert_eq!(chess.legal_moves(&chess.create_board()).len(), 20);
    assert_eq!(checkers.legal_moves(&checkers.create_board()).len(), 7);
    assert_eq!(chess.current_player(&chess.create_board()), 1);
    assert_eq!(checkers.current_player(&checkers.create_board()), 1);
    assert_eq!(chess.kind(), GameKind::Chess);
    assert_eq!(checkers.kind(), GameKind::Checkers);
}

#[test]
fn test_move_indices_fit_action_space() {
    let chess = ChessGame::new();
    let board = chess.create_board();
    for mv in chess.legal_moves(&board) {
        assert!(chess.move_index(&board, &mv) < chess.action_size());
    }

    let checkers = CheckersGame::new();
    let board = checkers.create_board();
    for mv in checkers.legal_moves(&board) {
        assert!(checkers.move_index(&board, &mv) < checkers.action_size());
    }
}

// =============================================================================
// Outcomes
// =============================================================================

#[test]
fn test_checkmate_rewards() {
    let chess = ChessGame::new();
    let board =
        ChessBoard::from_fen("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3")
            .unwrap();

    assert!(chess.is_game_over(&board));
    assert!(chess.legal_moves(&board).is_empty());
    assert_eq!(chess.winner(&board), -1);
    assert_eq!(chess.reward(&board), -1.0);
    assert_eq!(chess.first_player_reward(&board), -1.0);
}

#[test]
fn test_random_playouts_stay_consistent() {
    let checkers = CheckersGame::new();
    let mut board = checkers.create_board();
    let mut plies = 0;
    while !checkers.is_game_over(&board) && plies < 300 {
        let moves = checkers.legal_moves(&board);
        let mv = moves[plies % moves.len()].clone();
        let mover = checkers.current_player(&board);
        checkers.make_move(&mut board, &mv).unwrap();
        assert_ne!(checkers.current_player(&board), mover);
        plies += 1;
    }

    let reward = checkers.first_player_reward(&board);
    assert!((-1.0..=1.0).contains(&reward));
}
