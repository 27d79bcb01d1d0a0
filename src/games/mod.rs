//! Game abstraction and the concrete rule engines.
//!
//! ## Overview
//!
//! - **Game**: capability trait every two-player perfect-information game
//!   implements (legal moves, validated move application, terminal checks,
//!   rewards, tensor encoding, policy-head indexing)
//! - **GameKind**: closed set of games that own a policy head
//! - **chess**, **checkers**: the two league games
//! - **tiny**: a three-move toy game for tests and examples
//!
//! ## Conventions
//!
//! Players are `+1` (moves first) and `-1`. `reward` and network values
//! are always from the perspective of the side to move. Encoded tensors are
//! `[112, 8, 8]`: 8 positions of 14 planes, the current position first.
//!
//! ## Usage
//!
//! ```
//! use rust_cheche::games::{Game, TinyGame};
//!
//! let game = TinyGame;
//! let mut board = game.create_board();
//! let moves = game.legal_moves(&board);
//! game.make_move(&mut board, &moves[0]).unwrap();
//! assert_eq!(game.current_player(&board), -1);
//! ```

pub mod checkers;
pub mod chess;
pub mod tiny;

use std::fmt;
use std::hash::Hash;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::GameError;
use crate::nn::EncodedState;

pub use self::checkers::{CheckersBoard, CheckersGame, CheckersMove};
pub use self::chess::{ChessBoard, ChessGame, RewardShaping};
pub use self::tiny::{TinyBoard, TinyGame, TinyMove};

/// Board edge length shared by every game.
pub const BOARD_SIZE: usize = 8;

/// Feature planes per encoded position.
pub const PLANES_PER_POSITION: usize = 14;

/// Positions stacked into one network input.
pub const HISTORY_LENGTH: usize = 8;

/// Channels of the network input.
pub const INPUT_CHANNELS: usize = PLANES_PER_POSITION * HISTORY_LENGTH;

/// Plane holding the side-to-move flag.
pub const TURN_PLANE: usize = 12;

/// Plane holding the normalized move counter.
pub const MOVE_COUNT_PLANE: usize = 13;

const PLANE_AREA: usize = BOARD_SIZE * BOARD_SIZE;

// =============================================================================
// GameKind
// =============================================================================

/// Games with their own policy head.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    Chess,
    Checkers,
}

impl GameKind {
    /// Every kind, in roster order.
    pub const ALL: [GameKind; 2] = [GameKind::Chess, GameKind::Checkers];

    /// Width of this kind's policy head.
    #[must_use]
    pub const fn action_size(self) -> usize {
        match self {
            GameKind::Chess => 4672,
            GameKind::Checkers => 1000,
        }
    }

    /// Lowercase name used in file names and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            GameKind::Chess => "chess",
            GameKind::Checkers => "checkers",
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GameKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chess" => Ok(GameKind::Chess),
            "checkers" | "draughts" => Ok(GameKind::Checkers),
            other => Err(format!("unknown game kind `{other}`")),
        }
    }
}

// =============================================================================
// Material bookkeeping
// =============================================================================

/// Per-side piece counts, indexed `[side][piece_type]`.
///
/// Side 0 is player `+1`. Piece type 0 is the promotable piece (pawn, man).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Material {
    pub counts: [[u16; 6]; 2],
}

impl Material {
    /// Total pieces on one side.
    #[must_use]
    pub fn total(&self, side: usize) -> u16 {
        self.counts[side].iter().sum()
    }
}

/// Check a board transition against the material it is allowed to change.
///
/// The mover keeps every piece except that one piece of type 0 may turn into
/// `promotion`. The opponent never gains pieces and loses a number of pieces
/// inside `captures`.
pub fn check_transition(
    before: &Material,
    after: &Material,
    mover: usize,
    promotion: Option<usize>,
    captures: RangeInclusive<u16>,
) -> Result<(), String> {
    let opponent = 1 - mover;

    for piece in 0..6 {
        let mut expected = i32::from(before.counts[mover][piece]);
        if let Some(promoted) = promotion {
            if piece == 0 {
                expected -= 1;
            }
            if piece == promoted {
                expected += 1;
            }
        }
        let actual = i32::from(after.counts[mover][piece]);
        if actual != expected {
            return Err(format!(
                "mover piece type {piece} went from {} to {actual}",
                before.counts[mover][piece]
            ));
        }
        if after.counts[opponent][piece] > before.counts[opponent][piece] {
            return Err(format!("opponent gained piece type {piece}"));
        }
    }

    let lost = before.total(opponent) - after.total(opponent);
    if !captures.contains(&lost) {
        return Err(format!(
            "opponent lost {lost} pieces, expected {}..={}",
            captures.start(),
            captures.end()
        ));
    }
    Ok(())
}

// =============================================================================
// Game trait
// =============================================================================

/// Capability interface for a two-player perfect-information game.
///
/// ## Implementation Notes
///
/// - `make_move` must leave the board unchanged when it returns an error
/// - `reward` is from the side to move and stays within `[-1, 1]`
/// - `encode_planes` writes exactly [`PLANES_PER_POSITION`] 8x8 planes
pub trait Game {
    /// Board state. `Clone` must produce an independent deep copy.
    type Board: Clone + fmt::Debug;

    /// A move for the side to move.
    type Move: Clone + Eq + Hash + fmt::Debug + fmt::Display;

    /// Policy head this game trains.
    fn kind(&self) -> GameKind;

    /// Fresh starting position.
    fn create_board(&self) -> Self::Board;

    /// All legal moves for the side to move. Empty means no moves.
    fn legal_moves(&self, board: &Self::Board) -> Vec<Self::Move>;

    /// Apply a legal move, validating the resulting material.
    fn make_move(&self, board: &mut Self::Board, mv: &Self::Move) -> Result<(), GameError>;

    /// Whether the game has ended.
    fn is_game_over(&self, board: &Self::Board) -> bool;

    /// `+1`, `-1`, or `0` for a draw or an ongoing game.
    fn winner(&self, board: &Self::Board) -> i8;

    /// `+1` or `-1`.
    fn current_player(&self, board: &Self::Board) -> i8;

    /// Independent deep copy.
    fn copy_board(&self, board: &Self::Board) -> Self::Board {
        board.clone()
    }

    /// Write this position's planes into `planes` (`14 * 64` values, zeroed).
    fn encode_planes(&self, board: &Self::Board, planes: &mut [f32]);

    /// Reward in `[-1, 1]` for the side to move.
    fn reward(&self, board: &Self::Board) -> f32;

    /// Policy-head index of `mv` in this position.
    fn move_index(&self, board: &Self::Board, mv: &Self::Move) -> usize;

    /// Piece counts for transition validation.
    fn material(&self, board: &Self::Board) -> Material;

    /// Human-readable board for logs.
    fn board_string(&self, board: &Self::Board) -> String;

    /// Pieces `mv` would capture, described for logs.
    fn captured_pieces(&self, board: &Self::Board, mv: &Self::Move) -> Vec<String>;

    /// Width of the policy head.
    fn action_size(&self) -> usize {
        self.kind().action_size()
    }

    /// Network input for `board` preceded by `history` (oldest first).
    fn board_to_tensor(&self, board: &Self::Board, history: &[Self::Board]) -> EncodedState {
        stack_history(board, history, |b, planes| self.encode_planes(b, planes))
    }

    /// Reward from player `+1`'s perspective.
    fn first_player_reward(&self, board: &Self::Board) -> f32 {
        self.reward(board) * f32::from(self.current_player(board))
    }
}

/// Stack the current position and up to seven previous ones into a
/// `[112, 8, 8]` tensor, padding with the current position.
pub fn stack_history<B, F>(current: &B, history: &[B], encode: F) -> EncodedState
where
    F: Fn(&B, &mut [f32]),
{
    let block = PLANES_PER_POSITION * PLANE_AREA;
    let mut tensor = vec![0.0f32; HISTORY_LENGTH * block];

    for (slot, chunk) in tensor.chunks_mut(block).enumerate() {
        let board = if slot == 0 {
            current
        } else {
            history
                .len()
                .checked_sub(slot)
                .and_then(|i| history.get(i))
                .unwrap_or(current)
        };
        encode(board, chunk);
    }

    EncodedState::new(tensor, vec![INPUT_CHANNELS, BOARD_SIZE, BOARD_SIZE])
}

/// Set one square of one plane.
#[inline]
pub(crate) fn set_square(planes: &mut [f32], plane: usize, row: usize, col: usize, value: f32) {
    planes[plane * PLANE_AREA + row * BOARD_SIZE + col] = value;
}

/// Fill a whole plane with one value.
#[inline]
pub(crate) fn fill_plane(planes: &mut [f32], plane: usize, value: f32) {
    planes[plane * PLANE_AREA..(plane + 1) * PLANE_AREA].fill(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_kind_roundtrip() {
        for kind in GameKind::ALL {
            assert_eq!(kind.name().parse::<GameKind>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.name()));
        }
        assert!("go".parse::<GameKind>().is_err());
        assert_eq!(GameKind::Chess.action_size(), 4672);
        assert_eq!(GameKind::Checkers.action_size(), 1000);
    }

    #[test]
    fn test_stack_history_pads_with_current() {
        // Encode each "board" (a number) as a constant first plane.
        let encode = |b: &u8, planes: &mut [f32]| fill_plane(planes, 0, f32::from(*b));
        let encoded = stack_history(&9u8, &[1u8, 2, 3], encode);

        assert_eq!(encoded.shape, vec![INPUT_CHANNELS, 8, 8]);
        let block = PLANES_PER_POSITION * 64;
        let first = |slot: usize| encoded.tensor[slot * block];
        assert_eq!(first(0), 9.0);
        assert_eq!(first(1), 3.0);
        assert_eq!(first(2), 2.0);
        assert_eq!(first(3), 1.0);
        assert_eq!(first(4), 9.0);
        assert_eq!(first(7), 9.0);
    }

    #[test]
    fn test_check_transition() {
        let mut before = Material::default();
        before.counts[0] = [8, 2, 2, 2, 1, 1];
        before.counts[1] = [8, 2, 2, 2, 1, 1];

        // Quiet move
        assert!(check_transition(&before, &before, 0, None, 0..=1).is_ok());

        // Capture of a knight
        let mut after = before;
        after.counts[1][1] = 1;
        assert!(check_transition(&before, &after, 0, None, 0..=1).is_ok());
        assert!(check_transition(&before, &after, 0, None, 0..=0).is_err());

        // Promotion to queen
        let mut after = before;
        after.counts[0][0] = 7;
        after.counts[0][4] = 2;
        assert!(check_transition(&before, &after, 0, Some(4), 0..=1).is_ok());
        assert!(check_transition(&before, &after, 0, None, 0..=1).is_err());

        // Mover losing a piece is never valid
        let mut after = before;
        after.counts[0][3] = 1;
        assert!(check_transition(&before, &after, 0, None, 0..=1).is_err());
    }
}
