//! A three-move toy game.
//!
//! A 2x2 grid with cell 0 blocked. Players alternately claim one of cells
//! 1-3. Whoever owns both 2 and 3 wins; a full board without that is a
//! draw. Small enough to search exhaustively, so tests use it to check
//! search and match plumbing without a chess engine in the loop.

use std::fmt;

use super::{fill_plane, set_square, Game, GameKind, Material};
use super::{MOVE_COUNT_PLANE, TURN_PLANE};
use crate::core::GameError;

const CELLS: usize = 4;
const BLOCKED: u8 = 0;

/// Claim a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TinyMove(pub u8);

impl fmt::Display for TinyMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TinyBoard {
    cells: [i8; CELLS],
    to_move: i8,
}

impl Default for TinyBoard {
    fn default() -> Self {
        Self {
            cells: [0; CELLS],
            to_move: 1,
        }
    }
}

impl TinyBoard {
    /// Owner of `cell` (`0` when empty).
    #[must_use]
    pub fn owner(&self, cell: u8) -> i8 {
        self.cells.get(cell as usize).copied().unwrap_or(0)
    }

    fn decided(&self) -> i8 {
        match (self.cells[2], self.cells[3]) {
            (a, b) if a != 0 && a == b => a,
            _ => 0,
        }
    }

    fn full(&self) -> bool {
        (1..CELLS).all(|c| self.cells[c] != 0)
    }
}

impl fmt::Display for TinyBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let glyph = |c: usize| match self.cells[c] {
            _ if c == BLOCKED as usize => '#',
            1 => 'X',
            -1 => 'O',
            _ => '.',
        };
        writeln!(f, "{}{}", glyph(0), glyph(1))?;
        writeln!(f, "{}{}", glyph(2), glyph(3))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TinyGame;

impl Game for TinyGame {
    type Board = TinyBoard;
    type Move = TinyMove;

    /// Shares the checkers head; its three indices fit any head.
    fn kind(&self) -> GameKind {
        GameKind::Checkers
    }

    fn create_board(&self) -> TinyBoard {
        TinyBoard::default()
    }

    fn legal_moves(&self, board: &TinyBoard) -> Vec<TinyMove> {
        if self.is_game_over(board) {
            return Vec::new();
        }
        (1..CELLS as u8)
            .filter(|&c| board.cells[c as usize] == 0)
            .map(TinyMove)
            .collect()
    }

    fn make_move(&self, board: &mut TinyBoard, mv: &TinyMove) -> Result<(), GameError> {
        if self.is_game_over(board) {
            return Err(GameError::illegal(mv, "game is over"));
        }
        match board.cells.get(mv.0 as usize) {
            None => return Err(GameError::illegal(mv, "no such cell")),
            Some(_) if mv.0 == BLOCKED => return Err(GameError::illegal(mv, "cell is blocked")),
            Some(&owner) if owner != 0 => return Err(GameError::illegal(mv, "cell is taken")),
            Some(_) => {}
        }
        board.cells[mv.0 as usize] = board.to_move;
        board.to_move = -board.to_move;
        Ok(())
    }

    fn is_game_over(&self, board: &TinyBoard) -> bool {
        board.decided() != 0 || board.full()
    }

    fn winner(&self, board: &TinyBoard) -> i8 {
        board.decided()
    }

    fn current_player(&self, board: &TinyBoard) -> i8 {
        board.to_move
    }

    fn encode_planes(&self, board: &TinyBoard, planes: &mut [f32]) {
        for (cell, &owner) in board.cells.iter().enumerate() {
            let plane = match owner {
                1 => 0,
                -1 => 2,
                _ => continue,
            };
            set_square(planes, plane, cell / 2, cell % 2, 1.0);
        }
        if board.to_move == 1 {
            fill_plane(planes, TURN_PLANE, 1.0);
        }
        let claimed = board.cells.iter().filter(|&&c| c != 0).count();
        fill_plane(planes, MOVE_COUNT_PLANE, claimed as f32 / 100.0);
    }

    fn reward(&self, board: &TinyBoard) -> f32 {
        f32::from(board.decided() * board.to_move)
    }

    fn move_index(&self, _board: &TinyBoard, mv: &TinyMove) -> usize {
        mv.0 as usize
    }

    fn material(&self, board: &TinyBoard) -> Material {
        let mut material = Material::default();
        for &owner in &board.cells {
            match owner {
                1 => material.counts[0][0] += 1,
                -1 => material.counts[1][0] += 1,
                _ => {}
            }
        }
        material
    }

    fn board_string(&self, board: &TinyBoard) -> String {
        board.to_string()
    }

    fn captured_pieces(&self, _board: &TinyBoard, _mv: &TinyMove) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_player_wins_with_both_bottom_cells() {
        let game = TinyGame;
        let mut board = game.create_board();
        for cell in [2, 1, 3] {
            game.make_move(&mut board, &TinyMove(cell)).unwrap();
        }
        assert!(game.is_game_over(&board));
        assert_eq!(game.winner(&board), 1);
        // Player -1 to move has lost.
        assert_eq!(game.reward(&board), -1.0);
        assert_eq!(game.first_player_reward(&board), 1.0);
        assert!(game.legal_moves(&board).is_empty());
    }

    #[test]
    fn test_split_bottom_is_draw() {
        let game = TinyGame;
        let mut board = game.create_board();
        for cell in [2, 3, 1] {
            game.make_move(&mut board, &TinyMove(cell)).unwrap();
        }
        assert!(game.is_game_over(&board));
        assert_eq!(game.winner(&board), 0);
        assert_eq!(game.reward(&board), 0.0);
    }

    #[test]
    fn test_rejects_blocked_and_taken_cells() {
        let game = TinyGame;
        let mut board = game.create_board();
        assert!(game.make_move(&mut board, &TinyMove(0)).is_err());
        assert!(game.make_move(&mut board, &TinyMove(9)).is_err());
        game.make_move(&mut board, &TinyMove(1)).unwrap();
        let before = board.clone();
        assert!(game.make_move(&mut board, &TinyMove(1)).is_err());
        assert_eq!(board, before);
    }

    #[test]
    fn test_encoding_shape() {
        let game = TinyGame;
        let board = game.create_board();
        let encoded = game.board_to_tensor(&board, &[]);
        assert_eq!(encoded.shape, vec![112, 8, 8]);
        assert_eq!(encoded.tensor.len(), 112 * 64);
    }
}
