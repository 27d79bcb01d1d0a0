//! English draughts on the 32 dark squares of an 8x8 board.
//!
//! Squares are numbered 0..32 row by row from the top-left; row 0 is the
//! top edge. Player `+1` starts on rows 5-7 and moves up, player `-1` starts
//! on rows 0-2 and moves down. Captures are mandatory, jumps chain, a man
//! reaching the far row is crowned and its move ends there.

use std::fmt;

use smallvec::SmallVec;

use super::{check_transition, fill_plane, set_square, Game, GameKind, Material};
use super::{MOVE_COUNT_PLANE, TURN_PLANE};
use crate::core::GameError;

/// Playable squares.
pub const SQUARES: usize = 32;

/// Plies without a capture or man move that end the game as a draw.
pub const NO_PROGRESS_LIMIT: u32 = 80;

/// Diagonal directions as (row delta, col delta): up-left, up-right,
/// down-left, down-right.
static DIRECTIONS: [(i32, i32); 4] = [(-1, -1), (-1, 1), (1, -1), (1, 1)];

/// A piece on the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Piece {
    /// `+1` or `-1`.
    pub owner: i8,
    pub king: bool,
}

/// A move: the squares visited, and the squares jumped over.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CheckersMove {
    pub path: SmallVec<[u8; 4]>,
    pub captured: SmallVec<[u8; 4]>,
}

impl CheckersMove {
    /// A simple one-step move.
    pub fn step(from: u8, to: u8) -> Self {
        Self {
            path: SmallVec::from_slice(&[from, to]),
            captured: SmallVec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn from(&self) -> u8 {
        self.path[0]
    }

    #[inline]
    #[must_use]
    pub fn to(&self) -> u8 {
        self.path[self.path.len() - 1]
    }

    #[inline]
    #[must_use]
    pub fn is_capture(&self) -> bool {
        !self.captured.is_empty()
    }
}

impl fmt::Display for CheckersMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = if self.is_capture() { "x" } else { "-" };
        let parts: Vec<String> = self.path.iter().map(|s| (s + 1).to_string()).collect();
        f.write_str(&parts.join(sep))
    }
}

/// Board state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckersBoard {
    squares: [Option<Piece>; SQUARES],
    to_move: i8,
    ply: u32,
    no_progress: u32,
}

impl Default for CheckersBoard {
    fn default() -> Self {
        let mut squares = [None; SQUARES];
        for (i, sq) in squares.iter_mut().enumerate() {
            if i < 12 {
                *sq = Some(Piece { owner: -1, king: false });
            } else if i >= 20 {
                *sq = Some(Piece { owner: 1, king: false });
            }
        }
        Self {
            squares,
            to_move: 1,
            ply: 0,
            no_progress: 0,
        }
    }
}

impl CheckersBoard {
    /// Empty board with `to_move` to play; for setting up positions.
    #[must_use]
    pub fn empty(to_move: i8) -> Self {
        Self {
            squares: [None; SQUARES],
            to_move,
            ply: 0,
            no_progress: 0,
        }
    }

    /// Place or clear a piece.
    pub fn set(&mut self, square: u8, piece: Option<Piece>) {
        self.squares[square as usize] = piece;
    }

    #[must_use]
    pub fn get(&self, square: u8) -> Option<Piece> {
        self.squares.get(square as usize).copied().flatten()
    }

    #[inline]
    #[must_use]
    pub fn to_move(&self) -> i8 {
        self.to_move
    }

    #[inline]
    #[must_use]
    pub fn ply(&self) -> u32 {
        self.ply
    }

    /// (pieces, kings) owned by `player`.
    #[must_use]
    pub fn counts(&self, player: i8) -> (i32, i32) {
        self.squares
            .iter()
            .flatten()
            .filter(|p| p.owner == player)
            .fold((0, 0), |(n, k), p| (n + 1, k + i32::from(p.king)))
    }

    fn pieces_of(&self, player: i8) -> impl Iterator<Item = (u8, Piece)> + '_ {
        self.squares
            .iter()
            .enumerate()
            .filter_map(move |(i, p)| p.filter(|p| p.owner == player).map(|p| (i as u8, p)))
    }
}

impl fmt::Display for CheckersBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..8 {
            for col in 0..8 {
                let c = match coords_to_square(row, col).and_then(|s| self.get(s)) {
                    Some(Piece { owner: 1, king: false }) => 'b',
                    Some(Piece { owner: 1, king: true }) => 'B',
                    Some(Piece { king: false, .. }) => 'w',
                    Some(Piece { king: true, .. }) => 'W',
                    None if (row + col) % 2 == 1 => '.',
                    None => ' ',
                };
                write!(f, "{c}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Row and column of a playable square.
#[must_use]
pub fn square_to_coords(square: u8) -> (i32, i32) {
    let row = i32::from(square) / 4;
    let col = 2 * (i32::from(square) % 4) + if row % 2 == 0 { 1 } else { 0 };
    (row, col)
}

/// Playable square at (row, col), if any.
#[must_use]
pub fn coords_to_square(row: i32, col: i32) -> Option<u8> {
    if !(0..8).contains(&row) || !(0..8).contains(&col) || (row + col) % 2 == 0 {
        return None;
    }
    Some((row * 4 + col / 2) as u8)
}

fn neighbor(square: u8, dir: (i32, i32), distance: i32) -> Option<u8> {
    let (row, col) = square_to_coords(square);
    coords_to_square(row + dir.0 * distance, col + dir.1 * distance)
}

fn allowed_directions(piece: Piece) -> &'static [(i32, i32)] {
    match (piece.king, piece.owner) {
        (true, _) => &DIRECTIONS,
        (false, 1) => &DIRECTIONS[..2],
        (false, _) => &DIRECTIONS[2..],
    }
}

fn crown_row(owner: i8) -> i32 {
    if owner == 1 {
        0
    } else {
        7
    }
}

/// Draughts rules.
#[derive(Clone, Copy, Debug, Default)]
pub struct CheckersGame;

impl CheckersGame {
    pub fn new() -> Self {
        Self
    }

    fn generate(&self, board: &CheckersBoard) -> Vec<CheckersMove> {
        let player = board.to_move;
        let mut captures = Vec::new();
        for (square, piece) in board.pieces_of(player) {
            let mut path = SmallVec::from_slice(&[square]);
            let mut captured = SmallVec::new();
            self.extend_jumps(board, square, piece, &mut path, &mut captured, &mut captures);
        }
        if !captures.is_empty() {
            return captures;
        }

        let mut steps = Vec::new();
        for (square, piece) in board.pieces_of(player) {
            for &dir in allowed_directions(piece) {
                if let Some(to) = neighbor(square, dir, 1) {
                    if board.get(to).is_none() {
                        steps.push(CheckersMove::step(square, to));
                    }
                }
            }
        }
        steps
    }

    /// Depth-first search for maximal jump chains from `at`.
    fn extend_jumps(
        &self,
        board: &CheckersBoard,
        at: u8,
        piece: Piece,
        path: &mut SmallVec<[u8; 4]>,
        captured: &mut SmallVec<[u8; 4]>,
        out: &mut Vec<CheckersMove>,
    ) {
        let origin = path[0];
        let mut extended = false;

        for &dir in allowed_directions(piece) {
            let (Some(over), Some(land)) = (neighbor(at, dir, 1), neighbor(at, dir, 2)) else {
                continue;
            };
            let jumps_enemy = board
                .get(over)
                .map_or(false, |p| p.owner != piece.owner && !captured.contains(&over));
            let lands_free = board.get(land).is_none() || land == origin;
            if !jumps_enemy || !lands_free {
                continue;
            }

            extended = true;
            path.push(land);
            captured.push(over);

            let crowned = !piece.king && square_to_coords(land).0 == crown_row(piece.owner);
            if crowned {
                out.push(CheckersMove {
                    path: path.clone(),
                    captured: captured.clone(),
                });
            } else {
                self.extend_jumps(board, land, piece, path, captured, out);
            }

            path.pop();
            captured.pop();
        }

        if !extended && !captured.is_empty() {
            out.push(CheckersMove {
                path: path.clone(),
                captured: captured.clone(),
            });
        }
    }

    fn apply_unchecked(&self, board: &CheckersBoard, mv: &CheckersMove) -> CheckersBoard {
        let mut next = board.clone();
        let Some(mut piece) = next.squares[mv.from() as usize].take() else {
            return next;
        };
        for &sq in &mv.captured {
            next.squares[sq as usize] = None;
        }
        let was_man = !piece.king;
        if was_man && square_to_coords(mv.to()).0 == crown_row(piece.owner) {
            piece.king = true;
        }
        next.squares[mv.to() as usize] = Some(piece);

        next.no_progress = if mv.is_capture() || was_man {
            0
        } else {
            board.no_progress + 1
        };
        next.ply = board.ply + 1;
        next.to_move = -board.to_move;
        next
    }

    fn piece_advantage(board: &CheckersBoard, player: i8) -> i32 {
        let (mine, my_kings) = board.counts(player);
        let (theirs, their_kings) = board.counts(-player);
        (mine - theirs) + 2 * (my_kings - their_kings)
    }
}

impl Game for CheckersGame {
    type Board = CheckersBoard;
    type Move = CheckersMove;

    fn kind(&self) -> GameKind {
        GameKind::Checkers
    }

    fn create_board(&self) -> CheckersBoard {
        CheckersBoard::default()
    }

    fn legal_moves(&self, board: &CheckersBoard) -> Vec<CheckersMove> {
        if board.no_progress >= NO_PROGRESS_LIMIT {
            return Vec::new();
        }
        self.generate(board)
    }

    fn make_move(&self, board: &mut CheckersBoard, mv: &CheckersMove) -> Result<(), GameError> {
        if !self.legal_moves(board).contains(mv) {
            return Err(GameError::illegal(mv, "not in the legal move list"));
        }

        let before = self.material(board);
        let next = self.apply_unchecked(board, mv);
        let after = self.material(&next);

        let mover = if board.to_move == 1 { 0 } else { 1 };
        let crowned = board.get(mv.from()).map_or(false, |p| !p.king)
            && next.get(mv.to()).map_or(false, |p| p.king);
        let taken = mv.captured.len() as u16;

        check_transition(&before, &after, mover, crowned.then_some(1), taken..=taken)
            .map_err(|reason| GameError::illegal(mv, reason))?;

        *board = next;
        Ok(())
    }

    fn is_game_over(&self, board: &CheckersBoard) -> bool {
        self.legal_moves(board).is_empty()
    }

    fn winner(&self, board: &CheckersBoard) -> i8 {
        if board.no_progress >= NO_PROGRESS_LIMIT {
            0
        } else if self.generate(board).is_empty() {
            -board.to_move
        } else {
            0
        }
    }

    fn current_player(&self, board: &CheckersBoard) -> i8 {
        board.to_move
    }

    fn encode_planes(&self, board: &CheckersBoard, planes: &mut [f32]) {
        for (i, piece) in board.squares.iter().enumerate() {
            let Some(piece) = piece else { continue };
            let (row, col) = square_to_coords(i as u8);
            let plane = match (piece.owner, piece.king) {
                (1, false) => 0,
                (1, true) => 1,
                (_, false) => 2,
                (_, true) => 3,
            };
            set_square(planes, plane, row as usize, col as usize, 1.0);
        }
        if board.to_move == 1 {
            fill_plane(planes, TURN_PLANE, 1.0);
        }
        fill_plane(planes, MOVE_COUNT_PLANE, board.ply as f32 / 100.0);
    }

    fn reward(&self, board: &CheckersBoard) -> f32 {
        if self.is_game_over(board) {
            return f32::from(self.winner(board) * board.to_move);
        }

        let advantage = Self::piece_advantage(board, board.to_move) as f32;
        let (a, _) = board.counts(1);
        let (b, _) = board.counts(-1);
        if a + b < 8 && advantage.abs() > 2.0 {
            (advantage * 0.08).clamp(-0.4, 0.4)
        } else {
            (advantage * 0.05).clamp(-0.3, 0.3)
        }
    }

    /// `from * 8 + direction * 2 + is_jump`, using the first hop.
    fn move_index(&self, _board: &CheckersBoard, mv: &CheckersMove) -> usize {
        let (r0, c0) = square_to_coords(mv.from());
        let (r1, c1) = square_to_coords(mv.path.get(1).copied().unwrap_or(mv.from()));
        let dir = DIRECTIONS
            .iter()
            .position(|&d| d == ((r1 - r0).signum(), (c1 - c0).signum()))
            .unwrap_or(0);
        mv.from() as usize * 8 + dir * 2 + usize::from(mv.is_capture())
    }

    fn material(&self, board: &CheckersBoard) -> Material {
        let mut material = Material::default();
        for piece in board.squares.iter().flatten() {
            let side = if piece.owner == 1 { 0 } else { 1 };
            material.counts[side][usize::from(piece.king)] += 1;
        }
        material
    }

    fn board_string(&self, board: &CheckersBoard) -> String {
        board.to_string()
    }

    fn captured_pieces(&self, board: &CheckersBoard, mv: &CheckersMove) -> Vec<String> {
        mv.captured
            .iter()
            .filter_map(|&sq| board.get(sq))
            .map(|p| {
                let side = if p.owner == 1 { "dark" } else { "light" };
                let kind = if p.king { "king" } else { "man" };
                format!("{side} {kind}")
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn man(owner: i8) -> Option<Piece> {
        Some(Piece { owner, king: false })
    }

    fn king(owner: i8) -> Option<Piece> {
        Some(Piece { owner, king: true })
    }

    #[test]
    fn test_square_coords_roundtrip() {
        for sq in 0..SQUARES as u8 {
            let (r, c) = square_to_coords(sq);
            assert_eq!((r + c) % 2, 1);
            assert_eq!(coords_to_square(r, c), Some(sq));
        }
        assert_eq!(coords_to_square(0, 0), None);
        assert_eq!(coords_to_square(-1, 1), None);
    }

    #[test]
    fn test_opening_moves() {
        let game = CheckersGame;
        let board = game.create_board();
        assert_eq!(game.legal_moves(&board).len(), 7);
        assert_eq!(game.current_player(&board), 1);
        assert_eq!(game.reward(&board), 0.0);
    }

    #[test]
    fn test_capture_is_mandatory() {
        let game = CheckersGame;
        let mut board = CheckersBoard::empty(1);
        board.set(21, man(1));
        board.set(17, man(-1));
        board.set(23, man(1));

        let moves = game.legal_moves(&board);
        assert_eq!(moves.len(), 1);
        assert!(moves[0].is_capture());
        assert_eq!(moves[0].captured.as_slice(), &[17]);
    }

    #[test]
    fn test_multi_jump() {
        let game = CheckersGame;
        let mut board = CheckersBoard::empty(1);
        let from = coords_to_square(6, 1).unwrap();
        let first = coords_to_square(5, 2).unwrap();
        let second = coords_to_square(3, 4).unwrap();
        board.set(from, man(1));
        board.set(first, man(-1));
        board.set(second, man(-1));

        let moves = game.legal_moves(&board);
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].captured.len(), 2);
        assert_eq!(moves[0].to(), coords_to_square(2, 5).unwrap());

        game.make_move(&mut board, &moves[0]).unwrap();
        assert_eq!(board.counts(-1), (0, 0));
        // Opponent has no pieces, so no moves: player +1 wins.
        assert!(game.is_game_over(&board));
        assert_eq!(game.winner(&board), 1);
        assert_eq!(game.reward(&board), -1.0);
    }

    #[test]
    fn test_promotion_ends_move() {
        let game = CheckersGame;
        let mut board = CheckersBoard::empty(1);
        let from = coords_to_square(1, 2).unwrap();
        board.set(from, man(1));
        board.set(coords_to_square(7, 0).unwrap(), man(-1));

        let to = coords_to_square(0, 1).unwrap();
        let mv = CheckersMove::step(from, to);
        game.make_move(&mut board, &mv).unwrap();
        assert_eq!(board.get(to), king(1));
        assert_eq!(board.to_move(), -1);
    }

    #[test]
    fn test_illegal_move_rejected() {
        let game = CheckersGame;
        let mut board = game.create_board();
        let before = board.clone();
        let mv = CheckersMove::step(20, 12);
        assert!(game.make_move(&mut board, &mv).is_err());
        assert_eq!(board, before);
    }

    #[test]
    fn test_shaped_reward() {
        let game = CheckersGame;
        let mut board = CheckersBoard::empty(1);
        board.set(coords_to_square(5, 0).unwrap(), man(1));
        board.set(coords_to_square(5, 2).unwrap(), man(1));
        board.set(coords_to_square(5, 4).unwrap(), king(1));
        board.set(coords_to_square(0, 1).unwrap(), man(-1));

        // advantage = (3 - 1) + 2 * (1 - 0) = 4, few pieces -> 0.32
        assert!((game.reward(&board) - 0.32).abs() < 1e-6);

        let mut flipped = board.clone();
        flipped.to_move = -1;
        assert!((game.reward(&flipped) + 0.32).abs() < 1e-6);
    }

    #[test]
    fn test_no_progress_draw() {
        let game = CheckersGame;
        let mut board = CheckersBoard::empty(1);
        board.set(coords_to_square(4, 1).unwrap(), king(1));
        board.set(coords_to_square(0, 7).unwrap(), king(-1));
        board.no_progress = NO_PROGRESS_LIMIT;

        assert!(game.is_game_over(&board));
        assert_eq!(game.winner(&board), 0);
        assert_eq!(game.reward(&board), 0.0);
    }

    #[test]
    fn test_move_indices_in_range() {
        let game = CheckersGame;
        let board = game.create_board();
        for mv in game.legal_moves(&board) {
            assert!(game.move_index(&board, &mv) < GameKind::Checkers.action_size());
        }
    }

    #[test]
    fn test_move_display() {
        let mv = CheckersMove::step(20, 16);
        assert_eq!(mv.to_string(), "21-17");
    }
}
