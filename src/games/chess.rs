//! Chess on top of the `chess` crate.
//!
//! The crate supplies move generation and legality. This module adds the
//! draw rules it does not track (75-move rule, fivefold repetition,
//! insufficient material), the AlphaZero 8x8x73 move indexing, plane
//! encoding, and draw reward shaping.

use std::fmt;

use chess::{Board, BoardStatus, ChessMove, Color, MoveGen, Piece, Square, ALL_PIECES};
use serde::{Deserialize, Serialize};

use super::{check_transition, fill_plane, set_square, Game, GameKind, Material};
use super::{MOVE_COUNT_PLANE, TURN_PLANE};
use crate::core::GameError;

/// Halfmoves without a capture or pawn move that end the game.
pub const SEVENTY_FIVE_MOVE_LIMIT: u32 = 150;

/// Occurrences of one position that end the game.
pub const FIVEFOLD_LIMIT: usize = 5;

const PLANES_PER_SQUARE: usize = 73;

/// Queen-move directions as (rank delta, file delta).
const QUEEN_DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

const KNIGHT_OFFSETS: [(i32, i32); 8] = [
    (2, 1),
    (1, 2),
    (-1, 2),
    (-2, 1),
    (-2, -1),
    (-1, -2),
    (1, -2),
    (2, -1),
];

const PIECE_VALUES: [i32; 6] = [1, 3, 3, 5, 9, 0];

/// Rewards for drawn chess positions.
///
/// A draw is penalized for the side that was materially ahead and
/// rewarded for the side behind. These are tuning knobs, not rules.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardShaping {
    /// Material lead (pawns) beyond which a draw is shaped.
    pub draw_material_threshold: i32,
    /// Magnitude of the shaped draw reward.
    pub draw_penalty: f32,
    /// Material lead beyond which a repetition is shaped by lead.
    pub repetition_material_threshold: i32,
    /// Magnitude of the repetition reward for a large lead.
    pub repetition_penalty: f32,
    /// Penalty to the side to move for repeating a balanced position.
    pub repetition_base: f32,
}

impl Default for RewardShaping {
    fn default() -> Self {
        Self {
            draw_material_threshold: 5,
            draw_penalty: 0.7,
            repetition_material_threshold: 3,
            repetition_penalty: 0.5,
            repetition_base: 0.2,
        }
    }
}

impl RewardShaping {
    /// Shaped reward for a stalemate, dead position or 75-move draw.
    ///
    /// `advantage` is the material lead of the side to move.
    #[must_use]
    pub fn draw_reward(&self, advantage: i32) -> f32 {
        if advantage.abs() > self.draw_material_threshold {
            -self.draw_penalty * advantage.signum() as f32
        } else {
            0.0
        }
    }

    /// Shaped reward for a fivefold repetition.
    #[must_use]
    pub fn repetition_reward(&self, advantage: i32) -> f32 {
        if advantage.abs() > self.repetition_material_threshold {
            -self.repetition_penalty * advantage.signum() as f32
        } else {
            -self.repetition_base
        }
    }
}

/// Chess position plus the counters the `chess` crate does not keep.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChessBoard {
    position: Board,
    fullmove: u32,
    halfmove_clock: u32,
    /// Hashes of every position since the last irreversible move,
    /// the current one included.
    repetitions: Vec<u64>,
}

impl Default for ChessBoard {
    fn default() -> Self {
        Self::from_position(Board::default())
    }
}

impl ChessBoard {
    /// Wrap a position with fresh counters.
    #[must_use]
    pub fn from_position(position: Board) -> Self {
        Self {
            position,
            fullmove: 1,
            halfmove_clock: 0,
            repetitions: vec![position.get_hash()],
        }
    }

    /// Parse a FEN string.
    pub fn from_fen(fen: &str) -> Result<Self, GameError> {
        let position: Board = fen
            .parse()
            .map_err(|e| GameError::Validation(format!("bad fen `{fen}`: {e}")))?;
        let mut board = Self::from_position(position);
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if let Some(half) = fields.get(4).and_then(|f| f.parse().ok()) {
            board.halfmove_clock = half;
        }
        if let Some(full) = fields.get(5).and_then(|f| f.parse().ok()) {
            board.fullmove = full;
        }
        Ok(board)
    }

    /// Underlying `chess` position.
    #[inline]
    #[must_use]
    pub fn position(&self) -> &Board {
        &self.position
    }

    #[inline]
    #[must_use]
    pub fn fullmove(&self) -> u32 {
        self.fullmove
    }

    #[inline]
    #[must_use]
    pub fn halfmove_clock(&self) -> u32 {
        self.halfmove_clock
    }

    /// How often the current position has occurred.
    #[must_use]
    pub fn repetition_count(&self) -> usize {
        let current = self.position.get_hash();
        self.repetitions.iter().filter(|&&h| h == current).count()
    }

    /// Position after `mv`, with counters advanced. Assumes legality.
    fn applied(&self, mv: ChessMove) -> Self {
        let irreversible = self.position.piece_on(mv.get_source()) == Some(Piece::Pawn)
            || self.position.piece_on(mv.get_dest()).is_some();
        let position = self.position.make_move_new(mv);

        let mut repetitions = if irreversible {
            Vec::new()
        } else {
            self.repetitions.clone()
        };
        repetitions.push(position.get_hash());

        Self {
            position,
            fullmove: self.fullmove + u32::from(self.position.side_to_move() == Color::Black),
            halfmove_clock: if irreversible { 0 } else { self.halfmove_clock + 1 },
            repetitions,
        }
    }
}

impl fmt::Display for ChessBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in (0..8).rev() {
            for file in 0..8 {
                let sq = square_at(rank, file);
                let c = match (self.position.piece_on(sq), self.position.color_on(sq)) {
                    (Some(piece), Some(color)) => {
                        let s = piece.to_string(color);
                        s.chars().next().unwrap_or('?')
                    }
                    _ => '.',
                };
                write!(f, "{c}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Chess rules with configurable draw shaping.
#[derive(Clone, Debug, Default)]
pub struct ChessGame {
    shaping: RewardShaping,
}

impl ChessGame {
    /// Chess with default draw shaping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Chess with custom draw shaping.
    pub fn with_shaping(shaping: RewardShaping) -> Self {
        Self { shaping }
    }

    /// The shaping in use.
    #[must_use]
    pub fn shaping(&self) -> &RewardShaping {
        &self.shaping
    }

    /// Material balance (P1 N3 B3 R5 Q9) from `color`'s side.
    #[must_use]
    pub fn material_advantage(board: &ChessBoard, color: Color) -> i32 {
        let score = |c: Color| -> i32 {
            ALL_PIECES
                .iter()
                .map(|&p| {
                    let n = (*board.position.pieces(p) & *board.position.color_combined(c)).popcnt();
                    n as i32 * PIECE_VALUES[p.to_index()]
                })
                .sum()
        };
        score(color) - score(!color)
    }

    fn is_draw_by_rule(&self, board: &ChessBoard) -> bool {
        insufficient_material(&board.position) || board.halfmove_clock >= SEVENTY_FIVE_MOVE_LIMIT
    }
}

impl Game for ChessGame {
    type Board = ChessBoard;
    type Move = ChessMove;

    fn kind(&self) -> GameKind {
        GameKind::Chess
    }

    fn create_board(&self) -> ChessBoard {
        ChessBoard::default()
    }

    fn legal_moves(&self, board: &ChessBoard) -> Vec<ChessMove> {
        if self.is_game_over(board) {
            return Vec::new();
        }
        MoveGen::new_legal(&board.position).collect()
    }

    fn make_move(&self, board: &mut ChessBoard, mv: &ChessMove) -> Result<(), GameError> {
        if self.is_game_over(board) {
            return Err(GameError::illegal(mv, "game is already over"));
        }
        if !board.position.legal(*mv) {
            return Err(GameError::illegal(mv, "not legal in this position"));
        }

        let before = self.material(board);
        let next = board.applied(*mv);
        let after = self.material(&next);
        let mover = side_index(board.position.side_to_move());
        let promotion = mv.get_promotion().map(|p| p.to_index());

        check_transition(&before, &after, mover, promotion, 0..=1)
            .map_err(|reason| GameError::illegal(mv, reason))?;

        *board = next;
        Ok(())
    }

    fn is_game_over(&self, board: &ChessBoard) -> bool {
        board.position.status() != BoardStatus::Ongoing
            || self.is_draw_by_rule(board)
            || board.repetition_count() >= FIVEFOLD_LIMIT
    }

    fn winner(&self, board: &ChessBoard) -> i8 {
        if board.position.status() == BoardStatus::Checkmate {
            -player_of(board.position.side_to_move())
        } else {
            0
        }
    }

    fn current_player(&self, board: &ChessBoard) -> i8 {
        player_of(board.position.side_to_move())
    }

    fn encode_planes(&self, board: &ChessBoard, planes: &mut [f32]) {
        let pos = &board.position;
        for color in [Color::White, Color::Black] {
            let offset = side_index(color) * 6;
            for piece in ALL_PIECES {
                let bb = *pos.pieces(piece) & *pos.color_combined(color);
                for sq in bb {
                    let row = 7 - sq.get_rank().to_index();
                    let col = sq.get_file().to_index();
                    set_square(planes, offset + piece.to_index(), row, col, 1.0);
                }
            }
        }

        if pos.side_to_move() == Color::White {
            fill_plane(planes, TURN_PLANE, 1.0);
        }
        fill_plane(planes, MOVE_COUNT_PLANE, board.fullmove as f32 / 100.0);
    }

    fn reward(&self, board: &ChessBoard) -> f32 {
        let mover = board.position.side_to_move();
        match board.position.status() {
            BoardStatus::Checkmate => -1.0,
            BoardStatus::Stalemate => self
                .shaping
                .draw_reward(Self::material_advantage(board, mover)),
            BoardStatus::Ongoing => {
                if self.is_draw_by_rule(board) {
                    self.shaping.draw_reward(Self::material_advantage(board, mover))
                } else if board.repetition_count() >= FIVEFOLD_LIMIT {
                    self.shaping
                        .repetition_reward(Self::material_advantage(board, mover))
                } else {
                    0.0
                }
            }
        }
    }

    fn move_index(&self, _board: &ChessBoard, mv: &ChessMove) -> usize {
        move_to_index(*mv)
    }

    fn material(&self, board: &ChessBoard) -> Material {
        let mut material = Material::default();
        for color in [Color::White, Color::Black] {
            for piece in ALL_PIECES {
                let bb = *board.position.pieces(piece) & *board.position.color_combined(color);
                material.counts[side_index(color)][piece.to_index()] = bb.popcnt() as u16;
            }
        }
        material
    }

    fn board_string(&self, board: &ChessBoard) -> String {
        board.to_string()
    }

    fn captured_pieces(&self, board: &ChessBoard, mv: &ChessMove) -> Vec<String> {
        let pos = &board.position;
        let dest = mv.get_dest();

        if let (Some(piece), Some(color)) = (pos.piece_on(dest), pos.color_on(dest)) {
            return vec![describe(color, piece)];
        }

        // En passant: a pawn moving diagonally onto an empty square.
        let is_pawn = pos.piece_on(mv.get_source()) == Some(Piece::Pawn);
        if is_pawn && mv.get_source().get_file() != dest.get_file() {
            return vec![describe(!pos.side_to_move(), Piece::Pawn)];
        }
        Vec::new()
    }
}

/// AlphaZero policy index: `from * 73 + plane`.
///
/// Planes 0-55 are queen-like moves (8 directions x 7 distances), 56-63
/// knight moves, 64-72 underpromotions (3 file deltas x knight, bishop,
/// rook). Queen promotions use the queen-like planes.
#[must_use]
pub fn move_to_index(mv: ChessMove) -> usize {
    let from = mv.get_source();
    let to = mv.get_dest();
    let dr = to.get_rank().to_index() as i32 - from.get_rank().to_index() as i32;
    let df = to.get_file().to_index() as i32 - from.get_file().to_index() as i32;

    let plane = match mv.get_promotion() {
        Some(piece) if piece != Piece::Queen => {
            let piece_idx = match piece {
                Piece::Knight => 0,
                Piece::Bishop => 1,
                _ => 2,
            };
            64 + (df.clamp(-1, 1) + 1) as usize * 3 + piece_idx
        }
        _ => {
            if let Some(k) = KNIGHT_OFFSETS.iter().position(|&o| o == (dr, df)) {
                56 + k
            } else {
                let dir = QUEEN_DIRECTIONS
                    .iter()
                    .position(|&d| d == (dr.signum(), df.signum()))
                    .unwrap_or(0);
                let distance = dr.abs().max(df.abs()).clamp(1, 7) as usize;
                dir * 7 + distance - 1
            }
        }
    };

    from.to_index() * PLANES_PER_SQUARE + plane
}

fn insufficient_material(pos: &Board) -> bool {
    let heavy = *pos.pieces(Piece::Pawn) | *pos.pieces(Piece::Rook) | *pos.pieces(Piece::Queen);
    if heavy.popcnt() > 0 {
        return false;
    }

    let knights = pos.pieces(Piece::Knight).popcnt();
    let bishops = *pos.pieces(Piece::Bishop);
    if knights + bishops.popcnt() <= 1 {
        return true;
    }

    // Only bishops left, all on one square color.
    if knights == 0 {
        let light = bishops.filter(|&sq| is_light_square(sq)).count() as u32;
        return light == 0 || light == bishops.popcnt();
    }
    false
}

fn is_light_square(sq: Square) -> bool {
    (sq.get_rank().to_index() + sq.get_file().to_index()) % 2 == 1
}

fn square_at(rank: usize, file: usize) -> Square {
    Square::make_square(chess::Rank::from_index(rank), chess::File::from_index(file))
}

#[inline]
fn side_index(color: Color) -> usize {
    match color {
        Color::White => 0,
        Color::Black => 1,
    }
}

#[inline]
fn player_of(color: Color) -> i8 {
    match color {
        Color::White => 1,
        Color::Black => -1,
    }
}

fn describe(color: Color, piece: Piece) -> String {
    let color = match color {
        Color::White => "white",
        Color::Black => "black",
    };
    let piece = match piece {
        Piece::Pawn => "pawn",
        Piece::Knight => "knight",
        Piece::Bishop => "bishop",
        Piece::Rook => "rook",
        Piece::Queen => "queen",
        Piece::King => "king",
    };
    format!("{color} {piece}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn play(game: &ChessGame, board: &mut ChessBoard, moves: &[&str]) {
        for m in moves {
            let mv = ChessMove::from_str(m).unwrap();
            game.make_move(board, &mv).unwrap();
        }
    }

    #[test]
    fn test_start_position() {
        let game = ChessGame::new();
        let board = game.create_board();
        assert_eq!(game.legal_moves(&board).len(), 20);
        assert_eq!(game.current_player(&board), 1);
        assert!(!game.is_game_over(&board));
        assert_eq!(game.reward(&board), 0.0);
    }

    #[test]
    fn test_illegal_move_leaves_board_unchanged() {
        let game = ChessGame::new();
        let mut board = game.create_board();
        let before = board.clone();

        let mv = ChessMove::from_str("e2e5").unwrap();
        let err = game.make_move(&mut board, &mv).unwrap_err();
        assert!(matches!(err, GameError::IllegalMove { .. }));
        assert_eq!(board, before);
    }

    #[test]
    fn test_fools_mate() {
        let game = ChessGame::new();
        let mut board = game.create_board();
        play(&game, &mut board, &["f2f3", "e7e5", "g2g4", "d8h4"]);

        assert!(game.is_game_over(&board));
        assert_eq!(game.winner(&board), -1);
        // White to move and mated.
        assert_eq!(game.reward(&board), -1.0);
        assert_eq!(game.first_player_reward(&board), -1.0);
        assert!(game.legal_moves(&board).is_empty());
    }

    #[test]
    fn test_promotion_passes_transition_check() {
        let game = ChessGame::new();
        for (uci, piece) in [("a7a8q", Piece::Queen), ("a7a8n", Piece::Knight)] {
            let mut board = ChessBoard::from_fen("7k/P7/8/8/8/8/8/K7 w - - 0 1").unwrap();
            play(&game, &mut board, &[uci]);

            let material = game.material(&board);
            assert_eq!(material.counts[0][Piece::Pawn.to_index()], 0);
            assert_eq!(material.counts[0][piece.to_index()], 1);
        }
    }

    #[test]
    fn test_counters_advance() {
        let game = ChessGame::new();
        let mut board = game.create_board();
        play(&game, &mut board, &["g1f3", "g8f6"]);
        assert_eq!(board.fullmove(), 2);
        assert_eq!(board.halfmove_clock(), 2);

        play(&game, &mut board, &["e2e4"]);
        assert_eq!(board.halfmove_clock(), 0);
    }

    #[test]
    fn test_fivefold_repetition() {
        let game = ChessGame::new();
        let mut board = game.create_board();
        let shuffle = ["g1f3", "g8f6", "f3g1", "f6g8"];
        for _ in 0..4 {
            play(&game, &mut board, &shuffle);
        }
        assert_eq!(board.repetition_count(), 5);
        assert!(game.is_game_over(&board));
        assert_eq!(game.winner(&board), 0);
        // Balanced material: base penalty for the side to move.
        assert_eq!(game.reward(&board), -0.2);
    }

    #[test]
    fn test_insufficient_material() {
        let game = ChessGame::new();
        let board = ChessBoard::from_fen("8/8/4k3/8/8/3NK3/8/8 w - - 0 1").unwrap();
        assert!(game.is_game_over(&board));
        assert_eq!(game.winner(&board), 0);

        let board = ChessBoard::from_fen("8/8/4k3/8/8/3RK3/8/8 w - - 0 1").unwrap();
        assert!(!game.is_game_over(&board));
    }

    #[test]
    fn test_stalemate_shaping_penalizes_side_ahead() {
        let game = ChessGame::new();
        // Black to move, stalemated, white up a queen and a rook.
        let board = ChessBoard::from_fen("k7/2Q5/1K6/8/8/8/8/7R b - - 0 1").unwrap();
        assert_eq!(board.position().status(), BoardStatus::Stalemate);
        // Black is behind by 14, so the draw is good for black.
        assert_eq!(game.reward(&board), 0.7);
        assert_eq!(game.first_player_reward(&board), -0.7);
    }

    #[test]
    fn test_shaping_values() {
        let shaping = RewardShaping::default();
        assert_eq!(shaping.draw_reward(6), -0.7);
        assert_eq!(shaping.draw_reward(-6), 0.7);
        assert_eq!(shaping.draw_reward(5), 0.0);
        assert_eq!(shaping.repetition_reward(4), -0.5);
        assert_eq!(shaping.repetition_reward(0), -0.2);
    }

    #[test]
    fn test_move_indices_unique_and_in_range() {
        let game = ChessGame::new();
        let board = ChessBoard::from_fen("r3k2r/1P6/8/8/8/8/6p1/R3K2R w KQkq - 0 1").unwrap();
        let moves = game.legal_moves(&board);
        let mut indices: Vec<usize> = moves.iter().map(|m| game.move_index(&board, m)).collect();
        assert!(indices.iter().all(|&i| i < GameKind::Chess.action_size()));
        let n = indices.len();
        indices.sort_unstable();
        indices.dedup();
        assert_eq!(indices.len(), n);
    }

    #[test]
    fn test_knight_and_underpromotion_planes() {
        let knight = ChessMove::from_str("g1f3").unwrap();
        let from = Square::G1.to_index();
        assert!((56..64).contains(&(move_to_index(knight) - from * 73)));

        let under = ChessMove::from_str("b7b8n").unwrap();
        let from = Square::B7.to_index();
        assert_eq!(move_to_index(under) - from * 73, 64 + 3);
    }

    #[test]
    fn test_encoding_planes() {
        let game = ChessGame::new();
        let board = game.create_board();
        let mut planes = vec![0.0; 14 * 64];
        game.encode_planes(&board, &mut planes);

        // White pawns on rank 2 -> row 6.
        assert!((0..8).all(|c| planes[6 * 8 + c] == 1.0));
        // Black king on e8 -> plane 11, row 0, col 4.
        assert_eq!(planes[11 * 64 + 4], 1.0);
        assert_eq!(planes[TURN_PLANE * 64], 1.0);
        assert_eq!(planes[MOVE_COUNT_PLANE * 64], 0.01);
    }

    #[test]
    fn test_captured_pieces() {
        let game = ChessGame::new();
        let mut board = game.create_board();
        play(&game, &mut board, &["e2e4", "d7d5"]);
        let capture = ChessMove::from_str("e4d5").unwrap();
        assert_eq!(game.captured_pieces(&board, &capture), vec!["black pawn".to_string()]);

        let quiet = ChessMove::from_str("g1f3").unwrap();
        assert!(game.captured_pieces(&board, &quiet).is_empty());
    }
}
