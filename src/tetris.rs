//! Falling-block game engine behind the Tetris page.
//!
//! Pure state machine: no rendering and no timers. The caller drives
//! gravity by calling [`Game::tick`] every [`Game::drop_interval`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::time::Duration;

pub const BOARD_WIDTH: usize = 10;
pub const BOARD_HEIGHT: usize = 20;

/// Points for clearing 0..=4 lines at once, before the level multiplier.
pub const LINE_POINTS: [u32; 5] = [0, 40, 100, 300, 1200];
pub const LINES_PER_LEVEL: u32 = 10;

/// Offsets tried in order when a rotation collides. `dy < 0` is upwards.
pub const WALL_KICKS: [(i32, i32); 6] = [(0, 0), (-1, 0), (1, 0), (-2, 0), (2, 0), (0, -1)];

const BASE_DROP_MS: u64 = 1000;
const DROP_STEP_MS: u64 = 100;
const MIN_DROP_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PieceKind {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl PieceKind {
    pub const ALL: [PieceKind; 7] = [
        PieceKind::I,
        PieceKind::O,
        PieceKind::T,
        PieceKind::S,
        PieceKind::Z,
        PieceKind::J,
        PieceKind::L,
    ];

    fn shape(self) -> Vec<Vec<bool>> {
        let rows: &[&str] = match self {
            PieceKind::I => &["....", "####", "....", "...."],
            PieceKind::O => &["##", "##"],
            PieceKind::T => &[".#.", "###", "..."],
            PieceKind::S => &[".##", "##.", "..."],
            PieceKind::Z => &["##.", ".##", "..."],
            PieceKind::J => &["#..", "###", "..."],
            PieceKind::L => &["..#", "###", "..."],
        };
        rows.iter()
            .map(|row| row.chars().map(|c| c == '#').collect())
            .collect()
    }

    fn random(rng: &mut StdRng) -> PieceKind {
        PieceKind::ALL[rng.gen_range(0..PieceKind::ALL.len())]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    pub kind: PieceKind,
    shape: Vec<Vec<bool>>,
    pub x: i32,
    pub y: i32,
}

impl Piece {
    /// A new piece centred horizontally at the top row.
    pub fn spawn(kind: PieceKind) -> Self {
        let shape = kind.shape();
        let x = (BOARD_WIDTH as i32 - shape.len() as i32) / 2;
        Piece { kind, shape, x, y: 0 }
    }

    /// Absolute `(x, y)` board coordinates of the filled cells.
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.shape.iter().enumerate().flat_map(move |(row, line)| {
            line.iter()
                .enumerate()
                .filter(|(_, filled)| **filled)
                .map(move |(col, _)| (self.x + col as i32, self.y + row as i32))
        })
    }

    fn shifted(&self, dx: i32, dy: i32) -> Piece {
        Piece {
            x: self.x + dx,
            y: self.y + dy,
            ..self.clone()
        }
    }

    fn rotated_clockwise(&self) -> Piece {
        let n = self.shape.len();
        let shape = (0..n)
            .map(|row| (0..n).map(|col| self.shape[n - 1 - col][row]).collect())
            .collect();
        Piece {
            shape,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    rows: Vec<[Option<PieceKind>; BOARD_WIDTH]>,
}

impl Default for Board {
    fn default() -> Self {
        Board {
            rows: vec![[None; BOARD_WIDTH]; BOARD_HEIGHT],
        }
    }
}

impl Board {
    pub fn cell(&self, x: usize, y: usize) -> Option<PieceKind> {
        self.rows.get(y).and_then(|row| row.get(x).copied().flatten())
    }

    pub fn set(&mut self, x: usize, y: usize, value: Option<PieceKind>) {
        if let Some(slot) = self.rows.get_mut(y).and_then(|row| row.get_mut(x)) {
            *slot = value;
        }
    }

    pub fn rows(&self) -> &[[Option<PieceKind>; BOARD_WIDTH]] {
        &self.rows
    }

    pub fn is_row_full(&self, y: usize) -> bool {
        self.rows
            .get(y)
            .is_some_and(|row| row.iter().all(Option::is_some))
    }

    /// Cells above the visible board (negative `y`) never collide.
    pub fn collides(&self, piece: &Piece) -> bool {
        piece.cells().any(|(x, y)| {
            if x < 0 || x >= BOARD_WIDTH as i32 || y >= BOARD_HEIGHT as i32 {
                return true;
            }
            y >= 0 && self.rows[y as usize][x as usize].is_some()
        })
    }

    /// Writes the piece into the board. Returns `false` if any cell was
    /// still above the top edge.
    fn lock(&mut self, piece: &Piece) -> bool {
        let mut fits = true;
        for (x, y) in piece.cells() {
            if y < 0 {
                fits = false;
                continue;
            }
            self.set(x as usize, y as usize, Some(piece.kind));
        }
        fits
    }

    /// Removes every full row, shifting the rows above down. Returns how
    /// many rows were removed.
    pub fn clear_full_rows(&mut self) -> usize {
        self.rows.retain(|row| !row.iter().all(Option::is_some));
        let cleared = BOARD_HEIGHT - self.rows.len();
        for _ in 0..cleared {
            self.rows.insert(0, [None; BOARD_WIDTH]);
        }
        cleared
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GameState {
    Playing,
    GameOver,
}

/// What a downward step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Moved,
    Locked { lines_cleared: usize },
    GameOver,
    Ignored,
}

pub struct Game {
    board: Board,
    active: Piece,
    next: PieceKind,
    score: u32,
    lines: u32,
    level: u32,
    state: GameState,
    rng: StdRng,
}

impl Game {
    pub fn new(seed: u64) -> Self {
        Self::with_board(Board::default(), seed)
    }

    pub fn with_board(board: Board, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let first = PieceKind::random(&mut rng);
        let next = PieceKind::random(&mut rng);
        Self::from_parts(board, first, next, rng)
    }

    /// Starts from a known board and known first two pieces.
    pub fn with_pieces(board: Board, first: PieceKind, next: PieceKind, seed: u64) -> Self {
        Self::from_parts(board, first, next, StdRng::seed_from_u64(seed))
    }

    fn from_parts(board: Board, first: PieceKind, next: PieceKind, rng: StdRng) -> Self {
        let active = Piece::spawn(first);
        let state = if board.collides(&active) {
            GameState::GameOver
        } else {
            GameState::Playing
        };
        Game {
            board,
            active,
            next,
            score: 0,
            lines: 0,
            level: 1,
            state,
            rng,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn active(&self) -> &Piece {
        &self.active
    }

    pub fn next(&self) -> PieceKind {
        self.next
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn lines(&self) -> u32 {
        self.lines
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn is_over(&self) -> bool {
        self.state == GameState::GameOver
    }

    pub fn drop_interval(&self) -> Duration {
        let ms = BASE_DROP_MS
            .saturating_sub(u64::from(self.level - 1) * DROP_STEP_MS)
            .max(MIN_DROP_MS);
        Duration::from_millis(ms)
    }

    pub fn move_left(&mut self) -> bool {
        self.try_shift(-1, 0)
    }

    pub fn move_right(&mut self) -> bool {
        self.try_shift(1, 0)
    }

    /// Rotates clockwise, trying each wall kick in order.
    pub fn rotate(&mut self) -> bool {
        if self.is_over() {
            return false;
        }
        let rotated = self.active.rotated_clockwise();
        for (dx, dy) in WALL_KICKS {
            let candidate = rotated.shifted(dx, dy);
            if !self.board.collides(&candidate) {
                self.active = candidate;
                return true;
            }
        }
        false
    }

    /// Gravity step.
    pub fn tick(&mut self) -> Step {
        if self.is_over() {
            return Step::Ignored;
        }
        if self.try_shift(0, 1) {
            Step::Moved
        } else {
            self.lock_active()
        }
    }

    pub fn soft_drop(&mut self) -> Step {
        let step = self.tick();
        if step == Step::Moved {
            self.score += 1;
        }
        step
    }

    pub fn hard_drop(&mut self) -> Step {
        if self.is_over() {
            return Step::Ignored;
        }
        let mut rows = 0;
        while self.try_shift(0, 1) {
            rows += 1;
        }
        self.score += 2 * rows;
        self.lock_active()
    }

    /// Row offset the active piece would land at.
    pub fn ghost_row(&self) -> i32 {
        let mut ghost = self.active.clone();
        while !self.board.collides(&ghost.shifted(0, 1)) {
            ghost.y += 1;
        }
        ghost.y
    }

    fn try_shift(&mut self, dx: i32, dy: i32) -> bool {
        if self.is_over() {
            return false;
        }
        let moved = self.active.shifted(dx, dy);
        if self.board.collides(&moved) {
            return false;
        }
        self.active = moved;
        true
    }

    fn lock_active(&mut self) -> Step {
        if !self.board.lock(&self.active) {
            self.state = GameState::GameOver;
            return Step::GameOver;
        }

        let cleared = self.board.clear_full_rows();
        self.score += LINE_POINTS[cleared.min(4)] * self.level;
        self.lines += cleared as u32;
        self.level = self.lines / LINES_PER_LEVEL + 1;

        self.active = Piece::spawn(self.next);
        self.next = PieceKind::random(&mut self.rng);
        if self.board.collides(&self.active) {
            log::debug!("Spawn collision, game over at score {}", self.score);
            self.state = GameState::GameOver;
            return Step::GameOver;
        }

        Step::Locked {
            lines_cleared: cleared,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn fill_row_except(board: &mut Board, y: usize, gaps: &[usize]) {
        for x in 0..BOARD_WIDTH {
            if !gaps.contains(&x) {
                board.set(x, y, Some(PieceKind::O));
            }
        }
    }

    fn sorted_cells(piece: &Piece) -> Vec<(i32, i32)> {
        let mut cells: Vec<_> = piece.cells().collect();
        cells.sort();
        cells
    }

    #[test]
    fn full_row_is_cleared_and_rows_above_shift_by_one() {
        let mut board = Board::default();
        fill_row_except(&mut board, 19, &[]);
        board.set(0, 18, Some(PieceKind::T));
        board.set(7, 17, Some(PieceKind::L));

        assert_eq!(board.clear_full_rows(), 1);

        assert_eq!(board.cell(0, 19), Some(PieceKind::T));
        assert_eq!(board.cell(7, 18), Some(PieceKind::L));
        assert!(!board.is_row_full(19));
        assert_eq!(board.rows().len(), BOARD_HEIGHT);
        assert!(board.rows()[0].iter().all(Option::is_none));
    }

    #[test]
    fn rows_between_cleared_rows_drop_past_both() {
        let mut board = Board::default();
        fill_row_except(&mut board, 19, &[]);
        board.set(4, 18, Some(PieceKind::S));
        fill_row_except(&mut board, 17, &[]);
        board.set(2, 16, Some(PieceKind::Z));

        assert_eq!(board.clear_full_rows(), 2);

        assert_eq!(board.cell(4, 19), Some(PieceKind::S));
        assert_eq!(board.cell(2, 18), Some(PieceKind::Z));
    }

    #[test]
    fn partial_rows_stay_put() {
        let mut board = Board::default();
        fill_row_except(&mut board, 19, &[5]);
        let before = board.clone();

        assert_eq!(board.clear_full_rows(), 0);
        assert_eq!(board, before);
    }

    #[test]
    fn hard_drop_into_well_clears_line_and_scores() {
        let mut board = Board::default();
        fill_row_except(&mut board, 19, &[3, 4, 5, 6]);
        let mut game = Game::with_pieces(board, PieceKind::I, PieceKind::O, 7);

        let step = game.hard_drop();

        assert_eq!(step, Step::Locked { lines_cleared: 1 });
        assert_eq!(game.lines(), 1);
        // 18 rows of hard drop at 2 points each, plus one line at level 1.
        assert_eq!(game.score(), 36 + 40);
        assert!(game.board().rows().iter().all(|row| row.iter().all(Option::is_none)));
        assert_eq!(game.active().kind, PieceKind::O);
    }

    #[test]
    fn spawn_is_centred_on_top_row() {
        let piece = Piece::spawn(PieceKind::T);
        assert_eq!(sorted_cells(&piece), vec![(3, 1), (4, 0), (4, 1), (5, 1)]);
        assert_eq!(Piece::spawn(PieceKind::O).x, 4);
    }

    #[test]
    fn rotation_turns_clockwise() {
        let mut game = Game::with_pieces(Board::default(), PieceKind::T, PieceKind::O, 1);
        game.tick();
        assert!(game.rotate());
        // T pointing up becomes T pointing right.
        assert_eq!(
            sorted_cells(game.active()),
            vec![(4, 1), (4, 2), (4, 3), (5, 2)]
        );
    }

    #[test]
    fn rotation_against_wall_kicks_inwards() {
        let mut game = Game::with_pieces(Board::default(), PieceKind::I, PieceKind::O, 1);
        game.tick();
        assert!(game.rotate());
        while game.move_right() {}
        // Vertical I hugging the right wall at column 9.
        assert!(game.active().cells().all(|(x, _)| x == 9));

        assert!(game.rotate());
        let cells = sorted_cells(game.active());
        assert!(cells.iter().all(|&(x, _)| (0..BOARD_WIDTH as i32).contains(&x)));
        assert_eq!(cells.first().map(|c| c.0), Some(6));
    }

    #[test]
    fn rotation_rejected_when_no_kick_fits() {
        let mut board = Board::default();
        for y in 0..BOARD_HEIGHT {
            for x in 0..BOARD_WIDTH {
                if !(3..=5).contains(&x) || y > 2 {
                    board.set(x, y, Some(PieceKind::O));
                }
            }
        }
        // Narrow shaft: the S spawns, but every kicked rotation overlaps.
        board.set(3, 0, Some(PieceKind::O));
        board.set(5, 1, Some(PieceKind::O));
        let mut game = Game::with_pieces(board, PieceKind::S, PieceKind::O, 1);
        let before = game.active().clone();

        assert!(!game.rotate());
        assert_eq!(game.active(), &before);
    }

    #[test]
    fn walls_and_floor_block_movement() {
        let mut game = Game::with_pieces(Board::default(), PieceKind::O, PieceKind::O, 1);
        let mut moves = 0;
        while game.move_left() {
            moves += 1;
        }
        assert_eq!(moves, 4);
        assert_eq!(game.ghost_row(), 18);
    }

    #[test]
    fn spawn_collision_ends_the_game() {
        let mut board = Board::default();
        board.set(4, 0, Some(PieceKind::Z));
        let game = Game::with_pieces(board, PieceKind::O, PieceKind::O, 1);
        assert!(game.is_over());
    }

    #[test]
    fn stacking_to_the_top_ends_the_game_and_freezes_input() {
        let mut game = Game::new(42);
        let mut guard = 0;
        while !game.is_over() {
            game.hard_drop();
            guard += 1;
            assert!(guard < 500, "game never ended");
        }
        let score = game.score();

        assert_eq!(game.hard_drop(), Step::Ignored);
        assert_eq!(game.tick(), Step::Ignored);
        assert!(!game.move_left());
        assert!(!game.rotate());
        assert_eq!(game.score(), score);
    }

    #[test]
    fn soft_drop_scores_one_per_row() {
        let mut game = Game::with_pieces(Board::default(), PieceKind::O, PieceKind::O, 1);
        assert_eq!(game.soft_drop(), Step::Moved);
        assert_eq!(game.soft_drop(), Step::Moved);
        assert_eq!(game.score(), 2);
    }

    #[rstest]
    #[case(1, 1000)]
    #[case(2, 900)]
    #[case(9, 200)]
    #[case(10, 100)]
    #[case(25, 100)]
    fn drop_interval_speeds_up_with_floor(#[case] level: u32, #[case] expected_ms: u64) {
        let mut game = Game::new(3);
        game.level = level;
        assert_eq!(game.drop_interval(), Duration::from_millis(expected_ms));
    }

    #[test]
    fn level_rises_every_ten_lines_and_scales_points() {
        let mut board = Board::default();
        fill_row_except(&mut board, 19, &[3, 4, 5, 6]);
        let mut game = Game::with_pieces(board, PieceKind::I, PieceKind::O, 9);
        game.lines = 9;

        game.hard_drop();
        assert_eq!(game.lines(), 10);
        assert_eq!(game.level(), 2);

        let before = game.score();
        let mut board = game.board.clone();
        fill_row_except(&mut board, 19, &[4, 5]);
        fill_row_except(&mut board, 18, &[4, 5]);
        game.board = board;
        game.active = Piece::spawn(PieceKind::O);
        game.hard_drop();
        // Two lines at level 2, plus 18 rows of hard drop.
        assert_eq!(game.score() - before, 100 * 2 + 18 * 2);
    }

    #[test]
    fn same_seed_same_pieces() {
        let a = Game::new(11);
        let b = Game::new(11);
        assert_eq!(a.active().kind, b.active().kind);
        assert_eq!(a.next(), b.next());
    }
}
