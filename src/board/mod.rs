//! Stone placement rules, groups, liberties, legality, and captures.
//!
//! Grounded on `sgf::board::Board` (a derived, recomputed-on-demand
//! snapshot that does not model captures), generalized to apply captures,
//! following `original_source/backend/board.go`'s `FindGroup`/`Legal`/`Move`.

mod coord;

pub use coord::Coord;

use std::collections::HashSet;
use std::fmt;

/// The occupancy state of a single intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Color {
    Empty,
    Black,
    White,
}

impl Color {
    /// Black <-> White; Empty maps to itself (never produced by a legal move).
    pub fn opposite(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
            Color::Empty => Color::Empty,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Color::Black => "B",
            Color::White => "W",
            Color::Empty => "+",
        };
        write!(f, "{s}")
    }
}

/// A set of coordinates all carrying the same color.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StoneSet {
    pub coords: Vec<Coord>,
    pub color: Color,
}

impl StoneSet {
    pub fn new(coords: Vec<Coord>, color: Color) -> Self {
        Self { coords, color }
    }
}

/// An additive/subtractive change to the board, invertible by swapping
/// `add` and `remove`.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Diff {
    pub add: Vec<StoneSet>,
    pub remove: Vec<StoneSet>,
}

impl Diff {
    pub fn new(add: Vec<StoneSet>, remove: Vec<StoneSet>) -> Self {
        Self { add, remove }
    }

    /// `Invert(Invert(d)) == d`, and applying the inverse undoes `Apply(d)`.
    pub fn invert(&self) -> Diff {
        Diff { add: self.remove.clone(), remove: self.add.clone() }
    }
}

/// A maximal orthogonally-connected region of stones of one color, plus its
/// liberty set. Derived view — never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub coords: HashSet<Coord>,
    pub liberties: HashSet<Coord>,
    pub color: Color,
}

impl Group {
    fn empty() -> Self {
        Group { coords: HashSet::new(), liberties: HashSet::new(), color: Color::Empty }
    }
}

/// A `size x size` grid of intersections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    pub size: usize,
    cells: Vec<Color>,
}

impl Board {
    pub fn new(size: usize) -> Self {
        Board { size, cells: vec![Color::Empty; size * size] }
    }

    fn idx(&self, c: Coord) -> usize {
        c.y as usize * self.size + c.x as usize
    }

    pub fn in_bounds(&self, c: Coord) -> bool {
        (c.x as usize) < self.size && (c.y as usize) < self.size
    }

    pub fn get(&self, c: Coord) -> Color {
        self.cells[self.idx(c)]
    }

    pub fn set(&mut self, c: Coord, color: Color) {
        let i = self.idx(c);
        self.cells[i] = color;
    }

    fn set_many(&mut self, coords: &[Coord], color: Color) {
        for &c in coords {
            self.set(c, color);
        }
    }

    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = Color::Empty);
    }

    /// Up to four orthogonal in-bounds neighbors. Diagonals excluded.
    pub fn neighbors(&self, c: Coord) -> Vec<Coord> {
        let mut out = Vec::with_capacity(4);
        let (x, y) = (c.x as i32, c.y as i32);
        for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
            let (nx, ny) = (x + dx, y + dy);
            if nx >= 0 && ny >= 0 && (nx as usize) < self.size && (ny as usize) < self.size {
                out.push(Coord::new(nx as u16, ny as u16));
            }
        }
        out
    }

    /// DFS from `start`, collecting same-colored connected stones and the
    /// empty cells adjacent to any member as liberties. Empty start yields
    /// an empty group.
    pub fn find_group(&self, start: Coord) -> Group {
        let color = self.get(start);
        if color == Color::Empty {
            return Group::empty();
        }

        let mut stack = vec![start];
        let mut coords = HashSet::new();
        let mut liberties = HashSet::new();

        while let Some(point) = stack.pop() {
            if !coords.insert(point) {
                continue;
            }
            for nb in self.neighbors(point) {
                match self.get(nb) {
                    c if c == color => {
                        if !coords.contains(&nb) {
                            stack.push(nb);
                        }
                    }
                    Color::Empty => {
                        liberties.insert(nb);
                    }
                    _ => {}
                }
            }
        }

        Group { coords, liberties, color }
    }

    /// All groups on the board, each cell visited at most once.
    pub fn groups(&self) -> Vec<Group> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for y in 0..self.size {
            for x in 0..self.size {
                let c = Coord::new(x as u16, y as u16);
                if seen.contains(&c) || self.get(c) == Color::Empty {
                    continue;
                }
                let group = self.find_group(c);
                seen.extend(group.coords.iter().copied());
                out.push(group);
            }
        }
        out
    }

    /// (i) occupied is illegal; (ii)-(iii) a placement with >=1 liberty is
    /// legal; (iv) otherwise legal iff it captures at least one adjacent
    /// opposing group; (v) no positional superko check.
    pub fn legal(&self, c: Coord, color: Color) -> bool {
        if self.get(c) != Color::Empty {
            return false;
        }

        let mut probe = self.clone();
        probe.set(c, color);

        let group = probe.find_group(c);
        if !group.liberties.is_empty() {
            return true;
        }

        for nb in probe.neighbors(c) {
            if probe.get(nb) == Color::Empty {
                continue;
            }
            let gp = probe.find_group(nb);
            if gp.liberties.is_empty() && gp.color == color.opposite() {
                return true;
            }
        }

        false
    }

    /// Plays `color` at `c`. Returns `None` (no mutation) if illegal.
    /// Otherwise captures every adjacent opposing group left with zero
    /// liberties (each neighbor group considered exactly once) and returns
    /// the resulting `Diff`.
    pub fn apply_move(&mut self, c: Coord, color: Color) -> Option<Diff> {
        if !self.legal(c, color) {
            return None;
        }

        self.set(c, color);

        let mut captured = HashSet::new();
        let mut checked_groups: Vec<HashSet<Coord>> = Vec::new();
        for nb in self.neighbors(c) {
            if self.get(nb) != color.opposite() {
                continue;
            }
            if checked_groups.iter().any(|g| g.contains(&nb)) {
                continue;
            }
            let gp = self.find_group(nb);
            if gp.liberties.is_empty() {
                captured.extend(gp.coords.iter().copied());
            }
            checked_groups.push(gp.coords);
        }

        let captured_vec: Vec<Coord> = captured.into_iter().collect();
        self.set_many(&captured_vec, Color::Empty);

        let add = StoneSet::new(vec![c], color);
        let remove = StoneSet::new(captured_vec, color.opposite());
        Some(Diff::new(vec![add], vec![remove]))
    }

    /// Applies each `add` stoneset (place) then each `remove` stoneset
    /// (clear). A no-op for a default/empty diff.
    pub fn apply_diff(&mut self, diff: &Diff) {
        for stones in &diff.add {
            self.set_many(&stones.coords, stones.color);
        }
        for stones in &diff.remove {
            self.set_many(&stones.coords, Color::Empty);
        }
    }

    /// A full-board snapshot expressed as a single additive `Diff`
    /// (`remove` is empty) — used for the FULL frame kind in the
    /// dispatcher.
    pub fn current_frame_diff(&self) -> Diff {
        let mut black = Vec::new();
        let mut white = Vec::new();
        for y in 0..self.size {
            for x in 0..self.size {
                let c = Coord::new(x as u16, y as u16);
                match self.get(c) {
                    Color::Black => black.push(c),
                    Color::White => white.push(c),
                    Color::Empty => {}
                }
            }
        }
        Diff::new(vec![StoneSet::new(black, Color::Black), StoneSet::new(white, Color::White)], vec![])
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in 0..self.size {
            for x in 0..self.size {
                write!(f, "{} ", self.get(Coord::new(x as u16, y as u16)))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occupied_cell_is_illegal_and_does_not_mutate() {
        let mut b = Board::new(9);
        let c = Coord::new(2, 2);
        b.set(c, Color::Black);
        assert!(!b.legal(c, Color::White));
        assert!(b.apply_move(c, Color::White).is_none());
        assert_eq!(b.get(c), Color::Black);
    }

    #[test]
    fn suicide_is_illegal() {
        // Black stones surround (1,1) on all four sides; white at (1,1)
        // would have zero liberties and captures nothing.
        let mut b = Board::new(9);
        for c in [Coord::new(0, 1), Coord::new(2, 1), Coord::new(1, 0), Coord::new(1, 2)] {
            b.set(c, Color::Black);
        }
        assert!(!b.legal(Coord::new(1, 1), Color::White));
    }

    #[test]
    fn capturing_last_liberty_is_legal_and_records_capture() {
        // White at (1,1) is alone with one liberty at (2,1). Black plays
        // there, filling the last liberty and capturing it.
        let mut b = Board::new(9);
        b.set(Coord::new(1, 1), Color::White);
        b.set(Coord::new(0, 1), Color::Black);
        b.set(Coord::new(1, 0), Color::Black);
        b.set(Coord::new(1, 2), Color::Black);

        assert!(b.legal(Coord::new(2, 1), Color::Black));
        let diff = b.apply_move(Coord::new(2, 1), Color::Black).unwrap();
        assert_eq!(diff.remove.len(), 1);
        assert_eq!(diff.remove[0].coords, vec![Coord::new(1, 1)]);
        assert_eq!(b.get(Coord::new(1, 1)), Color::Empty);
    }

    #[test]
    fn immediate_recapture_is_legal_no_superko() {
        // Classic ko shape on a small board:
        //    . B W .
        //    B .(x)W   <- x = (2,1), black captures by filling liberty
        //    . B W .
        let mut b = Board::new(9);
        let black = [Coord::new(1, 0), Coord::new(0, 1), Coord::new(1, 2), Coord::new(3, 1)];
        let white = [Coord::new(2, 0), Coord::new(3, 0), Coord::new(2, 2), Coord::new(3, 2)];
        for c in black {
            b.set(c, Color::Black);
        }
        for c in white {
            b.set(c, Color::White);
        }
        b.set(Coord::new(2, 1), Color::White);

        let diff = b.apply_move(Coord::new(1, 1), Color::Black).unwrap();
        assert_eq!(diff.remove[0].coords, vec![Coord::new(2, 1)]);

        // White immediately recaptures at (2,1) — superko is not enforced.
        let recapture = b.apply_move(Coord::new(2, 1), Color::White);
        assert!(recapture.is_some());
        assert_eq!(recapture.unwrap().remove[0].coords, vec![Coord::new(1, 1)]);
    }

    #[test]
    fn inverting_a_capture_diff_restores_the_pre_move_board() {
        let mut b = Board::new(9);
        b.set(Coord::new(1, 1), Color::White);
        b.set(Coord::new(0, 1), Color::Black);
        b.set(Coord::new(1, 0), Color::Black);
        b.set(Coord::new(1, 2), Color::Black);
        let before = b.clone();

        let diff = b.apply_move(Coord::new(2, 1), Color::Black).unwrap();
        assert_ne!(b, before);
        b.apply_diff(&diff.invert());
        assert_eq!(b, before);
    }

    #[test]
    fn null_diff_is_noop() {
        let mut b = Board::new(9);
        let snapshot = b.clone();
        b.apply_diff(&Diff::default());
        assert_eq!(b, snapshot);
    }
}
