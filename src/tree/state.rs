//! Cursor-style API over a [`GameTree`], plus SGF import/export.
//!
//! Grounded in `original_source/backend/state.go`'s `State`, resolving the
//! "ambiguities observed" spec.md §9 flags (see `push_head`/`goto_coord`
//! below) the way SPEC_FULL.md §4.3 decides: every navigation primitive
//! moves through the tree one diff at a time so Invariant 1 ("Board always
//! equals the diff composition along root → current") holds after *every*
//! operation, not just after a full `goto_index` round-trip. The Go source
//! sets `Current` directly in a couple of places (`GotoCoord`); this crate
//! always walks stepwise instead, even though the traversal cost is the
//! same order of magnitude.

use std::collections::HashMap;

use crate::board::{Board, Color, Coord, Diff, StoneSet};
use crate::error::EngineError;
use crate::sgf::{self, ParsedObject, SGFProperty};
use crate::tree::{GameTree, NodeId, TreeNode};

const DEFAULT_INPUT_BUFFER_MS: i64 = 250;
const DEFAULT_TIMEOUT_SECS: f64 = 86400.0;
const DEFAULT_SIZE: usize = 19;

pub struct State {
    tree: GameTree,
    board: Board,
    current: NodeId,
    head: NodeId,
    pub input_buffer: i64,
    pub timeout: f64,
}

impl State {
    /// A fresh state: empty board, single root, default settings — mirrors
    /// `original_source`'s `NewState` with `initRoot = false` (the root
    /// carries no SGF metadata until one is set via `add_setup` or an
    /// `update_settings` event).
    pub fn new(size: usize) -> Self {
        State {
            tree: GameTree::new(),
            board: Board::new(size),
            current: 0,
            head: 0,
            input_buffer: DEFAULT_INPUT_BUFFER_MS,
            timeout: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn size(&self) -> usize {
        self.board.size
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn current(&self) -> NodeId {
        self.current
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        self.tree.node(id)
    }

    pub fn current_node(&self) -> &TreeNode {
        self.tree.node(self.current)
    }

    pub fn tree(&self) -> &GameTree {
        &self.tree
    }

    /// The index the next auto-numbered node would receive, for
    /// persistence (spec.md §4.6's `next_index` field).
    pub fn next_index(&self) -> i64 {
        self.tree.peek_next_index()
    }

    // --- mutation: add_move / add_pass / add_setup -------------------

    /// Per spec.md §4.3: reuses an existing identically-valued child
    /// instead of branching again. Returns `None` if `(coord, color)` is
    /// illegal (no node created).
    pub fn add_move(&mut self, coord: Coord, color: Color) -> Option<NodeId> {
        if let Some(pos) = self.tree.find_child(self.current, Some(coord), Some(color)) {
            self.tree.node_mut(self.current).preferred_child = pos;
            self.right();
            return Some(self.current);
        }
        let diff = self.board.apply_move(coord, color)?;
        let id = self.tree.add_child(self.current, Some(coord), Some(color), None);
        self.tree.node_mut(id).diff = diff;
        self.current = id;
        Some(id)
    }

    /// A pass never mutates the board; its diff is always null.
    pub fn add_pass(&mut self, color: Color) -> NodeId {
        if let Some(pos) = self.tree.find_child(self.current, None, Some(color)) {
            self.tree.node_mut(self.current).preferred_child = pos;
            self.right();
            return self.current;
        }
        let id = self.tree.add_child(self.current, None, Some(color), None);
        self.current = id;
        id
    }

    /// Creates a setup node; its diff adds `ab`/`aw` stones and removes
    /// whatever color currently occupies each `ae` coordinate.
    pub fn add_setup(&mut self, ab: Vec<Coord>, aw: Vec<Coord>, ae: Vec<Coord>) -> NodeId {
        let diff = setup_diff(&self.board, &ab, &aw, &ae);
        self.board.apply_diff(&diff);
        let id = self.tree.add_child(self.current, None, None, None);
        self.tree.node_mut(id).diff = diff;
        self.current = id;
        id
    }

    // --- navigation ----------------------------------------------------

    /// Moves to the parent, inverting this node's diff on the board.
    /// Returns the inverted diff, or `None` at the root (no-op).
    pub fn left(&mut self) -> Option<Diff> {
        let parent = self.tree.node(self.current).parent?;
        let inverted = self.tree.node(self.current).diff.invert();
        self.board.apply_diff(&inverted);
        self.current = parent;
        Some(inverted)
    }

    /// Follows `preferred_child`, applying its diff. `None` at a leaf.
    pub fn right(&mut self) -> Option<Diff> {
        let node = self.tree.node(self.current);
        let child = node.children.get(node.preferred_child).copied()?;
        let diff = self.tree.node(child).diff.clone();
        self.board.apply_diff(&diff);
        self.current = child;
        Some(diff)
    }

    /// Rotates `preferred_child` backward (mod `children.len()`); no board
    /// effect.
    pub fn up(&mut self) {
        self.rotate_preferred(-1);
    }

    /// Rotates `preferred_child` forward; no board effect.
    pub fn down(&mut self) {
        self.rotate_preferred(1);
    }

    fn rotate_preferred(&mut self, delta: i64) {
        let node = self.tree.node_mut(self.current);
        let len = node.children.len();
        if len == 0 {
            return;
        }
        let cur = node.preferred_child as i64;
        let len_i = len as i64;
        node.preferred_child = (((cur + delta) % len_i + len_i) % len_i) as usize;
    }

    /// Back to the root, board cleared then the root's own diff re-applied
    /// (usually null, but a root-level `AB`/`AW`/`AE` setup SGF node stores
    /// a real one — per spec.md §4.3, rewind "clears the board, apply
    /// root's diff").
    pub fn rewind(&mut self) {
        self.board.clear();
        self.current = self.tree.root();
        let diff = self.tree.node(self.current).diff.clone();
        self.board.apply_diff(&diff);
    }

    /// Follows `preferred_child` until a leaf is reached.
    pub fn fast_forward(&mut self) {
        while self.right().is_some() {}
    }

    /// `left()` then deletes the just-departed subtree from its parent,
    /// returning the inverted diff `left()` produced. A no-op (returning
    /// `None`) at the root, since there is nothing to depart from.
    pub fn cut(&mut self) -> Option<Diff> {
        let departed = self.current;
        if self.tree.node(departed).parent.is_none() {
            return None;
        }
        let diff = self.left();
        self.tree.remove_subtree(departed);
        diff
    }

    /// Reorders `preferred_child` along the path to `index` so it lies on
    /// the preferred line, then walks there diff-by-diff from the root.
    pub fn goto_index(&mut self, index: i64) -> Result<(), EngineError> {
        let target = self
            .tree
            .id_for_index(index)
            .ok_or_else(|| EngineError::Input(format!("unknown node index {index}")))?;

        let mut node = target;
        while let Some(parent) = self.tree.node(node).parent {
            let pos = self.tree.node(parent).children.iter().position(|&c| c == node).expect(
                "a node's parent must list it among its children",
            );
            self.tree.node_mut(parent).preferred_child = pos;
            node = parent;
        }
        self.navigate_to(target);
        Ok(())
    }

    /// Searches forward along the preferred path, then backward toward the
    /// root, for a move node at `coord`. A no-op if neither search finds
    /// one — per spec.md §4.3.
    pub fn goto_coord(&mut self, coord: Coord) {
        let mut probe = self.current;
        let mut forward = 0usize;
        loop {
            if self.tree.node(probe).coord == Some(coord) {
                for _ in 0..forward {
                    self.right();
                }
                return;
            }
            let node = self.tree.node(probe);
            match node.children.get(node.preferred_child).copied() {
                Some(next) => {
                    probe = next;
                    forward += 1;
                }
                None => break,
            }
        }

        let mut probe = self.current;
        let mut backward = 0usize;
        loop {
            if self.tree.node(probe).coord == Some(coord) {
                for _ in 0..backward {
                    self.left();
                }
                return;
            }
            match self.tree.node(probe).parent {
                Some(parent) => {
                    probe = parent;
                    backward += 1;
                }
                None => break,
            }
        }
    }

    /// Inserts a new node as `head`'s first child (used by the upstream
    /// bridge so imports always land on the primary line). Per
    /// SPEC_FULL.md §4.3: the diff is always populated by actually applying
    /// the move (on the live board if `current == head`, or by probing at
    /// `head` and undoing the probe otherwise), so Invariant 1 is preserved
    /// whichever branch the cursor happens to sit in.
    pub fn push_head(&mut self, coord: Option<Coord>, color: Color) -> Result<NodeId, EngineError> {
        let head = self.head;
        let following = self.current == head;

        if !following {
            let origin = self.current;
            self.navigate_to(head);
            let diff = self.compute_move_diff(coord, color)?;
            let inverted = diff.invert();
            self.board.apply_diff(&inverted);
            self.navigate_to(origin);
            let id = self.tree.push_first_child(head, coord, Some(color));
            self.tree.node_mut(id).diff = diff;
            self.head = id;
            Ok(id)
        } else {
            let diff = self.compute_move_diff(coord, color)?;
            let id = self.tree.push_first_child(head, coord, Some(color));
            self.tree.node_mut(id).diff = diff;
            self.current = id;
            self.head = id;
            Ok(id)
        }
    }

    fn compute_move_diff(&mut self, coord: Option<Coord>, color: Color) -> Result<Diff, EngineError> {
        match coord {
            Some(c) => self
                .board
                .apply_move(c, color)
                .ok_or_else(|| EngineError::Internal(format!("push_head: illegal move at {c}"))),
            None => Ok(Diff::default()),
        }
    }

    /// Navigates to `target` via actual tree edges without touching any
    /// `preferred_child` — used to restore the cursor after the upstream
    /// bridge replays a batch of review moves (spec.md §4.7's `review/{id}/r`
    /// handler "restores the cursor to its prior position").
    pub fn restore_cursor(&mut self, target: NodeId) {
        self.navigate_to(target);
    }

    /// Walks from the root to `target` along actual tree edges (not
    /// necessarily the preferred path), applying each node's diff in turn.
    fn navigate_to(&mut self, target: NodeId) {
        let path = self.path_from_root(target);
        self.rewind();
        for pos in path {
            let node = self.tree.node(self.current);
            let child = node.children[pos];
            let diff = self.tree.node(child).diff.clone();
            self.board.apply_diff(&diff);
            self.current = child;
        }
    }

    fn path_from_root(&self, target: NodeId) -> Vec<usize> {
        let mut positions = Vec::new();
        let mut node = target;
        while let Some(parent) = self.tree.node(node).parent {
            let pos = self.tree.node(parent).children.iter().position(|&c| c == node).expect(
                "a node's parent must list it among its children",
            );
            positions.push(pos);
            node = parent;
        }
        positions.reverse();
        positions
    }

    // --- annotation fields -----------------------------------------------

    /// Appends one value to a multi-value field (`TR`/`SQ`/`LB`/`PX`) at
    /// `current`.
    pub fn append_field(&mut self, key: &str, value: String) {
        self.tree.node_mut(self.current).fields.entry(key.to_string()).or_default().push(value);
    }

    /// Replaces a single-value field (`C`) at `current` wholesale.
    pub fn set_field(&mut self, key: &str, value: String) {
        self.tree.node_mut(self.current).fields.insert(key.to_string(), vec![value]);
    }

    /// Deletes a field entirely at `current` (e.g. `PX` for `erase_pen`).
    pub fn delete_field(&mut self, key: &str) {
        self.tree.node_mut(self.current).fields.remove(key);
    }

    /// Removes any `TR`/`SQ`/`LB` annotation sitting at `coord` from
    /// `current` — the `remove_mark` event's effect.
    pub fn remove_mark_at(&mut self, coord: Coord) {
        let node = self.tree.node_mut(self.current);
        let marker = coord.to_string();
        for key in ["TR", "SQ"] {
            if let Some(values) = node.fields.get_mut(key) {
                values.retain(|v| v != &marker);
                if values.is_empty() {
                    node.fields.remove(key);
                }
            }
        }
        if let Some(values) = node.fields.get_mut("LB") {
            let prefix = format!("{marker}:");
            values.retain(|v| !v.starts_with(&prefix));
            if values.is_empty() {
                node.fields.remove("LB");
            }
        }
    }

    // --- preferences / location -----------------------------------------

    /// `node.index -> preferred_child` for every reachable node.
    pub fn prefs(&self) -> HashMap<i64, usize> {
        self.tree
            .iter_subtree(self.tree.root())
            .map(|(_, node)| (node.index, node.preferred_child))
            .collect()
    }

    /// Restores a `prefs()` snapshot; nodes absent from `prefs` default to 0.
    pub fn set_prefs(&mut self, prefs: &HashMap<i64, usize>) {
        let ids: Vec<NodeId> = self.tree.iter_subtree(self.tree.root()).map(|(id, _)| id).collect();
        for id in ids {
            let index = self.tree.node(id).index;
            self.tree.node_mut(id).preferred_child = *prefs.get(&index).unwrap_or(&0);
        }
    }

    pub fn reset_prefs(&mut self) {
        let ids: Vec<NodeId> = self.tree.iter_subtree(self.tree.root()).map(|(id, _)| id).collect();
        for id in ids {
            self.tree.node_mut(id).preferred_child = 0;
        }
    }

    /// Child-index path from root to `current`, root side first.
    pub fn locate(&self) -> String {
        self.path_from_root(self.current).iter().map(|p| p.to_string()).collect::<Vec<_>>().join(",")
    }

    // --- SGF import / export --------------------------------------------

    pub fn to_sgf(&self, indexes: bool) -> String {
        let mut out = String::from("(");
        write_node(&self.tree, self.tree.root(), indexes, &mut out);
        out.push(')');
        out
    }

    /// Parses `text`, rebuilding a whole `State` from scratch. Rejects any
    /// move that would be illegal (suicide, occupied cell), per spec.md
    /// §4.2. `IX` properties, if present, are reused as node indices.
    pub fn from_sgf(text: &str) -> Result<State, EngineError> {
        let parsed = sgf::parse(text).map_err(EngineError::from)?;

        let root_fields = parsed.nodes.first().cloned().unwrap_or_default();
        let size = root_fields
            .iter()
            .find_map(|p| match p {
                SGFProperty::SZ(n) => Some(*n as usize),
                _ => None,
            })
            .unwrap_or(DEFAULT_SIZE);

        let mut state = State::new(size);
        import_object(&mut state, &parsed, true)?;
        state.reset_prefs();

        // `head` is the furthest-forward node along the primary (first)
        // line — the glossary's definition — found by always taking the
        // first child, now that every `preferred_child` is reset to 0.
        let mut head = state.tree.root();
        while let Some(&child) = state.tree.node(head).children.first() {
            head = child;
        }
        state.head = head;
        state.rewind();
        Ok(state)
    }
}

/// Derives the `Diff` for a setup node: `ab`/`aw` add stones, `ae` removes
/// whatever color is present at each coordinate (grouped so the removed
/// `StoneSet`s carry accurate colors), per spec.md §4.2's `AE` mapping.
fn setup_diff(board: &Board, ab: &[Coord], aw: &[Coord], ae: &[Coord]) -> Diff {
    let mut add = Vec::new();
    if !ab.is_empty() {
        add.push(StoneSet::new(ab.to_vec(), Color::Black));
    }
    if !aw.is_empty() {
        add.push(StoneSet::new(aw.to_vec(), Color::White));
    }

    let mut remove_black = Vec::new();
    let mut remove_white = Vec::new();
    for &c in ae {
        match board.get(c) {
            Color::Black => remove_black.push(c),
            Color::White => remove_white.push(c),
            Color::Empty => {}
        }
    }
    let mut remove = Vec::new();
    if !remove_black.is_empty() {
        remove.push(StoneSet::new(remove_black, Color::Black));
    }
    if !remove_white.is_empty() {
        remove.push(StoneSet::new(remove_white, Color::White));
    }
    Diff::new(add, remove)
}

/// One parsed node's properties split into the fields the tree treats
/// structurally (`B`/`W`/`AB`/`AW`/`AE`/`IX`) and everything else, which is
/// kept verbatim in `TreeNode::fields`.
struct Classified {
    mv: Option<(Option<Coord>, Color)>,
    ab: Vec<Coord>,
    aw: Vec<Coord>,
    ae: Vec<Coord>,
    index: Option<i64>,
    other: HashMap<String, Vec<String>>,
}

fn classify(props: &[SGFProperty]) -> Classified {
    let mut c = Classified {
        mv: None,
        ab: Vec::new(),
        aw: Vec::new(),
        ae: Vec::new(),
        index: None,
        other: HashMap::new(),
    };
    for p in props {
        match p {
            SGFProperty::B(coord) => c.mv = Some((*coord, Color::Black)),
            SGFProperty::W(coord) => c.mv = Some((*coord, Color::White)),
            SGFProperty::AB(coords) => c.ab.extend(coords.iter().copied()),
            SGFProperty::AW(coords) => c.aw.extend(coords.iter().copied()),
            SGFProperty::AE(coords) => c.ae.extend(coords.iter().copied()),
            SGFProperty::IX(n) => c.index = Some(*n),
            other => {
                c.other.insert(other.key().to_string(), other.values());
            }
        }
    }
    c
}

/// Imports one `ParsedObject`'s linear run of nodes under `parent`
/// (`State::root()` the first time, since the first parsed node configures
/// the state's pre-existing root rather than adding a child to it), then
/// recurses into branch children.
fn import_object(state: &mut State, obj: &ParsedObject, is_root_object: bool) -> Result<(), EngineError> {
    let mut skip_first = is_root_object;
    for props in &obj.nodes {
        let classified = classify(props);
        if skip_first {
            skip_first = false;
            let root = state.tree.root();
            state.tree.node_mut(root).fields = classified.other;
            if !classified.ab.is_empty() || !classified.aw.is_empty() || !classified.ae.is_empty() {
                let diff = setup_diff(&state.board, &classified.ab, &classified.aw, &classified.ae);
                state.board.apply_diff(&diff);
                state.tree.node_mut(root).diff = diff;
            }
            continue;
        }
        apply_classified_node(state, classified)?;
    }
    // Every child object branches from the same node (the last one this
    // call appended, or the root if it appended none) — reset `current`
    // there before each sibling, since processing one branch otherwise
    // leaves `current` at that branch's leaf.
    let branch_point = state.current;
    for child in &obj.children {
        state.current = branch_point;
        import_object(state, child, false)?;
    }
    Ok(())
}

fn apply_classified_node(state: &mut State, c: Classified) -> Result<(), EngineError> {
    let id = if let Some((coord, color)) = c.mv {
        match coord {
            Some(xy) => {
                let diff = state
                    .board
                    .apply_move(xy, color)
                    .ok_or_else(|| EngineError::Parse(format!("illegal move {color:?} at {xy}")))?;
                let id = state.tree.add_child(state.current, Some(xy), Some(color), c.index);
                state.tree.node_mut(id).diff = diff;
                id
            }
            None => state.tree.add_child(state.current, None, Some(color), c.index),
        }
    } else {
        let diff = setup_diff(&state.board, &c.ab, &c.aw, &c.ae);
        state.board.apply_diff(&diff);
        let id = state.tree.add_child(state.current, None, None, c.index);
        state.tree.node_mut(id).diff = diff;
        id
    };
    state.tree.node_mut(id).fields = c.other;
    state.current = id;
    Ok(())
}

/// Reconstructs `Vec<SGFProperty>` for one node's "other" fields, for
/// serialization — the inverse of `classify`'s `other` map.
fn fields_to_properties(fields: &HashMap<String, Vec<String>>) -> Vec<SGFProperty> {
    let mut keys: Vec<&String> = fields.keys().collect();
    keys.sort();
    keys.into_iter()
        .filter_map(|key| {
            let values = &fields[key];
            Some(SGFProperty::Unknown(key.clone(), values.clone()))
        })
        .collect()
}

fn write_node(tree: &GameTree, id: NodeId, indexes: bool, out: &mut String) {
    let node = tree.node(id);
    out.push(';');

    if let Some(color) = node.color {
        let key = if color == Color::Black { "B" } else { "W" };
        match node.coord {
            Some(c) => out.push_str(&format!("{key}[{c}]")),
            None => out.push_str(&format!("{key}[]")),
        }
    } else {
        for add in &node.diff.add {
            let key = if add.color == Color::Black { "AB" } else { "AW" };
            out.push_str(key);
            for c in &add.coords {
                out.push_str(&format!("[{c}]"));
            }
        }
        if !node.diff.remove.is_empty() {
            out.push_str("AE");
            for stones in &node.diff.remove {
                for c in &stones.coords {
                    out.push_str(&format!("[{c}]"));
                }
            }
        }
    }

    for prop in fields_to_properties(&node.fields) {
        out.push_str(&prop.to_string());
    }

    if indexes {
        out.push_str(&format!("IX[{}]", node.index));
    }

    match node.children.len() {
        0 => {}
        1 => write_node(tree, node.children[0], indexes, out),
        _ => {
            for &child in &node.children {
                out.push('(');
                write_node(tree, child, indexes, out);
                out.push(')');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_move_rejects_suicide_and_creates_no_node() {
        let mut s = State::new(9);
        assert_eq!(s.add_move(Coord::new(0, 1), Color::White).is_some(), true);
        assert_eq!(s.add_move(Coord::new(1, 0), Color::White).is_some(), true);
        let before = s.tree().iter_subtree(s.root()).count();
        assert!(s.add_move(Coord::new(0, 0), Color::Black).is_none());
        assert_eq!(s.tree().iter_subtree(s.root()).count(), before);
    }

    #[test]
    fn add_move_reuses_existing_identical_child() {
        let mut s = State::new(9);
        let first = s.add_move(Coord::new(3, 3), Color::Black).unwrap();
        s.left();
        let second = s.add_move(Coord::new(3, 3), Color::Black).unwrap();
        assert_eq!(first, second, "identical (coord, color) must not create a duplicate branch");
    }

    #[test]
    fn left_right_round_trip_restores_board() {
        let mut s = State::new(9);
        s.add_move(Coord::new(4, 4), Color::Black);
        let snapshot = s.board().clone();
        s.left();
        assert_ne!(*s.board(), snapshot);
        s.right();
        assert_eq!(*s.board(), snapshot);
    }

    #[test]
    fn cut_at_root_is_noop() {
        let mut s = State::new(9);
        let root = s.root();
        s.cut();
        assert_eq!(s.current(), root);
    }

    #[test]
    fn cut_removes_subtree_and_moves_up() {
        let mut s = State::new(9);
        s.add_move(Coord::new(2, 2), Color::Black);
        s.add_move(Coord::new(3, 3), Color::White);
        s.cut();
        assert_eq!(s.tree().node(s.current()).children.len(), 0);
    }

    #[test]
    fn goto_index_then_rewind_then_right_reaches_same_node() {
        let mut s = State::new(9);
        let a = s.add_move(Coord::new(2, 2), Color::Black).unwrap();
        s.add_move(Coord::new(3, 3), Color::White);
        let index_a = s.node(a).index;
        s.goto_index(index_a).unwrap();
        assert_eq!(s.current(), a);
    }

    #[test]
    fn push_head_from_non_head_cursor_preserves_current() {
        let mut s = State::new(9);
        s.add_move(Coord::new(2, 2), Color::Black);
        s.left();
        let before = s.current();
        let board_before = s.board().clone();
        s.push_head(Some(Coord::new(16, 16)), Color::White).unwrap();
        assert_eq!(s.current(), before);
        assert_eq!(*s.board(), board_before);
    }

    #[test]
    fn push_head_following_head_advances_cursor() {
        let mut s = State::new(9);
        let head_id = s.push_head(Some(Coord::new(3, 3)), Color::Black).unwrap();
        assert_eq!(s.current(), head_id);
        assert_eq!(s.head(), head_id);
    }

    #[test]
    fn sgf_round_trip_preserves_moves() {
        let text = "(;GM[1]FF[4]SZ[19]PB[Black]PW[White];B[pd];W[dd];B[pp];W[dp];B[];W[])";
        let s = State::from_sgf(text).unwrap();
        let re = s.to_sgf(false);
        let s2 = State::from_sgf(&re).unwrap();
        assert_eq!(s.tree().iter_subtree(s.root()).count(), s2.tree().iter_subtree(s2.root()).count());
    }

    #[test]
    fn sgf_branching_parses_two_children_at_root() {
        let s = State::from_sgf("(;SZ[19](;B[pd];W[dd])(;B[dd];W[ee]))").unwrap();
        assert_eq!(s.tree().node(s.root()).children.len(), 2);
    }

    #[test]
    fn root_level_setup_stones_survive_rewind() {
        // AB/AW/AE on the SGF root node become the root's own diff; rewind
        // must re-apply it, not just clear the board (Invariant 1).
        let mut s = State::from_sgf("(;SZ[9]AB[cc][gg])").unwrap();
        assert_eq!(s.current(), s.root());
        assert_eq!(s.board().get(Coord::new(2, 2)), Color::Black);
        assert_eq!(s.board().get(Coord::new(6, 6)), Color::Black);

        s.add_move(Coord::new(3, 3), Color::White);
        s.rewind();
        assert_eq!(s.current(), s.root());
        assert_eq!(s.board().get(Coord::new(2, 2)), Color::Black);
        assert_eq!(s.board().get(Coord::new(6, 6)), Color::Black);
        assert_eq!(s.board().get(Coord::new(3, 3)), Color::Empty);
    }

    #[test]
    fn setup_ae_removes_stone_added_by_ab() {
        let mut s = State::new(9);
        s.add_setup(vec![Coord::new(0, 0)], vec![], vec![]);
        assert_eq!(s.board().get(Coord::new(0, 0)), Color::Black);
        s.add_setup(vec![], vec![], vec![Coord::new(0, 0)]);
        assert_eq!(s.board().get(Coord::new(0, 0)), Color::Empty);
    }

    #[test]
    fn locate_reports_root_side_first_path() {
        let mut s = State::new(9);
        s.add_move(Coord::new(2, 2), Color::Black);
        s.add_move(Coord::new(3, 3), Color::White);
        assert_eq!(s.locate(), "0,0");
    }

    #[test]
    fn remove_mark_at_clears_triangle_square_and_label() {
        let mut s = State::new(9);
        let c = Coord::new(3, 3);
        s.append_field("TR", c.to_string());
        s.append_field("LB", format!("{c}:A"));
        s.remove_mark_at(c);
        assert!(s.current_node().fields.get("TR").is_none());
        assert!(s.current_node().fields.get("LB").is_none());
    }

    #[test]
    fn set_field_replaces_existing_comment() {
        let mut s = State::new(9);
        s.set_field("C", "first".to_string());
        s.set_field("C", "second".to_string());
        assert_eq!(s.current_node().fields.get("C"), Some(&vec!["second".to_string()]));
    }

    #[test]
    fn prefs_round_trip() {
        let mut s = State::new(9);
        s.add_move(Coord::new(2, 2), Color::Black);
        s.left();
        s.add_move(Coord::new(16, 16), Color::Black);
        let prefs = s.prefs();
        s.reset_prefs();
        assert_eq!(s.prefs().values().all(|&v| v == 0), true);
        s.set_prefs(&prefs);
        assert_eq!(s.prefs(), prefs);
    }
}
