//! Projects a [`GameTree`] into a 2-D grid for client rendering.
//!
//! Grounded directly in `original_source/backend/tree.go`'s `FillGrid`:
//! the `x`/`y` bookkeeping, the "earliest free row without crossing the
//! parent diagonal" search, and the diagonal-cell reservation are all taken
//! from that function. Two deliberate departures from the Go source:
//!
//! - The traversal stack is a tagged `StackFrame` (`Visit`/`Ascend`)
//!   instead of the Go `[]interface{}` mixing `*TreeNode` and a sentinel
//!   `""` string — spec.md §9's REDESIGN FLAG asks for exactly this.
//! - Grid occupancy is a `HashSet<(row, col)>` rather than a
//!   `map[[2]int]int` defaulting to zero, which sidesteps a latent bug in
//!   the original: node index `0` (the root) is indistinguishable from an
//!   empty cell under Go's zero-value map semantics. A set has no such
//!   collision.
//!
//! All bookkeeping maps are keyed by the tree's stable `node.index`
//! (matching the Go version's `map[int]...`), not by arena `NodeId`, since
//! an SGF import can assign indices that don't match arena insertion
//! order.

use std::collections::{HashMap, HashSet};

use crate::board::Color;
use crate::tree::{GameTree, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct GridPos {
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GridNode {
    pub coord: GridPos,
    pub color: Option<Color>,
    pub index: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GridEdge {
    pub start: GridPos,
    pub end: GridPos,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Explorer {
    pub nodes: Vec<GridNode>,
    pub edges: Vec<GridEdge>,
    pub preferred_nodes: Vec<GridNode>,
    pub preferred_edges: Vec<GridEdge>,
    pub current: Option<GridPos>,
    pub current_color: Option<Color>,
}

enum StackFrame {
    Visit(NodeId),
    Ascend,
}

/// Builds the grid layout for `tree`, marking `current_index` (a
/// `TreeNode::index`, not an arena id) as the current position.
pub fn build(tree: &GameTree, current_index: i64) -> Explorer {
    let mut stack = vec![StackFrame::Visit(tree.root())];
    let mut x: i64 = 0;
    let mut grid_len: i64 = 1;
    let mut occupied: HashSet<(i64, i64)> = HashSet::new();

    let mut loc: HashMap<i64, GridPos> = HashMap::new();
    let mut colors: HashMap<i64, Option<Color>> = HashMap::new();
    let mut parents: HashMap<i64, i64> = HashMap::new();
    let mut prefs: HashMap<i64, i64> = HashMap::new();
    let mut current_coord = None;

    while let Some(frame) = stack.pop() {
        let id = match frame {
            StackFrame::Ascend => {
                x -= 1;
                continue;
            }
            StackFrame::Visit(id) => id,
        };

        let node = tree.node(id);
        let index = node.index;
        colors.insert(index, node.color);
        let parent_index = node.parent.map(|p| tree.node(p).index);
        if let Some(pi) = parent_index {
            parents.insert(index, pi);
        }
        if !node.children.is_empty() {
            let preferred_index = tree.node(node.children[node.preferred_child]).index;
            prefs.insert(index, preferred_index);
        }

        let mut y = grid_len - 1;
        if occupied.contains(&(y, x)) {
            grid_len += 1;
            y += 1;
        } else {
            while y != 0 {
                if let Some(pi) = parent_index {
                    let parent_pos = loc[&pi];
                    if x - y >= parent_pos.x - parent_pos.y {
                        break;
                    }
                    if y == parent_pos.y {
                        break;
                    }
                }
                if !occupied.contains(&(y, x)) && occupied.contains(&(y - 1, x)) {
                    break;
                }
                y -= 1;
            }
        }

        occupied.insert((y, x));
        loc.insert(index, GridPos { x, y });

        if index == current_index {
            current_coord = Some(GridPos { x, y });
        }

        if let Some(pi) = parent_index {
            let parent_y = loc[&pi].y;
            if y - parent_y > 1 {
                occupied.insert((y - 1, x - 1));
            }
        }

        x += 1;

        for &child in node.children.iter().rev() {
            stack.push(StackFrame::Ascend);
            stack.push(StackFrame::Visit(child));
        }
    }

    // Reorder deterministically by index — the maps above are unordered,
    // and spec.md §4.4 requires output independent of hash-map iteration
    // order.
    let mut indices: Vec<i64> = loc.keys().copied().collect();
    indices.sort_unstable();

    let mut nodes = Vec::with_capacity(indices.len());
    let mut edges = Vec::new();
    for &idx in &indices {
        let pos = loc[&idx];
        nodes.push(GridNode { coord: pos, color: colors[&idx], index: idx });
        if let Some(&parent_idx) = parents.get(&idx) {
            edges.push(GridEdge { start: loc[&parent_idx], end: pos });
        }
    }

    let mut preferred_nodes = Vec::new();
    let mut preferred_edges = Vec::new();
    let mut idx = tree.node(tree.root()).index;
    loop {
        let Some(&pos) = loc.get(&idx) else { break };
        preferred_nodes.push(GridNode { coord: pos, color: colors[&idx], index: idx });
        if preferred_nodes.len() > 1 {
            let start = preferred_nodes[preferred_nodes.len() - 2].coord;
            preferred_edges.push(GridEdge { start, end: pos });
        }
        match prefs.get(&idx) {
            Some(&next) => idx = next,
            None => break,
        }
    }

    let current_color = colors.get(&current_index).copied().flatten();

    Explorer { nodes, edges, preferred_nodes, preferred_edges, current: current_coord, current_color }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Coord;
    use crate::tree::state::State;

    #[test]
    fn single_node_sits_at_origin() {
        let s = State::new(9);
        let explorer = build(s.tree(), s.node(s.root()).index);
        assert_eq!(explorer.nodes.len(), 1);
        assert_eq!(explorer.nodes[0].coord, GridPos { x: 0, y: 0 });
        assert_eq!(explorer.current, Some(GridPos { x: 0, y: 0 }));
    }

    #[test]
    fn linear_chain_advances_column_each_move() {
        let mut s = State::new(9);
        s.add_move(Coord::new(3, 3), Color::Black);
        s.add_move(Coord::new(15, 15), Color::White);
        let explorer = build(s.tree(), s.node(s.current()).index);
        assert_eq!(explorer.nodes.len(), 3);
        let xs: Vec<i64> = explorer.nodes.iter().map(|n| n.coord.x).collect();
        assert_eq!(xs, vec![0, 1, 2]);
    }

    #[test]
    fn sibling_branches_occupy_different_rows() {
        let mut s = State::new(9);
        s.add_move(Coord::new(3, 3), Color::Black);
        s.left();
        s.add_move(Coord::new(15, 15), Color::Black);
        let explorer = build(s.tree(), s.node(s.current()).index);
        assert_eq!(explorer.nodes.len(), 3);
        let root_children_rows: HashSet<i64> =
            explorer.nodes.iter().filter(|n| n.coord.x == 1).map(|n| n.coord.y).collect();
        assert_eq!(root_children_rows.len(), 2, "two sibling branches must land on distinct rows");
    }

    #[test]
    fn preferred_chain_follows_preferred_child_only() {
        let mut s = State::new(9);
        s.add_move(Coord::new(3, 3), Color::Black);
        s.left();
        s.add_move(Coord::new(15, 15), Color::Black);
        // preferred_child now points at the second (most recently added) branch.
        let explorer = build(s.tree(), s.node(s.current()).index);
        assert_eq!(explorer.preferred_nodes.len(), 2);
        assert_eq!(explorer.preferred_edges.len(), 1);
    }
}
