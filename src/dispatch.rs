//! Event dispatcher: turns one client [`Event`] into at most one [`Frame`].
//!
//! Grounded in `original_source/backend/state.go`'s `Add` method, which
//! switches on an event tag and mutates a `State` in place. That method
//! mixes dispatch with the room/controller concerns (`update_buffer`,
//! `upload_sgf`, password handling); here the table is narrowed to exactly
//! the tags the engine itself understands, leaving the controller-level
//! tags (`update_settings`, `upload_sgf`, `request_sgf`, `trash`,
//! `update_nickname`) to the not-yet-built room controller.
//!
//! `Event.value` is untyped JSON at the wire boundary (`serde_json::Value`),
//! mirroring the Go source's `interface{}` value field; each arm here does
//! its own typed extraction and returns `EngineError::Input` on a type
//! mismatch, the same per-event coercion style `State.Add` uses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::board::{Color, Coord, Diff};
use crate::error::EngineError;
use crate::explorer::{self, Explorer};
use crate::sgf::{Label, PenStroke};
use crate::tree::state::State;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Event {
    pub event: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub color: i32,
    #[serde(default)]
    pub userid: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FrameKind {
    Diff,
    Full,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Marks {
    pub triangles: Vec<Coord>,
    pub squares: Vec<Coord>,
    pub labels: Vec<Label>,
    pub pen: Vec<PenStroke>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub size: usize,
    pub input_buffer: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<Diff>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marks: Option<Marks>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer: Option<Explorer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Frame {
    fn diff_only(kind: FrameKind) -> Self {
        Frame { kind, diff: None, marks: None, explorer: None, comments: None, metadata: None }
    }
}

/// Routes `event` to the matching `State` mutation, per spec.md §4.5's
/// table. Unknown tags (and silently-illegal moves) return `Ok(None)`.
pub fn dispatch(state: &mut State, event: &Event) -> Result<Option<Frame>, EngineError> {
    match event.event.as_str() {
        "add_stone" => dispatch_add_stone(state, event),
        "pass" => dispatch_pass(state, event),
        "remove_stone" => dispatch_remove_stone(state, event),
        "triangle" => dispatch_append_coord_field(state, event, "TR"),
        "square" => dispatch_append_coord_field(state, event, "SQ"),
        "letter" | "number" => dispatch_append_label(state, event),
        "remove_mark" => dispatch_remove_mark(state, event),
        "scissors" => dispatch_scissors(state),
        "left" => dispatch_step(state, State::left),
        "right" => dispatch_step(state, State::right),
        "up" => dispatch_rotate(state, State::up),
        "down" => dispatch_rotate(state, State::down),
        "button" => dispatch_button(state, event),
        "goto_grid" => dispatch_goto_grid(state, event),
        "goto_coord" => dispatch_goto_coord(state, event),
        "comment" => dispatch_comment(state, event),
        "draw" => dispatch_draw(state, event),
        "erase_pen" => {
            state.delete_field("PX");
            Ok(None)
        }
        _ => Ok(None),
    }
}

fn color_from_wire(n: i32) -> Result<Color, EngineError> {
    match n {
        1 => Ok(Color::Black),
        2 => Ok(Color::White),
        other => Err(EngineError::Input(format!("event color must be 1 (black) or 2 (white), got {other}"))),
    }
}

fn coord_from_pair(value: &Value, size: usize) -> Result<Coord, EngineError> {
    let arr =
        value.as_array().ok_or_else(|| EngineError::Input("expected a [x, y] coordinate array".to_string()))?;
    if arr.len() != 2 {
        return Err(EngineError::Input(format!("expected a 2-element [x, y] array, got {}", arr.len())));
    }
    let x = arr[0].as_i64().ok_or_else(|| EngineError::Input("coordinate x must be a number".to_string()))?;
    let y = arr[1].as_i64().ok_or_else(|| EngineError::Input("coordinate y must be a number".to_string()))?;
    if x < 0 || y < 0 || x as usize >= size || y as usize >= size {
        return Err(EngineError::Input(format!("coordinate ({x}, {y}) is out of range for size {size}")));
    }
    Ok(Coord::new(x as u16, y as u16))
}

fn full_explorer(state: &State) -> Explorer {
    explorer::build(state.tree(), state.current_node().index)
}

/// The `current`/`current_color` fields only — used where spec.md §4.5
/// says nodes/edges/preferred are "omitted since unchanged".
fn current_only_explorer(state: &State) -> Explorer {
    let mut e = full_explorer(state);
    e.nodes.clear();
    e.edges.clear();
    e.preferred_nodes.clear();
    e.preferred_edges.clear();
    e
}

fn marks_at(state: &State) -> Marks {
    let node = state.current_node();
    let triangles = node
        .fields
        .get("TR")
        .map(|vs| vs.iter().filter_map(|v| v.parse().ok()).collect())
        .unwrap_or_default();
    let squares = node
        .fields
        .get("SQ")
        .map(|vs| vs.iter().filter_map(|v| v.parse().ok()).collect())
        .unwrap_or_default();
    let labels = node
        .fields
        .get("LB")
        .map(|vs| {
            vs.iter()
                .filter_map(|v| {
                    let (coord, text) = v.split_once(':')?;
                    Some(Label { coord: coord.parse().ok()?, text: text.to_string() })
                })
                .collect()
        })
        .unwrap_or_default();
    let pen = node.fields.get("PX").map(|vs| vs.iter().filter_map(|v| v.parse().ok()).collect()).unwrap_or_default();
    Marks { triangles, squares, labels, pen }
}

fn comments_at(state: &State) -> Option<Vec<String>> {
    state.current_node().fields.get("C").cloned()
}

pub(crate) fn full_frame(state: &State) -> Frame {
    Frame {
        kind: FrameKind::Full,
        diff: Some(state.board().current_frame_diff()),
        marks: Some(marks_at(state)),
        explorer: Some(full_explorer(state)),
        comments: comments_at(state),
        metadata: Some(Metadata { size: state.size(), input_buffer: state.input_buffer }),
    }
}

fn dispatch_add_stone(state: &mut State, event: &Event) -> Result<Option<Frame>, EngineError> {
    let color = color_from_wire(event.color)?;
    let coord = coord_from_pair(&event.value, state.size())?;
    let Some(_) = state.add_move(coord, color) else {
        return Ok(None);
    };
    let diff = state.current_node().diff.clone();
    let mut frame = Frame::diff_only(FrameKind::Diff);
    frame.diff = Some(diff);
    frame.marks = Some(marks_at(state));
    frame.explorer = Some(full_explorer(state));
    Ok(Some(frame))
}

fn dispatch_pass(state: &mut State, event: &Event) -> Result<Option<Frame>, EngineError> {
    let color = color_from_wire(event.color)?;
    state.add_pass(color);
    let mut frame = Frame::diff_only(FrameKind::Diff);
    frame.explorer = Some(full_explorer(state));
    Ok(Some(frame))
}

fn dispatch_remove_stone(state: &mut State, event: &Event) -> Result<Option<Frame>, EngineError> {
    let coord = coord_from_pair(&event.value, state.size())?;
    let id = state.add_setup(vec![], vec![], vec![coord]);
    let diff = state.node(id).diff.clone();
    let mut frame = Frame::diff_only(FrameKind::Diff);
    frame.diff = Some(diff);
    frame.explorer = Some(full_explorer(state));
    Ok(Some(frame))
}

fn dispatch_append_coord_field(
    state: &mut State,
    event: &Event,
    key: &str,
) -> Result<Option<Frame>, EngineError> {
    let coord = coord_from_pair(&event.value, state.size())?;
    state.append_field(key, coord.to_string());
    Ok(None)
}

fn dispatch_append_label(state: &mut State, event: &Event) -> Result<Option<Frame>, EngineError> {
    let arr = event
        .value
        .as_array()
        .ok_or_else(|| EngineError::Input("expected a [x, y, text] array".to_string()))?;
    if arr.len() != 3 {
        return Err(EngineError::Input(format!("expected a 3-element [x, y, text] array, got {}", arr.len())));
    }
    let coord = coord_from_pair(&Value::Array(vec![arr[0].clone(), arr[1].clone()]), state.size())?;
    let text = arr[2].as_str().ok_or_else(|| EngineError::Input("label text must be a string".to_string()))?;
    state.append_field("LB", format!("{coord}:{text}"));
    Ok(None)
}

fn dispatch_remove_mark(state: &mut State, event: &Event) -> Result<Option<Frame>, EngineError> {
    let coord = coord_from_pair(&event.value, state.size())?;
    state.remove_mark_at(coord);
    Ok(None)
}

fn dispatch_scissors(state: &mut State) -> Result<Option<Frame>, EngineError> {
    let Some(diff) = state.cut() else {
        return Ok(None);
    };
    let mut frame = Frame::diff_only(FrameKind::Diff);
    frame.diff = Some(diff);
    frame.marks = Some(marks_at(state));
    frame.explorer = Some(full_explorer(state));
    frame.comments = comments_at(state);
    Ok(Some(frame))
}

fn dispatch_step(state: &mut State, step: fn(&mut State) -> Option<Diff>) -> Result<Option<Frame>, EngineError> {
    let diff = step(state);
    let mut frame = Frame::diff_only(FrameKind::Diff);
    frame.diff = diff;
    frame.marks = Some(marks_at(state));
    frame.explorer = Some(current_only_explorer(state));
    frame.comments = comments_at(state);
    Ok(Some(frame))
}

fn dispatch_rotate(state: &mut State, rotate: fn(&mut State)) -> Result<Option<Frame>, EngineError> {
    rotate(state);
    let mut frame = Frame::diff_only(FrameKind::Diff);
    frame.marks = Some(marks_at(state));
    frame.explorer = Some(current_only_explorer(state));
    Ok(Some(frame))
}

fn dispatch_button(state: &mut State, event: &Event) -> Result<Option<Frame>, EngineError> {
    let tag = event.value.as_str().ok_or_else(|| EngineError::Input("button value must be a string".to_string()))?;
    match tag {
        "Rewind" => state.rewind(),
        "FastForward" => state.fast_forward(),
        other => return Err(EngineError::Input(format!("unknown button tag {other:?}"))),
    }
    Ok(Some(full_frame(state)))
}

fn dispatch_goto_grid(state: &mut State, event: &Event) -> Result<Option<Frame>, EngineError> {
    let index = event.value.as_i64().ok_or_else(|| EngineError::Input("goto_grid value must be a number".to_string()))?;
    state.goto_index(index)?;
    Ok(Some(full_frame(state)))
}

fn dispatch_goto_coord(state: &mut State, event: &Event) -> Result<Option<Frame>, EngineError> {
    let coord = coord_from_pair(&event.value, state.size())?;
    state.goto_coord(coord);
    Ok(Some(full_frame(state)))
}

fn dispatch_comment(state: &mut State, event: &Event) -> Result<Option<Frame>, EngineError> {
    let text = event.value.as_str().ok_or_else(|| EngineError::Input("comment value must be a string".to_string()))?;
    state.set_field("C", text.to_string());
    Ok(None)
}

fn dispatch_draw(state: &mut State, event: &Event) -> Result<Option<Frame>, EngineError> {
    let arr = event.value.as_array().ok_or_else(|| EngineError::Input("expected a draw stroke array".to_string()))?;
    if arr.len() != 5 {
        return Err(EngineError::Input(format!(
            "expected a 5-element [x0, y0, x1, y1, color] array, got {}",
            arr.len()
        )));
    }
    let coord = |v: &Value| -> Result<f64, EngineError> {
        v.as_f64().ok_or_else(|| EngineError::Input("draw stroke coordinates must be numbers".to_string()))
    };
    let x0 = coord(&arr[0])?;
    let y0 = coord(&arr[1])?;
    let x1 = coord(&arr[2])?;
    let y1 = coord(&arr[3])?;
    let color = arr[4].as_str().ok_or_else(|| EngineError::Input("draw stroke color must be a string".to_string()))?;
    let stroke = PenStroke { x0, y0, x1, y1, color: color.to_string() };
    state.append_field("PX", stroke.to_string());
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(tag: &str, value: Value, color: i32) -> Event {
        Event { event: tag.to_string(), value, color, userid: "u1".to_string() }
    }

    #[test]
    fn add_stone_produces_diff_frame_with_explorer() {
        let mut s = State::new(9);
        let frame = dispatch(&mut s, &event("add_stone", json!([3, 3]), 1)).unwrap().unwrap();
        assert_eq!(frame.kind, FrameKind::Diff);
        assert!(frame.diff.is_some());
        assert!(frame.explorer.is_some());
    }

    #[test]
    fn add_stone_on_illegal_move_suppresses_frame() {
        let mut s = State::new(9);
        dispatch(&mut s, &event("add_stone", json!([0, 0]), 1)).unwrap();
        let frame = dispatch(&mut s, &event("add_stone", json!([0, 0]), 2)).unwrap();
        assert!(frame.is_none());
    }

    #[test]
    fn add_stone_rejects_bad_color() {
        let mut s = State::new(9);
        let err = dispatch(&mut s, &event("add_stone", json!([3, 3]), 0)).unwrap_err();
        assert!(matches!(err, EngineError::Input(_)));
    }

    #[test]
    fn pass_frame_carries_only_explorer() {
        let mut s = State::new(9);
        let frame = dispatch(&mut s, &event("pass", Value::Null, 1)).unwrap().unwrap();
        assert!(frame.diff.is_none());
        assert!(frame.explorer.is_some());
    }

    #[test]
    fn triangle_and_remove_mark_produce_no_frame_and_clear_field() {
        let mut s = State::new(9);
        let frame = dispatch(&mut s, &event("triangle", json!([2, 2]), 0)).unwrap();
        assert!(frame.is_none());
        assert_eq!(s.current_node().fields.get("TR").unwrap().len(), 1);
        dispatch(&mut s, &event("remove_mark", json!([2, 2]), 0)).unwrap();
        assert!(s.current_node().fields.get("TR").is_none());
    }

    #[test]
    fn letter_appends_label_field() {
        let mut s = State::new(9);
        dispatch(&mut s, &event("letter", json!([1, 1, "A"]), 0)).unwrap();
        assert_eq!(s.current_node().fields.get("LB").unwrap(), &vec!["bb:A".to_string()]);
    }

    #[test]
    fn goto_grid_returns_full_frame() {
        let mut s = State::new(9);
        dispatch(&mut s, &event("add_stone", json!([3, 3]), 1)).unwrap();
        let root_index = s.tree().node(s.root()).index;
        let frame = dispatch(&mut s, &event("goto_grid", json!(root_index), 0)).unwrap().unwrap();
        assert_eq!(frame.kind, FrameKind::Full);
        assert!(frame.diff.is_some());
        assert!(frame.metadata.is_some());
    }

    #[test]
    fn unknown_event_is_ignored() {
        let mut s = State::new(9);
        let frame = dispatch(&mut s, &event("not_a_real_event", Value::Null, 0)).unwrap();
        assert!(frame.is_none());
    }

    #[test]
    fn draw_then_erase_pen_round_trips_field() {
        let mut s = State::new(9);
        dispatch(&mut s, &event("draw", json!([0.1, 0.2, 0.3, 0.4, "red"]), 0)).unwrap();
        assert_eq!(s.current_node().fields.get("PX").unwrap().len(), 1);
        dispatch(&mut s, &event("erase_pen", Value::Null, 0)).unwrap();
        assert!(s.current_node().fields.get("PX").is_none());
    }
}
