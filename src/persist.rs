//! Room file persistence (spec.md §4.6): one JSON file per room, named by
//! room id, holding just enough to rebuild a `State` and its cursor.
//!
//! Grounded in `original_source/backend/persist.go`'s save/load pair: base64
//! the SGF, snapshot `Prefs`/`Loc`/`InputBuffer`/`NextIndex`/password, and on
//! load replay `FromSGF` + `SetPrefs` + `Right()` repeated `len(loc)` times.
//! `serde`/`serde_json` (already in the dependency stack for the wire
//! format) and `base64` carry this module, matching spec.md §4.6's literal
//! wire shapes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::tree::state::State;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomFile {
    pub sgf: String,
    pub loc: String,
    pub prefs: HashMap<i64, usize>,
    pub buffer: i64,
    pub next_index: i64,
    #[serde(default)]
    pub password: String,
}

fn room_path(dir: &Path, room_id: &str) -> PathBuf {
    dir.join(room_id)
}

/// Builds the persisted snapshot for one room. `password_hash` is the
/// stored hash (empty string for an unprotected room).
pub fn snapshot(state: &State, password_hash: &str) -> RoomFile {
    RoomFile {
        sgf: BASE64.encode(state.to_sgf(true)),
        loc: state.locate(),
        prefs: state.prefs(),
        buffer: state.input_buffer,
        next_index: state.next_index(),
        password: password_hash.to_string(),
    }
}

/// Writes one room's snapshot to `<dir>/<room_id>`.
pub fn save_room(dir: &Path, room_id: &str, state: &State, password_hash: &str) -> Result<(), EngineError> {
    let file = snapshot(state, password_hash);
    let json = serde_json::to_vec_pretty(&file)
        .map_err(|e| EngineError::Internal(format!("failed to serialize room {room_id}: {e}")))?;
    fs::write(room_path(dir, room_id), json)
        .map_err(|e| EngineError::Internal(format!("failed to write room file for {room_id}: {e}")))
}

/// Removes a room's persisted file (heartbeat eviction).
pub fn remove_room_file(dir: &Path, room_id: &str) -> Result<(), EngineError> {
    let path = room_path(dir, room_id);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(EngineError::Internal(format!("failed to remove room file {room_id}: {e}"))),
    }
}

/// Every room id with a persisted file under `dir`.
pub fn list_room_ids(dir: &Path) -> Result<Vec<String>, EngineError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(EngineError::Internal(format!("failed to read persist dir: {e}"))),
    };
    let mut ids = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::Internal(format!("failed to read persist dir entry: {e}")))?;
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            if let Some(name) = entry.file_name().to_str() {
                ids.push(name.to_string());
            }
        }
    }
    Ok(ids)
}

/// Rebuilds a `(State, password_hash)` pair from `<dir>/<room_id>`: decode
/// SGF, restore prefs, replay the cursor path with `right()`.
pub fn load_room(dir: &Path, room_id: &str) -> Result<(State, String), EngineError> {
    let bytes = fs::read(room_path(dir, room_id))
        .map_err(|e| EngineError::Internal(format!("failed to read room file {room_id}: {e}")))?;
    let file: RoomFile = serde_json::from_slice(&bytes)
        .map_err(|e| EngineError::Internal(format!("malformed room file {room_id}: {e}")))?;
    restore(&file)
}

fn restore(file: &RoomFile) -> Result<(State, String), EngineError> {
    let sgf_bytes =
        BASE64.decode(&file.sgf).map_err(|e| EngineError::Internal(format!("malformed room SGF base64: {e}")))?;
    let sgf_text = String::from_utf8(sgf_bytes)
        .map_err(|e| EngineError::Internal(format!("room SGF is not valid UTF-8: {e}")))?;
    let mut state = State::from_sgf(&sgf_text)?;
    state.set_prefs(&file.prefs);
    state.input_buffer = file.buffer;

    if !file.loc.is_empty() {
        let steps = file.loc.split(',').count();
        for _ in 0..steps {
            state.right();
        }
    }

    Ok((state, file.password.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Color, Coord};
    use scratch_dir::ScratchDir;

    mod scratch_dir {
        use std::path::{Path, PathBuf};

        /// A throwaway directory for one test, removed on drop.
        pub struct ScratchDir(PathBuf);

        impl ScratchDir {
            pub fn new(label: &str) -> Self {
                let mut dir = std::env::temp_dir();
                dir.push(format!("kibitz-test-{label}-{:?}", std::time::SystemTime::now()));
                std::fs::create_dir_all(&dir).unwrap();
                ScratchDir(dir)
            }

            pub fn path(&self) -> &Path {
                &self.0
            }
        }

        impl Drop for ScratchDir {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.0);
            }
        }
    }

    #[test]
    fn save_then_load_restores_cursor_and_prefs() {
        let dir = ScratchDir::new("persist-round-trip");
        let mut s = State::new(9);
        s.add_move(Coord::new(2, 2), Color::Black);
        s.add_move(Coord::new(3, 3), Color::White);
        s.left();
        s.add_move(Coord::new(5, 5), Color::Black);

        save_room(dir.path(), "room-a", &s, "").unwrap();
        let (restored, password) = load_room(dir.path(), "room-a").unwrap();

        assert_eq!(password, "");
        assert_eq!(restored.locate(), s.locate());
        assert_eq!(restored.board(), s.board());
    }

    #[test]
    fn list_room_ids_on_missing_dir_is_empty() {
        let dir = ScratchDir::new("persist-missing");
        let missing = dir.path().join("does-not-exist");
        assert_eq!(list_room_ids(&missing).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn remove_room_file_on_missing_file_is_ok() {
        let dir = ScratchDir::new("persist-remove-missing");
        assert!(remove_room_file(dir.path(), "ghost").is_ok());
    }
}
