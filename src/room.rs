//! Room & session controller (C6): per-room connection fan-out, rate
//! limiting, the input buffer, the password gate, and the handful of
//! controller-level events (`upload_sgf`, `request_sgf`, `trash`,
//! `update_nickname`, `update_settings`) that sit above the dispatcher.
//!
//! Grounded in `other_examples/.../bughousers-server`'s `Session` for the
//! concurrency shape — one `tokio::sync::broadcast` channel per room, every
//! connection subscribing to it — and in `original_source/backend/main.go`'s
//! per-room bookkeeping (`LastEventTime`, `LastEventUser`, nickname map,
//! auth set) for the fields and the gating order (rate limit, then buffer,
//! then password).

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock, broadcast};

use crate::board::{Color, Coord};
use crate::bridge::{self, BridgeConfig};
use crate::dispatch::{self, Event};
use crate::error::EngineError;
use crate::persist;
use crate::tree::state::State;

pub type ConnId = u64;

const RATE_LIMIT_MS: i64 = 50;
const HEARTBEAT_INTERVAL_SECS: u64 = 3600;
const DEFAULT_SIZE: usize = 19;
const PASSWORD_GATE_BYPASS: [&str; 2] = ["isprotected", "checkpassword"];
const INPUT_BUFFER_WHITELIST: [&str; 3] = ["update_settings", "update_nickname", "draw"];
/// Pure cursor movement, per spec.md §4.6's broadcast rule: "`last_event_time`
/// and `last_event_user` are updated iff the handler sets the update flag
/// (navigation and nickname updates do not)." These tags produce a `Frame`
/// (so they aren't dropped by the `Ok(Some(frame))` check) but must not
/// reset the room's idle clock or claim `last_event_user`.
const NAVIGATION_EVENTS: [&str; 7] = ["left", "right", "up", "down", "button", "goto_grid", "goto_coord"];

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_millis() as i64
}

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_conn_id() -> ConnId {
    NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)
}

/// Password hashing is an explicit external collaborator (spec.md §1's
/// non-goal list names "password hashing primitives"). The controller only
/// needs this one-way seam; a concrete implementation is supplied by the
/// binary that wires the server together.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plain: &str) -> String;
    fn verify(&self, plain: &str, hash: &str) -> bool;
}

/// Every external collaborator the controller needs but spec.md §1 scopes
/// out of this crate: password hashing, and the upstream live-game bridge's
/// socket dialer / HTTP fetcher / game-ended probe / player-name lookup.
/// Bundled so `Server` and `Room::handle_event` take one handle instead of
/// five.
pub struct Collaborators {
    pub hasher: Arc<dyn PasswordHasher>,
    pub ended_probe: Arc<dyn bridge::GameEndedProbe>,
    pub fetcher: Arc<dyn bridge::SgfFetcher>,
    pub player_lookup: Arc<dyn bridge::PlayerLookup>,
    pub dialer: Arc<dyn bridge::UpstreamDialer>,
    pub player_id: String,
    pub username: String,
    pub auth: String,
}

/// The URL shape of §4.6: `/<prefix>/<roomID>[/<op>]`.
pub struct ParsedUrl {
    pub prefix: String,
    pub room_id: String,
    pub op: Option<String>,
}

pub fn parse_url(path: &str) -> Result<ParsedUrl, EngineError> {
    let trimmed = path.trim_start_matches('/');
    let mut parts = trimmed.split('/');
    let prefix = parts.next().filter(|s| !s.is_empty()).ok_or_else(|| EngineError::Input("empty URL path".to_string()))?;
    let room_id = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EngineError::Input(format!("URL {path:?} is missing a room id")))?;
    let op = parts.next().filter(|s| !s.is_empty()).map(|s| s.to_string());
    Ok(ParsedUrl { prefix: prefix.to_string(), room_id: room_id.to_string(), op })
}

/// One outgoing wire message: the (possibly rewritten) event tag, its
/// payload, and the originating connection id, per spec.md §4.6's
/// "Server event JSON" shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingEvent {
    pub event: String,
    pub value: Value,
    pub userid: String,
}

struct RoomInner {
    state: State,
    connections: HashSet<ConnId>,
    last_event_time: i64,
    last_event_user: Option<ConnId>,
    last_message_time: HashMap<ConnId, i64>,
    nicknames: HashMap<ConnId, String>,
    authed: HashSet<ConnId>,
    password_hash: Option<String>,
    bridge: Option<bridge::BridgeHandle>,
}

impl RoomInner {
    fn new(size: usize) -> Self {
        RoomInner {
            state: State::new(size),
            connections: HashSet::new(),
            last_event_time: now_ms(),
            last_event_user: None,
            last_message_time: HashMap::new(),
            nicknames: HashMap::new(),
            authed: HashSet::new(),
            password_hash: None,
            bridge: None,
        }
    }

    fn terminate_bridge(&mut self) {
        if let Some(handle) = self.bridge.take() {
            handle.end();
        }
    }
}

#[derive(Serialize)]
struct InitSnapshot {
    sgf: String,
    loc: String,
    prefs: HashMap<i64, usize>,
    buffer: i64,
    next_index: i64,
}

fn init_snapshot(inner: &RoomInner) -> InitSnapshot {
    InitSnapshot {
        sgf: BASE64.encode(inner.state.to_sgf(false)),
        loc: inner.state.locate(),
        prefs: inner.state.prefs(),
        buffer: inner.state.input_buffer,
        next_index: inner.state.next_index(),
    }
}

fn user_list(inner: &RoomInner) -> Value {
    serde_json::json!(inner.nicknames.values().cloned().collect::<Vec<_>>())
}


pub struct Room {
    pub id: String,
    inner: Mutex<RoomInner>,
    broadcast: broadcast::Sender<String>,
}

impl Room {
    fn new(id: String, size: usize) -> Arc<Room> {
        let (tx, _rx) = broadcast::channel(256);
        Arc::new(Room { id, inner: Mutex::new(RoomInner::new(size)), broadcast: tx })
    }

    fn from_state(id: String, state: State, password_hash: Option<String>) -> Arc<Room> {
        let (tx, _rx) = broadcast::channel(256);
        let mut inner = RoomInner::new(state.size());
        inner.state = state;
        inner.password_hash = password_hash;
        Arc::new(Room { id, inner: Mutex::new(inner), broadcast: tx })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.broadcast.subscribe()
    }

    fn publish(&self, event: &str, userid: &str, value: Value) {
        let msg = OutgoingEvent { event: event.to_string(), value, userid: userid.to_string() };
        if let Ok(json) = serde_json::to_string(&msg) {
            let _ = self.broadcast.send(json);
        }
    }

    /// The payload for the `sgf` / `sgfix` / `debug` URL ops — answered to
    /// the requesting connection only, never broadcast.
    pub async fn export(&self, op: &str) -> String {
        let inner = self.inner.lock().await;
        match op {
            "sgf" => inner.state.to_sgf(false),
            "sgfix" => inner.state.to_sgf(true),
            _ => serde_json::to_string(&init_snapshot(&inner)).unwrap_or_default(),
        }
    }

    /// The init `handshake` frame sent to a newly-joined connection on an
    /// already-existing room.
    pub async fn handshake(&self) -> String {
        let inner = self.inner.lock().await;
        serde_json::to_string(&init_snapshot(&inner)).unwrap_or_default()
    }

    pub async fn join(&self, conn: ConnId) {
        let mut inner = self.inner.lock().await;
        inner.connections.insert(conn);
        inner.nicknames.insert(conn, String::new());
        let list = user_list(&inner);
        drop(inner);
        self.publish("user_list", "", list);
    }

    pub async fn leave(&self, conn: ConnId) {
        let mut inner = self.inner.lock().await;
        inner.connections.remove(&conn);
        inner.nicknames.remove(&conn);
        inner.authed.remove(&conn);
        inner.last_message_time.remove(&conn);
        let list = user_list(&inner);
        drop(inner);
        self.publish("user_list", "", list);
    }

    async fn is_protected(&self) -> bool {
        self.inner.lock().await.password_hash.is_some()
    }

    /// Routes one incoming event through rate limiting, the input buffer,
    /// the password gate, the controller-level events, and finally the
    /// dispatcher, broadcasting the result. Mirrors the event-handling loop
    /// in `original_source/backend/main.go`.
    pub async fn handle_event(self: &Arc<Self>, collabs: &Arc<Collaborators>, conn: ConnId, ev: Event) {
        let hasher = collabs.hasher.as_ref();
        let mut inner = self.inner.lock().await;

        if ev.event == "add_stone" {
            let last = inner.last_message_time.get(&conn).copied().unwrap_or(0);
            let now = now_ms();
            inner.last_message_time.insert(conn, now);
            if now - last < RATE_LIMIT_MS {
                return;
            }
        }

        let is_gate_event = PASSWORD_GATE_BYPASS.contains(&ev.event.as_str());
        if !is_gate_event {
            if inner.password_hash.is_some() && !inner.authed.contains(&conn) {
                return;
            }
            if !INPUT_BUFFER_WHITELIST.contains(&ev.event.as_str()) && inner.last_event_user != Some(conn) {
                let now = now_ms();
                if now - inner.last_event_time < inner.state.input_buffer {
                    return;
                }
            }
        }

        match ev.event.as_str() {
            "isprotected" => {
                let protected = inner.password_hash.is_some();
                drop(inner);
                self.publish("isprotected", &ev.userid, Value::Bool(protected));
            }
            "checkpassword" => {
                let ok = match (&inner.password_hash, ev.value.as_str()) {
                    (Some(hash), Some(plain)) => hasher.verify(plain, hash),
                    (None, _) => true,
                    _ => false,
                };
                if ok {
                    inner.authed.insert(conn);
                }
                drop(inner);
                self.publish("checkpassword", &ev.userid, Value::Bool(ok));
            }
            "update_nickname" => {
                if let Some(name) = ev.value.as_str() {
                    inner.nicknames.insert(conn, name.to_string());
                }
                let list = user_list(&inner);
                drop(inner);
                self.publish("update_nickname", &ev.userid, list);
            }
            "update_settings" => {
                apply_settings(&mut inner, hasher, &ev.value);
                let conns: Vec<ConnId> = inner.connections.iter().copied().collect();
                inner.authed.extend(conns);
                let snapshot = serde_json::to_value(init_snapshot(&inner)).unwrap_or(Value::Null);
                inner.last_event_time = now_ms();
                inner.last_event_user = Some(conn);
                drop(inner);
                self.publish("update_settings", &ev.userid, snapshot);
            }
            "upload_sgf" => {
                if let Some(decoded) =
                    ev.value.as_str().and_then(|b64| BASE64.decode(b64).ok()).and_then(|b| String::from_utf8(b).ok())
                {
                    if let Ok(state) = State::from_sgf(&decoded) {
                        inner.terminate_bridge();
                        inner.state = state;
                    }
                }
                let snapshot = serde_json::to_value(init_snapshot(&inner)).unwrap_or(Value::Null);
                inner.last_event_time = now_ms();
                inner.last_event_user = Some(conn);
                drop(inner);
                self.publish("upload_sgf", &ev.userid, snapshot);
            }
            "trash" => {
                let size = inner.state.size();
                let buffer = inner.state.input_buffer;
                inner.terminate_bridge();
                inner.state = State::new(size);
                inner.state.input_buffer = buffer;
                let snapshot = serde_json::to_value(init_snapshot(&inner)).unwrap_or(Value::Null);
                inner.last_event_time = now_ms();
                inner.last_event_user = Some(conn);
                drop(inner);
                self.publish("trash", &ev.userid, snapshot);
            }
            "request_sgf" => {
                drop(inner);
                let Some(url) = ev.value.as_str().map(str::to_string) else { return };
                let game_ref = bridge::parse_game_reference(&url);
                let mut bridged = false;
                if let Some(game_ref) = &game_ref {
                    if !collabs.ended_probe.ended(&game_ref.id).await {
                        match collabs.dialer.dial().await {
                            Ok(stream) => {
                                let config = BridgeConfig {
                                    player_id: collabs.player_id.clone(),
                                    username: collabs.username.clone(),
                                    auth: collabs.auth.clone(),
                                    game_id: game_ref.id.clone(),
                                    kind: game_ref.kind,
                                };
                                let handle = bridge::spawn(stream, config, self.clone(), collabs.player_lookup.clone());
                                let mut inner = self.inner.lock().await;
                                inner.terminate_bridge();
                                inner.bridge = Some(handle);
                                bridged = true;
                            }
                            Err(e) => log::warn!("bridge dial failed for room {}: {e}", self.id),
                        }
                    }
                }
                if !bridged && bridge::is_allowed_host(&url) {
                    match collabs.fetcher.fetch(&url).await {
                        Ok(sgf) => self.bridge_replace_from_sgf(&sgf).await,
                        Err(e) => log::warn!("sgf fetch for room {} failed: {e}", self.id),
                    }
                }
            }
            _ => {
                let result = dispatch::dispatch(&mut inner.state, &ev);
                if let Ok(Some(frame)) = result {
                    if !NAVIGATION_EVENTS.contains(&ev.event.as_str()) {
                        inner.last_event_time = now_ms();
                        inner.last_event_user = Some(conn);
                    }
                    let value = serde_json::to_value(frame).unwrap_or(Value::Null);
                    drop(inner);
                    self.publish(&ev.event, &ev.userid, value);
                }
            }
        }
    }

    /// Replaces the room's state wholesale from an upstream `gamedata`
    /// payload (or a plain fetched SGF), broadcasting a FULL frame.
    pub async fn bridge_replace_from_sgf(&self, sgf_text: &str) {
        let Ok(state) = State::from_sgf(sgf_text) else { return };
        let mut inner = self.inner.lock().await;
        inner.state = state;
        let frame = dispatch::full_frame(&inner.state);
        inner.last_event_time = now_ms();
        drop(inner);
        let value = serde_json::to_value(frame).unwrap_or(Value::Null);
        self.publish("gamedata", "", value);
    }

    /// Imports one move relayed by the bridge's `game/{id}/move` topic onto
    /// the live head, per spec.md §4.7: the color is derived from the
    /// head's current color (black's move flips to white, anything else
    /// flips to black), never carried on the wire frame itself.
    pub async fn bridge_import_move(&self, coord: Coord) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        let head = inner.state.head();
        let color = match inner.state.node(head).color {
            Some(Color::Black) => Color::White,
            _ => Color::Black,
        };
        inner.state.push_head(Some(coord), color)?;
        let frame = dispatch::full_frame(&inner.state);
        inner.last_event_time = now_ms();
        drop(inner);
        let value = serde_json::to_value(frame).unwrap_or(Value::Null);
        self.publish("add_stone", "", value);
        Ok(())
    }

    /// Replays a `review/{id}/r` frame's move string on top of the current
    /// tree, then restores the cursor to wherever it was before the replay,
    /// broadcasting a FULL frame.
    pub async fn bridge_apply_review(&self, m: &str) -> Result<(), EngineError> {
        let tokens = bridge::decode_review_moves(m)?;
        let mut inner = self.inner.lock().await;
        let cursor = inner.state.current();
        bridge::apply_review_tokens(&mut inner.state, &tokens);
        inner.state.restore_cursor(cursor);
        let frame = dispatch::full_frame(&inner.state);
        inner.last_event_time = now_ms();
        drop(inner);
        let value = serde_json::to_value(frame).unwrap_or(Value::Null);
        self.publish("review", "", value);
        Ok(())
    }

    async fn seconds_since_last_event(&self) -> (i64, f64) {
        let inner = self.inner.lock().await;
        (now_ms() - inner.last_event_time, inner.state.timeout)
    }
}

/// `update_settings`'s `{ buffer, size, password }` payload, per spec.md
/// §4.6's Settings shape. A changed `size` trashes the room (a board size
/// change makes the existing tree meaningless); an empty password clears
/// protection.
fn apply_settings(inner: &mut RoomInner, hasher: &dyn PasswordHasher, value: &Value) {
    let Some(obj) = value.as_object() else { return };

    if let Some(buffer) = obj.get("buffer").and_then(Value::as_i64) {
        inner.state.input_buffer = buffer;
    }

    if let Some(size) = obj.get("size").and_then(Value::as_u64).map(|n| n as usize) {
        if size != inner.state.size() {
            let buffer = inner.state.input_buffer;
            inner.terminate_bridge();
            inner.state = State::new(size);
            inner.state.input_buffer = buffer;
        }
    }

    if let Some(password) = obj.get("password").and_then(Value::as_str) {
        inner.password_hash = if password.is_empty() { None } else { Some(hasher.hash(password)) };
    }
}

/// The process-wide table of live rooms plus their persistence directory.
pub struct Server {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    persist_dir: PathBuf,
    collabs: Arc<Collaborators>,
    /// A pending global announcement (message, expiry in unix ms), per
    /// spec.md §4.6 step 5 / §6's "Global-announcement file". Polling the
    /// filesystem for new announcements is a bootstrap concern (spec.md
    /// §1); the core only needs somewhere to hold the current one and
    /// answer whether it is still live.
    announcement: RwLock<Option<(String, i64)>>,
}

impl Server {
    pub fn new(persist_dir: PathBuf, collabs: Arc<Collaborators>) -> Arc<Server> {
        Arc::new(Server { rooms: RwLock::new(HashMap::new()), persist_dir, collabs, announcement: RwLock::new(None) })
    }

    /// Installs a new global announcement, live for `ttl_secs` seconds.
    pub async fn set_announcement(&self, message: String, ttl_secs: i64) {
        let expires_at = now_ms() + ttl_secs * 1000;
        *self.announcement.write().await = Some((message, expires_at));
    }

    /// The current announcement's text, if one is installed and unexpired.
    pub async fn current_announcement(&self) -> Option<String> {
        let guard = self.announcement.read().await;
        match &*guard {
            Some((message, expires_at)) if now_ms() < *expires_at => Some(message.clone()),
            _ => None,
        }
    }

    pub fn collaborators(&self) -> &Arc<Collaborators> {
        &self.collabs
    }

    pub async fn room(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Returns the room for `room_id`, creating (and spawning a heartbeat
    /// for) it if absent.
    pub async fn get_or_create_room(self: &Arc<Self>, room_id: &str) -> Arc<Room> {
        if let Some(room) = self.room(room_id).await {
            return room;
        }
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(room_id) {
            return room.clone();
        }
        let room = Room::new(room_id.to_string(), DEFAULT_SIZE);
        rooms.insert(room_id.to_string(), room.clone());
        drop(rooms);
        self.spawn_heartbeat(room.clone());
        room
    }

    fn spawn_heartbeat(self: &Arc<Self>, room: Arc<Room>) {
        let server = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_secs(HEARTBEAT_INTERVAL_SECS)).await;
                let (idle_ms, timeout_secs) = room.seconds_since_last_event().await;
                if idle_ms as f64 > timeout_secs * 1000.0 {
                    server.rooms.write().await.remove(&room.id);
                    let _ = persist::remove_room_file(&server.persist_dir, &room.id);
                    break;
                }
            }
        });
    }

    /// Persists every live room — called on graceful shutdown.
    pub async fn save_all(&self) -> Result<(), EngineError> {
        let rooms = self.rooms.read().await;
        for (id, room) in rooms.iter() {
            let inner = room.inner.lock().await;
            persist::save_room(&self.persist_dir, id, &inner.state, inner.password_hash.as_deref().unwrap_or(""))?;
        }
        Ok(())
    }

    /// Rebuilds every persisted room on boot and respawns its heartbeat.
    pub async fn load_all(self: &Arc<Self>) -> Result<(), EngineError> {
        for room_id in persist::list_room_ids(&self.persist_dir)? {
            let (state, password) = persist::load_room(&self.persist_dir, &room_id)?;
            let password_hash = if password.is_empty() { None } else { Some(password) };
            let room = Room::from_state(room_id.clone(), state, password_hash);
            self.rooms.write().await.insert(room_id, room.clone());
            self.spawn_heartbeat(room);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PlaintextHasher;
    impl PasswordHasher for PlaintextHasher {
        fn hash(&self, plain: &str) -> String {
            format!("hashed:{plain}")
        }
        fn verify(&self, plain: &str, hash: &str) -> bool {
            self.hash(plain) == hash
        }
    }

    struct NeverEnded;
    impl bridge::GameEndedProbe for NeverEnded {
        fn ended<'a>(&'a self, _game_id: &'a str) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + 'a>> {
            Box::pin(async { false })
        }
    }

    struct NoFetch;
    impl bridge::SgfFetcher for NoFetch {
        fn fetch<'a>(
            &'a self,
            _url: &'a str,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<String, EngineError>> + Send + 'a>> {
            Box::pin(async { Err(EngineError::Fetch("fetch disabled in tests".to_string())) })
        }
    }

    struct NoLookup;
    impl bridge::PlayerLookup for NoLookup {
        fn username<'a>(
            &'a self,
            _player_id: &'a str,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Option<String>> + Send + 'a>> {
            Box::pin(async { None })
        }
    }

    struct NoDial;
    impl bridge::UpstreamDialer for NoDial {
        fn dial<'a>(
            &'a self,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Box<dyn bridge::AsyncReadWrite>, EngineError>> + Send + 'a>>
        {
            Box::pin(async { Err(EngineError::Upstream("dial disabled in tests".to_string())) })
        }
    }

    fn test_collaborators() -> Arc<Collaborators> {
        Arc::new(Collaborators {
            hasher: Arc::new(PlaintextHasher),
            ended_probe: Arc::new(NeverEnded),
            fetcher: Arc::new(NoFetch),
            player_lookup: Arc::new(NoLookup),
            dialer: Arc::new(NoDial),
            player_id: String::new(),
            username: String::new(),
            auth: String::new(),
        })
    }

    #[test]
    fn parse_url_splits_prefix_room_and_op() {
        let parsed = parse_url("/review/abc123/sgf").unwrap();
        assert_eq!(parsed.prefix, "review");
        assert_eq!(parsed.room_id, "abc123");
        assert_eq!(parsed.op.as_deref(), Some("sgf"));
    }

    #[test]
    fn parse_url_without_op_is_none() {
        let parsed = parse_url("/review/abc123").unwrap();
        assert_eq!(parsed.op, None);
    }

    #[test]
    fn parse_url_rejects_missing_room_id() {
        assert!(parse_url("/review").is_err());
    }

    #[tokio::test]
    async fn join_and_leave_update_user_list() {
        let room = Room::new("r1".to_string(), 9);
        let mut rx = room.subscribe();
        room.join(1).await;
        let msg = rx.recv().await.unwrap();
        assert!(msg.contains("user_list"));
        room.leave(1).await;
        let msg = rx.recv().await.unwrap();
        assert!(msg.contains("user_list"));
    }

    #[tokio::test]
    async fn add_stone_broadcasts_a_frame() {
        let room = Room::new("r1".to_string(), 9);
        let collabs = test_collaborators();
        let mut rx = room.subscribe();
        let ev = Event { event: "add_stone".to_string(), value: serde_json::json!([3, 3]), color: 1, userid: "u1".to_string() };
        room.handle_event(&collabs, 1, ev).await;
        let msg = rx.recv().await.unwrap();
        assert!(msg.contains("add_stone"));
    }

    #[tokio::test]
    async fn password_gate_drops_events_until_authed() {
        let room = Room::new("r1".to_string(), 9);
        let collabs = test_collaborators();
        apply_settings(
            &mut *room.inner.lock().await,
            collabs.hasher.as_ref(),
            &serde_json::json!({"password": "secret"}),
        );
        assert!(room.is_protected().await);

        let mut rx = room.subscribe();
        let ev = Event { event: "add_stone".to_string(), value: serde_json::json!([3, 3]), color: 1, userid: "u1".to_string() };
        room.handle_event(&collabs, 1, ev).await;
        assert!(rx.try_recv().is_err(), "event must be dropped before authentication");

        let check = Event { event: "checkpassword".to_string(), value: serde_json::json!("secret"), color: 0, userid: "u1".to_string() };
        room.handle_event(&collabs, 1, check).await;
        let msg = rx.recv().await.unwrap();
        assert!(msg.contains("checkpassword"));

        let ev = Event { event: "add_stone".to_string(), value: serde_json::json!([3, 3]), color: 1, userid: "u1".to_string() };
        room.handle_event(&collabs, 1, ev).await;
        let msg = rx.recv().await.unwrap();
        assert!(msg.contains("add_stone"));
    }

    #[tokio::test]
    async fn bridge_import_move_alternates_colors_from_black() {
        let room = Room::new("r1".to_string(), 9);
        let mut rx = room.subscribe();
        room.bridge_import_move(Coord::new(3, 3)).await.unwrap();
        let msg = rx.recv().await.unwrap();
        assert!(msg.contains("add_stone"));
        room.bridge_import_move(Coord::new(15, 15)).await.unwrap();
        let msg = rx.recv().await.unwrap();
        assert!(msg.contains("add_stone"));
    }

    #[tokio::test]
    async fn bridge_replace_from_sgf_broadcasts_gamedata() {
        let room = Room::new("r1".to_string(), 9);
        let mut rx = room.subscribe();
        room.bridge_replace_from_sgf("(;GM[1]FF[4]SZ[9];B[ee])").await;
        let msg = rx.recv().await.unwrap();
        assert!(msg.contains("gamedata"));
    }
}
