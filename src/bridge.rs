//! Upstream live-game bridge (C7): relays moves from an external live-game
//! service into a room as they occur.
//!
//! Grounded in `original_source/backend/ogs.go` (`OGSConnector`, `ReadFrame`,
//! `GameLoop`) for the connect handshake and the bracket-depth framer, and
//! `original_source/backend/fetch.go` (`ApprovedFetch`) for the allow-listed
//! host predicate. The actual socket dial (TLS, the upstream's WebSocket
//! handshake) is an external bootstrap concern per spec.md §1 — this module
//! only needs *a* bidirectional byte stream, supplied by the caller through
//! [`UpstreamDialer`], the same seam `room::PasswordHasher` uses for
//! password hashing. That keeps the framer, the dispatch table, and the
//! allow-list predicate unit-testable without a real socket.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::board::{Color, Coord};
use crate::error::EngineError;
use crate::room::Room;
use crate::sgf::escape;

const PING_INTERVAL_SECS: u64 = 25;
const READ_CHUNK: usize = 4096;

/// Every host `request_sgf` is allowed to fetch or bridge against, per
/// spec.md §4.7 / `ApprovedFetch`'s `okList`.
const ALLOWED_HOSTS: [&str; 7] = [
    "files.gokgs.com",
    "ayd.yunguseng.com",
    "eyd.yunguseng.com",
    "online-go.com",
    "gokifu.com",
    "board.tripleko.com",
    "board-test.tripleko.com",
];

/// True if `url`'s host is on the allow-list. A pure predicate; the actual
/// HTTP client stays external (spec.md §1).
pub fn is_allowed_host(url: &str) -> bool {
    reqwest::Url::parse(url).ok().and_then(|u| u.host_str().map(|h| h.to_string())).is_some_and(|h| ALLOWED_HOSTS.contains(&h.as_str()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectKind {
    Game,
    Review,
}

pub struct GameRef {
    pub kind: ConnectKind,
    pub id: String,
}

/// Picks a game/review id out of an upstream URL, e.g.
/// `https://online-go.com/game/12345` or `.../review/67890`. Returns `None`
/// for any URL that isn't a recognized upstream game/review link, in which
/// case `request_sgf` falls back to a plain allow-listed fetch.
pub fn parse_game_reference(url: &str) -> Option<GameRef> {
    let parsed = reqwest::Url::parse(url).ok()?;
    if parsed.host_str() != Some("online-go.com") {
        return None;
    }
    let mut segments = parsed.path_segments()?;
    while let Some(segment) = segments.next() {
        match segment {
            "game" => return segments.next().map(|id| GameRef { kind: ConnectKind::Game, id: id.to_string() }),
            "review" => return segments.next().map(|id| GameRef { kind: ConnectKind::Review, id: id.to_string() }),
            _ => continue,
        }
    }
    None
}

/// Any stream the bridge can speak its framed-JSON protocol over. The
/// concrete type (a TLS WebSocket to the upstream service) is supplied by
/// [`UpstreamDialer`]; tests use an in-memory duplex.
pub trait AsyncReadWrite: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncReadWrite for T {}

/// Dials a fresh connection to the upstream live-game service. A real
/// implementation opens the TLS WebSocket named in spec.md §4.7; tests
/// supply an in-memory duplex instead.
pub trait UpstreamDialer: Send + Sync {
    fn dial<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<Box<dyn AsyncReadWrite>, EngineError>> + Send + 'a>>;
}

/// Answers whether a game has already ended, consulted by `request_sgf`
/// before spawning a bridge (spec.md §4.6's "request_sgf" row).
pub trait GameEndedProbe: Send + Sync {
    fn ended<'a>(&'a self, game_id: &'a str) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}

/// The allow-listed HTTP client `request_sgf` falls back to when it isn't
/// importing a live bridged game.
pub trait SgfFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> Pin<Box<dyn Future<Output = Result<String, EngineError>> + Send + 'a>>;
}

/// Resolves an upstream player id to a display name, for `gamedata` SGF
/// synthesis.
pub trait PlayerLookup: Send + Sync {
    fn username<'a>(&'a self, player_id: &'a str) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub player_id: String,
    pub username: String,
    pub auth: String,
    pub game_id: String,
    pub kind: ConnectKind,
}

/// Finds the byte range of one complete outer JSON-array frame in `buf`,
/// per spec.md §4.7: depth starts at zero, the first non-whitespace byte
/// must be `[`, depth increments on every `[` and decrements on every `]`,
/// and the frame is complete once depth returns to zero. Returns `Ok(None)`
/// if `buf` doesn't yet hold a complete frame (the caller should read more).
pub fn extract_frame(buf: &[u8]) -> Result<Option<(Vec<u8>, usize)>, EngineError> {
    let mut i = 0;
    while i < buf.len() && buf[i].is_ascii_whitespace() {
        i += 1;
    }
    if i == buf.len() {
        return Ok(None);
    }
    if buf[i] != b'[' {
        return Err(EngineError::Upstream(format!("bridge frame must start with '[', got {:?}", buf[i] as char)));
    }

    let start = i;
    let mut depth: i32 = 0;
    let mut j = i;
    while j < buf.len() {
        match buf[j] {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(Some((buf[start..=j].to_vec(), j + 1)));
                }
            }
            _ => {}
        }
        j += 1;
    }
    Ok(None)
}

/// Buffers bytes off an `AsyncRead` and yields one frame at a time via
/// [`extract_frame`].
struct FrameReader<R> {
    stream: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    fn new(stream: R) -> Self {
        FrameReader { stream, buf: Vec::new() }
    }

    async fn next_frame(&mut self) -> Result<Vec<u8>, EngineError> {
        loop {
            if let Some((frame, consumed)) = extract_frame(&self.buf)? {
                self.buf.drain(0..consumed);
                return Ok(frame);
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = self
                .stream
                .read(&mut chunk)
                .await
                .map_err(|e| EngineError::Upstream(format!("bridge stream read failed: {e}")))?;
            if n == 0 {
                return Err(EngineError::Upstream("bridge stream closed".to_string()));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Sends one `[topic, payload]` frame, unframed (no length prefix — the
/// upstream protocol is the bracket-depth scheme itself, not spec.md §6's
/// client-facing length prefix).
async fn send_topic<W: AsyncWrite + Unpin>(stream: &mut W, topic: &str, payload: Value) -> Result<(), EngineError> {
    let frame = serde_json::json!([topic, payload]);
    let bytes = serde_json::to_vec(&frame).map_err(|e| EngineError::Upstream(format!("frame serialize failed: {e}")))?;
    stream.write_all(&bytes).await.map_err(|e| EngineError::Upstream(format!("bridge write failed: {e}")))
}

/// Handle to a running bridge's background tasks. `end()` (or `Drop`) flips
/// the shared exit flag and aborts both tasks, per spec.md §4.7's "Exit".
pub struct BridgeHandle {
    exit: Arc<AtomicBool>,
    ping: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl BridgeHandle {
    pub fn end(&self) {
        self.exit.store(true, Ordering::SeqCst);
        self.ping.abort();
        self.reader.abort();
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.exit.store(true, Ordering::SeqCst);
    }
}

/// Opens the bridge: sends the `chat/connect` + `game/connect`/
/// `review/connect` handshake, then spawns the ping loop and the read/
/// dispatch loop, per spec.md §4.7.
pub fn spawn(
    stream: Box<dyn AsyncReadWrite>,
    config: BridgeConfig,
    room: Arc<Room>,
    player_lookup: Arc<dyn PlayerLookup>,
) -> BridgeHandle {
    let (read_half, write_half) = tokio::io::split(stream);
    let write_half = Arc::new(Mutex::new(write_half));
    let exit = Arc::new(AtomicBool::new(false));

    {
        let write_half = write_half.clone();
        let config = config.clone();
        tokio::spawn(async move {
            let mut w = write_half.lock().await;
            let _ = send_topic(
                &mut *w,
                "chat/connect",
                serde_json::json!({"player_id": config.player_id, "username": config.username, "auth": config.auth}),
            )
            .await;
            let connect_topic = match config.kind {
                ConnectKind::Game => "game/connect",
                ConnectKind::Review => "review/connect",
            };
            let _ = send_topic(
                &mut *w,
                connect_topic,
                serde_json::json!({"player_id": config.player_id, "chat": false, "game_id": config.game_id}),
            )
            .await;
        });
    }

    let ping = {
        let write_half = write_half.clone();
        let exit = exit.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_secs(PING_INTERVAL_SECS)).await;
                if exit.load(Ordering::SeqCst) {
                    break;
                }
                let mut w = write_half.lock().await;
                let now = chrono::Utc::now().timestamp_millis();
                if send_topic(&mut *w, "net/ping", serde_json::json!({"client": now})).await.is_err() {
                    break;
                }
            }
        })
    };

    let reader = {
        let exit = exit.clone();
        let game_id = config.game_id.clone();
        tokio::spawn(async move {
            let mut framer = FrameReader::new(read_half);
            loop {
                if exit.load(Ordering::SeqCst) {
                    break;
                }
                let frame = match framer.next_frame().await {
                    Ok(f) => f,
                    Err(e) => {
                        log::warn!("bridge stream ended: {e}");
                        break;
                    }
                };
                match dispatch_frame(&frame, &game_id, &room, player_lookup.as_ref()).await {
                    Ok(true) => {
                        exit.store(true, Ordering::SeqCst);
                        break;
                    }
                    Ok(false) => {}
                    Err(e) => log::warn!("bridge frame rejected: {e}"),
                }
            }
        })
    };

    BridgeHandle { exit, ping, reader }
}

/// Dispatches one decoded `[topic, payload]` frame per spec.md §4.7's
/// topic table. Returns `Ok(true)` when the bridge should exit (a
/// `gamedata` frame carrying a `winner`).
async fn dispatch_frame(
    frame: &[u8],
    game_id: &str,
    room: &Arc<Room>,
    player_lookup: &dyn PlayerLookup,
) -> Result<bool, EngineError> {
    let value: Value =
        serde_json::from_slice(frame).map_err(|e| EngineError::Upstream(format!("malformed bridge frame JSON: {e}")))?;
    let arr = value.as_array().ok_or_else(|| EngineError::Upstream("bridge frame must be a 2-element array".to_string()))?;
    if arr.len() != 2 {
        return Err(EngineError::Upstream(format!("bridge frame must have 2 elements, got {}", arr.len())));
    }
    let topic = arr[0].as_str().ok_or_else(|| EngineError::Upstream("bridge frame topic must be a string".to_string()))?;
    let payload = &arr[1];

    if topic == format!("game/{game_id}/move") {
        let mv = payload
            .get("move")
            .and_then(Value::as_array)
            .ok_or_else(|| EngineError::Upstream("move frame missing move array".to_string()))?;
        if mv.len() < 2 {
            return Err(EngineError::Upstream(format!("move array too short: {}", mv.len())));
        }
        let x = mv[0].as_f64().ok_or_else(|| EngineError::Upstream("move x not a number".to_string()))? as u16;
        let y = mv[1].as_f64().ok_or_else(|| EngineError::Upstream("move y not a number".to_string()))? as u16;
        room.bridge_import_move(Coord::new(x, y)).await?;
        Ok(false)
    } else if topic == format!("game/{game_id}/gamedata") {
        if payload.get("winner").is_some_and(|w| !w.is_null()) {
            return Ok(true);
        }
        let sgf = synthesize_sgf(payload, player_lookup).await?;
        room.bridge_replace_from_sgf(&sgf).await;
        Ok(false)
    } else if topic == format!("review/{game_id}/r") {
        let m = payload.get("m").and_then(Value::as_str).unwrap_or("");
        room.bridge_apply_review(m).await?;
        Ok(false)
    } else {
        Ok(false)
    }
}

/// One token of a `review/{id}/r` frame's `m` field's color-forcing
/// mini-language (spec.md §9): `..` is a pass at the current color (then
/// flip), `!1`/`!2` force the current color without emitting a node, and
/// anything else is a two-letter coordinate played at the current color
/// (then flip).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewToken {
    Pass,
    Force(Color),
    Move(Coord),
}

/// Splits a `review/{id}/r` frame's `m` field into two-character tokens.
pub fn decode_review_moves(m: &str) -> Result<Vec<ReviewToken>, EngineError> {
    let chars: Vec<char> = m.chars().collect();
    if chars.len() % 2 != 0 {
        return Err(EngineError::Upstream(format!("review move string has odd length {}", chars.len())));
    }
    chars
        .chunks(2)
        .map(|pair| {
            let token: String = pair.iter().collect();
            Ok(match token.as_str() {
                ".." => ReviewToken::Pass,
                "!1" => ReviewToken::Force(Color::Black),
                "!2" => ReviewToken::Force(Color::White),
                other => ReviewToken::Move(
                    other.parse::<Coord>().map_err(|e| EngineError::Upstream(format!("bad review coord {other:?}: {e}")))?,
                ),
            })
        })
        .collect()
}

/// Applies a decoded token stream to `state` via `add_move`/`add_pass`,
/// which already reuse an existing identical child rather than branching
/// again (spec.md §4.3) — exactly the "reusing existing children" behavior
/// spec.md §4.7 asks for.
pub(crate) fn apply_review_tokens(state: &mut crate::tree::state::State, tokens: &[ReviewToken]) {
    let mut color = Color::Black;
    for token in tokens {
        match token {
            ReviewToken::Force(c) => color = *c,
            ReviewToken::Pass => {
                state.add_pass(color);
                color = color.opposite();
            }
            ReviewToken::Move(coord) => {
                state.add_move(*coord, color);
                color = color.opposite();
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct GameData {
    #[serde(default)]
    width: Option<u8>,
    #[serde(default)]
    height: Option<u8>,
    #[serde(default)]
    komi: Option<f64>,
    #[serde(default)]
    rules: Option<String>,
    #[serde(default)]
    initial_player: Option<String>,
    #[serde(default)]
    moves: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    players: Option<Players>,
}

#[derive(Debug, Deserialize)]
struct Players {
    black: Option<PlayerRef>,
    white: Option<PlayerRef>,
}

#[derive(Debug, Deserialize)]
struct PlayerRef {
    id: Option<Value>,
    username: Option<String>,
}

async fn resolve_name(player: Option<&PlayerRef>, lookup: &dyn PlayerLookup) -> Option<String> {
    let player = player?;
    if let Some(name) = &player.username {
        return Some(name.clone());
    }
    let id = match player.id.as_ref()? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    lookup.username(&id).await
}

/// Synthesizes an SGF blob from a `gamedata` payload: size, komi, rules,
/// player names (resolved by `lookup`), and the move list alternating from
/// `initial_player`, per spec.md §4.7.
pub(crate) async fn synthesize_sgf(payload: &Value, lookup: &dyn PlayerLookup) -> Result<String, EngineError> {
    let data: GameData =
        serde_json::from_value(payload.clone()).map_err(|e| EngineError::Upstream(format!("malformed gamedata payload: {e}")))?;

    let size = data.width.or(data.height).unwrap_or(19);
    let komi = data.komi.unwrap_or(0.0);
    let black_name = resolve_name(data.players.as_ref().and_then(|p| p.black.as_ref()), lookup).await;
    let white_name = resolve_name(data.players.as_ref().and_then(|p| p.white.as_ref()), lookup).await;
    let mut color = match data.initial_player.as_deref() {
        Some("white") => Color::White,
        _ => Color::Black,
    };

    let mut out = String::from("(;");
    out.push_str(&format!("GM[1]FF[4]SZ[{size}]KM[{komi}]"));
    if let Some(rules) = &data.rules {
        out.push_str(&format!("RU[{}]", escape(rules)));
    }
    if let Some(name) = &black_name {
        out.push_str(&format!("PB[{}]", escape(name)));
    }
    if let Some(name) = &white_name {
        out.push_str(&format!("PW[{}]", escape(name)));
    }

    for mv in data.moves.unwrap_or_default() {
        let key = if color == Color::Black { "B" } else { "W" };
        color = color.opposite();
        if mv.len() >= 2 && mv[0] >= 0.0 && mv[1] >= 0.0 {
            let coord = Coord::new(mv[0] as u16, mv[1] as u16);
            out.push_str(&format!(";{key}[{coord}]"));
        } else {
            out.push_str(&format!(";{key}[]"));
        }
    }
    out.push(')');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_allowed_host_accepts_listed_hosts() {
        assert!(is_allowed_host("https://online-go.com/game/123"));
        assert!(is_allowed_host("https://files.gokgs.com/sgf/abc"));
    }

    #[test]
    fn is_allowed_host_rejects_unlisted_host() {
        assert!(!is_allowed_host("https://evil.example.com/sgf"));
    }

    #[test]
    fn parse_game_reference_extracts_game_id() {
        let r = parse_game_reference("https://online-go.com/game/555").unwrap();
        assert_eq!(r.kind, ConnectKind::Game);
        assert_eq!(r.id, "555");
    }

    #[test]
    fn parse_game_reference_extracts_review_id() {
        let r = parse_game_reference("https://online-go.com/review/999").unwrap();
        assert_eq!(r.kind, ConnectKind::Review);
        assert_eq!(r.id, "999");
    }

    #[test]
    fn parse_game_reference_none_for_other_hosts() {
        assert!(parse_game_reference("https://files.gokgs.com/sgf/abc").is_none());
    }

    #[test]
    fn extract_frame_waits_for_a_complete_bracket() {
        let partial = b"[\"game/1/move\", {\"move\"";
        assert!(extract_frame(partial).unwrap().is_none());
    }

    #[test]
    fn extract_frame_returns_one_complete_array() {
        let input = b"[1, [2, 3]] trailing";
        let (frame, consumed) = extract_frame(input).unwrap().unwrap();
        assert_eq!(frame, b"[1, [2, 3]]");
        assert_eq!(consumed, 11);
    }

    #[test]
    fn extract_frame_skips_leading_whitespace() {
        let input = b"   [1]";
        let (frame, _) = extract_frame(input).unwrap().unwrap();
        assert_eq!(frame, b"[1]");
    }

    #[test]
    fn extract_frame_rejects_non_bracket_start() {
        assert!(extract_frame(b"not json").is_err());
    }

    #[test]
    fn decode_review_moves_splits_pass_force_and_coord_tokens() {
        let tokens = decode_review_moves("!1aa..!2bb").unwrap();
        assert_eq!(
            tokens,
            vec![
                ReviewToken::Force(Color::Black),
                ReviewToken::Move(Coord::new(0, 0)),
                ReviewToken::Pass,
                ReviewToken::Force(Color::White),
                ReviewToken::Move(Coord::new(1, 1)),
            ]
        );
    }

    #[test]
    fn decode_review_moves_rejects_odd_length() {
        assert!(decode_review_moves("aab").is_err());
    }

    #[tokio::test]
    async fn frame_reader_yields_frames_one_at_a_time() {
        let data = b"[1,2][3,[4]]".to_vec();
        let mut framer = FrameReader::new(std::io::Cursor::new(data));
        let first = framer.next_frame().await.unwrap();
        assert_eq!(first, b"[1,2]");
        let second = framer.next_frame().await.unwrap();
        assert_eq!(second, b"[3,[4]]");
    }

    struct NoLookup;
    impl PlayerLookup for NoLookup {
        fn username<'a>(&'a self, _player_id: &'a str) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
            Box::pin(async { None })
        }
    }

    #[tokio::test]
    async fn synthesize_sgf_alternates_colors_from_initial_player() {
        let payload = serde_json::json!({
            "width": 9,
            "komi": 6.5,
            "initial_player": "white",
            "moves": [[3.0, 3.0], [4.0, 4.0]],
        });
        let sgf = synthesize_sgf(&payload, &NoLookup).await.unwrap();
        assert!(sgf.contains("SZ[9]"));
        assert!(sgf.contains("KM[6.5]"));
        assert!(sgf.contains(";W[dd]"));
        assert!(sgf.contains(";B[ee]"));
    }
}
