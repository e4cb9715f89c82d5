//! Bootstrap binary: wires the engine crate's `room::Server` to a raw TCP
//! listener, supplies the external collaborators `room::Collaborators`
//! leaves as seams (password hashing, the upstream dialer, SGF fetch,
//! player-name lookup, game-ended probe), polls for global announcements,
//! and persists every room on graceful shutdown.
//!
//! Grounded in `original_source/backend/main.go`'s `main()`: `Setup()` /
//! `Load()` on boot, an accept loop per connection, and a signal handler
//! that calls `Save()` before exiting. The HTTP/WebSocket upgrade that
//! carries the request URL in the Go original has no counterpart crate in
//! this stack (no `http`/`websocket` dependency), so each connection here
//! sends its URL as one length-prefixed frame before the framed JSON event
//! stream begins, reusing `kibitz::framing`'s own convention. See
//! `DESIGN.md` for the full rationale.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::future::Future;
use std::time::Duration;

use clap::Parser;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use kibitz::bridge::{self, AsyncReadWrite, GameEndedProbe, PlayerLookup, SgfFetcher, UpstreamDialer};
use kibitz::error::EngineError;
use kibitz::framing::{read_frame, read_json_frame, write_frame};
use kibitz::room::{self, Collaborators, PasswordHasher, Server};
use kibitz::Event;

#[derive(Parser, Debug)]
#[command(name = "kibitzd", about = "Real-time collaborative Go review server")]
struct Args {
    /// Address to listen for client connections on.
    #[arg(long, default_value = "0.0.0.0:9001")]
    listen: String,

    /// Directory room snapshots are persisted to and restored from.
    #[arg(long, default_value = "./rooms")]
    persist_dir: PathBuf,

    /// Directory polled every 5s for a one-shot `{message, ttl}` global
    /// announcement file; consumed and deleted once read.
    #[arg(long, default_value = "./announce")]
    announce_dir: PathBuf,

    /// Upstream live-game service address the bridge dials.
    #[arg(long, default_value = "online-go.com:80")]
    upstream_addr: String,

    /// This server's upstream player id, sent in the bridge's `connect`
    /// handshake.
    #[arg(long, default_value = "")]
    player_id: String,

    /// This server's upstream username, sent in the bridge's `connect`
    /// handshake.
    #[arg(long, default_value = "")]
    username: String,

    /// This server's upstream auth token, sent in the bridge's `connect`
    /// handshake.
    #[arg(long, default_value = "")]
    auth: String,
}

/// Non-cryptographic placeholder (spec.md §1 scopes "password hashing
/// primitives" out of this crate). A real deployment would inject a proper
/// KDF (argon2, bcrypt, ...) through the same `PasswordHasher` seam.
struct DefaultHasherPasswordHasher;

impl PasswordHasher for DefaultHasherPasswordHasher {
    fn hash(&self, plain: &str) -> String {
        let mut hasher = DefaultHasher::new();
        plain.hash(&mut hasher);
        format!("{:x}", hasher.finish())
    }

    fn verify(&self, plain: &str, hash: &str) -> bool {
        self.hash(plain) == hash
    }
}

/// Dials the upstream live-game service over a plain TCP socket. TLS
/// termination is left to whatever sits in front of this process (spec.md
/// §1's "TLS/HTTP listener configuration" non-goal).
struct TcpDialer {
    addr: String,
}

impl UpstreamDialer for TcpDialer {
    fn dial<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<Box<dyn AsyncReadWrite>, EngineError>> + Send + 'a>> {
        Box::pin(async move {
            let stream = TcpStream::connect(&self.addr)
                .await
                .map_err(|e| EngineError::Upstream(format!("dial {} failed: {e}", self.addr)))?;
            Ok(Box::new(stream) as Box<dyn AsyncReadWrite>)
        })
    }
}

/// No upstream channel to ask whether a game has ended without a live
/// session to it; always reports live. A deployment with a real upstream
/// API client would answer this from the game's status field.
struct NeverEndedProbe;

impl GameEndedProbe for NeverEndedProbe {
    fn ended<'a>(&'a self, _game_id: &'a str) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move { false })
    }
}

/// Fetches an SGF from an allow-listed host over HTTPS.
struct HttpFetcher {
    client: reqwest::Client,
}

impl SgfFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> Pin<Box<dyn Future<Output = Result<String, EngineError>> + Send + 'a>> {
        Box::pin(async move {
            if !bridge::is_allowed_host(url) {
                return Err(EngineError::Fetch(format!("host not allow-listed: {url}")));
            }
            let resp = self.client.get(url).send().await.map_err(|e| EngineError::Fetch(e.to_string()))?;
            resp.text().await.map_err(|e| EngineError::Fetch(e.to_string()))
        })
    }
}

/// Looks up a display name for an upstream player id via the public
/// player-info endpoint.
struct HttpPlayerLookup {
    client: reqwest::Client,
}

impl PlayerLookup for HttpPlayerLookup {
    fn username<'a>(&'a self, player_id: &'a str) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("https://online-go.com/api/v1/players/{player_id}");
            let resp = self.client.get(&url).send().await.ok()?;
            let value: serde_json::Value = resp.json().await.ok()?;
            value.get("username").and_then(|v| v.as_str()).map(str::to_string)
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let client = reqwest::Client::new();
    let collabs = Arc::new(Collaborators {
        hasher: Arc::new(DefaultHasherPasswordHasher),
        ended_probe: Arc::new(NeverEndedProbe),
        fetcher: Arc::new(HttpFetcher { client: client.clone() }),
        player_lookup: Arc::new(HttpPlayerLookup { client }),
        dialer: Arc::new(TcpDialer { addr: args.upstream_addr.clone() }),
        player_id: args.player_id.clone(),
        username: args.username.clone(),
        auth: args.auth.clone(),
    });

    std::fs::create_dir_all(&args.persist_dir)?;
    let server = Server::new(args.persist_dir.clone(), collabs);
    server.load_all().await?;
    log::info!("restored persisted rooms from {}", args.persist_dir.display());

    let listener = TcpListener::bind(&args.listen).await?;
    log::info!("listening on {}", args.listen);

    spawn_announcement_poller(server.clone(), args.announce_dir.clone());

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let server = server.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, server).await {
                        log::warn!("connection from {peer} ended: {e}");
                    }
                });
            }
            _ = shutdown_signal() => {
                log::info!("shutting down, persisting rooms");
                server.save_all().await?;
                return Ok(());
            }
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Polls `dir` every 5s for a single `{message, ttl}` announcement file
/// (spec.md §5's message-loop task), installing and then deleting it.
fn spawn_announcement_poller(server: Arc<Server>, dir: PathBuf) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(5)).await;
            let Ok(mut entries) = tokio::fs::read_dir(&dir).await else { continue };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                let Ok(bytes) = tokio::fs::read(&path).await else { continue };
                #[derive(serde::Deserialize)]
                struct Announcement {
                    message: String,
                    ttl: i64,
                }
                if let Ok(ann) = serde_json::from_slice::<Announcement>(&bytes) {
                    server.set_announcement(ann.message, ann.ttl).await;
                    let _ = tokio::fs::remove_file(&path).await;
                }
            }
        }
    });
}

/// One client connection's full lifecycle, per spec.md §4.6: read the URL
/// frame, answer terminal export ops directly, or join the room and pump
/// events both ways until disconnect.
async fn handle_connection(mut stream: TcpStream, server: Arc<Server>) -> Result<(), EngineError> {
    let url_bytes = read_frame(&mut stream).await?;
    let url = String::from_utf8(url_bytes).map_err(|e| EngineError::Input(format!("URL frame is not UTF-8: {e}")))?;
    let parsed = room::parse_url(&url)?;

    if let Some(op) = parsed.op.as_deref() {
        if matches!(op, "sgf" | "sgfix" | "debug") {
            let room = server.get_or_create_room(&parsed.room_id).await;
            let payload = room.export(op).await;
            use base64::Engine as _;
            let encoded = base64::engine::general_purpose::STANDARD.encode(payload);
            write_frame(&mut stream, encoded.as_bytes()).await?;
            return Ok(());
        }
    }

    let existed = server.room(&parsed.room_id).await.is_some();
    let room = server.get_or_create_room(&parsed.room_id).await;
    let conn_id = room::next_conn_id();

    if existed {
        let handshake = room.handshake().await;
        write_frame(&mut stream, handshake.as_bytes()).await?;
    }
    if let Some(message) = server.current_announcement().await {
        let frame = serde_json::json!({"event": "announce", "value": message, "userid": ""});
        write_frame(&mut stream, serde_json::to_string(&frame).unwrap_or_default().as_bytes()).await?;
    }

    room.join(conn_id).await;
    let mut rx = room.subscribe();
    let (mut read_half, mut write_half) = stream.into_split();

    let forwarder = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    if write_frame(&mut write_half, msg.as_bytes()).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
        let _ = write_half.shutdown().await;
    });

    let collabs = server.collaborators().clone();
    loop {
        let mut ev: Event = match read_json_frame(&mut read_half).await {
            Ok(ev) => ev,
            Err(_) => break,
        };
        ev.userid = conn_id.to_string();
        room.handle_event(&collabs, conn_id, ev).await;
    }

    room.leave(conn_id).await;
    forwarder.abort();
    Ok(())
}
