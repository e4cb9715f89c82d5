//! Shared length-prefixed framing for the client <-> room channel (C6).
//!
//! Grounded in `original_source/backend/ogs.go`'s bracket-depth framer for
//! the *shape* of "read until a complete message is buffered", generalized
//! per spec.md §6's simpler scheme: every payload is a 4-byte little-endian
//! length followed by that many bytes of UTF-8 JSON, rather than having to
//! track JSON-array nesting. `bridge.rs` needs the bracket-depth variant for
//! talking to the upstream service and keeps its own framer for that reason.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::EngineError;

/// Payloads longer than this are read in 64-byte chunks instead of one
/// `read_exact` call, per spec.md §4.6's framing note.
const CHUNKED_READ_THRESHOLD: usize = 1024;
const CHUNK_SIZE: usize = 64;

/// Upper bound on a single frame's declared length, per spec.md §9's framing
/// note ("treat [the length prefix] as a max-frame-size constraint... to
/// avoid unbounded allocations").
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Reads one length-prefixed frame, returning its payload bytes.
pub async fn read_frame<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Vec<u8>, EngineError> {
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| EngineError::Internal(format!("frame length read failed: {e}")))?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(EngineError::Input(format!("frame length {len} exceeds the {MAX_FRAME_BYTES}-byte limit")));
    }

    let mut payload = vec![0u8; len];
    if len <= CHUNKED_READ_THRESHOLD {
        stream
            .read_exact(&mut payload)
            .await
            .map_err(|e| EngineError::Internal(format!("frame payload read failed: {e}")))?;
    } else {
        let mut read = 0;
        while read < len {
            let end = (read + CHUNK_SIZE).min(len);
            stream
                .read_exact(&mut payload[read..end])
                .await
                .map_err(|e| EngineError::Internal(format!("frame payload read failed: {e}")))?;
            read = end;
        }
    }
    Ok(payload)
}

/// Reads one frame and parses it as JSON.
pub async fn read_json_frame<R, T>(stream: &mut R) -> Result<T, EngineError>
where
    R: AsyncRead + Unpin,
    T: serde::de::DeserializeOwned,
{
    let payload = read_frame(stream).await?;
    serde_json::from_slice(&payload).map_err(|e| EngineError::Input(format!("malformed event JSON: {e}")))
}

/// Writes a length-prefixed frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(stream: &mut W, payload: &[u8]) -> Result<(), EngineError> {
    let len = payload.len() as u32;
    stream
        .write_all(&len.to_le_bytes())
        .await
        .map_err(|e| EngineError::Internal(format!("frame length write failed: {e}")))?;
    stream.write_all(payload).await.map_err(|e| EngineError::Internal(format!("frame payload write failed: {e}")))?;
    Ok(())
}

/// Serializes `value` to JSON and writes it as one frame.
pub async fn write_json_frame<W, T>(stream: &mut W, value: &T) -> Result<(), EngineError>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let payload = serde_json::to_vec(value).map_err(|e| EngineError::Internal(format!("frame serialize failed: {e}")))?;
    write_frame(stream, &payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::io::Cursor;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    #[tokio::test]
    async fn round_trips_a_small_json_frame() {
        let mut buf = Vec::new();
        write_json_frame(&mut buf, &Ping { n: 7 }).await.unwrap();
        let mut cursor = Cursor::new(buf);
        let decoded: Ping = read_json_frame(&mut cursor).await.unwrap();
        assert_eq!(decoded, Ping { n: 7 });
    }

    #[tokio::test]
    async fn reads_a_payload_larger_than_the_chunk_threshold() {
        let payload = vec![b'x'; 4096];
        let mut buf = Vec::new();
        write_frame(&mut buf, &payload).await.unwrap();
        let mut cursor = Cursor::new(buf);
        let decoded = read_frame(&mut cursor).await.unwrap();
        assert_eq!(decoded, payload);
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&((MAX_FRAME_BYTES + 1) as u32).to_le_bytes());
        let mut cursor = Cursor::new(buf);
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, EngineError::Input(_)));
    }

    #[tokio::test]
    async fn empty_frame_round_trips() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &[]).await.unwrap();
        let mut cursor = Cursor::new(buf);
        let decoded = read_frame(&mut cursor).await.unwrap();
        assert!(decoded.is_empty());
    }
}
