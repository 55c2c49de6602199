//! Newline-delimited JSON framing for control and admin exchanges.
//!
//! One serialized message per line. Frames are small (requests and
//! responses, never session payload), so a hard length cap protects both
//! sides from a misbehaving peer without any windowing.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, Result};

/// Maximum serialized frame length in bytes, including the trailing newline.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Serializes `msg` as one JSON line and writes it to `writer`.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut json = serde_json::to_string(msg)
        .map_err(|e| ProtocolError::Serialization(e.to_string()))?;
    json.push('\n');
    if json.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            size: json.len(),
            max: MAX_FRAME_LEN,
        });
    }
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one JSON line from `reader` and deserializes it.
///
/// Returns [`ProtocolError::ConnectionClosed`] on a clean EOF before any
/// bytes and [`ProtocolError::FrameTooLarge`] when the peer sends a line
/// past the cap.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    let mut limited = reader.take((MAX_FRAME_LEN + 1) as u64);
    let n = limited.read_line(&mut line).await?;
    if n == 0 {
        return Err(ProtocolError::ConnectionClosed);
    }
    if n > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            size: n,
            max: MAX_FRAME_LEN,
        });
    }
    serde_json::from_str(line.trim_end())
        .map_err(|e| ProtocolError::Deserialization(e.to_string()))
}
