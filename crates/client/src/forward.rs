//! Bidirectional forwarding between the local terminal and a session channel.
//!
//! Two copy directions run as independent tasks over disjoint halves of
//! the duplex channel. The first direction to terminate decides the
//! outcome; the other is torn down immediately so no half-open pump
//! lingers. A fired cancellation token closes the channel and reports
//! [`ForwardOutcome::Cancelled`], which is a normal completion, not an
//! error.

use std::io;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, Result};

/// How a forwarding run ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// The session channel or the local input reached EOF.
    Closed,
    /// The shared cancellation signal fired before either side closed.
    Cancelled,
}

/// Pumps the process's stdin/stdout through `chan` until either side
/// closes, an I/O error occurs, or `cancel` fires.
pub async fn forward<S>(chan: S, cancel: CancellationToken) -> Result<ForwardOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    forward_with(tokio::io::stdin(), tokio::io::stdout(), chan, cancel).await
}

/// [`forward`] with explicit input/output streams.
pub async fn forward_with<I, O, S>(
    input: I,
    output: O,
    chan: S,
    cancel: CancellationToken,
) -> Result<ForwardOutcome>
where
    I: AsyncRead + Unpin + Send + 'static,
    O: AsyncWrite + Unpin + Send + 'static,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut remote_r, mut remote_w) = tokio::io::split(chan);
    let mut input = input;
    let mut output = output;

    let mut up = tokio::spawn(async move {
        let res = tokio::io::copy(&mut input, &mut remote_w).await;
        // Half-close so the host observes our EOF.
        let _ = remote_w.shutdown().await;
        res
    });

    let mut down = tokio::spawn(async move {
        let res = tokio::io::copy(&mut remote_r, &mut output).await;
        let _ = output.flush().await;
        res
    });

    // First direction to terminate wins; the loser is aborted, which
    // drops its channel half. Aborting an already-finished task is a
    // no-op, so teardown stays idempotent.
    tokio::select! {
        res = &mut down => {
            up.abort();
            let _ = (&mut up).await;
            finish(res)
        }
        res = &mut up => {
            down.abort();
            let _ = (&mut down).await;
            finish(res)
        }
        _ = cancel.cancelled() => {
            up.abort();
            down.abort();
            let _ = (&mut up).await;
            let _ = (&mut down).await;
            tracing::debug!("forwarder cancelled, session channel closed");
            Ok(ForwardOutcome::Cancelled)
        }
    }
}

fn finish(res: std::result::Result<io::Result<u64>, JoinError>) -> Result<ForwardOutcome> {
    match res {
        Ok(Ok(_)) => Ok(ForwardOutcome::Closed),
        Ok(Err(e)) => Err(ClientError::Io(e)),
        Err(e) => Err(ClientError::Io(io::Error::other(e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt};
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_remote_close_ends_run() {
        let (chan, mut host) = duplex(4096);
        // Input that never produces bytes while its writer stays alive.
        let (_input_w, input_r) = duplex(64);
        let (output_w, mut output_r) = duplex(4096);

        let cancel = CancellationToken::new();
        let run = tokio::spawn(forward_with(input_r, output_w, chan, cancel));

        host.write_all(b"hi\n").await.unwrap();
        drop(host);

        let outcome = timeout(Duration::from_secs(2), run).await.unwrap().unwrap();
        assert_eq!(outcome.unwrap(), ForwardOutcome::Closed);

        let mut collected = Vec::new();
        output_r.read_to_end(&mut collected).await.unwrap();
        assert_eq!(collected, b"hi\n");
    }

    #[tokio::test]
    async fn test_input_eof_ends_run() {
        let (chan, mut host) = duplex(4096);
        let (input_w, input_r) = duplex(64);
        let (output_w, _output_r) = duplex(4096);

        let cancel = CancellationToken::new();
        let run = tokio::spawn(forward_with(input_r, output_w, chan, cancel));

        drop(input_w);

        let outcome = timeout(Duration::from_secs(2), run).await.unwrap().unwrap();
        assert_eq!(outcome.unwrap(), ForwardOutcome::Closed);

        // The host sees the channel half-closed.
        let mut buf = Vec::new();
        host.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_within_grace_period() {
        let (chan, host) = duplex(4096);
        let (_input_w, input_r) = duplex(64);
        let (output_w, _output_r) = duplex(4096);

        let cancel = CancellationToken::new();
        let run = tokio::spawn(forward_with(input_r, output_w, chan, cancel.clone()));

        cancel.cancel();
        // Cancelling again must be harmless.
        cancel.cancel();

        let outcome = timeout(Duration::from_secs(1), run).await.unwrap().unwrap();
        assert_eq!(outcome.unwrap(), ForwardOutcome::Cancelled);
        drop(host);
    }

    #[tokio::test]
    async fn test_bytes_flow_both_directions() {
        let (chan, mut host) = duplex(4096);
        let (mut input_w, input_r) = duplex(4096);
        let (output_w, mut output_r) = duplex(4096);

        let cancel = CancellationToken::new();
        let run = tokio::spawn(forward_with(input_r, output_w, chan, cancel));

        // Local keystrokes reach the host.
        input_w.write_all(b"ls\r").await.unwrap();
        let mut buf = [0u8; 3];
        host.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ls\r");

        // Host output reaches the local side.
        host.write_all(b"file\r\n").await.unwrap();
        let mut buf = [0u8; 6];
        output_r.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"file\r\n");

        drop(host);
        let outcome = timeout(Duration::from_secs(2), run).await.unwrap().unwrap();
        assert_eq!(outcome.unwrap(), ForwardOutcome::Closed);
    }

    #[tokio::test]
    async fn test_cancel_after_completion_does_not_panic() {
        let (chan, host) = duplex(4096);
        let (_input_w, input_r) = duplex(64);
        let (output_w, _output_r) = duplex(4096);

        let cancel = CancellationToken::new();
        drop(host);

        let outcome = forward_with(input_r, output_w, chan, cancel.clone())
            .await
            .unwrap();
        assert_eq!(outcome, ForwardOutcome::Closed);

        // Teardown already ran; firing the signal afterwards is a no-op.
        cancel.cancel();
    }
}
