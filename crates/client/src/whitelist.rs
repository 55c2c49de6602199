//! Whitelist administration over a negotiated admin session.
//!
//! The whitelist itself lives on the session host; this client only
//! speaks the request/response vocabulary. Every call is synchronous and
//! deadline-bounded, so a wedged host surfaces as a per-call error rather
//! than a hung CLI.

use std::time::Duration;

use protocol::{read_frame, write_frame, PubKey, WhitelistRequest, WhitelistResponse};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

use crate::error::{ClientError, Result};
use crate::session::{negotiate, SessionDescriptor, NEGOTIATION_TIMEOUT};

/// Default per-call deadline.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// A client for the session host's whitelist.
pub struct WhitelistClient<S> {
    chan: BufReader<S>,
    timeout: Duration,
}

impl<S> WhitelistClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Negotiates a whitelist admin session over `stream`.
    pub async fn negotiate(stream: S) -> Result<Self> {
        let chan = negotiate(stream, &SessionDescriptor::WhitelistAdmin, NEGOTIATION_TIMEOUT)
            .await?;
        Ok(Self {
            chan,
            timeout: RPC_TIMEOUT,
        })
    }

    /// Set the per-call deadline.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Adds `key` to the host's whitelist.
    pub async fn add(&mut self, key: PubKey) -> Result<()> {
        match self.call("add", WhitelistRequest::Add(key)).await? {
            WhitelistResponse::Done => Ok(()),
            other => Err(Self::unexpected("add", &other)),
        }
    }

    /// Removes `key` from the host's whitelist.
    pub async fn remove(&mut self, key: PubKey) -> Result<()> {
        match self.call("remove", WhitelistRequest::Remove(key)).await? {
            WhitelistResponse::Done => Ok(()),
            other => Err(Self::unexpected("remove", &other)),
        }
    }

    /// Lists all whitelisted keys.
    pub async fn list(&mut self) -> Result<Vec<PubKey>> {
        match self.call("list", WhitelistRequest::List).await? {
            WhitelistResponse::Keys(keys) => Ok(keys),
            other => Err(Self::unexpected("list", &other)),
        }
    }

    /// Returns whether `key` is whitelisted.
    pub async fn contains(&mut self, key: PubKey) -> Result<bool> {
        match self.call("get", WhitelistRequest::Contains(key)).await? {
            WhitelistResponse::Contains(present) => Ok(present),
            other => Err(Self::unexpected("get", &other)),
        }
    }

    async fn call(&mut self, op: &'static str, request: WhitelistRequest) -> Result<WhitelistResponse> {
        let deadline = self.timeout;
        let chan = &mut self.chan;
        let exchange = async move {
            write_frame(&mut *chan, &request).await?;
            read_frame::<_, WhitelistResponse>(&mut *chan).await
        };

        let response = tokio::time::timeout(deadline, exchange)
            .await
            .map_err(|_| ClientError::AdminRpc {
                op,
                reason: "timed out".to_string(),
            })?
            .map_err(|e| ClientError::AdminRpc {
                op,
                reason: e.to_string(),
            })?;

        if let WhitelistResponse::Error { message } = response {
            return Err(ClientError::AdminRpc {
                op,
                reason: message,
            });
        }
        Ok(response)
    }

    fn unexpected(op: &'static str, response: &WhitelistResponse) -> ClientError {
        ClientError::AdminRpc {
            op,
            reason: format!("unexpected response: {response:?}"),
        }
    }
}
