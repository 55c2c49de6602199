//! SOCKS5 server-side handshake, CONNECT only.
//!
//! This is the protocol boundary of the proxy front-end: it reads the
//! greeting and request off a fresh client connection, answers the
//! greeting, and yields the CONNECT target. Failure replies for malformed
//! or unsupported requests are written here before the error returns, so
//! the lifecycle layer above never touches wire bytes.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// SOCKS protocol version handled here.
pub const SOCKS_VERSION: u8 = 0x05;

const METHOD_NO_AUTH: u8 = 0x00;
const METHOD_NO_ACCEPTABLE: u8 = 0xff;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// Reply codes from RFC 1928 §6.
pub mod reply {
    pub const SUCCEEDED: u8 = 0x00;
    pub const GENERAL_FAILURE: u8 = 0x01;
    pub const HOST_UNREACHABLE: u8 = 0x04;
    pub const COMMAND_NOT_SUPPORTED: u8 = 0x07;
    pub const ADDRESS_TYPE_NOT_SUPPORTED: u8 = 0x08;
}

/// A CONNECT destination as named by the SOCKS client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    /// Literal IP address and port.
    Ip(SocketAddr),
    /// Domain name and port, resolved by whoever dials.
    Domain(String, u16),
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ip(addr) => addr.fmt(f),
            TargetAddr::Domain(name, port) => write!(f, "{}:{}", name, port),
        }
    }
}

/// Errors from the SOCKS5 exchange.
#[derive(Debug, Error)]
pub enum SocksError {
    #[error("not a SOCKS5 greeting")]
    BadGreeting,

    #[error("client offers no acceptable authentication method")]
    NoAcceptableAuth,

    #[error("unsupported command {0:#04x}, only CONNECT is served")]
    UnsupportedCommand(u8),

    #[error("unsupported address type {0:#04x}")]
    UnsupportedAddressType(u8),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Runs the server side of a SOCKS5 exchange up to, but not including,
/// the final reply: greeting, method selection (no-auth only), and the
/// CONNECT request.
///
/// On protocol-level rejections the appropriate failure reply is written
/// to the client before the error returns. The final reply for the
/// CONNECT itself is the caller's to send once the dial result is known,
/// via [`write_reply`].
pub async fn read_connect_request<S>(stream: &mut S) -> Result<TargetAddr, SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Greeting: VER, NMETHODS, METHODS...
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;
    if header[0] != SOCKS_VERSION || header[1] == 0 {
        return Err(SocksError::BadGreeting);
    }
    let mut methods = vec![0u8; header[1] as usize];
    stream.read_exact(&mut methods).await?;

    if !methods.contains(&METHOD_NO_AUTH) {
        stream
            .write_all(&[SOCKS_VERSION, METHOD_NO_ACCEPTABLE])
            .await?;
        return Err(SocksError::NoAcceptableAuth);
    }
    stream.write_all(&[SOCKS_VERSION, METHOD_NO_AUTH]).await?;

    // Request: VER, CMD, RSV, ATYP
    let mut request = [0u8; 4];
    stream.read_exact(&mut request).await?;
    if request[0] != SOCKS_VERSION {
        return Err(SocksError::BadGreeting);
    }
    if request[1] != CMD_CONNECT {
        write_reply(stream, reply::COMMAND_NOT_SUPPORTED).await?;
        return Err(SocksError::UnsupportedCommand(request[1]));
    }

    let target = match request[3] {
        ATYP_IPV4 => {
            let mut buf = [0u8; 6];
            stream.read_exact(&mut buf).await?;
            let ip = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
            let port = u16::from_be_bytes([buf[4], buf[5]]);
            TargetAddr::Ip(SocketAddr::new(IpAddr::V4(ip), port))
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            let mut buf = vec![0u8; len[0] as usize + 2];
            stream.read_exact(&mut buf).await?;
            let port = u16::from_be_bytes([buf[len[0] as usize], buf[len[0] as usize + 1]]);
            let name = String::from_utf8_lossy(&buf[..len[0] as usize]).into_owned();
            TargetAddr::Domain(name, port)
        }
        ATYP_IPV6 => {
            let mut buf = [0u8; 18];
            stream.read_exact(&mut buf).await?;
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[..16]);
            let port = u16::from_be_bytes([buf[16], buf[17]]);
            TargetAddr::Ip(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        other => {
            write_reply(stream, reply::ADDRESS_TYPE_NOT_SUPPORTED).await?;
            return Err(SocksError::UnsupportedAddressType(other));
        }
    };

    Ok(target)
}

/// Writes the final CONNECT reply with the given code.
///
/// The bound address field is always `0.0.0.0:0`; clients ignore it for
/// CONNECT.
pub async fn write_reply<S>(stream: &mut S, code: u8) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream
        .write_all(&[SOCKS_VERSION, code, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0])
        .await?;
    stream.flush().await
}
