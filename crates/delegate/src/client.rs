//! Client side of the handshake.
//!
//! [`DelegateClient`] opens a TCP connection and speaks INIT / REESTAB to a
//! delegate server, and is how an embedding application obtains a
//! session.

use std::time::Duration;

use delegate_protocol::{Packet, PacketCodec, SessionId};
use delegate_transport::{Connection, TcpConnection};
use tokio::net::ToSocketAddrs;

use crate::DelegateError;

/// The server's answer to one INIT or REESTAB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeReply {
    /// The session is active under this id.
    Session(SessionId),
    /// The attempt failed. With `remaining == 0` the server has closed
    /// the connection.
    Rejected { remaining: u8 },
}

impl HandshakeReply {
    /// The session id, if the handshake succeeded.
    pub fn session_id(self) -> Option<SessionId> {
        match self {
            Self::Session(id) => Some(id),
            Self::Rejected { .. } => None,
        }
    }
}

/// A connection to a delegate server.
pub struct DelegateClient {
    conn: TcpConnection,
    codec: PacketCodec,
    reply_timeout: Duration,
}

impl DelegateClient {
    /// Connects to the server at `addr`.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, DelegateError> {
        let conn = TcpConnection::connect(addr).await?;
        Ok(Self {
            conn,
            codec: PacketCodec::default(),
            reply_timeout: Duration::from_secs(10),
        })
    }

    /// Sets how long to wait for each server reply.
    pub fn with_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    /// Presents `secret` and waits for the verdict.
    pub async fn init(&mut self, secret: &[u8]) -> Result<HandshakeReply, DelegateError> {
        let packet = Packet::Init {
            secret: secret.to_vec(),
        };
        self.codec.write(&mut self.conn, &packet).await?;
        self.read_reply().await
    }

    /// Asks to resume `session_id` on this connection.
    pub async fn reestablish(
        &mut self,
        session_id: SessionId,
    ) -> Result<HandshakeReply, DelegateError> {
        self.codec
            .write(&mut self.conn, &Packet::Reestab { session_id })
            .await?;
        self.read_reply().await
    }

    /// Reads one SESSIONID or REJECT from the server.
    ///
    /// # Errors
    /// - [`DelegateError::TimedOut`] if nothing arrives in time
    /// - [`DelegateError::UnexpectedPacket`] for a client-only packet
    pub async fn read_reply(&mut self) -> Result<HandshakeReply, DelegateError> {
        let packet = tokio::time::timeout(self.reply_timeout, self.codec.read(&mut self.conn))
            .await
            .map_err(|_| DelegateError::TimedOut("server reply"))??;

        match packet {
            Packet::SessionId { session_id } => Ok(HandshakeReply::Session(session_id)),
            Packet::Reject { remaining } => Ok(HandshakeReply::Rejected { remaining }),
            other => Err(DelegateError::UnexpectedPacket(other.tag())),
        }
    }

    /// Writes raw bytes, bypassing the codec.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), DelegateError> {
        self.conn.send(bytes).await?;
        Ok(())
    }

    /// Shuts down the write half, signalling EOF to the server.
    pub async fn close(&mut self) -> Result<(), DelegateError> {
        self.conn.close().await?;
        Ok(())
    }
}
