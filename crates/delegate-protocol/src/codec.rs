//! Binary encoding of [`Packet`]s, from slices and from live connections.
//!
//! [`PacketCodec::read`] is what the server uses: it pulls exactly one
//! packet off a [`Connection`], looping over partial reads until the
//! tag-implied layout is complete. [`PacketCodec::decode`] does the same
//! for an in-memory buffer.

use delegate_transport::Connection;

use crate::{Packet, ProtocolError, SessionId, Tag};

/// Longest secret accepted when no other limit is configured.
///
/// 255 bytes of secret plus the tag byte fill one 256-byte frame.
pub const DEFAULT_MAX_SECRET_LEN: usize = 255;

/// Largest secret limit a server may be configured with.
pub const MAX_SECRET_LEN_LIMIT: usize = 64 * 1024;

const ID_LEN: usize = 8;

/// Encodes and decodes packets with a bounded INIT secret length.
#[derive(Debug, Clone, Copy)]
pub struct PacketCodec {
    max_secret_len: usize,
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SECRET_LEN)
    }
}

impl PacketCodec {
    /// Creates a codec accepting secrets of up to `max_secret_len` bytes.
    pub fn new(max_secret_len: usize) -> Self {
        Self { max_secret_len }
    }

    /// Serializes a packet into its wire form.
    ///
    /// # Errors
    /// - [`ProtocolError::SecretContainsNul`] if an INIT secret contains
    ///   the terminator byte
    /// - [`ProtocolError::SecretTooLong`] if it exceeds the limit
    pub fn encode(&self, packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
        let mut out = vec![packet.tag() as u8];
        match packet {
            Packet::Init { secret } => {
                if secret.contains(&0) {
                    return Err(ProtocolError::SecretContainsNul);
                }
                if secret.len() > self.max_secret_len {
                    return Err(ProtocolError::SecretTooLong {
                        limit: self.max_secret_len,
                    });
                }
                out.extend_from_slice(secret);
                out.push(0);
            }
            Packet::Reestab { session_id }
            | Packet::SessionId { session_id } => {
                out.extend_from_slice(&session_id.to_wire());
            }
            Packet::Reject { remaining } => out.push(*remaining),
        }
        Ok(out)
    }

    /// Decodes exactly one packet from `data`.
    ///
    /// The buffer must hold one complete packet and nothing else.
    pub fn decode(&self, data: &[u8]) -> Result<Packet, ProtocolError> {
        let (&first, body) = data.split_first().ok_or(ProtocolError::Empty)?;
        let tag = Tag::from_byte(first).ok_or(ProtocolError::UnknownTag(first))?;

        let (packet, used) = match tag {
            Tag::Init => {
                let window = &body[..body.len().min(self.max_secret_len.saturating_add(1))];
                match window.iter().position(|&b| b == 0) {
                    Some(nul) => (
                        Packet::Init {
                            secret: body[..nul].to_vec(),
                        },
                        nul + 1,
                    ),
                    None if body.len() > self.max_secret_len => {
                        return Err(ProtocolError::SecretTooLong {
                            limit: self.max_secret_len,
                        });
                    }
                    None => {
                        return Err(ProtocolError::Truncated { tag, expected: 1 });
                    }
                }
            }
            Tag::Reestab | Tag::SessionId => {
                let bytes: [u8; ID_LEN] = body
                    .get(..ID_LEN)
                    .and_then(|b| b.try_into().ok())
                    .ok_or(ProtocolError::Truncated {
                        tag,
                        expected: ID_LEN - body.len().min(ID_LEN),
                    })?;
                let session_id = SessionId::from_wire(bytes);
                let packet = if tag == Tag::Reestab {
                    Packet::Reestab { session_id }
                } else {
                    Packet::SessionId { session_id }
                };
                (packet, ID_LEN)
            }
            Tag::Reject => {
                let remaining = *body
                    .first()
                    .ok_or(ProtocolError::Truncated { tag, expected: 1 })?;
                (Packet::Reject { remaining }, 1)
            }
        };

        match body.len() - used {
            0 => Ok(packet),
            extra => Err(ProtocolError::TrailingBytes(extra)),
        }
    }

    /// Reads exactly one packet from a connection.
    ///
    /// EOF before the tag byte surfaces as
    /// `ProtocolError::Transport(TransportError::ConnectionClosed)` (check
    /// with [`ProtocolError::is_disconnect`]); EOF after it is
    /// [`ProtocolError::Truncated`].
    pub async fn read<C: Connection>(
        &self,
        conn: &mut C,
    ) -> Result<Packet, ProtocolError> {
        let mut first = [0u8; 1];
        conn.read_exact(&mut first).await?;
        let tag =
            Tag::from_byte(first[0]).ok_or(ProtocolError::UnknownTag(first[0]))?;

        match tag {
            Tag::Init => {
                let mut raw =
                    conn.read_until(0, self.max_secret_len.saturating_add(1)).await?;
                if raw.last() == Some(&0) {
                    raw.pop();
                    Ok(Packet::Init { secret: raw })
                } else if raw.len() > self.max_secret_len {
                    Err(ProtocolError::SecretTooLong {
                        limit: self.max_secret_len,
                    })
                } else {
                    Err(ProtocolError::Truncated { tag, expected: 1 })
                }
            }
            Tag::Reestab | Tag::SessionId => {
                let mut bytes = [0u8; ID_LEN];
                read_body(conn, tag, &mut bytes).await?;
                let session_id = SessionId::from_wire(bytes);
                Ok(if tag == Tag::Reestab {
                    Packet::Reestab { session_id }
                } else {
                    Packet::SessionId { session_id }
                })
            }
            Tag::Reject => {
                let mut byte = [0u8; 1];
                read_body(conn, tag, &mut byte).await?;
                Ok(Packet::Reject { remaining: byte[0] })
            }
        }
    }

    /// Encodes `packet` and writes it to `conn` in one send.
    pub async fn write<C: Connection>(
        &self,
        conn: &mut C,
        packet: &Packet,
    ) -> Result<(), ProtocolError> {
        let bytes = self.encode(packet)?;
        conn.send(&bytes).await?;
        Ok(())
    }
}

/// Fills a fixed-size packet body, turning EOF into `Truncated`.
async fn read_body<C: Connection>(
    conn: &mut C,
    tag: Tag,
    buf: &mut [u8],
) -> Result<(), ProtocolError> {
    match conn.read_exact(buf).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_closed() => Err(ProtocolError::Truncated {
            tag,
            expected: buf.len(),
        }),
        Err(e) => Err(e.into()),
    }
}
