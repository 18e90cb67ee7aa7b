use crate::engine::{AkaEngine, AkaError};
use eap_aka_proto::{EapError, EapPacket};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("EAP error: {0}")]
    Eap(#[from] EapError),
    #[error("Framing error: {0}")]
    Frame(String),
    #[error("Engine error: {0}")]
    Engine(#[from] AkaError),
}

/// Largest datagram the frontend reads
pub const MAX_DATAGRAM: usize = 4096;

/// Split a datagram into session ID and EAP packet
///
/// # Frame Format
/// - Session ID length (1 byte, non-zero)
/// - Session ID (UTF-8)
/// - EAP packet
pub fn decode_frame(data: &[u8]) -> Result<(String, EapPacket), ServerError> {
    let (&sid_len, rest) = data
        .split_first()
        .ok_or_else(|| ServerError::Frame("empty datagram".to_string()))?;
    let sid_len = sid_len as usize;
    if sid_len == 0 {
        return Err(ServerError::Frame("empty session ID".to_string()));
    }
    if rest.len() < sid_len {
        return Err(ServerError::Frame(format!(
            "session ID length {} exceeds datagram",
            sid_len
        )));
    }

    let session_id = std::str::from_utf8(&rest[..sid_len])
        .map_err(|e| ServerError::Frame(format!("session ID is not UTF-8: {}", e)))?;
    let packet = EapPacket::from_bytes(&rest[sid_len..])?;
    Ok((session_id.to_string(), packet))
}

/// Frame an EAP packet for `session_id`
pub fn encode_frame(session_id: &str, packet: &EapPacket) -> Result<Vec<u8>, ServerError> {
    let sid_len = u8::try_from(session_id.len())
        .ok()
        .filter(|len| *len > 0)
        .ok_or_else(|| {
            ServerError::Frame(format!("session ID length {} out of range", session_id.len()))
        })?;

    let eap = packet.to_bytes();
    let mut frame = Vec::with_capacity(1 + session_id.len() + eap.len());
    frame.push(sid_len);
    frame.extend_from_slice(session_id.as_bytes());
    frame.extend_from_slice(&eap);
    Ok(frame)
}

/// UDP frontend feeding datagrams to an [`AkaEngine`]
pub struct EapServer {
    engine: Arc<AkaEngine>,
    socket: Arc<UdpSocket>,
}

impl EapServer {
    pub async fn new(bind_addr: SocketAddr, engine: Arc<AkaEngine>) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(bind_addr).await?;
        info!("EAP-AKA server listening on {}", socket.local_addr()?);

        Ok(EapServer {
            engine,
            socket: Arc::new(socket),
        })
    }

    /// Get the local address the server is listening on
    ///
    /// This is useful for testing when binding to port 0 (OS-assigned port)
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.socket.local_addr().map_err(ServerError::from)
    }

    pub fn engine(&self) -> &Arc<AkaEngine> {
        &self.engine
    }

    /// Receive datagrams forever, one task per datagram
    pub async fn run(&self) -> Result<(), ServerError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            let (len, addr) = self.socket.recv_from(&mut buf).await?;
            let data = buf[..len].to_vec();

            let engine = Arc::clone(&self.engine);
            let socket = Arc::clone(&self.socket);

            tokio::spawn(async move {
                if let Err(e) = Self::handle_datagram(data, addr, engine, socket).await {
                    debug!("Error handling datagram from {}: {}", addr, e);
                }
            });
        }
    }

    async fn handle_datagram(
        data: Vec<u8>,
        addr: SocketAddr,
        engine: Arc<AkaEngine>,
        socket: Arc<UdpSocket>,
    ) -> Result<(), ServerError> {
        let (session_id, packet) = match decode_frame(&data) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(client_ip = %addr.ip(), error = %e, "Dropping malformed datagram");
                return Err(e);
            }
        };

        let reply = match engine.handle(&session_id, &packet).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    client_ip = %addr.ip(),
                    session_id = %session_id,
                    identifier = packet.identifier,
                    error = %e,
                    "Dropping packet"
                );
                return Err(e.into());
            }
        };

        if let Some(success) = &reply.success {
            info!(
                client_ip = %addr.ip(),
                session_id = %session_id,
                imsi = %success.imsi,
                method = %success.method,
                "Session authenticated"
            );
        }

        let frame = encode_frame(&session_id, &reply.packet)?;
        socket.send_to(&frame, addr).await?;
        Ok(())
    }
}
