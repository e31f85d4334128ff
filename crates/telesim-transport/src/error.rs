use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listening socket could not be bound, queried, or accepted on.
    #[error("listener error: {0}")]
    Listen(#[source] std::io::Error),

    /// A peer connected but the WebSocket upgrade failed.
    #[cfg(feature = "websocket")]
    #[error("websocket handshake with {peer} failed: {source}")]
    Handshake {
        peer: SocketAddr,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },

    /// Reading or writing an established socket failed.
    #[cfg(feature = "websocket")]
    #[error("websocket error: {0}")]
    Socket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    /// The connection was closed locally; nothing more can be sent.
    #[error("connection {0} is closed")]
    Closed(crate::ConnectionId),
}

#[cfg(feature = "websocket")]
impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Socket(Box::new(err))
    }
}

impl TransportError {
    /// Peer address for handshake failures.
    pub fn peer(&self) -> Option<SocketAddr> {
        match self {
            #[cfg(feature = "websocket")]
            Self::Handshake { peer, .. } => Some(*peer),
            _ => None,
        }
    }
}
