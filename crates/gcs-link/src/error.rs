/// Errors raised by the vehicle link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("invalid link address {0:?} (expected udpin:host:port or udpout:host:port)")]
    InvalidAddress(String),

    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mavlink encode failed: {0}")]
    Encode(String),

    #[error("no peer yet: nothing has been received on this udpin link")]
    NoPeer,

    #[error("outbound queue full")]
    QueueFull,

    #[error("link closed")]
    Closed,

    #[error("a mission transfer is already active on this link")]
    Busy,
}
