//! The concurrent runtime: stream reassembly, per-peer connections and the
//! background receive loop.

pub(crate) mod connection;
pub(crate) mod runtime;
pub(crate) mod stream;

use crate::error::NetworkError;
use crate::types::PeerAddress;

/// An abstract byte endpoint the runtime reads from and writes to.
///
/// Implementations must be safe to use from multiple threads; the runtime
/// serializes its own sends, so `send` is never called concurrently by the
/// runtime itself, but `close` may race with a blocked `receive`.
pub trait NetworkInterface: Send + Sync {
    /// Best-effort write of a full frame to `peer`. May block.
    ///
    /// A broadcast peer fans out to all known remotes on a
    /// connection-oriented transport and is an error on a connection-less
    /// one.
    fn send(&self, data: &[u8], peer: PeerAddress) -> Result<(), NetworkError>;

    /// Read exactly `destination.len()` bytes, blocking until available,
    /// and return the peer they came from.
    ///
    /// Returns [`NetworkError::Interrupt`] once the interface has been
    /// closed locally and [`NetworkError::Closed`] when the remote end went
    /// away.
    fn receive(&self, destination: &mut [u8]) -> Result<PeerAddress, NetworkError>;

    /// Close the interface. Idempotent; wakes blocked receivers with
    /// [`NetworkError::Interrupt`].
    fn close(&self);

    /// The stream parser lost framing. Datagram transports discard the
    /// rest of the current datagram here; stream transports need not do
    /// anything.
    fn mark_resync(&self) {}

    /// Whether the transport tracks individual remote endpoints (TCP) or
    /// is connection-less (UDP).
    fn is_connection_oriented(&self) -> bool;
}
