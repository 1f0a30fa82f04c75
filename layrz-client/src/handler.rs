//! Inbound packet dispatch.

use layrz_protocol::ServerPacket;
use std::sync::Arc;

/// Receives server packets decoded by a [`Connection`](crate::Connection).
///
/// Called from the connection's reader task, so implementations should hand
/// heavy work off (e.g. through a channel) instead of blocking.
/// `As` and `Au` are consumed by the connection and never reach the handler.
pub trait PacketHandler: Send + Sync {
    fn handle(&self, packet: ServerPacket);
}

impl<F> PacketHandler for F
where
    F: Fn(ServerPacket) + Send + Sync,
{
    fn handle(&self, packet: ServerPacket) {
        self(packet)
    }
}

/// Shared handler slot, replaceable while the reader runs.
pub(crate) type HandlerSlot = parking_lot::RwLock<Option<Arc<dyn PacketHandler>>>;
