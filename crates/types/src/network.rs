//! Network message markers.

/// Marker for messages that can traverse the gossip layer.
///
/// The type id names the gossip topic the message travels on.
pub trait NetworkMessage: std::fmt::Debug + Clone + Send + 'static {
    /// Stable identifier for this message type on the wire.
    fn message_type_id() -> &'static str;
}
