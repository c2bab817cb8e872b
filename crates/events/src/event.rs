use chrono::{DateTime, Utc};

/// A fact recorded on an aggregate stream.
///
/// Event names follow `<module>.<aggregate>.<fact>`, e.g.
/// `"purchasing.purchase.confirmed"`; the first two segments name the stream
/// type the event belongs to.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn event_type(&self) -> &'static str;

    /// Payload schema version.
    fn version(&self) -> u32;

    /// Business time of the fact.
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Stream type of the event: its name without the last segment.
    fn stream_type(&self) -> &'static str {
        stream_type_of(self.event_type())
    }
}

/// `"inventory.return_shipment.done"` → `"inventory.return_shipment"`.
pub fn stream_type_of(event_type: &str) -> &str {
    event_type
        .rsplit_once('.')
        .map_or(event_type, |(stream, _)| stream)
}
