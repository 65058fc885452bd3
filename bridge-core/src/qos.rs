//! Delivery QoS for a sink link.

/// Whether a sink link's deliveries are settled at send time or held
/// unsettled pending a disposition from the receiving peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Qos {
    /// Records are committed as soon as the transfer is handed to the
    /// session; no disposition is awaited.
    Settled,
    /// Records are only committed once the peer's disposition confirms
    /// the transfer (accepted, rejected, released, or modified).
    Unsettled,
}

impl Qos {
    /// Whether this QoS requires waiting for a disposition before the
    /// record can be considered delivered for offset-tracking purposes.
    #[must_use]
    pub const fn awaits_disposition(self) -> bool {
        matches!(self, Self::Unsettled)
    }
}

/// The terminal outcome an AMQP receiver reports back for an unsettled
/// transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// The peer processed the transfer successfully.
    Accepted,
    /// The peer could not process the transfer.
    Rejected,
    /// The peer released the transfer without processing it; it is
    /// eligible for redelivery elsewhere.
    Released,
    /// The peer processed the transfer with annotations attached,
    /// typically requesting redelivery with modified properties.
    Modified,
}
