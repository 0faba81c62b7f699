//! Live connection registry and event fan-out.
//!
//! Each connection owns a bounded queue drained by its own writer task. Producers
//! only ever `try_send`; a full queue evicts that connection alone.

mod connection;
mod hub;
mod message;

pub use connection::{ConnectionHandle, ConnectionId, ConnectionState, Transport, TransportError};
pub use hub::{Hub, HubConfig};
pub use message::{Event, Notification, OutboundFrame};

pub(crate) use hub::{
    METRIC_HUB_CONNECTIONS, METRIC_HUB_DELIVERIES, METRIC_HUB_DISCONNECTS, METRIC_HUB_EVICTIONS,
    METRIC_HUB_REGISTRATIONS,
};
