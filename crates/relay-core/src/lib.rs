//! # relay-core
//!
//! Routing state for the client ⇄ operator relay.
//!
//! - **Registry**: which client identity has a live channel right now
//! - **Correlator**: which client an operator-side message id belongs to
//! - **Pending buffer**: replies waiting for an offline client
//! - **Coordinator**: the two directions of traffic over those three tables

#![deny(unsafe_code)]

pub mod connection;
pub mod coordinator;
pub mod correlator;
pub mod errors;
pub mod ids;
pub mod message;
pub mod pending;
pub mod registry;
pub mod transport;

pub mod mock;

pub use connection::ClientConnection;
pub use coordinator::{
    ForwardReceipt, IgnoreReason, RegisterOutcome, RelayCoordinator, RelayStats, ReplyOutcome,
    MISSING_FIELDS,
};
pub use correlator::Correlator;
pub use errors::{RelayError, TransportError};
pub use ids::{ClientIdentity, ConnectionId, OutboundMessageId};
pub use message::{ClientEvent, OperatorMessage, PendingMessage, RelayRequest, ServerEvent};
pub use pending::PendingBuffer;
pub use registry::{ConnectionRegistry, Presence};
pub use transport::OperatorTransport;
