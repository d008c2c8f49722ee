//! I/O infrastructure: wire messages, codec and transport plumbing.
//!
//! # Wire messages
//!
//! All inter-task traffic is Protobuf (prost). A task receives four kinds of
//! inbound payloads on independent channels, with no ordering between kinds:
//!
//! ```text
//! scan ──────────┐
//! assignments ───┤
//! map batches ───┼──► CoordinatorInbox ──► coordinator actor
//! value batches ─┤
//! control ───────┘
//! ```
//!
//! Outbound traffic goes through the [`Transport`] trait, keyed by [`Route`].

pub mod codec;
pub mod inbox;
pub mod local_hub;
pub mod messages;
pub mod transport;

pub use codec::{DecodeError, MessageKind};
pub use inbox::{CoordinatorInbox, Inbound, InboxReceivers, create_inbox};
pub use local_hub::{HubReceivers, LocalHub};
pub use transport::{Route, Transport, TransportError};
