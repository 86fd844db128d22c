//! Core types and collaborator traits for the EventBuss gateway.
//!
//! This crate is the pure heart of the gateway: event identifiers, the
//! event-to-route table, outbound messages, publish outcomes, the payload
//! codec hook, and the narrow traits through which the broker client is
//! consumed. It performs no I/O.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   resolve    ┌──────────────┐
//! │  RouteTable  │◄─────────────│   Gateway    │
//! └──────────────┘              │ (push/listen)│
//!                               └──────┬───────┘
//!                                      │ emit / subscribe
//!                                      ▼
//!                               ┌──────────────┐
//!                               │ dyn Broker / │
//!                               │ dyn Connection│◄── lapin binding,
//!                               └──────────────┘    in-memory test double
//! ```
//!
//! Everything that touches the network lives behind [`Broker`] and
//! [`Connection`]; everything that retries or breaks circuits lives in
//! `eventbuss-runtime`; the user-facing facade lives in `eventbuss-gateway`.

/// Application-level event identifiers.
pub mod event;

/// Event-to-route resolution.
pub mod route;

/// Outbound messages and publish outcomes.
pub mod message;

/// Payload marshaling hooks.
pub mod codec;

/// Narrow interfaces to the broker collaborator.
pub mod broker;

pub use broker::{
    AckFuture, Acker, Broker, BrokerError, Connection, ConnectionState, Delivery, DeliveryStream,
    EmitAck,
};
pub use codec::{BincodeCodec, Codec, CodecError, JsonCodec};
pub use event::Event;
pub use message::{DeliveryMode, Message, PublishOutcome};
pub use route::{ExchangeKind, Route, RouteError, RouteTable};
