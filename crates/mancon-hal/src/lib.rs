//! `mancon-hal` – Hardware Abstraction Layer
//!
//! Everything between a client-visible handle id and the bytes on the bus.
//!
//! # Modules
//!
//! - [`transport`] – the [`BusTransport`] / [`ModuleConnection`] / [`Imu`]
//!   traits, the low-level [`BusFault`] they report and the
//!   [`ModuleEventSink`] for events raised outside any command.
//! - [`handle`] – [`ModuleHandle`]: one open connection with an idempotent
//!   close, equal to any other handle wrapping the same module.
//! - [`handle_table`] – [`HandleTable`]: id allocation, lookup and the
//!   last-handle-closes fail-safe rule.
//! - [`sim`] – [`SimTransport`][sim::SimTransport]: an in-memory bus with
//!   fault injection, used by tests and the CLI.

pub mod handle;
pub mod handle_table;
pub mod sim;
pub mod transport;

pub use handle::ModuleHandle;
pub use handle_table::HandleTable;
pub use transport::{
    BusFault, BusTransport, Imu, ModuleConnection, ModuleEvent, ModuleEventSink, ModuleId,
};
