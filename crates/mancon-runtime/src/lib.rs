//! `mancon-runtime` – the manual-control session bridge
//!
//! Puts the kernel primitives and the HAL together into a working bridge
//! between one network client and the robot's hardware bus.
//!
//! # Modules
//!
//! - [`bridge`] – [`ManualControlBridge`]: `start`/`stop`, request routing,
//!   the response envelope, module events and status.
//! - [`scheduler`] – [`ThreadScheduler`]: runs the manual-control program on
//!   the dedicated `mancon-hw` thread and reports program switches to the
//!   lifecycle monitor.
//! - [`program`] – the consumer loop executed on that thread.
//! - [`session`] – [`ManualControlSession`]: the request-thread side that
//!   queues work and waits for its result.
//! - [`context`] – [`HardwareContext`]: per-session state lent to every
//!   queued task (handle table, IMU).
//! - [`dispatch`] – the [`SessionCommand`]/[`DeviceCommand`] contracts, the
//!   bounded-timeout [`DeviceLink`][dispatch::DeviceLink], fault translation
//!   and the JSON [`Router`].
//! - [`commands`] – every device command family.
//! - [`notify`] – outbound notifications to the allowed client.
//! - [`config`] – [`BridgeConfig`] timeouts.
//! - [`telemetry`] – [`init_tracing`]: `tracing` subscriber with an optional
//!   OTLP span exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable it.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use mancon_hal::sim::SimTransport;
//! use mancon_runtime::{BridgeConfig, ChannelNotifier, ManualControlBridge};
//! use mancon_types::ClientConnection;
//! use serde_json::json;
//!
//! let (notifier, _outbox) = ChannelNotifier::new();
//! let bridge = ManualControlBridge::new(
//!     Arc::new(SimTransport::new()),
//!     BridgeConfig::default(),
//!     Arc::new(notifier),
//! );
//! let client = ClientConnection::local("driver-station");
//! assert!(bridge.handle_request(&client, "start", json!(null)).ok);
//! let hub = json!({"serial": "DQ1", "moduleAddress": 2});
//! let opened = bridge.handle_request(&client, "openHub", hub);
//! assert_eq!(opened.result.unwrap()["handle"], 0);
//! bridge.stop();
//! ```

pub mod bridge;
pub mod commands;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod notify;
pub mod program;
pub mod scheduler;
pub mod session;
pub mod telemetry;

pub use bridge::{BridgeStatus, ManualControlBridge, Response, StartResult};
pub use config::BridgeConfig;
pub use context::HardwareContext;
pub use dispatch::{DeviceCommand, Router, SessionCommand, translate_fault};
pub use notify::{ChannelNotifier, ClientNotifier};
pub use scheduler::ThreadScheduler;
pub use session::ManualControlSession;
pub use telemetry::{TracerProviderGuard, init_tracing};
