//! `mancon-types` – shared vocabulary of the manual-control bridge.
//!
//! Every other crate in the workspace speaks in terms of these types: module
//! descriptors, client identities, the lifecycle state of the
//! hardware-owning context, outbound notifications, and the
//! [`ControlError`] taxonomy that every request ultimately resolves to.
//!
//! The typed bus command set lives in [`bus`].

pub mod bus;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Protocol version reported to a client on a successful `start`.
pub const API_VERSION: u32 = 1;

/// Client-visible integer reference to one open module connection.
pub type HandleId = i32;

/// Bus address of one hardware module.
///
/// `parent_address` is set for daisy-chained modules that are reached through
/// another module on the same bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    /// Serial number of the bus (USB/serial adapter) the module sits on.
    pub serial: String,
    /// Module address on that bus.
    pub module_address: u8,
    /// Address of the parent module for daisy-chained modules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_address: Option<u8>,
}

impl ModuleDescriptor {
    /// Descriptor for a module attached directly to the bus.
    pub fn new(serial: impl Into<String>, module_address: u8) -> Self {
        Self {
            serial: serial.into(),
            module_address,
            parent_address: None,
        }
    }

    /// Descriptor for a module reached through `parent_address`.
    pub fn chained(serial: impl Into<String>, parent_address: u8, module_address: u8) -> Self {
        Self {
            serial: serial.into(),
            module_address,
            parent_address: Some(parent_address),
        }
    }

    /// `true` when the module is reached through another module.
    pub fn is_chained(&self) -> bool {
        self.parent_address.is_some()
    }
}

impl fmt::Display for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent_address {
            Some(parent) => write!(f, "{}/{}>{}", self.serial, parent, self.module_address),
            None => write!(f, "{}/{}", self.serial, self.module_address),
        }
    }
}

/// Opaque identity of one network client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the connection layer knows about the client sending a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConnection {
    pub id: ClientId,
    /// The connection originates on this machine.
    pub is_local: bool,
    /// The client subscribed to the manual-control message channel.
    pub subscribed: bool,
}

impl ClientConnection {
    /// A local, subscribed client – the only kind allowed to `start`.
    pub fn local(id: impl Into<String>) -> Self {
        Self {
            id: ClientId::new(id),
            is_local: true,
            subscribed: true,
        }
    }

    /// A subscribed client connecting from another machine.
    pub fn remote(id: impl Into<String>) -> Self {
        Self {
            id: ClientId::new(id),
            is_local: false,
            subscribed: true,
        }
    }
}

/// Which program currently owns the hardware-owning context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// A transition was requested and has not resolved yet.
    Pending,
    /// The idle default program (no user program) owns the context.
    DefaultOwner,
    /// The manual-control program owns the context.
    ManualControlOwner,
    /// Some other user program owns the context.
    OtherOwner,
}

/// Programs the scheduler can report on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgramKind {
    Default,
    ManualControl,
    Other(String),
}

impl ProgramKind {
    /// The lifecycle state in force while this program is running.
    pub fn owner_state(&self) -> LifecycleState {
        match self {
            ProgramKind::Default => LifecycleState::DefaultOwner,
            ProgramKind::ManualControl => LifecycleState::ManualControlOwner,
            ProgramKind::Other(_) => LifecycleState::OtherOwner,
        }
    }
}

/// Unsolicited messages sent to the allowed client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Notification {
    /// The manual-control session is over; the client must `start` again.
    SessionEnded { reason: String },
    /// A module behind these handles reset or changed status.
    HardwareStatusChanged { handles: Vec<HandleId> },
    /// A module behind these handles now answers at `new_address`.
    #[serde(rename_all = "camelCase")]
    AddressChanged {
        handles: Vec<HandleId>,
        new_address: u8,
    },
}

/// Envelope for an outbound [`Notification`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outbound {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub notification: Notification,
}

impl Outbound {
    pub fn new(notification: Notification) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            notification,
        }
    }
}

/// Client-facing category of a [`ControlError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthorized,
    LifecycleConflict,
    InvalidParameter,
    UnknownHandle,
    NotResponding,
    BusFault,
    SessionEnded,
    Internal,
}

/// Every failure a manual-control request can end in.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Lifecycle conflict: {0}")]
    LifecycleConflict(String),

    #[error("Invalid parameter '{field}': {reason}")]
    InvalidParameter { field: String, reason: String },

    #[error("Unknown handle id {0}")]
    UnknownHandle(HandleId),

    #[error("Module {module} is not responding")]
    NotResponding { module: String },

    #[error("Bus fault {code:#04x} reported by module {module}")]
    BusFault { module: String, code: u8 },

    #[error("Manual control session ended: {0}")]
    SessionEnded(String),

    #[error("Internal fault: {0}")]
    Internal(String),
}

impl ControlError {
    /// Shorthand for [`ControlError::InvalidParameter`].
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ControlError::InvalidParameter {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ControlError::Unauthorized(_) => ErrorKind::Unauthorized,
            ControlError::LifecycleConflict(_) => ErrorKind::LifecycleConflict,
            ControlError::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            ControlError::UnknownHandle(_) => ErrorKind::UnknownHandle,
            ControlError::NotResponding { .. } => ErrorKind::NotResponding,
            ControlError::BusFault { .. } => ErrorKind::BusFault,
            ControlError::SessionEnded(_) => ErrorKind::SessionEnded,
            ControlError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Error body returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ControlError> for ErrorResponse {
    fn from(err: &ControlError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
