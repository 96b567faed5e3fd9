//! Command dispatch layer.
//!
//! Every client command is a payload type, a result type and an operation.
//! Two flavours exist:
//!
//! - [`SessionCommand`] – the operation runs on the hardware-owning thread
//!   against the [`HardwareContext`] (e.g. `openHub`, `initImu`).
//! - [`DeviceCommand`] – the payload additionally names a handle id.  The
//!   handle is resolved on the hardware-owning thread and the operation runs
//!   against a [`DeviceLink`] that bounds every bus call by the device
//!   timeout.
//!
//! Device commands only ever report [`ControlError::InvalidParameter`]
//! themselves.  Handle lookup, timeouts and bus faults are translated here,
//! uniformly for every command.
//!
//! The [`Router`] erases these types behind a command-name keyed table that
//! decodes and encodes JSON.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::{Duration, Instant};

use mancon_hal::{BusFault, ModuleHandle};
use mancon_kernel::interrupt;
use mancon_types::bus::{BusCommand, BusResponse};
use mancon_types::{ControlError, HandleId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::context::HardwareContext;
use crate::session::ManualControlSession;

// ────────────────────────────────────────────────────────────────────────────
// Fault translation
// ────────────────────────────────────────────────────────────────────────────

/// Map a transport fault onto the client-facing taxonomy.
///
/// | Fault | Error |
/// |---|---|
/// | NACK with a bookkeeping code | `NotResponding` |
/// | NACK with the safety-veto code | `Unauthorized` |
/// | any other NACK | `BusFault` with the raw code |
/// | timeout, disconnect, closed connection | `NotResponding` |
/// | interrupt | `SessionEnded` |
pub fn translate_fault(module: &str, fault: BusFault) -> ControlError {
    match fault {
        BusFault::Nack(code) if code.is_bookkeeping() => ControlError::NotResponding {
            module: module.to_string(),
        },
        BusFault::Nack(code) if code.is_safety_veto() => ControlError::Unauthorized(format!(
            "module {module} vetoed the operation for safety"
        )),
        BusFault::Nack(code) => ControlError::BusFault {
            module: module.to_string(),
            code: code.0,
        },
        BusFault::Timeout | BusFault::Disconnected(_) | BusFault::Closed => {
            ControlError::NotResponding {
                module: module.to_string(),
            }
        }
        BusFault::Interrupted => {
            ControlError::SessionEnded("manual control stopped during a bus operation".to_string())
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Command contracts
// ────────────────────────────────────────────────────────────────────────────

/// A command whose operation runs directly on the hardware-owning thread.
pub trait SessionCommand: 'static {
    /// Command name on the wire.
    const NAME: &'static str;
    type Payload: DeserializeOwned + Send + 'static;
    type Output: Serialize + Send + 'static;

    /// Reject out-of-range payloads before anything is queued.
    fn validate(_payload: &Self::Payload) -> Result<(), ControlError> {
        Ok(())
    }

    fn execute(ctx: &HardwareContext, payload: Self::Payload) -> Result<Self::Output, ControlError>;
}

/// A command addressed to one open module handle.
pub trait DeviceCommand: 'static {
    const NAME: &'static str;
    type Params: DeserializeOwned + Send + 'static;
    type Output: Serialize + Send + 'static;

    fn validate(_params: &Self::Params) -> Result<(), ControlError> {
        Ok(())
    }

    fn execute(link: &DeviceLink<'_>, params: Self::Params) -> Result<Self::Output, ControlError>;
}

/// Wire shape of every device payload: the handle id plus the command's own
/// fields at the same level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRequest<P> {
    pub handle: HandleId,
    #[serde(flatten)]
    pub params: P,
}

/// Payload of commands that take no parameters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NoParams {}

/// Adapts a [`DeviceCommand`] into a [`SessionCommand`] that resolves the
/// handle first.
pub struct Device<D>(PhantomData<fn() -> D>);

impl<D: DeviceCommand> SessionCommand for Device<D> {
    const NAME: &'static str = D::NAME;
    type Payload = DeviceRequest<D::Params>;
    type Output = D::Output;

    fn validate(payload: &Self::Payload) -> Result<(), ControlError> {
        D::validate(&payload.params)
    }

    fn execute(
        ctx: &HardwareContext,
        payload: Self::Payload,
    ) -> Result<Self::Output, ControlError> {
        let handle = ctx.handles().lookup(payload.handle)?;
        let link = DeviceLink::new(&handle, ctx.device_timeout());
        D::execute(&link, payload.params)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Device link
// ────────────────────────────────────────────────────────────────────────────

/// Bounded-timeout access to one module handle.
pub struct DeviceLink<'a> {
    handle: &'a ModuleHandle,
    timeout: Duration,
}

impl<'a> DeviceLink<'a> {
    pub fn new(handle: &'a ModuleHandle, timeout: Duration) -> Self {
        Self { handle, timeout }
    }

    pub fn module_name(&self) -> String {
        self.handle.descriptor().to_string()
    }

    /// Send `command` and return the module's raw answer.
    ///
    /// An answer that arrives after the device timeout is discarded and
    /// reported as [`ControlError::NotResponding`].
    pub fn send(&self, command: BusCommand) -> Result<BusResponse, ControlError> {
        if interrupt::is_interrupted() {
            return Err(translate_fault(&self.module_name(), BusFault::Interrupted));
        }
        debug!(command = command.name(), module = %self.handle.descriptor(), "bus command");
        let started = Instant::now();
        let response = self
            .handle
            .send(&command, self.timeout)
            .map_err(|fault| translate_fault(&self.module_name(), fault))?;
        if started.elapsed() > self.timeout {
            return Err(ControlError::NotResponding {
                module: self.module_name(),
            });
        }
        Ok(response)
    }

    /// Send a command that only needs to be acknowledged.
    pub fn ack(&self, command: BusCommand) -> Result<(), ControlError> {
        self.send(command).map(|_| ())
    }

    /// Send a command that answers with a single register value.
    pub fn value(&self, command: BusCommand) -> Result<i32, ControlError> {
        match self.send(command)? {
            BusResponse::Value(v) => Ok(v),
            other => Err(self.unexpected(&other)),
        }
    }

    /// Send a command that answers with a byte buffer.
    pub fn bytes(&self, command: BusCommand) -> Result<Vec<u8>, ControlError> {
        match self.send(command)? {
            BusResponse::Bytes(data) => Ok(data),
            other => Err(self.unexpected(&other)),
        }
    }

    pub(crate) fn unexpected(&self, response: &BusResponse) -> ControlError {
        ControlError::Internal(format!(
            "module {} sent an unexpected response: {response:?}",
            self.module_name()
        ))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Router
// ────────────────────────────────────────────────────────────────────────────

type Handler =
    Box<dyn Fn(&ManualControlSession, Value) -> Result<Value, ControlError> + Send + Sync>;

/// Command-name keyed table of type-erased commands.
#[derive(Default)]
pub struct Router {
    routes: HashMap<&'static str, Handler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session-level command under [`SessionCommand::NAME`].
    pub fn register<S: SessionCommand>(&mut self) -> &mut Self {
        let handler: Handler = Box::new(|session: &ManualControlSession, payload: Value| {
            let payload: S::Payload = decode(payload)?;
            S::validate(&payload)?;
            let output = session.run(false, move |ctx| S::execute(ctx, payload))?;
            serde_json::to_value(output).map_err(|e| {
                ControlError::Internal(format!("failed to encode {} result: {e}", S::NAME))
            })
        });
        self.routes.insert(S::NAME, handler);
        self
    }

    /// Register a device-level command under [`DeviceCommand::NAME`].
    pub fn register_device<D: DeviceCommand>(&mut self) -> &mut Self {
        self.register::<Device<D>>()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.routes.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Decode `payload`, run the command named `name` and encode its result.
    pub fn dispatch(
        &self,
        session: &ManualControlSession,
        name: &str,
        payload: Value,
    ) -> Result<Value, ControlError> {
        let handler = self
            .routes
            .get(name)
            .ok_or_else(|| ControlError::invalid("command", format!("unknown command '{name}'")))?;
        debug!(command = name, "dispatching manual-control command");
        handler(session, payload)
    }
}

fn decode<P: DeserializeOwned>(payload: Value) -> Result<P, ControlError> {
    let payload = if payload.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        payload
    };
    serde_json::from_value(payload).map_err(|e| ControlError::invalid("payload", e.to_string()))
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mancon_types::bus::FaultCode;

    #[test]
    fn bookkeeping_nacks_read_as_not_responding() {
        for code in [
            FaultCode::ABANDONED_WAITING_FOR_ACK,
            FaultCode::ABANDONED_WAITING_FOR_RESPONSE,
        ] {
            let err = translate_fault("DQ1/2", BusFault::Nack(code));
            assert!(matches!(err, ControlError::NotResponding { .. }), "{err}");
        }
    }

    #[test]
    fn safety_veto_reads_as_unauthorized() {
        let err = translate_fault("DQ1/2", BusFault::Nack(FaultCode::SAFETY_VETO));
        assert!(matches!(err, ControlError::Unauthorized(_)));
    }

    #[test]
    fn other_nacks_keep_their_raw_code() {
        let err = translate_fault("DQ1/2", BusFault::Nack(FaultCode::I2C_TIMEOUT_SDA_STUCK));
        assert_eq!(
            err,
            ControlError::BusFault {
                module: "DQ1/2".into(),
                code: 0x2a
            }
        );
    }

    #[test]
    fn link_faults_and_interrupts() {
        assert!(matches!(
            translate_fault("m", BusFault::Disconnected("unplugged".into())),
            ControlError::NotResponding { .. }
        ));
        assert!(matches!(
            translate_fault("m", BusFault::Closed),
            ControlError::NotResponding { .. }
        ));
        assert!(matches!(
            translate_fault("m", BusFault::Interrupted),
            ControlError::SessionEnded(_)
        ));
    }

    #[test]
    fn raised_interrupt_stops_a_device_link_before_the_bus() {
        use crate::commands::testing::{TIMEOUT, sim_handle};
        use mancon_kernel::InterruptFlag;

        let (module, handle) = sim_handle();
        let link = DeviceLink::new(&handle, TIMEOUT);
        let flag = InterruptFlag::new();
        let _installed = flag.install();
        flag.raise();

        let err = link.send(BusCommand::GetBulkInputData).unwrap_err();
        assert!(matches!(err, ControlError::SessionEnded(_)), "{err}");
        assert!(module.sent_commands().is_empty());
    }

    #[test]
    fn device_request_flattens_params() {
        #[derive(Debug, Deserialize)]
        struct Params {
            motor: u8,
        }
        let req: DeviceRequest<Params> =
            serde_json::from_value(serde_json::json!({"handle": 3, "motor": 1})).unwrap();
        assert_eq!(req.handle, 3);
        assert_eq!(req.params.motor, 1);

        let bare: DeviceRequest<NoParams> = decode(serde_json::json!({"handle": 0})).unwrap();
        assert_eq!(bare.handle, 0);
    }

    #[test]
    fn null_payload_decodes_as_empty_object() {
        let _: NoParams = decode(Value::Null).unwrap();
        let err = decode::<DeviceRequest<NoParams>>(Value::Null).unwrap_err();
        assert!(
            matches!(err, ControlError::InvalidParameter { ref field, .. } if field == "payload")
        );
    }
}
