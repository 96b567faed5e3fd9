//! Opening and closing hubs, plus the bulk input snapshot.

use mancon_types::bus::{BulkInputData, BusCommand, BusResponse};
use mancon_types::{ControlError, HandleId, ModuleDescriptor};
use serde::{Deserialize, Serialize};

use crate::context::HardwareContext;
use crate::dispatch::{DeviceCommand, DeviceLink, NoParams, Router, SessionCommand};

pub fn register(router: &mut Router) {
    router
        .register::<OpenHub>()
        .register::<CloseHub>()
        .register_device::<GetBulkInputData>();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleRef {
    pub handle: HandleId,
}

/// Open a new handle to a module.  Opening the same module twice yields two
/// independent handles.
pub struct OpenHub;

impl SessionCommand for OpenHub {
    const NAME: &'static str = "openHub";
    type Payload = ModuleDescriptor;
    type Output = HandleRef;

    fn validate(payload: &ModuleDescriptor) -> Result<(), ControlError> {
        if payload.serial.trim().is_empty() {
            return Err(ControlError::invalid("serial", "must not be empty"));
        }
        if payload.module_address == 0 {
            return Err(ControlError::invalid("moduleAddress", "0 is the broadcast address"));
        }
        if payload.parent_address == Some(0) {
            return Err(ControlError::invalid("parentAddress", "0 is the broadcast address"));
        }
        Ok(())
    }

    fn execute(
        ctx: &HardwareContext,
        payload: ModuleDescriptor,
    ) -> Result<HandleRef, ControlError> {
        let handle = ctx.open_module(&payload)?;
        Ok(HandleRef { handle })
    }
}

/// Close a handle.  Closing an unknown or already-closed id succeeds.
pub struct CloseHub;

impl SessionCommand for CloseHub {
    const NAME: &'static str = "closeHub";
    type Payload = HandleRef;
    type Output = ();

    fn execute(ctx: &HardwareContext, payload: HandleRef) -> Result<(), ControlError> {
        ctx.handles().close(payload.handle);
        Ok(())
    }
}

pub struct GetBulkInputData;

impl DeviceCommand for GetBulkInputData {
    const NAME: &'static str = "getBulkInputData";
    type Params = NoParams;
    type Output = BulkInputData;

    fn execute(link: &DeviceLink<'_>, _: NoParams) -> Result<BulkInputData, ControlError> {
        match link.send(BusCommand::GetBulkInputData)? {
            BusResponse::BulkInput(data) => Ok(data),
            other => Err(link.unexpected(&other)),
        }
    }
}
