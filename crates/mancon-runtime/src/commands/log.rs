//! Module-side debug logging.

use mancon_types::ControlError;
use mancon_types::bus::BusCommand;
use serde::{Deserialize, Serialize};

use crate::dispatch::{DeviceCommand, DeviceLink, Router};

pub const LOG_HINT_MAX_LEN: usize = 100;
pub const MAX_VERBOSITY: u8 = 3;

pub fn register(router: &mut Router) {
    router
        .register_device::<InjectLogHint>()
        .register_device::<SetDebugLogLevel>();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintParams {
    pub hint: String,
}

/// Write a marker into the module's own log.
pub struct InjectLogHint;

impl DeviceCommand for InjectLogHint {
    const NAME: &'static str = "injectLogHint";
    type Params = HintParams;
    type Output = ();

    fn validate(p: &HintParams) -> Result<(), ControlError> {
        if p.hint.is_empty() || p.hint.len() > LOG_HINT_MAX_LEN {
            return Err(ControlError::invalid(
                "hint",
                format!("must be 1..={LOG_HINT_MAX_LEN} bytes"),
            ));
        }
        Ok(())
    }

    fn execute(link: &DeviceLink<'_>, p: HintParams) -> Result<(), ControlError> {
        link.ack(BusCommand::InjectLogHint { hint: p.hint })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelParams {
    pub group: String,
    pub verbosity: u8,
}

pub struct SetDebugLogLevel;

impl DeviceCommand for SetDebugLogLevel {
    const NAME: &'static str = "setDebugLogLevel";
    type Params = LevelParams;
    type Output = ();

    fn validate(p: &LevelParams) -> Result<(), ControlError> {
        if p.group.is_empty() {
            return Err(ControlError::invalid("group", "must not be empty"));
        }
        if p.verbosity > MAX_VERBOSITY {
            return Err(ControlError::invalid(
                "verbosity",
                format!("{} is outside 0..={MAX_VERBOSITY}", p.verbosity),
            ));
        }
        Ok(())
    }

    fn execute(link: &DeviceLink<'_>, p: LevelParams) -> Result<(), ControlError> {
        link.ack(BusCommand::SetDebugLogLevel {
            group: p.group,
            verbosity: p.verbosity,
        })
    }
}
