//! Analog input.

use mancon_types::ControlError;
use mancon_types::bus::BusCommand;
use serde::{Deserialize, Serialize};

use super::{ANALOG_CHANNELS, check_port};
use crate::dispatch::{DeviceCommand, DeviceLink, Router};

pub fn register(router: &mut Router) {
    router.register_device::<GetAnalogInput>();
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChannelRef {
    pub channel: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalogReading {
    pub millivolts: i32,
}

pub struct GetAnalogInput;

impl DeviceCommand for GetAnalogInput {
    const NAME: &'static str = "getAnalogInput";
    type Params = ChannelRef;
    type Output = AnalogReading;

    fn validate(p: &ChannelRef) -> Result<(), ControlError> {
        check_port("channel", p.channel, ANALOG_CHANNELS)
    }

    fn execute(link: &DeviceLink<'_>, p: ChannelRef) -> Result<AnalogReading, ControlError> {
        let millivolts = link.value(BusCommand::GetAnalogInput { channel: p.channel })?;
        Ok(AnalogReading { millivolts })
    }
}
