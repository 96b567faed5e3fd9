//! Digital I/O commands.

use mancon_types::ControlError;
use mancon_types::bus::BusCommand;
use serde::{Deserialize, Serialize};

use super::{DIGITAL_PINS, check_port};
use crate::dispatch::{DeviceCommand, DeviceLink, Router};

pub fn register(router: &mut Router) {
    router
        .register_device::<SetDigitalDirection>()
        .register_device::<SetDigitalOutput>()
        .register_device::<GetDigitalInput>();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DirectionParams {
    pub pin: u8,
    pub direction: Direction,
}

pub struct SetDigitalDirection;

impl DeviceCommand for SetDigitalDirection {
    const NAME: &'static str = "setDigitalDirection";
    type Params = DirectionParams;
    type Output = ();

    fn validate(p: &DirectionParams) -> Result<(), ControlError> {
        check_port("pin", p.pin, DIGITAL_PINS)
    }

    fn execute(link: &DeviceLink<'_>, p: DirectionParams) -> Result<(), ControlError> {
        link.ack(BusCommand::SetDigitalDirection {
            pin: p.pin,
            output: p.direction == Direction::Output,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OutputParams {
    pub pin: u8,
    pub value: bool,
}

pub struct SetDigitalOutput;

impl DeviceCommand for SetDigitalOutput {
    const NAME: &'static str = "setDigitalOutput";
    type Params = OutputParams;
    type Output = ();

    fn validate(p: &OutputParams) -> Result<(), ControlError> {
        check_port("pin", p.pin, DIGITAL_PINS)
    }

    fn execute(link: &DeviceLink<'_>, p: OutputParams) -> Result<(), ControlError> {
        link.ack(BusCommand::SetDigitalOutput {
            pin: p.pin,
            high: p.value,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PinRef {
    pub pin: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinLevel {
    pub value: bool,
}

pub struct GetDigitalInput;

impl DeviceCommand for GetDigitalInput {
    const NAME: &'static str = "getDigitalInput";
    type Params = PinRef;
    type Output = PinLevel;

    fn validate(p: &PinRef) -> Result<(), ControlError> {
        check_port("pin", p.pin, DIGITAL_PINS)
    }

    fn execute(link: &DeviceLink<'_>, p: PinRef) -> Result<PinLevel, ControlError> {
        let level = link.value(BusCommand::GetDigitalInput { pin: p.pin })?;
        Ok(PinLevel { value: level != 0 })
    }
}
