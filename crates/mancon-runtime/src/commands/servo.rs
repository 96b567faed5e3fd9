//! Servo commands.

use mancon_types::ControlError;
use mancon_types::bus::BusCommand;
use serde::{Deserialize, Serialize};

use super::{SERVO_PORTS, check_port};
use crate::dispatch::{DeviceCommand, DeviceLink, Router};

pub fn register(router: &mut Router) {
    router
        .register_device::<SetServoConfiguration>()
        .register_device::<SetServoPulseWidth>()
        .register_device::<SetServoEnable>();
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServoConfigParams {
    pub servo: u8,
    pub frame_period_us: u16,
}

pub struct SetServoConfiguration;

impl DeviceCommand for SetServoConfiguration {
    const NAME: &'static str = "setServoConfiguration";
    type Params = ServoConfigParams;
    type Output = ();

    fn validate(p: &ServoConfigParams) -> Result<(), ControlError> {
        check_port("servo", p.servo, SERVO_PORTS)?;
        if p.frame_period_us == 0 {
            return Err(ControlError::invalid("framePeriodUs", "must be positive"));
        }
        Ok(())
    }

    fn execute(link: &DeviceLink<'_>, p: ServoConfigParams) -> Result<(), ControlError> {
        link.ack(BusCommand::SetServoConfiguration {
            servo: p.servo,
            frame_period_us: p.frame_period_us,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServoPulseParams {
    pub servo: u8,
    pub pulse_width_us: u16,
}

pub struct SetServoPulseWidth;

impl DeviceCommand for SetServoPulseWidth {
    const NAME: &'static str = "setServoPulseWidth";
    type Params = ServoPulseParams;
    type Output = ();

    fn validate(p: &ServoPulseParams) -> Result<(), ControlError> {
        check_port("servo", p.servo, SERVO_PORTS)
    }

    fn execute(link: &DeviceLink<'_>, p: ServoPulseParams) -> Result<(), ControlError> {
        link.ack(BusCommand::SetServoPulseWidth {
            servo: p.servo,
            pulse_width_us: p.pulse_width_us,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ServoEnableParams {
    pub servo: u8,
    pub enabled: bool,
}

pub struct SetServoEnable;

impl DeviceCommand for SetServoEnable {
    const NAME: &'static str = "setServoEnable";
    type Params = ServoEnableParams;
    type Output = ();

    fn validate(p: &ServoEnableParams) -> Result<(), ControlError> {
        check_port("servo", p.servo, SERVO_PORTS)
    }

    fn execute(link: &DeviceLink<'_>, p: ServoEnableParams) -> Result<(), ControlError> {
        link.ack(BusCommand::SetServoEnable {
            servo: p.servo,
            enabled: p.enabled,
        })
    }
}
