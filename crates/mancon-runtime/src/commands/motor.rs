//! Motor commands.

use mancon_types::ControlError;
use mancon_types::bus::{BusCommand, MotorMode, ZeroPowerBehavior};
use serde::{Deserialize, Serialize};

use super::{MOTOR_PORTS, check_port};
use crate::dispatch::{DeviceCommand, DeviceLink, Router};

pub fn register(router: &mut Router) {
    router
        .register_device::<SetMotorMode>()
        .register_device::<SetMotorEnable>()
        .register_device::<SetMotorPower>()
        .register_device::<SetMotorTargetVelocity>()
        .register_device::<SetMotorTargetPosition>()
        .register_device::<ResetMotorEncoder>()
        .register_device::<GetMotorEncoder>()
        .register_device::<GetMotorCurrent>();
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MotorRef {
    pub motor: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotorModeParams {
    pub motor: u8,
    pub mode: MotorMode,
    #[serde(default)]
    pub zero_power_behavior: ZeroPowerBehavior,
}

pub struct SetMotorMode;

impl DeviceCommand for SetMotorMode {
    const NAME: &'static str = "setMotorMode";
    type Params = MotorModeParams;
    type Output = ();

    fn validate(p: &MotorModeParams) -> Result<(), ControlError> {
        check_port("motor", p.motor, MOTOR_PORTS)
    }

    fn execute(link: &DeviceLink<'_>, p: MotorModeParams) -> Result<(), ControlError> {
        link.ack(BusCommand::SetMotorMode {
            motor: p.motor,
            mode: p.mode,
            zero_power: p.zero_power_behavior,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MotorEnableParams {
    pub motor: u8,
    pub enabled: bool,
}

pub struct SetMotorEnable;

impl DeviceCommand for SetMotorEnable {
    const NAME: &'static str = "setMotorEnable";
    type Params = MotorEnableParams;
    type Output = ();

    fn validate(p: &MotorEnableParams) -> Result<(), ControlError> {
        check_port("motor", p.motor, MOTOR_PORTS)
    }

    fn execute(link: &DeviceLink<'_>, p: MotorEnableParams) -> Result<(), ControlError> {
        link.ack(BusCommand::SetMotorEnable {
            motor: p.motor,
            enabled: p.enabled,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MotorPowerParams {
    pub motor: u8,
    /// Fraction of full power, `-1.0..=1.0`.
    pub power: f64,
}

pub struct SetMotorPower;

impl DeviceCommand for SetMotorPower {
    const NAME: &'static str = "setMotorPower";
    type Params = MotorPowerParams;
    type Output = ();

    fn validate(p: &MotorPowerParams) -> Result<(), ControlError> {
        check_port("motor", p.motor, MOTOR_PORTS)?;
        if !(-1.0..=1.0).contains(&p.power) {
            return Err(ControlError::invalid(
                "power",
                format!("{} is outside -1.0..=1.0", p.power),
            ));
        }
        Ok(())
    }

    fn execute(link: &DeviceLink<'_>, p: MotorPowerParams) -> Result<(), ControlError> {
        link.ack(BusCommand::SetMotorPower {
            motor: p.motor,
            power: p.power,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotorVelocityParams {
    pub motor: u8,
    pub ticks_per_second: i16,
}

pub struct SetMotorTargetVelocity;

impl DeviceCommand for SetMotorTargetVelocity {
    const NAME: &'static str = "setMotorTargetVelocity";
    type Params = MotorVelocityParams;
    type Output = ();

    fn validate(p: &MotorVelocityParams) -> Result<(), ControlError> {
        check_port("motor", p.motor, MOTOR_PORTS)
    }

    fn execute(link: &DeviceLink<'_>, p: MotorVelocityParams) -> Result<(), ControlError> {
        link.ack(BusCommand::SetMotorTargetVelocity {
            motor: p.motor,
            ticks_per_second: p.ticks_per_second,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MotorPositionParams {
    pub motor: u8,
    pub position: i32,
    /// Acceptable distance from `position`, in encoder ticks.
    pub tolerance: u16,
}

pub struct SetMotorTargetPosition;

impl DeviceCommand for SetMotorTargetPosition {
    const NAME: &'static str = "setMotorTargetPosition";
    type Params = MotorPositionParams;
    type Output = ();

    fn validate(p: &MotorPositionParams) -> Result<(), ControlError> {
        check_port("motor", p.motor, MOTOR_PORTS)
    }

    fn execute(link: &DeviceLink<'_>, p: MotorPositionParams) -> Result<(), ControlError> {
        link.ack(BusCommand::SetMotorTargetPosition {
            motor: p.motor,
            position: p.position,
            tolerance: p.tolerance,
        })
    }
}

pub struct ResetMotorEncoder;

impl DeviceCommand for ResetMotorEncoder {
    const NAME: &'static str = "resetMotorEncoder";
    type Params = MotorRef;
    type Output = ();

    fn validate(p: &MotorRef) -> Result<(), ControlError> {
        check_port("motor", p.motor, MOTOR_PORTS)
    }

    fn execute(link: &DeviceLink<'_>, p: MotorRef) -> Result<(), ControlError> {
        link.ack(BusCommand::ResetMotorEncoder { motor: p.motor })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderReading {
    pub position: i32,
}

pub struct GetMotorEncoder;

impl DeviceCommand for GetMotorEncoder {
    const NAME: &'static str = "getMotorEncoder";
    type Params = MotorRef;
    type Output = EncoderReading;

    fn validate(p: &MotorRef) -> Result<(), ControlError> {
        check_port("motor", p.motor, MOTOR_PORTS)
    }

    fn execute(link: &DeviceLink<'_>, p: MotorRef) -> Result<EncoderReading, ControlError> {
        let position = link.value(BusCommand::GetMotorEncoder { motor: p.motor })?;
        Ok(EncoderReading { position })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentReading {
    pub milliamps: i32,
}

pub struct GetMotorCurrent;

impl DeviceCommand for GetMotorCurrent {
    const NAME: &'static str = "getMotorCurrent";
    type Params = MotorRef;
    type Output = CurrentReading;

    fn validate(p: &MotorRef) -> Result<(), ControlError> {
        check_port("motor", p.motor, MOTOR_PORTS)
    }

    fn execute(link: &DeviceLink<'_>, p: MotorRef) -> Result<CurrentReading, ControlError> {
        let milliamps = link.value(BusCommand::GetMotorCurrent { motor: p.motor })?;
        Ok(CurrentReading { milliamps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{TIMEOUT, sim_handle};

    #[test]
    fn power_must_be_a_unit_fraction() {
        let ok = MotorPowerParams { motor: 0, power: -1.0 };
        assert!(SetMotorPower::validate(&ok).is_ok());

        for power in [1.01, -3.0, f64::NAN] {
            let err = SetMotorPower::validate(&MotorPowerParams { motor: 0, power }).unwrap_err();
            assert!(
                matches!(err, ControlError::InvalidParameter { ref field, .. } if field == "power")
            );
        }
    }

    #[test]
    fn motor_port_is_range_checked() {
        assert!(GetMotorEncoder::validate(&MotorRef { motor: 4 }).is_err());
        assert!(GetMotorEncoder::validate(&MotorRef { motor: 3 }).is_ok());
    }

    #[test]
    fn zero_power_behavior_defaults_to_brake() {
        let raw = serde_json::json!({"motor": 1, "mode": "runUsingEncoder"});
        let p: MotorModeParams = serde_json::from_value(raw).unwrap();
        assert_eq!(p.zero_power_behavior, ZeroPowerBehavior::Brake);
        assert_eq!(p.mode, MotorMode::RunUsingEncoder);
    }

    #[test]
    fn power_and_encoder_commands_hit_the_bus_once_each() {
        let (module, handle) = sim_handle();
        module.set_encoder(2, 1440);
        let link = DeviceLink::new(&handle, TIMEOUT);

        SetMotorPower::execute(&link, MotorPowerParams { motor: 2, power: -0.25 }).unwrap();
        let reading = GetMotorEncoder::execute(&link, MotorRef { motor: 2 }).unwrap();
        assert_eq!(reading, EncoderReading { position: 1440 });
        assert_eq!(
            module.sent_commands(),
            vec![
                BusCommand::SetMotorPower { motor: 2, power: -0.25 },
                BusCommand::GetMotorEncoder { motor: 2 },
            ]
        );
    }
}
