//! Typed commands exchanged with a hardware module over the bus transport.
//!
//! The transport owns the wire encoding; these types only fix *what* can be
//! asked of a module and what comes back.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw NACK code reported by a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaultCode(pub u8);

impl FaultCode {
    pub const PARAM_OUT_OF_RANGE: FaultCode = FaultCode(0x00);
    pub const I2C_MASTER_BUSY: FaultCode = FaultCode(0x26);
    pub const I2C_NO_RESULTS_PENDING: FaultCode = FaultCode(0x28);
    pub const I2C_TIMEOUT_SDA_STUCK: FaultCode = FaultCode(0x2a);
    pub const MOTOR_NOT_CONFIGURED: FaultCode = FaultCode(0x33);
    /// The module refused the command to keep its outputs safe (e.g. battery
    /// too low to drive a motor or servo).
    pub const SAFETY_VETO: FaultCode = FaultCode(0x3c);
    pub const UNSUPPORTED_COMMAND: FaultCode = FaultCode(0xfc);
    /// Bookkeeping code: the transport stopped waiting for the ACK.
    pub const ABANDONED_WAITING_FOR_ACK: FaultCode = FaultCode(0xfd);
    /// Bookkeeping code: the transport stopped waiting for the response.
    pub const ABANDONED_WAITING_FOR_RESPONSE: FaultCode = FaultCode(0xfe);

    /// Codes the transport uses for its own bookkeeping rather than a module
    /// verdict.
    pub fn is_bookkeeping(self) -> bool {
        self == Self::ABANDONED_WAITING_FOR_ACK || self == Self::ABANDONED_WAITING_FOR_RESPONSE
    }

    pub fn is_safety_veto(self) -> bool {
        self == Self::SAFETY_VETO
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MotorMode {
    /// Open-loop constant power.
    RunWithoutEncoder,
    /// Closed-loop velocity control.
    RunUsingEncoder,
    /// Closed-loop position control.
    RunToPosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ZeroPowerBehavior {
    #[default]
    Brake,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum I2cSpeed {
    #[default]
    Standard100k,
    Fast400k,
}

/// One step of an LED blink pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedStep {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub duration_ms: u16,
}

/// A request to one module.
#[derive(Debug, Clone, PartialEq)]
pub enum BusCommand {
    SetMotorMode {
        motor: u8,
        mode: MotorMode,
        zero_power: ZeroPowerBehavior,
    },
    SetMotorEnable {
        motor: u8,
        enabled: bool,
    },
    SetMotorPower {
        motor: u8,
        power: f64,
    },
    SetMotorTargetVelocity {
        motor: u8,
        ticks_per_second: i16,
    },
    SetMotorTargetPosition {
        motor: u8,
        position: i32,
        tolerance: u16,
    },
    ResetMotorEncoder {
        motor: u8,
    },
    GetMotorEncoder {
        motor: u8,
    },
    GetMotorCurrent {
        motor: u8,
    },
    SetServoConfiguration {
        servo: u8,
        frame_period_us: u16,
    },
    SetServoPulseWidth {
        servo: u8,
        pulse_width_us: u16,
    },
    SetServoEnable {
        servo: u8,
        enabled: bool,
    },
    SetDigitalDirection {
        pin: u8,
        output: bool,
    },
    SetDigitalOutput {
        pin: u8,
        high: bool,
    },
    GetDigitalInput {
        pin: u8,
    },
    GetAnalogInput {
        channel: u8,
    },
    ConfigureI2c {
        bus: u8,
        speed: I2cSpeed,
    },
    I2cWrite {
        bus: u8,
        address: u8,
        data: Vec<u8>,
    },
    I2cRead {
        bus: u8,
        address: u8,
        register: Option<u8>,
        length: u8,
    },
    SetLedColor {
        red: u8,
        green: u8,
        blue: u8,
    },
    SetLedPattern {
        steps: Vec<LedStep>,
    },
    InjectLogHint {
        hint: String,
    },
    SetDebugLogLevel {
        group: String,
        verbosity: u8,
    },
    GetBulkInputData,
}

impl BusCommand {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            BusCommand::SetMotorMode { .. } => "set_motor_mode",
            BusCommand::SetMotorEnable { .. } => "set_motor_enable",
            BusCommand::SetMotorPower { .. } => "set_motor_power",
            BusCommand::SetMotorTargetVelocity { .. } => "set_motor_target_velocity",
            BusCommand::SetMotorTargetPosition { .. } => "set_motor_target_position",
            BusCommand::ResetMotorEncoder { .. } => "reset_motor_encoder",
            BusCommand::GetMotorEncoder { .. } => "get_motor_encoder",
            BusCommand::GetMotorCurrent { .. } => "get_motor_current",
            BusCommand::SetServoConfiguration { .. } => "set_servo_configuration",
            BusCommand::SetServoPulseWidth { .. } => "set_servo_pulse_width",
            BusCommand::SetServoEnable { .. } => "set_servo_enable",
            BusCommand::SetDigitalDirection { .. } => "set_digital_direction",
            BusCommand::SetDigitalOutput { .. } => "set_digital_output",
            BusCommand::GetDigitalInput { .. } => "get_digital_input",
            BusCommand::GetAnalogInput { .. } => "get_analog_input",
            BusCommand::ConfigureI2c { .. } => "configure_i2c",
            BusCommand::I2cWrite { .. } => "i2c_write",
            BusCommand::I2cRead { .. } => "i2c_read",
            BusCommand::SetLedColor { .. } => "set_led_color",
            BusCommand::SetLedPattern { .. } => "set_led_pattern",
            BusCommand::InjectLogHint { .. } => "inject_log_hint",
            BusCommand::SetDebugLogLevel { .. } => "set_debug_log_level",
            BusCommand::GetBulkInputData => "get_bulk_input_data",
        }
    }
}

/// Snapshot of every input on a module, read in one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkInputData {
    /// Bit `n` is the level of digital pin `n`.
    pub digital_inputs: u8,
    pub encoder_positions: [i32; 4],
    pub encoder_velocities: [i16; 4],
    /// Bit `n` set when motor `n` is at its target.
    pub motor_at_target: u8,
    pub analog_millivolts: [i16; 4],
}

/// What a module answered.
#[derive(Debug, Clone, PartialEq)]
pub enum BusResponse {
    Ack,
    Value(i32),
    Bytes(Vec<u8>),
    BulkInput(BulkInputData),
}

/// Orientation reported by the embedded IMU, in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Orientation {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bookkeeping_codes_are_recognised() {
        assert!(FaultCode::ABANDONED_WAITING_FOR_ACK.is_bookkeeping());
        assert!(FaultCode::ABANDONED_WAITING_FOR_RESPONSE.is_bookkeeping());
        assert!(!FaultCode::I2C_MASTER_BUSY.is_bookkeeping());
        assert!(FaultCode::SAFETY_VETO.is_safety_veto());
    }

    #[test]
    fn motor_mode_uses_camel_case() {
        let mode: MotorMode = serde_json::from_str("\"runToPosition\"").unwrap();
        assert_eq!(mode, MotorMode::RunToPosition);
    }
}
