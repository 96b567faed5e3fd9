//! Device command families.
//!
//! Each submodule declares the payload and result shapes of a handful of
//! commands and the range checks that guard them.  Everything else, from
//! handle lookup to fault translation, comes from [`crate::dispatch`].

pub mod analog;
pub mod digital;
pub mod hub;
pub mod i2c;
pub mod imu;
pub mod led;
pub mod log;
pub mod motor;
pub mod servo;

use mancon_types::ControlError;

use crate::dispatch::Router;

pub const MOTOR_PORTS: u8 = 4;
pub const SERVO_PORTS: u8 = 6;
pub const DIGITAL_PINS: u8 = 8;
pub const ANALOG_CHANNELS: u8 = 4;
pub const I2C_BUSES: u8 = 4;
/// Largest payload one I2C transaction may carry.
pub const I2C_MAX_TRANSFER: usize = 100;
pub const LED_PATTERN_MAX_STEPS: usize = 16;

/// Reject a zero-based port index outside `0..count`.
pub(crate) fn check_port(field: &str, value: u8, count: u8) -> Result<(), ControlError> {
    if value < count {
        Ok(())
    } else {
        Err(ControlError::invalid(
            field,
            format!("{value} is out of range 0..={}", count - 1),
        ))
    }
}

/// A router with every manual-control command registered.
pub fn router() -> Router {
    let mut router = Router::new();
    hub::register(&mut router);
    motor::register(&mut router);
    servo::register(&mut router);
    digital::register(&mut router);
    analog::register(&mut router);
    i2c::register(&mut router);
    led::register(&mut router);
    log::register(&mut router);
    imu::register(&mut router);
    router
}
