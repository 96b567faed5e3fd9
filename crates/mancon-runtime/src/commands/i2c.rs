//! I2C bus commands.

use mancon_types::ControlError;
use mancon_types::bus::{BusCommand, I2cSpeed};
use serde::{Deserialize, Serialize};

use super::{I2C_BUSES, I2C_MAX_TRANSFER, check_port};
use crate::dispatch::{DeviceCommand, DeviceLink, Router};

const MAX_7BIT_ADDRESS: u8 = 0x7f;

pub fn register(router: &mut Router) {
    router
        .register_device::<ConfigureI2c>()
        .register_device::<I2cWrite>()
        .register_device::<I2cRead>();
}

fn check_address(address: u8) -> Result<(), ControlError> {
    if address > MAX_7BIT_ADDRESS {
        return Err(ControlError::invalid(
            "address",
            format!("{address:#04x} is not a 7-bit address"),
        ));
    }
    Ok(())
}

fn check_length(field: &str, len: usize) -> Result<(), ControlError> {
    if len == 0 || len > I2C_MAX_TRANSFER {
        return Err(ControlError::invalid(
            field,
            format!("transfer of {len} bytes is outside 1..={I2C_MAX_TRANSFER}"),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfigureParams {
    pub bus: u8,
    #[serde(default)]
    pub speed: I2cSpeed,
}

pub struct ConfigureI2c;

impl DeviceCommand for ConfigureI2c {
    const NAME: &'static str = "configureI2c";
    type Params = ConfigureParams;
    type Output = ();

    fn validate(p: &ConfigureParams) -> Result<(), ControlError> {
        check_port("bus", p.bus, I2C_BUSES)
    }

    fn execute(link: &DeviceLink<'_>, p: ConfigureParams) -> Result<(), ControlError> {
        link.ack(BusCommand::ConfigureI2c {
            bus: p.bus,
            speed: p.speed,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteParams {
    pub bus: u8,
    pub address: u8,
    pub data: Vec<u8>,
}

pub struct I2cWrite;

impl DeviceCommand for I2cWrite {
    const NAME: &'static str = "i2cWrite";
    type Params = WriteParams;
    type Output = ();

    fn validate(p: &WriteParams) -> Result<(), ControlError> {
        check_port("bus", p.bus, I2C_BUSES)?;
        check_address(p.address)?;
        check_length("data", p.data.len())
    }

    fn execute(link: &DeviceLink<'_>, p: WriteParams) -> Result<(), ControlError> {
        link.ack(BusCommand::I2cWrite {
            bus: p.bus,
            address: p.address,
            data: p.data,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReadParams {
    pub bus: u8,
    pub address: u8,
    /// Register to read from; a plain read when absent.
    #[serde(default)]
    pub register: Option<u8>,
    pub length: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResult {
    pub data: Vec<u8>,
}

pub struct I2cRead;

impl DeviceCommand for I2cRead {
    const NAME: &'static str = "i2cRead";
    type Params = ReadParams;
    type Output = ReadResult;

    fn validate(p: &ReadParams) -> Result<(), ControlError> {
        check_port("bus", p.bus, I2C_BUSES)?;
        check_address(p.address)?;
        check_length("length", usize::from(p.length))
    }

    fn execute(link: &DeviceLink<'_>, p: ReadParams) -> Result<ReadResult, ControlError> {
        let data = link.bytes(BusCommand::I2cRead {
            bus: p.bus,
            address: p.address,
            register: p.register,
            length: p.length,
        })?;
        Ok(ReadResult { data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eight_bit_addresses_are_rejected() {
        let p = WriteParams { bus: 0, address: 0x80, data: vec![1] };
        let err = I2cWrite::validate(&p).unwrap_err();
        assert!(
            matches!(err, ControlError::InvalidParameter { ref field, .. } if field == "address")
        );
    }

    #[test]
    fn transfers_are_bounded() {
        let p = WriteParams { bus: 0, address: 0x28, data: vec![0; I2C_MAX_TRANSFER + 1] };
        assert!(I2cWrite::validate(&p).is_err());
        let p = WriteParams { bus: 0, address: 0x28, data: Vec::new() };
        assert!(I2cWrite::validate(&p).is_err());

        let read = ReadParams { bus: 3, address: 0x28, register: Some(0x10), length: 100 };
        assert!(I2cRead::validate(&read).is_ok());
        let read = ReadParams { length: 101, ..read };
        assert!(I2cRead::validate(&read).is_err());
    }

    #[test]
    fn speed_defaults_to_standard() {
        let p: ConfigureParams = serde_json::from_value(serde_json::json!({"bus": 1})).unwrap();
        assert_eq!(p.speed, I2cSpeed::Standard100k);
    }
}
