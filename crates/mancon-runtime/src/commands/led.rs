//! Status LED commands.

use mancon_types::ControlError;
use mancon_types::bus::{BusCommand, LedStep};
use serde::{Deserialize, Serialize};

use super::LED_PATTERN_MAX_STEPS;
use crate::dispatch::{DeviceCommand, DeviceLink, Router};

pub fn register(router: &mut Router) {
    router
        .register_device::<SetLedColor>()
        .register_device::<SetLedPattern>();
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ColorParams {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

pub struct SetLedColor;

impl DeviceCommand for SetLedColor {
    const NAME: &'static str = "setLedColor";
    type Params = ColorParams;
    type Output = ();

    fn execute(link: &DeviceLink<'_>, p: ColorParams) -> Result<(), ControlError> {
        link.ack(BusCommand::SetLedColor {
            red: p.red,
            green: p.green,
            blue: p.blue,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternParams {
    pub steps: Vec<LedStep>,
}

/// Replace the module's blink pattern.  An empty pattern turns the LED off.
pub struct SetLedPattern;

impl DeviceCommand for SetLedPattern {
    const NAME: &'static str = "setLedPattern";
    type Params = PatternParams;
    type Output = ();

    fn validate(p: &PatternParams) -> Result<(), ControlError> {
        if p.steps.len() > LED_PATTERN_MAX_STEPS {
            return Err(ControlError::invalid(
                "steps",
                format!("{} steps exceed the limit of {LED_PATTERN_MAX_STEPS}", p.steps.len()),
            ));
        }
        Ok(())
    }

    fn execute(link: &DeviceLink<'_>, p: PatternParams) -> Result<(), ControlError> {
        link.ack(BusCommand::SetLedPattern { steps: p.steps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{TIMEOUT, sim_handle};

    #[test]
    fn pattern_length_is_capped() {
        let step = LedStep { red: 0, green: 0, blue: 255, duration_ms: 250 };
        assert!(SetLedPattern::validate(&PatternParams { steps: vec![step; 16] }).is_ok());
        assert!(SetLedPattern::validate(&PatternParams { steps: vec![step; 17] }).is_err());
    }

    #[test]
    fn color_is_sent_as_one_command() {
        let (module, handle) = sim_handle();
        let link = DeviceLink::new(&handle, TIMEOUT);
        let purple = ColorParams { red: 128, green: 0, blue: 255 };

        SetLedColor::execute(&link, purple).unwrap();
        assert_eq!(module.led(), (128, 0, 255));
        assert_eq!(
            module.sent_commands(),
            vec![BusCommand::SetLedColor { red: 128, green: 0, blue: 255 }]
        );
    }
}
