//! Embedded IMU commands.

use mancon_types::ControlError;
use mancon_types::bus::Orientation;

use crate::context::HardwareContext;
use crate::dispatch::{NoParams, Router, SessionCommand};

pub fn register(router: &mut Router) {
    router.register::<InitImu>().register::<GetImuOrientation>();
}

pub struct InitImu;

impl SessionCommand for InitImu {
    const NAME: &'static str = "initImu";
    type Payload = NoParams;
    type Output = ();

    fn execute(ctx: &HardwareContext, _: NoParams) -> Result<(), ControlError> {
        ctx.init_imu()
    }
}

pub struct GetImuOrientation;

impl SessionCommand for GetImuOrientation {
    const NAME: &'static str = "getImuOrientation";
    type Payload = NoParams;
    type Output = Orientation;

    fn execute(ctx: &HardwareContext, _: NoParams) -> Result<Orientation, ControlError> {
        ctx.with_imu(|imu, timeout| imu.orientation(timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use mancon_hal::sim::SimTransport;
    use std::sync::Arc;

    #[test]
    fn orientation_comes_from_the_initialised_imu() {
        let transport = Arc::new(SimTransport::new());
        let ctx = HardwareContext::new(transport.clone(), BridgeConfig::default());
        let level = Orientation {
            yaw: 0.5,
            pitch: -0.1,
            roll: 0.0,
        };
        transport.sim_imu().set_orientation(level);

        assert!(GetImuOrientation::execute(&ctx, NoParams {}).is_err());
        InitImu::execute(&ctx, NoParams {}).unwrap();
        assert!(transport.sim_imu().is_initialized());
        assert_eq!(GetImuOrientation::execute(&ctx, NoParams {}).unwrap(), level);
    }
}
