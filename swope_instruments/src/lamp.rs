//! Swope dome flat-field lights

use crate::error::TcsResult;
use crate::link::PolledDevice;
use crate::status::fields;
use tracing::info;

pub struct SwopeLamp {
    device: PolledDevice,
}

impl SwopeLamp {
    pub fn new(device: PolledDevice) -> Self {
        Self { device }
    }

    pub async fn switch_on(&mut self) -> TcsResult<()> {
        info!("Switching dome lights on");
        self.device.link().set_domelight(true).await
    }

    pub async fn switch_off(&mut self) -> TcsResult<()> {
        info!("Switching dome lights off");
        self.device.link().set_domelight(false).await
    }

    pub async fn is_switched_on(&mut self) -> TcsResult<bool> {
        self.device.bool_field(fields::DOME_LIGHTS).await
    }
}
