//! Swope telescope tube fans

use crate::error::TcsResult;
use crate::link::PolledDevice;
use crate::status::fields;
use tracing::info;

pub struct SwopeFan {
    device: PolledDevice,
}

impl SwopeFan {
    pub fn new(device: PolledDevice) -> Self {
        Self { device }
    }

    pub async fn switch_on(&mut self) -> TcsResult<()> {
        info!("Switching tube fans on");
        self.device.link().set_tubefans(true).await
    }

    pub async fn switch_off(&mut self) -> TcsResult<()> {
        info!("Switching tube fans off");
        self.device.link().set_tubefans(false).await
    }

    pub async fn is_switched_on(&mut self) -> TcsResult<bool> {
        self.device.bool_field(fields::TUBE_FANS).await
    }
}
