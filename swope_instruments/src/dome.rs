//! Swope dome wrapper

use crate::error::TcsResult;
use crate::link::{DomeShutter, PolledDevice};
use crate::status::fields;
use tracing::info;

pub struct SwopeDome {
    device: PolledDevice,
}

impl SwopeDome {
    pub fn new(device: PolledDevice) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &PolledDevice {
        &self.device
    }

    pub async fn open_shutter(&mut self) -> TcsResult<()> {
        info!("Opening dome shutter");
        self.device.link().set_dome_shutter(DomeShutter::Open).await
    }

    pub async fn close_shutter(&mut self) -> TcsResult<()> {
        info!("Closing dome shutter");
        self.device.link().set_dome_shutter(DomeShutter::Close).await
    }

    /// Let the dome follow the telescope
    pub async fn track(&mut self) -> TcsResult<()> {
        self.device.link().set_dome_auto(true).await
    }

    /// Hold the dome at its current azimuth
    pub async fn stand(&mut self) -> TcsResult<()> {
        self.device.link().set_dome_auto(false).await
    }

    pub async fn is_tracking(&mut self) -> TcsResult<bool> {
        self.device.bool_field(fields::DOME_AUTO).await
    }

    pub async fn az(&mut self) -> TcsResult<f64> {
        self.device.f64_field(fields::DOME_AZ).await
    }

    /// Not reported by the TCS status
    pub fn is_slit_open(&self) -> Option<bool> {
        None
    }

    /// Not reported by the TCS status
    pub fn is_slewing(&self) -> Option<bool> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::event::EventBus;
    use crate::sim::SimulatedTcs;
    use std::sync::Arc;
    use std::time::Duration;

    fn dome(tcs: &Arc<SimulatedTcs>, clock: &ManualClock) -> SwopeDome {
        SwopeDome::new(PolledDevice::with_clock(
            "dome",
            tcs.clone(),
            Arc::new(EventBus::default()),
            Duration::from_secs(1),
            Arc::new(clock.clone()),
        ))
    }

    #[tokio::test]
    async fn test_shutter_commands() {
        let tcs = Arc::new(SimulatedTcs::new());
        let mut dome = dome(&tcs, &ManualClock::new());

        dome.open_shutter().await.unwrap();
        assert!(tcs.state().shutter_open);
        dome.close_shutter().await.unwrap();
        assert!(!tcs.state().shutter_open);
        assert_eq!(
            tcs.commands(),
            vec!["set_dome_shutter(Open)", "set_dome_shutter(Close)"]
        );
    }

    #[tokio::test]
    async fn test_tracking_reads_cached_status() {
        let tcs = Arc::new(SimulatedTcs::new());
        let clock = ManualClock::new();
        let mut dome = dome(&tcs, &clock);

        assert!(!dome.is_tracking().await.unwrap());
        dome.track().await.unwrap();

        // Still inside the refresh window: the old snapshot is served
        assert!(!dome.is_tracking().await.unwrap());

        clock.advance(Duration::from_secs(1));
        assert!(dome.is_tracking().await.unwrap());

        dome.stand().await.unwrap();
        clock.advance(Duration::from_secs(1));
        assert!(!dome.is_tracking().await.unwrap());
        assert_eq!(dome.az().await.unwrap(), 180.0);
    }

    #[test]
    fn test_unknown_states() {
        let tcs = Arc::new(SimulatedTcs::new());
        let dome = dome(&tcs, &ManualClock::new());
        assert_eq!(dome.is_slit_open(), None);
        assert_eq!(dome.is_slewing(), None);
        assert_eq!(tcs.fetch_count(), 0);
    }
}
