//! Swope secondary-mirror focuser

use crate::config::FocuserConfig;
use crate::error::{TcsError, TcsResult};
use crate::event::DeviceEvent;
use crate::link::PolledDevice;
use crate::status::fields;
use std::ops::RangeInclusive;
use tracing::info;

pub struct SwopeFocuser {
    device: PolledDevice,
    range: RangeInclusive<i32>,
}

impl SwopeFocuser {
    pub fn new(device: PolledDevice, config: &FocuserConfig) -> Self {
        Self {
            device,
            range: config.min_position..=config.max_position,
        }
    }

    /// Allowed encoder positions
    pub fn range(&self) -> RangeInclusive<i32> {
        self.range.clone()
    }

    pub async fn position(&mut self) -> TcsResult<i32> {
        let raw = self.device.i64_field(fields::FOCUS_POS).await?;
        i32::try_from(raw).map_err(|_| {
            TcsError::MalformedResponse(format!("focus position {} out of range", raw))
        })
    }

    /// Move to an absolute position
    pub async fn move_to(&mut self, position: i32) -> TcsResult<()> {
        if !self.range.contains(&position) {
            return Err(TcsError::InvalidFocusPosition {
                position,
                min: *self.range.start(),
                max: *self.range.end(),
            });
        }

        info!(position, "Moving focuser");
        self.device.link().set_focus(position).await?;
        self.device.publish(DeviceEvent::FocuserMoveBegin { target: position });

        self.device.status(true).await?;
        let reached = self.position().await?;
        self.device
            .publish(DeviceEvent::FocuserMoveComplete { position: reached });
        Ok(())
    }

    /// Move `steps` towards lower positions
    pub async fn move_in(&mut self, steps: i32) -> TcsResult<()> {
        let current = self.position().await?;
        self.move_to(current.saturating_sub(steps)).await
    }

    /// Move `steps` towards higher positions
    pub async fn move_out(&mut self, steps: i32) -> TcsResult<()> {
        let current = self.position().await?;
        self.move_to(current.saturating_add(steps)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::event::{drain, EventBus};
    use crate::sim::SimulatedTcs;
    use std::sync::Arc;
    use std::time::Duration;

    fn focuser(tcs: &Arc<SimulatedTcs>) -> (SwopeFocuser, Arc<EventBus>) {
        let events = Arc::new(EventBus::default());
        let device = PolledDevice::with_clock(
            "focuser",
            tcs.clone(),
            events.clone(),
            Duration::from_secs(1),
            Arc::new(ManualClock::new()),
        );
        (SwopeFocuser::new(device, &FocuserConfig::default()), events)
    }

    #[tokio::test]
    async fn test_move_to_publishes_events() {
        let tcs = Arc::new(SimulatedTcs::new());
        let (mut focuser, events) = focuser(&tcs);
        let mut rx = events.subscribe();

        focuser.move_to(25000).await.unwrap();
        assert_eq!(focuser.position().await.unwrap(), 25000);
        assert_eq!(
            drain(&mut rx),
            vec![
                DeviceEvent::FocuserMoveBegin { target: 25000 },
                DeviceEvent::FocuserMoveComplete { position: 25000 },
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_move_publishes_nothing() {
        let tcs = Arc::new(SimulatedTcs::new());
        let (mut focuser, events) = focuser(&tcs);
        let mut rx = events.subscribe();

        tcs.reject_commands(true);
        assert!(matches!(
            focuser.move_to(25000).await,
            Err(TcsError::CommandRejected(_))
        ));
        assert!(drain(&mut rx).is_empty());
        assert_eq!(tcs.state().focus, 24000);
    }

    #[tokio::test]
    async fn test_range_limits() {
        let tcs = Arc::new(SimulatedTcs::new());
        let (mut focuser, _events) = focuser(&tcs);
        assert_eq!(focuser.range(), 20000..=28000);

        focuser.move_to(20000).await.unwrap();
        focuser.move_to(28000).await.unwrap();
        assert!(matches!(
            focuser.move_to(28001).await,
            Err(TcsError::InvalidFocusPosition { position: 28001, min: 20000, max: 28000 })
        ));
        assert!(focuser.move_to(19999).await.is_err());
        assert_eq!(tcs.state().focus, 28000);
    }

    #[tokio::test]
    async fn test_relative_moves() {
        let tcs = Arc::new(SimulatedTcs::new());
        let (mut focuser, _events) = focuser(&tcs);

        focuser.move_out(500).await.unwrap();
        assert_eq!(tcs.state().focus, 24500);
        focuser.move_in(1500).await.unwrap();
        assert_eq!(tcs.state().focus, 23000);

        // Relative moves past the limit are rejected, not clamped
        assert!(focuser.move_in(5000).await.is_err());
        assert_eq!(tcs.state().focus, 23000);
    }
}
