//! TCS link and the status-backed device base
//!
//! `TcsLink` is the command surface of the Swope TCS client. Wire framing is
//! owned by the vendor client; this crate only depends on the trait.

use crate::cache::{Clock, StatusCache, StatusSource, SystemClock};
use crate::config::TcsConfig;
use crate::error::{TcsError, TcsResult};
use crate::event::{DeviceEvent, EventBus};
use crate::status::StatusSnapshot;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomeShutter {
    Open,
    Close,
}

#[async_trait]
pub trait TcsLink: Send + Sync {
    /// Full status in one call
    async fn get_status(&self) -> TcsResult<StatusSnapshot>;

    async fn set_track(&self, enabled: bool) -> TcsResult<()>;

    /// Offset the pointing by `ha` and `dec` arcseconds
    async fn set_offset(&self, ha: f64, dec: f64) -> TcsResult<()>;

    async fn set_slew_stop(&self) -> TcsResult<()>;

    async fn set_dome_shutter(&self, shutter: DomeShutter) -> TcsResult<()>;

    async fn set_dome_auto(&self, enabled: bool) -> TcsResult<()>;

    async fn set_tubefans(&self, on: bool) -> TcsResult<()>;

    async fn set_domelight(&self, on: bool) -> TcsResult<()>;

    async fn set_focus(&self, position: i32) -> TcsResult<()>;
}

/// Adapts a shared link to the cache's fetch interface
#[derive(Clone)]
pub struct TcsStatusSource {
    link: Arc<dyn TcsLink>,
}

impl TcsStatusSource {
    pub fn new(link: Arc<dyn TcsLink>) -> Self {
        Self { link }
    }
}

#[async_trait]
impl StatusSource for TcsStatusSource {
    type Snapshot = StatusSnapshot;
    type Error = TcsError;

    async fn fetch_status(&self) -> TcsResult<StatusSnapshot> {
        self.link.get_status().await
    }
}

pub type TcsStatusCache = StatusCache<TcsStatusSource>;

/// What every TCS-backed wrapper is built from: a name, the shared link,
/// its own status cache and the event bus.
pub struct PolledDevice {
    name: String,
    link: Arc<dyn TcsLink>,
    status: TcsStatusCache,
    events: Arc<EventBus>,
}

impl PolledDevice {
    pub fn new(
        name: impl Into<String>,
        link: Arc<dyn TcsLink>,
        events: Arc<EventBus>,
        config: &TcsConfig,
    ) -> Self {
        let name = name.into();
        debug!(device = %name, tcs = config.endpoint(), "Attaching to TCS");
        Self::with_clock(
            name,
            link,
            events,
            config.refresh_interval(),
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(
        name: impl Into<String>,
        link: Arc<dyn TcsLink>,
        events: Arc<EventBus>,
        refresh_interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let source = TcsStatusSource::new(Arc::clone(&link));
        Self {
            name: name.into(),
            link,
            status: StatusCache::with_clock(source, refresh_interval, clock),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn link(&self) -> &dyn TcsLink {
        self.link.as_ref()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn cache(&self) -> &TcsStatusCache {
        &self.status
    }

    pub async fn status(&mut self, force: bool) -> TcsResult<Arc<StatusSnapshot>> {
        self.status.get_status(force).await
    }

    pub async fn f64_field(&mut self, field: &str) -> TcsResult<f64> {
        self.status(false).await?.get_f64(field)
    }

    pub async fn i64_field(&mut self, field: &str) -> TcsResult<i64> {
        self.status(false).await?.get_i64(field)
    }

    pub async fn bool_field(&mut self, field: &str) -> TcsResult<bool> {
        self.status(false).await?.get_bool(field)
    }

    pub fn publish(&self, event: DeviceEvent) -> u64 {
        self.events.publish(&self.name, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::sim::SimulatedTcs;
    use crate::status::fields;

    #[tokio::test]
    async fn test_fields_share_one_fetch() {
        let tcs = Arc::new(SimulatedTcs::new());
        let clock = ManualClock::new();
        let mut device = PolledDevice::with_clock(
            "telescope",
            tcs.clone(),
            Arc::new(EventBus::default()),
            Duration::from_secs(1),
            Arc::new(clock.clone()),
        );

        device.f64_field(fields::ALT).await.unwrap();
        device.f64_field(fields::AZI).await.unwrap();
        device.bool_field(fields::TRACKING).await.unwrap();
        assert_eq!(tcs.fetch_count(), 1);

        clock.advance(Duration::from_secs(1));
        device.f64_field(fields::ALT).await.unwrap();
        assert_eq!(tcs.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_fetch_error_surfaces_to_caller() {
        let tcs = Arc::new(SimulatedTcs::new());
        tcs.fail_next_fetches(1);
        let mut device = PolledDevice::new(
            "dome",
            tcs.clone(),
            Arc::new(EventBus::default()),
            &TcsConfig::default(),
        );

        let err = device.f64_field(fields::DOME_AZ).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(device.f64_field(fields::DOME_AZ).await.is_ok());
    }
}
