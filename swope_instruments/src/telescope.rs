//! Swope telescope wrapper
//!
//! Pointing and tracking state come from the cached TCS status. Offsets,
//! tracking and slew stop go straight to the TCS link.

use crate::error::{TcsError, TcsResult};
use crate::event::{DeviceEvent, OperationStatus};
use crate::link::PolledDevice;
use crate::status::fields;
use tracing::{info, warn};

/// Hours to degrees
const DEGREES_PER_HOUR: f64 = 15.0;

pub struct SwopeTelescope {
    device: PolledDevice,
}

impl SwopeTelescope {
    pub fn new(device: PolledDevice) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &PolledDevice {
        &self.device
    }

    /// Altitude in degrees
    pub async fn alt(&mut self) -> TcsResult<f64> {
        self.device.f64_field(fields::ALT).await
    }

    /// Azimuth in degrees
    pub async fn az(&mut self) -> TcsResult<f64> {
        self.device.f64_field(fields::AZI).await
    }

    /// Right ascension in hours, as reported by the TCS
    pub async fn ra(&mut self) -> TcsResult<f64> {
        self.device.f64_field(fields::RA_ICRS).await
    }

    pub async fn ra_degrees(&mut self) -> TcsResult<f64> {
        Ok(self.ra().await? * DEGREES_PER_HOUR)
    }

    /// Declination in degrees
    pub async fn dec(&mut self) -> TcsResult<f64> {
        self.device.f64_field(fields::DEC_ICRS).await
    }

    /// `(ra hours, dec degrees)` from a single snapshot
    pub async fn position_ra_dec(&mut self) -> TcsResult<(f64, f64)> {
        let status = self.device.status(false).await?;
        Ok((status.get_f64(fields::RA_ICRS)?, status.get_f64(fields::DEC_ICRS)?))
    }

    /// `(alt, az)` in degrees from a single snapshot
    pub async fn position_alt_az(&mut self) -> TcsResult<(f64, f64)> {
        let status = self.device.status(false).await?;
        Ok((status.get_f64(fields::ALT)?, status.get_f64(fields::AZI)?))
    }

    pub async fn is_tracking(&mut self) -> TcsResult<bool> {
        self.device.bool_field(fields::TRACKING).await
    }

    pub async fn is_slewing(&mut self) -> TcsResult<bool> {
        self.device.bool_field(fields::SLEWING).await
    }

    /// The mount reports parked until its init sequence has run
    pub async fn is_parked(&mut self) -> TcsResult<bool> {
        self.device.bool_field(fields::INIT_DONE).await
    }

    pub async fn start_tracking(&mut self) -> TcsResult<()> {
        self.device.link().set_track(true).await?;
        info!("Telescope tracking started");
        self.device.publish(DeviceEvent::TrackingStarted);
        Ok(())
    }

    pub async fn stop_tracking(&mut self) -> TcsResult<()> {
        self.device.link().set_track(false).await?;
        info!("Telescope tracking stopped");
        self.device.publish(DeviceEvent::TrackingStopped);
        Ok(())
    }

    /// Offset the pointing by `ha` and `dec` arcseconds
    pub async fn set_offset(&mut self, ha: f64, dec: f64) -> TcsResult<()> {
        let (ra_start, dec_start) = self.position_ra_dec().await?;
        self.device.publish(DeviceEvent::SlewBegin {
            ra: ra_start,
            dec: dec_start,
        });

        info!(ha, dec, "Offsetting telescope");
        if let Err(e) = self.device.link().set_offset(ha, dec).await {
            warn!("Telescope offset failed: {}", e);
            self.device.publish(DeviceEvent::SlewComplete {
                ra: ra_start,
                dec: dec_start,
                status: OperationStatus::Error,
            });
            return Err(e);
        }

        self.device.status(true).await?;
        let (ra, dec) = self.position_ra_dec().await?;
        self.device.publish(DeviceEvent::SlewComplete {
            ra,
            dec,
            status: OperationStatus::Ok,
        });
        Ok(())
    }

    pub async fn move_east(&mut self, offset: f64) -> TcsResult<()> {
        self.set_offset(offset, 0.0).await
    }

    pub async fn move_west(&mut self, offset: f64) -> TcsResult<()> {
        self.set_offset(-offset, 0.0).await
    }

    pub async fn move_north(&mut self, offset: f64) -> TcsResult<()> {
        self.set_offset(0.0, offset).await
    }

    pub async fn move_south(&mut self, offset: f64) -> TcsResult<()> {
        self.set_offset(0.0, -offset).await
    }

    /// The TCS link has no goto command; slews are run from the TCS console
    pub async fn slew_to_ra_dec(&mut self, _ra: f64, _dec: f64) -> TcsResult<()> {
        Err(TcsError::Unsupported("slew to RA/Dec".to_string()))
    }

    pub async fn slew_to_alt_az(&mut self, _alt: f64, _az: f64) -> TcsResult<()> {
        Err(TcsError::Unsupported("slew to Alt/Az".to_string()))
    }

    pub async fn abort_slew(&mut self) -> TcsResult<()> {
        self.device.link().set_slew_stop().await?;
        warn!("Telescope slew aborted");

        self.device.status(true).await?;
        let (ra, dec) = self.position_ra_dec().await?;
        self.device.publish(DeviceEvent::SlewComplete {
            ra,
            dec,
            status: OperationStatus::Aborted,
        });
        Ok(())
    }
}
