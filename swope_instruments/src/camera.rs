//! Swope CCD camera and filter wheel
//!
//! The CCD controller writes one FITS file per amplifier. A readout reads the
//! four files, assembles them into a single frame and saves it with the
//! request's headers.

use crate::config::{expand_home, CameraConfig};
use crate::error::{CameraError, TcsError, TcsResult};
use crate::event::{DeviceEvent, EventBus, OperationStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use swope_imaging::{assemble_images, read_fits, write_fits, FitsHeader, FitsImage};
use tracing::{debug, info, warn};

/// Per-amplifier cards that are meaningless on the assembled frame
pub const QUADRANT_ONLY_KEYWORDS: &[&str] = &[
    "BIASSEC", "DATASEC", "TRIMSEC", "NOVERSCN", "NBIASLNS", "FILENAME", "CHOFFX", "CHOFFY",
    "OPAMP", "ENOISE", "NAXIS", "NAXIS1", "NAXIS2", "EXTEND",
];

/// Tolerance on the exposure time echoed back by the controller (seconds)
const EXPTIME_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    Object,
    Bias,
    Dark,
    Flat,
}

impl ImageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageType::Object => "object",
            ImageType::Bias => "bias",
            ImageType::Dark => "dark",
            ImageType::Flat => "flat",
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command surface of the Swope CCD controller client
#[async_trait]
pub trait CcdLink: Send + Sync {
    /// Returns whether the controller accepted the type
    async fn set_exposure_type(&self, image_type: ImageType) -> TcsResult<bool>;

    /// Returns the exposure time the controller actually applied
    async fn set_exposure_time(&self, seconds: f64) -> TcsResult<f64>;

    async fn start_exposure(&self) -> TcsResult<bool>;

    async fn is_exposing(&self) -> TcsResult<bool>;

    /// Current position of each wheel, by wheel name
    async fn wheels(&self) -> TcsResult<HashMap<String, String>>;

    async fn move_filter(&self, name: &str) -> TcsResult<()>;
}

#[derive(Debug, Clone)]
pub struct ImageRequest {
    /// Seconds
    pub exptime: f64,
    pub image_type: ImageType,
    /// Prefix of the saved file name
    pub filename: String,
    /// Cards to write; these win over cards copied from the quadrants
    pub headers: FitsHeader,
}

impl ImageRequest {
    pub fn new(exptime: f64, image_type: ImageType) -> Self {
        Self {
            exptime,
            image_type,
            filename: "swope".to_string(),
            headers: FitsHeader::new(),
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct SavedImage {
    pub path: PathBuf,
    pub width: usize,
    pub height: usize,
    pub frame_start: Option<DateTime<Utc>>,
    /// CCD temperature reported by the controller (`TEMPCCD`)
    pub frame_temperature: Option<f64>,
}

pub struct SwopeCamera {
    name: String,
    ccd: Arc<dyn CcdLink>,
    config: CameraConfig,
    events: Arc<EventBus>,
    abort: Arc<AtomicBool>,
    last_frame_start: Option<DateTime<Utc>>,
}

impl SwopeCamera {
    pub fn new(
        name: impl Into<String>,
        ccd: Arc<dyn CcdLink>,
        config: CameraConfig,
        events: Arc<EventBus>,
    ) -> Self {
        let name = name.into();
        debug!(device = %name, ccd = %config.ccd_endpoint(), "Attaching to CCD controller");
        Self {
            name,
            ccd,
            config,
            events,
            abort: Arc::new(AtomicBool::new(false)),
            last_frame_start: None,
        }
    }

    fn publish(&self, event: DeviceEvent) {
        self.events.publish(&self.name, event);
    }

    /// Handle for aborting from another task
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn abort_exposure(&self) {
        warn!("Camera abort requested");
        self.abort.store(true, Ordering::SeqCst);
    }

    /// `(width, height)` in pixels
    pub fn physical_size(&self) -> (u32, u32) {
        (self.config.ccd_width, self.config.ccd_height)
    }

    /// `(x, y)` in microns
    pub fn pixel_size(&self) -> (f64, f64) {
        (self.config.pixel_size_x, self.config.pixel_size_y)
    }

    pub fn last_frame_start(&self) -> Option<DateTime<Utc>> {
        self.last_frame_start
    }

    pub async fn filter(&self) -> TcsResult<String> {
        let mut wheels = self.ccd.wheels().await?;
        wheels
            .remove("filter")
            .ok_or_else(|| TcsError::MalformedResponse("no filter wheel reported".to_string()))
    }

    pub async fn set_filter(&self, name: &str) -> TcsResult<()> {
        info!(filter = name, "Moving filter wheel");
        self.ccd.move_filter(name).await?;
        self.publish(DeviceEvent::FilterChanged {
            filter: name.to_string(),
        });
        Ok(())
    }

    /// Run an exposure and wait for the controller to finish it
    pub async fn expose(&mut self, request: &ImageRequest) -> Result<(), CameraError> {
        self.abort.store(false, Ordering::SeqCst);
        self.publish(DeviceEvent::ExposeBegin {
            exptime: request.exptime,
        });

        let status = match self.run_exposure(request).await {
            Ok(()) if self.abort.load(Ordering::SeqCst) => OperationStatus::Aborted,
            Ok(()) => OperationStatus::Ok,
            Err(e) => {
                self.publish(DeviceEvent::ExposeComplete {
                    status: OperationStatus::Error,
                });
                return Err(e);
            }
        };

        self.publish(DeviceEvent::ExposeComplete { status });
        Ok(())
    }

    async fn run_exposure(&mut self, request: &ImageRequest) -> Result<(), CameraError> {
        if !self.ccd.set_exposure_type(request.image_type).await? {
            return Err(CameraError::Rejected("exposure type"));
        }

        let applied = self.ccd.set_exposure_time(request.exptime).await?;
        if (applied - request.exptime).abs() >= EXPTIME_TOLERANCE {
            return Err(CameraError::ExposureTimeMismatch {
                requested: request.exptime,
                applied,
            });
        }

        self.last_frame_start = Some(Utc::now());
        if !self.ccd.start_exposure().await? {
            return Err(CameraError::Rejected("start exposure"));
        }
        info!(
            exptime = request.exptime,
            image_type = %request.image_type,
            "Exposure started"
        );

        // The controller gives no readout signal; assume readout once exptime has elapsed
        let started = Instant::now();
        let mut readout_started = false;
        while self.ccd.is_exposing().await? {
            if !readout_started && started.elapsed().as_secs_f64() > request.exptime {
                readout_started = true;
                self.publish(DeviceEvent::ReadoutBegin);
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
        Ok(())
    }

    /// Assemble the quadrant files of the last exposure and save the frame.
    ///
    /// Returns `None` if the exposure was aborted before the frame was saved.
    pub async fn readout(&mut self, request: &ImageRequest) -> Result<Option<SavedImage>, CameraError> {
        self.publish(DeviceEvent::ReadoutBegin);

        let links: Vec<PathBuf> = self.config.fits_links.iter().map(|p| expand_home(p.as_path())).collect();
        let Ok(links) = <[PathBuf; 4]>::try_from(links) else {
            return Err(CameraError::QuadrantCount(self.config.fits_links.len()));
        };

        let frame_start = self.last_frame_start;
        let target = self.output_path(request, frame_start);
        let headers = request.headers.clone();
        let exptime = request.exptime;
        let image_type = request.image_type;
        let abort = Arc::clone(&self.abort);

        let result = tokio::task::spawn_blocking(move || -> Result<Option<SavedImage>, CameraError> {
            let (image, quadrant_header) = read_quadrants(&links)?;
            let header = frame_header(headers, &quadrant_header, frame_start, exptime, image_type);

            if abort.load(Ordering::SeqCst) {
                return Ok(None);
            }

            if let Some(dir) = target.parent() {
                std::fs::create_dir_all(dir).map_err(|e| CameraError::Save {
                    path: target.clone(),
                    source: e.into(),
                })?;
            }
            write_fits(&target, &image, &header).map_err(|source| CameraError::Save {
                path: target.clone(),
                source,
            })?;

            Ok(Some(SavedImage {
                path: target,
                width: image.width(),
                height: image.height(),
                frame_start,
                frame_temperature: quadrant_header.get_float("TEMPCCD"),
            }))
        })
        .await
        .map_err(|e| CameraError::Task(e.to_string()))?;

        match result {
            Ok(Some(saved)) => {
                info!(path = %saved.path.display(), "Image saved");
                self.publish(DeviceEvent::ReadoutComplete {
                    path: Some(saved.path.clone()),
                    status: OperationStatus::Ok,
                });
                Ok(Some(saved))
            }
            Ok(None) => {
                warn!("Readout aborted");
                self.publish(DeviceEvent::ReadoutComplete {
                    path: None,
                    status: OperationStatus::Aborted,
                });
                Ok(None)
            }
            Err(e) => {
                self.publish(DeviceEvent::ReadoutComplete {
                    path: None,
                    status: OperationStatus::Error,
                });
                Err(e)
            }
        }
    }

    /// Expose, then read out
    pub async fn take_image(&mut self, request: &ImageRequest) -> Result<Option<SavedImage>, CameraError> {
        self.expose(request).await?;
        if self.abort.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.readout(request).await
    }

    fn output_path(&self, request: &ImageRequest, frame_start: Option<DateTime<Utc>>) -> PathBuf {
        let stamp = frame_start.unwrap_or_else(Utc::now).format("%Y%m%dT%H%M%S%.3f");
        expand_home(&self.config.image_dir).join(format!("{}-{}.fits", request.filename, stamp))
    }
}

/// Read the quadrant files, ordered Q4 Q3 Q2 Q1, and assemble them trimmed.
/// Returns the frame and the Q1 header.
fn read_quadrants(links: &[PathBuf; 4]) -> Result<(FitsImage, FitsHeader), CameraError> {
    let read = |path: &PathBuf| {
        read_fits(path).map_err(|source| CameraError::Quadrant {
            path: path.clone(),
            source,
        })
    };

    let (q4, _) = read(&links[0])?;
    let (q3, _) = read(&links[1])?;
    let (q2, _) = read(&links[2])?;
    let (q1, header) = read(&links[3])?;
    debug!(shape = ?q1.shape(), "Quadrants read");

    let image = assemble_images(&q4, &q3, &q2, &q1, Some(&header), true)?;
    Ok((image, header))
}

fn frame_header(
    mut headers: FitsHeader,
    quadrant: &FitsHeader,
    frame_start: Option<DateTime<Utc>>,
    exptime: f64,
    image_type: ImageType,
) -> FitsHeader {
    let mut quadrant = quadrant.clone();
    for keyword in QUADRANT_ONLY_KEYWORDS {
        quadrant.remove(keyword);
    }
    headers.merge_missing(&quadrant);

    if let Some(start) = frame_start {
        headers.set_string("DATE-OBS", &start.format("%Y-%m-%dT%H:%M:%S%.3f").to_string());
    }
    headers.set_float("EXPTIME", exptime);
    headers.set_string("IMAGETYP", image_type.as_str());
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::drain;
    use crate::sim::SimulatedCcd;
    use ndarray::Array2;
    use std::path::Path;

    fn quadrant_header(datasec: &str) -> FitsHeader {
        let mut header = FitsHeader::new();
        header.set_string("DATASEC", datasec);
        header.set_string("BIASSEC", "[5:6,1:3]");
        header.set_string("OPAMP", "1");
        header.set_float("EGAIN", 1.04);
        header.set_float("TEMPCCD", -100.5);
        header.set_string("OBJECT", "from-controller");
        header
    }

    /// Write four 3x6 U16 quadrants, each filled with its channel number,
    /// with overscan columns set to 9999
    fn write_quadrants(dir: &Path) -> Vec<PathBuf> {
        let mut links = Vec::new();
        for (n, fill) in [(1u16, 4u16), (2, 3), (3, 2), (4, 1)] {
            let mut data = Array2::<u16>::from_elem((3, 6), fill);
            data.column_mut(4).fill(9999);
            data.column_mut(5).fill(9999);
            let path = dir.join(format!("ccdc{}.fits", n));
            write_fits(&path, &FitsImage::U16(data), &quadrant_header("[1:4,1:3]")).unwrap();
            links.push(path);
        }
        links
    }

    fn make_camera(dir: &Path, ccd: Arc<SimulatedCcd>) -> (SwopeCamera, Arc<EventBus>) {
        let config = CameraConfig {
            fits_links: write_quadrants(dir),
            image_dir: dir.join("images"),
            poll_interval_ms: 5,
            ..Default::default()
        };
        let events = Arc::new(EventBus::default());
        (SwopeCamera::new("camera", ccd, config, events.clone()), events)
    }

    #[tokio::test]
    async fn test_expose_publishes_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let ccd = Arc::new(SimulatedCcd::new(3));
        let (mut camera, events) = make_camera(dir.path(), ccd.clone());
        let mut rx = events.subscribe();

        camera
            .expose(&ImageRequest::new(0.001, ImageType::Dark))
            .await
            .unwrap();

        assert_eq!(ccd.exposure_count(), 1);
        assert_eq!(ccd.image_type(), Some(ImageType::Dark));
        assert!(camera.last_frame_start().is_some());
        assert_eq!(
            drain(&mut rx),
            vec![
                DeviceEvent::ExposeBegin { exptime: 0.001 },
                DeviceEvent::ReadoutBegin,
                DeviceEvent::ExposeComplete { status: OperationStatus::Ok },
            ]
        );
    }

    #[tokio::test]
    async fn test_expose_rejects_bad_acknowledgements() {
        let dir = tempfile::tempdir().unwrap();

        let ccd = Arc::new(SimulatedCcd::new(0));
        ccd.reject_exposure_type(true);
        let (mut camera, _events) = make_camera(dir.path(), ccd.clone());
        assert!(matches!(
            camera.expose(&ImageRequest::new(1.0, ImageType::Object)).await,
            Err(CameraError::Rejected("exposure type"))
        ));
        assert_eq!(ccd.exposure_count(), 0);

        let ccd = Arc::new(SimulatedCcd::new(0).with_time_skew(0.5));
        let (mut camera, events) = make_camera(dir.path(), ccd.clone());
        let mut rx = events.subscribe();
        assert!(matches!(
            camera.expose(&ImageRequest::new(1.0, ImageType::Object)).await,
            Err(CameraError::ExposureTimeMismatch { requested, applied })
                if requested == 1.0 && applied == 1.5
        ));
        assert_eq!(
            drain(&mut rx).last(),
            Some(&DeviceEvent::ExposeComplete { status: OperationStatus::Error })
        );
    }

    #[tokio::test]
    async fn test_readout_assembles_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let ccd = Arc::new(SimulatedCcd::new(1));
        let (mut camera, events) = make_camera(dir.path(), ccd);
        let mut rx = events.subscribe();

        let mut request = ImageRequest::new(0.0, ImageType::Flat).with_filename("flat");
        request.headers.set_string("OBJECT", "skyflat");
        camera.expose(&request).await.unwrap();
        let saved = camera.readout(&request).await.unwrap().unwrap();

        assert!(saved.path.starts_with(dir.path().join("images")));
        assert_eq!((saved.height, saved.width), (8, 6));
        assert_eq!(saved.frame_temperature, Some(-100.5));

        let (image, header) = read_fits(&saved.path).unwrap();
        let FitsImage::U16(data) = image else {
            panic!("expected u16 frame");
        };
        assert_eq!(data.dim(), (8, 6));
        assert!(data.iter().all(|&v| v != 9999));

        for keyword in ["DATASEC", "BIASSEC", "OPAMP"] {
            assert!(!header.contains(keyword), "{} should be stripped", keyword);
        }
        assert_eq!(header.get_string("OBJECT"), Some("skyflat"));
        assert_eq!(header.get_float("EGAIN"), Some(1.04));
        assert_eq!(header.get_float("EXPTIME"), Some(0.0));
        assert_eq!(header.get_string("IMAGETYP"), Some("flat"));
        assert!(header.contains("DATE-OBS"));

        assert!(matches!(
            drain(&mut rx).last(),
            Some(DeviceEvent::ReadoutComplete { path: Some(_), status: OperationStatus::Ok })
        ));
    }

    #[tokio::test]
    async fn test_readout_honours_abort() {
        let dir = tempfile::tempdir().unwrap();
        let ccd = Arc::new(SimulatedCcd::new(0));
        let (mut camera, events) = make_camera(dir.path(), ccd);
        let mut rx = events.subscribe();

        camera.abort_exposure();
        let saved = camera
            .readout(&ImageRequest::new(1.0, ImageType::Object))
            .await
            .unwrap();

        assert!(saved.is_none());
        assert!(!dir.path().join("images").exists());
        assert_eq!(
            drain(&mut rx).last(),
            Some(&DeviceEvent::ReadoutComplete { path: None, status: OperationStatus::Aborted })
        );
    }

    #[tokio::test]
    async fn test_readout_missing_quadrant() {
        let dir = tempfile::tempdir().unwrap();
        let ccd = Arc::new(SimulatedCcd::new(0));
        let (mut camera, _events) = make_camera(dir.path(), ccd);
        std::fs::remove_file(dir.path().join("ccdc3.fits")).unwrap();

        let err = camera
            .readout(&ImageRequest::new(1.0, ImageType::Object))
            .await
            .unwrap_err();
        assert!(matches!(err, CameraError::Quadrant { path, .. } if path.ends_with("ccdc3.fits")));
    }

    #[tokio::test]
    async fn test_filter_wheel() {
        let dir = tempfile::tempdir().unwrap();
        let ccd = Arc::new(SimulatedCcd::new(0));
        let (camera, events) = make_camera(dir.path(), ccd);
        let mut rx = events.subscribe();

        assert_eq!(camera.filter().await.unwrap(), "B");
        camera.set_filter("i").await.unwrap();
        assert_eq!(camera.filter().await.unwrap(), "i");
        assert_eq!(
            drain(&mut rx),
            vec![DeviceEvent::FilterChanged { filter: "i".to_string() }]
        );
        assert!(camera.set_filter("Halpha").await.is_err());
    }

    #[test]
    fn test_sizes_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let (camera, _events) = make_camera(dir.path(), Arc::new(SimulatedCcd::new(0)));
        assert_eq!(camera.physical_size(), (4112, 4096));
        assert_eq!(camera.pixel_size(), (15.0, 15.0));
    }
}
