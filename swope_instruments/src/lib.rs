//! Swope telescope instruments
//!
//! Device wrappers for the Swope telescope at Las Campanas: telescope, dome,
//! focuser, rotator, tube fans, dome lamp, CCD camera and weather station.
//!
//! ## Features
//!
//! - Time-windowed status cache shared by every TCS-backed device
//! - Quadrant readout assembly through `swope_imaging`
//! - Broadcast event bus for slew, move, exposure and readout lifecycles
//! - In-memory TCS and CCD controllers for dry runs

pub mod cache;
pub mod camera;
pub mod config;
mod dome;
pub mod error;
pub mod event;
mod fan;
mod focuser;
mod lamp;
pub mod link;
pub mod logging;
mod rotator;
pub mod sim;
pub mod status;
mod telescope;
pub mod weather;

pub use cache::{Clock, ManualClock, StatusCache, StatusSource, SystemClock};
pub use camera::{CcdLink, ImageRequest, ImageType, SavedImage, SwopeCamera};
pub use config::{ConfigError, SwopeConfig};
pub use dome::SwopeDome;
pub use error::{CameraError, TcsError, TcsResult, WeatherError};
pub use event::{DeviceEvent, EventBus, OperationStatus, SwopeEvent};
pub use fan::SwopeFan;
pub use focuser::SwopeFocuser;
pub use lamp::SwopeLamp;
pub use link::{DomeShutter, PolledDevice, TcsLink, TcsStatusSource};
pub use rotator::SwopeRotator;
pub use sim::{SimulatedCcd, SimulatedTcs, SimulatedTcsState};
pub use status::{StatusSnapshot, StatusValue};
pub use telescope::SwopeTelescope;
pub use weather::{HttpWeatherApi, SwopeWeatherStation, WeatherApi, WeatherKind, WeatherSummary};
