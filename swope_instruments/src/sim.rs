//! In-memory TCS and CCD controllers
//!
//! Used for dry runs and tests. Both count the calls they receive and can be
//! told to fail.

use crate::camera::{CcdLink, ImageType};
use crate::error::{TcsError, TcsResult};
use crate::link::{DomeShutter, TcsLink};
use crate::status::{fields, StatusSnapshot, StatusValue};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Mutable mount, dome and switch state behind a simulated TCS
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedTcsState {
    pub alt: f64,
    pub az: f64,
    /// Hours
    pub ra: f64,
    pub dec: f64,
    pub tracking: bool,
    pub slewing: bool,
    pub init_done: bool,
    pub focus: i32,
    pub dome_az: f64,
    pub dome_auto: bool,
    pub shutter_open: bool,
    pub tube_fans: bool,
    pub dome_lights: bool,
}

impl Default for SimulatedTcsState {
    fn default() -> Self {
        Self {
            alt: 60.0,
            az: 180.0,
            ra: 6.0,
            dec: -29.0,
            tracking: false,
            slewing: false,
            init_done: true,
            focus: 24000,
            dome_az: 180.0,
            dome_auto: false,
            shutter_open: false,
            tube_fans: false,
            dome_lights: false,
        }
    }
}

impl SimulatedTcsState {
    fn snapshot(&self) -> StatusSnapshot {
        [
            (fields::ALT, StatusValue::Float(self.alt)),
            (fields::AZI, StatusValue::Float(self.az)),
            (fields::RA_ICRS, StatusValue::Float(self.ra)),
            (fields::DEC_ICRS, StatusValue::Float(self.dec)),
            (fields::TRACKING, StatusValue::Bool(self.tracking)),
            (fields::SLEWING, StatusValue::Bool(self.slewing)),
            (fields::INIT_DONE, StatusValue::Bool(self.init_done)),
            (fields::FOCUS_POS, StatusValue::Int(self.focus as i64)),
            (fields::DOME_AZ, StatusValue::Float(self.dome_az)),
            (fields::DOME_AUTO, StatusValue::Bool(self.dome_auto)),
            (fields::TUBE_FANS, StatusValue::Bool(self.tube_fans)),
            (fields::DOME_LIGHTS, StatusValue::Bool(self.dome_lights)),
        ]
        .into_iter()
        .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct SimulatedTcs {
    state: Mutex<SimulatedTcsState>,
    commands: Mutex<Vec<String>>,
    fetches: AtomicUsize,
    failing_fetches: AtomicUsize,
    reject_commands: AtomicBool,
}

impl SimulatedTcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: SimulatedTcsState) -> Self {
        Self {
            state: Mutex::new(state),
            ..Self::default()
        }
    }

    /// Number of `get_status` calls received, failed ones included
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Make the next `n` status fetches time out
    pub fn fail_next_fetches(&self, n: usize) {
        self.failing_fetches.store(n, Ordering::SeqCst);
    }

    pub fn reject_commands(&self, reject: bool) {
        self.reject_commands.store(reject, Ordering::SeqCst);
    }

    pub fn state(&self) -> SimulatedTcsState {
        lock(&self.state).clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut SimulatedTcsState)) {
        f(&mut lock(&self.state));
    }

    /// Commands received so far, formatted as `name(args)`
    pub fn commands(&self) -> Vec<String> {
        lock(&self.commands).clone()
    }

    fn command(&self, entry: String, apply: impl FnOnce(&mut SimulatedTcsState)) -> TcsResult<()> {
        if self.reject_commands.load(Ordering::SeqCst) {
            return Err(TcsError::CommandRejected(entry));
        }
        lock(&self.commands).push(entry);
        self.update(apply);
        Ok(())
    }
}

#[async_trait]
impl TcsLink for SimulatedTcs {
    async fn get_status(&self) -> TcsResult<StatusSnapshot> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(TcsError::timeout("get_status", 5000));
        }
        Ok(lock(&self.state).snapshot())
    }

    async fn set_track(&self, enabled: bool) -> TcsResult<()> {
        self.command(format!("set_track({})", enabled), |s| s.tracking = enabled)
    }

    async fn set_offset(&self, ha: f64, dec: f64) -> TcsResult<()> {
        self.command(format!("set_offset({}, {})", ha, dec), |s| {
            s.ra += ha / 3600.0 / 15.0;
            s.dec += dec / 3600.0;
        })
    }

    async fn set_slew_stop(&self) -> TcsResult<()> {
        self.command("set_slew_stop()".to_string(), |s| s.slewing = false)
    }

    async fn set_dome_shutter(&self, shutter: DomeShutter) -> TcsResult<()> {
        self.command(format!("set_dome_shutter({:?})", shutter), |s| {
            s.shutter_open = shutter == DomeShutter::Open
        })
    }

    async fn set_dome_auto(&self, enabled: bool) -> TcsResult<()> {
        self.command(format!("set_dome_auto({})", enabled), |s| s.dome_auto = enabled)
    }

    async fn set_tubefans(&self, on: bool) -> TcsResult<()> {
        self.command(format!("set_tubefans({})", on), |s| s.tube_fans = on)
    }

    async fn set_domelight(&self, on: bool) -> TcsResult<()> {
        self.command(format!("set_domelight({})", on), |s| s.dome_lights = on)
    }

    async fn set_focus(&self, position: i32) -> TcsResult<()> {
        self.command(format!("set_focus({})", position), |s| s.focus = position)
    }
}

#[derive(Debug)]
struct CcdState {
    image_type: Option<ImageType>,
    exposure_time: f64,
    polls_remaining: usize,
    filter: String,
    filters: Vec<String>,
}

/// Simulated CCD controller. An exposure stays active for a fixed number
/// of `is_exposing` polls.
#[derive(Debug)]
pub struct SimulatedCcd {
    state: Mutex<CcdState>,
    exposing_polls: usize,
    time_skew: f64,
    reject_type: AtomicBool,
    exposures: AtomicUsize,
}

impl SimulatedCcd {
    pub fn new(exposing_polls: usize) -> Self {
        let filters: Vec<String> = ["B", "V", "g", "r", "i"].iter().map(|f| f.to_string()).collect();
        Self {
            state: Mutex::new(CcdState {
                image_type: None,
                exposure_time: 0.0,
                polls_remaining: 0,
                filter: filters[0].clone(),
                filters,
            }),
            exposing_polls,
            time_skew: 0.0,
            reject_type: AtomicBool::new(false),
            exposures: AtomicUsize::new(0),
        }
    }

    /// Report exposure times off by `skew` seconds from what was requested
    pub fn with_time_skew(mut self, skew: f64) -> Self {
        self.time_skew = skew;
        self
    }

    pub fn reject_exposure_type(&self, reject: bool) {
        self.reject_type.store(reject, Ordering::SeqCst);
    }

    pub fn exposure_count(&self) -> usize {
        self.exposures.load(Ordering::SeqCst)
    }

    pub fn image_type(&self) -> Option<ImageType> {
        lock(&self.state).image_type
    }
}

#[async_trait]
impl CcdLink for SimulatedCcd {
    async fn set_exposure_type(&self, image_type: ImageType) -> TcsResult<bool> {
        if self.reject_type.load(Ordering::SeqCst) {
            return Ok(false);
        }
        lock(&self.state).image_type = Some(image_type);
        Ok(true)
    }

    async fn set_exposure_time(&self, seconds: f64) -> TcsResult<f64> {
        let applied = seconds + self.time_skew;
        lock(&self.state).exposure_time = applied;
        Ok(applied)
    }

    async fn start_exposure(&self) -> TcsResult<bool> {
        self.exposures.fetch_add(1, Ordering::SeqCst);
        lock(&self.state).polls_remaining = self.exposing_polls;
        Ok(true)
    }

    async fn is_exposing(&self) -> TcsResult<bool> {
        let mut state = lock(&self.state);
        if state.polls_remaining == 0 {
            return Ok(false);
        }
        state.polls_remaining -= 1;
        Ok(true)
    }

    async fn wheels(&self) -> TcsResult<HashMap<String, String>> {
        let state = lock(&self.state);
        Ok(HashMap::from([("filter".to_string(), state.filter.clone())]))
    }

    async fn move_filter(&self, name: &str) -> TcsResult<()> {
        let mut state = lock(&self.state);
        if !state.filters.iter().any(|f| f == name) {
            return Err(TcsError::CommandRejected(format!("unknown filter {}", name)));
        }
        state.filter = name.to_string();
        Ok(())
    }
}
