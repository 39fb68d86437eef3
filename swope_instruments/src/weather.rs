//! Swope weather station
//!
//! Weather and DIMM seeing readings come from the LCO environment API. Each
//! feed has its own status cache. A failed or invalid fetch is logged and
//! the previous readings stay in use.

use crate::cache::{Clock, StatusCache, StatusSource, SystemClock};
use crate::config::WeatherConfig;
use crate::error::WeatherError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use swope_imaging::{FitsHeader, FitsValue};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

type Reading = Map<String, Value>;

/// Magnus formula coefficients
const MAGNUS_A: f64 = 17.27;
const MAGNUS_B: f64 = 237.7;

const PASCAL_PER_INHG: f64 = 3386.389;
const MPS_PER_MPH: f64 = 0.44704;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherKind {
    Weather,
    Seeing,
}

impl WeatherKind {
    pub fn label(&self) -> &'static str {
        match self {
            WeatherKind::Weather => "weather",
            WeatherKind::Seeing => "seeing",
        }
    }

    /// How far back each request reaches
    pub fn window(&self) -> ChronoDuration {
        match self {
            WeatherKind::Weather => ChronoDuration::minutes(5),
            WeatherKind::Seeing => ChronoDuration::hours(24),
        }
    }

    /// Fields the latest reading must carry
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            WeatherKind::Weather => &[
                "ts",
                "temperature",
                "air_pressure",
                "wind_speed_avg",
                "wind_dir_avg",
                "relative_humidity",
                "rain_intensity",
            ],
            WeatherKind::Seeing => &["ts", "seeing", "counts", "azimuth", "elevation"],
        }
    }
}

#[async_trait]
pub trait WeatherApi: Send + Sync {
    /// Readings since `start`, as `{"results": [...]}`
    async fn fetch(&self, kind: WeatherKind, start: DateTime<Utc>) -> Result<Value, WeatherError>;
}

/// LCO environment API over HTTP
pub struct HttpWeatherApi {
    client: reqwest::Client,
    weather_url: String,
    seeing_url: String,
}

impl HttpWeatherApi {
    pub fn new(config: &WeatherConfig) -> Result<Self, WeatherError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            weather_url: config.weather_url.clone(),
            seeing_url: config.seeing_url.clone(),
        })
    }

    pub fn url_for(&self, kind: WeatherKind, start: DateTime<Utc>) -> String {
        let base = match kind {
            WeatherKind::Weather => &self.weather_url,
            WeatherKind::Seeing => &self.seeing_url,
        };
        format!("{}{}", base, start.format("%Y-%m-%dT%H:%M:%S"))
    }
}

#[async_trait]
impl WeatherApi for HttpWeatherApi {
    async fn fetch(&self, kind: WeatherKind, start: DateTime<Utc>) -> Result<Value, WeatherError> {
        let url = self.url_for(kind, start);
        debug!(%url, "Fetching {} data", kind.label());
        let data = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(data)
    }
}

/// One feed (weather or seeing) as a status source
pub struct WeatherFeed {
    api: Arc<dyn WeatherApi>,
    kind: WeatherKind,
}

#[async_trait]
impl StatusSource for WeatherFeed {
    type Snapshot = Value;
    type Error = WeatherError;

    async fn fetch_status(&self) -> Result<Value, WeatherError> {
        let start = Utc::now() - self.kind.window();
        let data = self.api.fetch(self.kind, start).await?;
        validate(self.kind, &data)?;
        debug!("{} data validation passed", self.kind.label());
        Ok(data)
    }
}

/// Check that `data` is `{"results": [...]}` with a usable latest reading
pub fn validate(kind: WeatherKind, data: &Value) -> Result<(), WeatherError> {
    let invalid = |reason: String| WeatherError::InvalidData {
        kind: kind.label(),
        reason,
    };

    let object = data
        .as_object()
        .ok_or_else(|| invalid("not a JSON object".to_string()))?;
    let results = object
        .get("results")
        .ok_or_else(|| invalid("missing 'results' field".to_string()))?;
    let latest = results
        .as_array()
        .and_then(|r| r.last())
        .ok_or_else(|| invalid("'results' is not a non-empty list".to_string()))?;
    let latest = latest
        .as_object()
        .ok_or_else(|| invalid("latest reading is not an object".to_string()))?;

    for field in kind.required_fields() {
        if !latest.contains_key(*field) {
            return Err(invalid(format!("latest reading missing required field: {}", field)));
        }
    }

    let ts = latest.get("ts").and_then(Value::as_str);
    match ts.and_then(parse_timestamp) {
        Some(_) => Ok(()),
        None => Err(invalid(format!("invalid timestamp {:?}", latest.get("ts")))),
    }
}

const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// ISO 8601 timestamp with either `T` or space separator, an optional
/// offset, or a bare date. Naive times are UTC.
fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(ts) {
        return Some(t.with_timezone(&Utc));
    }
    let zulu = ts.strip_suffix('Z').map(|t| format!("{}+00:00", t));
    let with_offset = zulu.as_deref().unwrap_or(ts);
    for format in OFFSET_FORMATS {
        if let Ok(t) = DateTime::parse_from_str(with_offset, format) {
            return Some(t.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(ts, format) {
            return Some(t.and_utc());
        }
    }
    NaiveDate::parse_from_str(ts, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

fn latest(data: &Value) -> Option<&Reading> {
    data.get("results")?.as_array()?.last()?.as_object()
}

fn number(reading: Option<&Reading>, field: &str) -> Option<f64> {
    reading?.get(field)?.as_f64()
}

/// Plane-parallel airmass, `None` at or below the horizon
fn airmass_from_elevation(elevation: f64) -> Option<f64> {
    (elevation > 0.0).then(|| 1.0 / (90.0 - elevation).to_radians().cos())
}

/// Converted values of the latest readings
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeatherSummary {
    pub measured_at: Option<String>,
    /// °C
    pub temperature: f64,
    /// °C
    pub dew_point: f64,
    /// %
    pub humidity: f64,
    /// Pa
    pub pressure: f64,
    /// m/s
    pub wind_speed: f64,
    /// Degrees
    pub wind_direction: f64,
    /// mm/h
    pub rain_rate: f64,
    pub is_raining: bool,
    pub seeing_measured_at: Option<String>,
    /// Arcseconds
    pub seeing: f64,
    pub seeing_at_zenith: f64,
    pub flux: f64,
    pub airmass: f64,
}

pub struct SwopeWeatherStation {
    model: String,
    weather: StatusCache<WeatherFeed>,
    seeing: StatusCache<WeatherFeed>,
}

impl SwopeWeatherStation {
    pub fn new(api: Arc<dyn WeatherApi>, config: &WeatherConfig) -> Self {
        Self::with_clock(api, config, Arc::new(SystemClock))
    }

    pub fn with_clock(api: Arc<dyn WeatherApi>, config: &WeatherConfig, clock: Arc<dyn Clock>) -> Self {
        let feed = |kind| WeatherFeed {
            api: Arc::clone(&api),
            kind,
        };
        Self {
            model: "Swope Weather Station".to_string(),
            weather: StatusCache::with_clock(
                feed(WeatherKind::Weather),
                config.update_interval(),
                Arc::clone(&clock),
            ),
            seeing: StatusCache::with_clock(feed(WeatherKind::Seeing), config.update_interval(), clock),
        }
    }

    fn cache_mut(&mut self, kind: WeatherKind) -> &mut StatusCache<WeatherFeed> {
        match kind {
            WeatherKind::Weather => &mut self.weather,
            WeatherKind::Seeing => &mut self.seeing,
        }
    }

    /// Latest data for a feed, refreshed if stale. Falls back to the previous data on failure.
    pub async fn status(&mut self, kind: WeatherKind) -> Option<Arc<Value>> {
        let cache = self.cache_mut(kind);
        let result = cache.get_status(false).await;
        report(kind, result, cache)
    }

    async fn latest_reading(&mut self, kind: WeatherKind) -> Option<Reading> {
        let status = self.status(kind).await?;
        latest(&status).cloned()
    }

    async fn weather_summary(&mut self) -> WeatherSummary {
        let reading = self.latest_reading(WeatherKind::Weather).await;
        summarize(reading.as_ref(), None)
    }

    async fn seeing_summary(&mut self) -> WeatherSummary {
        let reading = self.latest_reading(WeatherKind::Seeing).await;
        summarize(None, reading.as_ref())
    }

    /// Timestamp of the latest weather reading
    pub async fn last_measurement_time(&mut self) -> Result<String, WeatherError> {
        self.weather_summary()
            .await
            .measured_at
            .ok_or(WeatherError::NoMeasurement("weather"))
    }

    /// °C
    pub async fn temperature(&mut self) -> f64 {
        self.weather_summary().await.temperature
    }

    /// °C, from temperature and relative humidity
    pub async fn dew_point(&mut self) -> f64 {
        self.weather_summary().await.dew_point
    }

    /// Relative humidity, %
    pub async fn humidity(&mut self) -> f64 {
        self.weather_summary().await.humidity
    }

    /// Pa
    pub async fn pressure(&mut self) -> f64 {
        self.weather_summary().await.pressure
    }

    /// m/s
    pub async fn wind_speed(&mut self) -> f64 {
        self.weather_summary().await.wind_speed
    }

    /// Degrees
    pub async fn wind_direction(&mut self) -> f64 {
        self.weather_summary().await.wind_direction
    }

    /// mm/h
    pub async fn rain_rate(&mut self) -> f64 {
        self.weather_summary().await.rain_rate
    }

    pub async fn is_raining(&mut self) -> bool {
        self.weather_summary().await.is_raining
    }

    /// Arcseconds
    pub async fn seeing(&mut self) -> f64 {
        self.seeing_summary().await.seeing
    }

    /// Seeing scaled to the zenith by `X^(-3/5)`
    pub async fn seeing_at_zenith(&mut self) -> f64 {
        self.seeing_summary().await.seeing_at_zenith
    }

    /// Counts of the DIMM target star
    pub async fn flux(&mut self) -> f64 {
        self.seeing_summary().await.flux
    }

    /// Airmass of the DIMM target star
    pub async fn airmass(&mut self) -> f64 {
        self.seeing_summary().await.airmass
    }

    pub async fn summary(&mut self) -> WeatherSummary {
        let weather = self.latest_reading(WeatherKind::Weather).await;
        let seeing = self.latest_reading(WeatherKind::Seeing).await;
        summarize(weather.as_ref(), seeing.as_ref())
    }

    /// FITS cards describing the current conditions
    pub async fn metadata(&mut self) -> FitsHeader {
        let summary = self.summary().await;
        let mut header = FitsHeader::new();

        header.set_with_comment("METMODEL", FitsValue::String(self.model.clone()), "Weather station model");
        if let Some(ts) = &summary.measured_at {
            header.set_with_comment("METDATE", FitsValue::String(ts.clone()), "Weather station measurement date/time");
            header.set_with_comment("METRAIN", FitsValue::Boolean(summary.is_raining), "Is raining?");
            header.set_with_comment("METRHUM", FitsValue::Float(summary.humidity), "Relative humidity (%)");
            header.set_with_comment("METTEMP", FitsValue::Float(summary.temperature), "Temperature (C)");
            header.set_with_comment("METDEW", FitsValue::Float(summary.dew_point), "Dew point (C)");
            header.set_with_comment("METWINDS", FitsValue::Float(summary.wind_speed), "Wind speed (m/s)");
            header.set_with_comment("METWINDD", FitsValue::Float(summary.wind_direction), "Wind direction (deg)");
            header.set_with_comment("METPRES", FitsValue::Float(summary.pressure), "Pressure (Pa)");
        }
        if let Some(ts) = &summary.seeing_measured_at {
            header.set_with_comment("SEEDATE", FitsValue::String(ts.clone()), "Seeing measurement date/time");
            header.set_with_comment("SEEING", FitsValue::Float(summary.seeing), "Seeing (arcsec)");
        }
        header
    }

    /// Refresh both feeds regardless of age
    pub async fn control(&mut self) {
        debug!("Control loop: fetching weather and seeing data");
        self.weather.invalidate();
        self.seeing.invalidate();

        let (weather, seeing) = futures::join!(
            self.weather.get_status(false),
            self.seeing.get_status(false)
        );
        let weather = report(WeatherKind::Weather, weather, &self.weather);
        let seeing = report(WeatherKind::Seeing, seeing, &self.seeing);

        let summary = summarize(
            weather.as_deref().and_then(latest),
            seeing.as_deref().and_then(latest),
        );
        info!(
            temperature = summary.temperature,
            humidity = summary.humidity,
            wind_speed = summary.wind_speed,
            raining = summary.is_raining,
            seeing = summary.seeing,
            "Conditions updated"
        );
    }

    /// Call `control` every `period` until `shutdown` fires
    pub async fn run_control_loop(&mut self, period: Duration, mut shutdown: oneshot::Receiver<()>) {
        info!(period_secs = period.as_secs(), "Weather control loop started");
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => self.control().await,
            }
        }
        info!("Weather control loop stopped");
    }
}

/// Log a failed refresh and fall back to whatever the cache still holds
fn report(
    kind: WeatherKind,
    result: Result<Arc<Value>, WeatherError>,
    cache: &StatusCache<WeatherFeed>,
) -> Option<Arc<Value>> {
    match result {
        Ok(status) => Some(status),
        Err(e @ WeatherError::InvalidData { .. }) => {
            warn!("{}; keeping previous data", e);
            cache.snapshot()
        }
        Err(e) => {
            error!("Failed to fetch {} data: {}", kind.label(), e);
            cache.snapshot()
        }
    }
}

/// Convert raw readings to SI units. Missing values are reported as 0.
fn summarize(weather: Option<&Reading>, seeing: Option<&Reading>) -> WeatherSummary {
    let temperature = number(weather, "temperature").map(fahrenheit_to_celsius);
    let humidity = number(weather, "relative_humidity");
    let rain_rate = number(weather, "rain_intensity").unwrap_or(0.0);
    let seeing_value = number(seeing, "seeing");
    let airmass = number(seeing, "elevation").and_then(airmass_from_elevation);

    WeatherSummary {
        measured_at: timestamp(weather),
        temperature: temperature.unwrap_or(0.0),
        dew_point: match (temperature, humidity) {
            (Some(t), Some(h)) => dew_point(t, h),
            _ => 0.0,
        },
        humidity: humidity.unwrap_or(0.0),
        pressure: number(weather, "air_pressure").map_or(0.0, |p| p * PASCAL_PER_INHG),
        wind_speed: number(weather, "wind_speed_avg").map_or(0.0, |v| v * MPS_PER_MPH),
        wind_direction: number(weather, "wind_dir_avg").unwrap_or(0.0),
        rain_rate,
        is_raining: rain_rate > 0.0,
        seeing_measured_at: timestamp(seeing),
        seeing: seeing_value.unwrap_or(0.0),
        seeing_at_zenith: match (seeing_value, airmass) {
            (Some(v), Some(x)) => v * x.powf(-3.0 / 5.0),
            _ => 0.0,
        },
        flux: number(seeing, "counts").unwrap_or(0.0),
        airmass: airmass.unwrap_or(0.0),
    }
}

fn timestamp(reading: Option<&Reading>) -> Option<String> {
    reading?.get("ts")?.as_str().map(str::to_string)
}

fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

/// Magnus approximation; 0 when humidity is not positive
fn dew_point(temperature: f64, humidity: f64) -> f64 {
    if humidity <= 0.0 {
        return 0.0;
    }
    let alpha = (MAGNUS_A * temperature) / (MAGNUS_B + temperature) + (humidity / 100.0).ln();
    (MAGNUS_B * alpha) / (MAGNUS_A - alpha)
}
