//! Swope instrument rotator
//!
//! The rotator has no TCS control; the angle is tracked in memory so that
//! sequences can still record and restore it.

use crate::error::{TcsError, TcsResult};
use crate::event::{DeviceEvent, EventBus};
use std::sync::Arc;

pub struct SwopeRotator {
    name: String,
    angle: f64,
    events: Arc<EventBus>,
}

impl SwopeRotator {
    pub fn new(name: impl Into<String>, events: Arc<EventBus>) -> Self {
        Self {
            name: name.into(),
            angle: 0.0,
            events,
        }
    }

    /// Current angle in degrees, in `[0, 360)`
    pub fn position(&self) -> f64 {
        self.angle
    }

    /// Non-finite angles are rejected and leave the rotator where it is
    pub fn move_to(&mut self, angle: f64) -> TcsResult<()> {
        if !angle.is_finite() {
            return Err(TcsError::InvalidAngle(angle));
        }
        self.events
            .publish(&self.name, DeviceEvent::RotatorMoveBegin { target: angle });
        self.angle = normalize(angle);
        self.events.publish(
            &self.name,
            DeviceEvent::RotatorMoveComplete { angle: self.angle },
        );
        Ok(())
    }

    pub fn move_by(&mut self, offset: f64) -> TcsResult<()> {
        self.move_to(self.angle + offset)
    }
}

fn normalize(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}
