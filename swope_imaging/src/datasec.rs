//! DATASEC header parsing
//!
//! The CCD controller writes the valid (non-overscan) region of each
//! amplifier as `DATASEC = '[x1:x2,y1:y2]'`, 1-based and inclusive, with x
//! running along NAXIS1 (columns) and y along NAXIS2 (rows).

use crate::fits::FitsHeader;
use crate::mosaic::MosaicError;
use std::fmt;
use std::ops::Range;

/// Header keyword carrying the data section
pub const DATASEC_KEYWORD: &str = "DATASEC";

/// Valid pixel rectangle of a quadrant, in the header's 1-based inclusive convention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSection {
    pub x_min: usize,
    pub x_max: usize,
    pub y_min: usize,
    pub y_max: usize,
}

impl DataSection {
    /// Build a data section, rejecting empty or zero-based rectangles
    pub fn new(x_min: usize, x_max: usize, y_min: usize, y_max: usize) -> Result<Self, MosaicError> {
        if x_min == 0 || y_min == 0 || x_min > x_max || y_min > y_max {
            return Err(MosaicError::InvalidDataSection(format!(
                "[{}:{},{}:{}]",
                x_min, x_max, y_min, y_max
            )));
        }
        Ok(Self { x_min, x_max, y_min, y_max })
    }

    /// Parse a `[x1:x2,y1:y2]` string
    pub fn parse(s: &str) -> Result<Self, MosaicError> {
        let invalid = || MosaicError::InvalidDataSection(s.to_string());

        let inner = s
            .trim()
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(invalid)?;

        let mut bounds = Vec::with_capacity(4);
        for axis in inner.split(',') {
            let (lo, hi) = axis.split_once(':').ok_or_else(invalid)?;
            bounds.push(lo.trim().parse::<usize>().map_err(|_| invalid())?);
            bounds.push(hi.trim().parse::<usize>().map_err(|_| invalid())?);
        }

        match bounds.as_slice() {
            [x_min, x_max, y_min, y_max] => Self::new(*x_min, *x_max, *y_min, *y_max),
            _ => Err(invalid()),
        }
    }

    /// Read the data section from a header, if one is present
    pub fn from_header(header: &FitsHeader) -> Result<Option<Self>, MosaicError> {
        match header.get_string(DATASEC_KEYWORD) {
            Some(value) => Self::parse(value).map(Some),
            None => Ok(None),
        }
    }

    /// 0-based half-open row range
    pub fn rows(&self) -> Range<usize> {
        (self.y_min - 1)..self.y_max
    }

    /// 0-based half-open column range
    pub fn cols(&self) -> Range<usize> {
        (self.x_min - 1)..self.x_max
    }

    /// Height and width of the trimmed region
    pub fn shape(&self) -> (usize, usize) {
        (self.y_max - self.y_min + 1, self.x_max - self.x_min + 1)
    }

    /// Check that the rectangle fits inside a `(rows, cols)` quadrant
    pub fn check_within(&self, shape: (usize, usize)) -> Result<(), MosaicError> {
        let (rows, cols) = shape;
        if self.y_max > rows || self.x_max > cols {
            return Err(MosaicError::DataSectionOutOfBounds {
                section: *self,
                rows,
                cols,
            });
        }
        Ok(())
    }
}

impl fmt::Display for DataSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{},{}:{}]", self.x_min, self.x_max, self.y_min, self.y_max)
    }
}
