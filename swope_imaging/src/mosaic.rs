//! Quadrant mosaic assembly
//!
//! The Swope CCD is read out through four amplifiers, one per quadrant. Each
//! amplifier writes its own frame in its own readout direction, so the frames
//! have to be mirrored into a common orientation before they are tiled:
//!
//! ```text
//!  Q4  Q3
//!  Q1  Q2
//! ```
//!
//! Q4 is placed as read, Q3 is mirrored left-right, Q1 and Q2 are rotated by
//! 180°. The tiled frame is then rotated 90° counter-clockwise so the result
//! has north up and east left.

use crate::datasec::DataSection;
use crate::fits::{FitsHeader, FitsImage, PixelType};
use ndarray::{concatenate, s, Array2, ArrayView2, Axis};
use std::ops::Range;
use thiserror::Error;
use tracing::debug;

/// Mosaic assembly errors
#[derive(Debug, Error)]
pub enum MosaicError {
    #[error("Quadrant shape mismatch: {quadrant} is {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        quadrant: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Quadrant pixel type mismatch: {quadrant} is {actual:?}, expected {expected:?}")]
    PixelTypeMismatch {
        quadrant: &'static str,
        expected: PixelType,
        actual: PixelType,
    },

    #[error("Data section {section} outside quadrant of {rows}x{cols} pixels")]
    DataSectionOutOfBounds {
        section: DataSection,
        rows: usize,
        cols: usize,
    },

    #[error("Invalid data section: {0}")]
    InvalidDataSection(String),

    #[error("Array layout error: {0}")]
    Layout(#[from] ndarray::ShapeError),
}

/// Validate the quadrant set and work out the region to keep
fn crop_region(
    shapes: [(&'static str, (usize, usize)); 4],
    data_section: Option<&DataSection>,
    trim: bool,
) -> Result<(Range<usize>, Range<usize>), MosaicError> {
    let (_, expected) = shapes[0];
    for (quadrant, actual) in shapes {
        if actual != expected {
            return Err(MosaicError::ShapeMismatch { quadrant, expected, actual });
        }
    }

    match data_section {
        Some(section) if trim => {
            section.check_within(expected)?;
            Ok((section.rows(), section.cols()))
        }
        _ => Ok((0..expected.0, 0..expected.1)),
    }
}

/// Tile the four quadrants without the final rotation.
///
/// The result has exactly twice the (possibly trimmed) quadrant shape in both
/// dimensions.
pub fn stitch<T: Clone>(
    q4: &Array2<T>,
    q3: &Array2<T>,
    q2: &Array2<T>,
    q1: &Array2<T>,
    data_section: Option<&DataSection>,
    trim: bool,
) -> Result<Array2<T>, MosaicError> {
    let (rows, cols) = crop_region(
        [("Q4", q4.dim()), ("Q3", q3.dim()), ("Q2", q2.dim()), ("Q1", q1.dim())],
        data_section,
        trim,
    )?;
    let (r0, r1, c0, c1) = (rows.start, rows.end, cols.start, cols.end);

    let top_left = q4.slice(s![r0..r1, c0..c1]);
    let top_right = q3.slice(s![r0..r1, c0..c1;-1]);
    let bottom_left = q1.slice(s![r0..r1;-1, c0..c1;-1]);
    let bottom_right = q2.slice(s![r0..r1;-1, c0..c1;-1]);

    let top = concatenate(Axis(1), &[top_left, top_right])?;
    let bottom = concatenate(Axis(1), &[bottom_left, bottom_right])?;
    let frame = concatenate(Axis(0), &[top.view(), bottom.view()])?;

    debug!(
        quadrant = ?(r1 - r0, c1 - c0),
        frame = ?frame.dim(),
        "Stitched CCD quadrants"
    );

    Ok(frame)
}

/// Rotate an image 90° counter-clockwise
pub fn rotate90<T: Clone>(image: ArrayView2<'_, T>) -> Array2<T> {
    let mut view = image;
    view.invert_axis(Axis(1));
    view.reversed_axes().as_standard_layout().into_owned()
}

/// Assemble the full, sky-oriented frame from four quadrant readouts.
///
/// With `trim` set and a data section given, each quadrant is cropped to the
/// data section first. For `(h, w)` quadrants the result is `(2w, 2h)`.
pub fn assemble<T: Clone>(
    q4: &Array2<T>,
    q3: &Array2<T>,
    q2: &Array2<T>,
    q1: &Array2<T>,
    data_section: Option<&DataSection>,
    trim: bool,
) -> Result<Array2<T>, MosaicError> {
    let frame = stitch(q4, q3, q2, q1, data_section, trim)?;
    Ok(rotate90(frame.view()))
}

/// Assemble four FITS quadrant images.
///
/// The data section is read from `header` (normally the Q1 header). All four
/// images must share the same pixel type.
pub fn assemble_images(
    q4: &FitsImage,
    q3: &FitsImage,
    q2: &FitsImage,
    q1: &FitsImage,
    header: Option<&FitsHeader>,
    trim: bool,
) -> Result<FitsImage, MosaicError> {
    let data_section = match header {
        Some(header) if trim => DataSection::from_header(header)?,
        _ => None,
    };
    let section = data_section.as_ref();

    let image = match (q4, q3, q2, q1) {
        (FitsImage::U8(a), FitsImage::U8(b), FitsImage::U8(c), FitsImage::U8(d)) => {
            FitsImage::U8(assemble(a, b, c, d, section, trim)?)
        }
        (FitsImage::I16(a), FitsImage::I16(b), FitsImage::I16(c), FitsImage::I16(d)) => {
            FitsImage::I16(assemble(a, b, c, d, section, trim)?)
        }
        (FitsImage::U16(a), FitsImage::U16(b), FitsImage::U16(c), FitsImage::U16(d)) => {
            FitsImage::U16(assemble(a, b, c, d, section, trim)?)
        }
        (FitsImage::I32(a), FitsImage::I32(b), FitsImage::I32(c), FitsImage::I32(d)) => {
            FitsImage::I32(assemble(a, b, c, d, section, trim)?)
        }
        (FitsImage::F32(a), FitsImage::F32(b), FitsImage::F32(c), FitsImage::F32(d)) => {
            FitsImage::F32(assemble(a, b, c, d, section, trim)?)
        }
        (FitsImage::F64(a), FitsImage::F64(b), FitsImage::F64(c), FitsImage::F64(d)) => {
            FitsImage::F64(assemble(a, b, c, d, section, trim)?)
        }
        _ => return Err(pixel_type_mismatch(q4, [("Q3", q3), ("Q2", q2), ("Q1", q1)])),
    };

    Ok(image)
}

fn pixel_type_mismatch(reference: &FitsImage, others: [(&'static str, &FitsImage); 3]) -> MosaicError {
    let expected = reference.pixel_type();
    let (quadrant, actual) = others
        .into_iter()
        .map(|(quadrant, image)| (quadrant, image.pixel_type()))
        .find(|(_, actual)| *actual != expected)
        .unwrap_or(("Q4", expected));
    MosaicError::PixelTypeMismatch { quadrant, expected, actual }
}
