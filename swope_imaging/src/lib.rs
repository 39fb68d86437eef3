//! Swope imaging support
//!
//! FITS I/O for the four-amplifier CCD readouts and the quadrant mosaic
//! assembler that turns them into a single full frame.

pub mod datasec;
pub mod fits;
pub mod mosaic;

pub use datasec::DataSection;
pub use fits::{
    read_fits, read_fits_from_bytes, write_fits, write_fits_to_bytes, FitsError, FitsHeader,
    FitsImage, FitsValue, PixelType, MAX_PIXELS,
};
pub use mosaic::{assemble, assemble_images, rotate90, stitch, MosaicError};

/// FITS block size in bytes
pub const FITS_BLOCK_SIZE: usize = 2880;

/// FITS header record size in bytes
pub const FITS_RECORD_SIZE: usize = 80;
