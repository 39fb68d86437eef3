//! FITS file I/O
//!
//! Reads and writes single-HDU, two-dimensional FITS images according to the
//! FITS standard:
//! - 2880-byte blocks
//! - Header with 80-character keyword records
//! - Data in big-endian format, NAXIS1 varying fastest

use crate::{FITS_BLOCK_SIZE, FITS_RECORD_SIZE};
use ndarray::Array2;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

/// Keywords describing the data layout; these are written from the image itself
const STRUCTURAL_KEYWORDS: &[&str] = &[
    "SIMPLE", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "NAXIS3", "EXTEND", "BZERO", "BSCALE", "END",
];

/// FITS header containing all keywords
#[derive(Debug, Clone, Default)]
pub struct FitsHeader {
    /// Keyword-value pairs
    pub keywords: HashMap<String, FitsValue>,
    /// Card comments (the text after `/`)
    comments: HashMap<String, String>,
    /// Keywords in order (for writing)
    keyword_order: Vec<String>,
}

/// FITS value types
#[derive(Debug, Clone, PartialEq)]
pub enum FitsValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    /// COMMENT / HISTORY text
    Comment(String),
}

impl FitsValue {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            FitsValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FitsValue::Integer(i) => Some(*i),
            FitsValue::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FitsValue::Float(f) => Some(*f),
            FitsValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FitsValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Render the value field of a header record
    fn to_record_value(&self) -> String {
        match self {
            FitsValue::String(s) => format!("'{:<8}'", s.replace('\'', "''")),
            FitsValue::Integer(i) => i.to_string(),
            FitsValue::Float(f) => format!("{:E}", f),
            FitsValue::Boolean(b) => if *b { "T".to_string() } else { "F".to_string() },
            FitsValue::Comment(c) => c.clone(),
        }
    }
}

impl FitsHeader {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, key: &str, value: FitsValue) {
        let key_upper = key.to_uppercase();
        if !self.keyword_order.contains(&key_upper) {
            self.keyword_order.push(key_upper.clone());
        }
        self.keywords.insert(key_upper, value);
    }

    pub fn set(&mut self, key: &str, value: FitsValue) {
        self.insert(key, value);
    }

    /// Set a value together with its card comment
    pub fn set_with_comment(&mut self, key: &str, value: FitsValue, comment: &str) {
        self.insert(key, value);
        self.comments.insert(key.to_uppercase(), comment.to_string());
    }

    pub fn set_string(&mut self, key: &str, value: &str) {
        self.insert(key, FitsValue::String(value.to_string()));
    }

    pub fn set_int(&mut self, key: &str, value: i64) {
        self.insert(key, FitsValue::Integer(value));
    }

    pub fn set_float(&mut self, key: &str, value: f64) {
        self.insert(key, FitsValue::Float(value));
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.insert(key, FitsValue::Boolean(value));
    }

    /// Append a COMMENT card
    pub fn add_comment(&mut self, text: &str) {
        self.add_commentary("COMMENT", text);
    }

    /// Append a HISTORY card
    pub fn add_history(&mut self, text: &str) {
        self.add_commentary("HISTORY", text);
    }

    /// Commentary cards repeat, so each gets a unique `KIND_n` key
    fn add_commentary(&mut self, kind: &str, text: &str) {
        let mut n = self.keyword_order.len();
        let mut key = format!("{}_{}", kind, n);
        while self.keywords.contains_key(&key) {
            n += 1;
            key = format!("{}_{}", kind, n);
        }
        self.keyword_order.push(key.clone());
        self.keywords.insert(key, FitsValue::Comment(text.to_string()));
    }

    pub fn get(&self, key: &str) -> Option<&FitsValue> {
        self.keywords.get(&key.to_uppercase())
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_string())
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    pub fn comment(&self, key: &str) -> Option<&str> {
        self.comments.get(&key.to_uppercase()).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keywords.contains_key(&key.to_uppercase())
    }

    /// Remove a keyword, returning its value
    pub fn remove(&mut self, key: &str) -> Option<FitsValue> {
        let key_upper = key.to_uppercase();
        self.keyword_order.retain(|k| k != &key_upper);
        self.comments.remove(&key_upper);
        self.keywords.remove(&key_upper)
    }

    /// Keywords in header order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keyword_order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keyword_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyword_order.is_empty()
    }

    /// Copy every card of `other` whose keyword is not already set here.
    /// Comment cards are always appended. Returns the number of cards copied.
    pub fn merge_missing(&mut self, other: &FitsHeader) -> usize {
        let mut copied = 0;
        for key in &other.keyword_order {
            let Some(value) = other.keywords.get(key) else {
                continue;
            };
            match value {
                FitsValue::Comment(text) => {
                    let kind = key.split('_').next().unwrap_or("COMMENT");
                    self.add_commentary(kind, text);
                    copied += 1;
                }
                _ if self.keywords.contains_key(key) => {}
                _ => {
                    self.insert(key, value.clone());
                    if let Some(comment) = other.comments.get(key) {
                        self.comments.insert(key.clone(), comment.clone());
                    }
                    copied += 1;
                }
            }
        }
        copied
    }
}

/// FITS file reading errors
#[derive(Debug, Error)]
pub enum FitsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid FITS format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported BITPIX: {0}")]
    UnsupportedBitpix(i64),

    #[error("Missing required keyword: {0}")]
    MissingKeyword(String),

    #[error("Unsupported FITS layout: {0}")]
    Unsupported(String),
}

/// Pixel element type of a FITS image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    U8,
    I16,
    U16,
    I32,
    F32,
    F64,
}

impl PixelType {
    pub fn bitpix(&self) -> i64 {
        match self {
            PixelType::U8 => 8,
            PixelType::I16 | PixelType::U16 => 16,
            PixelType::I32 => 32,
            PixelType::F32 => -32,
            PixelType::F64 => -64,
        }
    }
}

/// Two-dimensional image payload, indexed `[row, column]`
#[derive(Debug, Clone, PartialEq)]
pub enum FitsImage {
    U8(Array2<u8>),
    I16(Array2<i16>),
    /// Unsigned 16-bit, stored on disk as BITPIX 16 with BZERO 32768
    U16(Array2<u16>),
    I32(Array2<i32>),
    F32(Array2<f32>),
    F64(Array2<f64>),
}

impl FitsImage {
    pub fn pixel_type(&self) -> PixelType {
        match self {
            FitsImage::U8(_) => PixelType::U8,
            FitsImage::I16(_) => PixelType::I16,
            FitsImage::U16(_) => PixelType::U16,
            FitsImage::I32(_) => PixelType::I32,
            FitsImage::F32(_) => PixelType::F32,
            FitsImage::F64(_) => PixelType::F64,
        }
    }

    /// `(rows, columns)`, i.e. `(NAXIS2, NAXIS1)`
    pub fn shape(&self) -> (usize, usize) {
        match self {
            FitsImage::U8(a) => a.dim(),
            FitsImage::I16(a) => a.dim(),
            FitsImage::U16(a) => a.dim(),
            FitsImage::I32(a) => a.dim(),
            FitsImage::F32(a) => a.dim(),
            FitsImage::F64(a) => a.dim(),
        }
    }

    pub fn width(&self) -> usize {
        self.shape().1
    }

    pub fn height(&self) -> usize {
        self.shape().0
    }
}

macro_rules! impl_from_array {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Array2<$ty>> for FitsImage {
                fn from(array: Array2<$ty>) -> Self {
                    FitsImage::$variant(array)
                }
            }
        )*
    };
}

impl_from_array!(u8 => U8, i16 => I16, u16 => U16, i32 => I32, f32 => F32, f64 => F64);

/// Read a FITS file from disk
pub fn read_fits(path: &Path) -> Result<(FitsImage, FitsHeader), FitsError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    read_fits_from_reader(&mut reader)
}

/// Read FITS from memory buffer
pub fn read_fits_from_bytes(bytes: &[u8]) -> Result<(FitsImage, FitsHeader), FitsError> {
    let mut reader = std::io::Cursor::new(bytes);
    read_fits_from_reader(&mut reader)
}

/// Largest pixel count accepted from a file header
pub const MAX_PIXELS: usize = 1 << 27;

fn read_fits_from_reader<R: Read>(reader: &mut R) -> Result<(FitsImage, FitsHeader), FitsError> {
    let header = read_header(reader)?;

    let bitpix = header
        .get_int("BITPIX")
        .ok_or_else(|| FitsError::MissingKeyword("BITPIX".to_string()))?;
    let naxis = header
        .get_int("NAXIS")
        .ok_or_else(|| FitsError::MissingKeyword("NAXIS".to_string()))?;

    if naxis != 2 {
        return Err(FitsError::Unsupported(format!(
            "NAXIS = {} (only 2D images are supported)",
            naxis
        )));
    }

    let width = header
        .get_int("NAXIS1")
        .ok_or_else(|| FitsError::MissingKeyword("NAXIS1".to_string()))?;
    let height = header
        .get_int("NAXIS2")
        .ok_or_else(|| FitsError::MissingKeyword("NAXIS2".to_string()))?;
    if width < 0 || height < 0 {
        return Err(FitsError::InvalidFormat(format!(
            "negative axis length {}x{}",
            width, height
        )));
    }
    let (width, height) = (width as usize, height as usize);
    let count = width
        .checked_mul(height)
        .filter(|&n| n <= MAX_PIXELS)
        .ok_or_else(|| {
            FitsError::InvalidFormat(format!("image size {}x{} exceeds limit", width, height))
        })?;
    let shape = (height, width);

    let bzero = header.get_float("BZERO").unwrap_or(0.0);
    let bscale = header.get_float("BSCALE").unwrap_or(1.0);
    let identity = bzero == 0.0 && bscale == 1.0;
    let scale = |v: f64| v * bscale + bzero;

    let image = match bitpix {
        8 => {
            let raw = read_samples::<_, u8, 1>(reader, count, u8::from_be_bytes)?;
            if identity {
                FitsImage::U8(to_array(shape, raw)?)
            } else {
                FitsImage::F64(to_array(shape, raw.into_iter().map(|v| scale(v as f64)).collect())?)
            }
        }
        16 => {
            let raw = read_samples::<_, i16, 2>(reader, count, i16::from_be_bytes)?;
            if bzero == 32768.0 && bscale == 1.0 {
                // Common case: unsigned 16-bit stored as signed with BZERO
                let unsigned = raw.into_iter().map(|v| (v as i32 + 32768) as u16).collect();
                FitsImage::U16(to_array(shape, unsigned)?)
            } else if identity {
                FitsImage::I16(to_array(shape, raw)?)
            } else {
                FitsImage::F64(to_array(shape, raw.into_iter().map(|v| scale(v as f64)).collect())?)
            }
        }
        32 => {
            let raw = read_samples::<_, i32, 4>(reader, count, i32::from_be_bytes)?;
            if identity {
                FitsImage::I32(to_array(shape, raw)?)
            } else {
                FitsImage::F64(to_array(shape, raw.into_iter().map(|v| scale(v as f64)).collect())?)
            }
        }
        -32 => {
            let raw = read_samples::<_, f32, 4>(reader, count, f32::from_be_bytes)?;
            if identity {
                FitsImage::F32(to_array(shape, raw)?)
            } else {
                FitsImage::F64(to_array(shape, raw.into_iter().map(|v| scale(v as f64)).collect())?)
            }
        }
        -64 => {
            let raw = read_samples::<_, f64, 8>(reader, count, f64::from_be_bytes)?;
            FitsImage::F64(to_array(shape, raw.into_iter().map(scale).collect())?)
        }
        other => return Err(FitsError::UnsupportedBitpix(other)),
    };

    Ok((image, header))
}

fn to_array<T>(shape: (usize, usize), data: Vec<T>) -> Result<Array2<T>, FitsError> {
    Array2::from_shape_vec(shape, data).map_err(|e| FitsError::InvalidFormat(e.to_string()))
}

/// Read `count` big-endian samples of `N` bytes each
fn read_samples<R: Read, T, const N: usize>(
    reader: &mut R,
    count: usize,
    decode: fn([u8; N]) -> T,
) -> Result<Vec<T>, FitsError> {
    let len = count
        .checked_mul(N)
        .ok_or_else(|| FitsError::InvalidFormat(format!("{} samples overflow", count)))?;
    let mut buffer = Vec::new();
    reader.take(len as u64).read_to_end(&mut buffer)?;
    if buffer.len() != len {
        return Err(FitsError::InvalidFormat(format!(
            "truncated data: expected {} bytes, found {}",
            len,
            buffer.len()
        )));
    }

    let data = buffer
        .chunks_exact(N)
        .map(|chunk| {
            let mut bytes = [0u8; N];
            bytes.copy_from_slice(chunk);
            decode(bytes)
        })
        .collect();

    Ok(data)
}

/// Read the FITS header (80-character records until END)
pub(crate) fn read_header<R: Read>(reader: &mut R) -> Result<FitsHeader, FitsError> {
    let mut header = FitsHeader::new();
    let mut buffer = [0u8; FITS_RECORD_SIZE];
    let mut records = 0usize;

    loop {
        reader.read_exact(&mut buffer)?;
        records += 1;

        let record: String = buffer
            .iter()
            .map(|&b| if b.is_ascii() { b as char } else { '?' })
            .collect();
        let keyword = record[..8].trim();

        if keyword == "END" {
            break;
        }

        if keyword.is_empty() {
            continue;
        }

        if &record[8..10] == "= " {
            let (value, comment) = parse_value_field(&record[10..]);
            header.insert(keyword, value);
            if let Some(comment) = comment {
                header.comments.insert(keyword.to_uppercase(), comment);
            }
        } else if keyword == "COMMENT" || keyword == "HISTORY" {
            header.add_commentary(keyword, record[8..].trim());
        }
    }

    // Header is padded with blank records to a multiple of 2880 bytes
    let per_block = FITS_BLOCK_SIZE / FITS_RECORD_SIZE;
    let padding_records = (per_block - records % per_block) % per_block;
    if padding_records > 0 {
        let mut skip = vec![0u8; padding_records * FITS_RECORD_SIZE];
        reader.read_exact(&mut skip)?;
    }

    Ok(header)
}

/// Parse the value field of a record (columns 11-80) into value and comment
fn parse_value_field(s: &str) -> (FitsValue, Option<String>) {
    let s = s.trim_start();

    if let Some(rest) = s.strip_prefix('\'') {
        let mut value = String::new();
        let mut end = rest.len();
        let mut chars = rest.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                // '' is an escaped quote
                if matches!(chars.peek(), Some((_, '\''))) {
                    value.push('\'');
                    chars.next();
                    continue;
                }
                end = i + 1;
                break;
            }
            value.push(c);
        }
        let comment = split_comment(&rest[end..]);
        return (FitsValue::String(value.trim_end().to_string()), comment);
    }

    let (value_part, comment) = match s.find('/') {
        Some(idx) => (s[..idx].trim(), split_comment(&s[idx..])),
        None => (s.trim(), None),
    };

    let value = match value_part {
        "T" => FitsValue::Boolean(true),
        "F" => FitsValue::Boolean(false),
        _ => {
            if let Ok(i) = value_part.parse::<i64>() {
                FitsValue::Integer(i)
            } else if let Ok(f) = value_part.replace(['D', 'd'], "E").parse::<f64>() {
                FitsValue::Float(f)
            } else {
                FitsValue::String(value_part.to_string())
            }
        }
    };

    (value, comment)
}

fn split_comment(s: &str) -> Option<String> {
    s.find('/')
        .map(|idx| s[idx + 1..].trim().to_string())
        .filter(|c| !c.is_empty())
}

/// Write a FITS file to disk
pub fn write_fits(path: &Path, image: &FitsImage, header: &FitsHeader) -> Result<(), FitsError> {
    let bytes = write_fits_to_bytes(image, header)?;
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Encode an image and header as a complete FITS file
pub fn write_fits_to_bytes(image: &FitsImage, header: &FitsHeader) -> Result<Vec<u8>, FitsError> {
    let (height, width) = image.shape();
    let mut out = Vec::new();

    push_record(&mut out, "SIMPLE", Some("T"), None);
    push_record(&mut out, "BITPIX", Some(&image.pixel_type().bitpix().to_string()), None);
    push_record(&mut out, "NAXIS", Some("2"), None);
    push_record(&mut out, "NAXIS1", Some(&width.to_string()), None);
    push_record(&mut out, "NAXIS2", Some(&height.to_string()), None);

    if image.pixel_type() == PixelType::U16 {
        push_record(&mut out, "BZERO", Some("32768"), None);
        push_record(&mut out, "BSCALE", Some("1"), None);
    }

    for key in &header.keyword_order {
        if STRUCTURAL_KEYWORDS.contains(&key.as_str()) {
            continue;
        }
        let Some(value) = header.keywords.get(key) else {
            continue;
        };
        match value {
            FitsValue::Comment(text) => {
                let keyword = key.split('_').next().unwrap_or("COMMENT");
                push_commentary(&mut out, keyword, text);
            }
            _ => {
                let comment = header.comments.get(key).map(String::as_str);
                push_record(&mut out, key, Some(&value.to_record_value()), comment);
            }
        }
    }

    push_record(&mut out, "END", None, None);
    pad_to_block(&mut out, b' ');

    match image {
        FitsImage::U8(a) => out.extend(a.iter()),
        FitsImage::I16(a) => a.iter().for_each(|v| out.extend_from_slice(&v.to_be_bytes())),
        FitsImage::U16(a) => a
            .iter()
            .for_each(|v| out.extend_from_slice(&((*v as i32 - 32768) as i16).to_be_bytes())),
        FitsImage::I32(a) => a.iter().for_each(|v| out.extend_from_slice(&v.to_be_bytes())),
        FitsImage::F32(a) => a.iter().for_each(|v| out.extend_from_slice(&v.to_be_bytes())),
        FitsImage::F64(a) => a.iter().for_each(|v| out.extend_from_slice(&v.to_be_bytes())),
    }
    pad_to_block(&mut out, 0);

    Ok(out)
}

fn pad_to_block(out: &mut Vec<u8>, fill: u8) {
    let padding = (FITS_BLOCK_SIZE - out.len() % FITS_BLOCK_SIZE) % FITS_BLOCK_SIZE;
    out.extend(std::iter::repeat(fill).take(padding));
}

/// Write a single keyword record
fn push_record(out: &mut Vec<u8>, keyword: &str, value: Option<&str>, comment: Option<&str>) {
    let mut record = format!("{:<8.8}", keyword);

    if let Some(value) = value {
        record.push_str("= ");
        if value.starts_with('\'') {
            record.push_str(value);
        } else {
            // Fixed format: numbers and logicals end in column 30
            record.push_str(&format!("{:>20}", value));
        }
        if let Some(comment) = comment {
            record.push_str(" / ");
            record.push_str(comment);
        }
    }

    out.extend(fixed_record(&record));
}

fn push_commentary(out: &mut Vec<u8>, keyword: &str, text: &str) {
    let record = format!("{:<8.8}{}", keyword, text);
    out.extend(fixed_record(&record));
}

/// Clip or pad a record to exactly 80 ASCII bytes
fn fixed_record(record: &str) -> [u8; FITS_RECORD_SIZE] {
    let mut bytes = [b' '; FITS_RECORD_SIZE];
    for (slot, b) in bytes.iter_mut().zip(record.bytes().filter(u8::is_ascii)) {
        *slot = b;
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fits_header_set_get() {
        let mut header = FitsHeader::new();
        header.set_string("object", "M42");
        header.set_int("NAXIS1", 1024);
        header.set_float("EXPTIME", 30.5);
        header.set_bool("SIMPLE", true);

        assert_eq!(header.get_string("OBJECT"), Some("M42"));
        assert_eq!(header.get_int("naxis1"), Some(1024));
        assert_eq!(header.get_float("EXPTIME"), Some(30.5));
        assert_eq!(header.get_float("NAXIS1"), Some(1024.0));
        assert_eq!(header.get_bool("SIMPLE"), Some(true));
        assert_eq!(header.len(), 4);
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut header = FitsHeader::new();
        header.set_int("A", 1);
        header.set_int("B", 2);
        header.set_int("C", 3);

        assert_eq!(header.remove("b"), Some(FitsValue::Integer(2)));
        assert_eq!(header.remove("B"), None);
        assert_eq!(header.keys().collect::<Vec<_>>(), vec!["A", "C"]);
    }

    #[test]
    fn test_merge_missing_does_not_override() {
        let mut target = FitsHeader::new();
        target.set_string("OBJECT", "target");

        let mut source = FitsHeader::new();
        source.set_string("OBJECT", "from ccd");
        source.set_with_comment("EGAIN", FitsValue::Float(1.04), "electrons/DU");
        source.add_comment("written by the controller");

        assert_eq!(target.merge_missing(&source), 2);
        assert_eq!(target.get_string("OBJECT"), Some("target"));
        assert_eq!(target.get_float("EGAIN"), Some(1.04));
        assert_eq!(target.comment("EGAIN"), Some("electrons/DU"));
    }

    #[test]
    fn test_parse_value_field() {
        let (v, c) = parse_value_field("                 0.435 / arcsec/pixel");
        assert_eq!(v, FitsValue::Float(0.435));
        assert_eq!(c.as_deref(), Some("arcsec/pixel"));

        let (v, c) = parse_value_field("'[1:2048,1:2056]'   / data section");
        assert_eq!(v, FitsValue::String("[1:2048,1:2056]".to_string()));
        assert_eq!(c.as_deref(), Some("data section"));

        let (v, _) = parse_value_field("'O''Brien '");
        assert_eq!(v, FitsValue::String("O'Brien".to_string()));

        let (v, _) = parse_value_field("                    T");
        assert_eq!(v, FitsValue::Boolean(true));

        let (v, _) = parse_value_field("              1.5D+02");
        assert_eq!(v, FitsValue::Float(150.0));

        let (v, _) = parse_value_field("                  -42");
        assert_eq!(v, FitsValue::Integer(-42));
    }

    #[test]
    fn test_fits_round_trip_u16() {
        let pixels = array![[0u16, 1, 65535], [32768, 100, 7]];
        let mut header = FitsHeader::new();
        header.set_with_comment("EXPTIME", FitsValue::Float(12.5), "seconds");
        header.set_string("DATASEC", "[1:3,1:2]");
        header.add_comment("quadrant 1");

        let bytes = write_fits_to_bytes(&FitsImage::U16(pixels.clone()), &header).unwrap();
        assert_eq!(bytes.len() % FITS_BLOCK_SIZE, 0);

        let (image, read_header) = read_fits_from_bytes(&bytes).unwrap();
        assert_eq!(image, FitsImage::U16(pixels));
        assert_eq!(read_header.get_float("EXPTIME"), Some(12.5));
        assert_eq!(read_header.comment("EXPTIME"), Some("seconds"));
        assert_eq!(read_header.get_string("DATASEC"), Some("[1:3,1:2]"));
        assert_eq!(read_header.get_int("BZERO"), Some(32768));
    }

    #[test]
    fn test_scaled_int16_reads_as_f64() {
        let bytes =
            write_fits_to_bytes(&FitsImage::I16(array![[1i16, -3]]), &FitsHeader::new()).unwrap();

        // Scaling keywords are never copied from a header, so build one by hand
        let mut patched = Vec::new();
        push_record(&mut patched, "SIMPLE", Some("T"), None);
        push_record(&mut patched, "BITPIX", Some("16"), None);
        push_record(&mut patched, "NAXIS", Some("2"), None);
        push_record(&mut patched, "NAXIS1", Some("2"), None);
        push_record(&mut patched, "NAXIS2", Some("1"), None);
        push_record(&mut patched, "BSCALE", Some("2"), None);
        push_record(&mut patched, "BZERO", Some("10"), None);
        push_record(&mut patched, "END", None, None);
        pad_to_block(&mut patched, b' ');
        patched.extend_from_slice(&bytes[FITS_BLOCK_SIZE..]);

        let (image, _) = read_fits_from_bytes(&patched).unwrap();
        assert_eq!(image, FitsImage::F64(array![[12.0, 4.0]]));
    }

    #[test]
    fn test_rejects_cube() {
        let mut out = Vec::new();
        push_record(&mut out, "SIMPLE", Some("T"), None);
        push_record(&mut out, "BITPIX", Some("8"), None);
        push_record(&mut out, "NAXIS", Some("3"), None);
        push_record(&mut out, "END", None, None);
        pad_to_block(&mut out, b' ');

        assert!(matches!(read_fits_from_bytes(&out), Err(FitsError::Unsupported(_))));
    }

    #[test]
    fn test_truncated_data_is_rejected() {
        let bytes = write_fits_to_bytes(&FitsImage::F32(Array2::zeros((64, 64))), &FitsHeader::new())
            .unwrap();
        let truncated = &bytes[..FITS_BLOCK_SIZE + 100];
        assert!(matches!(read_fits_from_bytes(truncated), Err(FitsError::InvalidFormat(_))));
    }

    fn header_with_axes(naxis1: &str, naxis2: &str) -> Vec<u8> {
        let mut out = Vec::new();
        push_record(&mut out, "SIMPLE", Some("T"), None);
        push_record(&mut out, "BITPIX", Some("16"), None);
        push_record(&mut out, "NAXIS", Some("2"), None);
        push_record(&mut out, "NAXIS1", Some(naxis1), None);
        push_record(&mut out, "NAXIS2", Some(naxis2), None);
        push_record(&mut out, "END", None, None);
        pad_to_block(&mut out, b' ');
        out
    }

    #[test]
    fn test_overflowing_axes_are_rejected() {
        let bytes = header_with_axes("8589934592", "8589934592");
        assert!(matches!(read_fits_from_bytes(&bytes), Err(FitsError::InvalidFormat(_))));
    }

    #[test]
    fn test_oversized_image_is_rejected_before_reading() {
        let bytes = header_with_axes("100000", "100000");
        assert!(matches!(read_fits_from_bytes(&bytes), Err(FitsError::InvalidFormat(_))));
    }

    #[test]
    fn test_fits_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.fits");
        let pixels = array![[1.5f64, -2.25], [1e-9, 3.0e12]];
        let mut header = FitsHeader::new();
        header.set_string("IMAGETYP", "object");

        write_fits(&path, &FitsImage::F64(pixels.clone()), &header).unwrap();
        let (image, read_header) = read_fits(&path).unwrap();

        assert_eq!(image, FitsImage::F64(pixels));
        assert_eq!(read_header.get_string("IMAGETYP"), Some("object"));
        assert_eq!(read_header.get_int("BITPIX"), Some(-64));
    }
}
