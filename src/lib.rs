#![deny(unsafe_code)]
//! Measure images without decoding them.
//!
//! Finds the format and pixel dimensions of an image by reading only the
//! header bytes the format requires, whether the image sits in memory, in a
//! seekable or forward-only stream, or behind an HTTP range fetcher.
//!
//! ```
//! use image_extents::ImageInfo;
//!
//! let data = b"GIF89a\x0a\x00\x14\x00rest doesn't matter";
//! let info = ImageInfo::from_bytes(data).unwrap().unwrap();
//! assert_eq!(info.format.name(), "gif");
//! assert_eq!(info.dimensions.unwrap().to_string(), "10x20");
//! ```

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::{Read, Seek};

use fallible_collections::TryReserveError;

mod detect;
mod formats;
mod heif;
mod isobmff;
mod media_types;
pub mod source;

pub use crate::source::{
    ByteSource, ChunkSource, FetchResponse, RangeFetcher, RemoteSource, SeekSource, SliceSource,
    StreamSource, DEFAULT_CHUNK_SIZE,
};

#[doc(hidden)]
pub type TryVec<T> = fallible_collections::TryVec<T>;

/// Describes probe failures.
///
/// This enum wraps the standard `io::Error` type, unified with
/// our own parser error states and those of crates we use.
#[derive(Debug)]
pub enum Error {
    /// Parse error caused by corrupt or malformed data.
    Format(&'static str),
    /// Header bytes the detected format requires are missing.
    TruncatedData,
    /// Propagate underlying errors from `std::io`.
    Io(std::io::Error),
    /// Out of memory
    OutOfMemory,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::Format(s) => s,
            Self::TruncatedData => "EOF",
            Self::Io(err) => return err.fmt(f),
            Self::OutOfMemory => "OOM",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::TruncatedData,
            _ => Self::Io(err),
        }
    }
}

impl From<bitreader::BitReaderError> for Error {
    #[cold]
    fn from(err: bitreader::BitReaderError) -> Self {
        log::warn!("bitreader: {err}");
        Self::Format("truncated bits")
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        let kind = match err {
            Error::Format(_) => std::io::ErrorKind::InvalidData,
            Error::TruncatedData => std::io::ErrorKind::UnexpectedEof,
            Error::Io(io_err) => return io_err,
            Error::OutOfMemory => std::io::ErrorKind::OutOfMemory,
        };
        Self::new(kind, err)
    }
}

/// Result shorthand using our Error enum.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Recognized image container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Format {
    Gif,
    Png,
    Apng,
    Mng,
    Jpeg,
    Bmp,
    Pbm,
    Pgm,
    Ppm,
    Pam,
    Xbm,
    Xpm,
    Tiff,
    Webp,
    Psd,
    Swf,
    Svg,
    Pcx,
    Ico,
    Cur,
    Jp2,
    Jpx,
    J2c,
    Emf,
    Avif,
    Heic,
}

impl Format {
    /// Conventional lowercase name, matching the usual file extension.
    pub fn name(self) -> &'static str {
        match self {
            Self::Gif => "gif",
            Self::Png => "png",
            Self::Apng => "apng",
            Self::Mng => "mng",
            Self::Jpeg => "jpeg",
            Self::Bmp => "bmp",
            Self::Pbm => "pbm",
            Self::Pgm => "pgm",
            Self::Ppm => "ppm",
            Self::Pam => "pam",
            Self::Xbm => "xbm",
            Self::Xpm => "xpm",
            Self::Tiff => "tiff",
            Self::Webp => "webp",
            Self::Psd => "psd",
            Self::Swf => "swf",
            Self::Svg => "svg",
            Self::Pcx => "pcx",
            Self::Ico => "ico",
            Self::Cur => "cur",
            Self::Jp2 => "jp2",
            Self::Jpx => "jpx",
            Self::J2c => "j2c",
            Self::Emf => "emf",
            Self::Avif => "avif",
            Self::Heic => "heic",
        }
    }

    /// The media type commonly used for the format.
    pub fn media_type(self) -> &'static str {
        self.media_types()[0]
    }

    /// All media types for the format:
    /// * commonly used and official, like for apng and ico
    /// * main and compatible, like for heic and the portable anymaps
    /// * multiple unregistered, like for mng
    pub fn media_types(self) -> &'static [&'static str] {
        media_types::media_types(self)
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Probe settings. Only affects formats with physical units: SVG lengths
/// in `in`/`cm`/`mm`/`pt`/`pc` and the EMF frame rectangle.
#[derive(Debug, Clone, Copy)]
pub struct ProbeConfig {
    pub dpi: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { dpi: 72.0 }
    }
}

impl ProbeConfig {
    pub fn with_dpi(mut self, dpi: f64) -> Self {
        self.dpi = dpi;
        self
    }
}

/// Detected format and dimensions of an image.
///
/// `dimensions` is `None` for the few formats that can legitimately omit
/// them, like an SVG sized in font-relative units or a HEIF whose primary
/// item carries no size property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: Format,
    pub dimensions: Option<Dimensions>,
}

impl ImageInfo {
    /// Probe an in-memory image.
    pub fn from_bytes(data: &[u8]) -> Result<Option<Self>> {
        Self::from_bytes_with_config(data, &ProbeConfig::default())
    }

    pub fn from_bytes_with_config(data: &[u8], config: &ProbeConfig) -> Result<Option<Self>> {
        Self::from_source(&mut SliceSource::new(data), config)
    }

    /// Probe a seekable stream, caching pages so each is read at most once.
    pub fn from_seekable<R: Read + Seek>(io: R) -> Result<Option<Self>> {
        Self::from_seekable_with_config(io, &ProbeConfig::default())
    }

    pub fn from_seekable_with_config<R: Read + Seek>(
        io: R,
        config: &ProbeConfig,
    ) -> Result<Option<Self>> {
        Self::from_source(&mut SeekSource::new(io), config)
    }

    /// Probe a forward-only stream. Consumed pages stay cached, so probing
    /// never loses the ability to re-read earlier header bytes.
    pub fn from_stream<R: Read>(io: R) -> Result<Option<Self>> {
        Self::from_stream_with_config(io, &ProbeConfig::default())
    }

    pub fn from_stream_with_config<R: Read>(io: R, config: &ProbeConfig) -> Result<Option<Self>> {
        Self::from_source(&mut StreamSource::new(io), config)
    }

    /// Probe a remote resource through a [`RangeFetcher`].
    pub fn from_fetcher<F: RangeFetcher>(fetcher: F) -> Result<Option<Self>> {
        Self::from_fetcher_with_config(fetcher, &ProbeConfig::default())
    }

    pub fn from_fetcher_with_config<F: RangeFetcher>(
        fetcher: F,
        config: &ProbeConfig,
    ) -> Result<Option<Self>> {
        Self::from_source(&mut RemoteSource::new(fetcher), config)
    }

    /// Probe any [`ByteSource`]. Returns `Ok(None)` when no known format
    /// signature matches.
    pub fn from_source<S: ByteSource>(src: &mut S, config: &ProbeConfig) -> Result<Option<Self>> {
        let Some(format) = detect::detect(src)? else {
            return Ok(None);
        };
        let dimensions = match format {
            Format::Gif => Some(formats::gif(src)?),
            Format::Png | Format::Apng => Some(formats::png(src)?),
            Format::Mng => Some(formats::mng(src)?),
            Format::Jpeg => Some(formats::jpeg(src)?),
            Format::Bmp => Some(formats::bmp(src)?),
            Format::Pbm | Format::Pgm | Format::Ppm => Some(formats::pnm(src)?),
            Format::Pam => formats::pam(src)?,
            Format::Xbm => Some(formats::xbm(src)?),
            Format::Xpm => Some(formats::xpm(src)?),
            Format::Tiff => Some(formats::tiff(src)?),
            Format::Pcx => Some(formats::pcx(src)?),
            Format::Swf => Some(formats::swf(src)?),
            Format::Svg => formats::svg(src, config)?,
            Format::Ico | Format::Cur => Some(formats::ico(src)?),
            Format::Webp => formats::webp(src)?,
            Format::Psd => Some(formats::psd(src)?),
            Format::Jp2 | Format::Jpx => formats::jp2(src)?,
            Format::J2c => Some(formats::j2c(src)?),
            Format::Emf => Some(formats::emf(src, config)?),
            Format::Avif | Format::Heic => heif::dimensions(src)?,
        };
        Ok(Some(Self {
            format,
            dimensions: dimensions.map(|(width, height)| Dimensions { width, height }),
        }))
    }
}

#[test]
fn dimensions_display() {
    let dimensions = Dimensions { width: 640, height: 480 };
    assert_eq!(dimensions.to_string(), "640x480");
}

#[test]
fn format_names_and_media_types() {
    assert_eq!(Format::Jpeg.to_string(), "jpeg");
    assert_eq!(Format::Jpeg.media_type(), "image/jpeg");
    assert_eq!(Format::Ico.media_types(), ["image/x-icon", "image/vnd.microsoft.icon"]);
    assert_eq!(Format::Pgm.media_types()[1], "image/x-portable-anymap");
}

#[test]
fn unknown_data_probes_as_none() {
    assert_eq!(ImageInfo::from_bytes(b"").unwrap(), None);
    assert_eq!(ImageInfo::from_bytes(b"hello world").unwrap(), None);
}

#[test]
fn short_data_of_a_known_format_is_truncated() {
    assert!(matches!(ImageInfo::from_bytes(b"GIF89a"), Err(Error::TruncatedData)));
}
