//! Per-format dimension decoders.
//!
//! Each decoder assumes detection has already vetted the magic bytes and
//! reads the few header fields it needs through the [`ByteSource`]. Formats
//! whose headers can legitimately omit dimensions return `Option`; the rest
//! treat missing bytes as truncation.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bitreader::BitReader;
use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::detect::{find_svg_tag, is_space, skip_spaces, DETECT_WINDOW, SVG_WINDOW};
use crate::isobmff::{BoxWalker, Walk};
use crate::source::{
    be_u16_at, be_u32_at, byte_at, le_i32_at, le_u16_at, le_u32_at, u8_at, ByteSource,
};
use crate::{Error, ProbeConfig, Result, TryVec};

pub(crate) fn gif<S: ByteSource>(src: &mut S) -> Result<(u32, u32)> {
    Ok((le_u16_at(src, 6)?.into(), le_u16_at(src, 8)?.into()))
}

pub(crate) fn png<S: ByteSource>(src: &mut S) -> Result<(u32, u32)> {
    first_chunk_dimensions(src, b"IHDR", "IHDR not in place for PNG")
}

pub(crate) fn mng<S: ByteSource>(src: &mut S) -> Result<(u32, u32)> {
    first_chunk_dimensions(src, b"MHDR", "MHDR not in place for MNG")
}

fn first_chunk_dimensions<S: ByteSource>(
    src: &mut S,
    tag: &[u8; 4],
    complaint: &'static str,
) -> Result<(u32, u32)> {
    if src.slice(12, 4)?.as_deref() != Some(tag.as_slice()) {
        return Err(Error::Format(complaint));
    }
    Ok((be_u32_at(src, 16)?, be_u32_at(src, 20)?))
}

const JPEG_SOF_CODES: [u8; 13] = [
    0xc0, 0xc1, 0xc2, 0xc3, 0xc5, 0xc6, 0xc7, 0xc9, 0xca, 0xcb, 0xcd, 0xce, 0xcf,
];

/// Walk entropy-free segments until a start-of-frame marker.
pub(crate) fn jpeg<S: ByteSource>(src: &mut S) -> Result<(u32, u32)> {
    let mut offset = 2u64;
    loop {
        loop {
            match byte_at(src, offset)? {
                Some(0xff) => break,
                Some(_) => offset += 1,
                None => return Err(Error::Format("EOF in JPEG")),
            }
        }
        // fill bytes collapse into a single marker
        while byte_at(src, offset + 1)? == Some(0xff) {
            offset += 1;
        }
        let head = src.require(offset, 4)?;
        let code = head[1];
        let length = u64::from(BigEndian::read_u16(&head[2..4]));
        offset += 4;
        if JPEG_SOF_CODES.contains(&code) {
            // segment payload is precision byte, height, width
            let height = be_u16_at(src, offset + 1)?;
            let width = be_u16_at(src, offset + 3)?;
            return Ok((width.into(), height.into()));
        }
        if length < 2 {
            return Err(Error::Format("invalid JPEG segment length"));
        }
        offset += length - 2;
    }
}

pub(crate) fn bmp<S: ByteSource>(src: &mut S) -> Result<(u32, u32)> {
    let header_size = le_u32_at(src, 14)?;
    if header_size == 12 {
        // BITMAPCOREHEADER keeps unsigned 16-bit dimensions
        Ok((le_u16_at(src, 18)?.into(), le_u16_at(src, 20)?.into()))
    } else {
        // height is negative for top-down rows
        let width = le_i32_at(src, 18)?.unsigned_abs();
        let height = le_i32_at(src, 22)?.unsigned_abs();
        Ok((width, height))
    }
}

pub(crate) fn pnm<S: ByteSource>(src: &mut S) -> Result<(u32, u32)> {
    let head = match src.slice(0, DETECT_WINDOW)? {
        Some(head) => head,
        None => return Err(Error::TruncatedData),
    };
    let mut rest = &head[2..];
    let width = pnm_number(&mut rest);
    let height = pnm_number(&mut rest);
    width
        .zip(height)
        .ok_or(Error::Format("dimensions not found in PNM header"))
}

fn pnm_number(rest: &mut &[u8]) -> Option<u32> {
    loop {
        *rest = skip_spaces(rest);
        if rest.first() != Some(&b'#') {
            break;
        }
        let eol = rest
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
            .unwrap_or(rest.len());
        *rest = &rest[eol..];
    }
    take_decimal(rest)
}

pub(crate) fn pam<S: ByteSource>(src: &mut S) -> Result<Option<(u32, u32)>> {
    let mut width = None;
    let mut height = None;
    let mut offset = 3u64;
    while width.is_none() || height.is_none() {
        if byte_at(src, offset)? == Some(b'#') {
            loop {
                offset += 1;
                match byte_at(src, offset)? {
                    Some(b'\n') | None => break,
                    Some(_) => {}
                }
            }
            offset += 1;
            continue;
        }
        let chunk = match src.slice(offset, 32)? {
            Some(chunk) if !chunk.is_empty() => chunk,
            _ => return Err(Error::Format("EOF in PAM header")),
        };
        let eol = chunk
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(Error::Format("unterminated line in PAM header"))?;
        let line = &chunk[..eol];
        if let Some(value) = pam_number(line, b"WIDTH") {
            width = Some(value);
        } else if let Some(value) = pam_number(line, b"HEIGHT") {
            height = Some(value);
        } else if line == b"ENDHDR" {
            break;
        } else if pam_number(line, b"DEPTH").is_some()
            || pam_number(line, b"MAXVAL").is_some()
            || is_pam_tupltype(line)
        {
            // ignored fields
        } else {
            return Err(Error::Format("unexpected data in PAM header"));
        }
        offset += eol as u64 + 1;
    }
    Ok(width.zip(height))
}

fn pam_number(line: &[u8], name: &[u8]) -> Option<u32> {
    let mut rest = line.strip_prefix(name)?.strip_prefix(b" ")?;
    let value = take_decimal(&mut rest)?;
    if rest.is_empty() { Some(value) } else { None }
}

fn is_pam_tupltype(line: &[u8]) -> bool {
    match line.strip_prefix(b"TUPLTYPE ") {
        Some(rest) => !rest.is_empty() && rest.iter().all(|&b| !is_space(b)),
        None => false,
    }
}

pub(crate) fn xbm<S: ByteSource>(src: &mut S) -> Result<(u32, u32)> {
    let head = match src.slice(0, DETECT_WINDOW)? {
        Some(head) => head,
        None => return Err(Error::TruncatedData),
    };
    let mut rest = &head[..];
    let mut found = [None; 2];
    for slot in &mut found {
        while let Some(at) = find_ci(rest, b"#define") {
            rest = &rest[at + 7..];
            let mut tail = skip_spaces(rest);
            let name_len = tail.iter().take_while(|&&b| !is_space(b)).count();
            tail = skip_spaces(&tail[name_len..]);
            if let Some(value) = take_decimal(&mut tail) {
                *slot = Some(value);
                rest = tail;
                break;
            }
        }
    }
    match found {
        [Some(width), Some(height)] => Ok((width, height)),
        _ => Err(Error::Format("dimensions not found in XBM header")),
    }
}

/// Grow the inspected prefix until the values string shows up; XPM keeps
/// it behind an arbitrary amount of comments and macros.
pub(crate) fn xpm<S: ByteSource>(src: &mut S) -> Result<(u32, u32)> {
    let mut window = DETECT_WINDOW;
    loop {
        let data = match src.slice(0, window)? {
            Some(data) => data,
            None => return Err(Error::Format("XPM size not found")),
        };
        if let Some(dimensions) = xpm_values(&data) {
            return Ok(dimensions);
        }
        if data.len() != window {
            return Err(Error::Format("XPM size not found"));
        }
        window += DETECT_WINDOW;
    }
}

fn xpm_values(data: &[u8]) -> Option<(u32, u32)> {
    let mut rest = data;
    while let Some(at) = rest.iter().position(|&b| b == b'"') {
        rest = &rest[at + 1..];
        if let Some(dimensions) = xpm_quoted(rest) {
            return Some(dimensions);
        }
    }
    None
}

/// `"<columns> <rows> <colors> <chars-per-pixel> [<x-hotspot> <y-hotspot>]"`
fn xpm_quoted(mut rest: &[u8]) -> Option<(u32, u32)> {
    rest = skip_spaces(rest);
    let mut values = [0u32; 6];
    let mut count = 0;
    while count < values.len() {
        match take_decimal(&mut rest) {
            Some(value) => {
                values[count] = value;
                count += 1;
            }
            None => break,
        }
        let before = rest.len();
        rest = skip_spaces(rest);
        if rest.len() == before {
            break;
        }
    }
    if (count == 4 || count == 6) && rest.first() == Some(&b'"') {
        Some((values[0], values[1]))
    } else {
        None
    }
}

pub(crate) fn psd<S: ByteSource>(src: &mut S) -> Result<(u32, u32)> {
    // rows before columns
    Ok((be_u32_at(src, 18)?, be_u32_at(src, 14)?))
}

pub(crate) fn tiff<S: ByteSource>(src: &mut S) -> Result<(u32, u32)> {
    let little = src.require(0, 4)?.starts_with(b"II");
    let mut offset = u64::from(tiff_u32(&src.require(4, 4)?, little));
    let entries = tiff_u16(&src.require(offset, 2)?, little);
    offset += 2;
    let end = offset + u64::from(entries) * 12;

    let mut width = None;
    let mut height = None;
    loop {
        if let Some(dimensions) = width.zip(height) {
            return Ok(dimensions);
        }
        if offset >= end {
            return Err(Error::Format("reached end of directory entries in TIFF"));
        }
        let entry = src.require(offset, 12)?;
        offset += 12;
        let value = match tiff_u16(&entry[2..4], little) {
            1 => u32::from(entry[8]),
            3 | 8 => tiff_u16(&entry[8..10], little).into(),
            4 | 9 => tiff_u32(&entry[8..12], little),
            6 => u32::try_from(entry[8] as i8)
                .map_err(|_| Error::Format("negative dimension in TIFF entry"))?,
            _ => continue,
        };
        match tiff_u16(&entry[0..2], little) {
            0x0100 => width = Some(value),
            0x0101 => height = Some(value),
            _ => {}
        }
    }
}

fn tiff_u16(raw: &[u8], little: bool) -> u16 {
    if little { LittleEndian::read_u16(raw) } else { BigEndian::read_u16(raw) }
}

fn tiff_u32(raw: &[u8], little: bool) -> u32 {
    if little { LittleEndian::read_u32(raw) } else { BigEndian::read_u32(raw) }
}

pub(crate) fn pcx<S: ByteSource>(src: &mut S) -> Result<(u32, u32)> {
    let raw = src.require(4, 8)?;
    let side = |min: i32, max: i32| {
        u32::try_from(max - min + 1).map_err(|_| Error::Format("negative dimension in PCX window"))
    };
    let x_min = i32::from(LittleEndian::read_u16(&raw[0..2]));
    let y_min = i32::from(LittleEndian::read_u16(&raw[2..4]));
    let x_max = i32::from(LittleEndian::read_u16(&raw[4..6]));
    let y_max = i32::from(LittleEndian::read_u16(&raw[6..8]));
    Ok((side(x_min, x_max)?, side(y_min, y_max)?))
}

/// The stage RECT is five bit fields: a 5-bit width, then four
/// twips coordinates of that width.
pub(crate) fn swf<S: ByteSource>(src: &mut S) -> Result<(u32, u32)> {
    let bits = u8_at(src, 8)? >> 3;
    let total_bits = 5 + u32::from(bits) * 4;
    let raw = src.require(8, (total_bits / 8 + 1) as usize)?;
    let mut reader = BitReader::new(&raw);
    reader.skip(5)?;
    let mut values = [0u32; 4];
    for value in &mut values {
        *value = reader.read_u32(bits)?;
    }
    let [x_min, x_max, y_min, y_max] = values;
    let side = |min: u32, max: u32| {
        max.checked_sub(min)
            .map(|twips| twips / 20)
            .ok_or(Error::Format("negative dimension in SWF stage rect"))
    };
    Ok((side(x_min, x_max)?, side(y_min, y_max)?))
}

pub(crate) fn svg<S: ByteSource>(src: &mut S, config: &ProbeConfig) -> Result<Option<(u32, u32)>> {
    let tag = svg_tag(src)?;
    let mut width = None;
    let mut height = None;
    for (name, value) in (SvgAttributes { rest: &tag }) {
        match name {
            b"width" => width = Some(svg_length(value, config.dpi)?),
            b"height" => height = Some(svg_length(value, config.dpi)?),
            _ => {}
        }
    }
    Ok(width.flatten().zip(height.flatten()))
}

fn svg_tag<S: ByteSource>(src: &mut S) -> Result<TryVec<u8>> {
    for window in [DETECT_WINDOW, SVG_WINDOW] {
        if let Some(data) = src.slice(0, window)? {
            if let Some(range) = find_svg_tag(&data) {
                let mut tag = TryVec::new();
                tag.extend_from_slice(&data[range])?;
                return Ok(tag);
            }
        }
    }
    Err(Error::Format("SVG tag not found"))
}

/// `name=value` pairs with single-quoted, double-quoted, or bare values.
struct SvgAttributes<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for SvgAttributes<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let eq = self.rest.iter().position(|&b| b == b'=')?;
            let name_len = self.rest[..eq].iter().rev().take_while(|&&b| !is_space(b)).count();
            let name = &self.rest[eq - name_len..eq];
            let after = &self.rest[eq + 1..];
            let (value, next) = match after.first() {
                Some(&quote @ (b'\'' | b'"')) => {
                    match after[1..].iter().position(|&b| b == quote) {
                        Some(close) => (&after[1..close + 1], &after[close + 2..]),
                        None => {
                            self.rest = b"";
                            return None;
                        }
                    }
                }
                _ => {
                    let len = after
                        .iter()
                        .take_while(|&&b| !is_space(b) && b != b'\'' && b != b'"')
                        .count();
                    (&after[..len], &after[len..])
                }
            };
            self.rest = next;
            if !name.is_empty() {
                return Some((name, value));
            }
        }
    }
}

/// Convert a CSS length to pixels. Font-relative and percentage units have
/// no absolute pixel value.
fn svg_length(raw: &[u8], dpi: f64) -> Result<Option<u32>> {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim().to_ascii_lowercase();
    if ["em", "ex", "%"].iter().any(|unit| text.ends_with(unit)) {
        return Ok(None);
    }
    let (number, scale) = if let Some(rest) = text.strip_suffix("in") {
        (rest, dpi)
    } else if let Some(rest) = text.strip_suffix("cm") {
        (rest, dpi / 2.54)
    } else if let Some(rest) = text.strip_suffix("mm") {
        (rest, dpi / 25.4)
    } else if let Some(rest) = text.strip_suffix("pt") {
        (rest, dpi / 72.0)
    } else if let Some(rest) = text.strip_suffix("pc") {
        (rest, dpi / 6.0)
    } else if let Some(rest) = text.strip_suffix("px") {
        (rest, 1.0)
    } else {
        (text.as_str(), 1.0)
    };
    let pixels = (leading_f64(number) * scale).round();
    if (0.0..=f64::from(u32::MAX)).contains(&pixels) {
        Ok(Some(pixels as u32))
    } else {
        Err(Error::Format("SVG dimension out of range"))
    }
}

/// Longest numeric prefix, like Ruby's `String#to_f` or C's `strtod`;
/// no prefix parses as zero.
fn leading_f64(text: &str) -> f64 {
    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(&(b'+' | b'-'))) {
        end += 1;
    }
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    if bytes.get(end) == Some(&b'.') {
        end += 1;
        while bytes.get(end).is_some_and(u8::is_ascii_digit) {
            end += 1;
        }
    }
    let mantissa_end = end;
    if matches!(bytes.get(end), Some(&(b'e' | b'E'))) {
        end += 1;
        if matches!(bytes.get(end), Some(&(b'+' | b'-'))) {
            end += 1;
        }
        if bytes.get(end).is_some_and(u8::is_ascii_digit) {
            while bytes.get(end).is_some_and(u8::is_ascii_digit) {
                end += 1;
            }
        } else {
            end = mantissa_end;
        }
    }
    text[..end].parse().unwrap_or(0.0)
}

pub(crate) fn ico<S: ByteSource>(src: &mut S) -> Result<(u32, u32)> {
    let raw = src.require(6, 2)?;
    // zero encodes the 256-pixel maximum
    let side = |v: u8| if v == 0 { 256 } else { u32::from(v) };
    Ok((side(raw[0]), side(raw[1])))
}

pub(crate) fn webp<S: ByteSource>(src: &mut S) -> Result<Option<(u32, u32)>> {
    match &src.require(12, 4)?[..] {
        b"VP8 " => {
            let width = le_u16_at(src, 26)? & 0x3fff;
            let height = le_u16_at(src, 28)? & 0x3fff;
            Ok(Some((width.into(), height.into())))
        }
        b"VP8L" => {
            let packed = le_u32_at(src, 21)?;
            Ok(Some(((packed & 0x3fff) + 1, ((packed >> 14) & 0x3fff) + 1)))
        }
        b"VP8X" => {
            let raw = src.require(24, 6)?;
            let width = u32::from(LittleEndian::read_u16(&raw[0..2])) | u32::from(raw[2]) << 16;
            let height = u32::from(LittleEndian::read_u16(&raw[3..5])) | u32::from(raw[5]) << 16;
            Ok(Some((width + 1, height + 1)))
        }
        _ => Ok(None),
    }
}

const JP2_WALKER: BoxWalker = BoxWalker::new(&[b"jp2h"], &[], &[b"jp2h"]);

pub(crate) fn jp2<S: ByteSource>(src: &mut S) -> Result<Option<(u32, u32)>> {
    let mut dimensions = None;
    JP2_WALKER.recurse(src, 0, None, &mut |src, info| {
        if info.fourcc == *b"ihdr" {
            let raw = src.require(info.data_offset(), 8)?;
            // height before width
            dimensions = Some((BigEndian::read_u32(&raw[4..8]), BigEndian::read_u32(&raw[0..4])));
            return Ok(Walk::Stop);
        }
        Ok(Walk::Continue)
    })?;
    Ok(dimensions)
}

pub(crate) fn j2c<S: ByteSource>(src: &mut S) -> Result<(u32, u32)> {
    Ok((be_u32_at(src, 8)?, be_u32_at(src, 12)?))
}

pub(crate) fn emf<S: ByteSource>(src: &mut S, config: &ProbeConfig) -> Result<(u32, u32)> {
    let raw = src.require(24, 16)?;
    let left = i64::from(LittleEndian::read_i32(&raw[0..4]));
    let top = i64::from(LittleEndian::read_i32(&raw[4..8]));
    let right = i64::from(LittleEndian::read_i32(&raw[8..12]));
    let bottom = i64::from(LittleEndian::read_i32(&raw[12..16]));
    // the frame rectangle is in hundredths of a millimeter
    let side = |span: i64| {
        let pixels = (span as f64 * config.dpi / 2540.0).round();
        if (0.0..=f64::from(u32::MAX)).contains(&pixels) {
            Ok(pixels as u32)
        } else {
            Err(Error::Format("EMF frame out of range"))
        }
    };
    Ok((side(right - left + 1)?, side(bottom - top + 1)?))
}

pub(crate) fn take_decimal(rest: &mut &[u8]) -> Option<u32> {
    let len = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    if len == 0 {
        return None;
    }
    let mut value = 0u32;
    for &digit in &rest[..len] {
        value = value.checked_mul(10)?.checked_add(u32::from(digit - b'0'))?;
    }
    *rest = &rest[len..];
    Some(value)
}

fn find_ci(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w.eq_ignore_ascii_case(needle))
}

#[cfg(test)]
use crate::source::SliceSource;

#[test]
fn jpeg_skips_non_frame_segments() {
    let mut data = vec![0xff, 0xd8];
    // APP0 with 14 payload bytes
    data.extend_from_slice(&[0xff, 0xe0, 0x00, 0x10]);
    data.extend_from_slice(b"JFIF\0\x01\x02\0\0\x48\0\x48\0\0");
    // fill bytes before SOF0
    data.extend_from_slice(&[0xff, 0xff, 0xff, 0xc0, 0x00, 0x11, 0x08]);
    data.extend_from_slice(&532u16.to_be_bytes());
    data.extend_from_slice(&640u16.to_be_bytes());
    assert_eq!(jpeg(&mut SliceSource::new(&data)).unwrap(), (640, 532));
}

#[test]
fn jpeg_without_frame_is_an_error() {
    let data = [0xff, 0xd8, 0x00, 0x00];
    assert!(matches!(jpeg(&mut SliceSource::new(&data)), Err(Error::Format(_))));
}

#[test]
fn jpeg_zero_length_segment_is_an_error() {
    let data = [0xff, 0xd8, 0xff, 0xe0, 0x00, 0x00];
    assert!(matches!(jpeg(&mut SliceSource::new(&data)), Err(Error::Format(_))));
}

#[test]
fn bmp_core_and_info_headers() {
    let mut core = vec![0u8; 22];
    core[14] = 12;
    core[18..20].copy_from_slice(&40u16.to_le_bytes());
    core[20..22].copy_from_slice(&30u16.to_le_bytes());
    assert_eq!(bmp(&mut SliceSource::new(&core)).unwrap(), (40, 30));

    let mut info = vec![0u8; 26];
    info[14] = 40;
    info[18..22].copy_from_slice(&640i32.to_le_bytes());
    info[22..26].copy_from_slice(&(-480i32).to_le_bytes());
    assert_eq!(bmp(&mut SliceSource::new(&info)).unwrap(), (640, 480));
}

#[test]
fn pnm_allows_comments_between_numbers() {
    let data = b"P6\n# a comment\n 640 # another\n480\n255\n";
    assert_eq!(pnm(&mut SliceSource::new(data)).unwrap(), (640, 480));
}

#[test]
fn pam_header_fields() {
    let data = b"P7\nWIDTH 12\n# note\nDEPTH 4\nMAXVAL 255\nTUPLTYPE RGB_ALPHA\nHEIGHT 8\nENDHDR\n";
    assert_eq!(pam(&mut SliceSource::new(data)).unwrap(), Some((12, 8)));
}

#[test]
fn pam_header_without_height() {
    let data = b"P7\nWIDTH 12\nENDHDR\n";
    assert_eq!(pam(&mut SliceSource::new(data)).unwrap(), None);
}

#[test]
fn pam_rejects_unknown_fields() {
    let data = b"P7\nWIDTH 12\nBOGUS 1\n";
    assert!(matches!(pam(&mut SliceSource::new(data)), Err(Error::Format(_))));
}

#[test]
fn xbm_defines() {
    let data = b"#define test_width 16\n#define test_height 7\nstatic char test_bits[] = {\n";
    assert_eq!(xbm(&mut SliceSource::new(data)).unwrap(), (16, 7));
    assert!(matches!(
        xbm(&mut SliceSource::new(b"#define test_width 16\n")),
        Err(Error::Format(_))
    ));
}

#[test]
fn xpm_values_string() {
    let data = b"/* XPM */\nstatic char *x[] = {\n\"16 7 2 1\",\n";
    assert_eq!(xpm(&mut SliceSource::new(data)).unwrap(), (16, 7));
    // hotspot variant has six values
    let data = b"/* XPM */\n\"48 4 1 1 3 2\",\n";
    assert_eq!(xpm(&mut SliceSource::new(data)).unwrap(), (48, 4));
    // a five-value string is not the values string
    let data = b"/* XPM */\n\"1 2 3 4 5\",\n";
    assert!(matches!(xpm(&mut SliceSource::new(data)), Err(Error::Format(_))));
}

#[test]
fn xpm_values_beyond_first_window() {
    let mut data = Vec::new();
    data.extend_from_slice(b"/* XPM */\n/* ");
    data.resize(1500, b'x');
    data.extend_from_slice(b" */\n\"10 20 2 1\",\n");
    assert_eq!(xpm(&mut SliceSource::new(&data)).unwrap(), (10, 20));
}

#[test]
fn tiff_directory_lookup() {
    let mut data = Vec::new();
    data.extend_from_slice(b"II*\0");
    data.extend_from_slice(&8u32.to_le_bytes());
    data.extend_from_slice(&2u16.to_le_bytes());
    // tag 0x0100, SHORT, count 1, value 640
    data.extend_from_slice(&0x0100u16.to_le_bytes());
    data.extend_from_slice(&3u16.to_le_bytes());
    data.extend_from_slice(&1u32.to_le_bytes());
    data.extend_from_slice(&640u32.to_le_bytes());
    // tag 0x0101, LONG, count 1, value 480
    data.extend_from_slice(&0x0101u16.to_le_bytes());
    data.extend_from_slice(&4u16.to_le_bytes());
    data.extend_from_slice(&1u32.to_le_bytes());
    data.extend_from_slice(&480u32.to_le_bytes());
    assert_eq!(tiff(&mut SliceSource::new(&data)).unwrap(), (640, 480));
}

#[test]
fn tiff_directory_without_height_is_an_error() {
    let mut data = Vec::new();
    data.extend_from_slice(b"II*\0");
    data.extend_from_slice(&8u32.to_le_bytes());
    data.extend_from_slice(&1u16.to_le_bytes());
    data.extend_from_slice(&0x0100u16.to_le_bytes());
    data.extend_from_slice(&3u16.to_le_bytes());
    data.extend_from_slice(&1u32.to_le_bytes());
    data.extend_from_slice(&640u32.to_le_bytes());
    assert!(matches!(tiff(&mut SliceSource::new(&data)), Err(Error::Format(_))));
}

#[test]
fn swf_stage_rect() {
    // 15-bit fields: 0..11000, 0..8000 twips is 550x400 pixels
    let mut bits = String::new();
    bits.push_str("01111");
    for value in [0u32, 11000, 0, 8000] {
        bits.push_str(&format!("{value:015b}"));
    }
    while bits.len() % 8 != 0 {
        bits.push('0');
    }
    let mut data = vec![0u8; 8];
    data[..3].copy_from_slice(b"FWS");
    for chunk in bits.as_bytes().chunks(8) {
        let byte = chunk.iter().fold(0u8, |acc, &b| (acc << 1) | (b - b'0'));
        data.push(byte);
    }
    data.push(0);
    assert_eq!(swf(&mut SliceSource::new(&data)).unwrap(), (550, 400));
}

#[test]
fn svg_unit_conversions() {
    let config = ProbeConfig::default();
    let probe = |tag: &[u8]| svg(&mut SliceSource::new(tag), &config).unwrap();
    assert_eq!(probe(b"<svg width=\"10cm\" height=\"5cm\">"), Some((283, 142)));
    assert_eq!(probe(b"<svg width='2in' height='1.5in'>"), Some((144, 108)));
    assert_eq!(probe(b"<svg width=96px height=48>"), Some((96, 48)));
    assert_eq!(probe(b"<svg width=\"10em\" height=\"10em\">"), None);
    assert_eq!(probe(b"<svg width=\"50%\" height=\"50%\">"), None);
    assert_eq!(probe(b"<svg viewBox=\"0 0 10 10\">"), None);

    let config = ProbeConfig::default().with_dpi(300.0);
    let (width, height) =
        svg(&mut SliceSource::new(b"<svg width='1in' height='2in'>"), &config)
            .unwrap()
            .unwrap();
    assert_eq!((width, height), (300, 600));
}

#[test]
fn svg_lenient_number_parsing() {
    assert_eq!(leading_f64("10.5"), 10.5);
    assert_eq!(leading_f64("-3"), -3.0);
    assert_eq!(leading_f64("2e2"), 200.0);
    assert_eq!(leading_f64("7junk"), 7.0);
    assert_eq!(leading_f64("junk"), 0.0);
    assert_eq!(leading_f64("3e"), 3.0);
}

#[test]
fn webp_variants() {
    let mut vp8 = b"RIFF\0\0\0\0WEBPVP8 ".to_vec();
    vp8.resize(26, 0);
    vp8.extend_from_slice(&25u16.to_le_bytes());
    vp8.extend_from_slice(&12u16.to_le_bytes());
    assert_eq!(webp(&mut SliceSource::new(&vp8)).unwrap(), Some((25, 12)));

    let mut vp8l = b"RIFF\0\0\0\0WEBPVP8L".to_vec();
    vp8l.resize(21, 0);
    let packed = (24u32) | (11u32 << 14);
    vp8l.extend_from_slice(&packed.to_le_bytes());
    assert_eq!(webp(&mut SliceSource::new(&vp8l)).unwrap(), Some((25, 12)));

    let mut vp8x = b"RIFF\0\0\0\0WEBPVP8X".to_vec();
    vp8x.resize(24, 0);
    vp8x.extend_from_slice(&[0x18, 0x00, 0x01]); // width - 1 = 0x10018
    vp8x.extend_from_slice(&[0x0b, 0x00, 0x00]); // height - 1 = 11
    assert_eq!(webp(&mut SliceSource::new(&vp8x)).unwrap(), Some((0x10019, 12)));

    let unknown = b"RIFF\0\0\0\0WEBPXXXX";
    assert_eq!(webp(&mut SliceSource::new(unknown)).unwrap(), None);
}

#[test]
fn jp2_header_box() {
    let mut ihdr = Vec::new();
    ihdr.extend_from_slice(&16u32.to_be_bytes());
    ihdr.extend_from_slice(b"ihdr");
    ihdr.extend_from_slice(&480u32.to_be_bytes());
    ihdr.extend_from_slice(&640u32.to_be_bytes());
    let mut data = Vec::new();
    data.extend_from_slice(&12u32.to_be_bytes());
    data.extend_from_slice(b"jP  \r\n\x87\n");
    data.extend_from_slice(&16u32.to_be_bytes());
    data.extend_from_slice(b"ftypjp2 \0\0\0\0");
    data.extend_from_slice(&(ihdr.len() as u32 + 8).to_be_bytes());
    data.extend_from_slice(b"jp2h");
    data.extend_from_slice(&ihdr);
    assert_eq!(jp2(&mut SliceSource::new(&data)).unwrap(), Some((640, 480)));
}

#[test]
fn emf_frame_rectangle() {
    let mut data = vec![0u8; 24];
    data[..4].copy_from_slice(&[1, 0, 0, 0]);
    for value in [0i32, 0, 2539, 5079] {
        data.extend_from_slice(&value.to_le_bytes());
    }
    let config = ProbeConfig::default();
    assert_eq!(emf(&mut SliceSource::new(&data), &config).unwrap(), (72, 144));
}
