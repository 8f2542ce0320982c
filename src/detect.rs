//! Format detection over a bounded prefix of the byte source.
//!
//! Signatures are checked in a fixed priority order: exact magic bytes
//! first, then patterned magics (GIF trailer, PNM sub-variants, ISOBMFF
//! brands), then content sniffing for the text-ish formats. A miss is not
//! an error; non-image input legitimately detects as `None`.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use log::debug;

use crate::source::{be_u32_at, ByteSource};
use crate::{Format, Result};

/// Prefix inspected for every signature check.
pub(crate) const DETECT_WINDOW: usize = 1024;
/// Extended window for SVG documents behind an XML prolog or comment.
pub(crate) const SVG_WINDOW: usize = 4096;

pub(crate) fn detect<S: ByteSource>(src: &mut S) -> Result<Option<Format>> {
    let head = match src.slice(0, DETECT_WINDOW)? {
        Some(head) if !head.is_empty() => head,
        _ => return Ok(None),
    };
    let head = &head[..];

    let format = if is_gif(head) {
        Some(Format::Gif)
    } else if head.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(png_kind(src)?)
    } else if head.starts_with(b"\x8aMNG\r\n\x1a\n") {
        Some(Format::Mng)
    } else if head.starts_with(&[0xff, 0xd8]) {
        Some(Format::Jpeg)
    } else if head.starts_with(b"BM") {
        Some(Format::Bmp)
    } else if let Some(kind) = pnm_kind(head) {
        Some(kind)
    } else if has_xbm_define(head) {
        Some(Format::Xbm)
    } else if head.starts_with(b"II*\0") || head.starts_with(b"MM\0*") {
        Some(Format::Tiff)
    } else if find(head, b"/* XPM */").is_some() {
        Some(Format::Xpm)
    } else if head.starts_with(b"8BPS") {
        Some(Format::Psd)
    } else if head.starts_with(b"FWS") || head.starts_with(b"CWS") {
        Some(Format::Swf)
    } else if is_svg(src, head)? {
        Some(Format::Svg)
    } else if head.len() >= 2 && head[0] == 0x0a && head[1] <= 0x05 {
        Some(Format::Pcx)
    } else if head.len() >= 12 && head.starts_with(b"RIFF") && &head[8..12] == b"WEBP" {
        Some(Format::Webp)
    } else if head.starts_with(&[0, 0, 1, 0]) {
        Some(Format::Ico)
    } else if head.starts_with(&[0, 0, 2, 0]) {
        Some(Format::Cur)
    } else if head.starts_with(b"\0\0\0\x0cjP  \r\n\x87\n") {
        jpeg2000_kind(src)?
    } else if head.starts_with(&[0xff, 0x4f, 0xff, 0x51]) {
        Some(Format::J2c)
    } else if head.starts_with(&[1, 0, 0, 0]) && head.len() >= 44 && &head[40..44] == b" EMF" {
        Some(Format::Emf)
    } else if head.len() >= 12 && &head[4..8] == b"ftyp" {
        isobmff_kind(&head[8..12])
    } else {
        None
    };

    if let Some(format) = format {
        debug!("detected {format}");
    }
    Ok(format)
}

fn is_gif(head: &[u8]) -> bool {
    head.len() >= 6
        && head.starts_with(b"GIF8")
        && (head[4] == b'7' || head[4] == b'9')
        && head[5] == b'a'
}

/// Scan top-level PNG chunks for `acTL` before the first `IDAT`/`IEND`.
fn png_kind<S: ByteSource>(src: &mut S) -> Result<Format> {
    let mut offset = 8u64;
    loop {
        let kind = match src.slice(offset + 4, 4)? {
            Some(kind) if kind.len() == 4 => kind,
            _ => return Ok(Format::Png),
        };
        match &kind[..] {
            b"IDAT" | b"IEND" => return Ok(Format::Png),
            b"acTL" => return Ok(Format::Apng),
            _ => {}
        }
        let length = be_u32_at(src, offset)?;
        // length + type + CRC
        offset += u64::from(length) + 12;
    }
}

/// Classify the `P1`..`P7` tag. Single source of truth for the sub-variant;
/// the decoders receive the already-split format.
fn pnm_kind(head: &[u8]) -> Option<Format> {
    if head.len() < 3 || head[0] != b'P' {
        return None;
    }
    match head[1] {
        b'1' | b'4' if is_space(head[2]) => Some(Format::Pbm),
        b'2' | b'5' if is_space(head[2]) => Some(Format::Pgm),
        b'3' | b'6' if is_space(head[2]) => Some(Format::Ppm),
        b'7' if head[2] == b'\n' => Some(Format::Pam),
        _ => None,
    }
}

fn jpeg2000_kind<S: ByteSource>(src: &mut S) -> Result<Option<Format>> {
    if !matches!(src.slice(16, 4)?.as_deref(), Some(b"ftyp")) {
        return Ok(None);
    }
    // an extended-size ftyp would be unusual, but is not forbidden
    let skip = if matches!(src.slice(12, 4)?.as_deref(), Some([0, 0, 0, 1])) { 16 } else { 8 };
    Ok(match src.slice(skip + 12, 4)?.as_deref() {
        Some(b"jp2 ") => Some(Format::Jp2),
        Some(b"jpx ") => Some(Format::Jpx),
        _ => None,
    })
}

fn isobmff_kind(brand: &[u8]) -> Option<Format> {
    match brand {
        b"avif" | b"avis" => Some(Format::Avif),
        b"heic" | b"heis" | b"mif1" | b"mif2" | b"msf1" => Some(Format::Heic),
        _ => None,
    }
}

fn is_svg<S: ByteSource>(src: &mut S, head: &[u8]) -> Result<bool> {
    if find_svg_tag(head).is_some() {
        return Ok(true);
    }
    if find(head, b"<?xml").is_some() || find(head, b"<!--").is_some() {
        if let Some(big) = src.slice(0, SVG_WINDOW)? {
            return Ok(find_svg_tag(&big).is_some());
        }
    }
    Ok(false)
}

/// Locate an `<svg ...>` opening tag; returns the attribute byte range.
pub(crate) fn find_svg_tag(data: &[u8]) -> Option<std::ops::Range<usize>> {
    let mut from = 0;
    while let Some(at) = find(&data[from..], b"<svg") {
        let start = from + at + 4;
        from = start;
        // word boundary after the tag name
        if let Some(&next) = data.get(start) {
            if next.is_ascii_alphanumeric() || next == b'_' {
                continue;
            }
        }
        if let Some(gt) = data[start..].iter().position(|&b| b == b'>') {
            return Some(start..start + gt);
        }
    }
    None
}

/// First occurrence of `needle` in `haystack`.
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub(crate) fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

/// `#define <name> <digits>` anywhere in the prefix.
fn has_xbm_define(head: &[u8]) -> bool {
    let mut from = 0;
    while let Some(at) = find(&head[from..], b"#define") {
        let rest = &head[from + at + 7..];
        from += at + 7;
        let rest = match rest.first() {
            Some(&b) if is_space(b) => skip_spaces(rest),
            _ => continue,
        };
        let token_len = rest.iter().take_while(|&&b| !is_space(b)).count();
        if token_len == 0 {
            continue;
        }
        let rest = &rest[token_len..];
        if !rest.first().is_some_and(|&b| is_space(b)) {
            continue;
        }
        if skip_spaces(rest).first().is_some_and(u8::is_ascii_digit) {
            return true;
        }
    }
    false
}

pub(crate) fn skip_spaces(data: &[u8]) -> &[u8] {
    let n = data.iter().take_while(|&&b| is_space(b)).count();
    &data[n..]
}

#[cfg(test)]
use crate::source::SliceSource;

#[cfg(test)]
fn detect_bytes(data: &[u8]) -> Option<Format> {
    detect(&mut SliceSource::new(data)).unwrap()
}

#[test]
fn detects_fixed_magics() {
    assert_eq!(detect_bytes(b"GIF89a\x01\x00\x01\x00"), Some(Format::Gif));
    assert_eq!(detect_bytes(b"GIF88a"), None);
    assert_eq!(detect_bytes(b"BMxxxx"), Some(Format::Bmp));
    assert_eq!(detect_bytes(b"8BPS\0\x01"), Some(Format::Psd));
    assert_eq!(detect_bytes(b"II*\0xxxx"), Some(Format::Tiff));
    assert_eq!(detect_bytes(b"MM\0*xxxx"), Some(Format::Tiff));
    assert_eq!(detect_bytes(b"\xff\xd8\xff\xe0"), Some(Format::Jpeg));
    assert_eq!(detect_bytes(b"\xff\x4f\xff\x51"), Some(Format::J2c));
    assert_eq!(detect_bytes(b"\x0a\x05rest"), Some(Format::Pcx));
    assert_eq!(detect_bytes(b"\0\0\x01\0"), Some(Format::Ico));
    assert_eq!(detect_bytes(b"\0\0\x02\0"), Some(Format::Cur));
    assert_eq!(detect_bytes(b"RIFF\x10\0\0\0WEBPVP8 "), Some(Format::Webp));
    assert_eq!(detect_bytes(b""), None);
    assert_eq!(detect_bytes(b"not an image at all"), None);
}

#[test]
fn detects_pnm_variants() {
    assert_eq!(detect_bytes(b"P1\n1 1\n"), Some(Format::Pbm));
    assert_eq!(detect_bytes(b"P5 2 2 255 "), Some(Format::Pgm));
    assert_eq!(detect_bytes(b"P6\t1 1 255 "), Some(Format::Ppm));
    assert_eq!(detect_bytes(b"P7\nWIDTH 1\n"), Some(Format::Pam));
    assert_eq!(detect_bytes(b"P7 WIDTH"), None);
    assert_eq!(detect_bytes(b"P8\n"), None);
}

#[test]
fn detects_isobmff_brands() {
    assert_eq!(detect_bytes(b"\0\0\0\x14ftypavifxxxx"), Some(Format::Avif));
    assert_eq!(detect_bytes(b"\0\0\0\x14ftypavisxxxx"), Some(Format::Avif));
    assert_eq!(detect_bytes(b"\0\0\0\x14ftypheicxxxx"), Some(Format::Heic));
    assert_eq!(detect_bytes(b"\0\0\0\x14ftypmif1xxxx"), Some(Format::Heic));
    assert_eq!(detect_bytes(b"\0\0\0\x14ftypmp42xxxx"), None);
}

#[test]
fn detects_text_formats() {
    assert_eq!(detect_bytes(b"#define img_width 16\n#define img_height 8\n"), Some(Format::Xbm));
    assert_eq!(detect_bytes(b"/* XPM */\nstatic char *x[] = {"), Some(Format::Xpm));
    assert_eq!(detect_bytes(b"<svg width=\"3\" height=\"4\"></svg>"), Some(Format::Svg));
    assert_eq!(detect_bytes(b"<?xml version=\"1.0\"?>\n<svg width=\"3\">"), Some(Format::Svg));
    assert_eq!(detect_bytes(b"<svgs are not tags>"), None);
}

#[test]
fn svg_tag_found_beyond_first_window() {
    let mut data = Vec::new();
    data.extend_from_slice(b"<!-- ");
    data.resize(2000, b'x');
    data.extend_from_slice(b" --><svg height=\"5\">");
    assert_eq!(detect_bytes(&data), Some(Format::Svg));
}
