//! Generic walker for box-structured (ISO Base Media) containers.
//!
//! Boxes are a sequence of possibly-nested records, each headed by a 4-byte
//! big-endian size and a 4-byte type. A walker is configured with the type
//! sets that need recursion, "full box" (version + flags) decoding, and
//! early termination; parsers drive it with a visitor closure.
//!
//! See ISO 14496-12:2015 § 4.2

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use byteorder::{BigEndian, ByteOrder};
use log::debug;

use crate::source::{be_u32_at, be_u64_at, ByteSource};
use crate::{Error, Result};

/// Four-character box type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FourCC(pub [u8; 4]);

impl PartialEq<[u8; 4]> for FourCC {
    fn eq(&self, other: &[u8; 4]) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &byte in &self.0 {
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{byte:02x}")?;
            }
        }
        Ok(())
    }
}

/// One box header as encountered during a walk.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BoxInfo {
    pub fourcc: FourCC,
    /// Absolute offset of the box start.
    pub offset: u64,
    /// Total box length in bytes; `None` means "extends to end of the
    /// enclosing region or stream" (declared size zero).
    pub size: Option<u64>,
    /// Header length: 8, 16 for extended-size boxes, plus 4 for full boxes.
    pub header_len: u64,
    /// 1-based position among siblings.
    pub index: u32,
    /// Present only for configured full-box types.
    pub version: Option<u8>,
    pub flags: Option<u32>,
}

impl BoxInfo {
    pub fn data_offset(&self) -> u64 {
        self.offset + self.header_len
    }

    pub fn data_size(&self) -> Option<u64> {
        self.size.map(|size| size - self.header_len)
    }
}

/// Whether to keep walking after visiting a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Walk {
    Continue,
    Stop,
}

/// Walker configuration: which box types to recurse into, which carry
/// version + flags, and which end their sibling sequence.
pub(crate) struct BoxWalker {
    recurse: &'static [&'static [u8; 4]],
    full: &'static [&'static [u8; 4]],
    last: &'static [&'static [u8; 4]],
}

impl BoxWalker {
    pub const fn new(
        recurse: &'static [&'static [u8; 4]],
        full: &'static [&'static [u8; 4]],
        last: &'static [&'static [u8; 4]],
    ) -> Self {
        Self { recurse, full, last }
    }

    /// Visit the sibling sequence starting at `offset`, bounded by `limit`
    /// bytes when given.
    pub fn walk<S, F>(&self, src: &mut S, offset: u64, limit: Option<u64>, visit: &mut F) -> Result<Walk>
    where
        S: ByteSource,
        F: FnMut(&mut S, &BoxInfo) -> Result<Walk>,
    {
        self.walk_inner(src, offset, limit, visit, false)
    }

    /// Depth-first pre-order traversal: like [`walk`](Self::walk), but
    /// re-enters the payload of every box whose type is in the recursion
    /// set, immediately after yielding that box.
    pub fn recurse<S, F>(&self, src: &mut S, offset: u64, limit: Option<u64>, visit: &mut F) -> Result<Walk>
    where
        S: ByteSource,
        F: FnMut(&mut S, &BoxInfo) -> Result<Walk>,
    {
        self.walk_inner(src, offset, limit, visit, true)
    }

    fn walk_inner<S, F>(
        &self,
        src: &mut S,
        start: u64,
        limit: Option<u64>,
        visit: &mut F,
        recursive: bool,
    ) -> Result<Walk>
    where
        S: ByteSource,
        F: FnMut(&mut S, &BoxInfo) -> Result<Walk>,
    {
        let end = match limit {
            Some(limit) => start.saturating_add(limit),
            None => u64::MAX,
        };
        let mut offset = start;
        let mut index = 1u32;
        while offset < end {
            let head = match src.slice(offset, 8)? {
                Some(head) if head.len() == 8 => head,
                _ => break,
            };
            let size32 = BigEndian::read_u32(&head[0..4]);
            let fourcc = FourCC([head[4], head[5], head[6], head[7]]);
            let mut header_len = 8u64;
            let size = match size32 {
                0 => None,
                1 => {
                    let wide = be_u64_at(src, offset + 8)?;
                    header_len = 16;
                    if wide < 16 {
                        return Err(Error::Format("unexpected ISOBMFF extended box size"));
                    }
                    Some(wide)
                }
                2..=7 => return Err(Error::Format("reserved ISOBMFF box size")),
                _ => Some(u64::from(size32)),
            };
            let (version, flags) = if contains(self.full, &fourcc) {
                let vf = be_u32_at(src, offset + header_len)?;
                header_len += 4;
                (Some((vf >> 24) as u8), Some(vf & 0x00ff_ffff))
            } else {
                (None, None)
            };
            if let Some(size) = size {
                if size < header_len {
                    return Err(Error::Format("ISOBMFF box size smaller than its header"));
                }
            }

            let info = BoxInfo { fourcc, offset, size, header_len, index, version, flags };
            debug!("box '{fourcc}' at {offset}, size {size:?}");
            if visit(src, &info)? == Walk::Stop {
                return Ok(Walk::Stop);
            }
            if recursive && contains(self.recurse, &fourcc) {
                let flow = self.walk_inner(src, info.data_offset(), info.data_size(), visit, true)?;
                if flow == Walk::Stop {
                    return Ok(Walk::Stop);
                }
            }

            let Some(size) = size else { break };
            if contains(self.last, &fourcc) {
                break;
            }
            offset = offset
                .checked_add(size)
                .ok_or(Error::Format("ISOBMFF box size overflow"))?;
            index += 1;
        }
        Ok(Walk::Continue)
    }
}

fn contains(set: &[&[u8; 4]], fourcc: &FourCC) -> bool {
    set.iter().any(|t| *fourcc == **t)
}

#[cfg(test)]
fn collect(walker: &BoxWalker, data: &[u8]) -> Result<Vec<(FourCC, u64, u32)>> {
    let mut seen = Vec::new();
    let mut src = crate::source::SliceSource::new(data);
    walker.recurse(&mut src, 0, None, &mut |_, b| {
        seen.push((b.fourcc, b.offset, b.index));
        Ok(Walk::Continue)
    })?;
    Ok(seen)
}

#[cfg(test)]
fn plain_box(fourcc: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(payload.len() as u32 + 8).to_be_bytes());
    out.extend_from_slice(fourcc);
    out.extend_from_slice(payload);
    out
}

#[test]
fn walk_visits_nested_boxes_in_pre_order() {
    let inner = plain_box(b"leaf", b"xy");
    let mut mid = plain_box(b"bbbb", &inner);
    mid.extend_from_slice(&plain_box(b"cccc", b""));
    let mut data = plain_box(b"aaaa", &mid);
    data.extend_from_slice(&plain_box(b"dddd", b"z"));

    let walker = BoxWalker::new(&[b"aaaa", b"bbbb"], &[], &[]);
    let seen = collect(&walker, &data).unwrap();
    let names: Vec<String> = seen.iter().map(|(f, _, _)| f.to_string()).collect();
    assert_eq!(names, ["aaaa", "bbbb", "leaf", "cccc", "dddd"]);
    // sibling indices restart per nesting level
    assert_eq!(seen[0].2, 1);
    assert_eq!(seen[1].2, 1);
    assert_eq!(seen[3].2, 2);
    assert_eq!(seen[4].2, 2);
}

#[test]
fn walk_stops_after_size_zero_box() {
    let mut data = plain_box(b"aaaa", b"");
    data.extend_from_slice(&[0, 0, 0, 0]);
    data.extend_from_slice(b"open");
    data.extend_from_slice(&plain_box(b"neve", b"r"));

    let walker = BoxWalker::new(&[], &[], &[]);
    let seen = collect(&walker, &data).unwrap();
    let names: Vec<String> = seen.iter().map(|(f, _, _)| f.to_string()).collect();
    assert_eq!(names, ["aaaa", "open"]);
}

#[test]
fn walk_rejects_reserved_sizes() {
    let walker = BoxWalker::new(&[], &[], &[]);
    for size in 2u32..=7 {
        let mut data = size.to_be_bytes().to_vec();
        data.extend_from_slice(b"evil");
        assert!(matches!(collect(&walker, &data), Err(Error::Format(_))), "size {size}");
    }
}

#[test]
fn walk_rejects_small_extended_sizes() {
    let walker = BoxWalker::new(&[], &[], &[]);
    for wide in [1u64, 8, 15] {
        let mut data = 1u32.to_be_bytes().to_vec();
        data.extend_from_slice(b"wide");
        data.extend_from_slice(&wide.to_be_bytes());
        assert!(matches!(collect(&walker, &data), Err(Error::Format(_))), "wide {wide}");
    }
    let mut data = 1u32.to_be_bytes().to_vec();
    data.extend_from_slice(b"wide");
    data.extend_from_slice(&16u64.to_be_bytes());
    assert_eq!(collect(&walker, &data).unwrap().len(), 1);
}

#[test]
fn full_boxes_carry_version_and_flags() {
    let mut payload = vec![2, 0, 0, 7];
    payload.extend_from_slice(b"body");
    let data = plain_box(b"fful", &payload);

    let walker = BoxWalker::new(&[], &[b"fful"], &[]);
    let mut src = crate::source::SliceSource::new(&data);
    let mut seen = None;
    walker
        .walk(&mut src, 0, None, &mut |_, b| {
            seen = Some((b.version, b.flags, b.header_len, b.data_size()));
            Ok(Walk::Continue)
        })
        .unwrap();
    assert_eq!(seen, Some((Some(2), Some(7), 12, Some(4))));
}
