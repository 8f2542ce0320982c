//! Dimensions of the primary item in a HEIF/AVIF `meta` box.
//!
//! The displayed size of the primary item comes from the item properties:
//! `ispe` carries the coded size, `clap` a clean-aperture crop expressed as
//! rationals, and an odd `irot` rotation swaps the two axes. Properties live
//! in `ipco` and are tied to items by 1-based index through `ipma`.
//!
//! See ISO 23008-12:2017 § 6.5

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use byteorder::{BigEndian, ByteOrder};

use crate::isobmff::{BoxInfo, BoxWalker, Walk};
use crate::source::{be_u16_at, be_u32_at, u8_at, ByteSource};
use crate::{Error, Result, TryVec};

const HEIF_WALKER: BoxWalker = BoxWalker::new(
    &[b"meta", b"iprp", b"ipco"],
    &[b"meta", b"hdlr", b"pitm", b"ipma", b"ispe"],
    &[b"meta"],
);

pub(crate) fn dimensions<S: ByteSource>(src: &mut S) -> Result<Option<(u32, u32)>> {
    let mut pitm: Option<u32> = None;
    let mut associations: Option<TryVec<(u32, TryVec<u16>)>> = None;
    let mut ispes: TryVec<(u32, (u32, u32))> = TryVec::new();
    let mut claps: TryVec<(u32, (u32, u32))> = TryVec::new();
    let mut irots: TryVec<(u32, u8)> = TryVec::new();
    let mut not_pict = false;

    HEIF_WALKER.recurse(src, 0, None, &mut |src, info| {
        match &info.fourcc.0 {
            b"hdlr" => {
                if info.data_size().is_some_and(|size| size < 8) {
                    return Err(Error::Format("hdlr box too small"));
                }
                if !matches!(src.slice(info.data_offset() + 4, 4)?.as_deref(), Some(b"pict")) {
                    not_pict = true;
                    return Ok(Walk::Stop);
                }
            }
            b"pitm" => {
                if pitm.is_some() {
                    return Err(Error::Format("second pitm box encountered"));
                }
                pitm = Some(if info.version == Some(0) {
                    be_u16_at(src, info.data_offset())?.into()
                } else {
                    be_u32_at(src, info.data_offset())?
                });
            }
            b"ipma" => {
                read_ipma(src, info, associations.get_or_insert_with(TryVec::new))?;
            }
            b"ispe" => {
                let width = be_u32_at(src, info.data_offset())?;
                let height = be_u32_at(src, info.data_offset() + 4)?;
                if !ispes.iter().any(|(i, _)| *i == info.index) {
                    ispes.push((info.index, (width, height)))?;
                }
            }
            b"clap" => {
                let raw = src.require(info.data_offset(), 16)?;
                let width =
                    round_ratio(BigEndian::read_u32(&raw[0..4]), BigEndian::read_u32(&raw[4..8]))?;
                let height =
                    round_ratio(BigEndian::read_u32(&raw[8..12]), BigEndian::read_u32(&raw[12..16]))?;
                if !claps.iter().any(|(i, _)| *i == info.index) {
                    claps.push((info.index, (width, height)))?;
                }
            }
            b"irot" => {
                let angle = u8_at(src, info.data_offset())? & 0b11;
                if !irots.iter().any(|(i, _)| *i == info.index) {
                    irots.push((info.index, angle))?;
                }
            }
            _ => {}
        }
        Ok(Walk::Continue)
    })?;

    if not_pict {
        return Ok(None);
    }
    let Some(associations) = associations else {
        return Ok(None);
    };
    let Some(item) = pitm.or_else(|| associations.iter().map(|(id, _)| *id).min()) else {
        return Ok(None);
    };
    let Some((_, properties)) = associations.iter().find(|(id, _)| *id == item) else {
        return Ok(None);
    };
    let lookup = |table: &TryVec<(u32, (u32, u32))>| {
        properties.iter().find_map(|&index| {
            table.iter().find(|(i, _)| *i == u32::from(index)).map(|(_, pair)| *pair)
        })
    };
    let Some((width, height)) = lookup(&claps).or_else(|| lookup(&ispes)) else {
        return Ok(None);
    };
    let irot = properties.iter().find_map(|&index| {
        irots.iter().find(|(i, _)| *i == u32::from(index)).map(|(_, angle)| *angle)
    });
    Ok(Some(if irot.is_some_and(|angle| angle % 2 == 1) {
        (height, width)
    } else {
        (width, height)
    }))
}

/// Item to property-index associations. A duplicate item id keeps its first
/// entry, but the repeated entry's bytes still have to be consumed.
fn read_ipma<S: ByteSource>(
    src: &mut S,
    info: &BoxInfo,
    map: &mut TryVec<(u32, TryVec<u16>)>,
) -> Result<()> {
    let wide_index = info.flags.unwrap_or(0) & 1 == 1;
    let mut at = Cursor { src, offset: info.data_offset() };
    let entry_count = at.be_u32()?;
    for _ in 0..entry_count {
        let item_id = if info.version == Some(0) { at.be_u16()?.into() } else { at.be_u32()? };
        let association_count = at.u8()?;
        let mut properties = TryVec::new();
        for _ in 0..association_count {
            let index = if wide_index {
                at.be_u16()? & 0x7fff
            } else {
                (at.u8()? & 0x7f).into()
            };
            properties.push(index)?;
        }
        if !map.iter().any(|(id, _)| *id == item_id) {
            map.push((item_id, properties))?;
        }
    }
    Ok(())
}

/// Round half away from zero, as the clean aperture fractions require.
fn round_ratio(numerator: u32, denominator: u32) -> Result<u32> {
    if denominator == 0 {
        return Err(Error::Format("zero denominator in clap box"));
    }
    let n = u64::from(numerator);
    let d = u64::from(denominator);
    Ok(((2 * n + d) / (2 * d)) as u32)
}

struct Cursor<'a, S> {
    src: &'a mut S,
    offset: u64,
}

impl<S: ByteSource> Cursor<'_, S> {
    fn u8(&mut self) -> Result<u8> {
        let value = u8_at(self.src, self.offset)?;
        self.offset += 1;
        Ok(value)
    }

    fn be_u16(&mut self) -> Result<u16> {
        let value = be_u16_at(self.src, self.offset)?;
        self.offset += 2;
        Ok(value)
    }

    fn be_u32(&mut self) -> Result<u32> {
        let value = be_u32_at(self.src, self.offset)?;
        self.offset += 4;
        Ok(value)
    }
}

#[cfg(test)]
mod fixtures {
    pub fn bx(fourcc: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(payload.len() as u32 + 8).to_be_bytes());
        out.extend_from_slice(fourcc);
        out.extend_from_slice(payload);
        out
    }

    pub fn full_bx(fourcc: &[u8; 4], version: u8, flags: u32, payload: &[u8]) -> Vec<u8> {
        let mut body = vec![version];
        body.extend_from_slice(&flags.to_be_bytes()[1..]);
        body.extend_from_slice(payload);
        bx(fourcc, &body)
    }

    pub fn hdlr(handler: &[u8; 4]) -> Vec<u8> {
        let mut payload = vec![0u8; 4];
        payload.extend_from_slice(handler);
        payload.extend_from_slice(&[0u8; 12]);
        full_bx(b"hdlr", 0, 0, &payload)
    }

    pub fn ispe(width: u32, height: u32) -> Vec<u8> {
        let mut payload = width.to_be_bytes().to_vec();
        payload.extend_from_slice(&height.to_be_bytes());
        full_bx(b"ispe", 0, 0, &payload)
    }

    /// One association entry per `(item, indices)` pair, 7-bit indices.
    pub fn ipma(entries: &[(u16, &[u8])]) -> Vec<u8> {
        let mut payload = (entries.len() as u32).to_be_bytes().to_vec();
        for &(item, indices) in entries {
            payload.extend_from_slice(&item.to_be_bytes());
            payload.push(indices.len() as u8);
            payload.extend_from_slice(indices);
        }
        full_bx(b"ipma", 0, 0, &payload)
    }

    pub fn meta(children: &[Vec<u8>]) -> Vec<u8> {
        full_bx(b"meta", 0, 0, &children.concat())
    }

    pub fn iprp(ipco_children: &[Vec<u8>], ipma: Vec<u8>) -> Vec<u8> {
        let mut body = bx(b"ipco", &ipco_children.concat());
        body.extend_from_slice(&ipma);
        bx(b"iprp", &body)
    }
}

#[cfg(test)]
use crate::source::SliceSource;
#[cfg(test)]
use fixtures::*;

#[test]
fn primary_item_dimensions_with_rotation() {
    let pitm = full_bx(b"pitm", 0, 0, &1u16.to_be_bytes());
    let iprp = iprp(
        &[ispe(100, 80), bx(b"irot", &[1])],
        ipma(&[(1, &[1, 2])]),
    );
    let meta = meta(&[hdlr(b"pict"), pitm, iprp]);
    assert_eq!(dimensions(&mut SliceSource::new(&meta)).unwrap(), Some((80, 100)));
}

#[test]
fn clean_aperture_wins_over_coded_size() {
    let pitm = full_bx(b"pitm", 0, 0, &1u16.to_be_bytes());
    let mut clap_payload = Vec::new();
    for value in [99u32, 2, 33, 1] {
        clap_payload.extend_from_slice(&value.to_be_bytes());
    }
    let iprp = iprp(
        &[ispe(100, 80), bx(b"clap", &clap_payload)],
        ipma(&[(1, &[1, 2])]),
    );
    let meta = meta(&[hdlr(b"pict"), pitm, iprp]);
    // 99/2 rounds half away from zero
    assert_eq!(dimensions(&mut SliceSource::new(&meta)).unwrap(), Some((50, 33)));
}

#[test]
fn item_without_associated_size_has_no_dimensions() {
    let pitm = full_bx(b"pitm", 0, 0, &2u16.to_be_bytes());
    let iprp = iprp(&[ispe(100, 80)], ipma(&[(1, &[1])]));
    let meta = meta(&[hdlr(b"pict"), pitm, iprp]);
    assert_eq!(dimensions(&mut SliceSource::new(&meta)).unwrap(), None);
}

#[test]
fn missing_pitm_falls_back_to_lowest_item() {
    let iprp = iprp(&[ispe(12, 34)], ipma(&[(7, &[1]), (3, &[1])]));
    let meta = meta(&[hdlr(b"pict"), iprp]);
    assert_eq!(dimensions(&mut SliceSource::new(&meta)).unwrap(), Some((12, 34)));
}

#[test]
fn non_picture_handler_has_no_dimensions() {
    let meta = meta(&[hdlr(b"vide"), full_bx(b"pitm", 0, 0, &1u16.to_be_bytes())]);
    assert_eq!(dimensions(&mut SliceSource::new(&meta)).unwrap(), None);
}

#[test]
fn second_pitm_is_an_error() {
    let pitm = full_bx(b"pitm", 0, 0, &1u16.to_be_bytes());
    let meta = meta(&[hdlr(b"pict"), pitm.clone(), pitm]);
    assert!(matches!(
        dimensions(&mut SliceSource::new(&meta)),
        Err(Error::Format("second pitm box encountered"))
    ));
}

#[test]
fn duplicate_ipma_item_keeps_first_entry() {
    let pitm = full_bx(b"pitm", 0, 0, &1u16.to_be_bytes());
    let iprp = iprp(
        &[ispe(100, 80), ispe(9, 9)],
        ipma(&[(1, &[1]), (1, &[2]), (2, &[2])]),
    );
    let meta = meta(&[hdlr(b"pict"), pitm, iprp]);
    assert_eq!(dimensions(&mut SliceSource::new(&meta)).unwrap(), Some((100, 80)));
}

#[test]
fn no_ipma_means_no_dimensions() {
    let meta = meta(&[hdlr(b"pict"), full_bx(b"pitm", 0, 0, &1u16.to_be_bytes())]);
    assert_eq!(dimensions(&mut SliceSource::new(&meta)).unwrap(), None);
}
