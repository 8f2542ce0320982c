// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cell::Cell;
use std::io::Cursor;
use std::rc::Rc;

use image_extents::{
    ByteSource, Dimensions, Error, FetchResponse, Format, ImageInfo, ProbeConfig, RangeFetcher,
    RemoteSource,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).filter_level(log::LevelFilter::max()).try_init();
}

fn probe(data: &[u8]) -> ImageInfo {
    ImageInfo::from_bytes(data).unwrap().expect("format not detected")
}

// ============================================================================
// Raster formats
// ============================================================================

fn png_bytes(width: u32, height: u32, animated: bool) -> Vec<u8> {
    let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
    let mut chunk = |tag: &[u8; 4], payload: &[u8]| {
        data.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        data.extend_from_slice(tag);
        data.extend_from_slice(payload);
        data.extend_from_slice(&[0u8; 4]); // CRC is never checked
    };
    let mut ihdr = Vec::new();
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.extend_from_slice(&[8, 6, 0, 0, 0]);
    chunk(b"IHDR", &ihdr);
    if animated {
        chunk(b"acTL", &[0u8; 8]);
    }
    chunk(b"IDAT", &[0u8; 16]);
    chunk(b"IEND", b"");
    data
}

#[test]
fn png_dimensions() {
    init_logging();
    let data = png_bytes(640, 532, false);
    let info = probe(&data);
    assert_eq!(info.format, Format::Png);
    assert_eq!(info.dimensions, Some(Dimensions { width: 640, height: 532 }));
    assert_eq!(info.dimensions.unwrap().to_string(), "640x532");
}

#[test]
fn apng_detected_by_actl_chunk() {
    let data = png_bytes(640, 532, true);
    let info = probe(&data);
    assert_eq!(info.format, Format::Apng);
    assert_eq!(info.format.media_type(), "image/apng");
    assert_eq!(info.dimensions, Some(Dimensions { width: 640, height: 532 }));
}

#[test]
fn png_with_misplaced_ihdr_is_an_error() {
    let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
    data.extend_from_slice(&8u32.to_be_bytes());
    data.extend_from_slice(b"gAMA");
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(&0u32.to_be_bytes());
    data.extend_from_slice(b"IEND\0\0\0\0");
    assert!(matches!(ImageInfo::from_bytes(&data), Err(Error::Format(_))));
}

#[test]
fn gif_dimensions() {
    let data = b"GIF89a\x80\x02\xe0\x01;";
    let info = probe(data);
    assert_eq!(info.format, Format::Gif);
    assert_eq!(info.dimensions, Some(Dimensions { width: 640, height: 480 }));
}

fn jpeg_bytes(width: u16, height: u16) -> Vec<u8> {
    let mut data = vec![0xff, 0xd8];
    // APP0
    data.extend_from_slice(&[0xff, 0xe0, 0x00, 0x10]);
    data.extend_from_slice(b"JFIF\0\x01\x02\0\0\x48\0\x48\0\0");
    // SOF0
    data.extend_from_slice(&[0xff, 0xc0, 0x00, 0x11, 0x08]);
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(&width.to_be_bytes());
    data.extend_from_slice(&[3, 1, 0x22, 0, 2, 0x11, 1, 3, 0x11, 1]);
    data
}

#[test]
fn jpeg_dimensions() {
    let info = probe(&jpeg_bytes(640, 532));
    assert_eq!(info.format, Format::Jpeg);
    assert_eq!(info.dimensions, Some(Dimensions { width: 640, height: 532 }));
}

#[test]
fn jpeg_with_only_a_signature_is_an_error() {
    assert!(matches!(
        ImageInfo::from_bytes(b"\xff\xd8"),
        Err(Error::Format(_) | Error::TruncatedData)
    ));
}

#[test]
fn bmp_with_top_down_rows() {
    let mut data = vec![0u8; 26];
    data[..2].copy_from_slice(b"BM");
    data[14] = 40;
    data[18..22].copy_from_slice(&640i32.to_le_bytes());
    data[22..26].copy_from_slice(&(-480i32).to_le_bytes());
    let info = probe(&data);
    assert_eq!(info.format, Format::Bmp);
    assert_eq!(info.dimensions, Some(Dimensions { width: 640, height: 480 }));
}

#[test]
fn portable_anymaps() {
    let info = probe(b"P1\n# comment\n4 2\n0110\n0110\n");
    assert_eq!(info.format, Format::Pbm);
    assert_eq!(info.dimensions, Some(Dimensions { width: 4, height: 2 }));

    let info = probe(b"P5 3 4 255 ");
    assert_eq!(info.format, Format::Pgm);
    assert_eq!(info.dimensions, Some(Dimensions { width: 3, height: 4 }));

    let info = probe(b"P7\nWIDTH 2\nHEIGHT 3\nDEPTH 4\nMAXVAL 255\nTUPLTYPE RGB_ALPHA\nENDHDR\n");
    assert_eq!(info.format, Format::Pam);
    assert_eq!(info.dimensions, Some(Dimensions { width: 2, height: 3 }));
}

#[test]
fn xbm_and_xpm() {
    let info = probe(b"#define x_width 12\n#define x_height 34\nstatic char x_bits[] = {};\n");
    assert_eq!(info.format, Format::Xbm);
    assert_eq!(info.dimensions, Some(Dimensions { width: 12, height: 34 }));

    let info = probe(b"/* XPM */\nstatic char *x[] = {\n\"24 13 2 1\",\n\"  c None\",\n");
    assert_eq!(info.format, Format::Xpm);
    assert_eq!(info.dimensions, Some(Dimensions { width: 24, height: 13 }));
}

#[test]
fn tiff_big_endian() {
    let mut data = Vec::new();
    data.extend_from_slice(b"MM\0*");
    data.extend_from_slice(&8u32.to_be_bytes());
    data.extend_from_slice(&2u16.to_be_bytes());
    for (tag, value) in [(0x0100u16, 640u32), (0x0101, 480)] {
        data.extend_from_slice(&tag.to_be_bytes());
        data.extend_from_slice(&4u16.to_be_bytes());
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&value.to_be_bytes());
    }
    let info = probe(&data);
    assert_eq!(info.format, Format::Tiff);
    assert_eq!(info.dimensions, Some(Dimensions { width: 640, height: 480 }));
}

#[test]
fn pcx_window() {
    let mut data = vec![0x0a, 0x05, 1, 8];
    for value in [10u16, 20, 109, 219] {
        data.extend_from_slice(&value.to_le_bytes());
    }
    let info = probe(&data);
    assert_eq!(info.format, Format::Pcx);
    assert_eq!(info.dimensions, Some(Dimensions { width: 100, height: 200 }));
}

#[test]
fn psd_dimensions() {
    let mut data = b"8BPS\0\x01\0\0\0\0\0\0\0\x04".to_vec();
    data.extend_from_slice(&532u32.to_be_bytes());
    data.extend_from_slice(&640u32.to_be_bytes());
    let info = probe(&data);
    assert_eq!(info.format, Format::Psd);
    assert_eq!(info.dimensions, Some(Dimensions { width: 640, height: 532 }));
}

#[test]
fn ico_and_cur_use_256_for_zero() {
    let info = probe(b"\0\0\x01\0\x01\0\0\x20");
    assert_eq!(info.format, Format::Ico);
    assert_eq!(info.dimensions, Some(Dimensions { width: 256, height: 32 }));

    let info = probe(b"\0\0\x02\0\x01\0\x10\0");
    assert_eq!(info.format, Format::Cur);
    assert_eq!(info.format.media_type(), "image/vnd.microsoft.icon");
    assert_eq!(info.dimensions, Some(Dimensions { width: 16, height: 256 }));
}

#[test]
fn webp_lossless() {
    let mut data = b"RIFF\0\0\0\0WEBPVP8L".to_vec();
    data.resize(21, 0);
    data.extend_from_slice(&((24u32) | (11u32 << 14)).to_le_bytes());
    let info = probe(&data);
    assert_eq!(info.format, Format::Webp);
    assert_eq!(info.dimensions, Some(Dimensions { width: 25, height: 12 }));
}

// ============================================================================
// Vector and legacy formats
// ============================================================================

#[test]
fn svg_with_physical_units() {
    let data = b"<?xml version=\"1.0\"?>\n<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"10cm\" height=\"5cm\" viewBox=\"0 0 100 50\">\n</svg>\n";
    let info = probe(data);
    assert_eq!(info.format, Format::Svg);
    assert_eq!(info.dimensions, Some(Dimensions { width: 283, height: 142 }));
}

#[test]
fn svg_with_font_relative_units_has_no_dimensions() {
    let info = probe(b"<svg width=\"10em\" height=\"4em\"></svg>");
    assert_eq!(info.format, Format::Svg);
    assert_eq!(info.dimensions, None);
}

#[test]
fn svg_dpi_configuration() {
    let config = ProbeConfig::default().with_dpi(300.0);
    let info = ImageInfo::from_bytes_with_config(b"<svg width='1in' height='0.5in'>", &config)
        .unwrap()
        .unwrap();
    assert_eq!(info.dimensions, Some(Dimensions { width: 300, height: 150 }));
}

#[test]
fn swf_stage() {
    // 15-bit coordinates, 0..11000 x 0..8000 twips
    let mut bits = vec![0u8; 9];
    {
        let mut put = |index: usize, value: u32, width: usize| {
            for i in 0..width {
                if value >> (width - 1 - i) & 1 == 1 {
                    bits[(index + i) / 8] |= 0x80 >> ((index + i) % 8);
                }
            }
        };
        put(0, 15, 5);
        put(5, 0, 15);
        put(20, 11000, 15);
        put(35, 0, 15);
        put(50, 8000, 15);
    }
    let mut data = b"FWS\x0a\0\0\0\0".to_vec();
    data.extend_from_slice(&bits);
    data.push(0);
    let info = probe(&data);
    assert_eq!(info.format, Format::Swf);
    assert_eq!(info.dimensions, Some(Dimensions { width: 550, height: 400 }));
}

#[test]
fn emf_frame() {
    let mut data = vec![0u8; 24];
    data[..4].copy_from_slice(&[1, 0, 0, 0]);
    for value in [100i32, 200, 5179, 10359] {
        data.extend_from_slice(&value.to_le_bytes());
    }
    data.resize(44, 0);
    data[40..44].copy_from_slice(b" EMF");
    let info = probe(&data);
    assert_eq!(info.format, Format::Emf);
    // 5080 and 10160 hundredths of a millimeter at 72 dpi
    assert_eq!(info.dimensions, Some(Dimensions { width: 144, height: 288 }));
}

// ============================================================================
// Box-structured formats
// ============================================================================

fn bx(fourcc: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(payload.len() as u32 + 8).to_be_bytes());
    out.extend_from_slice(fourcc);
    out.extend_from_slice(payload);
    out
}

fn full_bx(fourcc: &[u8; 4], version: u8, flags: u32, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![version];
    body.extend_from_slice(&flags.to_be_bytes()[1..]);
    body.extend_from_slice(payload);
    bx(fourcc, &body)
}

fn avif_bytes(width: u32, height: u32, rotations: u8) -> Vec<u8> {
    let mut hdlr = vec![0u8; 4];
    hdlr.extend_from_slice(b"pict");
    hdlr.extend_from_slice(&[0u8; 12]);

    let mut ispe = width.to_be_bytes().to_vec();
    ispe.extend_from_slice(&height.to_be_bytes());

    let mut ipco = full_bx(b"ispe", 0, 0, &ispe);
    ipco.extend_from_slice(&bx(b"irot", &[rotations]));

    // item 1 carries properties 1 and 2
    let ipma = [0, 0, 0, 1, 0, 1, 2, 1, 2];

    let mut iprp = bx(b"ipco", &ipco);
    iprp.extend_from_slice(&full_bx(b"ipma", 0, 0, &ipma));

    let mut meta = full_bx(b"hdlr", 0, 0, &hdlr);
    meta.extend_from_slice(&full_bx(b"pitm", 0, 0, &1u16.to_be_bytes()));
    meta.extend_from_slice(&bx(b"iprp", &iprp));

    let mut ftyp = b"avif".to_vec();
    ftyp.extend_from_slice(&[0u8; 4]);
    ftyp.extend_from_slice(b"avifmif1");

    let mut data = bx(b"ftyp", &ftyp);
    data.extend_from_slice(&full_bx(b"meta", 0, 0, &meta));
    data
}

#[test]
fn avif_primary_item_with_rotation() {
    init_logging();
    let info = probe(&avif_bytes(100, 80, 1));
    assert_eq!(info.format, Format::Avif);
    assert_eq!(info.dimensions, Some(Dimensions { width: 80, height: 100 }));

    let info = probe(&avif_bytes(100, 80, 2));
    assert_eq!(info.dimensions, Some(Dimensions { width: 100, height: 80 }));
}

#[test]
fn heic_brand() {
    let mut data = avif_bytes(100, 80, 0);
    data[8..12].copy_from_slice(b"heic");
    let info = probe(&data);
    assert_eq!(info.format, Format::Heic);
    assert_eq!(info.format.media_types(), ["image/heic", "image/heif"]);
}

#[test]
fn jp2_dimensions() {
    let mut ihdr = 480u32.to_be_bytes().to_vec();
    ihdr.extend_from_slice(&640u32.to_be_bytes());
    ihdr.extend_from_slice(&[0, 3, 7, 0, 0, 0]);
    let mut data = Vec::new();
    data.extend_from_slice(&12u32.to_be_bytes());
    data.extend_from_slice(b"jP  \r\n\x87\n");
    data.extend_from_slice(&20u32.to_be_bytes());
    data.extend_from_slice(b"ftypjp2 \0\0\0\0jp2 ");
    data.extend_from_slice(&bx(b"jp2h", &bx(b"ihdr", &ihdr)));
    let info = probe(&data);
    assert_eq!(info.format, Format::Jp2);
    assert_eq!(info.dimensions, Some(Dimensions { width: 640, height: 480 }));
}

#[test]
fn j2c_dimensions() {
    let mut data = b"\xff\x4f\xff\x51\0\0\0\0".to_vec();
    data.extend_from_slice(&640u32.to_be_bytes());
    data.extend_from_slice(&480u32.to_be_bytes());
    let info = probe(&data);
    assert_eq!(info.format, Format::J2c);
    assert_eq!(info.dimensions, Some(Dimensions { width: 640, height: 480 }));
}

// ============================================================================
// Input backends
// ============================================================================

#[test]
fn seekable_and_forward_only_streams() {
    let data = png_bytes(640, 532, false);
    let info = ImageInfo::from_seekable(Cursor::new(&data)).unwrap().unwrap();
    assert_eq!(info.dimensions, Some(Dimensions { width: 640, height: 532 }));

    let info = ImageInfo::from_stream(&data[..]).unwrap().unwrap();
    assert_eq!(info.dimensions, Some(Dimensions { width: 640, height: 532 }));
}

struct RangeServer {
    data: Vec<u8>,
    full_body: bool,
    calls: Rc<Cell<u32>>,
}

impl RangeFetcher for RangeServer {
    fn fetch(&mut self, offset: u64, length: usize) -> std::io::Result<FetchResponse> {
        self.calls.set(self.calls.get() + 1);
        if self.full_body {
            return Ok(FetchResponse::Full(self.data.clone()));
        }
        let start = self.data.len().min(usize::try_from(offset).unwrap());
        let end = self.data.len().min(start + length);
        Ok(FetchResponse::Partial(self.data[start..end].to_vec()))
    }
}

#[test]
fn remote_probe_fetches_one_page_for_small_headers() {
    init_logging();
    let calls = Rc::new(Cell::new(0));
    let fetcher = RangeServer {
        data: png_bytes(640, 532, false),
        full_body: false,
        calls: Rc::clone(&calls),
    };
    let info = ImageInfo::from_fetcher(fetcher).unwrap().unwrap();
    assert_eq!(info.format, Format::Png);
    assert_eq!(info.dimensions, Some(Dimensions { width: 640, height: 532 }));
    assert_eq!(calls.get(), 1);
}

#[test]
fn remote_probe_fetches_pages_on_demand() {
    let mut jpeg = jpeg_bytes(1280, 720);
    // push the frame header past the first page with a fat comment segment
    let comment_len = 300u16;
    let mut data = jpeg[..2].to_vec();
    data.extend_from_slice(&[0xff, 0xfe]);
    data.extend_from_slice(&(comment_len + 2).to_be_bytes());
    data.resize(data.len() + usize::from(comment_len), b'?');
    data.extend_from_slice(&jpeg.split_off(2));

    let calls = Rc::new(Cell::new(0));
    let fetcher = RangeServer { data, full_body: false, calls: Rc::clone(&calls) };
    let mut source = RemoteSource::with_chunk_size(fetcher, 64);
    let info = ImageInfo::from_source(&mut source, &ProbeConfig::default()).unwrap().unwrap();
    assert_eq!(info.dimensions, Some(Dimensions { width: 1280, height: 720 }));
    assert!(calls.get() > 1);
}

#[test]
fn remote_probe_degrades_to_whole_body() {
    init_logging();
    let calls = Rc::new(Cell::new(0));
    let fetcher = RangeServer {
        data: png_bytes(12, 34, false),
        full_body: true,
        calls: Rc::clone(&calls),
    };
    let info = ImageInfo::from_fetcher(fetcher).unwrap().unwrap();
    assert_eq!(info.dimensions, Some(Dimensions { width: 12, height: 34 }));
    assert_eq!(calls.get(), 1);
}

#[test]
fn remote_probe_with_prefetched_first_page() {
    let calls = Rc::new(Cell::new(0));
    let mut data = png_bytes(640, 532, false);
    data.resize(8192, 0);
    let fetcher = RangeServer { data: data.clone(), full_body: false, calls: Rc::clone(&calls) };
    // one full page seeded from the initial ranged request
    let mut source = RemoteSource::with_prefetched(fetcher, data[..4096].to_vec()).unwrap();
    let info = ImageInfo::from_source(&mut source, &ProbeConfig::default()).unwrap().unwrap();
    assert_eq!(info.dimensions, Some(Dimensions { width: 640, height: 532 }));
    assert_eq!(calls.get(), 0);
}

#[test]
fn remote_probe_reads_past_a_short_prefetched_prefix() {
    init_logging();
    let calls = Rc::new(Cell::new(0));
    let data: Vec<u8> = (0..300u16).map(|i| (i % 251) as u8).collect();
    let fetcher = RangeServer { data: data.clone(), full_body: false, calls: Rc::clone(&calls) };
    let mut source = RemoteSource::with_prefetched(fetcher, data[..100].to_vec()).unwrap();

    // reads inside the prefix are served without fetching
    assert_eq!(source.slice(10, 50).unwrap().unwrap(), data[10..60].as_ref());
    assert_eq!(calls.get(), 0);
    // a read past the prefix re-fetches the page and serves the full span
    assert_eq!(source.slice(0, 200).unwrap().unwrap(), data[..200].as_ref());
    assert_eq!(calls.get(), 1);
    // the re-fetched page settles where the data really ends
    assert_eq!(source.slice(250, 100).unwrap().unwrap(), data[250..].as_ref());
    assert_eq!(calls.get(), 1);
}

// ============================================================================
// Negative cases
// ============================================================================

#[test]
fn unrecognized_and_empty_inputs() {
    assert_eq!(ImageInfo::from_bytes(b"").unwrap(), None);
    assert_eq!(ImageInfo::from_bytes(b"GIF90a").unwrap(), None);
    assert_eq!(ImageInfo::from_bytes(b"<html></html>").unwrap(), None);
    assert_eq!(ImageInfo::from_stream(&b"no image here"[..]).unwrap(), None);
}

#[test]
fn truncated_header_of_a_recognized_format() {
    let data = png_bytes(640, 532, false);
    assert!(matches!(ImageInfo::from_bytes(&data[..16]), Err(Error::TruncatedData)));
}
