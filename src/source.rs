//! Lazy random-access byte sources.
//!
//! Every parser in this crate reads through the [`ByteSource`] trait, which
//! exposes one capability: read `length` bytes at an absolute `offset`,
//! yielding fewer bytes only at end of data. The streaming backends share a
//! page-aligned chunk cache ([`ChunkSource`]) so repeated and out-of-order
//! access never re-reads from the underlying transport.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp::Ordering;
use std::io::{Read, Seek, SeekFrom};

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use log::{debug, warn};

use crate::{Error, Result, TryVec};

/// Size of one cache page, in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Uniform lazy random-access read over some byte-producing input.
///
/// Implementations must never mutate caller-owned data, and must serve the
/// same bytes for the same span however many times it is requested.
pub trait ByteSource {
    /// Read up to `length` bytes at `offset`.
    ///
    /// Returns `None` when `offset` lies past the end of the data, and a
    /// shorter-than-requested buffer when the data ends mid-span. A zero
    /// `length` yields an empty buffer as long as `offset` is in bounds.
    fn slice(&mut self, offset: u64, length: usize) -> Result<Option<TryVec<u8>>>;

    /// Read exactly `length` bytes at `offset`, or fail with
    /// [`Error::TruncatedData`].
    fn require(&mut self, offset: u64, length: usize) -> Result<TryVec<u8>> {
        match self.slice(offset, length)? {
            Some(bytes) if bytes.len() == length => Ok(bytes),
            _ => Err(Error::TruncatedData),
        }
    }
}

/// A backend that produces fixed-size pages on demand.
///
/// Implementors only define how page `index` is obtained; the composition of
/// pages into arbitrary spans is shared via the blanket [`ByteSource`] impl.
pub trait ChunkSource {
    /// Page size in bytes. Constant for the lifetime of the source.
    fn chunk_size(&self) -> usize;

    /// Fetch page `index`, counted from the start of the data.
    ///
    /// Returns `None` once the data is exhausted before this page, and a
    /// short page exactly at the end of the data. Pages, once produced, must
    /// be stable: the same index always yields the same bytes.
    fn chunk(&mut self, index: u64) -> Result<Option<&[u8]>>;

    /// Fetch page `index` like [`chunk`](Self::chunk), with at least its
    /// first `need` bytes present when the underlying data holds them. Lets
    /// a source seeded with a provisional prefix tell "short because the
    /// data ends" from "short because only a prefix was supplied". The
    /// default ignores `need`.
    fn chunk_at_least(&mut self, index: u64, need: usize) -> Result<Option<&[u8]>> {
        let _ = need;
        self.chunk(index)
    }
}

/// Compose a span from a partial first page, whole intermediate pages, and a
/// partial last page. Truncates silently if the source ends mid-span. When
/// the data ends exactly on a page boundary, the end-of-data offset reads as
/// `None` rather than as an empty span.
impl<T: ChunkSource> ByteSource for T {
    fn slice(&mut self, offset: u64, length: usize) -> Result<Option<TryVec<u8>>> {
        let size = self.chunk_size() as u64;
        let first = offset / size;
        let rel = (offset % size) as usize;

        if length == 0 {
            return Ok(match self.chunk_at_least(first, rel)? {
                Some(data) if rel <= data.len() => Some(TryVec::new()),
                _ => None,
            });
        }

        let last = (offset + length as u64 - 1) / size;
        let mut out = TryVec::new();
        {
            let need = if first == last { rel + length } else { self.chunk_size() };
            let Some(data) = self.chunk_at_least(first, need)? else {
                return Ok(None);
            };
            if rel > data.len() {
                return Ok(None);
            }
            if first == last {
                let end = data.len().min(rel + length);
                out.extend_from_slice(&data[rel..end])?;
                return Ok(Some(out));
            }
            out.extend_from_slice(&data[rel..])?;
        }
        for index in first + 1..last {
            match self.chunk_at_least(index, self.chunk_size())? {
                Some(data) => out.extend_from_slice(data)?,
                None => return Ok(Some(out)),
            }
        }
        let tail = ((offset + length as u64) - last * size) as usize;
        if let Some(data) = self.chunk_at_least(last, tail)? {
            out.extend_from_slice(&data[..data.len().min(tail)])?;
        }
        Ok(Some(out))
    }
}

/// In-memory backend over a borrowed buffer. No cache, spans are direct
/// sub-ranges of the slice.
pub struct SliceSource<'a> {
    data: &'a [u8],
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl ByteSource for SliceSource<'_> {
    fn slice(&mut self, offset: u64, length: usize) -> Result<Option<TryVec<u8>>> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(None);
        };
        if start > self.data.len() {
            return Ok(None);
        }
        let end = self.data.len().min(start.saturating_add(length));
        let mut out = TryVec::new();
        out.extend_from_slice(&self.data[start..end])?;
        Ok(Some(out))
    }
}

/// Backend over a seekable stream. Page `i` is fetched by seeking to
/// `i × chunk_size` and reading one page; pages are cached by index so
/// backward and repeated access never touch the stream twice.
pub struct SeekSource<R> {
    io: R,
    chunk_size: usize,
    pos: u64,
    chunks: TryVec<(u64, TryVec<u8>)>,
}

impl<R: Read + Seek> SeekSource<R> {
    pub fn new(io: R) -> Self {
        Self::with_chunk_size(io, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(io: R, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self {
            io,
            chunk_size,
            pos: 0,
            chunks: TryVec::new(),
        }
    }
}

impl<R: Read + Seek> ChunkSource for SeekSource<R> {
    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn chunk(&mut self, index: u64) -> Result<Option<&[u8]>> {
        if !self.chunks.iter().any(|(i, _)| *i == index) {
            let target = index
                .checked_mul(self.chunk_size as u64)
                .ok_or(Error::Format("page offset overflow"))?;
            if self.pos != target {
                self.io.seek(SeekFrom::Start(target))?;
            }
            let data = read_up_to(&mut self.io, self.chunk_size)?;
            self.pos = target + data.len() as u64;
            self.chunks.push((index, data))?;
        }
        Ok(self
            .chunks
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, page)| &page[..])
            .filter(|page| !page.is_empty()))
    }
}

/// Backend over a forward-only stream. Pages are appended as consumed; page
/// `i` becomes available once `i + 1` pages have been read. The transport is
/// never rewound, but consumed pages stay cached, so backward access over
/// already-read data succeeds.
pub struct StreamSource<R> {
    io: R,
    chunk_size: usize,
    chunks: TryVec<TryVec<u8>>,
    exhausted: bool,
}

impl<R: Read> StreamSource<R> {
    pub fn new(io: R) -> Self {
        Self::with_chunk_size(io, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(io: R, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self {
            io,
            chunk_size,
            chunks: TryVec::new(),
            exhausted: false,
        }
    }
}

impl<R: Read> ChunkSource for StreamSource<R> {
    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn chunk(&mut self, index: u64) -> Result<Option<&[u8]>> {
        let Ok(index) = usize::try_from(index) else {
            return Ok(None);
        };
        while self.chunks.len() <= index && !self.exhausted {
            let data = read_up_to(&mut self.io, self.chunk_size)?;
            if data.len() < self.chunk_size {
                self.exhausted = true;
            }
            if data.is_empty() {
                break;
            }
            self.chunks.push(data)?;
        }
        Ok(self.chunks.get(index).map(|v| &v[..]))
    }
}

/// Answer from a [`RangeFetcher`].
#[derive(Debug)]
pub enum FetchResponse {
    /// The requested span, shorter than requested only at end of resource.
    /// An empty span means the resource holds no bytes at that offset.
    Partial(Vec<u8>),
    /// The collaborator does not support partial ranges and returned the
    /// entire body, counted from offset zero.
    Full(Vec<u8>),
}

/// Collaborator capable of fetching a byte range from a remote resource.
///
/// Transport mechanics (issuing the HTTP request, following redirects,
/// timeouts, retries) belong to the implementor; the probe only issues
/// `fetch(offset, length)` calls and never retries on its own.
pub trait RangeFetcher {
    /// Fetch bytes `[offset, offset + length)`.
    fn fetch(&mut self, offset: u64, length: usize) -> std::io::Result<FetchResponse>;
}

/// Backend over an injected [`RangeFetcher`]. Pages are fetched on demand
/// and cached; a [`FetchResponse::Full`] answer flips the source into
/// whole-body mode and no further fetches are issued.
pub struct RemoteSource<F> {
    fetcher: F,
    chunk_size: usize,
    chunks: TryVec<(u64, TryVec<u8>)>,
    body: Option<TryVec<u8>>,
    // first page holds only a caller-supplied prefix of unknown extent
    provisional: bool,
}

impl<F: RangeFetcher> RemoteSource<F> {
    pub fn new(fetcher: F) -> Self {
        Self::with_chunk_size(fetcher, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(fetcher: F, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self {
            fetcher,
            chunk_size,
            chunks: TryVec::new(),
            body: None,
            provisional: false,
        }
    }

    /// Seed the source with bytes already in hand, typically the body of an
    /// initial ranged request for the first page.
    ///
    /// A seed longer than one page can only come from a server that ignored
    /// the range, so it is kept as the whole body. A seed shorter than one
    /// page is a prefix hint: reads inside it cost no fetch, and the first
    /// read past it re-fetches the page to learn whether more data exists.
    pub fn with_prefetched(fetcher: F, first_chunk: Vec<u8>) -> Result<Self> {
        let mut source = Self::new(fetcher);
        match first_chunk.len().cmp(&source.chunk_size) {
            Ordering::Greater => source.body = Some(first_chunk.into()),
            Ordering::Equal => source.chunks.push((0, first_chunk.into()))?,
            Ordering::Less if !first_chunk.is_empty() => {
                source.chunks.push((0, first_chunk.into()))?;
                source.provisional = true;
            }
            Ordering::Less => {}
        }
        Ok(source)
    }

    fn fetch_page(&mut self, index: u64) -> Result<()> {
        let offset = index
            .checked_mul(self.chunk_size as u64)
            .ok_or(Error::Format("page offset overflow"))?;
        debug!("fetching remote range [{offset}, {})", offset + self.chunk_size as u64);
        match self.fetcher.fetch(offset, self.chunk_size)? {
            FetchResponse::Partial(data) => {
                if let Some(entry) = self.chunks.iter_mut().find(|(i, _)| *i == index) {
                    entry.1 = data.into();
                } else {
                    self.chunks.push((index, data.into()))?;
                }
            }
            FetchResponse::Full(data) => {
                warn!("range fetch unsupported, degrading to whole body ({} bytes)", data.len());
                self.body = Some(data.into());
            }
        }
        Ok(())
    }
}

impl<F: RangeFetcher> ChunkSource for RemoteSource<F> {
    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn chunk(&mut self, index: u64) -> Result<Option<&[u8]>> {
        if self.body.is_none() && !self.chunks.iter().any(|(i, _)| *i == index) {
            self.fetch_page(index)?;
        }
        if let Some(body) = &self.body {
            let Some(start) = index
                .checked_mul(self.chunk_size as u64)
                .and_then(|o| usize::try_from(o).ok())
            else {
                return Ok(None);
            };
            if start >= body.len() {
                return Ok(None);
            }
            let end = body.len().min(start + self.chunk_size);
            return Ok(Some(&body[start..end]));
        }
        Ok(self
            .chunks
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, page)| &page[..])
            .filter(|page| !page.is_empty()))
    }

    fn chunk_at_least(&mut self, index: u64, need: usize) -> Result<Option<&[u8]>> {
        if index == 0 && self.provisional {
            let short = self
                .chunks
                .iter()
                .find(|(i, _)| *i == 0)
                .is_some_and(|(_, page)| page.len() < need);
            if short {
                debug!("prefetched prefix too short for the requested span");
                self.fetch_page(0)?;
                self.provisional = false;
            }
        }
        self.chunk(index)
    }
}

/// Read up to `size` bytes from `io`, stopping early only at end of stream.
fn read_up_to<R: Read>(io: &mut R, size: usize) -> Result<TryVec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size).map_err(|_| Error::OutOfMemory)?;
    buf.resize(size, 0);
    let mut filled = 0;
    while filled < size {
        match io.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    buf.truncate(filled);
    Ok(buf.into())
}

pub(crate) fn u8_at<S: ByteSource>(src: &mut S, offset: u64) -> Result<u8> {
    Ok(src.require(offset, 1)?[0])
}

/// Single byte at `offset`, or `None` past end of data.
pub(crate) fn byte_at<S: ByteSource>(src: &mut S, offset: u64) -> Result<Option<u8>> {
    Ok(src.slice(offset, 1)?.and_then(|b| b.first().copied()))
}

pub(crate) fn be_u16_at<S: ByteSource>(src: &mut S, offset: u64) -> Result<u16> {
    Ok(BigEndian::read_u16(&src.require(offset, 2)?))
}

pub(crate) fn be_u32_at<S: ByteSource>(src: &mut S, offset: u64) -> Result<u32> {
    Ok(BigEndian::read_u32(&src.require(offset, 4)?))
}

pub(crate) fn be_u64_at<S: ByteSource>(src: &mut S, offset: u64) -> Result<u64> {
    Ok(BigEndian::read_u64(&src.require(offset, 8)?))
}

pub(crate) fn le_u16_at<S: ByteSource>(src: &mut S, offset: u64) -> Result<u16> {
    Ok(LittleEndian::read_u16(&src.require(offset, 2)?))
}

pub(crate) fn le_u32_at<S: ByteSource>(src: &mut S, offset: u64) -> Result<u32> {
    Ok(LittleEndian::read_u32(&src.require(offset, 4)?))
}

pub(crate) fn le_i32_at<S: ByteSource>(src: &mut S, offset: u64) -> Result<i32> {
    Ok(LittleEndian::read_i32(&src.require(offset, 4)?))
}

#[test]
fn slice_source_bounds() {
    let mut src = SliceSource::new(b"0123456789");
    assert_eq!(src.slice(0, 4).unwrap().unwrap(), b"0123".as_ref());
    assert_eq!(src.slice(8, 4).unwrap().unwrap(), b"89".as_ref());
    assert_eq!(src.slice(10, 4).unwrap().unwrap(), b"".as_ref());
    assert!(src.slice(11, 1).unwrap().is_none());
    assert!(matches!(src.require(8, 4), Err(Error::TruncatedData)));
}

#[test]
fn seek_source_reads_once_per_page() {
    struct Counting<R> {
        inner: R,
        reads: u32,
    }
    impl<R: Read> Read for Counting<R> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.reads += 1;
            self.inner.read(buf)
        }
    }
    impl<R: Seek> Seek for Counting<R> {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    let data: Vec<u8> = (0..=255).collect();
    let io = Counting { inner: std::io::Cursor::new(data.clone()), reads: 0 };
    let mut src = SeekSource::with_chunk_size(io, 16);
    assert_eq!(src.require(250, 6).unwrap(), data[250..256].as_ref());
    assert_eq!(src.require(0, 4).unwrap(), data[0..4].as_ref());
    let after_two = src.io.reads;
    // repeated and backward access is served from cache
    assert_eq!(src.require(250, 6).unwrap(), data[250..256].as_ref());
    assert_eq!(src.require(2, 20).unwrap(), data[2..22].as_ref());
    assert!(src.io.reads > after_two); // page 1 was new
    let settled = src.io.reads;
    assert_eq!(src.require(0, 32).unwrap(), data[0..32].as_ref());
    assert_eq!(src.io.reads, settled);
}

#[test]
fn stream_source_keeps_consumed_pages() {
    let data: Vec<u8> = (0..100u8).collect();
    let mut src = StreamSource::with_chunk_size(&data[..], 7);
    assert_eq!(src.require(50, 10).unwrap(), data[50..60].as_ref());
    // backward access over already-consumed pages still works
    assert_eq!(src.require(3, 10).unwrap(), data[3..13].as_ref());
    assert_eq!(src.slice(99, 10).unwrap().unwrap(), data[99..].as_ref());
    assert!(src.slice(200, 1).unwrap().is_none());
}

#[test]
fn chunked_slice_matches_direct_indexing() {
    let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    for &(offset, length) in &[(0usize, 0usize), (0, 1), (0, 17), (16, 1), (16, 16), (15, 18), (40, 500), (990, 20), (999, 1), (1000, 1)] {
        let expect = if offset <= data.len() {
            Some(&data[offset..data.len().min(offset + length)])
        } else {
            None
        };
        let mut seek = SeekSource::with_chunk_size(std::io::Cursor::new(data.clone()), 16);
        let mut stream = StreamSource::with_chunk_size(&data[..], 16);
        let got_seek = seek.slice(offset as u64, length).unwrap();
        let got_stream = stream.slice(offset as u64, length).unwrap();
        assert_eq!(got_seek.as_deref(), expect, "seek at {offset}+{length}");
        assert_eq!(got_stream.as_deref(), expect, "stream at {offset}+{length}");
    }

    // when the data ends exactly on a page boundary the chunked backends
    // report no bytes at the end offset, where direct indexing yields an
    // empty span; require() treats both as truncation
    let exact: Vec<u8> = (0..32u8).collect();
    let mut seek = SeekSource::with_chunk_size(std::io::Cursor::new(exact.clone()), 16);
    assert!(seek.slice(32, 4).unwrap().is_none());
    assert!(matches!(seek.require(32, 4), Err(Error::TruncatedData)));
    let mut stream = StreamSource::with_chunk_size(&exact[..], 16);
    assert!(stream.slice(32, 4).unwrap().is_none());
    assert_eq!(SliceSource::new(&exact).slice(32, 4).unwrap().unwrap(), b"".as_ref());
}

#[test]
fn prefetched_seed_longer_than_a_page_is_the_whole_body() {
    struct NoFetch;
    impl RangeFetcher for NoFetch {
        fn fetch(&mut self, _offset: u64, _length: usize) -> std::io::Result<FetchResponse> {
            Err(std::io::Error::other("no fetch expected"))
        }
    }

    let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    let mut src = RemoteSource::with_prefetched(NoFetch, data.clone()).unwrap();
    assert_eq!(src.require(0, 64).unwrap(), data[..64].as_ref());
    assert_eq!(src.slice(4990, 20).unwrap().unwrap(), data[4990..].as_ref());
    assert!(src.slice(5001, 1).unwrap().is_none());
}
