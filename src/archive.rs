use std::cmp;
use std::io::{self, Read, Seek, SeekFrom};

use crate::entry::{Entry, EntryFields};
use crate::error::{ErrorKind, Result};
use crate::parser::HeaderParser;
use crate::{block_align, TarFormat, BLOCK_SIZE};

type SeekFn<R> = fn(&mut R, u64) -> io::Result<()>;

/// A streaming reader over the entries of an archive.
///
/// Entries are produced strictly in archive order. Each [`Entry`] borrows
/// the reader, so its data has to be consumed (or abandoned) before the next
/// one is requested; whatever is left unread is skipped automatically.
pub struct TarReader<R> {
    obj: R,
    pos: u64,
    seek: Option<SeekFn<R>>,
    parser: HeaderParser,
    next_header: u64,
    end: Option<u64>,
    done: bool,
}

/// Byte offsets of an entry within the underlying stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryMark {
    /// First block belonging to the entry, continuation records included.
    pub header_offset: u64,
    /// First byte of the entry's data.
    pub data_offset: u64,
    /// Block following the entry's data and padding.
    pub next_header_offset: u64,
}

impl<R: Read> TarReader<R> {
    /// Creates a reader over a stream that can only be read forward.
    ///
    /// Offsets are counted from the current position of `obj`.
    pub fn new(obj: R) -> TarReader<R> {
        TarReader {
            obj,
            pos: 0,
            seek: None,
            parser: HeaderParser::new(),
            next_header: 0,
            end: None,
            done: false,
        }
    }

    /// Advances to the next entry, skipping any data the previous entry left
    /// unread.
    ///
    /// Returns `Ok(None)` once the end of the archive has been reached. Any
    /// error leaves the archive unusable.
    pub fn next_entry(&mut self) -> Result<Option<Entry<'_, R>>> {
        if self.done {
            return Ok(None);
        }
        self.skip_to(self.next_header)?;
        let mut header_offset = self.pos;

        let raw = loop {
            let mut block = [0; BLOCK_SIZE];
            let block_offset = self.pos;
            if !self.read_block(&mut block)? {
                if !self.parser.is_at_end() {
                    return Err(ErrorKind::UnexpectedEndOfStream.into());
                }
                self.end.get_or_insert(block_offset);
                self.next_header = self.pos;
                self.done = true;
                return Ok(None);
            }
            match self.parser.parse_header(&block)? {
                Some(raw) => break raw,
                None if self.parser.seen_terminator() => {
                    self.end.get_or_insert(block_offset);
                }
                // A global pax header belongs to no entry.
                None if self.parser.is_at_end() => header_offset = self.pos,
                None => {}
            }
        };

        let data_offset = self.pos;
        let fields = EntryFields::from_raw(raw, header_offset, data_offset)?;
        self.next_header = fields.mark.next_header_offset;
        Ok(Some(Entry::new(self, fields)))
    }

    /// Layout family of the archive, known once the first header is read.
    pub fn format(&self) -> Option<TarFormat> {
        self.parser.format()
    }

    /// Offset of the first terminator block, or of the end of the stream
    /// if the archive had none. Known once `next_entry` returned `None`.
    pub fn end_offset(&self) -> Option<u64> {
        self.end.filter(|_| self.done)
    }

    /// Current offset within the underlying stream.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Returns a shared reference to the underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.obj
    }

    /// Unwraps this reader, returning the underlying stream.
    pub fn into_inner(self) -> R {
        self.obj
    }

    pub(crate) fn is_seekable(&self) -> bool {
        self.seek.is_some()
    }

    /// Moves the underlying stream to `target`, by seeking where possible
    /// and by reading and discarding otherwise.
    pub(crate) fn skip_to(&mut self, target: u64) -> Result<()> {
        if target == self.pos {
            return Ok(());
        }
        if let Some(seek) = self.seek {
            seek(&mut self.obj, target)?;
            self.pos = target;
            return Ok(());
        }
        if target < self.pos {
            return Err(ErrorKind::NotAFile.into());
        }

        let mut amt = target - self.pos;
        log::trace!("skipping {} bytes at offset {}", amt, self.pos);
        let mut buf = [0u8; 4096 * 8];
        while amt > 0 {
            let n = cmp::min(amt, buf.len() as u64);
            let n = match self.obj.read(&mut buf[..n as usize]) {
                Ok(0) => return Err(ErrorKind::UnexpectedEndOfStream.into()),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            amt -= n as u64;
            self.pos += n as u64;
        }
        Ok(())
    }

    pub(crate) fn read_raw(&mut self, into: &mut [u8]) -> io::Result<usize> {
        let n = self.obj.read(into)?;
        self.pos += n as u64;
        Ok(n)
    }

    /// Reads one block; `false` means the stream ended cleanly before it.
    fn read_block(&mut self, block: &mut [u8; BLOCK_SIZE]) -> Result<bool> {
        let mut read = 0;
        while read < BLOCK_SIZE {
            match self.obj.read(&mut block[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.pos += read as u64;
        match read {
            0 => Ok(false),
            BLOCK_SIZE => Ok(true),
            _ => Err(ErrorKind::UnexpectedEndOfStream.into()),
        }
    }
}

impl<R: Read + Seek> TarReader<R> {
    /// Creates a reader over a seekable stream.
    ///
    /// Unread entry data is skipped by seeking and entries support random
    /// access. Offsets are absolute positions in `obj`.
    pub fn new_seekable(mut obj: R) -> Result<TarReader<R>> {
        let pos = obj.stream_position()?;
        let mut reader = TarReader::new(obj);
        reader.pos = pos;
        reader.next_header = pos;
        reader.seek = Some(seek_to::<R>);
        Ok(reader)
    }
}

pub(crate) fn seek_to<R: Seek>(obj: &mut R, pos: u64) -> io::Result<()> {
    obj.seek(SeekFrom::Start(pos)).map(|_| ())
}

/// Offset of the block following an entry whose data starts at
/// `data_offset` and is `stored` bytes long.
pub(crate) fn next_header_after(data_offset: u64, stored: u64) -> u64 {
    data_offset + block_align(stored)
}
