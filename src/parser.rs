//! The header state machine: turns a sequence of 512-byte blocks into
//! complete entry descriptions.
//!
//! GNU long name and long link records, pax extended headers and GNU sparse
//! extension blocks all precede or follow the header they belong to, so a
//! single entry can span many blocks. Everything collected on the way lives
//! inside the current [`ReaderState`].

use std::mem;

use crate::error::{ErrorKind, Result};
use crate::header::{read_sparse_ext_block, validate_header, Header};
use crate::pax::PaxOverrides;
use crate::sparse::SparseSpan;
use crate::{truncate, EntryType, TarFormat, BLOCK_SIZE};

/// Upper bound for GNU long names and link targets and for pax headers.
pub const MAX_LONG_NAME: u64 = 1024 * 1024;

/// How many terminator blocks are tolerated after the end of an archive.
const MAX_ZERO_BLOCKS: u32 = 64 * 1024 / BLOCK_SIZE as u32 + 2;

const LONG_LINK: &[u8] = b"././@LongLink";

/// Records gathered for an entry whose main header has not been seen yet.
#[derive(Clone, Debug, Default)]
pub struct Pending {
    long_name: Option<Vec<u8>>,
    long_link: Option<Vec<u8>>,
    pax: Option<Vec<u8>>,
}

impl Pending {
    fn is_empty(&self) -> bool {
        self.long_name.is_none() && self.long_link.is_none() && self.pax.is_none()
    }
}

/// Where the parser stands within the block sequence.
#[derive(Clone, Debug, Default)]
pub enum ReaderState {
    /// Expecting the first header of an entry.
    #[default]
    First,
    /// Terminator blocks have been seen; only more zeros may follow.
    Zero { blocks: u32 },
    /// Collecting the data blocks of a GNU long name record.
    GnuLongName { pending: Pending, expected: usize },
    /// Collecting the data blocks of a GNU long link record.
    GnuLongLink { pending: Pending, expected: usize },
    /// Collecting the records of a pax extended header.
    PaxHeader {
        pending: Pending,
        global: bool,
        expected: usize,
        data: Vec<u8>,
    },
    /// Collecting GNU sparse extension blocks of a completed header.
    GnuSparse { entry: Box<RawEntry> },
    /// Continuation records are complete; the next block is the real header.
    GnuNext { pending: Pending },
}

/// An entry assembled from its header blocks, before numeric decoding.
#[derive(Clone, Debug)]
pub struct RawEntry {
    /// The main header.
    pub header: Header,
    /// Layout family of the archive.
    pub format: TarFormat,
    /// Full path, from the long name record, a pax record or the header.
    pub name: Vec<u8>,
    /// Link target of hard and symbolic links.
    pub link: Option<Vec<u8>>,
    /// Sparse map of GNU sparse entries, sentinel included.
    pub sparse: Option<Vec<SparseSpan>>,
    pub(crate) pax: PaxOverrides,
}

impl RawEntry {
    pub fn is_hardlink(&self) -> bool {
        self.header.entry_type().is_hard_link()
    }
}

/// The reader state machine.
#[derive(Debug, Default)]
pub struct HeaderParser {
    state: ReaderState,
    format: Option<TarFormat>,
    global: PaxOverrides,
}

impl HeaderParser {
    pub fn new() -> HeaderParser {
        HeaderParser::default()
    }

    pub fn state(&self) -> &ReaderState {
        &self.state
    }

    /// The layout family detected from the first header of the stream.
    pub fn format(&self) -> Option<TarFormat> {
        self.format
    }

    /// Whether the blocks seen so far leave an entry incomplete.
    pub fn expecting_more_headers(&self) -> bool {
        !self.is_at_end()
    }

    /// Whether the stream may legitimately end before the next block.
    pub fn is_at_end(&self) -> bool {
        matches!(self.state, ReaderState::First | ReaderState::Zero { .. })
    }

    /// Whether terminator blocks have been seen.
    pub fn seen_terminator(&self) -> bool {
        matches!(self.state, ReaderState::Zero { .. })
    }

    /// Feeds one block to the state machine, returning the entry it
    /// completes, if any.
    pub fn parse_header(&mut self, block: &[u8; BLOCK_SIZE]) -> Result<Option<RawEntry>> {
        let state = mem::take(&mut self.state);
        let (state, entry) = self.transition(state, block)?;
        self.state = state;
        Ok(entry)
    }

    fn transition(
        &mut self,
        state: ReaderState,
        block: &[u8; BLOCK_SIZE],
    ) -> Result<(ReaderState, Option<RawEntry>)> {
        match state {
            ReaderState::First => self.header_block(Pending::default(), block),
            ReaderState::GnuNext { pending } => self.header_block(pending, block),
            ReaderState::Zero { blocks } => {
                if block.iter().any(|b| *b != 0) || blocks >= MAX_ZERO_BLOCKS {
                    return Err(ErrorKind::ZeroHeader.into());
                }
                Ok((ReaderState::Zero { blocks: blocks + 1 }, None))
            }
            ReaderState::GnuLongName {
                mut pending,
                expected,
            } => {
                let buf = pending.long_name.get_or_insert_with(Vec::new);
                if accumulate(buf, expected, block)? {
                    Ok((ReaderState::GnuNext { pending }, None))
                } else {
                    Ok((ReaderState::GnuLongName { pending, expected }, None))
                }
            }
            ReaderState::GnuLongLink {
                mut pending,
                expected,
            } => {
                let buf = pending.long_link.get_or_insert_with(Vec::new);
                if accumulate(buf, expected, block)? {
                    Ok((ReaderState::GnuNext { pending }, None))
                } else {
                    Ok((ReaderState::GnuLongLink { pending, expected }, None))
                }
            }
            ReaderState::PaxHeader {
                pending,
                global,
                expected,
                mut data,
            } => {
                let take = (expected - data.len()).min(BLOCK_SIZE);
                data.extend_from_slice(&block[..take]);
                if data.len() < expected {
                    let state = ReaderState::PaxHeader {
                        pending,
                        global,
                        expected,
                        data,
                    };
                    return Ok((state, None));
                }
                Ok((self.finish_pax(pending, global, data)?, None))
            }
            ReaderState::GnuSparse { mut entry } => {
                let spans = entry.sparse.get_or_insert_with(Vec::new);
                if read_sparse_ext_block(block, spans)? {
                    Ok((ReaderState::GnuSparse { entry }, None))
                } else {
                    Ok((ReaderState::First, Some(*entry)))
                }
            }
        }
    }

    fn header_block(
        &mut self,
        mut pending: Pending,
        block: &[u8; BLOCK_SIZE],
    ) -> Result<(ReaderState, Option<RawEntry>)> {
        let format = match validate_header(block) {
            Err(e) if e.kind() == Some(ErrorKind::ZeroHeader) && pending.is_empty() => {
                log::debug!("end of archive marker found");
                return Ok((ReaderState::Zero { blocks: 1 }, None));
            }
            Err(e) => return Err(e),
            Ok(format) => format,
        };
        let format = *self.format.get_or_insert(format);
        let header = Header::from_bytes(block);

        match header.entry_type() {
            ty @ (EntryType::GNULongName | EntryType::GNULongLink) => {
                if header.name_bytes() != LONG_LINK {
                    return Err(ErrorKind::MalformedGnuLongXxxx.into());
                }
                let size = header.size()?;
                if size == 0 {
                    return Err(ErrorKind::MalformedGnuLongXxxx.into());
                }
                if size > MAX_LONG_NAME {
                    return Err(ErrorKind::NameTooLong.into());
                }
                let expected = size as usize;
                let buf = Some(Vec::with_capacity(expected));
                if ty == EntryType::GNULongName {
                    if pending.long_name.is_some() {
                        return Err(ErrorKind::MalformedGnuLongXxxx.into());
                    }
                    pending.long_name = buf;
                    log::debug!("GNU long name of {} bytes", size);
                    Ok((ReaderState::GnuLongName { pending, expected }, None))
                } else {
                    if pending.long_link.is_some() {
                        return Err(ErrorKind::MalformedGnuLongXxxx.into());
                    }
                    pending.long_link = buf;
                    log::debug!("GNU long link of {} bytes", size);
                    Ok((ReaderState::GnuLongLink { pending, expected }, None))
                }
            }
            ty @ (EntryType::XHeader | EntryType::XGlobalHeader) => {
                let size = header.size()?;
                if size > MAX_LONG_NAME {
                    return Err(ErrorKind::UnsupportedPaxType.into());
                }
                let global = ty == EntryType::XGlobalHeader;
                if !global && pending.pax.is_some() {
                    return Err(ErrorKind::MalformedPaxRecord.into());
                }
                if size == 0 {
                    return Ok((self.finish_pax(pending, global, Vec::new())?, None));
                }
                let state = ReaderState::PaxHeader {
                    pending,
                    global,
                    expected: size as usize,
                    data: Vec::with_capacity(size as usize),
                };
                Ok((state, None))
            }
            EntryType::SolarisXHeader => Err(ErrorKind::UnsupportedSolarisHdrType.into()),
            EntryType::GNUSparse => {
                if !header.is_gnu() {
                    return Err(ErrorKind::UnsupportedGnuHeaderType.into());
                }
                let mut spans = Vec::new();
                let extended = header.sparse_spans(&mut spans)?;
                let entry = self.complete(pending, header, format, Some(spans))?;
                if extended {
                    let state = ReaderState::GnuSparse {
                        entry: Box::new(entry),
                    };
                    Ok((state, None))
                } else {
                    Ok((ReaderState::First, Some(entry)))
                }
            }
            EntryType::GNUDumpDir | EntryType::GNUMultiVol | EntryType::GNUVolHdr => {
                Err(ErrorKind::UnsupportedGnuHeaderType.into())
            }
            ty if ty.is_basic() => {
                let entry = self.complete(pending, header, format, None)?;
                Ok((ReaderState::First, Some(entry)))
            }
            _ => Err(ErrorKind::UnknownTypeFlag.into()),
        }
    }

    fn finish_pax(
        &mut self,
        mut pending: Pending,
        global: bool,
        data: Vec<u8>,
    ) -> Result<ReaderState> {
        if global {
            self.global.apply(&data)?;
            if pending.is_empty() {
                return Ok(ReaderState::First);
            }
        } else {
            pending.pax = Some(data);
        }
        Ok(ReaderState::GnuNext { pending })
    }

    fn complete(
        &self,
        pending: Pending,
        header: Header,
        format: TarFormat,
        sparse: Option<Vec<SparseSpan>>,
    ) -> Result<RawEntry> {
        let mut pax = self.global.clone();
        if let Some(data) = &pending.pax {
            pax.apply(data)?;
        }

        let mut name = match (format, pending.long_name) {
            (TarFormat::Gnu, Some(mut long)) => {
                let len = truncate(&long).len();
                long.truncate(len);
                long
            }
            _ => header.path_bytes().into_owned(),
        };
        if let Some(path) = &pax.path {
            name.clone_from(path);
        }
        if name.is_empty() {
            return Err(ErrorKind::EmptyName.into());
        }

        let ty = header.entry_type();
        let link = if ty.is_hard_link() || ty.is_symlink() {
            let link = match (format, pending.long_link) {
                (TarFormat::Gnu, Some(mut long)) => {
                    let len = truncate(&long).len();
                    long.truncate(len);
                    long
                }
                _ => header.link_name_bytes().unwrap_or_default().to_vec(),
            };
            Some(pax.link_path.clone().unwrap_or(link))
        } else {
            None
        };

        Ok(RawEntry {
            header,
            format,
            name,
            link,
            sparse,
            pax,
        })
    }
}

/// Appends one block of a long name record to `buf`, returning whether the
/// announced length has been reached.
///
/// A block contributes everything up to and including its first NUL; only
/// the final block of a record may be short.
fn accumulate(buf: &mut Vec<u8>, expected: usize, block: &[u8; BLOCK_SIZE]) -> Result<bool> {
    let incoming = block
        .iter()
        .position(|b| *b == 0)
        .map_or(BLOCK_SIZE, |nul| nul + 1);
    if buf.len() + incoming > expected
        || (incoming < BLOCK_SIZE && buf.len() + incoming != expected)
    {
        return Err(ErrorKind::MalformedGnuLongXxxx.into());
    }
    buf.extend_from_slice(&block[..incoming]);
    Ok(buf.len() == expected)
}
