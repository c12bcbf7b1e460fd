//! A streaming engine for TAR archives.
//!
//! This library reads and writes POSIX ustar, GNU and ancient (v7) TAR
//! archives [1] abstracted over a reader or writer. Archives are never
//! required to be resident in memory: the reader hands out one entry at a
//! time together with a bounded stream over its data, and the writer streams
//! each entry straight to its sink.
//!
//! Beyond plain entries the engine understands GNU long name and long link
//! records, GNU sparse files (both directions), base-256 numeric fields and
//! pax extended headers, can append entries whose length is only known once
//! they have been written, and can update an existing archive in place.
//!
//! [1]: http://en.wikipedia.org/wiki/Tar_%28computing%29

use std::borrow::Cow;
use std::path::Path;

pub use crate::archive::{EntryMark, TarReader};
pub use crate::builder::{Content, PushEntry, ReadSeek, TarWriter, WriterOptions};
pub use crate::entry::Entry;
pub use crate::entry_type::{EntryType, FileType, TarFormat};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::header::{
    compute_checksum, decode_numeric_field, format_numeric, format_octal, format_offset,
    validate_header, Checksum, Header,
};
pub use crate::object::ObjectInfo;
pub use crate::parser::{HeaderParser, Pending, RawEntry, ReaderState, MAX_LONG_NAME};
pub use crate::pax::{PaxExtension, PaxExtensions};
pub use crate::sparse::{buffer_size, SparseMap, SparseSpan, MIN_SPARSE_SIZE};
pub use crate::update::SetLen;

mod archive;
mod builder;
mod entry;
mod entry_type;
mod error;
mod header;
mod object;
mod parser;
mod pax;
mod sparse;
mod update;

/// Size of a header block and the unit all data is padded to.
pub const BLOCK_SIZE: usize = 512;

/// Rounds `size` up to the next multiple of the block size.
fn block_align(size: u64) -> u64 {
    size.div_ceil(BLOCK_SIZE as u64) * BLOCK_SIZE as u64
}

fn truncate(slice: &[u8]) -> &[u8] {
    match slice.iter().position(|i| *i == 0) {
        Some(i) => &slice[..i],
        None => slice,
    }
}

#[cfg(unix)]
fn bytes2path(bytes: Cow<'_, [u8]>) -> Result<Cow<'_, Path>> {
    use std::ffi::{OsStr, OsString};
    use std::os::unix::prelude::*;

    Ok(match bytes {
        Cow::Borrowed(bytes) => Cow::Borrowed(Path::new(OsStr::from_bytes(bytes))),
        Cow::Owned(bytes) => Cow::Owned(OsString::from_vec(bytes).into()),
    })
}

#[cfg(not(unix))]
fn bytes2path(bytes: Cow<'_, [u8]>) -> Result<Cow<'_, Path>> {
    Ok(match bytes {
        Cow::Borrowed(bytes) => {
            let s = std::str::from_utf8(bytes).map_err(|_| not_unicode())?;
            Cow::Borrowed(Path::new(s))
        }
        Cow::Owned(bytes) => {
            let s = String::from_utf8(bytes).map_err(|_| not_unicode())?;
            Cow::Owned(s.into())
        }
    })
}

#[cfg(not(unix))]
fn not_unicode() -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        "path is not valid unicode",
    ))
}

#[cfg(unix)]
fn path2bytes(p: &Path) -> Result<Cow<'_, [u8]>> {
    use std::os::unix::prelude::*;
    Ok(Cow::Borrowed(p.as_os_str().as_bytes()))
}

#[cfg(not(unix))]
fn path2bytes(p: &Path) -> Result<Cow<'_, [u8]>> {
    let s = p.to_str().ok_or_else(not_unicode)?;
    // Archives always use forward slashes.
    Ok(if s.contains('\\') {
        Cow::Owned(s.replace('\\', "/").into_bytes())
    } else {
        Cow::Borrowed(s.as_bytes())
    })
}
