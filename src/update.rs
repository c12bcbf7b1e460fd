//! Appending to and cutting back an existing archive in place.

use std::fs;
use std::io::{self, Cursor, Read, Seek, Write};

use crate::archive::{seek_to, EntryMark, TarReader};
use crate::error::{ErrorKind, Result};
use crate::{Entry, TarWriter};

/// Sinks whose length can be changed, so that an updated archive does not
/// keep stale bytes past its new end.
pub trait SetLen {
    fn set_len(&mut self, len: u64) -> io::Result<()>;
}

impl SetLen for fs::File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        fs::File::set_len(self, len)
    }
}

impl SetLen for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
        self.get_mut().resize(len, 0);
        Ok(())
    }
}

impl<T: SetLen + ?Sized> SetLen for &mut T {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        (**self).set_len(len)
    }
}

fn set_len_of<W: SetLen>(obj: &mut W, len: u64) -> io::Result<()> {
    obj.set_len(len)
}

impl<W: Read + Write + Seek + SetLen> TarWriter<W> {
    /// Opens an existing archive for update.
    ///
    /// Until the first write the existing entries can be walked with
    /// [`TarWriter::next_entry`]. The first write, or [`TarWriter::finish`],
    /// first moves to the end of the last valid entry, so new entries replace
    /// the old terminator. Unless [`TarWriter::truncate_at`] picked another
    /// cut-off point, the existing entries are kept.
    pub fn new_update(obj: W) -> Result<TarWriter<W>> {
        let reader = TarReader::new_seekable(obj)?;
        Ok(TarWriter::detached(
            reader,
            seek_to::<W>,
            TarWriter::<W>::switch_to_end,
            set_len_of::<W>,
        ))
    }

    /// Returns the next existing entry of an archive opened for update.
    ///
    /// Fails with [`ErrorKind::InvalidState`] once writing has started.
    pub fn next_entry(&mut self) -> Result<Option<Entry<'_, W>>> {
        self.check()?;
        match self.reader.as_mut() {
            Some(reader) => reader.next_entry(),
            None => Err(ErrorKind::InvalidState.into()),
        }
    }

    /// Cuts the archive at an entry previously returned by
    /// [`TarWriter::next_entry`]: before its first header, or after its data
    /// when `after` is set. Everything from there on is replaced by what is
    /// written next and the file is shortened when the archive is finished.
    pub fn truncate_at(&mut self, mark: EntryMark, after: bool) -> Result<()> {
        self.check()?;
        if self.reader.is_none() {
            return Err(ErrorKind::InvalidState.into());
        }
        let offset = if after {
            mark.next_header_offset
        } else {
            mark.header_offset
        };
        log::debug!("cutting archive at offset {}", offset);
        self.take_over(offset)
    }

    // Walks the remaining entries to find where the archive ends.
    fn switch_to_end(&mut self) -> Result<()> {
        let reader = self.reader.as_mut().ok_or(ErrorKind::InvalidState)?;
        while reader.next_entry()?.is_some() {}
        let end = reader.end_offset().unwrap_or_else(|| reader.position());
        log::debug!("appending to archive at offset {}", end);
        self.take_over(end)
    }

    fn take_over(&mut self, offset: u64) -> Result<()> {
        let reader = self.reader.as_mut().ok_or(ErrorKind::InvalidState)?;
        reader.skip_to(offset)?;
        if let Some(reader) = self.reader.take() {
            self.obj = Some(reader.into_inner());
            self.pos = offset;
        }
        Ok(())
    }
}
