use std::borrow::Cow;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::archive::{next_header_after, EntryMark, TarReader};
use crate::entry_type::S_IFMT;
use crate::error::{ErrorKind, Result};
use crate::parser::RawEntry;
use crate::sparse::{Chunk, SparseMap};
use crate::{bytes2path, EntryType, FileType, Header, ObjectInfo, TarFormat};

/// A read-only view into an entry of an archive.
///
/// This structure is a window into a portion of a borrowed archive which can
/// be inspected. It acts as a file handle by implementing the `Read` trait,
/// and `Seek` when the archive was opened with
/// [`TarReader::new_seekable`]. Holes of GNU sparse files read as zeros.
pub struct Entry<'a, R: 'a> {
    archive: &'a mut TarReader<R>,
    fields: EntryFields,
    pos: u64,
}

/// Everything known about an entry once its headers have been decoded.
#[derive(Clone, Debug)]
pub(crate) struct EntryFields {
    path: Vec<u8>,
    link: Option<Vec<u8>>,
    header: Header,
    format: TarFormat,
    file_type: FileType,
    hard_link: bool,
    info: ObjectInfo,
    map: SparseMap,
    sparse: bool,
    pub(crate) mark: EntryMark,
}

impl EntryFields {
    /// Decodes the numeric fields of a completed header sequence and works
    /// out the data layout of the entry.
    pub(crate) fn from_raw(
        raw: RawEntry,
        header_offset: u64,
        data_offset: u64,
    ) -> Result<EntryFields> {
        let RawEntry {
            header,
            format,
            name,
            link,
            sparse,
            pax,
        } = raw;
        let ty = header.entry_type();

        let stored = match pax.size {
            Some(size) => size,
            None => header.size()?,
        };
        let mtime = match pax.mtime {
            Some(mtime) => mtime,
            None => header.mtime()?,
        };

        let raw_mode = header.mode()?;
        if raw_mode & !(S_IFMT | 0o7777) != 0 {
            return Err(ErrorKind::BadModeField.into());
        }
        let type_bits = raw_mode & S_IFMT;
        let expected = match ty {
            _ if sparse.is_some() => FileType::File,
            EntryType::OldRegular | EntryType::Regular | EntryType::Continuous => {
                match FileType::from_mode(type_bits) {
                    Some(t @ (FileType::File | FileType::Directory)) => t,
                    _ if name.ends_with(b"/") => FileType::Directory,
                    _ => FileType::File,
                }
            }
            // The mode of a hard link describes the file it points to.
            EntryType::Link => FileType::File,
            EntryType::Symlink => FileType::Symlink,
            EntryType::Char => FileType::CharDevice,
            EntryType::Block => FileType::BlockDevice,
            EntryType::Directory => FileType::Directory,
            EntryType::Fifo => FileType::Fifo,
            _ => return Err(ErrorKind::UnknownTypeFlag.into()),
        };
        if type_bits != 0 && type_bits != expected.mode_bits() {
            return Err(ErrorKind::ModeWithType.into());
        }
        let hard_link = ty.is_hard_link();
        let file_type = if hard_link {
            FileType::Symlink
        } else {
            expected
        };

        let mut info = ObjectInfo::new(file_type, raw_mode);
        info.set_times(mtime);
        info.uid = Some(match pax.uid {
            Some(uid) => uid,
            None => u64::try_from(header.uid()?).map_err(|_| ErrorKind::NumValueTooLarge)?,
        });
        info.gid = Some(match pax.gid {
            Some(gid) => gid,
            None => u64::try_from(header.gid()?).map_err(|_| ErrorKind::NumValueTooLarge)?,
        });
        info.owner = pax.uname.or_else(|| non_empty(header.username()));
        info.group = pax.gname.or_else(|| non_empty(header.groupname()));
        if ty.is_device() {
            match header.device() {
                Some(device) => info.device = Some(device?),
                None => return Err(ErrorKind::UnknownTypeFlag.into()),
            }
        }

        let is_sparse = sparse.is_some();
        let map = match sparse {
            Some(spans) => SparseMap::from_archive(spans, header.real_size()?, stored)?,
            None => SparseMap::dense(stored),
        };
        info.size = map.file_size();

        let mark = EntryMark {
            header_offset,
            data_offset,
            next_header_offset: next_header_after(data_offset, stored),
        };
        Ok(EntryFields {
            path: name,
            link,
            header,
            format,
            file_type,
            hard_link,
            info,
            map,
            sparse: is_sparse,
            mark,
        })
    }
}

fn non_empty(name: Option<&str>) -> Option<String> {
    name.filter(|n| !n.is_empty()).map(str::to_owned)
}

impl<'a, R: Read> Entry<'a, R> {
    pub(crate) fn new(archive: &'a mut TarReader<R>, fields: EntryFields) -> Entry<'a, R> {
        Entry {
            archive,
            fields,
            pos: 0,
        }
    }

    /// Returns the path name for this entry.
    ///
    /// This method may fail if the pathname is not valid unicode and this is
    /// called on a Windows platform.
    pub fn path(&self) -> Result<Cow<'_, Path>> {
        bytes2path(Cow::Borrowed(&self.fields.path))
    }

    /// Returns the raw bytes listed for this entry, resolved from GNU long
    /// name records and pax headers.
    pub fn path_bytes(&self) -> &[u8] {
        &self.fields.path
    }

    /// Returns the link target of a symbolic or hard link.
    pub fn link_name(&self) -> Result<Option<Cow<'_, Path>>> {
        match &self.fields.link {
            Some(link) => bytes2path(Cow::Borrowed(link)).map(Some),
            None => Ok(None),
        }
    }

    /// Returns the raw link target of a symbolic or hard link.
    pub fn link_name_bytes(&self) -> Option<&[u8]> {
        self.fields.link.as_deref()
    }

    /// The kind of object this entry describes.
    ///
    /// Hard links are reported as [`FileType::Symlink`]; use
    /// [`Entry::is_hard_link`] to tell them apart.
    pub fn file_type(&self) -> FileType {
        self.fields.file_type
    }

    pub fn is_hard_link(&self) -> bool {
        self.fields.hard_link
    }

    /// Returns access to the header of this entry in the archive.
    pub fn header(&self) -> &Header {
        &self.fields.header
    }

    /// Layout family of the archive this entry came from.
    pub fn format(&self) -> TarFormat {
        self.fields.format
    }

    /// Decoded metadata of this entry.
    pub fn info(&self) -> &ObjectInfo {
        &self.fields.info
    }

    /// Logical size of the entry's data, holes of sparse files included.
    pub fn size(&self) -> u64 {
        self.fields.map.file_size()
    }

    pub fn is_sparse(&self) -> bool {
        self.fields.sparse
    }

    /// The data runs of this entry. Entries without holes have one span.
    pub fn sparse_map(&self) -> &SparseMap {
        &self.fields.map
    }

    /// Byte offsets of this entry, usable with [`crate::TarWriter::truncate_at`].
    pub fn mark(&self) -> EntryMark {
        self.fields.mark
    }

    fn read_data(&mut self, into: &mut [u8]) -> Result<usize> {
        let size = self.fields.map.file_size();
        if self.pos >= size {
            self.archive.skip_to(self.fields.mark.next_header_offset)?;
            return Ok(0);
        }
        if into.is_empty() {
            return Ok(0);
        }

        let want = (size - self.pos).min(into.len() as u64);
        let n = match self.fields.map.chunk_at(self.pos) {
            Chunk::Hole(len) => {
                let n = len.min(want) as usize;
                into[..n].fill(0);
                n
            }
            Chunk::Data { physical, len } => {
                self.archive
                    .skip_to(self.fields.mark.data_offset + physical)?;
                let n = len.min(want) as usize;
                match self.archive.read_raw(&mut into[..n])? {
                    0 => return Err(ErrorKind::UnexpectedEndOfStream.into()),
                    n => n,
                }
            }
        };
        self.pos += n as u64;
        if self.pos == size {
            // Leave the stream at the next header.
            self.archive.skip_to(self.fields.mark.next_header_offset)?;
        }
        Ok(n)
    }
}

impl<'a, R: Read> Read for Entry<'a, R> {
    fn read(&mut self, into: &mut [u8]) -> io::Result<usize> {
        self.read_data(into).map_err(io::Error::from)
    }
}

impl<'a, R: Read + Seek> Seek for Entry<'a, R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if !self.archive.is_seekable() {
            return Err(ErrorKind::NotAFile.into());
        }
        let size = self.fields.map.file_size() as i128;
        let target = match pos {
            SeekFrom::Start(n) => n as i128,
            SeekFrom::End(n) => size + n as i128,
            SeekFrom::Current(n) => self.pos as i128 + n as i128,
        };
        if target < 0 {
            return Err(ErrorKind::NegativeSeek.into());
        }
        if target > size {
            return Err(ErrorKind::Seek.into());
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}
