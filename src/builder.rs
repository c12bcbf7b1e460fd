use std::borrow::Cow;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use filetime::FileTime;

use crate::archive::{seek_to, TarReader};
use crate::error::{Error, ErrorKind, Result};
use crate::header::{sparse_ext_block, SPARSE_IN_EXT_BLOCK, SPARSE_IN_HEADER};
use crate::sparse::{buffer_size, SparseMap, MIN_SPARSE_SIZE};
use crate::{
    block_align, path2bytes, EntryType, FileType, Header, ObjectInfo, TarFormat, BLOCK_SIZE,
};

type SeekFn<W> = fn(&mut W, u64) -> io::Result<()>;
pub(crate) type SwitchFn<W> = fn(&mut TarWriter<W>) -> Result<()>;
pub(crate) type SetLenFn<W> = fn(&mut W, u64) -> io::Result<()>;

const NAME_LEN: usize = 100;
const LONG_LINK_NAME: &[u8] = b"././@LongLink";
const DEFAULT_OWNER: &str = "someone";
const DEFAULT_GROUP: &str = "somegroup";
const STREAM_BUFFER: usize = 128 * 1024;
// Headroom kept below the largest signed offset for open-ended pushes.
const OPEN_ENDED_SLACK: u64 = 4096;
const PERMS: u32 = 0o7777;

/// A source that can be read and repositioned, used for files which may be
/// stored sparse.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// The data that accompanies an entry handed to [`TarWriter::add_entry`].
pub enum Content<'a> {
    /// No data. Regular files are stored with a size of zero, directories,
    /// devices and fifos are stored as a header only.
    Empty,
    /// Exactly `info.size` bytes of file data.
    Reader(&'a mut dyn Read),
    /// File data read from the start of a seekable source. Stored as a GNU
    /// sparse file when sparse mode is enabled and that saves space.
    File(&'a mut dyn ReadSeek),
    /// File data of unknown length, read until end of file. The header size
    /// is patched afterwards, which needs a seekable sink.
    Stream(&'a mut dyn Read),
    /// A symbolic link to the given target.
    Symlink(&'a [u8]),
    /// A hard link to an entry already stored under the given name.
    HardLink(&'a [u8]),
}

/// Settings applied while formatting headers.
#[derive(Clone, Debug)]
pub struct WriterOptions {
    format: TarFormat,
    sparse: bool,
    uid: Option<u64>,
    owner: Option<String>,
    gid: Option<u64>,
    group: Option<String>,
    prefix: Option<Vec<u8>>,
    mtime: Option<i64>,
    file_and: u32,
    file_or: u32,
    dir_and: u32,
    dir_or: u32,
}

impl Default for WriterOptions {
    fn default() -> WriterOptions {
        WriterOptions {
            format: TarFormat::Gnu,
            sparse: false,
            uid: None,
            owner: None,
            gid: None,
            group: None,
            prefix: None,
            mtime: None,
            file_and: !0,
            file_or: 0,
            dir_and: !0,
            dir_or: 0,
        }
    }
}

impl WriterOptions {
    /// GNU format, no sparse files, no overrides.
    pub fn new() -> WriterOptions {
        WriterOptions::default()
    }

    /// Header layout to produce. GNU archives get long name records and
    /// base-256 numbers; ustar archives split long paths over the prefix
    /// field.
    pub fn format(mut self, format: TarFormat) -> WriterOptions {
        self.format = format;
        self
    }

    /// Whether files added with [`Content::File`] are scanned for holes.
    /// Only takes effect for the GNU format.
    pub fn sparse(mut self, sparse: bool) -> WriterOptions {
        self.sparse = sparse;
        self
    }

    /// Overrides the owner id and name of every entry.
    pub fn owner(mut self, uid: Option<u64>, name: Option<&str>) -> WriterOptions {
        self.uid = uid;
        self.owner = name.map(str::to_owned);
        self
    }

    /// Overrides the group id and name of every entry.
    pub fn group(mut self, gid: Option<u64>, name: Option<&str>) -> WriterOptions {
        self.gid = gid;
        self.group = name.map(str::to_owned);
        self
    }

    /// Prepends `prefix` to every entry path, with a `/` between the two.
    pub fn prefix<P: AsRef<Path>>(mut self, prefix: P) -> Result<WriterOptions> {
        let mut bytes = path2bytes(prefix.as_ref())?.into_owned();
        if bytes.is_empty() {
            return Err(ErrorKind::EmptyName.into());
        }
        if !bytes.ends_with(b"/") {
            bytes.push(b'/');
        }
        self.prefix = Some(bytes);
        Ok(self)
    }

    /// Stores `mtime` as the modification time of every entry.
    pub fn mtime(mut self, mtime: Option<i64>) -> WriterOptions {
        self.mtime = mtime;
        self
    }

    /// Permission masks for everything but directories: the stored mode is
    /// `(mode & and) | or`.
    pub fn file_mode_masks(mut self, and: u32, or: u32) -> WriterOptions {
        self.file_and = and | !PERMS;
        self.file_or = or & PERMS;
        self
    }

    /// Permission masks for directories.
    pub fn dir_mode_masks(mut self, and: u32, or: u32) -> WriterOptions {
        self.dir_and = and | !PERMS;
        self.dir_or = or & PERMS;
        self
    }
}

/// A structure for building archives
///
/// This structure has methods for building up an archive from scratch into
/// any arbitrary writer. Seekable sinks, see [`TarWriter::new_seekable`],
/// additionally support entries whose length is unknown up front.
pub struct TarWriter<W: Write> {
    options: WriterOptions,
    pub(crate) obj: Option<W>,
    pub(crate) reader: Option<TarReader<W>>,
    pub(crate) pos: u64,
    seek: Option<SeekFn<W>>,
    switch: Option<SwitchFn<W>>,
    set_len: Option<SetLenFn<W>>,
    push: Option<PushState>,
    fatal: Option<Error>,
    finished: bool,
}

/// Book keeping for the entry being filled through a [`PushEntry`].
struct PushState {
    header: Header,
    header_offset: u64,
    data_offset: u64,
    current: u64,
    written: u64,
    expected: u64,
    open_ended: bool,
}

/// A writable handle on an entry being added piece by piece.
///
/// Dropping the handle leaves the entry open; it is completed by
/// [`PushEntry::finish`] or implicitly by the next operation on the writer.
pub struct PushEntry<'a, W: Write> {
    writer: &'a mut TarWriter<W>,
}

struct Prepared {
    // GNU long name and long link records, ready to be written.
    records: Vec<u8>,
    header: Header,
}

impl<W: Write> TarWriter<W> {
    /// Create a new archive builder with the underlying object as the
    /// destination of all data written.
    pub fn new(obj: W) -> TarWriter<W> {
        TarWriter {
            options: WriterOptions::default(),
            obj: Some(obj),
            reader: None,
            pos: 0,
            seek: None,
            switch: None,
            set_len: None,
            push: None,
            fatal: None,
            finished: false,
        }
    }

    /// A writer that only starts writing once `switch` handed it the sink.
    pub(crate) fn detached(
        reader: TarReader<W>,
        seek: SeekFn<W>,
        switch: SwitchFn<W>,
        set_len: SetLenFn<W>,
    ) -> TarWriter<W> {
        TarWriter {
            options: WriterOptions::default(),
            obj: None,
            reader: Some(reader),
            pos: 0,
            seek: Some(seek),
            switch: Some(switch),
            set_len: Some(set_len),
            push: None,
            fatal: None,
            finished: false,
        }
    }

    /// Replaces the header formatting options used for subsequent entries.
    pub fn set_options(&mut self, options: WriterOptions) {
        self.options = options;
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Offset in the sink at which the next byte will be written.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Adds an entry described by `info` under `path`.
    ///
    /// The entry type comes from the type bits of `info.mode` (a regular file
    /// when there are none), or from `content` for links. Any entry still
    /// open through [`TarWriter::begin_push`] is completed first.
    ///
    /// # Errors
    ///
    /// Errors raised before anything was written, such as an unencodable
    /// name, leave the writer usable. Once an entry is partially written
    /// every error is fatal and returned again by all later calls.
    pub fn add_entry<P: AsRef<Path>>(
        &mut self,
        path: P,
        info: &ObjectInfo,
        content: Content<'_>,
    ) -> Result<()> {
        self.begin()?;
        let path = self.entry_path(path.as_ref())?;
        let file_type = info.file_type().unwrap_or(FileType::File);

        match content {
            Content::Symlink(target) => {
                let prepared = self.prepare(&path, info, EntryType::Symlink, 0, Some(target))?;
                self.write_simple(prepared)
            }
            Content::HardLink(target) => {
                let prepared = self.prepare(&path, info, EntryType::Link, 0, Some(target))?;
                self.write_simple(prepared)
            }
            Content::Empty => {
                if file_type == FileType::Symlink {
                    return Err(ErrorKind::InvalidState.into());
                }
                let prepared = self.prepare(&path, info, file_type.entry_type(), 0, None)?;
                self.write_simple(prepared)
            }
            Content::Reader(data) => {
                require_file(file_type)?;
                let prepared = self.prepare(&path, info, EntryType::Regular, info.size, None)?;
                let res = self.write_regular_file(prepared, data, info.size);
                self.latch(res)
            }
            Content::File(file) => {
                require_file(file_type)?;
                self.add_file(&path, info, file)
            }
            Content::Stream(data) => {
                require_file(file_type)?;
                if self.seek.is_none() {
                    return Err(ErrorKind::NotAFile.into());
                }
                let prepared = self.prepare(&path, info, EntryType::Regular, 0, None)?;
                let res = self.write_stream_file(prepared, data);
                self.latch(res)
            }
        }
    }

    /// Adds a file, directory, symlink, device or fifo from the local
    /// filesystem under its own path. Symlinks are stored as links, not
    /// followed.
    pub fn append_path<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.append_path_with_name(path, path)
    }

    /// Adds an object from the local filesystem under the name `name`.
    pub fn append_path_with_name<P: AsRef<Path>, N: AsRef<Path>>(
        &mut self,
        path: P,
        name: N,
    ) -> Result<()> {
        let path = path.as_ref();
        let meta = fs::symlink_metadata(path)?;
        let info = ObjectInfo::from_metadata(&meta);
        match info.file_type() {
            Some(FileType::File) => {
                let mut file = fs::File::open(path)?;
                self.add_entry(name, &info, Content::File(&mut file))
            }
            Some(FileType::Symlink) => {
                let target = fs::read_link(path)?;
                let target = path2bytes(&target)?;
                self.add_entry(name, &info, Content::Symlink(&target))
            }
            _ => self.add_entry(name, &info, Content::Empty),
        }
    }

    /// Starts an entry whose data the caller writes through the returned
    /// handle.
    ///
    /// With `size` of `None` the length is open ended and the header is
    /// patched once the entry completes, which needs a seekable sink. With a
    /// known size exactly that many bytes must be written. Without `info` the
    /// entry is a regular file with mode `0666` stamped with the current time.
    pub fn begin_push<P: AsRef<Path>>(
        &mut self,
        path: P,
        size: Option<u64>,
        info: Option<&ObjectInfo>,
    ) -> Result<PushEntry<'_, W>> {
        self.begin()?;
        if size.is_none() && self.seek.is_none() {
            return Err(ErrorKind::NotAFile.into());
        }
        let path = self.entry_path(path.as_ref())?;
        let info: Cow<'_, ObjectInfo> = match info {
            Some(info) => {
                require_file(info.file_type().unwrap_or(FileType::File))?;
                Cow::Borrowed(info)
            }
            None => {
                let mut info = ObjectInfo::new(FileType::File, 0o666);
                info.set_times(FileTime::now().unix_seconds());
                Cow::Owned(info)
            }
        };

        let mut prepared =
            self.prepare(&path, &info, EntryType::Regular, size.unwrap_or(0), None)?;
        let res = self.emit(&mut prepared);
        let header_offset = self.latch(res)?;
        let data_offset = self.pos;
        let expected = match size {
            Some(size) => size,
            None => (i64::MAX as u64 - OPEN_ENDED_SLACK).saturating_sub(data_offset),
        };
        self.push = Some(PushState {
            header: prepared.header,
            header_offset,
            data_offset,
            current: 0,
            written: 0,
            expected,
            open_ended: size.is_none(),
        });
        Ok(PushEntry { writer: self })
    }

    /// Finish writing this archive, emitting the termination sections.
    ///
    /// Completes any open push entry, writes two zero blocks and flushes the
    /// sink. An archive being updated in place is then cut off at the end of
    /// the terminator.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.begin()?;
        let res = self.write_terminator();
        self.latch(res)?;
        self.finished = true;
        Ok(())
    }

    /// Unwrap this archive, returning the underlying object.
    ///
    /// This function will finish writing the archive if the `finish` function
    /// hasn't yet been called, returning any error which happens during that
    /// operation.
    pub fn into_inner(mut self) -> Result<W> {
        self.finish()?;
        self.obj
            .take()
            .ok_or_else(|| ErrorKind::InvalidState.into())
    }

    pub(crate) fn check(&self) -> Result<()> {
        match &self.fatal {
            Some(err) => Err(err.replicate()),
            None => Ok(()),
        }
    }

    fn latch<T>(&mut self, res: Result<T>) -> Result<T> {
        if let Err(err) = &res {
            log::debug!("writer failed: {}", err);
            self.fatal = Some(err.replicate());
        }
        res
    }

    /// Makes the writer ready for the next entry.
    fn begin(&mut self) -> Result<()> {
        if self.finished {
            return Err(ErrorKind::InvalidState.into());
        }
        self.complete_push()?;
        if self.obj.is_none() {
            let switch = self.switch.ok_or(ErrorKind::InvalidState)?;
            let res = switch(self);
            self.latch(res)?;
        }
        Ok(())
    }

    fn entry_path(&self, path: &Path) -> Result<Vec<u8>> {
        let name = path2bytes(path)?;
        if name.is_empty() {
            return Err(ErrorKind::EmptyName.into());
        }
        let mut full = self.options.prefix.clone().unwrap_or_default();
        full.extend_from_slice(&name);
        Ok(full)
    }

    /// Formats the headers of an entry without writing anything.
    fn prepare(
        &self,
        path: &[u8],
        info: &ObjectInfo,
        ty: EntryType,
        size: u64,
        link: Option<&[u8]>,
    ) -> Result<Prepared> {
        let opts = &self.options;
        let gnu = opts.format == TarFormat::Gnu;
        let mut header = Header::new(opts.format);
        let mut records = Vec::new();

        if gnu && path.len() >= NAME_LEN {
            long_record(&mut records, EntryType::GNULongName, path)?;
            header.set_truncated_path(path);
        } else {
            header.set_path(path)?;
        }
        if let Some(link) = link {
            if gnu && link.len() >= NAME_LEN {
                long_record(&mut records, EntryType::GNULongLink, link)?;
                header.set_truncated_link_name(link);
            } else {
                header.set_link_name(link)?;
            }
        }

        let perms = info.permissions();
        let mode = if info.file_type() == Some(FileType::Directory) {
            (perms & opts.dir_and) | opts.dir_or
        } else {
            (perms & opts.file_and) | opts.file_or
        };
        header.set_mode(mode)?;
        header.set_uid(opts.uid.or(info.uid).unwrap_or(0))?;
        header.set_gid(opts.gid.or(info.gid).unwrap_or(0))?;
        header.set_size(size);
        header.set_mtime(opts.mtime.unwrap_or(info.mtime))?;
        header.set_entry_type(ty);

        let owner = opts
            .owner
            .as_deref()
            .or(info.owner.as_deref().filter(|n| !n.is_empty()))
            .unwrap_or(DEFAULT_OWNER);
        let group = opts
            .group
            .as_deref()
            .or(info.group.as_deref().filter(|n| !n.is_empty()))
            .unwrap_or(DEFAULT_GROUP);
        header.set_username(owner.as_bytes());
        header.set_groupname(group.as_bytes());

        if ty.is_device() {
            if opts.format == TarFormat::Ancient {
                return Err(ErrorKind::UnknownTypeFlag.into());
            }
            let (major, minor) = info.device.unwrap_or((0, 0));
            header.set_device(major, minor)?;
        }
        Ok(Prepared { records, header })
    }

    /// Writes the continuation records and main header of an entry and
    /// returns the offset of the main header.
    fn emit(&mut self, prepared: &mut Prepared) -> Result<u64> {
        self.write_out(&prepared.records)?;
        let offset = self.pos;
        prepared.header.set_cksum();
        self.write_out(prepared.header.as_bytes())?;
        Ok(offset)
    }

    fn write_simple(&mut self, mut prepared: Prepared) -> Result<()> {
        let res = self.emit(&mut prepared).map(|_| ());
        self.latch(res)
    }

    fn add_file(&mut self, path: &[u8], info: &ObjectInfo, file: &mut dyn ReadSeek) -> Result<()> {
        let size = info.size;
        if self.options.sparse
            && self.options.format == TarFormat::Gnu
            && size >= MIN_SPARSE_SIZE
        {
            let map = SparseMap::scan(file, size)?;
            if map.saves_space() {
                let prepared =
                    self.prepare(path, info, EntryType::GNUSparse, map.data_size(), None)?;
                let res = self.write_sparse_file(prepared, file, &map);
                return self.latch(res);
            }
            log::debug!("no holes worth a sparse encoding in {} bytes", size);
        } else {
            file.seek(SeekFrom::Start(0))?;
        }
        let prepared = self.prepare(path, info, EntryType::Regular, size, None)?;
        let res = self.write_regular_file(prepared, file, size);
        self.latch(res)
    }

    fn write_regular_file<R: Read + ?Sized>(
        &mut self,
        mut prepared: Prepared,
        data: &mut R,
        size: u64,
    ) -> Result<()> {
        self.emit(&mut prepared)?;
        let mut buf = vec![0; buffer_size(size)];
        self.copy_data(data, size, &mut buf)?;
        self.pad(size)
    }

    fn write_sparse_file(
        &mut self,
        mut prepared: Prepared,
        file: &mut dyn ReadSeek,
        map: &SparseMap,
    ) -> Result<()> {
        let spans = map.spans();
        let (first, rest) = spans.split_at(spans.len().min(SPARSE_IN_HEADER));
        prepared
            .header
            .set_sparse(first, map.file_size(), !rest.is_empty());
        self.emit(&mut prepared)?;

        let mut blocks = rest.chunks(SPARSE_IN_EXT_BLOCK).peekable();
        while let Some(chunk) = blocks.next() {
            let block = sparse_ext_block(chunk, blocks.peek().is_some());
            self.write_out(&block)?;
        }
        log::debug!(
            "stored {} of {} bytes as {} sparse spans",
            map.data_size(),
            map.file_size(),
            spans.len()
        );

        let mut buf = vec![0; buffer_size(map.file_size())];
        for span in spans.iter().filter(|s| s.length > 0) {
            file.seek(SeekFrom::Start(span.offset))?;
            self.copy_data(file, span.length, &mut buf)?;
        }
        self.pad(map.data_size())
    }

    fn write_stream_file(&mut self, mut prepared: Prepared, data: &mut dyn Read) -> Result<()> {
        let header_offset = self.emit(&mut prepared)?;
        let mut buf = vec![0; STREAM_BUFFER];
        let mut total = 0u64;
        loop {
            let n = match data.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.write_out(&buf[..n])?;
            total += n as u64;
        }
        self.pad(total)?;

        let end = self.pos;
        prepared.header.set_size(total);
        prepared.header.set_cksum();
        self.seek_sink(header_offset)?;
        self.write_out(prepared.header.as_bytes())?;
        self.seek_sink(end)?;
        log::debug!("patched streamed entry header to {} bytes", total);
        Ok(())
    }

    fn complete_push(&mut self) -> Result<()> {
        self.check()?;
        let push = match self.push.take() {
            Some(push) => push,
            None => return Ok(()),
        };
        let res = self.finish_push(push);
        self.latch(res)
    }

    fn finish_push(&mut self, mut push: PushState) -> Result<()> {
        if push.open_ended {
            push.header.set_size(push.written);
            push.header.set_cksum();
            self.seek_sink(push.header_offset)?;
            self.write_out(push.header.as_bytes())?;
            log::debug!("patched pushed entry header to {} bytes", push.written);
        } else if push.written != push.expected {
            return Err(ErrorKind::BufferUnderflow.into());
        }
        let end = push.data_offset + push.written;
        if self.pos != end {
            self.seek_sink(end)?;
        }
        self.pad(push.written)
    }

    fn push_state(&self) -> Result<&PushState> {
        self.push
            .as_ref()
            .ok_or_else(|| ErrorKind::InvalidState.into())
    }

    fn push_write(&mut self, buf: &[u8]) -> Result<usize> {
        self.check()?;
        let push = self.push_state()?;
        if buf.len() as u64 > push.expected - push.current {
            return Err(ErrorKind::DiskFull.into());
        }
        let res = self.write_out(buf);
        self.latch(res)?;
        if let Some(push) = self.push.as_mut() {
            push.current += buf.len() as u64;
            push.written = push.written.max(push.current);
        }
        Ok(buf.len())
    }

    fn push_seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.check()?;
        let push = self.push_state()?;
        let (current, written, data_offset) = (push.current, push.written, push.data_offset);
        let target = match pos {
            SeekFrom::Start(n) => n as i128,
            SeekFrom::Current(n) => current as i128 + n as i128,
            SeekFrom::End(n) => written as i128 + n as i128,
        };
        if target < 0 {
            return Err(ErrorKind::NegativeSeek.into());
        }
        if target > push.expected as i128 {
            return Err(ErrorKind::Seek.into());
        }
        let target = target as u64;

        if target == current {
            return Ok(current);
        }
        if (target < written || current != written) && self.seek.is_none() {
            return Err(ErrorKind::NotAFile.into());
        }
        let res = self.reposition_push(data_offset, current, written, target);
        self.latch(res)?;
        if let Some(push) = self.push.as_mut() {
            push.current = target;
            push.written = push.written.max(target);
        }
        Ok(target)
    }

    fn reposition_push(
        &mut self,
        data_offset: u64,
        current: u64,
        written: u64,
        target: u64,
    ) -> Result<()> {
        if target <= written {
            return self.seek_sink(data_offset + target);
        }
        if current != written {
            self.seek_sink(data_offset + written)?;
        }
        self.zero_fill(target - written)
    }

    fn flush_sink(&mut self) -> Result<()> {
        self.check()?;
        let res = self.sink().and_then(|obj| obj.flush().map_err(Error::from));
        self.latch(res)
    }

    fn write_terminator(&mut self) -> Result<()> {
        self.write_out(&[0; BLOCK_SIZE * 2])?;
        self.sink()?.flush()?;
        if let Some(set_len) = self.set_len {
            let pos = self.pos;
            set_len(self.sink()?, pos)?;
            log::debug!("archive cut off at {} bytes", pos);
        }
        Ok(())
    }

    fn sink(&mut self) -> Result<&mut W> {
        self.obj
            .as_mut()
            .ok_or_else(|| ErrorKind::InvalidState.into())
    }

    fn write_out(&mut self, buf: &[u8]) -> Result<()> {
        self.sink()?.write_all(buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn zero_fill(&mut self, mut len: u64) -> Result<()> {
        let zeros = [0u8; 4096];
        while len > 0 {
            let n = len.min(zeros.len() as u64) as usize;
            self.write_out(&zeros[..n])?;
            len -= n as u64;
        }
        Ok(())
    }

    /// Pads data of length `len` to a block boundary.
    fn pad(&mut self, len: u64) -> Result<()> {
        self.zero_fill(block_align(len) - len)
    }

    fn seek_sink(&mut self, pos: u64) -> Result<()> {
        let seek = self.seek.ok_or(ErrorKind::NotAFile)?;
        seek(self.sink()?, pos)?;
        self.pos = pos;
        Ok(())
    }

    fn copy_data<R: Read + ?Sized>(
        &mut self,
        data: &mut R,
        size: u64,
        buf: &mut [u8],
    ) -> Result<()> {
        let mut left = size;
        while left > 0 {
            let want = left.min(buf.len() as u64) as usize;
            data.read_exact(&mut buf[..want])?;
            self.write_out(&buf[..want])?;
            left -= want as u64;
        }
        Ok(())
    }
}

impl<W: Write + Seek> TarWriter<W> {
    /// Creates a writer over a seekable sink, starting at its current
    /// position. Such writers can store entries of unknown length.
    pub fn new_seekable(mut obj: W) -> Result<TarWriter<W>> {
        let pos = obj.stream_position()?;
        let mut writer = TarWriter::new(obj);
        writer.pos = pos;
        writer.seek = Some(seek_to::<W>);
        Ok(writer)
    }
}

impl<W: Write> Drop for TarWriter<W> {
    fn drop(&mut self) {
        // An update that never wrote anything leaves the archive untouched.
        if self.reader.is_none() {
            let _ = self.finish();
        }
    }
}

fn require_file(file_type: FileType) -> Result<()> {
    match file_type {
        FileType::File => Ok(()),
        _ => Err(ErrorKind::InvalidState.into()),
    }
}

/// Appends a `././@LongLink` record carrying `data` to `out`.
fn long_record(out: &mut Vec<u8>, ty: EntryType, data: &[u8]) -> Result<()> {
    if data.contains(&0) {
        return Err(ErrorKind::NulInName.into());
    }
    let mut header = Header::new_gnu();
    header.set_truncated_path(LONG_LINK_NAME);
    header.set_mode(0o644)?;
    header.set_uid(0)?;
    header.set_gid(0)?;
    header.set_mtime(0)?;
    header.set_size(data.len() as u64 + 1);
    header.set_entry_type(ty);
    header.set_cksum();

    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(data);
    out.push(0);
    out.resize(block_align(out.len() as u64) as usize, 0);
    Ok(())
}

impl<'a, W: Write> PushEntry<'a, W> {
    /// Completes the entry: patches the header of an open-ended entry, or
    /// checks that all announced bytes arrived, and pads the data.
    pub fn finish(self) -> Result<()> {
        self.writer.complete_push()
    }

    /// Number of data bytes stored so far, gaps included.
    pub fn written(&self) -> u64 {
        self.writer.push.as_ref().map_or(0, |push| push.written)
    }
}

impl<'a, W: Write> Write for PushEntry<'a, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.push_write(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush_sink().map_err(io::Error::from)
    }
}

/// Seeking forward past the data written so far fills the gap with zeros;
/// seeking back needs a seekable sink.
impl<'a, W: Write> Seek for PushEntry<'a, W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.writer.push_seek(pos).map_err(io::Error::from)
    }
}
