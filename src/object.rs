#[cfg(unix)]
use std::os::unix::prelude::*;

use std::fs;

use filetime::FileTime;

use crate::FileType;

/// Metadata of a filesystem object, as stored in or taken from an archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Logical size in bytes; zero for anything but regular files.
    pub size: u64,
    /// Unix mode, including the file type bits.
    pub mode: u32,
    pub uid: Option<u64>,
    pub gid: Option<u64>,
    pub owner: Option<String>,
    pub group: Option<String>,
    /// Seconds since the Unix epoch.
    pub mtime: i64,
    pub atime: i64,
    pub ctime: i64,
    pub birth_time: i64,
    /// Major and minor number of character and block devices.
    pub device: Option<(u32, u32)>,
    /// Hard link count.
    pub links: u32,
}

impl ObjectInfo {
    /// Creates the metadata of an object of the given type owned by nobody
    /// in particular, with all times at the epoch.
    pub fn new(file_type: FileType, permissions: u32) -> ObjectInfo {
        ObjectInfo {
            size: 0,
            mode: file_type.mode_bits() | (permissions & 0o7777),
            uid: None,
            gid: None,
            owner: None,
            group: None,
            mtime: 0,
            atime: 0,
            ctime: 0,
            birth_time: 0,
            device: None,
            links: 1,
        }
    }

    /// The object type encoded in the mode, if any.
    pub fn file_type(&self) -> Option<FileType> {
        FileType::from_mode(self.mode)
    }

    /// Permission bits, including setuid, setgid and sticky.
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }

    /// Sets every timestamp to `time`.
    pub fn set_times(&mut self, time: i64) {
        self.mtime = time;
        self.atime = time;
        self.ctime = time;
        self.birth_time = time;
    }

    /// Collects the metadata of an on-disk object.
    ///
    /// The size of anything but a regular file is reported as zero.
    pub fn from_metadata(meta: &fs::Metadata) -> ObjectInfo {
        let file_type = file_type_of(meta);
        let mut info = ObjectInfo::new(file_type, default_permissions(meta));
        if file_type == FileType::File {
            info.size = meta.len();
        }
        let mtime = FileTime::from_last_modification_time(meta).unix_seconds();
        info.set_times(mtime);
        info.atime = FileTime::from_last_access_time(meta).unix_seconds();
        if let Some(birth) = FileTime::from_creation_time(meta) {
            info.birth_time = birth.unix_seconds();
        }
        fill_from(&mut info, meta, file_type);
        info
    }
}

#[cfg(unix)]
fn file_type_of(meta: &fs::Metadata) -> FileType {
    match meta.mode() & libc::S_IFMT as u32 {
        m if m == libc::S_IFLNK as u32 => FileType::Symlink,
        m if m == libc::S_IFDIR as u32 => FileType::Directory,
        m if m == libc::S_IFCHR as u32 => FileType::CharDevice,
        m if m == libc::S_IFBLK as u32 => FileType::BlockDevice,
        m if m == libc::S_IFIFO as u32 => FileType::Fifo,
        m if m == libc::S_IFSOCK as u32 => FileType::Socket,
        _ => FileType::File,
    }
}

#[cfg(not(unix))]
fn file_type_of(meta: &fs::Metadata) -> FileType {
    let ft = meta.file_type();
    if ft.is_dir() {
        FileType::Directory
    } else if ft.is_symlink() {
        FileType::Symlink
    } else {
        FileType::File
    }
}

#[cfg(unix)]
fn default_permissions(meta: &fs::Metadata) -> u32 {
    meta.mode() & 0o7777
}

#[cfg(not(unix))]
fn default_permissions(meta: &fs::Metadata) -> u32 {
    // There's no concept of a mode here, so do a best approximation.
    match (meta.is_dir(), meta.permissions().readonly()) {
        (true, false) => 0o755,
        (true, true) => 0o555,
        (false, false) => 0o644,
        (false, true) => 0o444,
    }
}

#[cfg(unix)]
fn fill_from(info: &mut ObjectInfo, meta: &fs::Metadata, file_type: FileType) {
    info.uid = Some(meta.uid() as u64);
    info.gid = Some(meta.gid() as u64);
    info.ctime = meta.ctime();
    info.links = u32::try_from(meta.nlink()).unwrap_or(u32::MAX);
    if matches!(file_type, FileType::CharDevice | FileType::BlockDevice) {
        let dev_id = meta.rdev();
        let major = ((dev_id >> 32) & 0xffff_f000) | ((dev_id >> 8) & 0x0000_0fff);
        let minor = ((dev_id >> 12) & 0xffff_ff00) | (dev_id & 0x0000_00ff);
        info.device = Some((major as u32, minor as u32));
    }
}

#[cfg(not(unix))]
fn fill_from(_info: &mut ObjectInfo, _meta: &fs::Metadata, _file_type: FileType) {}
