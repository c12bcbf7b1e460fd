// See https://en.wikipedia.org/wiki/Tar_%28computing%29#UStar_format

/// The header layout family of an archive, detected from the magic and
/// version fields of its first header.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TarFormat {
    /// POSIX ustar, magic `"ustar\0"` and version `"00"`.
    Posix,
    /// GNU tar, magic `"ustar "` and version `" \0"`.
    Gnu,
    /// Pre-POSIX v7 tar without any magic.
    Ancient,
}

/// Indicate for the type of file described by a header.
///
/// Each `Header` has an `entry_type` method returning an instance of this type
/// which can be used to inspect what the header is describing.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EntryType {
    /// Regular file written by pre-POSIX archivers (type flag NUL)
    OldRegular,
    /// Regular file
    Regular,
    /// Hard link
    Link,
    /// Symbolic link
    Symlink,
    /// Character device
    Char,
    /// Block device
    Block,
    /// Directory
    Directory,
    /// Named pipe (fifo)
    Fifo,
    /// Implementation-defined 'high-performance' type, treated as regular file
    Continuous,
    /// GNU extension - long file name
    GNULongName,
    /// GNU extension - long link name (link target)
    GNULongLink,
    /// GNU extension - sparse file
    GNUSparse,
    /// GNU extension - incremental dump directory
    GNUDumpDir,
    /// GNU extension - multi-volume continuation
    GNUMultiVol,
    /// GNU extension - volume header
    GNUVolHdr,
    /// Global extended header
    XGlobalHeader,
    /// Extended Header
    XHeader,
    /// Solaris extended header
    SolarisXHeader,
    /// Any other type flag, kept as its raw byte.
    Other(u8),
}

impl EntryType {
    /// Creates a new entry type from a raw byte.
    pub fn new(byte: u8) -> EntryType {
        match byte {
            b'\x00' => EntryType::OldRegular,
            b'0' => EntryType::Regular,
            b'1' => EntryType::Link,
            b'2' => EntryType::Symlink,
            b'3' => EntryType::Char,
            b'4' => EntryType::Block,
            b'5' => EntryType::Directory,
            b'6' => EntryType::Fifo,
            b'7' => EntryType::Continuous,
            b'L' => EntryType::GNULongName,
            b'K' => EntryType::GNULongLink,
            b'S' => EntryType::GNUSparse,
            b'D' => EntryType::GNUDumpDir,
            b'M' => EntryType::GNUMultiVol,
            b'V' => EntryType::GNUVolHdr,
            b'g' => EntryType::XGlobalHeader,
            b'x' => EntryType::XHeader,
            b'X' => EntryType::SolarisXHeader,
            b => EntryType::Other(b),
        }
    }

    /// Returns the raw underlying byte that this entry type represents.
    pub fn as_byte(&self) -> u8 {
        match *self {
            EntryType::OldRegular => b'\x00',
            EntryType::Regular => b'0',
            EntryType::Link => b'1',
            EntryType::Symlink => b'2',
            EntryType::Char => b'3',
            EntryType::Block => b'4',
            EntryType::Directory => b'5',
            EntryType::Fifo => b'6',
            EntryType::Continuous => b'7',
            EntryType::GNULongName => b'L',
            EntryType::GNULongLink => b'K',
            EntryType::GNUSparse => b'S',
            EntryType::GNUDumpDir => b'D',
            EntryType::GNUMultiVol => b'M',
            EntryType::GNUVolHdr => b'V',
            EntryType::XGlobalHeader => b'g',
            EntryType::XHeader => b'x',
            EntryType::SolarisXHeader => b'X',
            EntryType::Other(b) => b,
        }
    }

    /// Returns whether this type represents a regular file.
    pub fn is_file(&self) -> bool {
        matches!(
            *self,
            EntryType::OldRegular | EntryType::Regular | EntryType::Continuous
        )
    }

    /// Returns whether this type represents a hard link.
    pub fn is_hard_link(&self) -> bool {
        *self == EntryType::Link
    }

    /// Returns whether this type represents a symlink.
    pub fn is_symlink(&self) -> bool {
        *self == EntryType::Symlink
    }

    /// Returns whether this type represents a character or block device.
    pub fn is_device(&self) -> bool {
        matches!(*self, EntryType::Char | EntryType::Block)
    }

    /// Returns whether this type describes one of the object kinds every
    /// tar dialect understands.
    pub fn is_basic(&self) -> bool {
        self.is_file()
            || matches!(
                *self,
                EntryType::Link
                    | EntryType::Symlink
                    | EntryType::Char
                    | EntryType::Block
                    | EntryType::Directory
                    | EntryType::Fifo
            )
    }

    /// Returns whether this type is one of the GNU continuation or
    /// structural record kinds.
    pub fn is_gnu(&self) -> bool {
        matches!(
            *self,
            EntryType::GNULongName
                | EntryType::GNULongLink
                | EntryType::GNUSparse
                | EntryType::GNUDumpDir
                | EntryType::GNUMultiVol
                | EntryType::GNUVolHdr
        )
    }

    /// Returns whether this type is a pax extended header.
    pub fn is_pax(&self) -> bool {
        matches!(*self, EntryType::XHeader | EntryType::XGlobalHeader)
    }
}

/// The kind of filesystem object an entry stands for.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FileType {
    File,
    Directory,
    Symlink,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
}

/// Mask of the file type bits in a unix mode.
pub const S_IFMT: u32 = 0o170000;
const S_IFSOCK: u32 = 0o140000;
const S_IFLNK: u32 = 0o120000;
const S_IFREG: u32 = 0o100000;
const S_IFBLK: u32 = 0o060000;
const S_IFDIR: u32 = 0o040000;
const S_IFCHR: u32 = 0o020000;
const S_IFIFO: u32 = 0o010000;

impl FileType {
    /// Decodes the type bits of a unix mode, `None` when they are absent or
    /// unknown.
    pub fn from_mode(mode: u32) -> Option<FileType> {
        match mode & S_IFMT {
            S_IFREG => Some(FileType::File),
            S_IFDIR => Some(FileType::Directory),
            S_IFLNK => Some(FileType::Symlink),
            S_IFCHR => Some(FileType::CharDevice),
            S_IFBLK => Some(FileType::BlockDevice),
            S_IFIFO => Some(FileType::Fifo),
            S_IFSOCK => Some(FileType::Socket),
            _ => None,
        }
    }

    /// Returns the unix mode type bits for this kind of object.
    pub fn mode_bits(&self) -> u32 {
        match *self {
            FileType::File => S_IFREG,
            FileType::Directory => S_IFDIR,
            FileType::Symlink => S_IFLNK,
            FileType::CharDevice => S_IFCHR,
            FileType::BlockDevice => S_IFBLK,
            FileType::Fifo => S_IFIFO,
            FileType::Socket => S_IFSOCK,
        }
    }

    /// The header type flag used to archive this kind of object.
    ///
    /// Sockets cannot be represented and are stored as fifos.
    pub fn entry_type(&self) -> EntryType {
        match *self {
            FileType::File => EntryType::Regular,
            FileType::Directory => EntryType::Directory,
            FileType::Symlink => EntryType::Symlink,
            FileType::CharDevice => EntryType::Char,
            FileType::BlockDevice => EntryType::Block,
            FileType::Fifo | FileType::Socket => EntryType::Fifo,
        }
    }
}
