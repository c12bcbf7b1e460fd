use std::borrow::Cow;
use std::fmt;
use std::ops::Range;
use std::str;

use crate::error::{ErrorKind, Result};
use crate::sparse::SparseSpan;
use crate::{truncate, EntryType, TarFormat, BLOCK_SIZE};

// Byte ranges shared by every layout.
const NAME: Range<usize> = 0..100;
const MODE: Range<usize> = 100..108;
const UID: Range<usize> = 108..116;
const GID: Range<usize> = 116..124;
const SIZE: Range<usize> = 124..136;
const MTIME: Range<usize> = 136..148;
const CKSUM: Range<usize> = 148..156;
const TYPEFLAG: usize = 156;
const LINKNAME: Range<usize> = 157..257;
const MAGIC: Range<usize> = 257..263;
const VERSION: Range<usize> = 263..265;
const UNAME: Range<usize> = 265..297;
const GNAME: Range<usize> = 297..329;
const DEVMAJOR: Range<usize> = 329..337;
const DEVMINOR: Range<usize> = 337..345;

// ustar only
const PREFIX: Range<usize> = 345..500;

// GNU only
const ATIME: Range<usize> = 345..357;
const CTIME: Range<usize> = 357..369;
const SPARSE: Range<usize> = 386..482;
const ISEXTENDED: usize = 482;
const REALSIZE: Range<usize> = 483..495;

// GNU sparse extension block
const SPARSE_EXT: Range<usize> = 0..504;
const ISEXTENDED_EXT: usize = 504;

/// Size in bytes of one `(offset, numbytes)` pair of a GNU sparse map.
const SPARSE_SLOT: usize = 24;
/// Number of sparse pairs stored in a GNU main header.
pub const SPARSE_IN_HEADER: usize = 4;
/// Number of sparse pairs stored in one GNU sparse extension block.
pub const SPARSE_IN_EXT_BLOCK: usize = 21;

const POSIX_MAGIC: &[u8; 6] = b"ustar\0";
const POSIX_VERSION: &[u8; 2] = b"00";
const GNU_MAGIC: &[u8; 6] = b"ustar ";
const GNU_VERSION: &[u8; 2] = b" \0";

/// Representation of the header of an entry in an archive.
///
/// A header is one raw 512-byte block. The Ancient, ustar and GNU layouts
/// overlap, so accessors for layout specific fields consult the magic first.
#[derive(Clone)]
pub struct Header {
    bytes: [u8; BLOCK_SIZE],
}

/// The sums used to verify a header block.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Checksum {
    /// Sum of all bytes taken as unsigned chars.
    pub unsigned: i64,
    /// Sum of all bytes taken as signed chars.
    pub signed: i64,
    /// Whether every byte of the block, checksum field included, is zero.
    pub all_zero: bool,
}

/// Computes both checksum flavours of `block`, counting the checksum field
/// itself as eight ASCII spaces.
pub fn compute_checksum(block: &[u8; BLOCK_SIZE]) -> Checksum {
    let mut unsigned = 0i64;
    let mut signed = 0i64;
    let mut all_zero = true;
    for &b in block.iter() {
        unsigned += b as i64;
        signed += b as i8 as i64;
        all_zero &= b == 0;
    }
    for &b in &block[CKSUM] {
        unsigned -= b as i64;
        signed -= b as i8 as i64;
    }
    let spaces = (b' ' as i64) * CKSUM.len() as i64;
    Checksum {
        unsigned: unsigned + spaces,
        signed: signed + spaces,
        all_zero,
    }
}

/// Verifies a header block and detects the layout family it uses.
///
/// An all-zero block fails with `ZeroHeader`; callers treat that as the end
/// of archive marker rather than as corruption.
pub fn validate_header(block: &[u8; BLOCK_SIZE]) -> Result<TarFormat> {
    let sums = compute_checksum(block);
    if sums.all_zero {
        return Err(ErrorKind::ZeroHeader.into());
    }

    let stored = decode_numeric_field(&block[CKSUM], true)
        .map_err(|_| ErrorKind::BadChecksumField)?;
    if stored != sums.unsigned && stored != sums.signed {
        return Err(ErrorKind::ChecksumMismatch.into());
    }

    let magic = &block[MAGIC];
    let version = &block[VERSION];
    let format = if magic == POSIX_MAGIC && version == POSIX_VERSION {
        TarFormat::Posix
    } else if magic == GNU_MAGIC && version == GNU_VERSION {
        TarFormat::Gnu
    } else if magic == POSIX_MAGIC && version == GNU_VERSION {
        // Some producers pair the POSIX magic with the GNU version bytes.
        log::warn!("accepting ustar header with a GNU version field as POSIX");
        TarFormat::Posix
    } else if magic.starts_with(b"ustar") {
        return Err(ErrorKind::NotUstarV00.into());
    } else {
        TarFormat::Ancient
    };

    let flag = block[TYPEFLAG];
    let allowed = match format {
        TarFormat::Posix => flag == 0 || flag.is_ascii_alphanumeric(),
        TarFormat::Gnu => {
            let ty = EntryType::new(flag);
            ty.is_basic() || ty.is_gnu()
        }
        TarFormat::Ancient => EntryType::new(flag).is_basic(),
    };
    if !allowed {
        return Err(ErrorKind::UnknownTypeFlag.into());
    }
    Ok(format)
}

/// Decodes a numeric header field.
///
/// Fields hold space or zero padded octal text ended by a space or NUL, or,
/// when the top bit of the first byte is set and `octal_only` is false, a
/// big-endian two's complement number in the remaining 6 + 8n bits.
pub fn decode_numeric_field(field: &[u8], octal_only: bool) -> Result<i64> {
    let first = match field.first() {
        Some(b) => *b,
        None => return Ok(0),
    };

    if octal_only || first & 0x80 == 0 {
        let mut rest = field;
        while let [b' ' | b'0', tail @ ..] = rest {
            rest = tail;
        }
        let mut value = 0i64;
        while let [digit @ b'0'..=b'7', tail @ ..] = rest {
            value = value
                .checked_mul(8)
                .map(|v| v | (*digit - b'0') as i64)
                .ok_or(ErrorKind::NumValueTooLarge)?;
            rest = tail;
        }
        if rest.iter().any(|b| *b != 0 && *b != b' ') {
            return Err(if rest.len() < field.len() {
                ErrorKind::BadNumFieldTerm
            } else {
                ErrorKind::BadNumField
            }
            .into());
        }
        return Ok(value);
    }

    let negative = first & 0x40 != 0;
    let mut value = if negative {
        (-1i64 << 6) | (first & 0x3f) as i64
    } else {
        (first & 0x3f) as i64
    };
    for &b in &field[1..] {
        let fits = if negative {
            value >= i64::MIN / 256
        } else {
            value <= i64::MAX / 256
        };
        if !fits {
            return Err(ErrorKind::NumValueTooLarge.into());
        }
        value = (value << 8) | b as i64;
    }
    Ok(value)
}

/// Formats a size or offset into a 12 byte field: octal below 8 GiB,
/// base-256 with a leading `0x80` byte above.
pub fn format_offset(out: &mut [u8; 12], value: u64) {
    write_offset(out, value)
}

fn write_offset(field: &mut [u8], value: u64) {
    if value < 2 * (1 << 32) {
        write_octal(field, value);
    } else {
        let (marker, rest) = field.split_at_mut(field.len() - 8);
        marker.fill(0);
        marker[0] = 0x80;
        rest.copy_from_slice(&value.to_be_bytes());
    }
}

/// Formats `value` as zero padded octal followed by a NUL, failing when it
/// needs more digits than the field has room for.
pub fn format_octal(field: &mut [u8], value: u64) -> Result<()> {
    let digits = field.len().saturating_sub(1);
    if digits == 0 || (digits < 22 && value >> (3 * digits) != 0) {
        return Err(ErrorKind::NumValueTooLarge.into());
    }
    write_octal(field, value);
    Ok(())
}

fn write_octal(field: &mut [u8], mut value: u64) {
    let last = field.len() - 1;
    field[last] = 0;
    for slot in field[..last].iter_mut().rev() {
        *slot = b'0' + (value & 7) as u8;
        value >>= 3;
    }
}

/// Formats a signed number, falling back to base-256 when octal cannot hold
/// it and `base256` is allowed.
pub fn format_numeric(field: &mut [u8], value: i64, base256: bool) -> Result<()> {
    if value >= 0 && format_octal(field, value as u64).is_ok() {
        return Ok(());
    }
    if !base256 {
        return Err(ErrorKind::NumValueTooLarge.into());
    }
    let len = field.len();
    if len <= 8 {
        let limit = 1i64 << (8 * len - 2);
        if value >= limit || value < -limit {
            return Err(ErrorKind::NumValueTooLarge.into());
        }
    }
    let bytes = value.to_be_bytes();
    let sign = if value < 0 { 0xff } else { 0 };
    for (i, slot) in field.iter_mut().rev().enumerate() {
        *slot = if i < bytes.len() {
            bytes[bytes.len() - 1 - i]
        } else {
            sign
        };
    }
    field[0] |= 0x80;
    Ok(())
}

/// Decodes the `(offset, numbytes)` pairs of a GNU sparse map area, stopping
/// at the first unused slot.
pub(crate) fn decode_sparse_area(area: &[u8], spans: &mut Vec<SparseSpan>) -> Result<()> {
    for slot in area.chunks_exact(SPARSE_SLOT) {
        if slot[0] == 0 {
            break;
        }
        let offset = decode_numeric_field(&slot[..12], false)?;
        let length = decode_numeric_field(&slot[12..], false)?;
        if offset < 0 || length < 0 {
            return Err(ErrorKind::MalformedGnuSparse.into());
        }
        spans.push(SparseSpan {
            offset: offset as u64,
            length: length as u64,
        });
    }
    Ok(())
}

fn encode_sparse_area(area: &mut [u8], spans: &[SparseSpan]) {
    for (slot, span) in area.chunks_exact_mut(SPARSE_SLOT).zip(spans) {
        let (offset, length) = slot.split_at_mut(12);
        write_offset(offset, span.offset);
        write_offset(length, span.length);
    }
}

/// Builds a GNU sparse extension block holding up to 21 spans.
pub(crate) fn sparse_ext_block(spans: &[SparseSpan], extended: bool) -> [u8; BLOCK_SIZE] {
    let mut block = [0; BLOCK_SIZE];
    encode_sparse_area(&mut block[SPARSE_EXT], spans);
    block[ISEXTENDED_EXT] = extended as u8;
    block
}

/// Reads the spans of a GNU sparse extension block and its continuation
/// flag.
pub(crate) fn read_sparse_ext_block(
    block: &[u8; BLOCK_SIZE],
    spans: &mut Vec<SparseSpan>,
) -> Result<bool> {
    decode_sparse_area(&block[SPARSE_EXT], spans)?;
    Ok(block[ISEXTENDED_EXT] != 0)
}

impl Header {
    /// Creates a new blank header for the given layout family.
    ///
    /// Ustar and GNU headers get their magic and version filled in, ancient
    /// headers have none.
    pub fn new(format: TarFormat) -> Header {
        let mut header = Header {
            bytes: [0; BLOCK_SIZE],
        };
        match format {
            TarFormat::Posix => {
                header.bytes[MAGIC].copy_from_slice(POSIX_MAGIC);
                header.bytes[VERSION].copy_from_slice(POSIX_VERSION);
            }
            TarFormat::Gnu => {
                header.bytes[MAGIC].copy_from_slice(GNU_MAGIC);
                header.bytes[VERSION].copy_from_slice(GNU_VERSION);
            }
            TarFormat::Ancient => {}
        }
        header
    }

    /// Creates a blank GNU header.
    pub fn new_gnu() -> Header {
        Header::new(TarFormat::Gnu)
    }

    /// Creates a blank POSIX ustar header.
    pub fn new_ustar() -> Header {
        Header::new(TarFormat::Posix)
    }

    /// Wraps a raw block without validating it.
    pub fn from_bytes(bytes: &[u8; BLOCK_SIZE]) -> Header {
        Header { bytes: *bytes }
    }

    /// Returns a view into this header as a byte array.
    pub fn as_bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.bytes
    }

    /// Returns a mutable view into this header as a byte array.
    pub fn as_mut_bytes(&mut self) -> &mut [u8; BLOCK_SIZE] {
        &mut self.bytes
    }

    fn is_ustar(&self) -> bool {
        &self.bytes[MAGIC] == POSIX_MAGIC
    }

    /// Whether this header carries the GNU magic.
    pub fn is_gnu(&self) -> bool {
        &self.bytes[MAGIC] == GNU_MAGIC && &self.bytes[VERSION] == GNU_VERSION
    }

    fn has_magic(&self) -> bool {
        self.bytes[MAGIC].starts_with(b"ustar")
    }

    /// Returns the type of file described by this header.
    pub fn entry_type(&self) -> EntryType {
        EntryType::new(self.bytes[TYPEFLAG])
    }

    /// Sets the type of file that will be described by this header.
    pub fn set_entry_type(&mut self, ty: EntryType) {
        self.bytes[TYPEFLAG] = ty.as_byte();
    }

    /// Returns the name field, up to its first NUL.
    pub fn name_bytes(&self) -> &[u8] {
        truncate(&self.bytes[NAME])
    }

    /// Returns the pathname stored in this header, joining the ustar prefix
    /// and name fields when a prefix is present.
    pub fn path_bytes(&self) -> Cow<'_, [u8]> {
        let name = self.name_bytes();
        if !self.is_ustar() {
            return Cow::Borrowed(name);
        }
        let prefix = truncate(&self.bytes[PREFIX]);
        if prefix.is_empty() {
            return Cow::Borrowed(name);
        }
        let mut bytes = Vec::with_capacity(prefix.len() + 1 + name.len());
        bytes.extend_from_slice(prefix);
        bytes.push(b'/');
        bytes.extend_from_slice(name);
        Cow::Owned(bytes)
    }

    /// Stores `path`, splitting it over the ustar prefix and name fields if
    /// it does not fit in the name field alone.
    pub fn set_path(&mut self, path: &[u8]) -> Result<()> {
        if path.is_empty() {
            return Err(ErrorKind::EmptyName.into());
        }
        if path.len() <= NAME.len() {
            return copy_into(&mut self.bytes[NAME], path);
        }
        if !self.is_ustar() {
            return Err(ErrorKind::NameTooLong.into());
        }
        // The split must leave a name part and fit the prefix field.
        let search = &path[..path.len().min(PREFIX.len() + 1)];
        let pos = search
            .iter()
            .rposition(|&b| b == b'/')
            .filter(|&pos| pos > 0 && path.len() - pos - 1 <= NAME.len() && pos < path.len() - 1)
            .ok_or(ErrorKind::NameTooLong)?;
        copy_into(&mut self.bytes[NAME], &path[pos + 1..])?;
        copy_into(&mut self.bytes[PREFIX], &path[..pos])
    }

    /// Stores as much of `path` as the name field can hold with a trailing
    /// NUL. Used for the main header behind a GNU long name record.
    pub fn set_truncated_path(&mut self, path: &[u8]) {
        copy_truncated(&mut self.bytes[NAME], path);
    }

    /// Returns the link name field, `None` if it is empty.
    pub fn link_name_bytes(&self) -> Option<&[u8]> {
        let link = truncate(&self.bytes[LINKNAME]);
        (!link.is_empty()).then_some(link)
    }

    /// Stores the target of a link.
    pub fn set_link_name(&mut self, target: &[u8]) -> Result<()> {
        copy_into(&mut self.bytes[LINKNAME], target)
    }

    pub fn set_truncated_link_name(&mut self, target: &[u8]) {
        copy_truncated(&mut self.bytes[LINKNAME], target);
    }

    /// Returns the raw mode field value.
    pub fn mode(&self) -> Result<u32> {
        let mode = decode_numeric_field(&self.bytes[MODE], false)?;
        u32::try_from(mode).map_err(|_| ErrorKind::BadModeField.into())
    }

    pub fn set_mode(&mut self, mode: u32) -> Result<()> {
        format_octal(&mut self.bytes[MODE], mode as u64)
    }

    pub fn uid(&self) -> Result<i64> {
        decode_numeric_field(&self.bytes[UID], false)
    }

    /// Encodes the owner id, in base-256 if a GNU header needs it.
    pub fn set_uid(&mut self, uid: u64) -> Result<()> {
        let gnu = self.is_gnu();
        let uid = i64::try_from(uid).map_err(|_| ErrorKind::NumValueTooLarge)?;
        format_numeric(&mut self.bytes[UID], uid, gnu)
    }

    pub fn gid(&self) -> Result<i64> {
        decode_numeric_field(&self.bytes[GID], false)
    }

    pub fn set_gid(&mut self, gid: u64) -> Result<()> {
        let gnu = self.is_gnu();
        let gid = i64::try_from(gid).map_err(|_| ErrorKind::NumValueTooLarge)?;
        format_numeric(&mut self.bytes[GID], gid, gnu)
    }

    /// Returns the size field, which for GNU sparse entries is the number of
    /// bytes physically stored.
    pub fn size(&self) -> Result<u64> {
        let size = decode_numeric_field(&self.bytes[SIZE], false)?;
        u64::try_from(size).map_err(|_| ErrorKind::NumValueTooLarge.into())
    }

    /// Encodes the size field.
    pub fn set_size(&mut self, size: u64) {
        write_offset(&mut self.bytes[SIZE], size);
    }

    /// Returns the last modification time in Unix time format.
    pub fn mtime(&self) -> Result<i64> {
        decode_numeric_field(&self.bytes[MTIME], false)
    }

    /// Encodes the modification time; negative times need a GNU header.
    pub fn set_mtime(&mut self, mtime: i64) -> Result<()> {
        let gnu = self.is_gnu();
        format_numeric(&mut self.bytes[MTIME], mtime, gnu)
    }

    /// Returns the GNU access and change times, when stored.
    pub fn gnu_times(&self) -> Result<Option<(i64, i64)>> {
        if !self.is_gnu() || (self.bytes[ATIME][0] == 0 && self.bytes[CTIME][0] == 0) {
            return Ok(None);
        }
        let atime = decode_numeric_field(&self.bytes[ATIME], false)?;
        let ctime = decode_numeric_field(&self.bytes[CTIME], false)?;
        Ok(Some((atime, ctime)))
    }

    /// Returns the owner name, if present and if valid utf8.
    pub fn username(&self) -> Option<&str> {
        self.username_bytes().and_then(|s| str::from_utf8(s).ok())
    }

    /// Returns the owner name, if this header has a field for it.
    pub fn username_bytes(&self) -> Option<&[u8]> {
        self.has_magic().then(|| truncate(&self.bytes[UNAME]))
    }

    /// Sets the owner name, silently cutting it to the field width.
    pub fn set_username(&mut self, name: &[u8]) {
        if self.has_magic() {
            copy_truncated(&mut self.bytes[UNAME], name);
        }
    }

    /// Returns the group name, if present and if valid utf8.
    pub fn groupname(&self) -> Option<&str> {
        self.groupname_bytes().and_then(|s| str::from_utf8(s).ok())
    }

    /// Returns the group name, if this header has a field for it.
    pub fn groupname_bytes(&self) -> Option<&[u8]> {
        self.has_magic().then(|| truncate(&self.bytes[GNAME]))
    }

    /// Sets the group name, silently cutting it to the field width.
    pub fn set_groupname(&mut self, name: &[u8]) {
        if self.has_magic() {
            copy_truncated(&mut self.bytes[GNAME], name);
        }
    }

    /// Returns the device major and minor numbers.
    ///
    /// `None` means the header has no device fields at all.
    pub fn device(&self) -> Option<Result<(u32, u32)>> {
        if !self.has_magic() {
            return None;
        }
        let decode = |range: Range<usize>| -> Result<u32> {
            let value = decode_numeric_field(&self.bytes[range], false)?;
            u32::try_from(value).map_err(|_| ErrorKind::DevValueTooLarge.into())
        };
        Some(decode(DEVMAJOR).and_then(|major| Ok((major, decode(DEVMINOR)?))))
    }

    /// Encodes the device numbers of a character or block device.
    pub fn set_device(&mut self, major: u32, minor: u32) -> Result<()> {
        let gnu = self.is_gnu();
        format_numeric(&mut self.bytes[DEVMAJOR], major as i64, gnu)
            .map_err(|_| ErrorKind::DevValueTooLarge)?;
        format_numeric(&mut self.bytes[DEVMINOR], minor as i64, gnu)
            .map_err(|_| ErrorKind::DevValueTooLarge)?;
        Ok(())
    }

    /// Returns the checksum field of this header.
    pub fn cksum(&self) -> Result<i64> {
        decode_numeric_field(&self.bytes[CKSUM], true)
    }

    /// Sets the checksum field of this header based on the current fields in
    /// this header: six octal digits, a NUL and a space.
    pub fn set_cksum(&mut self) {
        let sum = compute_checksum(&self.bytes).unsigned as u64;
        let field = &mut self.bytes[CKSUM];
        write_octal(&mut field[..7], sum);
        field[7] = b' ';
    }

    /// Returns the logical size of a GNU sparse file.
    pub fn real_size(&self) -> Result<u64> {
        let size = decode_numeric_field(&self.bytes[REALSIZE], false)?;
        u64::try_from(size).map_err(|_| ErrorKind::MalformedGnuSparse.into())
    }

    /// Reads the spans stored in a GNU sparse main header and whether
    /// extension blocks follow.
    pub(crate) fn sparse_spans(&self, spans: &mut Vec<SparseSpan>) -> Result<bool> {
        decode_sparse_area(&self.bytes[SPARSE], spans)?;
        Ok(self.bytes[ISEXTENDED] != 0)
    }

    /// Stores the first spans of a GNU sparse map along with the logical
    /// file size and the continuation flag.
    pub(crate) fn set_sparse(&mut self, spans: &[SparseSpan], real_size: u64, extended: bool) {
        encode_sparse_area(&mut self.bytes[SPARSE], spans);
        write_offset(&mut self.bytes[REALSIZE], real_size);
        self.bytes[ISEXTENDED] = extended as u8;
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("Header");
        f.field("path", &String::from_utf8_lossy(&self.path_bytes()))
            .field("entry_type", &self.entry_type())
            .field("mode", &self.mode().ok())
            .field("uid", &self.uid().ok())
            .field("gid", &self.gid().ok())
            .field("size", &self.size().ok())
            .field("mtime", &self.mtime().ok())
            .field("cksum", &self.cksum().ok());
        if let Some(link) = self.link_name_bytes() {
            f.field("link_name", &String::from_utf8_lossy(link));
        }
        f.finish()
    }
}

/// Copies `bytes` into the `slot` provided, returning an error if the `bytes`
/// array is too long or if it contains any nul bytes.
fn copy_into(slot: &mut [u8], bytes: &[u8]) -> Result<()> {
    if bytes.len() > slot.len() {
        Err(ErrorKind::NameTooLong.into())
    } else if bytes.contains(&0) {
        Err(ErrorKind::NulInName.into())
    } else {
        slot[..bytes.len()].copy_from_slice(bytes);
        slot[bytes.len()..].fill(0);
        Ok(())
    }
}

fn copy_truncated(slot: &mut [u8], bytes: &[u8]) {
    let bytes = truncate(bytes);
    let len = bytes.len().min(slot.len() - 1);
    slot[..len].copy_from_slice(&bytes[..len]);
    slot[len..].fill(0);
}
