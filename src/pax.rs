use std::slice;
use std::str;

use crate::error::{ErrorKind, Result};

// Keywords for PAX extended header records.
const PAX_PATH: &str = "path";
const PAX_LINKPATH: &str = "linkpath";
const PAX_SIZE: &str = "size";
const PAX_UID: &str = "uid";
const PAX_GID: &str = "gid";
const PAX_UNAME: &str = "uname";
const PAX_GNAME: &str = "gname";
const PAX_MTIME: &str = "mtime";
const PAX_GNUSPARSE: &str = "GNU.sparse.";

/// An iterator over the pax extensions in an archive entry.
///
/// This iterator yields structures which can themselves be parsed into
/// key/value pairs.
pub struct PaxExtensions<'entry> {
    data: slice::Split<'entry, u8, fn(&u8) -> bool>,
}

impl<'entry> PaxExtensions<'entry> {
    /// Create new pax extensions iterator from the given entry data.
    pub fn new(a: &'entry [u8]) -> Self {
        fn is_newline(a: &u8) -> bool {
            *a == b'\n'
        }
        PaxExtensions {
            data: a.split(is_newline),
        }
    }
}

/// A key/value pair corresponding to a pax extension.
pub struct PaxExtension<'entry> {
    key: &'entry [u8],
    value: &'entry [u8],
}

impl<'entry> Iterator for PaxExtensions<'entry> {
    type Item = Result<PaxExtension<'entry>>;

    fn next(&mut self) -> Option<Result<PaxExtension<'entry>>> {
        let line = match self.data.next() {
            Some(line) if line.is_empty() || line.iter().all(|b| *b == 0) => return None,
            Some(line) => line,
            None => return None,
        };

        Some(
            line.iter()
                .position(|b| *b == b' ')
                .and_then(|i| {
                    str::from_utf8(&line[..i])
                        .ok()
                        .and_then(|len| len.parse::<usize>().ok().map(|j| (i + 1, j)))
                })
                .and_then(|(kvstart, reported_len)| {
                    // The reported length counts the newline the split removed.
                    if line.len() + 1 == reported_len {
                        line[kvstart..]
                            .iter()
                            .position(|b| *b == b'=')
                            .map(|equals| (kvstart, equals))
                    } else {
                        None
                    }
                })
                .map(|(kvstart, equals)| PaxExtension {
                    key: &line[kvstart..kvstart + equals],
                    value: &line[kvstart + equals + 1..],
                })
                .ok_or_else(|| ErrorKind::MalformedPaxRecord.into()),
        )
    }
}

impl<'entry> PaxExtension<'entry> {
    /// Returns the key for this key/value pair parsed as a string.
    ///
    /// May fail if the key isn't actually utf-8.
    pub fn key(&self) -> std::result::Result<&'entry str, str::Utf8Error> {
        str::from_utf8(self.key)
    }

    /// Returns the underlying raw bytes for this value of this key/value pair.
    pub fn value_bytes(&self) -> &'entry [u8] {
        self.value
    }

    fn number<T: str::FromStr>(&self) -> Result<T> {
        str::from_utf8(self.value)
            .ok()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| ErrorKind::MalformedPaxRecord.into())
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(self.value).into_owned()
    }
}

/// Header fields replaced by pax records.
#[derive(Clone, Debug, Default)]
pub(crate) struct PaxOverrides {
    pub path: Option<Vec<u8>>,
    pub link_path: Option<Vec<u8>>,
    pub size: Option<u64>,
    pub uid: Option<u64>,
    pub gid: Option<u64>,
    pub uname: Option<String>,
    pub gname: Option<String>,
    pub mtime: Option<i64>,
}

impl PaxOverrides {
    /// Applies the records of one extended header on top of the values
    /// collected so far.
    pub fn apply(&mut self, data: &[u8]) -> Result<()> {
        for ext in PaxExtensions::new(data) {
            let ext = ext?;
            let key = ext.key().map_err(|_| ErrorKind::MalformedPaxRecord)?;
            match key {
                PAX_PATH => self.path = Some(ext.value_bytes().to_vec()),
                PAX_LINKPATH => self.link_path = Some(ext.value_bytes().to_vec()),
                PAX_SIZE => self.size = Some(ext.number()?),
                PAX_UID => self.uid = Some(ext.number()?),
                PAX_GID => self.gid = Some(ext.number()?),
                PAX_UNAME => self.uname = Some(ext.text()),
                PAX_GNAME => self.gname = Some(ext.text()),
                PAX_MTIME => self.mtime = Some(parse_time(ext.value_bytes())?),
                k if k.starts_with(PAX_GNUSPARSE) => {
                    log::warn!("pax sparse record {} is not supported, ignoring it", k);
                }
                k => log::debug!("ignoring pax record {}", k),
            }
        }
        Ok(())
    }
}

// Whole seconds of a "seconds[.fraction]" timestamp, rounded down.
fn parse_time(value: &[u8]) -> Result<i64> {
    let value = str::from_utf8(value).map_err(|_| ErrorKind::MalformedPaxRecord)?;
    let (secs, frac) = value.split_once('.').unwrap_or((value, ""));
    let whole: i64 = secs.parse().map_err(|_| ErrorKind::MalformedPaxRecord)?;
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ErrorKind::MalformedPaxRecord.into());
    }
    if secs.starts_with('-') && frac.bytes().any(|b| b != b'0') {
        return Ok(whole - 1);
    }
    Ok(whole)
}
