//! Detection and bookkeeping of the data runs of sparse files.

use std::io::{Read, Seek, SeekFrom};

use crate::error::{ErrorKind, Result};
use crate::BLOCK_SIZE;

/// Files smaller than this are never considered for sparse encoding.
pub const MIN_SPARSE_SIZE: u64 = 64 * 1024;

/// A run of stored data inside a sparse file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SparseSpan {
    /// Logical offset of the run inside the file.
    pub offset: u64,
    /// Number of bytes in the run.
    pub length: u64,
}

impl SparseSpan {
    fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// The data runs of a file, in increasing offset order, always closed by a
/// zero length span at the file size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SparseMap {
    spans: Vec<SparseSpan>,
    // Offset of each span's bytes within the stored data.
    physical: Vec<u64>,
    size: u64,
}

pub(crate) enum Chunk {
    /// This many logical zero bytes come next.
    Hole(u64),
    /// Stored bytes follow at `physical` within the entry data.
    Data { physical: u64, len: u64 },
}

/// Picks the transfer buffer size for copying or scanning a file.
///
/// Bigger files get bigger buffers to amortize I/O, and no file gets a
/// buffer larger than itself rounded up to a block.
pub fn buffer_size(file_size: u64) -> usize {
    let heuristic: u64 = if file_size >= 64 * 1024 * 1024 {
        2 * 1024 * 1024
    } else if file_size >= 512 * 1024 {
        512 * 1024
    } else {
        128 * 1024
    };
    let rounded = file_size.div_ceil(BLOCK_SIZE as u64).max(1) * BLOCK_SIZE as u64;
    heuristic.min(rounded) as usize
}

impl SparseMap {
    /// Scans the first `size` bytes of `file` block by block and records
    /// every run of blocks that are not entirely zero.
    ///
    /// The file is read from offset 0 and left positioned at offset 0.
    pub fn scan<F: Read + Seek + ?Sized>(file: &mut F, size: u64) -> Result<SparseMap> {
        file.seek(SeekFrom::Start(0))?;

        let mut buf = vec![0u8; buffer_size(size)];
        let mut spans = Vec::new();
        let mut run_start = None;
        let mut off = 0u64;
        while off < size {
            let want = (size - off).min(buf.len() as u64) as usize;
            file.read_exact(&mut buf[..want])?;
            let padded = want.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
            buf[want..padded].fill(0);

            for (i, block) in buf[..padded].chunks_exact(BLOCK_SIZE).enumerate() {
                let block_off = off + (i * BLOCK_SIZE) as u64;
                let zero = block.iter().all(|b| *b == 0);
                match (zero, run_start) {
                    (true, Some(start)) => {
                        spans.push(SparseSpan {
                            offset: start,
                            length: block_off - start,
                        });
                        run_start = None;
                    }
                    (false, None) => run_start = Some(block_off),
                    _ => {}
                }
            }
            off += want as u64;
        }
        // The last run ends at the file size, not at the padded block end.
        if let Some(start) = run_start {
            spans.push(SparseSpan {
                offset: start,
                length: size - start,
            });
        }
        spans.push(SparseSpan {
            offset: size,
            length: 0,
        });

        file.seek(SeekFrom::Start(0))?;
        let map = SparseMap::build(spans, size);
        log::debug!(
            "sparse scan: {} data bytes in {} spans out of {} bytes",
            map.data_size(),
            map.spans.len() - 1,
            size
        );
        Ok(map)
    }

    /// A map describing a file stored without holes.
    pub fn dense(size: u64) -> SparseMap {
        SparseMap::build(
            vec![
                SparseSpan {
                    offset: 0,
                    length: size,
                },
                SparseSpan {
                    offset: size,
                    length: 0,
                },
            ],
            size,
        )
    }

    /// Checks a span list read from an archive: runs must be ordered, must
    /// not overlap, must lie within `size` and must add up to the `stored`
    /// byte count.
    pub(crate) fn from_archive(
        spans: Vec<SparseSpan>,
        size: u64,
        stored: u64,
    ) -> Result<SparseMap> {
        let mut prev_end = 0u64;
        let mut total = 0u64;
        for span in &spans {
            let end = span
                .offset
                .checked_add(span.length)
                .ok_or(ErrorKind::MalformedGnuSparse)?;
            if span.offset < prev_end || end > size {
                return Err(ErrorKind::MalformedGnuSparse.into());
            }
            prev_end = end;
            total += span.length;
        }
        if total != stored {
            return Err(ErrorKind::MalformedGnuSparse.into());
        }
        Ok(SparseMap::build(spans, size))
    }

    fn build(spans: Vec<SparseSpan>, size: u64) -> SparseMap {
        let mut next = 0;
        let physical = spans
            .iter()
            .map(|span| {
                let start = next;
                next += span.length;
                start
            })
            .collect();
        SparseMap {
            spans,
            physical,
            size,
        }
    }

    /// The recorded spans, sentinel included.
    pub fn spans(&self) -> &[SparseSpan] {
        &self.spans
    }

    /// Logical size of the file.
    pub fn file_size(&self) -> u64 {
        self.size
    }

    /// Number of bytes that have to be stored.
    pub fn data_size(&self) -> u64 {
        self.spans.iter().map(|s| s.length).sum()
    }

    /// Whether storing only the spans saves at least one block.
    pub fn saves_space(&self) -> bool {
        self.data_size() + BLOCK_SIZE as u64 <= self.size
    }

    /// Describes what lies at logical offset `pos`, which must be below the
    /// file size.
    pub(crate) fn chunk_at(&self, pos: u64) -> Chunk {
        let idx = self.spans.partition_point(|s| s.end() <= pos);
        match self.spans.get(idx) {
            Some(span) if span.offset <= pos => Chunk::Data {
                physical: self.physical[idx] + (pos - span.offset),
                len: span.end() - pos,
            },
            Some(span) => Chunk::Hole(span.offset - pos),
            None => Chunk::Hole(self.size - pos),
        }
    }
}
