#![no_main]

use libfuzzer_sys::fuzz_target;

use std::io::{Cursor, Read, Seek, SeekFrom};
use tarvfs::{Content, TarReader, TarWriter};

fuzz_target!(|data: &[u8]| {
    // Walk the input as a stream, reading every entry to its end.
    let mut ar = TarReader::new(data);
    let mut buf = [0u8; 4096];
    while let Ok(Some(mut entry)) = ar.next_entry() {
        while let Ok(n) = entry.read(&mut buf) {
            if n == 0 {
                break;
            }
        }
    }

    // Random access through a seekable reader, re-encoding what decodes.
    let mut ar = match TarReader::new_seekable(Cursor::new(data)) {
        Ok(ar) => ar,
        Err(_) => return,
    };
    let mut out = TarWriter::new(Vec::new());
    while let Ok(Some(mut entry)) = ar.next_entry() {
        let size = entry.size();
        let _ = entry.seek(SeekFrom::Start(size / 2));
        let _ = entry.read(&mut buf);
        let _ = entry.seek(SeekFrom::Start(0));
        let info = entry.info().clone();
        let path = entry.path_bytes().to_vec();
        if let Ok(path) = std::str::from_utf8(&path) {
            if let Some(link) = entry.link_name_bytes().map(<[u8]>::to_vec) {
                let _ = out.add_entry(path, &info, Content::Symlink(&link));
            } else if info.size < 1 << 20 {
                let _ = out.add_entry(path, &info, Content::Reader(&mut entry));
            }
        }
    }
    let _ = out.into_inner();
});
