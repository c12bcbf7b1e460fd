use std::fs;
use std::io::prelude::*;
use std::io::{self, Cursor, SeekFrom};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tarvfs::{
    decode_numeric_field, format_offset, Content, EntryType, ErrorKind, FileType, Header,
    ObjectInfo, SparseMap, TarFormat, TarReader, TarWriter, WriterOptions,
};

macro_rules! t {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => panic!("{} returned {}", stringify!($e), e),
        }
    };
}

mod header;

fn file_info(size: u64, perms: u32) -> ObjectInfo {
    let mut info = ObjectInfo::new(FileType::File, perms);
    info.size = size;
    info
}

fn kind_of(err: io::Error) -> Option<ErrorKind> {
    tarvfs::Error::from(err).kind()
}

/// A reader that cannot seek.
struct NoSeek<R>(R);

impl<R: Read> Read for NoSeek<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

/// A sink that fails once `limit` bytes have been written.
struct Limited {
    data: Vec<u8>,
    limit: usize,
}

impl Write for Limited {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.data.len() + buf.len() > self.limit {
            return Err(io::Error::new(io::ErrorKind::Other, "sink full"));
        }
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn simple_tree() {
    let mut ar = TarWriter::new(Vec::new());
    ar.set_options(WriterOptions::new().mtime(Some(1_600_000_000)));

    let dir = ObjectInfo::new(FileType::Directory, 0o755);
    t!(ar.add_entry("d/", &dir, Content::Empty));
    let mut data: &[u8] = b"hello";
    t!(ar.add_entry("d/f.txt", &file_info(5, 0o644), Content::Reader(&mut data)));
    let link = ObjectInfo::new(FileType::Symlink, 0o777);
    t!(ar.add_entry("d/link", &link, Content::Symlink(b"f.txt")));
    let bytes = t!(ar.into_inner());
    assert_eq!(bytes.len(), 6 * 512);
    assert!(bytes[4 * 512..].iter().all(|b| *b == 0));

    let mut ar = TarReader::new(&bytes[..]);
    {
        let e = t!(ar.next_entry()).unwrap();
        assert_eq!(e.path_bytes(), b"d/");
        assert_eq!(e.file_type(), FileType::Directory);
        assert_eq!(e.header().entry_type(), EntryType::Directory);
        assert_eq!(e.info().permissions(), 0o755);
        assert_eq!(e.info().mtime, 1_600_000_000);
        assert_eq!(e.info().owner.as_deref(), Some("someone"));
        assert_eq!(e.info().group.as_deref(), Some("somegroup"));
    }
    {
        let mut e = t!(ar.next_entry()).unwrap();
        assert_eq!(&*t!(e.path()), std::path::Path::new("d/f.txt"));
        assert_eq!(e.file_type(), FileType::File);
        assert_eq!(e.size(), 5);
        let mut s = String::new();
        t!(e.read_to_string(&mut s));
        assert_eq!(s, "hello");
    }
    {
        let e = t!(ar.next_entry()).unwrap();
        assert_eq!(e.file_type(), FileType::Symlink);
        assert!(!e.is_hard_link());
        assert_eq!(e.link_name_bytes(), Some(&b"f.txt"[..]));
    }
    assert!(t!(ar.next_entry()).is_none());
    assert!(t!(ar.next_entry()).is_none());
    assert_eq!(ar.format(), Some(TarFormat::Gnu));
    assert_eq!(ar.end_offset(), Some(4 * 512));
}

#[test]
fn large_filename() {
    let mut ar = TarWriter::new(Vec::new());
    let name = "a/".repeat(80) + "file";
    let target = "t".repeat(150);
    let mut data: &[u8] = b"test";
    t!(ar.add_entry(&name, &file_info(4, 0o644), Content::Reader(&mut data)));
    let link = ObjectInfo::new(FileType::Symlink, 0o777);
    t!(ar.add_entry("l", &link, Content::Symlink(target.as_bytes())));
    let exactly = "x".repeat(100);
    t!(ar.add_entry(&exactly, &file_info(0, 0o644), Content::Empty));
    let bytes = t!(ar.into_inner());

    let mut ar = TarReader::new(&bytes[..]);
    {
        let mut e = t!(ar.next_entry()).unwrap();
        assert_eq!(e.path_bytes(), name.as_bytes());
        assert_eq!(e.header().name_bytes().len(), 99);
        assert_eq!(e.mark().header_offset, 0);
        let mut s = String::new();
        t!(e.read_to_string(&mut s));
        assert_eq!(s, "test");
    }
    {
        let e = t!(ar.next_entry()).unwrap();
        assert_eq!(e.path_bytes(), b"l");
        assert_eq!(e.link_name_bytes(), Some(target.as_bytes()));
    }
    {
        let e = t!(ar.next_entry()).unwrap();
        assert_eq!(e.path_bytes(), exactly.as_bytes());
    }
    assert!(t!(ar.next_entry()).is_none());
}

#[test]
fn ustar_long_names() {
    let mut ar = TarWriter::new(Vec::new());
    ar.set_options(WriterOptions::new().format(TarFormat::Posix));
    let split = "abcd/".repeat(50);
    let name = format!("{}file", &split[..150]);
    t!(ar.add_entry(&name, &file_info(0, 0o644), Content::Empty));

    let unsplittable = "x".repeat(150);
    let err = ar
        .add_entry(&unsplittable, &file_info(0, 0o644), Content::Empty)
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::NameTooLong));

    // nothing was written for the failed entry
    t!(ar.add_entry("after", &file_info(0, 0o644), Content::Empty));
    let bytes = t!(ar.into_inner());
    assert_eq!(bytes.len(), 4 * 512);

    let mut ar = TarReader::new(&bytes[..]);
    assert_eq!(t!(ar.next_entry()).unwrap().path_bytes(), name.as_bytes());
    assert_eq!(ar.format(), Some(TarFormat::Posix));
    assert_eq!(t!(ar.next_entry()).unwrap().path_bytes(), b"after");
    assert!(t!(ar.next_entry()).is_none());
}

#[test]
fn writer_options() {
    let opts = WriterOptions::new()
        .owner(Some(42), Some("alice"))
        .group(Some(7), None)
        .file_mode_masks(0o750, 0o004)
        .dir_mode_masks(0o700, 0)
        .mtime(Some(99));
    let opts = t!(opts.prefix("root"));
    let mut ar = TarWriter::new(Vec::new());
    ar.set_options(opts);

    let mut info = file_info(0, 0o777);
    info.uid = Some(5);
    info.owner = Some("bob".to_string());
    info.group = Some("staff".to_string());
    info.mtime = 12345;
    t!(ar.add_entry("f", &info, Content::Empty));
    t!(ar.add_entry("d", &ObjectInfo::new(FileType::Directory, 0o755), Content::Empty));
    let bytes = t!(ar.into_inner());

    let mut ar = TarReader::new(&bytes[..]);
    {
        let e = t!(ar.next_entry()).unwrap();
        assert_eq!(e.path_bytes(), b"root/f");
        assert_eq!(t!(e.header().mode()), 0o754);
        assert_eq!(e.info().uid, Some(42));
        assert_eq!(e.info().gid, Some(7));
        assert_eq!(e.info().owner.as_deref(), Some("alice"));
        assert_eq!(e.info().group.as_deref(), Some("staff"));
        assert_eq!(e.info().mtime, 99);
    }
    {
        let e = t!(ar.next_entry()).unwrap();
        assert_eq!(e.path_bytes(), b"root/d");
        assert_eq!(e.info().permissions(), 0o700);
        assert_eq!(e.file_type(), FileType::Directory);
    }
}

#[test]
fn links_and_special_files() {
    let mut ar = TarWriter::new(Vec::new());
    let mut data: &[u8] = b"x";
    t!(ar.add_entry("f", &file_info(1, 0o644), Content::Reader(&mut data)));
    t!(ar.add_entry("h", &file_info(0, 0o644), Content::HardLink(b"f")));
    let mut dev = ObjectInfo::new(FileType::CharDevice, 0o600);
    dev.device = Some((1, 3));
    t!(ar.add_entry("null", &dev, Content::Empty));
    t!(ar.add_entry("pipe", &ObjectInfo::new(FileType::Fifo, 0o644), Content::Empty));
    let bytes = t!(ar.into_inner());

    let mut ar = TarReader::new(&bytes[..]);
    t!(ar.next_entry()).unwrap();
    {
        let e = t!(ar.next_entry()).unwrap();
        assert_eq!(e.header().entry_type(), EntryType::Link);
        assert_eq!(e.file_type(), FileType::Symlink);
        assert!(e.is_hard_link());
        assert_eq!(e.link_name_bytes(), Some(&b"f"[..]));
    }
    {
        let e = t!(ar.next_entry()).unwrap();
        assert_eq!(e.file_type(), FileType::CharDevice);
        assert_eq!(e.info().device, Some((1, 3)));
    }
    assert_eq!(t!(ar.next_entry()).unwrap().file_type(), FileType::Fifo);
    assert!(t!(ar.next_entry()).is_none());
}

#[test]
fn large_numbers() {
    let mut ar = TarWriter::new(Vec::new());
    let mut info = file_info(0, 0o644);
    info.uid = Some(1 << 40);
    info.mtime = -1;
    t!(ar.add_entry("big", &info, Content::Empty));
    let bytes = t!(ar.into_inner());
    let mut rd = TarReader::new(&bytes[..]);
    let e = t!(rd.next_entry()).unwrap();
    assert_eq!(e.info().uid, Some(1 << 40));
    assert_eq!(e.info().mtime, -1);

    let mut ar = TarWriter::new(Vec::new());
    ar.set_options(WriterOptions::new().format(TarFormat::Posix));
    let err = ar.add_entry("big", &info, Content::Empty).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::NumValueTooLarge));
}

#[test]
fn offsets_round_trip() {
    let mut rng = SmallRng::seed_from_u64(0x7a5);
    for _ in 0..2000 {
        let value = rng.gen::<u64>() >> rng.gen_range(1..64);
        let mut out = [0u8; 12];
        format_offset(&mut out, value);
        assert_eq!(t!(decode_numeric_field(&out, false)) as u64, value);
    }
}

#[test]
fn sparse_files() {
    let mut file = t!(tempfile::tempfile());
    let data: Vec<u8> = (0..4096).map(|i| (i % 251) as u8 + 1).collect();
    t!(file.write_all(&vec![0; 3 << 20]));
    t!(file.write_all(&data));
    t!(file.write_all(&vec![0; 1 << 20]));
    let size = (4 << 20) + 4096;

    let first = t!(SparseMap::scan(&mut file, size));
    assert_eq!(t!(file.stream_position()), 0);
    let second = t!(SparseMap::scan(&mut file, size));
    assert_eq!(first, second);
    assert_eq!(first.data_size(), 4096);
    assert!(first.saves_space());

    let mut ar = TarWriter::new(Vec::new());
    ar.set_options(WriterOptions::new().sparse(true));
    t!(ar.add_entry("sparse.bin", &file_info(size, 0o600), Content::File(&mut file)));
    let bytes = t!(ar.into_inner());
    assert_eq!(bytes.len(), 512 + 4096 + 1024);

    let mut ar = TarReader::new(&bytes[..]);
    let mut e = t!(ar.next_entry()).unwrap();
    assert!(e.is_sparse());
    assert_eq!(e.header().entry_type(), EntryType::GNUSparse);
    assert_eq!(e.size(), size);
    assert_eq!(e.sparse_map(), &first);
    let mut out = Vec::new();
    t!(e.read_to_end(&mut out));
    assert_eq!(out.len() as u64, size);
    assert!(out[..3 << 20].iter().all(|b| *b == 0));
    assert_eq!(&out[3 << 20..(3 << 20) + 4096], &data[..]);
    assert!(out[(3 << 20) + 4096..].iter().all(|b| *b == 0));
}

#[test]
fn sparse_extension_blocks() {
    let mut buf = vec![0u8; 40 * 4096];
    for i in 0..40 {
        buf[i * 4096..i * 4096 + 512].fill(i as u8 + 1);
    }
    let mut src = Cursor::new(buf.clone());

    let mut ar = TarWriter::new(Vec::new());
    ar.set_options(WriterOptions::new().sparse(true));
    let info = file_info(buf.len() as u64, 0o644);
    t!(ar.add_entry("holes", &info, Content::File(&mut src)));
    let bytes = t!(ar.into_inner());
    // main header, two extension blocks, 40 data blocks, terminator
    assert_eq!(bytes.len(), (1 + 2 + 40 + 2) * 512);

    let mut ar = TarReader::new(&bytes[..]);
    let mut e = t!(ar.next_entry()).unwrap();
    assert_eq!(e.sparse_map().spans().len(), 41);
    assert_eq!(e.mark().data_offset, 3 * 512);
    let mut out = Vec::new();
    t!(e.read_to_end(&mut out));
    assert!(out == buf);
}

#[test]
fn sparse_needs_savings() {
    let buf: Vec<u8> = (0..70 * 1024).map(|i| (i % 7) as u8 + 1).collect();
    let mut src = Cursor::new(buf.clone());
    let mut ar = TarWriter::new(Vec::new());
    ar.set_options(WriterOptions::new().sparse(true));
    t!(ar.add_entry("dense", &file_info(buf.len() as u64, 0o644), Content::File(&mut src)));
    let bytes = t!(ar.into_inner());

    let mut ar = TarReader::new(&bytes[..]);
    let mut e = t!(ar.next_entry()).unwrap();
    assert_eq!(e.header().entry_type(), EntryType::Regular);
    assert!(!e.is_sparse());
    let mut out = Vec::new();
    t!(e.read_to_end(&mut out));
    assert!(out == buf);
}

#[test]
fn push_entries() {
    let mut ar = TarWriter::new(Vec::new());
    {
        let mut p = t!(ar.begin_push("fixed", Some(10), None));
        t!(p.write_all(b"0123"));
        // forward seeks zero fill, even without a seekable sink
        assert_eq!(t!(p.seek(SeekFrom::Start(8))), 8);
        t!(p.write_all(b"89"));
        let err = p.write_all(b"!").unwrap_err();
        assert_eq!(kind_of(err), Some(ErrorKind::DiskFull));
        let err = p.seek(SeekFrom::Start(2)).unwrap_err();
        assert_eq!(kind_of(err), Some(ErrorKind::NotAFile));
        let err = p.seek(SeekFrom::Current(-100)).unwrap_err();
        assert_eq!(kind_of(err), Some(ErrorKind::NegativeSeek));
        let err = p.seek(SeekFrom::Start(11)).unwrap_err();
        assert_eq!(kind_of(err), Some(ErrorKind::Seek));
        assert_eq!(p.written(), 10);
        t!(p.finish());
    }
    let err = ar.begin_push("open", None, None).err().unwrap();
    assert_eq!(err.kind(), Some(ErrorKind::NotAFile));
    let bytes = t!(ar.into_inner());

    let mut ar = TarReader::new(&bytes[..]);
    let mut e = t!(ar.next_entry()).unwrap();
    assert_eq!(e.info().permissions(), 0o666);
    let mut out = Vec::new();
    t!(e.read_to_end(&mut out));
    assert_eq!(out, b"0123\0\0\0\089");
}

#[test]
fn open_ended_push() {
    let mut ar = t!(TarWriter::new_seekable(Cursor::new(Vec::new())));
    {
        let mut p = t!(ar.begin_push("open", None, Some(&file_info(0, 0o640))));
        t!(p.write_all(b"abc"));
        t!(p.seek(SeekFrom::Start(10)));
        t!(p.write_all(b"z"));
        t!(p.seek(SeekFrom::Start(1)));
        t!(p.write_all(b"B"));
        assert_eq!(t!(p.seek(SeekFrom::End(0))), 11);
    }
    // the next entry completes the open one
    let mut data: &[u8] = b"next";
    t!(ar.add_entry("next", &file_info(4, 0o644), Content::Reader(&mut data)));
    let bytes = t!(ar.into_inner()).into_inner();
    assert_eq!(bytes.len(), 6 * 512);

    let mut ar = TarReader::new(&bytes[..]);
    {
        let mut e = t!(ar.next_entry()).unwrap();
        assert_eq!(e.size(), 11);
        assert_eq!(e.info().permissions(), 0o640);
        let mut out = Vec::new();
        t!(e.read_to_end(&mut out));
        assert_eq!(out, b"aBc\0\0\0\0\0\0\0z");
    }
    let mut e = t!(ar.next_entry()).unwrap();
    let mut s = String::new();
    t!(e.read_to_string(&mut s));
    assert_eq!(s, "next");
}

#[test]
fn push_underflow_is_fatal() {
    let mut ar = TarWriter::new(Vec::new());
    {
        let mut p = t!(ar.begin_push("short", Some(10), None));
        t!(p.write_all(b"12345"));
        let err = p.finish().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::BufferUnderflow));
    }
    let err = ar.add_entry("x", &file_info(0, 0o644), Content::Empty).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::BufferUnderflow));
    assert!(ar.into_inner().is_err());
}

#[test]
fn stream_entries() {
    let mut ar = TarWriter::new(Vec::new());
    let mut src: &[u8] = b"streamed";
    let err = ar
        .add_entry("s", &file_info(0, 0o644), Content::Stream(&mut src))
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::NotAFile));
    t!(ar.add_entry("ok", &file_info(0, 0o644), Content::Empty));
    drop(ar);

    let mut ar = t!(TarWriter::new_seekable(Cursor::new(Vec::new())));
    let payload = vec![7u8; 1000];
    let mut src = NoSeek(&payload[..]);
    t!(ar.add_entry("s", &file_info(0, 0o644), Content::Stream(&mut src)));
    let bytes = t!(ar.into_inner()).into_inner();

    let mut ar = TarReader::new(&bytes[..]);
    let mut e = t!(ar.next_entry()).unwrap();
    assert_eq!(e.size(), 1000);
    let mut out = Vec::new();
    t!(e.read_to_end(&mut out));
    assert!(out == payload);
}

#[test]
fn fatal_errors_are_latched() {
    let mut ar = TarWriter::new(Limited {
        data: Vec::new(),
        limit: 600,
    });
    let payload = vec![1u8; 1000];
    let mut src = &payload[..];
    let err = ar
        .add_entry("f", &file_info(1000, 0o644), Content::Reader(&mut src))
        .unwrap_err();
    assert_eq!(err.kind(), None);
    assert!(err.to_string().contains("sink full"));

    let err = ar.add_entry("g", &file_info(0, 0o644), Content::Empty).unwrap_err();
    assert!(err.to_string().contains("sink full"));
    assert!(ar.finish().is_err());
}

#[test]
fn short_source_is_fatal() {
    let mut ar = TarWriter::new(Vec::new());
    let mut src: &[u8] = b"only";
    let err = ar
        .add_entry("f", &file_info(100, 0o644), Content::Reader(&mut src))
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::UnexpectedEndOfStream));
    assert!(ar.finish().is_err());
}

#[test]
fn wrong_content_for_type() {
    let mut ar = TarWriter::new(Vec::new());
    let dir = ObjectInfo::new(FileType::Directory, 0o755);
    let mut src: &[u8] = b"";
    let err = ar.add_entry("d", &dir, Content::Reader(&mut src)).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::InvalidState));
    let link = ObjectInfo::new(FileType::Symlink, 0o777);
    let err = ar.add_entry("l", &link, Content::Empty).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::InvalidState));
    t!(ar.finish());
    let err = ar.add_entry("late", &dir, Content::Empty).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::InvalidState));
}

fn build(names: &[&str]) -> Vec<u8> {
    let mut ar = TarWriter::new(Vec::new());
    ar.set_options(WriterOptions::new().mtime(Some(1_234_567_890)));
    for name in names {
        let contents = name.repeat(100);
        let mut data = contents.as_bytes();
        let info = file_info(contents.len() as u64, 0o644);
        t!(ar.add_entry(name, &info, Content::Reader(&mut data)));
    }
    t!(ar.into_inner())
}

#[test]
fn update_truncates() {
    let full = build(&["one", "two", "three", "four"]);
    let expected = build(&["one", "two", "four"]);

    let mut file = t!(tempfile::tempfile());
    t!(file.write_all(&full));
    t!(file.write_all(&[0; 10240]));
    t!(file.seek(SeekFrom::Start(0)));
    {
        let mut ar = t!(TarWriter::new_update(&mut file));
        ar.set_options(WriterOptions::new().mtime(Some(1_234_567_890)));
        let mut marks = Vec::new();
        while let Some(e) = t!(ar.next_entry()) {
            marks.push(e.mark());
        }
        assert_eq!(marks.len(), 4);
        t!(ar.truncate_at(marks[2], false));
        let err = ar.next_entry().err().unwrap();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidState));

        let contents = "four".repeat(100);
        let mut data = contents.as_bytes();
        let info = file_info(contents.len() as u64, 0o644);
        t!(ar.add_entry("four", &info, Content::Reader(&mut data)));
        t!(ar.finish());
    }
    t!(file.seek(SeekFrom::Start(0)));
    let mut out = Vec::new();
    t!(file.read_to_end(&mut out));
    assert!(out == expected);
}

#[test]
fn update_read_only_leaves_file() {
    let mut original = build(&["one"]);
    original.extend_from_slice(&[0; 8192]);

    let mut file = t!(tempfile::tempfile());
    t!(file.write_all(&original));
    t!(file.seek(SeekFrom::Start(0)));
    {
        let mut ar = t!(TarWriter::new_update(&mut file));
        let mut count = 0;
        while t!(ar.next_entry()).is_some() {
            count += 1;
        }
        assert_eq!(count, 1);
    }
    assert_eq!(t!(file.metadata()).len(), original.len() as u64);
    t!(file.seek(SeekFrom::Start(0)));
    let mut out = Vec::new();
    t!(file.read_to_end(&mut out));
    assert!(out == original);

    // dropping without walking at all is just as harmless
    let ar = t!(TarWriter::new_update(Cursor::new(original.clone())));
    drop(ar);
}

#[test]
fn update_appends() {
    let mut full = build(&["one", "two"]);
    full.extend_from_slice(&[0; 4096]);
    let expected = build(&["one", "two", "three"]);

    let mut ar = t!(TarWriter::new_update(Cursor::new(full)));
    ar.set_options(WriterOptions::new().mtime(Some(1_234_567_890)));
    let contents = "three".repeat(100);
    let mut data = contents.as_bytes();
    let info = file_info(contents.len() as u64, 0o644);
    t!(ar.add_entry("three", &info, Content::Reader(&mut data)));
    let out = t!(ar.into_inner()).into_inner();
    assert!(out == expected);
}

#[test]
fn update_cut_after_entry() {
    let full = build(&["one", "two", "three"]);
    let expected = build(&["one", "two", "four"]);

    let mut ar = t!(TarWriter::new_update(Cursor::new(full)));
    ar.set_options(WriterOptions::new().mtime(Some(1_234_567_890)));
    t!(ar.next_entry()).unwrap();
    let mark = t!(ar.next_entry()).unwrap().mark();
    t!(ar.truncate_at(mark, true));
    let contents = "four".repeat(100);
    let mut data = contents.as_bytes();
    let info = file_info(contents.len() as u64, 0o644);
    t!(ar.add_entry("four", &info, Content::Reader(&mut data)));
    let out = t!(ar.into_inner()).into_inner();
    assert!(out == expected);

    let full = build(&["one", "two"]);
    let mut ar = t!(TarWriter::new_update(Cursor::new(full)));
    let mark = t!(ar.next_entry()).unwrap().mark();
    t!(ar.truncate_at(mark, true));
    let out = t!(ar.into_inner()).into_inner();
    assert!(out == build(&["one"]));
}

#[test]
fn append_from_disk() {
    let td = t!(tempfile::tempdir());
    let dir = td.path().join("dir");
    t!(fs::create_dir(&dir));
    t!(fs::write(dir.join("file"), b"on disk"));

    let mut ar = TarWriter::new(Vec::new());
    t!(ar.append_path_with_name(&dir, "dir"));
    t!(ar.append_path_with_name(dir.join("file"), "dir/file"));
    #[cfg(unix)]
    {
        t!(std::os::unix::fs::symlink("file", dir.join("link")));
        t!(ar.append_path_with_name(dir.join("link"), "dir/link"));
    }
    let bytes = t!(ar.into_inner());

    let mut ar = TarReader::new(&bytes[..]);
    assert_eq!(t!(ar.next_entry()).unwrap().file_type(), FileType::Directory);
    {
        let mut e = t!(ar.next_entry()).unwrap();
        assert_eq!(e.path_bytes(), b"dir/file");
        let mut s = String::new();
        t!(e.read_to_string(&mut s));
        assert_eq!(s, "on disk");
    }
    #[cfg(unix)]
    {
        let e = t!(ar.next_entry()).unwrap();
        assert_eq!(e.file_type(), FileType::Symlink);
        assert_eq!(e.link_name_bytes(), Some(&b"file"[..]));
    }
    assert!(t!(ar.next_entry()).is_none());
}

#[test]
fn detects_corruption() {
    let bytes = build(&["one", "two"]);

    let mut bad = bytes.clone();
    bad[0] ^= 0x20;
    let mut ar = TarReader::new(&bad[..]);
    let err = ar.next_entry().err().unwrap();
    assert_eq!(err.kind(), Some(ErrorKind::ChecksumMismatch));

    // still octal, but no longer the sum of the block
    let mut bad = bytes.clone();
    bad[150] = if bad[150] == b'1' { b'2' } else { b'1' };
    let mut ar = TarReader::new(&bad[..]);
    let err = ar.next_entry().err().unwrap();
    assert_eq!(err.kind(), Some(ErrorKind::ChecksumMismatch));

    let mut ar = TarReader::new(&bytes[..300]);
    let err = ar.next_entry().err().unwrap();
    assert_eq!(err.kind(), Some(ErrorKind::UnexpectedEndOfStream));

    let mut ar = TarReader::new(&bytes[..700]);
    let mut e = t!(ar.next_entry()).unwrap();
    let err = e.read_to_end(&mut Vec::new()).unwrap_err();
    assert_eq!(kind_of(err), Some(ErrorKind::UnexpectedEndOfStream));

    // trailing garbage after the terminator
    let mut bad = bytes.clone();
    let len = bad.len();
    bad[len - 1] = 1;
    let mut ar = TarReader::new(&bad[..]);
    t!(ar.next_entry());
    t!(ar.next_entry());
    let err = ar.next_entry().err().unwrap();
    assert_eq!(err.kind(), Some(ErrorKind::ZeroHeader));
}

#[test]
fn missing_terminator() {
    let bytes = build(&["one"]);
    let cut = &bytes[..bytes.len() - 1024];
    let mut ar = TarReader::new(cut);
    t!(ar.next_entry()).unwrap();
    assert!(t!(ar.next_entry()).is_none());
    assert_eq!(ar.end_offset(), Some(cut.len() as u64));
}

fn raw_header(format: TarFormat, path: &[u8], ty: EntryType, size: u64) -> Header {
    let mut h = Header::new(format);
    if !path.is_empty() {
        t!(h.set_path(path));
    }
    t!(h.set_mode(0o644));
    t!(h.set_uid(0));
    t!(h.set_gid(0));
    t!(h.set_mtime(0));
    h.set_size(size);
    h.set_entry_type(ty);
    h.set_cksum();
    h
}

fn push_padded(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data);
    let len = out.len().div_ceil(512) * 512;
    out.resize(len, 0);
}

fn pax_record(key: &str, value: &str) -> String {
    let rest = format!(" {}={}\n", key, value);
    let mut len = rest.len() + 1;
    while format!("{}{}", len, rest).len() != len {
        len += 1;
    }
    format!("{}{}", len, rest)
}

#[test]
fn pax_headers() {
    let global = pax_record("uname", "globaluser");
    let local = pax_record("path", "pax/a-rather-long-name.txt") + &pax_record("uid", "4242");

    let mut bytes = Vec::new();
    let g = raw_header(TarFormat::Posix, b"g", EntryType::XGlobalHeader, global.len() as u64);
    bytes.extend_from_slice(g.as_bytes());
    push_padded(&mut bytes, global.as_bytes());
    let x = raw_header(TarFormat::Posix, b"x", EntryType::XHeader, local.len() as u64);
    bytes.extend_from_slice(x.as_bytes());
    push_padded(&mut bytes, local.as_bytes());
    let f = raw_header(TarFormat::Posix, b"short", EntryType::Regular, 5);
    bytes.extend_from_slice(f.as_bytes());
    push_padded(&mut bytes, b"hello");
    let f = raw_header(TarFormat::Posix, b"second", EntryType::Regular, 0);
    bytes.extend_from_slice(f.as_bytes());
    bytes.extend_from_slice(&[0; 1024]);

    let mut ar = TarReader::new(&bytes[..]);
    {
        let mut e = t!(ar.next_entry()).unwrap();
        assert_eq!(e.path_bytes(), b"pax/a-rather-long-name.txt");
        assert_eq!(e.info().uid, Some(4242));
        assert_eq!(e.info().owner.as_deref(), Some("globaluser"));
        assert_eq!(e.mark().header_offset, 1024);
        let mut s = String::new();
        t!(e.read_to_string(&mut s));
        assert_eq!(s, "hello");
    }
    {
        let e = t!(ar.next_entry()).unwrap();
        assert_eq!(e.path_bytes(), b"second");
        assert_eq!(e.info().uid, Some(0));
        assert_eq!(e.info().owner.as_deref(), Some("globaluser"));
    }
    assert!(t!(ar.next_entry()).is_none());
}

#[test]
fn rejects_oversized_long_names() {
    let h = raw_header(TarFormat::Gnu, b"././@LongLink", EntryType::GNULongName, 2 << 20);
    let mut ar = TarReader::new(&h.as_bytes()[..]);
    let err = ar.next_entry().err().unwrap();
    assert_eq!(err.kind(), Some(ErrorKind::NameTooLong));

    let h = raw_header(TarFormat::Gnu, b"", EntryType::Regular, 0);
    let mut ar = TarReader::new(&h.as_bytes()[..]);
    let err = ar.next_entry().err().unwrap();
    assert_eq!(err.kind(), Some(ErrorKind::EmptyName));
}

#[test]
fn mode_must_match_type() {
    let mut h = raw_header(TarFormat::Posix, b"d", EntryType::Directory, 0);
    t!(h.set_mode(0o100644));
    h.set_cksum();
    let mut ar = TarReader::new(&h.as_bytes()[..]);
    let err = ar.next_entry().err().unwrap();
    assert_eq!(err.kind(), Some(ErrorKind::ModeWithType));

    let mut h = raw_header(TarFormat::Posix, b"d", EntryType::Regular, 0);
    t!(h.set_mode(0o040755));
    h.set_cksum();
    let mut bytes = h.as_bytes().to_vec();
    bytes.extend_from_slice(&[0; 1024]);
    let mut ar = TarReader::new(&bytes[..]);
    assert_eq!(t!(ar.next_entry()).unwrap().file_type(), FileType::Directory);

    let mut h = raw_header(TarFormat::Posix, b"f", EntryType::Regular, 0);
    t!(h.set_mode(0o1000644));
    h.set_cksum();
    let mut ar = TarReader::new(&h.as_bytes()[..]);
    let err = ar.next_entry().err().unwrap();
    assert_eq!(err.kind(), Some(ErrorKind::BadModeField));
}
