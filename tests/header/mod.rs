use std::iter;

use tarvfs::{validate_header, EntryType, ErrorKind, Header, TarFormat};

#[test]
fn default_gnu() {
    let mut h = Header::new_gnu();
    assert!(h.is_gnu());
    t!(h.set_path(b"foo"));
    h.set_cksum();
    assert_eq!(t!(validate_header(h.as_bytes())), TarFormat::Gnu);
}

#[test]
fn goto_old() {
    let mut h = Header::new(TarFormat::Ancient);
    assert!(!h.is_gnu());
    t!(h.set_path(b"foo"));
    h.set_cksum();
    assert_eq!(t!(validate_header(h.as_bytes())), TarFormat::Ancient);
}

#[test]
fn goto_ustar() {
    let mut h = Header::new_ustar();
    assert!(!h.is_gnu());
    t!(h.set_path(b"foo"));
    h.set_cksum();
    assert_eq!(t!(validate_header(h.as_bytes())), TarFormat::Posix);
}

#[test]
fn link_name() {
    let mut h = Header::new_gnu();
    assert_eq!(h.link_name_bytes(), None);
    t!(h.set_link_name(b"foo"));
    assert_eq!(h.link_name_bytes(), Some(&b"foo"[..]));
    t!(h.set_link_name(b"foo/bar"));
    assert_eq!(h.link_name_bytes(), Some(&b"foo/bar"[..]));

    assert_eq!(
        h.set_link_name(b"a\0b").unwrap_err().kind(),
        Some(ErrorKind::NulInName)
    );
    let long = [b'l'; 101];
    assert_eq!(
        h.set_link_name(&long).unwrap_err().kind(),
        Some(ErrorKind::NameTooLong)
    );
}

#[test]
fn user_and_group_name() {
    let mut h = Header::new_gnu();
    h.set_username(b"foo");
    h.set_groupname(b"bar");
    assert_eq!(h.username(), Some("foo"));
    assert_eq!(h.groupname(), Some("bar"));

    h = Header::new_ustar();
    h.set_username(b"foo");
    h.set_groupname(b"bar");
    assert_eq!(h.username(), Some("foo"));
    assert_eq!(h.groupname(), Some("bar"));

    h = Header::new(TarFormat::Ancient);
    h.set_username(b"foo");
    h.set_groupname(b"bar");
    assert_eq!(h.username(), None);
    assert_eq!(h.groupname(), None);
}

#[test]
fn dev_major_minor() {
    let mut h = Header::new_gnu();
    t!(h.set_device(1, 2));
    assert_eq!(t!(h.device().unwrap()), (1, 2));

    h = Header::new_ustar();
    t!(h.set_device(8, 17));
    assert_eq!(t!(h.device().unwrap()), (8, 17));
    assert_eq!(
        h.set_device(1 << 22, 0).unwrap_err().kind(),
        Some(ErrorKind::DevValueTooLarge)
    );

    h.as_mut_bytes()[329] = b'g';
    assert!(h.device().unwrap().is_err());

    h = Header::new(TarFormat::Ancient);
    assert!(h.device().is_none());
}

#[test]
fn set_path() {
    let mut h = Header::new_gnu();
    t!(h.set_path(b"foo"));
    assert_eq!(&*h.path_bytes(), b"foo");
    t!(h.set_path(b"foo/bar"));
    assert_eq!(&*h.path_bytes(), b"foo/bar");

    let long_name = iter::repeat("foo").take(100).collect::<String>();
    let medium1 = iter::repeat("foo").take(52).collect::<String>();
    let medium2 = iter::repeat("abcd/").take(50).collect::<String>();

    assert!(h.set_path(long_name.as_bytes()).is_err());
    assert!(h.set_path(medium1.as_bytes()).is_err());
    assert!(h.set_path(medium2.as_bytes()).is_err());
    assert_eq!(
        h.set_path(b"").unwrap_err().kind(),
        Some(ErrorKind::EmptyName)
    );
    assert_eq!(
        h.set_path(b"\0").unwrap_err().kind(),
        Some(ErrorKind::NulInName)
    );

    h = Header::new_ustar();
    t!(h.set_path(b"foo"));
    assert_eq!(&*h.path_bytes(), b"foo");

    assert!(h.set_path(long_name.as_bytes()).is_err());
    assert!(h.set_path(medium1.as_bytes()).is_err());
    t!(h.set_path(medium2.as_bytes()));
    assert_eq!(&*h.path_bytes(), medium2.as_bytes());
}

#[test]
fn numeric_fields() {
    let mut h = Header::new_gnu();
    t!(h.set_mode(0o755));
    t!(h.set_uid(1000));
    t!(h.set_gid(1 << 40));
    t!(h.set_mtime(-86400));
    h.set_size(1 << 36);
    assert_eq!(t!(h.mode()), 0o755);
    assert_eq!(t!(h.uid()), 1000);
    assert_eq!(t!(h.gid()), 1 << 40);
    assert_eq!(t!(h.mtime()), -86400);
    assert_eq!(t!(h.size()), 1 << 36);

    h = Header::new_ustar();
    assert_eq!(
        h.set_gid(1 << 40).unwrap_err().kind(),
        Some(ErrorKind::NumValueTooLarge)
    );
    assert_eq!(
        h.set_mtime(-1).unwrap_err().kind(),
        Some(ErrorKind::NumValueTooLarge)
    );
}

#[test]
fn corrupted_checksum() {
    let mut h = Header::new_gnu();
    t!(h.set_path(b"file"));
    h.set_entry_type(EntryType::Regular);
    h.set_cksum();
    t!(validate_header(h.as_bytes()));

    h.as_mut_bytes()[0] = b'g';
    assert_eq!(
        validate_header(h.as_bytes()).unwrap_err().kind(),
        Some(ErrorKind::ChecksumMismatch)
    );

    h.as_mut_bytes()[148..156].copy_from_slice(b"zzzzzzz ");
    assert_eq!(
        validate_header(h.as_bytes()).unwrap_err().kind(),
        Some(ErrorKind::BadChecksumField)
    );

    assert_eq!(
        validate_header(&[0; 512]).unwrap_err().kind(),
        Some(ErrorKind::ZeroHeader)
    );
}
