use std::env::args_os;
use std::io::{copy, stdin, stdout};
use std::path::Path;

use tarvfs::TarReader;

fn main() -> tarvfs::Result<()> {
    let first_arg = args_os().nth(1).expect("usage: extract_file <path> < archive.tar");
    let filename = Path::new(&first_arg);
    let mut ar = TarReader::new(stdin().lock());
    while let Some(mut entry) = ar.next_entry()? {
        if entry.path()? == filename {
            copy(&mut entry, &mut stdout())?;
        }
    }
    Ok(())
}
