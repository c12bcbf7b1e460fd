//! Appends files to an archive, creating it if needed:
//!
//!     append <archive.tar> <path>...
//!
//! Set `TAR_SPARSE=1` to store holes of sparse files.

use std::env;
use std::fs::OpenOptions;

use tarvfs::{TarWriter, WriterOptions};

fn main() -> tarvfs::Result<()> {
    let mut args = env::args_os().skip(1);
    let archive = args.next().expect("usage: append <archive.tar> <path>...");
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&archive)?;

    let mut ar = TarWriter::new_update(file)?;
    ar.set_options(WriterOptions::new().sparse(env::var_os("TAR_SPARSE").is_some()));
    for path in args {
        ar.append_path(&path)?;
    }
    ar.finish()
}
