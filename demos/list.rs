//! Lists the entries of an archive read from stdin.

use std::io::stdin;

use tarvfs::TarReader;

fn main() -> tarvfs::Result<()> {
    let mut ar = TarReader::new(stdin().lock());
    while let Some(entry) = ar.next_entry()? {
        let info = entry.info();
        let kind = if entry.is_hard_link() {
            "hardlink".to_string()
        } else {
            format!("{:?}", entry.file_type())
        };
        print!(
            "{:>10} {:o} {:>12} {}",
            kind,
            info.permissions(),
            entry.size(),
            entry.path()?.display()
        );
        if let Some(link) = entry.link_name()? {
            print!(" -> {}", link.display());
        }
        if entry.is_sparse() {
            print!(" (sparse, {} stored)", entry.sparse_map().data_size());
        }
        println!();
    }
    Ok(())
}
