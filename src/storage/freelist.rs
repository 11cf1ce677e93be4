//! # Free-List Persistence
//!
//! The pager keeps deleted page ids in an in-memory LIFO list mirrored to a
//! `.del` sidecar file. The sidecar holds a single line of comma-separated
//! decimal ids, enclosed in square brackets:
//!
//! ```text
//! [12,7,3]
//! ```
//!
//! Both the bracketed and the bare form are accepted on read; entries that
//! fail to parse are skipped silently. The file is rewritten in full
//! (truncate + positioned write) on every mutation, so its on-disk state
//! always reflects the last persisted list.

use std::fs::File;
use std::os::unix::fs::FileExt;

use eyre::{Result, WrapErr};

/// In-memory free-page list backed by the sidecar file.
#[derive(Debug)]
pub struct FreeList {
    file: File,
    pages: Vec<u64>,
}

impl FreeList {
    /// Loads the persisted list from an open sidecar file.
    pub fn load(file: File) -> Result<Self> {
        let len = file
            .metadata()
            .wrap_err("failed to stat free-list file")?
            .len();
        let mut data = vec![0u8; len as usize];
        file.read_exact_at(&mut data, 0)
            .wrap_err("failed to read free-list file")?;

        let pages = parse(&data);
        Ok(Self { file, pages })
    }

    /// Appends a page id to the list. Does not persist.
    pub fn push(&mut self, page: u64) {
        self.pages.push(page);
    }

    /// Pops the most recently freed page id (LIFO). Does not persist.
    pub fn pop(&mut self) -> Option<u64> {
        self.pages.pop()
    }

    /// Drops every occurrence of `page` from the in-memory list.
    pub fn remove(&mut self, page: u64) {
        self.pages.retain(|&p| p != page);
    }

    pub fn contains(&self, page: u64) -> bool {
        self.pages.contains(&page)
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn snapshot(&self) -> Vec<u64> {
        self.pages.clone()
    }

    /// Rewrites the sidecar with the current list.
    pub fn persist(&self) -> Result<()> {
        let rendered = format(&self.pages);
        self.file
            .set_len(0)
            .wrap_err("failed to truncate free-list file")?;
        self.file
            .write_all_at(rendered.as_bytes(), 0)
            .wrap_err("failed to write free-list file")?;
        Ok(())
    }
}

/// Parses the sidecar text form. Malformed entries are skipped.
fn parse(data: &[u8]) -> Vec<u64> {
    if data.is_empty() {
        return Vec::new();
    }

    let text = String::from_utf8_lossy(data);
    let trimmed = text
        .trim_start_matches('[')
        .trim_end_matches(']');

    trimmed
        .split(',')
        .filter_map(|entry| entry.parse::<u64>().ok())
        .collect()
}

/// Renders the bracketed comma-separated form written by the pager.
fn format(pages: &[u64]) -> String {
    let entries = pages
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("[{entries}]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_sidecar(contents: &[u8]) -> File {
        let dir = tempdir().unwrap();
        let path = dir.keep().join("tree.del");
        std::fs::write(&path, contents).unwrap();
        std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .unwrap()
    }

    #[test]
    fn parse_bracketed_form() {
        assert_eq!(parse(b"[1,2,3]"), vec![1, 2, 3]);
    }

    #[test]
    fn parse_bare_form() {
        assert_eq!(parse(b"4,5,6"), vec![4, 5, 6]);
    }

    #[test]
    fn parse_empty_file() {
        assert_eq!(parse(b""), Vec::<u64>::new());
    }

    #[test]
    fn parse_empty_brackets() {
        assert_eq!(parse(b"[]"), Vec::<u64>::new());
    }

    #[test]
    fn parse_skips_malformed_entries() {
        assert_eq!(parse(b"[1,x,3, 4,5]"), vec![1, 3, 5]);
    }

    #[test]
    fn format_matches_on_disk_form() {
        assert_eq!(format(&[12, 7, 3]), "[12,7,3]");
        assert_eq!(format(&[]), "[]");
    }

    #[test]
    fn load_reads_persisted_list() {
        let file = open_sidecar(b"[9,8,7]");

        let list = FreeList::load(file).unwrap();

        assert_eq!(list.snapshot(), vec![9, 8, 7]);
    }

    #[test]
    fn pop_is_lifo() {
        let file = open_sidecar(b"");
        let mut list = FreeList::load(file).unwrap();

        list.push(1);
        list.push(2);

        assert_eq!(list.pop(), Some(2));
        assert_eq!(list.pop(), Some(1));
        assert_eq!(list.pop(), None);
    }

    #[test]
    fn remove_drops_every_occurrence() {
        let file = open_sidecar(b"[5,6,5]");
        let mut list = FreeList::load(file).unwrap();

        list.remove(5);

        assert_eq!(list.snapshot(), vec![6]);
    }

    #[test]
    fn persist_round_trips_through_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tree.del");
        std::fs::write(&path, b"").unwrap();
        let open = || {
            std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
                .unwrap()
        };

        let mut list = FreeList::load(open()).unwrap();
        list.push(3);
        list.push(11);
        list.persist().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[3,11]");
        let reloaded = FreeList::load(open()).unwrap();
        assert_eq!(reloaded.snapshot(), vec![3, 11]);
    }

    #[test]
    fn persist_shrinks_the_sidecar() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tree.del");
        std::fs::write(&path, b"[100,200,300]").unwrap();
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();
        let mut list = FreeList::load(file).unwrap();

        list.pop();
        list.pop();
        list.persist().unwrap();

        // A shorter list must not leave stale bytes behind the rewrite.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[100]");
    }
}
