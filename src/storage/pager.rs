//! # Pager
//!
//! The pager owns the data file and its `.del` free-list sidecar. It hands
//! out logical pages: fixed-size records addressed by a `u64` id that maps
//! to byte offset `id * SLOT_SIZE`.
//!
//! ## Allocation
//!
//! `write` prefers the most recently freed page id (LIFO pop from the free
//! list) and only appends a new slot at the end of the file when the list is
//! empty. `delete` pushes an id onto the list and persists the sidecar, so
//! freed space survives reopen.
//!
//! ## Overwrite Semantics
//!
//! `write_to` re-writes a logical page in place. Before writing it runs the
//! delete-then-reclaim dance: the target id is appended to the free list and
//! persisted, then immediately dropped from the in-memory list. Re-writing a
//! page therefore never leaves a stale slot chain addressable as part of the
//! new record. The whole dance runs under one free-list critical section so
//! readers never observe the transient state.
//!
//! ## Chained Records
//!
//! Records longer than `PAGE_SIZE` span consecutive slots; each header names
//! the following slot id and the final header is `-1`. Consecutive slots can
//! collide with previously allocated pages, so chained writes are reserved
//! for callers that manage their own layout; the B-tree above always writes
//! single-slot records.
//!
//! ## Page Counting
//!
//! `count` derives the page count from the file size and caches it,
//! recomputing when the cache is older than the analyze interval (default
//! 10 minutes) or after an explicit `analyze`. `page_total` is the uncached
//! variant for callers that need the current end of file.
//!
//! ## Thread Safety
//!
//! All methods take `&self`. The free list and the count cache sit behind
//! mutexes; slot I/O uses positioned reads and writes on a shared
//! descriptor, which the OS keeps atomic relative to each other.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use eyre::{ensure, Result, WrapErr};
use log::debug;
use parking_lot::Mutex;

use super::{FreeList, FREE_LIST_EXTENSION, HEADER_SIZE, PAGE_SIZE, SLOT_SIZE};

/// Default interval between size-derived page-count refreshes.
pub const DEFAULT_ANALYZE_INTERVAL: Duration = Duration::from_secs(600);

#[derive(Debug)]
struct CountCache {
    pages: u64,
    refreshed: Option<Instant>,
    interval: Duration,
}

/// Manages logical pages in a data file plus the free-list sidecar.
#[derive(Debug)]
pub struct Pager {
    file: File,
    path: PathBuf,
    free: Mutex<FreeList>,
    count: Mutex<CountCache>,
}

impl Pager {
    /// Opens (creating if missing) the data file at `path` and its sidecar
    /// `<path>.del`, loading the persisted free list.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        Self::open_with(&options, path)
    }

    /// Opens the data file with caller-supplied options. The sidecar is
    /// always opened read-write and created if missing.
    pub fn open_with<P: AsRef<Path>>(options: &OpenOptions, path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = options
            .open(&path)
            .wrap_err_with(|| format!("failed to open data file '{}'", path.display()))?;

        let mut sidecar_path = path.clone().into_os_string();
        sidecar_path.push(".");
        sidecar_path.push(FREE_LIST_EXTENSION);
        let sidecar = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&sidecar_path)
            .wrap_err_with(|| {
                format!(
                    "failed to open free-list file '{}'",
                    PathBuf::from(&sidecar_path).display()
                )
            })?;

        let free = FreeList::load(sidecar)?;

        Ok(Self {
            file,
            path,
            free: Mutex::new(free),
            count: Mutex::new(CountCache {
                pages: 0,
                refreshed: None,
                interval: DEFAULT_ANALYZE_INTERVAL,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `data` to the next available logical page and returns its id.
    /// A freed page is reused (most recently freed first) before the file
    /// grows.
    pub fn write(&self, data: &[u8]) -> Result<u64> {
        let reused = self.free.lock().pop();
        let id = match reused {
            Some(id) => {
                debug!("reusing freed page {id}");
                id
            }
            None => self.page_total()?,
        };

        self.write_to(id, data)?;
        Ok(id)
    }

    /// Overwrites logical page `id` with `data`, chaining across consecutive
    /// slots when `data` exceeds `PAGE_SIZE`.
    pub fn write_to(&self, id: u64, data: &[u8]) -> Result<()> {
        {
            // Delete-then-reclaim: persisting the deletion severs any chain
            // previously rooted at `id`; the id is then taken straight back
            // for this write.
            let mut free = self.free.lock();
            free.push(id);
            free.persist()?;
            free.remove(id);
        }

        let chunk_count = data.len().div_ceil(PAGE_SIZE).max(1);
        let mut chunks = data.chunks(PAGE_SIZE);
        let mut slot = vec![0u8; SLOT_SIZE];

        for index in 0..chunk_count {
            let chunk = chunks.next().unwrap_or(&[]);
            let next: i64 = if index + 1 == chunk_count {
                -1
            } else {
                (id + index as u64 + 1) as i64
            };

            slot.fill(0);
            let header = next.to_string();
            slot[..header.len()].copy_from_slice(header.as_bytes());
            slot[HEADER_SIZE..HEADER_SIZE + chunk.len()].copy_from_slice(chunk);

            let offset = (id + index as u64) * SLOT_SIZE as u64;
            self.file
                .write_all_at(&slot, offset)
                .wrap_err_with(|| format!("failed to write page {}", id + index as u64))?;
        }

        Ok(())
    }

    /// Reads the logical record rooted at `id`, following the slot chain.
    /// Returns an empty buffer when `id` is on the free list. Payload
    /// padding is not trimmed.
    pub fn get(&self, id: u64) -> Result<Vec<u8>> {
        if self.free.lock().contains(id) {
            return Ok(Vec::new());
        }

        let mut slot = vec![0u8; SLOT_SIZE];
        self.file
            .read_exact_at(&mut slot, id * SLOT_SIZE as u64)
            .wrap_err_with(|| format!("failed to read page {id}"))?;

        let mut result = Vec::with_capacity(PAGE_SIZE);
        result.extend_from_slice(&slot[HEADER_SIZE..]);
        let mut next = parse_header(&slot[..HEADER_SIZE])
            .wrap_err_with(|| format!("failed to parse header of page {id}"))?;

        // Continuation slots are read leniently: a truncated or unparsable
        // slot ends the chain with whatever has been gathered so far.
        while next != -1 {
            if self
                .file
                .read_exact_at(&mut slot, next as u64 * SLOT_SIZE as u64)
                .is_err()
            {
                break;
            }
            result.extend_from_slice(&slot[HEADER_SIZE..]);
            match parse_header(&slot[..HEADER_SIZE]) {
                Ok(n) => next = n,
                Err(_) => break,
            }
        }

        Ok(result)
    }

    /// Appends `id` to the free list and persists the sidecar.
    pub fn delete(&self, id: u64) -> Result<()> {
        debug!("freeing page {id}");
        let mut free = self.free.lock();
        free.push(id);
        free.persist()
    }

    /// Snapshot of the free-page list, most recently freed last.
    pub fn free_pages(&self) -> Vec<u64> {
        self.free.lock().snapshot()
    }

    /// Size-derived page count, bypassing the cache.
    pub fn page_total(&self) -> Result<u64> {
        let len = self
            .file
            .metadata()
            .wrap_err_with(|| format!("failed to stat data file '{}'", self.path.display()))?
            .len();
        Ok(len / SLOT_SIZE as u64)
    }

    /// Forces a recomputation of the cached page count.
    pub fn analyze(&self) -> Result<()> {
        let pages = self.page_total()?;
        let mut count = self.count.lock();
        count.pages = pages;
        count.refreshed = Some(Instant::now());
        Ok(())
    }

    /// Cached page count. Recomputed when the cache is cold or older than
    /// the analyze interval.
    pub fn count(&self) -> Result<u64> {
        let stale = {
            let count = self.count.lock();
            match count.refreshed {
                None => true,
                Some(at) => at.elapsed() > count.interval,
            }
        };

        if stale {
            self.analyze()?;
        }

        Ok(self.count.lock().pages)
    }

    /// Changes how long the cached page count stays fresh.
    pub fn set_analyze_interval(&self, interval: Duration) {
        self.count.lock().interval = interval;
    }

    /// Persists the free list and flushes the data file.
    pub fn sync(&self) -> Result<()> {
        self.free.lock().persist()?;
        self.file
            .sync_all()
            .wrap_err_with(|| format!("failed to sync data file '{}'", self.path.display()))
    }
}

impl Drop for Pager {
    fn drop(&mut self) {
        // Best effort: the sidecar is already persisted on every mutation.
        let _ = self.free.lock().persist();
    }
}

/// Parses a slot header: ASCII decimal next-slot id, zero padded.
fn parse_header(header: &[u8]) -> Result<i64> {
    let start = header.iter().position(|&b| b != 0).unwrap_or(header.len());
    let end = header.iter().rposition(|&b| b != 0).map_or(start, |p| p + 1);
    let text = std::str::from_utf8(&header[start..end]).wrap_err("page header is not valid ASCII")?;
    ensure!(!text.is_empty(), "page header is empty");
    text.parse::<i64>()
        .wrap_err_with(|| format!("page header '{text}' is not a slot id"))
}
