//! File-backed shared memory region.
//!
//! The Master creates the backing file and maps it read-write; the Slave
//! opens the same file, reads the configuration header while still unmapped,
//! and maps the size the header describes. Cross-process control fields are
//! accessed only through the aligned atomic accessors at the bottom of this
//! module; plain slice access is reserved for payload bytes and one-time
//! initialization before the region is published.

use std::fs::{self, File, OpenOptions};
use std::io::Read;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use memmap2::{MmapMut, MmapOptions};
use tracing::debug;

use crate::error::{ChannelError, Result};
use crate::layout::{CONFIG_SIZE, Config};

/// Backing file permissions: owner read/write only.
const REGION_MODE: u32 = 0o600;

/// A read-write shared memory mapping kept alive together with its file
/// handle.
///
/// Dropping the region unmaps and closes but never unlinks; removing the
/// path is a separate, explicit step so the creator can unlink before the
/// mapping goes away.
#[derive(Debug)]
pub(crate) struct SharedRegion {
    /// File handle kept alive to maintain the memory map validity.
    _file: File,
    mmap: MmapMut,
    path: PathBuf,
}

impl SharedRegion {
    /// Creates the backing file, failing if the path already exists, then
    /// sizes and maps it read-write with shared visibility.
    ///
    /// If sizing or mapping fails after the file was created, the path is
    /// unlinked again so a failed attach leaves nothing behind.
    pub(crate) fn create_exclusive(path: &Path, size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .mode(REGION_MODE)
            .open(path)?;

        let mapped = file
            .set_len(size as u64)
            .and_then(|()| unsafe { MmapOptions::new().map_mut(&file) });
        let mmap = match mapped {
            Ok(mmap) => mmap,
            Err(e) => {
                let _ = fs::remove_file(path);
                return Err(e.into());
            }
        };

        debug!(path = %path.display(), size, "created shared region");
        Ok(Self {
            _file: file,
            mmap,
            path: path.to_path_buf(),
        })
    }

    /// Opens an existing backing file and decodes its configuration header
    /// without mapping anything yet.
    ///
    /// # Errors
    /// Returns [`ChannelError::ConfigBlock`] if the file holds fewer than 16
    /// bytes; OS open and read failures pass through.
    pub(crate) fn probe(path: &Path) -> Result<(File, Config)> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut header = [0u8; CONFIG_SIZE];
        file.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ChannelError::config_block("short read of config header")
            } else {
                ChannelError::Io(e)
            }
        })?;
        let cfg = Config::decode(&header)?;
        Ok((file, cfg))
    }

    /// Maps `size` bytes of an already-opened backing file.
    ///
    /// # Errors
    /// Returns [`ChannelError::ConfigBlock`] if the file is shorter than
    /// `size`; a mapping past EOF would fault on first touch.
    pub(crate) fn map_existing(file: File, path: &Path, size: usize) -> Result<Self> {
        let file_len = file.metadata()?.len();
        if file_len < size as u64 {
            return Err(ChannelError::config_block(format!(
                "backing file is {file_len} bytes, config describes {size}"
            )));
        }
        let mmap = unsafe { MmapOptions::new().len(size).map_mut(&file)? };

        debug!(path = %path.display(), size, "mapped shared region");
        Ok(Self {
            _file: file,
            mmap,
            path: path.to_path_buf(),
        })
    }

    /// Removes the backing path. The mapping stays valid until drop.
    pub(crate) fn unlink(&self) -> Result<()> {
        fs::remove_file(&self.path)?;
        Ok(())
    }

    /// Flushes the mapping to the backing file (msync).
    pub(crate) fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    /// Atomic view of the 32-bit word at `offset`.
    ///
    /// Every shared control field is a single aligned u32; routing all
    /// cross-process loads and stores through an `AtomicU32` keeps the
    /// compiler from tearing or reordering them. The mapping is page-aligned,
    /// so 4-byte alignment follows from the offset.
    fn word(&self, offset: usize) -> &AtomicU32 {
        debug_assert!(offset + 4 <= self.mmap.len());
        debug_assert_eq!(offset % 4, 0);
        unsafe { &*(self.mmap.as_ptr().add(offset) as *const AtomicU32) }
    }

    /// Atomic little-endian load of the u32 at `offset`.
    #[inline]
    pub(crate) fn load_u32(&self, offset: usize, order: Ordering) -> u32 {
        u32::from_le(self.word(offset).load(order))
    }

    /// Atomic little-endian store of the u32 at `offset`.
    #[inline]
    pub(crate) fn store_u32(&self, offset: usize, value: u32, order: Ordering) {
        self.word(offset).store(value.to_le(), order);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::DEFAULT_RING_STRIDE;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_create_exclusive_rejects_existing_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("region");

        let _region = SharedRegion::create_exclusive(&path, 4096).unwrap();
        let err = SharedRegion::create_exclusive(&path, 4096).unwrap_err();
        match err {
            ChannelError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::AlreadyExists),
            other => panic!("expected IO error, got {other}"),
        }
    }

    #[test]
    fn test_probe_missing_file() {
        let dir = tempdir().unwrap();
        let err = SharedRegion::probe(&dir.path().join("nothing")).unwrap_err();
        assert!(matches!(err, ChannelError::Io(_)));
    }

    #[test]
    fn test_probe_short_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stub");
        fs::write(&path, b"tiny").unwrap();

        let err = SharedRegion::probe(&path).unwrap_err();
        assert!(matches!(err, ChannelError::ConfigBlock { .. }));
    }

    #[test]
    fn test_map_existing_rejects_short_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short");

        // valid header describing a region much larger than the file
        let cfg = Config::new(DEFAULT_RING_STRIDE);
        let mut file = File::create(&path).unwrap();
        file.write_all(&cfg.encode()).unwrap();
        drop(file);

        let (file, cfg) = SharedRegion::probe(&path).unwrap();
        let err = SharedRegion::map_existing(file, &path, cfg.total_size()).unwrap_err();
        assert!(matches!(err, ChannelError::ConfigBlock { .. }));
    }

    #[test]
    fn test_atomic_word_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("words");
        let region = SharedRegion::create_exclusive(&path, 4096).unwrap();

        region.store_u32(8, 0xDEAD_BEEF, Ordering::Release);
        assert_eq!(region.load_u32(8, Ordering::Acquire), 0xDEAD_BEEF);
        // bytes land little-endian in the backing store
        assert_eq!(region.as_slice()[8..12], [0xEF, 0xBE, 0xAD, 0xDE]);
    }

    #[test]
    fn test_unlink_removes_path_mapping_survives() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("unlinked");
        let mut region = SharedRegion::create_exclusive(&path, 4096).unwrap();

        region.unlink().unwrap();
        assert!(!path.exists());
        // mapping is still writable after the path is gone
        region.as_mut_slice()[0] = 0x42;
        assert_eq!(region.as_slice()[0], 0x42);
    }
}
