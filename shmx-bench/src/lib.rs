//! # shmx-bench
//!
//! Benchmarking utilities for shmx performance testing.

use shmx_channel::{ChannelError, Endpoint, Result};
use tempfile::TempDir;

/// An attached Master/Slave pair over a fresh temporary backing file.
///
/// The temporary directory lives as long as the pair; dropping the pair
/// detaches both endpoints and removes the directory.
pub struct BenchPair {
    /// Creator side of the channel.
    pub master: Endpoint,
    /// Attacher side of the channel.
    pub slave: Endpoint,
    _dir: TempDir,
}

/// Builds an attached endpoint pair in a temporary directory.
///
/// # Errors
/// Propagates attach and tempdir failures.
pub fn attached_pair() -> Result<BenchPair> {
    let dir = tempfile::tempdir().map_err(ChannelError::from)?;
    let path = dir.path().join("bench-channel");
    let master = Endpoint::master(&path)?;
    let slave = Endpoint::slave(&path)?;
    Ok(BenchPair {
        master,
        slave,
        _dir: dir,
    })
}
