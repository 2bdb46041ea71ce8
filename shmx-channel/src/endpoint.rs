//! Channel endpoints: attach, detach, read, write, stats.
//!
//! An [`Endpoint`] is one side of a full-duplex channel over a file-backed
//! shared memory region. The Master creates and initializes the backing
//! file; the Slave attaches to it. Each side pairs the two rings in the
//! region as `rx` and `tx` with the directions swapped, so one side's
//! transmit ring is the other side's receive ring.

use std::fmt;
use std::path::Path;
use std::sync::atomic::Ordering;

use tracing::{debug, info, warn};

use crate::error::{ChannelError, Result};
use crate::layout::{
    CONFIG_FLAGS, CONFIG_SIZE, Config, DEFAULT_RING_STRIDE, FLAG_INITIALIZED, VERSION_MAJOR,
    VERSION_MINOR,
};
use crate::ring::Ring;
use crate::shm::SharedRegion;

/// Which side of the channel an endpoint is.
///
/// The Master creates and initializes the backing file and unlinks it on
/// detach; the Slave attaches to an existing file and leaves it in place.
/// The steady-state data path is fully symmetric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Creator and owner of the backing file.
    Master,
    /// Attacher to an existing backing file.
    Slave,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Master => write!(f, "master"),
            Self::Slave => write!(f, "slave"),
        }
    }
}

/// Snapshot of an endpoint's packet counters.
///
/// Values come from the locally cached side of each ring; taking a snapshot
/// touches no shared memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Packets read from the receive ring.
    pub pkt_read: u32,
    /// Packets written to the transmit ring.
    pub pkt_wrote: u32,
    /// Packets dropped on write (ring full or oversize payload).
    pub pkt_lost: u32,
}

struct Attached {
    role: Role,
    region: SharedRegion,
    rx: Ring,
    tx: Ring,
}

/// One side of a shared-memory packet channel.
///
/// Reads and writes never block: a write that does not fit returns `Ok(0)`
/// and counts the drop, a read from an empty ring returns `Ok(0)`. There is
/// no built-in wake-up mechanism; callers poll or interpose their own side
/// channel (an eventfd, a socket) for notification.
///
/// An endpoint is single-threaded by contract: one thread writes, the same
/// or another owns reads, but never two threads in the same operation on the
/// same endpoint without external mutual exclusion.
pub struct Endpoint {
    attached: Option<Attached>,
}

impl Endpoint {
    /// Creates a detached endpoint. Use [`attach`](Self::attach) to bind it
    /// to a backing file.
    #[must_use]
    pub fn new() -> Self {
        Self { attached: None }
    }

    /// Creates the backing file at `path` and returns an attached Master
    /// endpoint.
    ///
    /// # Errors
    /// See [`attach`](Self::attach).
    pub fn master(path: impl AsRef<Path>) -> Result<Self> {
        let mut endpoint = Self::new();
        endpoint.attach(Role::Master, path)?;
        Ok(endpoint)
    }

    /// Attaches to an existing backing file at `path` and returns an
    /// attached Slave endpoint.
    ///
    /// # Errors
    /// See [`attach`](Self::attach).
    pub fn slave(path: impl AsRef<Path>) -> Result<Self> {
        let mut endpoint = Self::new();
        endpoint.attach(Role::Slave, path)?;
        Ok(endpoint)
    }

    /// Attaches this endpoint to the backing file at `path`.
    ///
    /// The Master creates the file exclusively (mode 0600), writes the
    /// configuration header with flags clear, initializes both ring control
    /// blocks, flushes, and only then publishes the initialized flag. The
    /// Slave validates the protocol version before mapping and requires the
    /// initialized flag to be set. A failed attach leaves the endpoint
    /// detached and no partial state behind.
    ///
    /// # Errors
    /// Returns [`ChannelError::InUse`] if the endpoint is already attached;
    /// version, initialization, and OS failures per [`ChannelError`].
    pub fn attach(&mut self, role: Role, path: impl AsRef<Path>) -> Result<()> {
        if self.attached.is_some() {
            return Err(ChannelError::InUse);
        }

        let path = path.as_ref();
        let attached = match role {
            Role::Master => Self::attach_master(path)?,
            Role::Slave => Self::attach_slave(path)?,
        };

        info!(%role, path = %path.display(), "endpoint attached");
        self.attached = Some(attached);
        Ok(())
    }

    fn attach_master(path: &Path) -> Result<Attached> {
        let cfg = Config::new(DEFAULT_RING_STRIDE);
        let mut region = SharedRegion::create_exclusive(path, cfg.total_size())?;

        match Self::init_region(&mut region, &cfg) {
            Ok((rx, tx)) => Ok(Attached {
                role: Role::Master,
                region,
                rx,
                tx,
            }),
            Err(e) => {
                let _ = region.unlink();
                Err(e)
            }
        }
    }

    /// Lays out a fresh region: config header with flags clear, both ring
    /// control blocks, a flush, and only then the initialized flag. The flag
    /// store is the publication point; a Slave that observes it also
    /// observes consistent ring state.
    fn init_region(region: &mut SharedRegion, cfg: &Config) -> Result<(Ring, Ring)> {
        region.as_mut_slice()[..CONFIG_SIZE].copy_from_slice(&cfg.encode());

        let ring_a = cfg.ring_offset as usize;
        let ring_b = ring_a + cfg.ring_stride as usize;
        let rx = Ring::init(region, ring_a, cfg.const_size());
        let tx = Ring::init(region, ring_b, cfg.const_size());

        region.flush()?;
        region.store_u32(CONFIG_FLAGS, FLAG_INITIALIZED, Ordering::Release);
        Ok((rx, tx))
    }

    fn attach_slave(path: &Path) -> Result<Attached> {
        let (file, cfg) = SharedRegion::probe(path)?;
        if cfg.major != VERSION_MAJOR || cfg.minor != VERSION_MINOR {
            return Err(ChannelError::UnexpectedVersion {
                major: cfg.major,
                minor: cfg.minor,
            });
        }
        if cfg.ring_pairs != 1 {
            return Err(ChannelError::config_block(format!(
                "unsupported ring_pairs {}",
                cfg.ring_pairs
            )));
        }

        let region = SharedRegion::map_existing(file, path, cfg.total_size())?;
        if region.load_u32(CONFIG_FLAGS, Ordering::Acquire) & FLAG_INITIALIZED == 0 {
            return Err(ChannelError::FlagsNotInitialized);
        }

        // Directions swap relative to the Master: the ring the Master reads
        // is the one the Slave writes, and vice versa.
        let ring_a = cfg.ring_offset as usize;
        let ring_b = ring_a + cfg.ring_stride as usize;
        let tx = Ring::attach(&region, ring_a, cfg.const_size())?;
        let rx = Ring::attach(&region, ring_b, cfg.const_size())?;

        Ok(Attached {
            role: Role::Slave,
            region,
            rx,
            tx,
        })
    }

    /// Writes one packet to the transmit ring.
    ///
    /// Returns the payload length on success. Returns `Ok(0)` for an empty
    /// payload and for a full ring; the latter is a soft drop counted in
    /// [`ChannelStats::pkt_lost`].
    ///
    /// # Errors
    /// Returns [`ChannelError::NotInitialized`] when detached and
    /// [`ChannelError::TooBig`] for payloads over
    /// [`MAX_PACKET_LEN`](crate::layout::MAX_PACKET_LEN).
    pub fn write(&mut self, payload: &[u8]) -> Result<usize> {
        let att = self.attached.as_mut().ok_or(ChannelError::NotInitialized)?;
        att.tx.write_packet(&mut att.region, payload)
    }

    /// Reads the next packet from the receive ring into `buf`.
    ///
    /// Returns the payload length, or `Ok(0)` when the ring is empty.
    ///
    /// # Errors
    /// Returns [`ChannelError::NotInitialized`] when detached and
    /// [`ChannelError::ShortBuffer`] when `buf` cannot hold the next packet
    /// (which then stays in the ring).
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let att = self.attached.as_mut().ok_or(ChannelError::NotInitialized)?;
        att.rx.read_packet(&mut att.region, buf)
    }

    /// Local view of the packet counters; all zero when detached.
    #[must_use]
    pub fn stats(&self) -> ChannelStats {
        match &self.attached {
            None => ChannelStats::default(),
            Some(att) => ChannelStats {
                pkt_read: att.rx.r_pkt_read,
                pkt_wrote: att.tx.w_pkt_wrote,
                pkt_lost: att.tx.w_pkt_lost,
            },
        }
    }

    /// Detaches from the region: the Master unlinks the backing file, both
    /// sides unmap and close. A no-op on a detached endpoint.
    pub fn detach(&mut self) {
        let Some(att) = self.attached.take() else {
            return;
        };

        if att.role == Role::Master {
            if let Err(e) = att.region.unlink() {
                warn!(
                    path = %att.region.path().display(),
                    error = %e,
                    "failed to unlink backing file"
                );
            }
        }
        debug!(role = %att.role, path = %att.region.path().display(), "endpoint detached");
        // dropping the region unmaps and closes
    }

    /// Whether the endpoint is currently attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    /// Role of the endpoint while attached.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.attached.as_ref().map(|att| att.role)
    }

    /// Backing file path while attached.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.attached.as_ref().map(|att| att.region.path())
    }

    /// Usable payload bytes per ring while attached. At most one byte less
    /// than this can be in flight in one direction at a time.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.attached.as_ref().map(|att| att.tx.const_size() as usize)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.detach();
    }
}
