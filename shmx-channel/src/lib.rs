//! # shmx-channel
//!
//! Bidirectional, lock-free, single-producer/single-consumer packet channel
//! over a file-backed shared memory region.
//!
//! Two cooperating processes attach to the same backing file — one as
//! [`Role::Master`] (creator and initializer), one as [`Role::Slave`]
//! (attacher) — and exchange length-delimited packets over two independent
//! rings, one per direction. The data path needs no OS synchronization
//! primitives: each shared control field has exactly one writer, and
//! publication is a release store paired with an acquire load.
//!
//! Reads and writes never block. A write that does not fit is dropped and
//! counted ([`ChannelStats::pkt_lost`]); a read from an empty ring returns
//! zero bytes. There is no built-in wake-up mechanism: callers poll, or
//! interpose a side channel such as an eventfd for notification.
//!
//! ```no_run
//! use shmx_channel::Endpoint;
//!
//! # fn main() -> shmx_channel::Result<()> {
//! let mut master = Endpoint::master("/tmp/shmx-demo")?;
//! let mut slave = Endpoint::slave("/tmp/shmx-demo")?;
//!
//! slave.write(b"hello")?;
//! let mut buf = [0u8; 64];
//! let n = master.read(&mut buf)?;
//! assert_eq!(&buf[..n], b"hello");
//! # Ok(())
//! # }
//! ```

pub mod endpoint;
pub mod error;
pub mod layout;
mod ring;
mod shm;

pub use endpoint::{ChannelStats, Endpoint, Role};
pub use error::{ChannelError, Result};
pub use layout::{Config, DEFAULT_RING_STRIDE, MAX_PACKET_LEN};
