//! Binary layout of the shmx backing file.
//!
//! The file opens with a 16-byte versioned configuration header, followed by
//! two rings. Each ring is a 32-byte control block plus a payload area of
//! `ring_stride - 32` bytes. All multi-byte fields are little-endian.
//!
//! ```text
//! offset 0                 : configuration header (16 bytes)
//! offset 16                : ring A control block (32 B) + payload
//! offset 16 + ring_stride  : ring B control block (32 B) + payload
//! ```
//!
//! Within each ring, packets are framed as a 12-byte header (payload length
//! plus two reserved words) followed by the payload, and every frame
//! footprint is rounded up to a 4-byte boundary.

use crate::error::{ChannelError, Result};

/// Size of the configuration header at the start of the backing file.
pub const CONFIG_SIZE: usize = 16;

/// Size of the control block at the start of each ring.
pub const RING_CTRL_SIZE: usize = 32;

/// Size of the per-packet frame header (length word + two reserved words).
pub const PKT_HEADER_SIZE: usize = 12;

/// Maximum payload length of a single packet: one Ethernet frame plus a
/// VLAN tag.
pub const MAX_PACKET_LEN: usize = 65535 + 18;

/// Default byte size of one ring (control block + payload).
pub const DEFAULT_RING_STRIDE: u32 = 12 * 1024 * 1024;

/// Protocol major version.
pub const VERSION_MAJOR: u8 = 1;

/// Protocol minor version.
pub const VERSION_MINOR: u8 = 0;

/// Bit 0 of the config `flags` word, set by the Master once both ring
/// control blocks are in place. The Slave refuses to attach until it is set.
pub const FLAG_INITIALIZED: u32 = 1;

/// Byte offset of the `flags` word within the configuration header.
pub(crate) const CONFIG_FLAGS: usize = 12;

// Ring control block field offsets. The producer side owns the `W_*` fields,
// the consumer side owns the `R_*` fields; `CONST_SIZE` is write-once at
// initialization. Each field has exactly one writer.
pub(crate) const CTRL_CONST_SIZE: usize = 0;
pub(crate) const CTRL_W_INDEX: usize = 8;
pub(crate) const CTRL_W_PKT_WROTE: usize = 12;
pub(crate) const CTRL_W_PKT_LOST: usize = 16;
pub(crate) const CTRL_R_INDEX: usize = 24;
pub(crate) const CTRL_R_PKT_READ: usize = 28;

/// Rounds `n` up to the next multiple of 4.
#[inline(always)]
pub(crate) const fn round_up_4(n: u32) -> u32 {
    (n + 3) & !3
}

/// Decoded configuration header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Protocol major version.
    pub major: u8,
    /// Protocol minor version.
    pub minor: u8,
    /// Number of ring pairs in the region (currently always 1).
    pub ring_pairs: u8,
    /// Byte offset of the first ring.
    pub ring_offset: u32,
    /// Byte size of one ring (control block + payload).
    pub ring_stride: u32,
    /// Flag word; see [`FLAG_INITIALIZED`].
    pub flags: u32,
}

impl Config {
    /// Builds the header a Master writes for a fresh region: current
    /// protocol version, one ring pair, rings starting right after the
    /// header, flags clear.
    #[must_use]
    pub fn new(ring_stride: u32) -> Self {
        Self {
            major: VERSION_MAJOR,
            minor: VERSION_MINOR,
            ring_pairs: 1,
            ring_offset: CONFIG_SIZE as u32,
            ring_stride,
            flags: 0,
        }
    }

    /// Total byte size of a backing file described by this header.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.ring_offset as usize + 2 * self.ring_stride as usize
    }

    /// Usable payload bytes of one ring.
    #[must_use]
    pub fn const_size(&self) -> u32 {
        self.ring_stride - RING_CTRL_SIZE as u32
    }

    /// Encodes the header into its 16-byte wire form.
    #[must_use]
    pub fn encode(&self) -> [u8; CONFIG_SIZE] {
        let mut buf = [0u8; CONFIG_SIZE];
        buf[0] = self.major;
        buf[1] = self.minor;
        buf[2] = self.ring_pairs;
        // buf[3] reserved, stays zero
        buf[4..8].copy_from_slice(&self.ring_offset.to_le_bytes());
        buf[8..12].copy_from_slice(&self.ring_stride.to_le_bytes());
        buf[12..16].copy_from_slice(&self.flags.to_le_bytes());
        buf
    }

    /// Decodes a header from the first 16 bytes of a backing file.
    ///
    /// # Errors
    /// Returns [`ChannelError::ConfigBlock`] if fewer than 16 bytes are
    /// supplied.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < CONFIG_SIZE {
            return Err(ChannelError::config_block(format!(
                "config header is {} bytes, expected {CONFIG_SIZE}",
                bytes.len()
            )));
        }
        Ok(Self {
            major: bytes[0],
            minor: bytes[1],
            ring_pairs: bytes[2],
            ring_offset: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            ring_stride: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            flags: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_up_4() {
        assert_eq!(round_up_4(0), 0);
        assert_eq!(round_up_4(1), 4);
        assert_eq!(round_up_4(3), 4);
        assert_eq!(round_up_4(4), 4);
        assert_eq!(round_up_4(5), 8);
        assert_eq!(round_up_4(65553), 65556);
    }

    #[test]
    fn test_config_wire_layout() {
        let cfg = Config::new(DEFAULT_RING_STRIDE);
        let bytes = cfg.encode();

        assert_eq!(bytes[0], VERSION_MAJOR);
        assert_eq!(bytes[1], VERSION_MINOR);
        assert_eq!(bytes[2], 1);
        assert_eq!(bytes[3], 0);
        assert_eq!(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 16);
        assert_eq!(
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            DEFAULT_RING_STRIDE
        );
        assert_eq!(u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]), 0);
    }

    #[test]
    fn test_config_decode() {
        let cfg = Config::new(DEFAULT_RING_STRIDE);
        let decoded = Config::decode(&cfg.encode()).unwrap();
        assert_eq!(decoded, cfg);
    }

    #[test]
    fn test_config_decode_short_input() {
        let err = Config::decode(&[1, 0, 1]).unwrap_err();
        assert!(matches!(err, ChannelError::ConfigBlock { .. }));
    }

    #[test]
    fn test_config_sizes() {
        let cfg = Config::new(DEFAULT_RING_STRIDE);
        assert_eq!(cfg.total_size(), 16 + 2 * 12 * 1024 * 1024);
        assert_eq!(cfg.const_size(), DEFAULT_RING_STRIDE - 32);
        // payload areas keep 4-byte alignment across the wrap boundary
        assert_eq!(cfg.const_size() % 4, 0);
    }
}
