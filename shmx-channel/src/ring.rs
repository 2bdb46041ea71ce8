//! Single-producer/single-consumer packet ring.
//!
//! Each ring is a 32-byte control block followed by a payload area of
//! `const_size` bytes. Exactly one process writes the producer fields
//! (`w_index`, `w_pkt_wrote`, `w_pkt_lost`) and exactly one process writes
//! the consumer fields (`r_index`, `r_pkt_read`); that single-writer
//! partitioning is what makes the ring lock-free.
//!
//! Packets occupy a 4-byte-aligned footprint and may wrap around the end of
//! the payload area. `w_index == r_index` means empty, so at most
//! `const_size - 1` bytes can be in flight at once.

use std::sync::atomic::Ordering;

use tracing::error;

use crate::error::{ChannelError, Result};
use crate::layout::{
    CTRL_CONST_SIZE, CTRL_R_INDEX, CTRL_R_PKT_READ, CTRL_W_INDEX, CTRL_W_PKT_LOST,
    CTRL_W_PKT_WROTE, MAX_PACKET_LEN, PKT_HEADER_SIZE, RING_CTRL_SIZE, round_up_4,
};
use crate::shm::SharedRegion;

/// Cached view of one ring's control block plus the offsets needed to
/// address it inside the shared region.
///
/// The `w_*` fields are authoritative on the producing side and refreshed
/// from shared memory on the consuming side; the `r_*` fields the other way
/// around.
#[derive(Debug)]
pub(crate) struct Ring {
    /// Offset of the control block within the region.
    cb: usize,
    /// Offset of the payload area (`cb + RING_CTRL_SIZE`).
    base: usize,
    /// Payload bytes available in this ring.
    const_size: u32,
    w_index: u32,
    pub(crate) w_pkt_wrote: u32,
    pub(crate) w_pkt_lost: u32,
    r_index: u32,
    pub(crate) r_pkt_read: u32,
}

impl Ring {
    /// Initializes a ring control block in a fresh region and returns the
    /// zeroed cached view. Master side only; runs before the region is
    /// published to the peer.
    pub(crate) fn init(region: &mut SharedRegion, cb: usize, const_size: u32) -> Self {
        let ctrl = &mut region.as_mut_slice()[cb..cb + RING_CTRL_SIZE];
        ctrl.fill(0);
        ctrl[..4].copy_from_slice(&const_size.to_le_bytes());

        Self {
            cb,
            base: cb + RING_CTRL_SIZE,
            const_size,
            w_index: 0,
            w_pkt_wrote: 0,
            w_pkt_lost: 0,
            r_index: 0,
            r_pkt_read: 0,
        }
    }

    /// Attaches to a ring initialized by the peer, seeding the cache from
    /// the shared control block.
    ///
    /// # Errors
    /// Returns [`ChannelError::ConfigBlock`] if the recorded payload size
    /// does not match the configured ring stride.
    pub(crate) fn attach(region: &SharedRegion, cb: usize, expect_const_size: u32) -> Result<Self> {
        let const_size = region.load_u32(cb + CTRL_CONST_SIZE, Ordering::Relaxed);
        if const_size != expect_const_size {
            return Err(ChannelError::config_block(format!(
                "ring at offset {cb} reports {const_size} payload bytes, expected {expect_const_size}"
            )));
        }

        Ok(Self {
            cb,
            base: cb + RING_CTRL_SIZE,
            const_size,
            w_index: region.load_u32(cb + CTRL_W_INDEX, Ordering::Acquire),
            w_pkt_wrote: region.load_u32(cb + CTRL_W_PKT_WROTE, Ordering::Acquire),
            w_pkt_lost: region.load_u32(cb + CTRL_W_PKT_LOST, Ordering::Relaxed),
            r_index: region.load_u32(cb + CTRL_R_INDEX, Ordering::Acquire),
            r_pkt_read: region.load_u32(cb + CTRL_R_PKT_READ, Ordering::Relaxed),
        })
    }

    /// Usable payload bytes of this ring.
    pub(crate) fn const_size(&self) -> u32 {
        self.const_size
    }

    /// Frames and writes one packet. Producer side.
    ///
    /// Returns the payload length on success. Returns `Ok(0)` for an empty
    /// input (no state change) and for a full ring (a soft drop, counted in
    /// `w_pkt_lost`).
    ///
    /// # Errors
    /// Returns [`ChannelError::TooBig`] if the payload exceeds
    /// [`MAX_PACKET_LEN`]; the drop is counted as lost.
    pub(crate) fn write_packet(&mut self, region: &mut SharedRegion, payload: &[u8]) -> Result<usize> {
        if payload.is_empty() {
            return Ok(0);
        }
        if payload.len() > MAX_PACKET_LEN {
            self.w_pkt_lost = self.w_pkt_lost.wrapping_add(1);
            region.store_u32(self.cb + CTRL_W_PKT_LOST, self.w_pkt_lost, Ordering::Release);
            return Err(ChannelError::too_big(payload.len(), MAX_PACKET_LEN));
        }

        self.r_index = region.load_u32(self.cb + CTRL_R_INDEX, Ordering::Acquire);
        let need = PKT_HEADER_SIZE as u32 + round_up_4(payload.len() as u32);
        if need >= self.free_space() {
            // Expected backpressure: count the drop, never log it.
            self.w_pkt_lost = self.w_pkt_lost.wrapping_add(1);
            region.store_u32(self.cb + CTRL_W_PKT_LOST, self.w_pkt_lost, Ordering::Release);
            return Ok(0);
        }

        let mut header = [0u8; PKT_HEADER_SIZE];
        header[..4].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        // header words 1 and 2 are reserved and stay zero
        self.put(region, &header);
        self.put(region, payload);

        self.w_index = round_up_4(self.w_index);
        if self.w_index >= self.const_size {
            self.w_index = 0;
        }
        self.w_pkt_wrote = self.w_pkt_wrote.wrapping_add(1);

        // Counters first, then the index: the release store on `w_index`
        // makes payload and counters visible no later than the index advance.
        region.store_u32(self.cb + CTRL_W_PKT_LOST, self.w_pkt_lost, Ordering::Relaxed);
        region.store_u32(self.cb + CTRL_W_PKT_WROTE, self.w_pkt_wrote, Ordering::Release);
        region.store_u32(self.cb + CTRL_W_INDEX, self.w_index, Ordering::Release);

        Ok(payload.len())
    }

    /// Reads the next packet into `buf`. Consumer side.
    ///
    /// Returns the payload length, or `Ok(0)` when the ring is empty.
    ///
    /// # Errors
    /// Returns [`ChannelError::ShortBuffer`] if `buf` cannot hold the next
    /// packet; the packet stays in the ring and the next read can retry.
    ///
    /// # Panics
    /// Panics on a corrupt frame header (nonzero reserved words or an
    /// impossible length). The shared state is unrecoverable at that point;
    /// release builds abort.
    pub(crate) fn read_packet(&mut self, region: &mut SharedRegion, buf: &mut [u8]) -> Result<usize> {
        self.w_pkt_wrote = region.load_u32(self.cb + CTRL_W_PKT_WROTE, Ordering::Acquire);
        self.w_pkt_lost = region.load_u32(self.cb + CTRL_W_PKT_LOST, Ordering::Relaxed);
        self.w_index = region.load_u32(self.cb + CTRL_W_INDEX, Ordering::Acquire);
        if self.w_pkt_wrote == self.r_pkt_read {
            return Ok(0);
        }

        // Peek the frame header without consuming, so a short destination
        // buffer leaves the packet readable.
        let len = self.get_u32(region, self.r_index) as usize;
        let tag = self.get_u32(region, self.wrap_add(self.r_index, 4));
        let rd = self.get_u32(region, self.wrap_add(self.r_index, 8));
        if tag != 0 || rd != 0 || len > MAX_PACKET_LEN {
            error!(
                len,
                tag,
                rd,
                r_index = self.r_index,
                "corrupt packet frame in shared ring"
            );
            panic!("corrupt packet frame: len={len} tag={tag:#x} rd={rd:#x}");
        }
        if buf.len() < len {
            return Err(ChannelError::short_buffer(len, buf.len()));
        }

        let payload_at = self.wrap_add(self.r_index, PKT_HEADER_SIZE as u32);
        self.get(region, payload_at, &mut buf[..len]);

        let mut next = round_up_4(self.wrap_add(payload_at, len as u32));
        if next >= self.const_size {
            next = 0;
        }
        self.r_index = next;
        self.r_pkt_read = self.r_pkt_read.wrapping_add(1);

        region.store_u32(self.cb + CTRL_R_PKT_READ, self.r_pkt_read, Ordering::Relaxed);
        region.store_u32(self.cb + CTRL_R_INDEX, self.r_index, Ordering::Release);

        Ok(len)
    }

    /// Free payload bytes as seen by the producer, against the most recently
    /// refreshed `r_index`.
    fn free_space(&self) -> u32 {
        if self.w_index >= self.r_index {
            self.const_size - (self.w_index - self.r_index)
        } else {
            self.r_index - self.w_index
        }
    }

    /// Adds `n` to a payload index, wrapping at `const_size`.
    #[inline]
    fn wrap_add(&self, index: u32, n: u32) -> u32 {
        let sum = index + n;
        if sum >= self.const_size {
            sum - self.const_size
        } else {
            sum
        }
    }

    /// Copies `bytes` into the payload area at the cached `w_index`,
    /// continuing at the start of the area past the end. At most one wrap;
    /// callers guarantee `bytes.len() < const_size`.
    fn put(&mut self, region: &mut SharedRegion, bytes: &[u8]) {
        let area = &mut region.as_mut_slice()[self.base..self.base + self.const_size as usize];
        let at = self.w_index as usize;

        let first = bytes.len().min(area.len() - at);
        area[at..at + first].copy_from_slice(&bytes[..first]);
        if first < bytes.len() {
            area[..bytes.len() - first].copy_from_slice(&bytes[first..]);
        }

        self.w_index = self.wrap_add(self.w_index, bytes.len() as u32);
    }

    /// Copies `out.len()` bytes from the payload area at `index` into `out`,
    /// with at most one wrap. Does not advance any index.
    fn get(&self, region: &SharedRegion, index: u32, out: &mut [u8]) {
        let area = &region.as_slice()[self.base..self.base + self.const_size as usize];
        let at = index as usize;

        let out_len = out.len();
        let first = out_len.min(area.len() - at);
        out[..first].copy_from_slice(&area[at..at + first]);
        if first < out_len {
            out[first..].copy_from_slice(&area[..out_len - first]);
        }
    }

    /// Little-endian u32 at a 4-aligned payload index. A header word never
    /// straddles the wrap because `const_size` is a multiple of 4.
    fn get_u32(&self, region: &SharedRegion, index: u32) -> u32 {
        let mut word = [0u8; 4];
        self.get(region, index, &mut word);
        u32::from_le_bytes(word)
    }
}
