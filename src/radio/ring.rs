//! Fixed three-slot receive ring.
//!
//! The interrupt side fills the slot at `next_w` and, once the frame checks
//! out, advances `next_w` and takes one from `num_free`. The main line reads
//! the slot at `next_r`, advances `next_r` and only then gives the slot back
//! by incrementing `num_free`. That increment is the one place both sides
//! write the same field, so it runs inside a critical section.
//!
//! The ring is empty when `num_free == RX_BUFFER_NUM` and full when it is 0.

use crate::consts::{
    RADIO_MAX_PACKET_LEN_USIZE, RX_BUFFER_NUM, RX_SLOT_LEN, RX_STATUS_CRC_OK,
};

/// One received frame as stored by the transceiver: `[len][payload][rssi][lqi|crc_ok]`.
pub type RxSlot = [u8; RX_SLOT_LEN];

/// Receive ring bookkeeping plus the slot storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxRing {
    slots: [RxSlot; RX_BUFFER_NUM as usize],
    next_w: u8,
    next_r: u8,
    num_free: u8,
}

impl Default for RxRing {
    fn default() -> Self {
        Self::new()
    }
}

impl RxRing {
    /// Creates an empty ring.
    pub const fn new() -> Self {
        Self {
            slots: [[0; RX_SLOT_LEN]; RX_BUFFER_NUM as usize],
            next_w: 0,
            next_r: 0,
            num_free: RX_BUFFER_NUM,
        }
    }

    /// Drops all frames and rewinds both indices.
    pub fn reset(&mut self) {
        self.next_w = 0;
        self.next_r = 0;
        self.num_free = RX_BUFFER_NUM;
    }

    /// Free slot count, in `[0, RX_BUFFER_NUM]`.
    pub fn num_free(&self) -> u8 {
        self.num_free
    }

    /// Index of the slot the next frame will be written to.
    pub fn next_w(&self) -> u8 {
        self.next_w
    }

    /// Index of the slot the next frame will be read from.
    pub fn next_r(&self) -> u8 {
        self.next_r
    }

    /// Whether no frame is waiting.
    pub fn is_empty(&self) -> bool {
        self.num_free == RX_BUFFER_NUM
    }

    /// Whether no slot is free for the receiver.
    pub fn is_full(&self) -> bool {
        self.num_free == 0
    }

    /// Validates a filled slot.
    ///
    /// # Returns
    /// The payload length when the length byte fits the configured packet
    /// length and the CRC-ok bit of the trailing status byte is set.
    pub fn frame_len(slot: &RxSlot) -> Option<usize> {
        let len = usize::from(slot[0]);
        (len <= RADIO_MAX_PACKET_LEN_USIZE && slot[len + 2] & RX_STATUS_CRC_OK != 0).then_some(len)
    }

    /// The slot the receiver fills next.
    pub fn write_slot(&mut self) -> &mut RxSlot {
        &mut self.slots[usize::from(self.next_w)]
    }

    /// Accepts the frame in the write slot.
    ///
    /// # Returns
    /// `false` without touching the ring when no slot was free.
    pub fn commit_write(&mut self) -> bool {
        if self.num_free == 0 {
            return false;
        }
        self.next_w = Self::advance(self.next_w);
        self.num_free -= 1;
        true
    }

    /// The oldest unread frame, if any.
    pub fn read_slot(&self) -> Option<&RxSlot> {
        (!self.is_empty()).then(|| &self.slots[usize::from(self.next_r)])
    }

    /// Gives the slot returned by [`RxRing::read_slot`] back to the receiver.
    /// Call only after the frame has been copied out.
    ///
    /// # Returns
    /// The free count before the release; `0` means the receiver had stalled
    /// on a full ring and must be re-armed.
    pub fn release_read(&mut self) -> u8 {
        if self.is_empty() {
            return self.num_free;
        }
        self.next_r = Self::advance(self.next_r);
        critical_section::with(|_| {
            let prev = self.num_free;
            self.num_free += 1;
            prev
        })
    }

    /// Discards every unread frame.
    ///
    /// # Returns
    /// The free count before the flush.
    pub fn flush(&mut self) -> u8 {
        critical_section::with(|_| {
            let prev = self.num_free;
            self.num_free = RX_BUFFER_NUM;
            self.next_r = self.next_w;
            prev
        })
    }

    fn advance(index: u8) -> u8 {
        if index + 1 == RX_BUFFER_NUM { 0 } else { index + 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(ring: &mut RxRing, payload: &[u8], crc_ok: bool) {
        let slot = ring.write_slot();
        slot[0] = payload.len() as u8;
        slot[1..=payload.len()].copy_from_slice(payload);
        slot[payload.len() + 1] = 0x20;
        slot[payload.len() + 2] = if crc_ok { 0x80 | 0x30 } else { 0x30 };
    }

    #[test]
    fn test_new_ring_is_empty() {
        let ring = RxRing::new();
        assert!(ring.is_empty());
        assert_eq!(ring.num_free(), RX_BUFFER_NUM);
        assert!(ring.read_slot().is_none());
    }

    #[test]
    fn test_frame_validation() {
        let mut ring = RxRing::new();
        fill(&mut ring, &[1, 2, 3], true);
        assert_eq!(RxRing::frame_len(ring.write_slot()), Some(3));
        fill(&mut ring, &[1, 2, 3], false);
        assert_eq!(RxRing::frame_len(ring.write_slot()), None);
        ring.write_slot()[0] = 126;
        assert_eq!(RxRing::frame_len(ring.write_slot()), None);
    }

    #[test]
    fn test_write_then_read_moves_indices() {
        let mut ring = RxRing::new();
        fill(&mut ring, &[0xaa; 10], true);
        assert!(ring.commit_write());
        assert_eq!(ring.num_free(), 2);
        assert_eq!(ring.next_w(), 1);

        let slot = ring.read_slot().copied();
        assert_eq!(slot.map(|s| s[0]), Some(10));
        assert_eq!(ring.release_read(), 2);
        assert_eq!(ring.num_free(), 3);
        assert_eq!(ring.next_r(), 1);
    }

    #[test]
    fn test_full_ring_refuses_writes() {
        let mut ring = RxRing::new();
        for _ in 0..RX_BUFFER_NUM {
            fill(&mut ring, &[1], true);
            assert!(ring.commit_write());
        }
        assert!(ring.is_full());
        assert!(!ring.commit_write());
        assert_eq!(ring.num_free(), 0);
        assert_eq!(ring.release_read(), 0);
        assert_eq!(ring.num_free(), 1);
    }

    #[test]
    fn test_indices_wrap() {
        let mut ring = RxRing::new();
        for i in 0..7u8 {
            fill(&mut ring, &[i], true);
            assert!(ring.commit_write());
            assert_eq!(ring.read_slot().map(|s| s[1]), Some(i));
            let _ = ring.release_read();
            assert!(ring.num_free() <= RX_BUFFER_NUM);
        }
        assert_eq!(ring.next_w(), 7 % RX_BUFFER_NUM);
        assert_eq!(ring.next_r(), ring.next_w());
    }

    #[test]
    fn test_release_on_empty_ring_is_noop() {
        let mut ring = RxRing::new();
        assert_eq!(ring.release_read(), RX_BUFFER_NUM);
        assert_eq!(ring.num_free(), RX_BUFFER_NUM);
        assert_eq!(ring.next_r(), 0);
    }

    #[test]
    fn test_flush_discards_frames() {
        let mut ring = RxRing::new();
        fill(&mut ring, &[1], true);
        let _ = ring.commit_write();
        fill(&mut ring, &[2], true);
        let _ = ring.commit_write();
        assert_eq!(ring.flush(), 1);
        assert!(ring.is_empty());
        assert_eq!(ring.next_r(), ring.next_w());
    }
}
