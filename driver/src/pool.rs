//! Transfer descriptor pool.
//!
//! Every chunk of a flush is described by one group of six descriptors:
//!
//! | slot | role               | kind       | payload                      |
//! |------|--------------------|------------|------------------------------|
//! | 0    | column address set | command    | `CASET`                      |
//! | 1    | column range       | short data | x1, x2 (big-endian)          |
//! | 2    | row address set    | command    | `RASET`                      |
//! | 3    | row range          | short data | chunk rows (big-endian)      |
//! | 4    | memory write       | command    | `RAMWR`                      |
//! | 5    | pixel data         | bulk data  | span of the caller's buffer  |
//!
//! The pool is a fixed arena indexed by (chunk, slot). Groups are reset and
//! repopulated for each flush, which is only allowed once the previous
//! flush's transfers have been reconciled: [`DescriptorPool::release`] must
//! be called before [`DescriptorPool::populate`] touches a slot again.

use crate::command::{CASET, RAMWR, RASET};
use crate::config::GROUP_LEN;
use crate::scheduler::Chunk;
use crate::window::{AddressWindow, range_bytes};

/// Data/command line level for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlotKind {
    /// Single command byte, D/C low
    Command,
    /// Up to four inline parameter bytes, D/C high
    ShortData,
    /// Reference into the pixel buffer, D/C high
    BulkData,
}

impl SlotKind {
    /// Level of the D/C line while this slot is on the bus.
    #[inline]
    pub const fn dc_high(self) -> bool { !matches!(self, Self::Command) }
}

/// Position of a slot inside its chunk's group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SlotRole {
    ColumnAddressSet = 0,
    ColumnRange = 1,
    RowAddressSet = 2,
    RowRange = 3,
    MemoryWrite = 4,
    PixelData = 5,
}

impl SlotRole {
    /// Roles in submission order.
    pub const ORDER: [Self; GROUP_LEN] = [
        Self::ColumnAddressSet,
        Self::ColumnRange,
        Self::RowAddressSet,
        Self::RowRange,
        Self::MemoryWrite,
        Self::PixelData,
    ];

    /// Transaction kind for this role.
    pub const fn kind(self) -> SlotKind {
        match self {
            Self::ColumnAddressSet | Self::RowAddressSet | Self::MemoryWrite => SlotKind::Command,
            Self::ColumnRange | Self::RowRange => SlotKind::ShortData,
            Self::PixelData => SlotKind::BulkData,
        }
    }
}

/// Pixel bytes referenced by a bulk slot.
///
/// Kept as a raw pointer and length: the bytes belong to the caller's draw
/// buffer, which is rendered into again once the slot has been reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelSpan {
    ptr: *const u8,
    len: usize,
}

// SAFETY: the span is only read through, and `Descriptor::bulk_unchecked`
// requires the bytes to stay valid until every copy has been executed.
unsafe impl Send for PixelSpan {}

impl PixelSpan {
    const fn new(pixels: &[u8]) -> Self {
        Self {
            ptr: pixels.as_ptr(),
            len: pixels.len(),
        }
    }

    #[inline]
    pub const fn len(&self) -> usize { self.len }

    #[inline]
    pub const fn is_empty(&self) -> bool { self.len == 0 }

    /// Start of the span, for identity checks only.
    #[inline]
    pub const fn as_ptr(&self) -> *const u8 { self.ptr }

    /// # Safety
    /// The buffer the span was taken from must be live and unwritten for
    /// as long as the returned slice is used.
    #[inline]
    pub(crate) unsafe fn as_slice<'a>(&self) -> &'a [u8] { unsafe { core::slice::from_raw_parts(self.ptr, self.len) } }
}

/// Bytes carried by a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// Inline bytes, `len` of them valid
    Inline { bytes: [u8; 4], len: u8 },
    /// Pixel bytes in the caller's buffer, read by the bus after the flush
    /// call returns
    Pixels(PixelSpan),
}

impl Payload {
    /// Inline bytes; empty for a pixel span.
    pub fn inline_bytes(&self) -> &[u8] {
        match self {
            Self::Inline { bytes, len } => &bytes[..*len as usize],
            Self::Pixels(_) => &[],
        }
    }

    /// The pixel span, if this payload references a buffer.
    #[inline]
    pub const fn pixels(&self) -> Option<PixelSpan> {
        match self {
            Self::Inline { .. } => None,
            Self::Pixels(span) => Some(*span),
        }
    }

    /// Payload length in bytes.
    pub const fn len(&self) -> usize {
        match self {
            Self::Inline { len, .. } => *len as usize,
            Self::Pixels(span) => span.len(),
        }
    }

    /// Whether the payload carries no bytes.
    #[inline]
    pub const fn is_empty(&self) -> bool { self.len() == 0 }
}

/// One transaction: a slot kind and its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub kind: SlotKind,
    pub payload: Payload,
}

impl Descriptor {
    /// Reset state: an empty command slot.
    pub const EMPTY: Self = Self {
        kind: SlotKind::Command,
        payload: Payload::Inline { bytes: [0; 4], len: 0 },
    };

    /// Single command byte.
    pub const fn command(cmd: u8) -> Self {
        Self {
            kind: SlotKind::Command,
            payload: Payload::Inline {
                bytes: [cmd, 0, 0, 0],
                len: 1,
            },
        }
    }

    /// Four parameter bytes.
    pub const fn short_data(bytes: [u8; 4]) -> Self {
        Self {
            kind: SlotKind::ShortData,
            payload: Payload::Inline { bytes, len: 4 },
        }
    }

    /// Pixel bytes from a buffer that is never written again.
    pub const fn bulk(pixels: &'static [u8]) -> Self {
        // SAFETY: a `'static` shared slice stays valid and unchanged
        unsafe { Self::bulk_unchecked(pixels) }
    }

    /// Pixel bytes borrowed from the caller's buffer without a lifetime.
    ///
    /// # Safety
    /// `pixels` must stay allocated and unwritten until every copy of the
    /// returned descriptor has been executed or discarded unexecuted.
    pub const unsafe fn bulk_unchecked(pixels: &[u8]) -> Self {
        Self {
            kind: SlotKind::BulkData,
            payload: Payload::Pixels(PixelSpan::new(pixels)),
        }
    }

    /// Command byte, if this is a command slot.
    pub fn command_byte(&self) -> Option<u8> {
        match (self.kind, self.payload) {
            (SlotKind::Command, Payload::Inline { bytes, len }) if len > 0 => Some(bytes[0]),
            _ => None,
        }
    }
}

impl Default for Descriptor {
    fn default() -> Self { Self::EMPTY }
}

/// One chunk's descriptors in submission order.
pub type DescriptorGroup = [Descriptor; GROUP_LEN];

/// Pool state between flushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PoolState {
    /// Slots may be repopulated
    Free,
    /// `groups` groups were handed to the engine and are not reconciled yet
    InFlight { groups: usize },
}

/// Fixed arena of `CHUNKS` descriptor groups.
pub struct DescriptorPool<const CHUNKS: usize> {
    groups: [DescriptorGroup; CHUNKS],
    state: PoolState,
}

impl<const CHUNKS: usize> DescriptorPool<CHUNKS> {
    /// Create a pool with every slot reset.
    pub const fn new() -> Self {
        Self {
            groups: [[Descriptor::EMPTY; GROUP_LEN]; CHUNKS],
            state: PoolState::Free,
        }
    }

    /// Number of groups the pool holds.
    #[inline]
    pub const fn capacity(&self) -> usize { CHUNKS }

    /// Current state.
    #[inline]
    pub const fn state(&self) -> PoolState { self.state }

    /// Reset every slot and mark the pool reusable. Only valid once the
    /// reconciler has drained every transfer of the previous flush.
    ///
    /// After this no slot refers to a caller buffer any more.
    pub fn release(&mut self) {
        self.groups = [[Descriptor::EMPTY; GROUP_LEN]; CHUNKS];
        self.state = PoolState::Free;
    }

    /// Mark the first `groups` groups as handed to the engine.
    pub fn mark_in_flight(
        &mut self,
        groups: usize,
    ) {
        self.state = if groups == 0 {
            PoolState::Free
        } else {
            PoolState::InFlight { groups }
        };
    }

    /// Reset and fill the group for `chunk`.
    ///
    /// `window` is the biased window of the whole flush and `pixels` the
    /// caller's buffer; the pixel slot refers to `chunk`'s byte range of it.
    ///
    /// # Safety
    /// `pixels` must stay allocated and unwritten until the group has been
    /// executed and [`release`](Self::release) has run.
    ///
    /// # Panics
    /// If the pool is still in flight or `chunk.index` is out of range.
    /// The scheduler checks both before calling.
    pub unsafe fn populate(
        &mut self,
        chunk: &Chunk,
        window: &AddressWindow,
        pixels: &[u8],
    ) -> &DescriptorGroup {
        assert_eq!(self.state, PoolState::Free, "descriptor slots reused before reconcile");

        let group = &mut self.groups[chunk.index];
        *group = [Descriptor::EMPTY; GROUP_LEN];

        group[SlotRole::ColumnAddressSet as usize] = Descriptor::command(CASET);
        group[SlotRole::ColumnRange as usize] = Descriptor::short_data(window.column_bytes());
        group[SlotRole::RowAddressSet as usize] = Descriptor::command(RASET);
        group[SlotRole::RowRange as usize] = Descriptor::short_data(range_bytes(chunk.row_start, chunk.row_end));
        group[SlotRole::MemoryWrite as usize] = Descriptor::command(RAMWR);
        // SAFETY: forwarded to the caller
        group[SlotRole::PixelData as usize] = unsafe { Descriptor::bulk_unchecked(&pixels[chunk.byte_range()]) };

        group
    }

    /// Group `index` as last populated.
    pub fn group(
        &self,
        index: usize,
    ) -> Option<&DescriptorGroup> {
        self.groups.get(index)
    }
}

impl<const CHUNKS: usize> Default for DescriptorPool<CHUNKS> {
    fn default() -> Self { Self::new() }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn leak(len: usize) -> &'static [u8] {
        let bytes: Vec<u8> = (0..len).map(|i| i as u8).collect();
        Box::leak(bytes.into_boxed_slice())
    }

    fn chunk(
        index: usize,
        row_start: u16,
        row_end: u16,
        byte_offset: usize,
        byte_len: usize,
    ) -> Chunk {
        Chunk {
            index,
            row_start,
            row_end,
            byte_offset,
            byte_len,
        }
    }

    #[test]
    fn test_role_kinds_follow_group_layout() {
        let kinds: Vec<SlotKind> = SlotRole::ORDER.iter().map(|r| r.kind()).collect();
        assert_eq!(
            kinds,
            [
                SlotKind::Command,
                SlotKind::ShortData,
                SlotKind::Command,
                SlotKind::ShortData,
                SlotKind::Command,
                SlotKind::BulkData,
            ]
        );
        for (i, role) in SlotRole::ORDER.iter().enumerate() {
            assert_eq!(*role as usize, i);
        }
    }

    #[test]
    fn test_dc_level_per_kind() {
        assert!(!SlotKind::Command.dc_high());
        assert!(SlotKind::ShortData.dc_high());
        assert!(SlotKind::BulkData.dc_high());
    }

    #[test]
    fn test_populate_group() {
        let pixels = leak(4 * 2 * 3);
        let window = AddressWindow::new(0x10, 0x13, 0x100, 0x102).unwrap();
        let mut pool: DescriptorPool<2> = DescriptorPool::new();

        let group = *unsafe { pool.populate(&chunk(1, 0x101, 0x102, 8, 16), &window, pixels) };

        assert_eq!(group[0].command_byte(), Some(CASET));
        assert_eq!(group[1].payload.inline_bytes(), &[0x00, 0x10, 0x00, 0x13]);
        assert_eq!(group[2].command_byte(), Some(RASET));
        assert_eq!(group[3].payload.inline_bytes(), &[0x01, 0x01, 0x01, 0x02]);
        assert_eq!(group[4].command_byte(), Some(RAMWR));
        assert_eq!(group[5].kind, SlotKind::BulkData);
        assert_eq!(group[5].payload.pixels(), Some(PixelSpan::new(&pixels[8..24])));
        assert!(group[5].payload.inline_bytes().is_empty());
        assert_eq!(pool.group(1), Some(&group));
    }

    #[test]
    fn test_bulk_slot_borrows_without_copy() {
        let pixels = leak(32);
        let window = AddressWindow::new(0, 3, 0, 3).unwrap();
        let mut pool: DescriptorPool<1> = DescriptorPool::new();

        let group = unsafe { pool.populate(&chunk(0, 0, 3, 0, 32), &window, pixels) };
        let Payload::Pixels(span) = group[5].payload else {
            panic!("pixel slot must borrow the buffer");
        };
        assert_eq!(span.as_ptr(), pixels.as_ptr());
        assert_eq!(span.len(), 32);
        assert_eq!(unsafe { span.as_slice() }, pixels);
    }

    #[test]
    fn test_release_clears_groups() {
        let pixels = leak(16);
        let window = AddressWindow::new(0, 1, 0, 3).unwrap();
        let mut pool: DescriptorPool<2> = DescriptorPool::new();
        unsafe {
            pool.populate(&chunk(0, 0, 1, 0, 8), &window, pixels);
            pool.populate(&chunk(1, 2, 3, 8, 8), &window, pixels);
        }
        pool.mark_in_flight(2);

        pool.release();

        assert_eq!(pool.state(), PoolState::Free);
        for index in 0..2 {
            let group = pool.group(index).unwrap();
            assert!(group.iter().all(|d| *d == Descriptor::EMPTY));
            assert!(group.iter().all(|d| d.payload.pixels().is_none()));
        }
    }

    #[test]
    #[should_panic(expected = "reused before reconcile")]
    fn test_populate_while_in_flight_panics() {
        let pixels = leak(8);
        let window = AddressWindow::new(0, 3, 0, 0).unwrap();
        let mut pool: DescriptorPool<1> = DescriptorPool::new();
        pool.mark_in_flight(1);
        unsafe { pool.populate(&chunk(0, 0, 0, 0, 8), &window, pixels) };
    }

    #[test]
    fn test_pool_state_transitions() {
        let mut pool: DescriptorPool<3> = DescriptorPool::default();
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.state(), PoolState::Free);

        pool.mark_in_flight(2);
        assert_eq!(pool.state(), PoolState::InFlight { groups: 2 });

        pool.release();
        assert_eq!(pool.state(), PoolState::Free);

        pool.mark_in_flight(0);
        assert_eq!(pool.state(), PoolState::Free);
    }

    #[test]
    fn test_descriptor_constructors() {
        assert_eq!(Descriptor::command(0x2C).payload.len(), 1);
        assert_eq!(Descriptor::short_data([1, 2, 3, 4]).payload.len(), 4);
        assert!(Descriptor::EMPTY.payload.is_empty());
        assert_eq!(Descriptor::EMPTY.command_byte(), None);
        assert_eq!(Descriptor::short_data([0x2A, 0, 0, 0]).command_byte(), None);

        static PIXELS: [u8; 3] = [7, 8, 9];
        let bulk = Descriptor::bulk(&PIXELS);
        assert_eq!(bulk.payload.len(), 3);
        assert_eq!(bulk.command_byte(), None);
        assert!(bulk.payload.inline_bytes().is_empty());
    }
}
