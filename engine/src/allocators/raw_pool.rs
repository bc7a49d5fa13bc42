// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use core::{
    ffi::c_void,
    fmt::Debug,
    ptr::{self, NonNull},
};

use platform::{Platform, MALLOC_ALIGNMENT};
use tracing::debug;

use super::{OutOfMemory, Placement};

/// The header at the start of every slot of a [`RawPool`].
///
/// Free slots use `next_free` to form the free list, occupied slots have it
/// set to null. Typed pools place this at offset 0 of their slot type (with
/// `#[repr(C)]`), so that a pointer to the slot is also a pointer to its link.
#[repr(C)]
#[derive(Debug)]
pub struct SlotLink {
    next_free: *mut SlotLink,
    occupied: bool,
}

impl SlotLink {
    /// Returns `true` if the slot currently holds an allocated item.
    pub fn is_occupied(&self) -> bool {
        self.occupied
    }
}

/// Written at the start of every block's memory. The slots follow after this,
/// aligned to the slot alignment.
#[repr(C)]
struct BlockHeader {
    /// The next older block, or null.
    next: *mut BlockHeader,
    /// The size of the whole allocation, for [`Platform::free`].
    size: usize,
    first_slot: *mut SlotLink,
}

/// The shape of the slots in a [`RawPool`] and how many of them each block
/// holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    item_size: usize,
    item_align: usize,
    block_length: usize,
}

impl SlotLayout {
    /// Creates a new layout for slots of `item_size` bytes aligned to
    /// `item_align`, `block_length` slots per block.
    ///
    /// Each slot must start with a [`SlotLink`], so it must be at least as big
    /// and as aligned as one. Panics if the layout isn't usable.
    pub const fn new(item_size: usize, item_align: usize, block_length: usize) -> SlotLayout {
        assert!(item_align.is_power_of_two(), "slot alignment must be a power of two");
        assert!(
            item_align >= align_of::<SlotLink>() && item_size >= size_of::<SlotLink>(),
            "slots must have room for a SlotLink at their start",
        );
        assert!(item_size % item_align == 0, "slot size must be a multiple of its alignment");
        assert!(block_length > 0, "blocks must hold at least one slot");
        SlotLayout {
            item_size,
            item_align,
            block_length,
        }
    }

    /// The size of one slot, i.e. the stride between slots in a block.
    pub const fn item_size(&self) -> usize {
        self.item_size
    }

    /// How many slots each block holds.
    pub const fn block_length(&self) -> usize {
        self.block_length
    }

    /// Offset from the start of a block's memory to where the slot array may
    /// start. The first slot is the first properly aligned address at or after
    /// this offset.
    pub const fn item_offset(&self) -> usize {
        size_of::<BlockHeader>()
    }

    fn block_size(&self) -> Option<usize> {
        let slots_size = self.item_size.checked_mul(self.block_length)?;
        let size = slots_size.checked_add(self.item_offset() + self.item_align - 1)?;
        if size > isize::MAX as usize {
            return None;
        }
        Some(size)
    }
}

/// Type-erased block-structured free-list allocator for fixed-size slots.
///
/// Memory is requested from the [`Platform`] one block at a time, and a
/// block's slots are never moved or returned to the platform until the whole
/// pool is destroyed, so pointers to slots stay valid for the lifetime of the
/// pool. Freed slots are pushed onto the front of the free list, which makes
/// reuse LIFO.
///
/// This is the shared machinery behind [`Pool`](super::Pool), which should be
/// preferred unless the slot type is only known at runtime.
pub struct RawPool<'eng> {
    platform: &'eng dyn Platform,
    layout: SlotLayout,
    /// The most recently allocated block, which links to the older ones.
    blocks: *mut BlockHeader,
    free_head: *mut SlotLink,
    block_count: usize,
    occupied_count: usize,
}

impl Debug for RawPool<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RawPool")
            .field("layout", &self.layout)
            .field("block_count", &self.block_count)
            .field("occupied_count", &self.occupied_count)
            .finish_non_exhaustive()
    }
}

impl Drop for RawPool<'_> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<'eng> RawPool<'eng> {
    /// Creates an empty pool. Doesn't allocate anything until the first
    /// [`RawPool::allocate`].
    pub fn new(platform: &'eng dyn Platform, layout: SlotLayout) -> RawPool<'eng> {
        RawPool {
            platform,
            layout,
            blocks: ptr::null_mut(),
            free_head: ptr::null_mut(),
            block_count: 0,
            occupied_count: 0,
        }
    }

    pub fn layout(&self) -> SlotLayout {
        self.layout
    }

    /// The amount of blocks allocated from the platform so far.
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// The amount of occupied slots.
    pub fn len(&self) -> usize {
        self.occupied_count
    }

    pub fn is_empty(&self) -> bool {
        self.occupied_count == 0
    }

    /// The amount of slots in all the blocks, occupied or not.
    pub fn capacity(&self) -> usize {
        self.block_count * self.layout.block_length
    }

    /// Marks a slot as occupied and returns it. The contents of the slot past
    /// its [`SlotLink`] are left as they were, i.e. uninitialized or whatever
    /// the previous occupant left behind.
    ///
    /// Reuses the most recently freed slot unless `placement` asks for a slot
    /// near a specific one. If there are no free slots, a new block is
    /// allocated. If that fails, the pool is left unchanged.
    pub fn allocate(
        &mut self,
        placement: Placement<NonNull<SlotLink>>,
    ) -> Result<NonNull<SlotLink>, OutOfMemory<()>> {
        profiling::function_scope!();
        if let Placement::Near(tag) = placement {
            if let Some(slot) = self.take_free_slot_near(tag) {
                return Ok(self.occupy(slot));
            }
        }

        let slot = match NonNull::new(self.free_head) {
            Some(slot) => slot,
            None => self.grow()?,
        };
        // Safety: the free list only contains pointers to initialized slot
        // links within our blocks.
        self.free_head = unsafe { slot.as_ref().next_free };
        Ok(self.occupy(slot))
    }

    /// Pushes the slot onto the free list. Returns `false` and does nothing if
    /// the slot is not an occupied slot of this pool.
    pub fn free(&mut self, slot: NonNull<SlotLink>) -> bool {
        if !self.is_occupied(slot) {
            return false;
        }
        // Safety: is_occupied checked that the slot is within one of our
        // blocks, and its link is always initialized.
        unsafe {
            slot.as_ptr().write(SlotLink {
                next_free: self.free_head,
                occupied: false,
            });
        }
        self.free_head = slot.as_ptr();
        self.occupied_count -= 1;
        true
    }

    /// Returns `true` if the pointer points at the start of a slot in one of
    /// this pool's blocks.
    pub fn contains(&self, slot: NonNull<SlotLink>) -> bool {
        self.locate(slot).is_some()
    }

    /// Returns `true` if the pointer points at an occupied slot of this pool.
    pub fn is_occupied(&self, slot: NonNull<SlotLink>) -> bool {
        // Safety: located slots are within our blocks and have an initialized
        // link.
        self.contains(slot) && unsafe { slot.as_ref().occupied }
    }

    /// Scans backwards from `from` (inclusive) through the earlier slots of
    /// its block, and then through all the older blocks, returning the first
    /// occupied slot `predicate` accepts.
    ///
    /// Returns `None` if `from` isn't from this pool or nothing matched. This
    /// is a linear scan over the whole pool in the worst case.
    pub fn item_tag(
        &self,
        from: NonNull<SlotLink>,
        mut predicate: impl FnMut(NonNull<SlotLink>) -> bool,
    ) -> Option<NonNull<SlotLink>> {
        profiling::function_scope!();
        let (start_block, start_index) = self.locate(from)?;
        let mut blocks = self
            .blocks()
            .skip_while(|block| !ptr::eq(*block, start_block));
        let start_block = blocks.next()?;

        let block_length = self.layout.block_length;
        let in_start_block = (0..=start_index)
            .rev()
            .map(|i| self.slot_at(start_block, i));
        let in_older_blocks = blocks.flat_map(|block| {
            (0..block_length)
                .rev()
                .map(move |i| self.slot_at(block, i))
        });

        in_start_block
            .chain(in_older_blocks)
            .filter(|slot| Self::slot_is_occupied(*slot))
            .find(|slot| predicate(*slot))
    }

    /// Scans every occupied slot, newest block first and last slot first,
    /// returning the first one `predicate` accepts.
    pub fn find_last(
        &self,
        mut predicate: impl FnMut(NonNull<SlotLink>) -> bool,
    ) -> Option<NonNull<SlotLink>> {
        let block_length = self.layout.block_length;
        self.blocks()
            .flat_map(|block| {
                (0..block_length)
                    .rev()
                    .map(move |i| self.slot_at(block, i))
            })
            .filter(|slot| Self::slot_is_occupied(*slot))
            .find(|slot| predicate(*slot))
    }

    /// Returns every block to the platform, leaving the pool empty but usable.
    ///
    /// Nothing is done about the contents of the occupied slots, which is fine
    /// for [`RawPool`] since it doesn't know what's in them. Any pointers to
    /// slots of this pool are dangling after this.
    pub fn destroy(&mut self) {
        let mut next = self.blocks;
        while !next.is_null() {
            // Safety: the block list only contains headers written in
            // RawPool::grow, which are freed only here.
            let (following, size) = unsafe { ((*next).next, (*next).size) };
            // Safety: the block was allocated in RawPool::grow from this
            // platform with this size. We have a mutable borrow of the pool,
            // and all slot accesses go through the pool, so nothing is using
            // the memory anymore.
            unsafe { self.platform.free(next as *mut c_void, size) };
            next = following;
        }

        if self.block_count > 0 {
            debug!(
                blocks = self.block_count,
                occupied = self.occupied_count,
                "destroyed pool blocks",
            );
        }

        self.blocks = ptr::null_mut();
        self.free_head = ptr::null_mut();
        self.block_count = 0;
        self.occupied_count = 0;
    }

    fn occupy(&mut self, slot: NonNull<SlotLink>) -> NonNull<SlotLink> {
        // Safety: all callers pass in free slots from our blocks.
        unsafe {
            slot.as_ptr().write(SlotLink {
                next_free: ptr::null_mut(),
                occupied: true,
            });
        }
        self.occupied_count += 1;
        slot
    }

    /// Allocates a new block, threads all of its slots onto the free list, and
    /// returns the new free list head. Only called when the free list is
    /// empty.
    fn grow(&mut self) -> Result<NonNull<SlotLink>, OutOfMemory<()>> {
        profiling::function_scope!();
        debug_assert!(self.free_head.is_null());
        let Some(block_size) = self.layout.block_size() else {
            return Err(OutOfMemory(()));
        };

        let block_ptr = self.platform.malloc(block_size) as *mut u8;
        if block_ptr.is_null() {
            debug!(block_size, "platform could not allocate a pool block");
            return Err(OutOfMemory(()));
        }
        debug_assert_eq!(0, block_ptr.align_offset(MALLOC_ALIGNMENT));

        // Safety: block_size reserves item_offset bytes for the header, then
        // item_align - 1 bytes of padding, then the slots themselves, so both
        // the unaligned and the aligned pointer are within the allocation.
        let first_slot = unsafe {
            let unaligned = block_ptr.add(self.layout.item_offset());
            unaligned.add(unaligned.align_offset(self.layout.item_align)) as *mut SlotLink
        };

        let stride = self.layout.item_size;
        let block_length = self.layout.block_length;
        for i in 0..block_length {
            // Safety: i < block_length, and block_size reserves room for
            // block_length slots after the aligned first slot. Each slot is
            // aligned for SlotLink since the layout's alignment is at least
            // SlotLink's, and so is its stride.
            unsafe {
                let next_free = if i + 1 < block_length {
                    first_slot.byte_add((i + 1) * stride)
                } else {
                    ptr::null_mut()
                };
                first_slot.byte_add(i * stride).write(SlotLink {
                    next_free,
                    occupied: false,
                });
            }
        }

        let header = block_ptr as *mut BlockHeader;
        // Safety: the platform guarantees MALLOC_ALIGNMENT, which is enough for
        // the header, and item_offset reserves room for it.
        unsafe {
            header.write(BlockHeader {
                next: self.blocks,
                size: block_size,
                first_slot,
            });
        }
        self.blocks = header;
        self.block_count += 1;
        self.free_head = first_slot;

        debug!(
            block_size,
            block_length,
            blocks = self.block_count,
            "allocated a new pool block",
        );

        // Safety: first_slot is an offset from the non-null block pointer.
        Ok(unsafe { NonNull::new_unchecked(first_slot) })
    }

    /// Finds a free slot in the same block as `tag`, starting right after it
    /// and wrapping around, and unlinks it from the free list.
    fn take_free_slot_near(&mut self, tag: NonNull<SlotLink>) -> Option<NonNull<SlotLink>> {
        let (block, tag_index) = self.locate(tag)?;
        let slot = ((tag_index + 1)..self.layout.block_length)
            .chain(0..tag_index)
            .map(|i| self.slot_at(block, i))
            .find(|slot| !Self::slot_is_occupied(*slot))?;
        self.unlink_free(slot);
        Some(slot)
    }

    fn unlink_free(&mut self, target: NonNull<SlotLink>) {
        let mut link: *mut *mut SlotLink = &raw mut self.free_head;
        // Safety: `link` always points either at `self.free_head` or at the
        // `next_free` field of a free slot in our blocks, and the list is
        // null-terminated.
        unsafe {
            while !(*link).is_null() {
                if *link == target.as_ptr() {
                    *link = target.as_ref().next_free;
                    return;
                }
                link = &raw mut (**link).next_free;
            }
        }
        debug_assert!(false, "a free slot was missing from the free list");
    }

    fn blocks(&self) -> impl Iterator<Item = &BlockHeader> + '_ {
        let mut next = self.blocks;
        core::iter::from_fn(move || {
            // Safety: the block list only contains live headers written in
            // RawPool::grow, and they're only freed with a mutable borrow of
            // the pool.
            let block = unsafe { next.as_ref()? };
            next = block.next;
            Some(block)
        })
    }

    fn locate(&self, slot: NonNull<SlotLink>) -> Option<(&BlockHeader, usize)> {
        let stride = self.layout.item_size;
        let address = slot.as_ptr() as usize;
        self.blocks().find_map(|block| {
            let start = block.first_slot as usize;
            let end = start + stride * self.layout.block_length;
            if (start..end).contains(&address) && (address - start) % stride == 0 {
                Some((block, (address - start) / stride))
            } else {
                None
            }
        })
    }

    fn slot_at(&self, block: &BlockHeader, index: usize) -> NonNull<SlotLink> {
        debug_assert!(index < self.layout.block_length);
        // Safety: the index is within the block's slot array, which is within
        // the block's allocation, and the first slot pointer is non-null.
        unsafe { NonNull::new_unchecked(block.first_slot.byte_add(index * self.layout.item_size)) }
    }

    fn slot_is_occupied(slot: NonNull<SlotLink>) -> bool {
        // Safety: only called with slots from slot_at, whose links are always
        // initialized.
        unsafe { slot.as_ref().occupied }
    }
}
