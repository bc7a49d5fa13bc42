// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use core::{
    fmt::Debug,
    hash::{Hash, Hasher},
    marker::PhantomData,
    mem::MaybeUninit,
    ptr::NonNull,
};

use platform::Platform;

use super::{OutOfMemory, Placement, RawPool, SlotLayout, SlotLink};

#[repr(C)]
struct Slot<T> {
    /// Must be the first field, [`RawPool`] only knows about this part.
    link: SlotLink,
    value: MaybeUninit<T>,
}

/// A reference to an item allocated from a [`Pool`].
///
/// Handles are plain pointers under the hood: they're cheap to copy and
/// compare, and they don't borrow the pool. All access goes through the pool,
/// which checks that the handle points at one of its occupied slots, so a
/// stale handle results in `None` rather than a dangling read. Handles from
/// before a [`Pool::destroy`] must not be used with the same pool afterwards,
/// as the platform may hand the same memory back for new blocks.
pub struct PoolHandle<T> {
    slot: NonNull<SlotLink>,
    _marker: PhantomData<*const T>,
}

impl<T> PoolHandle<T> {
    fn new(slot: NonNull<SlotLink>) -> PoolHandle<T> {
        PoolHandle {
            slot,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for PoolHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PoolHandle<T> {}

impl<T> PartialEq for PoolHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot
    }
}

impl<T> Eq for PoolHandle<T> {}

impl<T> Hash for PoolHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.slot.hash(state);
    }
}

impl<T> Debug for PoolHandle<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("PoolHandle").field(&self.slot).finish()
    }
}

/// An object pool for objects of type `T`.
///
/// Can allocate instances of `T` very fast. Memory is requested from the
/// platform in blocks of [`Pool::block_length`] items, and never given back
/// until the pool is destroyed, so the pool reserves enough memory for its
/// peak usage. Freed items are reused last-in-first-out.
///
/// NOTE: [`Pool::destroy`] (and dropping the pool) releases the blocks without
/// dropping the values still in them. Use [`Pool::free`] to get values out
/// if they need to be dropped.
pub struct Pool<'eng, T> {
    raw: RawPool<'eng>,
    _marker: PhantomData<T>,
}

impl<T> Debug for Pool<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pool").field("raw", &self.raw).finish()
    }
}

impl<'eng, T> Pool<'eng, T> {
    /// The block length used by [`Pool::new`].
    pub const DEFAULT_BLOCK_LENGTH: usize = 32;

    /// Creates an empty pool, allocating [`Pool::DEFAULT_BLOCK_LENGTH`] items
    /// worth of memory at a time.
    pub fn new(platform: &'eng dyn Platform) -> Pool<'eng, T> {
        Pool::with_block_length(platform, Self::DEFAULT_BLOCK_LENGTH)
    }

    /// Creates an empty pool which allocates `block_length` items worth of
    /// memory at a time. Panics if `block_length` is zero.
    pub fn with_block_length(platform: &'eng dyn Platform, block_length: usize) -> Pool<'eng, T> {
        let layout = SlotLayout::new(size_of::<Slot<T>>(), align_of::<Slot<T>>(), block_length);
        Pool {
            raw: RawPool::new(platform, layout),
            _marker: PhantomData,
        }
    }

    pub fn block_length(&self) -> usize {
        self.raw.layout().block_length()
    }

    pub fn block_count(&self) -> usize {
        self.raw.block_count()
    }

    /// The amount of allocated items.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Stores the value in the pool, reusing the most recently freed slot, or
    /// if none are available, a slot from a newly allocated block. If the
    /// block can't be allocated, the value is returned back wrapped in
    /// [`OutOfMemory`].
    pub fn allocate(&mut self, value: T) -> Result<PoolHandle<T>, OutOfMemory<T>> {
        self.allocate_tagged(value, Placement::Any)
    }

    /// Like [`Pool::allocate`], but with [`Placement::Near`], tries to put the
    /// value in the same block as the tag item, to keep related items close
    /// to each other.
    pub fn allocate_tagged(
        &mut self,
        value: T,
        placement: Placement<PoolHandle<T>>,
    ) -> Result<PoolHandle<T>, OutOfMemory<T>> {
        let placement = match placement {
            Placement::Near(tag) if self.raw.contains(tag.slot) => Placement::Near(tag.slot),
            _ => Placement::Any,
        };

        let Ok(slot) = self.raw.allocate(placement) else {
            return Err(OutOfMemory(value));
        };

        let slot_ptr = slot.as_ptr() as *mut Slot<T>;
        // Safety: the raw pool was created with the layout of Slot<T>, so the
        // pointer is valid and aligned for a Slot<T>, and the slot was just
        // marked occupied, so nothing else is using its value.
        unsafe { (*slot_ptr).value.write(value) };

        Ok(PoolHandle::new(slot))
    }

    /// Moves the value out of the pool, pushing its slot onto the free list,
    /// and sets the handle to `None` so it can't be used again.
    ///
    /// Returns `None` if the handle was already `None` or doesn't refer to an
    /// allocated item of this pool.
    pub fn free(&mut self, handle: &mut Option<PoolHandle<T>>) -> Option<T> {
        let handle = handle.take()?;
        if !self.raw.is_occupied(handle.slot) {
            return None;
        }

        let slot_ptr = handle.slot.as_ptr() as *mut Slot<T>;
        // Safety: the slot is occupied, so its value was initialized in
        // allocate_tagged. It's marked free right after, so the value won't be
        // read a second time.
        let value = unsafe { (*slot_ptr).value.assume_init_read() };
        self.raw.free(handle.slot);

        Some(value)
    }

    /// Returns the item the handle refers to, if it's an allocated item of
    /// this pool.
    pub fn get(&self, handle: PoolHandle<T>) -> Option<&T> {
        if !self.raw.is_occupied(handle.slot) {
            return None;
        }
        // Safety: occupied slots of this pool contain an initialized T, and
        // the returned borrow is tied to the borrow of the pool, which is
        // needed for freeing the slot.
        Some(unsafe { Self::value_ref(handle.slot) })
    }

    /// Returns the item the handle refers to, if it's an allocated item of
    /// this pool.
    pub fn get_mut(&mut self, handle: PoolHandle<T>) -> Option<&mut T> {
        if !self.raw.is_occupied(handle.slot) {
            return None;
        }
        let slot_ptr = handle.slot.as_ptr() as *mut Slot<T>;
        // Safety: like in Pool::get, and the mutable borrow of the pool
        // ensures this is the only borrow of the value.
        Some(unsafe { (*slot_ptr).value.assume_init_mut() })
    }

    /// Finds the "tag" of an item: scans backwards from `from` (inclusive)
    /// through the items allocated before it in its block, and then through
    /// the older blocks, returning the first item `predicate` accepts.
    ///
    /// Useful for resolving an item back to the record it was allocated
    /// after, e.g. the first item of a group allocated with
    /// [`Placement::Near`]. This is a linear scan, so it's meant for rare
    /// lookups, not hot paths.
    pub fn item_tag(
        &self,
        from: PoolHandle<T>,
        mut predicate: impl FnMut(&T) -> bool,
    ) -> Option<PoolHandle<T>> {
        self.raw
            .item_tag(from.slot, |slot| {
                // Safety: item_tag only passes in occupied slots of this pool.
                predicate(unsafe { Self::value_ref(slot) })
            })
            .map(PoolHandle::new)
    }

    /// Returns the most recently placed item `predicate` accepts, scanning
    /// the whole pool.
    pub fn find_last(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<PoolHandle<T>> {
        self.raw
            .find_last(|slot| {
                // Safety: find_last only passes in occupied slots of this pool.
                predicate(unsafe { Self::value_ref(slot) })
            })
            .map(PoolHandle::new)
    }

    /// Releases all the memory of the pool at once. The values still in the
    /// pool are not dropped. The pool can be used again afterwards, starting
    /// from scratch.
    pub fn destroy(&mut self) {
        self.raw.destroy();
    }

    /// ### Safety
    ///
    /// The slot must be an occupied slot of this pool, and the returned borrow
    /// must not outlive the borrow of the pool it was acquired through.
    unsafe fn value_ref<'a>(slot: NonNull<SlotLink>) -> &'a T {
        let slot_ptr = slot.as_ptr() as *const Slot<T>;
        unsafe { (*slot_ptr).value.assume_init_ref() }
    }
}

#[cfg(test)]
mod tests {
    extern crate alloc;

    use core::sync::atomic::{AtomicI32, Ordering};

    use alloc::string::String;

    use crate::{
        allocators::{Placement, Pool, PoolHandle},
        test_platform::TestPlatform,
    };

    #[derive(Debug, PartialEq)]
    struct Row {
        name: char,
        starts_group: bool,
    }

    fn row(name: char) -> Row {
        Row {
            name,
            starts_group: false,
        }
    }

    #[test]
    fn reuses_the_most_recently_freed_item() {
        let platform = TestPlatform::new();
        let mut pool: Pool<u64> = Pool::with_block_length(&platform, 8);
        let handles: [PoolHandle<u64>; 5] =
            core::array::from_fn(|i| pool.allocate(i as u64).unwrap());

        let mut freed = Some(handles[2]);
        assert_eq!(Some(2), pool.free(&mut freed));
        assert_eq!(None, freed, "free should clear the handle");

        let reused = pool.allocate(100).unwrap();
        assert_eq!(handles[2], reused);
        assert_eq!(Some(&100), pool.get(reused));
    }

    #[test]
    fn block_count_follows_block_length() {
        let platform = TestPlatform::new();
        let mut pool: Pool<u32> = Pool::with_block_length(&platform, 3);
        for i in 0..3 {
            pool.allocate(i).unwrap();
        }
        assert_eq!(1, pool.block_count());
        pool.allocate(3).unwrap();
        assert_eq!(2, pool.block_count());
        assert_eq!(4, pool.len());
    }

    #[test]
    fn out_of_memory_gives_the_value_back() {
        let platform = TestPlatform::new();
        let mut pool: Pool<String> = Pool::with_block_length(&platform, 1);
        pool.allocate(String::from("first")).unwrap();

        platform.fail_next_allocations(1);
        let error = pool.allocate(String::from("second")).unwrap_err();
        assert_eq!("second", error.into_inner());
        assert_eq!(1, pool.block_count());
        assert_eq!(1, pool.len());
    }

    #[test]
    fn item_tag_finds_matching_items() {
        let platform = TestPlatform::new();
        let mut pool: Pool<Row> = Pool::new(&platform);
        let _a = pool.allocate(row('A')).unwrap();
        let _b = pool.allocate(row('B')).unwrap();
        let c = pool.allocate(row('C')).unwrap();

        assert_eq!(Some(c), pool.item_tag(c, |row| row.name == 'C'));
        assert_eq!(None, pool.item_tag(c, |_| false));
    }

    #[test]
    fn item_tag_resolves_group_heads_across_blocks() {
        let platform = TestPlatform::new();
        let mut pool: Pool<Row> = Pool::with_block_length(&platform, 2);
        let head = pool
            .allocate(Row {
                name: 'H',
                starts_group: true,
            })
            .unwrap();
        let mut last = head;
        for name in ['x', 'y', 'z'] {
            last = pool.allocate_tagged(row(name), Placement::Near(head)).unwrap();
        }
        assert_eq!(2, pool.block_count());

        let found = pool.item_tag(last, |row| row.starts_group).unwrap();
        assert_eq!(head, found);
        assert_eq!('H', pool.get(found).unwrap().name);
    }

    #[test]
    fn freed_items_are_invisible() {
        let platform = TestPlatform::new();
        let mut pool: Pool<Row> = Pool::new(&platform);
        let a = pool.allocate(row('A')).unwrap();
        let b = pool.allocate(row('B')).unwrap();

        pool.free(&mut Some(b));
        assert_eq!(None, pool.get(b));
        assert_eq!(None, pool.get_mut(b));
        assert_eq!(None, pool.free(&mut Some(b)), "double free should be refused");
        assert_eq!(None, pool.find_last(|row| row.name == 'B'));
        assert_eq!(Some(a), pool.item_tag(b, |_| true), "freed items should be skipped");
    }

    #[test]
    fn destroyed_pools_start_from_scratch() {
        let platform = TestPlatform::new();
        let mut pool: Pool<Row> = Pool::with_block_length(&platform, 4);
        for name in ['A', 'B', 'C', 'D', 'E'] {
            pool.allocate(row(name)).unwrap();
        }
        pool.destroy();
        assert_eq!(0, platform.live_allocations());
        assert_eq!(0, pool.block_count());
        assert!(pool.is_empty());

        let fresh = pool.allocate(row('F')).unwrap();
        assert_eq!(1, pool.len());
        assert_eq!(Some(fresh), pool.find_last(|_| true));
        assert_eq!(None, pool.find_last(|row| row.name != 'F'));
    }

    #[test]
    fn free_does_not_leak_values() {
        static ELEMENT_COUNT: AtomicI32 = AtomicI32::new(0);

        struct Element;
        impl Element {
            fn create_and_count() -> Element {
                ELEMENT_COUNT.fetch_add(1, Ordering::Relaxed);
                Element
            }
        }
        impl Drop for Element {
            fn drop(&mut self) {
                ELEMENT_COUNT.fetch_add(-1, Ordering::Relaxed);
            }
        }

        let platform = TestPlatform::new();
        let mut pool: Pool<Element> = Pool::new(&platform);
        let mut handle = pool.allocate(Element::create_and_count()).ok();
        assert_eq!(1, ELEMENT_COUNT.load(Ordering::Relaxed));
        drop(pool.free(&mut handle));
        assert_eq!(0, ELEMENT_COUNT.load(Ordering::Relaxed), "value leaked!");
    }
}
