use std::collections::HashMap;

use crate::host::ObjectId;
use crate::value::{GEN_MASK, Handle};

/// Slots per arena block.
pub const BLOCK_SLOTS: usize = 256;

#[derive(Debug, Clone, Copy)]
struct Slot {
    /// Bumped every time the slot is released, so a stale handle is
    /// detected by a cheap generation compare instead of a tombstone scan.
    generation: u32,
    target: Option<ObjectId>,
}

const EMPTY_SLOT: Slot = Slot { generation: 0, target: None };

/// Bidirectional map between managed handles and host object identities.
///
/// Slots live in fixed-size blocks; a new block is appended only when the
/// free list is empty, so table memory is bounded by the high-water mark of
/// live handles, not by cumulative wraps.
///
/// Mutation is only legal while the runtime lock is held, so the table
/// carries no locking of its own. A deployment with genuinely parallel
/// execution contexts would need to stripe a lock per block; that extension
/// point is deliberately not built here.
pub struct HandleTable {
    blocks: Vec<Box<[Slot; BLOCK_SLOTS]>>,
    free: Vec<u32>,
    by_target: HashMap<ObjectId, u32>,
    live: usize,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            free: Vec::new(),
            by_target: HashMap::new(),
            live: 0,
        }
    }

    /// Number of live slots.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Total allocated slots (the high-water mark).
    pub fn capacity(&self) -> usize {
        self.blocks.len() * BLOCK_SLOTS
    }

    #[inline(always)]
    fn slot(&self, index: u32) -> Option<&Slot> {
        let index = index as usize;
        self.blocks
            .get(index / BLOCK_SLOTS)
            .map(|block| &block[index % BLOCK_SLOTS])
    }

    #[inline(always)]
    fn slot_mut(&mut self, index: u32) -> &mut Slot {
        let index = index as usize;
        &mut self.blocks[index / BLOCK_SLOTS][index % BLOCK_SLOTS]
    }

    /// Produce a handle for `target`, reusing the live slot if the object
    /// was already wrapped. Wrapping the same identity twice without an
    /// intervening collection therefore yields handles that resolve to the
    /// same referent.
    pub fn intern(&mut self, target: ObjectId) -> Handle {
        if let Some(&index) = self.by_target.get(&target) {
            let generation = self.slot(index).expect("dedup index out of range").generation;
            return Handle::from_slot(index, generation);
        }

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = self.capacity();
                assert!(index <= u32::MAX as usize, "handle table exhausted");
                self.blocks.push(Box::new([EMPTY_SLOT; BLOCK_SLOTS]));
                log::debug!(
                    "handle table grew to {} blocks ({} slots)",
                    self.blocks.len(),
                    self.capacity()
                );
                // The rest of the fresh block feeds the free list.
                for i in (index + 1..index + BLOCK_SLOTS).rev() {
                    self.free.push(i as u32);
                }
                index as u32
            }
        };

        let slot = self.slot_mut(index);
        debug_assert!(slot.target.is_none(), "free list handed out a live slot");
        slot.target = Some(target);
        let generation = slot.generation;
        self.by_target.insert(target, index);
        self.live += 1;
        Handle::from_slot(index, generation)
    }

    /// Resolve a managed handle back to its host object.
    ///
    /// A reclaimed or malformed handle is a native-side use-after-free;
    /// continuing would convert a memory-safety bug into silent data
    /// corruption, so this path is fatal rather than recoverable.
    pub fn resolve(&self, handle: Handle) -> ObjectId {
        debug_assert!(handle.is_managed());
        let index = unsafe { handle.slot_index() };
        let generation = unsafe { handle.generation() };
        match self.slot(index) {
            Some(slot) if slot.generation == generation => match slot.target {
                Some(target) => target,
                None => {
                    log::error!("dead handle 0x{:016x} (slot {index})", handle.raw());
                    panic!("invalid handle: slot {index} is not live");
                }
            },
            Some(slot) => {
                log::error!(
                    "stale handle 0x{:016x} (slot {index}, gen {generation}, current {})",
                    handle.raw(),
                    slot.generation
                );
                panic!("invalid handle: use after free of slot {index}");
            }
            None => {
                log::error!("out-of-range handle 0x{:016x}", handle.raw());
                panic!("invalid handle: slot {index} was never allocated");
            }
        }
    }

    /// Release the slot for a collected object, returning whether one
    /// existed. The generation bump invalidates every outstanding handle to
    /// the slot.
    pub fn release(&mut self, target: ObjectId) -> bool {
        let Some(index) = self.by_target.remove(&target) else {
            return false;
        };
        let slot = self.slot_mut(index);
        slot.target = None;
        slot.generation = (slot.generation + 1) & GEN_MASK;
        self.free.push(index);
        self.live -= 1;
        true
    }

    /// Iterate the host identities of all live slots.
    pub fn live_targets(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.by_target.keys().copied()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
