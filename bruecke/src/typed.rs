//! Typed opaque-data wrapping.
//!
//! Native code stores a raw struct pointer inside a host container object
//! and retrieves it later through a descriptor check. Descriptors form a
//! parent chain (inheritance by descriptor, not by object identity) and are
//! compared by pointer identity: two descriptors are the same type iff they
//! are the same registered instance.

use std::collections::HashMap;
use std::ffi::c_void;
use std::ptr;

use crate::error::BridgeError;
use crate::host::ObjectId;
use crate::value::Handle;

/// Visit every handle embedded in the raw struct so the collector keeps
/// them alive (and can update them in place on relocation).
///
/// # Safety
///
/// `data` must be the pointer the descriptor was registered with, still
/// live and exclusively accessible.
pub type MarkFn = unsafe fn(data: *mut c_void, visitor: &mut dyn FnMut(&mut Handle));

/// Release the raw struct.
///
/// # Safety
///
/// Runs at most once, only after the container is unreachable.
pub type FreeFn = unsafe fn(data: *mut c_void);

/// Report native-heap bytes owned by the raw struct, for memory accounting.
///
/// # Safety
///
/// `data` must be the registered pointer, still live.
pub type SizeFn = unsafe fn(data: *const c_void) -> usize;

/// How to release the wrapped struct when its container dies.
#[derive(Clone, Copy)]
pub enum FreePolicy {
    /// Native code keeps ownership; the bridge never frees.
    Never,
    Custom(FreeFn),
    /// The struct came from [`bridge_malloc`]; release with the matching
    /// allocator.
    BridgeAlloc,
}

/// Immutable type-identity record for wrapped native data.
pub struct DataTypeDesc {
    pub name: &'static str,
    pub mark: Option<MarkFn>,
    pub free: FreePolicy,
    pub size: Option<SizeFn>,
    pub parent: Option<&'static DataTypeDesc>,
}

impl DataTypeDesc {
    pub const fn new(name: &'static str) -> Self {
        Self { name, mark: None, free: FreePolicy::Never, size: None, parent: None }
    }

    /// Whether `expected` appears in this descriptor's parent chain
    /// (including itself). Pointer identity, never structural.
    pub fn chain_contains(&self, expected: &DataTypeDesc) -> bool {
        let mut current = Some(self);
        while let Some(desc) = current {
            if ptr::eq(desc, expected) {
                return true;
            }
            current = desc.parent;
        }
        false
    }
}

struct WrappedData {
    desc: Option<&'static DataTypeDesc>,
    ptr: *mut c_void,
}

/// Container payloads keyed by host object identity.
///
/// The registry owns the entries; each raw pointer stays owned by native
/// code until the free policy runs. Mutation only happens under the runtime
/// lock (same discipline as the handle table).
pub struct TypedDataRegistry {
    entries: HashMap<ObjectId, WrappedData>,
}

impl TypedDataRegistry {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    pub fn insert_typed(
        &mut self,
        container: ObjectId,
        desc: &'static DataTypeDesc,
        ptr: *mut c_void,
    ) {
        self.entries.insert(container, WrappedData { desc: Some(desc), ptr });
    }

    pub fn insert_untyped(&mut self, container: ObjectId, ptr: *mut c_void) {
        self.entries.insert(container, WrappedData { desc: None, ptr });
    }

    /// Fetch the raw pointer, checking the descriptor chain on every
    /// access. The chain walk is the only thing preventing one struct
    /// layout from being misinterpreted as another.
    pub fn fetch_typed(
        &self,
        container: ObjectId,
        expected: &'static DataTypeDesc,
    ) -> Result<*mut c_void, BridgeError> {
        let entry = self.entries.get(&container).ok_or(BridgeError::TypeMismatch {
            expected: expected.name,
            got: "object",
        })?;
        match entry.desc {
            Some(desc) if desc.chain_contains(expected) => Ok(entry.ptr),
            Some(desc) => {
                Err(BridgeError::TypeMismatch { expected: expected.name, got: desc.name })
            }
            None => Err(BridgeError::TypeMismatch {
                expected: expected.name,
                got: "untyped data",
            }),
        }
    }

    pub fn fetch_untyped(&self, container: ObjectId) -> Result<*mut c_void, BridgeError> {
        let entry = self.entries.get(&container).ok_or(BridgeError::TypeMismatch {
            expected: "data",
            got: "object",
        })?;
        Ok(entry.ptr)
    }

    pub fn contains(&self, container: ObjectId) -> bool {
        self.entries.contains_key(&container)
    }

    /// Collector mark phase for one container.
    ///
    /// # Safety
    ///
    /// The wrapped pointer must still be live; the visitor may rewrite
    /// embedded handles in place.
    pub unsafe fn mark(
        &self,
        container: ObjectId,
        visitor: &mut dyn FnMut(&mut Handle),
    ) {
        if let Some(entry) = self.entries.get(&container)
            && let Some(desc) = entry.desc
            && let Some(mark) = desc.mark
        {
            unsafe { mark(entry.ptr, visitor) };
        }
    }

    /// Native-heap bytes owned by one container, 0 when unknown.
    pub fn size(&self, container: ObjectId) -> usize {
        match self.entries.get(&container) {
            Some(entry) => match entry.desc.and_then(|d| d.size) {
                Some(size) => unsafe { size(entry.ptr) },
                None => 0,
            },
            None => 0,
        }
    }

    /// Run the free policy for an unreachable container. Removal happens
    /// first, so the policy runs at most once even if the host reports the
    /// same death twice.
    pub fn finalize(&mut self, container: ObjectId) -> bool {
        let Some(entry) = self.entries.remove(&container) else {
            return false;
        };
        let policy = entry.desc.map(|d| d.free).unwrap_or(FreePolicy::Never);
        match policy {
            FreePolicy::Never => {}
            FreePolicy::Custom(free) => unsafe { free(entry.ptr) },
            FreePolicy::BridgeAlloc => unsafe { bridge_free(entry.ptr) },
        }
        if let Some(desc) = entry.desc {
            log::debug!("finalized {} container {:?}", desc.name, container);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TypedDataRegistry {
    fn default() -> Self {
        Self::new()
    }
}

unsafe extern "C" {
    fn malloc(size: usize) -> *mut c_void;
    fn free(ptr: *mut c_void);
}

/// Allocate through the bridge's allocator, for structs that will be
/// released by [`FreePolicy::BridgeAlloc`].
pub fn bridge_malloc(size: usize) -> *mut c_void {
    unsafe { malloc(size) }
}

/// Release a [`bridge_malloc`] allocation.
///
/// # Safety
///
/// `ptr` must come from [`bridge_malloc`] and must not be used afterwards.
pub unsafe fn bridge_free(ptr: *mut c_void) {
    if !ptr.is_null() {
        unsafe { free(ptr) };
    }
}
