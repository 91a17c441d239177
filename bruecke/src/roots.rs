//! Root registration for handles held in native memory.
//!
//! Handles on the native stack or in native statics are invisible to the
//! host's collector, so native code declares them here. Registered
//! addresses are *live* roots: every scan re-reads the current handle, and
//! the visitor may rewrite it in place on relocation.

use crate::value::Handle;

/// Registered handle locations, visited on every collector scan.
///
/// Scanning and mutation both happen under the runtime lock, so no locking
/// lives here (same discipline as `HandleTable`).
pub struct RootRegistry {
    globals: Vec<*mut Handle>,
    scopes: Vec<Vec<Handle>>,
}

impl RootRegistry {
    pub fn new() -> Self {
        Self { globals: Vec::new(), scopes: Vec::new() }
    }

    /// Register the address of a long-lived handle variable.
    ///
    /// # Safety
    ///
    /// `address` must stay valid and exclusively owned by the caller until
    /// [`unregister`](Self::unregister) runs. Registering a stack slot and
    /// letting it go out of scope is a dangling root.
    pub unsafe fn register(&mut self, address: *mut Handle) {
        debug_assert!(!address.is_null());
        self.globals.push(address);
        log::trace!("registered root at {address:p}");
    }

    /// Remove a previously registered address; unknown addresses are a
    /// no-op so teardown code can unregister unconditionally.
    pub fn unregister(&mut self, address: *mut Handle) {
        if let Some(pos) = self.globals.iter().position(|&p| p == address) {
            self.globals.swap_remove(pos);
        }
    }

    /// Open a pin scope. Handles pinned afterwards stay rooted until the
    /// matching [`pop_scope`](Self::pop_scope).
    pub fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    /// Pin a handle in the innermost scope. Without an open scope the pin
    /// would silently do nothing, which is the exact bug scopes exist to
    /// prevent, so that case panics.
    pub fn pin(&mut self, handle: Handle) {
        let scope = self
            .scopes
            .last_mut()
            .expect("pin without an open pin scope");
        scope.push(handle);
    }

    /// Close the innermost pin scope, dropping its pins.
    pub fn pop_scope(&mut self) {
        if self.scopes.pop().is_none() {
            log::error!("pin scope underflow");
            panic!("pop without an open pin scope");
        }
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    /// Visit every root slot. Immediate handles are skipped; only managed
    /// slots are interesting to a collector.
    ///
    /// # Safety
    ///
    /// Every registered address must still be valid (see
    /// [`register`](Self::register)).
    pub unsafe fn visit(&mut self, visitor: &mut dyn FnMut(&mut Handle)) {
        for &address in &self.globals {
            let slot = unsafe { &mut *address };
            if slot.is_managed() {
                visitor(slot);
            }
        }
        for scope in &mut self.scopes {
            for slot in scope.iter_mut() {
                if slot.is_managed() {
                    visitor(slot);
                }
            }
        }
    }
}

impl Default for RootRegistry {
    fn default() -> Self {
        Self::new()
    }
}
