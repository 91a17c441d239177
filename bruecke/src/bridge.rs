//! The call bridge.
//!
//! One [`Bridge`] instance owns everything the native side of an embedding
//! needs: the value codec boundary (wrap/unwrap), the handle table, the
//! typed-data registry, root registration, selector interning and the
//! call-frame stack for block forwarding. All methods assume the runtime
//! lock is held (see [`crate::gvl::RuntimeLock`]).

use std::ffi::c_void;

use crate::error::BridgeError;
use crate::host::{Host, HostCall, HostRef, ObjectId};
use crate::interning::Symbols;
use crate::intpack::{self, BigInt};
use crate::roots::RootRegistry;
use crate::scan::{ArgFormat, KwIndication, KwOutcome, distribute};
use crate::table::HandleTable;
use crate::typed::{DataTypeDesc, TypedDataRegistry};
use crate::value::Handle;

/// One native call frame. Only the block matters to the bridge; everything
/// else about the frame lives host-side.
struct Frame {
    block: Option<Handle>,
}

pub struct Bridge<H: Host> {
    pub host: H,
    table: HandleTable,
    typed: TypedDataRegistry,
    roots: RootRegistry,
    symbols: Symbols,
    frames: Vec<Frame>,
}

impl<H: Host> Bridge<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            table: HandleTable::new(),
            typed: TypedDataRegistry::new(),
            roots: RootRegistry::new(),
            symbols: Symbols::new(),
            frames: Vec::new(),
        }
    }

    // ── Value codec boundary ───────────────────────────────────────

    /// Encode a host reference as a handle. Immediates encode in the bit
    /// pattern; managed objects go through the handle table, so wrapping
    /// the same identity twice yields the same handle.
    pub fn wrap(&mut self, value: HostRef) -> Handle {
        match value {
            HostRef::Nil => Handle::NIL,
            HostRef::Undef => Handle::UNDEF,
            HostRef::Bool(b) => Handle::from_bool(b),
            HostRef::Fixnum(n) => {
                // Wider host integers must cross as big-integer objects;
                // encoding here would drop the top bit.
                if !Handle::fixnum_fits(n) {
                    log::error!("host fixnum {n} outside the immediate range");
                    panic!("invalid host reference: fixnum {n} exceeds the 63-bit immediate range");
                }
                Handle::from_i64(n)
            }
            HostRef::Symbol(id) => Handle::from_symbol(id),
            HostRef::Object(id) => self.table.intern(id),
        }
    }

    /// Decode a handle back to a host reference.
    ///
    /// A malformed bit pattern, like a reclaimed managed handle, is a
    /// native-side bug and fatal (see `HandleTable::resolve`).
    pub fn unwrap(&self, handle: Handle) -> HostRef {
        if handle.is_fixnum() {
            HostRef::Fixnum(unsafe { handle.to_i64() })
        } else if handle.is_managed() {
            HostRef::Object(self.table.resolve(handle))
        } else if handle.is_symbol() {
            HostRef::Symbol(unsafe { handle.symbol_id() })
        } else if handle == Handle::NIL {
            HostRef::Nil
        } else if handle == Handle::TRUE {
            HostRef::Bool(true)
        } else if handle == Handle::FALSE {
            HostRef::Bool(false)
        } else if handle == Handle::UNDEF {
            HostRef::Undef
        } else {
            log::error!("malformed handle 0x{:016x}", handle.raw());
            panic!("invalid handle: malformed bit pattern");
        }
    }

    // ── Symbols ────────────────────────────────────────────────────

    pub fn intern(&self, name: &str) -> Handle {
        Handle::from_symbol(self.symbols.intern(name))
    }

    pub fn symbol_name(&self, handle: Handle) -> Result<std::sync::Arc<str>, BridgeError> {
        if !handle.is_symbol() {
            return Err(BridgeError::TypeMismatch {
                expected: "symbol",
                got: handle.kind_name(),
            });
        }
        self.symbols
            .name(unsafe { handle.symbol_id() })
            .ok_or(BridgeError::Argument { message: "unknown symbol id" })
    }

    // ── Invocation ─────────────────────────────────────────────────

    /// Dispatch `selector` on `receiver`. The whole call surface funnels
    /// through here: one marshal, one host dispatch, one wrap of the
    /// result. Host exceptions propagate unchanged.
    pub fn invoke(
        &mut self,
        receiver: Handle,
        selector: &str,
        args: &[Handle],
    ) -> Result<Handle, BridgeError> {
        self.invoke_inner(receiver, selector, args, None, false)
    }

    /// Like [`invoke`](Self::invoke), but forwards the calling frame's
    /// block to the callee.
    pub fn invoke_passing_block(
        &mut self,
        receiver: Handle,
        selector: &str,
        args: &[Handle],
    ) -> Result<Handle, BridgeError> {
        let block = self.current_block();
        self.invoke_inner(receiver, selector, args, block, false)
    }

    /// Like [`invoke`](Self::invoke), with the trailing argument flagged
    /// as a keyword hash so the host splits it the way its own call sites
    /// would.
    pub fn invoke_kw(
        &mut self,
        receiver: Handle,
        selector: &str,
        args: &[Handle],
        kw_splat: bool,
    ) -> Result<Handle, BridgeError> {
        self.invoke_inner(receiver, selector, args, None, kw_splat)
    }

    fn invoke_inner(
        &mut self,
        receiver: Handle,
        selector: &str,
        args: &[Handle],
        block: Option<Handle>,
        kw_splat: bool,
    ) -> Result<Handle, BridgeError> {
        let selector = self.symbols.intern(selector);
        let receiver = self.unwrap(receiver);
        let args: Vec<HostRef> = args.iter().map(|&a| self.unwrap(a)).collect();
        let block = block.map(|b| self.unwrap(b));
        log::trace!("dispatch {selector:?} on {receiver:?} ({} args)", args.len());
        let result = self.host.dispatch(HostCall {
            receiver,
            selector,
            args: &args,
            block,
            kw_splat,
        })?;
        Ok(self.wrap(result))
    }

    // ── Frames and blocks ──────────────────────────────────────────

    /// Enter a native call frame. `block` is the block literal the caller
    /// attached, if any; `nil` counts as no block.
    pub fn push_frame(&mut self, block: Option<Handle>) {
        let block = block.filter(|b| !b.is_nil());
        self.frames.push(Frame { block });
    }

    pub fn pop_frame(&mut self) {
        if self.frames.pop().is_none() {
            log::error!("frame stack underflow");
            panic!("pop without an active frame");
        }
    }

    fn current_block(&self) -> Option<Handle> {
        self.frames.last().and_then(|f| f.block)
    }

    /// Whether the current frame has a block attached.
    pub fn block_given(&self) -> bool {
        self.current_block().is_some()
    }

    /// Call the current frame's block with `args`.
    pub fn yield_block(&mut self, args: &[Handle]) -> Result<Handle, BridgeError> {
        let Some(block) = self.current_block() else {
            return Err(BridgeError::Argument { message: "no block given (yield)" });
        };
        self.invoke_inner(block, "call", args, None, false)
    }

    // ── Argument scanning ──────────────────────────────────────────

    /// Distribute `args` into `out` according to `format` (see
    /// [`ArgFormat::parse`] for the mini-language). `out` must have exactly
    /// `slot_count()` slots, filled in declaration order: pre, optional
    /// (absent ones get [`Handle::UNDEF`]), rest (a fresh host array),
    /// post, keyword hash, block (the current frame's, or `nil`).
    ///
    /// Returns the positional argument count after keyword-hash
    /// reservation.
    pub fn scan_args(
        &mut self,
        args: &[Handle],
        format: &'static str,
        kw: KwIndication,
        out: &mut [Handle],
    ) -> Result<usize, BridgeError> {
        let format = ArgFormat::cached(format)?;
        if out.len() != format.slot_count() {
            return Err(BridgeError::Argument {
                message: "output slice length must match the format's slot count",
            });
        }
        let dist = distribute(&format, args, kw)?;

        let mut slot = 0;
        for &arg in &args[..format.pre as usize] {
            out[slot] = arg;
            slot += 1;
        }
        for i in 0..format.optional as usize {
            out[slot] = if i < dist.opts_taken {
                args[format.pre as usize + i]
            } else {
                Handle::UNDEF
            };
            slot += 1;
        }
        if format.rest {
            let elems: Vec<HostRef> = args[dist.rest_start..dist.rest_start + dist.rest_len]
                .iter()
                .map(|&a| self.unwrap(a))
                .collect();
            let array = self.host.new_array(&elems);
            out[slot] = self.wrap(HostRef::Object(array));
            slot += 1;
        }
        for &arg in &args[dist.n - format.post as usize..dist.n] {
            out[slot] = arg;
            slot += 1;
        }
        if format.kwargs {
            out[slot] = match dist.kw {
                KwOutcome::Reserved => args[args.len() - 1],
                KwOutcome::ExplicitNil => Handle::NIL,
                KwOutcome::Absent => Handle::UNDEF,
                KwOutcome::NotCaptured => unreachable!("kwargs format without capture"),
            };
            slot += 1;
        }
        if format.block {
            out[slot] = self.current_block().unwrap_or(Handle::NIL);
            slot += 1;
        }
        debug_assert_eq!(slot, out.len());
        Ok(dist.n)
    }

    // ── Typed data ─────────────────────────────────────────────────

    /// Wrap a raw native struct in a fresh host container under `desc`.
    pub fn wrap_typed(&mut self, desc: &'static DataTypeDesc, ptr: *mut c_void) -> Handle {
        let container = self.host.new_data_container();
        self.typed.insert_typed(container, desc, ptr);
        self.table.intern(container)
    }

    /// Wrap a raw pointer without a descriptor (legacy untyped wrapping).
    pub fn wrap_data(&mut self, ptr: *mut c_void) -> Handle {
        let container = self.host.new_data_container();
        self.typed.insert_untyped(container, ptr);
        self.table.intern(container)
    }

    /// Fetch the struct pointer behind `handle`, verifying `desc` against
    /// the stored descriptor's parent chain.
    pub fn unwrap_typed(
        &self,
        handle: Handle,
        desc: &'static DataTypeDesc,
    ) -> Result<*mut c_void, BridgeError> {
        if !handle.is_managed() {
            return Err(BridgeError::TypeMismatch {
                expected: desc.name,
                got: handle.kind_name(),
            });
        }
        self.typed.fetch_typed(self.table.resolve(handle), desc)
    }

    /// Untyped counterpart of [`unwrap_typed`](Self::unwrap_typed).
    pub fn data_ptr(&self, handle: Handle) -> Result<*mut c_void, BridgeError> {
        if !handle.is_managed() {
            return Err(BridgeError::TypeMismatch {
                expected: "data",
                got: handle.kind_name(),
            });
        }
        self.typed.fetch_untyped(self.table.resolve(handle))
    }

    /// Collector mark hook for one container object.
    ///
    /// # Safety
    ///
    /// The wrapped pointer must still be live (see
    /// `TypedDataRegistry::mark`).
    pub unsafe fn mark_data(&self, container: ObjectId, visitor: &mut dyn FnMut(&mut Handle)) {
        unsafe { self.typed.mark(container, visitor) };
    }

    /// Native-heap bytes attributed to one container object.
    pub fn data_size(&self, container: ObjectId) -> usize {
        self.typed.size(container)
    }

    // ── Integer codec ──────────────────────────────────────────────

    /// Pack the integer behind `handle` into `words`; see [`intpack::pack`]
    /// for the layout flags and the sign-code contract.
    pub fn pack_integer(
        &self,
        handle: Handle,
        words: &mut [u8],
        numwords: usize,
        wordsize: usize,
        nails: usize,
        flags: u32,
    ) -> Result<i8, BridgeError> {
        let value = self.to_bigint(handle)?;
        intpack::pack(&value, words, numwords, wordsize, nails, flags)
    }

    /// Unpack `words` into a handle: a fixnum when the value fits, a fresh
    /// host big integer otherwise.
    pub fn unpack_integer(
        &mut self,
        words: &[u8],
        numwords: usize,
        wordsize: usize,
        nails: usize,
        flags: u32,
    ) -> Result<Handle, BridgeError> {
        let value = intpack::unpack(words, numwords, wordsize, nails, flags)?;
        Ok(self.from_bigint(&value))
    }

    fn to_bigint(&self, handle: Handle) -> Result<BigInt, BridgeError> {
        if let Some(n) = handle.as_fixnum() {
            return Ok(BigInt::from_i64(n));
        }
        if handle.is_managed() {
            let id = self.table.resolve(handle);
            if let Some((sign, limbs)) = self.host.big_integer(id) {
                return Ok(BigInt::from_sign_limbs(sign, &limbs));
            }
        }
        Err(BridgeError::TypeMismatch { expected: "integer", got: handle.kind_name() })
    }

    fn from_bigint(&mut self, value: &BigInt) -> Handle {
        if let Some(n) = value.to_i64()
            && Handle::fixnum_fits(n)
        {
            return Handle::from_i64(n);
        }
        let id = self.host.new_big_integer(value.sign, &value.limbs);
        self.wrap(HostRef::Object(id))
    }

    // ── Roots ──────────────────────────────────────────────────────

    /// Register the address of a long-lived native handle variable.
    ///
    /// # Safety
    ///
    /// See `RootRegistry::register`.
    pub unsafe fn register_root(&mut self, address: *mut Handle) {
        unsafe { self.roots.register(address) };
    }

    pub fn unregister_root(&mut self, address: *mut Handle) {
        self.roots.unregister(address);
    }

    pub fn push_pin_scope(&mut self) {
        self.roots.push_scope();
    }

    pub fn pin(&mut self, handle: Handle) {
        self.roots.pin(handle);
    }

    pub fn pop_pin_scope(&mut self) {
        self.roots.pop_scope();
    }

    /// Visit every registered root slot, for the host's collector scan.
    ///
    /// # Safety
    ///
    /// See `RootRegistry::visit`.
    pub unsafe fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Handle)) {
        unsafe { self.roots.visit(visitor) };
    }

    // ── Collection callbacks ───────────────────────────────────────

    /// The host reports one object as collected: its handle-table slot is
    /// released (invalidating outstanding handles) and, if the object was
    /// a data container, its free policy runs.
    pub fn object_collected(&mut self, id: ObjectId) {
        self.typed.finalize(id);
        self.table.release(id);
    }

    /// Host identities the table still keeps alive, for the host to treat
    /// as additional GC roots.
    pub fn live_objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.table.live_targets()
    }

    pub fn live_handles(&self) -> usize {
        self.table.live()
    }
}
