//! The seam toward the managed runtime.
//!
//! The bridge is decoupled from any specific host: consumers provide a
//! [`Host`] implementation covering one dynamic dispatch plus the handful of
//! allocations the bridge cannot perform itself (arrays for rest arguments,
//! big integers, opaque data containers). The host's object model, collector
//! and interpreter stay on the other side of this trait.

use crate::interning::SymbolId;

/// Stable identity of a managed host object.
///
/// The host assigns these; the bridge only compares them and hands them
/// back. Identity must be stable for the lifetime of the object (a moving
/// collector keeps the id, not the address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub u64);

/// A host-side value reference as the bridge sees it.
///
/// Immediate shapes are carried structurally so the value codec can encode
/// them without a table entry; everything else is an opaque [`ObjectId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostRef {
    Nil,
    /// The "not passed" sentinel, distinct from `Nil`.
    Undef,
    Bool(bool),
    /// Small integer within the handle codec's 63-bit immediate range
    /// (`Handle::fixnum_fits`). Wider host integers cross as big-integer
    /// objects instead.
    Fixnum(i64),
    Symbol(SymbolId),
    Object(ObjectId),
}

/// One marshaled call. Arguments always cross as a slice, never as a
/// native variadic list.
#[derive(Debug)]
pub struct HostCall<'a> {
    pub receiver: HostRef,
    pub selector: SymbolId,
    pub args: &'a [HostRef],
    /// Block forwarded verbatim from the calling native frame, if any.
    pub block: Option<HostRef>,
    /// Whether the trailing argument is flagged as a keyword hash. Signaled
    /// out of band so the host resolves keyword-vs-positional ambiguity the
    /// same way its own call sites do.
    pub kw_splat: bool,
}

/// An exception raised by the host during dispatch.
///
/// The bridge never catches these; they propagate to the native caller
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostException {
    pub message: String,
}

impl HostException {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl core::fmt::Display for HostException {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "host exception: {}", self.message)
    }
}

/// What the bridge needs from the managed runtime.
pub trait Host {
    /// Perform exactly one host-side dispatch.
    fn dispatch(&mut self, call: HostCall<'_>) -> Result<HostRef, HostException>;

    /// Allocate a host array holding `elems` (rest-argument capture).
    fn new_array(&mut self, elems: &[HostRef]) -> ObjectId;

    /// Allocate an empty container object for typed/untyped native data.
    /// The container's payload lives bridge-side in the typed registry.
    fn new_data_container(&mut self) -> ObjectId;

    /// Allocate a host big-integer from a sign and little-endian u64 limbs.
    fn new_big_integer(&mut self, sign: i8, limbs: &[u64]) -> ObjectId;

    /// Read back a host big-integer, or `None` if `id` is not one.
    fn big_integer(&self, id: ObjectId) -> Option<(i8, Vec<u64>)>;
}
