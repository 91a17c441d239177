use crate::interning::SymbolId;

/// Tag constants.
///
/// The low bit selects fixnum vs. everything else; odd values carry a
/// 3-bit tag in the low bits.
const FIXNUM_MASK: u64 = 0b1;
const TAG_MASK: u64 = 0b111;
const MANAGED_TAG: u64 = 0b001;
const SYMBOL_TAG: u64 = 0b011;
const SINGLETON_TAG: u64 = 0b101;

const PAYLOAD_SHIFT: u32 = 3;

/// Managed-handle field layout: index in bits 3..35, generation in 35..61.
const INDEX_BITS: u32 = 32;
const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;
const GEN_SHIFT: u32 = PAYLOAD_SHIFT + INDEX_BITS;
pub(crate) const GEN_BITS: u32 = 26;
pub(crate) const GEN_MASK: u32 = (1 << GEN_BITS) - 1;

const SINGLETON_NIL: u64 = 0;
const SINGLETON_FALSE: u64 = 1;
const SINGLETON_TRUE: u64 = 2;
const SINGLETON_UNDEF: u64 = 3;

/// An opaque 64-bit handle.
///
/// Encoding:
/// - **Fixnum**:    `...XXXXX0` — 63-bit signed integer (low bit 0).
/// - **Managed**:   `...XX001` — table slot index + generation.
/// - **Symbol**:    `...XX011` — interned symbol id.
/// - **Singleton**: `...XX101` — nil / false / true / undefined.
/// - `...XX111` is reserved and never produced.
///
/// Immediates (fixnum, symbol, singleton) are fully encoded in the bit
/// pattern and compare by value; a managed handle is only meaningful while
/// the referenced table slot is live.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Handle(u64);

impl Handle {
    pub const NIL: Handle = Handle((SINGLETON_NIL << PAYLOAD_SHIFT) | SINGLETON_TAG);
    pub const FALSE: Handle = Handle((SINGLETON_FALSE << PAYLOAD_SHIFT) | SINGLETON_TAG);
    pub const TRUE: Handle = Handle((SINGLETON_TRUE << PAYLOAD_SHIFT) | SINGLETON_TAG);
    /// The "not passed" sentinel. Distinct from [`Handle::NIL`] so callers
    /// can tell an absent optional argument from an explicit nil.
    pub const UNDEF: Handle = Handle((SINGLETON_UNDEF << PAYLOAD_SHIFT) | SINGLETON_TAG);

    #[inline(always)]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    // ── Fixnum ─────────────────────────────────────────────────────

    #[inline(always)]
    pub const fn is_fixnum(self) -> bool {
        self.0 & FIXNUM_MASK == 0
    }

    #[inline(always)]
    pub fn from_i64(n: i64) -> Self {
        debug_assert!(
            (-(1i64 << 62)..(1i64 << 62)).contains(&n),
            "fixnum overflow: {n}"
        );
        Self((n << 1) as u64)
    }

    /// Largest magnitude representable as a fixnum handle.
    #[inline(always)]
    pub const fn fixnum_fits(n: i64) -> bool {
        n >= -(1i64 << 62) && n < (1i64 << 62)
    }

    /// # Safety
    ///
    /// The handle must be a fixnum.
    #[inline(always)]
    pub unsafe fn to_i64(self) -> i64 {
        debug_assert!(self.is_fixnum());
        (self.0 as i64) >> 1
    }

    #[inline(always)]
    pub fn as_fixnum(self) -> Option<i64> {
        if self.is_fixnum() {
            Some(unsafe { self.to_i64() })
        } else {
            None
        }
    }

    // ── Symbol ─────────────────────────────────────────────────────

    #[inline(always)]
    pub const fn is_symbol(self) -> bool {
        self.0 & TAG_MASK == SYMBOL_TAG
    }

    #[inline(always)]
    pub fn from_symbol(id: SymbolId) -> Self {
        Self(((id.raw() as u64) << PAYLOAD_SHIFT) | SYMBOL_TAG)
    }

    /// # Safety
    ///
    /// The handle must be a symbol.
    #[inline(always)]
    pub unsafe fn symbol_id(self) -> SymbolId {
        debug_assert!(self.is_symbol());
        SymbolId::from_raw((self.0 >> PAYLOAD_SHIFT) as u32)
    }

    // ── Singletons ─────────────────────────────────────────────────

    #[inline(always)]
    pub const fn is_nil(self) -> bool {
        self.0 == Self::NIL.0
    }

    #[inline(always)]
    pub const fn is_undef(self) -> bool {
        self.0 == Self::UNDEF.0
    }

    #[inline(always)]
    pub const fn is_singleton(self) -> bool {
        self.0 & TAG_MASK == SINGLETON_TAG
    }

    #[inline(always)]
    pub fn from_bool(b: bool) -> Self {
        if b { Self::TRUE } else { Self::FALSE }
    }

    // ── Managed ────────────────────────────────────────────────────

    #[inline(always)]
    pub const fn is_managed(self) -> bool {
        self.0 & TAG_MASK == MANAGED_TAG
    }

    #[inline(always)]
    pub const fn is_immediate(self) -> bool {
        !self.is_managed()
    }

    #[inline(always)]
    pub(crate) fn from_slot(index: u32, generation: u32) -> Self {
        debug_assert!(generation <= GEN_MASK, "generation overflow");
        Self(
            ((generation as u64) << GEN_SHIFT)
                | ((index as u64) << PAYLOAD_SHIFT)
                | MANAGED_TAG,
        )
    }

    /// # Safety
    ///
    /// The handle must be managed.
    #[inline(always)]
    pub(crate) unsafe fn slot_index(self) -> u32 {
        debug_assert!(self.is_managed());
        ((self.0 >> PAYLOAD_SHIFT) & INDEX_MASK) as u32
    }

    /// # Safety
    ///
    /// The handle must be managed.
    #[inline(always)]
    pub(crate) unsafe fn generation(self) -> u32 {
        debug_assert!(self.is_managed());
        ((self.0 >> GEN_SHIFT) as u32) & GEN_MASK
    }

    /// Short classification name used in diagnostics.
    pub fn kind_name(self) -> &'static str {
        if self.is_fixnum() {
            "fixnum"
        } else if self.is_managed() {
            "object"
        } else if self.is_symbol() {
            "symbol"
        } else if self == Self::NIL {
            "nil"
        } else if self == Self::TRUE {
            "true"
        } else if self == Self::FALSE {
            "false"
        } else if self == Self::UNDEF {
            "undefined"
        } else {
            "malformed"
        }
    }
}

impl core::fmt::Debug for Handle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_fixnum() {
            write!(f, "Fixnum({})", unsafe { self.to_i64() })
        } else if self.is_managed() {
            write!(f, "Managed(slot {}, gen {})", unsafe { self.slot_index() }, unsafe {
                self.generation()
            })
        } else if self.is_symbol() {
            write!(f, "Symbol({})", unsafe { self.symbol_id() }.raw())
        } else if *self == Self::NIL {
            write!(f, "Nil")
        } else if *self == Self::TRUE {
            write!(f, "True")
        } else if *self == Self::FALSE {
            write!(f, "False")
        } else if *self == Self::UNDEF {
            write!(f, "Undef")
        } else {
            write!(f, "Malformed(0x{:016x})", self.0)
        }
    }
}
