//! Argument scanning.
//!
//! A compact format string describes how a raw argument vector distributes
//! into typed output slots: `"<pre>[<optional>]['*'][<post>][':']['&']"`.
//! Formats are parsed once per distinct literal and cached for the process
//! lifetime; per invocation the scanner runs the phase pipeline
//! pre → optional → rest → post → keywords → block, skipping phases whose
//! count is zero.

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::RwLock;

use crate::error::BridgeError;
use crate::value::Handle;

/// Parsed shape of a format string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgFormat {
    pub pre: u8,
    pub optional: u8,
    pub rest: bool,
    pub post: u8,
    pub kwargs: bool,
    pub block: bool,
}

/// How the call site qualified its trailing argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KwIndication {
    /// No indication; the trailing-nil convention applies (see
    /// [`distribute`]).
    Unspecified,
    /// Keywords were explicitly passed: the trailing argument is the
    /// keyword hash.
    Given,
}

/// Where the keyword hash ended up for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KwOutcome {
    /// Format does not capture keywords.
    NotCaptured,
    /// Captured but not passed; slot gets the undefined sentinel.
    Absent,
    /// Trailing nil consumed as an explicitly-nil keyword hash.
    ExplicitNil,
    /// Trailing argument reserved as the keyword hash.
    Reserved,
}

/// Index plan for one invocation, produced by [`distribute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Distribution {
    /// Positional count after keyword-hash reservation.
    pub n: usize,
    pub opts_taken: usize,
    pub rest_start: usize,
    pub rest_len: usize,
    pub kw: KwOutcome,
    /// Arguments consumed, including a reserved/consumed trailing hash.
    pub consumed: usize,
}

impl ArgFormat {
    /// Parse a format string.
    ///
    /// Grammar: up to two digits (required count, then optional count), an
    /// optional `*` (rest), one digit after `*` (post), `:` (keyword
    /// capture), `&` (block capture), in that order.
    pub fn parse(format: &str) -> Result<Self, BridgeError> {
        let mut out = ArgFormat {
            pre: 0,
            optional: 0,
            rest: false,
            post: 0,
            kwargs: false,
            block: false,
        };
        let bytes = format.as_bytes();
        let mut i = 0;

        if i < bytes.len() && bytes[i].is_ascii_digit() {
            out.pre = bytes[i] - b'0';
            i += 1;
        }
        if i < bytes.len() && bytes[i].is_ascii_digit() {
            out.optional = bytes[i] - b'0';
            i += 1;
        }
        if i < bytes.len() && bytes[i] == b'*' {
            out.rest = true;
            i += 1;
        }
        if i < bytes.len() && bytes[i].is_ascii_digit() {
            if !out.rest {
                return Err(BridgeError::Argument {
                    message: "post-arguments require a rest marker in the format",
                });
            }
            out.post = bytes[i] - b'0';
            i += 1;
        }
        if i < bytes.len() && bytes[i] == b':' {
            out.kwargs = true;
            i += 1;
        }
        if i < bytes.len() && bytes[i] == b'&' {
            out.block = true;
            i += 1;
        }
        if i != bytes.len() {
            return Err(BridgeError::Argument { message: "malformed argument format string" });
        }
        Ok(out)
    }

    /// Parse with process-lifetime caching keyed by the format literal.
    pub fn cached(format: &'static str) -> Result<Self, BridgeError> {
        static CACHE: OnceLock<RwLock<HashMap<&'static str, ArgFormat>>> = OnceLock::new();
        let cache = CACHE.get_or_init(|| RwLock::new(HashMap::new()));
        if let Some(&parsed) = cache.read().get(format) {
            return Ok(parsed);
        }
        let parsed = Self::parse(format)?;
        cache.write().insert(format, parsed);
        Ok(parsed)
    }

    /// Minimum positional count.
    #[inline(always)]
    pub fn min(&self) -> usize {
        self.pre as usize + self.post as usize
    }

    /// Maximum positional count, `None` with a rest parameter.
    #[inline(always)]
    pub fn max(&self) -> Option<usize> {
        if self.rest {
            None
        } else {
            Some(self.pre as usize + self.optional as usize + self.post as usize)
        }
    }

    /// Number of output slots this format fills, in declaration order:
    /// pre, optional, rest, post, keywords, block.
    pub fn slot_count(&self) -> usize {
        self.pre as usize
            + self.optional as usize
            + usize::from(self.rest)
            + self.post as usize
            + usize::from(self.kwargs)
            + usize::from(self.block)
    }
}

/// Distribute `args` according to `format`.
///
/// Keyword pre-pass (only when the format captures keywords):
/// 1. `KwIndication::Given` always reserves the trailing argument; an empty
///    vector with the flag fails the arity check outright.
/// 2. Otherwise a trailing `nil` is consumed as an explicitly-nil keyword
///    hash only when the count does not strictly require it as positional
///    data (`argc > pre + post`).
/// 3. Otherwise nothing is reserved. A trailing non-nil object is never
///    promoted to a keyword hash without the explicit flag.
pub(crate) fn distribute(
    format: &ArgFormat,
    args: &[Handle],
    kw: KwIndication,
) -> Result<Distribution, BridgeError> {
    let mut n = args.len();
    let kw_outcome = if !format.kwargs {
        KwOutcome::NotCaptured
    } else {
        match kw {
            KwIndication::Given => {
                if args.is_empty() {
                    return Err(BridgeError::Arity {
                        given: 0,
                        min: format.min() + 1,
                        max: format.max().map(|m| m + 1),
                    });
                }
                n -= 1;
                KwOutcome::Reserved
            }
            KwIndication::Unspecified => {
                if n > format.min() && args[n - 1].is_nil() {
                    n -= 1;
                    KwOutcome::ExplicitNil
                } else {
                    KwOutcome::Absent
                }
            }
        }
    };

    let min = format.min();
    let max = format.max();
    if n < min || max.is_some_and(|max| n > max) {
        return Err(BridgeError::Arity { given: n, min, max });
    }

    let opts_taken = (n - min).min(format.optional as usize);
    let rest_start = format.pre as usize + opts_taken;
    let rest_len = n - rest_start - format.post as usize;
    debug_assert!(format.rest || rest_len == 0);

    let consumed = n
        + usize::from(matches!(kw_outcome, KwOutcome::Reserved | KwOutcome::ExplicitNil));
    log::trace!(
        "scan: n={n} opts={opts_taken} rest={rest_start}+{rest_len} kw={kw_outcome:?}"
    );
    Ok(Distribution {
        n,
        opts_taken,
        rest_start,
        rest_len,
        kw: kw_outcome,
        consumed,
    })
}
