use crate::host::HostException;

/// Recoverable bridge failures.
///
/// All variants travel through the ordinary `Result` channel, so native
/// code written against the "this call might raise" contract handles them
/// uniformly. Use of a reclaimed or malformed handle is deliberately *not*
/// represented here: that is a native-side memory bug and panics instead
/// (see `HandleTable::resolve`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Argument count outside the declared bounds. `max` is `None` when a
    /// rest parameter makes the maximum unlimited.
    Arity {
        given: usize,
        min: usize,
        max: Option<usize>,
    },
    /// Typed-data descriptor mismatch or wrong handle kind.
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },
    /// Malformed integer-pack flags, oversized parameters, bad format
    /// strings and the like.
    Argument { message: &'static str },
    /// Exception raised by the host during dispatch; propagated verbatim.
    Host(HostException),
    /// A no-lock call was cancelled by a cross-thread interrupt.
    Interrupted,
}

impl core::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BridgeError::Arity { given, min, max } => match max {
                Some(max) if max == min => {
                    write!(f, "wrong number of arguments (given {given}, expected {min})")
                }
                Some(max) => write!(
                    f,
                    "wrong number of arguments (given {given}, expected {min}..{max})"
                ),
                None => write!(
                    f,
                    "wrong number of arguments (given {given}, expected {min}+)"
                ),
            },
            BridgeError::TypeMismatch { expected, got } => {
                write!(f, "wrong argument type {got} (expected {expected})")
            }
            BridgeError::Argument { message } => write!(f, "{message}"),
            BridgeError::Host(e) => write!(f, "{e}"),
            BridgeError::Interrupted => write!(f, "interrupted"),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<HostException> for BridgeError {
    fn from(e: HostException) -> Self {
        BridgeError::Host(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_display_covers_bounded_and_unlimited() {
        let bounded = BridgeError::Arity { given: 1, min: 2, max: Some(3) };
        assert_eq!(
            bounded.to_string(),
            "wrong number of arguments (given 1, expected 2..3)"
        );

        let exact = BridgeError::Arity { given: 0, min: 2, max: Some(2) };
        assert_eq!(
            exact.to_string(),
            "wrong number of arguments (given 0, expected 2)"
        );

        let unlimited = BridgeError::Arity { given: 0, min: 1, max: None };
        assert_eq!(
            unlimited.to_string(),
            "wrong number of arguments (given 0, expected 1+)"
        );
    }

    #[test]
    fn host_exceptions_convert_without_losing_the_message() {
        let err: BridgeError = HostException::new("boom").into();
        assert_eq!(err.to_string(), "host exception: boom");
    }
}
