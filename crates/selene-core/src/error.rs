//! Errors crossing the boundary between Rust and the interpreter.
//!
//! Native functions return `Err(NativeError)` to abort the current call.
//! The error is turned into a Lua error only after the native function has
//! returned, so unwinding never crosses a Rust frame. Protected calls and
//! chunk loads report their failures as [`CallError`].

use thiserror::Error;

/// Errors produced by a native function or by a primitive it called.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NativeError {
    /// An argument failed validation. Raised with `luaL_argerror`, which
    /// adds the name of the running function.
    #[error("bad argument #{position} ({message})")]
    Argument { position: i32, message: String },

    /// Any other failure, raised as a plain runtime error.
    #[error("{message}")]
    Runtime { message: String },

    /// An operation needed more values than the stack holds.
    #[error("stack underflow: needed {needed} values, {available} available")]
    StackUnderflow { needed: usize, available: usize },

    /// A stack index does not refer to a live slot.
    #[error("invalid stack index {index}")]
    InvalidIndex { index: i32 },
}

impl NativeError {
    /// Create a runtime error with the given message.
    pub fn runtime(message: impl Into<String>) -> Self {
        NativeError::Runtime {
            message: message.into(),
        }
    }

    /// The argument position this error refers to, if it is an argument error.
    pub fn position(&self) -> Option<i32> {
        match self {
            NativeError::Argument { position, .. } => Some(*position),
            _ => None,
        }
    }

    pub fn is_argument_error(&self) -> bool {
        self.position().is_some()
    }
}

impl From<CallError> for NativeError {
    fn from(err: CallError) -> Self {
        NativeError::runtime(err.to_string())
    }
}

/// Failure status of a protected call or a chunk load.
///
/// The interpreter's message is also left on the stack, as `lua_pcall`
/// leaves it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("{message}")]
    Runtime { message: String },

    #[error("{message}")]
    Syntax { message: String },

    #[error("not enough memory")]
    Memory,

    #[error("error in error handling: {message}")]
    Handler { message: String },

    /// Fewer values on the stack than the function and its arguments.
    #[error("stack underflow: needed {needed} values, {available} available")]
    StackUnderflow { needed: usize, available: usize },
}

impl CallError {
    /// The interpreter's message, without any prefix added here.
    pub fn message(&self) -> &str {
        match self {
            CallError::Runtime { message }
            | CallError::Syntax { message }
            | CallError::Handler { message } => message,
            CallError::Memory => "not enough memory",
            CallError::StackUnderflow { .. } => "stack underflow",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_display() {
        let err = NativeError::Argument {
            position: 2,
            message: "index out of bounds".into(),
        };
        assert_eq!(err.to_string(), "bad argument #2 (index out of bounds)");
        assert_eq!(err.position(), Some(2));
        assert!(err.is_argument_error());
    }

    #[test]
    fn runtime_has_no_position() {
        let err = NativeError::runtime("boom");
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.position(), None);
    }

    #[test]
    fn call_errors_become_runtime_errors() {
        let err = NativeError::from(CallError::Runtime {
            message: "script failed".into(),
        });
        assert_eq!(err, NativeError::runtime("script failed"));

        let err = NativeError::from(CallError::Memory);
        assert_eq!(err.to_string(), "not enough memory");
    }

    #[test]
    fn call_error_message() {
        let err = CallError::Handler {
            message: "loop".into(),
        };
        assert_eq!(err.message(), "loop");
        assert_eq!(err.to_string(), "error in error handling: loop");
    }
}
