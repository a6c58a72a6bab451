//! Lua 5.4 state wrapper and native calling convention for Selene.
//!
//! This crate provides the primitive surface a host adapter is built on:
//!
//! - [`Interpreter`]: owns one Lua state and closes it on drop
//! - [`State`]: the stack operations, shared by the owner and by native
//!   functions during a call
//! - [`Value`] / [`ValueKind`]: scalar stack values and type tags
//! - [`NativeFn`]: host callables following the stack calling convention
//! - [`NativeError`] / [`CallError`]: errors raised by native functions and
//!   reported by protected calls
//! - [`StateConfig`]: settings for a new interpreter
//!
//! Lua itself is built from source by `mlua-sys`.
//!
//! ## Calling Convention
//!
//! A native function receives the state with its arguments at stack
//! positions `1..=n`, pushes its results and returns how many it pushed:
//!
//! ```
//! use selene_core::{Interpreter, NativeFn, State};
//!
//! let mut lua = Interpreter::new();
//! lua.register("twice", NativeFn::new("twice", |s: &mut State| {
//!     let n = s.check_number(1)?;
//!     s.push_number(n * 2.0);
//!     Ok(1)
//! }));
//!
//! lua.load("return twice(21)", "example").unwrap();
//! lua.pcall(0, 1).unwrap();
//! assert_eq!(lua.to_number(-1), Some(42.0));
//! ```

mod config;
mod error;
mod interpreter;
mod native_fn;
mod state;
mod value;

pub use config::{GcMode, StateConfig};
pub use error::{CallError, NativeError};
pub use interpreter::Interpreter;
pub use native_fn::{NativeCallable, NativeFn};
pub use state::State;
pub use value::{Value, ValueKind};
