//! Selene: typed host calls into an embedded Lua 5.4 interpreter.
//!
//! - [`StateManager`]: owns an interpreter and calls global functions by
//!   name with typed arguments and a typed result
//! - [`Argument`] / [`Arguments`] / [`FromReturn`]: conversions between
//!   Rust values and stack values
//! - [`Library`] / [`Libraries`]: native libraries to open into a state,
//!   such as the `Selene.Array` number array
//!
//! ## Example
//!
//! ```
//! use selene::{Libraries, State, StateManager};
//!
//! let mut lua = StateManager::new();
//! lua.open_libraries(Libraries::ARRAY).unwrap();
//!
//! lua.register_function("scale", |s: &mut State| {
//!     let n = s.check_number(1)?;
//!     s.push_number(n * 10.0);
//!     Ok(1)
//! });
//!
//! lua.run_script("main", r#"
//!     function fill(n)
//!         local a = array.new(n)
//!         for i = 1, n do a:set(i, scale(i)) end
//!         return a:get(n)
//!     end
//! "#).unwrap();
//!
//! let last: u32 = lua.call("fill", (4,));
//! assert_eq!(last, 40);
//! ```

pub mod convert;
pub mod libraries;
pub mod logging;
mod state_manager;

pub use convert::{Argument, Arguments, FromReturn, Nil, Numeric};
pub use libraries::{Libraries, Library, UnknownLibrary};
pub use state_manager::StateManager;

pub use selene_core::{
    CallError, GcMode, Interpreter, NativeError, NativeFn, State, StateConfig, Value, ValueKind,
};
pub use selene_modules::array;
