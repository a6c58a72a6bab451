//! Native libraries for a Selene interpreter.
//!
//! - [`array`]: the `Selene.Array` fixed-size number array
//! - [`memory`]: bounded sequences over caller-provided storage
//!
//! ```
//! use selene_core::{Interpreter, ValueKind};
//!
//! let mut lua = Interpreter::new();
//! selene_modules::array::open(&mut lua).unwrap();
//! lua.register_module("array").unwrap();
//! assert_eq!(lua.get_global("array"), ValueKind::Table);
//! ```

pub mod array;
pub mod memory;

pub use memory::{BlockAllocator, BlockError, FixedSeq, ForeignBlock};
