//! Owner of one Lua state.

use std::alloc::{Layout, handle_alloc_error};
use std::ffi::c_int;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use mlua_sys as ffi;

use crate::State;
use crate::config::{GcMode, StateConfig};

/// A Lua 5.4 interpreter, closed on drop.
///
/// Dereferences to [`State`] for stack access. Closing runs every pending
/// finalizer, so registered functions and userdata blocks are released
/// exactly once. Not `Clone`, and neither `Send` nor `Sync`.
pub struct Interpreter {
    state: State,
    config: StateConfig,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(StateConfig::default())
    }

    /// Create an interpreter.
    ///
    /// Aborts through [`handle_alloc_error`] if Lua cannot allocate its
    /// initial state.
    pub fn with_config(config: StateConfig) -> Self {
        let Some(raw) = NonNull::new(unsafe { ffi::luaL_newstate() }) else {
            handle_alloc_error(Layout::new::<usize>());
        };
        // SAFETY: the state was just created and is closed only on drop.
        let state = unsafe { State::from_raw(raw) };

        if config.open_std_libs {
            unsafe { ffi::luaL_openlibs(raw.as_ptr()) };
        }
        if config.gc_mode == GcMode::Generational {
            unsafe { ffi::lua_gc(raw.as_ptr(), ffi::LUA_GCGEN, 0 as c_int, 0 as c_int) };
        }

        tracing::debug!(
            std_libs = config.open_std_libs,
            gc_mode = ?config.gc_mode,
            "created interpreter"
        );
        Self { state, config }
    }

    pub fn config(&self) -> &StateConfig {
        &self.config
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Interpreter {
    type Target = State;

    fn deref(&self) -> &State {
        &self.state
    }
}

impl DerefMut for Interpreter {
    fn deref_mut(&mut self) -> &mut State {
        &mut self.state
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        tracing::trace!(memory = self.state.memory_used(), "closing interpreter");
        unsafe { ffi::lua_close(self.state.raw()) };
    }
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("state", &self.state)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ValueKind;

    #[test]
    fn std_libs_by_default() {
        let mut lua = Interpreter::new();
        assert_eq!(lua.get_global("string"), ValueKind::Table);
        assert_eq!(lua.get_global("print"), ValueKind::Function);
    }

    #[test]
    fn bare_interpreter() {
        let mut lua = Interpreter::with_config(StateConfig::default().with_std_libs(false));
        assert_eq!(lua.get_global("string"), ValueKind::Nil);
        lua.load("return 6 * 7", "bare").unwrap();
        lua.pcall(0, 1).unwrap();
        assert_eq!(lua.to_integer(-1), Some(42));
    }

    #[test]
    fn generational_mode_runs_scripts() {
        let mut lua =
            Interpreter::with_config(StateConfig::default().with_gc_mode(GcMode::Generational));
        assert_eq!(lua.config().gc_mode, GcMode::Generational);
        lua.load("local t = {} for i = 1, 1000 do t[i] = {i} end return #t", "gen")
            .unwrap();
        lua.pcall(0, 1).unwrap();
        assert_eq!(lua.to_integer(-1), Some(1000));
    }

    #[test]
    fn interpreters_are_independent() {
        let mut a = Interpreter::new();
        let mut b = Interpreter::new();
        a.push_number(1.0);
        a.set_global("only_in_a").unwrap();
        assert_eq!(b.get_global("only_in_a"), ValueKind::Nil);
    }
}
