//! Native function storage, callable trait and the C entry point that
//! dispatches into them.

use std::ffi::{CStr, c_int};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::{self, NonNull};
use std::rc::Rc;

use mlua_sys as ffi;

use crate::State;
use crate::error::NativeError;

/// Registry name of the metatable that finalizes stored functions.
pub(crate) const NATIVE_FN_TYPE: &CStr = c"selene.NativeFn";

/// Type-erased native function.
///
/// This wraps any callable that implements `NativeCallable`, allowing
/// functions of different shapes to be pushed uniformly as Lua closures.
///
/// The inner callable is reference counted so a call in progress keeps it
/// alive even if the closure that holds it is collected meanwhile.
#[derive(Clone)]
pub struct NativeFn {
    name: Rc<str>,
    inner: Rc<dyn NativeCallable>,
}

impl NativeFn {
    /// Create a new NativeFn from a closure.
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(&mut State) -> Result<usize, NativeError> + 'static,
    {
        Self::from_callable(name, f)
    }

    /// Create a new NativeFn from any `NativeCallable`.
    pub fn from_callable<C>(name: &str, callable: C) -> Self
    where
        C: NativeCallable + 'static,
    {
        Self {
            name: Rc::from(name),
            inner: Rc::new(callable),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call this native function.
    ///
    /// Arguments are at stack positions `1..=n`. The returned count says
    /// how many values at the top are results.
    pub fn call(&self, state: &mut State) -> Result<usize, NativeError> {
        self.inner.call(state)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Trait for callable native functions.
///
/// This is the core trait that all native functions implement. The `call`
/// method reads arguments from the state's stack, pushes results and
/// returns their count.
pub trait NativeCallable {
    fn call(&self, state: &mut State) -> Result<usize, NativeError>;
}

impl<F> NativeCallable for F
where
    F: Fn(&mut State) -> Result<usize, NativeError>,
{
    fn call(&self, state: &mut State) -> Result<usize, NativeError> {
        (self)(state)
    }
}

// ============================================================================
// C entry points
// ============================================================================

/// How a native call leaves the interpreter. The error message, if any, is
/// already on top of the stack.
#[derive(Debug, Clone, Copy)]
enum Exit {
    Return(c_int),
    Error,
    Argument(c_int),
}

/// Entry point of every pushed [`NativeFn`]; upvalue 1 holds the function.
pub(crate) unsafe extern "C-unwind" fn call_native(raw: *mut ffi::lua_State) -> c_int {
    // Every Rust value is dropped inside `invoke`; raising below longjmps
    // over this frame only.
    match unsafe { invoke(raw) } {
        Exit::Return(count) => count,
        Exit::Error => unsafe { ffi::lua_error(raw) },
        Exit::Argument(position) => unsafe {
            ffi::luaL_argerror(raw, position, ffi::lua_tolstring(raw, -1, ptr::null_mut()))
        },
    }
}

unsafe fn invoke(raw: *mut ffi::lua_State) -> Exit {
    // SAFETY: the interpreter always calls with its own, non-null state.
    let mut state = unsafe { State::from_raw(NonNull::new_unchecked(raw)) };

    let slot = unsafe { ffi::lua_touserdata(raw, ffi::lua_upvalueindex(1)) }
        .cast::<Option<NativeFn>>();
    // SAFETY: upvalue 1 is the block written by `State::push_function`.
    let function = unsafe { slot.as_ref() }.and_then(Option::clone);
    let Some(function) = function else {
        state.push_string("attempt to call a finalized native function");
        return Exit::Error;
    };

    match panic::catch_unwind(AssertUnwindSafe(|| function.call(&mut state))) {
        Ok(Ok(count)) => {
            let available = state.top();
            match c_int::try_from(count) {
                Ok(results) if count <= available => Exit::Return(results),
                _ => {
                    state.push_string(&format!(
                        "'{}' returned {count} results with {available} values on the stack",
                        function.name()
                    ));
                    Exit::Error
                }
            }
        }
        Ok(Err(NativeError::Argument { position, message })) => {
            state.push_string(&message);
            Exit::Argument(position)
        }
        Ok(Err(err)) => {
            state.push_string(&err.to_string());
            Exit::Error
        }
        Err(_) => {
            tracing::error!(function = function.name(), "native function panicked");
            state.push_string(&format!("native function '{}' panicked", function.name()));
            Exit::Error
        }
    }
}

/// `__gc` of the userdata holding a [`NativeFn`].
pub(crate) unsafe extern "C-unwind" fn drop_native(raw: *mut ffi::lua_State) -> c_int {
    let slot = unsafe { ffi::lua_touserdata(raw, 1) }.cast::<Option<NativeFn>>();
    // SAFETY: only blocks written by `State::push_function` carry this
    // finalizer; taking leaves `None`, so a second run drops nothing.
    if let Some(slot) = unsafe { slot.as_mut() } {
        let function = slot.take();
        // A panicking destructor must not unwind into the collector.
        let _ = panic::catch_unwind(AssertUnwindSafe(move || drop(function)));
    }
    0
}
