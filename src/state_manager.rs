//! Typed calls into a Lua interpreter.

use std::fmt;

use selene_core::{CallError, Interpreter, NativeError, NativeFn, State, StateConfig, ValueKind};

use crate::convert::{Argument, Arguments, FromReturn, Numeric};
use crate::libraries::{Libraries, Library};

/// Owns one Lua interpreter and marshals calls into it.
///
/// Calls are best effort: a missing function, a global that is not
/// callable, or a script error all yield the default value of the
/// requested return type. Failures are logged, never returned. Every call
/// leaves the stack at the height it had before the call.
///
/// The manager can be moved but not cloned; dropping it closes the
/// interpreter, which frees every userdata block still alive.
///
/// ```
/// use selene::{CallError, State, StateManager};
///
/// let mut lua = StateManager::new();
/// lua.run_script("setup", "function add(a, b) return a + b end")?;
/// lua.register_function("twice", |s: &mut State| {
///     let n = s.check_number(1)?;
///     s.push_number(n * 2.0);
///     Ok(1)
/// });
///
/// let sum: i32 = lua.call("add", (2, 3));
/// assert_eq!(sum, 5);
/// assert_eq!(lua.call::<f64, _>("twice", (1.25,)), 2.5);
///
/// let missing: i32 = lua.call("nope", ());
/// assert_eq!(missing, 0);
/// # Ok::<(), CallError>(())
/// ```
pub struct StateManager {
    state: Interpreter,
}

impl StateManager {
    pub fn new() -> Self {
        Self::with_config(StateConfig::default())
    }

    pub fn with_config(config: StateConfig) -> Self {
        Self {
            state: Interpreter::with_config(config),
        }
    }

    /// The underlying state.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// The underlying state, for operations not covered by the manager.
    /// Values left on the stack are the caller's to pop.
    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    /// Number of values on the stack.
    pub fn top(&self) -> usize {
        self.state.top()
    }

    // =========================================================================
    // STACK ACCESS
    // =========================================================================

    /// Push the global `name` (nil when unbound) and return its type.
    pub fn load_global(&mut self, name: &str) -> ValueKind {
        self.state.get_global(name)
    }

    /// Number at `idx` converted to `T`; zero when it is not a number.
    pub fn get_number<T: Numeric>(&self, idx: i32) -> T {
        T::from_return(&self.state, idx)
    }

    /// String at `idx`; numbers are formatted as `tostring` formats them,
    /// anything else is empty.
    pub fn get_string(&self, idx: i32) -> String {
        String::from_return(&self.state, idx)
    }

    /// Boolean at `idx`; false for anything that is not a boolean.
    pub fn get_bool(&self, idx: i32) -> bool {
        bool::from_return(&self.state, idx)
    }

    pub fn push_number<T: Numeric>(&mut self, number: T) {
        number.push(&mut self.state);
    }

    pub fn push_nil(&mut self) {
        self.state.push_nil();
    }

    pub fn push_bool(&mut self, value: bool) {
        self.state.push_boolean(value);
    }

    pub fn push_string(&mut self, value: &str) {
        self.state.push_string(value);
    }

    /// Push a single argument of any supported kind.
    pub fn push_argument<A: Argument>(&mut self, argument: A) {
        argument.push(&mut self.state);
    }

    /// Push a tuple of arguments left to right and return how many.
    pub fn push_arguments<A: Arguments>(&mut self, arguments: A) -> usize {
        arguments.push_all(&mut self.state)
    }

    // =========================================================================
    // GLOBALS & LIBRARIES
    // =========================================================================

    /// Bind `value` to the global `name`. Binding nil removes it.
    pub fn set_global<A: Argument>(&mut self, name: &str, value: A) -> Result<(), NativeError> {
        value.push(&mut self.state);
        self.state.set_global(name)
    }

    /// Bind a host function to the global `name` so it can be called by name.
    pub fn register_function<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&mut State) -> Result<usize, NativeError> + 'static,
    {
        self.state.register(name, NativeFn::new(name, function));
    }

    /// Open `library` and bind its table to its global name.
    ///
    /// The table is also recorded in `package.loaded`, so `require` finds
    /// it and argument errors name its functions as `array.new`.
    pub fn open_library(&mut self, library: Library) -> Result<(), NativeError> {
        let top = self.state.top();
        let opened = library
            .open(&mut self.state)
            .and_then(|()| self.state.register_module(library.global_name()));
        if opened.is_err() {
            self.state.set_top(top);
        }
        tracing::debug!(%library, ok = opened.is_ok(), "opened library");
        opened
    }

    /// Open every library in `libraries`.
    pub fn open_libraries(&mut self, libraries: Libraries) -> Result<(), NativeError> {
        libraries
            .iter_libraries()
            .try_for_each(|library| self.open_library(library))
    }

    // =========================================================================
    // SCRIPTS & MEMORY
    // =========================================================================

    /// Compile and run `source`, discarding its results.
    ///
    /// Unlike [`call`](Self::call), failures are returned: they usually
    /// mean the script itself is broken. `chunk_name` prefixes error
    /// messages.
    pub fn run_script(&mut self, chunk_name: &str, source: &str) -> Result<(), CallError> {
        let top = self.state.top();
        let result = self
            .state
            .load(source, chunk_name)
            .and_then(|()| self.state.pcall(0, 0));
        self.state.set_top(top);
        if let Err(err) = &result {
            tracing::warn!(chunk = chunk_name, error = %err, "script failed");
        }
        result
    }

    /// Run a full garbage collection cycle.
    pub fn collect_garbage(&mut self) {
        self.state.collect_garbage();
    }

    /// Bytes currently allocated by the interpreter.
    pub fn memory_used(&self) -> usize {
        self.state.memory_used()
    }

    // =========================================================================
    // CALLS
    // =========================================================================

    /// Call the global function `name` with `args` and convert its first
    /// result to `R`.
    ///
    /// Returns `R::default()` when `name` is not a function or the call
    /// raises an error.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call<R: FromReturn, A: Arguments>(&mut self, name: &str, args: A) -> R {
        let top = self.state.top();
        let result = if self.load_callable(name) {
            let nargs = args.push_all(&mut self.state);
            match self.state.pcall(nargs, 1) {
                Ok(()) => R::from_return(&self.state, -1),
                Err(err) => {
                    tracing::warn!(function = name, error = %err, "script call failed");
                    R::default()
                }
            }
        } else {
            R::default()
        };
        self.state.set_top(top);
        result
    }

    /// Call the global function `name` with `args`, discarding any result.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call_void<A: Arguments>(&mut self, name: &str, args: A) {
        let top = self.state.top();
        if self.load_callable(name) {
            let nargs = args.push_all(&mut self.state);
            if let Err(err) = self.state.pcall(nargs, 0) {
                tracing::warn!(function = name, error = %err, "script call failed");
            }
        }
        self.state.set_top(top);
    }

    /// Push the global `name` and report whether it can be called.
    fn load_callable(&mut self, name: &str) -> bool {
        let kind = self.load_global(name);
        if kind == ValueKind::Function {
            tracing::trace!(function = name, "calling");
            true
        } else {
            tracing::debug!(function = name, %kind, "global is not callable");
            false
        }
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateManager")
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::Nil;

    fn with_divide() -> StateManager {
        let mut lua = StateManager::new();
        lua.run_script("divide", "function divide(a, b) return a / b end")
            .unwrap();
        lua
    }

    #[test]
    fn call_returns_converted_result() {
        let mut lua = with_divide();
        let half: f64 = lua.call("divide", (1, 2));
        assert_eq!(half, 0.5);
        let truncated: i32 = lua.call("divide", (7, 2));
        assert_eq!(truncated, 3);
        assert_eq!(lua.top(), 0);
    }

    #[test]
    fn script_error_yields_default() {
        let mut lua = with_divide();
        let result: f64 = lua.call("divide", (1, "x"));
        assert_eq!(result, 0.0);
        assert_eq!(lua.top(), 0);
    }

    #[test]
    fn missing_and_non_callable_match() {
        let mut lua = StateManager::new();
        lua.set_global("answer", 42).unwrap();

        let missing: i32 = lua.call("missing", (1,));
        let not_fn: i32 = lua.call("answer", (1,));
        assert_eq!(missing, not_fn);
        assert_eq!(missing, 0);

        let s: String = lua.call("answer", ());
        assert_eq!(s, "");
        assert_eq!(lua.top(), 0);
    }

    #[test]
    fn call_void_runs_side_effects() {
        let mut lua = StateManager::new();
        lua.run_script("store", "function store(v) stored = v end")
            .unwrap();

        lua.call_void("store", ("kept",));
        lua.load_global("stored");
        assert_eq!(lua.get_string(-1), "kept");
        lua.state_mut().pop(1);

        lua.call_void("missing", (1, 2, 3));
        assert_eq!(lua.top(), 0);
    }

    #[test]
    fn stack_height_is_preserved() {
        let mut lua = with_divide();
        lua.push_number(99);
        for _ in 0..10 {
            let _: f64 = lua.call("divide", (4, 2));
            let _: f64 = lua.call("divide", (4, "x"));
            let _: f64 = lua.call("missing", ());
            lua.call_void("divide", (1, 1));
        }
        assert_eq!(lua.top(), 1);
        assert_eq!(lua.get_number::<i32>(-1), 99);
    }

    #[test]
    fn push_and_get_accessors() {
        let mut lua = StateManager::new();
        lua.push_number(3u8);
        lua.push_bool(true);
        lua.push_string("text");
        lua.push_nil();
        assert_eq!(lua.top(), 4);

        assert_eq!(lua.get_number::<u8>(1), 3);
        assert!(lua.get_bool(2));
        assert_eq!(lua.get_string(3), "text");
        assert_eq!(lua.get_number::<f32>(3), 0.0);
        assert!(!lua.get_bool(4));
        assert_eq!(lua.get_string(4), "");
    }

    #[test]
    fn push_arguments_reports_count() {
        let mut lua = StateManager::new();
        assert_eq!(lua.push_arguments((1, Nil, "s")), 3);
        lua.push_argument(Some(2.5));
        assert_eq!(lua.top(), 4);
        assert!(lua.state().is_nil(2));
        assert_eq!(lua.get_number::<f64>(-1), 2.5);
    }

    #[test]
    fn bool_result_from_function() {
        let mut lua = StateManager::new();
        lua.run_script("even", "function is_even(n) return n % 2 == 0 end")
            .unwrap();
        assert!(lua.call::<bool, _>("is_even", (4,)));
        assert!(!lua.call::<bool, _>("is_even", (3,)));
        assert!(!lua.call::<bool, _>("is_even", ("x",)));
    }

    #[test]
    fn registered_function_errors_are_absorbed() {
        let mut lua = StateManager::new();
        lua.register_function("strict", |s: &mut State| {
            let n = s.check_integer(1)?;
            s.push_integer(n + 1);
            Ok(1)
        });
        assert_eq!(lua.call::<i64, _>("strict", (41,)), 42);
        assert_eq!(lua.call::<i64, _>("strict", (1.5,)), 0);
        assert_eq!(lua.top(), 0);
    }

    #[test]
    fn open_library_binds_global() {
        let mut lua = StateManager::new();
        lua.open_libraries(Libraries::ARRAY).unwrap();
        assert_eq!(lua.top(), 0);
        assert_eq!(lua.load_global("array"), ValueKind::Table);
        lua.state_mut().pop(1);

        lua.run_script("require", "assert(require('array') == array)")
            .unwrap();
    }

    #[test]
    fn run_script_reports_failures() {
        let mut lua = StateManager::new();
        let err = lua.run_script("broken", "function (").unwrap_err();
        assert!(matches!(err, CallError::Syntax { .. }));

        let err = lua.run_script("raises", "error('no', 0)").unwrap_err();
        assert_eq!(err, CallError::Runtime { message: "no".into() });
        assert_eq!(lua.top(), 0);
    }

    #[test]
    fn runaway_recursion_is_absorbed() {
        let mut lua = StateManager::new();
        lua.run_script("recurse", "function recurse() return 1 + recurse() end")
            .unwrap();
        let result: Option<f64> = lua.call("recurse", ());
        assert_eq!(result, None);
        assert_eq!(lua.top(), 0);
    }
}
