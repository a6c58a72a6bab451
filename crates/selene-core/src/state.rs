//! Safe view over a Lua 5.4 state.
//!
//! [`State`] wraps the C API calls the host adapter needs. Reads of stack
//! positions outside the live stack see no value and writes report
//! [`NativeError::InvalidIndex`], so no call here hands Lua an index it
//! would reject. Table access is raw: no metamethod can run, and therefore
//! no Lua error can be raised through a Rust frame. The one exception is
//! allocation failure, which Lua always raises.

use std::borrow::Cow;
use std::ffi::{CStr, CString, c_int};
use std::fmt;
use std::ptr::{self, NonNull};
use std::slice;

use mlua_sys as ffi;

use crate::error::{CallError, NativeError};
use crate::native_fn::{NATIVE_FN_TYPE, NativeFn, call_native, drop_native};
use crate::value::{Value, ValueKind};

/// A Lua state seen from Rust.
///
/// A `State` owns nothing. [`Interpreter`](crate::Interpreter) creates and
/// closes the underlying state and dereferences to this type, and native
/// functions receive one for the duration of their call.
///
/// Positive indices count from the bottom of the current frame (1 is the
/// first argument of a native function), negative indices from the top.
pub struct State {
    raw: NonNull<ffi::lua_State>,
}

/// Clamp a count to the C API's `int`.
fn c_count(n: usize) -> c_int {
    c_int::try_from(n).unwrap_or(c_int::MAX)
}

impl State {
    /// # Safety
    ///
    /// `raw` must point to a live Lua state that outlives the view.
    pub(crate) unsafe fn from_raw(raw: NonNull<ffi::lua_State>) -> Self {
        Self { raw }
    }

    pub(crate) fn raw(&self) -> *mut ffi::lua_State {
        self.raw.as_ptr()
    }

    /// Make room for `n` more values.
    ///
    /// # Panics
    ///
    /// Panics when the stack cannot grow that far. Inside a native function
    /// the panic becomes a Lua error.
    fn reserve(&self, n: usize) {
        // SAFETY: the state is live for the lifetime of the view.
        if unsafe { ffi::lua_checkstack(self.raw(), c_count(n)) } == 0 {
            panic!("stack overflow (cannot grow by {n} slots)");
        }
    }

    // =========================================================================
    // STACK
    // =========================================================================

    pub fn top(&self) -> usize {
        let top = unsafe { ffi::lua_gettop(self.raw()) };
        usize::try_from(top).unwrap_or(0)
    }

    /// Set the stack height, filling new slots with nil.
    pub fn set_top(&mut self, top: usize) {
        let current = self.top();
        if top > current {
            self.reserve(top - current);
        }
        unsafe { ffi::lua_settop(self.raw(), c_count(top)) }
    }

    /// Remove up to `n` values from the top.
    pub fn pop(&mut self, n: usize) {
        let top = self.top();
        self.set_top(top.saturating_sub(n));
    }

    /// Absolute position of `idx`, if it refers to a live slot.
    pub fn abs_index(&self, idx: i32) -> Option<i32> {
        let top = unsafe { ffi::lua_gettop(self.raw()) };
        let abs = if idx < 0 {
            top.checked_add(idx)?.checked_add(1)?
        } else {
            idx
        };
        (1..=top).contains(&abs).then_some(abs)
    }

    fn slot(&self, idx: i32) -> Result<i32, NativeError> {
        self.abs_index(idx)
            .ok_or(NativeError::InvalidIndex { index: idx })
    }

    fn require(&self, needed: usize) -> Result<(), NativeError> {
        let available = self.top();
        if available < needed {
            return Err(NativeError::StackUnderflow { needed, available });
        }
        Ok(())
    }

    /// Push a copy of the value at `idx`.
    pub fn push_copy(&mut self, idx: i32) -> Result<(), NativeError> {
        let idx = self.slot(idx)?;
        self.reserve(1);
        unsafe { ffi::lua_pushvalue(self.raw(), idx) };
        Ok(())
    }

    /// Remove the value at `idx`, shifting the values above it down.
    pub fn remove(&mut self, idx: i32) -> Result<(), NativeError> {
        let idx = self.slot(idx)?;
        unsafe {
            ffi::lua_rotate(self.raw(), idx, -1);
            ffi::lua_settop(self.raw(), -2);
        }
        Ok(())
    }

    // =========================================================================
    // PUSH
    // =========================================================================

    pub fn push_nil(&mut self) {
        self.reserve(1);
        unsafe { ffi::lua_pushnil(self.raw()) }
    }

    pub fn push_boolean(&mut self, b: bool) {
        self.reserve(1);
        unsafe { ffi::lua_pushboolean(self.raw(), c_int::from(b)) }
    }

    /// Push a float.
    pub fn push_number(&mut self, n: f64) {
        self.reserve(1);
        unsafe { ffi::lua_pushnumber(self.raw(), n) }
    }

    /// Push an integer; Lua keeps it apart from floats when formatting.
    pub fn push_integer(&mut self, n: i64) {
        self.reserve(1);
        unsafe { ffi::lua_pushinteger(self.raw(), n as ffi::lua_Integer) }
    }

    /// Push a copy of `s`; embedded NUL bytes are kept.
    pub fn push_string(&mut self, s: &str) {
        self.reserve(1);
        unsafe { ffi::lua_pushlstring(self.raw(), s.as_ptr().cast(), s.len()) };
    }

    pub fn push_value(&mut self, value: Value) {
        match value {
            Value::Nil => self.push_nil(),
            Value::Boolean(b) => self.push_boolean(b),
            Value::Number(n) => self.push_number(n),
            Value::String(s) => self.push_string(&s),
        }
    }

    /// Push `function` as a Lua closure.
    ///
    /// The function lives in a userdata upvalue whose `__gc` drops it once
    /// the closure is collected or the interpreter is closed.
    pub fn push_function(&mut self, function: NativeFn) {
        self.reserve(3);
        let raw = self.raw();
        unsafe {
            let slot = ffi::lua_newuserdatauv(raw, size_of::<Option<NativeFn>>(), 0)
                .cast::<Option<NativeFn>>();
            debug_assert!(slot.is_aligned());
            slot.write(Some(function));

            if ffi::luaL_newmetatable(raw, NATIVE_FN_TYPE.as_ptr()) != 0 {
                ffi::lua_pushcclosure(raw, drop_native, 0);
                ffi::lua_setfield(raw, -2, c"__gc".as_ptr());
                ffi::lua_pushboolean(raw, 0);
                ffi::lua_setfield(raw, -2, c"__metatable".as_ptr());
            }
            ffi::lua_setmetatable(raw, -2);
            ffi::lua_pushcclosure(raw, call_native, 1);
        }
    }

    // =========================================================================
    // READ
    // =========================================================================

    pub fn kind(&self, idx: i32) -> ValueKind {
        let Some(idx) = self.abs_index(idx) else {
            return ValueKind::None;
        };
        let code = unsafe { ffi::lua_type(self.raw(), idx) };
        ValueKind::try_from(code).unwrap_or(ValueKind::None)
    }

    pub fn is_nil(&self, idx: i32) -> bool {
        self.kind(idx) == ValueKind::Nil
    }

    pub fn is_none_or_nil(&self, idx: i32) -> bool {
        matches!(self.kind(idx), ValueKind::None | ValueKind::Nil)
    }

    pub fn is_boolean(&self, idx: i32) -> bool {
        self.kind(idx) == ValueKind::Boolean
    }

    /// Numbers and strings convertible to numbers.
    pub fn is_number(&self, idx: i32) -> bool {
        self.to_number(idx).is_some()
    }

    /// Strings and numbers, which convert to strings.
    pub fn is_string(&self, idx: i32) -> bool {
        matches!(self.kind(idx), ValueKind::String | ValueKind::Number)
    }

    pub fn is_function(&self, idx: i32) -> bool {
        self.kind(idx) == ValueKind::Function
    }

    pub fn is_table(&self, idx: i32) -> bool {
        self.kind(idx) == ValueKind::Table
    }

    pub fn is_userdata(&self, idx: i32) -> bool {
        matches!(self.kind(idx), ValueKind::UserData | ValueKind::LightUserData)
    }

    /// Number at `idx`, coercing numeric strings as Lua arithmetic does.
    pub fn to_number(&self, idx: i32) -> Option<f64> {
        let idx = self.abs_index(idx)?;
        let mut isnum: c_int = 0;
        let n = unsafe { ffi::lua_tonumberx(self.raw(), idx, &mut isnum) };
        (isnum != 0).then_some(n)
    }

    /// Integer at `idx`; floats and numeric strings convert only when
    /// they have an exact integer value.
    pub fn to_integer(&self, idx: i32) -> Option<i64> {
        let idx = self.abs_index(idx)?;
        let mut isnum: c_int = 0;
        let n = unsafe { ffi::lua_tointegerx(self.raw(), idx, &mut isnum) };
        (isnum != 0).then_some(n as i64)
    }

    /// Truthiness: only `nil`, `false` and no value are false.
    pub fn to_boolean(&self, idx: i32) -> bool {
        self.abs_index(idx)
            .is_some_and(|idx| unsafe { ffi::lua_toboolean(self.raw(), idx) } != 0)
    }

    /// String at `idx`. Numbers are formatted as Lua's `tostring` formats
    /// them (`"%.14g"` for floats); the conversion runs on a copy, so the
    /// stack is left unchanged. Invalid UTF-8 is replaced.
    pub fn to_str(&self, idx: i32) -> Option<Cow<'_, str>> {
        let idx = self.abs_index(idx)?;
        match self.kind(idx) {
            // SAFETY: the string stays at `idx` while `self` is borrowed.
            ValueKind::String => unsafe { self.bytes_at(idx) }.map(String::from_utf8_lossy),
            ValueKind::Number => {
                self.reserve(1);
                unsafe { ffi::lua_pushvalue(self.raw(), idx) };
                let formatted = unsafe { self.bytes_at(-1) }
                    .map(|bytes| String::from_utf8_lossy(bytes).into_owned());
                unsafe { ffi::lua_settop(self.raw(), -2) };
                formatted.map(Cow::Owned)
            }
            _ => None,
        }
    }

    /// Raw bytes of the string (or number, converted in place) at `idx`.
    ///
    /// # Safety
    ///
    /// The slice is valid only while the value stays on the stack.
    unsafe fn bytes_at(&self, idx: i32) -> Option<&[u8]> {
        let mut len = 0usize;
        let ptr = unsafe { ffi::lua_tolstring(self.raw(), idx, &mut len) };
        if ptr.is_null() {
            return None;
        }
        Some(unsafe { slice::from_raw_parts(ptr.cast::<u8>(), len) })
    }

    /// Copy of the value at `idx`. Tables, functions, userdata and threads
    /// read as `Nil`.
    pub fn value(&self, idx: i32) -> Value {
        match self.kind(idx) {
            ValueKind::Boolean => Value::Boolean(self.to_boolean(idx)),
            ValueKind::Number => self.to_number(idx).map_or(Value::Nil, Value::Number),
            ValueKind::String => self
                .to_str(idx)
                .map_or(Value::Nil, |s| Value::String(s.into_owned())),
            _ => Value::Nil,
        }
    }

    // =========================================================================
    // GLOBALS & TABLES
    // =========================================================================

    fn push_globals(&self) {
        self.reserve(1);
        unsafe {
            ffi::lua_rawgeti(
                self.raw(),
                ffi::LUA_REGISTRYINDEX,
                ffi::LUA_RIDX_GLOBALS as ffi::lua_Integer,
            )
        };
    }

    /// Push the global `name` (nil when unbound) and return its type.
    pub fn get_global(&mut self, name: &str) -> ValueKind {
        self.push_globals();
        self.push_string(name);
        unsafe {
            ffi::lua_rawget(self.raw(), -2);
            ffi::lua_rotate(self.raw(), -2, -1);
            ffi::lua_settop(self.raw(), -2);
        }
        self.kind(-1)
    }

    /// Pop the top value and bind it to the global `name`. Binding nil
    /// removes the global.
    pub fn set_global(&mut self, name: &str) -> Result<(), NativeError> {
        self.require(1)?;
        self.store_global(name);
        Ok(())
    }

    /// Bind `function` to the global `name`.
    pub fn register(&mut self, name: &str, function: NativeFn) {
        self.push_function(function);
        self.store_global(name);
    }

    /// Pop the top value into `_G[name]`; the stack must not be empty.
    fn store_global(&mut self, name: &str) {
        self.push_globals();
        self.push_string(name);
        unsafe {
            // value, _G, name -> _G, name, value
            ffi::lua_rotate(self.raw(), -3, -1);
            ffi::lua_rawset(self.raw(), -3);
            ffi::lua_settop(self.raw(), -2);
        }
    }

    /// Store the table on top in `package.loaded[name]` and bind it to the
    /// global `name`, popping it. Lua names functions found there in
    /// argument errors, as in `bad argument #1 to 'array.new'`.
    pub fn register_module(&mut self, name: &str) -> Result<(), NativeError> {
        let module = self.slot(-1)?;
        self.reserve(3);
        unsafe {
            ffi::luaL_getsubtable(self.raw(), ffi::LUA_REGISTRYINDEX, c"_LOADED".as_ptr());
        }
        self.push_string(name);
        unsafe {
            ffi::lua_pushvalue(self.raw(), module);
            ffi::lua_rawset(self.raw(), -3);
            ffi::lua_settop(self.raw(), -2);
        }
        self.set_global(name)
    }

    pub fn new_table(&mut self) {
        self.reserve(1);
        unsafe { ffi::lua_createtable(self.raw(), 0, 0) }
    }

    fn check_table(&self, idx: i32) -> Result<i32, NativeError> {
        let table = self.slot(idx)?;
        match self.kind(table) {
            ValueKind::Table => Ok(table),
            kind => Err(NativeError::runtime(format!(
                "attempt to index a {kind} value"
            ))),
        }
    }

    /// Pop the top value into field `key` of the table at `idx`.
    pub fn set_field(&mut self, idx: i32, key: &str) -> Result<(), NativeError> {
        let table = self.check_table(idx)?;
        self.require(1)?;
        self.push_string(key);
        unsafe {
            // value, key -> key, value
            ffi::lua_rotate(self.raw(), -2, 1);
            ffi::lua_rawset(self.raw(), table);
        }
        Ok(())
    }

    /// Push field `key` of the table at `idx` and return its type.
    pub fn get_field(&mut self, idx: i32, key: &str) -> Result<ValueKind, NativeError> {
        let table = self.check_table(idx)?;
        self.push_string(key);
        unsafe { ffi::lua_rawget(self.raw(), table) };
        Ok(self.kind(-1))
    }

    // =========================================================================
    // METATABLES & USERDATA
    // =========================================================================

    /// Push the metatable registered as `name`, creating it (with `__name`
    /// set) if needed. Returns whether it was created.
    pub fn new_metatable(&mut self, name: &CStr) -> bool {
        self.reserve(2);
        unsafe { ffi::luaL_newmetatable(self.raw(), name.as_ptr()) != 0 }
    }

    /// Push the metatable registered as `name` (nil when none) and return
    /// its type.
    pub fn get_named_metatable(&mut self, name: &CStr) -> ValueKind {
        self.reserve(1);
        let code = unsafe { ffi::lua_getfield(self.raw(), ffi::LUA_REGISTRYINDEX, name.as_ptr()) };
        ValueKind::try_from(code).unwrap_or(ValueKind::None)
    }

    /// Pop a table (or nil) and make it the metatable of the value at `idx`.
    pub fn set_metatable(&mut self, idx: i32) -> Result<(), NativeError> {
        let target = self.slot(idx)?;
        match self.kind(-1) {
            ValueKind::Table | ValueKind::Nil => {
                unsafe { ffi::lua_setmetatable(self.raw(), target) };
                Ok(())
            }
            kind => Err(NativeError::runtime(format!(
                "metatable must be a table, got {kind}"
            ))),
        }
    }

    /// Push the metatable of the value at `idx`, if it has one.
    pub fn get_metatable(&mut self, idx: i32) -> bool {
        let Some(idx) = self.abs_index(idx) else {
            return false;
        };
        self.reserve(1);
        unsafe { ffi::lua_getmetatable(self.raw(), idx) != 0 }
    }

    /// Allocate a zeroed userdata block of `size` bytes and push it.
    ///
    /// Lua owns the block, aligned for any scalar, and frees it once the
    /// object is collected.
    pub fn new_userdata(&mut self, size: usize) -> Result<NonNull<u8>, NativeError> {
        self.reserve(1);
        let ptr = unsafe { ffi::lua_newuserdatauv(self.raw(), size, 0) }.cast::<u8>();
        let block = NonNull::new(ptr).ok_or_else(|| NativeError::runtime("not enough memory"))?;
        unsafe { ptr::write_bytes(block.as_ptr(), 0, size) };
        Ok(block)
    }

    /// Block address of the full userdata at `idx`.
    pub fn to_userdata(&self, idx: i32) -> Option<NonNull<u8>> {
        if self.kind(idx) != ValueKind::UserData {
            return None;
        }
        let idx = self.abs_index(idx)?;
        NonNull::new(unsafe { ffi::lua_touserdata(self.raw(), idx) }.cast())
    }

    /// Size in bytes of the full userdata at `idx`.
    pub fn userdata_size(&self, idx: i32) -> Option<usize> {
        if self.kind(idx) != ValueKind::UserData {
            return None;
        }
        let idx = self.abs_index(idx)?;
        usize::try_from(unsafe { ffi::lua_rawlen(self.raw(), idx) }).ok()
    }

    /// Block of the userdata at `arg` if its metatable is the one registered
    /// as `name`.
    pub fn test_userdata(&self, arg: i32, name: &CStr) -> Option<NonNull<u8>> {
        if self.kind(arg) != ValueKind::UserData {
            return None;
        }
        let arg = self.abs_index(arg)?;
        self.reserve(2);
        NonNull::new(unsafe { ffi::luaL_testudata(self.raw(), arg, name.as_ptr()) }.cast())
    }

    /// As [`test_userdata`](Self::test_userdata), with a type error naming
    /// `name` on mismatch.
    pub fn check_userdata(&self, arg: i32, name: &CStr) -> Result<NonNull<u8>, NativeError> {
        self.test_userdata(arg, name)
            .ok_or_else(|| self.type_error(arg, &name.to_string_lossy()))
    }

    // =========================================================================
    // ARGUMENT CHECKS
    // =========================================================================

    /// Argument error at position `arg`.
    pub fn arg_error(&self, arg: i32, message: impl Into<String>) -> NativeError {
        NativeError::Argument {
            position: arg,
            message: message.into(),
        }
    }

    /// `"<expected> expected, got <actual>"` at position `arg`, where the
    /// actual type uses the value's `__name` when it has one.
    pub fn type_error(&self, arg: i32, expected: &str) -> NativeError {
        let actual = self.type_label(arg);
        self.arg_error(arg, format!("{expected} expected, got {actual}"))
    }

    fn type_label(&self, idx: i32) -> String {
        let kind = self.kind(idx);
        let fallback = match kind {
            ValueKind::LightUserData => "light userdata",
            kind => kind.name(),
        };
        let Some(idx) = self.abs_index(idx) else {
            return fallback.to_owned();
        };

        self.reserve(1);
        let field = unsafe { ffi::luaL_getmetafield(self.raw(), idx, c"__name".as_ptr()) };
        if field == ffi::LUA_TNIL {
            return fallback.to_owned();
        }
        let name = (field == ffi::LUA_TSTRING)
            .then(|| unsafe { self.bytes_at(-1) })
            .flatten()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned());
        unsafe { ffi::lua_settop(self.raw(), -2) };
        name.unwrap_or_else(|| fallback.to_owned())
    }

    pub fn arg_check(&self, cond: bool, arg: i32, message: &str) -> Result<(), NativeError> {
        if cond {
            Ok(())
        } else {
            Err(self.arg_error(arg, message))
        }
    }

    pub fn check_number(&self, arg: i32) -> Result<f64, NativeError> {
        self.to_number(arg)
            .ok_or_else(|| self.type_error(arg, ValueKind::Number.name()))
    }

    pub fn check_integer(&self, arg: i32) -> Result<i64, NativeError> {
        match self.to_integer(arg) {
            Some(n) => Ok(n),
            None if self.is_number(arg) => {
                Err(self.arg_error(arg, "number has no integer representation"))
            }
            None => Err(self.type_error(arg, ValueKind::Number.name())),
        }
    }

    pub fn check_string(&self, arg: i32) -> Result<String, NativeError> {
        self.to_str(arg)
            .map(Cow::into_owned)
            .ok_or_else(|| self.type_error(arg, ValueKind::String.name()))
    }

    // =========================================================================
    // CHUNKS & CALLS
    // =========================================================================

    /// Compile `source` as a text chunk and push it as a function.
    ///
    /// `chunk_name` prefixes error messages, as in `name:3: ...`.
    pub fn load(&mut self, source: &str, chunk_name: &str) -> Result<(), CallError> {
        let name = CString::new(format!("={chunk_name}")).map_err(|_| CallError::Syntax {
            message: format!("chunk name {chunk_name:?} contains a nul byte"),
        })?;
        self.reserve(1);
        let status = unsafe {
            ffi::luaL_loadbufferx(
                self.raw(),
                source.as_ptr().cast(),
                source.len(),
                name.as_ptr(),
                c"t".as_ptr(),
            )
        };
        self.status(status)
    }

    /// Call the function below the top `nargs` values in protected mode,
    /// keeping `nresults` results.
    ///
    /// On failure the function and its arguments are replaced by the error
    /// message, which is also returned.
    pub fn pcall(&mut self, nargs: usize, nresults: usize) -> Result<(), CallError> {
        let available = self.top();
        let needed = nargs.saturating_add(1);
        if available < needed {
            return Err(CallError::StackUnderflow { needed, available });
        }
        self.reserve(nresults.saturating_sub(nargs).saturating_add(1));
        let status =
            unsafe { ffi::lua_pcall(self.raw(), c_count(nargs), c_count(nresults), 0) };
        self.status(status)
    }

    fn status(&self, status: c_int) -> Result<(), CallError> {
        if status == ffi::LUA_OK {
            return Ok(());
        }
        let message = match self.to_str(-1) {
            Some(message) => message.into_owned(),
            None => format!("(error object is a {} value)", self.kind(-1)),
        };
        Err(match status {
            ffi::LUA_ERRSYNTAX => CallError::Syntax { message },
            ffi::LUA_ERRMEM => CallError::Memory,
            ffi::LUA_ERRERR => CallError::Handler { message },
            _ => CallError::Runtime { message },
        })
    }

    // =========================================================================
    // GARBAGE COLLECTION
    // =========================================================================

    /// Run a full collection cycle, finalizers included.
    pub fn collect_garbage(&mut self) {
        unsafe { ffi::lua_gc(self.raw(), ffi::LUA_GCCOLLECT) };
    }

    /// Bytes currently allocated by the interpreter.
    pub fn memory_used(&self) -> usize {
        let kilobytes = unsafe { ffi::lua_gc(self.raw(), ffi::LUA_GCCOUNT) };
        let bytes = unsafe { ffi::lua_gc(self.raw(), ffi::LUA_GCCOUNTB) };
        usize::try_from(kilobytes).unwrap_or(0) * 1024 + usize::try_from(bytes).unwrap_or(0)
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("top", &self.top())
            .finish_non_exhaustive()
    }
}
