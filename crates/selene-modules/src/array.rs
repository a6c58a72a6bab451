//! `Selene.Array` - a fixed-size number array stored in userdata.
//!
//! Each array is a single userdata block allocated by Lua:
//!
//! ```text
//! +----------------+---------+---------+-----+-------------+
//! | len: usize     | f64 [0] | f64 [1] | ... | f64 [len-1] |
//! +----------------+---------+---------+-----+-------------+
//! ```
//!
//! Lua owns the block and frees it when the array is collected. Element
//! access views the storage through [`ForeignBlock`], so reads and writes
//! go through the bounds checks of [`FixedSeq`] without copying or
//! reallocating.
//!
//! Script-facing indices are 1-based. The functions are also reachable as
//! methods, as in `a:get(1)`.
//!
//! | Function | Arguments | Results |
//! |----------|-----------|---------|
//! | `new` | `count` (integer, at least 1) | the array |
//! | `get` | `array`, `index` | element value |
//! | `set` | `array`, `index`, `value` | none |
//! | `size` | `array` | element count |

use std::alloc::Layout;
use std::ffi::CStr;
use std::ptr::NonNull;

use selene_core::{NativeError, NativeFn, State};

use crate::memory::{BlockError, FixedSeq, ForeignBlock};

/// Name the array metatable is registered under.
pub const TYPE_NAME: &CStr = c"Selene.Array";

const INVALID_SIZE: &str = "invalid size";
const OUT_OF_BOUNDS: &str = "index out of bounds";
const MALFORMED: &str = "malformed Selene.Array";

#[repr(C)]
struct ArrayHeader {
    len: usize,
}

/// Layout of a block holding `count` elements, and the offset of the first.
fn block_layout(count: usize) -> Option<(Layout, usize)> {
    let elements = Layout::array::<f64>(count).ok()?;
    let (layout, offset) = Layout::new::<ArrayHeader>().extend(elements).ok()?;
    Some((layout.pad_to_align(), offset))
}

/// An array argument validated against the registered type.
struct ArrayBlock {
    header: NonNull<ArrayHeader>,
    data: NonNull<f64>,
}

impl ArrayBlock {
    fn len(&self) -> usize {
        // SAFETY: the header is written by `new_array` before the block
        // receives the array metatable and is never modified afterwards.
        unsafe { self.header.as_ref().len }
    }

    /// View the element storage as a bounded sequence.
    ///
    /// # Safety
    ///
    /// The block must stay alive for `'a` and no other view may access it
    /// meanwhile. Both hold while the array value sits in an argument slot
    /// of the running call and only one view is created per call.
    unsafe fn elements<'a>(&self) -> Result<FixedSeq<f64, ForeignBlock<'a, f64>>, BlockError> {
        let len = self.len();
        // SAFETY: forwarded from the caller; the block holds `len` elements.
        let block = unsafe { ForeignBlock::from_raw(self.data, len) };
        FixedSeq::with_len_in(len, block)
    }
}

/// Validate argument 1 as an array.
fn check_array(state: &State) -> Result<ArrayBlock, NativeError> {
    let ptr = state.check_userdata(1, TYPE_NAME)?;
    let header = ptr.cast::<ArrayHeader>();

    // A block may carry the metatable without having been built by `new`.
    let block_size = state.userdata_size(1).unwrap_or(0);
    if block_size < size_of::<ArrayHeader>() || !header.is_aligned() {
        return Err(state.arg_error(1, MALFORMED));
    }
    // SAFETY: the block is large enough and aligned for a header.
    let len = unsafe { header.as_ref().len };
    let (layout, offset) = block_layout(len).ok_or_else(|| state.arg_error(1, MALFORMED))?;
    if block_size < layout.size() {
        return Err(state.arg_error(1, MALFORMED));
    }

    // SAFETY: offset lies within the block, checked above.
    let data = unsafe { ptr.add(offset) }.cast::<f64>();
    Ok(ArrayBlock { header, data })
}

/// Validate argument 2 as a 1-based index into `array`, returning it 0-based.
fn check_index(state: &State, array: &ArrayBlock) -> Result<usize, NativeError> {
    let index = state.check_integer(2)?;
    let zero_based = index.checked_sub(1).and_then(|i| usize::try_from(i).ok());
    match zero_based {
        Some(i) if i < array.len() => Ok(i),
        _ => Err(state.arg_error(2, OUT_OF_BOUNDS)),
    }
}

fn new_array(state: &mut State) -> Result<usize, NativeError> {
    let count = state.check_integer(1)?;
    state.arg_check(count >= 1, 1, INVALID_SIZE)?;

    let len = usize::try_from(count).map_err(|_| state.arg_error(1, INVALID_SIZE))?;
    let (layout, _) = block_layout(len).ok_or_else(|| state.arg_error(1, INVALID_SIZE))?;

    let block = state.new_userdata(layout.size())?.cast::<ArrayHeader>();
    debug_assert!(block.is_aligned());
    // SAFETY: the block is at least `layout.size()` bytes and Lua aligns
    // userdata for any scalar; elements are already zeroed.
    unsafe { block.write(ArrayHeader { len }) };

    state.get_named_metatable(TYPE_NAME);
    state.set_metatable(-2)?;
    tracing::trace!(count, "created array");
    Ok(1)
}

fn get(state: &mut State) -> Result<usize, NativeError> {
    let array = check_array(state)?;
    let index = check_index(state, &array)?;

    let value = {
        // SAFETY: array is argument 1 of this call; this is the only view.
        let elements = unsafe { array.elements() }
            .map_err(|e| NativeError::runtime(e.to_string()))?;
        *elements
            .at(index)
            .map_err(|_| state.arg_error(2, OUT_OF_BOUNDS))?
    };

    state.push_number(value);
    Ok(1)
}

fn set(state: &mut State) -> Result<usize, NativeError> {
    let array = check_array(state)?;
    let index = check_index(state, &array)?;

    // Non-numeric values are ignored rather than rejected.
    if let Some(value) = state.to_number(3) {
        // SAFETY: array is argument 1 of this call; this is the only view.
        let mut elements = unsafe { array.elements() }
            .map_err(|e| NativeError::runtime(e.to_string()))?;
        *elements
            .at_mut(index)
            .map_err(|_| state.arg_error(2, OUT_OF_BOUNDS))? = value;
    }

    Ok(0)
}

fn size(state: &mut State) -> Result<usize, NativeError> {
    let array = check_array(state)?;
    state.push_integer(i64::try_from(array.len()).unwrap_or(i64::MAX));
    Ok(1)
}

/// Functions exported by the library, in registration order.
pub fn functions() -> [NativeFn; 4] {
    [
        NativeFn::new("new", new_array),
        NativeFn::new("get", get),
        NativeFn::new("set", set),
        NativeFn::new("size", size),
    ]
}

/// Register the array type and push its library table.
///
/// The metatable registered under [`TYPE_NAME`] gets `__index` pointing at
/// the library table, so method calls on an array resolve to the same
/// functions. Re-opening reuses the registered metatable, so existing
/// arrays stay valid.
pub fn open(state: &mut State) -> Result<(), NativeError> {
    state.new_metatable(TYPE_NAME);
    state.new_table();
    for function in functions() {
        let name = function.name().to_owned();
        state.push_function(function);
        state.set_field(-2, &name)?;
    }

    state.push_copy(-1)?;
    state.set_field(-3, "__index")?;
    state.remove(-2)?;
    tracing::debug!(type_name = ?TYPE_NAME, "opened array library");
    Ok(())
}
