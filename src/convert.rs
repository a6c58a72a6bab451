//! Conversion traits between Rust values and interpreter stack values.
//!
//! - [`Argument`]: push a Rust value as a call argument
//! - [`Arguments`]: push a tuple of arguments in call-site order
//! - [`FromReturn`]: read a call result back as a Rust value
//!
//! ## Supported Types
//!
//! | Rust type | Pushed as | Read back as |
//! |-----------|-----------|--------------|
//! | `i8`..`i64`, `u8`..`u64`, `isize`, `usize` | integer | number, `0` otherwise |
//! | `f32`, `f64` | float | number, `0` otherwise |
//! | `bool` | boolean | boolean, `false` otherwise |
//! | `&str`, `String`, `Cow<str>`, `char` | string | `String`, empty otherwise |
//! | [`Nil`], `None` | nil | |
//! | `Option<T>` | `T` or nil | `None` for nil |
//! | [`Value`] | itself | itself |
//! | `()` | | ignored |
//!
//! Integers that fit an `i64` cross the boundary as Lua integers and keep
//! full precision; larger unsigned values are pushed as floats. Reading an
//! integer type saturates out-of-range values, truncates floats toward zero
//! and maps NaN to zero.
//!
//! Any other type that implements `Default` can opt in to being a return
//! type with an empty impl; it always reads back as its default:
//!
//! ```
//! use selene::FromReturn;
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Ticket(u32);
//!
//! impl FromReturn for Ticket {}
//! ```

use std::borrow::Cow;

use selene_core::{State, Value};

/// Push a value onto the stack as a call argument.
pub trait Argument {
    fn push(self, state: &mut State);
}

/// A list of arguments pushed left to right.
///
/// Implemented for `()` and tuples of up to twelve [`Argument`]s.
pub trait Arguments {
    /// Push every argument and return how many were pushed.
    fn push_all(self, state: &mut State) -> usize;
}

/// Read a call result from the stack.
///
/// Conversions never fail: a value of the wrong kind reads back as the
/// type's default. The provided method returns `Self::default()`, which is
/// the whole behavior for types that opt in with an empty impl.
pub trait FromReturn: Default {
    fn from_return(state: &State, idx: i32) -> Self {
        let _ = (state, idx);
        Self::default()
    }
}

/// Primitive arithmetic types, all carried as Lua numbers.
pub trait Numeric: Argument + FromReturn + Copy {}

/// The nil value, as an argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Nil;

// ============================================================================
// Numeric implementations
// ============================================================================

macro_rules! impl_integer {
    ($($ty:ty),*) => {
        $(
            impl Argument for $ty {
                fn push(self, state: &mut State) {
                    match i64::try_from(self).ok() {
                        Some(n) => state.push_integer(n),
                        None => state.push_number(self as f64),
                    }
                }
            }

            impl FromReturn for $ty {
                fn from_return(state: &State, idx: i32) -> Self {
                    match state.to_integer(idx) {
                        Some(n) => <$ty>::try_from(n)
                            .unwrap_or(if n < 0 { <$ty>::MIN } else { <$ty>::MAX }),
                        // `as` saturates out-of-range floats and maps NaN to zero
                        None => state.to_number(idx).map_or(0, |n| n as $ty),
                    }
                }
            }

            impl Numeric for $ty {}
        )*
    };
}

macro_rules! impl_float {
    ($($ty:ty),*) => {
        $(
            impl Argument for $ty {
                fn push(self, state: &mut State) {
                    state.push_number(f64::from(self));
                }
            }

            impl FromReturn for $ty {
                fn from_return(state: &State, idx: i32) -> Self {
                    state.to_number(idx).map_or(0.0, |n| n as $ty)
                }
            }

            impl Numeric for $ty {}
        )*
    };
}

impl_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
impl_float!(f32, f64);

// ============================================================================
// Boolean, string and nil implementations
// ============================================================================

impl Argument for bool {
    fn push(self, state: &mut State) {
        state.push_boolean(self);
    }
}

impl FromReturn for bool {
    fn from_return(state: &State, idx: i32) -> Self {
        state.is_boolean(idx) && state.to_boolean(idx)
    }
}

impl Argument for &str {
    fn push(self, state: &mut State) {
        state.push_string(self);
    }
}

impl Argument for String {
    fn push(self, state: &mut State) {
        state.push_string(&self);
    }
}

impl Argument for &String {
    fn push(self, state: &mut State) {
        state.push_string(self);
    }
}

impl Argument for Cow<'_, str> {
    fn push(self, state: &mut State) {
        state.push_string(&self);
    }
}

impl Argument for char {
    fn push(self, state: &mut State) {
        let mut buf = [0u8; 4];
        state.push_string(self.encode_utf8(&mut buf));
    }
}

impl FromReturn for String {
    fn from_return(state: &State, idx: i32) -> Self {
        state.to_str(idx).map(Cow::into_owned).unwrap_or_default()
    }
}

impl Argument for Nil {
    fn push(self, state: &mut State) {
        state.push_nil();
    }
}

// ============================================================================
// Generic implementations
// ============================================================================

impl<T: Argument> Argument for Option<T> {
    fn push(self, state: &mut State) {
        match self {
            Some(value) => value.push(state),
            None => state.push_nil(),
        }
    }
}

impl<T: FromReturn> FromReturn for Option<T> {
    fn from_return(state: &State, idx: i32) -> Self {
        if state.is_none_or_nil(idx) {
            None
        } else {
            Some(T::from_return(state, idx))
        }
    }
}

impl Argument for Value {
    fn push(self, state: &mut State) {
        state.push_value(self);
    }
}

impl FromReturn for Value {
    fn from_return(state: &State, idx: i32) -> Self {
        state.value(idx)
    }
}

impl FromReturn for () {}

// ============================================================================
// Argument lists
// ============================================================================

impl Arguments for () {
    fn push_all(self, _state: &mut State) -> usize {
        0
    }
}

macro_rules! impl_arguments {
    ($count:expr; $($name:ident),+) => {
        impl<$($name: Argument),+> Arguments for ($($name,)+) {
            #[allow(non_snake_case)]
            fn push_all(self, state: &mut State) -> usize {
                let ($($name,)+) = self;
                $($name.push(state);)+
                $count
            }
        }
    };
}

impl_arguments!(1; A);
impl_arguments!(2; A, B);
impl_arguments!(3; A, B, C);
impl_arguments!(4; A, B, C, D);
impl_arguments!(5; A, B, C, D, E);
impl_arguments!(6; A, B, C, D, E, F);
impl_arguments!(7; A, B, C, D, E, F, G);
impl_arguments!(8; A, B, C, D, E, F, G, H);
impl_arguments!(9; A, B, C, D, E, F, G, H, I);
impl_arguments!(10; A, B, C, D, E, F, G, H, I, J);
impl_arguments!(11; A, B, C, D, E, F, G, H, I, J, K);
impl_arguments!(12; A, B, C, D, E, F, G, H, I, J, K, L);
