//! Native libraries that can be opened into a state.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use selene_core::{NativeError, State};
use thiserror::Error;

/// A single native library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Library {
    /// `Selene.Array`, bound to the global `array`.
    Array,
}

impl Library {
    pub const ALL: [Library; 1] = [Library::Array];

    /// Global the library table is bound to.
    pub fn global_name(self) -> &'static str {
        match self {
            Library::Array => "array",
        }
    }

    /// Register the library and push its table.
    pub(crate) fn open(self, state: &mut State) -> Result<(), NativeError> {
        match self {
            Library::Array => selene_modules::array::open(state),
        }
    }
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.global_name())
    }
}

/// Error returned when parsing an unknown library name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown library '{name}'")]
pub struct UnknownLibrary {
    pub name: String,
}

impl FromStr for Library {
    type Err = UnknownLibrary;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Library::ALL
            .into_iter()
            .find(|lib| lib.global_name() == s)
            .ok_or_else(|| UnknownLibrary { name: s.to_owned() })
    }
}

bitflags! {
    /// A set of libraries to open together.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Libraries: u32 {
        const ARRAY = 1 << 0;
    }
}

impl Libraries {
    /// The libraries in this set, in opening order.
    pub fn iter_libraries(self) -> impl Iterator<Item = Library> {
        Library::ALL
            .into_iter()
            .filter(move |lib| self.contains(Libraries::from(*lib)))
    }
}

impl From<Library> for Libraries {
    fn from(library: Library) -> Self {
        match library {
            Library::Array => Libraries::ARRAY,
        }
    }
}
