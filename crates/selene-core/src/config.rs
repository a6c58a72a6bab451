//! Settings applied when an interpreter is created.

/// Garbage collector mode of a new interpreter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GcMode {
    /// Lua's default incremental collector.
    #[default]
    Incremental,
    /// Generational collection, cheaper for many short-lived objects.
    Generational,
}

/// Configuration applied when an [`Interpreter`](crate::Interpreter) is
/// created.
///
/// ```
/// use selene_core::{GcMode, Interpreter, StateConfig};
///
/// let config = StateConfig::default()
///     .with_std_libs(false)
///     .with_gc_mode(GcMode::Generational);
/// let mut lua = Interpreter::with_config(config);
/// assert_eq!(lua.get_global("print"), selene_core::ValueKind::Nil);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateConfig {
    /// Open Lua's standard libraries (`string`, `table`, `math`, ...).
    pub open_std_libs: bool,
    pub gc_mode: GcMode,
}

impl StateConfig {
    pub fn with_std_libs(mut self, open_std_libs: bool) -> Self {
        self.open_std_libs = open_std_libs;
        self
    }

    pub fn with_gc_mode(mut self, gc_mode: GcMode) -> Self {
        self.gc_mode = gc_mode;
        self
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            open_std_libs: true,
            gc_mode: GcMode::Incremental,
        }
    }
}
