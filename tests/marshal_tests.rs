//! Integration tests for typed calls through `StateManager`.
//!
//! Most callees are Lua functions defined by a setup script; a few are
//! host closures registered as globals.

use selene::{CallError, GcMode, NativeError, Nil, State, StateConfig, StateManager, Value, ValueKind};

const SCRIPT: &str = r##"
function divide(a, b) return a / b end
function sum(a, b) return a + b end
function greet(name) return "hello, " .. name end
function count_args(...) return select("#", ...) end
function concat(...)
    local parts = {}
    for i = 1, select("#", ...) do parts[i] = tostring((select(i, ...))) end
    return table.concat(parts)
end
function fail() error("deliberate failure") end
function nothing() end
"##;

/// A manager with the functions of `SCRIPT` defined.
fn scripted() -> StateManager {
    let mut lua = StateManager::new();
    lua.run_script("scripted", SCRIPT).unwrap();
    assert_eq!(lua.top(), 0);
    lua
}

// =============================================================================
// Return conversion
// =============================================================================

#[test]
fn test_numeric_return_types() {
    let mut lua = scripted();
    assert_eq!(lua.call::<f64, _>("divide", (9, 4)), 2.25);
    assert_eq!(lua.call::<f32, _>("divide", (9, 4)), 2.25);
    assert_eq!(lua.call::<i64, _>("divide", (9, 4)), 2);
    assert_eq!(lua.call::<u8, _>("divide", (9, 4)), 2);
}

#[test]
fn test_large_integers_round_trip() {
    let mut lua = scripted();
    let big = i64::MAX - 1;
    assert_eq!(lua.call::<i64, _>("sum", (big, 1)), i64::MAX);
    assert_eq!(lua.call::<u64, _>("sum", (u64::from(u32::MAX), 1)), 1u64 << 32);
}

#[test]
fn test_string_return() {
    let mut lua = scripted();
    let greeting: String = lua.call("greet", ("world",));
    assert_eq!(greeting, "hello, world");

    let number_as_string: String = lua.call("divide", (10, 4));
    assert_eq!(number_as_string, "2.5");
}

#[test]
fn test_numbers_format_like_tostring() {
    let mut lua = scripted();
    assert_eq!(lua.call::<String, _>("sum", (0.1, 0.2)), "0.3");
    assert_eq!(lua.call::<String, _>("sum", (1e15, 0.0)), "1e+15");
    assert_eq!(lua.call::<String, _>("sum", (4, 6)), "10");
    assert_eq!(lua.call::<String, _>("sum", (4.0, 6.0)), "10.0");
    assert_eq!(lua.call::<String, _>("divide", (1, 3)), "0.33333333333333");

    lua.run_script("format", "formatted = tostring(0.1 + 0.2)").unwrap();
    lua.load_global("formatted");
    lua.push_number(0.1 + 0.2);
    assert_eq!(lua.get_string(-1), lua.get_string(-2));
}

#[test]
fn test_unit_and_option_returns() {
    let mut lua = scripted();
    let () = lua.call("nothing", ());

    let none: Option<f64> = lua.call("nothing", ());
    assert_eq!(none, None);
    let some: Option<f64> = lua.call("divide", (1, 4));
    assert_eq!(some, Some(0.25));
}

#[test]
fn test_value_return() {
    let mut lua = scripted();
    let value: Value = lua.call("greet", ("x",));
    assert_eq!(value, Value::from("hello, x"));

    lua.run_script("table", "function make() return {} end").unwrap();
    assert_eq!(lua.call::<Value, _>("make", ()), Value::Nil);
}

#[test]
fn test_opted_in_type_gets_default() {
    #[derive(Debug, Default, PartialEq)]
    struct Handle {
        id: u32,
    }
    impl selene::FromReturn for Handle {}

    let mut lua = scripted();
    let handle: Handle = lua.call("divide", (8, 2));
    assert_eq!(handle, Handle::default());
}

// =============================================================================
// Argument passing
// =============================================================================

#[test]
fn test_argument_count_matches_tuple() {
    let mut lua = scripted();
    assert_eq!(lua.call::<usize, _>("count_args", ()), 0);
    assert_eq!(lua.call::<usize, _>("count_args", (Nil,)), 1);
    assert_eq!(
        lua.call::<usize, _>("count_args", (1, 2u64, 3.5f32, true, "s", String::from("t"))),
        6
    );
    assert_eq!(
        lua.call::<usize, _>("count_args", (1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12)),
        12
    );
}

#[test]
fn test_arguments_arrive_in_order() {
    let mut lua = scripted();
    let joined: String = lua.call("concat", ("a", 1, Nil, 'z', false, None::<u8>));
    assert_eq!(joined, "a1nilzfalsenil");
}

#[test]
fn test_host_function_sees_arguments() {
    let mut lua = scripted();
    lua.register_function("kinds", |s: &mut State| {
        let mut out = String::new();
        for i in 1..=s.top() as i32 {
            out.push_str(s.kind(i).name());
            out.push(' ');
        }
        s.push_string(out.trim_end());
        Ok(1)
    });

    let kinds: String = lua.call("kinds", (1, "s", true, Nil));
    assert_eq!(kinds, "number string boolean nil");
}

// =============================================================================
// Failure handling
// =============================================================================

#[test]
fn test_runtime_error_returns_default() {
    let mut lua = scripted();
    assert_eq!(lua.call::<f64, _>("divide", (1, "not a number")), 0.0);
    assert_eq!(lua.call::<String, _>("fail", ()), "");
    assert!(!lua.call::<bool, _>("fail", ()));
}

#[test]
fn test_argument_error_returns_default() {
    let mut lua = scripted();
    let greeting: String = lua.call("greet", (true,));
    assert_eq!(greeting, "");

    lua.register_function("strict", |s: &mut State| {
        let text = s.check_string(1)?;
        s.push_string(&text);
        Ok(1)
    });
    assert_eq!(lua.call::<String, _>("strict", (Nil,)), "");
    assert_eq!(lua.call::<String, _>("strict", ("ok",)), "ok");
}

#[test]
fn test_host_errors_reach_scripts() {
    let mut lua = scripted();
    lua.register_function("refuse", |_: &mut State| {
        Err(NativeError::runtime("refused"))
    });
    lua.run_script(
        "catch",
        "local ok, msg = pcall(refuse) caught = msg",
    )
    .unwrap();
    lua.load_global("caught");
    assert_eq!(lua.get_string(-1), "refused");
}

#[test]
fn test_missing_equals_non_function() {
    let mut lua = scripted();
    lua.set_global("number", 5).unwrap();
    lua.set_global("text", "five").unwrap();

    for name in ["missing", "number", "text"] {
        assert_eq!(lua.call::<i32, _>(name, (1, 2)), 0);
        assert_eq!(lua.call::<String, _>(name, ()), "");
        lua.call_void(name, ());
    }
    assert_eq!(lua.top(), 0);
}

#[test]
fn test_numeric_string_result_is_coerced() {
    let mut lua = scripted();
    lua.run_script("hex", "function text_number() return '0x10' end")
        .unwrap();
    assert_eq!(lua.call::<i32, _>("text_number", ()), 16);
}

#[test]
fn test_runaway_recursion_is_absorbed() {
    let mut lua = scripted();
    lua.run_script("deep", "function deep(n) return deep(n + 1) + 1 end")
        .unwrap();
    assert_eq!(lua.call::<i32, _>("deep", (0,)), 0);
    assert_eq!(lua.top(), 0);

    assert_eq!(lua.call::<i32, _>("sum", (1, 1)), 2);
}

#[test]
fn test_script_errors_are_reported() {
    let mut lua = StateManager::new();
    let err = lua.run_script("broken", "return +").unwrap_err();
    assert!(matches!(err, CallError::Syntax { .. }));
    assert!(err.message().starts_with("broken:"));

    let err = lua.run_script("raises", "error('stop')").unwrap_err();
    assert!(matches!(err, CallError::Runtime { .. }));
    assert!(err.message().ends_with("stop"));
    assert_eq!(lua.top(), 0);
}

#[test]
fn test_stack_restored_after_every_call() {
    let mut lua = scripted();
    lua.push_string("sentinel");

    for _ in 0..100 {
        let _: f64 = lua.call("divide", (1, 2));
        let _: f64 = lua.call("divide", (1, "x"));
        let _: String = lua.call("missing", ("a", "b"));
        lua.call_void("greet", ("y",));
        lua.call_void("fail", ());
    }

    assert_eq!(lua.top(), 1);
    assert_eq!(lua.get_string(-1), "sentinel");
}

// =============================================================================
// Globals & configuration
// =============================================================================

#[test]
fn test_set_global_kinds() {
    let mut lua = StateManager::new();
    lua.set_global("n", 1.5).unwrap();
    lua.set_global("b", true).unwrap();
    lua.set_global("s", "str").unwrap();

    assert_eq!(lua.load_global("n"), ValueKind::Number);
    assert_eq!(lua.load_global("b"), ValueKind::Boolean);
    assert_eq!(lua.load_global("s"), ValueKind::String);
    assert_eq!(lua.load_global("unset"), ValueKind::Nil);
    assert_eq!(lua.top(), 4);

    lua.set_global("n", Nil).unwrap();
    assert_eq!(lua.load_global("n"), ValueKind::Nil);
}

#[test]
fn test_globals_are_visible_to_scripts() {
    let mut lua = StateManager::new();
    lua.set_global("limit", 3).unwrap();
    lua.run_script("read", "function limit_plus(n) return limit + n end")
        .unwrap();
    assert_eq!(lua.call::<i32, _>("limit_plus", (4,)), 7);
}

#[test]
fn test_bare_interpreter_without_std_libs() {
    let mut lua = StateManager::with_config(StateConfig::default().with_std_libs(false));
    assert_eq!(lua.load_global("string"), ValueKind::Nil);
    lua.state_mut().pop(1);

    lua.run_script("bare", "function sq(n) return n * n end").unwrap();
    assert_eq!(lua.call::<i32, _>("sq", (9,)), 81);
}

#[test]
fn test_generational_collector() {
    let mut lua =
        StateManager::with_config(StateConfig::default().with_gc_mode(GcMode::Generational));
    lua.run_script("churn", SCRIPT).unwrap();
    for i in 0..1000 {
        assert_eq!(lua.call::<String, _>("greet", (i,)), format!("hello, {i}"));
    }
}

#[test]
fn test_manager_moves() {
    let mut lua = scripted();
    lua.set_global("kept", 7).unwrap();

    let mut moved = lua;
    moved.load_global("kept");
    assert_eq!(moved.get_number::<i32>(-1), 7);
}
