//! Importing modules from the search path.

use std::fs;
use std::path::Path;

use monkeylang::module::SearchPath;
use monkeylang::{run, MonkeyError, Value, VmState};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn module_dir(modules: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, source) in modules {
        fs::write(dir.path().join(format!("{}.monkey", name)), source).unwrap();
    }
    dir
}

fn state_for(dir: &Path) -> VmState {
    VmState::with_search_path(SearchPath::new(vec![dir.to_path_buf()]))
}

fn import_error(state: &mut VmState, source: &str) -> String {
    match run(state, source) {
        Err(MonkeyError::Runtime(e)) => e.to_string(),
        other => panic!("expected a runtime error, got {:?}", other.map(|v| v.inspect())),
    }
}

#[test]
fn exports_uppercase_globals() {
    let dir = module_dir(&[(
        "geometry",
        "Pi := 3; Area := fn(r) { Pi * r * r }; helper := 1;",
    )]);
    let mut state = state_for(dir.path());

    let value = run(&mut state, "g := import(\"geometry\"); [g.Pi, g.Area(2), g[\"helper\"]]").unwrap();
    assert_eq!(value.inspect(), "[3, 12, null]");
}

#[test]
fn module_shares_importer_state() {
    let dir = module_dir(&[("config", "Name := \"prod\";")]);
    let mut state = state_for(dir.path());

    run(&mut state, "c := import(\"config\");").unwrap();
    assert_eq!(state.global("Name"), Some(Value::string("prod")));
    assert_eq!(run(&mut state, "c.Name").unwrap(), Value::string("prod"));
}

#[test]
fn module_name_can_be_computed() {
    let dir = module_dir(&[("lib_a", "Id := 1;")]);
    let mut state = state_for(dir.path());

    let value = run(&mut state, "name := \"lib\" + \"_a\"; import(name).Id").unwrap();
    assert_eq!(value, Value::Integer(1));
}

#[test]
fn search_path_order_wins() {
    let first = module_dir(&[("util", "Which := \"first\";")]);
    let second = module_dir(&[("util", "Which := \"second\";"), ("extra", "Ok := true;")]);
    let mut state = VmState::with_search_path(SearchPath::new(vec![
        first.path().to_path_buf(),
        second.path().to_path_buf(),
    ]));

    assert_eq!(run(&mut state, "import(\"util\").Which").unwrap(), Value::string("first"));
    assert_eq!(run(&mut state, "import(\"extra\").Ok").unwrap(), Value::Boolean(true));
}

#[test]
fn missing_module() {
    let dir = module_dir(&[]);
    let mut state = state_for(dir.path());

    assert_eq!(
        import_error(&mut state, "import(\"nowhere\")"),
        "ImportError: no module named 'nowhere'"
    );
}

#[test]
fn non_string_module_name() {
    let dir = module_dir(&[]);
    let mut state = state_for(dir.path());

    let message = import_error(&mut state, "import(42)");
    assert!(message.starts_with("TypeError"), "{}", message);
}

#[test]
fn module_with_parse_error() {
    let dir = module_dir(&[("broken", "x := (1 + ;")]);
    let mut state = state_for(dir.path());

    let message = import_error(&mut state, "import(\"broken\")");
    assert!(message.starts_with("ParseError: "), "{}", message);
}

#[test]
fn module_with_compile_error() {
    let dir = module_dir(&[("unbound", "X := nothing_here;")]);
    let mut state = state_for(dir.path());

    let message = import_error(&mut state, "import(\"unbound\")");
    assert!(message.starts_with("CompileError: "), "{}", message);
}

#[test]
fn module_with_runtime_error() {
    let dir = module_dir(&[("crash", "X := 1 / 0;")]);
    let mut state = state_for(dir.path());

    assert_eq!(
        import_error(&mut state, "import(\"crash\")"),
        "RuntimeError: error loading module 'crash': division by zero"
    );
}

#[test]
fn circular_import_is_reported() {
    let dir = module_dir(&[("a", "B := import(\"b\");"), ("b", "A := import(\"a\");")]);
    let mut state = state_for(dir.path());

    let message = import_error(&mut state, "import(\"a\")");
    assert!(message.contains("circular import: a -> b -> a"), "{}", message);
}
