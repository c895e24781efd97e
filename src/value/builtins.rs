//! Native functions callable from monkey code.
//!
//! The table is sorted by name once, and a builtin's position in it is the
//! operand of `LoadBuiltin`. Argument problems come back as `Value::Error`
//! rather than aborting the VM.

use std::cmp::Ordering;
use std::io::{BufRead, Write};
use std::rc::Rc;
use std::sync::RwLock;

use lazy_static::lazy_static;

use super::{ArrayRef, HashKey, Value};

/// Result of a native call: `Ok(None)` means "no value" and becomes null.
pub type BuiltinResult = Result<Option<Value>, String>;

/// Signature of every native function.
pub type BuiltinFn = fn(&[Value]) -> BuiltinResult;

/// A named native function.
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl Builtin {
    fn new(name: &'static str, func: BuiltinFn) -> Self {
        Self { name, func }
    }

    /// Invoke with the exact argument slice. Errors become `Value::Error`.
    pub fn call(&self, args: &[Value]) -> Option<Value> {
        match (self.func)(args) {
            Ok(value) => value,
            Err(message) => Some(Value::Error(message)),
        }
    }
}

impl std::fmt::Debug for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<built-in function {}>", self.name)
    }
}

lazy_static! {
    /// All builtins, sorted by name.
    pub static ref BUILTINS: Vec<Builtin> = {
        let mut table = vec![
            Builtin::new("len", len),
            Builtin::new("input", input),
            Builtin::new("print", print),
            Builtin::new("first", first),
            Builtin::new("last", last),
            Builtin::new("rest", rest),
            Builtin::new("push", push),
            Builtin::new("pop", pop),
            Builtin::new("exit", exit),
            Builtin::new("assert", assert),
            Builtin::new("bool", bool_of),
            Builtin::new("int", int),
            Builtin::new("str", str_of),
            Builtin::new("type", type_of),
            Builtin::new("args", args),
            Builtin::new("lower", lower),
            Builtin::new("upper", upper),
            Builtin::new("join", join),
            Builtin::new("split", split),
            Builtin::new("find", find),
            Builtin::new("readfile", readfile),
            Builtin::new("writefile", writefile),
            Builtin::new("abs", abs),
            Builtin::new("bin", bin),
            Builtin::new("hex", hex),
            Builtin::new("oct", oct),
            Builtin::new("ord", ord),
            Builtin::new("chr", chr),
            Builtin::new("divmod", divmod),
            Builtin::new("hash", hash),
            Builtin::new("id", id),
            Builtin::new("pow", pow),
            Builtin::new("min", min),
            Builtin::new("max", max),
            Builtin::new("sorted", sorted),
            Builtin::new("reversed", reversed),
        ];
        table.sort_by_key(|b| b.name);
        table
    };

    static ref SCRIPT_ARGS: RwLock<Vec<String>> = RwLock::new(Vec::new());
}

/// Find a builtin and its index by name.
pub fn lookup(name: &str) -> Option<(usize, &'static Builtin)> {
    BUILTINS
        .binary_search_by(|b| b.name.cmp(name))
        .ok()
        .map(|index| (index, &BUILTINS[index]))
}

/// The builtin stored at `index`, if any.
pub fn get(index: usize) -> Option<&'static Builtin> {
    BUILTINS.get(index)
}

/// Set the values returned by `args()`.
pub fn set_script_args(args: Vec<String>) {
    if let Ok(mut guard) = SCRIPT_ARGS.write() {
        *guard = args;
    }
}

// ===== Argument checking =====

fn plural(n: usize) -> &'static str {
    if n == 1 {
        "argument"
    } else {
        "arguments"
    }
}

fn exact_args(name: &str, args: &[Value], n: usize) -> Result<(), String> {
    if args.len() != n {
        return Err(format!(
            "TypeError: {}() takes exactly {} {} ({} given)",
            name,
            n,
            plural(n),
            args.len()
        ));
    }
    Ok(())
}

fn range_args(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), String> {
    if args.len() < min {
        return Err(format!(
            "TypeError: {}() takes at least {} {} ({} given)",
            name,
            min,
            plural(min),
            args.len()
        ));
    }
    if args.len() > max {
        return Err(format!(
            "TypeError: {}() takes at most {} {} ({} given)",
            name,
            max,
            plural(max),
            args.len()
        ));
    }
    Ok(())
}

fn type_error(name: &str, index: usize, expected: &str, got: &Value) -> String {
    format!(
        "TypeError: {}() expected argument #{} to be `{}` got `{}`",
        name,
        index + 1,
        expected,
        got.type_name()
    )
}

fn expect_int(name: &str, args: &[Value], index: usize) -> Result<i64, String> {
    match &args[index] {
        Value::Integer(n) => Ok(*n),
        other => Err(type_error(name, index, "int", other)),
    }
}

fn expect_str<'a>(name: &str, args: &'a [Value], index: usize) -> Result<&'a str, String> {
    match &args[index] {
        Value::String(s) => Ok(s),
        other => Err(type_error(name, index, "str", other)),
    }
}

fn expect_array<'a>(name: &str, args: &'a [Value], index: usize) -> Result<&'a ArrayRef, String> {
    match &args[index] {
        Value::Array(arr) => Ok(arr),
        other => Err(type_error(name, index, "array", other)),
    }
}

/// Total order used by `sorted`: values of different types are ordered by
/// type name, values of the same type by their natural order.
fn sort_order(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.as_bytes().cmp(y.as_bytes()),
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.iter()
                .zip(y.iter())
                .map(|(l, r)| sort_order(l, r))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or_else(|| x.len().cmp(&y.len()))
        }
        _ => a.type_name().cmp(b.type_name()),
    }
}

// ===== Builtins =====

fn abs(args: &[Value]) -> BuiltinResult {
    exact_args("abs", args, 1)?;
    let n = expect_int("abs", args, 0)?;
    Ok(Some(Value::Integer(n.wrapping_abs())))
}

fn args(args: &[Value]) -> BuiltinResult {
    exact_args("args", args, 0)?;
    let values = SCRIPT_ARGS
        .read()
        .map(|guard| guard.iter().map(|a| Value::string(a.as_str())).collect::<Vec<_>>())
        .unwrap_or_default();
    Ok(Some(Value::array(values)))
}

fn assert(args: &[Value]) -> BuiltinResult {
    exact_args("assert", args, 2)?;
    let condition = match &args[0] {
        Value::Boolean(b) => *b,
        other => return Err(type_error("assert", 0, "bool", other)),
    };
    let message = expect_str("assert", args, 1)?;
    if !condition {
        eprintln!("Assertion Error: {}", message);
        std::process::exit(1);
    }
    Ok(None)
}

fn bin(args: &[Value]) -> BuiltinResult {
    exact_args("bin", args, 1)?;
    let n = expect_int("bin", args, 0)?;
    let digits = format!("{:b}", n.unsigned_abs());
    let sign = if n < 0 { "-" } else { "" };
    Ok(Some(Value::string(format!("{}0b{}", sign, digits))))
}

fn bool_of(args: &[Value]) -> BuiltinResult {
    exact_args("bool", args, 1)?;
    Ok(Some(Value::Boolean(args[0].as_bool())))
}

fn chr(args: &[Value]) -> BuiltinResult {
    exact_args("chr", args, 1)?;
    let n = expect_int("chr", args, 0)?;
    u32::try_from(n)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Some(Value::string(c.to_string())))
        .ok_or_else(|| format!("ValueError: chr() arg not in range: {}", n))
}

fn divmod(args: &[Value]) -> BuiltinResult {
    exact_args("divmod", args, 2)?;
    let a = expect_int("divmod", args, 0)?;
    let b = expect_int("divmod", args, 1)?;
    if b == 0 {
        return Err("ZeroDivisionError: divmod() by zero".to_string());
    }
    Ok(Some(Value::array(vec![
        Value::Integer(a.wrapping_div(b)),
        Value::Integer(a.wrapping_rem(b)),
    ])))
}

fn exit(args: &[Value]) -> BuiltinResult {
    range_args("exit", args, 0, 1)?;
    let status = if args.is_empty() {
        0
    } else {
        expect_int("exit", args, 0)?
    };
    std::process::exit(status as i32);
}

fn find(args: &[Value]) -> BuiltinResult {
    exact_args("find", args, 2)?;
    match &args[0] {
        Value::String(haystack) => {
            let needle = expect_str("find", args, 1)?;
            let index = haystack.find(needle).map(|i| i as i64).unwrap_or(-1);
            Ok(Some(Value::Integer(index)))
        }
        Value::Array(arr) => {
            let index = arr
                .borrow()
                .iter()
                .position(|item| args[1].compare(item) == 0)
                .map(|i| i as i64)
                .unwrap_or(-1);
            Ok(Some(Value::Integer(index)))
        }
        other => Err(format!(
            "TypeError: find() expected argument #1 to be `array` or `str` got `{}`",
            other.type_name()
        )),
    }
}

fn first(args: &[Value]) -> BuiltinResult {
    exact_args("first", args, 1)?;
    let arr = expect_array("first", args, 0)?;
    let first = arr.borrow().first().cloned();
    Ok(first)
}

fn hash(args: &[Value]) -> BuiltinResult {
    exact_args("hash", args, 1)?;
    HashKey::from_value(&args[0])
        .map(|key| Some(Value::Integer(key.value as i64)))
        .ok_or_else(|| "TypeError: hash() expected argument #1 to be hashable".to_string())
}

fn hex(args: &[Value]) -> BuiltinResult {
    exact_args("hex", args, 1)?;
    let n = expect_int("hex", args, 0)?;
    let sign = if n < 0 { "-" } else { "" };
    Ok(Some(Value::string(format!("{}0x{:x}", sign, n.unsigned_abs()))))
}

/// Identity of a reference value as an address string. Value types have no
/// identity and yield null.
fn id(args: &[Value]) -> BuiltinResult {
    exact_args("id", args, 1)?;
    let address = match &args[0] {
        Value::Array(arr) => format!("{:p}", Rc::as_ptr(arr)),
        Value::Hash(hash) => format!("{:p}", Rc::as_ptr(hash)),
        Value::Closure(c) => format!("{:p}", Rc::as_ptr(c)),
        Value::CompiledFunction(f) => format!("{:p}", Rc::as_ptr(f)),
        Value::Module(m) => format!("{:p}", Rc::as_ptr(m)),
        Value::Builtin(b) => format!("{:p}", *b),
        _ => return Ok(None),
    };
    Ok(Some(Value::string(address)))
}

fn input(args: &[Value]) -> BuiltinResult {
    range_args("input", args, 0, 1)?;
    if !args.is_empty() {
        let prompt = expect_str("input", args, 0)?;
        print!("{}", prompt);
        let _ = std::io::stdout().flush();
    }

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| format!("IOError: error reading input from stdin: {}", e))?;
    let trimmed = line.trim_end_matches(&['\n', '\r'][..]);
    Ok(Some(Value::string(trimmed)))
}

fn int(args: &[Value]) -> BuiltinResult {
    exact_args("int", args, 1)?;
    match &args[0] {
        Value::Integer(n) => Ok(Some(Value::Integer(*n))),
        Value::Boolean(b) => Ok(Some(Value::Integer(i64::from(*b)))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(|n| Some(Value::Integer(n)))
            .map_err(|e| format!("ValueError: could not parse string to int: {}", e)),
        other => Err(type_error("int", 0, "int", other)),
    }
}

fn join(args: &[Value]) -> BuiltinResult {
    exact_args("join", args, 2)?;
    let arr = expect_array("join", args, 0)?;
    let sep = expect_str("join", args, 1)?;
    let parts: Vec<String> = arr.borrow().iter().map(|v| v.to_string()).collect();
    Ok(Some(Value::string(parts.join(sep))))
}

fn last(args: &[Value]) -> BuiltinResult {
    exact_args("last", args, 1)?;
    let arr = expect_array("last", args, 0)?;
    let last = arr.borrow().last().cloned();
    Ok(last)
}

fn len(args: &[Value]) -> BuiltinResult {
    exact_args("len", args, 1)?;
    let n = match &args[0] {
        Value::String(s) => s.len(),
        Value::Array(arr) => arr.borrow().len(),
        Value::Hash(hash) => hash.borrow().len(),
        Value::Module(m) => m.attrs.borrow().len(),
        other => {
            return Err(format!(
                "TypeError: object of type '{}' has no len()",
                other.type_name()
            ))
        }
    };
    Ok(Some(Value::Integer(n as i64)))
}

fn lower(args: &[Value]) -> BuiltinResult {
    exact_args("lower", args, 1)?;
    let s = expect_str("lower", args, 0)?;
    Ok(Some(Value::string(s.to_lowercase())))
}

fn int_items(name: &str, arr: &ArrayRef) -> Result<Vec<i64>, String> {
    arr.borrow()
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Integer(n) => Ok(*n),
            other => Err(format!(
                "TypeError: {}() expected item #{} to be `int` got `{}`",
                name,
                i + 1,
                other.type_name()
            )),
        })
        .collect()
}

fn max(args: &[Value]) -> BuiltinResult {
    exact_args("max", args, 1)?;
    let arr = expect_array("max", args, 0)?;
    int_items("max", arr)?
        .into_iter()
        .max()
        .map(|n| Some(Value::Integer(n)))
        .ok_or_else(|| "ValueError: max() arg is an empty array".to_string())
}

fn min(args: &[Value]) -> BuiltinResult {
    exact_args("min", args, 1)?;
    let arr = expect_array("min", args, 0)?;
    int_items("min", arr)?
        .into_iter()
        .min()
        .map(|n| Some(Value::Integer(n)))
        .ok_or_else(|| "ValueError: min() arg is an empty array".to_string())
}

fn oct(args: &[Value]) -> BuiltinResult {
    exact_args("oct", args, 1)?;
    let n = expect_int("oct", args, 0)?;
    let sign = if n < 0 { "-" } else { "" };
    Ok(Some(Value::string(format!("{}0o{:o}", sign, n.unsigned_abs()))))
}

fn ord(args: &[Value]) -> BuiltinResult {
    exact_args("ord", args, 1)?;
    let s = expect_str("ord", args, 0)?;
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Some(Value::Integer(i64::from(u32::from(c))))),
        _ => Err(format!(
            "TypeError: ord() expected a single character `str` got={:?}",
            s
        )),
    }
}

fn pop(args: &[Value]) -> BuiltinResult {
    exact_args("pop", args, 1)?;
    let arr = expect_array("pop", args, 0)?;
    let popped = arr.borrow_mut().pop();
    popped
        .map(Some)
        .ok_or_else(|| "IndexError: pop from an empty array".to_string())
}

fn pow(args: &[Value]) -> BuiltinResult {
    exact_args("pow", args, 2)?;
    let mut base = expect_int("pow", args, 0)?;
    let mut exp = expect_int("pow", args, 1)?;

    let mut result: i64 = 1;
    while exp > 0 {
        if exp & 1 != 0 {
            result = result.wrapping_mul(base);
        }
        exp >>= 1;
        base = base.wrapping_mul(base);
    }
    Ok(Some(Value::Integer(result)))
}

fn print(args: &[Value]) -> BuiltinResult {
    let line: Vec<String> = args.iter().map(|v| v.to_string()).collect();
    println!("{}", line.join(" "));
    Ok(None)
}

/// Appends in place and returns the same array.
fn push(args: &[Value]) -> BuiltinResult {
    exact_args("push", args, 2)?;
    let arr = expect_array("push", args, 0)?;
    arr.borrow_mut().push(args[1].clone());
    Ok(Some(Value::Array(Rc::clone(arr))))
}

fn readfile(args: &[Value]) -> BuiltinResult {
    exact_args("readfile", args, 1)?;
    let path = expect_str("readfile", args, 0)?;
    std::fs::read_to_string(path)
        .map(|data| Some(Value::string(data)))
        .map_err(|e| format!("IOError: error reading from file {}: {}", path, e))
}

fn rest(args: &[Value]) -> BuiltinResult {
    exact_args("rest", args, 1)?;
    let arr = expect_array("rest", args, 0)?;
    let tail = arr.borrow().iter().skip(1).cloned().collect();
    Ok(Some(Value::array(tail)))
}

fn reversed(args: &[Value]) -> BuiltinResult {
    exact_args("reversed", args, 1)?;
    let arr = expect_array("reversed", args, 0)?;
    let items = arr.borrow().iter().rev().cloned().collect();
    Ok(Some(Value::array(items)))
}

fn sorted(args: &[Value]) -> BuiltinResult {
    exact_args("sorted", args, 1)?;
    let arr = expect_array("sorted", args, 0)?;
    let mut items = arr.borrow().clone();
    items.sort_by(sort_order);
    Ok(Some(Value::array(items)))
}

/// Split on `sep`, or into characters when no separator is given.
fn split(args: &[Value]) -> BuiltinResult {
    range_args("split", args, 1, 2)?;
    let s = expect_str("split", args, 0)?;
    let sep = if args.len() == 2 {
        expect_str("split", args, 1)?
    } else {
        ""
    };

    let parts: Vec<Value> = if sep.is_empty() {
        s.chars().map(|c| Value::string(c.to_string())).collect()
    } else {
        s.split(sep).map(Value::string).collect()
    };
    Ok(Some(Value::array(parts)))
}

fn str_of(args: &[Value]) -> BuiltinResult {
    exact_args("str", args, 1)?;
    Ok(Some(Value::string(args[0].to_string())))
}

fn type_of(args: &[Value]) -> BuiltinResult {
    exact_args("type", args, 1)?;
    Ok(Some(Value::string(args[0].type_name())))
}

fn upper(args: &[Value]) -> BuiltinResult {
    exact_args("upper", args, 1)?;
    let s = expect_str("upper", args, 0)?;
    Ok(Some(Value::string(s.to_uppercase())))
}

fn writefile(args: &[Value]) -> BuiltinResult {
    exact_args("writefile", args, 2)?;
    let path = expect_str("writefile", args, 0)?;
    let data = expect_str("writefile", args, 1)?;
    std::fs::write(path, data)
        .map(|_| None)
        .map_err(|e| format!("IOError: error writing file {}: {}", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn call(name: &str, args: &[Value]) -> Option<Value> {
        let (_, builtin) = lookup(name).unwrap();
        builtin.call(args)
    }

    fn ints(values: &[i64]) -> Value {
        Value::array(values.iter().map(|n| Value::Integer(*n)).collect())
    }

    #[test]
    fn test_table_is_sorted() {
        let names: Vec<&str> = BUILTINS.iter().map(|b| b.name).collect();
        let mut expected = names.clone();
        expected.sort();
        assert_eq!(names, expected);
        assert_eq!(lookup("abs").map(|(i, _)| i), Some(0));
    }

    #[test]
    fn test_min_max() {
        assert_eq!(call("min", &[ints(&[3, 1, 2])]), Some(Value::Integer(1)));
        assert_eq!(call("max", &[ints(&[3, 1, 2])]), Some(Value::Integer(3)));
        assert!(matches!(call("min", &[ints(&[])]), Some(Value::Error(_))));
    }

    #[test]
    fn test_arity_error_message() {
        assert_eq!(
            call("len", &[]),
            Some(Value::error("TypeError: len() takes exactly 1 argument (0 given)"))
        );
    }

    #[test]
    fn test_type_error_message() {
        assert_eq!(
            call("upper", &[Value::Integer(1)]),
            Some(Value::error(
                "TypeError: upper() expected argument #1 to be `str` got `int`"
            ))
        );
    }

    #[test]
    fn test_push_mutates_in_place() {
        let arr = ints(&[1]);
        let result = call("push", &[arr.clone(), Value::Integer(2)]);
        assert_eq!(arr, ints(&[1, 2]));
        assert_eq!(result, Some(ints(&[1, 2])));
    }

    #[test]
    fn test_rest_and_sorted_copy() {
        let arr = ints(&[3, 1, 2]);
        assert_eq!(call("rest", &[arr.clone()]), Some(ints(&[1, 2])));
        assert_eq!(call("sorted", &[arr.clone()]), Some(ints(&[1, 2, 3])));
        assert_eq!(call("reversed", &[arr.clone()]), Some(ints(&[2, 1, 3])));
        assert_eq!(arr, ints(&[3, 1, 2]));
    }

    #[test]
    fn test_pop_empty_is_error() {
        assert!(matches!(call("pop", &[ints(&[])]), Some(Value::Error(_))));
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(call("bin", &[Value::Integer(5)]), Some(Value::string("0b101")));
        assert_eq!(call("hex", &[Value::Integer(255)]), Some(Value::string("0xff")));
        assert_eq!(call("oct", &[Value::Integer(8)]), Some(Value::string("0o10")));
    }

    #[test]
    fn test_split_and_join() {
        let parts = call("split", &[Value::string("a,b"), Value::string(",")]);
        assert_eq!(
            parts,
            Some(Value::array(vec![Value::string("a"), Value::string("b")]))
        );
        let joined = call("join", &[parts.unwrap(), Value::string("-")]);
        assert_eq!(joined, Some(Value::string("a-b")));
    }

    #[test]
    fn test_find() {
        assert_eq!(
            call("find", &[Value::string("hello"), Value::string("ll")]),
            Some(Value::Integer(2))
        );
        assert_eq!(
            call("find", &[ints(&[4, 5]), Value::Integer(9)]),
            Some(Value::Integer(-1))
        );
    }

    #[test]
    fn test_print_returns_nothing() {
        assert_eq!(call("print", &[Value::string("x")]), None);
    }
}
