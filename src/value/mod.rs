//! Runtime values shared by the compiler, the VM and the builtins.

pub mod builtins;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::instruction::Instructions;

pub use builtins::{Builtin, BuiltinFn, BUILTINS};

/// Insertion-ordered table backing hash values.
pub type HashTable = IndexMap<HashKey, HashPair, ahash::RandomState>;

/// Shared, mutable hash storage.
pub type HashRef = Rc<RefCell<HashTable>>;

/// Shared, mutable array storage.
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    /// Integer value
    Integer(i64),
    /// String value
    String(String),
    /// Boolean value
    Boolean(bool),
    /// Null value
    Null,
    /// Array value, shared by reference
    Array(ArrayRef),
    /// Hash value, shared by reference, iterates in insertion order
    Hash(HashRef),
    /// A function body as it sits in the constant pool
    CompiledFunction(Rc<CompiledFunction>),
    /// A function body plus its captured free values
    Closure(Rc<Closure>),
    /// Native function
    Builtin(&'static Builtin),
    /// An error produced by a builtin. Flows as an ordinary value.
    Error(String),
    /// An imported module
    Module(Rc<Module>),
}

/// Which primitive a hash key was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKeyKind {
    Integer,
    String,
    Boolean,
}

/// The lookup key for hash entries. Only integers, strings and booleans
/// produce one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    pub kind: HashKeyKind,
    pub value: u64,
}

impl HashKey {
    pub fn from_value(value: &Value) -> Option<HashKey> {
        match value {
            Value::Integer(n) => Some(HashKey {
                kind: HashKeyKind::Integer,
                value: *n as u64,
            }),
            Value::String(s) => Some(HashKey {
                kind: HashKeyKind::String,
                value: fnv1a(s.as_bytes()),
            }),
            Value::Boolean(b) => Some(HashKey {
                kind: HashKeyKind::Boolean,
                value: u64::from(*b),
            }),
            _ => None,
        }
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// The original key alongside its value, so hashes can be rendered and
/// iterated.
#[derive(Debug, Clone)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

/// A compiled function body.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
    pub name: Option<String>,
}

impl CompiledFunction {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }
}

/// A function plus the values it captured when it was created.
///
/// `free` sits behind a `RefCell` only so `SetSelf` can patch in the closure's
/// own reference after construction.
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: RefCell<Vec<Value>>,
}

impl Closure {
    pub fn new(func: Rc<CompiledFunction>, free: Vec<Value>) -> Self {
        Self {
            func,
            free: RefCell::new(free),
        }
    }
}

impl fmt::Debug for Closure {
    // Free values may contain this closure, so they are not printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("func", &self.func.display_name())
            .field("free", &self.free.borrow().len())
            .finish()
    }
}

/// A loaded module: its name and the hash of exported globals.
#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub attrs: HashRef,
}

impl Value {
    pub fn array(elements: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn hash(table: HashTable) -> Value {
        Value::Hash(Rc::new(RefCell::new(table)))
    }

    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    pub fn error(message: impl Into<String>) -> Value {
        Value::Error(message.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "int",
            Value::String(_) => "str",
            Value::Boolean(_) => "bool",
            Value::Null => "null",
            Value::Array(_) => "array",
            Value::Hash(_) => "hash",
            Value::CompiledFunction(_) => "compiled_function",
            Value::Closure(_) => "closure",
            Value::Builtin(_) => "builtin",
            Value::Error(_) => "error",
            Value::Module(_) => "module",
        }
    }

    /// Control-flow truthiness: only `false` and `null` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false) | Value::Null)
    }

    /// Conversion used by `bool()`: zero, empty containers, errors and null
    /// are false.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Integer(n) => *n != 0,
            Value::String(s) => !s.is_empty(),
            Value::Boolean(b) => *b,
            Value::Null | Value::Error(_) => false,
            Value::Array(arr) => !arr.borrow().is_empty(),
            Value::Hash(hash) => !hash.borrow().is_empty(),
            _ => true,
        }
    }

    /// The value to store when a name is first bound. Integers, strings,
    /// booleans and errors are copied; arrays, hashes and closures are shared.
    pub fn bind_copy(&self) -> Value {
        match self {
            Value::Integer(n) => Value::Integer(*n),
            Value::Boolean(b) => Value::Boolean(*b),
            Value::String(s) => Value::String(s.clone()),
            Value::Error(msg) => Value::Error(msg.clone()),
            Value::Null => Value::Null,
            Value::Array(arr) => Value::Array(Rc::clone(arr)),
            Value::Hash(hash) => Value::Hash(Rc::clone(hash)),
            Value::Closure(c) => Value::Closure(Rc::clone(c)),
            Value::CompiledFunction(f) => Value::CompiledFunction(Rc::clone(f)),
            Value::Builtin(b) => Value::Builtin(*b),
            Value::Module(m) => Value::Module(Rc::clone(m)),
        }
    }

    /// Three-way comparison returning -1, 0 or 1.
    ///
    /// Mixed-type pairs are never 0. Functions, builtins and modules compare
    /// by identity.
    pub fn compare(&self, other: &Value) -> i64 {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => ordering(a.cmp(b)),
            (Value::Integer(_), _) => -1,

            (Value::String(a), Value::String(b)) => ordering(a.as_bytes().cmp(b.as_bytes())),
            (Value::String(_), _) => 1,

            (Value::Boolean(a), Value::Boolean(b)) => i64::from(*a) - i64::from(*b),
            (Value::Boolean(_), _) => 1,

            (Value::Array(a), Value::Array(b)) => {
                if Rc::ptr_eq(a, b) {
                    return 0;
                }
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return -1;
                }
                a.iter()
                    .zip(b.iter())
                    .map(|(x, y)| x.compare(y))
                    .find(|c| *c != 0)
                    .unwrap_or(0)
            }
            (Value::Array(_), _) => -1,

            (Value::Null, Value::Null) => 0,

            (Value::Hash(a), Value::Hash(b)) => {
                if Rc::ptr_eq(a, b) {
                    return 0;
                }
                let (a, b) = (a.borrow(), b.borrow());
                let equal = a.len() == b.len()
                    && a.iter().all(|(key, pair)| {
                        b.get(key)
                            .map(|other| pair.value.compare(&other.value) == 0)
                            .unwrap_or(false)
                    });
                if equal {
                    0
                } else {
                    1
                }
            }

            (Value::Closure(a), Value::Closure(b)) if Rc::ptr_eq(a, b) => 0,
            (Value::CompiledFunction(a), Value::CompiledFunction(b)) if Rc::ptr_eq(a, b) => 0,
            (Value::Module(a), Value::Module(b)) if Rc::ptr_eq(a, b) => 0,
            (Value::Builtin(a), Value::Builtin(b)) if std::ptr::eq(*a, *b) => 0,

            (Value::Error(a), Value::Error(b)) if a == b => 0,

            _ => 1,
        }
    }

    /// Debug-style rendering: strings are quoted, errors are prefixed.
    pub fn inspect(&self) -> String {
        match self {
            Value::String(s) => format!("{:?}", s),
            Value::Error(msg) => format!("ERROR: {}", msg),
            other => other.to_string(),
        }
    }
}

fn ordering(ord: std::cmp::Ordering) -> i64 {
    match ord {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == 0
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Closure(c) => write!(f, "{:?}", c),
            other => write!(f, "{}", other.inspect()),
        }
    }
}

/// Display form: strings and errors are raw, containers show their elements
/// in inspect form.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
            Value::Array(arr) => {
                write!(f, "[")?;
                let arr = arr.borrow();
                for (i, val) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", val.inspect())?;
                }
                write!(f, "]")
            }
            Value::Hash(hash) => {
                write!(f, "{{")?;
                let hash = hash.borrow();
                for (i, pair) in hash.values().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", pair.key.inspect(), pair.value.inspect())?;
                }
                write!(f, "}}")
            }
            Value::CompiledFunction(func) => {
                write!(f, "<compiled function {}>", func.display_name())
            }
            Value::Closure(c) => write!(f, "<fn {}>", c.func.display_name()),
            Value::Builtin(b) => write!(f, "<built-in function {}>", b.name),
            Value::Error(msg) => write!(f, "{}", msg),
            Value::Module(m) => write!(f, "<module '{}'>", m.name),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a_known_vectors() {
        assert_eq!(fnv1a(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn test_hash_keys_only_for_primitives() {
        assert!(HashKey::from_value(&Value::Integer(1)).is_some());
        assert!(HashKey::from_value(&Value::string("a")).is_some());
        assert!(HashKey::from_value(&Value::Boolean(true)).is_some());
        assert!(HashKey::from_value(&Value::Null).is_none());
        assert!(HashKey::from_value(&Value::array(vec![])).is_none());
    }

    #[test]
    fn test_hash_keys_distinguish_kinds() {
        let int_key = HashKey::from_value(&Value::Integer(1));
        let bool_key = HashKey::from_value(&Value::Boolean(true));
        assert_ne!(int_key, bool_key);
    }

    #[test]
    fn test_compare_mixed_types() {
        assert_eq!(Value::Integer(1).compare(&Value::string("a")), -1);
        assert_eq!(Value::string("a").compare(&Value::Integer(1)), 1);
        assert_eq!(Value::Boolean(true).compare(&Value::Boolean(false)), 1);
        assert_eq!(Value::Null.compare(&Value::Null), 0);
        assert_eq!(Value::Null.compare(&Value::Integer(0)), 1);
    }

    #[test]
    fn test_compare_arrays() {
        let a = Value::array(vec![Value::Integer(1), Value::Integer(2)]);
        let b = Value::array(vec![Value::Integer(1), Value::Integer(3)]);
        let c = Value::array(vec![Value::Integer(1)]);
        assert_eq!(a.compare(&b), -1);
        assert_eq!(b.compare(&a), 1);
        assert_eq!(a.compare(&c), -1);
        assert_eq!(a.compare(&a.clone()), 0);
    }

    #[test]
    fn test_bind_copy_shares_arrays() {
        let a = Value::array(vec![Value::Integer(1)]);
        let b = a.bind_copy();
        if let (Value::Array(x), Value::Array(y)) = (&a, &b) {
            assert!(Rc::ptr_eq(x, y));
        } else {
            panic!("Expected arrays");
        }
    }

    #[test]
    fn test_inspect_and_display() {
        let s = Value::string("hi");
        assert_eq!(s.inspect(), "\"hi\"");
        assert_eq!(s.to_string(), "hi");

        let key = Value::string("a");
        let mut table = HashTable::default();
        table.insert(
            HashKey::from_value(&key).unwrap(),
            HashPair {
                key,
                value: Value::Integer(1),
            },
        );
        let h = Value::hash(table);
        assert_eq!(h.inspect(), r#"{"a": 1}"#);

        let arr = Value::array(vec![Value::string("x"), Value::Null]);
        assert_eq!(arr.to_string(), r#"["x", null]"#);
    }

    #[test]
    fn test_truthiness() {
        assert!(Value::Integer(0).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::Integer(0).as_bool());
    }
}
