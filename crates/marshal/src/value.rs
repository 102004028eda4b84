//! Value model: what the codec reads and writes
//!
//! Immediate values (`nil`, booleans, fixnums, symbols) are plain data.
//! Floats and bignums are immutable numbers. Everything else is a
//! reference-typed heap value behind [`Shared`], so two positions in a graph
//! can point at the same instance and a graph can contain cycles.
//!
//! # Identity
//!
//! Reference-typed values are identified by pointer. Cloning a `Value`
//! clones the handle, not the instance; mutation through one clone is
//! visible through every other.
//!
//! # Equality
//!
//! `PartialEq` is structural and cycle-aware: it compares shapes, contents,
//! classes, instance attributes and extensions, and assumes a pair of
//! instances already under comparison is equal. NaN floats compare equal to
//! each other so decoded graphs can be checked against their source.

use crate::inspect::{InspectConfig, inspect};
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// Shared, mutable handle to a heap value
pub type Shared<T> = Rc<RefCell<T>>;

/// Live default callback of a hash: `(hash, key) -> value`
pub type DefaultProc = Rc<dyn Fn(&Value, &Value) -> Value>;

fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

fn address<T: ?Sized>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as *const () as usize
}

/// Interned, immutable name
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(Rc<str>);

impl Symbol {
    pub fn new(name: impl AsRef<str>) -> Self {
        Symbol(Rc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol::new(name)
    }
}

/// Whether a definition is a class or a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    Class,
    Module,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleKind::Class => f.write_str("class"),
            ModuleKind::Module => f.write_str("module"),
        }
    }
}

#[derive(Debug)]
struct ModuleDef {
    name: Option<String>,
    kind: ModuleKind,
}

/// Handle to a class or module definition owned by the host
///
/// Two handles are equal when they are the same definition, or when both
/// are named and agree on kind and name.
#[derive(Clone)]
pub struct ModuleRef(Rc<ModuleDef>);

impl ModuleRef {
    pub fn named(name: impl Into<String>, kind: ModuleKind) -> Self {
        ModuleRef(Rc::new(ModuleDef {
            name: Some(name.into()),
            kind,
        }))
    }

    /// A definition with no name; it cannot be written to a stream
    pub fn anonymous(kind: ModuleKind) -> Self {
        ModuleRef(Rc::new(ModuleDef { name: None, kind }))
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn kind(&self) -> ModuleKind {
        self.0.kind
    }

    pub fn is_class(&self) -> bool {
        self.0.kind == ModuleKind::Class
    }

    pub fn ptr_eq(&self, other: &ModuleRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn identity(&self) -> usize {
        address(&self.0)
    }
}

impl PartialEq for ModuleRef {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        self.kind() == other.kind() && self.name().is_some() && self.name() == other.name()
    }
}

impl fmt::Debug for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "#<{}:{:#x}>", self.kind(), self.identity()),
        }
    }
}

/// Per-instance state shared by every heap value
#[derive(Debug, Clone, Default)]
pub struct ObjectHeader {
    /// Effective class; `None` means the library class for the value's shape
    pub class: Option<ModuleRef>,
    /// Instance attributes in definition order
    pub ivars: Vec<(Symbol, Value)>,
    /// Singleton extension modules in the order they were applied
    pub extensions: Vec<ModuleRef>,
}

impl ObjectHeader {
    pub fn with_class(class: ModuleRef) -> Self {
        Self {
            class: Some(class),
            ..Self::default()
        }
    }

    pub fn get_ivar(&self, name: &Symbol) -> Option<&Value> {
        self.ivars.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Set an attribute, keeping its original position when it already exists
    pub fn set_ivar(&mut self, name: Symbol, value: Value) {
        match self.ivars.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.ivars.push((name, value)),
        }
    }
}

/// Byte string
#[derive(Debug, Clone, Default)]
pub struct RString {
    pub header: ObjectHeader,
    pub bytes: Vec<u8>,
}

/// Regular expression: pattern source plus option flags
#[derive(Debug, Clone, Default)]
pub struct RRegex {
    pub header: ObjectHeader,
    pub source: Vec<u8>,
    pub options: u8,
}

impl RRegex {
    pub const IGNORECASE: u8 = 1;
    pub const EXTENDED: u8 = 2;
    pub const MULTILINE: u8 = 4;
}

/// Ordered sequence of values
#[derive(Debug, Clone, Default)]
pub struct RArray {
    pub header: ObjectHeader,
    pub items: Vec<Value>,
}

/// Ordered key/value pairs with an optional default
#[derive(Clone, Default)]
pub struct RHash {
    pub header: ObjectHeader,
    pub entries: Vec<(Value, Value)>,
    /// Static default value
    pub default: Option<Value>,
    /// Live default callback; a hash carrying one cannot be dumped
    pub default_proc: Option<DefaultProc>,
}

impl RHash {
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

impl fmt::Debug for RHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RHash")
            .field("header", &self.header)
            .field("entries", &self.entries)
            .field("default", &self.default)
            .field("default_proc", &self.default_proc.as_ref().map(|_| "<proc>"))
            .finish()
    }
}

/// Record with named fields; names come from the struct's class
#[derive(Debug, Clone, Default)]
pub struct RStruct {
    pub header: ObjectHeader,
    pub fields: Vec<Value>,
}

/// Generic host object: a class plus instance attributes
#[derive(Debug, Clone, Default)]
pub struct RObject {
    pub header: ObjectHeader,
}

/// A value the codec can dump and load
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    /// Fixnum: fits a native signed 32-bit integer
    Int(i32),
    /// Integer outside the fixnum range
    Bignum(BigInt),
    Float(f64),
    Symbol(Symbol),
    String(Shared<RString>),
    Regex(Shared<RRegex>),
    Array(Shared<RArray>),
    Hash(Shared<RHash>),
    Struct(Shared<RStruct>),
    Object(Shared<RObject>),
    Class(ModuleRef),
    Module(ModuleRef),
}

impl Value {
    /// Integer of any size, normalized to `Int` when it fits
    pub fn integer(value: BigInt) -> Value {
        match value.to_i32() {
            Some(small) => Value::Int(small),
            None => Value::Bignum(value),
        }
    }

    pub fn symbol(name: impl AsRef<str>) -> Value {
        Value::Symbol(Symbol::new(name))
    }

    pub fn string(bytes: impl Into<Vec<u8>>) -> Value {
        Value::String(shared(RString {
            header: ObjectHeader::default(),
            bytes: bytes.into(),
        }))
    }

    pub fn regex(source: impl Into<Vec<u8>>, options: u8) -> Value {
        Value::Regex(shared(RRegex {
            header: ObjectHeader::default(),
            source: source.into(),
            options,
        }))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(shared(RArray {
            header: ObjectHeader::default(),
            items,
        }))
    }

    pub fn hash(entries: Vec<(Value, Value)>) -> Value {
        Value::Hash(shared(RHash {
            entries,
            ..RHash::default()
        }))
    }

    pub fn hash_with_default(entries: Vec<(Value, Value)>, default: Value) -> Value {
        Value::Hash(shared(RHash {
            entries,
            default: Some(default),
            ..RHash::default()
        }))
    }

    /// Instance of `class` whose fields are given in the class's field order
    pub fn record(class: ModuleRef, fields: Vec<Value>) -> Value {
        Value::Struct(shared(RStruct {
            header: ObjectHeader::with_class(class),
            fields,
        }))
    }

    /// Generic object of `class` with the given attributes
    pub fn object(class: ModuleRef, ivars: Vec<(Symbol, Value)>) -> Value {
        let mut header = ObjectHeader::with_class(class);
        header.ivars = ivars;
        Value::Object(shared(RObject { header }))
    }

    /// Reference to a class or module definition
    pub fn module_ref(module: ModuleRef) -> Value {
        match module.kind() {
            ModuleKind::Class => Value::Class(module),
            ModuleKind::Module => Value::Module(module),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Contents of a string value
    pub fn as_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Value::String(s) => Some(s.borrow().bytes.clone()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<Shared<RArray>> {
        match self {
            Value::Array(a) => Some(a.clone()),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<Shared<RHash>> {
        match self {
            Value::Hash(h) => Some(h.clone()),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<Shared<RStruct>> {
        match self {
            Value::Struct(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<Shared<RObject>> {
        match self {
            Value::Object(o) => Some(o.clone()),
            _ => None,
        }
    }

    /// Pointer identity of a reference-typed value
    ///
    /// `None` for immediates, floats and bignums, which have no identity
    /// worth preserving.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::String(rc) => Some(address(rc)),
            Value::Regex(rc) => Some(address(rc)),
            Value::Array(rc) => Some(address(rc)),
            Value::Hash(rc) => Some(address(rc)),
            Value::Struct(rc) => Some(address(rc)),
            Value::Object(rc) => Some(address(rc)),
            Value::Class(m) | Value::Module(m) => Some(m.identity()),
            _ => None,
        }
    }

    /// Same instance (reference-typed) or same immediate
    pub fn same(&self, other: &Value) -> bool {
        match (self.identity(), other.identity()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self == other,
            _ => false,
        }
    }

    /// Read the instance header of a heap value
    pub fn with_header<R>(&self, f: impl FnOnce(&ObjectHeader) -> R) -> Option<R> {
        match self {
            Value::String(rc) => Some(f(&rc.borrow().header)),
            Value::Regex(rc) => Some(f(&rc.borrow().header)),
            Value::Array(rc) => Some(f(&rc.borrow().header)),
            Value::Hash(rc) => Some(f(&rc.borrow().header)),
            Value::Struct(rc) => Some(f(&rc.borrow().header)),
            Value::Object(rc) => Some(f(&rc.borrow().header)),
            _ => None,
        }
    }

    /// Mutate the instance header of a heap value
    pub fn with_header_mut<R>(&self, f: impl FnOnce(&mut ObjectHeader) -> R) -> Option<R> {
        match self {
            Value::String(rc) => Some(f(&mut rc.borrow_mut().header)),
            Value::Regex(rc) => Some(f(&mut rc.borrow_mut().header)),
            Value::Array(rc) => Some(f(&mut rc.borrow_mut().header)),
            Value::Hash(rc) => Some(f(&mut rc.borrow_mut().header)),
            Value::Struct(rc) => Some(f(&mut rc.borrow_mut().header)),
            Value::Object(rc) => Some(f(&mut rc.borrow_mut().header)),
            _ => None,
        }
    }

    /// Name of the value's kind, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::Bignum(_) => "integer",
            Value::Float(_) => "float",
            Value::Symbol(_) => "symbol",
            Value::String(_) => "string",
            Value::Regex(_) => "regexp",
            Value::Array(_) => "array",
            Value::Hash(_) => "hash",
            Value::Struct(_) => "struct",
            Value::Object(_) => "object",
            Value::Class(_) => "class",
            Value::Module(_) => "module",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::integer(BigInt::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s.as_bytes())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&inspect(self, &InspectConfig::compact()))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        let mut seen = HashSet::new();
        values_eq(self, other, &mut seen)
    }
}

type Seen = HashSet<(usize, usize)>;

fn shared_eq<T>(
    a: &Shared<T>,
    b: &Shared<T>,
    seen: &mut Seen,
    f: impl FnOnce(&T, &T, &mut Seen) -> bool,
) -> bool {
    if Rc::ptr_eq(a, b) {
        return true;
    }
    // A pair already being compared is assumed equal; the rest of the walk decides
    if !seen.insert((address(a), address(b))) {
        return true;
    }
    let (x, y) = (a.borrow(), b.borrow());
    f(&x, &y, seen)
}

fn headers_eq(a: &ObjectHeader, b: &ObjectHeader, seen: &mut Seen) -> bool {
    a.class == b.class
        && a.extensions == b.extensions
        && a.ivars.len() == b.ivars.len()
        && a
            .ivars
            .iter()
            .zip(&b.ivars)
            .all(|((na, va), (nb, vb))| na == nb && values_eq(va, vb, seen))
}

fn slices_eq(a: &[Value], b: &[Value], seen: &mut Seen) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_eq(x, y, seen))
}

fn values_eq(a: &Value, b: &Value, seen: &mut Seen) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Bignum(x), Value::Bignum(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y || (x.is_nan() && y.is_nan()),
        (Value::Symbol(x), Value::Symbol(y)) => x == y,
        (Value::Class(x), Value::Class(y)) | (Value::Module(x), Value::Module(y)) => x == y,
        (Value::String(x), Value::String(y)) => shared_eq(x, y, seen, |x, y, seen| {
            x.bytes == y.bytes && headers_eq(&x.header, &y.header, seen)
        }),
        (Value::Regex(x), Value::Regex(y)) => shared_eq(x, y, seen, |x, y, seen| {
            x.source == y.source && x.options == y.options && headers_eq(&x.header, &y.header, seen)
        }),
        (Value::Array(x), Value::Array(y)) => shared_eq(x, y, seen, |x, y, seen| {
            headers_eq(&x.header, &y.header, seen) && slices_eq(&x.items, &y.items, seen)
        }),
        (Value::Hash(x), Value::Hash(y)) => shared_eq(x, y, seen, |x, y, seen| {
            let defaults = match (&x.default, &y.default) {
                (None, None) => true,
                (Some(dx), Some(dy)) => values_eq(dx, dy, seen),
                _ => false,
            };
            defaults
                && x.default_proc.is_some() == y.default_proc.is_some()
                && x.entries.len() == y.entries.len()
                && headers_eq(&x.header, &y.header, seen)
                && x.entries.iter().zip(&y.entries).all(|((kx, vx), (ky, vy))| {
                    values_eq(kx, ky, seen) && values_eq(vx, vy, seen)
                })
        }),
        (Value::Struct(x), Value::Struct(y)) => shared_eq(x, y, seen, |x, y, seen| {
            headers_eq(&x.header, &y.header, seen) && slices_eq(&x.fields, &y.fields, seen)
        }),
        (Value::Object(x), Value::Object(y)) => {
            shared_eq(x, y, seen, |x, y, seen| headers_eq(&x.header, &y.header, seen))
        }
        _ => false,
    }
}
