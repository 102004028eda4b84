//! Host adapter: the codec's only view of the surrounding type system
//!
//! The encoder and decoder never dispatch methods or construct types on
//! their own. Every question about classes, attributes, hooks and
//! extensions goes through [`HostAdapter`]. Optional per-type behaviour is
//! expressed as capability-query + invoke pairs (`has_simple_dump` /
//! `invoke_simple_dump`) rather than through any notion of inheritance.
//!
//! [`crate::registry::TypeRegistry`] is the in-process implementation used
//! by the crate's own value model.

use crate::error::Result;
use crate::value::{ModuleKind, ModuleRef, Symbol, Value};

/// Built-in wire shape of a value, each with one canonical library class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireShape {
    String,
    Regex,
    Array,
    Hash,
    Struct,
    Object,
}

impl WireShape {
    /// Shape of a heap value; `None` for immediates, numbers and class refs
    pub fn of(value: &Value) -> Option<WireShape> {
        match value {
            Value::String(_) => Some(WireShape::String),
            Value::Regex(_) => Some(WireShape::Regex),
            Value::Array(_) => Some(WireShape::Array),
            Value::Hash(_) => Some(WireShape::Hash),
            Value::Struct(_) => Some(WireShape::Struct),
            Value::Object(_) => Some(WireShape::Object),
            _ => None,
        }
    }
}

/// `_dump`-style hook: `(object, depth budget)` to a string value
pub type SimpleDumpHook = std::rc::Rc<dyn Fn(&Value, i32) -> Result<Value>>;

/// `_load`-style hook: populate a blank instance from raw bytes
pub type SimpleLoadHook = std::rc::Rc<dyn Fn(&Value, &[u8]) -> Result<()>>;

/// `marshal_dump`-style hook: object to any dumpable value
pub type StructuredDumpHook = std::rc::Rc<dyn Fn(&Value) -> Result<Value>>;

/// `marshal_load`-style hook: populate a blank instance from a loaded value
pub type StructuredLoadHook = std::rc::Rc<dyn Fn(&Value, Value) -> Result<()>>;

/// Operations the codec needs from the host's object model
///
/// Implementations decide their own synchronization; the codec calls these
/// from a single thread for the duration of one Dump or Load.
pub trait HostAdapter {
    /// Actual class of a heap value
    fn effective_type(&self, value: &Value) -> ModuleRef;

    /// Library class that a wire shape decodes to by default
    fn canonical_type(&self, shape: WireShape) -> ModuleRef;

    /// Look up a class or module by its full name
    ///
    /// Returns whatever the name refers to; the caller checks the kind.
    fn resolve_type(&self, name: &str, expected: ModuleKind) -> Option<ModuleRef>;

    /// Name of a definition, `None` when it is anonymous
    fn name_of(&self, module: &ModuleRef) -> Option<String> {
        module.name().map(str::to_string)
    }

    /// Allocate an instance of `class` without running any initializer
    fn create_blank(&self, class: &ModuleRef) -> Result<Value>;

    /// Instance attributes in the host's enumeration order
    fn instance_attributes(&self, value: &Value) -> Vec<(Symbol, Value)>;

    fn get_instance_attribute(&self, value: &Value, name: &Symbol) -> Option<Value>;

    fn set_instance_attribute(&self, value: &Value, name: &Symbol, attr: Value) -> Result<()>;

    fn has_simple_dump(&self, value: &Value) -> bool;

    /// Must produce a string value; anything else fails the dump
    fn invoke_simple_dump(&self, value: &Value, depth: i32) -> Result<Value>;

    fn invoke_simple_load(&self, instance: &Value, bytes: &[u8]) -> Result<()>;

    fn has_structured_dump(&self, value: &Value) -> bool;

    fn invoke_structured_dump(&self, value: &Value) -> Result<Value>;

    fn invoke_structured_load(&self, instance: &Value, payload: Value) -> Result<()>;

    /// Field names of a struct class in canonical order, `None` if not a struct
    fn struct_field_names(&self, class: &ModuleRef) -> Option<Vec<Symbol>>;

    fn get_struct_field(&self, value: &Value, index: usize) -> Option<Value>;

    fn set_struct_field(&self, value: &Value, index: usize, field: Value) -> Result<()>;

    /// Singleton extension modules, most recently applied first
    fn singleton_extensions(&self, value: &Value) -> Vec<ModuleRef>;

    fn apply_extension(&self, value: &Value, module: &ModuleRef) -> Result<()>;
}
