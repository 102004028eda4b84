//! In-process type registry implementing [`HostAdapter`]
//!
//! Holds named class and module definitions, the layout each class
//! allocates, and optional dump/load hooks. The codec's value model keeps
//! per-instance state in [`ObjectHeader`](crate::value::ObjectHeader); the
//! registry reads and writes that state on the codec's behalf.
//!
//! # Example
//!
//! ```rust
//! use marshal::{Marshal, TypeRegistry, Value, Symbol};
//! use marshal::registry::Layout;
//!
//! let registry = TypeRegistry::new();
//! let point = registry.define_class("Point", Layout::Object);
//! let p = Value::object(point, vec![(Symbol::new("@x"), Value::Int(1))]);
//!
//! let codec = Marshal::default();
//! let bytes = codec.dump(&p, &registry).unwrap();
//! let loaded = codec.load(&bytes, &registry).unwrap();
//! assert_eq!(loaded.value, p);
//! ```

use crate::error::{CodecError, Result};
use crate::host::{
    HostAdapter, SimpleDumpHook, SimpleLoadHook, StructuredDumpHook, StructuredLoadHook, WireShape,
};
use crate::value::{
    ModuleKind, ModuleRef, ObjectHeader, RArray, RHash, RObject, RRegex, RString, RStruct, Symbol,
    Value,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// What a blank instance of a class looks like
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// Generic object carrying only instance attributes
    Object,
    String,
    Regex,
    Array,
    Hash,
    /// Record with these field names, in order
    Struct(Vec<Symbol>),
}

#[derive(Clone, Default)]
struct Hooks {
    simple_dump: Option<SimpleDumpHook>,
    simple_load: Option<SimpleLoadHook>,
    structured_dump: Option<StructuredDumpHook>,
    structured_load: Option<StructuredLoadHook>,
}

#[derive(Clone)]
struct TypeEntry {
    module: ModuleRef,
    layout: Layout,
    hooks: Hooks,
}

const BUILTIN_CLASSES: &[&str] = &[
    "Object",
    "String",
    "Regexp",
    "Array",
    "Hash",
    "Struct",
    "Integer",
    "Float",
    "Symbol",
    "NilClass",
    "TrueClass",
    "FalseClass",
    "Class",
    "Module",
];

const BUILTIN_MODULES: &[&str] = &["Kernel", "Comparable", "Enumerable"];

/// Named class/module table plus hooks
pub struct TypeRegistry {
    types: RefCell<HashMap<String, TypeEntry>>,
    /// Auto-define unknown names on resolve instead of failing
    permissive: bool,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Registry with the library classes and modules pre-defined
    pub fn new() -> Self {
        let registry = TypeRegistry {
            types: RefCell::new(HashMap::new()),
            permissive: false,
        };
        for name in BUILTIN_CLASSES {
            let layout = match *name {
                "String" => Layout::String,
                "Regexp" => Layout::Regex,
                "Array" => Layout::Array,
                "Hash" => Layout::Hash,
                "Struct" => Layout::Struct(Vec::new()),
                _ => Layout::Object,
            };
            registry.define(name, ModuleKind::Class, layout);
        }
        for name in BUILTIN_MODULES {
            registry.define(name, ModuleKind::Module, Layout::Object);
        }
        registry
    }

    /// Registry that defines any unknown name it is asked to resolve
    ///
    /// Useful for inspecting streams written by programs whose classes are
    /// not available.
    pub fn permissive() -> Self {
        TypeRegistry {
            permissive: true,
            ..Self::new()
        }
    }

    pub fn is_permissive(&self) -> bool {
        self.permissive
    }

    fn define(&self, name: &str, kind: ModuleKind, layout: Layout) -> ModuleRef {
        let mut types = self.types.borrow_mut();
        if let Some(entry) = types.get_mut(name)
            && entry.module.kind() == kind
        {
            entry.layout = layout;
            return entry.module.clone();
        }
        let module = ModuleRef::named(name, kind);
        types.insert(
            name.to_string(),
            TypeEntry {
                module: module.clone(),
                layout,
                hooks: Hooks::default(),
            },
        );
        module
    }

    /// Define (or redefine the layout of) a class
    pub fn define_class(&self, name: &str, layout: Layout) -> ModuleRef {
        self.define(name, ModuleKind::Class, layout)
    }

    /// Define a struct class with the given field names
    pub fn define_struct(&self, name: &str, fields: &[&str]) -> ModuleRef {
        let fields = fields.iter().map(Symbol::new).collect();
        self.define(name, ModuleKind::Class, Layout::Struct(fields))
    }

    pub fn define_module(&self, name: &str) -> ModuleRef {
        self.define(name, ModuleKind::Module, Layout::Object)
    }

    /// A class with no name; values of it cannot be dumped
    pub fn anonymous_class(&self) -> ModuleRef {
        ModuleRef::anonymous(ModuleKind::Class)
    }

    pub fn anonymous_module(&self) -> ModuleRef {
        ModuleRef::anonymous(ModuleKind::Module)
    }

    /// Find a definition by name
    pub fn lookup(&self, name: &str) -> Option<ModuleRef> {
        self.types.borrow().get(name).map(|e| e.module.clone())
    }

    fn entry(&self, module: &ModuleRef) -> Option<TypeEntry> {
        let name = module.name()?;
        self.types
            .borrow()
            .get(name)
            .filter(|e| e.module == *module)
            .cloned()
    }

    fn update_hooks(&self, class: &ModuleRef, f: impl FnOnce(&mut Hooks)) -> Result<()> {
        let name = class
            .name()
            .ok_or_else(|| CodecError::type_error("can't attach hooks to an anonymous class"))?;
        let mut types = self.types.borrow_mut();
        let entry = types
            .get_mut(name)
            .ok_or_else(|| CodecError::argument(format!("undefined class/module {}", name)))?;
        f(&mut entry.hooks);
        Ok(())
    }

    /// Give `class` a `_dump`/`_load` pair: instances are written as raw bytes
    pub fn set_simple_dump(
        &self,
        class: &ModuleRef,
        dump: impl Fn(&Value, i32) -> Result<Value> + 'static,
        load: impl Fn(&Value, &[u8]) -> Result<()> + 'static,
    ) -> Result<()> {
        self.update_hooks(class, |hooks| {
            hooks.simple_dump = Some(Rc::new(dump));
            hooks.simple_load = Some(Rc::new(load));
        })
    }

    /// Give `class` a `marshal_dump`/`marshal_load` pair: instances are
    /// written as the value the dump hook returns
    pub fn set_structured_dump(
        &self,
        class: &ModuleRef,
        dump: impl Fn(&Value) -> Result<Value> + 'static,
        load: impl Fn(&Value, Value) -> Result<()> + 'static,
    ) -> Result<()> {
        self.update_hooks(class, |hooks| {
            hooks.structured_dump = Some(Rc::new(dump));
            hooks.structured_load = Some(Rc::new(load));
        })
    }

    fn hooks_of(&self, value: &Value) -> Hooks {
        self.entry(&self.effective_type(value))
            .map(|e| e.hooks)
            .unwrap_or_default()
    }

    fn builtin(&self, name: &str) -> ModuleRef {
        self.lookup(name)
            .unwrap_or_else(|| ModuleRef::named(name, ModuleKind::Class))
    }

    /// Header naming `class` unless it is the library class for `shape`
    fn blank_header(&self, class: &ModuleRef, shape: WireShape) -> ObjectHeader {
        if *class == self.canonical_type(shape) {
            ObjectHeader::default()
        } else {
            ObjectHeader::with_class(class.clone())
        }
    }
}

impl HostAdapter for TypeRegistry {
    fn effective_type(&self, value: &Value) -> ModuleRef {
        if let Some(Some(class)) = value.with_header(|h| h.class.clone()) {
            return class;
        }
        match value {
            Value::Nil => self.builtin("NilClass"),
            Value::Bool(true) => self.builtin("TrueClass"),
            Value::Bool(false) => self.builtin("FalseClass"),
            Value::Int(_) | Value::Bignum(_) => self.builtin("Integer"),
            Value::Float(_) => self.builtin("Float"),
            Value::Symbol(_) => self.builtin("Symbol"),
            Value::Class(_) => self.builtin("Class"),
            Value::Module(_) => self.builtin("Module"),
            other => match WireShape::of(other) {
                Some(shape) => self.canonical_type(shape),
                None => self.builtin("Object"),
            },
        }
    }

    fn canonical_type(&self, shape: WireShape) -> ModuleRef {
        let name = match shape {
            WireShape::String => "String",
            WireShape::Regex => "Regexp",
            WireShape::Array => "Array",
            WireShape::Hash => "Hash",
            WireShape::Struct => "Struct",
            WireShape::Object => "Object",
        };
        self.builtin(name)
    }

    fn resolve_type(&self, name: &str, expected: ModuleKind) -> Option<ModuleRef> {
        if let Some(found) = self.lookup(name) {
            return Some(found);
        }
        if !self.permissive {
            return None;
        }
        tracing::debug!("auto-defining {} {}", expected, name);
        Some(self.define(name, expected, Layout::Object))
    }

    fn create_blank(&self, class: &ModuleRef) -> Result<Value> {
        if !class.is_class() {
            return Err(CodecError::type_error(format!(
                "can't instantiate module {:?}",
                class
            )));
        }
        let layout = self
            .entry(class)
            .map(|e| e.layout)
            .unwrap_or(Layout::Object);
        let value = match layout {
            Layout::Object => Value::Object(Rc::new(RefCell::new(RObject {
                header: ObjectHeader::with_class(class.clone()),
            }))),
            Layout::String => Value::String(Rc::new(RefCell::new(RString {
                header: self.blank_header(class, WireShape::String),
                ..RString::default()
            }))),
            Layout::Regex => Value::Regex(Rc::new(RefCell::new(RRegex {
                header: self.blank_header(class, WireShape::Regex),
                ..RRegex::default()
            }))),
            Layout::Array => Value::Array(Rc::new(RefCell::new(RArray {
                header: self.blank_header(class, WireShape::Array),
                ..RArray::default()
            }))),
            Layout::Hash => Value::Hash(Rc::new(RefCell::new(RHash {
                header: self.blank_header(class, WireShape::Hash),
                ..RHash::default()
            }))),
            Layout::Struct(fields) => Value::Struct(Rc::new(RefCell::new(RStruct {
                header: ObjectHeader::with_class(class.clone()),
                fields: vec![Value::Nil; fields.len()],
            }))),
        };
        Ok(value)
    }

    fn instance_attributes(&self, value: &Value) -> Vec<(Symbol, Value)> {
        value.with_header(|h| h.ivars.clone()).unwrap_or_default()
    }

    fn get_instance_attribute(&self, value: &Value, name: &Symbol) -> Option<Value> {
        value.with_header(|h| h.get_ivar(name).cloned()).flatten()
    }

    fn set_instance_attribute(&self, value: &Value, name: &Symbol, attr: Value) -> Result<()> {
        value
            .with_header_mut(|h| h.set_ivar(name.clone(), attr))
            .ok_or_else(|| {
                CodecError::type_error(format!(
                    "can't set instance variable {} on {}",
                    name,
                    value.type_name()
                ))
            })
    }

    fn has_simple_dump(&self, value: &Value) -> bool {
        self.hooks_of(value).simple_dump.is_some()
    }

    fn invoke_simple_dump(&self, value: &Value, depth: i32) -> Result<Value> {
        let hook = self.hooks_of(value).simple_dump.ok_or_else(|| {
            CodecError::type_error(format!("{} has no _dump hook", value.type_name()))
        })?;
        hook(value, depth)
    }

    fn invoke_simple_load(&self, instance: &Value, bytes: &[u8]) -> Result<()> {
        let hook = self.hooks_of(instance).simple_load.ok_or_else(|| {
            CodecError::type_error(format!(
                "class {:?} needs to have method `_load'",
                self.effective_type(instance)
            ))
        })?;
        hook(instance, bytes)
    }

    fn has_structured_dump(&self, value: &Value) -> bool {
        self.hooks_of(value).structured_dump.is_some()
    }

    fn invoke_structured_dump(&self, value: &Value) -> Result<Value> {
        let hook = self.hooks_of(value).structured_dump.ok_or_else(|| {
            CodecError::type_error(format!("{} has no marshal_dump hook", value.type_name()))
        })?;
        hook(value)
    }

    fn invoke_structured_load(&self, instance: &Value, payload: Value) -> Result<()> {
        let hook = self.hooks_of(instance).structured_load.ok_or_else(|| {
            CodecError::type_error(format!(
                "instance of {:?} needs to have method `marshal_load'",
                self.effective_type(instance)
            ))
        })?;
        hook(instance, payload)
    }

    fn struct_field_names(&self, class: &ModuleRef) -> Option<Vec<Symbol>> {
        match self.entry(class)?.layout {
            Layout::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    fn get_struct_field(&self, value: &Value, index: usize) -> Option<Value> {
        let record = value.as_struct()?;
        let field = record.borrow().fields.get(index).cloned();
        field
    }

    fn set_struct_field(&self, value: &Value, index: usize, field: Value) -> Result<()> {
        let record = value
            .as_struct()
            .ok_or_else(|| CodecError::type_error(format!("{} is not a struct", value.type_name())))?;
        let mut record = record.borrow_mut();
        let slot = record
            .fields
            .get_mut(index)
            .ok_or_else(|| CodecError::argument(format!("offset {} too large for struct", index)))?;
        *slot = field;
        Ok(())
    }

    fn singleton_extensions(&self, value: &Value) -> Vec<ModuleRef> {
        value
            .with_header(|h| h.extensions.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    fn apply_extension(&self, value: &Value, module: &ModuleRef) -> Result<()> {
        if module.is_class() {
            return Err(CodecError::type_error(format!(
                "wrong argument type Class {:?} (expected Module)",
                module
            )));
        }
        value
            .with_header_mut(|h| h.extensions.push(module.clone()))
            .ok_or_else(|| {
                CodecError::type_error(format!("can't define singleton on {}", value.type_name()))
            })
    }
}
