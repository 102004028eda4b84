//! Encoder: value graph to bytes
//!
//! A [`Dumper`] lives for exactly one Dump call. It owns the output buffer
//! and both per-call tables, and reaches the host's type system only
//! through [`HostAdapter`].
//!
//! # Wrapper order
//!
//! A heap value without hooks is written as
//!
//! ```text
//! [I] [e Mod]* [C Class] body [attribute pairs if I]
//! ```
//!
//! `I` appears only around built-in shapes carrying attributes (generic
//! objects list their attributes in the `o` body). `C` appears only when a
//! string, regex, array or hash is an instance of a subclass.

use crate::config::CodecConfig;
use crate::error::{CodecError, Result};
use crate::host::{HostAdapter, WireShape};
use crate::numeric::{format_float, write_bignum, write_bytes, write_int, write_len};
use crate::tables::{ObjectWriter, SymbolWriter};
use crate::tags::Tag;
use crate::value::{ModuleRef, Symbol, Value};
use num_bigint::BigInt;
use tracing::trace;

/// Fixnums outside this range are written as bignums when promotion is on
const FIXNUM_31_MIN: i32 = -(1 << 30);
const FIXNUM_31_MAX: i32 = (1 << 30) - 1;

pub struct Dumper<'a> {
    out: Vec<u8>,
    symbols: SymbolWriter,
    objects: ObjectWriter,
    host: &'a dyn HostAdapter,
    config: &'a CodecConfig,
}

impl<'a> Dumper<'a> {
    pub fn new(host: &'a dyn HostAdapter, config: &'a CodecConfig) -> Self {
        Self {
            out: Vec::new(),
            symbols: SymbolWriter::new(),
            objects: ObjectWriter::new(),
            host,
            config,
        }
    }

    /// Write the preamble and `value`, returning the finished stream
    pub fn dump(mut self, value: &Value, limit: i32) -> Result<Vec<u8>> {
        self.out.push(self.config.major_version);
        self.out.push(self.config.minor_version);
        self.write_value(value, limit)?;
        trace!(
            "dump wrote {} symbols, {} objects",
            self.symbols.len(),
            self.objects.len()
        );
        Ok(self.out)
    }

    fn tag(&mut self, tag: Tag) {
        trace!("write {} at {}", tag.name(), self.out.len());
        self.out.push(tag.byte());
    }

    fn write_value(&mut self, value: &Value, mut limit: i32) -> Result<()> {
        if limit == 0 {
            return Err(CodecError::depth_exceeded());
        }

        match value {
            Value::Nil => self.tag(Tag::Nil),
            Value::Bool(true) => self.tag(Tag::True),
            Value::Bool(false) => self.tag(Tag::False),
            Value::Int(n) => {
                if self.config.wide_fixnums_as_bignums && !(FIXNUM_31_MIN..=FIXNUM_31_MAX).contains(n) {
                    self.write_bignum(&BigInt::from(*n))?;
                } else {
                    self.tag(Tag::Fixnum);
                    write_int(&mut self.out, *n);
                }
            }
            Value::Symbol(symbol) => self.write_symbol(symbol)?,
            Value::Bignum(n) => self.write_bignum(n)?,
            Value::Float(f) => {
                self.objects.reserve(value);
                self.tag(Tag::Float);
                let text = format_float(*f, self.config.whole_float_suffix);
                write_bytes(&mut self.out, text.as_bytes())?;
            }
            _ => {
                if let Some(index) = self.objects.lookup(value) {
                    self.tag(Tag::ObjectLink);
                    write_len(&mut self.out, index)?;
                    return Ok(());
                }
                if limit > 0 {
                    limit -= 1;
                }
                self.write_reference(value, limit)?;
            }
        }
        Ok(())
    }

    fn write_bignum(&mut self, n: &BigInt) -> Result<()> {
        self.objects.reserve(&Value::Nil);
        self.tag(Tag::Bignum);
        write_bignum(&mut self.out, n)
    }

    fn write_symbol(&mut self, symbol: &Symbol) -> Result<()> {
        match self.symbols.lookup_or_insert(symbol) {
            Some(index) => {
                self.tag(Tag::SymbolLink);
                write_len(&mut self.out, index)
            }
            None => {
                self.tag(Tag::Symbol);
                write_bytes(&mut self.out, symbol.as_str().as_bytes())
            }
        }
    }

    /// Name of a class or module as a symbol; anonymous definitions fail
    fn type_symbol(&self, module: &ModuleRef) -> Result<Symbol> {
        match self.host.name_of(module) {
            Some(name) => Ok(Symbol::new(name)),
            None => Err(CodecError::type_error(format!(
                "can't dump anonymous {} {:?}",
                module.kind(),
                module
            ))),
        }
    }

    fn write_reference(&mut self, value: &Value, limit: i32) -> Result<()> {
        match value {
            Value::Class(module) | Value::Module(module) => {
                let name = self.type_symbol(module)?;
                self.objects.reserve(value);
                self.tag(if module.is_class() { Tag::Class } else { Tag::Module });
                return write_bytes(&mut self.out, name.as_str().as_bytes());
            }
            Value::Hash(rc) if rc.borrow().default_proc.is_some() => {
                return Err(CodecError::argument("can't dump hash with default proc"));
            }
            _ => {}
        }

        if self.host.has_structured_dump(value) {
            return self.write_structured(value, limit);
        }
        if self.host.has_simple_dump(value) {
            return self.write_simple(value, limit);
        }

        self.objects.reserve(value);
        let class = self.host.effective_type(value);
        let shape = WireShape::of(value);

        let ivars = match shape {
            Some(WireShape::Object) | None => Vec::new(),
            Some(_) => self.host.instance_attributes(value),
        };
        if !ivars.is_empty() {
            self.tag(Tag::InstanceVars);
        }
        self.write_extensions(value)?;

        if let Some(shape @ (WireShape::String | WireShape::Regex | WireShape::Array | WireShape::Hash)) =
            shape
            && class != self.host.canonical_type(shape)
        {
            let name = self.type_symbol(&class)?;
            self.tag(Tag::UserClass);
            self.write_symbol(&name)?;
        }

        match value {
            Value::String(rc) => {
                let bytes = rc.borrow().bytes.clone();
                self.tag(Tag::String);
                write_bytes(&mut self.out, &bytes)?;
            }
            Value::Regex(rc) => {
                let (source, options) = {
                    let re = rc.borrow();
                    (re.source.clone(), re.options)
                };
                self.tag(Tag::Regex);
                write_bytes(&mut self.out, &source)?;
                self.out.push(options);
            }
            Value::Array(rc) => {
                let items = rc.borrow().items.clone();
                self.tag(Tag::Array);
                write_len(&mut self.out, items.len())?;
                for item in &items {
                    self.write_value(item, limit)?;
                }
            }
            Value::Hash(rc) => {
                let (entries, default) = {
                    let hash = rc.borrow();
                    (hash.entries.clone(), hash.default.clone())
                };
                self.tag(if default.is_some() {
                    Tag::HashWithDefault
                } else {
                    Tag::Hash
                });
                write_len(&mut self.out, entries.len())?;
                for (key, val) in &entries {
                    self.write_value(key, limit)?;
                    self.write_value(val, limit)?;
                }
                if let Some(default) = default {
                    self.write_value(&default, limit)?;
                }
            }
            Value::Struct(_) => self.write_struct(value, &class, limit)?,
            Value::Object(_) => {
                let name = self.type_symbol(&class)?;
                self.tag(Tag::Object);
                self.write_symbol(&name)?;
                let attrs = self.host.instance_attributes(value);
                self.write_attributes(&attrs, limit)?;
            }
            _ => {
                return Err(CodecError::type_error(format!(
                    "no _dump_data is defined for {}",
                    value.type_name()
                )));
            }
        }

        if !ivars.is_empty() {
            self.write_attributes(&ivars, limit)?;
        }
        Ok(())
    }

    fn write_struct(&mut self, value: &Value, class: &ModuleRef, limit: i32) -> Result<()> {
        let name = self.type_symbol(class)?;
        let fields = self
            .host
            .struct_field_names(class)
            .ok_or_else(|| CodecError::type_error(format!("class {} not a struct", name)))?;
        self.tag(Tag::Struct);
        self.write_symbol(&name)?;
        write_len(&mut self.out, fields.len())?;
        for (i, field) in fields.iter().enumerate() {
            let member = self.host.get_struct_field(value, i).unwrap_or(Value::Nil);
            self.write_symbol(field)?;
            self.write_value(&member, limit)?;
        }
        Ok(())
    }

    fn write_attributes(&mut self, attrs: &[(Symbol, Value)], limit: i32) -> Result<()> {
        write_len(&mut self.out, attrs.len())?;
        for (name, attr) in attrs {
            self.write_symbol(name)?;
            self.write_value(attr, limit)?;
        }
        Ok(())
    }

    fn write_extensions(&mut self, value: &Value) -> Result<()> {
        for module in self.host.singleton_extensions(value) {
            let name = self.type_symbol(&module)?;
            self.tag(Tag::Extended);
            self.write_symbol(&name)?;
        }
        Ok(())
    }

    /// `U Class payload`: the object is registered before its payload so the
    /// payload may refer back to it
    fn write_structured(&mut self, value: &Value, limit: i32) -> Result<()> {
        self.objects.reserve(value);
        let payload = self.host.invoke_structured_dump(value)?;
        self.objects.retain(payload.clone());

        let class = self.host.effective_type(value);
        let name = self.type_symbol(&class)?;
        self.write_extensions(value)?;
        self.tag(Tag::UserMarshal);
        self.write_symbol(&name)?;
        self.write_value(&payload, limit)
    }

    /// `u Class bytes`
    fn write_simple(&mut self, value: &Value, limit: i32) -> Result<()> {
        let payload = self.host.invoke_simple_dump(value, limit)?;
        let bytes = match &payload {
            Value::String(rc) => rc.borrow().bytes.clone(),
            other => {
                return Err(CodecError::type_error(format!(
                    "_dump() must return string, not {}",
                    other.type_name()
                )));
            }
        };
        self.objects.retain(payload);

        let class = self.host.effective_type(value);
        let name = self.type_symbol(&class)?;
        self.objects.reserve(value);
        self.tag(Tag::UserDump);
        self.write_symbol(&name)?;
        write_bytes(&mut self.out, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::registry::{Layout, TypeRegistry};

    fn dump(value: &Value) -> Result<Vec<u8>> {
        let registry = TypeRegistry::new();
        let config = CodecConfig::default();
        Dumper::new(&registry, &config).dump(value, -1)
    }

    fn body(value: &Value) -> Vec<u8> {
        dump(value).unwrap()[2..].to_vec()
    }

    #[test]
    fn test_preamble() {
        let bytes = dump(&Value::Nil).unwrap();
        assert_eq!(bytes, vec![4, 8, b'0']);
    }

    #[test]
    fn test_immediates() {
        assert_eq!(body(&Value::Bool(true)), b"T");
        assert_eq!(body(&Value::Bool(false)), b"F");
        assert_eq!(body(&Value::Int(1)), vec![b'i', 6]);
        assert_eq!(body(&Value::Int(-1)), vec![b'i', 0xfa]);
    }

    #[test]
    fn test_concrete_scenario() {
        let v = Value::array(vec![Value::Int(1), Value::from("two"), Value::Float(3.0)]);
        assert_eq!(
            dump(&v).unwrap(),
            vec![
                4, 8, b'[', 8, b'i', 6, b'"', 8, b't', b'w', b'o', b'f', 8, b'3', b'.', b'0'
            ]
        );
    }

    #[test]
    fn test_symbol_backreference() {
        let v = Value::array(vec![Value::symbol("a"), Value::symbol("b"), Value::symbol("a")]);
        assert_eq!(
            body(&v),
            vec![b'[', 8, b':', 6, b'a', b':', 6, b'b', b';', 0]
        );
    }

    #[test]
    fn test_shared_object_written_once() {
        let s = Value::from("x");
        let v = Value::array(vec![s.clone(), s]);
        // array is object 0, string object 1
        assert_eq!(body(&v), vec![b'[', 7, b'"', 6, b'x', b'@', 6]);
    }

    #[test]
    fn test_floats_consume_object_indices() {
        let s = Value::from("x");
        let v = Value::array(vec![Value::Float(1.5), s.clone(), s]);
        let out = body(&v);
        // array 0, float 1, string 2
        assert_eq!(&out[out.len() - 2..], &[b'@', 7]);
    }

    #[test]
    fn test_self_reference() {
        let a = Value::array(vec![]);
        a.as_array().unwrap().borrow_mut().items.push(a.clone());
        assert_eq!(body(&a), vec![b'[', 6, b'@', 0]);
    }

    #[test]
    fn test_hash_tags() {
        let plain = Value::hash(vec![(Value::Int(1), Value::Nil)]);
        assert_eq!(body(&plain), vec![b'{', 6, b'i', 6, b'0']);

        let with_default = Value::hash_with_default(vec![], Value::Int(5));
        assert_eq!(body(&with_default), vec![b'}', 0, b'i', 10]);
    }

    #[test]
    fn test_default_proc_rejected() {
        let h = Value::hash(vec![]);
        h.as_hash().unwrap().borrow_mut().default_proc =
            Some(std::rc::Rc::new(|_: &Value, _: &Value| Value::Nil));
        let err = dump(&h).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);
    }

    #[test]
    fn test_regex() {
        let re = Value::regex("a+", 1);
        assert_eq!(body(&re), vec![b'/', 7, b'a', b'+', 1]);
    }

    #[test]
    fn test_depth_budget() {
        let registry = TypeRegistry::new();
        let config = CodecConfig::default();
        let v = Value::array(vec![
            Value::Int(1),
            Value::array(vec![Value::Int(2), Value::array(vec![Value::Int(3)])]),
        ]);
        let err = Dumper::new(&registry, &config).dump(&v, 1).unwrap_err();
        assert_eq!(err, CodecError::depth_exceeded());
        assert!(Dumper::new(&registry, &config).dump(&v, 4).is_ok());
        assert!(Dumper::new(&registry, &config).dump(&v, 3).is_err());
    }

    #[test]
    fn test_generic_object_inline_attributes() {
        let registry = TypeRegistry::new();
        let point = registry.define_class("Point", Layout::Object);
        let p = Value::object(point, vec![(Symbol::new("@x"), Value::Int(1))]);
        let config = CodecConfig::default();
        let out = Dumper::new(&registry, &config).dump(&p, -1).unwrap();
        let mut expected = vec![4, 8, b'o', b':', 10];
        expected.extend_from_slice(b"Point");
        expected.extend_from_slice(&[6, b':', 7, b'@', b'x', b'i', 6]);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_string_with_ivars_uses_wrapper() {
        let s = Value::from("a");
        s.with_header_mut(|h| h.set_ivar(Symbol::new("@n"), Value::Int(0)));
        assert_eq!(
            body(&s),
            vec![b'I', b'"', 6, b'a', 6, b':', 7, b'@', b'n', b'i', 0]
        );
    }

    #[test]
    fn test_subclass_wrapper() {
        let registry = TypeRegistry::new();
        let list = registry.define_class("List", Layout::Array);
        let v = registry.create_blank(&list).unwrap();
        let config = CodecConfig::default();
        let out = Dumper::new(&registry, &config).dump(&v, -1).unwrap();
        let mut expected = vec![4, 8, b'C', b':', 9];
        expected.extend_from_slice(b"List");
        expected.extend_from_slice(&[b'[', 0]);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_extensions_most_recent_first() {
        let registry = TypeRegistry::new();
        let a = registry.define_module("A");
        let b = registry.define_module("B");
        let v = Value::array(vec![]);
        registry.apply_extension(&v, &a).unwrap();
        registry.apply_extension(&v, &b).unwrap();
        let config = CodecConfig::default();
        let out = Dumper::new(&registry, &config).dump(&v, -1).unwrap();
        assert_eq!(
            &out[2..],
            &[b'e', b':', 6, b'B', b'e', b':', 6, b'A', b'[', 0]
        );
    }

    #[test]
    fn test_anonymous_class_rejected() {
        let registry = TypeRegistry::new();
        let anon = registry.anonymous_class();
        let config = CodecConfig::default();
        let err = Dumper::new(&registry, &config)
            .dump(&Value::module_ref(anon.clone()), -1)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);

        let obj = Value::object(anon, vec![]);
        let err = Dumper::new(&registry, &config).dump(&obj, -1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[test]
    fn test_class_and_module_refs() {
        let registry = TypeRegistry::new();
        let kernel = registry.lookup("Kernel").unwrap();
        let string = registry.lookup("String").unwrap();
        let config = CodecConfig::default();
        let out = Dumper::new(&registry, &config)
            .dump(&Value::module_ref(kernel), -1)
            .unwrap();
        assert_eq!(&out[2..4], &[b'm', 11]);
        let out = Dumper::new(&registry, &config)
            .dump(&Value::module_ref(string), -1)
            .unwrap();
        assert_eq!(&out[2..4], &[b'c', 11]);
    }

    #[test]
    fn test_simple_dump_must_return_string() {
        let registry = TypeRegistry::new();
        let blob = registry.define_class("Blob", Layout::Object);
        registry
            .set_simple_dump(&blob, |_, _| Ok(Value::Int(1)), |_, _| Ok(()))
            .unwrap();
        let v = registry.create_blank(&blob).unwrap();
        let config = CodecConfig::default();
        let err = Dumper::new(&registry, &config).dump(&v, -1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[test]
    fn test_simple_dump_receives_decremented_limit() {
        let registry = TypeRegistry::new();
        let blob = registry.define_class("Blob", Layout::Object);
        registry
            .set_simple_dump(
                &blob,
                |_, limit| Ok(Value::from(limit.to_string().as_str())),
                |_, _| Ok(()),
            )
            .unwrap();
        let v = registry.create_blank(&blob).unwrap();
        let config = CodecConfig::default();
        let out = Dumper::new(&registry, &config).dump(&v, 5).unwrap();
        assert_eq!(out.last(), Some(&b'4'));
    }

    #[test]
    fn test_wide_fixnum_promotion() {
        let registry = TypeRegistry::new();
        let config = CodecConfig::default().with_wide_fixnums_as_bignums(true);
        let out = Dumper::new(&registry, &config)
            .dump(&Value::Int(1 << 30), -1)
            .unwrap();
        assert_eq!(out, vec![4, 8, b'l', b'+', 7, 0, 0, 0, 0x40]);

        let out = Dumper::new(&registry, &config)
            .dump(&Value::Int((1 << 30) - 1), -1)
            .unwrap();
        assert_eq!(out[2], b'i');
    }
}
