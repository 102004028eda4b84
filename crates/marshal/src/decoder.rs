//! Decoder: bytes to value graph
//!
//! A [`Loader`] lives for exactly one Load call. Every non-scalar value
//! reserves its object slot as soon as its tag is read, ahead of its class
//! name and children, and binds its shell (empty array, blank instance, ...)
//! into the slot as soon as it exists, so a child may link back to a parent
//! that is still being filled.
//!
//! Wrapper tags (`I`, `e`) do not take a slot of their own. The value they
//! wrap is read as a partial value: it registers its slot as usual but the
//! per-value callback only fires once the wrapper is complete.

use crate::config::CodecConfig;
use crate::error::{CodecError, LoadWarning, Result};
use crate::host::{HostAdapter, WireShape};
use crate::numeric::ByteReader;
use crate::tables::{ObjectReader, SymbolReader};
use crate::tags::Tag;
use crate::value::{ModuleKind, ModuleRef, RArray, RHash, Shared, Symbol, Value};
use tracing::{trace, warn};

/// Per-value callback invoked post-order while loading
pub type LoadCallback<'c> = &'c mut dyn FnMut(&Value) -> Result<()>;

pub struct Loader<'a, 'c> {
    input: ByteReader<'a>,
    symbols: SymbolReader,
    objects: ObjectReader,
    host: &'a dyn HostAdapter,
    config: &'a CodecConfig,
    callback: Option<LoadCallback<'c>>,
    depth: usize,
    warnings: Vec<LoadWarning>,
}

impl<'a, 'c> Loader<'a, 'c> {
    pub fn new(
        bytes: &'a [u8],
        host: &'a dyn HostAdapter,
        config: &'a CodecConfig,
        callback: Option<LoadCallback<'c>>,
    ) -> Self {
        Self {
            input: ByteReader::new(bytes),
            symbols: SymbolReader::new(),
            objects: ObjectReader::new(),
            host,
            config,
            callback,
            depth: 0,
            warnings: Vec::new(),
        }
    }

    /// Check the preamble and read one value
    pub fn load(mut self) -> Result<(Value, Vec<LoadWarning>)> {
        self.read_preamble()?;
        let value = self.read_value(false)?;
        if self.input.remaining() > 0 {
            trace!("{} trailing bytes ignored", self.input.remaining());
        }
        Ok((value, self.warnings))
    }

    fn read_preamble(&mut self) -> Result<()> {
        let major = self.input.read_u8()?;
        let minor = self.input.read_u8()?;
        let required = self.config.version();
        let given = (major, minor);
        if major != required.0 {
            return Err(CodecError::Version { required, given });
        }
        let warning = if minor > required.1 {
            Some(LoadWarning::NewerMinor { required, given })
        } else if minor < required.1 {
            Some(LoadWarning::OlderMinor { required, given })
        } else {
            None
        };
        if let Some(warning) = warning {
            warn!("{}", warning);
            self.warnings.push(warning);
        }
        Ok(())
    }

    fn read_value(&mut self, partial: bool) -> Result<Value> {
        self.enter()?;
        let value = self.read_tagged(partial);
        self.depth -= 1;
        value
    }

    /// Count one nesting level against the load depth limit
    fn enter(&mut self) -> Result<()> {
        if let Some(limit) = self.config.load_depth_limit
            && self.depth >= limit
        {
            return Err(CodecError::depth_exceeded());
        }
        self.depth += 1;
        Ok(())
    }

    /// Hand a finished value to the callback unless it is partial
    fn leave(&mut self, value: Value, partial: bool) -> Result<Value> {
        if !partial && let Some(callback) = self.callback.as_mut() {
            callback(&value)?;
        }
        Ok(value)
    }

    #[inline(never)]
    fn read_tag(&mut self) -> Result<Tag> {
        let offset = self.input.position();
        let byte = self.input.read_u8()?;
        let tag = Tag::from_byte(byte)
            .ok_or_else(|| CodecError::format(format!("dump format error (0x{:x})", byte)))?;
        trace!("read {} at {}", tag.name(), offset);
        Ok(tag)
    }

    // Every nesting level holds a frame of this function; keep arm locals
    // in the non-inlined helpers.
    fn read_tagged(&mut self, partial: bool) -> Result<Value> {
        let tag = self.read_tag()?;
        let value = match tag {
            Tag::Nil => Value::Nil,
            Tag::True => Value::Bool(true),
            Tag::False => Value::Bool(false),
            Tag::Fixnum => Value::Int(self.input.read_int()?),
            Tag::Symbol => Value::Symbol(self.read_symbol_body()?),
            Tag::SymbolLink => return self.read_symbol_link().map(Value::Symbol),
            Tag::ObjectLink => return self.read_object_link(),
            Tag::InstanceVars => self.read_instance_vars()?,
            Tag::Extended => self.read_extended()?,
            Tag::Array => {
                let slot = self.objects.reserve();
                self.read_array(slot)?
            }
            Tag::Hash | Tag::HashWithDefault => {
                let slot = self.objects.reserve();
                self.read_hash(tag == Tag::HashWithDefault, slot)?
            }
            _ => self.read_cold(tag)?,
        };
        self.leave(value, partial)
    }

    /// Everything outside the array/hash path, each with its slot reserved
    /// before any of its bytes are read
    #[inline(never)]
    fn read_cold(&mut self, tag: Tag) -> Result<Value> {
        let slot = self.objects.reserve();
        match tag {
            Tag::Bignum => {
                let value = Value::integer(self.input.read_bignum()?);
                self.objects.fill(slot, value.clone());
                Ok(value)
            }
            Tag::Float => {
                let value = Value::Float(self.input.read_float()?);
                self.objects.fill(slot, value.clone());
                Ok(value)
            }
            Tag::String => {
                let value = Value::string(Vec::new());
                self.read_builtin_into(tag, &value, slot)?;
                Ok(value)
            }
            Tag::Regex => {
                let value = Value::regex(Vec::new(), 0);
                self.read_builtin_into(tag, &value, slot)?;
                Ok(value)
            }
            Tag::Object => self.read_object(slot),
            Tag::UserDump => self.read_user_dump(slot),
            Tag::UserMarshal => self.read_user_marshal(slot),
            Tag::UserClass => self.read_user_class(slot),
            Tag::Struct => self.read_struct(slot),
            Tag::Class => self.read_module_ref(ModuleKind::Class, slot),
            Tag::Module => self.read_module_ref(ModuleKind::Module, slot),
            other => Err(CodecError::format(format!(
                "dump format error (0x{:x})",
                other.byte()
            ))),
        }
    }

    #[inline(never)]
    fn read_symbol_link(&mut self) -> Result<Symbol> {
        let index = self.input.read_len()?;
        self.symbols.get(index)
    }

    #[inline(never)]
    fn read_object_link(&mut self) -> Result<Value> {
        let index = self.input.read_len()?;
        self.objects.get(index)
    }

    #[inline(never)]
    fn read_instance_vars(&mut self) -> Result<Value> {
        let value = self.read_value(true)?;
        self.read_attributes(&value)?;
        Ok(value)
    }

    #[inline(never)]
    fn read_extended(&mut self) -> Result<Value> {
        let name = self.read_symbol()?;
        let module = self.resolve(name.as_str(), ModuleKind::Module)?;
        let value = self.read_value(true)?;
        self.host.apply_extension(&value, &module)?;
        Ok(value)
    }

    #[inline(never)]
    fn read_array(&mut self, slot: usize) -> Result<Value> {
        let value = Value::array(Vec::new());
        self.objects.fill(slot, value.clone());
        if let Value::Array(rc) = &value {
            self.read_items(rc)?;
        }
        Ok(value)
    }

    #[inline(never)]
    fn read_hash(&mut self, with_default: bool, slot: usize) -> Result<Value> {
        let value = Value::hash(Vec::new());
        self.objects.fill(slot, value.clone());
        if let Value::Hash(rc) = &value {
            self.read_entries(rc, with_default)?;
        }
        Ok(value)
    }

    fn read_items(&mut self, rc: &Shared<RArray>) -> Result<()> {
        let len = self.input.read_len()?;
        rc.borrow_mut().items.reserve(len.min(self.input.remaining()));
        for _ in 0..len {
            let item = self.read_value(false)?;
            rc.borrow_mut().items.push(item);
        }
        Ok(())
    }

    fn read_entries(&mut self, rc: &Shared<RHash>, with_default: bool) -> Result<()> {
        let len = self.input.read_len()?;
        for _ in 0..len {
            let key = self.read_value(false)?;
            let value = self.read_value(false)?;
            rc.borrow_mut().entries.push((key, value));
        }
        if with_default {
            let default = self.read_value(false)?;
            rc.borrow_mut().default = Some(default);
        }
        Ok(())
    }

    /// Bind `shell` into `slot` and read the content of a built-in shape
    /// into it; `shell` must already have that shape
    fn read_builtin_into(&mut self, tag: Tag, shell: &Value, slot: usize) -> Result<()> {
        self.objects.fill(slot, shell.clone());
        match (tag, shell) {
            (Tag::String, Value::String(rc)) => {
                let bytes = self.input.read_bytes()?;
                rc.borrow_mut().bytes = bytes.to_vec();
            }
            (Tag::Regex, Value::Regex(rc)) => {
                let source = self.input.read_bytes()?.to_vec();
                let options = self.input.read_u8()?;
                let mut re = rc.borrow_mut();
                re.source = source;
                re.options = options;
            }
            (Tag::Array, Value::Array(rc)) => self.read_items(rc)?,
            (Tag::Hash | Tag::HashWithDefault, Value::Hash(rc)) => {
                self.read_entries(rc, tag == Tag::HashWithDefault)?
            }
            _ => {
                return Err(CodecError::argument(format!(
                    "dump format error (user class): {} is not a {}",
                    shell.type_name(),
                    tag.name()
                )));
            }
        }
        Ok(())
    }

    fn read_object(&mut self, slot: usize) -> Result<Value> {
        let class = self.read_class()?;
        let value = self.host.create_blank(&class)?;
        self.objects.fill(slot, value.clone());
        self.read_attributes(&value)?;
        Ok(value)
    }

    fn read_user_dump(&mut self, slot: usize) -> Result<Value> {
        let class = self.read_class()?;
        let bytes = self.input.read_bytes()?;
        let value = self.host.create_blank(&class)?;
        self.objects.fill(slot, value.clone());
        self.host.invoke_simple_load(&value, bytes)?;
        Ok(value)
    }

    fn read_user_marshal(&mut self, slot: usize) -> Result<Value> {
        let class = self.read_class()?;
        let value = self.host.create_blank(&class)?;
        self.objects.fill(slot, value.clone());
        let payload = self.read_value(false)?;
        self.host.invoke_structured_load(&value, payload)?;
        Ok(value)
    }

    fn read_module_ref(&mut self, kind: ModuleKind, slot: usize) -> Result<Value> {
        let name = String::from_utf8_lossy(self.input.read_bytes()?).into_owned();
        let module = self.resolve(&name, kind)?;
        let value = Value::module_ref(module);
        self.objects.fill(slot, value.clone());
        Ok(value)
    }

    /// `C Class body`: a blank subclass instance filled with the body
    fn read_user_class(&mut self, slot: usize) -> Result<Value> {
        let class = self.read_class()?;
        let tag = self.read_tag()?;
        if !matches!(
            tag,
            Tag::String | Tag::Regex | Tag::Array | Tag::Hash | Tag::HashWithDefault
        ) {
            return Err(CodecError::argument(format!(
                "incompatible base type {} for {:?}",
                tag.name(),
                class
            )));
        }
        let value = self.host.create_blank(&class)?;
        self.read_builtin_into(tag, &value, slot)?;
        Ok(value)
    }

    fn read_struct(&mut self, slot: usize) -> Result<Value> {
        let class = self.read_class()?;
        let names = self.host.struct_field_names(&class).ok_or_else(|| {
            CodecError::type_error(format!("class {:?} not a struct", class))
        })?;
        let value = self.host.create_blank(&class)?;
        if WireShape::of(&value) != Some(WireShape::Struct) {
            return Err(CodecError::type_error(format!("class {:?} not a struct", class)));
        }
        self.objects.fill(slot, value.clone());

        let len = self.input.read_len()?;
        if len != names.len() {
            return Err(CodecError::argument(format!(
                "struct {:?} not compatible (struct size differs)",
                class
            )));
        }
        for (i, expected) in names.iter().enumerate() {
            let name = self.read_symbol()?;
            if name != *expected {
                return Err(CodecError::type_error(format!(
                    "struct {:?} not compatible (:{} for :{})",
                    class, name, expected
                )));
            }
            let field = self.read_value(false)?;
            self.host.set_struct_field(&value, i, field)?;
        }
        Ok(value)
    }

    /// Trailing `count (Symbol, Value)*` attribute list
    fn read_attributes(&mut self, target: &Value) -> Result<()> {
        let len = self.input.read_len()?;
        for _ in 0..len {
            let name = self.read_symbol()?;
            let attr = self.read_value(false)?;
            // Symbols carry encoding attributes on the wire but have nowhere to keep them
            if !matches!(target, Value::Symbol(_)) {
                self.host.set_instance_attribute(target, &name, attr)?;
            }
        }
        Ok(())
    }

    fn read_symbol_body(&mut self) -> Result<Symbol> {
        let bytes = self.input.read_bytes()?;
        let symbol = Symbol::new(String::from_utf8_lossy(bytes));
        self.symbols.define(symbol.clone());
        Ok(symbol)
    }

    /// A symbol in name position (class names, attribute and field names)
    fn read_symbol(&mut self) -> Result<Symbol> {
        match self.read_tag()? {
            Tag::Symbol => self.read_symbol_body(),
            Tag::SymbolLink => self.read_symbol_link(),
            Tag::InstanceVars => {
                // attribute names may themselves carry `I`, so this nests too
                self.enter()?;
                let symbol = self.read_wrapped_symbol();
                self.depth -= 1;
                symbol
            }
            other => Err(Self::not_a_symbol(other)),
        }
    }

    /// `I` in name position wraps exactly one plain symbol or symbol link
    fn read_wrapped_symbol(&mut self) -> Result<Symbol> {
        let symbol = match self.read_tag()? {
            Tag::Symbol => self.read_symbol_body()?,
            Tag::SymbolLink => self.read_symbol_link()?,
            other => return Err(Self::not_a_symbol(other)),
        };
        self.read_attributes(&Value::Symbol(symbol.clone()))?;
        Ok(symbol)
    }

    fn not_a_symbol(tag: Tag) -> CodecError {
        CodecError::format(format!("dump format error for symbol (0x{:x})", tag.byte()))
    }

    fn read_class(&mut self) -> Result<ModuleRef> {
        let name = self.read_symbol()?;
        self.resolve(name.as_str(), ModuleKind::Class)
    }

    fn resolve(&self, name: &str, kind: ModuleKind) -> Result<ModuleRef> {
        let found = self
            .host
            .resolve_type(name, kind)
            .ok_or_else(|| CodecError::argument(format!("undefined class/module {}", name)))?;
        if found.kind() != kind {
            return Err(CodecError::type_error(format!(
                "{} does not refer to {}",
                name, kind
            )));
        }
        Ok(found)
    }
}
