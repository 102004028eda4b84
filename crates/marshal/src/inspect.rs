//! Human-readable rendering of values
//!
//! Renders a value graph as text for debugging and for the `rmarshal` tool.
//! Rendering is cycle-safe: a heap value met again while it is still being
//! rendered prints as `<cycle>`.
//!
//! # Format Examples
//!
//! - Int: `42`
//! - Float: `3.0`, `inf`, `nan`
//! - String: `"hello"` (with escaping)
//! - Symbol: `:name`
//! - Regex: `/ab+c/i`
//! - Array: `[1, "two", 3.0]`
//! - Hash: `{:a => 1}`
//! - Struct: `#<struct Pair left=1, right=2>`
//! - Object: `#<Point @x=1, @y=2>`
//! - Subclass of a built-in: `#<Text "abc">`
//! - Extended value: `#<extended Mixin: [1]>`

use crate::host::HostAdapter;
use crate::numeric::format_float;
use crate::value::{ModuleRef, ObjectHeader, RRegex, Symbol, Value};
use std::collections::HashSet;

/// Layout of inspector output
///
/// Compact output keeps a whole graph on one line, the way `rmarshal inspect`
/// prints by default. Pretty output breaks arrays, hashes, struct fields and
/// attributes onto their own lines.
#[derive(Debug, Clone)]
pub struct InspectConfig {
    /// Break nested containers across lines
    pub pretty: bool,
    /// Spaces added per nesting level when `pretty` is set
    pub indent: usize,
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self::compact()
    }
}

impl InspectConfig {
    /// Single-line output
    pub fn compact() -> Self {
        Self {
            pretty: false,
            indent: 2,
        }
    }

    /// Multi-line output indented by two spaces
    pub fn pretty() -> Self {
        Self {
            pretty: true,
            ..Self::compact()
        }
    }

    /// Same layout with a different indent width
    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }
}

/// Render a value
///
/// Struct fields print positionally since field names live with the host;
/// use [`inspect_with_host`] to get `name=value` pairs.
pub fn inspect(value: &Value, config: &InspectConfig) -> String {
    let mut inspector = Inspector::new(config, None);
    inspector.format_value(value, 0);
    inspector.buf
}

/// Render a value, asking `host` for struct field names
pub fn inspect_with_host(value: &Value, config: &InspectConfig, host: &dyn HostAdapter) -> String {
    let mut inspector = Inspector::new(config, Some(host));
    inspector.format_value(value, 0);
    inspector.buf
}

struct Inspector<'a> {
    config: &'a InspectConfig,
    host: Option<&'a dyn HostAdapter>,
    /// Heap values currently being rendered
    active: HashSet<usize>,
    buf: String,
}

impl<'a> Inspector<'a> {
    fn new(config: &'a InspectConfig, host: Option<&'a dyn HostAdapter>) -> Self {
        Self {
            config,
            host,
            active: HashSet::new(),
            buf: String::new(),
        }
    }

    fn format_value(&mut self, value: &Value, depth: usize) {
        let id = match value {
            Value::Class(_) | Value::Module(_) => None,
            other => other.identity(),
        };
        if let Some(id) = id {
            if !self.active.insert(id) {
                self.buf.push_str("<cycle>");
                return;
            }
        }
        self.format_inner(value, depth);
        if let Some(id) = id {
            self.active.remove(&id);
        }
    }

    fn format_inner(&mut self, value: &Value, depth: usize) {
        match value {
            Value::Nil => self.buf.push_str("nil"),
            Value::Bool(b) => self.buf.push_str(if *b { "true" } else { "false" }),
            Value::Int(n) => self.buf.push_str(&n.to_string()),
            Value::Bignum(n) => self.buf.push_str(&n.to_string()),
            Value::Float(f) => self.buf.push_str(&format_float(*f, true)),
            Value::Symbol(s) => format_symbol(s, &mut self.buf),
            Value::Class(m) | Value::Module(m) => format_module(m, &mut self.buf),
            Value::Object(rc) => {
                let obj = rc.borrow();
                self.open_extended(&obj.header);
                self.buf.push_str("#<");
                format_class(obj.header.class.as_ref(), "Object", &mut self.buf);
                self.format_ivars(&obj.header.ivars, depth, false);
                self.buf.push('>');
                self.close_extended(&obj.header);
            }
            Value::Struct(rc) => {
                let record = rc.borrow();
                self.open_extended(&record.header);
                self.buf.push_str("#<struct ");
                format_class(record.header.class.as_ref(), "Struct", &mut self.buf);
                let names = match (self.host, &record.header.class) {
                    (Some(host), Some(class)) => host.struct_field_names(class),
                    _ => None,
                };
                for (i, field) in record.fields.iter().enumerate() {
                    self.buf.push_str(if i == 0 { " " } else { ", " });
                    if let Some(name) = names.as_ref().and_then(|n| n.get(i)) {
                        self.buf.push_str(name.as_str());
                        self.buf.push('=');
                    }
                    self.format_value(field, depth + 1);
                }
                self.format_ivars(&record.header.ivars, depth, !record.fields.is_empty());
                self.buf.push('>');
                self.close_extended(&record.header);
            }
            Value::String(rc) => {
                let s = rc.borrow();
                self.decorated(&s.header, "String", depth, |this, _| {
                    format_string(&s.bytes, &mut this.buf)
                });
            }
            Value::Regex(rc) => {
                let re = rc.borrow();
                self.decorated(&re.header, "Regexp", depth, |this, _| {
                    format_regex(&re.source, re.options, &mut this.buf)
                });
            }
            Value::Array(rc) => {
                let arr = rc.borrow();
                self.decorated(&arr.header, "Array", depth, |this, depth| {
                    this.format_list(&arr.items, depth)
                });
            }
            Value::Hash(rc) => {
                let hash = rc.borrow();
                self.decorated(&hash.header, "Hash", depth, |this, depth| {
                    this.format_map(&hash.entries, depth);
                    if let Some(default) = &hash.default {
                        this.buf.push_str(" default ");
                        this.format_value(default, depth);
                    }
                    if hash.default_proc.is_some() {
                        this.buf.push_str(" default <proc>");
                    }
                });
            }
        }
    }

    /// Render a built-in shape, wrapped in `#<Class ...>` when it is a
    /// subclass instance or carries attributes
    fn decorated(
        &mut self,
        header: &ObjectHeader,
        canonical: &str,
        depth: usize,
        body: impl FnOnce(&mut Self, usize),
    ) {
        self.open_extended(header);
        let wrapped = header.class.is_some() || !header.ivars.is_empty();
        if wrapped {
            self.buf.push_str("#<");
            format_class(header.class.as_ref(), canonical, &mut self.buf);
            self.buf.push(' ');
        }
        body(self, depth);
        if wrapped {
            self.format_ivars(&header.ivars, depth, true);
            self.buf.push('>');
        }
        self.close_extended(header);
    }

    fn open_extended(&mut self, header: &ObjectHeader) {
        if header.extensions.is_empty() {
            return;
        }
        self.buf.push_str("#<extended ");
        for (i, module) in header.extensions.iter().enumerate() {
            if i > 0 {
                self.buf.push_str(", ");
            }
            format_module(module, &mut self.buf);
        }
        self.buf.push_str(": ");
    }

    fn close_extended(&mut self, header: &ObjectHeader) {
        if !header.extensions.is_empty() {
            self.buf.push('>');
        }
    }

    fn format_ivars(&mut self, ivars: &[(Symbol, Value)], depth: usize, after_body: bool) {
        for (i, (name, value)) in ivars.iter().enumerate() {
            self.buf.push_str(if i == 0 && !after_body { " " } else { ", " });
            self.buf.push_str(name.as_str());
            self.buf.push('=');
            self.format_value(value, depth + 1);
        }
    }

    fn format_list(&mut self, items: &[Value], depth: usize) {
        self.buf.push('[');
        if items.is_empty() {
            self.buf.push(']');
            return;
        }
        for (i, item) in items.iter().enumerate() {
            self.separator(i, depth + 1);
            self.format_value(item, depth + 1);
        }
        self.closing(depth);
        self.buf.push(']');
    }

    fn format_map(&mut self, entries: &[(Value, Value)], depth: usize) {
        self.buf.push('{');
        if entries.is_empty() {
            self.buf.push('}');
            return;
        }
        for (i, (key, value)) in entries.iter().enumerate() {
            self.separator(i, depth + 1);
            self.format_value(key, depth + 1);
            self.buf.push_str(" => ");
            self.format_value(value, depth + 1);
        }
        self.closing(depth);
        self.buf.push('}');
    }

    fn separator(&mut self, index: usize, depth: usize) {
        if index > 0 {
            self.buf.push(',');
        }
        if self.config.pretty {
            self.buf.push('\n');
            push_indent(&mut self.buf, depth, self.config.indent);
        } else if index > 0 {
            self.buf.push(' ');
        }
    }

    fn closing(&mut self, depth: usize) {
        if self.config.pretty {
            self.buf.push('\n');
            push_indent(&mut self.buf, depth, self.config.indent);
        }
    }
}

fn format_symbol(symbol: &Symbol, buf: &mut String) {
    buf.push(':');
    buf.push_str(symbol.as_str());
}

fn format_module(module: &ModuleRef, buf: &mut String) {
    buf.push_str(&format!("{:?}", module));
}

fn format_class(class: Option<&ModuleRef>, canonical: &str, buf: &mut String) {
    match class {
        Some(class) => format_module(class, buf),
        None => buf.push_str(canonical),
    }
}

/// Format a byte string with escaping; invalid UTF-8 bytes print as `\xNN`
fn format_string(bytes: &[u8], buf: &mut String) {
    buf.push('"');
    match std::str::from_utf8(bytes) {
        Ok(s) => {
            for c in s.chars() {
                match c {
                    '"' => buf.push_str("\\\""),
                    '\\' => buf.push_str("\\\\"),
                    '\n' => buf.push_str("\\n"),
                    '\r' => buf.push_str("\\r"),
                    '\t' => buf.push_str("\\t"),
                    c if c.is_control() => buf.push_str(&format!("\\u{:04x}", c as u32)),
                    c => buf.push(c),
                }
            }
        }
        Err(_) => {
            for &b in bytes {
                match b {
                    b'"' => buf.push_str("\\\""),
                    b'\\' => buf.push_str("\\\\"),
                    0x20..=0x7e => buf.push(b as char),
                    _ => buf.push_str(&format!("\\x{:02X}", b)),
                }
            }
        }
    }
    buf.push('"');
}

fn format_regex(source: &[u8], options: u8, buf: &mut String) {
    buf.push('/');
    buf.push_str(&String::from_utf8_lossy(source));
    buf.push('/');
    if options & RRegex::MULTILINE != 0 {
        buf.push('m');
    }
    if options & RRegex::IGNORECASE != 0 {
        buf.push('i');
    }
    if options & RRegex::EXTENDED != 0 {
        buf.push('x');
    }
}

/// Push indentation spaces
fn push_indent(buf: &mut String, depth: usize, indent_size: usize) {
    for _ in 0..(depth * indent_size) {
        buf.push(' ');
    }
}
