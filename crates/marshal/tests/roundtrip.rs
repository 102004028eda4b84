//! End-to-end Dump/Load tests through the public API

use marshal::value::RRegex;
use marshal::{
    CodecConfig, CodecError, ErrorKind, HostAdapter, Layout, LoadWarning, Marshal, Symbol,
    TypeRegistry, Value,
};
use num_bigint::BigInt;

fn roundtrip(value: &Value) -> Value {
    let registry = TypeRegistry::new();
    roundtrip_with(value, &registry)
}

fn roundtrip_with(value: &Value, registry: &TypeRegistry) -> Value {
    let codec = Marshal::default();
    let bytes = codec.dump(value, registry).unwrap();
    codec.load(&bytes, registry).unwrap().value
}

#[test]
fn test_concrete_scenario() {
    let registry = TypeRegistry::new();
    let v = Value::array(vec![Value::Int(1), Value::from("two"), Value::Float(3.0)]);
    let bytes = marshal::dump(&v, &registry).unwrap();
    let expected = [
        4, 8, b'[', 8, b'i', 6, b'"', 8, b't', b'w', b'o', b'f', 8, b'3', b'.', b'0',
    ];
    assert_eq!(bytes, expected);
    assert_eq!(marshal::load(&expected, &registry).unwrap(), v);
}

#[test]
fn test_scalars_roundtrip() {
    for v in [
        Value::Nil,
        Value::Bool(true),
        Value::Bool(false),
        Value::Float(0.1),
        Value::Float(-2.5e-300),
        Value::Float(1e100),
        Value::Float(f64::INFINITY),
        Value::Float(f64::NEG_INFINITY),
        Value::Float(f64::NAN),
        Value::symbol("sym"),
        Value::from(""),
        Value::from("héllo"),
        Value::string(vec![0u8, 0xff, 0x80]),
        Value::regex("a.*b", RRegex::IGNORECASE | RRegex::MULTILINE),
    ] {
        assert_eq!(roundtrip(&v), v, "roundtrip of {:?}", v);
    }
}

#[test]
fn test_integer_boundaries() {
    let registry = TypeRegistry::new();
    let cases: [(i32, &[u8]); 9] = [
        (0, &[0x00]),
        (1, &[0x06]),
        (122, &[0x7f]),
        (123, &[0x01, 0x7b]),
        (-1, &[0xfa]),
        (-123, &[0x80]),
        (-124, &[0xff, 0x84]),
        (i32::MAX, &[0x04, 0xff, 0xff, 0xff, 0x7f]),
        (i32::MIN, &[0xfc, 0x00, 0x00, 0x00, 0x80]),
    ];
    for (n, encoded) in cases {
        let bytes = marshal::dump(&Value::Int(n), &registry).unwrap();
        assert_eq!(bytes[2], b'i');
        assert_eq!(&bytes[3..], encoded, "encoding of {}", n);
        assert_eq!(marshal::load(&bytes, &registry).unwrap(), Value::Int(n));
    }
}

#[test]
fn test_bignums_roundtrip() {
    for n in [
        BigInt::from(i32::MAX) + 1,
        BigInt::from(i32::MIN) - 1,
        BigInt::from(1u64 << 32),
        BigInt::from(u64::MAX),
        BigInt::parse_bytes(b"-123456789012345678901234567890", 10).unwrap(),
    ] {
        let v = Value::integer(n);
        assert!(matches!(v, Value::Bignum(_)));
        assert_eq!(roundtrip(&v), v);
    }
}

#[test]
fn test_bignum_word_count_trimming() {
    let registry = TypeRegistry::new();
    // 2^32: digits [0, 1], top half of the top digit is zero so 3 words
    let bytes = marshal::dump(&Value::integer(BigInt::from(1u64 << 32)), &registry).unwrap();
    assert_eq!(&bytes[2..], &[b'l', b'+', 8, 0, 0, 0, 0, 1, 0]);
}

#[test]
fn test_nested_collections_roundtrip() {
    let registry = TypeRegistry::new();
    let v = Value::hash(vec![
        (
            Value::symbol("list"),
            Value::array(vec![Value::Int(1), Value::array(vec![Value::Nil])]),
        ),
        (Value::from("key"), Value::hash_with_default(vec![], Value::Int(0))),
    ]);
    assert_eq!(roundtrip_with(&v, &registry), v);
}

#[test]
fn test_symbol_dedup() {
    let registry = TypeRegistry::new();
    let v = Value::array(vec![Value::symbol("k"), Value::symbol("k")]);
    let bytes = marshal::dump(&v, &registry).unwrap();
    assert_eq!(&bytes[2..], &[b'[', 7, b':', 6, b'k', b';', 0]);

    let loaded = marshal::load(&bytes, &registry).unwrap();
    assert_eq!(loaded, v);
}

#[test]
fn test_shared_identity_preserved() {
    let registry = TypeRegistry::new();
    let shared = Value::from("shared");
    let v = Value::array(vec![shared.clone(), shared]);
    let bytes = marshal::dump(&v, &registry).unwrap();
    assert_eq!(bytes.iter().filter(|b| **b == b'@').count(), 1);

    let loaded = marshal::load(&bytes, &registry).unwrap();
    let items = loaded.as_array().unwrap().borrow().items.clone();
    assert!(items[0].same(&items[1]));

    if let Value::String(rc) = &items[0] {
        rc.borrow_mut().bytes.extend_from_slice(b"!");
    }
    assert_eq!(items[1].as_bytes().unwrap(), b"shared!");
}

#[test]
fn test_cycle_through_hash() {
    let h = Value::hash(vec![]);
    h.as_hash()
        .unwrap()
        .borrow_mut()
        .entries
        .push((Value::symbol("self"), h.clone()));
    let loaded = roundtrip(&h);
    let inner = loaded.as_hash().unwrap().borrow().entries[0].1.clone();
    assert!(inner.same(&loaded));
}

#[test]
fn test_cycle_through_object_attribute() {
    let registry = TypeRegistry::new();
    let node = registry.define_class("Node", Layout::Object);
    let n = Value::object(node, vec![]);
    n.with_header_mut(|h| h.set_ivar(Symbol::new("@next"), n.clone()));

    let loaded = roundtrip_with(&n, &registry);
    let next = registry
        .get_instance_attribute(&loaded, &Symbol::new("@next"))
        .unwrap();
    assert!(next.same(&loaded));
}

#[test]
fn test_cycle_through_instance_vars_wrapper() {
    let s = Value::from("self-tagged");
    s.with_header_mut(|h| h.set_ivar(Symbol::new("@me"), s.clone()));
    let loaded = roundtrip(&s);
    let me = loaded
        .with_header(|h| h.get_ivar(&Symbol::new("@me")).cloned())
        .flatten()
        .unwrap();
    assert!(me.same(&loaded));
}

#[test]
fn test_depth_budget() {
    let registry = TypeRegistry::new();
    let codec = Marshal::default();
    let v = Value::array(vec![
        Value::Int(1),
        Value::array(vec![Value::Int(2), Value::array(vec![Value::Int(3)])]),
    ]);
    let err = codec.dump_with_limit(&v, 1, &registry).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Argument);

    let mut deep = Value::Nil;
    for _ in 0..100 {
        deep = Value::array(vec![deep]);
    }
    assert!(codec.dump_with_limit(&deep, -1, &registry).is_ok());
}

#[test]
fn test_version_gate() {
    let registry = TypeRegistry::new();
    let codec = Marshal::default();

    let err = codec.load(&[5, 8, b'0'], &registry).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Version);

    let loaded = codec.load(&[4, 9, b'0'], &registry).unwrap();
    assert_eq!(loaded.value, Value::Nil);
    assert_eq!(
        loaded.warnings,
        vec![LoadWarning::NewerMinor {
            required: (4, 8),
            given: (4, 9)
        }]
    );
}

#[test]
fn test_subclass_roundtrip() {
    let registry = TypeRegistry::new();
    let text = registry.define_class("Text", Layout::String);
    let table = registry.define_class("Table", Layout::Hash);

    let s = registry.create_blank(&text).unwrap();
    if let Value::String(rc) = &s {
        rc.borrow_mut().bytes.extend_from_slice(b"body");
    }
    let t = registry.create_blank(&table).unwrap();
    t.as_hash()
        .unwrap()
        .borrow_mut()
        .entries
        .push((Value::Int(1), s.clone()));

    let loaded = roundtrip_with(&t, &registry);
    assert_eq!(registry.effective_type(&loaded), table);
    let inner = loaded.as_hash().unwrap().borrow().entries[0].1.clone();
    assert_eq!(registry.effective_type(&inner), text);
    assert_eq!(inner.as_bytes().unwrap(), b"body");
}

#[test]
fn test_struct_roundtrip() {
    let registry = TypeRegistry::new();
    let pair = registry.define_struct("Pair", &["left", "right"]);
    let v = Value::record(pair, vec![Value::Int(1), Value::from("r")]);
    assert_eq!(roundtrip_with(&v, &registry), v);
}

#[test]
fn test_struct_layout_changed_between_dump_and_load() {
    let writer = TypeRegistry::new();
    let pair = writer.define_struct("Pair", &["left", "right"]);
    let bytes = marshal::dump(&Value::record(pair, vec![Value::Nil, Value::Nil]), &writer).unwrap();

    let fewer = TypeRegistry::new();
    fewer.define_struct("Pair", &["left"]);
    assert_eq!(
        marshal::load(&bytes, &fewer).unwrap_err().kind(),
        ErrorKind::Argument
    );

    let renamed = TypeRegistry::new();
    renamed.define_struct("Pair", &["left", "other"]);
    assert_eq!(
        marshal::load(&bytes, &renamed).unwrap_err().kind(),
        ErrorKind::Type
    );
}

#[test]
fn test_class_and_module_refs() {
    let registry = TypeRegistry::new();
    let point = registry.define_class("Point", Layout::Object);
    let mixin = registry.define_module("Mixin");
    let v = Value::array(vec![
        Value::module_ref(point.clone()),
        Value::module_ref(mixin.clone()),
        Value::module_ref(point.clone()),
    ]);
    let bytes = marshal::dump(&v, &registry).unwrap();
    let loaded = marshal::load(&bytes, &registry).unwrap();
    let items = loaded.as_array().unwrap().borrow().items.clone();
    assert!(matches!(&items[0], Value::Class(c) if c.ptr_eq(&point)));
    assert!(matches!(&items[1], Value::Module(m) if m.ptr_eq(&mixin)));
    assert!(items[0].same(&items[2]));
}

#[test]
fn test_extensions_roundtrip_in_order() {
    let registry = TypeRegistry::new();
    let first = registry.define_module("First");
    let second = registry.define_module("Second");
    let v = Value::from("x");
    registry.apply_extension(&v, &first).unwrap();
    registry.apply_extension(&v, &second).unwrap();

    let loaded = roundtrip_with(&v, &registry);
    assert_eq!(
        loaded.with_header(|h| h.extensions.clone()).unwrap(),
        vec![first, second]
    );
}

#[test]
fn test_simple_dump_hook_roundtrip() {
    let registry = TypeRegistry::new();
    let version = registry.define_class("Version", Layout::Object);
    registry
        .set_simple_dump(
            &version,
            |v, _| {
                let text = match v.as_object() {
                    Some(obj) => match obj.borrow().header.get_ivar(&Symbol::new("@text")) {
                        Some(t) => t.as_bytes().unwrap_or_default(),
                        None => Vec::new(),
                    },
                    None => Vec::new(),
                };
                Ok(Value::string(text))
            },
            |v, bytes| {
                v.with_header_mut(|h| h.set_ivar(Symbol::new("@text"), Value::string(bytes)));
                Ok(())
            },
        )
        .unwrap();

    let v = Value::object(
        version,
        vec![(Symbol::new("@text"), Value::from("1.2.3"))],
    );
    let bytes = marshal::dump(&v, &registry).unwrap();
    assert_eq!(bytes[2], b'u');
    assert_eq!(marshal::load(&bytes, &registry).unwrap(), v);
}

#[test]
fn test_structured_dump_hook_roundtrip() {
    let registry = TypeRegistry::new();
    let money = registry.define_class("Money", Layout::Object);
    let amount = Symbol::new("@amount");
    let currency = Symbol::new("@currency");
    {
        let (amount, currency) = (amount.clone(), currency.clone());
        let (amount2, currency2) = (amount.clone(), currency.clone());
        registry
            .set_structured_dump(
                &money,
                move |v| {
                    let obj = v.as_object().ok_or_else(|| CodecError::type_error("not money"))?;
                    let obj = obj.borrow();
                    let header = &obj.header;
                    Ok(Value::array(vec![
                        header.get_ivar(&amount).cloned().unwrap_or(Value::Nil),
                        header.get_ivar(&currency).cloned().unwrap_or(Value::Nil),
                    ]))
                },
                move |v, payload| {
                    let items = payload
                        .as_array()
                        .ok_or_else(|| CodecError::type_error("bad payload"))?
                        .borrow()
                        .items
                        .clone();
                    v.with_header_mut(|h| {
                        h.set_ivar(amount2.clone(), items[0].clone());
                        h.set_ivar(currency2.clone(), items[1].clone());
                    });
                    Ok(())
                },
            )
            .unwrap();
    }

    let v = Value::object(
        money,
        vec![
            (amount, Value::Int(100)),
            (currency, Value::symbol("usd")),
        ],
    );
    let bytes = marshal::dump(&v, &registry).unwrap();
    assert_eq!(bytes[2], b'U');
    assert_eq!(marshal::load(&bytes, &registry).unwrap(), v);
}

#[test]
fn test_error_kinds() {
    let registry = TypeRegistry::new();

    // FormatError: unknown tag, truncation, dangling links
    let malformed: [&[u8]; 4] = [
        &[4, 8, b'?'],
        &[4, 8, b'['],
        &[4, 8, b';', 0],
        &[4, 8, b'@', 0],
    ];
    for bytes in malformed {
        let err = marshal::load(bytes, &registry).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format, "{:?}", bytes);
    }

    // TypeError: anonymous class
    let anon = Value::module_ref(registry.anonymous_class());
    assert_eq!(
        marshal::dump(&anon, &registry).unwrap_err().kind(),
        ErrorKind::Type
    );

    // ArgumentError: unknown class name on load
    let mut bytes = vec![4, 8, b'o', b':', 12];
    bytes.extend_from_slice(b"Missing");
    bytes.push(0);
    assert_eq!(
        marshal::load(&bytes, &registry).unwrap_err().kind(),
        ErrorKind::Argument
    );
}

#[test]
fn test_permissive_registry_loads_unknown_classes() {
    let writer = TypeRegistry::new();
    let widget = writer.define_class("Widget", Layout::Object);
    let v = Value::object(widget, vec![(Symbol::new("@id"), Value::Int(7))]);
    let bytes = marshal::dump(&v, &writer).unwrap();

    let reader = TypeRegistry::permissive();
    let loaded = marshal::load(&bytes, &reader).unwrap();
    assert_eq!(
        reader.get_instance_attribute(&loaded, &Symbol::new("@id")),
        Some(Value::Int(7))
    );
    assert_eq!(loaded, v);
}

#[test]
fn test_config_from_toml_drives_codec() {
    let config = CodecConfig::from_toml_str("whole_float_suffix = false").unwrap();
    let registry = TypeRegistry::new();
    let bytes = Marshal::new(config)
        .dump(&Value::Float(3.0), &registry)
        .unwrap();
    assert_eq!(&bytes[2..], &[b'f', 6, b'3']);
    assert_eq!(marshal::load(&bytes, &registry).unwrap(), Value::Float(3.0));
}
