//! Marshal Codec Library
//!
//! Reads and writes object graphs in the Marshal 4.8 binary format: shared
//! references and cycles, symbols, bignums, floats, regexes, structs,
//! subclasses of built-in types, singleton extensions and user-defined
//! dump/load hooks.
//!
//! The codec knows nothing about classes on its own. Everything it needs
//! from a type system goes through [`HostAdapter`]; [`TypeRegistry`] is the
//! ready-made adapter for this crate's [`Value`] model.
//!
//! ```rust
//! use marshal::{Marshal, TypeRegistry, Value};
//!
//! let registry = TypeRegistry::new();
//! let codec = Marshal::default();
//!
//! let v = Value::array(vec![Value::Int(1), Value::from("two"), Value::Float(3.0)]);
//! let bytes = codec.dump(&v, &registry).unwrap();
//! assert_eq!(&bytes[..2], &[4, 8]);
//!
//! let loaded = codec.load(&bytes, &registry).unwrap();
//! assert_eq!(loaded.value, v);
//! ```

pub mod codec;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod host;
pub mod inspect;
pub mod numeric;
pub mod registry;
pub mod tables;
pub mod tags;
pub mod value;

pub use codec::{Loaded, Marshal, dump, load};
pub use config::{CodecConfig, ConfigError, MAJOR_VERSION, MINOR_VERSION};
pub use error::{CodecError, ErrorKind, LoadWarning, Result};
pub use host::{HostAdapter, WireShape};
pub use inspect::{InspectConfig, inspect, inspect_with_host};
pub use registry::{Layout, TypeRegistry};
pub use tags::Tag;
pub use value::{ModuleKind, ModuleRef, Symbol, Value};
