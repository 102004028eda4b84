//! Wire tag catalog
//!
//! One byte per value kind. The byte values are a compatibility contract
//! with every other reader and writer of the format.

/// Tag byte introducing a value (or a value prefix) in the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    Nil = b'0',
    True = b'T',
    False = b'F',
    Fixnum = b'i',
    Bignum = b'l',
    Float = b'f',
    String = b'"',
    Regex = b'/',
    Array = b'[',
    Hash = b'{',
    HashWithDefault = b'}',
    Symbol = b':',
    SymbolLink = b';',
    ObjectLink = b'@',
    Object = b'o',
    UserDump = b'u',
    UserMarshal = b'U',
    Class = b'c',
    Module = b'm',
    Struct = b'S',
    InstanceVars = b'I',
    Extended = b'e',
    UserClass = b'C',
}

impl Tag {
    pub const ALL: [Tag; 23] = [
        Tag::Nil,
        Tag::True,
        Tag::False,
        Tag::Fixnum,
        Tag::Bignum,
        Tag::Float,
        Tag::String,
        Tag::Regex,
        Tag::Array,
        Tag::Hash,
        Tag::HashWithDefault,
        Tag::Symbol,
        Tag::SymbolLink,
        Tag::ObjectLink,
        Tag::Object,
        Tag::UserDump,
        Tag::UserMarshal,
        Tag::Class,
        Tag::Module,
        Tag::Struct,
        Tag::InstanceVars,
        Tag::Extended,
        Tag::UserClass,
    ];

    /// Byte written to the stream
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Look up a tag by its wire byte
    pub fn from_byte(byte: u8) -> Option<Tag> {
        Tag::ALL.iter().copied().find(|t| t.byte() == byte)
    }

    /// Scalar tags decode without touching the object table
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            Tag::Nil
                | Tag::True
                | Tag::False
                | Tag::Fixnum
                | Tag::Symbol
                | Tag::SymbolLink
                | Tag::ObjectLink
        )
    }

    /// Human-readable name for diagnostics
    pub fn name(self) -> &'static str {
        match self {
            Tag::Nil => "nil",
            Tag::True => "true",
            Tag::False => "false",
            Tag::Fixnum => "fixnum",
            Tag::Bignum => "bignum",
            Tag::Float => "float",
            Tag::String => "string",
            Tag::Regex => "regexp",
            Tag::Array => "array",
            Tag::Hash => "hash",
            Tag::HashWithDefault => "hash with default",
            Tag::Symbol => "symbol",
            Tag::SymbolLink => "symbol link",
            Tag::ObjectLink => "object link",
            Tag::Object => "object",
            Tag::UserDump => "user dump",
            Tag::UserMarshal => "user marshal",
            Tag::Class => "class",
            Tag::Module => "module",
            Tag::Struct => "struct",
            Tag::InstanceVars => "instance variables",
            Tag::Extended => "extended",
            Tag::UserClass => "user class",
        }
    }
}

impl TryFrom<u8> for Tag {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Tag::from_byte(byte).ok_or(byte)
    }
}
