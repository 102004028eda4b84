//! Codec error taxonomy
//!
//! Every failure aborts the whole Dump/Load call. There is no partial result
//! and no internal retry; callers match on [`CodecError::kind`] to decide
//! what to do next (for example, re-dump with a larger depth budget).

/// Coarse classification of a [`CodecError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or truncated stream, unknown tag, unresolved backreference
    Format,
    /// Major version mismatch on load
    Version,
    /// Type-level violation (anonymous class, wrong hook payload, kind mismatch)
    Type,
    /// Bad argument (depth exhausted, default proc, struct mismatch, unknown name)
    Argument,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Format => "FormatError",
            ErrorKind::Version => "VersionError",
            ErrorKind::Type => "TypeError",
            ErrorKind::Argument => "ArgumentError",
        };
        f.write_str(name)
    }
}

/// Error during dump/load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Stream is malformed or truncated
    Format(String),
    /// Stream was written by an incompatible major version
    Version {
        /// (major, minor) this codec speaks
        required: (u8, u8),
        /// (major, minor) found in the preamble
        given: (u8, u8),
    },
    /// Value or stream violates a type rule
    Type(String),
    /// Call argument or resolved definition is unacceptable
    Argument(String),
}

impl CodecError {
    pub fn format(msg: impl Into<String>) -> Self {
        CodecError::Format(msg.into())
    }

    pub fn type_error(msg: impl Into<String>) -> Self {
        CodecError::Type(msg.into())
    }

    pub fn argument(msg: impl Into<String>) -> Self {
        CodecError::Argument(msg.into())
    }

    /// Stream ended before the current item was complete
    pub fn too_short() -> Self {
        CodecError::Format("marshal data too short".to_string())
    }

    /// Recursion budget exhausted
    pub fn depth_exceeded() -> Self {
        CodecError::Argument("exceed depth limit".to_string())
    }

    /// Taxonomy kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CodecError::Format(_) => ErrorKind::Format,
            CodecError::Version { .. } => ErrorKind::Version,
            CodecError::Type(_) => ErrorKind::Type,
            CodecError::Argument(_) => ErrorKind::Argument,
        }
    }
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Format(msg) => write!(f, "{}: {}", self.kind(), msg),
            CodecError::Version { required, given } => write!(
                f,
                "{}: incompatible marshal file format (can't be read), \
                 format version {}.{} required; {}.{} given",
                self.kind(),
                required.0,
                required.1,
                given.0,
                given.1
            ),
            CodecError::Type(msg) => write!(f, "{}: {}", self.kind(), msg),
            CodecError::Argument(msg) => write!(f, "{}: {}", self.kind(), msg),
        }
    }
}

impl std::error::Error for CodecError {}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Non-fatal condition observed while loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    /// Stream minor version is newer than the codec's; decoding continued
    NewerMinor { required: (u8, u8), given: (u8, u8) },
    /// Stream minor version is older than the codec's
    OlderMinor { required: (u8, u8), given: (u8, u8) },
}

impl std::fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadWarning::NewerMinor { required, given } => write!(
                f,
                "marshal stream is newer ({}.{}) than this codec ({}.{})",
                given.0, given.1, required.0, required.1
            ),
            LoadWarning::OlderMinor { required, given } => write!(
                f,
                "incompatible marshal file format (can be read), \
                 format version {}.{} required; {}.{} given",
                required.0, required.1, given.0, given.1
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(CodecError::too_short().kind(), ErrorKind::Format);
        assert_eq!(CodecError::depth_exceeded().kind(), ErrorKind::Argument);
        assert_eq!(CodecError::type_error("x").kind(), ErrorKind::Type);
        let version = CodecError::Version {
            required: (4, 8),
            given: (5, 0),
        };
        assert_eq!(version.kind(), ErrorKind::Version);
    }

    #[test]
    fn test_display_names_kind() {
        let err = CodecError::argument("struct size differs");
        assert_eq!(err.to_string(), "ArgumentError: struct size differs");

        let err = CodecError::Version {
            required: (4, 8),
            given: (3, 1),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("VersionError"));
        assert!(msg.contains("4.8 required; 3.1 given"));
    }

    #[test]
    fn test_warning_display() {
        let w = LoadWarning::NewerMinor {
            required: (4, 8),
            given: (4, 9),
        };
        assert!(w.to_string().contains("newer (4.9)"));
    }
}
