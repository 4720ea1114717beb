//! Error types for the protomirror-core library.
//!
//! Recoverable conditions (descriptor ingestion, registry conflicts, raw
//! field validation) are reported through [`Error`]. Lookup misses use the
//! separate [`NotFound`] sentinel so callers can tell "absent" apart from
//! "broken".
//!
//! Usage errors such as passing the wrong record shape to a bound
//! `MessageType` panic instead; the `try_*` methods of the reflection
//! facade surface the same conditions as [`Error`] values.

use crate::descriptor::Kind;
use thiserror::Error;

/// Result type alias for protomirror operations
pub type Result<T> = std::result::Result<T, Error>;

/// Sentinel returned when a registry lookup finds nothing
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("not found")]
pub struct NotFound;

/// Comprehensive error type for all protomirror operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to parse FileDescriptorProto
    #[error("failed to parse FileDescriptorProto: {0}")]
    DescriptorParse(#[from] prost::DecodeError),

    /// Failed to build or validate a descriptor
    #[error("failed to build descriptor: {0}")]
    DescriptorBuild(String),

    /// Invalid field number in descriptor
    #[error("invalid field number {number}: must be between 1 and {max}")]
    InvalidFieldNumber {
        /// The invalid field number
        number: u32,
        /// Maximum valid field number
        max: u32,
    },

    /// Two fields of one message share a number
    #[error("message '{message}' declares field number {number} more than once")]
    DuplicateFieldNumber {
        /// Full name of the offending message
        message: String,
        /// The repeated field number
        number: u32,
    },

    /// A name is declared twice inside one scope of a single file
    #[error("duplicate declaration of '{name}'")]
    DuplicateName {
        /// Full name declared twice
        name: String,
    },

    /// Default value string could not be interpreted for the field kind
    #[error("invalid default value '{value}' for {kind:?} field '{field}'")]
    InvalidDefault {
        /// Full name of the field
        field: String,
        /// Kind of the field
        kind: Kind,
        /// The textual default
        value: String,
    },

    /// Unsupported proto syntax version
    #[error("unsupported proto syntax: '{syntax}'")]
    UnsupportedSyntax {
        /// The unsupported syntax string
        syntax: String,
    },

    /// A file declares a name that is already taken in its package
    #[error("file '{path}' has a name conflict over {name}")]
    NameConflict {
        /// Path of the rejected file
        path: String,
        /// Fully-qualified name in conflict
        name: String,
    },

    /// A placeholder file was registered while placeholders are rejected
    #[error("file '{path}' is a placeholder")]
    PlaceholderFile {
        /// Path of the placeholder file
        path: String,
    },

    /// Invalid protobuf wire format inside raw field bytes
    #[error("invalid protobuf wire format at offset {offset}: {details}")]
    InvalidWireFormat {
        /// Byte offset where the error occurred
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// Failed to decode varint
    #[error("failed to decode varint at offset {offset}: buffer too small or invalid encoding")]
    VarintDecode {
        /// Byte offset where the error occurred
        offset: usize,
    },

    /// Raw bytes filed under one number carry a field with another number
    #[error("raw field bytes for field {expected} contain field {found}")]
    RawFieldMismatch {
        /// Field number the raw bytes were filed under
        expected: u32,
        /// Field number found in the bytes
        found: u32,
    },

    /// Weak fields have no runtime support
    #[error("weak field '{field}' ({number}) is not supported")]
    WeakFieldUnsupported {
        /// Full name of the weak field
        field: String,
        /// Its field number
        number: u32,
    },

    /// The number lies in an extension range; extensions are resolved elsewhere
    #[error("field {number} of '{message}' is an extension, which this runtime does not resolve")]
    ExtensionUnsupported {
        /// Full name of the extended message
        message: String,
        /// The extension field number
        number: u32,
    },

    /// The record shape carries no unknown-fields bucket
    #[error("'{message}' has no storage for unknown fields")]
    UnknownFieldsUnsupported {
        /// Full name of the message
        message: String,
    },

    /// Raw bytes were filed as unknown under a number the message declares
    #[error("field {number} is declared by '{message}' and cannot be stored as unknown")]
    DeclaredField {
        /// Full name of the message
        message: String,
        /// The declared field number
        number: u32,
    },

    /// Field number is not declared by the message
    #[error("invalid field: {number}")]
    UnknownField {
        /// The undeclared field number
        number: u32,
    },

    /// Field has no mutable handle (plain scalars)
    #[error("field '{field}' is not mutable")]
    NotMutable {
        /// Full name of the field
        field: String,
    },

    /// Value does not match the field's storage
    #[error("invalid value for field '{field}': {details}")]
    InvalidValue {
        /// Full name of the field
        field: String,
        /// What was wrong
        details: String,
    },

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new descriptor build error
    pub fn descriptor_build(msg: impl Into<String>) -> Self {
        Self::DescriptorBuild(msg.into())
    }

    /// Creates a new wire format error
    pub fn invalid_wire_format(offset: usize, details: impl Into<String>) -> Self {
        Self::InvalidWireFormat {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new varint decode error
    pub fn varint_decode(offset: usize) -> Self {
        Self::VarintDecode { offset }
    }

    /// Creates a new name conflict error
    pub fn name_conflict(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NameConflict {
            path: path.into(),
            name: name.into(),
        }
    }

    /// Creates a new invalid value error
    pub fn invalid_value(field: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            details: details.into(),
        }
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if this error stems from misusing the reflection API
    /// rather than from bad input data
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownField { .. }
                | Self::DeclaredField { .. }
                | Self::NotMutable { .. }
                | Self::InvalidValue { .. }
        )
    }

    /// Returns true if this error reports a feature the runtime lacks
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::WeakFieldUnsupported { .. }
                | Self::ExtensionUnsupported { .. }
                | Self::UnknownFieldsUnsupported { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::name_conflict("foo.proto", "pkg.Message");
        assert_eq!(
            err.to_string(),
            "file 'foo.proto' has a name conflict over pkg.Message"
        );
        assert_eq!(NotFound.to_string(), "not found");
    }

    #[test]
    fn test_error_classes() {
        assert!(Error::UnknownField { number: 7 }.is_usage_error());
        assert!(!Error::name_conflict("a.proto", "a.B").is_usage_error());
        assert!(Error::DeclaredField {
            message: "m.M".into(),
            number: 2
        }
        .is_usage_error());
        assert!(Error::WeakFieldUnsupported {
            field: "m.w".into(),
            number: 3
        }
        .is_unsupported());
    }
}
