//! # protomirror-core
//!
//! Reflection runtime and descriptor registry for Protocol Buffer messages.
//!
//! This crate provides the core functionality for:
//! - Describing messages, enums, services and files with immutable descriptors
//! - Binding a concrete Rust record type to a message descriptor once, and
//!   then reading, writing, clearing and mutating its fields by number
//! - Registering files in a namespace registry that resolves full names and
//!   rejects conflicting declarations atomically
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`descriptor`]: Descriptor model and conversion from `FileDescriptorProto`
//! - [`value`]: The [`Value`] union that crosses the reflection boundary
//! - [`pointer`]: Field locators used to address storage inside a record
//! - [`record`]: How a record type declares its storage slots
//! - [`reflect`]: The lazy type binder and the known-fields facade
//! - [`registry`]: The [`Files`] registry
//! - [`wire`]: Field boundary scanning for raw unknown-field bytes
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```
//! use protomirror_core::{offset_of, FieldDescriptor, Kind, MessageDescriptor};
//! use protomirror_core::{MessageType, Record, Slot, Value};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, Default, PartialEq)]
//! struct Ping {
//!     verbose: Option<bool>,
//! }
//!
//! impl Record for Ping {
//!     fn slots() -> Vec<Slot> {
//!         vec![Slot::field(1, offset_of!(Ping, verbose))]
//!     }
//!
//!     fn message_type() -> &'static MessageType {
//!         static TYPE: MessageType = MessageType::derived();
//!         &TYPE
//!     }
//!
//!     fn descriptor() -> Option<Arc<MessageDescriptor>> {
//!         let field = FieldDescriptor::new(1, "verbose", Kind::Bool).with_default(true);
//!         MessageDescriptor::builder("demo.Ping").field(field).build().ok().map(Arc::new)
//!     }
//! }
//!
//! let mut ping = Ping::default();
//! let mut fields = Ping::message_type().known_fields_of(&mut ping);
//! assert!(!fields.has(1));
//! assert_eq!(fields.get(1), Value::Bool(true));
//! fields.set(1, Value::Bool(false));
//! assert_eq!(ping.verbose, Some(false));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod descriptor;
pub mod error;
pub mod pointer;
pub mod record;
pub mod reflect;
pub mod registry;
pub mod value;
pub mod wire;

// Re-export primary types for convenience
pub use descriptor::{
    Cardinality, Descriptor, EnumDescriptor, EnumValueDescriptor, FieldDescriptor,
    FileDescriptor, Kind, LoadOptions, MapEntry, MessageDescriptor, MethodDescriptor,
    OneofDescriptor, ServiceDescriptor, Syntax,
};
pub use error::{Error, NotFound, Result};
pub use pointer::{FieldOffset, Offset, Pointer, PointerMut};
pub use record::{
    ExtensionFields, FieldStorage, Layout, Message, Oneof, OneofStorage, RawFields, Record,
    SizeCache, Slot, SlotKind, UnknownFields, WeakFields,
};
pub use reflect::{
    FieldsView, KnownFields, ListMut, MapMut, MessageType, Mutable, UnknownFieldsMut,
};
pub use registry::{global_files, Files, FilesConfig, MessageClosure};
pub use value::{EnumNumber, MapKey, MessageValue, ProtoMapKey, ProtoValue, Value, ValueClass};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Identity of a field within one message
pub type FieldNumber = u32;

/// Maximum valid protobuf field number (2^29 - 1)
pub const MAX_FIELD_NUMBER: FieldNumber = 536_870_911;
