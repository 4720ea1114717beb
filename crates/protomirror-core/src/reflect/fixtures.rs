//! Record types shared by the reflection tests.

use crate::descriptor::{FieldDescriptor, Kind, MessageDescriptor, Syntax};
use crate::offset_of;
use crate::record::{ExtensionFields, Record, SizeCache, Slot, UnknownFields, WeakFields};
use crate::reflect::MessageType;
use crate::value::EnumNumber;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// proto2 scalars with explicit presence and declared defaults
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Scalars {
    pub(crate) flag: Option<bool>,
    pub(crate) count: Option<i32>,
    pub(crate) ratio: Option<f64>,
    pub(crate) name: Option<String>,
    pub(crate) color: Option<EnumNumber>,
    pub(crate) unknown: UnknownFields,
    pub(crate) cache: SizeCache,
}

impl Record for Scalars {
    fn slots() -> Vec<Slot> {
        vec![
            Slot::field(1, offset_of!(Scalars, flag)),
            Slot::field(2, offset_of!(Scalars, count)),
            Slot::field(3, offset_of!(Scalars, ratio)),
            Slot::field(4, offset_of!(Scalars, name)),
            Slot::field(5, offset_of!(Scalars, color)),
            Slot::unknown(offset_of!(Scalars, unknown)),
            Slot::size_cache(offset_of!(Scalars, cache)),
        ]
    }

    fn message_type() -> &'static MessageType {
        static TYPE: MessageType = MessageType::derived();
        &TYPE
    }

    fn descriptor() -> Option<Arc<MessageDescriptor>> {
        let desc = MessageDescriptor::builder("test.Scalars")
            .field(FieldDescriptor::new(1, "flag", Kind::Bool).with_default(true))
            .field(FieldDescriptor::new(2, "count", Kind::Int32))
            .field(FieldDescriptor::new(3, "ratio", Kind::Double))
            .field(FieldDescriptor::new(4, "name", Kind::String).with_default("anon"))
            .field(
                FieldDescriptor::new(5, "color", Kind::Enum)
                    .with_enum_type("test.Color")
                    .with_default(EnumNumber(2)),
            )
            .extension_range(100..200)
            .build()
            .expect("valid test.Scalars");
        Some(Arc::new(desc))
    }
}

/// proto3 scalars with implicit presence, plus one `optional` field
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Implicit {
    pub(crate) id: i64,
    pub(crate) score: f32,
    pub(crate) label: String,
    pub(crate) level: Option<u32>,
    pub(crate) data: Bytes,
}

impl Record for Implicit {
    fn slots() -> Vec<Slot> {
        vec![
            Slot::field(1, offset_of!(Implicit, id)),
            Slot::field(2, offset_of!(Implicit, score)),
            Slot::field(3, offset_of!(Implicit, label)),
            Slot::field(4, offset_of!(Implicit, level)),
            Slot::field(5, offset_of!(Implicit, data)),
        ]
    }

    fn message_type() -> &'static MessageType {
        static TYPE: MessageType = MessageType::derived();
        &TYPE
    }

    fn descriptor() -> Option<Arc<MessageDescriptor>> {
        let desc = MessageDescriptor::builder("test.Implicit")
            .syntax(Syntax::Proto3)
            .field(FieldDescriptor::new(1, "id", Kind::Sint64))
            .field(FieldDescriptor::new(2, "score", Kind::Float))
            .field(FieldDescriptor::new(3, "label", Kind::String))
            .field(FieldDescriptor::new(4, "level", Kind::Fixed32).explicit_presence())
            .field(FieldDescriptor::new(5, "data", Kind::Bytes))
            .build()
            .expect("valid test.Implicit");
        Some(Arc::new(desc))
    }
}

crate::oneof! {
    /// The `pick` group of [`Tree`]
    pub(crate) enum Pick {
        A(i32) = 6,
        B(String) = 7,
        C(Box<Tree>) = 8,
    }
}

/// Self-referential proto3 message with every composite field shape
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Tree {
    pub(crate) name: String,
    pub(crate) children: Vec<Box<Tree>>,
    pub(crate) parent: Option<Box<Tree>>,
    pub(crate) attrs: HashMap<String, i32>,
    pub(crate) index: HashMap<u32, Box<Tree>>,
    pub(crate) pick: Option<Pick>,
    pub(crate) extensions: ExtensionFields,
    pub(crate) weak: WeakFields,
}

impl Tree {
    pub(crate) fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

impl Record for Tree {
    fn slots() -> Vec<Slot> {
        vec![
            Slot::field(1, offset_of!(Tree, name)),
            Slot::field(2, offset_of!(Tree, children)),
            Slot::field(3, offset_of!(Tree, parent)),
            Slot::field(4, offset_of!(Tree, attrs)),
            Slot::field(5, offset_of!(Tree, index)),
            Slot::oneof("pick", offset_of!(Tree, pick)),
            Slot::extensions(offset_of!(Tree, extensions)),
            Slot::weak(offset_of!(Tree, weak)),
        ]
    }

    fn message_type() -> &'static MessageType {
        static TYPE: MessageType = MessageType::derived();
        &TYPE
    }

    fn descriptor() -> Option<Arc<MessageDescriptor>> {
        let desc = MessageDescriptor::builder("test.Tree")
            .syntax(Syntax::Proto3)
            .field(FieldDescriptor::new(1, "name", Kind::String))
            .field(
                FieldDescriptor::new(2, "children", Kind::Message)
                    .with_message_type("test.Tree")
                    .repeated(),
            )
            .field(FieldDescriptor::new(3, "parent", Kind::Message).with_message_type("test.Tree"))
            .field(FieldDescriptor::map(4, "attrs", Kind::String, Kind::Int32))
            .field(
                FieldDescriptor::map(5, "index", Kind::Uint32, Kind::Message)
                    .with_message_type("test.Tree"),
            )
            .field(FieldDescriptor::new(6, "a", Kind::Int32).in_oneof("pick"))
            .field(FieldDescriptor::new(7, "b", Kind::String).in_oneof("pick"))
            .field(
                FieldDescriptor::new(8, "c", Kind::Message)
                    .with_message_type("test.Tree")
                    .in_oneof("pick"),
            )
            .field(
                FieldDescriptor::new(9, "legacy", Kind::Message)
                    .with_message_type("test.Tree")
                    .weak(),
            )
            .extension_range(100..200)
            .build()
            .expect("valid test.Tree");
        Some(Arc::new(desc))
    }
}

pub(crate) static COUNTED_CLASSIFICATIONS: AtomicUsize = AtomicUsize::new(0);

/// Counts how often its descriptor is requested, which happens once per bind
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Counted {
    pub(crate) on: bool,
}

impl Record for Counted {
    fn slots() -> Vec<Slot> {
        vec![Slot::field(1, offset_of!(Counted, on))]
    }

    fn message_type() -> &'static MessageType {
        static TYPE: MessageType = MessageType::derived();
        &TYPE
    }

    fn descriptor() -> Option<Arc<MessageDescriptor>> {
        COUNTED_CLASSIFICATIONS.fetch_add(1, Ordering::SeqCst);
        let desc = MessageDescriptor::builder("test.Counted")
            .syntax(Syntax::Proto3)
            .field(FieldDescriptor::new(1, "on", Kind::Bool))
            .build()
            .expect("valid test.Counted");
        Some(Arc::new(desc))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Inner;

/// Declares a nested struct as a slot, which binding rejects
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Embedded {
    pub(crate) inner: Inner,
}

impl Record for Embedded {
    fn slots() -> Vec<Slot> {
        vec![Slot::embedded(offset_of!(Embedded, inner))]
    }

    fn message_type() -> &'static MessageType {
        static TYPE: MessageType = MessageType::derived();
        &TYPE
    }

    fn descriptor() -> Option<Arc<MessageDescriptor>> {
        MessageDescriptor::builder("test.Embedded")
            .field(FieldDescriptor::new(1, "value", Kind::Int32))
            .build()
            .ok()
            .map(Arc::new)
    }
}

/// Has storage for field 1 of `test.Scalars` only
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Mislaid {
    pub(crate) flag: Option<bool>,
}

impl Record for Mislaid {
    fn slots() -> Vec<Slot> {
        vec![Slot::field(1, offset_of!(Mislaid, flag))]
    }

    fn message_type() -> &'static MessageType {
        static TYPE: MessageType = MessageType::derived();
        &TYPE
    }
}
