//! Record shapes.
//!
//! A record is a plain Rust struct that stores one message. It implements
//! [`Record`] to declare its storage [`Slot`]s: one per regular field, one
//! per oneof group, and optionally the reserved buckets for unknown fields,
//! extensions, weak fields and the size cache.
//!
//! Slot storage types implement [`FieldStorage`] (or [`OneofStorage`] for
//! oneof groups). Their [`Layout`] is checked against the field descriptor
//! when a [`MessageType`] binds the record type.

mod buckets;
mod storage;

pub use buckets::{ExtensionFields, RawFields, SizeCache, UnknownFields, WeakFields};
pub use storage::{
    FieldStorage, Layout, ListStorage, MapRejection, MapStorage, Oneof, OneofStorage,
    SingularStorage,
};

use crate::descriptor::MessageDescriptor;
use crate::pointer::{FieldOffset, Offset, Pointer, PointerMut};
use crate::reflect::{KnownFields, MessageType};
use crate::FieldNumber;
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// A concrete message record type
pub trait Record: Any + Send + Sync + Default + Clone + PartialEq + fmt::Debug {
    /// Storage slots of the record
    fn slots() -> Vec<Slot>;

    /// The shared binder for this record type, usually a `static`
    fn message_type() -> &'static MessageType;

    /// Descriptor used by [`MessageType::derived`] binders
    fn descriptor() -> Option<Arc<MessageDescriptor>> {
        None
    }
}

/// Object-safe view of any record.
///
/// Implemented for every [`Record`]; used wherever the concrete type is
/// erased, such as nested messages inside a [`Value`](crate::Value).
pub trait Message: Any + Send + Sync + fmt::Debug {
    /// Borrows the record as `Any`
    fn as_any(&self) -> &dyn Any;

    /// Mutably borrows the record as `Any`
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Converts the boxed record into `Box<dyn Any>`
    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// Clones into a new box
    fn clone_message(&self) -> Box<dyn Message>;

    /// Compares with another message of possibly different type
    fn eq_message(&self, other: &dyn Message) -> bool;

    /// `TypeId` of the concrete record type
    fn record_type_id(&self) -> TypeId;

    /// Name of the concrete record type
    fn record_name(&self) -> &'static str;

    /// Storage slots of the concrete record type
    fn record_slots(&self) -> Vec<Slot>;

    /// Descriptor of the concrete record type, if it provides one
    fn record_descriptor(&self) -> Option<Arc<MessageDescriptor>>;

    /// The record type's binder
    fn reflect_type(&self) -> &'static MessageType;

    /// Known-fields view of this message
    fn known_fields(&mut self) -> KnownFields<'_>;
}

impl<R: Record> Message for R {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn clone_message(&self) -> Box<dyn Message> {
        Box::new(self.clone())
    }

    fn eq_message(&self, other: &dyn Message) -> bool {
        other.as_any().downcast_ref::<R>() == Some(self)
    }

    fn record_type_id(&self) -> TypeId {
        TypeId::of::<R>()
    }

    fn record_name(&self) -> &'static str {
        type_name::<R>()
    }

    fn record_slots(&self) -> Vec<Slot> {
        R::slots()
    }

    fn record_descriptor(&self) -> Option<Arc<MessageDescriptor>> {
        R::descriptor()
    }

    fn reflect_type(&self) -> &'static MessageType {
        <R as Record>::message_type()
    }

    fn known_fields(&mut self) -> KnownFields<'_> {
        <R as Record>::message_type().known_fields_of(self)
    }
}

/// Role of a storage slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// Storage of the field with this number
    Field(FieldNumber),
    /// Shared storage of the named oneof group
    Oneof(&'static str),
    /// Unknown-fields bucket
    Unknown,
    /// Cached encoded size
    SizeCache,
    /// Extension bucket
    Extensions,
    /// Weak-field bucket
    Weak,
    /// A nested struct; never a valid slot
    Embedded,
}

type FieldView = for<'a> fn(Pointer<'a>) -> &'a dyn FieldStorage;
type FieldViewMut = for<'a> fn(PointerMut<'a>) -> &'a mut dyn FieldStorage;
type OneofView = for<'a> fn(Pointer<'a>) -> &'a dyn OneofStorage;
type OneofViewMut = for<'a> fn(PointerMut<'a>) -> &'a mut dyn OneofStorage;

#[derive(Clone, Copy)]
enum Access {
    Field(FieldView, FieldViewMut),
    Oneof(OneofView, OneofViewMut),
    Fixed,
}

/// One storage slot of a record type
#[derive(Clone, Copy)]
pub struct Slot {
    kind: SlotKind,
    offset: Offset,
    access: Access,
}

impl Slot {
    /// Storage of the regular field `number`
    pub fn field<S: FieldStorage>(number: FieldNumber, at: FieldOffset<S>) -> Self {
        Self {
            kind: SlotKind::Field(number),
            offset: at.offset(),
            access: Access::Field(view::<S>, view_mut::<S>),
        }
    }

    /// Storage shared by the members of oneof `group`
    pub fn oneof<S: OneofStorage>(group: &'static str, at: FieldOffset<S>) -> Self {
        Self {
            kind: SlotKind::Oneof(group),
            offset: at.offset(),
            access: Access::Oneof(oneof_view::<S>, oneof_view_mut::<S>),
        }
    }

    /// The unknown-fields bucket
    pub fn unknown(at: FieldOffset<UnknownFields>) -> Self {
        Self::fixed(SlotKind::Unknown, at.offset())
    }

    /// The size cache
    pub fn size_cache(at: FieldOffset<SizeCache>) -> Self {
        Self::fixed(SlotKind::SizeCache, at.offset())
    }

    /// The extension bucket
    pub fn extensions(at: FieldOffset<ExtensionFields>) -> Self {
        Self::fixed(SlotKind::Extensions, at.offset())
    }

    /// The weak-field bucket
    pub fn weak(at: FieldOffset<WeakFields>) -> Self {
        Self::fixed(SlotKind::Weak, at.offset())
    }

    /// A nested struct; binding a record that declares one panics
    pub fn embedded<S: Any>(at: FieldOffset<S>) -> Self {
        Self::fixed(SlotKind::Embedded, at.offset())
    }

    fn fixed(kind: SlotKind, offset: Offset) -> Self {
        Self {
            kind,
            offset,
            access: Access::Fixed,
        }
    }

    /// Role of the slot
    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    /// Location of the slot
    pub fn offset(&self) -> &Offset {
        &self.offset
    }

    pub(crate) fn storage<'a>(&self, record: Pointer<'a>) -> &'a dyn FieldStorage {
        match self.access {
            Access::Field(get, _) => get(record.apply(&self.offset)),
            _ => panic!("slot {} is not field storage", self.offset.name()),
        }
    }

    pub(crate) fn storage_mut<'a>(&self, record: PointerMut<'a>) -> &'a mut dyn FieldStorage {
        match self.access {
            Access::Field(_, get_mut) => get_mut(record.apply(&self.offset)),
            _ => panic!("slot {} is not field storage", self.offset.name()),
        }
    }

    pub(crate) fn oneof_storage<'a>(&self, record: Pointer<'a>) -> &'a dyn OneofStorage {
        match self.access {
            Access::Oneof(get, _) => get(record.apply(&self.offset)),
            _ => panic!("slot {} is not oneof storage", self.offset.name()),
        }
    }

    pub(crate) fn oneof_storage_mut<'a>(&self, record: PointerMut<'a>) -> &'a mut dyn OneofStorage {
        match self.access {
            Access::Oneof(_, get_mut) => get_mut(record.apply(&self.offset)),
            _ => panic!("slot {} is not oneof storage", self.offset.name()),
        }
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("kind", &self.kind)
            .field("offset", &self.offset)
            .finish()
    }
}

fn view<'a, S: FieldStorage>(ptr: Pointer<'a>) -> &'a dyn FieldStorage {
    ptr.as_type::<S>()
}

fn view_mut<'a, S: FieldStorage>(ptr: PointerMut<'a>) -> &'a mut dyn FieldStorage {
    ptr.as_type::<S>()
}

fn oneof_view<'a, S: OneofStorage>(ptr: Pointer<'a>) -> &'a dyn OneofStorage {
    ptr.as_type::<S>()
}

fn oneof_view_mut<'a, S: OneofStorage>(ptr: PointerMut<'a>) -> &'a mut dyn OneofStorage {
    ptr.as_type::<S>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offset_of;
    use crate::value::{Value, ValueClass};
    use pretty_assertions::assert_eq;

    crate::oneof! {
        enum Choice {
            Text(String) = 4,
            Count(i64) = 5,
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Sample {
        name: Option<String>,
        scores: Vec<f64>,
        choice: Option<Choice>,
        unknown: UnknownFields,
    }

    impl Record for Sample {
        fn slots() -> Vec<Slot> {
            vec![
                Slot::field(1, offset_of!(Sample, name)),
                Slot::field(2, offset_of!(Sample, scores)),
                Slot::oneof("choice", offset_of!(Sample, choice)),
                Slot::unknown(offset_of!(Sample, unknown)),
            ]
        }

        fn message_type() -> &'static MessageType {
            static TYPE: MessageType = MessageType::derived();
            &TYPE
        }
    }

    #[test]
    fn test_slot_kinds() {
        let kinds: Vec<_> = Sample::slots().iter().map(Slot::kind).collect();
        assert_eq!(
            kinds,
            vec![
                SlotKind::Field(1),
                SlotKind::Field(2),
                SlotKind::Oneof("choice"),
                SlotKind::Unknown
            ]
        );
    }

    #[test]
    fn test_slot_storage_views() {
        let mut sample = Sample {
            scores: vec![1.5],
            ..Default::default()
        };
        let slots = Sample::slots();

        let scores = slots[1].storage(Pointer::of(&sample));
        assert_eq!(scores.layout(), Layout::List { class: ValueClass::Float64 });

        let name = slots[0].storage_mut(PointerMut::of(&mut sample));
        let singular = name.as_singular_mut().unwrap();
        singular.store(Value::from("abc")).unwrap();
        assert_eq!(sample.name.as_deref(), Some("abc"));

        let choice = slots[2].oneof_storage_mut(PointerMut::of(&mut sample));
        choice.store(5, Value::Int64(9)).unwrap();
        assert_eq!(sample.choice, Some(Choice::Count(9)));
    }

    #[test]
    fn test_message_object_safety() {
        let a = Sample {
            name: Some("x".into()),
            ..Default::default()
        };
        let boxed: Box<dyn Message> = a.clone_message();
        assert!(boxed.eq_message(&a));
        assert_eq!(boxed.record_type_id(), TypeId::of::<Sample>());
        assert!(boxed.record_name().ends_with("Sample"));
        assert_eq!(boxed.into_any().downcast::<Sample>().ok().map(|s| *s), Some(a));
    }

    #[test]
    #[should_panic(expected = "not field storage")]
    fn test_oneof_slot_is_not_field_storage() {
        let sample = Sample::default();
        Sample::slots()[2].storage(Pointer::of(&sample));
    }
}
