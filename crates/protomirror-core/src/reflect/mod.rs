//! Message reflection.
//!
//! A [`MessageType`] ties one record type to one [`MessageDescriptor`].
//! The first time it sees a record it classifies every descriptor field
//! against the record's slots and compiles a dispatch table; from then on
//! the table is shared by every instance of the record type.
//!
//! # Example
//!
//! ```
//! use protomirror_core::{offset_of, FieldDescriptor, Kind, MessageDescriptor, Syntax};
//! use protomirror_core::{Message, MessageType, Record, Slot, Value};
//! use std::sync::{Arc, OnceLock};
//!
//! #[derive(Debug, Clone, Default, PartialEq)]
//! struct Tags {
//!     items: Vec<String>,
//! }
//!
//! impl Record for Tags {
//!     fn slots() -> Vec<Slot> {
//!         vec![Slot::field(1, offset_of!(Tags, items))]
//!     }
//!
//!     fn message_type() -> &'static MessageType {
//!         static TYPE: OnceLock<MessageType> = OnceLock::new();
//!         TYPE.get_or_init(|| {
//!             let desc = MessageDescriptor::builder("demo.Tags")
//!                 .syntax(Syntax::Proto3)
//!                 .field(FieldDescriptor::new(1, "items", Kind::String).repeated())
//!                 .build()
//!                 .expect("valid descriptor");
//!             MessageType::new(Arc::new(desc))
//!         })
//!     }
//! }
//!
//! let mut tags = Tags::default();
//! let mut fields = tags.known_fields();
//! let mut items = fields.mutable(1).into_list().unwrap();
//! items.append(Value::from("a"));
//! items.append(Value::from("b"));
//! assert_eq!(tags.items, vec!["a", "b"]);
//! ```

mod field;
mod known;

pub use known::{FieldsView, KnownFields, ListMut, MapMut, Mutable, UnknownFieldsMut};

use crate::descriptor::{FieldDescriptor, MessageDescriptor};
use crate::error::{Error, Result};
use crate::pointer::{Pointer, PointerMut};
use crate::record::{
    ExtensionFields, Layout, Message, SizeCache, Slot, SlotKind, UnknownFields, WeakFields,
};
use crate::value::ValueClass;
use crate::FieldNumber;
use field::{Access, FieldInfo};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

/// Binds one record type to one message descriptor
pub struct MessageType {
    desc: Option<Arc<MessageDescriptor>>,
    binding: OnceLock<Binding>,
}

impl MessageType {
    /// Binder for an explicit descriptor
    pub fn new(desc: Arc<MessageDescriptor>) -> Self {
        Self {
            desc: Some(desc),
            binding: OnceLock::new(),
        }
    }

    /// Binder that takes its descriptor from [`Record::descriptor`](crate::Record::descriptor)
    /// of the first record it sees.
    ///
    /// Usable in a `static`.
    pub const fn derived() -> Self {
        Self {
            desc: None,
            binding: OnceLock::new(),
        }
    }

    /// The bound descriptor, or the explicit one if not yet bound
    pub fn descriptor(&self) -> Option<&Arc<MessageDescriptor>> {
        match self.binding.get() {
            Some(binding) => Some(&binding.desc),
            None => self.desc.as_ref(),
        }
    }

    /// Returns true once the dispatch table has been built
    pub fn is_initialized(&self) -> bool {
        self.binding.get().is_some()
    }

    /// Declared field numbers in descriptor order, once bound
    pub fn field_numbers(&self) -> Option<&[FieldNumber]> {
        self.binding.get().map(|binding| binding.order.as_slice())
    }

    /// Builds the dispatch table on first use and checks the record type.
    ///
    /// # Panics
    ///
    /// Panics with `type mismatch` if `message` is not the record type this
    /// binder was first used with, and if classification fails (no
    /// descriptor, a missing or mismatched slot, an embedded slot).
    pub fn init(&self, message: &dyn Message) {
        self.bound(message);
    }

    /// Read-write view of the declared fields of `message`
    pub fn known_fields_of<'a>(&'a self, message: &'a mut dyn Message) -> KnownFields<'a> {
        let binding = self.bound(&*message);
        let name = message.record_name();
        KnownFields::new(PointerMut::from_dyn(message.as_any_mut(), name), binding)
    }

    /// Read-only view of the declared fields of `message`
    pub fn fields_of<'a>(&'a self, message: &'a dyn Message) -> FieldsView<'a> {
        let binding = self.bound(message);
        FieldsView::new(Pointer::from_dyn(message.as_any(), message.record_name()), binding)
    }

    /// Unknown-fields bucket of `message`
    pub fn unknown_fields_of<'a>(&'a self, message: &'a mut dyn Message) -> UnknownFieldsMut<'a> {
        let binding = self.bound(&*message);
        let name = message.record_name();
        let bucket = match &binding.unknown {
            Some(slot) => Some(
                PointerMut::from_dyn(message.as_any_mut(), name)
                    .apply(slot.offset())
                    .as_type::<UnknownFields>(),
            ),
            None => None,
        };
        UnknownFieldsMut::new(bucket, &binding.desc)
    }

    /// Raw extension bucket of `message`
    pub fn extension_fields_of<'a>(
        &'a self,
        message: &'a mut dyn Message,
    ) -> UnknownFieldsMut<'a> {
        let binding = self.bound(&*message);
        let name = message.record_name();
        let bucket = match &binding.extensions {
            Some(slot) => Some(
                PointerMut::from_dyn(message.as_any_mut(), name)
                    .apply(slot.offset())
                    .as_type::<ExtensionFields>()
                    .raw_mut(),
            ),
            None => None,
        };
        UnknownFieldsMut::new(bucket, &binding.desc)
    }

    /// Raw weak-field bucket of `message`, if its record type declares one.
    ///
    /// Weak fields are never decoded; their bytes stay here, keyed by the
    /// declared weak field number.
    pub fn weak_fields_of<'a>(&self, message: &'a mut dyn Message) -> Option<&'a mut WeakFields> {
        let binding = self.bound(&*message);
        let slot = binding.weak.as_ref()?;
        let name = message.record_name();
        Some(
            PointerMut::from_dyn(message.as_any_mut(), name)
                .apply(slot.offset())
                .as_type::<WeakFields>(),
        )
    }

    /// Size cache of `message`, if its record type declares one
    pub fn size_cache_of<'a>(&self, message: &'a dyn Message) -> Option<&'a SizeCache> {
        let binding = self.bound(message);
        let slot = binding.size_cache.as_ref()?;
        Some(
            Pointer::from_dyn(message.as_any(), message.record_name())
                .apply(slot.offset())
                .as_type::<SizeCache>(),
        )
    }

    fn bound(&self, message: &dyn Message) -> &Binding {
        let binding = self
            .binding
            .get_or_init(|| Binding::classify(self.desc.clone(), message));
        if message.record_type_id() != binding.type_id {
            panic!(
                "type mismatch: got {}, want {}",
                message.record_name(),
                binding.type_name
            );
        }
        binding
    }
}

impl Default for MessageType {
    fn default() -> Self {
        Self::derived()
    }
}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageType")
            .field("message", &self.descriptor().map(|desc| desc.full_name()))
            .field("record", &self.binding.get().map(|binding| binding.type_name))
            .finish()
    }
}

/// Dispatch table of one bound record type
pub(crate) struct Binding {
    type_id: TypeId,
    type_name: &'static str,
    pub(crate) desc: Arc<MessageDescriptor>,
    fields: HashMap<FieldNumber, FieldInfo>,
    order: Vec<FieldNumber>,
    unknown: Option<Slot>,
    size_cache: Option<Slot>,
    extensions: Option<Slot>,
    weak: Option<Slot>,
}

#[derive(Default)]
struct SlotTable {
    fields: HashMap<FieldNumber, Slot>,
    oneofs: HashMap<&'static str, Slot>,
    unknown: Option<Slot>,
    size_cache: Option<Slot>,
    extensions: Option<Slot>,
    weak: Option<Slot>,
}

impl SlotTable {
    fn collect(message: &dyn Message) -> Self {
        let mut table = Self::default();
        for slot in message.record_slots() {
            let replaced = match slot.kind() {
                SlotKind::Field(number) => table.fields.insert(number, slot),
                SlotKind::Oneof(group) => table.oneofs.insert(group, slot),
                SlotKind::Unknown => table.unknown.replace(slot),
                SlotKind::SizeCache => table.size_cache.replace(slot),
                SlotKind::Extensions => table.extensions.replace(slot),
                SlotKind::Weak => table.weak.replace(slot),
                SlotKind::Embedded => panic!(
                    "{}: embedded struct '{}' cannot hold message fields",
                    message.record_name(),
                    slot.offset().name()
                ),
            };
            if let Some(previous) = replaced {
                panic!(
                    "{}: slot {:?} declared twice ('{}' and '{}')",
                    message.record_name(),
                    slot.kind(),
                    previous.offset().name(),
                    slot.offset().name()
                );
            }
        }
        table
    }
}

impl Binding {
    fn classify(explicit: Option<Arc<MessageDescriptor>>, message: &dyn Message) -> Self {
        let type_name = message.record_name();
        let desc = match explicit.or_else(|| message.record_descriptor()) {
            Some(desc) => desc,
            None => panic!("{}: no message descriptor to bind", type_name),
        };

        let slots = SlotTable::collect(message);
        let record = Pointer::from_dyn(message.as_any(), type_name);
        let mut fields = HashMap::with_capacity(desc.fields().len());
        let mut order = Vec::with_capacity(desc.fields().len());

        for field in desc.fields() {
            let access = classify_field(field, &slots, record, type_name);
            trace!(
                field = field.full_name(),
                number = field.number(),
                access = ?access,
                "Classified field"
            );
            order.push(field.number());
            fields.insert(field.number(), FieldInfo::new(Arc::clone(field), access));
        }

        debug!(
            name = desc.full_name(),
            record = type_name,
            fields = fields.len(),
            unknown = slots.unknown.is_some(),
            "Bound message type"
        );

        Self {
            type_id: message.record_type_id(),
            type_name,
            desc,
            fields,
            order,
            unknown: slots.unknown,
            size_cache: slots.size_cache,
            extensions: slots.extensions,
            weak: slots.weak,
        }
    }

    pub(crate) fn field(&self, number: FieldNumber) -> Option<&FieldInfo> {
        self.fields.get(&number)
    }

    /// Like [`field`](Self::field), explaining why a number is missing
    pub(crate) fn require(&self, number: FieldNumber) -> Result<&FieldInfo> {
        self.field(number).ok_or_else(|| self.missing(number))
    }

    pub(crate) fn fields_in_order(&self) -> impl Iterator<Item = &FieldInfo> + '_ {
        self.order.iter().filter_map(|number| self.fields.get(number))
    }

    pub(crate) fn invalidate_size(&self, record: PointerMut<'_>) {
        if let Some(slot) = &self.size_cache {
            record.apply(slot.offset()).as_type::<SizeCache>().invalidate();
        }
    }

    fn missing(&self, number: FieldNumber) -> Error {
        if self.desc.is_extension_number(number) {
            Error::ExtensionUnsupported {
                message: self.desc.full_name().to_string(),
                number,
            }
        } else {
            Error::UnknownField { number }
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("message", &self.desc.full_name())
            .field("record", &self.type_name)
            .field("fields", &self.order)
            .field("weak", &self.weak.is_some())
            .finish()
    }
}

/// Picks the access strategy for one field: weak, oneof member, map, list,
/// message, then scalar.
fn classify_field(
    field: &FieldDescriptor,
    slots: &SlotTable,
    record: Pointer<'_>,
    type_name: &str,
) -> Access {
    if field.is_weak() {
        return Access::Weak;
    }

    if let Some(group) = field.oneof_name() {
        let Some(slot) = slots.oneofs.get(group) else {
            panic!(
                "{}: no storage for oneof '{}' of field {}",
                type_name,
                group,
                field.full_name()
            );
        };
        let storage = slot.oneof_storage(record);
        let class = storage.case_class(field.number());
        if !storage.members().contains(&field.number()) || class != Some(field.kind().class()) {
            panic!(
                "{}: oneof storage '{}' has no {} case {} for field {}",
                type_name,
                slot.offset().name(),
                field.kind().as_str(),
                field.number(),
                field.full_name()
            );
        }
        check_message_type(
            field,
            storage.case_message_name(field.number()),
            slot.offset().name(),
            type_name,
        );
        return Access::Oneof(*slot);
    }

    let Some(slot) = slots.fields.get(&field.number()) else {
        panic!(
            "{}: no storage for field {} ({})",
            type_name,
            field.full_name(),
            field.number()
        );
    };
    let class = field.kind().class();
    let (access, expected) = if let Some(entry) = field.map_entry() {
        let layout = Layout::Map {
            key: entry.key.class(),
            value: entry.value.class(),
        };
        (Access::Map(*slot), layout)
    } else if field.is_list() {
        (Access::List(*slot), Layout::List { class })
    } else if field.kind().is_message() {
        let layout = Layout::Singular {
            class: ValueClass::Message,
            explicit_presence: true,
        };
        (Access::Message(*slot), layout)
    } else {
        let layout = Layout::Singular {
            class,
            explicit_presence: field.has_presence(),
        };
        (Access::Scalar(*slot), layout)
    };

    let storage = slot.storage(record);
    let actual = storage.layout();
    if actual != expected {
        panic!(
            "{}: storage '{}' of field {} is {:?}, want {:?}",
            type_name,
            slot.offset().target(),
            field.full_name(),
            actual,
            expected
        );
    }
    check_message_type(field, storage.message_name(), slot.offset().name(), type_name);
    access
}

/// Message storage must hold the message type the field declares
fn check_message_type(
    field: &FieldDescriptor,
    stored: Option<String>,
    storage: &str,
    type_name: &str,
) {
    if let (Some(want), Some(got)) = (field.type_name(), stored.as_deref()) {
        if want != got {
            panic!(
                "{}: storage '{}' of field {} holds message {}, want {}",
                type_name,
                storage,
                field.full_name(),
                got,
                want
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures;

#[cfg(test)]
mod tests {
    use super::fixtures::{Counted, Embedded, Mislaid, Scalars, Tree};
    use super::*;
    use crate::record::Record;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_binding_is_lazy() {
        let binder = MessageType::new(Scalars::descriptor().unwrap());
        assert!(!binder.is_initialized());
        assert_eq!(binder.field_numbers(), None);

        binder.init(&Scalars::default());
        assert!(binder.is_initialized());
        assert_eq!(binder.field_numbers(), Some(&[1, 2, 3, 4, 5][..]));
        assert_eq!(
            binder.descriptor().map(|d| d.full_name()),
            Some("test.Scalars")
        );
    }

    #[test]
    fn test_concurrent_first_init() {
        let tables: Vec<usize> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        let mut record = Counted::default();
                        let fields = record.known_fields();
                        assert!(!fields.has(1));
                        let numbers = Counted::message_type().field_numbers().unwrap();
                        numbers.as_ptr() as usize
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(tables.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(super::fixtures::COUNTED_CLASSIFICATIONS.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "type mismatch")]
    fn test_type_mismatch_panics() {
        let binder = MessageType::new(Scalars::descriptor().unwrap());
        binder.init(&Scalars::default());
        binder.init(&Tree::default());
    }

    #[test]
    #[should_panic(expected = "embedded struct")]
    fn test_embedded_slot_panics() {
        let mut record = Embedded::default();
        record.known_fields();
    }

    #[test]
    #[should_panic(expected = "no storage for field")]
    fn test_missing_slot_panics() {
        let binder = MessageType::new(Scalars::descriptor().unwrap());
        binder.init(&Mislaid::default());
    }

    #[test]
    #[should_panic(expected = "want Singular")]
    fn test_layout_mismatch_panics() {
        // proto2 scalars need Option storage; Tree stores implicit scalars
        let desc = MessageDescriptor::builder("test.Tree")
            .field(FieldDescriptor::new(1, "name", crate::Kind::String))
            .build()
            .unwrap();
        MessageType::new(Arc::new(desc)).init(&Tree::default());
    }

    #[test]
    fn test_failed_classification_can_retry() {
        let binder = MessageType::new(Scalars::descriptor().unwrap());
        let attempt = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            binder.init(&Mislaid::default());
        }));
        assert!(attempt.is_err());
        assert!(!binder.is_initialized());

        binder.init(&Scalars::default());
        assert!(binder.is_initialized());
    }

    #[test]
    fn test_size_cache_invalidated_on_write() {
        let mut record = Scalars::default();
        record.cache.store(12);
        assert_eq!(
            Scalars::message_type()
                .size_cache_of(&record)
                .and_then(SizeCache::load),
            Some(12)
        );

        record.known_fields().set(2, crate::Value::Int32(7));
        assert_eq!(record.cache.load(), None);
    }

    #[test]
    fn test_unknown_fields_bucket() {
        let mut record = Scalars::default();
        let mut unknown = Scalars::message_type().unknown_fields_of(&mut record);
        assert!(unknown.is_supported());
        unknown.append_wire(&[0x50, 0x01]).unwrap();
        let raw = crate::RawFields::new(11, vec![0x58, 0x02]).unwrap();
        unknown.set(11, raw).unwrap();
        let mut seen = Vec::new();
        unknown.range(|number, raw| {
            seen.push((number, raw.len()));
            true
        });
        assert_eq!(seen, vec![(10, 2), (11, 2)]);
        assert_eq!(record.unknown.len(), 2);

        let mut tree = Tree::default();
        let mut unknown = Tree::message_type().unknown_fields_of(&mut tree);
        assert!(!unknown.is_supported());
        assert!(matches!(
            unknown.set(3, crate::RawFields::default()),
            Err(Error::UnknownFieldsUnsupported { .. })
        ));
    }

    #[test]
    fn test_unknown_fields_refuse_declared_numbers() {
        let mut record = Scalars::default();
        let mut unknown = Scalars::message_type().unknown_fields_of(&mut record);

        // field 2 is `count`
        let raw = crate::RawFields::new(2, vec![0x10, 0x05]).unwrap();
        assert!(matches!(
            unknown.set(2, raw),
            Err(Error::DeclaredField { number: 2, .. })
        ));

        // field 10 is undeclared, field 1 is `flag`: the whole buffer is refused
        assert!(matches!(
            unknown.append_wire(&[0x50, 0x01, 0x08, 0x01]),
            Err(Error::DeclaredField { number: 1, .. })
        ));
        assert!(unknown.is_empty());
        assert!(record.unknown.is_empty());

        let fields = record.known_fields();
        assert!(!fields.has(1));
        assert!(!fields.has(2));
    }

    #[test]
    #[should_panic(expected = "holds message test.Tree, want other.Unrelated")]
    fn test_nested_message_type_mismatch_panics() {
        let desc = MessageDescriptor::builder("test.Tree")
            .syntax(crate::Syntax::Proto3)
            .field(
                FieldDescriptor::new(3, "parent", crate::Kind::Message)
                    .with_message_type("other.Unrelated"),
            )
            .build()
            .unwrap();
        MessageType::new(Arc::new(desc)).init(&Tree::default());
    }

    #[test]
    #[should_panic(expected = "holds message test.Tree, want other.Unrelated")]
    fn test_map_value_message_type_mismatch_panics() {
        let desc = MessageDescriptor::builder("test.Tree")
            .syntax(crate::Syntax::Proto3)
            .field(
                FieldDescriptor::map(5, "index", crate::Kind::Uint32, crate::Kind::Message)
                    .with_message_type("other.Unrelated"),
            )
            .build()
            .unwrap();
        MessageType::new(Arc::new(desc)).init(&Tree::default());
    }

    #[test]
    #[should_panic(expected = "holds message test.Tree, want other.Unrelated")]
    fn test_oneof_message_type_mismatch_panics() {
        let desc = MessageDescriptor::builder("test.Tree")
            .syntax(crate::Syntax::Proto3)
            .field(
                FieldDescriptor::new(8, "c", crate::Kind::Message)
                    .with_message_type("other.Unrelated")
                    .in_oneof("pick"),
            )
            .build()
            .unwrap();
        MessageType::new(Arc::new(desc)).init(&Tree::default());
    }

    #[test]
    fn test_weak_bucket() {
        let mut tree = Tree::default();
        let weak = Tree::message_type().weak_fields_of(&mut tree).unwrap();
        // field 9, empty message
        let raw = crate::RawFields::new(9, vec![0x4a, 0x00]).unwrap();
        weak.raw_mut().set(9, raw.clone()).unwrap();
        assert_eq!(tree.weak.raw().get(9), Some(&raw));

        let mut record = Scalars::default();
        assert!(Scalars::message_type().weak_fields_of(&mut record).is_none());
    }

    #[test]
    fn test_extension_bucket() {
        let mut tree = Tree::default();
        let mut extensions = Tree::message_type().extension_fields_of(&mut tree);
        assert!(extensions.is_supported());
        // field 150, varint 1
        extensions.append_wire(&[0xb0, 0x09, 0x01]).unwrap();
        assert_eq!(tree.extensions.raw().len(), 1);
        assert!(tree.extensions.raw().get(150).is_some());
    }
}
