//! The known-fields facade and the handles it hands out.

use crate::descriptor::{FieldDescriptor, MessageDescriptor};
use crate::error::{Error, Result};
use crate::pointer::{Pointer, PointerMut};
use crate::record::{ListStorage, MapRejection, MapStorage, Message, RawFields, UnknownFields};
use crate::reflect::field::rejected_value;
use crate::reflect::Binding;
use crate::value::{MapKey, Value};
use crate::wire;
use crate::FieldNumber;
use std::fmt;
use std::sync::Arc;

/// Read-only view of the declared fields of one record
#[derive(Clone, Copy)]
pub struct FieldsView<'a> {
    ptr: Pointer<'a>,
    binding: &'a Binding,
}

impl<'a> FieldsView<'a> {
    pub(crate) fn new(ptr: Pointer<'a>, binding: &'a Binding) -> Self {
        Self { ptr, binding }
    }

    /// Descriptor of the message
    pub fn descriptor(&self) -> &'a Arc<MessageDescriptor> {
        &self.binding.desc
    }

    /// Number of populated fields; weak fields are not counted
    pub fn len(&self) -> usize {
        let mut count = 0;
        self.range(|_, _| {
            count += 1;
            true
        });
        count
    }

    /// Returns true if no field is populated
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reports whether field `number` is populated.
    ///
    /// Undeclared numbers report false.
    ///
    /// # Panics
    ///
    /// Panics if the field is weak.
    pub fn has(&self, number: FieldNumber) -> bool {
        match self.binding.field(number) {
            Some(info) => info.has(self.ptr).unwrap_or_else(|err| panic!("{}", err)),
            None => false,
        }
    }

    /// Value of field `number`, or its default when unpopulated.
    ///
    /// Undeclared numbers yield [`Value::Null`].
    ///
    /// # Panics
    ///
    /// Panics if the field is weak.
    pub fn get(&self, number: FieldNumber) -> Value {
        match self.binding.field(number) {
            Some(info) => info.get(self.ptr).unwrap_or_else(|err| panic!("{}", err)),
            None => Value::Null,
        }
    }

    /// Like [`has`](Self::has), reporting every problem as an error
    pub fn try_has(&self, number: FieldNumber) -> Result<bool> {
        self.binding.require(number)?.has(self.ptr)
    }

    /// Like [`get`](Self::get), reporting every problem as an error
    pub fn try_get(&self, number: FieldNumber) -> Result<Value> {
        self.binding.require(number)?.get(self.ptr)
    }

    /// Visits every populated field in declaration order until `f` returns
    /// false. Callers must not rely on the order.
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(FieldNumber, Value) -> bool,
    {
        for info in self.binding.fields_in_order() {
            if info.is_weak() {
                continue;
            }
            let populated = matches!(info.has(self.ptr), Ok(true));
            if !populated {
                continue;
            }
            let Ok(value) = info.get(self.ptr) else {
                continue;
            };
            if !f(info.number(), value) {
                return;
            }
        }
    }
}

impl fmt::Debug for FieldsView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        self.range(|number, value| {
            map.entry(&number, &value);
            true
        });
        map.finish()
    }
}

/// Read-write view of the declared fields of one record.
///
/// Obtained from [`MessageType::known_fields_of`](crate::MessageType::known_fields_of)
/// or [`Message::known_fields`].
pub struct KnownFields<'a> {
    ptr: PointerMut<'a>,
    binding: &'a Binding,
}

impl<'a> KnownFields<'a> {
    pub(crate) fn new(ptr: PointerMut<'a>, binding: &'a Binding) -> Self {
        Self { ptr, binding }
    }

    /// Read-only view of the same record
    pub fn view(&self) -> FieldsView<'_> {
        FieldsView::new(self.ptr.as_shared(), self.binding)
    }

    /// Descriptor of the message
    pub fn descriptor(&self) -> &Arc<MessageDescriptor> {
        &self.binding.desc
    }

    /// Number of populated fields
    pub fn len(&self) -> usize {
        self.view().len()
    }

    /// Returns true if no field is populated
    pub fn is_empty(&self) -> bool {
        self.view().is_empty()
    }

    /// See [`FieldsView::has`]
    pub fn has(&self, number: FieldNumber) -> bool {
        self.view().has(number)
    }

    /// See [`FieldsView::get`]
    pub fn get(&self, number: FieldNumber) -> Value {
        self.view().get(number)
    }

    /// See [`FieldsView::range`]
    pub fn range<F>(&self, f: F)
    where
        F: FnMut(FieldNumber, Value) -> bool,
    {
        self.view().range(f);
    }

    /// Stores `value` in field `number`.
    ///
    /// For repeated and map fields the value must be a whole
    /// [`Value::List`] or [`Value::Map`]. Setting a oneof member clears the
    /// other members of its group.
    ///
    /// # Panics
    ///
    /// Panics with `invalid field: N` for an undeclared number, and on any
    /// error [`try_set`](Self::try_set) would report.
    pub fn set(&mut self, number: FieldNumber, value: Value) {
        self.known(number);
        if let Err(err) = self.try_set(number, value) {
            panic!("{}", err);
        }
    }

    /// Returns field `number` to its unpopulated state.
    ///
    /// # Panics
    ///
    /// Panics with `invalid field: N` for an undeclared number, and for weak
    /// fields.
    pub fn clear(&mut self, number: FieldNumber) {
        self.known(number);
        if let Err(err) = self.try_clear(number) {
            panic!("{}", err);
        }
    }

    /// Mutable handle for a message, repeated or map field.
    ///
    /// Unset message fields are populated with an empty message first.
    ///
    /// # Panics
    ///
    /// Panics with `invalid field: N` for an undeclared number, for scalar
    /// fields and for weak fields.
    pub fn mutable(&mut self, number: FieldNumber) -> Mutable<'_> {
        self.known(number);
        match self.try_mutable(number) {
            Ok(handle) => handle,
            Err(err) => panic!("{}", err),
        }
    }

    /// See [`FieldsView::try_has`]
    pub fn try_has(&self, number: FieldNumber) -> Result<bool> {
        self.view().try_has(number)
    }

    /// See [`FieldsView::try_get`]
    pub fn try_get(&self, number: FieldNumber) -> Result<Value> {
        self.view().try_get(number)
    }

    /// Like [`set`](Self::set), reporting every problem as an error
    pub fn try_set(&mut self, number: FieldNumber, value: Value) -> Result<()> {
        let info = self.binding.require(number)?;
        info.set(self.ptr.reborrow(), value)?;
        self.binding.invalidate_size(self.ptr.reborrow());
        Ok(())
    }

    /// Like [`clear`](Self::clear), reporting every problem as an error
    pub fn try_clear(&mut self, number: FieldNumber) -> Result<()> {
        let info = self.binding.require(number)?;
        info.clear(self.ptr.reborrow())?;
        self.binding.invalidate_size(self.ptr.reborrow());
        Ok(())
    }

    /// Like [`mutable`](Self::mutable), reporting every problem as an error
    pub fn try_mutable(&mut self, number: FieldNumber) -> Result<Mutable<'_>> {
        let binding = self.binding;
        let info = binding.require(number)?;
        binding.invalidate_size(self.ptr.reborrow());
        info.mutable(self.ptr.reborrow())
    }

    fn known(&self, number: FieldNumber) {
        if self.binding.field(number).is_none() {
            panic!("{}", Error::UnknownField { number });
        }
    }
}

impl fmt::Debug for KnownFields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnownFields")
            .field("message", &self.binding.desc.full_name())
            .field("fields", &self.view())
            .finish()
    }
}

/// Mutable handle returned by [`KnownFields::mutable`]
pub enum Mutable<'a> {
    /// Repeated field
    List(ListMut<'a>),
    /// Map field
    Map(MapMut<'a>),
    /// Nested message
    Message(&'a mut dyn Message),
}

impl<'a> Mutable<'a> {
    /// The list handle, if this is a repeated field
    pub fn into_list(self) -> Option<ListMut<'a>> {
        match self {
            Mutable::List(list) => Some(list),
            _ => None,
        }
    }

    /// The map handle, if this is a map field
    pub fn into_map(self) -> Option<MapMut<'a>> {
        match self {
            Mutable::Map(map) => Some(map),
            _ => None,
        }
    }

    /// The nested message, if this is a message field
    pub fn into_message(self) -> Option<&'a mut dyn Message> {
        match self {
            Mutable::Message(message) => Some(message),
            _ => None,
        }
    }
}

impl fmt::Debug for Mutable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutable::List(list) => fmt::Debug::fmt(list, f),
            Mutable::Map(map) => fmt::Debug::fmt(map, f),
            Mutable::Message(message) => f.debug_tuple("Message").field(message).finish(),
        }
    }
}

/// Mutable handle to a repeated field
pub struct ListMut<'a> {
    list: &'a mut dyn ListStorage,
    field: &'a FieldDescriptor,
}

impl<'a> ListMut<'a> {
    pub(crate) fn new(list: &'a mut dyn ListStorage, field: &'a FieldDescriptor) -> Self {
        Self { list, field }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Returns true if there are no elements
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Element at `index`
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn get(&self, index: usize) -> Value {
        match self.list.get(index) {
            Some(value) => value,
            None => self.out_of_bounds(index),
        }
    }

    /// Replaces the element at `index`
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds or the value has the wrong class.
    pub fn set(&mut self, index: usize, value: Value) {
        if index >= self.list.len() {
            self.out_of_bounds(index);
        }
        if let Err(rejected) = self.list.set(index, value) {
            panic!("{}", rejected_value(self.field, &rejected));
        }
    }

    /// Appends an element
    ///
    /// # Panics
    ///
    /// Panics if the value has the wrong class.
    pub fn append(&mut self, value: Value) {
        if let Err(rejected) = self.list.append(value) {
            panic!("{}", rejected_value(self.field, &rejected));
        }
    }

    /// Shortens the list to `len` elements
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the current length.
    pub fn truncate(&mut self, len: usize) {
        if len > self.list.len() {
            panic!(
                "truncate length {} exceeds length {} of '{}'",
                len,
                self.list.len(),
                self.field.full_name()
            );
        }
        self.list.truncate(len);
    }

    /// Borrows the message element at `index`
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds or the elements are not messages.
    pub fn mutable(&mut self, index: usize) -> &mut dyn Message {
        if index >= self.list.len() {
            self.out_of_bounds(index);
        }
        let field = self.field;
        match self.list.element_mut(index) {
            Some(message) => message,
            None => panic!("{}", not_mutable(field)),
        }
    }

    /// Appends an empty message element and borrows it
    ///
    /// # Panics
    ///
    /// Panics if the elements are not messages.
    pub fn mutable_append(&mut self) -> &mut dyn Message {
        let field = self.field;
        match self.list.append_message() {
            Some(message) => message,
            None => panic!("{}", not_mutable(field)),
        }
    }

    /// Snapshot of all elements
    pub fn to_vec(&self) -> Vec<Value> {
        self.list.to_values()
    }

    fn out_of_bounds(&self, index: usize) -> ! {
        panic!(
            "index {} out of bounds for '{}' of length {}",
            index,
            self.field.full_name(),
            self.list.len()
        )
    }
}

impl fmt::Debug for ListMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ListMut").field(&self.to_vec()).finish()
    }
}

/// Mutable handle to a map field
pub struct MapMut<'a> {
    map: &'a mut dyn MapStorage,
    field: &'a FieldDescriptor,
}

impl<'a> MapMut<'a> {
    pub(crate) fn new(map: &'a mut dyn MapStorage, field: &'a FieldDescriptor) -> Self {
        Self { map, field }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if there are no entries
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns true if `key` is present
    pub fn has(&self, key: &MapKey) -> bool {
        self.map.has(key)
    }

    /// Value under `key`, or [`Value::Null`] when absent
    pub fn get(&self, key: &MapKey) -> Value {
        self.map.get(key).unwrap_or_default()
    }

    /// Inserts or replaces an entry
    ///
    /// # Panics
    ///
    /// Panics if the key or the value has the wrong class.
    pub fn set(&mut self, key: MapKey, value: Value) {
        match self.map.set(key, value) {
            Ok(()) => {}
            Err(MapRejection::Key(key)) => panic!("{}", rejected_value(self.field, &key.to_value())),
            Err(MapRejection::Value(value)) => panic!("{}", rejected_value(self.field, &value)),
        }
    }

    /// Removes the entry under `key`; absent keys are ignored
    pub fn clear(&mut self, key: &MapKey) {
        self.map.remove(key);
    }

    /// Visits each entry once, in unspecified order, until `f` returns false
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(MapKey, Value) -> bool,
    {
        self.map.range(&mut f);
    }

    /// Borrows the message value under `key`, inserting an empty one if absent
    ///
    /// # Panics
    ///
    /// Panics if the values are not messages or the key has the wrong class.
    pub fn mutable(&mut self, key: &MapKey) -> &mut dyn Message {
        let field = self.field;
        match self.map.value_mut(key) {
            Some(message) => message,
            None => panic!("{}", not_mutable(field)),
        }
    }

    /// Snapshot of all entries
    pub fn to_map(&self) -> std::collections::HashMap<MapKey, Value> {
        self.map.to_values()
    }
}

impl fmt::Debug for MapMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MapMut").field(&self.to_map()).finish()
    }
}

fn not_mutable(field: &FieldDescriptor) -> Error {
    Error::NotMutable {
        field: field.full_name().to_string(),
    }
}

/// Handle to the raw bytes of fields a record does not declare.
///
/// Numbers the message declares are refused; their values live in the
/// record's typed storage.
pub struct UnknownFieldsMut<'a> {
    bucket: Option<&'a mut UnknownFields>,
    desc: &'a MessageDescriptor,
}

impl<'a> UnknownFieldsMut<'a> {
    pub(crate) fn new(bucket: Option<&'a mut UnknownFields>, desc: &'a MessageDescriptor) -> Self {
        Self { bucket, desc }
    }

    /// Returns true if the record has storage for raw fields
    pub fn is_supported(&self) -> bool {
        self.bucket.is_some()
    }

    /// Number of distinct field numbers stored
    pub fn len(&self) -> usize {
        self.bucket.as_ref().map_or(0, |bucket| bucket.len())
    }

    /// Returns true if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes stored for `number`
    pub fn get(&self, number: FieldNumber) -> Option<&RawFields> {
        self.bucket.as_ref()?.get(number)
    }

    /// Stores raw bytes for `number`; empty bytes remove the entry
    pub fn set(&mut self, number: FieldNumber, raw: RawFields) -> Result<()> {
        let desc = self.desc;
        let bucket = self.bucket()?;
        undeclared(desc, number)?;
        bucket.set(number, raw)
    }

    /// Appends encoded fields, filing each under its own number.
    ///
    /// Nothing is stored if the buffer is malformed or carries a field the
    /// message declares.
    pub fn append_wire(&mut self, data: &[u8]) -> Result<()> {
        let desc = self.desc;
        let bucket = self.bucket()?;
        for (number, _) in wire::split_fields(data)? {
            undeclared(desc, number)?;
        }
        bucket.append_wire(data)
    }

    /// Visits entries in ascending number order until `f` returns false
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(FieldNumber, &RawFields) -> bool,
    {
        let Some(bucket) = self.bucket.as_ref() else {
            return;
        };
        for (number, raw) in bucket.iter() {
            if !f(*number, raw) {
                return;
            }
        }
    }

    fn bucket(&mut self) -> Result<&mut UnknownFields> {
        match self.bucket.as_deref_mut() {
            Some(bucket) => Ok(bucket),
            None => Err(Error::UnknownFieldsUnsupported {
                message: self.desc.full_name().to_string(),
            }),
        }
    }
}

fn undeclared(desc: &MessageDescriptor, number: FieldNumber) -> Result<()> {
    match desc.field_by_number(number) {
        Some(_) => Err(Error::DeclaredField {
            message: desc.full_name().to_string(),
            number,
        }),
        None => Ok(()),
    }
}

impl fmt::Debug for UnknownFieldsMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnknownFieldsMut")
            .field("message", &self.desc.full_name())
            .field("fields", &self.bucket)
            .finish()
    }
}
