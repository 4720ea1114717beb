//! Per-field dispatch.
//!
//! A [`FieldInfo`] is compiled once per field when a record type is bound.
//! It pairs the field descriptor with the slot that stores the field and
//! the access strategy picked by classification.

use crate::descriptor::FieldDescriptor;
use crate::error::{Error, Result};
use crate::pointer::{Pointer, PointerMut};
use crate::record::{ListStorage, MapRejection, MapStorage, SingularStorage, Slot};
use crate::reflect::known::{ListMut, MapMut, Mutable};
use crate::value::{MapKey, Value};
use crate::FieldNumber;
use std::collections::HashMap;
use std::sync::Arc;

/// How a field is reached inside its record
#[derive(Debug, Clone, Copy)]
pub(crate) enum Access {
    /// Singular scalar with explicit or implicit presence
    Scalar(Slot),
    /// `Vec<T>` storage
    List(Slot),
    /// `HashMap<K, V>` storage
    Map(Slot),
    /// Singular nested message
    Message(Slot),
    /// Member of a oneof group sharing the slot
    Oneof(Slot),
    /// Weak message reference
    Weak,
}

/// Compiled dispatcher for one field number
#[derive(Debug, Clone)]
pub(crate) struct FieldInfo {
    desc: Arc<FieldDescriptor>,
    access: Access,
}

impl FieldInfo {
    pub(crate) fn new(desc: Arc<FieldDescriptor>, access: Access) -> Self {
        Self { desc, access }
    }

    pub(crate) fn number(&self) -> FieldNumber {
        self.desc.number()
    }

    pub(crate) fn is_weak(&self) -> bool {
        matches!(self.access, Access::Weak)
    }

    pub(crate) fn has(&self, record: Pointer<'_>) -> Result<bool> {
        match self.access {
            Access::Scalar(slot) | Access::Message(slot) => {
                Ok(self.singular(&slot, record)?.is_present())
            }
            Access::List(slot) => Ok(!self.list(&slot, record)?.is_empty()),
            Access::Map(slot) => Ok(!self.map(&slot, record)?.is_empty()),
            Access::Oneof(slot) => Ok(slot.oneof_storage(record).which() == Some(self.number())),
            Access::Weak => Err(self.weak()),
        }
    }

    pub(crate) fn get(&self, record: Pointer<'_>) -> Result<Value> {
        match self.access {
            Access::Scalar(slot) => {
                let storage = self.singular(&slot, record)?;
                Ok(storage.load().unwrap_or_else(|| self.desc.default_or_zero()))
            }
            Access::Message(slot) => {
                let storage = self.singular(&slot, record)?;
                Ok(storage.load().unwrap_or_else(|| storage.zero()))
            }
            Access::List(slot) => Ok(Value::List(self.list(&slot, record)?.to_values())),
            Access::Map(slot) => Ok(Value::Map(self.map(&slot, record)?.to_values())),
            Access::Oneof(slot) => {
                let storage = slot.oneof_storage(record);
                let number = self.number();
                Ok(match storage.load(number) {
                    Some(value) => value,
                    None if self.desc.kind().is_message() => {
                        storage.zero(number).unwrap_or_default()
                    }
                    None => self.desc.default_or_zero(),
                })
            }
            Access::Weak => Err(self.weak()),
        }
    }

    pub(crate) fn set(&self, record: PointerMut<'_>, value: Value) -> Result<()> {
        match self.access {
            Access::Scalar(slot) | Access::Message(slot) => self
                .singular_mut(&slot, record)?
                .store(value)
                .map_err(|rejected| self.rejected(&rejected)),
            Access::List(slot) => {
                let items = match value {
                    Value::List(items) => items,
                    other => return Err(self.rejected(&other)),
                };
                replace_list(self.list_mut(&slot, record)?, items)
                    .map_err(|rejected| self.rejected(&rejected))
            }
            Access::Map(slot) => {
                let entries = match value {
                    Value::Map(entries) => entries,
                    other => return Err(self.rejected(&other)),
                };
                replace_map(self.map_mut(&slot, record)?, entries).map_err(|rejected| {
                    match rejected {
                        MapRejection::Key(key) => self.rejected(&key.to_value()),
                        MapRejection::Value(value) => self.rejected(&value),
                    }
                })
            }
            Access::Oneof(slot) => slot
                .oneof_storage_mut(record)
                .store(self.number(), value)
                .map_err(|rejected| self.rejected(&rejected)),
            Access::Weak => Err(self.weak()),
        }
    }

    pub(crate) fn clear(&self, record: PointerMut<'_>) -> Result<()> {
        match self.access {
            Access::Scalar(slot) | Access::Message(slot) => {
                self.singular_mut(&slot, record)?.reset();
            }
            Access::List(slot) => self.list_mut(&slot, record)?.clear(),
            Access::Map(slot) => self.map_mut(&slot, record)?.clear(),
            Access::Oneof(slot) => {
                let storage = slot.oneof_storage_mut(record);
                if storage.which() == Some(self.number()) {
                    storage.reset();
                }
            }
            Access::Weak => return Err(self.weak()),
        }
        Ok(())
    }

    pub(crate) fn mutable<'a>(&'a self, record: PointerMut<'a>) -> Result<Mutable<'a>> {
        match self.access {
            Access::Scalar(_) => Err(self.not_mutable()),
            Access::Message(slot) => self
                .singular_mut(&slot, record)?
                .message_mut()
                .map(Mutable::Message)
                .ok_or_else(|| self.not_mutable()),
            Access::List(slot) => Ok(Mutable::List(ListMut::new(
                self.list_mut(&slot, record)?,
                &self.desc,
            ))),
            Access::Map(slot) => Ok(Mutable::Map(MapMut::new(
                self.map_mut(&slot, record)?,
                &self.desc,
            ))),
            Access::Oneof(slot) => slot
                .oneof_storage_mut(record)
                .message_mut(self.number())
                .map(Mutable::Message)
                .ok_or_else(|| self.not_mutable()),
            Access::Weak => Err(self.weak()),
        }
    }

    fn singular<'a>(&self, slot: &Slot, record: Pointer<'a>) -> Result<&'a dyn SingularStorage> {
        slot.storage(record)
            .as_singular()
            .ok_or_else(|| self.broken("singular"))
    }

    fn singular_mut<'a>(
        &self,
        slot: &Slot,
        record: PointerMut<'a>,
    ) -> Result<&'a mut dyn SingularStorage> {
        slot.storage_mut(record)
            .as_singular_mut()
            .ok_or_else(|| self.broken("singular"))
    }

    fn list<'a>(&self, slot: &Slot, record: Pointer<'a>) -> Result<&'a dyn ListStorage> {
        slot.storage(record)
            .as_list()
            .ok_or_else(|| self.broken("list"))
    }

    fn list_mut<'a>(&self, slot: &Slot, record: PointerMut<'a>) -> Result<&'a mut dyn ListStorage> {
        slot.storage_mut(record)
            .as_list_mut()
            .ok_or_else(|| self.broken("list"))
    }

    fn map<'a>(&self, slot: &Slot, record: Pointer<'a>) -> Result<&'a dyn MapStorage> {
        slot.storage(record)
            .as_map()
            .ok_or_else(|| self.broken("map"))
    }

    fn map_mut<'a>(&self, slot: &Slot, record: PointerMut<'a>) -> Result<&'a mut dyn MapStorage> {
        slot.storage_mut(record)
            .as_map_mut()
            .ok_or_else(|| self.broken("map"))
    }

    fn rejected(&self, value: &Value) -> Error {
        rejected_value(&self.desc, value)
    }

    fn weak(&self) -> Error {
        Error::WeakFieldUnsupported {
            field: self.desc.full_name().to_string(),
            number: self.number(),
        }
    }

    fn not_mutable(&self) -> Error {
        Error::NotMutable {
            field: self.desc.full_name().to_string(),
        }
    }

    fn broken(&self, shape: &str) -> Error {
        Error::internal(format!(
            "storage of '{}' is not {} storage",
            self.desc.full_name(),
            shape
        ))
    }
}

pub(crate) fn rejected_value(field: &FieldDescriptor, value: &Value) -> Error {
    Error::invalid_value(
        field.full_name(),
        format!("{:?} does not fit a {} field", value, field.kind().as_str()),
    )
}

/// Replaces the whole list, restoring the old contents if an item is rejected
fn replace_list(list: &mut dyn ListStorage, items: Vec<Value>) -> std::result::Result<(), Value> {
    let previous = list.to_values();
    list.clear();
    for item in items {
        if let Err(rejected) = list.append(item) {
            list.clear();
            for old in previous {
                // These came out of the same storage.
                let _ = list.append(old);
            }
            return Err(rejected);
        }
    }
    Ok(())
}

fn replace_map(
    map: &mut dyn MapStorage,
    entries: HashMap<MapKey, Value>,
) -> std::result::Result<(), MapRejection> {
    let previous = map.to_values();
    map.clear();
    for (key, value) in entries {
        if let Err(rejected) = map.set(key, value) {
            map.clear();
            for (key, value) in previous {
                let _ = map.set(key, value);
            }
            return Err(rejected);
        }
    }
    Ok(())
}
