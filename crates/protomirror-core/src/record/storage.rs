//! Storage traits for record slots.
//!
//! Supported slot types:
//!
//! | Rust type              | Layout                                  |
//! |------------------------|-----------------------------------------|
//! | `Option<T>`            | singular with explicit presence         |
//! | `T` (scalar)           | singular with implicit (non-zero) presence |
//! | `Option<Box<M>>`       | singular message                        |
//! | `Vec<T>`               | list                                    |
//! | `HashMap<K, V>`        | map                                     |
//! | `Option<U: Oneof>`     | oneof group (see [`oneof!`](crate::oneof)) |

use crate::record::Message;
use crate::value::{MapKey, ProtoMapKey, ProtoValue, Value, ValueClass};
use crate::FieldNumber;
use bytes::Bytes;
use std::any::Any;
use std::collections::HashMap;

/// Shape of a field's storage, compared against its descriptor at bind time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One value
    Singular {
        /// Class of the stored value
        class: ValueClass,
        /// Whether "unset" is distinguishable from "set to zero"
        explicit_presence: bool,
    },
    /// An ordered sequence
    List {
        /// Class of the elements
        class: ValueClass,
    },
    /// A key/value table
    Map {
        /// Class of the keys
        key: ValueClass,
        /// Class of the values
        value: ValueClass,
    },
}

/// Storage of one regular field
pub trait FieldStorage: Any + Send + Sync {
    /// Shape of this storage
    fn layout(&self) -> Layout;

    /// Full name of the message type held, for message storage
    fn message_name(&self) -> Option<String> {
        None
    }

    /// Singular view
    fn as_singular(&self) -> Option<&dyn SingularStorage> {
        None
    }

    /// Mutable singular view
    fn as_singular_mut(&mut self) -> Option<&mut dyn SingularStorage> {
        None
    }

    /// List view
    fn as_list(&self) -> Option<&dyn ListStorage> {
        None
    }

    /// Mutable list view
    fn as_list_mut(&mut self) -> Option<&mut dyn ListStorage> {
        None
    }

    /// Map view
    fn as_map(&self) -> Option<&dyn MapStorage> {
        None
    }

    /// Mutable map view
    fn as_map_mut(&mut self) -> Option<&mut dyn MapStorage> {
        None
    }
}

/// Storage of a singular field
pub trait SingularStorage {
    /// Returns true if the field is populated
    fn is_present(&self) -> bool;

    /// The stored value, or `None` when unpopulated
    fn load(&self) -> Option<Value>;

    /// Stores a value, handing it back on a class mismatch
    fn store(&mut self, value: Value) -> Result<(), Value>;

    /// Returns the field to its unpopulated state
    fn reset(&mut self);

    /// The zero value of the stored type
    fn zero(&self) -> Value;

    /// Borrows the nested message, allocating an empty one first if unset
    fn message_mut(&mut self) -> Option<&mut dyn Message>;
}

/// Storage of a repeated field
pub trait ListStorage {
    /// Number of elements
    fn len(&self) -> usize;

    /// Returns true if there are no elements
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`
    fn get(&self, index: usize) -> Option<Value>;

    /// Replaces the element at `index`, which must be in bounds
    fn set(&mut self, index: usize, value: Value) -> Result<(), Value>;

    /// Appends an element
    fn append(&mut self, value: Value) -> Result<(), Value>;

    /// Shortens the list to `len` elements
    fn truncate(&mut self, len: usize);

    /// Removes all elements
    fn clear(&mut self);

    /// Snapshot of all elements
    fn to_values(&self) -> Vec<Value>;

    /// Borrows a message element
    fn element_mut(&mut self, index: usize) -> Option<&mut dyn Message>;

    /// Appends an empty message element and borrows it
    fn append_message(&mut self) -> Option<&mut dyn Message>;
}

/// Why a map entry was not stored
#[derive(Debug, Clone, PartialEq)]
pub enum MapRejection {
    /// The key has the wrong class
    Key(MapKey),
    /// The value has the wrong class
    Value(Value),
}

/// Storage of a map field
pub trait MapStorage {
    /// Number of entries
    fn len(&self) -> usize;

    /// Returns true if there are no entries
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `key` is present
    fn has(&self, key: &MapKey) -> bool;

    /// Value stored under `key`
    fn get(&self, key: &MapKey) -> Option<Value>;

    /// Inserts or replaces an entry
    fn set(&mut self, key: MapKey, value: Value) -> Result<(), MapRejection>;

    /// Removes an entry; absent keys are ignored
    fn remove(&mut self, key: &MapKey);

    /// Removes all entries
    fn clear(&mut self);

    /// Visits entries in unspecified order until `f` returns false
    fn range(&self, f: &mut dyn FnMut(MapKey, Value) -> bool);

    /// Snapshot of all entries
    fn to_values(&self) -> HashMap<MapKey, Value>;

    /// Borrows a message value, inserting an empty one if absent
    fn value_mut(&mut self, key: &MapKey) -> Option<&mut dyn Message>;
}

impl<T: ProtoValue> FieldStorage for Option<T> {
    fn layout(&self) -> Layout {
        Layout::Singular {
            class: T::CLASS,
            explicit_presence: true,
        }
    }

    fn message_name(&self) -> Option<String> {
        T::message_name()
    }

    fn as_singular(&self) -> Option<&dyn SingularStorage> {
        Some(self)
    }

    fn as_singular_mut(&mut self) -> Option<&mut dyn SingularStorage> {
        Some(self)
    }
}

impl<T: ProtoValue> SingularStorage for Option<T> {
    fn is_present(&self) -> bool {
        self.is_some()
    }

    fn load(&self) -> Option<Value> {
        self.as_ref().map(T::to_value)
    }

    fn store(&mut self, value: Value) -> Result<(), Value> {
        *self = Some(T::from_value(value)?);
        Ok(())
    }

    fn reset(&mut self) {
        *self = None;
    }

    fn zero(&self) -> Value {
        T::zero().to_value()
    }

    fn message_mut(&mut self) -> Option<&mut dyn Message> {
        if T::CLASS != ValueClass::Message {
            return None;
        }
        self.get_or_insert_with(T::zero).as_message_mut()
    }
}

macro_rules! impl_implicit_storage {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FieldStorage for $ty {
                fn layout(&self) -> Layout {
                    Layout::Singular {
                        class: <$ty as ProtoValue>::CLASS,
                        explicit_presence: false,
                    }
                }

                fn as_singular(&self) -> Option<&dyn SingularStorage> {
                    Some(self)
                }

                fn as_singular_mut(&mut self) -> Option<&mut dyn SingularStorage> {
                    Some(self)
                }
            }

            impl SingularStorage for $ty {
                fn is_present(&self) -> bool {
                    !self.is_zero()
                }

                fn load(&self) -> Option<Value> {
                    self.is_present().then(|| ProtoValue::to_value(self))
                }

                fn store(&mut self, value: Value) -> Result<(), Value> {
                    *self = <$ty as ProtoValue>::from_value(value)?;
                    Ok(())
                }

                fn reset(&mut self) {
                    *self = <$ty as ProtoValue>::zero();
                }

                fn zero(&self) -> Value {
                    ProtoValue::to_value(&<$ty as ProtoValue>::zero())
                }

                fn message_mut(&mut self) -> Option<&mut dyn Message> {
                    None
                }
            }
        )*
    };
}

impl_implicit_storage!(
    bool,
    i32,
    i64,
    u32,
    u64,
    f32,
    f64,
    String,
    Bytes,
    crate::value::EnumNumber,
);

impl<T: ProtoValue> FieldStorage for Vec<T> {
    fn layout(&self) -> Layout {
        Layout::List { class: T::CLASS }
    }

    fn message_name(&self) -> Option<String> {
        T::message_name()
    }

    fn as_list(&self) -> Option<&dyn ListStorage> {
        Some(self)
    }

    fn as_list_mut(&mut self) -> Option<&mut dyn ListStorage> {
        Some(self)
    }
}

impl<T: ProtoValue> ListStorage for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn get(&self, index: usize) -> Option<Value> {
        self.as_slice().get(index).map(T::to_value)
    }

    fn set(&mut self, index: usize, value: Value) -> Result<(), Value> {
        let value = T::from_value(value)?;
        self.as_mut_slice()[index] = value;
        Ok(())
    }

    fn append(&mut self, value: Value) -> Result<(), Value> {
        self.push(T::from_value(value)?);
        Ok(())
    }

    fn truncate(&mut self, len: usize) {
        Vec::truncate(self, len);
    }

    fn clear(&mut self) {
        Vec::clear(self);
    }

    fn to_values(&self) -> Vec<Value> {
        self.iter().map(T::to_value).collect()
    }

    fn element_mut(&mut self, index: usize) -> Option<&mut dyn Message> {
        self.as_mut_slice().get_mut(index)?.as_message_mut()
    }

    fn append_message(&mut self) -> Option<&mut dyn Message> {
        if T::CLASS != ValueClass::Message {
            return None;
        }
        self.push(T::zero());
        self.last_mut()?.as_message_mut()
    }
}

impl<K: ProtoMapKey, V: ProtoValue> FieldStorage for HashMap<K, V> {
    fn layout(&self) -> Layout {
        Layout::Map {
            key: K::CLASS,
            value: V::CLASS,
        }
    }

    fn message_name(&self) -> Option<String> {
        V::message_name()
    }

    fn as_map(&self) -> Option<&dyn MapStorage> {
        Some(self)
    }

    fn as_map_mut(&mut self) -> Option<&mut dyn MapStorage> {
        Some(self)
    }
}

impl<K: ProtoMapKey, V: ProtoValue> MapStorage for HashMap<K, V> {
    fn len(&self) -> usize {
        HashMap::len(self)
    }

    fn has(&self, key: &MapKey) -> bool {
        K::from_key(key).is_some_and(|key| self.contains_key(&key))
    }

    fn get(&self, key: &MapKey) -> Option<Value> {
        let key = K::from_key(key)?;
        HashMap::get(self, &key).map(V::to_value)
    }

    fn set(&mut self, key: MapKey, value: Value) -> Result<(), MapRejection> {
        let key = K::from_key(&key).ok_or(MapRejection::Key(key))?;
        let value = V::from_value(value).map_err(MapRejection::Value)?;
        self.insert(key, value);
        Ok(())
    }

    fn remove(&mut self, key: &MapKey) {
        if let Some(key) = K::from_key(key) {
            HashMap::remove(self, &key);
        }
    }

    fn clear(&mut self) {
        HashMap::clear(self);
    }

    fn range(&self, f: &mut dyn FnMut(MapKey, Value) -> bool) {
        for (key, value) in self.iter() {
            if !f(key.to_key(), value.to_value()) {
                return;
            }
        }
    }

    fn to_values(&self) -> HashMap<MapKey, Value> {
        self.iter()
            .map(|(key, value)| (key.to_key(), value.to_value()))
            .collect()
    }

    fn value_mut(&mut self, key: &MapKey) -> Option<&mut dyn Message> {
        if V::CLASS != ValueClass::Message {
            return None;
        }
        let key = K::from_key(key)?;
        self.entry(key).or_insert_with(V::zero).as_message_mut()
    }
}

/// The Rust enum behind a oneof group; usually generated by [`oneof!`](crate::oneof)
pub trait Oneof: Clone + Send + Sync + 'static {
    /// Field numbers of the members
    fn numbers() -> &'static [FieldNumber];

    /// Field number of the active member
    fn number(&self) -> FieldNumber;

    /// Value of the active member
    fn to_value(&self) -> Value;

    /// Builds the member `number` from a value
    fn from_value(number: FieldNumber, value: Value) -> Result<Self, Value>;

    /// Value class of member `number`
    fn case_class(number: FieldNumber) -> Option<ValueClass>;

    /// Message type of member `number`, if it is message-valued
    fn case_message_name(number: FieldNumber) -> Option<String>;

    /// Member `number` holding its zero value
    fn zero_case(number: FieldNumber) -> Option<Self>;

    /// Borrows the active member's message, if it is message-valued
    fn message_mut(&mut self) -> Option<&mut dyn Message>;
}

/// Storage shared by the members of a oneof group
pub trait OneofStorage: Any + Send + Sync {
    /// Field numbers of the members
    fn members(&self) -> &'static [FieldNumber];

    /// Number of the active member
    fn which(&self) -> Option<FieldNumber>;

    /// Value of member `number` if it is the active one
    fn load(&self, number: FieldNumber) -> Option<Value>;

    /// Activates member `number` with a value
    fn store(&mut self, number: FieldNumber, value: Value) -> Result<(), Value>;

    /// Deactivates the group
    fn reset(&mut self);

    /// Value class of member `number`
    fn case_class(&self, number: FieldNumber) -> Option<ValueClass>;

    /// Message type of member `number`, if it is message-valued
    fn case_message_name(&self, number: FieldNumber) -> Option<String>;

    /// Zero value of member `number`
    fn zero(&self, number: FieldNumber) -> Option<Value>;

    /// Activates member `number` if needed and borrows its message
    fn message_mut(&mut self, number: FieldNumber) -> Option<&mut dyn Message>;
}

impl<U: Oneof> OneofStorage for Option<U> {
    fn members(&self) -> &'static [FieldNumber] {
        U::numbers()
    }

    fn which(&self) -> Option<FieldNumber> {
        self.as_ref().map(U::number)
    }

    fn load(&self, number: FieldNumber) -> Option<Value> {
        self.as_ref()
            .filter(|active| active.number() == number)
            .map(U::to_value)
    }

    fn store(&mut self, number: FieldNumber, value: Value) -> Result<(), Value> {
        *self = Some(U::from_value(number, value)?);
        Ok(())
    }

    fn reset(&mut self) {
        *self = None;
    }

    fn case_class(&self, number: FieldNumber) -> Option<ValueClass> {
        U::case_class(number)
    }

    fn case_message_name(&self, number: FieldNumber) -> Option<String> {
        U::case_message_name(number)
    }

    fn zero(&self, number: FieldNumber) -> Option<Value> {
        U::zero_case(number).map(|case| case.to_value())
    }

    fn message_mut(&mut self, number: FieldNumber) -> Option<&mut dyn Message> {
        if U::case_class(number) != Some(ValueClass::Message) {
            return None;
        }
        if self.which() != Some(number) {
            *self = Some(U::zero_case(number)?);
        }
        self.as_mut()?.message_mut()
    }
}

/// Declares the enum behind a oneof group and implements [`Oneof`] for it.
///
/// Each variant wraps the member's value type and is bound to the member's
/// field number. The enum derives `Debug`, `Clone` and `PartialEq`.
///
/// ```
/// protomirror_core::oneof! {
///     pub enum Payload {
///         Text(String) = 3,
///         Count(i64) = 4,
///     }
/// }
///
/// use protomirror_core::record::Oneof;
/// assert_eq!(Payload::Count(2).number(), 4);
/// assert_eq!(Payload::numbers(), &[3, 4]);
/// ```
#[macro_export]
macro_rules! oneof {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident($ty:ty) = $number:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        $vis enum $name {
            $($variant($ty)),+
        }

        impl $crate::record::Oneof for $name {
            fn numbers() -> &'static [$crate::FieldNumber] {
                &[$($number),+]
            }

            fn number(&self) -> $crate::FieldNumber {
                match self {
                    $(Self::$variant(_) => $number),+
                }
            }

            fn to_value(&self) -> $crate::value::Value {
                match self {
                    $(Self::$variant(v) => $crate::value::ProtoValue::to_value(v)),+
                }
            }

            fn from_value(
                number: $crate::FieldNumber,
                value: $crate::value::Value,
            ) -> ::std::result::Result<Self, $crate::value::Value> {
                match number {
                    $($number => <$ty as $crate::value::ProtoValue>::from_value(value).map(Self::$variant),)+
                    _ => ::std::result::Result::Err(value),
                }
            }

            fn case_class(number: $crate::FieldNumber) -> ::std::option::Option<$crate::value::ValueClass> {
                match number {
                    $($number => ::std::option::Option::Some(<$ty as $crate::value::ProtoValue>::CLASS),)+
                    _ => ::std::option::Option::None,
                }
            }

            fn case_message_name(number: $crate::FieldNumber) -> ::std::option::Option<::std::string::String> {
                match number {
                    $($number => <$ty as $crate::value::ProtoValue>::message_name(),)+
                    _ => ::std::option::Option::None,
                }
            }

            fn zero_case(number: $crate::FieldNumber) -> ::std::option::Option<Self> {
                match number {
                    $($number => ::std::option::Option::Some(Self::$variant(<$ty as $crate::value::ProtoValue>::zero())),)+
                    _ => ::std::option::Option::None,
                }
            }

            fn message_mut(&mut self) -> ::std::option::Option<&mut dyn $crate::record::Message> {
                match self {
                    $(Self::$variant(v) => $crate::value::ProtoValue::as_message_mut(v)),+
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    crate::oneof! {
        enum Shape {
            Side(u32) = 1,
            Label(String) = 2,
        }
    }

    #[test]
    fn test_explicit_presence_storage() {
        let mut slot: Option<i32> = None;
        assert!(!SingularStorage::is_present(&slot));
        assert_eq!(SingularStorage::load(&slot), None);
        SingularStorage::store(&mut slot, Value::Int32(0)).unwrap();
        assert!(SingularStorage::is_present(&slot));
        assert_eq!(SingularStorage::load(&slot), Some(Value::Int32(0)));
        assert_eq!(
            SingularStorage::store(&mut slot, Value::Bool(true)),
            Err(Value::Bool(true))
        );
        SingularStorage::reset(&mut slot);
        assert_eq!(slot, None);
    }

    #[test]
    fn test_implicit_presence_storage() {
        let mut slot = 0.0f64;
        assert_eq!(
            slot.layout(),
            Layout::Singular {
                class: ValueClass::Float64,
                explicit_presence: false
            }
        );
        SingularStorage::store(&mut slot, Value::Float64(-0.0)).unwrap();
        assert!(SingularStorage::is_present(&slot));
        SingularStorage::store(&mut slot, Value::Float64(0.0)).unwrap();
        assert!(!SingularStorage::is_present(&slot));
        assert_eq!(SingularStorage::load(&slot), None);
    }

    #[test]
    fn test_list_storage() {
        let mut list: Vec<String> = Vec::new();
        ListStorage::append(&mut list, Value::from("a")).unwrap();
        ListStorage::append(&mut list, Value::from("b")).unwrap();
        ListStorage::set(&mut list, 0, Value::from("z")).unwrap();
        assert_eq!(ListStorage::get(&list, 0), Some(Value::from("z")));
        assert_eq!(ListStorage::get(&list, 2), None);
        ListStorage::truncate(&mut list, 1);
        assert_eq!(ListStorage::to_values(&list), vec![Value::from("z")]);
        assert!(ListStorage::append_message(&mut list).is_none());
    }

    #[test]
    fn test_map_storage() {
        let mut map: HashMap<i32, bool> = HashMap::new();
        MapStorage::set(&mut map, MapKey::Int32(1), Value::Bool(true)).unwrap();
        assert!(MapStorage::has(&map, &MapKey::Int32(1)));
        assert!(!MapStorage::has(&map, &MapKey::Int64(1)));
        assert_eq!(
            MapStorage::set(&mut map, MapKey::from("k"), Value::Bool(true)),
            Err(MapRejection::Key(MapKey::from("k")))
        );
        assert_eq!(
            MapStorage::set(&mut map, MapKey::Int32(2), Value::Int32(1)),
            Err(MapRejection::Value(Value::Int32(1)))
        );
        MapStorage::remove(&mut map, &MapKey::Int32(1));
        assert_eq!(MapStorage::len(&map), 0);
    }

    #[test]
    fn test_oneof_storage() {
        let mut group: Option<Shape> = None;
        assert_eq!(OneofStorage::members(&group), &[1, 2]);
        OneofStorage::store(&mut group, 2, Value::from("tri")).unwrap();
        assert_eq!(OneofStorage::which(&group), Some(2));
        assert_eq!(OneofStorage::load(&group, 1), None);
        assert_eq!(OneofStorage::load(&group, 2), Some(Value::from("tri")));
        assert_eq!(OneofStorage::case_class(&group, 1), Some(ValueClass::Uint32));
        assert_eq!(OneofStorage::zero(&group, 1), Some(Value::Uint32(0)));
        assert_eq!(
            OneofStorage::store(&mut group, 3, Value::Uint32(1)),
            Err(Value::Uint32(1))
        );
        assert!(OneofStorage::message_mut(&mut group, 1).is_none());
        assert_eq!(group, Some(Shape::Label("tri".into())));
    }
}
