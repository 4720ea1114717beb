//! Reflective value types.
//!
//! [`Value`] is the union that crosses the reflection boundary: getters
//! return it and setters consume it. The [`ProtoValue`] and [`ProtoMapKey`]
//! traits connect Rust storage types to their value class.

use crate::descriptor::Kind;
use crate::record::{Message, Record};
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Numeric value of an enum field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EnumNumber(pub i32);

impl From<i32> for EnumNumber {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

/// Runtime representation class of a field's values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueClass {
    /// `bool`
    Bool,
    /// All signed 32-bit kinds
    Int32,
    /// All signed 64-bit kinds
    Int64,
    /// All unsigned 32-bit kinds
    Uint32,
    /// All unsigned 64-bit kinds
    Uint64,
    /// `float`
    Float32,
    /// `double`
    Float64,
    /// `string`
    String,
    /// `bytes`
    Bytes,
    /// Enum number
    Enum,
    /// Nested message
    Message,
}

/// A reflective field value.
///
/// Floats compare by bit pattern, so a stored NaN reads back equal to
/// itself and `0.0` differs from `-0.0`.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent value
    #[default]
    Null,
    /// `bool`
    Bool(bool),
    /// Signed 32-bit integer
    Int32(i32),
    /// Signed 64-bit integer
    Int64(i64),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// `float`
    Float32(f32),
    /// `double`
    Float64(f64),
    /// UTF-8 string
    String(String),
    /// Byte string
    Bytes(Bytes),
    /// Enum number
    Enum(EnumNumber),
    /// Nested message
    Message(MessageValue),
    /// Snapshot of a repeated field
    List(Vec<Value>),
    /// Snapshot of a map field
    Map(HashMap<MapKey, Value>),
}

impl Value {
    /// Zero value for a singular field of the given kind.
    ///
    /// Message kinds have no zero without a concrete record type and yield
    /// [`Value::Null`].
    pub fn zero_for(kind: Kind) -> Value {
        match kind.class() {
            ValueClass::Bool => Value::Bool(false),
            ValueClass::Int32 => Value::Int32(0),
            ValueClass::Int64 => Value::Int64(0),
            ValueClass::Uint32 => Value::Uint32(0),
            ValueClass::Uint64 => Value::Uint64(0),
            ValueClass::Float32 => Value::Float32(0.0),
            ValueClass::Float64 => Value::Float64(0.0),
            ValueClass::String => Value::String(String::new()),
            ValueClass::Bytes => Value::Bytes(Bytes::new()),
            ValueClass::Enum => Value::Enum(EnumNumber(0)),
            ValueClass::Message => Value::Null,
        }
    }

    /// Class of a singular value; `None` for null, lists and maps
    pub fn class(&self) -> Option<ValueClass> {
        Some(match self {
            Value::Bool(_) => ValueClass::Bool,
            Value::Int32(_) => ValueClass::Int32,
            Value::Int64(_) => ValueClass::Int64,
            Value::Uint32(_) => ValueClass::Uint32,
            Value::Uint64(_) => ValueClass::Uint64,
            Value::Float32(_) => ValueClass::Float32,
            Value::Float64(_) => ValueClass::Float64,
            Value::String(_) => ValueClass::String,
            Value::Bytes(_) => ValueClass::Bytes,
            Value::Enum(_) => ValueClass::Enum,
            Value::Message(_) => ValueClass::Message,
            Value::Null | Value::List(_) | Value::Map(_) => return None,
        })
    }

    /// Check if value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as i32.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int32(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as u32.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::Uint32(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as u64.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Uint64(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as f32.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Float32(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Try to get as bytes.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Try to get as enum number.
    pub fn as_enum(&self) -> Option<EnumNumber> {
        match self {
            Self::Enum(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as message.
    pub fn as_message(&self) -> Option<&MessageValue> {
        match self {
            Self::Message(v) => Some(v),
            _ => None,
        }
    }

    /// Try to get as list snapshot.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    /// Try to get as map snapshot.
    pub fn as_map(&self) -> Option<&HashMap<MapKey, Value>> {
        match self {
            Self::Map(v) => Some(v),
            _ => None,
        }
    }

    /// Converts a value of a key class into a map key
    pub fn to_map_key(&self) -> Option<MapKey> {
        match self {
            Self::Bool(v) => Some(MapKey::Bool(*v)),
            Self::Int32(v) => Some(MapKey::Int32(*v)),
            Self::Int64(v) => Some(MapKey::Int64(*v)),
            Self::Uint32(v) => Some(MapKey::Uint32(*v)),
            Self::Uint64(v) => Some(MapKey::Uint64(*v)),
            Self::String(v) => Some(MapKey::String(v.clone())),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Uint32(a), Value::Uint32(b)) => a == b,
            (Value::Uint64(a), Value::Uint64(b)) => a == b,
            (Value::Float32(a), Value::Float32(b)) => a.to_bits() == b.to_bits(),
            (Value::Float64(a), Value::Float64(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Message(a), Value::Message(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Value::Int32(v) => f.debug_tuple("Int32").field(v).finish(),
            Value::Int64(v) => f.debug_tuple("Int64").field(v).finish(),
            Value::Uint32(v) => f.debug_tuple("Uint32").field(v).finish(),
            Value::Uint64(v) => f.debug_tuple("Uint64").field(v).finish(),
            Value::Float32(v) => f.debug_tuple("Float32").field(v).finish(),
            Value::Float64(v) => f.debug_tuple("Float64").field(v).finish(),
            Value::String(v) => f.debug_tuple("String").field(v).finish(),
            Value::Bytes(v) => f.debug_tuple("Bytes").field(v).finish(),
            Value::Enum(v) => f.debug_tuple("Enum").field(&v.0).finish(),
            Value::Message(v) => fmt::Debug::fmt(v, f),
            Value::List(v) => f.debug_tuple("List").field(v).finish(),
            Value::Map(v) => f.debug_tuple("Map").field(v).finish(),
        }
    }
}

macro_rules! impl_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

impl_value_from! {
    bool => Bool,
    i32 => Int32,
    i64 => Int64,
    u32 => Uint32,
    u64 => Uint64,
    f32 => Float32,
    f64 => Float64,
    String => String,
    Bytes => Bytes,
    EnumNumber => Enum,
    MessageValue => Message,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<&'static [u8]> for Value {
    fn from(value: &'static [u8]) -> Self {
        Value::Bytes(Bytes::from_static(value))
    }
}

/// Key of a map field
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapKey {
    /// `bool` key
    Bool(bool),
    /// Signed 32-bit key
    Int32(i32),
    /// Signed 64-bit key
    Int64(i64),
    /// Unsigned 32-bit key
    Uint32(u32),
    /// Unsigned 64-bit key
    Uint64(u64),
    /// String key
    String(String),
}

impl MapKey {
    /// Converts the key into an equivalent value
    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Bool(v) => Value::Bool(*v),
            MapKey::Int32(v) => Value::Int32(*v),
            MapKey::Int64(v) => Value::Int64(*v),
            MapKey::Uint32(v) => Value::Uint32(*v),
            MapKey::Uint64(v) => Value::Uint64(*v),
            MapKey::String(v) => Value::String(v.clone()),
        }
    }

    /// Class of the key
    pub fn class(&self) -> ValueClass {
        match self {
            MapKey::Bool(_) => ValueClass::Bool,
            MapKey::Int32(_) => ValueClass::Int32,
            MapKey::Int64(_) => ValueClass::Int64,
            MapKey::Uint32(_) => ValueClass::Uint32,
            MapKey::Uint64(_) => ValueClass::Uint64,
            MapKey::String(_) => ValueClass::String,
        }
    }
}

impl From<&str> for MapKey {
    fn from(value: &str) -> Self {
        MapKey::String(value.to_string())
    }
}

/// An owned, type-erased message stored inside a [`Value`]
pub struct MessageValue(Box<dyn Message>);

impl MessageValue {
    /// Wraps a concrete record
    pub fn new<M: Record>(message: M) -> Self {
        Self(Box::new(message))
    }

    /// Wraps an already boxed message
    pub fn from_box(message: Box<dyn Message>) -> Self {
        Self(message)
    }

    /// Borrows the message
    pub fn as_message(&self) -> &dyn Message {
        self.0.as_ref()
    }

    /// Mutably borrows the message
    pub fn as_message_mut(&mut self) -> &mut dyn Message {
        self.0.as_mut()
    }

    /// Borrows the message as a concrete record type
    pub fn downcast_ref<M: Record>(&self) -> Option<&M> {
        self.0.as_any().downcast_ref::<M>()
    }

    /// Takes the message out as a concrete record type
    pub fn downcast<M: Record>(self) -> Result<M, Self> {
        if !self.0.as_any().is::<M>() {
            return Err(self);
        }
        match self.0.into_any().downcast::<M>() {
            Ok(message) => Ok(*message),
            Err(_) => unreachable!("type checked above"),
        }
    }

    /// Unwraps the boxed message
    pub fn into_inner(self) -> Box<dyn Message> {
        self.0
    }
}

impl Clone for MessageValue {
    fn clone(&self) -> Self {
        Self(self.0.clone_message())
    }
}

impl PartialEq for MessageValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_message(other.0.as_ref())
    }
}

impl fmt::Debug for MessageValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Message").field(&self.0).finish()
    }
}

/// A Rust type that stores one value of a field
pub trait ProtoValue: Clone + Send + Sync + 'static {
    /// Class of values this type holds
    const CLASS: ValueClass;

    /// Converts to a reflective value
    fn to_value(&self) -> Value;

    /// Converts from a reflective value, handing it back on a class mismatch
    fn from_value(value: Value) -> Result<Self, Value>;

    /// The zero value
    fn zero() -> Self;

    /// Returns true for the zero value, comparing floats by bit pattern
    fn is_zero(&self) -> bool;

    /// Borrows the nested message, for message-valued types
    fn as_message_mut(&mut self) -> Option<&mut dyn Message> {
        None
    }

    /// Full name of the stored message type, for message-valued types
    fn message_name() -> Option<String> {
        None
    }
}

macro_rules! impl_proto_value {
    ($($ty:ty => $variant:ident, |$v:ident| $is_zero:expr;)*) => {
        $(
            impl ProtoValue for $ty {
                const CLASS: ValueClass = ValueClass::$variant;

                fn to_value(&self) -> Value {
                    Value::$variant(self.clone())
                }

                fn from_value(value: Value) -> Result<Self, Value> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(other),
                    }
                }

                fn zero() -> Self {
                    Default::default()
                }

                fn is_zero(&self) -> bool {
                    let $v = self;
                    $is_zero
                }
            }
        )*
    };
}

impl_proto_value! {
    bool => Bool, |v| !*v;
    i32 => Int32, |v| *v == 0;
    i64 => Int64, |v| *v == 0;
    u32 => Uint32, |v| *v == 0;
    u64 => Uint64, |v| *v == 0;
    f32 => Float32, |v| v.to_bits() == 0;
    f64 => Float64, |v| v.to_bits() == 0;
    String => String, |v| v.is_empty();
    Bytes => Bytes, |v| v.is_empty();
    EnumNumber => Enum, |v| v.0 == 0;
}

impl<M: Record> ProtoValue for Box<M> {
    const CLASS: ValueClass = ValueClass::Message;

    fn to_value(&self) -> Value {
        Value::Message(MessageValue::new(M::clone(self)))
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Message(message) => message
                .downcast::<M>()
                .map(Box::new)
                .map_err(Value::Message),
            other => Err(other),
        }
    }

    fn zero() -> Self {
        Box::default()
    }

    fn is_zero(&self) -> bool {
        false
    }

    fn as_message_mut(&mut self) -> Option<&mut dyn Message> {
        Some(&mut **self)
    }

    // Never forces M's binder, which may be the one being classified.
    fn message_name() -> Option<String> {
        M::message_type()
            .descriptor()
            .cloned()
            .or_else(M::descriptor)
            .map(|desc| desc.full_name().to_string())
    }
}

/// A Rust type usable as a map key
pub trait ProtoMapKey: Eq + Hash + Clone + Send + Sync + 'static {
    /// Class of keys this type holds
    const CLASS: ValueClass;

    /// Converts to a reflective key
    fn to_key(&self) -> MapKey;

    /// Converts from a reflective key of the same class
    fn from_key(key: &MapKey) -> Option<Self>;
}

macro_rules! impl_proto_map_key {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ProtoMapKey for $ty {
                const CLASS: ValueClass = ValueClass::$variant;

                fn to_key(&self) -> MapKey {
                    MapKey::$variant(self.clone())
                }

                fn from_key(key: &MapKey) -> Option<Self> {
                    match key {
                        MapKey::$variant(v) => Some(v.clone()),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_proto_map_key! {
    bool => Bool,
    i32 => Int32,
    i64 => Int64,
    u32 => Uint32,
    u64 => Uint64,
    String => String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_float_values_compare_by_bits() {
        assert_eq!(Value::Float64(f64::NAN), Value::Float64(f64::NAN));
        assert_ne!(Value::Float32(0.0), Value::Float32(-0.0));
        assert_ne!(Value::Int32(1), Value::Int64(1));
    }

    #[test]
    fn test_zero_values() {
        assert_eq!(Value::zero_for(Kind::Sint32), Value::Int32(0));
        assert_eq!(Value::zero_for(Kind::Bytes), Value::Bytes(Bytes::new()));
        assert_eq!(Value::zero_for(Kind::Message), Value::Null);
        assert!(f32::zero().to_bits() == 0);
        assert!(!(-0.0f64).is_zero());
        assert!(EnumNumber(0).is_zero());
    }

    #[test]
    fn test_proto_value_conversion() {
        assert_eq!(u64::from_value(Value::Uint64(9)), Ok(9));
        assert_eq!(
            i32::from_value(Value::String("x".into())),
            Err(Value::String("x".into()))
        );
        assert_eq!(String::from("hi").to_value(), Value::from("hi"));
    }

    #[test]
    fn test_map_keys() {
        assert_eq!(Value::Uint32(3).to_map_key(), Some(MapKey::Uint32(3)));
        assert_eq!(Value::Float32(1.0).to_map_key(), None);
        assert_eq!(MapKey::from("k").to_value(), Value::from("k"));
        assert_eq!(i64::from_key(&MapKey::Int64(-4)), Some(-4));
        assert_eq!(i64::from_key(&MapKey::Int32(-4)), None);
        assert_eq!(true.to_key().class(), ValueClass::Bool);
    }

    #[test]
    fn test_accessors() {
        let value = Value::List(vec![Value::Enum(EnumNumber(2))]);
        assert_eq!(value.as_list().map(<[Value]>::len), Some(1));
        assert_eq!(value.as_list().and_then(|l| l[0].as_enum()), Some(EnumNumber(2)));
        assert!(Value::Null.is_null());
        assert_eq!(Value::default().class(), None);
    }
}
