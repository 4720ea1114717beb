//! Field locators.
//!
//! An [`Offset`] addresses one storage slot inside a record type through a
//! pair of projection functions. Applying an offset to a [`Pointer`] or
//! [`PointerMut`] that addresses a record yields a pointer to the slot, and
//! [`Pointer::as_type`] views the slot as its concrete storage type.
//!
//! Offsets are produced by [`offset_of!`](crate::offset_of), which only
//! accepts a named field of the record itself, so a locator never reaches
//! into a nested struct.

use std::any::{type_name, Any};
use std::fmt;
use std::marker::PhantomData;

type Project = fn(&dyn Any) -> Option<&dyn Any>;
type ProjectMut = fn(&mut dyn Any) -> Option<&mut dyn Any>;

/// Location of one field within a record type
#[derive(Clone, Copy)]
pub struct Offset {
    name: &'static str,
    parent: &'static str,
    target: &'static str,
    get: Project,
    get_mut: ProjectMut,
}

impl Offset {
    /// Creates an offset from a pair of projections.
    ///
    /// Prefer [`offset_of!`](crate::offset_of), which derives both
    /// projections from a field name.
    pub fn new(name: &'static str, parent: &'static str, get: Project, get_mut: ProjectMut) -> Self {
        Self {
            name,
            parent,
            target: "?",
            get,
            get_mut,
        }
    }

    /// Name of the addressed field
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name of the record that owns the field
    pub fn parent(&self) -> &'static str {
        self.parent
    }

    /// Type name of the field's storage
    pub fn target(&self) -> &'static str {
        self.target
    }
}

impl fmt::Debug for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Offset")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("target", &self.target)
            .finish()
    }
}

/// An [`Offset`] whose storage type is known statically
pub struct FieldOffset<S> {
    offset: Offset,
    _storage: PhantomData<fn() -> S>,
}

impl<S: Any> FieldOffset<S> {
    /// Types an offset with the storage type returned by `witness`
    pub fn new<R, F>(mut offset: Offset, _witness: F) -> Self
    where
        R: Any,
        F: Fn(&R) -> &S,
    {
        offset.target = type_name::<S>();
        Self {
            offset,
            _storage: PhantomData,
        }
    }

    /// The untyped offset
    pub fn offset(&self) -> Offset {
        self.offset
    }
}

impl<S> Clone for FieldOffset<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for FieldOffset<S> {}

impl<S> fmt::Debug for FieldOffset<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.offset, f)
    }
}

/// Builds a [`FieldOffset`] for a named field of a record type.
///
/// ```
/// use protomirror_core::offset_of;
///
/// #[derive(Default)]
/// struct Point {
///     x: Option<i32>,
/// }
///
/// let offset = offset_of!(Point, x);
/// assert_eq!(offset.offset().name(), "x");
/// ```
#[macro_export]
macro_rules! offset_of {
    ($record:ty, $field:ident) => {
        $crate::pointer::FieldOffset::new(
            $crate::pointer::Offset::new(
                ::std::stringify!($field),
                ::std::any::type_name::<$record>(),
                |record| {
                    record
                        .downcast_ref::<$record>()
                        .map(|r| &r.$field as &dyn ::std::any::Any)
                },
                |record| {
                    record
                        .downcast_mut::<$record>()
                        .map(|r| &mut r.$field as &mut dyn ::std::any::Any)
                },
            ),
            |r: &$record| &r.$field,
        )
    };
}

/// Shared pointer to a record or one of its slots
#[derive(Clone, Copy)]
pub struct Pointer<'a> {
    value: &'a dyn Any,
    type_name: &'static str,
}

impl<'a> Pointer<'a> {
    /// Points at a value
    pub fn of<T: Any>(value: &'a T) -> Self {
        Self {
            value,
            type_name: type_name::<T>(),
        }
    }

    pub(crate) fn from_dyn(value: &'a dyn Any, type_name: &'static str) -> Self {
        Self { value, type_name }
    }

    /// Moves the pointer to the slot addressed by `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the pointee is not the record type that owns the offset.
    pub fn apply(self, offset: &Offset) -> Pointer<'a> {
        match (offset.get)(self.value) {
            Some(value) => Pointer {
                value,
                type_name: offset.target,
            },
            None => panic!(
                "cannot apply offset {}::{} to {}",
                offset.parent, offset.name, self.type_name
            ),
        }
    }

    /// Views the pointee as `T`.
    ///
    /// # Panics
    ///
    /// Panics with "invalid type" if the pointee is not a `T`.
    pub fn as_type<T: Any>(self) -> &'a T {
        match self.value.downcast_ref::<T>() {
            Some(value) => value,
            None => panic!("invalid type: got {}, want {}", self.type_name, type_name::<T>()),
        }
    }

    /// Type name of the pointee
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Pointer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pointer").field(&self.type_name).finish()
    }
}

/// Exclusive pointer to a record or one of its slots
pub struct PointerMut<'a> {
    value: &'a mut dyn Any,
    type_name: &'static str,
}

impl<'a> PointerMut<'a> {
    /// Points at a value
    pub fn of<T: Any>(value: &'a mut T) -> Self {
        Self {
            value,
            type_name: type_name::<T>(),
        }
    }

    pub(crate) fn from_dyn(value: &'a mut dyn Any, type_name: &'static str) -> Self {
        Self { value, type_name }
    }

    /// Moves the pointer to the slot addressed by `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the pointee is not the record type that owns the offset.
    pub fn apply(self, offset: &Offset) -> PointerMut<'a> {
        let PointerMut { value, type_name } = self;
        match (offset.get_mut)(value) {
            Some(value) => PointerMut {
                value,
                type_name: offset.target,
            },
            None => panic!(
                "cannot apply offset {}::{} to {}",
                offset.parent, offset.name, type_name
            ),
        }
    }

    /// Views the pointee as `T`.
    ///
    /// # Panics
    ///
    /// Panics with "invalid type" if the pointee is not a `T`.
    pub fn as_type<T: Any>(self) -> &'a mut T {
        let PointerMut { value, type_name: actual } = self;
        match value.downcast_mut::<T>() {
            Some(value) => value,
            None => panic!("invalid type: got {}, want {}", actual, type_name::<T>()),
        }
    }

    /// Reborrows for a shorter lifetime
    pub fn reborrow(&mut self) -> PointerMut<'_> {
        PointerMut {
            value: &mut *self.value,
            type_name: self.type_name,
        }
    }

    /// Shared view of the same pointee
    pub fn as_shared(&self) -> Pointer<'_> {
        Pointer {
            value: &*self.value,
            type_name: self.type_name,
        }
    }

    /// Type name of the pointee
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for PointerMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PointerMut").field(&self.type_name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default)]
    struct Sample {
        id: Option<i64>,
        tags: Vec<String>,
    }

    #[derive(Debug, Default)]
    struct Other {
        id: Option<i64>,
    }

    #[test]
    fn test_apply_and_view() {
        let sample = Sample {
            id: Some(7),
            tags: vec!["a".into()],
        };
        let id = crate::offset_of!(Sample, id);
        let tags = crate::offset_of!(Sample, tags);

        let ptr = Pointer::of(&sample);
        assert_eq!(ptr.apply(&id.offset()).as_type::<Option<i64>>(), &Some(7));
        assert_eq!(ptr.apply(&tags.offset()).as_type::<Vec<String>>().len(), 1);
        assert_eq!(tags.offset().target(), type_name::<Vec<String>>());
    }

    #[test]
    fn test_apply_mut() {
        let mut sample = Sample::default();
        let tags = crate::offset_of!(Sample, tags).offset();

        PointerMut::of(&mut sample)
            .apply(&tags)
            .as_type::<Vec<String>>()
            .push("x".into());
        assert_eq!(sample.tags, vec!["x".to_string()]);
    }

    #[test]
    #[should_panic(expected = "invalid type")]
    fn test_as_type_mismatch() {
        let sample = Sample::default();
        let id = crate::offset_of!(Sample, id).offset();
        Pointer::of(&sample).apply(&id).as_type::<Option<i32>>();
    }

    #[test]
    #[should_panic(expected = "cannot apply offset")]
    fn test_apply_to_wrong_record() {
        let other = Other::default();
        let id = crate::offset_of!(Sample, id).offset();
        Pointer::of(&other).apply(&id);
    }
}
