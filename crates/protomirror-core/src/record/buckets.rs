//! Reserved record buckets: unknown fields, extensions, weak fields and the
//! cached encoded size.

use crate::error::{Error, Result};
use crate::wire;
use crate::{FieldNumber, MAX_FIELD_NUMBER};
use bytes::{Bytes, BytesMut};
use std::collections::btree_map::{self, BTreeMap};
use std::sync::atomic::{AtomicI32, Ordering};

/// Wire-encoded occurrences of one field, tags included
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFields(Bytes);

impl RawFields {
    /// Wraps raw bytes, checking that every field they contain is `number`.
    ///
    /// Empty input is accepted and means "no occurrences".
    pub fn new(number: FieldNumber, bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        for (found, _) in wire::split_fields(&bytes)? {
            if found != number {
                return Err(Error::RawFieldMismatch {
                    expected: number,
                    found,
                });
            }
        }
        Ok(Self(bytes))
    }

    /// The raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Cheap clone of the underlying buffer
    pub fn bytes(&self) -> Bytes {
        self.0.clone()
    }

    /// Byte length
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no occurrences are stored
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unwraps the underlying buffer
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    fn append(&mut self, more: &[u8]) {
        let mut buf = BytesMut::with_capacity(self.0.len() + more.len());
        buf.extend_from_slice(&self.0);
        buf.extend_from_slice(more);
        self.0 = buf.freeze();
    }
}

/// Fields present on the wire but not declared by the message.
///
/// Entries are keyed by field number and iterate in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnknownFields {
    fields: BTreeMap<FieldNumber, RawFields>,
}

impl UnknownFields {
    /// Creates an empty bucket
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct field numbers stored
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Raw bytes stored for `number`
    pub fn get(&self, number: FieldNumber) -> Option<&RawFields> {
        self.fields.get(&number)
    }

    /// Stores raw bytes for `number`, replacing any previous entry.
    ///
    /// Empty raw bytes remove the entry.
    pub fn set(&mut self, number: FieldNumber, raw: RawFields) -> Result<()> {
        check_number(number)?;
        if raw.is_empty() {
            self.fields.remove(&number);
        } else {
            self.fields.insert(number, raw);
        }
        Ok(())
    }

    /// Removes and returns the entry for `number`
    pub fn remove(&mut self, number: FieldNumber) -> Option<RawFields> {
        self.fields.remove(&number)
    }

    /// Iterates entries in ascending field-number order
    pub fn iter(&self) -> btree_map::Iter<'_, FieldNumber, RawFields> {
        self.fields.iter()
    }

    /// Removes every entry
    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// Appends a buffer of encoded fields, filing each under its number.
    ///
    /// The buffer is validated as a whole first; on error nothing is stored.
    pub fn append_wire(&mut self, data: &[u8]) -> Result<()> {
        let fields = wire::split_fields(data)?;
        for (number, bytes) in fields {
            self.fields.entry(number).or_default().append(bytes);
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a UnknownFields {
    type Item = (&'a FieldNumber, &'a RawFields);
    type IntoIter = btree_map::Iter<'a, FieldNumber, RawFields>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn check_number(number: FieldNumber) -> Result<()> {
    if number == 0 || number > MAX_FIELD_NUMBER {
        return Err(Error::InvalidFieldNumber {
            number,
            max: MAX_FIELD_NUMBER,
        });
    }
    Ok(())
}

/// Raw storage for extension fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionFields(UnknownFields);

impl ExtensionFields {
    /// The underlying raw bucket
    pub fn raw(&self) -> &UnknownFields {
        &self.0
    }

    /// Mutable access to the underlying raw bucket
    pub fn raw_mut(&mut self) -> &mut UnknownFields {
        &mut self.0
    }
}

/// Raw storage for weak fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeakFields(UnknownFields);

impl WeakFields {
    /// The underlying raw bucket
    pub fn raw(&self) -> &UnknownFields {
        &self.0
    }

    /// Mutable access to the underlying raw bucket
    pub fn raw_mut(&mut self) -> &mut UnknownFields {
        &mut self.0
    }
}

/// Cached encoded size of a record; `-1` when unknown.
///
/// Never affects equality.
#[derive(Debug)]
pub struct SizeCache(AtomicI32);

impl SizeCache {
    /// The cached size, if any
    pub fn load(&self) -> Option<usize> {
        usize::try_from(self.0.load(Ordering::Relaxed)).ok()
    }

    /// Records a computed size; sizes beyond `i32::MAX` are not cached
    pub fn store(&self, size: usize) {
        let size = i32::try_from(size).unwrap_or(-1);
        self.0.store(size, Ordering::Relaxed);
    }

    /// Forgets the cached size
    pub fn invalidate(&self) {
        self.0.store(-1, Ordering::Relaxed);
    }
}

impl Default for SizeCache {
    fn default() -> Self {
        Self(AtomicI32::new(-1))
    }
}

impl Clone for SizeCache {
    fn clone(&self) -> Self {
        Self(AtomicI32::new(self.0.load(Ordering::Relaxed)))
    }
}

impl PartialEq for SizeCache {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_raw_fields_checks_number() {
        // field 3, varint 1, twice
        let raw = RawFields::new(3, vec![0x18, 0x01, 0x18, 0x02]).unwrap();
        assert_eq!(raw.len(), 4);

        let err = RawFields::new(4, vec![0x18, 0x01]).unwrap_err();
        assert!(matches!(
            err,
            Error::RawFieldMismatch {
                expected: 4,
                found: 3
            }
        ));
        assert!(RawFields::new(3, vec![0x18]).is_err());
        assert!(RawFields::new(3, Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_fields_set_and_remove() {
        let mut unknown = UnknownFields::new();
        unknown
            .set(9, RawFields::new(9, vec![0x48, 0x07]).unwrap())
            .unwrap();
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown.get(9).map(RawFields::as_bytes), Some(&[0x48, 0x07][..]));

        unknown.set(9, RawFields::default()).unwrap();
        assert!(unknown.is_empty());
        assert!(unknown.set(0, RawFields::default()).is_err());
    }

    #[test]
    fn test_append_wire_groups_by_number() {
        let mut unknown = UnknownFields::new();
        unknown
            .append_wire(&[0x10, 0x01, 0x08, 0x05, 0x10, 0x02])
            .unwrap();
        let numbers: Vec<_> = unknown.iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(unknown.get(2).unwrap().as_bytes(), &[0x10, 0x01, 0x10, 0x02]);

        // truncated trailing field leaves the bucket untouched
        let before = unknown.clone();
        assert!(unknown.append_wire(&[0x18, 0x01, 0x20]).is_err());
        assert_eq!(unknown, before);
    }

    #[test]
    fn test_size_cache() {
        let cache = SizeCache::default();
        assert_eq!(cache.load(), None);
        cache.store(42);
        assert_eq!(cache.clone().load(), Some(42));
        cache.invalidate();
        assert_eq!(cache.load(), None);
        assert_eq!(cache, SizeCache::default());
    }
}
