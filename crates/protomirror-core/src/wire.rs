//! Low-level protobuf wire format scanning.
//!
//! The reflection runtime never decodes field values from the wire; it only
//! needs to find field boundaries so raw unknown-field bytes can be filed
//! under the right field number and validated.
//!
//! ## Wire Format Overview
//!
//! Each protobuf field is encoded as:
//! - A varint "tag" containing the field number and wire type
//! - The field data (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages, packed repeated fields)
//! - 3/4: SGROUP/EGROUP (delimited group, nested fields until the end tag)
//! - 5: I32 (fixed32, sfixed32, float)

use crate::error::{Error, Result};
use crate::{FieldNumber, MAX_FIELD_NUMBER};

/// Groups nested deeper than this are rejected
const MAX_GROUP_DEPTH: usize = 100;

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    I64 = 1,
    /// Length-delimited (strings, bytes, embedded messages)
    Len = 2,
    /// Start group (deprecated)
    StartGroup = 3,
    /// End group (deprecated)
    EndGroup = 4,
    /// 32-bit fixed-width
    I32 = 5,
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::I64),
            2 => Ok(WireType::Len),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::I32),
            _ => Err(Error::invalid_wire_format(
                0,
                format!("unknown wire type: {}", value),
            )),
        }
    }
}

/// Decode a varint from the given bytes.
///
/// Returns the decoded value and the number of bytes consumed.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut result: u64 = 0;
    let mut shift = 0;

    for (i, &byte) in data.iter().enumerate() {
        if i >= 10 {
            // Varints are at most 10 bytes for a 64-bit value
            return Err(Error::varint_decode(i));
        }

        result |= ((byte & 0x7F) as u64) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }

    Err(Error::varint_decode(data.len()))
}

/// Decode a field tag, returning number, wire type and tag length.
pub fn decode_tag(data: &[u8]) -> Result<(FieldNumber, WireType, usize)> {
    if data.is_empty() {
        return Err(Error::invalid_wire_format(0, "empty data"));
    }

    let (tag, tag_len) = decode_varint(data)
        .map_err(|_| Error::invalid_wire_format(0, "failed to decode field tag"))?;

    let wire_type = WireType::try_from((tag & 0x07) as u8)?;
    let field_number = tag >> 3;

    if field_number == 0 || field_number > MAX_FIELD_NUMBER as u64 {
        return Err(Error::InvalidFieldNumber {
            number: field_number.min(u32::MAX as u64) as u32,
            max: MAX_FIELD_NUMBER,
        });
    }

    Ok((field_number as u32, wire_type, tag_len))
}

/// Consume a single protobuf field from the data.
///
/// Returns the field number and total bytes consumed (including tag and value).
/// A group is consumed through its matching end tag.
pub fn consume_field(data: &[u8]) -> Result<(FieldNumber, usize)> {
    consume_field_at_depth(data, 0)
}

fn consume_field_at_depth(data: &[u8], depth: usize) -> Result<(FieldNumber, usize)> {
    let (field_number, wire_type, tag_len) = decode_tag(data)?;

    let value_len = match wire_type {
        WireType::Varint => {
            let remaining = &data[tag_len..];
            let (_, varint_len) = decode_varint(remaining).map_err(|_| {
                Error::invalid_wire_format(tag_len, "failed to decode varint value")
            })?;
            varint_len
        }
        WireType::I64 => {
            if data.len() < tag_len + 8 {
                return Err(Error::invalid_wire_format(
                    tag_len,
                    "not enough bytes for I64",
                ));
            }
            8
        }
        WireType::Len => {
            let remaining = &data[tag_len..];
            let (length, length_varint_len) = decode_varint(remaining).map_err(|_| {
                Error::invalid_wire_format(tag_len, "failed to decode length prefix")
            })?;

            let available = data.len() - tag_len - length_varint_len;
            if length > available as u64 {
                return Err(Error::invalid_wire_format(
                    tag_len,
                    format!(
                        "not enough bytes for LEN field (need {}, have {})",
                        length, available
                    ),
                ));
            }
            length_varint_len + length as usize
        }
        WireType::StartGroup => {
            if depth >= MAX_GROUP_DEPTH {
                return Err(Error::invalid_wire_format(0, "groups nested too deeply"));
            }
            let mut position = tag_len;
            loop {
                let rest = &data[position..];
                if rest.is_empty() {
                    return Err(Error::invalid_wire_format(
                        position,
                        format!("unterminated group {}", field_number),
                    ));
                }
                let (number, inner_type, inner_tag_len) = decode_tag(rest)
                    .map_err(|err| offset_error(err, position))?;
                if inner_type == WireType::EndGroup {
                    if number != field_number {
                        return Err(Error::invalid_wire_format(
                            position,
                            format!("group {} closed by end tag {}", field_number, number),
                        ));
                    }
                    position += inner_tag_len;
                    break;
                }
                let (_, inner_len) = consume_field_at_depth(rest, depth + 1)
                    .map_err(|err| offset_error(err, position))?;
                position += inner_len;
            }
            position - tag_len
        }
        WireType::EndGroup => {
            return Err(Error::invalid_wire_format(
                0,
                format!("unexpected end group {}", field_number),
            ));
        }
        WireType::I32 => {
            if data.len() < tag_len + 4 {
                return Err(Error::invalid_wire_format(
                    tag_len,
                    "not enough bytes for I32",
                ));
            }
            4
        }
    };

    Ok((field_number, tag_len + value_len))
}

/// Split a buffer into its top-level fields.
///
/// Returns each field's number together with its complete encoding
/// (tag and value). Fails on the first malformed field.
pub fn split_fields(data: &[u8]) -> Result<Vec<(FieldNumber, &[u8])>> {
    let mut fields = Vec::new();
    let mut position = 0;

    while position < data.len() {
        let (number, len) =
            consume_field(&data[position..]).map_err(|err| offset_error(err, position))?;
        fields.push((number, &data[position..position + len]));
        position += len;
    }

    Ok(fields)
}

fn offset_error(err: Error, base: usize) -> Error {
    match err {
        Error::InvalidWireFormat { offset, details } => Error::InvalidWireFormat {
            offset: base + offset,
            details,
        },
        Error::VarintDecode { offset } => Error::VarintDecode {
            offset: base + offset,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_varint_single_byte() {
        let data = [0x08]; // Value 8
        let (value, len) = decode_varint(&data).unwrap();
        assert_eq!(value, 8);
        assert_eq!(len, 1);
    }

    #[test]
    fn test_decode_varint_multi_byte() {
        let data = [0xAC, 0x02]; // Value 300
        let (value, len) = decode_varint(&data).unwrap();
        assert_eq!(value, 300);
        assert_eq!(len, 2);
    }

    #[test]
    fn test_wire_type_conversion() {
        assert_eq!(WireType::try_from(0).unwrap(), WireType::Varint);
        assert_eq!(WireType::try_from(3).unwrap(), WireType::StartGroup);
        assert!(WireType::try_from(6).is_err());
    }

    #[test]
    fn test_consume_len_field() {
        // Field 1, wire type 2 (len), length 5, "hello"
        let data = [0x0A, 0x05, b'h', b'e', b'l', b'l', b'o'];
        let (field_num, len) = consume_field(&data).unwrap();
        assert_eq!(field_num, 1);
        assert_eq!(len, 7);
    }

    #[test]
    fn test_consume_truncated_len_field() {
        let data = [0x0A, 0x05, b'h', b'e'];
        assert!(matches!(
            consume_field(&data),
            Err(Error::InvalidWireFormat { .. })
        ));
    }

    #[test]
    fn test_consume_group() {
        // Group 2 { field 1 varint 5 } end group 2, then field 3 varint
        let data = [0x13, 0x08, 0x05, 0x14, 0x18, 0x01];
        let (field_num, len) = consume_field(&data).unwrap();
        assert_eq!(field_num, 2);
        assert_eq!(len, 4);
    }

    #[test]
    fn test_mismatched_group_end() {
        // Group 2 closed by end tag 3
        let data = [0x13, 0x08, 0x05, 0x1C];
        assert!(consume_field(&data).is_err());
        // Stray end tag
        assert!(consume_field(&[0x14]).is_err());
    }

    #[test]
    fn test_split_fields() {
        let data = [0x08, 0x96, 0x01, 0x0D, 0x01, 0x02, 0x03, 0x04, 0x08, 0x01];
        let fields = split_fields(&data).unwrap();
        let numbers: Vec<_> = fields.iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, vec![1, 1, 1]);
        assert_eq!(fields[1].1, &data[3..8]);
    }

    #[test]
    fn test_split_fields_reports_offset() {
        let data = [0x08, 0x01, 0x0A, 0x09, 0x00];
        match split_fields(&data) {
            Err(Error::InvalidWireFormat { offset, .. }) => assert_eq!(offset, 3),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_field_number() {
        // Field 0 is invalid
        let data = [0x00, 0x01];
        assert!(consume_field(&data).is_err());
    }
}
