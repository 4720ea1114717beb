//! Conversion from `FileDescriptorProto` into the descriptor model.
//!
//! The conversion:
//!
//! 1. Parses raw bytes into a `FileDescriptorProto` (or a set of them)
//! 2. Optionally cross-checks the file with prost-reflect's resolver
//! 3. Walks messages, enums, extensions and services into builders
//!
//! Map fields are recognized through their synthesized `*Entry` nested
//! message, proto3 `optional` fields through `proto3_optional` (their
//! synthetic oneof is dropped) and textual defaults are parsed per kind.

use super::{
    join_name, Cardinality, EnumDescriptor, FieldDescriptor, FileDescriptor, Kind,
    MessageDescriptor, MethodDescriptor, ServiceDescriptor, Syntax,
};
use crate::error::{Error, Result};
use crate::value::{EnumNumber, Value};
use bytes::Bytes;
use prost::Message as _;
use prost_reflect::DescriptorPool;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto,
    FileDescriptorSet, OneofDescriptorProto, ServiceDescriptorProto,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace, warn};

/// Options for loading descriptors from their serialized form
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Cross-check each file with prost-reflect before converting
    pub validate_with_pool: bool,
    /// Give proto2 enum fields without a declared default the first value
    pub resolve_enum_defaults: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            validate_with_pool: false,
            resolve_enum_defaults: true,
        }
    }
}

impl LoadOptions {
    /// Creates options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to validate with prost-reflect
    pub fn validate_with_pool(mut self, validate: bool) -> Self {
        self.validate_with_pool = validate;
        self
    }

    /// Sets whether to resolve implicit proto2 enum defaults
    pub fn resolve_enum_defaults(mut self, resolve: bool) -> Self {
        self.resolve_enum_defaults = resolve;
        self
    }
}

impl FileDescriptor {
    /// Decodes a serialized `FileDescriptorProto` with default options
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::decode_with(bytes, &LoadOptions::default())
    }

    /// Decodes a serialized `FileDescriptorProto`
    pub fn decode_with(bytes: &[u8], options: &LoadOptions) -> Result<Self> {
        let proto = FileDescriptorProto::decode(bytes)?;
        Self::from_proto_with(&proto, options)
    }

    /// Converts a parsed `FileDescriptorProto` with default options
    pub fn from_proto(proto: &FileDescriptorProto) -> Result<Self> {
        Self::from_proto_with(proto, &LoadOptions::default())
    }

    /// Converts a parsed `FileDescriptorProto`
    pub fn from_proto_with(proto: &FileDescriptorProto, options: &LoadOptions) -> Result<Self> {
        if options.validate_with_pool {
            validate_with_pool(proto)?;
        }
        let enums = collect_enums(std::slice::from_ref(proto));
        Converter::new(proto, options, &enums)?.file(proto)
    }
}

/// Decodes a serialized `FileDescriptorSet` into its files, in set order.
///
/// Enum defaults may refer to enums declared anywhere in the set.
pub fn decode_file_descriptor_set(bytes: &[u8], options: &LoadOptions) -> Result<Vec<FileDescriptor>> {
    let set = FileDescriptorSet::decode(bytes)?;
    if options.validate_with_pool {
        DescriptorPool::decode(bytes).map_err(|e| {
            Error::descriptor_build(format!("failed to decode descriptor pool: {}", e))
        })?;
    }

    let enums = collect_enums(&set.file);
    set.file
        .iter()
        .map(|file| Converter::new(file, options, &enums)?.file(file))
        .collect()
}

/// Resolves the file on its own with prost-reflect
fn validate_with_pool(proto: &FileDescriptorProto) -> Result<()> {
    let fds = FileDescriptorSet {
        file: vec![proto.clone()],
    };

    let mut fds_bytes = Vec::new();
    fds.encode(&mut fds_bytes).map_err(|e| {
        Error::descriptor_build(format!("failed to encode descriptor set: {}", e))
    })?;

    let pool = DescriptorPool::decode(fds_bytes.as_slice()).map_err(|e| {
        Error::descriptor_build(format!("failed to decode descriptor pool: {}", e))
    })?;

    pool.get_file_by_name(proto.name())
        .map(|_| ())
        .ok_or_else(|| Error::descriptor_build("file not found in pool"))
}

/// Enum full name to its values in declaration order
type EnumTable = HashMap<String, Vec<(String, i32)>>;

fn collect_enums(files: &[FileDescriptorProto]) -> EnumTable {
    let mut table = EnumTable::new();
    for file in files {
        let scope = file.package();
        for enumeration in &file.enum_type {
            add_enum(&mut table, enumeration, scope);
        }
        for message in &file.message_type {
            collect_message_enums(&mut table, message, scope);
        }
    }
    table
}

fn collect_message_enums(table: &mut EnumTable, message: &DescriptorProto, scope: &str) {
    let full_name = join_name(scope, message.name());
    for enumeration in &message.enum_type {
        add_enum(table, enumeration, &full_name);
    }
    for nested in &message.nested_type {
        collect_message_enums(table, nested, &full_name);
    }
}

fn add_enum(table: &mut EnumTable, enumeration: &EnumDescriptorProto, scope: &str) {
    let values = enumeration
        .value
        .iter()
        .map(|v| (v.name().to_string(), v.number()))
        .collect();
    table.insert(join_name(scope, enumeration.name()), values);
}

struct Converter<'a> {
    options: &'a LoadOptions,
    syntax: Syntax,
    enums: &'a EnumTable,
}

impl<'a> Converter<'a> {
    fn new(proto: &FileDescriptorProto, options: &'a LoadOptions, enums: &'a EnumTable) -> Result<Self> {
        Ok(Self {
            options,
            syntax: Syntax::try_from(proto.syntax())?,
            enums,
        })
    }

    fn file(&self, proto: &FileDescriptorProto) -> Result<FileDescriptor> {
        let package = proto.package();
        let mut builder = FileDescriptor::builder(proto.name())
            .package(package)
            .syntax(self.syntax);

        for message in &proto.message_type {
            builder = builder.message(self.message(message, package)?);
        }
        for enumeration in &proto.enum_type {
            builder = builder.enumeration(convert_enum(enumeration, package));
        }
        for extension in &proto.extension {
            builder = builder.extension(self.field(extension, package, &HashMap::new(), &[])?);
        }
        for service in &proto.service {
            builder = builder.service(convert_service(service, package));
        }

        let file = builder.build()?;
        debug!(
            path = file.path(),
            package = file.package(),
            syntax = file.syntax().as_str(),
            declarations = file.num_declarations(),
            "Converted file descriptor"
        );
        Ok(file)
    }

    fn message(&self, proto: &DescriptorProto, scope: &str) -> Result<MessageDescriptor> {
        let full_name = join_name(scope, proto.name());

        let map_entries: HashMap<String, &DescriptorProto> = proto
            .nested_type
            .iter()
            .filter(|nested| is_map_entry(nested))
            .map(|nested| (join_name(&full_name, nested.name()), nested))
            .collect();

        // Oneofs that exist only to carry a proto3 `optional` field
        let synthetic: HashSet<i32> = proto
            .field
            .iter()
            .filter(|f| f.proto3_optional())
            .filter_map(|f| f.oneof_index)
            .collect();

        let mut builder = MessageDescriptor::builder(&full_name).syntax(self.syntax);
        if is_map_entry(proto) {
            builder = builder.map_entry();
        }
        for (index, oneof) in proto.oneof_decl.iter().enumerate() {
            if !synthetic.contains(&(index as i32)) {
                builder = builder.oneof(oneof.name());
            }
        }
        for field in &proto.field {
            builder = builder.field(self.field(field, &full_name, &map_entries, &proto.oneof_decl)?);
        }
        for range in &proto.extension_range {
            builder = builder.extension_range(field_number(range.start())..field_number(range.end()));
        }
        for extension in &proto.extension {
            builder = builder.extension(self.field(extension, &full_name, &HashMap::new(), &[])?);
        }
        for nested in &proto.nested_type {
            builder = builder.message(self.message(nested, &full_name)?);
        }
        for enumeration in &proto.enum_type {
            builder = builder.enumeration(convert_enum(enumeration, &full_name));
        }

        trace!(name = %full_name, fields = proto.field.len(), "Converted message");
        builder.build()
    }

    fn field(
        &self,
        proto: &FieldDescriptorProto,
        scope: &str,
        map_entries: &HashMap<String, &DescriptorProto>,
        oneofs: &[OneofDescriptorProto],
    ) -> Result<FieldDescriptor> {
        let kind = convert_kind(proto.r#type());
        let number = field_number(proto.number());
        let type_name = proto.type_name().trim_start_matches('.');
        let full_name = join_name(scope, proto.name());

        let mut field = match map_entries.get(type_name) {
            Some(entry) if proto.label() == Label::Repeated => {
                let (key, value, value_type) = map_kinds(entry, &full_name)?;
                let field = FieldDescriptor::map(number, proto.name(), key, value);
                match value_type {
                    Some(value_type) => field.with_message_type(value_type),
                    None => field,
                }
            }
            _ => {
                let mut field = FieldDescriptor::new(number, proto.name(), kind);
                match proto.label() {
                    Label::Repeated => field = field.repeated(),
                    Label::Required => field = field.required(),
                    Label::Optional => {}
                }
                if !type_name.is_empty() {
                    field = field.with_message_type(type_name);
                }
                field
            }
        };

        if proto.proto3_optional() {
            field = field.explicit_presence();
        } else if let Some(index) = proto.oneof_index {
            let oneof = usize::try_from(index)
                .ok()
                .and_then(|i| oneofs.get(i))
                .ok_or_else(|| {
                    Error::descriptor_build(format!(
                        "field '{}' refers to missing oneof {}",
                        full_name, index
                    ))
                })?;
            field = field.in_oneof(oneof.name());
        }

        let options = proto.options.as_ref();
        let packed = options.and_then(|o| o.packed);
        if field.is_list() && kind.is_packable() && packed.unwrap_or(self.syntax == Syntax::Proto3) {
            field = field.packed();
        }
        if options.and_then(|o| o.weak).unwrap_or(false) {
            field = field.weak();
        }
        if !proto.extendee().is_empty() {
            field = field.extending(proto.extendee().trim_start_matches('.'));
        }

        if let Some(text) = &proto.default_value {
            if let Some(value) = self.parse_default(&full_name, kind, text, type_name)? {
                field = field.with_default(value);
            }
        } else if kind == Kind::Enum
            && self.syntax == Syntax::Proto2
            && self.options.resolve_enum_defaults
            && field.cardinality() != Cardinality::Repeated
        {
            if let Some((_, number)) = self.enums.get(type_name).and_then(|values| values.first()) {
                field = field.with_default(EnumNumber(*number));
            }
        }

        Ok(field)
    }

    fn parse_default(&self, field: &str, kind: Kind, text: &str, enum_type: &str) -> Result<Option<Value>> {
        let invalid = || Error::InvalidDefault {
            field: field.to_string(),
            kind,
            value: text.to_string(),
        };

        let value = match kind {
            Kind::Bool => match text {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => return Err(invalid()),
            },
            Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => {
                Value::Int32(text.parse().map_err(|_| invalid())?)
            }
            Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => {
                Value::Int64(text.parse().map_err(|_| invalid())?)
            }
            Kind::Uint32 | Kind::Fixed32 => Value::Uint32(text.parse().map_err(|_| invalid())?),
            Kind::Uint64 | Kind::Fixed64 => Value::Uint64(text.parse().map_err(|_| invalid())?),
            Kind::Float => Value::Float32(text.parse().map_err(|_| invalid())?),
            Kind::Double => Value::Float64(text.parse().map_err(|_| invalid())?),
            Kind::String => Value::String(text.to_string()),
            Kind::Bytes => Value::Bytes(Bytes::from(unescape_bytes(text).ok_or_else(invalid)?)),
            Kind::Enum => match self.enums.get(enum_type) {
                Some(values) => {
                    let number = values
                        .iter()
                        .find(|(name, _)| name == text)
                        .map(|(_, number)| *number)
                        .ok_or_else(invalid)?;
                    Value::Enum(EnumNumber(number))
                }
                None => {
                    warn!(
                        field,
                        enum_type, "Enum type not loaded, dropping default '{}'", text
                    );
                    return Ok(None);
                }
            },
            Kind::Message | Kind::Group => return Err(invalid()),
        };

        Ok(Some(value))
    }
}

fn is_map_entry(proto: &DescriptorProto) -> bool {
    proto
        .options
        .as_ref()
        .and_then(|o| o.map_entry)
        .unwrap_or(false)
}

/// Key kind, value kind and value type name of a map entry message
fn map_kinds<'p>(entry: &'p DescriptorProto, field: &str) -> Result<(Kind, Kind, Option<&'p str>)> {
    let find = |number: i32| {
        entry.field.iter().find(|f| f.number() == number).ok_or_else(|| {
            Error::descriptor_build(format!(
                "map entry for '{}' is missing field {}",
                field, number
            ))
        })
    };
    let key = find(1)?;
    let value = find(2)?;
    let value_type = value.type_name().trim_start_matches('.');
    Ok((
        convert_kind(key.r#type()),
        convert_kind(value.r#type()),
        (!value_type.is_empty()).then_some(value_type),
    ))
}

/// Negative numbers map to 0, which descriptor validation rejects
fn field_number(number: i32) -> u32 {
    u32::try_from(number).unwrap_or(0)
}

fn convert_kind(ty: Type) -> Kind {
    match ty {
        Type::Double => Kind::Double,
        Type::Float => Kind::Float,
        Type::Int64 => Kind::Int64,
        Type::Uint64 => Kind::Uint64,
        Type::Int32 => Kind::Int32,
        Type::Fixed64 => Kind::Fixed64,
        Type::Fixed32 => Kind::Fixed32,
        Type::Bool => Kind::Bool,
        Type::String => Kind::String,
        Type::Group => Kind::Group,
        Type::Message => Kind::Message,
        Type::Bytes => Kind::Bytes,
        Type::Uint32 => Kind::Uint32,
        Type::Enum => Kind::Enum,
        Type::Sfixed32 => Kind::Sfixed32,
        Type::Sfixed64 => Kind::Sfixed64,
        Type::Sint32 => Kind::Sint32,
        Type::Sint64 => Kind::Sint64,
    }
}

fn convert_enum(proto: &EnumDescriptorProto, scope: &str) -> EnumDescriptor {
    proto.value.iter().fold(
        EnumDescriptor::new(join_name(scope, proto.name())),
        |enumeration, value| enumeration.value(value.name(), value.number()),
    )
}

fn convert_service(proto: &ServiceDescriptorProto, scope: &str) -> ServiceDescriptor {
    proto.method.iter().fold(
        ServiceDescriptor::new(join_name(scope, proto.name())),
        |service, method| {
            let mut descriptor = MethodDescriptor::new(
                method.name(),
                method.input_type().trim_start_matches('.'),
                method.output_type().trim_start_matches('.'),
            );
            if method.client_streaming() {
                descriptor = descriptor.client_streaming();
            }
            if method.server_streaming() {
                descriptor = descriptor.server_streaming();
            }
            service.method(descriptor)
        },
    )
}

/// Reverses C-style escaping of a `bytes` default
fn unescape_bytes(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    let mut bytes = text.bytes().peekable();

    while let Some(byte) = bytes.next() {
        if byte != b'\\' {
            out.push(byte);
            continue;
        }

        let escaped = bytes.next()?;
        let value = match escaped {
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0C,
            b'v' => 0x0B,
            b'\\' | b'\'' | b'"' | b'?' => escaped,
            b'0'..=b'7' => {
                let mut value = u32::from(escaped - b'0');
                for _ in 0..2 {
                    match bytes.peek() {
                        Some(&digit @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(digit - b'0');
                            bytes.next();
                        }
                        _ => break,
                    }
                }
                u8::try_from(value).ok()?
            }
            b'x' | b'X' => {
                let mut value = 0u32;
                let mut digits = 0;
                while digits < 2 {
                    match bytes.peek().and_then(|&d| char::from(d).to_digit(16)) {
                        Some(digit) => {
                            value = value * 16 + digit;
                            bytes.next();
                            digits += 1;
                        }
                        None => break,
                    }
                }
                if digits == 0 {
                    return None;
                }
                value as u8
            }
            _ => return None,
        };
        out.push(value);
    }

    Some(out)
}
