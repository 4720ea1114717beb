//! Descriptor model.
//!
//! Descriptors are immutable, shareable definitions of messages, fields,
//! enums, services and files. They are built either programmatically via
//! the builders in this module or from a serialized `FileDescriptorProto`
//! (see [`FileDescriptor::decode`]).
//!
//! Names are fully qualified with `.` separators and carry no leading dot.
//! References between descriptors (a message field's type, a method's input)
//! are kept as names and resolved through a [`Files`](crate::Files)
//! registry, so descriptors never form reference cycles.

mod proto;

pub use proto::{decode_file_descriptor_set, LoadOptions};

use crate::error::{Error, Result};
use crate::value::{Value, ValueClass};
use crate::{FieldNumber, MAX_FIELD_NUMBER};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

/// Declared type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// `bool`
    Bool,
    /// `int32`
    Int32,
    /// `sint32`
    Sint32,
    /// `sfixed32`
    Sfixed32,
    /// `int64`
    Int64,
    /// `sint64`
    Sint64,
    /// `sfixed64`
    Sfixed64,
    /// `uint32`
    Uint32,
    /// `fixed32`
    Fixed32,
    /// `uint64`
    Uint64,
    /// `fixed64`
    Fixed64,
    /// `float`
    Float,
    /// `double`
    Double,
    /// `string`
    String,
    /// `bytes`
    Bytes,
    /// Enum-typed field
    Enum,
    /// Message-typed field
    Message,
    /// Group-typed field (proto2 delimited message)
    Group,
}

impl Kind {
    /// Value class used to carry values of this kind
    pub fn class(self) -> ValueClass {
        match self {
            Kind::Bool => ValueClass::Bool,
            Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => ValueClass::Int32,
            Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => ValueClass::Int64,
            Kind::Uint32 | Kind::Fixed32 => ValueClass::Uint32,
            Kind::Uint64 | Kind::Fixed64 => ValueClass::Uint64,
            Kind::Float => ValueClass::Float32,
            Kind::Double => ValueClass::Float64,
            Kind::String => ValueClass::String,
            Kind::Bytes => ValueClass::Bytes,
            Kind::Enum => ValueClass::Enum,
            Kind::Message | Kind::Group => ValueClass::Message,
        }
    }

    /// Returns true for message and group kinds
    pub fn is_message(self) -> bool {
        matches!(self, Kind::Message | Kind::Group)
    }

    /// Returns true if repeated fields of this kind may use packed encoding
    pub fn is_packable(self) -> bool {
        !matches!(
            self,
            Kind::String | Kind::Bytes | Kind::Message | Kind::Group
        )
    }

    /// Returns true if this kind may be used as a map key
    pub fn is_map_key(self) -> bool {
        !matches!(
            self,
            Kind::Float | Kind::Double | Kind::Bytes | Kind::Enum | Kind::Message | Kind::Group
        )
    }

    /// Returns the proto source keyword for this kind
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Bool => "bool",
            Kind::Int32 => "int32",
            Kind::Sint32 => "sint32",
            Kind::Sfixed32 => "sfixed32",
            Kind::Int64 => "int64",
            Kind::Sint64 => "sint64",
            Kind::Sfixed64 => "sfixed64",
            Kind::Uint32 => "uint32",
            Kind::Fixed32 => "fixed32",
            Kind::Uint64 => "uint64",
            Kind::Fixed64 => "fixed64",
            Kind::Float => "float",
            Kind::Double => "double",
            Kind::String => "string",
            Kind::Bytes => "bytes",
            Kind::Enum => "enum",
            Kind::Message => "message",
            Kind::Group => "group",
        }
    }
}

/// Field cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cardinality {
    /// Singular field
    #[default]
    Optional,
    /// Singular proto2 field that must be set
    Required,
    /// Repeated field (lists and maps)
    Repeated,
}

/// Proto syntax version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Syntax {
    /// Proto2 syntax
    #[default]
    Proto2,
    /// Proto3 syntax
    Proto3,
}

impl Syntax {
    /// Returns the syntax declaration string
    pub fn as_str(&self) -> &'static str {
        match self {
            Syntax::Proto2 => "proto2",
            Syntax::Proto3 => "proto3",
        }
    }
}

impl TryFrom<&str> for Syntax {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "" | "proto2" => Ok(Syntax::Proto2),
            "proto3" => Ok(Syntax::Proto3),
            _ => Err(Error::UnsupportedSyntax {
                syntax: value.to_string(),
            }),
        }
    }
}

/// Key and value kinds of a map field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapEntry {
    /// Kind of the map key
    pub key: Kind,
    /// Kind of the map value
    pub value: Kind,
}

/// Describes a single field of a message, or an extension
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    number: FieldNumber,
    name: String,
    full_name: String,
    kind: Kind,
    cardinality: Cardinality,
    map: Option<MapEntry>,
    packed: bool,
    weak: bool,
    oneof: Option<String>,
    default: Option<Value>,
    proto3_optional: bool,
    presence: bool,
    type_name: Option<String>,
    extendee: Option<String>,
}

impl FieldDescriptor {
    /// Creates a singular field of the given kind
    pub fn new(number: FieldNumber, name: impl Into<String>, kind: Kind) -> Self {
        let name = name.into();
        Self {
            number,
            full_name: name.clone(),
            name,
            kind,
            cardinality: Cardinality::Optional,
            map: None,
            packed: false,
            weak: false,
            oneof: None,
            default: None,
            proto3_optional: false,
            presence: true,
            type_name: None,
            extendee: None,
        }
    }

    /// Creates a map field from key kind to value kind
    pub fn map(number: FieldNumber, name: impl Into<String>, key: Kind, value: Kind) -> Self {
        let mut field = Self::new(number, name, Kind::Message).repeated();
        field.map = Some(MapEntry { key, value });
        field
    }

    /// Marks the field repeated
    pub fn repeated(mut self) -> Self {
        self.cardinality = Cardinality::Repeated;
        self
    }

    /// Marks the field required
    pub fn required(mut self) -> Self {
        self.cardinality = Cardinality::Required;
        self
    }

    /// Marks a repeated field as packed
    pub fn packed(mut self) -> Self {
        self.packed = true;
        self
    }

    /// Marks the field weak
    pub fn weak(mut self) -> Self {
        self.weak = true;
        self
    }

    /// Places the field in the named oneof group
    pub fn in_oneof(mut self, oneof: impl Into<String>) -> Self {
        self.oneof = Some(oneof.into());
        self
    }

    /// Gives a proto3 scalar explicit presence (`optional` keyword)
    pub fn explicit_presence(mut self) -> Self {
        self.proto3_optional = true;
        self
    }

    /// Sets the declared default value
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets the referenced message type; for maps, the value's message type
    pub fn with_message_type(mut self, full_name: impl Into<String>) -> Self {
        self.type_name = Some(full_name.into());
        self
    }

    /// Sets the referenced enum type; for maps, the value's enum type
    pub fn with_enum_type(mut self, full_name: impl Into<String>) -> Self {
        self.type_name = Some(full_name.into());
        self
    }

    /// Marks the field as an extension of the given message
    pub fn extending(mut self, extendee: impl Into<String>) -> Self {
        self.extendee = Some(extendee.into());
        self
    }

    /// Field number
    pub fn number(&self) -> FieldNumber {
        self.number
    }

    /// Short name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully-qualified name
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Declared kind; `Message` for map fields
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Cardinality
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Returns true if this is a map field
    pub fn is_map(&self) -> bool {
        self.map.is_some()
    }

    /// Returns true if this is a repeated, non-map field
    pub fn is_list(&self) -> bool {
        self.cardinality == Cardinality::Repeated && self.map.is_none()
    }

    /// Key and value kinds for map fields
    pub fn map_entry(&self) -> Option<MapEntry> {
        self.map
    }

    /// Returns true if the field uses packed encoding
    pub fn is_packed(&self) -> bool {
        self.packed
    }

    /// Returns true if the field is weak
    pub fn is_weak(&self) -> bool {
        self.weak
    }

    /// Name of the containing oneof group, if any
    pub fn oneof_name(&self) -> Option<&str> {
        self.oneof.as_deref()
    }

    /// Declared default value
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Returns true if the field distinguishes "unset" from "set to zero"
    pub fn has_presence(&self) -> bool {
        self.presence
    }

    /// Full name of the referenced message or enum type
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    /// Full name of the extended message, for extensions
    pub fn extendee(&self) -> Option<&str> {
        self.extendee.as_deref()
    }

    /// Returns true if this field is an extension
    pub fn is_extension(&self) -> bool {
        self.extendee.is_some()
    }

    /// Value returned by a getter when the field is unset
    pub fn default_or_zero(&self) -> Value {
        match &self.default {
            Some(value) => value.clone(),
            None => Value::zero_for(self.kind),
        }
    }

    /// Fills in the full name and presence once the scope is known
    fn resolve(mut self, scope: &str, syntax: Syntax) -> Result<Self> {
        if self.number == 0 || self.number > MAX_FIELD_NUMBER {
            return Err(Error::InvalidFieldNumber {
                number: self.number,
                max: MAX_FIELD_NUMBER,
            });
        }
        self.full_name = join_name(scope, &self.name);

        if let Some(entry) = self.map {
            if !entry.key.is_map_key() {
                return Err(Error::descriptor_build(format!(
                    "map field '{}' has invalid key kind {}",
                    self.full_name,
                    entry.key.as_str()
                )));
            }
        }
        if self.packed && !(self.is_list() && self.kind.is_packable()) {
            return Err(Error::descriptor_build(format!(
                "field '{}' cannot be packed",
                self.full_name
            )));
        }
        if self.weak && !(self.kind.is_message() && self.cardinality != Cardinality::Repeated) {
            return Err(Error::descriptor_build(format!(
                "weak field '{}' must be a singular message",
                self.full_name
            )));
        }
        if self.oneof.is_some() && self.cardinality != Cardinality::Optional {
            return Err(Error::descriptor_build(format!(
                "oneof member '{}' must be singular and optional",
                self.full_name
            )));
        }
        if let Some(default) = &self.default {
            let valid = self.cardinality != Cardinality::Repeated
                && !self.kind.is_message()
                && default.class() == Some(self.kind.class());
            if !valid {
                return Err(Error::InvalidDefault {
                    field: self.full_name.clone(),
                    kind: self.kind,
                    value: format!("{:?}", default),
                });
            }
        }

        self.presence = match self.cardinality {
            Cardinality::Repeated => false,
            _ if self.kind.is_message() => true,
            _ if self.oneof.is_some() || self.proto3_optional => true,
            _ if self.extendee.is_some() => true,
            _ => syntax == Syntax::Proto2,
        };
        Ok(self)
    }
}

/// A oneof group within a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneofDescriptor {
    name: String,
    full_name: String,
    fields: Vec<FieldNumber>,
}

impl OneofDescriptor {
    /// Short name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully-qualified name
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Numbers of the member fields, in declaration order
    pub fn fields(&self) -> &[FieldNumber] {
        &self.fields
    }
}

/// Describes a message type
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDescriptor {
    name: String,
    full_name: String,
    syntax: Syntax,
    fields: Vec<Arc<FieldDescriptor>>,
    by_number: HashMap<FieldNumber, usize>,
    oneofs: Vec<Arc<OneofDescriptor>>,
    messages: Vec<Arc<MessageDescriptor>>,
    enums: Vec<Arc<EnumDescriptor>>,
    extensions: Vec<Arc<FieldDescriptor>>,
    extension_ranges: Vec<Range<FieldNumber>>,
    map_entry: bool,
}

impl MessageDescriptor {
    /// Starts building a message with the given full name
    pub fn builder(full_name: impl Into<String>) -> MessageBuilder {
        MessageBuilder {
            full_name: full_name.into(),
            syntax: Syntax::default(),
            fields: Vec::new(),
            oneofs: Vec::new(),
            messages: Vec::new(),
            enums: Vec::new(),
            extensions: Vec::new(),
            extension_ranges: Vec::new(),
            map_entry: false,
        }
    }

    /// Short name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully-qualified name
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Syntax of the declaring file
    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &[Arc<FieldDescriptor>] {
        &self.fields
    }

    /// Looks up a field by number
    pub fn field_by_number(&self, number: FieldNumber) -> Option<&Arc<FieldDescriptor>> {
        self.by_number.get(&number).map(|&i| &self.fields[i])
    }

    /// Looks up a field by short name
    pub fn field_by_name(&self, name: &str) -> Option<&Arc<FieldDescriptor>> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Oneof groups in declaration order
    pub fn oneofs(&self) -> &[Arc<OneofDescriptor>] {
        &self.oneofs
    }

    /// Looks up a oneof by short name
    pub fn oneof_by_name(&self, name: &str) -> Option<&Arc<OneofDescriptor>> {
        self.oneofs.iter().find(|o| o.name() == name)
    }

    /// Nested message declarations
    pub fn messages(&self) -> &[Arc<MessageDescriptor>] {
        &self.messages
    }

    /// Nested enum declarations
    pub fn enums(&self) -> &[Arc<EnumDescriptor>] {
        &self.enums
    }

    /// Extensions declared within this message's scope
    pub fn extensions(&self) -> &[Arc<FieldDescriptor>] {
        &self.extensions
    }

    /// Field number ranges reserved for extensions (end exclusive)
    pub fn extension_ranges(&self) -> &[Range<FieldNumber>] {
        &self.extension_ranges
    }

    /// Returns true if the number falls inside an extension range
    pub fn is_extension_number(&self, number: FieldNumber) -> bool {
        self.extension_ranges.iter().any(|r| r.contains(&number))
    }

    /// Returns true for synthesized map entry messages
    pub fn is_map_entry(&self) -> bool {
        self.map_entry
    }
}

/// Builder for [`MessageDescriptor`]
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    full_name: String,
    syntax: Syntax,
    fields: Vec<FieldDescriptor>,
    oneofs: Vec<String>,
    messages: Vec<MessageDescriptor>,
    enums: Vec<EnumDescriptor>,
    extensions: Vec<FieldDescriptor>,
    extension_ranges: Vec<Range<FieldNumber>>,
    map_entry: bool,
}

impl MessageBuilder {
    /// Sets the syntax that governs implicit presence
    pub fn syntax(mut self, syntax: Syntax) -> Self {
        self.syntax = syntax;
        self
    }

    /// Adds a field
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Declares a oneof group; groups named by fields are declared implicitly
    pub fn oneof(mut self, name: impl Into<String>) -> Self {
        self.oneofs.push(name.into());
        self
    }

    /// Adds a nested message
    pub fn message(mut self, message: MessageDescriptor) -> Self {
        self.messages.push(message);
        self
    }

    /// Adds a nested enum
    pub fn enumeration(mut self, enumeration: EnumDescriptor) -> Self {
        self.enums.push(enumeration);
        self
    }

    /// Adds an extension declared in this message's scope
    pub fn extension(mut self, extension: FieldDescriptor) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Reserves a range of field numbers for extensions
    pub fn extension_range(mut self, range: Range<FieldNumber>) -> Self {
        self.extension_ranges.push(range);
        self
    }

    /// Marks the message as a synthesized map entry
    pub fn map_entry(mut self) -> Self {
        self.map_entry = true;
        self
    }

    /// Validates and builds the descriptor
    pub fn build(self) -> Result<MessageDescriptor> {
        validate_full_name(&self.full_name)?;
        let name = short_name(&self.full_name).to_string();

        for range in &self.extension_ranges {
            if range.start == 0 || range.start >= range.end || range.end > MAX_FIELD_NUMBER + 1 {
                return Err(Error::descriptor_build(format!(
                    "message '{}' has invalid extension range {}..{}",
                    self.full_name, range.start, range.end
                )));
            }
        }

        let mut fields = Vec::with_capacity(self.fields.len());
        let mut by_number = HashMap::with_capacity(self.fields.len());
        let mut oneof_names = self.oneofs;
        let mut oneof_members: HashMap<String, Vec<FieldNumber>> = HashMap::new();

        for field in self.fields {
            let field = field.resolve(&self.full_name, self.syntax)?;
            if field.is_extension() {
                return Err(Error::descriptor_build(format!(
                    "extension '{}' declared as a regular field",
                    field.full_name()
                )));
            }
            if self.extension_ranges.iter().any(|r| r.contains(&field.number)) {
                return Err(Error::descriptor_build(format!(
                    "field '{}' uses number {} reserved for extensions",
                    field.full_name(),
                    field.number
                )));
            }
            match by_number.entry(field.number) {
                Entry::Occupied(_) => {
                    return Err(Error::DuplicateFieldNumber {
                        message: self.full_name,
                        number: field.number,
                    })
                }
                Entry::Vacant(slot) => {
                    slot.insert(fields.len());
                }
            }
            if let Some(oneof) = &field.oneof {
                if !oneof_names.contains(oneof) {
                    oneof_names.push(oneof.clone());
                }
                oneof_members
                    .entry(oneof.clone())
                    .or_default()
                    .push(field.number);
            }
            fields.push(Arc::new(field));
        }

        let mut oneofs = Vec::with_capacity(oneof_names.len());
        for name in oneof_names {
            let members = oneof_members.remove(&name).unwrap_or_default();
            if members.is_empty() {
                return Err(Error::descriptor_build(format!(
                    "oneof '{}' in '{}' has no fields",
                    name, self.full_name
                )));
            }
            oneofs.push(Arc::new(OneofDescriptor {
                full_name: join_name(&self.full_name, &name),
                name,
                fields: members,
            }));
        }

        let mut messages = Vec::with_capacity(self.messages.len());
        for nested in self.messages {
            check_parent(&self.full_name, nested.full_name())?;
            messages.push(Arc::new(nested));
        }

        let mut enums = Vec::with_capacity(self.enums.len());
        for nested in self.enums {
            check_parent(&self.full_name, nested.full_name())?;
            nested.validate()?;
            enums.push(Arc::new(nested));
        }

        let mut extensions = Vec::with_capacity(self.extensions.len());
        for extension in self.extensions {
            extensions.push(Arc::new(resolve_extension(
                extension,
                &self.full_name,
                self.syntax,
            )?));
        }

        Ok(MessageDescriptor {
            name,
            full_name: self.full_name,
            syntax: self.syntax,
            fields,
            by_number,
            oneofs,
            messages,
            enums,
            extensions,
            extension_ranges: self.extension_ranges,
            map_entry: self.map_entry,
        })
    }
}

/// One named value of an enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValueDescriptor {
    name: String,
    full_name: String,
    number: i32,
}

impl EnumValueDescriptor {
    /// Short name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully-qualified name; a sibling of the enum, not a child
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Numeric value
    pub fn number(&self) -> i32 {
        self.number
    }
}

/// Describes an enum type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    name: String,
    full_name: String,
    values: Vec<Arc<EnumValueDescriptor>>,
}

impl EnumDescriptor {
    /// Creates an enum with no values
    pub fn new(full_name: impl Into<String>) -> Self {
        let full_name = full_name.into();
        Self {
            name: short_name(&full_name).to_string(),
            full_name,
            values: Vec::new(),
        }
    }

    /// Adds a value
    pub fn value(mut self, name: impl Into<String>, number: i32) -> Self {
        let name = name.into();
        self.values.push(Arc::new(EnumValueDescriptor {
            full_name: join_name(parent_name(&self.full_name), &name),
            name,
            number,
        }));
        self
    }

    /// Short name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully-qualified name
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Values in declaration order
    pub fn values(&self) -> &[Arc<EnumValueDescriptor>] {
        &self.values
    }

    /// Looks up a value by short name
    pub fn value_by_name(&self, name: &str) -> Option<&Arc<EnumValueDescriptor>> {
        self.values.iter().find(|v| v.name() == name)
    }

    /// Looks up the first value with the given number
    pub fn value_by_number(&self, number: i32) -> Option<&Arc<EnumValueDescriptor>> {
        self.values.iter().find(|v| v.number() == number)
    }

    /// Number of the first declared value, the implicit default
    pub fn default_number(&self) -> Option<i32> {
        self.values.first().map(|v| v.number())
    }

    fn validate(&self) -> Result<()> {
        validate_full_name(&self.full_name)?;
        if self.values.is_empty() {
            return Err(Error::descriptor_build(format!(
                "enum '{}' has no values",
                self.full_name
            )));
        }
        Ok(())
    }
}

/// Describes an RPC method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    name: String,
    full_name: String,
    input_type: String,
    output_type: String,
    client_streaming: bool,
    server_streaming: bool,
}

impl MethodDescriptor {
    /// Creates a unary method
    pub fn new(
        name: impl Into<String>,
        input_type: impl Into<String>,
        output_type: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            full_name: name.clone(),
            name,
            input_type: input_type.into(),
            output_type: output_type.into(),
            client_streaming: false,
            server_streaming: false,
        }
    }

    /// Marks the request side as streaming
    pub fn client_streaming(mut self) -> Self {
        self.client_streaming = true;
        self
    }

    /// Marks the response side as streaming
    pub fn server_streaming(mut self) -> Self {
        self.server_streaming = true;
        self
    }

    /// Short name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully-qualified name
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Full name of the request message
    pub fn input_type(&self) -> &str {
        &self.input_type
    }

    /// Full name of the response message
    pub fn output_type(&self) -> &str {
        &self.output_type
    }

    /// Returns true if the client streams requests
    pub fn is_client_streaming(&self) -> bool {
        self.client_streaming
    }

    /// Returns true if the server streams responses
    pub fn is_server_streaming(&self) -> bool {
        self.server_streaming
    }
}

/// Describes a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    name: String,
    full_name: String,
    methods: Vec<Arc<MethodDescriptor>>,
}

impl ServiceDescriptor {
    /// Creates a service with no methods
    pub fn new(full_name: impl Into<String>) -> Self {
        let full_name = full_name.into();
        Self {
            name: short_name(&full_name).to_string(),
            full_name,
            methods: Vec::new(),
        }
    }

    /// Adds a method
    pub fn method(mut self, mut method: MethodDescriptor) -> Self {
        method.full_name = join_name(&self.full_name, &method.name);
        self.methods.push(Arc::new(method));
        self
    }

    /// Short name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully-qualified name
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Methods in declaration order
    pub fn methods(&self) -> &[Arc<MethodDescriptor>] {
        &self.methods
    }
}

/// Any named declaration that can be looked up by full name
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    /// A message type
    Message(Arc<MessageDescriptor>),
    /// A message field
    Field(Arc<FieldDescriptor>),
    /// A oneof group
    Oneof(Arc<OneofDescriptor>),
    /// An enum type
    Enum(Arc<EnumDescriptor>),
    /// An enum value
    EnumValue(Arc<EnumValueDescriptor>),
    /// An extension field
    Extension(Arc<FieldDescriptor>),
    /// A service
    Service(Arc<ServiceDescriptor>),
    /// A service method
    Method(Arc<MethodDescriptor>),
}

impl Descriptor {
    /// Fully-qualified name of the declaration
    pub fn full_name(&self) -> &str {
        match self {
            Descriptor::Message(d) => d.full_name(),
            Descriptor::Field(d) | Descriptor::Extension(d) => d.full_name(),
            Descriptor::Oneof(d) => d.full_name(),
            Descriptor::Enum(d) => d.full_name(),
            Descriptor::EnumValue(d) => d.full_name(),
            Descriptor::Service(d) => d.full_name(),
            Descriptor::Method(d) => d.full_name(),
        }
    }

    /// Short name of the declaration
    pub fn name(&self) -> &str {
        short_name(self.full_name())
    }

    /// Returns the message descriptor, if this is one
    pub fn as_message(&self) -> Option<&Arc<MessageDescriptor>> {
        match self {
            Descriptor::Message(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the enum descriptor, if this is one
    pub fn as_enum(&self) -> Option<&Arc<EnumDescriptor>> {
        match self {
            Descriptor::Enum(d) => Some(d),
            _ => None,
        }
    }
}

/// Describes one `.proto` file
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    path: String,
    package: String,
    syntax: Syntax,
    placeholder: bool,
    messages: Vec<Arc<MessageDescriptor>>,
    enums: Vec<Arc<EnumDescriptor>>,
    extensions: Vec<Arc<FieldDescriptor>>,
    services: Vec<Arc<ServiceDescriptor>>,
    index: HashMap<String, Descriptor>,
}

impl FileDescriptor {
    /// Starts building a file with the given path
    pub fn builder(path: impl Into<String>) -> FileBuilder {
        FileBuilder {
            path: path.into(),
            package: String::new(),
            syntax: Syntax::default(),
            messages: Vec::new(),
            enums: Vec::new(),
            extensions: Vec::new(),
            services: Vec::new(),
        }
    }

    /// Creates a stand-in for a file whose contents are unknown
    pub fn placeholder(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            package: String::new(),
            syntax: Syntax::default(),
            placeholder: true,
            messages: Vec::new(),
            enums: Vec::new(),
            extensions: Vec::new(),
            services: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Path of the file, as used by imports
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Package name; empty for files without a package
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Syntax version
    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    /// Returns true if this file only stands in for an unresolved import
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// Top-level messages
    pub fn messages(&self) -> &[Arc<MessageDescriptor>] {
        &self.messages
    }

    /// Top-level enums
    pub fn enums(&self) -> &[Arc<EnumDescriptor>] {
        &self.enums
    }

    /// Top-level extensions
    pub fn extensions(&self) -> &[Arc<FieldDescriptor>] {
        &self.extensions
    }

    /// Services
    pub fn services(&self) -> &[Arc<ServiceDescriptor>] {
        &self.services
    }

    /// Looks up any declaration of this file by full name
    pub fn descriptor_by_name(&self, full_name: &str) -> Option<Descriptor> {
        self.index.get(full_name).cloned()
    }

    /// Number of declarations reachable by name in this file
    pub fn num_declarations(&self) -> usize {
        self.index.len()
    }

    /// Short names claimed directly in the package scope.
    ///
    /// These are the top-level enums and their values, messages,
    /// extensions and services.
    pub fn top_level_names(&self) -> impl Iterator<Item = &str> + '_ {
        let enums = self.enums.iter().flat_map(|e| {
            std::iter::once(e.name()).chain(e.values().iter().map(|v| v.name()))
        });
        enums
            .chain(self.messages.iter().map(|m| m.name()))
            .chain(self.extensions.iter().map(|x| x.name()))
            .chain(self.services.iter().map(|s| s.name()))
    }
}

/// Builder for [`FileDescriptor`]
#[derive(Debug, Clone)]
pub struct FileBuilder {
    path: String,
    package: String,
    syntax: Syntax,
    messages: Vec<MessageDescriptor>,
    enums: Vec<EnumDescriptor>,
    extensions: Vec<FieldDescriptor>,
    services: Vec<ServiceDescriptor>,
}

impl FileBuilder {
    /// Sets the package
    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    /// Sets the syntax
    pub fn syntax(mut self, syntax: Syntax) -> Self {
        self.syntax = syntax;
        self
    }

    /// Adds a top-level message
    pub fn message(mut self, message: MessageDescriptor) -> Self {
        self.messages.push(message);
        self
    }

    /// Adds a top-level enum
    pub fn enumeration(mut self, enumeration: EnumDescriptor) -> Self {
        self.enums.push(enumeration);
        self
    }

    /// Adds a top-level extension
    pub fn extension(mut self, extension: FieldDescriptor) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Adds a service
    pub fn service(mut self, service: ServiceDescriptor) -> Self {
        self.services.push(service);
        self
    }

    /// Validates and builds the file, indexing every declaration by name
    pub fn build(self) -> Result<FileDescriptor> {
        if !self.package.is_empty() {
            validate_full_name(&self.package)?;
        }

        let mut index = HashMap::new();

        let mut messages = Vec::with_capacity(self.messages.len());
        for message in self.messages {
            check_parent(&self.package, message.full_name())?;
            let message = Arc::new(message);
            index_message(&mut index, &message)?;
            messages.push(message);
        }

        let mut enums = Vec::with_capacity(self.enums.len());
        for enumeration in self.enums {
            check_parent(&self.package, enumeration.full_name())?;
            enumeration.validate()?;
            let enumeration = Arc::new(enumeration);
            index_enum(&mut index, &enumeration)?;
            enums.push(enumeration);
        }

        let mut extensions = Vec::with_capacity(self.extensions.len());
        for extension in self.extensions {
            let extension = Arc::new(resolve_extension(extension, &self.package, self.syntax)?);
            insert_declaration(&mut index, Descriptor::Extension(extension.clone()))?;
            extensions.push(extension);
        }

        let mut services = Vec::with_capacity(self.services.len());
        for service in self.services {
            check_parent(&self.package, service.full_name())?;
            let service = Arc::new(service);
            insert_declaration(&mut index, Descriptor::Service(service.clone()))?;
            for method in service.methods() {
                insert_declaration(&mut index, Descriptor::Method(method.clone()))?;
            }
            services.push(service);
        }

        Ok(FileDescriptor {
            path: self.path,
            package: self.package,
            syntax: self.syntax,
            placeholder: false,
            messages,
            enums,
            extensions,
            services,
            index,
        })
    }
}

fn resolve_extension(
    extension: FieldDescriptor,
    scope: &str,
    syntax: Syntax,
) -> Result<FieldDescriptor> {
    if !extension.is_extension() {
        return Err(Error::descriptor_build(format!(
            "extension '{}' has no extendee",
            join_name(scope, extension.name())
        )));
    }
    extension.resolve(scope, syntax)
}

fn index_message(index: &mut HashMap<String, Descriptor>, message: &Arc<MessageDescriptor>) -> Result<()> {
    insert_declaration(index, Descriptor::Message(message.clone()))?;
    for field in message.fields() {
        insert_declaration(index, Descriptor::Field(field.clone()))?;
    }
    for oneof in message.oneofs() {
        insert_declaration(index, Descriptor::Oneof(oneof.clone()))?;
    }
    for extension in message.extensions() {
        insert_declaration(index, Descriptor::Extension(extension.clone()))?;
    }
    for enumeration in message.enums() {
        index_enum(index, enumeration)?;
    }
    for nested in message.messages() {
        index_message(index, nested)?;
    }
    Ok(())
}

fn index_enum(index: &mut HashMap<String, Descriptor>, enumeration: &Arc<EnumDescriptor>) -> Result<()> {
    insert_declaration(index, Descriptor::Enum(enumeration.clone()))?;
    for value in enumeration.values() {
        insert_declaration(index, Descriptor::EnumValue(value.clone()))?;
    }
    Ok(())
}

fn insert_declaration(index: &mut HashMap<String, Descriptor>, descriptor: Descriptor) -> Result<()> {
    match index.entry(descriptor.full_name().to_string()) {
        Entry::Occupied(entry) => Err(Error::DuplicateName {
            name: entry.key().clone(),
        }),
        Entry::Vacant(entry) => {
            entry.insert(descriptor);
            Ok(())
        }
    }
}

fn check_parent(scope: &str, full_name: &str) -> Result<()> {
    if parent_name(full_name) != scope {
        return Err(Error::descriptor_build(format!(
            "'{}' is not declared in scope '{}'",
            full_name, scope
        )));
    }
    validate_full_name(full_name)
}

fn validate_full_name(full_name: &str) -> Result<()> {
    if full_name.is_empty() || full_name.split('.').any(str::is_empty) {
        return Err(Error::descriptor_build(format!(
            "invalid full name '{}'",
            full_name
        )));
    }
    Ok(())
}

/// Joins a scope and a short name; an empty scope yields the bare name
pub(crate) fn join_name(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope, name)
    }
}

/// Everything before the last `.`, or the empty string
pub(crate) fn parent_name(full_name: &str) -> &str {
    full_name.rsplit_once('.').map_or("", |(parent, _)| parent)
}

/// Everything after the last `.`
pub(crate) fn short_name(full_name: &str) -> &str {
    full_name.rsplit_once('.').map_or(full_name, |(_, name)| name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_file() -> FileDescriptor {
        let inner = MessageDescriptor::builder("pkg.Outer.Inner")
            .field(FieldDescriptor::new(1, "id", Kind::Int64))
            .build()
            .unwrap();
        let outer = MessageDescriptor::builder("pkg.Outer")
            .syntax(Syntax::Proto3)
            .field(FieldDescriptor::new(1, "name", Kind::String))
            .field(
                FieldDescriptor::new(2, "inner", Kind::Message).with_message_type("pkg.Outer.Inner"),
            )
            .field(FieldDescriptor::new(3, "a", Kind::Int32).in_oneof("choice"))
            .field(FieldDescriptor::new(4, "b", Kind::String).in_oneof("choice"))
            .field(FieldDescriptor::new(5, "tags", Kind::Int32).repeated().packed())
            .field(FieldDescriptor::map(6, "counts", Kind::String, Kind::Int64))
            .message(inner)
            .extension_range(100..200)
            .build()
            .unwrap();
        let color = EnumDescriptor::new("pkg.Color")
            .value("RED", 0)
            .value("GREEN", 1);
        let service = ServiceDescriptor::new("pkg.Greeter").method(
            MethodDescriptor::new("Greet", "pkg.Outer", "pkg.Outer").server_streaming(),
        );
        FileDescriptor::builder("pkg/sample.proto")
            .package("pkg")
            .syntax(Syntax::Proto3)
            .message(outer)
            .enumeration(color)
            .extension(
                FieldDescriptor::new(100, "note", Kind::String).extending("pkg.Outer"),
            )
            .service(service)
            .build()
            .unwrap()
    }

    #[test]
    fn test_syntax_conversion() {
        assert_eq!(Syntax::try_from("").unwrap(), Syntax::Proto2);
        assert_eq!(Syntax::try_from("proto3").unwrap(), Syntax::Proto3);
        assert!(matches!(
            Syntax::try_from("editions"),
            Err(Error::UnsupportedSyntax { .. })
        ));
    }

    #[test]
    fn test_kind_classes() {
        assert_eq!(Kind::Sfixed64.class(), ValueClass::Int64);
        assert_eq!(Kind::Fixed32.class(), ValueClass::Uint32);
        assert_eq!(Kind::Group.class(), ValueClass::Message);
        assert!(Kind::Enum.is_packable());
        assert!(!Kind::Bytes.is_packable());
        assert!(Kind::String.is_map_key());
        assert!(!Kind::Double.is_map_key());
    }

    #[test]
    fn test_message_fields_and_presence() {
        let file = sample_file();
        let outer = &file.messages()[0];
        assert_eq!(outer.name(), "Outer");
        assert_eq!(outer.fields().len(), 6);

        let name = outer.field_by_number(1).unwrap();
        assert_eq!(name.full_name(), "pkg.Outer.name");
        assert!(!name.has_presence());

        let inner = outer.field_by_name("inner").unwrap();
        assert!(inner.has_presence());
        assert!(outer.field_by_number(3).unwrap().has_presence());
        assert!(outer.field_by_number(5).unwrap().is_list());

        let counts = outer.field_by_number(6).unwrap();
        assert!(counts.is_map());
        assert!(!counts.is_list());
        assert_eq!(
            counts.map_entry(),
            Some(MapEntry {
                key: Kind::String,
                value: Kind::Int64
            })
        );

        assert_eq!(outer.oneofs().len(), 1);
        assert_eq!(outer.oneofs()[0].fields(), &[3, 4]);
        assert!(outer.is_extension_number(150));
        assert!(!outer.is_extension_number(200));
    }

    #[test]
    fn test_proto2_scalars_have_presence() {
        let message = MessageDescriptor::builder("p2.M")
            .field(FieldDescriptor::new(1, "flag", Kind::Bool).with_default(true))
            .field(FieldDescriptor::new(2, "n", Kind::Int32).repeated())
            .build()
            .unwrap();
        let flag = message.field_by_number(1).unwrap();
        assert!(flag.has_presence());
        assert_eq!(flag.default_or_zero(), Value::Bool(true));
        assert!(!message.field_by_number(2).unwrap().has_presence());
    }

    #[test]
    fn test_proto3_optional_presence() {
        let message = MessageDescriptor::builder("p3.M")
            .syntax(Syntax::Proto3)
            .field(FieldDescriptor::new(1, "n", Kind::Int32).explicit_presence())
            .build()
            .unwrap();
        assert!(message.field_by_number(1).unwrap().has_presence());
        assert!(message.oneofs().is_empty());
    }

    #[test]
    fn test_descriptor_by_name() {
        let file = sample_file();
        for name in [
            "pkg.Outer",
            "pkg.Outer.Inner",
            "pkg.Outer.Inner.id",
            "pkg.Outer.choice",
            "pkg.Color",
            "pkg.RED",
            "pkg.note",
            "pkg.Greeter",
            "pkg.Greeter.Greet",
        ] {
            let found = file.descriptor_by_name(name);
            assert_eq!(found.map(|d| d.full_name().to_string()), Some(name.to_string()));
        }
        assert!(file.descriptor_by_name("pkg.Color.RED").is_none());
        assert!(matches!(
            file.descriptor_by_name("pkg.note"),
            Some(Descriptor::Extension(_))
        ));
    }

    #[test]
    fn test_top_level_names() {
        let file = sample_file();
        let names: Vec<_> = file.top_level_names().collect();
        assert_eq!(names, vec!["Color", "RED", "GREEN", "Outer", "note", "Greeter"]);
    }

    #[test]
    fn test_duplicate_field_number() {
        let result = MessageDescriptor::builder("a.M")
            .field(FieldDescriptor::new(1, "x", Kind::Int32))
            .field(FieldDescriptor::new(1, "y", Kind::Int32))
            .build();
        assert!(matches!(
            result,
            Err(Error::DuplicateFieldNumber { number: 1, .. })
        ));
    }

    #[test]
    fn test_invalid_field_number() {
        let result = MessageDescriptor::builder("a.M")
            .field(FieldDescriptor::new(MAX_FIELD_NUMBER + 1, "x", Kind::Int32))
            .build();
        assert!(matches!(result, Err(Error::InvalidFieldNumber { .. })));
    }

    #[test]
    fn test_default_must_match_kind() {
        let result = MessageDescriptor::builder("a.M")
            .field(FieldDescriptor::new(1, "x", Kind::Int32).with_default("seven"))
            .build();
        assert!(matches!(result, Err(Error::InvalidDefault { .. })));
    }

    #[test]
    fn test_duplicate_enum_value_names_in_scope() {
        let result = FileDescriptor::builder("e.proto")
            .package("e")
            .enumeration(EnumDescriptor::new("e.A").value("UNKNOWN", 0))
            .enumeration(EnumDescriptor::new("e.B").value("UNKNOWN", 0))
            .build();
        assert!(matches!(result, Err(Error::DuplicateName { name }) if name == "e.UNKNOWN"));
    }

    #[test]
    fn test_message_outside_package() {
        let message = MessageDescriptor::builder("other.M").build().unwrap();
        let result = FileDescriptor::builder("m.proto")
            .package("pkg")
            .message(message)
            .build();
        assert!(matches!(result, Err(Error::DescriptorBuild(_))));
    }

    #[test]
    fn test_placeholder() {
        let file = FileDescriptor::placeholder("missing.proto");
        assert!(file.is_placeholder());
        assert_eq!(file.top_level_names().count(), 0);
    }
}
