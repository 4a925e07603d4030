//! The at-rest representation of entity instances.
//!
//! Every backend stores instances as [`Document`]s: flat maps from persisted field names to
//! primitive [`Value`]s, keyed by a store-assigned [`Id`] under the reserved field
//! [`Document::ID`]. Relationship fields hold only [`Id`]s, never embedded copies of the related
//! documents.
//!
//! Typed Rust structs move in and out of this representation through the [`Stored`] trait, which
//! is implemented for the supported primitive types and for [`Option`] and [`Vec`] of them.

use crate::entity::FieldType;
use derive_more::{Deref, DerefMut, Display, From, Into};
use rand::RngCore;
use snafu::Snafu;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// The number of bytes in an [`Id`].
const ID_BYTES: usize = 12;

/// A unique, store-assigned identifier.
///
/// Identifiers are 12 bytes, rendered as 24 lowercase hexadecimal digits. The first 4 bytes are a
/// big-endian timestamp (seconds since the Unix epoch) so that identifiers generated by the same
/// process sort roughly by creation time; the rest are random. This is the same layout as a
/// MongoDB `ObjectId`, so identifiers round-trip losslessly through the MongoDB backend.
#[derive(Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(fmt = "{}", _0)]
pub struct Id(String);

/// An error parsing an [`Id`].
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(display("malformed identifier {input:?} (expected 24 hexadecimal digits)"))]
pub struct IdError {
    input: String,
}

impl Id {
    /// Generate a new identifier.
    pub fn generate() -> Self {
        let mut bytes = [0u8; ID_BYTES];
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or_default();
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        rand::thread_rng().fill_bytes(&mut bytes[4..]);
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Parse an identifier from its hexadecimal form.
    ///
    /// Upper case digits are accepted and normalized to lower case.
    pub fn parse(input: &str) -> Result<Self, IdError> {
        if input.len() != 2 * ID_BYTES || !input.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(IdError {
                input: input.to_string(),
            });
        }
        Ok(Self(input.to_ascii_lowercase()))
    }

    /// The hexadecimal form of this identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Id {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A primitive value stored in a [`Document`].
#[derive(Clone, Debug, Display, PartialEq, From)]
pub enum Value {
    /// An absent value.
    #[display(fmt = "null")]
    #[from(ignore)]
    Null,
    /// A text string.
    #[display(fmt = "{:?}", _0)]
    String(String),
    /// A 64-bit signed integer.
    #[display(fmt = "{}", _0)]
    Int(i64),
    /// A 64-bit floating point number.
    #[display(fmt = "{}", _0)]
    Float(f64),
    /// A boolean.
    #[display(fmt = "{}", _0)]
    Boolean(bool),
    /// A reference to a document, by its identifier.
    #[display(fmt = "{}", _0)]
    Id(Id),
    /// A homogeneous list of values.
    #[display(fmt = "[{}]", "itertools::join(_0, \", \")")]
    List(Vec<Value>),
}

impl Value {
    /// Is this [`Value::Null`]?
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// A short name for the kind of this value, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::String(_) => "string",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
            Self::Id(_) => "id",
            Self::List(_) => "list",
        }
    }

    /// Check whether this value inhabits `ty`.
    ///
    /// [`Value::Null`] inhabits every type; requiredness is checked separately. Integers inhabit
    /// [`FieldType::Float`] as well, since many clients do not distinguish the two.
    pub fn conforms_to(&self, ty: &FieldType) -> bool {
        match (self, ty) {
            (Self::Null, _) => true,
            (Self::String(_), FieldType::String) => true,
            (Self::Int(_), FieldType::Int | FieldType::Float) => true,
            (Self::Float(_), FieldType::Float) => true,
            (Self::Boolean(_), FieldType::Boolean) => true,
            (Self::Id(_), FieldType::Id) => true,
            (Self::List(items), FieldType::List(item)) => items
                .iter()
                .all(|value| !value.is_null() && value.conforms_to(item)),
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Errors converting between a [`Document`] and a typed value.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum DocumentError {
    #[snafu(display("document has no identifier"))]
    MissingId,

    #[snafu(display("error reading field {field}: {reason}"))]
    Field { field: String, reason: String },
}

impl DocumentError {
    /// An error reading or converting the field `field`.
    pub fn field(field: impl Into<String>, reason: impl Display) -> Self {
        Self::Field {
            field: field.into(),
            reason: reason.to_string(),
        }
    }
}

/// A stored entity instance.
#[derive(Clone, Debug, Default, PartialEq, Deref, DerefMut, From, Into)]
pub struct Document(BTreeMap<String, Value>);

impl Document {
    /// The reserved field holding the document's identifier.
    pub const ID: &'static str = "_id";

    /// An empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// The identifier of this document, if it has been assigned one.
    pub fn id(&self) -> Option<&Id> {
        match self.0.get(Self::ID) {
            Some(Value::Id(id)) => Some(id),
            _ => None,
        }
    }

    /// The identifier of this document, failing if it has not been assigned one.
    pub fn require_id(&self) -> Result<&Id, DocumentError> {
        self.id().ok_or(DocumentError::MissingId)
    }

    /// Assign an identifier to this document.
    pub fn set_id(&mut self, id: Id) {
        self.0.insert(Self::ID.into(), Value::Id(id));
    }

    /// Set the field `name` to `value`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Set the field `name` to `value`, returning the updated document.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Read the field `name` as a `T`.
    ///
    /// A missing field reads as [`Value::Null`], which is only accepted by optional types.
    pub fn field<T: Stored>(&self, name: &str) -> Result<T, DocumentError> {
        T::from_value(self.0.get(name).cloned().unwrap_or(Value::Null))
            .map_err(|reason| DocumentError::field(name, reason))
    }

    /// The identifiers stored in the field `name`.
    ///
    /// Accepts both singleton references and lists of references. Anything else, including a
    /// missing field, yields no identifiers.
    pub fn ids(&self, name: &str) -> Vec<Id> {
        match self.0.get(name) {
            Some(Value::Id(id)) => vec![id.clone()],
            Some(Value::List(values)) => values
                .iter()
                .filter_map(|value| match value {
                    Value::Id(id) => Some(id.clone()),
                    _ => None,
                })
                .collect(),
            _ => vec![],
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Create a [`Document`] from a list of fields.
///
/// # Examples
///
/// ```
/// # use docgraph::{document, document::Value};
/// let doc = document! { "name" => "Ada", "born" => 1815 };
/// assert_eq!(doc["born"], Value::Int(1815));
/// ```
#[macro_export]
macro_rules! document {
    {$($name:expr => $value:expr),* $(,)?} => {
        <$crate::document::Document as ::std::iter::FromIterator<(String, $crate::document::Value)>>::from_iter([
            $((String::from($name), $crate::document::Value::from($value))),*
        ])
    };
}

/// A Rust type which can be stored in a [`Document`] field.
pub trait Stored: Sized {
    /// The type of the field storing this value.
    fn field_type() -> FieldType;

    /// Must a field of this type always hold a value?
    fn required() -> bool {
        true
    }

    /// Convert into a stored value.
    fn into_value(self) -> Value;

    /// Convert from a stored value.
    fn from_value(value: Value) -> Result<Self, String>;
}

fn mismatch(expected: &FieldType, value: &Value) -> String {
    format!("type mismatch (expected {expected}, got {})", value.kind())
}

macro_rules! stored_primitive {
    ($t:ty, $variant:ident, $field_type:ident) => {
        impl Stored for $t {
            fn field_type() -> FieldType {
                FieldType::$field_type
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: Value) -> Result<Self, String> {
                match value {
                    Value::$variant(v) => Ok(v),
                    v => Err(mismatch(&Self::field_type(), &v)),
                }
            }
        }
    };
}

stored_primitive!(String, String, String);
stored_primitive!(i64, Int, Int);
stored_primitive!(bool, Boolean, Boolean);
stored_primitive!(Id, Id, Id);

impl Stored for f64 {
    fn field_type() -> FieldType {
        FieldType::Float
    }

    fn into_value(self) -> Value {
        Value::Float(self)
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            v => Err(mismatch(&Self::field_type(), &v)),
        }
    }
}

impl<T: Stored> Stored for Option<T> {
    fn field_type() -> FieldType {
        T::field_type()
    }

    fn required() -> bool {
        false
    }

    fn into_value(self) -> Value {
        self.map(T::into_value).unwrap_or(Value::Null)
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            v => T::from_value(v).map(Some),
        }
    }
}

impl<T: Stored> Stored for Vec<T> {
    fn field_type() -> FieldType {
        FieldType::List(Box::new(T::field_type()))
    }

    fn into_value(self) -> Value {
        Value::List(self.into_iter().map(T::into_value).collect())
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            // A list which was never written is empty.
            Value::Null => Ok(vec![]),
            Value::List(values) => values.into_iter().map(T::from_value).collect(),
            v => Err(mismatch(&Self::field_type(), &v)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::init_logging;
    use proptest::prelude::*;

    #[test]
    fn test_generated_ids_parse() {
        init_logging();
        let id = Id::generate();
        assert_eq!(id.as_str().len(), 24);
        assert_eq!(Id::parse(id.as_str()), Ok(id.clone()));
        assert_ne!(id, Id::generate());
    }

    #[test]
    fn test_malformed_ids() {
        for input in ["", "123", "zzzzzzzzzzzzzzzzzzzzzzzz", "0123456789abcdef012345678"] {
            assert!(Id::parse(input).is_err(), "{input} should not parse");
        }
        assert_eq!(
            Id::parse("0123456789ABCDEF01234567").unwrap().as_str(),
            "0123456789abcdef01234567"
        );
    }

    #[test]
    fn test_optional_and_list_fields() {
        let id = Id::generate();
        let doc = document! {
            "name" => "Ada",
            "nickname" => Value::Null,
            "refs" => Value::List(vec![Value::Id(id.clone())]),
        };
        assert_eq!(doc.field::<String>("name").unwrap(), "Ada");
        assert_eq!(doc.field::<Option<String>>("nickname").unwrap(), None);
        assert_eq!(doc.field::<Option<String>>("missing").unwrap(), None);
        assert_eq!(doc.field::<Vec<Id>>("refs").unwrap(), vec![id.clone()]);
        assert_eq!(doc.field::<Vec<Id>>("missing").unwrap(), vec![]);
        assert_eq!(doc.ids("refs"), vec![id]);
        assert!(matches!(
            doc.field::<i64>("name"),
            Err(DocumentError::Field { .. })
        ));
        assert!(doc.field::<String>("missing").is_err());
    }

    #[test]
    fn test_conforms_to() {
        let ids = FieldType::List(Box::new(FieldType::Id));
        assert!(Value::List(vec![Value::Id(Id::generate())]).conforms_to(&ids));
        assert!(!Value::List(vec![Value::Null]).conforms_to(&ids));
        assert!(!Value::String("x".into()).conforms_to(&ids));
        assert!(Value::Int(1).conforms_to(&FieldType::Float));
        assert!(!Value::Float(1.5).conforms_to(&FieldType::Int));
        assert!(Value::Null.conforms_to(&FieldType::Boolean));
    }

    proptest! {
        #[test]
        fn test_id_parse_normalizes(bytes in any::<[u8; 12]>()) {
            let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
            let id = Id::parse(&hex).unwrap();
            prop_assert_eq!(id.as_str(), hex.to_ascii_lowercase());
        }
    }
}
