//! The persistence schema of an entity: collection shape plus validation rules.

use crate::document::{Document, Value};
use crate::entity::{EntityDescriptor, FieldType, ValueFn};
use derivative::Derivative;
use snafu::Snafu;

/// A write rejected by a [`CollectionSchema`].
#[derive(Clone, Debug, Snafu, PartialEq, Eq)]
pub enum ValidationError {
    #[snafu(display("missing required field {field}"))]
    MissingField { field: String },

    #[snafu(display("field {field} must be {expected}, got {actual}"))]
    TypeMismatch {
        field: String,
        expected: FieldType,
        actual: String,
    },

    #[snafu(display("unknown field {field}"))]
    UnknownField { field: String },

    #[snafu(display("required field {field} cannot be null"))]
    NullField { field: String },

    #[snafu(display("field {field} cannot be changed"))]
    ImmutableField { field: String },
}

/// The validation rule for one persisted field.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct ValidationRule {
    field: String,
    ty: FieldType,
    required: bool,
    unique: bool,
    #[derivative(Debug = "ignore")]
    default: Option<ValueFn>,
}

impl ValidationRule {
    /// The stored name of the field this rule validates.
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn ty(&self) -> &FieldType {
        &self.ty
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    fn check_type(&self, value: &Value) -> Result<(), ValidationError> {
        if value.conforms_to(&self.ty) {
            Ok(())
        } else {
            Err(ValidationError::TypeMismatch {
                field: self.field.clone(),
                expected: self.ty.clone(),
                actual: value.kind().into(),
            })
        }
    }
}

/// The shape of the collection storing one entity.
#[derive(Clone, Debug)]
pub struct CollectionSchema {
    entity: String,
    collection: String,
    rules: Vec<ValidationRule>,
}

impl CollectionSchema {
    /// Derive the persistence schema of an entity: one rule per persisted field.
    pub fn from_descriptor(descriptor: &EntityDescriptor) -> Self {
        Self {
            entity: descriptor.name().into(),
            collection: descriptor.collection(),
            rules: descriptor
                .persisted_fields()
                .map(|f| ValidationRule {
                    field: f.name().into(),
                    ty: f.ty().clone(),
                    required: f.is_required(),
                    unique: f.is_unique(),
                    default: f.default_fn(),
                })
                .collect(),
        }
    }

    /// The entity stored in this collection.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// The name of the collection.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn rules(&self) -> &[ValidationRule] {
        &self.rules
    }

    pub fn rule(&self, field: &str) -> Option<&ValidationRule> {
        self.rules.iter().find(|r| r.field == field)
    }

    /// Fields whose values must be distinct across the collection.
    pub fn unique_fields(&self) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .filter(|r| r.unique)
            .map(|r| r.field.as_str())
    }

    /// Validate a new document, applying defaults.
    ///
    /// Missing fields with a default are generated from the rest of the document, in declaration
    /// order. Missing list fields are initialized empty. Nulls in optional fields are dropped, so
    /// an absent optional field is never stored.
    pub fn validate_create(&self, mut doc: Document) -> Result<Document, ValidationError> {
        self.reject_unknown(&doc)?;
        if doc.contains_key(Document::ID) {
            return Err(ValidationError::ImmutableField {
                field: Document::ID.into(),
            });
        }

        for rule in &self.rules {
            let value = doc.remove(&rule.field).unwrap_or(Value::Null);
            let value = match (value, rule.default) {
                (Value::Null, Some(default)) => default(&doc),
                (Value::Null, None) if rule.ty.item().is_some() => Value::List(vec![]),
                (value, _) => value,
            };
            if value.is_null() {
                if rule.required {
                    return Err(ValidationError::MissingField {
                        field: rule.field.clone(),
                    });
                }
                continue;
            }
            rule.check_type(&value)?;
            doc.insert(rule.field.clone(), value);
        }
        Ok(doc)
    }

    /// Validate a partial update.
    ///
    /// Only the fields present in `changes` are checked. Required fields may not be set to null,
    /// and the identifier may not be changed at all.
    pub fn validate_update(&self, changes: Document) -> Result<Document, ValidationError> {
        if changes.contains_key(Document::ID) {
            return Err(ValidationError::ImmutableField {
                field: Document::ID.into(),
            });
        }
        self.reject_unknown(&changes)?;
        for (field, value) in changes.iter() {
            let Some(rule) = self.rule(field) else { continue };
            if value.is_null() && rule.required {
                return Err(ValidationError::NullField {
                    field: field.clone(),
                });
            }
            rule.check_type(value)?;
        }
        Ok(changes)
    }

    fn reject_unknown(&self, doc: &Document) -> Result<(), ValidationError> {
        match doc
            .keys()
            .find(|field| *field != Document::ID && self.rule(field).is_none())
        {
            Some(field) => Err(ValidationError::UnknownField {
                field: field.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::document::Id;
    use crate::entity::FieldDescriptor;
    use crate::{document, init_logging};

    fn shout(doc: &Document) -> Value {
        match doc.get("name") {
            Some(Value::String(name)) => Value::String(name.to_uppercase()),
            _ => Value::Null,
        }
    }

    fn schema() -> CollectionSchema {
        CollectionSchema::from_descriptor(
            &EntityDescriptor::new("Person", "People")
                .field(FieldDescriptor::of::<String>("name"))
                .field(FieldDescriptor::of::<String>("email").unique())
                .field(FieldDescriptor::of::<String>("handle").default_with(shout))
                .field(FieldDescriptor::of::<Option<i64>>("age"))
                .field(FieldDescriptor::of::<Vec<Id>>("friends"))
                .field(
                    FieldDescriptor::of::<String>("mood")
                        .exposed_only()
                        .source(shout),
                ),
        )
    }

    #[test]
    fn test_rules_cover_persisted_fields() {
        init_logging();
        let schema = schema();
        assert_eq!(schema.collection(), "people");
        let fields: Vec<_> = schema.rules().iter().map(|r| r.field()).collect();
        assert_eq!(fields, ["name", "email", "handle", "age", "friends"]);
        assert_eq!(schema.unique_fields().collect::<Vec<_>>(), ["email"]);
    }

    #[test]
    fn test_validate_create_applies_defaults() {
        let doc = schema()
            .validate_create(document! {
                "name" => "ada",
                "email" => "ada@example.com",
                "age" => Value::Null,
            })
            .unwrap();
        assert_eq!(doc["handle"], Value::from("ADA"));
        assert_eq!(doc["friends"], Value::List(vec![]));
        assert!(!doc.contains_key("age"));

        // Explicit values win over defaults.
        let doc = schema()
            .validate_create(document! {
                "name" => "ada",
                "email" => "ada@example.com",
                "handle" => "countess",
            })
            .unwrap();
        assert_eq!(doc["handle"], Value::from("countess"));
    }

    #[test]
    fn test_validate_create_errors() {
        let schema = schema();
        assert_eq!(
            schema.validate_create(document! { "name" => "ada" }),
            Err(ValidationError::MissingField {
                field: "email".into()
            })
        );
        assert_eq!(
            schema.validate_create(document! {
                "name" => "ada",
                "email" => "ada@example.com",
                "age" => "old",
            }),
            Err(ValidationError::TypeMismatch {
                field: "age".into(),
                expected: FieldType::Int,
                actual: "string".into(),
            })
        );
        assert_eq!(
            schema.validate_create(document! {
                "name" => "ada",
                "email" => "ada@example.com",
                "mood" => "happy",
            }),
            Err(ValidationError::UnknownField {
                field: "mood".into()
            })
        );
    }

    #[test]
    fn test_validate_update() {
        let schema = schema();
        assert!(schema.validate_update(document! { "age" => 36 }).is_ok());
        assert!(schema.validate_update(document! { "age" => Value::Null }).is_ok());
        assert_eq!(
            schema.validate_update(document! { "name" => Value::Null }),
            Err(ValidationError::NullField {
                field: "name".into()
            })
        );
        assert_eq!(
            schema.validate_update(document! { Document::ID => Id::generate() }),
            Err(ValidationError::ImmutableField {
                field: Document::ID.into()
            })
        );
    }
}
