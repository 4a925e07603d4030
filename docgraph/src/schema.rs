//! Derivation of persistence schemas and GraphQL types from entity descriptors.
//!
//! [`generate`] is the only way to obtain a [`Registry`]: for every entity it derives a
//! [`CollectionSchema`] and a [`QueryType`] from the same [`EntityDescriptor`], after checking the
//! whole set of descriptors for configuration errors. Generation happens once at startup and fails
//! fast, so that a conflicting or dangling declaration can never surface at query time.

use crate::entity::{EntityDescriptor, Exposure, FieldType, Ownership};
use snafu::Snafu;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};

pub mod persistence;
pub mod query;

pub use persistence::{CollectionSchema, ValidationError, ValidationRule};
pub use query::{FieldKind, InputField, Operations, OutputType, QueryField, QueryType};

/// Type names which entities may not use.
const RESERVED_NAMES: &[&str] = &[
    "String",
    "Int",
    "Float",
    "Boolean",
    "ID",
    "Query",
    "Mutation",
    "Subscription",
];

/// A configuration error detected while generating schemas.
#[derive(Clone, Debug, Snafu, PartialEq, Eq)]
pub enum Error {
    #[snafu(display("entity {entity} is declared twice with different shapes"))]
    ConflictingEntity { entity: String },

    #[snafu(display("{name} is not a valid GraphQL name or is reserved"))]
    InvalidName { name: String },

    #[snafu(display("generated type name {name} is used twice"))]
    TypeNameCollision { name: String },

    #[snafu(display("generated operation {operation} is used twice"))]
    OperationCollision { operation: String },

    #[snafu(display("collection {collection} stores more than one entity"))]
    CollectionCollision { collection: String },

    #[snafu(display("entity {entity} has two fields named {field}"))]
    DuplicateField { entity: String, field: String },

    #[snafu(display("field {field} of {entity} refers to unknown entity {target}"))]
    UnknownEntity {
        entity: String,
        field: String,
        target: String,
    },

    #[snafu(display("computed field {field} is declared on unknown entity {entity}"))]
    UnknownComputedEntity { entity: String, field: String },

    #[snafu(display("field {field} of {entity} is not a valid reference: {reason}"))]
    InvalidReference {
        entity: String,
        field: String,
        reason: String,
    },

    #[snafu(display(
        "field {field} of {entity} keeps {target}.{back_reference} in sync, but that is not a stored identifier list"
    ))]
    InvalidBackReference {
        entity: String,
        field: String,
        target: String,
        back_reference: String,
    },

    #[snafu(display("exposed-only field {field} of {entity} has no value source"))]
    MissingSource { entity: String, field: String },

    #[snafu(display("field {field} of {entity} is a nested list"))]
    NestedList { entity: String, field: String },

    #[snafu(display("owner field {field} of {entity} must be a required, stored identifier"))]
    InvalidOwner { entity: String, field: String },
}

/// The declaration of a resolver-backed field with no stored counterpart.
///
/// The resolver itself is registered with the [`api`](crate::api); the generator only needs its
/// name and type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Computed {
    pub entity: String,
    pub name: String,
    pub ty: OutputType,
    pub description: Option<String>,
}

/// Everything generated for one entity.
#[derive(Clone, Debug)]
pub struct GeneratedEntity {
    pub descriptor: Arc<EntityDescriptor>,
    pub persistence: CollectionSchema,
    pub query: QueryType,
}

/// The generated schemas of every entity, immutable after startup.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    entities: Vec<GeneratedEntity>,
}

impl Registry {
    /// All generated entities, in registration order.
    pub fn entities(&self) -> &[GeneratedEntity] {
        &self.entities
    }

    /// Look up an entity by name.
    pub fn get(&self, entity: &str) -> Option<&GeneratedEntity> {
        self.entities.iter().find(|e| e.descriptor.name() == entity)
    }
}

/// Generate the persistence schema and GraphQL type of each entity.
///
/// Descriptors with the same name must have the same shape; the duplicates are ignored. Computed
/// fields are appended to the GraphQL type of the entity they are declared on.
#[instrument(skip(descriptors, computed))]
pub fn generate(
    descriptors: impl IntoIterator<Item = EntityDescriptor>,
    computed: &[Computed],
) -> Result<Registry, Error> {
    let mut unique: Vec<EntityDescriptor> = vec![];
    for descriptor in descriptors {
        match unique.iter().find(|d| d.name() == descriptor.name()) {
            Some(existing) if existing.same_shape(&descriptor) => {
                debug!(entity = descriptor.name(), "ignoring identical re-registration");
            }
            Some(_) => {
                return Err(Error::ConflictingEntity {
                    entity: descriptor.name().into(),
                })
            }
            None => unique.push(descriptor),
        }
    }

    let mut entities = vec![];
    let mut type_names = HashSet::new();
    let mut operations = HashSet::new();
    let mut collections = HashSet::new();
    for descriptor in &unique {
        check_name(descriptor.name())?;
        if RESERVED_NAMES.contains(&descriptor.name()) {
            return Err(Error::InvalidName {
                name: descriptor.name().into(),
            });
        }
        check_fields(descriptor, &unique)?;

        let query = QueryType::from_descriptor(descriptor);
        for name in [query.name.clone(), query.update_input_name()] {
            if !type_names.insert(name.clone()) {
                return Err(Error::TypeNameCollision { name });
            }
        }
        for operation in query.operations.names() {
            check_name(operation)?;
            if !operations.insert(operation.to_string()) {
                return Err(Error::OperationCollision {
                    operation: operation.into(),
                });
            }
        }
        let persistence = CollectionSchema::from_descriptor(descriptor);
        if !collections.insert(persistence.collection().to_string()) {
            return Err(Error::CollectionCollision {
                collection: persistence.collection().into(),
            });
        }

        entities.push(GeneratedEntity {
            descriptor: Arc::new(descriptor.clone()),
            persistence,
            query,
        });
    }

    for field in computed {
        let Some(entity) = entities
            .iter_mut()
            .find(|e| e.descriptor.name() == field.entity)
        else {
            return Err(Error::UnknownComputedEntity {
                entity: field.entity.clone(),
                field: field.name.clone(),
            });
        };
        match &field.ty {
            OutputType::Scalar { ty, .. } => check_type(&field.entity, &field.name, ty)?,
            ty => {
                let target = ty.entity_name().unwrap_or_default();
                if !unique.iter().any(|d| d.name() == target) {
                    return Err(Error::UnknownEntity {
                        entity: field.entity.clone(),
                        field: field.name.clone(),
                        target: target.into(),
                    });
                }
            }
        }
        entity.query.fields.push(QueryField {
            name: field.name.clone(),
            ty: field.ty.clone(),
            kind: FieldKind::Computed,
            description: field.description.clone(),
        });
    }

    for entity in &entities {
        check_exposed_names(entity)?;
        debug!(
            entity = %entity.query.name,
            collection = entity.persistence.collection(),
            "generated schemas"
        );
    }
    Ok(Registry { entities })
}

/// Check that `name` is a valid GraphQL name which does not use the reserved `__` prefix.
fn check_name(name: &str) -> Result<(), Error> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        && !name.starts_with("__");
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidName { name: name.into() })
    }
}

fn check_type(entity: &str, field: &str, ty: &FieldType) -> Result<(), Error> {
    if ty.item().and_then(FieldType::item).is_some() {
        return Err(Error::NestedList {
            entity: entity.into(),
            field: field.into(),
        });
    }
    Ok(())
}

fn check_fields(descriptor: &EntityDescriptor, all: &[EntityDescriptor]) -> Result<(), Error> {
    let entity = descriptor.name();
    let invalid_reference = |field: &str, reason: &str| Error::InvalidReference {
        entity: entity.into(),
        field: field.into(),
        reason: reason.into(),
    };

    let mut persisted = HashSet::new();
    for f in descriptor.fields() {
        let name = f.name();
        if f.is_persisted() && (name == crate::document::Document::ID || !persisted.insert(name)) {
            return Err(Error::DuplicateField {
                entity: entity.into(),
                field: name.into(),
            });
        }
        check_type(entity, name, f.ty())?;
        if f.exposure() == Exposure::ExposedOnly && f.value_source().is_none() {
            return Err(Error::MissingSource {
                entity: entity.into(),
                field: name.into(),
            });
        }

        let Some(target) = f.references_entity() else {
            if f.resolved_name().is_some() || f.back_reference_field().is_some() {
                return Err(invalid_reference(name, "only references can be resolved"));
            }
            continue;
        };
        let Some(target_descriptor) = all.iter().find(|d| d.name() == target) else {
            return Err(Error::UnknownEntity {
                entity: entity.into(),
                field: name.into(),
                target: target.into(),
            });
        };
        if !f.ty().is_reference() {
            return Err(invalid_reference(name, "must be an identifier or identifier list"));
        }
        if !f.is_persisted() {
            return Err(invalid_reference(name, "references must be stored"));
        }
        if let Some(back) = f.back_reference_field() {
            let valid = target_descriptor.field_named(back).map_or(false, |b| {
                b.is_persisted() && *b.ty() == FieldType::List(Box::new(FieldType::Id))
            });
            if !valid {
                return Err(Error::InvalidBackReference {
                    entity: entity.into(),
                    field: name.into(),
                    target: target.into(),
                    back_reference: back.into(),
                });
            }
        }
    }

    if let Ownership::Field(owner) = descriptor.owner() {
        let valid = descriptor.field_named(owner).map_or(false, |f| {
            f.is_persisted() && f.is_required() && *f.ty() == FieldType::Id
        });
        if !valid {
            return Err(Error::InvalidOwner {
                entity: entity.into(),
                field: owner.clone(),
            });
        }
    }
    Ok(())
}

fn check_exposed_names(entity: &GeneratedEntity) -> Result<(), Error> {
    let duplicate = |field: &str| Error::DuplicateField {
        entity: entity.query.name.clone(),
        field: field.into(),
    };

    let mut exposed = HashSet::new();
    for name in entity.query.field_names() {
        check_name(name)?;
        if !exposed.insert(name) {
            return Err(duplicate(name));
        }
    }

    // Input arguments share a namespace with the identifier in the update input.
    let mut inputs = HashSet::from([QueryType::ID_FIELD]);
    for input in &entity.query.inputs {
        check_name(&input.name)?;
        if !inputs.insert(input.name.as_str()) {
            return Err(duplicate(&input.name));
        }
    }
    Ok(())
}
