//! The GraphQL type of an entity.
//!
//! A [`QueryType`] is a plain description of the object type, its input arguments and its root
//! operations. The [`api`](crate::api) module turns it into a live `async-graphql` schema.

use crate::entity::{EntityDescriptor, FieldType, ValueFn};
use convert_case::{Case, Casing};
use derivative::Derivative;

/// The GraphQL type of a field in an object type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum OutputType {
    /// A scalar, or a list of non-null scalars.
    Scalar { ty: FieldType, nullable: bool },
    /// A single instance of an entity.
    Entity { name: String, nullable: bool },
    /// A non-null list of non-null instances of an entity.
    EntityList { name: String },
}

impl OutputType {
    pub fn scalar(ty: FieldType, nullable: bool) -> Self {
        Self::Scalar { ty, nullable }
    }

    pub fn entity(name: impl Into<String>, nullable: bool) -> Self {
        Self::Entity {
            name: name.into(),
            nullable,
        }
    }

    pub fn entity_list(name: impl Into<String>) -> Self {
        Self::EntityList { name: name.into() }
    }

    /// The entity this type refers to, if any.
    pub fn entity_name(&self) -> Option<&str> {
        match self {
            Self::Scalar { .. } => None,
            Self::Entity { name, .. } | Self::EntityList { name } => Some(name),
        }
    }
}

/// Where the value of an object field comes from.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub enum FieldKind {
    /// The document identifier.
    Id,
    /// A stored field, read verbatim.
    Stored { persisted: String },
    /// An exposed-only field computed from the stored document.
    Derived {
        #[derivative(Debug = "ignore")]
        source: ValueFn,
    },
    /// Related entities, resolved by identifier from a stored reference field.
    Reference {
        persisted: String,
        target: String,
        many: bool,
    },
    /// A field produced by a registered resolver.
    Computed,
}

/// A field of a [`QueryType`].
#[derive(Clone, Debug)]
pub struct QueryField {
    pub name: String,
    pub ty: OutputType,
    pub kind: FieldKind,
    pub description: Option<String>,
}

/// An input argument accepted by the create and update operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputField {
    /// The argument name.
    pub name: String,
    /// The stored field the argument writes.
    pub persisted: String,
    pub ty: FieldType,
    /// Must a create supply this argument?
    pub required: bool,
    pub description: Option<String>,
}

/// Names of the root operations generated for an entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operations {
    /// `get{Plural}`: list all instances.
    pub list: String,
    /// `get{Name}ById(id)`.
    pub get: String,
    /// `add{Name}(<inputs>)`.
    pub create: String,
    /// `update{Name}(<argument>: {Name}UpdateInput)`.
    pub update: String,
    /// The argument name of the update operation.
    pub update_argument: String,
    /// `delete{Name}(id)`.
    pub delete: String,
}

impl Operations {
    fn new(descriptor: &EntityDescriptor) -> Self {
        let name = descriptor.name();
        Self {
            list: format!("get{}", descriptor.plural()),
            get: format!("get{name}ById"),
            create: format!("add{name}"),
            update: format!("update{name}"),
            update_argument: name.to_case(Case::Camel),
            delete: format!("delete{name}"),
        }
    }

    /// All operation names, queries first.
    pub fn names(&self) -> [&str; 5] {
        [
            &self.list,
            &self.get,
            &self.create,
            &self.update,
            &self.delete,
        ]
    }
}

/// The GraphQL surface of one entity.
#[derive(Clone, Debug)]
pub struct QueryType {
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<QueryField>,
    pub inputs: Vec<InputField>,
    pub operations: Operations,
}

impl QueryType {
    /// The name of the identifier field of every entity type.
    pub const ID_FIELD: &'static str = "id";

    /// Derive the GraphQL type of an entity.
    ///
    /// The object type has the identifier, one field per exposed field under its exposed name
    /// and one resolver-backed field per resolved relationship. Persisted-only fields are left out
    /// of the object type, although they may still be supplied as input.
    pub fn from_descriptor(descriptor: &EntityDescriptor) -> Self {
        let mut fields = vec![QueryField {
            name: Self::ID_FIELD.into(),
            ty: OutputType::scalar(FieldType::Id, false),
            kind: FieldKind::Id,
            description: None,
        }];
        for f in descriptor.fields() {
            if f.is_exposed() {
                let kind = match f.value_source() {
                    Some(source) if !f.is_persisted() => FieldKind::Derived { source },
                    _ => FieldKind::Stored {
                        persisted: f.name().into(),
                    },
                };
                fields.push(QueryField {
                    name: f.exposed_name(),
                    ty: OutputType::scalar(f.ty().clone(), !f.is_required()),
                    kind,
                    description: f.doc().map(String::from),
                });
            }
            if let (Some(target), Some(resolved)) = (f.references_entity(), f.resolved_name()) {
                let many = f.ty().item().is_some();
                fields.push(QueryField {
                    name: resolved.into(),
                    ty: if many {
                        OutputType::entity_list(target)
                    } else {
                        // The referenced instance may have been deleted since.
                        OutputType::entity(target, true)
                    },
                    kind: FieldKind::Reference {
                        persisted: f.name().into(),
                        target: target.into(),
                        many,
                    },
                    description: f.doc().map(String::from),
                });
            }
        }

        let inputs = descriptor
            .input_fields()
            .map(|f| InputField {
                name: f.exposed_name(),
                persisted: f.name().into(),
                ty: f.ty().clone(),
                required: f.required_on_input(),
                description: f.doc().map(String::from),
            })
            .collect();

        Self {
            name: descriptor.name().into(),
            description: descriptor.doc().map(String::from),
            fields,
            inputs,
            operations: Operations::new(descriptor),
        }
    }

    /// The name of the input object accepted by the update operation.
    pub fn update_input_name(&self) -> String {
        format!("{}UpdateInput", self.name)
    }

    pub fn field(&self, name: &str) -> Option<&QueryField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of the fields of the object type.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}
