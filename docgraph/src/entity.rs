//! Declarative entity descriptors.
//!
//! An [`EntityDescriptor`] is the single canonical definition of an entity's shape. Both the
//! persistence schema and the GraphQL type of the entity are derived from it by
//! [`schema::generate`](crate::schema::generate), so neither is ever authored independently.
//!
//! Descriptors are plain data, built with a small builder API:
//!
//! ```
//! # use docgraph::entity::{EntityDescriptor, FieldDescriptor};
//! # use docgraph::document::Id;
//! let descriptor = EntityDescriptor::new("Tag", "Tags")
//!     .description("A label attached to articles.")
//!     .field(FieldDescriptor::of::<String>("label").unique())
//!     .field(FieldDescriptor::of::<Vec<Id>>("articles").exposed_as("articleIds"));
//! assert_eq!(descriptor.collection(), "tags");
//! assert_eq!(descriptor.field_named("articles").unwrap().exposed_name(), "articleIds");
//! ```
//!
//! Most applications do not build descriptors by hand, but derive them from a struct with
//! [`#[derive(Entity)]`](derive@Entity).

use crate::document::{Document, DocumentError, Stored, Value};
use convert_case::{Case, Casing};
use derive_more::Display;

pub use docgraph_derive::Entity;

/// The type of a stored or exposed field.
#[derive(Clone, Debug, Display, PartialEq, Eq, Hash)]
pub enum FieldType {
    #[display(fmt = "String")]
    String,
    #[display(fmt = "Int")]
    Int,
    #[display(fmt = "Float")]
    Float,
    #[display(fmt = "Boolean")]
    Boolean,
    #[display(fmt = "ID")]
    Id,
    #[display(fmt = "[{}]", _0)]
    List(Box<FieldType>),
}

impl FieldType {
    /// The type of the items of a list type, or [`None`] for a scalar type.
    pub fn item(&self) -> Option<&FieldType> {
        match self {
            Self::List(item) => Some(item),
            _ => None,
        }
    }

    /// Is this an identifier, or a list of identifiers?
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Id) || self.item() == Some(&Self::Id)
    }
}

/// Which schemas a field appears in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Exposure {
    /// Stored, but never visible through GraphQL (e.g. a credential).
    PersistedOnly,
    /// Visible through GraphQL, but computed from other fields rather than stored.
    ExposedOnly,
    /// Stored and visible.
    #[default]
    Both,
}

/// Who may mutate an instance of an entity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// Any authenticated caller.
    #[default]
    None,
    /// The caller whose identity is the instance itself.
    SelfOwned,
    /// The caller whose identity is stored in the named identifier field.
    Field(String),
}

/// A function deriving a field value from the other fields of a document.
pub type ValueFn = fn(&Document) -> Value;

/// The declaration of a single field of an entity.
#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    name: String,
    ty: FieldType,
    required: bool,
    unique: bool,
    default: Option<ValueFn>,
    source: Option<ValueFn>,
    exposure: Exposure,
    exposed_name: Option<String>,
    references: Option<String>,
    resolved_as: Option<String>,
    back_reference: Option<String>,
    read_only: bool,
    description: Option<String>,
}

impl FieldDescriptor {
    /// A field called `name` of type `ty`.
    pub fn new(name: impl Into<String>, ty: FieldType, required: bool) -> Self {
        Self {
            name: name.into(),
            ty,
            required,
            unique: false,
            default: None,
            source: None,
            exposure: Exposure::Both,
            exposed_name: None,
            references: None,
            resolved_as: None,
            back_reference: None,
            read_only: false,
            description: None,
        }
    }

    /// A field called `name` holding values of the Rust type `T`.
    ///
    /// The field type and requiredness follow `T`: `Option<T>` is optional, everything else
    /// required.
    pub fn of<T: Stored>(name: impl Into<String>) -> Self {
        Self::new(name, T::field_type(), T::required())
    }

    /// Require every stored value of this field to be distinct.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Generate a value for this field when a write omits it.
    ///
    /// The generator sees the rest of the document being written. A field with a default is
    /// optional on input even if it is required at rest.
    pub fn default_with(mut self, default: ValueFn) -> Self {
        self.default = Some(default);
        self
    }

    /// Store this field but never expose it through GraphQL.
    pub fn persisted_only(mut self) -> Self {
        self.exposure = Exposure::PersistedOnly;
        self
    }

    /// Expose this field through GraphQL without storing it.
    ///
    /// The value must be derived from stored fields with [`source`](Self::source).
    pub fn exposed_only(mut self) -> Self {
        self.exposure = Exposure::ExposedOnly;
        self
    }

    /// The function computing an exposed-only field.
    pub fn source(mut self, source: ValueFn) -> Self {
        self.source = Some(source);
        self
    }

    /// Expose this field under `name` instead of the camelCase form of its stored name.
    pub fn exposed_as(mut self, name: impl Into<String>) -> Self {
        self.exposed_name = Some(name.into());
        self
    }

    /// Mark this identifier (or identifier list) field as a reference to the entity `entity`.
    pub fn references(mut self, entity: impl Into<String>) -> Self {
        self.references = Some(entity.into());
        self
    }

    /// Expose the referenced entities through an additional resolver-backed field `name`.
    pub fn resolved_as(mut self, name: impl Into<String>) -> Self {
        self.resolved_as = Some(name.into());
        self
    }

    /// Keep the identifier list `field` of each referenced document in sync with this one.
    ///
    /// When a document is created, its identifier is appended to `field` of the document it
    /// references; when it is deleted, its identifier is removed again.
    pub fn back_reference(mut self, field: impl Into<String>) -> Self {
        self.back_reference = Some(field.into());
        self
    }

    /// Never accept this field as input to a create or update.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Set the documentation of this field.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The stored name of this field.
    pub fn name(&self) -> &str {
        &self.name
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

    pub fn default_fn(&self) -> Option<ValueFn> {
        self.default
    }

    pub fn value_source(&self) -> Option<ValueFn> {
        self.source
    }

    pub fn exposure(&self) -> Exposure {
        self.exposure
    }

    /// Is this field stored?
    pub fn is_persisted(&self) -> bool {
        self.exposure != Exposure::ExposedOnly
    }

    /// Is this field visible through GraphQL?
    pub fn is_exposed(&self) -> bool {
        self.exposure != Exposure::PersistedOnly
    }

    /// The name of this field in the GraphQL schema.
    ///
    /// This is the explicit name given with [`exposed_as`](Self::exposed_as), or else the
    /// camelCase form of the stored name. Persisted-only fields use the same name for their input
    /// arguments.
    pub fn exposed_name(&self) -> String {
        self.exposed_name
            .clone()
            .unwrap_or_else(|| self.name.to_case(Case::Camel))
    }

    pub fn references_entity(&self) -> Option<&str> {
        self.references.as_deref()
    }

    pub fn resolved_name(&self) -> Option<&str> {
        self.resolved_as.as_deref()
    }

    pub fn back_reference_field(&self) -> Option<&str> {
        self.back_reference.as_deref()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn doc(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Must a create supply a value for this field?
    pub fn required_on_input(&self) -> bool {
        self.required && self.default.is_none()
    }

    fn same_shape(&self, other: &Self) -> bool {
        self.name == other.name
            && self.ty == other.ty
            && self.required == other.required
            && self.unique == other.unique
            && self.default.is_some() == other.default.is_some()
            && self.source.is_some() == other.source.is_some()
            && self.exposure == other.exposure
            && self.exposed_name() == other.exposed_name()
            && self.references == other.references
            && self.resolved_as == other.resolved_as
            && self.back_reference == other.back_reference
            && self.read_only == other.read_only
    }
}

/// The declaration of an entity.
#[derive(Clone, Debug)]
pub struct EntityDescriptor {
    name: String,
    plural: String,
    collection: Option<String>,
    description: Option<String>,
    ownership: Ownership,
    fields: Vec<FieldDescriptor>,
}

impl EntityDescriptor {
    /// An entity called `name`, with no fields other than its identifier.
    ///
    /// `plural` names the list operation (`get{plural}`) and, converted to snake_case, the
    /// collection storing the entity.
    pub fn new(name: impl Into<String>, plural: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plural: plural.into(),
            collection: None,
            description: None,
            ownership: Ownership::None,
            fields: vec![],
        }
    }

    /// Store this entity in `collection` instead of the default.
    pub fn collection_name(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Set the documentation of this entity.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare who may update and delete instances of this entity.
    pub fn ownership(mut self, ownership: Ownership) -> Self {
        self.ownership = ownership;
        self
    }

    /// Add a field.
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plural(&self) -> &str {
        &self.plural
    }

    /// The collection storing instances of this entity.
    pub fn collection(&self) -> String {
        self.collection
            .clone()
            .unwrap_or_else(|| self.plural.to_case(Case::Snake))
    }

    pub fn doc(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn owner(&self) -> &Ownership {
        &self.ownership
    }

    /// The name of the field holding each instance's owner, if ownership is field-based.
    pub fn owner_field(&self) -> Option<&str> {
        match &self.ownership {
            Ownership::Field(field) => Some(field),
            _ => None,
        }
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Look up a field by its stored name.
    pub fn field_named(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields which are stored.
    pub fn persisted_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_persisted())
    }

    /// Fields which a client may supply when creating or updating an instance.
    ///
    /// These are the stored fields other than read-only fields and the owner field, which is
    /// always filled from the caller's identity.
    pub fn input_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        let owner = self.owner_field().map(String::from);
        self.persisted_fields()
            .filter(move |f| !f.read_only && Some(f.name()) != owner.as_deref())
    }

    /// Do `self` and `other` describe the same entity?
    ///
    /// Descriptors with the same shape may be registered any number of times. Documentation is
    /// not part of the shape.
    pub fn same_shape(&self, other: &Self) -> bool {
        self.name == other.name
            && self.plural == other.plural
            && self.collection() == other.collection()
            && self.ownership == other.ownership
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.same_shape(b))
    }
}

/// A Rust type with a canonical entity descriptor.
///
/// This trait is usually derived; see [`Entity`](derive@Entity).
pub trait Entity: Sized + Send + Sync + 'static {
    /// The name of the entity, which is also the name of its GraphQL type.
    const NAME: &'static str;
    /// The plural of [`NAME`](Self::NAME).
    const PLURAL_NAME: &'static str;

    /// The descriptor of this entity.
    fn descriptor() -> EntityDescriptor;

    /// Read an instance from a stored document.
    fn from_document(doc: &Document) -> Result<Self, DocumentError>;

    /// Convert an instance into a document containing its stored fields.
    fn into_document(self) -> Document;
}
