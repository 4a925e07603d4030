//! Common items that you will always want in scope when defining entities.

pub use crate::api::{Api, ApiBuilder, ComputedField, Resolved, Resolver};
pub use crate::auth::{Identity, Role};
pub use crate::document::{Document, Id, Value};
pub use crate::entity::{
    Entity, EntityDescriptor, FieldDescriptor, FieldType, Ownership,
};
pub use crate::schema::OutputType;
pub use crate::store::DocumentStore;
pub use async_graphql::{self, value};
