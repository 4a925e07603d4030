//! Abstract interface to a document store.
//!
//! The operation handlers only need a handful of primitive operations, captured by
//! [`DocumentStore`]. There are no transactions and no bulk operations: every call reads or writes
//! at most one document, except [`find_all`](DocumentStore::find_all).

use crate::document::{Document, Id, Value};
use crate::schema::CollectionSchema;
use async_trait::async_trait;
use derive_more::Display;

pub mod mock;
pub mod mongo;

/// Errors returned by a document store.
pub trait Error: Sized + Send + Sync + std::error::Error + 'static {
    /// Wrap a custom message into this error type.
    fn custom(msg: impl std::fmt::Display) -> Self;

    /// If this error is a violation of a uniqueness constraint, the field that was violated.
    fn duplicate_field(&self) -> Option<&str> {
        None
    }
}

/// The state of the connection to a store.
#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum ConnectionState {
    #[display(fmt = "connecting")]
    Connecting,
    #[display(fmt = "open")]
    Open,
    #[display(fmt = "error: {}", _0)]
    Error(String),
}

/// A conjunction of equality conditions on document fields.
///
/// A condition on a list field is satisfied if the list contains the value, so that documents can
/// be found by any member of a reference list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// Match documents whose field `field` equals `value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::default().and(field, value)
    }

    /// Match the document with the identifier `id`.
    pub fn by_id(id: Id) -> Self {
        Self::eq(Document::ID, id)
    }

    /// Additionally require `field` to equal `value`.
    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    /// Does `doc` satisfy every condition?
    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|(field, value)| {
            match doc.get(field).unwrap_or(&Value::Null) {
                Value::List(items) if !matches!(value, Value::List(_)) => items.contains(value),
                actual => actual == value,
            }
        })
    }
}

/// Changes applied to a single document in one atomic step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Update {
    set: Document,
    push: Vec<(String, Value)>,
    pull: Vec<(String, Value)>,
}

impl Update {
    /// Overwrite every field in `fields`.
    pub fn set(fields: Document) -> Self {
        Self {
            set: fields,
            ..Default::default()
        }
    }

    /// Append `value` to the list field `field`.
    pub fn push(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push.push((field.into(), value.into()));
        self
    }

    /// Remove every occurrence of `value` from the list field `field`.
    pub fn pull(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.pull.push((field.into(), value.into()));
        self
    }

    pub fn fields(&self) -> &Document {
        &self.set
    }

    pub fn pushes(&self) -> &[(String, Value)] {
        &self.push
    }

    pub fn pulls(&self) -> &[(String, Value)] {
        &self.pull
    }

    /// Does this update change nothing?
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.push.is_empty() && self.pull.is_empty()
    }

    /// Apply this update to `doc` in memory.
    pub fn apply(&self, doc: &mut Document) {
        for (field, value) in self.set.iter() {
            doc.insert(field.clone(), value.clone());
        }
        for (field, value) in &self.push {
            match doc.get_mut(field) {
                Some(Value::List(items)) => items.push(value.clone()),
                _ => {
                    doc.insert(field.clone(), Value::List(vec![value.clone()]));
                }
            }
        }
        for (field, value) in &self.pull {
            if let Some(Value::List(items)) = doc.get_mut(field) {
                items.retain(|item| item != value);
            }
        }
    }
}

/// A connection to a document store.
#[async_trait]
pub trait DocumentStore: Clone + Send + Sync + 'static {
    /// Errors returned from store operations.
    type Error: Error;

    /// The current state of the connection.
    ///
    /// Stores without a connection to manage are always open.
    fn state(&self) -> ConnectionState {
        ConnectionState::Open
    }

    /// Prepare a collection to store documents described by `schema`.
    ///
    /// This installs whatever the store uses to enforce the schema, such as unique indexes. It is
    /// idempotent. A store which is not connected may defer the work until it is, rather than
    /// fail.
    async fn register(&self, schema: &CollectionSchema) -> Result<(), Self::Error>;

    /// Every document in `collection`, in insertion order where the store has one.
    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, Self::Error>;

    /// The document in `collection` with identifier `id`, if there is one.
    async fn find_by_id(&self, collection: &str, id: &Id)
        -> Result<Option<Document>, Self::Error>;

    /// Some document in `collection` matching `filter`, if there is one.
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, Self::Error>;

    /// Store a new document, returning it with its newly assigned identifier.
    ///
    /// Fails with an error whose [`duplicate_field`](Error::duplicate_field) is set if the document
    /// would violate a uniqueness constraint, in which case nothing is stored.
    async fn create(&self, collection: &str, doc: Document) -> Result<Document, Self::Error>;

    /// Atomically apply `update` to some document matching `filter`, returning the updated
    /// document, or [`None`] if no document matches.
    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: Update,
    ) -> Result<Option<Document>, Self::Error>;

    /// Delete the document with identifier `id`, returning it if it existed.
    async fn find_by_id_and_delete(
        &self,
        collection: &str,
        id: &Id,
    ) -> Result<Option<Document>, Self::Error>;
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{document, init_logging};

    #[test]
    fn test_filter_matches() {
        init_logging();
        let id = Id::generate();
        let doc = document! {
            "name" => "ada",
            "refs" => Value::List(vec![Value::Id(id.clone())]),
        };
        assert!(Filter::eq("name", "ada").matches(&doc));
        assert!(!Filter::eq("name", "bob").matches(&doc));
        assert!(Filter::eq("refs", id.clone()).matches(&doc));
        assert!(Filter::eq("name", "ada").and("refs", id).matches(&doc));
        assert!(Filter::eq("missing", Value::Null).matches(&doc));
        assert!(Filter::default().matches(&doc));
    }

    #[test]
    fn test_update_apply() {
        let a = Id::generate();
        let b = Id::generate();
        let mut doc = document! {
            "name" => "ada",
            "refs" => Value::List(vec![Value::Id(a.clone()), Value::Id(b.clone())]),
        };
        Update::set(document! { "name" => "countess" })
            .push("others", a.clone())
            .pull("refs", a.clone())
            .apply(&mut doc);
        assert_eq!(
            doc,
            document! {
                "name" => "countess",
                "refs" => Value::List(vec![Value::Id(b)]),
                "others" => Value::List(vec![Value::Id(a)]),
            }
        );
        assert!(Update::default().is_empty());
    }
}
