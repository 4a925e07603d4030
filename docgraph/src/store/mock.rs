//! Mock instantiation of the abstract [`store`](super) interface.
//!
//! This instantiation is built on a simple in-memory store. It is useful for testing in isolation
//! from an actual database, and for running the server without one.
#![cfg(any(test, feature = "mocks"))]

use super::{DocumentStore, Filter, Update};
use crate::document::{Document, Id};
use crate::schema::CollectionSchema;
use async_std::sync::{Arc, RwLock};
use async_trait::async_trait;
use snafu::Snafu;
use std::collections::HashMap;
use std::fmt::Display;

/// Errors returned by the in-memory store.
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("mock store error: duplicate value for unique field {collection}.{field}"))]
    Duplicate { collection: String, field: String },

    #[snafu(display("mock store error: {message}"))]
    Custom { message: String },
}

impl super::Error for Error {
    fn custom(msg: impl Display) -> Self {
        Self::Custom {
            message: msg.to_string(),
        }
    }

    fn duplicate_field(&self) -> Option<&str> {
        match self {
            Self::Duplicate { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// The in-memory store.
#[derive(Debug, Default)]
struct Db {
    collections: HashMap<String, Collection>,
}

impl Db {
    fn collection(&mut self, name: &str) -> &mut Collection {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| Collection::new(name))
    }
}

/// An in-memory collection.
#[derive(Debug)]
struct Collection {
    name: String,
    unique: Vec<String>,
    docs: Vec<Document>,
}

impl Collection {
    fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            unique: vec![],
            docs: vec![],
        }
    }

    /// Check that `doc` can be stored at `index` (or appended) without violating uniqueness.
    fn check_unique(&self, doc: &Document, index: Option<usize>) -> Result<(), Error> {
        for field in &self.unique {
            let Some(value) = doc.get(field).filter(|value| !value.is_null()) else { continue };
            let conflict = self
                .docs
                .iter()
                .enumerate()
                .any(|(i, other)| Some(i) != index && other.get(field) == Some(value));
            if conflict {
                return Err(Error::Duplicate {
                    collection: self.name.clone(),
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }

    fn position(&self, filter: &Filter) -> Option<usize> {
        self.docs.iter().position(|doc| filter.matches(doc))
    }
}

/// A connection to the in-memory store.
#[derive(Clone, Debug)]
pub struct Connection(Arc<RwLock<Db>>);

impl Connection {
    /// Create a new store and connect to it.
    ///
    /// This will create a connection to a fresh, empty store. It will not be connected or related
    /// to any previous connection or store. Once the store is created, this connection can be
    /// [cloned](Clone) in order to create multiple simultaneous connections to the same store.
    pub fn create() -> Self {
        Self(Default::default())
    }

    /// The number of documents in `collection`.
    pub async fn len(&self, collection: &str) -> usize {
        self.0
            .read()
            .await
            .collections
            .get(collection)
            .map_or(0, |c| c.docs.len())
    }
}

#[async_trait]
impl DocumentStore for Connection {
    type Error = Error;

    async fn register(&self, schema: &CollectionSchema) -> Result<(), Self::Error> {
        let mut db = self.0.write().await;
        let collection = db.collection(schema.collection());
        for field in schema.unique_fields() {
            if !collection.unique.iter().any(|f| f == field) {
                collection.unique.push(field.into());
            }
        }
        tracing::debug!(collection = schema.collection(), "registered collection");
        Ok(())
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, Self::Error> {
        let db = self.0.read().await;
        Ok(db
            .collections
            .get(collection)
            .map(|c| c.docs.clone())
            .unwrap_or_default())
    }

    async fn find_by_id(
        &self,
        collection: &str,
        id: &Id,
    ) -> Result<Option<Document>, Self::Error> {
        self.find_one(collection, &Filter::by_id(id.clone())).await
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, Self::Error> {
        let db = self.0.read().await;
        Ok(db
            .collections
            .get(collection)
            .and_then(|c| c.docs.iter().find(|doc| filter.matches(doc)).cloned()))
    }

    async fn create(&self, collection: &str, mut doc: Document) -> Result<Document, Self::Error> {
        let mut db = self.0.write().await;
        let collection = db.collection(collection);
        if doc.id().is_none() {
            doc.set_id(Id::generate());
        }
        collection.check_unique(&doc, None)?;
        tracing::debug!(collection = %collection.name, id = ?doc.id(), "inserting document");
        collection.docs.push(doc.clone());
        Ok(doc)
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Filter,
        update: Update,
    ) -> Result<Option<Document>, Self::Error> {
        let mut db = self.0.write().await;
        let collection = db.collection(collection);
        let Some(index) = collection.position(filter) else { return Ok(None) };

        let mut doc = collection.docs[index].clone();
        update.apply(&mut doc);
        if doc.id() != collection.docs[index].id() {
            return Err(<Error as super::Error>::custom("cannot change document identifier"));
        }
        collection.check_unique(&doc, Some(index))?;
        collection.docs[index] = doc.clone();
        Ok(Some(doc))
    }

    async fn find_by_id_and_delete(
        &self,
        collection: &str,
        id: &Id,
    ) -> Result<Option<Document>, Self::Error> {
        let mut db = self.0.write().await;
        let collection = db.collection(collection);
        Ok(collection
            .position(&Filter::by_id(id.clone()))
            .map(|index| collection.docs.remove(index)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entity::{EntityDescriptor, FieldDescriptor};
    use crate::document::Value;
    use crate::store::Error as _;
    use crate::{document, init_logging};

    async fn people() -> Connection {
        let conn = Connection::create();
        let schema = CollectionSchema::from_descriptor(
            &EntityDescriptor::new("Person", "People")
                .field(FieldDescriptor::of::<String>("name"))
                .field(FieldDescriptor::of::<Option<String>>("email").unique())
                .field(FieldDescriptor::of::<Vec<Id>>("friends")),
        );
        conn.register(&schema).await.unwrap();
        conn
    }

    #[async_std::test]
    async fn test_crud() {
        init_logging();
        let conn = people().await;
        assert_eq!(conn.find_all("people").await.unwrap(), vec![]);

        let ada = conn
            .create("people", document! { "name" => "ada" })
            .await
            .unwrap();
        let id = ada.id().unwrap().clone();
        assert_eq!(
            conn.find_by_id("people", &id).await.unwrap(),
            Some(ada.clone())
        );
        assert_eq!(
            conn.find_one("people", &Filter::eq("name", "ada"))
                .await
                .unwrap(),
            Some(ada.clone())
        );

        let friend = Id::generate();
        let updated = conn
            .find_one_and_update(
                "people",
                &Filter::by_id(id.clone()),
                Update::set(document! { "name" => "countess" }).push("friends", friend.clone()),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["name"], Value::from("countess"));
        assert_eq!(updated["friends"], Value::List(vec![Value::Id(friend)]));

        assert_eq!(
            conn.find_by_id_and_delete("people", &id).await.unwrap(),
            Some(updated)
        );
        assert_eq!(conn.find_by_id_and_delete("people", &id).await.unwrap(), None);
        assert_eq!(conn.len("people").await, 0);
    }

    #[async_std::test]
    async fn test_unique() {
        init_logging();
        let conn = people().await;
        conn.create("people", document! { "name" => "ada", "email" => "a@b.c" })
            .await
            .unwrap();

        // Absent values do not conflict.
        conn.create("people", document! { "name" => "bob" })
            .await
            .unwrap();
        let carol = conn
            .create("people", document! { "name" => "carol" })
            .await
            .unwrap();

        let err = conn
            .create("people", document! { "name" => "eve", "email" => "a@b.c" })
            .await
            .unwrap_err();
        assert_eq!(err.duplicate_field(), Some("email"));
        assert_eq!(conn.len("people").await, 3);

        let err = conn
            .find_one_and_update(
                "people",
                &Filter::by_id(carol.id().unwrap().clone()),
                Update::set(document! { "email" => "a@b.c" }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.duplicate_field(), Some("email"));
        assert_eq!(
            conn.find_by_id("people", carol.id().unwrap()).await.unwrap(),
            Some(carol)
        );
    }

    #[async_std::test]
    async fn test_missing_collection() {
        let conn = Connection::create();
        let id = Id::generate();
        assert_eq!(conn.find_all("nothing").await.unwrap(), vec![]);
        assert_eq!(conn.find_by_id("nothing", &id).await.unwrap(), None);
        assert_eq!(
            conn.find_one_and_update("nothing", &Filter::by_id(id.clone()), Update::default())
                .await
                .unwrap(),
            None
        );
    }
}
