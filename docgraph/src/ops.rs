//! The operations generated for every entity: list, get, create, update and delete.
//!
//! [`Handlers`] translates each operation into calls against a [`DocumentStore`], applying the
//! entity's [`CollectionSchema`](crate::schema::CollectionSchema) to every write and the
//! [`authorize`] check to every update and delete. Handlers run their steps strictly in order and
//! hold no state of their own, so any number of them can share one store.
//!
//! Uniqueness is checked before each write, but the check is advisory: two concurrent writes can
//! both pass it. The unique indexes installed by [`DocumentStore::register`] are authoritative, and
//! a write they reject is reported as [`Error::Duplicate`] just the same.

use crate::auth::{authorize, Denied, Identity, Scope};
use crate::document::{Document, Id, IdError};
use crate::schema::{GeneratedEntity, Registry, ValidationError};
use crate::store::{self, DocumentStore, Filter, Update};
use async_graphql::ErrorExtensions;
use snafu::Snafu;
use tracing::{debug, error, warn};

/// Errors returned by operations.
///
/// Every error is reported to the client, together with a machine-readable [`code`](Self::code).
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid {entity}: {source}"))]
    Validation {
        entity: String,
        source: ValidationError,
    },

    #[snafu(display("field {field} refers to {entity} {id}, which does not exist"))]
    MissingReference { entity: String, field: String, id: Id },

    #[snafu(display("a {entity} with this {field} already exists"))]
    Duplicate { entity: String, field: String },

    #[snafu(display("unauthorized: {source}"))]
    Unauthorized { source: Denied },

    #[snafu(display("{entity} {id} not found"))]
    NotFound { entity: String, id: Id },

    #[snafu(display("{source}"))]
    MalformedId { source: IdError },

    #[snafu(display("unknown entity {entity}"))]
    UnknownEntity { entity: String },

    /// A failure of the store. The details are logged, not reported.
    #[snafu(display("internal error"))]
    Store { message: String },
}

impl Error {
    /// The error code reported in the `code` extension of a GraphQL error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } | Self::MissingReference { .. } | Self::MalformedId { .. } => {
                "BAD_USER_INPUT"
            }
            Self::Duplicate { .. } => "CONFLICT",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::UnknownEntity { .. } | Self::Store { .. } => "INTERNAL",
        }
    }

    fn unauthenticated() -> Self {
        Self::Unauthorized {
            source: Denied::Unauthenticated,
        }
    }
}

impl ErrorExtensions for Error {
    fn extend(&self) -> async_graphql::Error {
        async_graphql::Error::new(self.to_string()).extend_with(|_, e| e.set("code", self.code()))
    }
}

/// Parse an identifier supplied by a client.
pub fn parse_id(id: &str) -> Result<Id, Error> {
    Id::parse(id).map_err(|source| Error::MalformedId { source })
}

/// Operations on the entities of a [`Registry`], backed by a store.
pub struct Handlers<'a, S> {
    store: &'a S,
    registry: &'a Registry,
}

impl<'a, S> Clone for Handlers<'a, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, S> Copy for Handlers<'a, S> {}

impl<'a, S: DocumentStore> Handlers<'a, S> {
    pub fn new(store: &'a S, registry: &'a Registry) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &'a S {
        self.store
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    /// Every instance of `entity`.
    pub async fn list(&self, entity: &str) -> Result<Vec<Document>, Error> {
        let entity = self.entity(entity)?;
        self.store
            .find_all(entity.persistence.collection())
            .await
            .map_err(|err| store_error(entity, err))
    }

    /// The instance of `entity` with identifier `id`, or [`None`] if there is no such instance.
    pub async fn get(&self, entity: &str, id: &str) -> Result<Option<Document>, Error> {
        let entity = self.entity(entity)?;
        let id = parse_id(id)?;
        self.find(entity, &id).await
    }

    /// The instances of `entity` with the given identifiers, in order, skipping missing ones.
    pub async fn resolve(&self, entity: &str, ids: &[Id]) -> Result<Vec<Document>, Error> {
        let entity = self.entity(entity)?;
        let mut docs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(doc) = self.find(entity, id).await? {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    /// Create a new instance of `entity` from the stored fields in `input`.
    ///
    /// The owner field, if the entity has one, is filled from `identity`, which is then required.
    /// Returns the stored document, including its new identifier and any generated defaults.
    pub async fn create(
        &self,
        entity: &str,
        identity: Option<&Identity>,
        mut input: Document,
    ) -> Result<Document, Error> {
        let entity = self.entity(entity)?;
        check_input(entity, &input)?;
        if let Some(owner) = entity.descriptor.owner_field() {
            let identity = identity.ok_or_else(Error::unauthenticated)?;
            input.set(owner, identity.user_id.clone());
        }
        let doc = entity
            .persistence
            .validate_create(input)
            .map_err(|source| validation(entity, source))?;
        self.check_references(entity, &doc).await?;
        self.check_unique(entity, &doc, None).await?;

        let doc = self
            .store
            .create(entity.persistence.collection(), doc)
            .await
            .map_err(|err| store_error(entity, err))?;
        let id = doc.id().cloned().ok_or_else(|| Error::Store {
            message: "store did not assign an identifier".into(),
        })?;
        self.link(entity, &id, &doc, None, true).await?;
        debug!(entity = entity.descriptor.name(), %id, "created");
        Ok(doc)
    }

    /// Change the fields in `changes` on the instance of `entity` with identifier `id`.
    ///
    /// Fails with [`Error::Unauthorized`] if `identity` may not modify the instance, and with
    /// [`Error::NotFound`] if it does not exist.
    pub async fn update(
        &self,
        entity: &str,
        identity: Option<&Identity>,
        id: &str,
        changes: Document,
    ) -> Result<Document, Error> {
        let entity = self.entity(entity)?;
        let (id, filter) = self.authorize(entity, identity, id).await?;

        check_input(entity, &changes)?;
        let changes = entity
            .persistence
            .validate_update(changes)
            .map_err(|source| validation(entity, source))?;
        self.check_references(entity, &changes).await?;
        self.check_unique(entity, &changes, Some(&id)).await?;

        let collection = entity.persistence.collection();
        let relinked = entity
            .descriptor
            .persisted_fields()
            .any(|f| f.back_reference_field().is_some() && changes.contains_key(f.name()));
        let before = if relinked {
            self.store
                .find_one(collection, &filter)
                .await
                .map_err(|err| store_error(entity, err))?
        } else {
            None
        };

        let doc = self
            .store
            .find_one_and_update(collection, &filter, Update::set(changes.clone()))
            .await
            .map_err(|err| store_error(entity, err))?
            .ok_or_else(|| Error::NotFound {
                entity: entity.descriptor.name().into(),
                id: id.clone(),
            })?;
        if let Some(before) = before {
            self.link(entity, &id, &before, Some(&changes), false).await?;
            self.link(entity, &id, &doc, Some(&changes), true).await?;
        }
        debug!(entity = entity.descriptor.name(), %id, "updated");
        Ok(doc)
    }

    /// Delete the instance of `entity` with identifier `id`.
    ///
    /// Deleting an instance which does not exist succeeds without doing anything, so this always
    /// returns `true` unless the caller is not authorized.
    pub async fn delete(
        &self,
        entity: &str,
        identity: Option<&Identity>,
        id: &str,
    ) -> Result<bool, Error> {
        let entity = self.entity(entity)?;
        let (id, _) = self.authorize(entity, identity, id).await?;

        let deleted = self
            .store
            .find_by_id_and_delete(entity.persistence.collection(), &id)
            .await
            .map_err(|err| store_error(entity, err))?;
        match deleted {
            Some(doc) => {
                self.link(entity, &id, &doc, None, false).await?;
                debug!(entity = entity.descriptor.name(), %id, "deleted");
            }
            None => debug!(entity = entity.descriptor.name(), %id, "nothing to delete"),
        }
        Ok(true)
    }

    /// Check that `identity` may modify the instance `id` of `entity`.
    ///
    /// Returns the parsed identifier and the filter selecting the instance. When ownership is
    /// stored in a field, the instance is read to compare its owner with the caller; a missing
    /// instance passes the check, leaving the operation to treat it as missing.
    async fn authorize(
        &self,
        entity: &GeneratedEntity,
        identity: Option<&Identity>,
        id: &str,
    ) -> Result<(Id, Filter), Error> {
        let identity = identity.ok_or_else(Error::unauthenticated)?;
        let id = parse_id(id)?;
        let unauthorized = |source: Denied| {
            warn!(entity = entity.descriptor.name(), "{source}");
            Error::Unauthorized { source }
        };
        let scope = authorize(Some(identity), &entity.descriptor, &id).map_err(unauthorized)?;
        if let Scope::OwnedBy { .. } = scope {
            if let Some(doc) = self.find(entity, &id).await? {
                scope
                    .permits(entity.descriptor.name(), &id, &doc)
                    .map_err(unauthorized)?;
            }
        }
        let filter = scoped(&id, &scope);
        Ok((id, filter))
    }

    fn entity(&self, name: &str) -> Result<&'a GeneratedEntity, Error> {
        self.registry.get(name).ok_or_else(|| Error::UnknownEntity {
            entity: name.into(),
        })
    }

    async fn find(&self, entity: &GeneratedEntity, id: &Id) -> Result<Option<Document>, Error> {
        self.store
            .find_by_id(entity.persistence.collection(), id)
            .await
            .map_err(|err| store_error(entity, err))
    }

    /// Check that every identifier in a reference field of `doc` names an existing instance.
    async fn check_references(
        &self,
        entity: &GeneratedEntity,
        doc: &Document,
    ) -> Result<(), Error> {
        for field in entity.descriptor.persisted_fields() {
            let Some(target) = field.references_entity() else { continue };
            let target = self.entity(target)?;
            for id in doc.ids(field.name()) {
                if self.find(target, &id).await?.is_none() {
                    return Err(Error::MissingReference {
                        entity: target.descriptor.name().into(),
                        field: field.exposed_name(),
                        id,
                    });
                }
            }
        }
        Ok(())
    }

    /// Check that no instance other than `except` shares a unique value with `doc`.
    async fn check_unique(
        &self,
        entity: &GeneratedEntity,
        doc: &Document,
        except: Option<&Id>,
    ) -> Result<(), Error> {
        for field in entity.persistence.unique_fields() {
            let Some(value) = doc.get(field).filter(|value| !value.is_null()) else { continue };
            let existing = self
                .store
                .find_one(
                    entity.persistence.collection(),
                    &Filter::eq(field, value.clone()),
                )
                .await
                .map_err(|err| store_error(entity, err))?;
            if existing.map_or(false, |other| other.id() != except) {
                return Err(duplicate(entity, field));
            }
        }
        Ok(())
    }

    /// Add `id` to (or remove it from) the back-references of the instances `doc` refers to.
    ///
    /// If `only` is given, just the reference fields it contains are considered.
    async fn link(
        &self,
        entity: &GeneratedEntity,
        id: &Id,
        doc: &Document,
        only: Option<&Document>,
        add: bool,
    ) -> Result<(), Error> {
        for field in entity.descriptor.persisted_fields() {
            let (Some(target), Some(back)) =
                (field.references_entity(), field.back_reference_field())
            else {
                continue;
            };
            if only.map_or(false, |only| !only.contains_key(field.name())) {
                continue;
            }
            let target = self.entity(target)?;
            for other in doc.ids(field.name()) {
                let update = if add {
                    Update::default().push(back, id.clone())
                } else {
                    Update::default().pull(back, id.clone())
                };
                let found = self
                    .store
                    .find_one_and_update(
                        target.persistence.collection(),
                        &Filter::by_id(other.clone()),
                        update,
                    )
                    .await
                    .map_err(|err| store_error(target, err))?;
                if found.is_none() {
                    debug!(
                        entity = target.descriptor.name(),
                        id = %other,
                        "back-reference target no longer exists"
                    );
                }
            }
        }
        Ok(())
    }
}

/// The filter selecting the instance `id` within `scope`.
fn scoped(id: &Id, scope: &Scope) -> Filter {
    let filter = Filter::by_id(id.clone());
    match scope {
        Scope::Any => filter,
        Scope::OwnedBy { field, owner } => filter.and(field.clone(), owner.clone()),
    }
}

/// Reject input to fields which clients may never write.
fn check_input(entity: &GeneratedEntity, input: &Document) -> Result<(), Error> {
    let descriptor = &entity.descriptor;
    let immutable = input.keys().find(|field| {
        descriptor.owner_field() == Some(field.as_str())
            || descriptor
                .field_named(field)
                .map_or(false, |f| f.is_read_only())
    });
    match immutable {
        Some(field) => Err(validation(
            entity,
            ValidationError::ImmutableField {
                field: field.clone(),
            },
        )),
        None => Ok(()),
    }
}

fn validation(entity: &GeneratedEntity, source: ValidationError) -> Error {
    Error::Validation {
        entity: entity.descriptor.name().into(),
        source,
    }
}

/// A uniqueness violation on the stored field `field`, reported under its exposed name.
fn duplicate(entity: &GeneratedEntity, field: &str) -> Error {
    Error::Duplicate {
        entity: entity.descriptor.name().into(),
        field: entity
            .descriptor
            .field_named(field)
            .map(|f| f.exposed_name())
            .unwrap_or_else(|| field.into()),
    }
}

fn store_error<E: store::Error>(entity: &GeneratedEntity, err: E) -> Error {
    if let Some(field) = err.duplicate_field() {
        return duplicate(entity, field);
    }
    error!(entity = entity.descriptor.name(), "store error: {err}");
    Error::Store {
        message: err.to_string(),
    }
}
