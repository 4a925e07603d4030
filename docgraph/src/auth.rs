//! Caller identity and the ownership check guarding mutations.
//!
//! Every update and delete goes through the same policy:
//!
//! * a caller without an [`Identity`] is always rejected;
//! * an admin may modify anything;
//! * a member may modify instances of entities without an owner, and instances it owns;
//! * a member which does not own an existing instance is rejected as unauthorized.
//!
//! [`authorize`] decides from the caller and the entity's [`Ownership`] alone whenever it can.
//! Ownership stored in a field can only be compared against the stored instance, so for those
//! entities it returns a [`Scope`] which the caller checks with [`Scope::permits`] once the
//! instance has been read. An instance which does not exist has no owner to compare against and
//! is reported as missing.

use crate::document::{Document, Id};
use crate::entity::{Entity, EntityDescriptor, Ownership};
use crate::store::DocumentStore;
use derive_more::Display;
use snafu::Snafu;
use std::collections::HashSet;
use tracing::debug;

/// The capabilities of a caller.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Role {
    /// May modify what it owns.
    #[display(fmt = "member")]
    Member,
    /// May modify anything.
    #[display(fmt = "admin")]
    Admin,
}

/// An authenticated caller.
#[derive(Clone, Debug, Display, PartialEq, Eq, Hash)]
#[display(fmt = "{} ({})", user_id, role)]
pub struct Identity {
    pub user_id: Id,
    pub role: Role,
}

impl Identity {
    pub fn member(user_id: Id) -> Self {
        Self {
            user_id,
            role: Role::Member,
        }
    }

    pub fn admin(user_id: Id) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }
}

/// The instances an authorized caller may modify.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    /// The target, whoever owns it.
    Any,
    /// The target, only if its `field` holds `owner`.
    OwnedBy { field: String, owner: Id },
}

impl Scope {
    /// Check that the stored instance `doc` of `entity`, with identifier `target`, lies within
    /// this scope.
    pub fn permits(&self, entity: &str, target: &Id, doc: &Document) -> Result<(), Denied> {
        match self {
            Self::Any => Ok(()),
            Self::OwnedBy { field, owner } if doc.ids(field).contains(owner) => Ok(()),
            Self::OwnedBy { owner, .. } => Err(Denied::NotOwner {
                user: owner.clone(),
                entity: entity.into(),
                target: target.clone(),
            }),
        }
    }
}

/// A caller which may not perform a mutation.
#[derive(Clone, Debug, Snafu, PartialEq, Eq)]
pub enum Denied {
    #[snafu(display("authentication required"))]
    Unauthenticated,

    #[snafu(display("{user} may not modify {entity} {target}"))]
    NotOwner {
        user: Id,
        entity: String,
        target: Id,
    },
}

/// Decide whether `identity` may modify the instance `target` of an entity.
///
/// On success, the returned [`Scope`] must still [permit](Scope::permits) the stored target
/// before it is modified: for entities owned through a field, ownership can only be checked
/// against the stored instance.
pub fn authorize(
    identity: Option<&Identity>,
    descriptor: &EntityDescriptor,
    target: &Id,
) -> Result<Scope, Denied> {
    let Some(identity) = identity else {
        return Err(Denied::Unauthenticated);
    };
    if identity.role == Role::Admin {
        return Ok(Scope::Any);
    }
    match descriptor.owner() {
        Ownership::None => Ok(Scope::Any),
        Ownership::SelfOwned if identity.user_id == *target => Ok(Scope::Any),
        Ownership::SelfOwned => Err(Denied::NotOwner {
            user: identity.user_id.clone(),
            entity: descriptor.name().into(),
            target: target.clone(),
        }),
        Ownership::Field(field) => Ok(Scope::OwnedBy {
            field: field.clone(),
            owner: identity.user_id.clone(),
        }),
    }
}

/// Identification of callers by an `Authorization: Bearer <user id>` header.
///
/// The token is simply the identifier of an existing user; ids listed as admins get
/// [`Role::Admin`]. This is only suitable for development: issuing and verifying real tokens is
/// left to a gateway in front of the server.
#[derive(Clone, Debug, Default)]
pub struct BearerAuth {
    collection: String,
    admins: HashSet<Id>,
}

impl BearerAuth {
    /// Identify callers as documents in `collection`.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            admins: Default::default(),
        }
    }

    /// Identify callers as instances of the entity `E`.
    pub fn for_entity<E: Entity>() -> Self {
        Self::new(E::descriptor().collection())
    }

    /// Grant [`Role::Admin`] to `admins`.
    pub fn with_admins(mut self, admins: impl IntoIterator<Item = Id>) -> Self {
        self.admins.extend(admins);
        self
    }

    /// Extract the token from an `Authorization` header value.
    pub fn token(header: &str) -> Option<&str> {
        let (scheme, token) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        Some(token.trim()).filter(|token| !token.is_empty())
    }

    /// The caller presenting the `Authorization` header `header`, if it is a known user.
    ///
    /// A missing or malformed header, or a token naming no user, yields [`None`]: the caller is
    /// anonymous, which is enough for queries but not for mutations.
    pub async fn identify<S: DocumentStore>(
        &self,
        store: &S,
        header: Option<&str>,
    ) -> Result<Option<Identity>, S::Error> {
        let Some(token) = header.and_then(Self::token) else {
            return Ok(None);
        };
        let Ok(user_id) = Id::parse(token) else {
            debug!("ignoring malformed bearer token");
            return Ok(None);
        };
        if store.find_by_id(&self.collection, &user_id).await?.is_none() {
            debug!(%user_id, "bearer token names an unknown user");
            return Ok(None);
        }
        let role = if self.admins.contains(&user_id) {
            Role::Admin
        } else {
            Role::Member
        };
        Ok(Some(Identity { user_id, role }))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entity::FieldDescriptor;
    use crate::store::mock;
    use crate::{document, init_logging};

    fn descriptor(ownership: Ownership) -> EntityDescriptor {
        EntityDescriptor::new("Note", "Notes")
            .field(FieldDescriptor::of::<Id>("author"))
            .ownership(ownership)
    }

    #[test]
    fn test_authorize() {
        init_logging();
        let me = Id::generate();
        let other = Id::generate();
        let member = Identity::member(me.clone());
        let admin = Identity::admin(other.clone());

        for ownership in [
            Ownership::None,
            Ownership::SelfOwned,
            Ownership::Field("author".into()),
        ] {
            let descriptor = descriptor(ownership);
            assert_eq!(
                authorize(None, &descriptor, &me),
                Err(Denied::Unauthenticated)
            );
            assert_eq!(authorize(Some(&admin), &descriptor, &me), Ok(Scope::Any));
        }

        let open = descriptor(Ownership::None);
        assert_eq!(authorize(Some(&member), &open, &other), Ok(Scope::Any));

        let self_owned = descriptor(Ownership::SelfOwned);
        assert_eq!(authorize(Some(&member), &self_owned, &me), Ok(Scope::Any));
        assert!(matches!(
            authorize(Some(&member), &self_owned, &other),
            Err(Denied::NotOwner { .. })
        ));

        let field_owned = descriptor(Ownership::Field("author".into()));
        let scope = authorize(Some(&member), &field_owned, &other).unwrap();
        assert_eq!(
            scope,
            Scope::OwnedBy {
                field: "author".into(),
                owner: me.clone()
            }
        );
        let target = Id::generate();
        assert_eq!(
            scope.permits("Note", &target, &document! { "author" => me }),
            Ok(())
        );
        assert_eq!(
            scope.permits("Note", &target, &document! { "author" => other.clone() }),
            Err(Denied::NotOwner {
                user: member.user_id.clone(),
                entity: "Note".into(),
                target: target.clone(),
            })
        );
        assert_eq!(
            Scope::Any.permits("Note", &target, &document! { "author" => other }),
            Ok(())
        );
    }

    #[test]
    fn test_token() {
        assert_eq!(BearerAuth::token("Bearer abc"), Some("abc"));
        assert_eq!(BearerAuth::token("bearer  abc "), Some("abc"));
        assert_eq!(BearerAuth::token("Basic abc"), None);
        assert_eq!(BearerAuth::token("Bearer "), None);
        assert_eq!(BearerAuth::token("abc"), None);
    }

    #[async_std::test]
    async fn test_identify() {
        init_logging();
        let store = mock::Connection::create();
        let user = store
            .create("users", document! { "name" => "ada" })
            .await
            .unwrap();
        let id = user.id().unwrap().clone();
        let header = format!("Bearer {id}");

        let auth = BearerAuth::new("users");
        assert_eq!(
            auth.identify(&store, Some(&header)).await.unwrap(),
            Some(Identity::member(id.clone()))
        );
        assert_eq!(auth.identify(&store, None).await.unwrap(), None);
        assert_eq!(
            auth.identify(&store, Some("Bearer not-an-id")).await.unwrap(),
            None
        );
        let stranger = format!("Bearer {}", Id::generate());
        assert_eq!(auth.identify(&store, Some(&stranger)).await.unwrap(), None);

        let auth = auth.with_admins([id.clone()]);
        assert_eq!(
            auth.identify(&store, Some(&header)).await.unwrap(),
            Some(Identity::admin(id))
        );
    }
}
