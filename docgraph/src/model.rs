//! The data model served by `docgraph-server`: users and the articles they write.
//!
//! Each entity is defined exactly once, as a Rust struct deriving [`Entity`](crate::entity::Entity).
//! Everything else (the collections, their validation rules, the GraphQL types and operations) is
//! generated from these definitions when [`api`] is built.

use crate::api::{ApiBuilder, ComputedField, Resolved, Resolver};
use crate::document::{Document, Value};
use crate::entity::{Entity, FieldType};
use crate::ops::{self, Handlers};
use crate::schema::OutputType;
use crate::store::DocumentStore;
use async_trait::async_trait;

mod article;
mod user;

pub use article::{excerpt, Article};
pub use user::{generate_username, User};

/// The API over users and articles.
pub fn api<S: DocumentStore>() -> ApiBuilder<S> {
    ApiBuilder::new()
        .entity::<User>()
        .entity::<Article>()
        .computed(
            ComputedField::new(
                User::NAME,
                "articleCount",
                OutputType::scalar(FieldType::Int, false),
                ArticleCount,
            )
            .description("The number of articles written by this user."),
        )
        .computed(
            ComputedField::new(
                User::NAME,
                "latestArticle",
                OutputType::entity(Article::NAME, true),
                LatestArticle,
            )
            .description("The most recent article written by this user."),
        )
}

struct ArticleCount;

#[async_trait]
impl<S: DocumentStore> Resolver<S> for ArticleCount {
    async fn resolve(
        &self,
        _handlers: Handlers<'_, S>,
        user: &Document,
    ) -> Result<Resolved, ops::Error> {
        Ok(Resolved::Value(Value::Int(user.ids("articles").len() as i64)))
    }
}

/// Articles are appended to their author's list as they are created, so the last one is the latest.
struct LatestArticle;

#[async_trait]
impl<S: DocumentStore> Resolver<S> for LatestArticle {
    async fn resolve(
        &self,
        handlers: Handlers<'_, S>,
        user: &Document,
    ) -> Result<Resolved, ops::Error> {
        let Some(latest) = user.ids("articles").pop() else {
            return Ok(Resolved::Null);
        };
        Ok(handlers
            .resolve(Article::NAME, &[latest])
            .await?
            .pop()
            .map_or(Resolved::Null, Resolved::Entity))
    }
}
