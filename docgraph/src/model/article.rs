use super::User;
use crate::document::{Document, Id, Value};
use crate::entity::Entity;

/// The number of characters of the body shown in an excerpt.
const EXCERPT_LENGTH: usize = 140;

/// An article written by a user.
#[derive(Clone, Debug, PartialEq, Eq, Entity)]
pub struct Article {
    pub id: Id,
    pub title: String,
    pub body: String,
    /// The beginning of the body.
    #[entity(exposed_only, source(excerpt))]
    pub excerpt: String,
    /// The user who wrote this article.
    #[entity(
        owner,
        rename(authorId),
        references(User),
        resolve(author),
        back_reference(articles)
    )]
    pub author: Id,
}

/// The first [`EXCERPT_LENGTH`] characters of the body of an article.
pub fn excerpt(doc: &Document) -> Value {
    match doc.get("body") {
        Some(Value::String(body)) if body.chars().count() > EXCERPT_LENGTH => {
            let cut: String = body.chars().take(EXCERPT_LENGTH).collect();
            Value::String(format!("{}...", cut.trim_end()))
        }
        Some(Value::String(body)) => Value::String(body.clone()),
        _ => Value::String(String::new()),
    }
}
