use super::Article;
use crate::document::{Document, Id, Value};
use crate::entity::Entity;
use rand::Rng;

/// A registered user.
#[derive(Clone, Debug, PartialEq, Eq, Entity)]
#[entity(self_owned)]
pub struct User {
    pub id: Id,
    /// The user's full name.
    pub name: String,
    /// The user's email address. No two users share one.
    #[entity(unique)]
    pub email: String,
    /// The user's handle, generated from the name when none is given.
    #[entity(default(generate_username))]
    pub username: String,
    #[entity(persisted_only)]
    pub password: String,
    /// The articles written by this user.
    #[entity(rename(articleIds), references(Article), resolve(articles), read_only)]
    pub articles: Vec<Id>,
}

/// Derive a username from the name of a new user.
///
/// The name is lowercased and stripped of everything but letters and digits, then suffixed with
/// four random digits so that namesakes are unlikely to collide.
pub fn generate_username(doc: &Document) -> Value {
    let Some(Value::String(name)) = doc.get("name") else {
        return Value::Null;
    };
    let stem: String = name
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();
    let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
    Value::String(format!("{stem}{suffix:04}"))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::document;

    #[test]
    fn test_generate_username() {
        let Value::String(username) = generate_username(&document! { "name" => "Ada Lovelace" })
        else {
            panic!("expected a string");
        };
        assert_eq!(username.len(), "adalovelace".len() + 4);
        assert!(username.starts_with("adalovelace"));
        assert!(username[11..].chars().all(|c| c.is_ascii_digit()));

        assert_eq!(generate_username(&Document::new()), Value::Null);
    }

    #[test]
    fn test_user_document() {
        let user = User {
            id: Id::generate(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            username: "ada".into(),
            password: "secret".into(),
            articles: vec![Id::generate()],
        };
        let doc = user.clone().into_document();
        assert_eq!(doc["password"], Value::from("secret"));
        assert_eq!(User::from_document(&doc).unwrap(), user);
    }
}
