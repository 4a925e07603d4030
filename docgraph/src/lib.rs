//! docgraph derives a document-store schema, a GraphQL schema and a complete CRUD API from a single
//! definition of each entity. It consists of a few layers:
//!
//! * [Entities](entity), which most users will interact with. An entity is declared once, usually
//!   by deriving [`Entity`](entity::Entity) on a plain struct, yielding an
//!   [`EntityDescriptor`](entity::EntityDescriptor) which names every stored field together with
//!   its type, constraints and visibility to clients.
//! * A [generator](schema), which turns a set of descriptors into a persistence schema (collection
//!   shape plus validation rules) and a GraphQL type for each entity, and checks the whole set for
//!   configuration errors at startup.
//! * [Operation handlers](ops), which implement the list, get, create, update and delete
//!   operations of every entity against an abstract [document store](store), applying validation
//!   and [authorization](auth) uniformly.
//! * The [GraphQL API](api), which serves the generated types and operations through
//!   `async-graphql`.
//!
//! This crate comes with a MongoDB [store](store::mongo), as well as an in-memory
//! [mock](store::mock), which is useful for lightweight testing. The `server` feature adds an HTTP
//! server serving the sample [model].
//!
//! # Testing
//!
//! A plain `cargo test` covers everything except the HTTP server, whose tests are only compiled
//! with the `server` feature: `cargo test --features server`. Tests against a live MongoDB are
//! skipped unless `MONGO_TESTS` is set.
//!
//! # Examples
//!
//! ```
//! use docgraph::prelude::*;
//!
//! /// A tag which can be attached to things.
//! #[derive(Clone, Debug, Entity)]
//! struct Tag {
//!     id: Id,
//!     #[entity(unique)]
//!     label: String,
//! }
//!
//! let registry = docgraph::schema::generate([Tag::descriptor()], &[]).unwrap();
//! let tag = registry.get("Tag").unwrap();
//! assert_eq!(tag.persistence.collection(), "tags");
//! assert_eq!(tag.persistence.unique_fields().collect::<Vec<_>>(), ["label"]);
//! assert_eq!(tag.query.field_names().collect::<Vec<_>>(), ["id", "label"]);
//! assert_eq!(tag.query.operations.create, "addTag");
//! ```

use std::sync::Once;
use tracing_subscriber::EnvFilter;

// Allow the derive macros, which refer to `docgraph::...`, to be used within this crate.
extern crate self as docgraph;

pub mod api;
pub mod auth;
pub mod document;
pub mod entity;
pub mod model;
pub mod ops;
pub mod prelude;
pub mod schema;
#[cfg(feature = "server")]
pub mod server;
pub mod store;

/// Initialize tracing.
pub fn init_logging() {
    static ONCE: Once = Once::new();

    ONCE.call_once(|| {
        if let Err(err) = color_eyre::install() {
            eprintln!("failed to install color-eyre: {err}");
        }
        tracing_subscriber::fmt()
            .with_ansi(true)
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    });
}
