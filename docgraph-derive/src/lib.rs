//! Derive macros for the `docgraph` crate.

use proc_macro::TokenStream;
use syn::parse_macro_input;

mod entity;
mod helpers;

/// Derive an implementation of `Entity` for a struct.
///
/// The struct is the single definition of the entity: the macro expands it into the builder calls
/// constructing its `EntityDescriptor`, from which both the persistence schema and the GraphQL type
/// are generated, along with conversions between the struct and stored documents.
///
/// Each named field becomes a field descriptor whose type and requiredness follow the Rust type of
/// the field (`Option<T>` is optional). The field named `id`, or marked with the
/// [`id`](#field-attributes) attribute, is the document identifier and must have type `Id`.
///
/// Documentation (doc comments or the `#[doc = "..."]` attribute) on the struct and its fields is
/// automatically propagated to the descriptor and will appear in the exported GraphQL schema.
///
/// # Examples
///
/// ```
/// # mod example {
/// use docgraph::prelude::*;
///
/// /// A person.
/// #[derive(Clone, Debug, Entity)]
/// #[entity(plural(People), self_owned)]
/// pub struct Person {
///     pub id: Id,
///     /// How to reach this person.
///     #[entity(unique)]
///     pub email: String,
///     #[entity(persisted_only)]
///     pub password: String,
///     #[entity(rename(friendIds), references(Person), resolve(friends))]
///     pub friends: Vec<Id>,
/// }
/// # }
/// # use docgraph::prelude::*;
/// # use example::Person;
/// let descriptor = Person::descriptor();
/// assert_eq!(descriptor.collection(), "people");
/// assert_eq!(*descriptor.owner(), Ownership::SelfOwned);
///
/// let friends = descriptor.field_named("friends").unwrap();
/// assert_eq!(friends.exposed_name(), "friendIds");
/// assert_eq!(friends.references_entity(), Some("Person"));
/// ```
///
/// # Struct attributes
///
/// | Attribute     | Description                                             | Arg     | Required |
/// |---------------|---------------------------------------------------------|---------|----------|
/// | plural        | Override the default pluralization of the struct name. The default simply appends an `s`. | ident | no |
/// | collection    | Override the default collection name, which is the snake_case version of the plural name. | ident | no |
/// | self_owned    | Only the instance itself (the caller whose identity is its `id`) may update or delete it. | n/a | no |
///
/// # Field attributes
///
/// | Attribute     | Description                                             | Arg    | Required |
/// |---------------|---------------------------------------------------------|---------|----------|
/// | id            | Use this field as the identifier. Can be omitted if the field is called `id`. | n/a | no |
/// | unique        | Require stored values of this field to be distinct. | n/a | no |
/// | default       | Generate a value when a write omits this field, by calling a `fn(&Document) -> Value`. | path | no |
/// | persisted_only | Store this field but never expose it through GraphQL. | n/a | no |
/// | exposed_only  | Expose this field through GraphQL without storing it. Requires `source`. | n/a | no |
/// | source        | The `fn(&Document) -> Value` computing an exposed-only field. | path | no |
/// | rename        | Expose this field under a different name. The default is the camelCase version of the field name. | ident | no |
/// | references    | This identifier (or identifier list) field refers to instances of another entity. | type | no |
/// | resolve       | Expose the referenced entities through an additional resolver-backed field with this name. | ident | no |
/// | back_reference | Keep the named identifier list on the referenced instance in sync with this instance. | ident | no |
/// | read_only     | Never accept this field as input to a create or update. | n/a | no |
/// | owner         | Only the caller whose identity is stored in this field may update or delete the instance. The field is filled from the caller's identity on create. | n/a | no |
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    entity::derive(parse_macro_input!(input)).into()
}
