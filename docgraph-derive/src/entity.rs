//! Derive macro for `Entity`.

use crate::helpers::{parse_docs, AttrParser};
use proc_macro2::TokenStream;
use quote::quote;
use syn::{ext::IdentExt, Attribute, Data, DeriveInput, Field, Fields, Ident, Path, Type};

const STRUCT_ATTRS: &[&str] = &["plural", "collection", "self_owned"];
const FIELD_ATTRS: &[&str] = &[
    "id",
    "unique",
    "default",
    "persisted_only",
    "exposed_only",
    "source",
    "rename",
    "references",
    "resolve",
    "back_reference",
    "read_only",
    "owner",
];

/// The path of the `docgraph` crate in the scope invoking a procedural macro.
fn docgraph_path() -> TokenStream {
    quote!(docgraph)
}

/// Generate an `Entity` implementation for a struct.
pub fn derive(
    DeriveInput {
        ident,
        generics,
        data,
        attrs,
        ..
    }: DeriveInput,
) -> TokenStream {
    if !generics.params.is_empty() {
        panic!("Entity cannot be derived on generic types");
    }
    match data {
        Data::Struct(s) => match s.fields {
            Fields::Named(fields) => {
                generate_struct(ident, attrs, fields.named.into_iter().collect())
            }
            _ => panic!("Entity can only be derived for structs with named fields"),
        },
        _ => panic!("Entity can only be derived for structs"),
    }
}

/// How a field of the struct participates in the entity.
enum Role {
    /// The identifier, stored under the reserved `_id` field.
    Id,
    /// A stored field.
    Persisted,
    /// A field computed from the stored document when loading.
    Derived(Path),
}

struct EntityField {
    ident: Ident,
    ty: Type,
    name: String,
    role: Role,
    builder: TokenStream,
}

fn parse_field(field: Field, p: &AttrParser) -> EntityField {
    let docgraph = docgraph_path();
    let attrs = &field.attrs;
    p.check_known(attrs, FIELD_ATTRS);

    let ident = field
        .ident
        .clone()
        .expect("Entity can only be derived for structs with named fields");
    let name = ident.unraw().to_string();
    let ty = field.ty;

    let role = if p.has_bool(attrs, "id") || name == "id" {
        Role::Id
    } else if p.has_bool(attrs, "exposed_only") {
        let source: Path = p
            .get_arg(attrs, "source")
            .unwrap_or_else(|| panic!("exposed-only field {name} needs a source function"));
        Role::Derived(source)
    } else {
        Role::Persisted
    };

    // Each modifier becomes one builder call on the field descriptor.
    let mut modifiers = vec![];
    if p.has_bool(attrs, "unique") {
        modifiers.push(quote!(.unique()));
    }
    if let Some(default) = p.get_arg::<Path, _>(attrs, "default") {
        modifiers.push(quote!(.default_with(#default)));
    }
    if p.has_bool(attrs, "persisted_only") {
        modifiers.push(quote!(.persisted_only()));
    }
    if let Role::Derived(source) = &role {
        modifiers.push(quote!(.exposed_only().source(#source)));
    }
    if let Some(rename) = p.get_arg::<Ident, _>(attrs, "rename") {
        let rename = rename.unraw().to_string();
        modifiers.push(quote!(.exposed_as(#rename)));
    }
    if let Some(target) = p.get_arg::<Type, _>(attrs, "references") {
        modifiers.push(quote!(.references(<#target as #docgraph::entity::Entity>::NAME)));
    }
    if let Some(resolve) = p.get_arg::<Ident, _>(attrs, "resolve") {
        let resolve = resolve.unraw().to_string();
        modifiers.push(quote!(.resolved_as(#resolve)));
    }
    if let Some(back) = p.get_arg::<Ident, _>(attrs, "back_reference") {
        let back = back.unraw().to_string();
        modifiers.push(quote!(.back_reference(#back)));
    }
    if p.has_bool(attrs, "read_only") {
        modifiers.push(quote!(.read_only()));
    }
    let doc = parse_docs(attrs);
    if !doc.is_empty() {
        modifiers.push(quote!(.description(#doc)));
    }

    let builder = quote! {
        #docgraph::entity::FieldDescriptor::of::<#ty>(#name) #(#modifiers)*
    };
    EntityField {
        ident,
        ty,
        name,
        role,
        builder,
    }
}

fn generate_struct(name: Ident, attrs: Vec<Attribute>, fields: Vec<Field>) -> TokenStream {
    let docgraph = docgraph_path();
    let p = AttrParser::new("entity");
    p.check_known(&attrs, STRUCT_ATTRS);

    let entity_name = name.unraw().to_string();
    let plural = p
        .get_arg::<Ident, _>(&attrs, "plural")
        .map(|plural| plural.unraw().to_string())
        .unwrap_or_else(|| format!("{entity_name}s"));

    // Get the documentation from the original struct. It becomes the description of the GraphQL
    // type.
    let doc = parse_docs(&attrs);
    let description = if doc.is_empty() {
        quote!()
    } else {
        quote!(.description(#doc))
    };
    let collection = match p.get_arg::<Ident, _>(&attrs, "collection") {
        Some(collection) => {
            let collection = collection.unraw().to_string();
            quote!(.collection_name(#collection))
        }
        None => quote!(),
    };

    let fields = fields
        .into_iter()
        .map(|field| {
            let owner = p.has_bool(&field.attrs, "owner");
            (parse_field(field, &p), owner)
        })
        .collect::<Vec<_>>();
    if fields
        .iter()
        .filter(|(f, _)| matches!(f.role, Role::Id))
        .count()
        != 1
    {
        panic!("entity {entity_name} must have exactly one id field");
    }

    let owners = fields
        .iter()
        .filter(|(_, owner)| *owner)
        .map(|(f, _)| f.name.clone())
        .collect::<Vec<_>>();
    let ownership = match (owners.as_slice(), p.has_bool(&attrs, "self_owned")) {
        ([], false) => quote!(),
        ([], true) => quote!(.ownership(#docgraph::entity::Ownership::SelfOwned)),
        ([owner], false) => {
            quote!(.ownership(#docgraph::entity::Ownership::Field(#owner.into())))
        }
        _ => panic!("entity {entity_name} can have at most one owner"),
    };

    let builders = fields
        .iter()
        .filter(|(f, _)| !matches!(f.role, Role::Id))
        .map(|(f, _)| {
            let builder = &f.builder;
            quote!(.field(#builder))
        });

    let loads = fields.iter().map(|(f, _)| {
        let EntityField {
            ident, ty, name, ..
        } = f;
        match &f.role {
            Role::Id => quote! {
                #ident: doc.require_id()?.clone()
            },
            Role::Persisted => quote! {
                #ident: doc.field::<#ty>(#name)?
            },
            Role::Derived(source) => quote! {
                #ident: <#ty as #docgraph::document::Stored>::from_value(#source(doc))
                    .map_err(|reason| #docgraph::document::DocumentError::field(#name, reason))?
            },
        }
    });

    let stores = fields.iter().filter_map(|(f, _)| {
        let EntityField {
            ident, ty, name, ..
        } = f;
        match &f.role {
            Role::Id => Some(quote! {
                doc.set_id(self.#ident);
            }),
            Role::Persisted => Some(quote! {
                doc.set(#name, <#ty as #docgraph::document::Stored>::into_value(self.#ident));
            }),
            Role::Derived(_) => None,
        }
    });

    quote! {
        impl #docgraph::entity::Entity for #name {
            const NAME: &'static str = #entity_name;
            const PLURAL_NAME: &'static str = #plural;

            fn descriptor() -> #docgraph::entity::EntityDescriptor {
                #docgraph::entity::EntityDescriptor::new(Self::NAME, Self::PLURAL_NAME)
                    #description
                    #collection
                    #ownership
                    #(#builders)*
            }

            fn from_document(
                doc: &#docgraph::document::Document,
            ) -> ::std::result::Result<Self, #docgraph::document::DocumentError> {
                Ok(Self {
                    #(#loads),*
                })
            }

            fn into_document(self) -> #docgraph::document::Document {
                let mut doc = #docgraph::document::Document::new();
                #(#stores)*
                doc
            }
        }
    }
}
