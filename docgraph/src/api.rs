//! The GraphQL API: one schema aggregating the generated types and operations of every entity.
//!
//! An [`Api`] is assembled once at startup by an [`ApiBuilder`]. Building generates the schemas of
//! all registered entities, registers their collections with the store, and translates each
//! [`QueryType`] into `async-graphql` dynamic types whose resolvers delegate to the operation
//! [`Handlers`]. The store and the [`Registry`] are attached to the schema as context data, so
//! every resolver reaches the same connection.
//!
//! Fields with no stored counterpart are contributed by [`Resolver`]s, registered through
//! [`ComputedField`]s alongside the entities.

use crate::auth::{Denied, Identity};
use crate::document::{Document, Value};
use crate::entity::{Entity, EntityDescriptor, FieldType};
use crate::ops::{self, Handlers};
use crate::schema::{
    self, Computed, FieldKind, GeneratedEntity, InputField, OutputType, QueryField, QueryType,
    Registry, ValidationError,
};
use crate::store::DocumentStore;
use async_graphql::dynamic::{
    Field, FieldFuture, FieldValue, InputObject, InputValue, Object, ObjectAccessor,
    ResolverContext, Schema, Type, TypeRef,
};
use async_graphql::{ErrorExtensions, Number};
use async_trait::async_trait;
use derivative::Derivative;
use snafu::Snafu;
use std::sync::Arc;
use tracing::{info, instrument};

const QUERY: &str = "Query";
const MUTATION: &str = "Mutation";

type GraphQLValue = async_graphql::Value;
type ResolverResult<'a> = async_graphql::Result<Option<FieldValue<'a>>>;

/// Errors building an [`Api`].
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid entity configuration: {source}"))]
    Generate { source: schema::Error },

    #[snafu(display("error preparing collection {collection}: {message}"))]
    Register { collection: String, message: String },

    #[snafu(display("error building GraphQL schema: {message}"))]
    Build { message: String },
}

/// The value of a computed field.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolved {
    Null,
    Value(Value),
    Entity(Document),
    Entities(Vec<Document>),
}

impl Resolved {
    fn into_field_value<'a>(self) -> Option<FieldValue<'a>> {
        match self {
            Self::Null => None,
            Self::Value(value) => scalar(&value),
            Self::Entity(doc) => Some(FieldValue::owned_any(doc)),
            Self::Entities(docs) => Some(entities(docs)),
        }
    }
}

/// Produces the value of a computed field from the stored document of its parent.
#[async_trait]
pub trait Resolver<S>: Send + Sync + 'static {
    async fn resolve(
        &self,
        handlers: Handlers<'_, S>,
        parent: &Document,
    ) -> Result<Resolved, ops::Error>;
}

/// A resolver-backed field added to the GraphQL type of an entity.
#[derive(Derivative)]
#[derivative(Clone(bound = ""), Debug(bound = ""))]
pub struct ComputedField<S> {
    declaration: Computed,
    #[derivative(Debug = "ignore")]
    resolver: Arc<dyn Resolver<S>>,
}

impl<S: DocumentStore> ComputedField<S> {
    /// A field `name` of type `ty` on `entity`, computed by `resolver`.
    pub fn new(
        entity: impl Into<String>,
        name: impl Into<String>,
        ty: OutputType,
        resolver: impl Resolver<S>,
    ) -> Self {
        Self {
            declaration: Computed {
                entity: entity.into(),
                name: name.into(),
                ty,
                description: None,
            },
            resolver: Arc::new(resolver),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.declaration.description = Some(description.into());
        self
    }
}

/// Assembles an [`Api`] from entities and computed fields.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
pub struct ApiBuilder<S> {
    descriptors: Vec<EntityDescriptor>,
    computed: Vec<ComputedField<S>>,
    introspection: bool,
}

impl<S: DocumentStore> Default for ApiBuilder<S> {
    fn default() -> Self {
        Self {
            descriptors: vec![],
            computed: vec![],
            introspection: true,
        }
    }
}

impl<S: DocumentStore> ApiBuilder<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the entity `E`.
    pub fn entity<E: Entity>(self) -> Self {
        self.descriptor(E::descriptor())
    }

    /// Register an entity by its descriptor.
    pub fn descriptor(mut self, descriptor: EntityDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn computed(mut self, field: ComputedField<S>) -> Self {
        self.computed.push(field);
        self
    }

    /// Allow clients to introspect the schema. Enabled by default.
    pub fn introspection(mut self, enabled: bool) -> Self {
        self.introspection = enabled;
        self
    }

    /// Generate the schemas of every entity and prepare `store` to hold them.
    ///
    /// Fails, without serving anything, if the entities are misconfigured or the store rejects a
    /// collection. A store which cannot be reached yet may defer preparing its collections; see
    /// [`DocumentStore::register`].
    #[instrument(skip_all)]
    pub async fn build(self, store: S) -> Result<Api<S>, Error> {
        let declarations: Vec<_> = self
            .computed
            .iter()
            .map(|field| field.declaration.clone())
            .collect();
        let registry = Arc::new(
            schema::generate(self.descriptors, &declarations)
                .map_err(|source| Error::Generate { source })?,
        );
        for entity in registry.entities() {
            store
                .register(&entity.persistence)
                .await
                .map_err(|err| Error::Register {
                    collection: entity.persistence.collection().into(),
                    message: err.to_string(),
                })?;
        }

        let mut query = Object::new(QUERY);
        let mut mutation = Object::new(MUTATION);
        let mut types: Vec<Type> = vec![];
        for entity in registry.entities() {
            query = query.field(list_field::<S>(entity)).field(get_field::<S>(entity));
            mutation = mutation
                .field(create_field::<S>(entity))
                .field(update_field::<S>(entity))
                .field(delete_field::<S>(entity));
            types.push(object_type(&entity.query, &self.computed).into());
            types.push(update_input(&entity.query).into());
        }

        let mut builder = Schema::build(QUERY, Some(MUTATION), None)
            .register(query)
            .register(mutation);
        for ty in types {
            builder = builder.register(ty);
        }
        if !self.introspection {
            builder = builder.disable_introspection();
        }
        let schema = builder
            .data(store.clone())
            .data(registry.clone())
            .finish()
            .map_err(|err| Error::Build {
                message: err.to_string(),
            })?;
        info!(entities = registry.entities().len(), "built GraphQL schema");

        Ok(Api {
            schema,
            store,
            registry,
        })
    }
}

/// The GraphQL API over a store.
#[derive(Clone)]
pub struct Api<S> {
    schema: Schema,
    store: S,
    registry: Arc<Registry>,
}

impl<S: DocumentStore> Api<S> {
    pub fn builder() -> ApiBuilder<S> {
        ApiBuilder::new()
    }

    /// Execute a GraphQL request on behalf of `identity`.
    ///
    /// Anonymous callers may query but not mutate.
    pub async fn execute(
        &self,
        request: impl Into<async_graphql::Request>,
        identity: Option<Identity>,
    ) -> async_graphql::Response {
        let mut request = request.into();
        if let Some(identity) = identity {
            request = request.data(identity);
        }
        self.schema.execute(request).await
    }

    /// The schema in GraphQL schema definition language.
    pub fn sdl(&self) -> String {
        self.schema.sdl()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

fn handlers<'a, S: DocumentStore>(
    ctx: &ResolverContext<'a>,
) -> async_graphql::Result<Handlers<'a, S>> {
    let store = ctx.ctx.data::<S>()?;
    let registry = ctx.ctx.data::<Arc<Registry>>()?;
    Ok(Handlers::new(store, registry))
}

fn generated<'a, S: DocumentStore>(
    handlers: Handlers<'a, S>,
    entity: &str,
) -> async_graphql::Result<&'a GeneratedEntity> {
    handlers.registry().get(entity).ok_or_else(|| {
        ops::Error::UnknownEntity {
            entity: entity.into(),
        }
        .extend()
    })
}

fn list_field<S: DocumentStore>(entity: &GeneratedEntity) -> Field {
    let name = entity.query.name.clone();
    Field::new(
        &entity.query.operations.list,
        TypeRef::named_nn_list_nn(&name),
        move |ctx| FieldFuture::new(list::<S>(ctx, name.clone())),
    )
    .description(format!("All {} instances.", entity.query.name))
}

async fn list<S: DocumentStore>(ctx: ResolverContext<'_>, entity: String) -> ResolverResult<'_> {
    let docs = handlers::<S>(&ctx)?
        .list(&entity)
        .await
        .map_err(|err| err.extend())?;
    Ok(Some(entities(docs)))
}

fn get_field<S: DocumentStore>(entity: &GeneratedEntity) -> Field {
    let name = entity.query.name.clone();
    Field::new(
        &entity.query.operations.get,
        TypeRef::named(&name),
        move |ctx| FieldFuture::new(get::<S>(ctx, name.clone())),
    )
    .argument(id_argument())
}

async fn get<S: DocumentStore>(ctx: ResolverContext<'_>, entity: String) -> ResolverResult<'_> {
    let id = ctx.args.try_get(QueryType::ID_FIELD)?;
    let id = id.string()?;
    let doc = handlers::<S>(&ctx)?
        .get(&entity, id)
        .await
        .map_err(|err| err.extend())?;
    Ok(doc.map(FieldValue::owned_any))
}

fn create_field<S: DocumentStore>(entity: &GeneratedEntity) -> Field {
    let name = entity.query.name.clone();
    let mut field = Field::new(
        &entity.query.operations.create,
        TypeRef::named_nn(&name),
        move |ctx| FieldFuture::new(create::<S>(ctx, name.clone())),
    );
    for input in &entity.query.inputs {
        field = field.argument(input_argument(input, !input.required));
    }
    field
}

async fn create<S: DocumentStore>(ctx: ResolverContext<'_>, entity: String) -> ResolverResult<'_> {
    let handlers = handlers::<S>(&ctx)?;
    let generated = generated(handlers, &entity)?;
    let input = read_inputs(&generated.query, &ctx.args).map_err(|err| err.extend())?;
    let doc = handlers
        .create(&entity, ctx.ctx.data_opt::<Identity>(), input)
        .await
        .map_err(|err| err.extend())?;
    Ok(Some(FieldValue::owned_any(doc)))
}

fn update_field<S: DocumentStore>(entity: &GeneratedEntity) -> Field {
    let name = entity.query.name.clone();
    Field::new(
        &entity.query.operations.update,
        TypeRef::named_nn(&name),
        move |ctx| FieldFuture::new(update::<S>(ctx, name.clone())),
    )
    .argument(InputValue::new(
        &entity.query.operations.update_argument,
        TypeRef::named_nn(entity.query.update_input_name()),
    ))
}

async fn update<S: DocumentStore>(ctx: ResolverContext<'_>, entity: String) -> ResolverResult<'_> {
    let identity = ctx.ctx.data_opt::<Identity>();
    if identity.is_none() {
        // Reject before looking at the input, so that anonymous callers learn nothing from it.
        return Err(ops::Error::Unauthorized {
            source: Denied::Unauthenticated,
        }
        .extend());
    }
    let handlers = handlers::<S>(&ctx)?;
    let generated = generated(handlers, &entity)?;
    let input = ctx
        .args
        .try_get(&generated.query.operations.update_argument)?;
    let input = input.object()?;
    let id = input.try_get(QueryType::ID_FIELD)?;
    let id = id.string()?;
    let changes = read_inputs(&generated.query, &input).map_err(|err| err.extend())?;
    let doc = handlers
        .update(&entity, identity, id, changes)
        .await
        .map_err(|err| err.extend())?;
    Ok(Some(FieldValue::owned_any(doc)))
}

fn delete_field<S: DocumentStore>(entity: &GeneratedEntity) -> Field {
    let name = entity.query.name.clone();
    Field::new(
        &entity.query.operations.delete,
        TypeRef::named_nn(TypeRef::BOOLEAN),
        move |ctx| FieldFuture::new(delete::<S>(ctx, name.clone())),
    )
    .argument(id_argument())
}

async fn delete<S: DocumentStore>(ctx: ResolverContext<'_>, entity: String) -> ResolverResult<'_> {
    let id = ctx.args.try_get(QueryType::ID_FIELD)?;
    let id = id.string()?;
    let deleted = handlers::<S>(&ctx)?
        .delete(&entity, ctx.ctx.data_opt::<Identity>(), id)
        .await
        .map_err(|err| err.extend())?;
    Ok(Some(FieldValue::value(deleted)))
}

fn id_argument() -> InputValue {
    InputValue::new(QueryType::ID_FIELD, TypeRef::named_nn(TypeRef::ID))
}

fn input_argument(input: &InputField, nullable: bool) -> InputValue {
    let argument = InputValue::new(&input.name, field_type_ref(&input.ty, nullable));
    match &input.description {
        Some(description) => argument.description(description),
        None => argument,
    }
}

/// The input object of the update operation: the identifier plus every input, all optional.
fn update_input(query: &QueryType) -> InputObject {
    query.inputs.iter().fold(
        InputObject::new(query.update_input_name()).field(id_argument()),
        |object, input| object.field(input_argument(input, true)),
    )
}

/// Read the stored fields written by the arguments in `args`.
///
/// Arguments which are absent are left out, while explicit nulls are kept, so that an update can
/// tell "unchanged" from "cleared".
fn read_inputs(query: &QueryType, args: &ObjectAccessor<'_>) -> Result<Document, ops::Error> {
    let mut doc = Document::new();
    for input in &query.inputs {
        if let Some(value) = args.get(&input.name) {
            let value = value
                .deserialize::<GraphQLValue>()
                .map_err(|err| ops::Error::Validation {
                    entity: query.name.clone(),
                    source: ValidationError::TypeMismatch {
                        field: input.name.clone(),
                        expected: input.ty.clone(),
                        actual: err.message,
                    },
                })?;
            let value = input_value(&query.name, &input.name, &input.ty, &value)?;
            doc.insert(input.persisted.clone(), value);
        }
    }
    Ok(doc)
}

fn input_value(
    entity: &str,
    field: &str,
    ty: &FieldType,
    value: &GraphQLValue,
) -> Result<Value, ops::Error> {
    let mismatch = || ops::Error::Validation {
        entity: entity.into(),
        source: ValidationError::TypeMismatch {
            field: field.into(),
            expected: ty.clone(),
            actual: value.to_string(),
        },
    };
    Ok(match (ty, value) {
        (_, GraphQLValue::Null) => Value::Null,
        (FieldType::String, GraphQLValue::String(s)) => Value::String(s.clone()),
        (FieldType::Int, GraphQLValue::Number(n)) => Value::Int(n.as_i64().ok_or_else(mismatch)?),
        (FieldType::Float, GraphQLValue::Number(n)) => {
            Value::Float(n.as_f64().ok_or_else(mismatch)?)
        }
        (FieldType::Boolean, GraphQLValue::Boolean(b)) => Value::Boolean(*b),
        (FieldType::Id, GraphQLValue::String(s)) => Value::Id(ops::parse_id(s)?),
        (FieldType::List(item), GraphQLValue::List(items)) => Value::List(
            items
                .iter()
                .map(|item_value| input_value(entity, field, item, item_value))
                .collect::<Result<_, _>>()?,
        ),
        _ => return Err(mismatch()),
    })
}

fn object_type<S: DocumentStore>(query: &QueryType, computed: &[ComputedField<S>]) -> Object {
    let mut object = Object::new(&query.name);
    if let Some(description) = &query.description {
        object = object.description(description);
    }
    for field in &query.fields {
        let resolver = computed
            .iter()
            .find(|c| c.declaration.entity == query.name && c.declaration.name == field.name)
            .map(|c| c.resolver.clone());
        object = object.field(object_field(field, resolver));
    }
    object
}

fn object_field<S: DocumentStore>(
    field: &QueryField,
    resolver: Option<Arc<dyn Resolver<S>>>,
) -> Field {
    let kind = field.kind.clone();
    let object_field = Field::new(&field.name, output_type_ref(&field.ty), move |ctx| {
        FieldFuture::new(resolve_field(ctx, kind.clone(), resolver.clone()))
    });
    match &field.description {
        Some(description) => object_field.description(description),
        None => object_field,
    }
}

async fn resolve_field<S: DocumentStore>(
    ctx: ResolverContext<'_>,
    kind: FieldKind,
    resolver: Option<Arc<dyn Resolver<S>>>,
) -> ResolverResult<'_> {
    let parent = ctx.parent_value.try_downcast_ref::<Document>()?;
    match kind {
        FieldKind::Id => Ok(parent
            .id()
            .map(|id| FieldValue::value(id.as_str().to_string()))),
        FieldKind::Stored { persisted } => Ok(parent.get(&persisted).and_then(scalar)),
        FieldKind::Derived { source } => Ok(scalar(&source(parent))),
        FieldKind::Reference {
            persisted,
            target,
            many,
        } => {
            let docs = handlers::<S>(&ctx)?
                .resolve(&target, &parent.ids(&persisted))
                .await
                .map_err(|err| err.extend())?;
            if many {
                Ok(Some(entities(docs)))
            } else {
                Ok(docs.into_iter().next().map(FieldValue::owned_any))
            }
        }
        FieldKind::Computed => {
            let Some(resolver) = resolver else {
                return Ok(None);
            };
            let resolved = resolver
                .resolve(handlers::<S>(&ctx)?, parent)
                .await
                .map_err(|err| err.extend())?;
            Ok(resolved.into_field_value())
        }
    }
}

fn entities<'a>(docs: Vec<Document>) -> FieldValue<'a> {
    FieldValue::list(docs.into_iter().map(FieldValue::owned_any))
}

fn scalar<'a>(value: &Value) -> Option<FieldValue<'a>> {
    match value {
        Value::Null => None,
        value => Some(FieldValue::value(to_graphql(value))),
    }
}

fn to_graphql(value: &Value) -> GraphQLValue {
    match value {
        Value::Null => GraphQLValue::Null,
        Value::String(s) => GraphQLValue::String(s.clone()),
        Value::Int(i) => GraphQLValue::Number((*i).into()),
        Value::Float(f) => Number::from_f64(*f).map_or(GraphQLValue::Null, GraphQLValue::Number),
        Value::Boolean(b) => GraphQLValue::Boolean(*b),
        Value::Id(id) => GraphQLValue::String(id.as_str().to_string()),
        Value::List(items) => GraphQLValue::List(items.iter().map(to_graphql).collect()),
    }
}

fn scalar_name(ty: &FieldType) -> &'static str {
    match ty {
        FieldType::String => TypeRef::STRING,
        FieldType::Int => TypeRef::INT,
        FieldType::Float => TypeRef::FLOAT,
        FieldType::Boolean => TypeRef::BOOLEAN,
        FieldType::Id => TypeRef::ID,
        FieldType::List(item) => scalar_name(item),
    }
}

fn field_type_ref(ty: &FieldType, nullable: bool) -> TypeRef {
    match (ty.item(), nullable) {
        (Some(item), true) => TypeRef::named_nn_list(scalar_name(item)),
        (Some(item), false) => TypeRef::named_nn_list_nn(scalar_name(item)),
        (None, true) => TypeRef::named(scalar_name(ty)),
        (None, false) => TypeRef::named_nn(scalar_name(ty)),
    }
}

fn output_type_ref(ty: &OutputType) -> TypeRef {
    match ty {
        OutputType::Scalar { ty, nullable } => field_type_ref(ty, *nullable),
        OutputType::Entity {
            name,
            nullable: true,
        } => TypeRef::named(name),
        OutputType::Entity {
            name,
            nullable: false,
        } => TypeRef::named_nn(name),
        OutputType::EntityList { name } => TypeRef::named_nn_list_nn(name),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::document::Id;
    use crate::init_logging;
    use crate::model;
    use crate::store::mock;
    use async_graphql::{value, Response};

    async fn api() -> Api<mock::Connection> {
        init_logging();
        model::api().build(mock::Connection::create()).await.unwrap()
    }

    async fn run(
        api: &Api<mock::Connection>,
        query: &str,
        identity: Option<&Identity>,
    ) -> Response {
        let response = api.execute(query, identity.cloned()).await;
        tracing::info!(query, errors = ?response.errors, "executed");
        response
    }

    /// Execute `query`, which must succeed.
    async fn data(
        api: &Api<mock::Connection>,
        query: &str,
        identity: Option<&Identity>,
    ) -> GraphQLValue {
        let response = run(api, query, identity).await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        response.data
    }

    /// Execute `query`, which must fail, returning the error code.
    async fn error_code(
        api: &Api<mock::Connection>,
        query: &str,
        identity: Option<&Identity>,
    ) -> String {
        let response = run(api, query, identity).await;
        let error = response.errors.first().expect("query should have failed");
        match error.extensions.as_ref().and_then(|e| e.get("code")) {
            Some(GraphQLValue::String(code)) => code.clone(),
            code => panic!("unexpected error code {code:?} in {error:?}"),
        }
    }

    fn lookup<'v>(value: &'v GraphQLValue, path: &[&str]) -> &'v GraphQLValue {
        path.iter().fold(value, |value, key| match value {
            GraphQLValue::Object(fields) => fields
                .iter()
                .find(|(name, _)| name.as_str() == *key)
                .map_or(&GraphQLValue::Null, |(_, value)| value),
            _ => &GraphQLValue::Null,
        })
    }

    fn string(value: &GraphQLValue) -> String {
        match value {
            GraphQLValue::String(s) => s.clone(),
            value => panic!("expected a string, got {value}"),
        }
    }

    const ADD_ADA: &str = r#"mutation {
        addUser(name: "Ada Lovelace", email: "ada@example.com", password: "analytical") {
            id name email username articleIds
        }
    }"#;

    async fn add_ada(api: &Api<mock::Connection>) -> Identity {
        let data = data(api, ADD_ADA, None).await;
        let id = string(lookup(&data, &["addUser", "id"]));
        Identity::member(Id::parse(&id).unwrap())
    }

    #[async_std::test]
    async fn test_sdl_hides_persisted_only_fields() {
        let api = api().await;
        let sdl = api.sdl();
        tracing::info!("{sdl}");
        let user_type = sdl
            .split("type User {")
            .nth(1)
            .and_then(|rest| rest.split('}').next())
            .unwrap();
        assert!(user_type.contains("articleIds: [ID!]!"));
        assert!(user_type.contains("articles: [Article!]!"));
        assert!(user_type.contains("articleCount: Int!"));
        assert!(!user_type.contains("password"));
        assert!(sdl.contains("input UserUpdateInput"));

        let data = data(
            &api,
            r#"{ __type(name: "User") { fields { name } } }"#,
            None,
        )
        .await;
        let GraphQLValue::List(fields) = lookup(&data, &["__type", "fields"]) else {
            panic!("introspection failed: {data}");
        };
        let names: Vec<_> = fields.iter().map(|f| string(lookup(f, &["name"]))).collect();
        assert_eq!(
            names,
            [
                "id",
                "name",
                "email",
                "username",
                "articleIds",
                "articles",
                "articleCount",
                "latestArticle"
            ]
        );
    }

    #[async_std::test]
    async fn test_introspection_disabled() {
        init_logging();
        let api = model::api()
            .introspection(false)
            .build(mock::Connection::create())
            .await
            .unwrap();
        let response = run(&api, r#"{ __type(name: "User") { name } }"#, None).await;
        assert_ne!(
            lookup(&response.data, &["__type", "name"]),
            &value!("User")
        );
    }

    #[async_std::test]
    async fn test_create_then_get() {
        let api = api().await;
        assert_eq!(
            data(&api, "{ getUsers { id } }", None).await,
            value!({ "getUsers": [] })
        );

        let created = data(&api, ADD_ADA, None).await;
        let user = lookup(&created, &["addUser"]);
        assert_eq!(lookup(user, &["name"]), &value!("Ada Lovelace"));
        assert_eq!(lookup(user, &["articleIds"]), &value!([]));
        assert!(string(lookup(user, &["username"])).starts_with("adalovelace"));

        let id = string(lookup(user, &["id"]));
        let fetched = data(
            &api,
            &format!(r#"{{ getUserById(id: "{id}") {{ id name email username articleIds }} }}"#),
            None,
        )
        .await;
        assert_eq!(lookup(&fetched, &["getUserById"]), user);

        let listed = data(&api, "{ getUsers { id } }", None).await;
        assert_eq!(listed, value!({ "getUsers": [{ "id": id }] }));
    }

    #[async_std::test]
    async fn test_get_missing() {
        let api = api().await;
        let query = format!(r#"{{ getUserById(id: "{}") {{ id }} }}"#, Id::generate());
        assert_eq!(
            data(&api, &query, None).await,
            value!({ "getUserById": null })
        );
        assert_eq!(
            error_code(&api, r#"{ getUserById(id: "nope") { id } }"#, None).await,
            "BAD_USER_INPUT"
        );
    }

    #[async_std::test]
    async fn test_duplicate_email() {
        let api = api().await;
        add_ada(&api).await;
        assert_eq!(error_code(&api, ADD_ADA, None).await, "CONFLICT");
        assert_eq!(api.store().len("users").await, 1);
    }

    #[async_std::test]
    async fn test_mutations_require_identity() {
        let api = api().await;
        let ada = add_ada(&api).await;
        for id in [ada.user_id.clone(), Id::generate()] {
            let update = format!(
                r#"mutation {{ updateUser(user: {{ id: "{id}", name: "Eve" }}) {{ id }} }}"#
            );
            assert_eq!(error_code(&api, &update, None).await, "UNAUTHORIZED");
            let delete = format!(r#"mutation {{ deleteUser(id: "{id}") }}"#);
            assert_eq!(error_code(&api, &delete, None).await, "UNAUTHORIZED");
        }

        let update = format!(
            r#"mutation {{ updateUser(user: {{ id: "{}", name: "Countess" }}) {{ name email }} }}"#,
            ada.user_id
        );
        assert_eq!(
            data(&api, &update, Some(&ada)).await,
            value!({ "updateUser": { "name": "Countess", "email": "ada@example.com" } })
        );
    }

    #[async_std::test]
    async fn test_update_arguments() {
        let api = api().await;
        let ada = add_ada(&api).await;

        // An explicit null is an attempt to clear the field, not an omission.
        let clear = format!(
            r#"mutation {{ updateUser(user: {{ id: "{}", name: null }}) {{ name }} }}"#,
            ada.user_id
        );
        assert_eq!(error_code(&api, &clear, Some(&ada)).await, "BAD_USER_INPUT");

        let request = async_graphql::Request::new(
            "mutation ($user: UserUpdateInput!) { updateUser(user: $user) { name email username } }",
        )
        .variables(async_graphql::Variables::from_value(value!({
            "user": { "id": ada.user_id.as_str(), "username": "countess" }
        })));
        let response = api.execute(request, Some(ada.clone())).await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(
            response.data,
            value!({
                "updateUser": {
                    "name": "Ada Lovelace",
                    "email": "ada@example.com",
                    "username": "countess",
                }
            })
        );

        let mistyped = format!(
            r#"mutation {{ updateUser(user: {{ id: "{}", name: 7 }}) {{ name }} }}"#,
            ada.user_id
        );
        assert!(!run(&api, &mistyped, Some(&ada)).await.errors.is_empty());
    }

    #[async_std::test]
    async fn test_update_missing() {
        let api = api().await;
        let ada = add_ada(&api).await;
        let admin = Identity::admin(ada.user_id.clone());
        let update = format!(
            r#"mutation {{ updateUser(user: {{ id: "{}", name: "Nobody" }}) {{ id }} }}"#,
            Id::generate()
        );
        assert_eq!(error_code(&api, &update, Some(&admin)).await, "NOT_FOUND");
    }

    #[async_std::test]
    async fn test_delete_twice() {
        let api = api().await;
        let ada = add_ada(&api).await;
        let delete = format!(r#"mutation {{ deleteUser(id: "{}") }}"#, ada.user_id);
        for _ in 0..2 {
            assert_eq!(
                data(&api, &delete, Some(&ada)).await,
                value!({ "deleteUser": true })
            );
        }
        assert_eq!(api.store().len("users").await, 0);
    }

    #[async_std::test]
    async fn test_relationships() {
        let api = api().await;
        let ada = add_ada(&api).await;
        let add_article = r#"mutation {
            addArticle(title: "Notes", body: "On the Analytical Engine") {
                id title excerpt authorId author { name }
            }
        }"#;
        assert_eq!(error_code(&api, add_article, None).await, "UNAUTHORIZED");

        let created = data(&api, add_article, Some(&ada)).await;
        let article = lookup(&created, &["addArticle"]);
        let article_id = string(lookup(article, &["id"]));
        assert_eq!(
            lookup(article, &["excerpt"]),
            &value!("On the Analytical Engine")
        );
        assert_eq!(
            lookup(article, &["authorId"]),
            &value!(ada.user_id.as_str())
        );
        assert_eq!(
            lookup(article, &["author"]),
            &value!({ "name": "Ada Lovelace" })
        );

        let query = format!(
            r#"{{ getUserById(id: "{}") {{
                articleIds articleCount articles {{ title }} latestArticle {{ id }}
            }} }}"#,
            ada.user_id
        );
        assert_eq!(
            data(&api, &query, None).await,
            value!({
                "getUserById": {
                    "articleIds": [article_id.clone()],
                    "articleCount": 1,
                    "articles": [{ "title": "Notes" }],
                    "latestArticle": { "id": article_id.clone() },
                }
            })
        );

        let delete = format!(r#"mutation {{ deleteArticle(id: "{article_id}") }}"#);
        data(&api, &delete, Some(&ada)).await;
        assert_eq!(
            data(&api, &query, None).await,
            value!({
                "getUserById": {
                    "articleIds": [],
                    "articleCount": 0,
                    "articles": [],
                    "latestArticle": null,
                }
            })
        );
    }

    #[async_std::test]
    async fn test_configuration_errors() {
        init_logging();
        let Err(err) = ApiBuilder::<mock::Connection>::new()
            .entity::<model::Article>()
            .build(mock::Connection::create())
            .await
        else {
            panic!("built an API referencing an unregistered entity");
        };
        assert!(
            matches!(
                err,
                Error::Generate {
                    source: schema::Error::UnknownEntity { .. }
                }
            ),
            "{err}"
        );
    }
}
