use clap::Parser;
use docgraph::{
    auth::BearerAuth,
    init_logging,
    model::{self, User},
    server::{self, Config},
    store::{mock, mongo, DocumentStore},
};
use tracing::info;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    init_logging();
    let config = Config::parse();
    let auth = BearerAuth::for_entity::<User>().with_admins(config.admin_ids.iter().cloned());

    if config.in_memory {
        info!("keeping data in memory");
        run(mock::Connection::create(), auth, &config).await
    } else {
        let store = mongo::Connection::init(&config.database_url).await?;
        run(store, auth, &config).await
    }
}

async fn run<S: DocumentStore>(
    store: S,
    auth: BearerAuth,
    config: &Config,
) -> color_eyre::Result<()> {
    let api = model::api()
        .introspection(config.development())
        .build(store)
        .await?;
    server::serve(api, auth, config).await?;
    Ok(())
}
