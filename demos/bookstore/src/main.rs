mod domain;
mod dto;
mod handlers;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use opkit::{Group, Registry};
use opkit::contracts::Codec;
use opkit_axum::{App, AppConfig, JsonCodec, YamlCodec};
use opkit_schema::SchemaRegistry;
use tracing_subscriber::EnvFilter;

use domain::Catalog;

#[derive(Parser, Debug)]
#[command(name = "bookstore", about = "books CRUD demo over opkit")]
struct Cli {
    #[arg(long, default_value_t = 8080)]
    port: u16,

    #[arg(long, default_value = "/api/v1")]
    prefix: String,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();

    let mut registry = Registry::new();
    let mut schemas = SchemaRegistry::default();
    let catalog = Arc::new(Catalog::seeded());
    let group = Group::new().prefix(cli.prefix.clone());

    routes::register_routes(&mut registry, &mut schemas, &group, catalog)?;
    let frozen = registry.freeze();

    let app = App::new(
        frozen,
        Arc::new(schemas),
        vec![Arc::new(JsonCodec) as Arc<dyn Codec>, Arc::new(YamlCodec)],
        Vec::new(),
        Vec::new(),
        AppConfig {
            title: "Bookstore API".to_string(),
            version: "0.1.0".to_string(),
            description: Some("Reference opkit demo: a small books CRUD service".to_string()),
            request_timeout: Duration::from_secs(10),
            ..AppConfig::default()
        },
    );

    let addr = format!("0.0.0.0:{}", cli.port);
    tracing::info!(%addr, "starting bookstore demo");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.router()).await?;
    Ok(())
}
