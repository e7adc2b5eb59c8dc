use actix_web::{web, App, HttpServer};
use anyhow::Context;
use api_gateway::config::Config;
use api_gateway::routes::RouteTable;
use api_gateway::{build_pipeline, connect_counter_store, handlers, GatewayState, SERVICE_NAME};
use actix_middleware::GatewayMetrics;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Structured JSON logs for aggregation
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,api_gateway=debug,actix_middleware=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true),
        )
        .init();

    info!("Starting API Gateway...");

    let config = Config::from_env().context("failed to load configuration")?;
    let tokens = config.jwt.token_manager()?;

    let store = connect_counter_store(&config.counter_store).await?;
    let metrics = GatewayMetrics::new(SERVICE_NAME).context("failed to register metrics")?;
    let routes = Arc::new(RouteTable::from_endpoints(&config.services));

    for target in routes.targets() {
        info!(
            service = target.name,
            prefixes = ?target.path_prefixes,
            base_url = %target.base_url,
            "Route registered"
        );
    }

    let state = web::Data::new(GatewayState::new(&config, routes.clone(), metrics.clone())?);
    let pipeline = build_pipeline(&config, tokens, store, metrics, routes);
    info!(stages = ?pipeline.stage_names(), "Request pipeline assembled");

    let bind_addr = config.bind_addr();
    info!(addr = %bind_addr, workers = config.server.workers, "API Gateway listening");

    HttpServer::new(move || {
        App::new()
            .wrap(pipeline.clone())
            .configure(handlers::configure(state.clone()))
    })
    .workers(config.server.workers)
    .bind(&bind_addr)
    .with_context(|| format!("failed to bind {bind_addr}"))?
    .run()
    .await
    .context("server error")?;

    info!("API Gateway stopped");
    Ok(())
}
