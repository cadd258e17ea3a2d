//! ArbiterLock façade binary: wires configuration, logging, the atomic
//! store, the engine, the optional scavenger, and the actix-web server
//! together. Mirrors the shape of the host codebase's own `main.rs`
//! (config first, then logging, then server construction), minus the
//! multi-protocol (gRPC + console/main HTTP) split that binary does —
//! ArbiterLock has exactly one façade to serve.

use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use arbiterlock_server::config::Configuration;
use arbiterlock_server::state::AppState;
use arbiterlock_server::{routes, telemetry};
use arbiterlock_store::memory::InMemoryStore;
use arbiterlock_store::redis::RedisStore;
use arbiterlock_store::AtomicStore;
use tracing::info;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let configuration = Configuration::new();

    let subscriber = telemetry::get_subscriber(
        "arbiterlock-server",
        &configuration.log_level(),
        std::io::stdout,
    );
    telemetry::init_subscriber(subscriber);

    let store_url = configuration.store_url();
    let store: Arc<dyn AtomicStore> = if store_url.starts_with("memory://") {
        info!("using in-memory atomic store");
        Arc::new(InMemoryStore::new())
    } else {
        info!(%store_url, "connecting to redis atomic store");
        Arc::new(RedisStore::connect(&store_url).await?)
    };

    let engine = Arc::new(arbiterlock_engine::LockEngine::new(
        store,
        configuration.engine_config(),
    ));

    let scavenger = arbiterlock_engine::spawn_scavenger(engine.clone());

    let app_state = AppState { engine };
    let listen_addr = configuration.listen_addr();
    info!(%listen_addr, "starting arbiterlock-server");

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::new(app_state.clone()))
            .configure(routes::configure)
    })
    .bind(listen_addr)?
    .run()
    .await?;

    drop(scavenger);
    Ok(())
}
