mod routes;
mod controllers;
mod services;
mod models;
mod api_docs;
mod shared_state;
mod modbus_server;
mod config;
mod error;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get, response::Html};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_scalar::Scalar;

use crate::api_docs::ApiDoc;
use crate::config::Config;
use crate::routes::power_routes::api_routes;
use crate::services::clock::SystemClock;
use crate::services::coordinator::{spawn_sensor_trigger, Coordinator};
use crate::shared_state::AppState;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    // 1. Load configuration
    let config = match Config::load("config.json") {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load config.json: {}", e);
            return;
        }
    };
    info!(
        "Configuration loaded: {} arrays, inverter {} W",
        config.arrays.len(),
        config.estimator.inverter_capacity
    );
    if config.arrays.is_empty() {
        warn!("No arrays configured; every estimate will be 0 W");
    }

    // 2. Initialize shared state
    let state = AppState::new(config.clone());

    // 3. Refresh loop, woken on interval and on radiation changes
    let coordinator = match Coordinator::new(state.clone(), Arc::new(SystemClock)) {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid estimator configuration: {}", e);
            return;
        }
    };
    spawn_sensor_trigger(&state);
    tokio::spawn(coordinator.run());

    // 4. Open-Meteo sensor source
    if config.open_meteo.enabled {
        match config.location() {
            Ok(location) => {
                tokio::spawn(services::sensor_service::run_open_meteo_poller(
                    config.open_meteo.clone(),
                    location,
                    state.sensors.clone(),
                ));
            }
            Err(e) => warn!("[OPEN-METEO] Not started: {}", e),
        }
    }

    // 5. Modbus TCP server
    let modbus_addr = SocketAddr::from(([0, 0, 0, 0], config.modbus.port));
    if config.modbus.enabled {
        let state_modbus = state.clone();
        tokio::spawn(async move {
            if let Err(e) = modbus_server::run_server(modbus_addr, state_modbus).await {
                error!("Modbus server error: {}", e);
            }
        });
    }

    // 6. MQTT publisher
    tokio::spawn(services::mqtt_service::run_publisher(config.mqtt.clone(), state.clone()));

    // 7. Axum HTTP server
    let app = Router::new()
        .nest("/api", api_routes(state.clone()))
        .route("/scalar", get(|| async {
            Html(Scalar::new(ApiDoc::openapi()).to_html())
        }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("API Server listening on http://{}", addr);
    info!("Scalar UI: http://{}/scalar", addr);
    if config.modbus.enabled {
        info!("Modbus TCP: {}", modbus_addr);
    }

    if let Err(e) = axum_server::bind(addr).serve(app.into_make_service()).await {
        error!("HTTP server error: {}", e);
    }
}
