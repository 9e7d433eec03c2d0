use axum::{
    routing::{get, post, put},
    Router,
};

use crate::controllers::power_controller::{
    // Estimates
    get_array_power, get_power, list_arrays, request_refresh,
    // Inputs
    list_sensors, set_manual_irradiance, set_sensor,
    // Field protocols & streaming
    get_modbus_info, ws_handler,
};
use crate::shared_state::AppState;

/// Build the `/api/*` sub-router.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/arrays",             get(list_arrays))
        .route("/power",              get(get_power))
        .route("/power/{name}",       get(get_array_power))
        .route("/sensors",            get(list_sensors))
        .route("/sensors/{id}",       put(set_sensor))
        .route("/irradiance/manual",  post(set_manual_irradiance))
        .route("/refresh",            post(request_refresh))
        .route("/modbus/info",        get(get_modbus_info))
        .route("/ws",                 get(ws_handler))
        .with_state(state)
}
