use std::collections::BTreeMap;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::models::power::{
    ArrayInfo, ArrayPowerResponse, ManualIrradianceBody, ModbusInfo, PowerStatusResponse, SensorStateBody,
    TOTAL_KEY,
};
use crate::modbus_server;
use crate::services::sensor_service;
use crate::shared_state::AppState;

fn error_json(status: StatusCode, msg: impl Into<String>) -> axum::response::Response {
    (status, Json(serde_json::json!({ "error": msg.into() }))).into_response()
}

/// GET /api/arrays
/// List all configured arrays
///
/// Returns orientation, panel count, wattage and capacity for every array.
#[utoipa::path(
    get,
    path = "/api/arrays",
    responses(
        (status = 200, description = "Configured arrays", body = Vec<ArrayInfo>)
    )
)]
pub async fn list_arrays(State(state): State<AppState>) -> impl IntoResponse {
    let arrays: Vec<ArrayInfo> = state.config.arrays.iter().map(|a| a.info()).collect();
    Json(arrays).into_response()
}

/// GET /api/power
/// Latest estimate and refresh status
///
/// The estimate is the last successful one; `status` tells whether the most
/// recent attempt failed.
#[utoipa::path(
    get,
    path = "/api/power",
    responses(
        (status = 200, description = "Latest snapshot and status", body = PowerStatusResponse),
        (status = 503, description = "No successful refresh yet", body = PowerStatusResponse)
    )
)]
pub async fn get_power(State(state): State<AppState>) -> impl IntoResponse {
    let response = PowerStatusResponse {
        status: state.status(),
        snapshot: state.snapshot(),
        mqtt_connected: state.is_mqtt_connected(),
    };
    let code = if response.snapshot.is_some() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(response)).into_response()
}

/// GET /api/power/{name}
/// Power of a single array, or `total`
#[utoipa::path(
    get,
    path = "/api/power/{name}",
    params(
        ("name" = String, Path, description = "Array name, or `total`")
    ),
    responses(
        (status = 200, description = "Current array power", body = ArrayPowerResponse),
        (status = 404, description = "Array not found"),
        (status = 503, description = "No successful refresh yet")
    )
)]
pub async fn get_array_power(Path(name): Path<String>, State(state): State<AppState>) -> impl IntoResponse {
    let array = state.config.arrays.iter().find(|a| a.name == name);
    if array.is_none() && name != TOTAL_KEY {
        return error_json(StatusCode::NOT_FOUND, format!("Array '{}' not found", name));
    }
    let Some(snapshot) = state.snapshot() else {
        return error_json(StatusCode::SERVICE_UNAVAILABLE, "No estimate available yet");
    };

    let is_total = array.is_none();
    let arrays = &state.config.arrays;
    let response = ArrayPowerResponse {
        power_w: snapshot.power.get(&name).unwrap_or(0.0),
        computed_at: snapshot.computed_at,
        array: array.map(|a| a.info()),
        total_array_capacity: is_total.then(|| arrays.iter().map(|a| a.total_capacity()).sum::<f64>()),
        array_count: is_total.then_some(arrays.len()),
        solar_radiation_entity: is_total.then(|| state.config.estimator.solar_radiation_sensor.clone()),
        name,
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// GET /api/sensors
/// Raw state of every known sensor
#[utoipa::path(
    get,
    path = "/api/sensors",
    responses(
        (status = 200, description = "Sensor id to raw state", body = BTreeMap<String, String>)
    )
)]
pub async fn list_sensors(State(state): State<AppState>) -> impl IntoResponse {
    let sensors: BTreeMap<String, String> = state.sensors.all().into_iter().collect();
    Json(sensors).into_response()
}

/// PUT /api/sensors/{id}
/// Set a sensor's raw state
///
/// Accepts any string so that `unknown` and `unavailable` can be injected.
/// A change to the radiation sensor triggers a refresh.
#[utoipa::path(
    put,
    path = "/api/sensors/{id}",
    params(
        ("id" = String, Path, description = "Sensor id")
    ),
    request_body = SensorStateBody,
    responses(
        (status = 200, description = "State stored"),
        (status = 400, description = "Empty state")
    )
)]
pub async fn set_sensor(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<SensorStateBody>,
) -> impl IntoResponse {
    if body.state.trim().is_empty() {
        return error_json(StatusCode::BAD_REQUEST, "state must not be empty");
    }
    let changed = state.sensors.set(&id, body.state.trim());
    debug!("[API] Sensor {} = {} (changed: {})", id, body.state, changed);
    Json(serde_json::json!({ "id": id, "state": body.state.trim(), "changed": changed })).into_response()
}

/// POST /api/irradiance/manual
/// Manual irradiance input
///
/// Writes to the `manual.solar_radiation` sensor. Point the estimator's
/// `solar_radiation_sensor` there to drive estimates by hand.
#[utoipa::path(
    post,
    path = "/api/irradiance/manual",
    request_body = ManualIrradianceBody,
    responses(
        (status = 200, description = "Value stored"),
        (status = 400, description = "Value outside 0..=1500 W/m²")
    )
)]
pub async fn set_manual_irradiance(
    State(state): State<AppState>,
    Json(body): Json<ManualIrradianceBody>,
) -> impl IntoResponse {
    match sensor_service::set_manual_irradiance(&state.sensors, body.value) {
        Ok(()) => Json(serde_json::json!({
            "sensor": sensor_service::MANUAL_IRRADIANCE_SENSOR,
            "value": body.value,
        }))
        .into_response(),
        Err(e) => error_json(StatusCode::BAD_REQUEST, e),
    }
}

/// POST /api/refresh
/// Request a refresh
///
/// Requests made while one is already pending are merged into it.
#[utoipa::path(
    post,
    path = "/api/refresh",
    responses(
        (status = 202, description = "Refresh requested")
    )
)]
pub async fn request_refresh(State(state): State<AppState>) -> impl IntoResponse {
    state.request_refresh();
    (StatusCode::ACCEPTED, Json(serde_json::json!({ "requested": true }))).into_response()
}

/// GET /api/modbus/info
/// Get Modbus register information
///
/// Every value is an IEEE 754 float32 split across two consecutive u16
/// registers (high word first), except the single-register status.
#[utoipa::path(
    get,
    path = "/api/modbus/info",
    responses(
        (status = 200, description = "List of Modbus registers", body = Vec<ModbusInfo>)
    )
)]
pub async fn get_modbus_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(modbus_server::describe_registers(&state.config)).into_response()
}

/// GET /api/ws
/// Live snapshot stream
///
/// Sends the current snapshot on connect, then every new one as JSON text.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_snapshots(socket, state))
}

async fn stream_snapshots(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut updates = state.subscribe_updates();
    info!("[WS] Client connected");

    if let Some(current) = state.snapshot() {
        if let Ok(json) = serde_json::to_string(&current) {
            if sender.send(Message::Text(json.into())).await.is_err() {
                return;
            }
        }
    }

    loop {
        tokio::select! {
            update = updates.recv() => {
                let snapshot = match update {
                    Ok(s) => s,
                    Err(RecvError::Lagged(_)) => match state.snapshot() {
                        Some(s) => s,
                        None => continue,
                    },
                    Err(RecvError::Closed) => break,
                };
                let Ok(json) = serde_json::to_string(&snapshot) else { continue };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    info!("[WS] Client disconnected");
}
