/// MQTT estimate publisher
///
/// Publishes each fresh power snapshot as JSON to a configured broker.
/// Topic structure:
///   `{prefix}/power`               full snapshot
///   `{prefix}/{array_slug}/power`  one array's output in W
///   `{prefix}/system/status`       retained ONLINE/OFFLINE status

use std::time::Duration;

use rumqttc::{AsyncClient, LastWill, MqttOptions, QoS};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::config::{ArrayConfig, MqttConfig};
use crate::models::power::PowerSnapshot;
use crate::shared_state::AppState;

/// Topic/payload pairs for one snapshot.
pub fn snapshot_messages(prefix: &str, snapshot: &PowerSnapshot, arrays: &[ArrayConfig]) -> Vec<(String, String)> {
    let prefix = prefix.trim_end_matches('/');
    let mut out = Vec::with_capacity(arrays.len() + 1);

    let payload = serde_json::json!({
        "timestamp":         snapshot.computed_at.to_rfc3339(),
        "ghi_w_m2":          snapshot.ghi_w_m2,
        "air_temperature_c": snapshot.air_temperature_c,
        "solar_zenith_deg":  snapshot.solar_position.zenith,
        "solar_azimuth_deg": snapshot.solar_position.azimuth,
        "power_w":           snapshot.power,
    });
    out.push((format!("{}/power", prefix), payload.to_string()));

    for array in arrays {
        if let Some(w) = snapshot.power.get(&array.name) {
            let payload = serde_json::json!({
                "name":      array.name,
                "power_w":   w,
                "timestamp": snapshot.computed_at.to_rfc3339(),
            });
            out.push((format!("{}/{}/power", prefix, array.slug()), payload.to_string()));
        }
    }
    out
}

pub async fn run_publisher(cfg: MqttConfig, state: AppState) {
    if !cfg.enabled || cfg.broker_host.is_empty() {
        info!("[MQTT] Disabled or no broker configured, skipping MQTT publisher");
        return;
    }

    let client_id = if cfg.client_id.is_empty() {
        format!("pv-estimator-{}", uuid::Uuid::new_v4())
    } else {
        cfg.client_id.clone()
    };
    let prefix = cfg.topic_prefix.trim_end_matches('/').to_string();
    let status_topic = format!("{}/system/status", prefix);

    info!(
        "[MQTT] Connecting to {}:{} (client_id={})",
        cfg.broker_host, cfg.broker_port, client_id
    );

    let mut opts = MqttOptions::new(&client_id, &cfg.broker_host, cfg.broker_port);
    opts.set_keep_alive(Duration::from_secs(30));
    opts.set_clean_session(true);
    opts.set_last_will(LastWill::new(
        &status_topic,
        serde_json::json!({ "status": "OFFLINE" }).to_string(),
        QoS::AtLeastOnce,
        true,
    ));
    if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
        opts.set_credentials(user, pass);
    }

    let (client, mut eventloop) = AsyncClient::new(opts, 64);

    let birth_payload = serde_json::json!({
        "status": "ONLINE",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    if let Err(e) = client
        .publish(&status_topic, QoS::AtLeastOnce, true, birth_payload.to_string().as_bytes())
        .await
    {
        warn!("[MQTT] Failed to queue birth message: {}", e);
    }

    let mut updates = state.subscribe_updates();
    // Optional periodic republish of the last snapshot, for late subscribers
    let mut republish = cfg
        .publish_interval_s
        .map(|s| tokio::time::interval(Duration::from_secs(s.max(1))));

    loop {
        let snapshot = tokio::select! {
            event = eventloop.poll() => {
                match event {
                    Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_))) => {
                        info!("[MQTT] Connected, status on {}", status_topic);
                        state.set_mqtt_connected(true);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("[MQTT] Event loop error: {}; will reconnect", e);
                        state.set_mqtt_connected(false);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
                continue;
            }
            update = updates.recv() => match update {
                Ok(snapshot) => snapshot,
                Err(RecvError::Lagged(n)) => {
                    debug!("[MQTT] Skipped {} stale snapshots", n);
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
            _ = async {
                match republish.as_mut() {
                    Some(interval) => { interval.tick().await; }
                    None => std::future::pending::<()>().await,
                }
            } => match state.snapshot() {
                Some(snapshot) => snapshot,
                None => continue,
            },
        };

        for (topic, payload) in snapshot_messages(&prefix, &snapshot, &state.config.arrays) {
            if let Err(e) = client.publish(&topic, QoS::AtMostOnce, false, payload.as_bytes()).await {
                warn!("[MQTT] Publish error for {}: {}", topic, e);
                state.set_mqtt_connected(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::power::{PowerResult, SolarPosition};
    use chrono::{TimeZone, Utc};

    fn array(name: &str) -> ArrayConfig {
        serde_json::from_value(serde_json::json!({ "name": name })).unwrap()
    }

    #[test]
    fn test_snapshot_messages_topics_and_payloads() {
        let mut power = PowerResult::new();
        power.insert_array("South Roof", 2100.0);
        power.insert_array("Garage", 900.0);
        power.set_total(3000.0);
        let snapshot = PowerSnapshot {
            computed_at: Utc.with_ymd_and_hms(2025, 6, 21, 10, 0, 0).unwrap(),
            ghi_w_m2: 780.0,
            air_temperature_c: Some(24.0),
            solar_position: SolarPosition { zenith: 25.0, azimuth: 160.0 },
            power,
        };

        let msgs = snapshot_messages("home/pv/", &snapshot, &[array("South Roof"), array("Garage")]);
        let topics: Vec<&str> = msgs.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(topics, ["home/pv/power", "home/pv/south_roof/power", "home/pv/garage/power"]);

        let full: serde_json::Value = serde_json::from_str(&msgs[0].1).unwrap();
        assert_eq!(full["power_w"]["total"], 3000.0);
        assert_eq!(full["power_w"]["Garage"], 900.0);

        let south: serde_json::Value = serde_json::from_str(&msgs[1].1).unwrap();
        assert_eq!(south["power_w"], 2100.0);
    }
}
