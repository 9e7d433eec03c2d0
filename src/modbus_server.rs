use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use tokio_modbus::ExceptionCode;
use tokio_modbus::prelude::*;
use tokio_modbus::server::Service;
use tracing::{info, warn};

use crate::config::Config;
use crate::models::power::{ModbusInfo, PowerResult, TOTAL_KEY};
use crate::shared_state::AppState;

const FLOAT_TYPE: &str = "float32 IEEE 754 (2 regs)";

/// What a single register exposes.
#[derive(Clone, Debug, PartialEq)]
pub enum RegisterSlot {
    /// One 16-bit half of a power value in W. word 0 = bits 31..16, word 1 = bits 15..0
    Power { key: String, word: u8 },
    /// 1 if the latest refresh succeeded, else 0
    Status,
}

pub type RegisterMap = BTreeMap<u16, RegisterSlot>;

/// Total at `base_address`, then each array in config order (2 registers
/// each), then the status register.
pub fn build_register_map(config: &Config) -> RegisterMap {
    let mut map = RegisterMap::new();
    let mut addr = config.modbus.base_address;

    let keys = std::iter::once(TOTAL_KEY.to_string()).chain(config.arrays.iter().map(|a| a.name.clone()));
    for key in keys {
        map.insert(addr, RegisterSlot::Power { key: key.clone(), word: 0 });
        map.insert(addr.wrapping_add(1), RegisterSlot::Power { key, word: 1 });
        addr = addr.wrapping_add(2);
    }
    map.insert(addr, RegisterSlot::Status);
    map
}

/// Human-readable layout, one entry per value.
pub fn describe_registers(config: &Config) -> Vec<ModbusInfo> {
    let mut info = Vec::new();
    let mut addr = config.modbus.base_address;

    info.push(ModbusInfo {
        name: TOTAL_KEY.to_string(),
        register_address: addr,
        length: 2,
        data_type: FLOAT_TYPE.to_string(),
        description: "Total estimated AC power in W after inverter efficiency and clipping".to_string(),
    });
    addr = addr.wrapping_add(2);

    for array in &config.arrays {
        info.push(ModbusInfo {
            name: array.name.clone(),
            register_address: addr,
            length: 2,
            data_type: FLOAT_TYPE.to_string(),
            description: format!("Estimated AC power for {} in W", array.name),
        });
        addr = addr.wrapping_add(2);
    }

    info.push(ModbusInfo {
        name: "status".to_string(),
        register_address: addr,
        length: 1,
        data_type: "u16 (raw)".to_string(),
        description: "Last refresh status (1=OK, 0=failed or not yet run)".to_string(),
    });
    info
}

/// Encode a raw f32 value into two u16 big-endian words (IEEE 754).
fn float_to_words(v: f32) -> (u16, u16) {
    let bits = v.to_bits();
    ((bits >> 16) as u16, (bits & 0xFFFF) as u16)
}

/// Resolve `cnt` registers from `addr`. Unmapped addresses and missing
/// values read as 0.
pub fn read_registers(map: &RegisterMap, power: Option<&PowerResult>, status_ok: bool, addr: u16, cnt: u16) -> Vec<u16> {
    (0..cnt)
        .map(|i| {
            let reg_addr = addr.wrapping_add(i);
            match map.get(&reg_addr) {
                Some(RegisterSlot::Status) => status_ok as u16,
                Some(RegisterSlot::Power { key, word }) => {
                    let w = power.and_then(|p| p.get(key)).unwrap_or(0.0) as f32;
                    let (high, low) = float_to_words(w);
                    #[cfg(feature = "verbose_log")]
                    tracing::trace!(
                        "[MODBUS] {} = {:.1} W → hi=0x{:04X} lo=0x{:04X} (addr {})",
                        key, w, high, low, reg_addr
                    );
                    if *word == 0 { high } else { low }
                }
                None => 0,
            }
        })
        .collect()
}

struct MbService {
    state: AppState,
    register_map: Arc<RegisterMap>,
}

impl Service for MbService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Exception>> + Send + Sync>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        let snapshot = self.state.snapshot();
        let status_ok = self.state.status().last_update_success;
        let register_map = self.register_map.clone();

        Box::pin(async move {
            let power = snapshot.as_ref().map(|s| &s.power);
            match req {
                Request::ReadInputRegisters(addr, cnt) => {
                    Ok(Response::ReadInputRegisters(read_registers(&register_map, power, status_ok, addr, cnt)))
                }
                Request::ReadHoldingRegisters(addr, cnt) => {
                    Ok(Response::ReadHoldingRegisters(read_registers(&register_map, power, status_ok, addr, cnt)))
                }
                _ => Err(ExceptionCode::IllegalFunction),
            }
        })
    }
}

pub async fn run_server(addr: SocketAddr, state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let register_map = Arc::new(build_register_map(&state.config));
    for (reg, slot) in register_map.iter() {
        tracing::debug!("[MODBUS MAP] {} → {:?}", reg, slot);
    }

    info!("Modbus TCP server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = tokio_modbus::server::tcp::Server::new(listener);

    let on_connected = move |socket, _addr| {
        let state = state.clone();
        let register_map = register_map.clone();
        async move { Ok::<_, std::io::Error>(Some((MbService { state, register_map }, socket))) }
    };

    server
        .serve(&on_connected, |err| {
            warn!("Modbus server error: {:?}", err);
        })
        .await?;

    Ok(())
}
