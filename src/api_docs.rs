use utoipa::OpenApi;
use crate::controllers::power_controller;
use crate::models::power;
use crate::services::decomposition::DecompositionModel;
use crate::services::estimator::ClippingPolicy;

#[derive(OpenApi)]
#[openapi(
    paths(
        power_controller::list_arrays,
        power_controller::get_power,
        power_controller::get_array_power,
        power_controller::list_sensors,
        power_controller::set_sensor,
        power_controller::set_manual_irradiance,
        power_controller::request_refresh,
        power_controller::get_modbus_info
    ),
    components(
        schemas(
            power::ArrayInfo,
            power::ArrayPowerResponse,
            power::PowerStatusResponse,
            power::PowerSnapshot,
            power::RefreshStatus,
            power::SolarPosition,
            power::SensorStateBody,
            power::ManualIrradianceBody,
            power::ModbusInfo,
            DecompositionModel,
            ClippingPolicy
        )
    ),
    tags(
        (name = "pv-estimator", description = "PV Power Estimation API")
    )
)]
pub struct ApiDoc;
