pub mod clock;
pub mod coordinator;
pub mod decomposition;
pub mod estimator;
pub mod mqtt_service;
pub mod sensor_service;
pub mod solar_geometry;
pub mod thermal;
pub mod transposition;
