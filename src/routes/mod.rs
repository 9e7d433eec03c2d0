pub mod power_routes;
