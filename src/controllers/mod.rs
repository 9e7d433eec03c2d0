pub mod power_controller;
