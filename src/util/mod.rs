pub mod env;
pub mod secrets;
pub mod telemetry;
