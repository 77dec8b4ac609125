pub mod diagnostic_query;
pub mod error;
pub mod fault_record;
pub mod llm_config;
pub mod narrative;
pub mod session;
pub mod telemetry;
