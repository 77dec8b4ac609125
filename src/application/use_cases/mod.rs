pub mod diagnostic_session;
pub mod fault_catalog;
pub mod hybrid_resolver;
pub mod input_normalizer;
pub mod narrative_extractor;
pub mod telemetry_feed;
