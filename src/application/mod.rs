pub mod use_cases;

pub use use_cases::diagnostic_session::{DiagnosticSession, SessionEvent};
pub use use_cases::fault_catalog::FaultRecordStore;
pub use use_cases::hybrid_resolver::HybridResolver;
pub use use_cases::input_normalizer::{await_capture, normalize, CaptureRelay, CapturedInput, RawInput};
pub use use_cases::telemetry_feed::{spawn_telemetry, TelemetryFeed};
