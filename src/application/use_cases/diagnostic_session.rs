use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::application::use_cases::fault_catalog::FaultRecordStore;
use crate::application::use_cases::hybrid_resolver::HybridResolver;
use crate::domain::diagnostic_query::DiagnosticQuery;
use crate::domain::error::{AppError, Result};
use crate::domain::narrative::HybridReport;
use crate::domain::session::{AnalysisRun, SessionMachine, SessionState, PROGRESS_MESSAGES};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    #[serde(rename_all = "camelCase")]
    Progress {
        run_id: Uuid,
        step: usize,
        message: String,
    },
    StateChanged {
        state: &'static str,
    },
}

/// The single user session: fault table, resolver and view state.
///
/// Each run is driven on its own task, so a caller that stops waiting
/// (a dropped HTTP request) never leaves the machine stuck in `Analyzing`.
pub struct DiagnosticSession {
    core: Arc<SessionCore>,
}

struct SessionCore {
    machine: Mutex<SessionMachine>,
    events: broadcast::Sender<SessionEvent>,
    store: Arc<FaultRecordStore>,
    resolver: HybridResolver,
}

impl DiagnosticSession {
    pub fn new(store: Arc<FaultRecordStore>, resolver: HybridResolver) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            core: Arc::new(SessionCore {
                machine: Mutex::new(SessionMachine::new()),
                events,
                store,
                resolver,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.core.events.subscribe()
    }

    pub fn store(&self) -> &FaultRecordStore {
        &self.core.store
    }

    pub fn snapshot(&self) -> SessionState {
        self.core.machine().state().clone()
    }

    /// Runs one analysis. `Ok(None)` when there is no query or a run is
    /// already in flight. A remote failure returns the session to idle and
    /// is passed back without any report.
    pub async fn analyze(&self, query: Option<DiagnosticQuery>) -> Result<Option<HybridReport>> {
        let Some(run) = self.core.begin(query) else {
            debug!("Analysis request ignored, session busy or no input");
            return Ok(None);
        };
        let run_id = run.run_id();
        info!(run_id = %run_id, kind = run.query().kind(), "Analysis started");

        let core = Arc::clone(&self.core);
        let task = tokio::spawn(async move { core.finish(run).await });

        match task.await {
            Ok(outcome) => outcome.map(Some),
            Err(err) => {
                error!(run_id = %run_id, error = %err, "Analysis task aborted");
                if self.core.machine().abandon(run_id) {
                    self.core.emit_state("idle");
                }
                Err(AppError::Internal(format!("analysis task aborted: {}", err)))
            }
        }
    }

    /// "Start new scan".
    pub fn reset(&self) -> Result<()> {
        self.core.machine().reset()?;
        self.core.emit_state("idle");
        Ok(())
    }
}

impl SessionCore {
    fn machine(&self) -> MutexGuard<'_, SessionMachine> {
        self.machine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn emit_state(&self, state: &'static str) {
        self.emit(SessionEvent::StateChanged { state });
    }

    fn begin(&self, query: Option<DiagnosticQuery>) -> Option<AnalysisRun> {
        let run = self.machine().begin(query)?;

        self.emit_state("analyzing");
        for (step, message) in PROGRESS_MESSAGES.iter().enumerate() {
            self.emit(SessionEvent::Progress {
                run_id: run.run_id(),
                step,
                message: message.to_string(),
            });
        }
        Some(run)
    }

    /// Resolves the run and moves the machine to `Result` or back to `Idle`.
    async fn finish(&self, run: AnalysisRun) -> Result<HybridReport> {
        let outcome = self
            .resolver
            .resolve(run.run_id(), run.query(), &self.store)
            .await;

        match outcome {
            Ok(report) => {
                self.machine().complete(run, report.clone())?;
                self.emit_state("result");
                Ok(report)
            }
            Err(err) => {
                self.machine().fail(run)?;
                self.emit_state("idle");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::hybrid_resolver::tests::{sample_store, FakeLLMClient};
    use crate::domain::llm_config::LLMConfig;
    use crate::infrastructure::llm_clients::{CompletionRequest, LLMClient};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn session_with(client: impl LLMClient + Send + Sync + 'static) -> DiagnosticSession {
        DiagnosticSession::new(
            Arc::new(sample_store()),
            HybridResolver::new(Arc::new(client), LLMConfig::default()),
        )
    }

    fn text(content: &str) -> Option<DiagnosticQuery> {
        Some(DiagnosticQuery::Text {
            content: content.to_string(),
        })
    }

    /// Holds every request until released.
    struct GatedClient {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl LLMClient for GatedClient {
        async fn generate(&self, _config: &LLMConfig, _request: &CompletionRequest) -> Result<String> {
            self.gate.notified().await;
            Ok("[CODE: P0171]\n[التشخيص]: تسريب هواء".to_string())
        }
    }

    struct PanickingClient;

    #[async_trait]
    impl LLMClient for PanickingClient {
        async fn generate(&self, _config: &LLMConfig, _request: &CompletionRequest) -> Result<String> {
            panic!("client bug")
        }
    }

    #[tokio::test]
    async fn test_analyze_reaches_result() {
        let session = session_with(FakeLLMClient::replying("[CODE: P0171]\n[التشخيص]: تسريب هواء"));
        let report = session.analyze(text("P0171")).await.unwrap().unwrap();

        assert_eq!(report.matched_record.as_ref().unwrap().code, "P0171");
        match session.snapshot() {
            SessionState::Result { report: held } => assert_eq!(held, report),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_query_is_noop() {
        let session = session_with(FakeLLMClient::replying(""));
        assert!(session.analyze(None).await.unwrap().is_none());
        assert_eq!(session.snapshot(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_remote_failure_returns_to_idle() {
        let session = session_with(FakeLLMClient::failing());
        let mut events = session.subscribe();

        let err = session.analyze(text("x")).await.unwrap_err();
        assert!(matches!(err, AppError::RemoteServiceFailure(_)));
        assert_eq!(session.snapshot(), SessionState::Idle);

        let mut last = None;
        while let Ok(event) = events.try_recv() {
            last = Some(event);
        }
        assert_eq!(last, Some(SessionEvent::StateChanged { state: "idle" }));
    }

    #[tokio::test]
    async fn test_result_blocks_new_run_until_reset() {
        let session = session_with(FakeLLMClient::replying(""));
        session.analyze(text("first")).await.unwrap().unwrap();

        assert!(session.analyze(text("second")).await.unwrap().is_none());

        session.reset().unwrap();
        assert!(session.analyze(text("third")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reset_while_idle_is_rejected() {
        let session = session_with(FakeLLMClient::replying(""));
        assert!(matches!(session.reset(), Err(AppError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_start_while_analyzing_is_noop() {
        let gate = Arc::new(Notify::new());
        let session = Arc::new(session_with(GatedClient { gate: gate.clone() }));
        let mut events = session.subscribe();

        let running = {
            let session = session.clone();
            tokio::spawn(async move { session.analyze(text("P0171")).await })
        };
        while session.snapshot().name() != "analyzing" {
            tokio::task::yield_now().await;
        }

        assert!(session.analyze(text("again")).await.unwrap().is_none());

        gate.notify_one();
        let report = running.await.unwrap().unwrap().unwrap();
        assert_eq!(report.narrative.diagnosis, "تسريب هواء");

        let mut progress = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::Progress { run_id, message, .. } = event {
                assert_eq!(run_id, report.run_id);
                progress.push(message);
            }
        }
        assert_eq!(progress, PROGRESS_MESSAGES.to_vec());
    }

    #[tokio::test]
    async fn test_dropped_caller_still_finishes_run() {
        let gate = Arc::new(Notify::new());
        let session = session_with(GatedClient { gate: gate.clone() });

        let waited =
            tokio::time::timeout(Duration::from_millis(20), session.analyze(text("P0171"))).await;
        assert!(waited.is_err());
        assert_eq!(session.snapshot().name(), "analyzing");

        gate.notify_one();
        while session.snapshot().name() != "result" {
            tokio::task::yield_now().await;
        }

        session.reset().unwrap();
        gate.notify_one();
        assert!(session.analyze(text("again")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_aborted_run_returns_to_idle() {
        let session = session_with(PanickingClient);

        let err = session.analyze(text("x")).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(session.snapshot(), SessionState::Idle);
    }
}
