use serde::Serialize;
use uuid::Uuid;

use super::diagnostic_query::DiagnosticQuery;
use super::error::{AppError, Result};
use super::narrative::HybridReport;

/// Shown in order while a run is in flight. Display only; they do not track
/// real sub-task completion.
pub const PROGRESS_MESSAGES: [&str; 4] = [
    "جاري استدعاء المعالج العصبي CAR_DOC...",
    "تحليل المدخلات الميكانيكية والفيزيائية...",
    "مطابقة الأنماط مع قاعدة بيانات المهندس أحمد شاذلي...",
    "جاري استخراج بيانات الأسعار والمناطق من 'الاستبن' الرقمي...",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    #[serde(rename_all = "camelCase")]
    Analyzing {
        run_id: Uuid,
        progress: Vec<String>,
    },
    Result {
        report: HybridReport,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Analyzing { .. } => "analyzing",
            SessionState::Result { .. } => "result",
        }
    }
}

/// Ticket for one in-flight run.
///
/// Only [`SessionMachine::begin`] creates one and finishing a run consumes
/// it, so a run can be completed or failed at most once.
#[derive(Debug)]
pub struct AnalysisRun {
    run_id: Uuid,
    query: DiagnosticQuery,
}

impl AnalysisRun {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn query(&self) -> &DiagnosticQuery {
        &self.query
    }
}

/// Idle -> Analyzing -> Result -> Idle, with Analyzing -> Idle on failure.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    state: SessionState,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
        }
    }
}

impl SessionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Starts a run. A no-op returning `None` unless the machine is idle and
    /// a query is present.
    pub fn begin(&mut self, query: Option<DiagnosticQuery>) -> Option<AnalysisRun> {
        if !matches!(self.state, SessionState::Idle) {
            return None;
        }
        let query = query?;

        let run_id = Uuid::new_v4();
        self.state = SessionState::Analyzing {
            run_id,
            progress: PROGRESS_MESSAGES.iter().map(|m| m.to_string()).collect(),
        };
        Some(AnalysisRun { run_id, query })
    }

    pub fn complete(&mut self, run: AnalysisRun, report: HybridReport) -> Result<()> {
        self.ensure_analyzing(&run)?;
        self.state = SessionState::Result { report };
        Ok(())
    }

    pub fn fail(&mut self, run: AnalysisRun) -> Result<()> {
        self.ensure_analyzing(&run)?;
        self.state = SessionState::Idle;
        Ok(())
    }

    /// Drops a run whose ticket was lost without finishing. Returns whether
    /// the machine went back to idle.
    pub fn abandon(&mut self, run_id: Uuid) -> bool {
        match &self.state {
            SessionState::Analyzing { run_id: current, .. } if *current == run_id => {
                self.state = SessionState::Idle;
                true
            }
            _ => false,
        }
    }

    /// "Start new scan": the only way out of `Result`.
    pub fn reset(&mut self) -> Result<()> {
        match self.state {
            SessionState::Result { .. } => {
                self.state = SessionState::Idle;
                Ok(())
            }
            _ => Err(AppError::InvalidState(format!(
                "cannot start a new scan while {}",
                self.state.name()
            ))),
        }
    }

    fn ensure_analyzing(&self, run: &AnalysisRun) -> Result<()> {
        match &self.state {
            SessionState::Analyzing { run_id, .. } if *run_id == run.run_id => Ok(()),
            other => Err(AppError::InvalidState(format!(
                "run {} is not in flight (state: {})",
                run.run_id,
                other.name()
            ))),
        }
    }
}
