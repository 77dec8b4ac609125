use crate::application::use_cases::input_normalizer::{
    await_capture, normalize, CaptureRelay, CapturedInput, ImageInput, RawInput,
};
use crate::application::{DiagnosticSession, TelemetryFeed};
use crate::domain::error::AppError;
use crate::domain::narrative::HybridReport;
use crate::infrastructure::config::AppConfig;
use actix_cors::Cors;
use actix_web::{dev::Server, get, post, web, App, HttpResponse, HttpServer, Responder, Scope};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use validator::Validate;

const MAX_LOG_ENTRIES: usize = 100;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogEntry {
    pub time: String,
    pub level: String,
    pub source: String,
    pub message: String,
}

pub struct HttpState {
    pub session: Arc<DiagnosticSession>,
    pub telemetry: TelemetryFeed,
    pub capture: CaptureRelay,
    /// Flips to true when the session ends; cancels waiting captures.
    pub session_end: watch::Receiver<bool>,
    pub logs: Arc<Mutex<Vec<LogEntry>>>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DiagnoseRequest {
    #[validate(length(max = 4000))]
    #[serde(default)]
    pub text: Option<String>,
    #[validate(length(max = 4000))]
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub image: Option<ImageInput>,
}

impl From<DiagnoseRequest> for RawInput {
    fn from(req: DiagnoseRequest) -> Self {
        RawInput {
            text: req.text,
            transcript: req.transcript,
            image: req.image,
        }
    }
}

/// The single value a speech or image capture widget produced.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    #[validate(length(min = 1, max = 4000))]
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub image: Option<ImageInput>,
}

impl CaptureRequest {
    fn into_captured(self) -> Result<CapturedInput, AppError> {
        match (self.transcript, self.image) {
            (Some(transcript), None) => Ok(CapturedInput::Transcript(transcript)),
            (None, Some(image)) => Ok(CapturedInput::Image(image)),
            _ => Err(AppError::ValidationError(
                "a capture carries exactly one transcript or image".to_string(),
            )),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportResponse<'a> {
    #[serde(flatten)]
    report: &'a HybridReport,
    /// False is rendered as "no price-data match".
    price_match: bool,
}

impl<'a> From<&'a HybridReport> for ReportResponse<'a> {
    fn from(report: &'a HybridReport) -> Self {
        Self {
            report,
            price_match: report.has_price_match(),
        }
    }
}

fn error_response(err: &AppError) -> HttpResponse {
    match err {
        AppError::ValidationError(_) => HttpResponse::BadRequest().body(err.to_string()),
        AppError::InvalidState(_) => HttpResponse::Conflict().body(err.to_string()),
        AppError::RemoteServiceFailure(_) => HttpResponse::BadGateway().body(err.to_string()),
        _ => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[post("/diagnose")]
async fn diagnose(data: web::Data<HttpState>, req: web::Json<DiagnoseRequest>) -> impl Responder {
    let req = req.into_inner();
    if let Err(e) = req.validate() {
        add_log(&data.logs, "WARN", "HttpApi", &format!("Rejected input: {}", e));
        return HttpResponse::BadRequest().body(e.to_string());
    }

    run_diagnosis(&data, req.into()).await
}

/// Waits for the next capture widget value, then diagnoses it. Cancelled
/// with 409 when the session ends first.
#[post("/capture/await")]
async fn await_captured(data: web::Data<HttpState>) -> impl Responder {
    let capture = data.capture.open();
    let mut session_end = data.session_end.clone();

    match await_capture(capture, &mut session_end).await {
        Ok(captured) => run_diagnosis(&data, captured.into()).await,
        Err(e) => {
            add_log(&data.logs, "WARN", "HttpApi", &format!("Capture ended: {}", e));
            error_response(&e)
        }
    }
}

/// Entry point for the capture widget. Accepts one value per open capture.
#[post("/capture")]
async fn deliver_capture(data: web::Data<HttpState>, req: web::Json<CaptureRequest>) -> impl Responder {
    let req = req.into_inner();
    if let Err(e) = req.validate() {
        return HttpResponse::BadRequest().body(e.to_string());
    }

    match req
        .into_captured()
        .and_then(|captured| data.capture.deliver(captured))
    {
        Ok(()) => HttpResponse::Accepted().finish(),
        Err(e) => error_response(&e),
    }
}

async fn run_diagnosis(data: &HttpState, input: RawInput) -> HttpResponse {
    let query = match normalize(input) {
        Ok(query) => query,
        Err(e) => {
            add_log(&data.logs, "WARN", "HttpApi", &format!("Rejected input: {}", e));
            return error_response(&e);
        }
    };

    if let Some(query) = &query {
        add_log(
            &data.logs,
            "INFO",
            "HttpApi",
            &format!("Diagnosing ({} query)", query.kind()),
        );
    }

    match data.session.analyze(query).await {
        Ok(Some(report)) => HttpResponse::Ok().json(ReportResponse::from(&report)),
        Ok(None) => HttpResponse::NoContent().finish(),
        Err(e) => {
            add_log(
                &data.logs,
                "ERROR",
                "HttpApi",
                &format!("Diagnosis failed: {}", e),
            );
            error_response(&e)
        }
    }
}

#[get("/session")]
async fn get_session(data: web::Data<HttpState>) -> impl Responder {
    HttpResponse::Ok().json(data.session.snapshot())
}

#[post("/session/reset")]
async fn reset_session(data: web::Data<HttpState>) -> impl Responder {
    match data.session.reset() {
        Ok(()) => HttpResponse::Ok().json(data.session.snapshot()),
        Err(e) => error_response(&e),
    }
}

#[get("/faults/{code}")]
async fn get_fault(data: web::Data<HttpState>, code: web::Path<String>) -> impl Responder {
    match data.session.store().find_by_code(&code) {
        Some(record) => HttpResponse::Ok().json(record),
        None => HttpResponse::NotFound().body(format!("No fault record for code {}", code)),
    }
}

#[get("/telemetry")]
async fn get_telemetry(data: web::Data<HttpState>) -> impl Responder {
    HttpResponse::Ok().json(data.telemetry.current())
}

#[get("/logs")]
async fn get_logs(data: web::Data<HttpState>) -> impl Responder {
    let logs = data
        .logs
        .lock()
        .map(|logs| logs.clone())
        .unwrap_or_default();
    HttpResponse::Ok().json(logs)
}

pub fn add_log_entry(
    logs: &Mutex<Vec<LogEntry>>,
    level: &str,
    source: &str,
    message: &str,
) -> LogEntry {
    let entry = LogEntry {
        time: Local::now().format("%H:%M:%S").to_string(),
        level: level.to_string(),
        source: source.to_string(),
        message: message.to_string(),
    };
    let mut logs = logs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    logs.push(entry.clone());
    if logs.len() > MAX_LOG_ENTRIES {
        logs.remove(0);
    }
    entry
}

pub fn add_log(logs: &Mutex<Vec<LogEntry>>, level: &str, source: &str, message: &str) {
    add_log_entry(logs, level, source, message);
}

pub fn api_scope() -> Scope {
    web::scope("/api")
        .service(diagnose)
        .service(await_captured)
        .service(deliver_capture)
        .service(get_session)
        .service(reset_session)
        .service(get_fault)
        .service(get_telemetry)
        .service(get_logs)
}

pub fn start_server(state: HttpState, config: &AppConfig) -> std::io::Result<Server> {
    let state = web::Data::new(state);

    let server = HttpServer::new(move || {
        let cors = Cors::permissive(); // single local frontend

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(10 * 1024 * 1024))
            .service(api_scope())
    })
    .bind(config.bind_address())?
    .run();

    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::hybrid_resolver::tests::{sample_store, FakeLLMClient};
    use crate::application::HybridResolver;
    use crate::domain::llm_config::LLMConfig;
    use actix_web::http::StatusCode;
    use actix_web::test as atest;
    use serde_json::{json, Value};

    /// The returned sender keeps the session open; send `true` to end it.
    fn state_with(client: FakeLLMClient) -> (web::Data<HttpState>, watch::Sender<bool>) {
        let resolver = HybridResolver::new(Arc::new(client), LLMConfig::default());
        let (end_tx, end_rx) = watch::channel(false);
        let state = web::Data::new(HttpState {
            session: Arc::new(DiagnosticSession::new(Arc::new(sample_store()), resolver)),
            telemetry: TelemetryFeed::default(),
            capture: CaptureRelay::new(),
            session_end: end_rx,
            logs: Arc::new(Mutex::new(Vec::new())),
        });
        (state, end_tx)
    }

    #[actix_web::test]
    async fn test_diagnose_returns_hybrid_report() {
        let (state, _end) = state_with(FakeLLMClient::replying("[CODE: P0171]\n[التشخيص]: تسريب هواء"));
        let app = atest::init_service(App::new().app_data(state.clone()).service(api_scope())).await;

        let req = atest::TestRequest::post()
            .uri("/api/diagnose")
            .set_json(json!({ "text": "العربية بتقطع" }))
            .to_request();
        let body: Value = atest::call_and_read_body_json(&app, req).await;

        assert_eq!(body["narrative"]["diagnosis"], "تسريب هواء");
        assert_eq!(body["narrative"]["extractedCode"], "P0171");
        assert_eq!(body["matchedRecord"]["code"], "P0171");
        assert_eq!(body["matchedRecord"]["laborCost"], "150");
        assert_eq!(body["priceMatch"], true);

        let req = atest::TestRequest::get().uri("/api/session").to_request();
        let session: Value = atest::call_and_read_body_json(&app, req).await;
        assert_eq!(session["state"], "result");
    }

    #[actix_web::test]
    async fn test_lookup_miss_is_flagged() {
        let (state, _end) = state_with(FakeLLMClient::replying("[CODE: P0420]"));
        let app = atest::init_service(App::new().app_data(state).service(api_scope())).await;

        let req = atest::TestRequest::post()
            .uri("/api/diagnose")
            .set_json(json!({ "transcript": "لمبة المحرك منورة" }))
            .to_request();
        let body: Value = atest::call_and_read_body_json(&app, req).await;

        assert!(body["matchedRecord"].is_null());
        assert_eq!(body["priceMatch"], false);
    }

    #[actix_web::test]
    async fn test_remote_failure_is_bad_gateway_and_idle() {
        let (state, _end) = state_with(FakeLLMClient::failing());
        let app = atest::init_service(App::new().app_data(state.clone()).service(api_scope())).await;

        let req = atest::TestRequest::post()
            .uri("/api/diagnose")
            .set_json(json!({ "text": "x" }))
            .to_request();
        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let req = atest::TestRequest::get().uri("/api/session").to_request();
        let session: Value = atest::call_and_read_body_json(&app, req).await;
        assert_eq!(session["state"], "idle");

        let logs = state.logs.lock().unwrap();
        assert!(logs.iter().any(|entry| entry.level == "ERROR"));
    }

    #[actix_web::test]
    async fn test_empty_input_is_no_content() {
        let (state, _end) = state_with(FakeLLMClient::replying(""));
        let app = atest::init_service(App::new().app_data(state).service(api_scope())).await;

        let req = atest::TestRequest::post()
            .uri("/api/diagnose")
            .set_json(json!({ "text": "   " }))
            .to_request();
        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[actix_web::test]
    async fn test_oversized_text_is_rejected() {
        let (state, _end) = state_with(FakeLLMClient::replying(""));
        let app = atest::init_service(App::new().app_data(state).service(api_scope())).await;

        let req = atest::TestRequest::post()
            .uri("/api/diagnose")
            .set_json(json!({ "text": "a".repeat(4001) }))
            .to_request();
        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_reset_flow() {
        let (state, _end) = state_with(FakeLLMClient::replying(""));
        let app = atest::init_service(App::new().app_data(state).service(api_scope())).await;

        let req = atest::TestRequest::post().uri("/api/session/reset").to_request();
        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let req = atest::TestRequest::post()
            .uri("/api/diagnose")
            .set_json(json!({ "text": "x" }))
            .to_request();
        assert_eq!(atest::call_service(&app, req).await.status(), StatusCode::OK);

        let req = atest::TestRequest::post().uri("/api/session/reset").to_request();
        let session: Value = atest::call_and_read_body_json(&app, req).await;
        assert_eq!(session["state"], "idle");
    }

    #[actix_web::test]
    async fn test_fault_lookup() {
        let (state, _end) = state_with(FakeLLMClient::replying(""));
        let app = atest::init_service(App::new().app_data(state).service(api_scope())).await;

        let req = atest::TestRequest::get().uri("/api/faults/p0300").to_request();
        let record: Value = atest::call_and_read_body_json(&app, req).await;
        assert_eq!(record["part"], "بوجيهات");

        let req = atest::TestRequest::get().uri("/api/faults/P9999").to_request();
        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_telemetry_readout() {
        let (state, _end) = state_with(FakeLLMClient::replying(""));
        let app = atest::init_service(App::new().app_data(state).service(api_scope())).await;

        let req = atest::TestRequest::get().uri("/api/telemetry").to_request();
        let telemetry: Value = atest::call_and_read_body_json(&app, req).await;
        assert_eq!(telemetry["temperature"], 91);
        assert_eq!(telemetry["health"], 96);
    }

    #[test]
    fn test_log_buffer_is_bounded() {
        let logs = Mutex::new(Vec::new());
        for i in 0..(MAX_LOG_ENTRIES + 5) {
            add_log(&logs, "INFO", "Test", &format!("entry {}", i));
        }
        let logs = logs.lock().unwrap();
        assert_eq!(logs.len(), MAX_LOG_ENTRIES);
        assert_eq!(logs[0].message, "entry 5");
    }

    #[actix_web::test]
    async fn test_captured_transcript_is_diagnosed() {
        let (state, _end) = state_with(FakeLLMClient::replying("[CODE: P0300]\n[التشخيص]: تقطيع"));
        let app = atest::init_service(App::new().app_data(state).service(api_scope())).await;

        let waiting = atest::TestRequest::post().uri("/api/capture/await").to_request();
        let deliver = async {
            for _ in 0..100 {
                let req = atest::TestRequest::post()
                    .uri("/api/capture")
                    .set_json(json!({ "transcript": "الموتور بيرعش" }))
                    .to_request();
                let status = atest::call_service(&app, req).await.status();
                if status == StatusCode::ACCEPTED {
                    return status;
                }
                tokio::task::yield_now().await;
            }
            StatusCode::CONFLICT
        };

        let (report, delivered) = tokio::join!(atest::call_service(&app, waiting), deliver);
        assert_eq!(delivered, StatusCode::ACCEPTED);
        assert_eq!(report.status(), StatusCode::OK);

        let body: Value = atest::read_body_json(report).await;
        assert_eq!(body["matchedRecord"]["code"], "P0300");
    }

    #[actix_web::test]
    async fn test_capture_without_waiter_is_conflict() {
        let (state, _end) = state_with(FakeLLMClient::replying(""));
        let app = atest::init_service(App::new().app_data(state).service(api_scope())).await;

        let req = atest::TestRequest::post()
            .uri("/api/capture")
            .set_json(json!({ "transcript": "x" }))
            .to_request();
        assert_eq!(atest::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = atest::TestRequest::post()
            .uri("/api/capture")
            .set_json(json!({}))
            .to_request();
        assert_eq!(atest::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_session_end_cancels_waiting_capture() {
        let (state, end_tx) = state_with(FakeLLMClient::replying(""));
        let app = atest::init_service(App::new().app_data(state).service(api_scope())).await;

        end_tx.send(true).unwrap();
        let req = atest::TestRequest::post().uri("/api/capture/await").to_request();
        assert_eq!(atest::call_service(&app, req).await.status(), StatusCode::CONFLICT);
    }
}
