//! HTTP routes and handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use stepward_core::error::StepwardError;
use stepward_core::models::audit::{AuditAction, AuditEvent};
use stepward_core::models::certificate::{Certificate, CertificateStatus, KeyStrategy};
use stepward_core::repository::{
    AuditEventRepository, CertificateQuery, CertificateRepository, DEFAULT_LIST_LIMIT,
};
use stepward_pki::service::{Download, IssueInput, SignCsrInput};
use stepward_pki::{
    BundleFormat, CaConfig, CertificateAuthority, LifecycleService, Pkcs12Packager,
};
use tower_http::cors::CorsLayer;
use tracing::error;
use uuid::Uuid;

/// The concrete collaborators a deployment wires into the service.
pub trait Backend: Send + Sync + 'static {
    type Authority: CertificateAuthority + Pkcs12Packager + 'static;
    type Certificates: CertificateRepository + 'static;
    type Audit: AuditEventRepository + 'static;
}

type Service<B> = LifecycleService<
    <B as Backend>::Authority,
    <B as Backend>::Certificates,
    <B as Backend>::Audit,
>;

/// Public CA settings advertised to clients.
#[derive(Debug, Clone, Serialize)]
pub struct CaSettings {
    pub ca_url: String,
    pub acme_directories: Vec<String>,
}

impl CaSettings {
    pub fn from_config(config: &CaConfig) -> Self {
        Self {
            ca_url: config.ca_url.clone(),
            acme_directories: vec![config.acme_directory()],
        }
    }
}

pub struct AppState<B: Backend> {
    service: Arc<Service<B>>,
    settings: Arc<CaSettings>,
}

impl<B: Backend> AppState<B> {
    pub fn new(service: Service<B>, settings: CaSettings) -> Self {
        Self {
            service: Arc::new(service),
            settings: Arc::new(settings),
        }
    }
}

impl<B: Backend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            settings: Arc::clone(&self.settings),
        }
    }
}

pub fn router<B: Backend>(state: AppState<B>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/certs", get(list_certificates::<B>))
        .route("/api/certs/issue", post(issue::<B>))
        .route("/api/certs/sign-csr", post(sign_csr::<B>))
        .route(
            "/api/certs/{id}",
            get(get_certificate::<B>).delete(delete_certificate::<B>),
        )
        .route("/api/certs/{id}/renew", post(renew::<B>))
        .route("/api/certs/{id}/revoke", post(revoke::<B>))
        .route("/api/certs/{id}/audit", get(audit_trail::<B>))
        .route("/api/settings/ca", get(ca_settings::<B>))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A [`StepwardError`] rendered as `{"error": "..."}` with its status.
#[derive(Debug)]
pub struct ApiError(StepwardError);

impl From<StepwardError> for ApiError {
    fn from(err: StepwardError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(StepwardError::validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Unknown and malformed ids alike are reported as not found.
fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| {
        ApiError(StepwardError::NotFound {
            entity: "certificate".into(),
            id: raw.to_string(),
        })
    })
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct IssueBody {
    pub cn: String,
    #[serde(default)]
    pub sans: Vec<String>,
    pub not_after_days: u32,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub pfx_password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignCsrBody {
    pub csr_pem: String,
    pub not_after_days: u32,
}

#[derive(Debug, Serialize)]
pub struct CertificateView {
    pub id: Uuid,
    pub cn: String,
    pub sans: Vec<String>,
    pub serial: Option<String>,
    pub not_after: DateTime<Utc>,
    /// Effective status at response time.
    pub status: CertificateStatus,
    pub key_strategy: KeyStrategy,
    pub storage_ref: String,
    pub owner_user: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Certificate> for CertificateView {
    fn from(cert: Certificate) -> Self {
        Self {
            status: cert.effective_status(Utc::now()),
            storage_ref: cert.storage_ref.as_str().to_string(),
            id: cert.id,
            cn: cert.cn,
            sans: cert.sans,
            serial: cert.serial,
            not_after: cert.not_after,
            key_strategy: cert.key_strategy,
            owner_user: cert.owner_user,
            created_at: cert.created_at,
            updated_at: cert.updated_at,
        }
    }
}

/// Archive bytes travel base64-encoded.
#[derive(Debug, Serialize)]
pub struct DownloadView {
    pub data: String,
    pub filename: String,
    pub mime_type: &'static str,
}

impl From<Download> for DownloadView {
    fn from(download: Download) -> Self {
        Self {
            data: STANDARD.encode(&download.data),
            filename: download.filename,
            mime_type: download.mime_type,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditEventView {
    pub id: Uuid,
    pub cert_id: Uuid,
    pub who: String,
    pub action: AuditAction,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl From<AuditEvent> for AuditEventView {
    fn from(event: AuditEvent) -> Self {
        Self {
            id: event.id,
            cert_id: event.cert_id,
            who: event.who,
            action: event.action,
            details: event.details,
            timestamp: event.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CertificateWithDownload {
    pub certificate: CertificateView,
    pub download: DownloadView,
}

#[derive(Debug, Serialize)]
pub struct SignedCertificate {
    pub certificate: CertificateView,
    pub cert_pem: String,
    pub chain_pem: String,
}

#[derive(Debug, Serialize)]
pub struct CertificateEnvelope {
    pub certificate: CertificateView,
}

#[derive(Debug, Serialize)]
pub struct CertificateList {
    pub certificates: Vec<CertificateView>,
}

#[derive(Debug, Serialize)]
pub struct RevokeResult {
    pub message: &'static str,
    pub certificate: CertificateView,
}

#[derive(Debug, Serialize)]
pub struct AuditTrail {
    pub events: Vec<AuditEventView>,
}

/// Listing parameters. Unparseable `limit`/`offset` fall back to the
/// defaults; an unknown `status` is rejected.
fn list_query(params: &HashMap<String, String>) -> Result<CertificateQuery, ApiError> {
    let number = |key: &str, default: u64| {
        params
            .get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(default)
    };
    let status = match params.get("status").map(|s| s.trim()) {
        None | Some("") => None,
        Some(value) => Some(value.parse::<CertificateStatus>()?),
    };
    Ok(CertificateQuery {
        limit: number("limit", DEFAULT_LIST_LIMIT),
        offset: number("offset", 0),
        status,
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn issue<B: Backend>(
    State(state): State<AppState<B>>,
    payload: Result<Json<IssueBody>, JsonRejection>,
) -> ApiResult<CertificateWithDownload> {
    let Json(body) = payload?;
    let format = body
        .format
        .parse::<BundleFormat>()
        .map_err(StepwardError::from)?;

    let output = state
        .service
        .issue(IssueInput {
            common_name: body.cn,
            sans: body.sans,
            validity_days: body.not_after_days,
            format,
            pfx_password: body.pfx_password,
        })
        .await?;

    Ok(Json(CertificateWithDownload {
        certificate: output.certificate.into(),
        download: output.download.into(),
    }))
}

async fn sign_csr<B: Backend>(
    State(state): State<AppState<B>>,
    payload: Result<Json<SignCsrBody>, JsonRejection>,
) -> ApiResult<SignedCertificate> {
    let Json(body) = payload?;
    let output = state
        .service
        .sign_csr(SignCsrInput {
            csr_pem: body.csr_pem,
            validity_days: body.not_after_days,
        })
        .await?;

    Ok(Json(SignedCertificate {
        certificate: output.certificate.into(),
        cert_pem: output.cert_pem,
        chain_pem: output.chain_pem,
    }))
}

async fn list_certificates<B: Backend>(
    State(state): State<AppState<B>>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<CertificateList> {
    let query = list_query(&params)?;
    let certificates = state.service.list(query).await?;
    Ok(Json(CertificateList {
        certificates: certificates.into_iter().map(Into::into).collect(),
    }))
}

async fn get_certificate<B: Backend>(
    State(state): State<AppState<B>>,
    Path(id): Path<String>,
) -> ApiResult<CertificateEnvelope> {
    let certificate = state.service.get(parse_id(&id)?).await?;
    Ok(Json(CertificateEnvelope {
        certificate: certificate.into(),
    }))
}

async fn renew<B: Backend>(
    State(state): State<AppState<B>>,
    Path(id): Path<String>,
) -> ApiResult<CertificateWithDownload> {
    let output = state.service.renew(parse_id(&id)?).await?;
    Ok(Json(CertificateWithDownload {
        certificate: output.certificate.into(),
        download: output.download.into(),
    }))
}

async fn revoke<B: Backend>(
    State(state): State<AppState<B>>,
    Path(id): Path<String>,
) -> ApiResult<RevokeResult> {
    let certificate = state.service.revoke(parse_id(&id)?).await?;
    Ok(Json(RevokeResult {
        message: "Certificate revoked successfully",
        certificate: certificate.into(),
    }))
}

async fn audit_trail<B: Backend>(
    State(state): State<AppState<B>>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<AuditTrail> {
    let limit = params
        .get("limit")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let events = state.service.audit_trail(parse_id(&id)?, limit).await?;
    Ok(Json(AuditTrail {
        events: events.into_iter().map(Into::into).collect(),
    }))
}

async fn delete_certificate<B: Backend>(
    State(state): State<AppState<B>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.service.delete(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn ca_settings<B: Backend>(State(state): State<AppState<B>>) -> Json<CaSettings> {
    Json(state.settings.as_ref().clone())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use axum::body::to_bytes;
    use stepward_db::repository::{SurrealAuditEventRepository, SurrealCertificateRepository};
    use stepward_pki::authority::{CertificateBundle, IssueRequest};
    use stepward_pki::inspect::{NativeInspector, parse_certificate};
    use stepward_pki::{LifecycleConfig, PkiError};
    use surrealdb::Surreal;
    use surrealdb::engine::local::{Db, Mem};

    use super::*;

    struct FakeAuthority;

    impl FakeAuthority {
        async fn bundle(&self, cn: &str, with_key: bool) -> Result<CertificateBundle, PkiError> {
            let mut params = rcgen::CertificateParams::new(vec![cn.to_string()]).unwrap();
            params.serial_number = Some(rcgen::SerialNumber::from(vec![0x42]));
            let key = rcgen::KeyPair::generate().unwrap();
            let cert_pem = params.self_signed(&key).unwrap().pem().into_bytes();
            let identity = parse_certificate(&NativeInspector, &cert_pem).await?;
            Ok(CertificateBundle {
                chain_pem: cert_pem.clone(),
                key_pem: with_key.then(|| key.serialize_pem().into_bytes()),
                cert_pem,
                serial: identity.serial,
                not_after: identity.not_after,
            })
        }
    }

    impl CertificateAuthority for FakeAuthority {
        async fn issue(&self, request: &IssueRequest) -> Result<CertificateBundle, PkiError> {
            self.bundle(&request.common_name, true).await
        }

        async fn sign_csr(&self, _csr_pem: &str, _days: u32) -> Result<CertificateBundle, PkiError> {
            self.bundle("signed.internal", false).await
        }

        async fn revoke(&self, _serial: &str) -> Result<(), PkiError> {
            Ok(())
        }

        async fn fetch_chain(&self, cert_pem: &[u8]) -> Result<Vec<u8>, PkiError> {
            Ok(cert_pem.to_vec())
        }
    }

    impl Pkcs12Packager for FakeAuthority {
        async fn package(&self, _cert: &[u8], _key: &[u8], _password: &str) -> Result<Vec<u8>, PkiError> {
            Ok(b"PKCS12".to_vec())
        }
    }

    struct TestBackend;

    impl Backend for TestBackend {
        type Authority = FakeAuthority;
        type Certificates = SurrealCertificateRepository<Db>;
        type Audit = SurrealAuditEventRepository<Db>;
    }

    async fn state() -> AppState<TestBackend> {
        let db = Surreal::new::<Mem>(()).await.unwrap();
        db.use_ns("test").use_db("test").await.unwrap();
        stepward_db::run_migrations(&db).await.unwrap();

        let service = LifecycleService::new(
            FakeAuthority,
            SurrealCertificateRepository::new(db.clone()),
            SurrealAuditEventRepository::new(db),
            LifecycleConfig::default(),
        );
        let settings = CaSettings::from_config(&CaConfig {
            ca_url: "https://ca.internal:9000".into(),
            ..Default::default()
        });
        AppState::new(service, settings)
    }

    fn issue_body(cn: &str) -> IssueBody {
        IssueBody {
            cn: cn.into(),
            sans: vec![cn.into()],
            not_after_days: 30,
            format: String::new(),
            pfx_password: None,
        }
    }

    async fn error_response(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn issue_returns_base64_zip() {
        let state = state().await;

        let Json(response) = issue(State(state), Ok(Json(issue_body("api.internal"))))
            .await
            .unwrap();

        assert_eq!(response.certificate.cn, "api.internal");
        assert_eq!(response.certificate.serial.as_deref(), Some("42"));
        assert_eq!(response.certificate.status, CertificateStatus::Active);
        assert_eq!(response.download.filename, "api.internal-cert-bundle.zip");
        assert_eq!(response.download.mime_type, "application/zip");

        let archive = STANDARD.decode(&response.download.data).unwrap();
        assert!(archive.starts_with(b"PK"));
        let names = zip_names(&archive);
        assert!(names.contains(&"privkey.pem".to_string()));
    }

    fn zip_names(archive: &[u8]) -> Vec<String> {
        let mut zip = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[tokio::test]
    async fn unknown_format_is_a_bad_request() {
        let mut body = issue_body("api.internal");
        body.format = "der".into();

        let err = issue(State(state().await), Ok(Json(body))).await.unwrap_err();
        let (status, json) = error_response(err).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("der"));
    }

    #[tokio::test]
    async fn empty_common_name_is_a_bad_request() {
        let err = issue(State(state().await), Ok(Json(issue_body(""))))
            .await
            .unwrap_err();
        let (status, _) = error_response(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_and_unknown_ids_are_not_found() {
        let state = state().await;

        let err = get_certificate(State(state.clone()), Path("not-a-uuid".into()))
            .await
            .unwrap_err();
        assert_eq!(error_response(err).await.0, StatusCode::NOT_FOUND);

        let err = revoke(State(state), Path(Uuid::new_v4().to_string()))
            .await
            .unwrap_err();
        let (status, json) = error_response(err).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn revoke_then_renew_is_rejected() {
        let state = state().await;
        let Json(issued) = issue(State(state.clone()), Ok(Json(issue_body("api.internal"))))
            .await
            .unwrap();
        let id = issued.certificate.id.to_string();

        let Json(revoked) = revoke(State(state.clone()), Path(id.clone())).await.unwrap();
        assert_eq!(revoked.message, "Certificate revoked successfully");
        assert_eq!(revoked.certificate.status, CertificateStatus::Revoked);

        let err = renew(State(state.clone()), Path(id.clone())).await.unwrap_err();
        assert_eq!(error_response(err).await.0, StatusCode::BAD_REQUEST);

        let Json(trail) = audit_trail(State(state), Path(id), Query(HashMap::new()))
            .await
            .unwrap();
        let actions: Vec<AuditAction> = trail.events.iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![AuditAction::Revoked, AuditAction::Issued]);
    }

    #[tokio::test]
    async fn list_applies_status_filter() {
        let state = state().await;
        for cn in ["a.internal", "b.internal"] {
            issue(State(state.clone()), Ok(Json(issue_body(cn))))
                .await
                .unwrap();
        }

        let Json(all) = list_certificates(State(state.clone()), Query(HashMap::new()))
            .await
            .unwrap();
        assert_eq!(all.certificates.len(), 2);

        let Json(revoked) = list_certificates(
            State(state),
            Query(params(&[("status", "revoked")])),
        )
        .await
        .unwrap();
        assert!(revoked.certificates.is_empty());
    }

    #[tokio::test]
    async fn delete_returns_no_content() {
        let state = state().await;
        let Json(issued) = issue(State(state.clone()), Ok(Json(issue_body("api.internal"))))
            .await
            .unwrap();
        let id = issued.certificate.id.to_string();

        let status = delete_certificate(State(state.clone()), Path(id.clone()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let err = get_certificate(State(state), Path(id)).await.unwrap_err();
        assert_eq!(error_response(err).await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn settings_advertise_acme_directory() {
        let Json(settings) = ca_settings(State(state().await)).await;
        assert_eq!(settings.ca_url, "https://ca.internal:9000");
        assert_eq!(
            settings.acme_directories,
            vec!["https://ca.internal:9000/acme/acme/directory"]
        );
    }

    #[test]
    fn list_parameters_fall_back_to_defaults() {
        let query = list_query(&params(&[("limit", "abc"), ("offset", "-1")])).unwrap();
        assert_eq!(query, CertificateQuery::default());

        let query = list_query(&params(&[("limit", "10"), ("offset", "20"), ("status", "expired")]))
            .unwrap();
        assert_eq!(query.limit, 10);
        assert_eq!(query.offset, 20);
        assert_eq!(query.status, Some(CertificateStatus::Expired));

        assert!(list_query(&params(&[("status", "pending")])).is_err());
    }

    #[test]
    fn server_errors_map_to_500() {
        let err = ApiError(StepwardError::Timeout {
            operation: "issue".into(),
            timeout_secs: 60,
        });
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
