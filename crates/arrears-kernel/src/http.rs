//! Per-request execution context assembly and HTTP error mapping.

use std::ops::Deref;
use std::sync::Arc;

use arrears_bus::{Bus, BusError, ExecutionContext, HandlerError, ProcedureInfo, Violation};
use arrears_protocol::{AppConfig, DatabasePort, Identity, IdentityPort, RequestId};
use axum::Json;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{Instrument, debug, error, info_span, warn};

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub bus: Bus,
    pub database: Arc<dyn DatabasePort>,
    pub identities: Arc<dyn IdentityPort>,
    pub config: Arc<AppConfig>,
}

/// The execution context assembled for the current request.
#[derive(Clone)]
pub struct RequestContext(pub ExecutionContext);

impl Deref for RequestContext {
    type Target = ExecutionContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<RequestContext>().cloned().ok_or_else(|| {
            error!("route mounted outside the request scope middleware");
            ApiError::internal()
        })
    }
}

/// Middleware wrapped around every module route.
///
/// Resolves the caller, opens a unit of work, and stores a fresh
/// [`ExecutionContext`] in the request extensions. The unit of work commits
/// when the route answers with a success status and rolls back otherwise.
pub async fn request_scope(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let request_id = RequestId::default();
    let credential = match bearer_credential(request.headers()) {
        Ok(credential) => credential,
        Err(error) => return error.into_response(),
    };
    let identity = match resolve_identity(&state, credential).await {
        Ok(identity) => identity,
        Err(error) => return error.into_response(),
    };

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
        subject = identity.as_ref().map(|identity| identity.subject.as_str()),
    );

    let unit = match state.database.begin().await {
        Ok(unit) => unit,
        Err(error) => {
            error!(parent: &span, %error, "failed to open unit of work");
            return ApiError::internal().into_response();
        }
    };

    let context = ExecutionContext::builder(state.bus.clone(), unit.database(), state.config.clone())
        .identity(identity)
        .request_id(request_id)
        .span(span.clone())
        .build();
    request.extensions_mut().insert(RequestContext(context));

    let response = next.run(request).instrument(span.clone()).await;

    if response.status().is_success() {
        if let Err(error) = unit.commit().await {
            error!(parent: &span, %error, "commit failed");
            return ApiError::internal().into_response();
        }
    } else if let Err(error) = unit.rollback().await {
        warn!(parent: &span, %error, "rollback failed");
    } else {
        debug!(parent: &span, status = %response.status(), "unit of work rolled back");
    }
    response
}

fn bearer_credential(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| Some(token.trim().to_owned()))
        .ok_or_else(|| ApiError::unauthenticated("malformed Authorization header"))
}

async fn resolve_identity(
    state: &AppState,
    credential: Option<String>,
) -> Result<Option<Identity>, ApiError> {
    match credential {
        Some(credential) => state
            .identities
            .resolve(&credential)
            .await
            .map(Some)
            .map_err(|error| {
                debug!(%error, "credential rejected");
                ApiError::unauthenticated("invalid credential")
            }),
        None if state.config.auth.allow_anonymous => Ok(None),
        None => Err(ApiError::unauthenticated("missing bearer token")),
    }
}

pub(crate) async fn healthz(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "arrears",
        "procedures": state.bus.len(),
    }))
}

pub(crate) async fn list_procedures(context: RequestContext) -> Json<Vec<ProcedureInfo>> {
    Json(context.bus().procedures().collect())
}

/// JSON error response: `{ "error", "code", "violations"? }`.
#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    violations: Vec<Violation>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    violations: Vec<Violation>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            violations: Vec::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthenticated", message)
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "internal server error",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    fn from_handler(error: &HandlerError) -> Option<Self> {
        let (status, code) = match error {
            HandlerError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            HandlerError::Invalid(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid"),
            HandlerError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            HandlerError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            HandlerError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            HandlerError::Upstream(inner) => match &**inner {
                BusError::Handler { source, .. } => return Self::from_handler(source),
                _ => return None,
            },
            HandlerError::Database(_) | HandlerError::Internal(_) => return None,
        };
        Some(Self::new(status, code, error.to_string()))
    }
}

impl From<BusError> for ApiError {
    fn from(error: BusError) -> Self {
        let mapped = match &error {
            BusError::InvalidPayload { violations, .. } => Some(Self {
                violations: violations.clone(),
                ..Self::new(StatusCode::BAD_REQUEST, "invalid_payload", error.to_string())
            }),
            BusError::Handler { source, .. } => Self::from_handler(source),
            _ => None,
        };
        mapped.unwrap_or_else(|| {
            error!(error = %error, root_cause = %error.root_cause(), "request failed");
            Self::internal()
        })
    }
}

impl From<HandlerError> for ApiError {
    fn from(error: HandlerError) -> Self {
        Self::from_handler(&error).unwrap_or_else(|| {
            error!(%error, "request failed");
            Self::internal()
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            code: self.code,
            violations: self.violations,
        };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn handler_failure(source: HandlerError) -> BusError {
        BusError::Handler {
            procedure: "events:registerMember".to_owned(),
            source,
        }
    }

    #[test]
    fn invalid_payload_maps_to_400_with_violations() {
        let error = ApiError::from(BusError::InvalidPayload {
            procedure: "events:getEvents".to_owned(),
            violations: vec![Violation::new("/starting", "\"soon\" is not a \"date-time\"")],
        });
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error.code(), "invalid_payload");
        assert_eq!(error.violations()[0].path, "/starting");
    }

    #[test]
    fn handler_error_kinds_map_to_their_status() {
        let cases = [
            (HandlerError::NotFound("member 9".into()), StatusCode::NOT_FOUND),
            (HandlerError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (HandlerError::Unauthenticated("who".into()), StatusCode::UNAUTHORIZED),
            (HandlerError::Conflict("again".into()), StatusCode::CONFLICT),
            (HandlerError::Invalid("amount".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (HandlerError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (source, status) in cases {
            assert_eq!(ApiError::from(handler_failure(source)).status(), status);
        }
    }

    #[test]
    fn contract_and_wiring_failures_are_opaque_500s() {
        for error in [
            BusError::InvalidResponse {
                procedure: "members:getMember".to_owned(),
                violations: vec![Violation::root("missing name")],
            },
            BusError::ProcedureNotRegistered {
                procedure: "members:getMember".to_owned(),
            },
            BusError::CallDepthExceeded {
                procedure: "search:search".to_owned(),
                depth: 17,
            },
        ] {
            let mapped = ApiError::from(error);
            assert_eq!(mapped.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(mapped.message(), "internal server error");
            assert!(mapped.violations().is_empty());
        }
    }

    #[test]
    fn nested_domain_errors_keep_their_status() {
        let inner = handler_failure(HandlerError::NotFound("member 3".into()));
        let outer = handler_failure(HandlerError::from(inner));
        assert_eq!(ApiError::from(outer).status(), StatusCode::NOT_FOUND);

        let nested_contract = handler_failure(HandlerError::from(BusError::InvalidPayload {
            procedure: "members:getMember".to_owned(),
            violations: vec![],
        }));
        assert_eq!(
            ApiError::from(nested_contract).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn bearer_credential_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_credential(&headers).unwrap(), None);

        headers.insert(header::AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_credential(&headers).unwrap(), Some("abc123".to_owned()));

        headers.insert(header::AUTHORIZATION, "Basic Zm9v".parse().unwrap());
        assert_eq!(
            bearer_credential(&headers).unwrap_err().status(),
            StatusCode::UNAUTHORIZED
        );
    }

    mod scoped_routes {
        use anyhow::Result;
        use arrears_bus::{ProcedureDefinition, ProcedureSpec, Scope};
        use arrears_protocol::{ApiToken, Role, Statement};
        use arrears_store::MemoryDatabase;
        use async_trait::async_trait;
        use axum::body::Body;
        use axum::http::Request as HttpRequest;
        use axum::routing::post;
        use axum::{Extension, Router};
        use tower::ServiceExt;

        use super::*;
        use crate::container::{Kernel, ModuleContainer};
        use crate::module::{Module, SetupContext};

        const LEDGER: &str = "ledger";

        /// Records a staff-only ledger entry. Negative amounts are written and
        /// then refused, so only the unit of work keeps them out of the table.
        struct Ledger {
            record: ProcedureDefinition,
        }

        impl Ledger {
            fn new() -> Result<Self> {
                let record = Scope::new("ledger")?.define_procedure(ProcedureSpec::new(
                    "record",
                    json!({
                        "type": "object",
                        "required": ["amount"],
                        "properties": { "amount": { "type": "integer" } }
                    }),
                    json!({ "type": "object", "required": ["id"] }),
                ))?;
                Ok(Self { record })
            }
        }

        async fn record(payload: Value, ctx: ExecutionContext) -> Result<Value, HandlerError> {
            ctx.require_role(Role::Staff)?;
            let mut row = arrears_protocol::Row::new();
            row.insert("amount".to_owned(), payload["amount"].clone());
            let outcome = ctx
                .database()
                .execute(&Statement::insert(LEDGER, row))
                .await?;
            if payload["amount"].as_i64().unwrap_or(0) < 0 {
                return Err(HandlerError::Invalid("amount must not be negative".to_owned()));
            }
            Ok(json!({ "id": outcome.last_insert_id }))
        }

        async fn record_route(
            Extension(definition): Extension<ProcedureDefinition>,
            context: RequestContext,
            Json(body): Json<Value>,
        ) -> ApiResult<(StatusCode, Json<Value>)> {
            let created = context.exec_value(&definition, body).await?;
            Ok((StatusCode::CREATED, Json(created)))
        }

        #[async_trait]
        impl Module for Ledger {
            fn name(&self) -> &str {
                "ledger"
            }

            async fn setup(&self, context: &mut SetupContext<'_>) -> Result<()> {
                context.register(&self.record, record)?;
                Ok(())
            }

            fn routes(&self) -> Router<AppState> {
                Router::new()
                    .route("/ledger", post(record_route))
                    .layer(Extension(self.record.clone()))
            }
        }

        async fn kernel(allow_anonymous: bool) -> Result<(Kernel, MemoryDatabase)> {
            let mut config = AppConfig::default();
            config.auth.allow_anonymous = allow_anonymous;
            for token in ["staff-token=treasurer:staff", "member-token=grace:member"] {
                config
                    .auth
                    .tokens
                    .push(token.parse::<ApiToken>().map_err(anyhow::Error::msg)?);
            }
            let db = MemoryDatabase::new();
            let kernel = ModuleContainer::new(config, Arc::new(db.clone()))
                .module(Ledger::new()?)
                .start()
                .await?;
            Ok((kernel, db))
        }

        fn post_ledger(token: Option<&str>, amount: i64) -> Result<HttpRequest<Body>> {
            let mut builder = HttpRequest::builder()
                .method("POST")
                .uri("/ledger")
                .header(header::CONTENT_TYPE, "application/json");
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            Ok(builder.body(Body::from(json!({ "amount": amount }).to_string()))?)
        }

        #[tokio::test]
        async fn success_status_commits_the_unit_of_work() -> Result<()> {
            let (kernel, db) = kernel(true).await?;

            let response = kernel
                .router()
                .oneshot(post_ledger(Some("staff-token"), 5)?)
                .await?;

            assert_eq!(response.status(), StatusCode::CREATED);
            let rows = db.rows(LEDGER);
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0]["amount"], json!(5));
            Ok(())
        }

        #[tokio::test]
        async fn error_status_rolls_back_statements_already_made() -> Result<()> {
            let (kernel, db) = kernel(true).await?;

            let response = kernel
                .router()
                .oneshot(post_ledger(Some("staff-token"), -3)?)
                .await?;

            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
            assert!(db.rows(LEDGER).is_empty());
            Ok(())
        }

        #[tokio::test]
        async fn forbidden_caller_writes_nothing() -> Result<()> {
            let (kernel, db) = kernel(true).await?;

            let response = kernel
                .router()
                .oneshot(post_ledger(Some("member-token"), 5)?)
                .await?;

            assert_eq!(response.status(), StatusCode::FORBIDDEN);
            assert!(db.rows(LEDGER).is_empty());
            Ok(())
        }

        #[tokio::test]
        async fn unknown_bearer_token_is_unauthorized() -> Result<()> {
            let (kernel, db) = kernel(true).await?;
            let before = db.statement_count();

            let response = kernel
                .router()
                .oneshot(post_ledger(Some("forged"), 5)?)
                .await?;

            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert!(db.rows(LEDGER).is_empty());
            assert_eq!(db.statement_count(), before);
            Ok(())
        }

        #[tokio::test]
        async fn missing_token_is_unauthorized_when_anonymous_is_disabled() -> Result<()> {
            let (kernel, db) = kernel(false).await?;
            let router = kernel.router();

            let response = router.clone().oneshot(post_ledger(None, 5)?).await?;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert!(db.rows(LEDGER).is_empty());

            let procedures = HttpRequest::builder().uri("/procedures").body(Body::empty())?;
            let response = router.clone().oneshot(procedures).await?;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

            let health = HttpRequest::builder().uri("/healthz").body(Body::empty())?;
            let response = router.oneshot(health).await?;
            assert_eq!(response.status(), StatusCode::OK);
            Ok(())
        }

        #[tokio::test]
        async fn procedures_route_lists_registered_contracts() -> Result<()> {
            let (kernel, _db) = kernel(true).await?;

            let request = HttpRequest::builder()
                .uri("/procedures")
                .header(header::AUTHORIZATION, "Bearer member-token")
                .body(Body::empty())?;
            let response = kernel.router().oneshot(request).await?;

            assert_eq!(response.status(), StatusCode::OK);
            let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
            let listed: Vec<ProcedureInfo> = serde_json::from_slice(&body)?;
            assert_eq!(listed.len(), 1);
            assert_eq!(listed[0].qualified_name, "ledger:record");
            assert_eq!(listed[0].module, "ledger");
            Ok(())
        }
    }
}
