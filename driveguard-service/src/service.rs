use axum::{
    Router,
    extract::{Request, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::{Next, from_fn},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use driveguard::{
    AdminOverview, ContractGateway, DeskConfig, DriveGuardError, InMemoryProfileStore,
    InMemorySessionStorage, InsuranceDesk, LoginOutcome, NewPolicyForm, Policy, PolicyCreated,
    PolicyQuote, PostgresProfileStore, PostgresSessionStorage, ProfileStore, PurchaseOutcome,
    PurchaseRequest, QuoteRequest, RegistrationForm, RegistrationOutcome, Route, Session,
    SessionStorage, SimulatedChain, VehicleCatalog,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::config::ServiceConfig;

/// Header carrying the session id issued by `/login`
pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Clone)]
pub struct AppState {
    pub desk: InsuranceDesk,
}

/// JSON error body with the HTTP status for its kind
#[derive(Debug)]
pub struct ApiError(DriveGuardError);

impl From<DriveGuardError> for ApiError {
    fn from(e: DriveGuardError) -> Self {
        Self(e)
    }
}

fn status_for(e: &DriveGuardError) -> StatusCode {
    match e {
        DriveGuardError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        DriveGuardError::UserRejected(_) => StatusCode::CONFLICT,
        DriveGuardError::NetworkOrContract(_) => StatusCode::BAD_GATEWAY,
        DriveGuardError::Validation(_) => StatusCode::BAD_REQUEST,
        DriveGuardError::NotFound(_) | DriveGuardError::SessionNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        DriveGuardError::Unauthenticated => StatusCode::UNAUTHORIZED,
        DriveGuardError::AccessDenied(_) => StatusCode::FORBIDDEN,
        DriveGuardError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(kind = self.0.kind(), error = %self.0, "Request failed");
        } else {
            warn!(kind = self.0.kind(), error = %self.0, "Request rejected");
        }

        let mut body = json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        });
        if matches!(self.0, DriveGuardError::Unauthenticated) {
            body["redirect"] = json!(Route::Login.path());
        }
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(DriveGuardError::Validation(rejection.body_text()))
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// A JSON request body, or the rejection turned into a validation error
type JsonBody<T> = Result<Json<T>, JsonRejection>;

fn json_body<T>(body: JsonBody<T>) -> Result<T, ApiError> {
    let Json(value) = body?;
    Ok(value)
}

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn required_session_id(headers: &HeaderMap) -> Result<&str, ApiError> {
    session_id(headers).ok_or(ApiError(DriveGuardError::Unauthenticated))
}

async fn create_session_storage(config: &ServiceConfig) -> Arc<dyn SessionStorage> {
    if let Some(database_url) = &config.database_url {
        info!("Using PostgreSQL session storage");
        match PostgresSessionStorage::connect(database_url).await {
            Ok(storage) => return Arc::new(storage),
            Err(e) => error!(
                "Failed to connect to PostgreSQL: {}. Falling back to in-memory storage.",
                e
            ),
        }
    } else {
        info!("Using in-memory session storage (set DATABASE_URL to use PostgreSQL)");
    }
    Arc::new(InMemorySessionStorage::new())
}

async fn create_profile_store(config: &ServiceConfig) -> Arc<dyn ProfileStore> {
    if let Some(database_url) = &config.database_url {
        match PostgresProfileStore::connect(database_url).await {
            Ok(store) => return Arc::new(store),
            Err(e) => error!(
                "Failed to open users collection: {}. Falling back to in-memory storage.",
                e
            ),
        }
    }
    Arc::new(InMemoryProfileStore::new())
}

pub async fn create_app_state(config: &ServiceConfig) -> AppState {
    let chain = Arc::new(SimulatedChain::new(
        config.contracts.clone(),
        &config.admin_addresses,
        config.eth_usd_price,
    ));
    info!(
        role_contract = %config.contracts.role_contract,
        policy_contract = %config.contracts.policy_contract,
        admins = config.admin_addresses.len(),
        "Contracts ready"
    );

    let desk = InsuranceDesk::new(
        ContractGateway::new(chain.clone(), chain),
        create_session_storage(config).await,
        create_profile_store(config).await,
        VehicleCatalog::bundled(),
        DeskConfig {
            reverify_roles: config.reverify_roles,
        },
    );

    AppState { desk }
}

pub async fn create_app(config: &ServiceConfig) -> Router {
    build_router(create_app_state(config).await)
}

pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Middleware to add a correlation ID to every request and its response
async fn correlation_id_middleware(mut request: Request, next: Next) -> Response {
    // Take the caller's correlation ID or generate one
    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let header = HeaderValue::from_str(&correlation_id).ok();

    if let Some(value) = &header {
        request.headers_mut().insert(CORRELATION_HEADER, value.clone());
    }

    // Span for the request, carrying the session id when present
    let span = tracing::info_span!(
        "http_request",
        correlation_id = %correlation_id,
        method = %request.method(),
        path = %request.uri().path(),
        session_id = session_id(request.headers()).unwrap_or("-")
    );

    let mut response = next.run(request).instrument(span).await;

    // Echo the id on the response
    if let Some(value) = header {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/catalog", get(catalog))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/session", get(current_session))
        .route("/register", post(register))
        .route("/buy-insurance", get(available_policies))
        .route("/buy-insurance/quote", post(quote))
        .route("/buy-insurance/purchase", post(purchase))
        .route("/admin", get(admin_overview))
        .route("/admin-policy", get(admin_overview).post(create_policy))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "DriveGuard",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Car insurance quotes and purchases backed by on-chain policies",
        "endpoints": {
            "GET /catalog": "Vehicle brands, models, years and prices",
            "POST /login": "Open a session for a connected wallet",
            "POST /logout": "Close the current session",
            "GET /session": "Current session and profile",
            "POST /register": "Register the connected wallet as a policy holder",
            "GET /buy-insurance": "Policies on offer (policy holders)",
            "POST /buy-insurance/quote": "Premium for every policy (policy holders)",
            "POST /buy-insurance/purchase": "Buy a policy (policy holders)",
            "GET /admin": "Policy book (admins)",
            "GET /admin-policy": "Policy book (admins)",
            "POST /admin-policy": "Create a policy (admins)",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn catalog(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "vehicles": state.desk.catalog().entries() }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoginRequest {
    wallet_address: String,
}

async fn login(
    State(state): State<AppState>,
    body: JsonBody<LoginRequest>,
) -> ApiResult<LoginOutcome> {
    let request = json_body(body)?;
    info!(wallet = %request.wallet_address, "Login requested");
    Ok(Json(state.desk.login(&request.wallet_address).await?))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Value> {
    let session_id = required_session_id(&headers)?;
    state.desk.logout(session_id).await?;
    Ok(Json(json!({
        "status": "logged_out",
        "redirect": Route::Home.path()
    })))
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    session: Session,
    profile: Option<driveguard::UserProfile>,
}

async fn current_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<SessionResponse> {
    let session_id = required_session_id(&headers)?;
    let session = state.desk.session(session_id).await?;
    let profile = state.desk.profile(session_id).await?;
    Ok(Json(SessionResponse { session, profile }))
}

async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: JsonBody<RegistrationForm>,
) -> ApiResult<RegistrationOutcome> {
    let form = json_body(body)?;
    let session_id = required_session_id(&headers)?;
    Ok(Json(state.desk.register(session_id, form).await?))
}

async fn available_policies(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Vec<Policy>> {
    Ok(Json(
        state.desk.available_policies(session_id(&headers)).await?,
    ))
}

async fn quote(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: JsonBody<QuoteRequest>,
) -> ApiResult<Vec<PolicyQuote>> {
    let request = json_body(body)?;
    Ok(Json(state.desk.quote(session_id(&headers), &request).await?))
}

async fn purchase(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: JsonBody<PurchaseRequest>,
) -> ApiResult<PurchaseOutcome> {
    let request = json_body(body)?;
    Ok(Json(
        state.desk.purchase(session_id(&headers), &request).await?,
    ))
}

async fn admin_overview(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<AdminOverview> {
    Ok(Json(state.desk.admin_overview(session_id(&headers)).await?))
}

async fn create_policy(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: JsonBody<NewPolicyForm>,
) -> ApiResult<PolicyCreated> {
    let form = json_body(body)?;
    Ok(Json(
        state
            .desk
            .create_policy(session_id(&headers), form)
            .await?,
    ))
}
