//! ownurvoice HTTP server
//! ----------------------
//! Axum-based HTTP API: auth endpoints, therapist and patient dashboard
//! reads, care-plan writes, and exercise completion. Backend selection (mock
//! vs hosted) happens here at startup; handlers only ever see the traits.
//!
//! Responsibilities:
//! - Bearer-token auth via a `Principal` extractor on every protected route.
//! - Role gating: therapist routes check profile ownership, patient
//!   dashboards are readable by the patient themselves or a therapist.
//! - Mock backend seeds the demo dataset on startup, mirroring the demo
//!   accounts the legacy in-memory backend shipped.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::config::{AppConfig, Backend};
use crate::error::{AppError, AppResult};
use crate::flows::{
    self, AddPatientRequest, AddPatientResponse, AssignExerciseRequest, Assignment,
    CreateExerciseRequest, CreateGoalRequest, LinkPatientRequest, LoginRequest, LoginResponse,
    PatientDashboard, RegisterRequest, RegisterResponse, TherapistDashboard,
};
use crate::identity::{
    HostedIdentityProvider, IdentityProvider, LocalIdentityProvider, Principal, TokenService,
};
use crate::model::{Exercise, Goal, Role, SessionExercise, TherapySession};
use crate::store::{HostedStore, MockStore, Store};

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub idp: Arc<dyn IdentityProvider>,
    pub tokens: TokenService,
    pub recent_sessions_limit: usize,
}

impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::auth("missing_token", "missing bearer token"))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::auth("invalid_token", "expected 'Bearer <token>'"))?;
        state.tokens.verify(token)
    }
}

/// A therapist route is only usable by the therapist owning the profile row.
async fn require_therapist(
    state: &AppState,
    principal: &Principal,
    therapist_id: Uuid,
) -> AppResult<()> {
    if principal.role != Role::Therapist {
        return Err(AppError::forbidden("wrong_role", "therapist access required"));
    }
    let Some(profile) = state.store.therapist_profile(therapist_id).await? else {
        return Err(AppError::not_found("therapist_missing", "therapist profile not found"));
    };
    if profile.account_id != Some(principal.account_id) {
        return Err(AppError::forbidden("not_owner", "not your therapist profile"));
    }
    Ok(())
}

async fn health() -> &'static str { "ownurvoice ok" }

async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Json<RegisterResponse>> {
    let out = flows::register(state.store.as_ref(), state.idp.as_ref(), &state.tokens, req).await?;
    Ok(Json(out))
}

async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let out = flows::login(state.store.as_ref(), state.idp.as_ref(), &state.tokens, req).await?;
    Ok(Json(out))
}

async fn verify_handler(principal: Principal) -> Json<serde_json::Value> {
    Json(json!({ "user": principal }))
}

async fn therapist_dashboard_handler(
    State(state): State<AppState>,
    Path(therapist_id): Path<Uuid>,
    principal: Principal,
) -> AppResult<Json<TherapistDashboard>> {
    require_therapist(&state, &principal, therapist_id).await?;
    let out =
        flows::therapist_dashboard(state.store.as_ref(), therapist_id, state.recent_sessions_limit)
            .await?;
    Ok(Json(out))
}

async fn patient_dashboard_handler(
    State(state): State<AppState>,
    Path(patient_id): Path<Uuid>,
    principal: Principal,
) -> AppResult<Json<PatientDashboard>> {
    // Therapists and parents/carers may read any patient dashboard they can
    // name; a patient only their own.
    if principal.role == Role::Patient {
        let Some(profile) = state.store.patient_profile(patient_id).await? else {
            return Err(AppError::not_found("patient_missing", "patient profile not found"));
        };
        if profile.account_id != Some(principal.account_id) {
            return Err(AppError::forbidden("not_owner", "not your dashboard"));
        }
    }
    let out = flows::patient_dashboard(state.store.as_ref(), patient_id).await?;
    Ok(Json(out))
}

async fn add_patient_handler(
    State(state): State<AppState>,
    Path(therapist_id): Path<Uuid>,
    principal: Principal,
    Json(req): Json<AddPatientRequest>,
) -> AppResult<Json<AddPatientResponse>> {
    require_therapist(&state, &principal, therapist_id).await?;
    let out = flows::add_new_patient(state.store.as_ref(), therapist_id, req).await?;
    Ok(Json(out))
}

async fn link_patient_handler(
    State(state): State<AppState>,
    Path(therapist_id): Path<Uuid>,
    principal: Principal,
    Json(req): Json<LinkPatientRequest>,
) -> AppResult<Json<TherapySession>> {
    require_therapist(&state, &principal, therapist_id).await?;
    let out = flows::link_existing_patient(state.store.as_ref(), therapist_id, req).await?;
    Ok(Json(out))
}

async fn create_exercise_handler(
    State(state): State<AppState>,
    Path(therapist_id): Path<Uuid>,
    principal: Principal,
    Json(req): Json<CreateExerciseRequest>,
) -> AppResult<Json<Exercise>> {
    require_therapist(&state, &principal, therapist_id).await?;
    let out = flows::create_exercise(state.store.as_ref(), therapist_id, req).await?;
    Ok(Json(out))
}

async fn create_goal_handler(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<CreateGoalRequest>,
) -> AppResult<Json<Goal>> {
    if principal.role != Role::Therapist {
        return Err(AppError::forbidden("wrong_role", "therapist access required"));
    }
    let out = flows::create_goal(state.store.as_ref(), req).await?;
    Ok(Json(out))
}

async fn assign_exercise_handler(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<AssignExerciseRequest>,
) -> AppResult<Json<Assignment>> {
    if principal.role != Role::Therapist {
        return Err(AppError::forbidden("wrong_role", "therapist access required"));
    }
    let out = flows::assign_exercise(state.store.as_ref(), req).await?;
    Ok(Json(out))
}

async fn complete_exercise_handler(
    State(state): State<AppState>,
    Path((session_id, exercise_id)): Path<(Uuid, Uuid)>,
    _principal: Principal,
) -> AppResult<Json<SessionExercise>> {
    let out = flows::complete_exercise(state.store.as_ref(), session_id, exercise_id).await?;
    Ok(Json(out))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/verify", get(verify_handler))
        .route("/api/therapist/{id}/dashboard", get(therapist_dashboard_handler))
        .route("/api/therapist/{id}/patients", post(add_patient_handler))
        .route("/api/therapist/{id}/patients/link", post(link_patient_handler))
        .route("/api/therapist/{id}/exercises", post(create_exercise_handler))
        .route("/api/goals", post(create_goal_handler))
        .route("/api/assignments", post(assign_exercise_handler))
        .route("/api/patient/{id}/dashboard", get(patient_dashboard_handler))
        .route(
            "/api/sessions/{session_id}/exercises/{exercise_id}/complete",
            post(complete_exercise_handler),
        )
        .with_state(state)
}

/// Wire up the configured backend pair and produce the shared state.
pub fn build_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let (store, idp): (Arc<dyn Store>, Arc<dyn IdentityProvider>) = match config.backend {
        Backend::Mock => {
            let store = MockStore::new();
            let seed = store.seed_demo();
            let idp = LocalIdentityProvider::new();
            for (email, password, account_id) in [
                &seed.therapist_account,
                &seed.patient_account,
                &seed.parent_account,
            ] {
                idp.seed(email, password, *account_id);
            }
            info!(
                target: "startup",
                "mock backend seeded: therapist={} patient={} session={}",
                seed.therapist_id, seed.patient_id, seed.session_id
            );
            (Arc::new(store), Arc::new(idp))
        }
        Backend::Hosted => {
            let store_url = config.store_url.as_deref().context("OWNURVOICE_STORE_URL not set")?;
            let store_key = config
                .store_api_key
                .as_deref()
                .context("OWNURVOICE_STORE_API_KEY not set")?;
            let auth_url = config.auth_url.as_deref().context("OWNURVOICE_AUTH_URL not set")?;
            let auth_key = config
                .auth_api_key
                .as_deref()
                .context("OWNURVOICE_AUTH_API_KEY not set")?;
            info!(target: "startup", "hosted backend: store={} auth={}", store_url, auth_url);
            (
                Arc::new(HostedStore::new(store_url, store_key)),
                Arc::new(HostedIdentityProvider::new(auth_url, auth_key)),
            )
        }
    };
    Ok(AppState {
        store,
        idp,
        tokens: TokenService::new(&config.jwt_secret),
        recent_sessions_limit: config.recent_sessions_limit,
    })
}

/// Start the HTTP server with the given configuration.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let state = build_state(&config)?;
    let app = router(state);
    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
