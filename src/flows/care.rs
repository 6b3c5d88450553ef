//! Care-plan writes: a therapist adding or linking a patient (both create a
//! session), authoring exercises and goals, attaching exercises, and the
//! patient-side completion update.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::{
    Exercise, Goal, GoalExerciseSet, PatientProfile, Role, SessionExercise, TherapySession,
};
use crate::store::Store;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionDetails {
    pub date: NaiveDate,
    pub time: String,
    pub session_type: String,
    #[serde(default)]
    pub location: Option<String>,
}

impl SessionDetails {
    fn into_session(self, patient_id: Uuid, therapist_id: Uuid) -> AppResult<TherapySession> {
        if self.time.trim().is_empty() {
            return Err(AppError::user("missing_field", "session time is required"));
        }
        if self.session_type.trim().is_empty() {
            return Err(AppError::user("missing_field", "session type is required"));
        }
        Ok(TherapySession {
            id: Uuid::new_v4(),
            patient_id,
            therapist_id,
            date: self.date,
            time: self.time,
            session_type: self.session_type,
            status: "scheduled".into(),
            location: self.location,
            notes: None,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddPatientRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub therapy_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub preferred_contact_method: Option<String>,
    pub session: SessionDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddPatientResponse {
    pub patient: PatientProfile,
    pub session: TherapySession,
}

/// "Add new patient": insert an unlinked patient row (no account yet — the
/// patient links it later by registering with the same email) and the
/// initial session.
pub async fn add_new_patient(
    store: &dyn Store,
    therapist_id: Uuid,
    req: AddPatientRequest,
) -> AppResult<AddPatientResponse> {
    if req.first_name.trim().is_empty() || req.last_name.trim().is_empty() {
        return Err(AppError::user("missing_field", "patient name is required"));
    }
    if !req.email.contains('@') {
        return Err(AppError::user("invalid_email", "email address is not valid"));
    }
    let email = req.email.trim().to_ascii_lowercase();
    // One patient row per email: a second unlinked row would make the
    // auto-link target at registration ambiguous, and an already-registered
    // patient should go through the link flow instead.
    if store.find_unlinked_patient_by_email(&email, None).await?.is_some() {
        return Err(AppError::conflict("patient_exists", "a patient with this email already exists"));
    }
    if let Some(existing) = store.resolve_login(&email).await? {
        if existing.role == Role::Patient {
            return Err(AppError::conflict("patient_exists", "a patient with this email already exists"));
        }
    }
    let patient = store
        .insert_patient(PatientProfile {
            id: Uuid::new_v4(),
            account_id: None,
            username: None,
            email,
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            date_of_birth: req.date_of_birth,
            therapy_start_date: req.therapy_start_date,
            preferred_contact_method: req.preferred_contact_method,
        })
        .await?;
    let session = store
        .insert_session(req.session.into_session(patient.id, therapist_id)?)
        .await?;
    info!(target: "care", "therapist {} added patient {} with initial session {}", therapist_id, patient.id, session.id);
    Ok(AddPatientResponse { patient, session })
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkPatientRequest {
    pub patient_id: Uuid,
    pub session: SessionDetails,
}

/// "Link existing patient": create a session connecting this therapist to an
/// already-present patient row.
pub async fn link_existing_patient(
    store: &dyn Store,
    therapist_id: Uuid,
    req: LinkPatientRequest,
) -> AppResult<TherapySession> {
    let Some(patient) = store.patient_profile(req.patient_id).await? else {
        return Err(AppError::not_found("patient_missing", "patient profile not found"));
    };
    let session = store
        .insert_session(req.session.into_session(patient.id, therapist_id)?)
        .await?;
    info!(target: "care", "therapist {} linked patient {} via session {}", therapist_id, patient.id, session.id);
    Ok(session)
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateExerciseRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
}

pub async fn create_exercise(
    store: &dyn Store,
    therapist_id: Uuid,
    req: CreateExerciseRequest,
) -> AppResult<Exercise> {
    if req.title.trim().is_empty() {
        return Err(AppError::user("missing_field", "exercise title is required"));
    }
    store
        .insert_exercise(Exercise {
            id: Uuid::new_v4(),
            therapist_id,
            title: req.title.trim().to_string(),
            description: req.description,
            difficulty: req.difficulty,
            frequency: req.frequency,
        })
        .await
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGoalRequest {
    pub session_id: Uuid,
    pub description: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Option<String>,
}

pub async fn create_goal(store: &dyn Store, req: CreateGoalRequest) -> AppResult<Goal> {
    if req.description.trim().is_empty() {
        return Err(AppError::user("missing_field", "goal description is required"));
    }
    store
        .insert_goal(Goal {
            id: Uuid::new_v4(),
            session_id: req.session_id,
            description: req.description.trim().to_string(),
            start_date: req.start_date,
            target_date: req.target_date,
            status: "active".into(),
            priority: req.priority.unwrap_or_else(|| "medium".into()),
        })
        .await
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignExerciseRequest {
    pub exercise_id: Uuid,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub goal_id: Option<Uuid>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Assignment {
    Session(SessionExercise),
    Goal(GoalExerciseSet),
}

/// Attach an exercise to exactly one of a session or a goal.
pub async fn assign_exercise(store: &dyn Store, req: AssignExerciseRequest) -> AppResult<Assignment> {
    match (req.session_id, req.goal_id) {
        (Some(session_id), None) => {
            let row = store
                .assign_exercise_to_session(SessionExercise {
                    id: Uuid::new_v4(),
                    session_id,
                    exercise_id: req.exercise_id,
                    completed: false,
                    completed_at: None,
                    notes: req.notes,
                })
                .await?;
            Ok(Assignment::Session(row))
        }
        (None, Some(goal_id)) => {
            let row = store
                .assign_exercise_to_goal(GoalExerciseSet {
                    id: Uuid::new_v4(),
                    goal_id,
                    exercise_id: req.exercise_id,
                    completed: false,
                    completed_at: None,
                    notes: req.notes,
                })
                .await?;
            Ok(Assignment::Goal(row))
        }
        _ => Err(AppError::user(
            "invalid_assignment",
            "exactly one of session_id or goal_id is required",
        )),
    }
}

/// Mark a session's exercise complete, stamped with the current time.
/// Re-completion succeeds and refreshes the timestamp; a missing join row is
/// a distinguishable not-found.
pub async fn complete_exercise(
    store: &dyn Store,
    session_id: Uuid,
    exercise_id: Uuid,
) -> AppResult<SessionExercise> {
    let when = Utc::now();
    match store.complete_session_exercise(session_id, exercise_id, when).await? {
        Some(row) => {
            info!(target: "care", "exercise {} completed for session {}", exercise_id, session_id);
            Ok(row)
        }
        None => Err(AppError::not_found(
            "assignment_missing",
            "no such exercise assigned to this session",
        )),
    }
}
