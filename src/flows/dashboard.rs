//! Dashboard reads. Both dashboards fan out from an id to sessions and then
//! to child rows; independent branches run concurrently and a failed branch
//! degrades to empty instead of taking the whole page down. Only the patient
//! profile itself is load-bearing.

use chrono::Utc;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::{Exercise, Goal, PatientProfile, TherapistProfile, TherapySession};
use crate::store::{distinct_ids, SessionWithPatient, Store};

#[derive(Debug, Clone, Serialize)]
pub struct TherapistDashboard {
    pub recent_sessions: Vec<SessionWithPatient>,
    pub patients: Vec<PatientProfile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignedExercise {
    pub goal_id: Uuid,
    pub exercise: Exercise,
    pub completed: bool,
    pub completed_at: Option<chrono::DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientDashboard {
    pub profile: PatientProfile,
    pub therapists: Vec<TherapistProfile>,
    pub upcoming_sessions: Vec<TherapySession>,
    pub goals: Vec<Goal>,
    pub exercises: Vec<AssignedExercise>,
}

/// Up to `limit` most recent sessions with patient summaries, plus the
/// distinct patient set via the sessions fan-out. Zero sessions is an empty
/// dashboard, not an error. The two reads are concurrent and not mutually
/// consistent.
pub async fn therapist_dashboard(
    store: &dyn Store,
    therapist_id: Uuid,
    limit: usize,
) -> AppResult<TherapistDashboard> {
    let recent = store.recent_sessions_for_therapist(therapist_id, limit);
    let patients = async {
        let sessions = store.sessions_for_therapist(therapist_id).await?;
        let ids = distinct_ids(sessions.into_iter().map(|s| s.patient_id));
        store.patients_by_ids(&ids).await
    };
    let (recent, patients) = tokio::join!(recent, patients);
    Ok(TherapistDashboard { recent_sessions: recent?, patients: patients? })
}

fn branch_or_empty<T>(branch: &str, res: AppResult<Vec<T>>) -> Vec<T> {
    match res {
        Ok(v) => v,
        Err(e) => {
            warn!(target: "dashboard", "{} branch failed, rendering empty: {}", branch, e);
            Vec::new()
        }
    }
}

/// Patient dashboard: profile first (a miss aborts with `NotFound`), then
/// three concurrent branches: distinct therapists, upcoming sessions, and
/// the goals/exercises fan-out.
pub async fn patient_dashboard(store: &dyn Store, patient_id: Uuid) -> AppResult<PatientDashboard> {
    let Some(profile) = store.patient_profile(patient_id).await? else {
        return Err(AppError::not_found("patient_missing", "patient profile not found"));
    };
    let today = Utc::now().date_naive();

    let therapists = async {
        let sessions = store.sessions_for_patient(patient_id).await?;
        let ids = distinct_ids(sessions.into_iter().map(|s| s.therapist_id));
        store.therapists_by_ids(&ids).await
    };
    let upcoming = store.upcoming_sessions_for_patient(patient_id, today);
    let care_plan = async {
        let sessions = store.sessions_for_patient(patient_id).await?;
        let session_ids: Vec<Uuid> = sessions.iter().map(|s| s.id).collect();
        let goals = store.goals_for_sessions(&session_ids).await?;
        // Active goals only.
        let goals: Vec<Goal> = goals
            .into_iter()
            .filter(|g| !g.status.trim().eq_ignore_ascii_case("completed"))
            .collect();
        let goal_ids: Vec<Uuid> = goals.iter().map(|g| g.id).collect();
        let sets = store.exercise_sets_for_goals(&goal_ids).await?;
        let exercise_ids = distinct_ids(sets.iter().map(|r| r.exercise_id));
        let exercises = store.exercises_by_ids(&exercise_ids).await?;
        let assigned = sets
            .into_iter()
            .filter_map(|set| {
                let exercise = exercises.iter().find(|e| e.id == set.exercise_id)?.clone();
                Some(AssignedExercise {
                    goal_id: set.goal_id,
                    exercise,
                    completed: set.completed,
                    completed_at: set.completed_at,
                    notes: set.notes,
                })
            })
            .collect::<Vec<_>>();
        Ok::<_, AppError>((goals, assigned))
    };

    let (therapists, upcoming, care_plan) = tokio::join!(therapists, upcoming, care_plan);
    let (goals, exercises) = match care_plan {
        Ok(pair) => pair,
        Err(e) => {
            warn!(target: "dashboard", "care-plan branch failed, rendering empty: {}", e);
            (Vec::new(), Vec::new())
        }
    };
    Ok(PatientDashboard {
        profile,
        therapists: branch_or_empty("therapists", therapists),
        upcoming_sessions: branch_or_empty("upcoming-sessions", upcoming),
        goals,
        exercises,
    })
}
