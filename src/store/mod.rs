//! Storage abstraction over the role-partitioned profile tables and the
//! session/goal/exercise tables. One trait, two backends: an in-memory mock
//! with seeded demo rows and an adapter for the hosted relational API.
//! Flows talk to `dyn Store` only; backend selection happens at startup.

mod hosted;
mod mock;

pub use hosted::HostedStore;
pub use mock::MockStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::model::{
    Exercise, Goal, GoalExerciseSet, ParentCarerProfile, PatientProfile, Role, SessionExercise,
    TherapySession, TherapistProfile,
};

/// Result of the unified username-or-email lookup across the three profile
/// tables. Precedence on a cross-table username collision is fixed:
/// therapist, then patient, then parent/carer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub role: Role,
    pub profile_id: Uuid,
    pub account_id: Option<Uuid>,
    pub email: String,
    pub username: Option<String>,
}

/// Session row joined with the patient summary fields the therapist
/// dashboard shows next to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionWithPatient {
    #[serde(flatten)]
    pub session: TherapySession,
    pub patient_first_name: String,
    pub patient_last_name: String,
    pub patient_email: String,
}

#[async_trait]
pub trait Store: Send + Sync {
    // --- directory / profiles ---

    /// Unified lookup by username or email across therapist, patient and
    /// parent_carer, in that order. First match wins. Matching ignores case
    /// and surrounding whitespace; both backends honor this the same way.
    async fn resolve_login(&self, ident: &str) -> AppResult<Option<DirectoryEntry>>;

    async fn insert_therapist(&self, profile: TherapistProfile) -> AppResult<TherapistProfile>;
    async fn insert_patient(&self, profile: PatientProfile) -> AppResult<PatientProfile>;
    async fn insert_parent_carer(&self, profile: ParentCarerProfile) -> AppResult<ParentCarerProfile>;

    /// Patient row with this email (compared case-insensitively) and no
    /// account id yet (auto-link candidate). Rows the registering insert just
    /// created are excluded by the caller passing the new row's id.
    async fn find_unlinked_patient_by_email(
        &self,
        email: &str,
        exclude_id: Option<Uuid>,
    ) -> AppResult<Option<PatientProfile>>;

    /// The only profile update: attach an account id to a patient row.
    async fn link_patient_account(&self, patient_id: Uuid, account_id: Uuid) -> AppResult<()>;

    async fn patient_profile(&self, patient_id: Uuid) -> AppResult<Option<PatientProfile>>;
    async fn therapist_profile(&self, therapist_id: Uuid) -> AppResult<Option<TherapistProfile>>;

    // --- sessions / care plan ---

    async fn insert_session(&self, session: TherapySession) -> AppResult<TherapySession>;
    async fn insert_goal(&self, goal: Goal) -> AppResult<Goal>;
    async fn insert_exercise(&self, exercise: Exercise) -> AppResult<Exercise>;
    async fn assign_exercise_to_session(&self, row: SessionExercise) -> AppResult<SessionExercise>;
    async fn assign_exercise_to_goal(&self, row: GoalExerciseSet) -> AppResult<GoalExerciseSet>;

    /// Most recent sessions first, patient summary joined, capped at `limit`.
    async fn recent_sessions_for_therapist(
        &self,
        therapist_id: Uuid,
        limit: usize,
    ) -> AppResult<Vec<SessionWithPatient>>;

    async fn sessions_for_therapist(&self, therapist_id: Uuid) -> AppResult<Vec<TherapySession>>;
    async fn sessions_for_patient(&self, patient_id: Uuid) -> AppResult<Vec<TherapySession>>;

    /// Sessions for the patient with date >= `from`, soonest first.
    async fn upcoming_sessions_for_patient(
        &self,
        patient_id: Uuid,
        from: NaiveDate,
    ) -> AppResult<Vec<TherapySession>>;

    /// Bulk-fetch legs of the dashboard fan-outs.
    async fn patients_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<PatientProfile>>;
    async fn therapists_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<TherapistProfile>>;

    async fn goals_for_sessions(&self, session_ids: &[Uuid]) -> AppResult<Vec<Goal>>;
    async fn exercise_sets_for_goals(&self, goal_ids: &[Uuid]) -> AppResult<Vec<GoalExerciseSet>>;
    async fn exercises_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<Exercise>>;

    /// Mark the session/exercise join row complete at `when`. Idempotent: a
    /// repeat call overwrites the timestamp. `None` when no join row exists.
    async fn complete_session_exercise(
        &self,
        session_id: Uuid,
        exercise_id: Uuid,
        when: DateTime<Utc>,
    ) -> AppResult<Option<SessionExercise>>;
}

/// Distinct ids in first-seen order. Shared by the fan-out reads.
pub fn distinct_ids(ids: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for id in ids {
        if seen.insert(id) {
            out.push(id);
        }
    }
    out
}
