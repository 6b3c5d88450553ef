//! In-memory store backing the mock backend and the test suite. Plain maps
//! behind parking_lot locks; no ordering guarantees beyond what the trait
//! promises. Seeds a small demo dataset on request, mirroring the demo
//! accounts the old in-memory backend shipped with.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::{
    Exercise, Goal, GoalExerciseSet, ParentCarerProfile, PatientProfile, Role, SessionExercise,
    TherapySession, TherapistProfile,
};

use super::{DirectoryEntry, SessionWithPatient, Store};

#[derive(Default)]
pub struct MockStore {
    therapists: RwLock<HashMap<Uuid, TherapistProfile>>,
    patients: RwLock<HashMap<Uuid, PatientProfile>>,
    parents: RwLock<HashMap<Uuid, ParentCarerProfile>>,
    sessions: RwLock<HashMap<Uuid, TherapySession>>,
    goals: RwLock<HashMap<Uuid, Goal>>,
    exercises: RwLock<HashMap<Uuid, Exercise>>,
    session_exercises: RwLock<Vec<SessionExercise>>,
    goal_sets: RwLock<Vec<GoalExerciseSet>>,
    /// Method names that fail once with a store error. Lets tests exercise
    /// the dashboard's degraded-branch paths.
    fail_once: RwLock<HashSet<String>>,
}

/// Ids of the seeded demo rows, so the server can register the matching
/// demo credentials with the local identity provider.
#[derive(Debug, Clone)]
pub struct DemoSeed {
    pub therapist_id: Uuid,
    pub therapist_account: (String, String, Uuid),
    pub patient_id: Uuid,
    pub patient_account: (String, String, Uuid),
    pub parent_id: Uuid,
    pub parent_account: (String, String, Uuid),
    pub session_id: Uuid,
    pub exercise_id: Uuid,
}

impl MockStore {
    pub fn new() -> Self { Self::default() }

    pub fn fail_next(&self, method: &str) {
        self.fail_once.write().insert(method.to_string());
    }

    fn check_fault(&self, method: &str) -> AppResult<()> {
        if self.fail_once.write().remove(method) {
            return Err(AppError::store("injected_fault", format!("{} failed", method)));
        }
        Ok(())
    }

    /// Demo dataset: one therapist, one linked patient with a session, a goal
    /// and an assigned exercise, and one parent/carer.
    pub fn seed_demo(&self) -> DemoSeed {
        let therapist_account_id = Uuid::new_v4();
        let patient_account_id = Uuid::new_v4();
        let parent_account_id = Uuid::new_v4();
        let therapist_id = Uuid::new_v4();
        let patient_id = Uuid::new_v4();
        let parent_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let goal_id = Uuid::new_v4();
        let exercise_id = Uuid::new_v4();

        self.therapists.write().insert(therapist_id, TherapistProfile {
            id: therapist_id,
            account_id: Some(therapist_account_id),
            username: "demo.therapist".into(),
            email: "therapist@ownurvoice.demo".into(),
            first_name: "Sarah".into(),
            last_name: "Mills".into(),
            clinic_name: Some("City Speech Clinic".into()),
            years_experience: Some(8),
        });
        self.patients.write().insert(patient_id, PatientProfile {
            id: patient_id,
            account_id: Some(patient_account_id),
            username: Some("demo.patient".into()),
            email: "patient@ownurvoice.demo".into(),
            first_name: "Alex".into(),
            last_name: "Reid".into(),
            date_of_birth: NaiveDate::from_ymd_opt(2014, 5, 2),
            therapy_start_date: NaiveDate::from_ymd_opt(2024, 9, 1),
            preferred_contact_method: Some("email".into()),
        });
        self.parents.write().insert(parent_id, ParentCarerProfile {
            id: parent_id,
            account_id: Some(parent_account_id),
            username: "demo.parent".into(),
            email: "parent@ownurvoice.demo".into(),
            first_name: "Jo".into(),
            last_name: "Reid".into(),
            relationship_to_patient: Some("mother".into()),
            patient_email: Some("patient@ownurvoice.demo".into()),
        });

        let tomorrow = Utc::now().date_naive() + Duration::days(1);
        self.sessions.write().insert(session_id, TherapySession {
            id: session_id,
            patient_id,
            therapist_id,
            date: tomorrow,
            time: "10:00".into(),
            session_type: "articulation".into(),
            status: "scheduled".into(),
            location: Some("Room 2".into()),
            notes: None,
        });
        self.goals.write().insert(goal_id, Goal {
            id: goal_id,
            session_id,
            description: "Produce /r/ in word-initial position".into(),
            start_date: Some(tomorrow),
            target_date: Some(tomorrow + Duration::days(60)),
            status: "active".into(),
            priority: "high".into(),
        });
        self.exercises.write().insert(exercise_id, Exercise {
            id: exercise_id,
            therapist_id,
            title: "Mirror practice: rabbit, road, ring".into(),
            description: Some("Five minutes in front of a mirror, slow and exaggerated".into()),
            difficulty: Some("easy".into()),
            frequency: Some("daily".into()),
        });
        self.session_exercises.write().push(SessionExercise {
            id: Uuid::new_v4(),
            session_id,
            exercise_id,
            completed: false,
            completed_at: None,
            notes: None,
        });
        self.goal_sets.write().push(GoalExerciseSet {
            id: Uuid::new_v4(),
            goal_id,
            exercise_id,
            completed: false,
            completed_at: None,
            notes: None,
        });

        DemoSeed {
            therapist_id,
            therapist_account: ("therapist@ownurvoice.demo".into(), "Therapy1".into(), therapist_account_id),
            patient_id,
            patient_account: ("patient@ownurvoice.demo".into(), "Patient1".into(), patient_account_id),
            parent_id,
            parent_account: ("parent@ownurvoice.demo".into(), "Parent01".into(), parent_account_id),
            session_id,
            exercise_id,
        }
    }
}

fn eq_ci(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

#[async_trait]
impl Store for MockStore {
    async fn resolve_login(&self, ident: &str) -> AppResult<Option<DirectoryEntry>> {
        self.check_fault("resolve_login")?;
        // Fixed precedence: therapist, then patient, then parent/carer.
        for t in self.therapists.read().values() {
            if eq_ci(&t.username, ident) || eq_ci(&t.email, ident) {
                return Ok(Some(DirectoryEntry {
                    role: Role::Therapist,
                    profile_id: t.id,
                    account_id: t.account_id,
                    email: t.email.clone(),
                    username: Some(t.username.clone()),
                }));
            }
        }
        for p in self.patients.read().values() {
            let by_username = p.username.as_deref().map(|u| eq_ci(u, ident)).unwrap_or(false);
            if by_username || eq_ci(&p.email, ident) {
                return Ok(Some(DirectoryEntry {
                    role: Role::Patient,
                    profile_id: p.id,
                    account_id: p.account_id,
                    email: p.email.clone(),
                    username: p.username.clone(),
                }));
            }
        }
        for c in self.parents.read().values() {
            if eq_ci(&c.username, ident) || eq_ci(&c.email, ident) {
                return Ok(Some(DirectoryEntry {
                    role: Role::ParentCarer,
                    profile_id: c.id,
                    account_id: c.account_id,
                    email: c.email.clone(),
                    username: Some(c.username.clone()),
                }));
            }
        }
        Ok(None)
    }

    async fn insert_therapist(&self, profile: TherapistProfile) -> AppResult<TherapistProfile> {
        self.check_fault("insert_therapist")?;
        self.therapists.write().insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn insert_patient(&self, profile: PatientProfile) -> AppResult<PatientProfile> {
        self.check_fault("insert_patient")?;
        self.patients.write().insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn insert_parent_carer(&self, profile: ParentCarerProfile) -> AppResult<ParentCarerProfile> {
        self.check_fault("insert_parent_carer")?;
        self.parents.write().insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn find_unlinked_patient_by_email(
        &self,
        email: &str,
        exclude_id: Option<Uuid>,
    ) -> AppResult<Option<PatientProfile>> {
        self.check_fault("find_unlinked_patient_by_email")?;
        let out = self
            .patients
            .read()
            .values()
            .find(|p| p.account_id.is_none() && eq_ci(&p.email, email) && Some(p.id) != exclude_id)
            .cloned();
        Ok(out)
    }

    async fn link_patient_account(&self, patient_id: Uuid, account_id: Uuid) -> AppResult<()> {
        self.check_fault("link_patient_account")?;
        let mut map = self.patients.write();
        let Some(p) = map.get_mut(&patient_id) else {
            return Err(AppError::store("patient_missing", "no patient row to link"));
        };
        p.account_id = Some(account_id);
        Ok(())
    }

    async fn patient_profile(&self, patient_id: Uuid) -> AppResult<Option<PatientProfile>> {
        self.check_fault("patient_profile")?;
        Ok(self.patients.read().get(&patient_id).cloned())
    }

    async fn therapist_profile(&self, therapist_id: Uuid) -> AppResult<Option<TherapistProfile>> {
        self.check_fault("therapist_profile")?;
        Ok(self.therapists.read().get(&therapist_id).cloned())
    }

    async fn insert_session(&self, session: TherapySession) -> AppResult<TherapySession> {
        self.check_fault("insert_session")?;
        self.sessions.write().insert(session.id, session.clone());
        Ok(session)
    }

    async fn insert_goal(&self, goal: Goal) -> AppResult<Goal> {
        self.check_fault("insert_goal")?;
        self.goals.write().insert(goal.id, goal.clone());
        Ok(goal)
    }

    async fn insert_exercise(&self, exercise: Exercise) -> AppResult<Exercise> {
        self.check_fault("insert_exercise")?;
        self.exercises.write().insert(exercise.id, exercise.clone());
        Ok(exercise)
    }

    async fn assign_exercise_to_session(&self, row: SessionExercise) -> AppResult<SessionExercise> {
        self.check_fault("assign_exercise_to_session")?;
        self.session_exercises.write().push(row.clone());
        Ok(row)
    }

    async fn assign_exercise_to_goal(&self, row: GoalExerciseSet) -> AppResult<GoalExerciseSet> {
        self.check_fault("assign_exercise_to_goal")?;
        self.goal_sets.write().push(row.clone());
        Ok(row)
    }

    async fn recent_sessions_for_therapist(
        &self,
        therapist_id: Uuid,
        limit: usize,
    ) -> AppResult<Vec<SessionWithPatient>> {
        self.check_fault("recent_sessions_for_therapist")?;
        let mut rows: Vec<TherapySession> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.therapist_id == therapist_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.date, &b.time).cmp(&(a.date, &a.time)));
        rows.truncate(limit);
        let patients = self.patients.read();
        let joined = rows
            .into_iter()
            .filter_map(|s| {
                let p = patients.get(&s.patient_id)?;
                Some(SessionWithPatient {
                    patient_first_name: p.first_name.clone(),
                    patient_last_name: p.last_name.clone(),
                    patient_email: p.email.clone(),
                    session: s,
                })
            })
            .collect();
        Ok(joined)
    }

    async fn sessions_for_therapist(&self, therapist_id: Uuid) -> AppResult<Vec<TherapySession>> {
        self.check_fault("sessions_for_therapist")?;
        Ok(self
            .sessions
            .read()
            .values()
            .filter(|s| s.therapist_id == therapist_id)
            .cloned()
            .collect())
    }

    async fn sessions_for_patient(&self, patient_id: Uuid) -> AppResult<Vec<TherapySession>> {
        self.check_fault("sessions_for_patient")?;
        Ok(self
            .sessions
            .read()
            .values()
            .filter(|s| s.patient_id == patient_id)
            .cloned()
            .collect())
    }

    async fn upcoming_sessions_for_patient(
        &self,
        patient_id: Uuid,
        from: NaiveDate,
    ) -> AppResult<Vec<TherapySession>> {
        self.check_fault("upcoming_sessions_for_patient")?;
        let mut rows: Vec<TherapySession> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.patient_id == patient_id && s.date >= from)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.date, &a.time).cmp(&(b.date, &b.time)));
        Ok(rows)
    }

    async fn patients_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<PatientProfile>> {
        self.check_fault("patients_by_ids")?;
        let map = self.patients.read();
        Ok(ids.iter().filter_map(|id| map.get(id).cloned()).collect())
    }

    async fn therapists_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<TherapistProfile>> {
        self.check_fault("therapists_by_ids")?;
        let map = self.therapists.read();
        Ok(ids.iter().filter_map(|id| map.get(id).cloned()).collect())
    }

    async fn goals_for_sessions(&self, session_ids: &[Uuid]) -> AppResult<Vec<Goal>> {
        self.check_fault("goals_for_sessions")?;
        let wanted: std::collections::HashSet<Uuid> = session_ids.iter().copied().collect();
        Ok(self
            .goals
            .read()
            .values()
            .filter(|g| wanted.contains(&g.session_id))
            .cloned()
            .collect())
    }

    async fn exercise_sets_for_goals(&self, goal_ids: &[Uuid]) -> AppResult<Vec<GoalExerciseSet>> {
        self.check_fault("exercise_sets_for_goals")?;
        let wanted: std::collections::HashSet<Uuid> = goal_ids.iter().copied().collect();
        Ok(self
            .goal_sets
            .read()
            .iter()
            .filter(|r| wanted.contains(&r.goal_id))
            .cloned()
            .collect())
    }

    async fn exercises_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<Exercise>> {
        self.check_fault("exercises_by_ids")?;
        let map = self.exercises.read();
        Ok(ids.iter().filter_map(|id| map.get(id).cloned()).collect())
    }

    async fn complete_session_exercise(
        &self,
        session_id: Uuid,
        exercise_id: Uuid,
        when: DateTime<Utc>,
    ) -> AppResult<Option<SessionExercise>> {
        self.check_fault("complete_session_exercise")?;
        let mut rows = self.session_exercises.write();
        for row in rows.iter_mut() {
            if row.session_id == session_id && row.exercise_id == exercise_id {
                row.completed = true;
                row.completed_at = Some(when);
                return Ok(Some(row.clone()));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_login_precedence_is_therapist_first() {
        let store = MockStore::new();
        // Same username in the therapist and patient tables.
        store
            .insert_therapist(TherapistProfile {
                id: Uuid::new_v4(),
                account_id: None,
                username: "sam".into(),
                email: "sam-t@example.com".into(),
                first_name: "Sam".into(),
                last_name: "T".into(),
                clinic_name: None,
                years_experience: None,
            })
            .await
            .unwrap();
        store
            .insert_patient(PatientProfile {
                id: Uuid::new_v4(),
                account_id: None,
                username: Some("sam".into()),
                email: "sam-p@example.com".into(),
                first_name: "Sam".into(),
                last_name: "P".into(),
                date_of_birth: None,
                therapy_start_date: None,
                preferred_contact_method: None,
            })
            .await
            .unwrap();
        let hit = store.resolve_login("SAM").await.unwrap().unwrap();
        assert_eq!(hit.role, Role::Therapist);
        assert_eq!(hit.email, "sam-t@example.com");
    }

    #[tokio::test]
    async fn resolve_login_ignores_case_for_username_and_email() {
        let store = MockStore::new();
        let seed = store.seed_demo();
        let by_username = store.resolve_login("DEMO.PATIENT").await.unwrap().unwrap();
        assert_eq!(by_username.profile_id, seed.patient_id);
        let by_email = store.resolve_login("  Patient@OwnUrVoice.Demo ").await.unwrap().unwrap();
        assert_eq!(by_email.profile_id, seed.patient_id);
    }

    #[tokio::test]
    async fn complete_session_exercise_is_idempotent_with_latest_timestamp() {
        let store = MockStore::new();
        let seed = store.seed_demo();
        let t1 = Utc::now();
        let first = store
            .complete_session_exercise(seed.session_id, seed.exercise_id, t1)
            .await
            .unwrap()
            .unwrap();
        assert!(first.completed);
        assert_eq!(first.completed_at, Some(t1));

        let t2 = t1 + Duration::seconds(30);
        let second = store
            .complete_session_exercise(seed.session_id, seed.exercise_id, t2)
            .await
            .unwrap()
            .unwrap();
        assert!(second.completed);
        assert_eq!(second.completed_at, Some(t2));
    }

    #[tokio::test]
    async fn complete_session_exercise_missing_row_returns_none() {
        let store = MockStore::new();
        let out = store
            .complete_session_exercise(Uuid::new_v4(), Uuid::new_v4(), Utc::now())
            .await
            .unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn upcoming_filter_excludes_past_sessions() {
        let store = MockStore::new();
        let seed = store.seed_demo();
        let yesterday = Utc::now().date_naive() - Duration::days(1);
        store
            .insert_session(TherapySession {
                id: Uuid::new_v4(),
                patient_id: seed.patient_id,
                therapist_id: seed.therapist_id,
                date: yesterday,
                time: "09:00".into(),
                session_type: "review".into(),
                status: "completed".into(),
                location: None,
                notes: None,
            })
            .await
            .unwrap();
        let today = Utc::now().date_naive();
        let upcoming = store.upcoming_sessions_for_patient(seed.patient_id, today).await.unwrap();
        assert_eq!(upcoming.len(), 1);
        assert!(upcoming[0].date >= today);
    }

    #[tokio::test]
    async fn fault_injection_fails_once_then_recovers() {
        let store = MockStore::new();
        store.fail_next("sessions_for_patient");
        assert!(store.sessions_for_patient(Uuid::new_v4()).await.is_err());
        assert!(store.sessions_for_patient(Uuid::new_v4()).await.is_ok());
    }
}
