//! Adapter for the hosted relational API. Tables are reached as
//! `{base}/rest/v1/{table}` with filter/select/insert/update verbs; non-2xx
//! responses surface the body text verbatim as a store error.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::debug;
use urlencoding::encode;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::{
    Exercise, Goal, GoalExerciseSet, ParentCarerProfile, PatientProfile, Role, SessionExercise,
    TherapySession, TherapistProfile,
};

use super::{distinct_ids, DirectoryEntry, SessionWithPatient, Store};

pub struct HostedStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HostedStore {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn table_url(&self, table: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}/rest/v1/{}", self.base_url, table)
        } else {
            format!("{}/rest/v1/{}?{}", self.base_url, table, query)
        }
    }

    fn transport_err(e: reqwest::Error) -> AppError {
        AppError::store("store_unreachable", format!("store unreachable: {}", e))
    }

    async fn check(resp: reqwest::Response, table: &str) -> AppResult<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(AppError::store(
            "store_error",
            format!("{} request failed ({}): {}", table, status.as_u16(), body),
        ))
    }

    /// `GET {table}?{query}` decoded as a row list.
    async fn select<T: DeserializeOwned>(&self, table: &str, query: &str) -> AppResult<Vec<T>> {
        let url = self.table_url(table, query);
        debug!(target: "store", "select {}", url);
        let resp = self
            .http
            .get(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(Self::transport_err)?;
        let resp = Self::check(resp, table).await?;
        resp.json::<Vec<T>>()
            .await
            .map_err(|e| AppError::store("store_bad_body", format!("{} rows undecodable: {}", table, e)))
    }

    /// `POST {table}` returning the stored representation.
    async fn insert<T: Serialize + DeserializeOwned + Clone>(&self, table: &str, row: &T) -> AppResult<T> {
        let url = self.table_url(table, "");
        debug!(target: "store", "insert {}", url);
        let resp = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await
            .map_err(Self::transport_err)?;
        let resp = Self::check(resp, table).await?;
        let mut rows: Vec<T> = resp
            .json()
            .await
            .map_err(|e| AppError::store("store_bad_body", format!("{} insert undecodable: {}", table, e)))?;
        rows.pop()
            .ok_or_else(|| AppError::store("store_bad_body", format!("{} insert returned no row", table)))
    }

    /// `PATCH {table}?{query}` returning the updated rows.
    async fn update<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
        patch: serde_json::Value,
    ) -> AppResult<Vec<T>> {
        let url = self.table_url(table, query);
        debug!(target: "store", "update {}", url);
        let resp = self
            .http
            .patch(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await
            .map_err(Self::transport_err)?;
        let resp = Self::check(resp, table).await?;
        resp.json::<Vec<T>>()
            .await
            .map_err(|e| AppError::store("store_bad_body", format!("{} update undecodable: {}", table, e)))
    }

    fn in_filter(column: &str, ids: &[Uuid]) -> String {
        let list = ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",");
        format!("{}=in.({})", column, encode(&list))
    }

    /// Escape LIKE wildcards so `ilike` matches the value literally.
    fn like_pattern(value: &str) -> String {
        value.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
    }

    /// Case-insensitive username-or-email filter, per the trait contract.
    fn login_filter(ident: &str) -> String {
        let v = encode(&Self::like_pattern(ident)).into_owned();
        format!("or=(username.ilike.{v},email.ilike.{v})&limit=1", v = v)
    }
}

#[async_trait]
impl Store for HostedStore {
    async fn resolve_login(&self, ident: &str) -> AppResult<Option<DirectoryEntry>> {
        let ident = ident.trim();
        let by_either = Self::login_filter(ident);
        // Fixed precedence: therapist, then patient, then parent/carer.
        if let Some(t) = self.select::<TherapistProfile>("therapist", &by_either).await?.pop() {
            return Ok(Some(DirectoryEntry {
                role: Role::Therapist,
                profile_id: t.id,
                account_id: t.account_id,
                email: t.email,
                username: Some(t.username),
            }));
        }
        if let Some(p) = self.select::<PatientProfile>("patient", &by_either).await?.pop() {
            return Ok(Some(DirectoryEntry {
                role: Role::Patient,
                profile_id: p.id,
                account_id: p.account_id,
                email: p.email,
                username: p.username,
            }));
        }
        if let Some(c) = self.select::<ParentCarerProfile>("parent_carer", &by_either).await?.pop() {
            return Ok(Some(DirectoryEntry {
                role: Role::ParentCarer,
                profile_id: c.id,
                account_id: c.account_id,
                email: c.email,
                username: Some(c.username),
            }));
        }
        Ok(None)
    }

    async fn insert_therapist(&self, profile: TherapistProfile) -> AppResult<TherapistProfile> {
        self.insert("therapist", &profile).await
    }

    async fn insert_patient(&self, profile: PatientProfile) -> AppResult<PatientProfile> {
        self.insert("patient", &profile).await
    }

    async fn insert_parent_carer(&self, profile: ParentCarerProfile) -> AppResult<ParentCarerProfile> {
        self.insert("parent_carer", &profile).await
    }

    async fn find_unlinked_patient_by_email(
        &self,
        email: &str,
        exclude_id: Option<Uuid>,
    ) -> AppResult<Option<PatientProfile>> {
        let mut q = format!(
            "email=ilike.{}&account_id=is.null",
            encode(&Self::like_pattern(email.trim()))
        );
        if let Some(id) = exclude_id {
            q.push_str(&format!("&id=neq.{}", id));
        }
        q.push_str("&limit=1");
        Ok(self.select::<PatientProfile>("patient", &q).await?.pop())
    }

    async fn link_patient_account(&self, patient_id: Uuid, account_id: Uuid) -> AppResult<()> {
        let q = format!("id=eq.{}", patient_id);
        let rows: Vec<PatientProfile> = self
            .update("patient", &q, json!({ "account_id": account_id }))
            .await?;
        if rows.is_empty() {
            return Err(AppError::store("patient_missing", "no patient row to link"));
        }
        Ok(())
    }

    async fn patient_profile(&self, patient_id: Uuid) -> AppResult<Option<PatientProfile>> {
        let q = format!("id=eq.{}&limit=1", patient_id);
        Ok(self.select::<PatientProfile>("patient", &q).await?.pop())
    }

    async fn therapist_profile(&self, therapist_id: Uuid) -> AppResult<Option<TherapistProfile>> {
        let q = format!("id=eq.{}&limit=1", therapist_id);
        Ok(self.select::<TherapistProfile>("therapist", &q).await?.pop())
    }

    async fn insert_session(&self, session: TherapySession) -> AppResult<TherapySession> {
        self.insert("session", &session).await
    }

    async fn insert_goal(&self, goal: Goal) -> AppResult<Goal> {
        self.insert("goal", &goal).await
    }

    async fn insert_exercise(&self, exercise: Exercise) -> AppResult<Exercise> {
        self.insert("exercise", &exercise).await
    }

    async fn assign_exercise_to_session(&self, row: SessionExercise) -> AppResult<SessionExercise> {
        self.insert("session_exercise", &row).await
    }

    async fn assign_exercise_to_goal(&self, row: GoalExerciseSet) -> AppResult<GoalExerciseSet> {
        self.insert("goal_exercise_set", &row).await
    }

    async fn recent_sessions_for_therapist(
        &self,
        therapist_id: Uuid,
        limit: usize,
    ) -> AppResult<Vec<SessionWithPatient>> {
        let q = format!(
            "therapist_id=eq.{}&order=date.desc,time.desc&limit={}",
            therapist_id, limit
        );
        let sessions: Vec<TherapySession> = self.select("session", &q).await?;
        if sessions.is_empty() {
            return Ok(Vec::new());
        }
        let patient_ids = distinct_ids(sessions.iter().map(|s| s.patient_id));
        let patients = self.patients_by_ids(&patient_ids).await?;
        let joined = sessions
            .into_iter()
            .filter_map(|s| {
                let p = patients.iter().find(|p| p.id == s.patient_id)?;
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
        let q = format!("therapist_id=eq.{}", therapist_id);
        self.select("session", &q).await
    }

    async fn sessions_for_patient(&self, patient_id: Uuid) -> AppResult<Vec<TherapySession>> {
        let q = format!("patient_id=eq.{}", patient_id);
        self.select("session", &q).await
    }

    async fn upcoming_sessions_for_patient(
        &self,
        patient_id: Uuid,
        from: NaiveDate,
    ) -> AppResult<Vec<TherapySession>> {
        let q = format!(
            "patient_id=eq.{}&date=gte.{}&order=date.asc,time.asc",
            patient_id, from
        );
        self.select("session", &q).await
    }

    async fn patients_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<PatientProfile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select("patient", &Self::in_filter("id", ids)).await
    }

    async fn therapists_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<TherapistProfile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select("therapist", &Self::in_filter("id", ids)).await
    }

    async fn goals_for_sessions(&self, session_ids: &[Uuid]) -> AppResult<Vec<Goal>> {
        if session_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select("goal", &Self::in_filter("session_id", session_ids)).await
    }

    async fn exercise_sets_for_goals(&self, goal_ids: &[Uuid]) -> AppResult<Vec<GoalExerciseSet>> {
        if goal_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select("goal_exercise_set", &Self::in_filter("goal_id", goal_ids)).await
    }

    async fn exercises_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<Exercise>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select("exercise", &Self::in_filter("id", ids)).await
    }

    async fn complete_session_exercise(
        &self,
        session_id: Uuid,
        exercise_id: Uuid,
        when: DateTime<Utc>,
    ) -> AppResult<Option<SessionExercise>> {
        let q = format!("session_id=eq.{}&exercise_id=eq.{}", session_id, exercise_id);
        let mut rows: Vec<SessionExercise> = self
            .update(
                "session_exercise",
                &q,
                json!({ "completed": true, "completed_at": when }),
            )
            .await?;
        Ok(rows.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_urls_compose_with_and_without_query() {
        let s = HostedStore::new("https://db.example.com/", "key");
        assert_eq!(s.table_url("patient", ""), "https://db.example.com/rest/v1/patient");
        assert_eq!(
            s.table_url("session", "patient_id=eq.x"),
            "https://db.example.com/rest/v1/session?patient_id=eq.x"
        );
    }

    #[test]
    fn in_filter_encodes_id_list() {
        let a = Uuid::nil();
        let f = HostedStore::in_filter("id", &[a]);
        assert_eq!(f, format!("id=in.({})", encode(&format!("{}", a))));
    }

    #[test]
    fn login_filter_is_case_insensitive_and_literal() {
        let f = HostedStore::login_filter("Will_D");
        // ilike so "WILL_D" and "will_d" hit the same row, with the
        // underscore escaped so it is not a single-character wildcard.
        assert!(f.contains("username.ilike."));
        assert!(f.contains("email.ilike."));
        assert!(f.contains(&encode("Will\\_D").into_owned()));
        assert!(f.ends_with("&limit=1"));
    }

    #[test]
    fn like_pattern_escapes_all_wildcards() {
        assert_eq!(HostedStore::like_pattern("100%_a\\b"), "100\\%\\_a\\\\b");
    }
}
