//! Domain entities as stored in the role-partitioned profile tables and the
//! session/goal/exercise tables. Field sets mirror the hosted store's columns
//! so the hosted adapter can (de)serialize rows directly.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Role discriminator shared by the three profile tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Therapist,
    Patient,
    ParentCarer,
}

impl Role {
    /// Parse a loose role string from a form or token claim. Trims and
    /// lower-cases before matching; accepts the aliases the UI has sent
    /// historically ("parent", "carer", "parent/carer").
    pub fn parse(raw: &str) -> AppResult<Role> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "therapist" => Ok(Role::Therapist),
            "patient" => Ok(Role::Patient),
            "parent_carer" | "parent/carer" | "parent" | "carer" => Ok(Role::ParentCarer),
            other => Err(AppError::user("invalid_role", format!("unknown role: {}", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Therapist => "therapist",
            Role::Patient => "patient",
            Role::ParentCarer => "parent_carer",
        }
    }

    /// Table name holding this role's profile rows.
    pub fn table(&self) -> &'static str { self.as_str() }

    /// Client-side route the dashboard redirect points at after login.
    pub fn dashboard_path(&self) -> &'static str {
        match self {
            Role::Therapist => "/therapist-dashboard",
            Role::Patient => "/patient-dashboard",
            Role::ParentCarer => "/parent-dashboard",
        }
    }
}

/// Identity-provider account record. Created at registration, consumed at
/// login, never mutated by this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    /// Provider session token handed back on sign-in; absent after sign-up
    /// with providers that require email confirmation first.
    #[serde(default)]
    pub provider_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TherapistProfile {
    pub id: Uuid,
    pub account_id: Option<Uuid>,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub clinic_name: Option<String>,
    pub years_experience: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientProfile {
    pub id: Uuid,
    /// None for rows a therapist pre-created ahead of the patient signing up;
    /// filled in by the auto-link step at registration.
    pub account_id: Option<Uuid>,
    /// None for pre-created rows; set when the patient registers themselves.
    pub username: Option<String>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub therapy_start_date: Option<NaiveDate>,
    pub preferred_contact_method: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentCarerProfile {
    pub id: Uuid,
    pub account_id: Option<Uuid>,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub relationship_to_patient: Option<String>,
    /// Email of the patient this carer is attached to, when given at signup.
    pub patient_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TherapySession {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub therapist_id: Uuid,
    pub date: NaiveDate,
    pub time: String,
    pub session_type: String,
    pub status: String,
    pub location: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: Uuid,
    pub session_id: Uuid,
    pub description: String,
    pub start_date: Option<NaiveDate>,
    pub target_date: Option<NaiveDate>,
    pub status: String,
    pub priority: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exercise {
    pub id: Uuid,
    pub therapist_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub difficulty: Option<String>,
    pub frequency: Option<String>,
}

/// Join row attaching an exercise to a session, carrying completion state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionExercise {
    pub id: Uuid,
    pub session_id: Uuid,
    pub exercise_id: Uuid,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Join row attaching an exercise to a goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalExerciseSet {
    pub id: Uuid,
    pub goal_id: Uuid,
    pub exercise_id: Uuid,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parse_normalizes_case_and_whitespace() {
        assert_eq!(Role::parse("  Therapist ").unwrap(), Role::Therapist);
        assert_eq!(Role::parse("PATIENT").unwrap(), Role::Patient);
        assert_eq!(Role::parse("parent_carer").unwrap(), Role::ParentCarer);
        assert_eq!(Role::parse("Parent/Carer").unwrap(), Role::ParentCarer);
        assert!(Role::parse("admin").is_err());
    }

    #[test]
    fn role_dashboard_paths() {
        assert_eq!(Role::Therapist.dashboard_path(), "/therapist-dashboard");
        assert_eq!(Role::Patient.dashboard_path(), "/patient-dashboard");
        assert_eq!(Role::ParentCarer.dashboard_path(), "/parent-dashboard");
    }

    #[test]
    fn role_table_names_match_store_schema() {
        assert_eq!(Role::Therapist.table(), "therapist");
        assert_eq!(Role::Patient.table(), "patient");
        assert_eq!(Role::ParentCarer.table(), "parent_carer");
    }
}
