//! Application flows: registration, login, dashboard reads and care-plan
//! writes. Flows hold all the business rules and talk only to the `Store`
//! and `IdentityProvider` traits, so both backends run the same code path.

mod care;
mod dashboard;
mod login;
mod register;

pub use care::{
    add_new_patient, assign_exercise, complete_exercise, create_exercise, create_goal,
    link_existing_patient, AddPatientRequest, AddPatientResponse, AssignExerciseRequest,
    Assignment, CreateExerciseRequest, CreateGoalRequest, LinkPatientRequest, SessionDetails,
};
pub use dashboard::{
    patient_dashboard, therapist_dashboard, AssignedExercise, PatientDashboard, TherapistDashboard,
};
pub use login::{login, LoginRequest, LoginResponse};
pub use register::{register, RegisterRequest, RegisterResponse};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::Role;

/// Normalized user object returned by register/login for client-side route
/// selection. Role is already parsed (trimmed, lower-cased).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub account_id: Uuid,
    pub profile_id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub redirect: String,
}
