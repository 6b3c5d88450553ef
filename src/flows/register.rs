//! Registration: validate input, create the identity-provider account,
//! insert exactly one role-matched profile row, and for patients attempt the
//! best-effort auto-link against a therapist-pre-created row.

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::identity::{IdentityProvider, Principal, TokenService};
use crate::model::{ParentCarerProfile, PatientProfile, Role, TherapistProfile};
use crate::store::Store;

use super::AuthUser;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub role: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub first_name: String,
    pub last_name: String,
    // Therapist fields
    #[serde(default)]
    pub clinic_name: Option<String>,
    #[serde(default)]
    pub years_experience: Option<i32>,
    // Patient fields
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub therapy_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub preferred_contact_method: Option<String>,
    // Parent/carer fields
    #[serde(default)]
    pub relationship_to_patient: Option<String>,
    #[serde(default)]
    pub patient_email: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RegisterResponse {
    pub token: String,
    pub user: AuthUser,
}

fn require(value: &str, field: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::user("missing_field", format!("{} is required", field)));
    }
    Ok(())
}

fn require_opt(value: &Option<String>, field: &str) -> AppResult<()> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(AppError::user("missing_field", format!("{} is required", field))),
    }
}

fn validate(req: &RegisterRequest) -> AppResult<Role> {
    let role = Role::parse(&req.role)?;
    require(&req.username, "username")?;
    require(&req.email, "email")?;
    require(&req.first_name, "first name")?;
    require(&req.last_name, "last name")?;
    if !req.email.contains('@') {
        return Err(AppError::user("invalid_email", "email address is not valid"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::user(
            "password_too_short",
            format!("password must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    if req.password != req.confirm_password {
        return Err(AppError::user("password_mismatch", "passwords do not match"));
    }
    match role {
        Role::Therapist => require_opt(&req.clinic_name, "clinic name")?,
        Role::ParentCarer => require_opt(&req.relationship_to_patient, "relationship to patient")?,
        Role::Patient => {}
    }
    Ok(role)
}

pub async fn register(
    store: &dyn Store,
    idp: &dyn IdentityProvider,
    tokens: &TokenService,
    req: RegisterRequest,
) -> AppResult<RegisterResponse> {
    let role = validate(&req)?;
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_ascii_lowercase();

    // Uniqueness pre-checks across all three tables, before any identity
    // account exists. A distinguishable conflict here means no orphaned
    // identity account. (A profile insert failing AFTER sign-up still
    // orphans the account; there is no compensating rollback.)
    if store.resolve_login(&username).await?.is_some() {
        return Err(AppError::conflict("username_taken", "username already in use"));
    }
    if let Some(existing) = store.resolve_login(&email).await? {
        // A therapist-pre-created patient row without an account is exactly
        // the auto-link case, not a conflict.
        let auto_link_candidate =
            role == Role::Patient && existing.role == Role::Patient && existing.account_id.is_none();
        if !auto_link_candidate {
            return Err(AppError::conflict("email_taken", "an account with this email already exists"));
        }
    }

    let account = idp.sign_up(&email, &req.password).await?;

    let profile_id = match role {
        Role::Therapist => {
            let row = store
                .insert_therapist(TherapistProfile {
                    id: Uuid::new_v4(),
                    account_id: Some(account.id),
                    username: username.clone(),
                    email: email.clone(),
                    first_name: req.first_name.trim().to_string(),
                    last_name: req.last_name.trim().to_string(),
                    clinic_name: req.clinic_name.clone(),
                    years_experience: req.years_experience,
                })
                .await?;
            row.id
        }
        Role::Patient => {
            let row = store
                .insert_patient(PatientProfile {
                    id: Uuid::new_v4(),
                    account_id: Some(account.id),
                    username: Some(username.clone()),
                    email: email.clone(),
                    first_name: req.first_name.trim().to_string(),
                    last_name: req.last_name.trim().to_string(),
                    date_of_birth: req.date_of_birth,
                    therapy_start_date: req.therapy_start_date,
                    preferred_contact_method: req.preferred_contact_method.clone(),
                })
                .await?;
            // Best-effort auto-link: a pre-existing unlinked row with this
            // email gets the new account id. Failure never fails registration.
            match store.find_unlinked_patient_by_email(&email, Some(row.id)).await {
                Ok(Some(pre)) => {
                    if let Err(e) = store.link_patient_account(pre.id, account.id).await {
                        warn!(target: "register", "auto-link update failed for {}: {}", pre.id, e);
                    } else {
                        info!(target: "register", "auto-linked patient row {} to account {}", pre.id, account.id);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(target: "register", "auto-link lookup failed: {}", e),
            }
            row.id
        }
        Role::ParentCarer => {
            let row = store
                .insert_parent_carer(ParentCarerProfile {
                    id: Uuid::new_v4(),
                    account_id: Some(account.id),
                    username: username.clone(),
                    email: email.clone(),
                    first_name: req.first_name.trim().to_string(),
                    last_name: req.last_name.trim().to_string(),
                    relationship_to_patient: req.relationship_to_patient.clone(),
                    patient_email: req.patient_email.clone(),
                })
                .await?;
            row.id
        }
    };

    info!(target: "register", "registered {} as {} profile={}", username, role.as_str(), profile_id);

    let principal = Principal {
        account_id: account.id,
        email: email.clone(),
        username: username.clone(),
        role,
    };
    let token = tokens.issue(&principal)?;
    Ok(RegisterResponse {
        token,
        user: AuthUser {
            account_id: account.id,
            profile_id,
            username,
            email,
            role,
            redirect: role.dashboard_path().to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_req() -> RegisterRequest {
        RegisterRequest {
            role: "patient".into(),
            username: "Will".into(),
            email: "will@example.com".into(),
            password: "WD1234".into(),
            confirm_password: "WD1234".into(),
            first_name: "Will".into(),
            last_name: "Davies".into(),
            clinic_name: None,
            years_experience: None,
            date_of_birth: None,
            therapy_start_date: None,
            preferred_contact_method: None,
            relationship_to_patient: None,
            patient_email: None,
        }
    }

    #[test]
    fn validate_accepts_minimal_patient() {
        assert_eq!(validate(&base_req()).unwrap(), Role::Patient);
    }

    #[test]
    fn validate_rejects_short_password() {
        let mut req = base_req();
        req.password = "WD123".into();
        req.confirm_password = "WD123".into();
        let err = validate(&req).unwrap_err();
        assert_eq!(err.code_str(), "password_too_short");
    }

    #[test]
    fn validate_rejects_password_mismatch() {
        let mut req = base_req();
        req.confirm_password = "WD1235".into();
        assert_eq!(validate(&req).unwrap_err().code_str(), "password_mismatch");
    }

    #[test]
    fn validate_requires_therapist_clinic() {
        let mut req = base_req();
        req.role = "therapist".into();
        assert_eq!(validate(&req).unwrap_err().code_str(), "missing_field");
        req.clinic_name = Some("City Speech Clinic".into());
        assert_eq!(validate(&req).unwrap(), Role::Therapist);
    }

    #[test]
    fn validate_requires_carer_relationship() {
        let mut req = base_req();
        req.role = "parent_carer".into();
        assert_eq!(validate(&req).unwrap_err().code_str(), "missing_field");
        req.relationship_to_patient = Some("father".into());
        assert_eq!(validate(&req).unwrap(), Role::ParentCarer);
    }
}
