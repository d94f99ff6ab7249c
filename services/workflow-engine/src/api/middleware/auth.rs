use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use redress_models::{Complaint, User, UserRole};
use redress_utils::RedressError;

use crate::api::{error::ApiResult, AppState};

/// The authenticated caller, placed in request extensions.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user: User,
}

impl Principal {
    pub fn user_id(&self) -> Uuid {
        self.user.id
    }

    pub fn organization_id(&self) -> Uuid {
        self.user.organization_id
    }

    pub fn is_complainant(&self) -> bool {
        self.user.role == UserRole::Complainant
    }

    pub fn require_super_admin(&self) -> Result<(), RedressError> {
        if self.user.role == UserRole::SuperAdmin {
            Ok(())
        } else {
            Err(RedressError::authorization("SuperAdmin role required"))
        }
    }

    pub fn require_staff(&self) -> Result<(), RedressError> {
        if self.user.role.is_staff() {
            Ok(())
        } else {
            Err(RedressError::authorization("Staff role required"))
        }
    }

    /// Complainants may only touch their own complaints.
    pub fn authorize_complaint(&self, complaint: &Complaint) -> Result<(), RedressError> {
        if self.is_complainant() && complaint.complainant_id != self.user.id {
            return Err(RedressError::authorization("Complaint belongs to another user"));
        }
        Ok(())
    }
}

/// Hex SHA-256 of a bearer token, the form stored on users.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub async fn auth_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> ApiResult<Response> {
    let digest = {
        let header_value = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| RedressError::authentication("Missing authorization header"))?;
        let token = header_value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RedressError::authentication("Invalid authorization header format"))?;
        token_digest(token)
    };

    let user = state
        .services
        .stores
        .directory
        .find_user_by_token_digest(&digest)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| RedressError::authentication("Invalid token"))?;

    tracing::debug!(user_id = %user.id, role = ?user.role, "Request authenticated");
    request.extensions_mut().insert(Principal { user });
    Ok(next.run(request).await)
}
