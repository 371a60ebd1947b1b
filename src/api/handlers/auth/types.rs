//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::seed::RemintPolicy;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub principal_id: String,
    pub remember_me: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub principal_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RotateResponse {
    pub principal_id: String,
    /// Unix seconds of the new seed.
    pub rotated_at: i64,
    pub remint_policy: RemintPolicy,
    /// Whether the caller's session survived the rotation.
    pub session_kept: bool,
}
