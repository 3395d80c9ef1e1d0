//! Caller identity.
//!
//! Authentication happens upstream; the gateway forwards the verified user
//! id in request metadata and the core trusts it as given.

use crate::error::{AppError, AppResult};
use tonic::metadata::MetadataMap;
use uuid::Uuid;

/// Metadata key carrying the authenticated user id
pub const USER_ID_METADATA_KEY: &str = "x-user-id";

/// Extract the authenticated user id from request metadata
pub fn authenticated_user(metadata: &MetadataMap) -> AppResult<Uuid> {
    let raw = metadata
        .get(USER_ID_METADATA_KEY)
        .ok_or_else(|| AppError::AuthenticationRequired("Missing user identity".to_string()))?
        .to_str()
        .map_err(|_| AppError::Validation("User identity is not valid ASCII".to_string()))?;

    if raw.trim().is_empty() {
        return Err(AppError::AuthenticationRequired(
            "Missing user identity".to_string(),
        ));
    }

    Uuid::parse_str(raw.trim())
        .map_err(|e| AppError::Validation(format!("Invalid user identity: {}", e)))
}
