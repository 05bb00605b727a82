//! # Token Handler

use axum::{
    extract::{Query, State},
    response::Json,
};

use crate::error::ApiError;
use crate::server::AppState;
use crate::token_issuer::{IssuedToken, TokenRequest};

/// Issue a voice access token bound to a fresh client identity
#[utoipa::path(
    get,
    path = "/token",
    params(TokenRequest),
    responses(
        (status = 200, description = "Access token issued", body = IssuedToken, example = json!({
            "token": "eyJhbGciOiJIUzI1NiIsImN0eSI6InR3aWxpby1mcGE7dj0xIn0...",
            "identity": "user_1718000000000_42",
            "phoneNumber": "+919876543210",
            "accountSid": "AC00000000000000000000000000000000"
        })),
        (status = 400, description = "Phone number missing", body = ApiError),
        (status = 500, description = "Token signing failed", body = ApiError)
    ),
    tag = "token"
)]
pub async fn issue_token(
    State(state): State<AppState>,
    Query(request): Query<TokenRequest>,
) -> Result<Json<IssuedToken>, ApiError> {
    let issued = state.dialer.issue_token(request).await?;
    Ok(Json(issued))
}
