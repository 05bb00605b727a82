//! # Token Issuer
//!
//! Issues voice access tokens to browser clients and records the caller and
//! lead metadata supplied with the request in the connection context store.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};

use crate::context::ConnectionContextStore;
use crate::models::{ConnectionContext, LeadDetails};
use crate::phone::normalize_phone_number;
use crate::twilio::AccessTokenBuilder;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Phone number is required")]
    MissingPhoneNumber,

    #[error("failed to sign access token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Token request parameters, taken from the query string.
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct TokenRequest {
    /// Target phone number in any common format
    pub phone_number: Option<String>,
    pub lead_name: Option<String>,
    pub lead_id: Option<String>,
    pub company: Option<String>,
    pub designation: Option<String>,
    pub email: Option<String>,
    pub user_id: Option<String>,
}

/// Issued token response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub identity: String,
    /// Canonical form of the requested phone number
    pub phone_number: String,
    pub account_sid: String,
}

#[derive(Clone)]
pub struct TokenIssuer {
    builder: AccessTokenBuilder,
    account_sid: String,
    contexts: ConnectionContextStore,
}

impl TokenIssuer {
    pub fn new(
        builder: AccessTokenBuilder,
        account_sid: String,
        contexts: ConnectionContextStore,
    ) -> Self {
        Self {
            builder,
            account_sid,
            contexts,
        }
    }

    /// Issue a token for a new identity and register its connection context.
    #[instrument(skip_all)]
    pub async fn issue(&self, request: TokenRequest) -> Result<IssuedToken, TokenError> {
        let raw_phone = request
            .phone_number
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(TokenError::MissingPhoneNumber)?;

        let phone_number = normalize_phone_number(raw_phone);
        let identity = generate_identity();
        let token = self.builder.sign(&identity, Utc::now())?;

        let lead = LeadDetails::from_optional(
            request.lead_name,
            request.lead_id,
            request.company,
            request.designation,
            request.email,
            request.user_id,
        );
        let context = ConnectionContext::new(identity.clone(), phone_number.clone(), lead);
        self.contexts.put(identity.clone(), context).await;

        metrics::counter!("dialer_tokens_issued_total").increment(1);
        info!(identity = %identity, phone_number = %phone_number, "Issued access token");

        Ok(IssuedToken {
            token,
            identity,
            phone_number,
            account_sid: self.account_sid.clone(),
        })
    }
}

/// `user_<unix millis>_<0..1000>`
fn generate_identity() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1000);
    format!("user_{}_{}", Utc::now().timestamp_millis(), suffix)
}
