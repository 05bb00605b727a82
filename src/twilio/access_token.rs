//! Voice access tokens
//!
//! Twilio access tokens are HS256 JWTs signed with an API key secret and
//! carrying a `grants` claim. The `cty` header marks the token format version.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};

const CONTENT_TYPE: &str = "twilio-fpa;v=1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingGrant {
    pub application_sid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingGrant {
    pub allow: bool,
}

/// Permission to place calls through the outgoing application and to receive calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceGrant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outgoing: Option<OutgoingGrant>,
    pub incoming: IncomingGrant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grants {
    pub identity: String,
    pub voice: VoiceGrant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub jti: String,
    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub grants: Grants,
}

/// Signs voice access tokens for one account and API key.
#[derive(Clone)]
pub struct AccessTokenBuilder {
    account_sid: String,
    api_key: String,
    encoding_key: EncodingKey,
    header: Header,
    application_sid: Option<String>,
    ttl: Duration,
}

impl AccessTokenBuilder {
    pub fn new(account_sid: String, api_key: String, api_secret: &str, ttl: Duration) -> Self {
        let mut header = Header::new(Algorithm::HS256);
        header.cty = Some(CONTENT_TYPE.to_string());

        Self {
            account_sid,
            api_key,
            encoding_key: EncodingKey::from_secret(api_secret.as_bytes()),
            header,
            application_sid: None,
            ttl,
        }
    }

    /// Grant outgoing calls through the given application.
    pub fn with_application_sid(mut self, application_sid: Option<String>) -> Self {
        self.application_sid = application_sid;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Claims for a token issued to `identity` at `issued_at`.
    pub fn claims(&self, identity: &str, issued_at: DateTime<Utc>) -> AccessTokenClaims {
        let iat = issued_at.timestamp();
        AccessTokenClaims {
            jti: format!("{}-{}", self.api_key, iat),
            iss: self.api_key.clone(),
            sub: self.account_sid.clone(),
            iat,
            nbf: iat,
            exp: iat + self.ttl.as_secs() as i64,
            grants: Grants {
                identity: identity.to_string(),
                voice: VoiceGrant {
                    outgoing: self.application_sid.clone().map(|application_sid| OutgoingGrant {
                        application_sid,
                    }),
                    incoming: IncomingGrant { allow: true },
                },
            },
        }
    }

    /// Sign a token for `identity`.
    pub fn sign(
        &self,
        identity: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&self.header, &self.claims(identity, issued_at), &self.encoding_key)
    }
}
