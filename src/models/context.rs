//! # Connection Context Model
//!
//! Caller and lead metadata captured when a client token is issued. The
//! context is keyed by the generated client identity and merged into every
//! relay event that can be correlated back to that identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Optional lead attributes supplied by the client when requesting a token.
///
/// Absent values are stored as empty strings so relay consumers always see
/// the same field set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeadDetails {
    #[serde(default)]
    pub lead_name: String,
    #[serde(default)]
    pub lead_id: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub designation: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub user_id: String,
}

impl LeadDetails {
    /// Build lead details from optional request values, defaulting each to empty.
    pub fn from_optional(
        lead_name: Option<String>,
        lead_id: Option<String>,
        company: Option<String>,
        designation: Option<String>,
        email: Option<String>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            lead_name: lead_name.unwrap_or_default(),
            lead_id: lead_id.unwrap_or_default(),
            company: company.unwrap_or_default(),
            designation: designation.unwrap_or_default(),
            email: email.unwrap_or_default(),
            user_id: user_id.unwrap_or_default(),
        }
    }
}

/// Metadata associated with one outbound call attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionContext {
    /// Generated client identity this context is keyed by
    pub identity: String,
    /// Canonical phone number supplied at token issuance
    pub phone_number: String,
    #[serde(flatten)]
    pub lead: LeadDetails,
    pub created_at: DateTime<Utc>,
}

impl ConnectionContext {
    pub fn new(identity: String, phone_number: String, lead: LeadDetails) -> Self {
        Self {
            identity,
            phone_number,
            lead,
            created_at: Utc::now(),
        }
    }

    /// Context fields as they are spread into relay events.
    pub fn fields(&self) -> ContextFields {
        ContextFields::from(self)
    }
}

/// The part of a [`ConnectionContext`] merged into relay events.
///
/// The identity is carried by the event itself, and the creation time is
/// renamed so it never shadows the payload timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextFields {
    pub phone_number: String,
    #[serde(flatten)]
    pub lead: LeadDetails,
    pub context_created_at: DateTime<Utc>,
}

impl From<&ConnectionContext> for ContextFields {
    fn from(context: &ConnectionContext) -> Self {
        Self {
            phone_number: context.phone_number.clone(),
            lead: context.lead.clone(),
            context_created_at: context.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_lead_values_default_to_empty() {
        let lead = LeadDetails::from_optional(Some("Asha".into()), None, None, None, None, None);
        assert_eq!(lead.lead_name, "Asha");
        assert_eq!(lead.lead_id, "");
        assert_eq!(lead.user_id, "");
    }

    #[test]
    fn context_fields_serialize_flat_and_camel_case() {
        let context = ConnectionContext::new(
            "user_1_2".to_string(),
            "+919876543210".to_string(),
            LeadDetails {
                lead_name: "Asha".to_string(),
                company: "Acme".to_string(),
                ..Default::default()
            },
        );

        let json = serde_json::to_value(context.fields()).unwrap();
        assert_eq!(json["phoneNumber"], "+919876543210");
        assert_eq!(json["leadName"], "Asha");
        assert_eq!(json["company"], "Acme");
        assert_eq!(json["email"], "");
        assert!(json.get("contextCreatedAt").is_some());
        assert!(json.get("identity").is_none());
        assert!(json.get("lead").is_none());
    }
}
