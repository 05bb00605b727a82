//! # Call Document Handlers
//!
//! TwiML endpoints the provider requests while setting up a call.

use axum::{
    Form,
    extract::{Query, State, rejection::FormRejection},
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::models::IdentityQuery;
use crate::server::AppState;

/// Voice request posted by the provider when a client places a call
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct VoiceForm {
    /// Target number as dialed by the client
    pub to: Option<String>,
    /// Calling client, usually `client:<identity>`
    pub from: Option<String>,
}

fn twiml(xml: String) -> Response {
    ([(CONTENT_TYPE, "text/xml")], xml).into_response()
}

/// Call document bridging the calling client to the target number
#[utoipa::path(
    post,
    path = "/voice",
    request_body(content = VoiceForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "TwiML call document", body = String, content_type = "text/xml")
    ),
    tag = "twiml"
)]
pub async fn voice(
    State(state): State<AppState>,
    form: Result<Form<VoiceForm>, FormRejection>,
) -> Response {
    // The provider must always receive a document, even for an unreadable body.
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            warn!(error = %rejection, "Unreadable voice request body");
            VoiceForm::default()
        }
    };
    let xml = state
        .dialer
        .voice_document(form.to.as_deref(), form.from.as_deref())
        .await;
    twiml(xml)
}

/// Spoken acknowledgment document
#[utoipa::path(
    get,
    path = "/twiml/connect",
    params(IdentityQuery),
    responses(
        (status = 200, description = "TwiML acknowledgment", body = String, content_type = "text/xml")
    ),
    tag = "twiml"
)]
pub async fn connect(State(state): State<AppState>, Query(query): Query<IdentityQuery>) -> Response {
    let identity = query.into_identity();
    twiml(state.dialer.connect_document(identity.as_deref()))
}
