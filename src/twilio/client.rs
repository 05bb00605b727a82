//! Twilio REST client for the Calls resource

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{CallProvider, ProviderError};
use crate::models::CallSnapshot;

const API_VERSION: &str = "2010-04-01";
const USER_AGENT: &str = "Twilio-Call-System/2.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Page of the Calls list resource
#[derive(Debug, Deserialize)]
struct CallPage {
    #[serde(default)]
    calls: Vec<CallSnapshot>,
}

/// Authenticated client for `{api_base}/2010-04-01/Accounts/{sid}/Calls`
#[derive(Clone)]
pub struct TwilioRestClient {
    http: reqwest::Client,
    api_base: Url,
    account_sid: String,
    auth_token: String,
}

impl TwilioRestClient {
    pub fn new(
        api_base: &str,
        account_sid: String,
        auth_token: String,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            api_base: Url::parse(api_base)?,
            account_sid,
            auth_token,
        })
    }

    pub fn account_sid(&self) -> &str {
        &self.account_sid
    }

    fn calls_url(&self, suffix: &str) -> Result<Url, ProviderError> {
        let path = format!(
            "{API_VERSION}/Accounts/{}/Calls{suffix}",
            self.account_sid
        );
        Ok(self.api_base.join(&path)?)
    }

    async fn get_json<T>(&self, url: Url, query: &[(&str, String)]) -> Result<T, ProviderError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .http
            .get(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl CallProvider for TwilioRestClient {
    async fn list_calls(&self, to: &str, limit: u32) -> Result<Vec<CallSnapshot>, ProviderError> {
        let url = self.calls_url(".json")?;
        debug!(to = %to, limit, "Listing provider calls");

        let page: CallPage = self
            .get_json(
                url,
                &[("To", to.to_string()), ("PageSize", limit.to_string())],
            )
            .await?;

        let mut calls = page.calls;
        calls.truncate(limit as usize);
        Ok(calls)
    }

    async fn fetch_call(&self, call_sid: &str) -> Result<CallSnapshot, ProviderError> {
        let url = self.calls_url(&format!("/{call_sid}.json"))?;
        self.get_json(url, &[]).await
    }
}
