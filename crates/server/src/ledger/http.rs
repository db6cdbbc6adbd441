//! Ledger reached through the HTTP relay.

use super::{number_or_string, ExternalScores, Ledger, LedgerError, SubmitReceipt, SubmitRequest};
use futures_util::future::{BoxFuture, FutureExt};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const SUBMIT_PATH: &str = "/api/submit-scores";
const READ_PATH: &str = "/api/get-scores";

/// Relay reply to a submission. Success and failure share one shape.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    transaction_hash: Option<String>,
    #[serde(default, deserialize_with = "number_or_string")]
    block_number: Option<u64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

impl SubmitResponse {
    fn message(&self) -> String {
        match (&self.error, &self.details) {
            (Some(error), Some(details)) => format!("{error}: {details}"),
            (Some(error), None) => error.clone(),
            (None, Some(details)) => details.clone(),
            (None, None) => "no detail".to_string(),
        }
    }
}

/// Turn a relay status and body into a receipt or a typed error.
fn receipt_from(status: u16, response: SubmitResponse) -> Result<SubmitReceipt, LedgerError> {
    if !(200..300).contains(&status) {
        return Err(LedgerError::Status {
            code: status,
            message: response.message(),
        });
    }
    if response.success != Some(true) {
        return Err(LedgerError::Rejected(response.message()));
    }
    let reference = response
        .transaction_hash
        .ok_or_else(|| LedgerError::Malformed("missing transactionHash".into()))?;
    Ok(SubmitReceipt {
        reference,
        block: response.block_number,
    })
}

/// Classify a failed relay request. Timeouts report the client's limit.
fn request_error(err: reqwest::Error, timeout: Duration) -> LedgerError {
    if err.is_timeout() {
        LedgerError::Timeout(timeout.as_millis() as u64)
    } else if err.is_decode() {
        LedgerError::Malformed(err.to_string())
    } else {
        LedgerError::Transport(err.to_string())
    }
}

/// Talks JSON to the relay in front of the real ledger.
#[derive(Debug, Clone)]
pub struct HttpLedger {
    client: Client,
    base: Url,
    timeout: Duration,
}

impl HttpLedger {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base = Url::parse(endpoint)?;
        Ok(Self { client, base, timeout })
    }

    fn url(&self, path: &str) -> Result<Url, LedgerError> {
        self.base
            .join(path)
            .map_err(|e| LedgerError::Transport(format!("bad relay url: {e}")))
    }
}

impl Ledger for HttpLedger {
    fn submit_scores(&self, request: SubmitRequest) -> BoxFuture<'static, Result<SubmitReceipt, LedgerError>> {
        let client = self.client.clone();
        let timeout = self.timeout;
        let url = self.url(SUBMIT_PATH);
        async move {
            let url = url?;
            debug!("POST {} round {}", url, request.round_number);
            let response = client
                .post(url)
                .json(&request)
                .send()
                .await
                .map_err(|e| request_error(e, timeout))?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| request_error(e, timeout))?;
            let parsed: SubmitResponse = serde_json::from_str(&body).unwrap_or_default();
            receipt_from(status, parsed)
        }
        .boxed()
    }

    fn fetch_scores(
        &self,
        session_id: &str,
        round_number: u32,
    ) -> BoxFuture<'static, Result<ExternalScores, LedgerError>> {
        let client = self.client.clone();
        let timeout = self.timeout;
        let url = self.url(READ_PATH).and_then(|url| {
            Url::parse_with_params(
                url.as_str(),
                &[
                    ("sessionId", session_id.to_string()),
                    ("roundNumber", round_number.to_string()),
                ],
            )
            .map_err(|e| LedgerError::Transport(e.to_string()))
        });
        async move {
            let url = url?;
            debug!("GET {}", url);
            let response = client.get(url).send().await.map_err(|e| request_error(e, timeout))?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let parsed: SubmitResponse = serde_json::from_str(&body).unwrap_or_default();
                return Err(LedgerError::Status {
                    code: status.as_u16(),
                    message: parsed.message(),
                });
            }
            let body = response.text().await.map_err(|e| request_error(e, timeout))?;
            serde_json::from_str(&body).map_err(|e| LedgerError::Malformed(e.to_string()))
        }
        .boxed()
    }
}
