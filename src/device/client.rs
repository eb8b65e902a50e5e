use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, multipart};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, error, warn};

use super::{
    DeviceApi, DeviceCall, DeviceError, DeviceResult, RequestBody, RetryPolicy,
    ensure_remote_success,
};

/// HTTP client for the inference device.
///
/// Holds only immutable configuration, so one instance is shared by every
/// request handler.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl DeviceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    fn build_request(&self, call: &DeviceCall) -> DeviceResult<RequestBuilder> {
        let url = format!("{}{}", self.base_url, call.path);
        let request = self
            .client
            .request(call.method.clone(), url)
            .timeout(call.timeout.unwrap_or(self.timeout));

        let request = match &call.body {
            RequestBody::Empty => request,
            RequestBody::Form(fields) => request.form(fields),
            RequestBody::Json(value) => request.json(value),
            RequestBody::Multipart {
                field,
                data,
                filename,
                content_type,
            } => {
                let part = multipart::Part::bytes(data.to_vec())
                    .file_name(filename.clone())
                    .mime_str(content_type)
                    .map_err(|e| {
                        DeviceError::InvalidRequest(format!("Invalid content type: {e}"))
                    })?;
                request.multipart(multipart::Form::new().part(field.clone(), part))
            }
        };
        Ok(request)
    }

    /// Sends `call`, retrying transport failures with linear backoff.
    ///
    /// Any response the device returns, whatever its status, ends the loop.
    async fn send_with_retry(&self, call: &DeviceCall) -> DeviceResult<Response> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let request = self.build_request(call)?;
            match request.send().await {
                Ok(response) => return Ok(response),
                Err(e) if attempt >= max_attempts => {
                    error!(
                        path = %call.path,
                        attempts = attempt,
                        error = %e,
                        "Device request failed, max retries exceeded."
                    );
                    return Err(DeviceError::Unavailable {
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        path = %call.path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Device request failed, retrying."
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn error_message_from_body(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body).ok().and_then(|v| {
        v.get("error")
            .or_else(|| v.get("detail"))
            .and_then(Value::as_str)
            .map(str::to_string)
    })
}

#[async_trait]
impl DeviceApi for DeviceClient {
    async fn call(&self, call: DeviceCall) -> DeviceResult<Value> {
        let response = self.send_with_retry(&call).await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DeviceError::InvalidResponse(format!("Failed to read body: {e}")))?;

        if !status.is_success() {
            let message = error_message_from_body(&body).unwrap_or_else(|| {
                if body.trim().is_empty() {
                    status.canonical_reason().unwrap_or("error").to_string()
                } else {
                    body.chars().take(200).collect()
                }
            });
            warn!(path = %call.path, status = status.as_u16(), %message, "Device returned an error status.");
            return Err(DeviceError::Status {
                status: status.as_u16(),
                message,
            });
        }

        debug!(path = %call.path, status = status.as_u16(), "Device call succeeded.");
        let value = if body.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str::<Value>(&body)
                .map_err(|e| DeviceError::InvalidResponse(e.to_string()))?
        };
        ensure_remote_success(value)
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
