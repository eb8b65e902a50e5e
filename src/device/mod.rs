//! Access to the remote inference device.
//!
//! Every operation resolves to a [`DeviceResult`]: transport faults are
//! retried inside the client and then surfaced as [`DeviceError::Unavailable`],
//! while any HTTP response the device actually sends is judged once, without
//! retry.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub mod client;
pub mod models;

pub use client::DeviceClient;
pub use models::{Classification, DeviceHistory, DeviceStatus, PreviewCapture, VideoStatus};

pub const PREVIEW_TIMEOUT: Duration = Duration::from_secs(10);
pub const ANALYZE_TIMEOUT: Duration = Duration::from_secs(120);
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);
pub const RESTART_CAMERA_TIMEOUT: Duration = Duration::from_secs(60);
pub const RELOAD_MODEL_TIMEOUT: Duration = Duration::from_secs(120);
pub const VIDEO_START_TIMEOUT: Duration = Duration::from_secs(10);
pub const VIDEO_STOP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Device unavailable: max retries exceeded after {attempts} attempts ({message})")]
    Unavailable { attempts: u32, message: String },
    #[error("Device returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("{0}")]
    Remote(String),
    #[error("Invalid response from device: {0}")]
    InvalidResponse(String),
    #[error("Invalid device request: {0}")]
    InvalidRequest(String),
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// Linear backoff: the delay after failed attempt `n` is `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Form(Vec<(String, String)>),
    Json(Value),
    Multipart {
        field: String,
        data: Bytes,
        filename: String,
        content_type: String,
    },
}

/// One request against the device API, rebuilt for every retry attempt.
#[derive(Debug, Clone)]
pub struct DeviceCall {
    pub method: Method,
    pub path: String,
    pub body: RequestBody,
    /// Overrides the client's default timeout.
    pub timeout: Option<Duration>,
}

impl DeviceCall {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: RequestBody::Empty,
            timeout: None,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            ..Self::get(path)
        }
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self {
            method: Method::PUT,
            ..Self::get(path)
        }
    }

    pub fn form<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.body = RequestBody::Form(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn json(mut self, value: Value) -> Self {
        self.body = RequestBody::Json(value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Rejects payloads in which the device itself reports `success: false`.
pub fn ensure_remote_success(value: Value) -> DeviceResult<Value> {
    if value.get("success").and_then(Value::as_bool) == Some(false) {
        let message = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error from device")
            .to_string();
        return Err(DeviceError::Remote(message));
    }
    Ok(value)
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> DeviceResult<T> {
    serde_json::from_value(value).map_err(|e| DeviceError::InvalidResponse(e.to_string()))
}

/// Narrow capability interface over the device.
///
/// Implementors provide [`DeviceApi::call`] (one JSON request, retry policy
/// included) and the URL helpers; the typed operations are built on top.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    async fn call(&self, call: DeviceCall) -> DeviceResult<Value>;

    fn base_url(&self) -> &str;

    fn stream_url(&self) -> String {
        format!("{}/stream/live", self.base_url())
    }

    fn history_image_url(&self, filename: &str) -> String {
        format!(
            "{}/history/image/{}",
            self.base_url(),
            urlencoding::encode(filename)
        )
    }

    async fn get_status(&self) -> DeviceStatus {
        let result = match self.call(DeviceCall::get("/status")).await {
            Ok(value) => decode::<DeviceStatus>(value),
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            warn!(error = %e, "Device status unavailable, reporting degraded status.");
            DeviceStatus::unreachable(e.to_string())
        })
    }

    async fn pause_stream(&self) -> DeviceResult<Value> {
        self.call(DeviceCall::post("/stream/pause")).await
    }

    async fn resume_stream(&self) -> DeviceResult<Value> {
        self.call(DeviceCall::post("/stream/resume")).await
    }

    async fn capture_preview(&self) -> DeviceResult<PreviewCapture> {
        let call = DeviceCall::post("/capture/preview")
            .form([("return_image", "true")])
            .timeout(PREVIEW_TIMEOUT);
        decode(self.call(call).await?)
    }

    async fn analyze_image(&self, filename: &str) -> DeviceResult<Classification> {
        if filename.trim().is_empty() {
            return Err(DeviceError::InvalidRequest("filename is required".to_string()));
        }
        let call = DeviceCall::post("/capture/analyze")
            .form([("filename", filename)])
            .timeout(ANALYZE_TIMEOUT);
        Classification::from_value(self.call(call).await?)
            .map_err(|e| DeviceError::InvalidResponse(e.to_string()))
    }

    async fn upload_image(
        &self,
        data: Bytes,
        filename: &str,
        content_type: &str,
    ) -> DeviceResult<Classification> {
        let call = DeviceCall {
            method: Method::POST,
            path: "/upload".to_string(),
            body: RequestBody::Multipart {
                field: "image".to_string(),
                data,
                filename: filename.to_string(),
                content_type: content_type.to_string(),
            },
            timeout: Some(UPLOAD_TIMEOUT),
        };
        Classification::from_value(self.call(call).await?)
            .map_err(|e| DeviceError::InvalidResponse(e.to_string()))
    }

    async fn get_history(&self, limit: u32) -> DeviceResult<DeviceHistory> {
        decode(self.call(DeviceCall::get(format!("/history?limit={limit}"))).await?)
    }

    async fn get_settings(&self) -> DeviceResult<Value> {
        self.call(DeviceCall::get("/settings")).await
    }

    async fn set_mode(&self, mode: &str) -> DeviceResult<Value> {
        self.call(DeviceCall::post("/settings/mode").form([("mode", mode)]))
            .await
    }

    async fn restart_camera(&self) -> DeviceResult<Value> {
        self.call(DeviceCall::post("/control/restart_camera").timeout(RESTART_CAMERA_TIMEOUT))
            .await
    }

    async fn reload_model(&self) -> DeviceResult<Value> {
        self.call(DeviceCall::post("/control/reload_model").timeout(RELOAD_MODEL_TIMEOUT))
            .await
    }

    async fn get_camera_settings(&self) -> DeviceResult<Value> {
        self.call(DeviceCall::get("/settings/current")).await
    }

    async fn set_camera_settings(&self, settings: &Value) -> DeviceResult<Value> {
        self.call(DeviceCall::put("/settings").json(settings.clone()))
            .await
    }

    async fn apply_preset(&self, preset: &str) -> DeviceResult<Value> {
        self.call(DeviceCall::post("/settings/preset").json(json!({ "preset": preset })))
            .await
    }

    async fn get_available_presets(&self) -> DeviceResult<Value> {
        self.call(DeviceCall::get("/settings/presets")).await
    }

    async fn get_resolution_info(&self) -> DeviceResult<Value> {
        self.call(DeviceCall::get("/settings/resolution")).await
    }

    async fn change_resolution(&self, profile: &str) -> DeviceResult<Value> {
        self.call(DeviceCall::post("/settings/resolution").json(json!({ "profile": profile })))
            .await
    }

    async fn get_resolution_profiles(&self) -> DeviceResult<Value> {
        self.call(DeviceCall::get("/settings/resolution/profiles"))
            .await
    }

    async fn get_ui_settings_definitions(&self) -> DeviceResult<Value> {
        self.call(DeviceCall::get("/settings/ui/definitions")).await
    }

    async fn get_current_ui_settings(&self) -> DeviceResult<Value> {
        self.call(DeviceCall::get("/settings/ui/current")).await
    }

    async fn apply_ui_settings(&self, ui_settings: &Value) -> DeviceResult<Value> {
        self.call(
            DeviceCall::post("/settings/ui/apply").json(json!({ "ui_settings": ui_settings })),
        )
        .await
    }

    async fn start_video_recording(&self, duration_secs: Option<u32>) -> DeviceResult<Value> {
        let fields: Vec<(String, String)> = duration_secs
            .filter(|d| *d > 0)
            .map(|d| vec![("duration".to_string(), d.to_string())])
            .unwrap_or_default();
        self.call(
            DeviceCall::post("/video/start")
                .form(fields)
                .timeout(VIDEO_START_TIMEOUT),
        )
        .await
    }

    async fn stop_video_recording(&self) -> DeviceResult<Value> {
        self.call(DeviceCall::post("/video/stop").timeout(VIDEO_STOP_TIMEOUT))
            .await
    }

    async fn get_video_recording_status(&self) -> DeviceResult<VideoStatus> {
        decode(self.call(DeviceCall::get("/video/status")).await?)
    }
}
