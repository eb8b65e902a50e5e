use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Health snapshot reported by `GET /status`.
///
/// When the device cannot be reached the client synthesizes a degraded value
/// (see [`DeviceStatus::unreachable`]) instead of failing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceStatus {
    #[serde(default)]
    pub camera: CameraState,
    #[serde(default)]
    pub model_loaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraState {
    #[serde(default = "unknown_state")]
    pub state: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn unknown_state() -> String {
    "unknown".to_string()
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            state: unknown_state(),
            extra: Map::new(),
        }
    }
}

impl DeviceStatus {
    pub fn unreachable(error: impl Into<String>) -> Self {
        Self {
            camera: CameraState {
                state: "error".to_string(),
                extra: Map::new(),
            },
            model_loaded: false,
            error: Some(error.into()),
            extra: Map::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// A classification returned by `/capture/analyze` or `/upload`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    /// The device's full response body.
    #[serde(skip)]
    pub raw: Value,
}

impl Classification {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let mut classification: Classification = serde_json::from_value(value.clone())?;
        classification.raw = value;
        Ok(classification)
    }

    /// The predicted label with surrounding whitespace removed.
    pub fn label(&self) -> &str {
        self.name.as_deref().map(str::trim).unwrap_or("")
    }
}

/// Result of `/capture/preview`: the device stored a snapshot and returned a
/// small inline thumbnail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreviewCapture {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_b64_thumbnail: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DeviceHistory {
    #[serde(default)]
    pub files: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct VideoStatus {
    #[serde(default)]
    pub recording: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_keeps_unknown_fields() {
        let status: DeviceStatus = serde_json::from_value(json!({
            "camera": {"state": "streaming", "fps": 15},
            "model_loaded": true,
            "uptime": 42
        }))
        .unwrap();
        assert_eq!(status.camera.state, "streaming");
        assert_eq!(status.camera.extra["fps"], 15);
        assert!(status.model_loaded);
        assert!(!status.is_degraded());
        assert_eq!(status.extra["uptime"], 42);
    }

    #[test]
    fn test_unreachable_status_shape() {
        let value = serde_json::to_value(DeviceStatus::unreachable("connection refused")).unwrap();
        assert_eq!(
            value,
            json!({
                "camera": {"state": "error"},
                "model_loaded": false,
                "error": "connection refused"
            })
        );
    }

    #[test]
    fn test_classification_missing_confidence_stays_absent() {
        let c = Classification::from_value(json!({"success": true, "name": "  Neem "})).unwrap();
        assert_eq!(c.label(), "Neem");
        assert_eq!(c.confidence, None);
        assert_eq!(c.raw["success"], true);
    }
}
