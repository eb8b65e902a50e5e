use axum::Json;
use serde_json::{Map, Value, json};

pub mod capture_routes;
pub mod detection_routes;
pub mod device_routes;
pub mod media_routes;
pub mod plant_routes;
pub mod preset_routes;
pub mod user_routes;

/// Wraps a payload as a successful API response.
///
/// Objects gain `"success": true` unless they already carry the key; any
/// other value is placed under `result`.
pub(crate) fn success(value: Value) -> Json<Value> {
    match value {
        Value::Object(mut map) => {
            map.entry("success").or_insert(Value::Bool(true));
            Json(Value::Object(map))
        }
        Value::Null => Json(json!({ "success": true })),
        other => {
            let mut map = Map::new();
            map.insert("success".to_string(), Value::Bool(true));
            map.insert("result".to_string(), other);
            Json(Value::Object(map))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_wrapping() {
        assert_eq!(success(json!({"paused": true})).0, json!({"success": true, "paused": true}));
        assert_eq!(success(json!([1])).0, json!({"success": true, "result": [1]}));
        assert_eq!(success(Value::Null).0, json!({"success": true}));
        assert_eq!(
            success(json!({"success": "yes"})).0,
            json!({"success": "yes"})
        );
    }
}
