#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use image::{DynamicImage, Rgb, RgbImage};
use plantscan::db::ensure_schema;
use plantscan::db::services::user_service;
use plantscan::detection::{
    BoundingBox, DetectionError, DetectionOverlay, DetectorHandle, FrameSource, LeafDetector,
    RawDetection,
};
use plantscan::device::{DeviceApi, DeviceCall, DeviceError, DeviceResult};
use plantscan::server::config::ServerConfig;
use plantscan::services::auth_service;
use plantscan::services::media_store::MediaStore;
use plantscan::web::{AppState, create_axum_router};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const JWT_SECRET: &str = "integration-test-secret";
pub const DEVICE_BASE: &str = "http://device.test:5000";

/// Device double answering each path with a scripted result.
#[derive(Default)]
pub struct FakeDevice {
    responses: Mutex<HashMap<String, DeviceResult<Value>>>,
    calls: Mutex<Vec<DeviceCall>>,
}

impl FakeDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, path: &str, result: DeviceResult<Value>) {
        self.responses
            .lock()
            .unwrap()
            .insert(path.to_string(), result);
    }

    pub fn unreachable(&self, path: &str) {
        self.respond(
            path,
            Err(DeviceError::Unavailable {
                attempts: 3,
                message: "connection refused".to_string(),
            }),
        );
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.path == path)
            .count()
    }

    pub fn last_call(&self, path: &str) -> Option<DeviceCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.path == path)
            .cloned()
    }
}

#[async_trait]
impl DeviceApi for FakeDevice {
    async fn call(&self, call: DeviceCall) -> DeviceResult<Value> {
        let path = call.path.clone();
        self.calls.lock().unwrap().push(call);
        self.responses
            .lock()
            .unwrap()
            .get(&path)
            .cloned()
            .unwrap_or_else(|| {
                Err(DeviceError::Status {
                    status: 404,
                    message: format!("no scripted response for {path}"),
                })
            })
    }

    fn base_url(&self) -> &str {
        DEVICE_BASE
    }
}

/// Serves the same frame on every grab.
pub struct StaticFrames(pub DynamicImage);

#[async_trait]
impl FrameSource for StaticFrames {
    async fn grab_frame(&self) -> Result<DynamicImage, DetectionError> {
        Ok(self.0.clone())
    }
}

/// Reports fixed boxes, filtered by the requested confidence.
pub struct FixedDetector(pub Vec<RawDetection>);

impl LeafDetector for FixedDetector {
    fn detect(
        &self,
        _image: &DynamicImage,
        confidence: f32,
    ) -> Result<Vec<RawDetection>, DetectionError> {
        Ok(self
            .0
            .iter()
            .copied()
            .filter(|d| d.confidence >= confidence)
            .collect())
    }
}

pub fn leaf(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> RawDetection {
    RawDetection {
        bbox: BoundingBox::new(x1, y1, x2, y2),
        confidence,
        class_id: 0,
    }
}

pub fn green_frame(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([40, 160, 60])))
}

pub async fn memory_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    ensure_schema(&db).await.unwrap();
    db
}

pub fn test_config(media_dir: &str) -> ServerConfig {
    ServerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        database_url: "sqlite::memory:".to_string(),
        device_base_url: DEVICE_BASE.to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        media_dir: media_dir.to_string(),
        log_dir: "logs".to_string(),
        detector_model_path: None,
        cookie_secure: false,
        device_timeout_secs: 5,
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub device: Arc<FakeDevice>,
    pub media_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_detector(DetectorHandle::unavailable("no detector in tests")).await
    }

    pub async fn with_detector(detector: DetectorHandle) -> Self {
        Self::build(detector, None).await
    }

    /// An app whose media store lives at `media_root` instead of the temp dir.
    pub async fn with_media_root(media_root: PathBuf) -> Self {
        Self::build(DetectorHandle::unavailable("no detector in tests"), Some(media_root)).await
    }

    async fn build(detector: DetectorHandle, media_root: Option<PathBuf>) -> Self {
        let media_dir = TempDir::new().unwrap();
        let media_root = media_root.unwrap_or_else(|| media_dir.path().to_path_buf());
        let device = FakeDevice::new();
        let frames = Arc::new(StaticFrames(green_frame(640, 480)));
        let config = test_config(media_root.to_str().unwrap());
        let state = Arc::new(AppState {
            db: memory_db().await,
            device: device.clone(),
            detection: Arc::new(DetectionOverlay::new(detector, frames)),
            media: MediaStore::new(&media_root),
            config: Arc::new(config),
        });
        Self {
            router: create_axum_router(state.clone()),
            state,
            device,
            media_dir,
        }
    }

    /// Creates a user and returns a bearer token for it.
    pub async fn login_as(&self, username: &str) -> (i32, String) {
        let user = user_service::create_user(
            &self.state.db,
            username,
            "unused-hash",
            &format!("{username}@example.com"),
        )
        .await
        .unwrap();
        let login = auth_service::create_jwt_for_user(&user, JWT_SECRET).unwrap();
        (user.id, login.token)
    }

    /// Like `login_as`, for a user holding admin rights.
    pub async fn login_as_admin(&self, username: &str) -> (i32, String) {
        self.login_as(username).await;
        let user = user_service::set_admin(&self.state.db, username, true)
            .await
            .unwrap()
            .unwrap();
        let login = auth_service::create_jwt_for_user(&user, JWT_SECRET).unwrap();
        (user.id, login.token)
    }
}
