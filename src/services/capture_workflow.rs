//! The obtain → classify → gate → persist sequence behind every entry point
//! that identifies a leaf: user uploads, device captures the user chose to
//! save, and crops cut out by the detection overlay.

use bytes::Bytes;
use chrono::Utc;
use sea_orm::{DatabaseConnection, DbErr};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::info;

use crate::db::entities::{capture_result, plant};
use crate::db::enums::CaptureSource;
use crate::db::services::capture_service::{self, CaptureServiceError, NewCapture};
use crate::db::services::plant_service::{self, is_sentinel_label};
use crate::device::{Classification, DeviceApi, DeviceError};
use crate::services::media_store::{MediaError, MediaKind, MediaStore};

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const ALLOWED_CONTENT_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "image/webp"];

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),
    #[error("The classifier returned no plant name")]
    EmptyLabel,
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error(transparent)]
    Media(#[from] MediaError),
}

impl From<CaptureServiceError> for WorkflowError {
    fn from(err: CaptureServiceError) -> Self {
        match err {
            CaptureServiceError::DbErr(e) => WorkflowError::Database(e),
            CaptureServiceError::EmptyLabel => WorkflowError::EmptyLabel,
        }
    }
}

/// An image received from the browser that passed the upload checks.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub data: Bytes,
    pub filename: String,
    pub content_type: String,
}

impl UploadedImage {
    pub fn validate(data: Bytes, filename: &str, content_type: &str) -> Result<Self, WorkflowError> {
        let content_type = content_type.trim().to_ascii_lowercase();
        if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
            return Err(WorkflowError::Validation(
                "Invalid file type. Only JPG, PNG, WebP allowed".to_string(),
            ));
        }
        if data.is_empty() {
            return Err(WorkflowError::Validation("Uploaded file is empty".to_string()));
        }
        if data.len() > MAX_UPLOAD_BYTES {
            return Err(WorkflowError::Validation("File too large. Max 10MB".to_string()));
        }
        let filename = match filename.trim() {
            "" => format!("upload.{}", extension_for(&content_type)),
            name => name.to_string(),
        };
        Ok(Self {
            data,
            filename,
            content_type,
        })
    }

    /// Extension for the locally stored copy, from the filename when it has
    /// one and the content type otherwise.
    pub fn extension(&self) -> String {
        let from_name = std::path::Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|e| matches!(e.as_str(), "jpg" | "jpeg" | "png" | "webp"));
        from_name.unwrap_or_else(|| extension_for(&self.content_type).to_string())
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

/// The body of a "save this result" request sent after a device capture
/// was analyzed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SaveCaptureRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_size_bytes: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotSavedReason {
    SentinelLabel,
    PersistDisabled,
}

impl NotSavedReason {
    pub fn message(&self, label: &str) -> String {
        match self {
            NotSavedReason::SentinelLabel => format!("'{label}' is not a plant and was not saved"),
            NotSavedReason::PersistDisabled => format!("Results for '{label}' are not saved"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum IdentifyOutcome {
    Saved {
        plant: plant::Model,
        capture: capture_result::Model,
    },
    /// Classification succeeded but the persistence gate declined it.
    NotSaved {
        label: String,
        confidence: Option<f64>,
        plant: Option<plant::Model>,
        reason: NotSavedReason,
    },
}

impl IdentifyOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, IdentifyOutcome::Saved { .. })
    }

    pub fn plant(&self) -> Option<&plant::Model> {
        match self {
            IdentifyOutcome::Saved { plant, .. } => Some(plant),
            IdentifyOutcome::NotSaved { plant, .. } => plant.as_ref(),
        }
    }
}

/// A device classification together with what the gate did with it.
#[derive(Debug, Clone)]
pub struct Identification {
    pub classification: Classification,
    pub outcome: IdentifyOutcome,
}

enum PendingImage {
    None,
    Bytes { data: Bytes, extension: String },
    Stored(String),
}

struct Candidate {
    user_id: Option<i32>,
    label: String,
    confidence: Option<f64>,
    image_file: String,
    image: PendingImage,
    source: CaptureSource,
    raw: Value,
}

pub struct CaptureWorkflow<'a> {
    device: &'a dyn DeviceApi,
    db: &'a DatabaseConnection,
    media: &'a MediaStore,
}

impl<'a> CaptureWorkflow<'a> {
    pub fn new(device: &'a dyn DeviceApi, db: &'a DatabaseConnection, media: &'a MediaStore) -> Self {
        Self { device, db, media }
    }

    /// Classifies an uploaded image and stores the result, with a local copy
    /// of the image, when the gate allows it.
    pub async fn identify_upload(
        &self,
        user_id: Option<i32>,
        upload: UploadedImage,
    ) -> Result<Identification, WorkflowError> {
        let classification = self
            .device
            .upload_image(upload.data.clone(), &upload.filename, &upload.content_type)
            .await?;
        let extension = upload.extension();
        let candidate = Candidate {
            user_id,
            label: classification.label().to_string(),
            confidence: classification.confidence,
            image_file: classification.file.clone().unwrap_or_default(),
            image: PendingImage::Bytes {
                data: upload.data,
                extension,
            },
            source: CaptureSource::Upload,
            raw: classification.raw.clone(),
        };
        let outcome = self.gate_and_persist(candidate).await?;
        Ok(Identification {
            classification,
            outcome,
        })
    }

    /// Classifies a file the device already holds. Nothing is persisted;
    /// the caller decides whether to save it afterwards.
    pub async fn analyze_capture(&self, filename: &str) -> Result<Classification, WorkflowError> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(WorkflowError::Validation("filename is required".to_string()));
        }
        Ok(self.device.analyze_image(filename).await?)
    }

    pub async fn save_result(
        &self,
        user_id: Option<i32>,
        request: SaveCaptureRequest,
    ) -> Result<IdentifyOutcome, WorkflowError> {
        let label = request.name.trim().to_string();
        if label.is_empty() {
            return Err(WorkflowError::Validation("Plant name is required".to_string()));
        }
        if let Some(size) = request.image_size_bytes {
            info!(file = %request.file, bytes = size, "Saving device capture.");
        }
        let raw = json!({
            "name": label,
            "confidence": request.confidence,
            "file": request.file,
            "image_url": request.image_url,
            "image_size_bytes": request.image_size_bytes,
        });
        let candidate = Candidate {
            user_id,
            label,
            confidence: request.confidence,
            image_file: request.file,
            image: PendingImage::None,
            source: CaptureSource::Device,
            raw,
        };
        self.gate_and_persist(candidate).await
    }

    /// Classifies a crop produced by the detection overlay. `stored_path` is
    /// the crop's location in the media store, kept on the capture row when
    /// the crop could be stored.
    pub async fn identify_crop(
        &self,
        user_id: Option<i32>,
        crop: Bytes,
        stored_path: Option<String>,
    ) -> Result<Identification, WorkflowError> {
        let filename = format!("detector_crop_{}.jpg", Utc::now().format("%Y%m%d_%H%M%S"));
        let classification = self
            .device
            .upload_image(crop, &filename, "image/jpeg")
            .await?;
        let candidate = Candidate {
            user_id,
            label: classification.label().to_string(),
            confidence: classification.confidence,
            image_file: classification.file.clone().unwrap_or(filename),
            image: stored_path.map_or(PendingImage::None, PendingImage::Stored),
            source: CaptureSource::DetectorCrop,
            raw: classification.raw.clone(),
        };
        let outcome = self.gate_and_persist(candidate).await?;
        Ok(Identification {
            classification,
            outcome,
        })
    }

    async fn gate_and_persist(&self, candidate: Candidate) -> Result<IdentifyOutcome, WorkflowError> {
        let label = candidate.label.trim().to_string();
        if label.is_empty() {
            return Err(WorkflowError::EmptyLabel);
        }

        if is_sentinel_label(&label) {
            let plant = plant_service::resolve_plant(self.db, &label).await?;
            info!(label = %label, "Sentinel label, result not saved.");
            return Ok(IdentifyOutcome::NotSaved {
                label,
                confidence: candidate.confidence,
                plant,
                reason: NotSavedReason::SentinelLabel,
            });
        }

        let plant = plant_service::get_or_create_plant(self.db, &label).await?;
        if !plant.should_save {
            info!(label = %label, plant_id = plant.id, "Plant is excluded from saving, result not saved.");
            return Ok(IdentifyOutcome::NotSaved {
                label,
                confidence: candidate.confidence,
                plant: Some(plant),
                reason: NotSavedReason::PersistDisabled,
            });
        }

        let local_image = match candidate.image {
            PendingImage::None => None,
            PendingImage::Stored(path) => Some(path),
            PendingImage::Bytes { data, extension } => {
                let prefix = match candidate.user_id {
                    Some(id) => format!("user_{id}"),
                    None => "anonymous".to_string(),
                };
                Some(
                    self.media
                        .save(MediaKind::Uploads, &prefix, &extension, &data)
                        .await?,
                )
            }
        };

        let capture = capture_service::record_capture(
            self.db,
            NewCapture {
                user_id: candidate.user_id,
                plant_id: Some(plant.id),
                name: label,
                confidence: candidate.confidence,
                image_file: candidate.image_file,
                local_image,
                source: candidate.source,
                success: true,
                raw: candidate.raw,
            },
        )
        .await?;
        info!(
            capture_id = capture.id,
            plant_id = plant.id,
            source = %capture.source,
            "Capture result saved."
        );
        Ok(IdentifyOutcome::Saved { plant, capture })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_validation() {
        let ok = UploadedImage::validate(Bytes::from_static(b"jpeg"), "leaf.JPG", "Image/JPEG").unwrap();
        assert_eq!(ok.content_type, "image/jpeg");
        assert_eq!(ok.extension(), "jpg");

        let gif = UploadedImage::validate(Bytes::from_static(b"gif"), "a.gif", "image/gif");
        assert!(matches!(gif, Err(WorkflowError::Validation(_))));

        let empty = UploadedImage::validate(Bytes::new(), "a.png", "image/png");
        assert!(matches!(empty, Err(WorkflowError::Validation(_))));

        let big = Bytes::from(vec![0u8; MAX_UPLOAD_BYTES + 1]);
        let too_big = UploadedImage::validate(big, "a.png", "image/png");
        assert!(matches!(too_big, Err(WorkflowError::Validation(_))));

        let exact = Bytes::from(vec![0u8; MAX_UPLOAD_BYTES]);
        assert!(UploadedImage::validate(exact, "a.png", "image/png").is_ok());
    }

    #[test]
    fn test_extension_falls_back_to_content_type() {
        let image = UploadedImage::validate(Bytes::from_static(b"x"), "blob", "image/webp").unwrap();
        assert_eq!(image.extension(), "webp");
        let image = UploadedImage::validate(Bytes::from_static(b"x"), "", "image/png").unwrap();
        assert_eq!(image.filename, "upload.png");
        assert_eq!(image.extension(), "png");
    }
}
