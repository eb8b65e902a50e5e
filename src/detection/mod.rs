//! Leaf detection over a single frame pulled from the device's live stream.
//!
//! The detector model is loaded once at startup into a [`DetectorHandle`].
//! When loading failed the handle says so, and every detection request fails
//! immediately without touching the stream.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, imageops};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub mod frame;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use frame::{FrameSource, MjpegFrameSource};

pub const MIN_CONFIDENCE: f32 = 0.1;
pub const MAX_CONFIDENCE: f32 = 0.9;
pub const DEFAULT_CONFIDENCE: f32 = 0.5;
pub const CROP_PADDING: f64 = 10.0;
pub const THUMBNAIL_SIZE: u32 = 200;
const BOX_THICKNESS: u32 = 2;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Leaf detector not loaded: {0}")]
    ModelUnavailable(String),
    #[error("Cannot capture frame from stream: {0}")]
    Frame(String),
    #[error("Detection failed: {0}")]
    Inference(String),
    #[error("Image processing failed: {0}")]
    Image(String),
    #[error("Invalid crop coordinates")]
    EmptyRegion,
}

/// Axis-aligned box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            width: x2 - x1,
            height: y2 - y1,
        }
    }
}

/// One box as the detector reports it, before the overlay numbers it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub id: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: u32,
}

pub trait LeafDetector: Send + Sync {
    /// Returns boxes scoring at least `confidence`, in the model's own order.
    fn detect(&self, image: &DynamicImage, confidence: f32)
    -> Result<Vec<RawDetection>, DetectionError>;
}

#[derive(Clone)]
pub enum DetectorHandle {
    Ready(Arc<dyn LeafDetector>),
    Unavailable { reason: String },
}

impl DetectorHandle {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        DetectorHandle::Unavailable {
            reason: reason.into(),
        }
    }

    /// Loads the detector configured at `model_path`, if any.
    pub fn load(model_path: Option<&str>) -> Self {
        let Some(path) = model_path.filter(|p| !p.trim().is_empty()) else {
            info!("No detector model configured, leaf detection disabled.");
            return Self::unavailable("no detector model configured");
        };
        Self::load_from(path)
    }

    #[cfg(feature = "onnx")]
    fn load_from(path: &str) -> Self {
        match onnx::OnnxLeafDetector::load(path) {
            Ok(detector) => {
                info!(model = %path, "Leaf detector loaded.");
                DetectorHandle::Ready(Arc::new(detector))
            }
            Err(e) => {
                warn!(model = %path, error = %e, "Failed to load leaf detector.");
                Self::unavailable(e.to_string())
            }
        }
    }

    #[cfg(not(feature = "onnx"))]
    fn load_from(path: &str) -> Self {
        warn!(model = %path, "Detector model configured but ONNX support is not compiled in.");
        Self::unavailable("built without the `onnx` feature")
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, DetectorHandle::Ready(_))
    }

    fn ready(&self) -> Result<Arc<dyn LeafDetector>, DetectionError> {
        match self {
            DetectorHandle::Ready(detector) => Ok(detector.clone()),
            DetectorHandle::Unavailable { reason } => {
                Err(DetectionError::ModelUnavailable(reason.clone()))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LeafDetection {
    pub detections: Vec<Detection>,
    pub total_leaves: usize,
    pub image_width: u32,
    pub image_height: u32,
    pub annotated_image_b64: String,
}

/// Pixel rectangle actually cut out of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropRegion {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl CropRegion {
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CropInfo {
    pub original_bbox: BoundingBox,
    pub crop_box: CropRegion,
    pub cropped_size: CroppedSize,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CroppedSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeafCrop {
    pub cropped_image_b64: String,
    pub thumbnail_b64: String,
    pub crop_info: CropInfo,
    /// The encoded crop, for storage and classification.
    #[serde(skip)]
    pub jpeg: Vec<u8>,
}

pub fn clamp_confidence(confidence: Option<f32>) -> f32 {
    match confidence {
        Some(c) if c.is_finite() => c.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE),
        Some(_) | None => DEFAULT_CONFIDENCE,
    }
}

fn clip_region(bbox: &BoundingBox, width: u32, height: u32, padding: f64) -> Option<CropRegion> {
    fn clip(v: f32, offset: f64, max: u32) -> u32 {
        let v = if v.is_nan() { 0.0 } else { f64::from(v).trunc() };
        (v + offset).clamp(0.0, f64::from(max)) as u32
    }

    let region = CropRegion {
        x1: clip(bbox.x1, -padding, width),
        y1: clip(bbox.y1, -padding, height),
        x2: clip(bbox.x2, padding, width),
        y2: clip(bbox.y2, padding, height),
    };
    (region.x2 > region.x1 && region.y2 > region.y1).then_some(region)
}

/// Pads `bbox` by [`CROP_PADDING`] and clips it to a `width` x `height` frame.
///
/// Coordinates are truncated to whole pixels first. NaN counts as 0 and
/// infinities clip to the frame edge. Returns `None` when nothing is left.
pub fn clamp_region(bbox: &BoundingBox, width: u32, height: u32) -> Option<CropRegion> {
    clip_region(bbox, width, height, CROP_PADDING)
}

fn box_color(confidence: f32) -> Rgb<u8> {
    if confidence > 0.8 {
        Rgb([0, 255, 0])
    } else if confidence > 0.6 {
        Rgb([255, 255, 0])
    } else {
        Rgb([255, 0, 0])
    }
}

/// Draws every detection as a rectangle outline, clipped to the image.
pub fn annotate(image: &DynamicImage, detections: &[Detection]) -> RgbImage {
    let mut canvas = image.to_rgb8();
    let (w, h) = canvas.dimensions();
    for detection in detections {
        let Some(region) = clip_region(&detection.bbox, w, h, 0.0) else {
            continue;
        };
        let color = box_color(detection.confidence);
        for y in region.y1..region.y2 {
            for x in region.x1..region.x2 {
                let on_edge = x < region.x1 + BOX_THICKNESS
                    || x + BOX_THICKNESS >= region.x2
                    || y < region.y1 + BOX_THICKNESS
                    || y + BOX_THICKNESS >= region.y2;
                if on_edge {
                    canvas.put_pixel(x, y, color);
                }
            }
        }
    }
    canvas
}

pub fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, DetectionError> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut buf = Cursor::new(Vec::new());
    rgb.write_to(&mut buf, ImageFormat::Jpeg)
        .map_err(|e| DetectionError::Image(format!("Failed to encode JPEG: {e}")))?;
    Ok(buf.into_inner())
}

fn run_detection(
    detector: &dyn LeafDetector,
    frame: &DynamicImage,
    confidence: f32,
) -> Result<LeafDetection, DetectionError> {
    let detections: Vec<Detection> = detector
        .detect(frame, confidence)?
        .into_iter()
        .enumerate()
        .map(|(i, raw)| Detection {
            id: format!("leaf_{i}"),
            bbox: BoundingBox::new(raw.bbox.x1, raw.bbox.y1, raw.bbox.x2, raw.bbox.y2),
            confidence: raw.confidence,
            class_id: raw.class_id,
        })
        .collect();

    let annotated = DynamicImage::ImageRgb8(annotate(frame, &detections));
    Ok(LeafDetection {
        total_leaves: detections.len(),
        detections,
        image_width: frame.width(),
        image_height: frame.height(),
        annotated_image_b64: BASE64.encode(encode_jpeg(&annotated)?),
    })
}

pub fn crop_frame(frame: &DynamicImage, bbox: &BoundingBox) -> Result<LeafCrop, DetectionError> {
    let region =
        clamp_region(bbox, frame.width(), frame.height()).ok_or(DetectionError::EmptyRegion)?;
    let cropped = frame.crop_imm(region.x1, region.y1, region.width(), region.height());
    let thumbnail = DynamicImage::ImageRgba8(imageops::resize(
        &cropped,
        THUMBNAIL_SIZE,
        THUMBNAIL_SIZE,
        imageops::FilterType::Triangle,
    ));

    let jpeg = encode_jpeg(&cropped)?;
    Ok(LeafCrop {
        cropped_image_b64: BASE64.encode(&jpeg),
        thumbnail_b64: BASE64.encode(encode_jpeg(&thumbnail)?),
        crop_info: CropInfo {
            original_bbox: *bbox,
            crop_box: region,
            cropped_size: CroppedSize {
                width: region.width(),
                height: region.height(),
            },
        },
        jpeg,
    })
}

/// Runs the detector and cropper against fresh frames from `frames`.
pub struct DetectionOverlay {
    detector: DetectorHandle,
    frames: Arc<dyn FrameSource>,
}

impl DetectionOverlay {
    pub fn new(detector: DetectorHandle, frames: Arc<dyn FrameSource>) -> Self {
        Self { detector, frames }
    }

    pub fn detector(&self) -> &DetectorHandle {
        &self.detector
    }

    pub async fn detect_leaves(&self, confidence: Option<f32>) -> Result<LeafDetection, DetectionError> {
        let detector = self.detector.ready()?;
        let confidence = clamp_confidence(confidence);
        let frame = self.frames.grab_frame().await?;

        let result = tokio::task::spawn_blocking(move || {
            run_detection(detector.as_ref(), &frame, confidence)
        })
        .await
        .map_err(|e| DetectionError::Inference(format!("detection task failed: {e}")))??;

        info!(
            total_leaves = result.total_leaves,
            confidence, "Leaf detection finished."
        );
        Ok(result)
    }

    pub async fn crop_leaf(&self, bbox: BoundingBox) -> Result<LeafCrop, DetectionError> {
        let frame = self.frames.grab_frame().await?;
        tokio::task::spawn_blocking(move || crop_frame(&frame, &bbox))
            .await
            .map_err(|e| DetectionError::Image(format!("crop task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StaticFrame(DynamicImage);

    #[async_trait]
    impl FrameSource for StaticFrame {
        async fn grab_frame(&self) -> Result<DynamicImage, DetectionError> {
            Ok(self.0.clone())
        }
    }

    struct FixedDetector(Vec<RawDetection>);

    impl LeafDetector for FixedDetector {
        fn detect(&self, _image: &DynamicImage, confidence: f32) -> Result<Vec<RawDetection>, DetectionError> {
            Ok(self.0.iter().copied().filter(|d| d.confidence >= confidence).collect())
        }
    }

    fn frame(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([10, 10, 10])))
    }

    fn raw(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> RawDetection {
        RawDetection {
            bbox: BoundingBox::new(x1, y1, x2, y2),
            confidence,
            class_id: 0,
        }
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(clamp_confidence(Some(0.01)), 0.1);
        assert_eq!(clamp_confidence(Some(0.95)), 0.9);
        assert_eq!(clamp_confidence(Some(0.42)), 0.42);
        assert_eq!(clamp_confidence(Some(f32::NAN)), DEFAULT_CONFIDENCE);
        assert_eq!(clamp_confidence(None), DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_region_is_padded_and_clipped() {
        let inside = clamp_region(&BoundingBox::new(50.5, 60.9, 100.0, 120.0), 640, 480).unwrap();
        assert_eq!(inside, CropRegion { x1: 40, y1: 50, x2: 110, y2: 130 });

        let outside = clamp_region(&BoundingBox::new(-50.0, -20.0, 5000.0, 4000.0), 640, 480).unwrap();
        assert_eq!(outside, CropRegion { x1: 0, y1: 0, x2: 640, y2: 480 });

        let odd = clamp_region(
            &BoundingBox::new(f32::NAN, f32::NEG_INFINITY, f32::INFINITY, 30.0),
            640,
            480,
        )
        .unwrap();
        assert_eq!(odd, CropRegion { x1: 0, y1: 0, x2: 640, y2: 40 });

        assert!(clamp_region(&BoundingBox::new(1000.0, 10.0, 1200.0, 50.0), 640, 480).is_none());
        assert!(clamp_region(&BoundingBox::new(300.0, 10.0, 200.0, 50.0), 640, 480).is_none());
    }

    #[test]
    fn test_crop_sizes() {
        let crop = crop_frame(&frame(640, 480), &BoundingBox::new(100.0, 100.0, 200.0, 150.0)).unwrap();
        assert_eq!(crop.crop_info.cropped_size.width, 120);
        assert_eq!(crop.crop_info.cropped_size.height, 70);

        let decoded = image::load_from_memory(&BASE64.decode(&crop.thumbnail_b64).unwrap()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 200));
        let full = image::load_from_memory(&crop.jpeg).unwrap();
        assert_eq!((full.width(), full.height()), (120, 70));
    }

    #[test]
    fn test_annotation_colors_follow_confidence() {
        let detections = vec![
            Detection {
                id: "leaf_0".to_string(),
                bbox: BoundingBox::new(10.0, 10.0, 50.0, 50.0),
                confidence: 0.9,
                class_id: 0,
            },
            Detection {
                id: "leaf_1".to_string(),
                bbox: BoundingBox::new(60.0, 10.0, 90.0, 50.0),
                confidence: 0.7,
                class_id: 0,
            },
            Detection {
                id: "leaf_2".to_string(),
                bbox: BoundingBox::new(10.0, 60.0, 50.0, 90.0),
                confidence: 0.3,
                class_id: 0,
            },
        ];
        let canvas = annotate(&frame(100, 100), &detections);
        assert_eq!(*canvas.get_pixel(10, 30), Rgb([0, 255, 0]));
        assert_eq!(*canvas.get_pixel(60, 30), Rgb([255, 255, 0]));
        assert_eq!(*canvas.get_pixel(30, 60), Rgb([255, 0, 0]));
        // Interior untouched.
        assert_eq!(*canvas.get_pixel(30, 30), Rgb([10, 10, 10]));
    }

    #[tokio::test]
    async fn test_unloaded_detector_fails_before_grabbing_a_frame() {
        struct NoFrames;
        #[async_trait]
        impl FrameSource for NoFrames {
            async fn grab_frame(&self) -> Result<DynamicImage, DetectionError> {
                panic!("frame source must not be touched");
            }
        }
        let overlay = DetectionOverlay::new(DetectorHandle::unavailable("missing model"), Arc::new(NoFrames));
        let err = overlay.detect_leaves(Some(0.5)).await.unwrap_err();
        assert!(matches!(err, DetectionError::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_detections_keep_detector_order_and_ids() {
        let detector = FixedDetector(vec![
            raw(300.0, 10.0, 400.0, 90.0, 0.85),
            raw(10.0, 10.0, 100.0, 90.0, 0.65),
            raw(10.0, 200.0, 100.0, 290.0, 0.2),
        ]);
        let overlay = DetectionOverlay::new(
            DetectorHandle::Ready(Arc::new(detector)),
            Arc::new(StaticFrame(frame(640, 480))),
        );
        let result = overlay.detect_leaves(Some(0.05)).await.unwrap();
        // Threshold was clamped up to 0.1, so every box passes.
        assert_eq!(result.total_leaves, 3);
        let ids: Vec<&str> = result.detections.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["leaf_0", "leaf_1", "leaf_2"]);
        assert_eq!(result.detections[0].bbox.width, 100.0);
        assert_eq!((result.image_width, result.image_height), (640, 480));
        assert!(!result.annotated_image_b64.is_empty());

        let strict = overlay.detect_leaves(Some(0.99)).await.unwrap();
        assert_eq!(strict.total_leaves, 0);
    }

    #[tokio::test]
    async fn test_crop_outside_frame_is_clamped() {
        let overlay = DetectionOverlay::new(
            DetectorHandle::unavailable("not needed"),
            Arc::new(StaticFrame(frame(320, 240))),
        );
        let crop = overlay
            .crop_leaf(BoundingBox::new(-100.0, -100.0, 10_000.0, 10_000.0))
            .await
            .unwrap();
        assert_eq!(crop.crop_info.crop_box, CropRegion { x1: 0, y1: 0, x2: 320, y2: 240 });

        let err = overlay
            .crop_leaf(BoundingBox::new(500.0, 500.0, 600.0, 600.0))
            .await
            .unwrap_err();
        assert!(matches!(err, DetectionError::EmptyRegion));
    }
}
