//! YOLOv8-style leaf detector running on ONNX Runtime.
//!
//! The model takes a `[1, 3, 640, 640]` RGB tensor scaled to `0..1` and
//! produces `[1, 4 + classes, anchors]` rows of `cx, cy, w, h, scores...`.

use image::{DynamicImage, imageops::FilterType};
use ndarray::Array4;
use ort::session::Session;
use std::path::Path;
use std::sync::Mutex;

use super::{BoundingBox, DetectionError, LeafDetector, RawDetection};

const INPUT_SIZE: u32 = 640;
const IOU_THRESHOLD: f32 = 0.45;

pub struct OnnxLeafDetector {
    session: Mutex<Session>,
    input_name: String,
}

fn inference_err(e: impl std::fmt::Display) -> DetectionError {
    DetectionError::Inference(e.to_string())
}

impl OnnxLeafDetector {
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self, DetectionError> {
        let session = Session::builder()
            .map_err(inference_err)?
            .commit_from_file(model_path.as_ref())
            .map_err(|e| DetectionError::ModelUnavailable(e.to_string()))?;
        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| DetectionError::ModelUnavailable("model has no inputs".to_string()))?;
        Ok(Self {
            session: Mutex::new(session),
            input_name,
        })
    }

    fn preprocess(image: &DynamicImage) -> Array4<f32> {
        let resized = image
            .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
            .to_rgb8();
        let size = INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = f32::from(pixel[c]) / 255.0;
            }
        }
        tensor
    }
}

/// Decodes `[1, 4 + classes, anchors]` output into frame coordinates.
fn decode_output(
    dims: &[i64],
    data: &[f32],
    confidence: f32,
    scale_x: f32,
    scale_y: f32,
) -> Result<Vec<RawDetection>, DetectionError> {
    if dims.len() != 3 || dims[1] < 5 {
        return Err(DetectionError::Inference(format!(
            "unexpected output shape {dims:?}"
        )));
    }
    let rows = dims[1] as usize;
    let anchors = dims[2] as usize;
    if data.len() < rows * anchors {
        return Err(DetectionError::Inference("output tensor is truncated".to_string()));
    }
    let at = |row: usize, anchor: usize| data[row * anchors + anchor];

    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let (class_id, score) = (4..rows)
            .map(|row| (row - 4, at(row, anchor)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
        if !score.is_finite() || score < confidence {
            continue;
        }
        let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
        detections.push(RawDetection {
            bbox: BoundingBox::new(
                (cx - w / 2.0) * scale_x,
                (cy - h / 2.0) * scale_y,
                (cx + w / 2.0) * scale_x,
                (cy + h / 2.0) * scale_y,
            ),
            confidence: score,
            class_id: class_id as u32,
        });
    }
    Ok(non_max_suppression(detections, IOU_THRESHOLD))
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = ix * iy;
    let union = (a.x2 - a.x1) * (a.y2 - a.y1) + (b.x2 - b.x1) * (b.y2 - b.y1) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

/// Keeps the highest-scoring box of every overlapping group, best first.
fn non_max_suppression(mut detections: Vec<RawDetection>, threshold: f32) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<RawDetection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        if kept.iter().all(|k| iou(&k.bbox, &candidate.bbox) <= threshold) {
            kept.push(candidate);
        }
    }
    kept
}

impl LeafDetector for OnnxLeafDetector {
    fn detect(
        &self,
        image: &DynamicImage,
        confidence: f32,
    ) -> Result<Vec<RawDetection>, DetectionError> {
        let input = ort::value::Value::from_array(Self::preprocess(image)).map_err(inference_err)?;
        let scale_x = image.width() as f32 / INPUT_SIZE as f32;
        let scale_y = image.height() as f32 / INPUT_SIZE as f32;

        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectionError::Inference("detector session poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(inference_err)?;
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(inference_err)?;
        decode_output(shape.as_ref(), data, confidence, scale_x, scale_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_scales_and_suppresses_overlaps() {
        // One class, three anchors laid out row-major as [cx.., cy.., w.., h.., score..].
        let dims = [1, 5, 3];
        let data = [
            100.0, 104.0, 400.0, // cx
            100.0, 100.0, 400.0, // cy
            40.0, 40.0, 20.0, // w
            40.0, 40.0, 20.0, // h
            0.9, 0.7, 0.2, // score
        ];
        let detections = decode_output(&dims, &data, 0.5, 2.0, 1.0).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].confidence, 0.9);
        assert_eq!(detections[0].bbox.x1, 160.0);
        assert_eq!(detections[0].bbox.x2, 240.0);
        assert_eq!(detections[0].bbox.y1, 80.0);
    }

    #[test]
    fn test_rejects_unexpected_shape() {
        assert!(decode_output(&[1, 4, 2], &[0.0; 8], 0.5, 1.0, 1.0).is_err());
    }
}
