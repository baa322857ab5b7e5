#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use crate::config::DetectorSettings;
use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, RawDetection};
use crate::frame::Frame;

const CXYWH_OFFSET: usize = 4;

/// Tract-based backend for YOLOv8-style ONNX detectors.
///
/// The model is expected to take a `1x3xHxW` float input in [0, 1] and to
/// produce a `1x(4+nc)xN` output of centre/size boxes followed by per-class
/// scores. Boxes are scaled back to frame coordinates and suppressed per class
/// before they leave the backend.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    settings: DetectorSettings,
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    class_id: usize,
    score: f32,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let l = self.x1.max(other.x1);
        let r = self.x2.min(other.x2);
        let t = self.y1.max(other.y1);
        let b = self.y2.min(other.y2);
        let inter = (r - l).max(0.0) * (b - t).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, settings: DetectorSettings) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(
                        1,
                        3,
                        settings.input_height as usize,
                        settings.input_width as usize
                    ),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model, settings })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let resized = image::imageops::resize(
            frame.image(),
            self.settings.input_width,
            self.settings.input_height,
            FilterType::Triangle,
        );
        let width = self.settings.input_width as usize;
        let height = self.settings.input_height as usize;
        let pixels = resized.as_raw();
        if pixels.len() != width * height * 3 {
            return Err(anyhow!(
                "resized frame has {} bytes, expected {}",
                pixels.len(),
                width * height * 3
            ));
        }
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, height, width), |(_, c, y, x)| {
            pixels[(y * width + x) * 3 + c] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<RawDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output is not 1x(4+nc)xN")?;
        let (batch, channels, anchors) = view.dim();
        if batch != 1 || channels <= CXYWH_OFFSET {
            return Err(anyhow!(
                "unexpected model output shape {}x{}x{}",
                batch,
                channels,
                anchors
            ));
        }
        let nc = channels - CXYWH_OFFSET;
        let scale_x = frame.width() as f32 / self.settings.input_width as f32;
        let scale_y = frame.height() as f32 / self.settings.input_height as f32;

        let mut candidates = Vec::new();
        for i in 0..anchors {
            let (class_id, score) = (0..nc)
                .map(|c| (c, view[[0, CXYWH_OFFSET + c, i]]))
                .fold((0usize, f32::NEG_INFINITY), |best, x| {
                    if x.1 > best.1 {
                        x
                    } else {
                        best
                    }
                });
            if !score.is_finite() || score < self.settings.score_floor {
                continue;
            }
            let cx = view[[0, 0, i]] * scale_x;
            let cy = view[[0, 1, i]] * scale_y;
            let w = view[[0, 2, i]] * scale_x;
            let h = view[[0, 3, i]] * scale_y;
            candidates.push(Candidate {
                class_id,
                score,
                x1: cx - w / 2.0,
                y1: cy - h / 2.0,
                x2: cx + w / 2.0,
                y2: cy + h / 2.0,
            });
        }

        let kept = non_max_suppression(candidates, self.settings.iou_threshold);
        Ok(kept
            .into_iter()
            .filter_map(|cand| {
                let bbox = BoundingBox::new(
                    cand.x1.round() as i32,
                    cand.y1.round() as i32,
                    cand.x2.round() as i32,
                    cand.y2.round() as i32,
                )
                .clamped(frame.width(), frame.height())?;
                let label = self
                    .settings
                    .class_names
                    .get(cand.class_id)
                    .cloned()
                    .unwrap_or_else(|| format!("class_{}", cand.class_id));
                Some(RawDetection::new(label, cand.score.min(1.0), bbox))
            })
            .collect())
    }
}

/// Class-wise greedy NMS, highest score first.
fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for cand in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == cand.class_id && k.iou(&cand) > iou_threshold);
        if !suppressed {
            kept.push(cand);
        }
    }
    kept
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::filled(
            self.settings.input_width,
            self.settings.input_height,
            [114, 114, 114],
            0,
        );
        self.detect(&blank).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(class_id: usize, score: f32, x1: f32) -> Candidate {
        Candidate {
            class_id,
            score,
            x1,
            y1: 0.0,
            x2: x1 + 10.0,
            y2: 10.0,
        }
    }

    #[test]
    fn nms_drops_overlapping_same_class_boxes() {
        let kept = non_max_suppression(vec![cand(0, 0.6, 1.0), cand(0, 0.9, 0.0)], 0.45);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].score, 0.9);
    }

    #[test]
    fn nms_keeps_overlapping_boxes_of_other_classes() {
        let kept = non_max_suppression(vec![cand(0, 0.9, 0.0), cand(1, 0.8, 0.0)], 0.45);
        assert_eq!(kept.len(), 2);
    }
}
