//! BlazeFace face detector using ONNX Runtime via `ort`.
//!
//! Produces plain bounding boxes, highest confidence first, capped at a
//! configurable face count.
use std::path::Path;

use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::constants::{DEFAULT_CONFIDENCE, DEFAULT_MAX_FACES};
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// BlazeFace model input resolution.
const INPUT_SIZE: u32 = 128;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f32 = 0.3;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

/// Values per anchor in the regressor output (box + 6 keypoints).
const REGRESSOR_STRIDE: usize = 16;

pub struct OnnxBlazefaceDetector {
    session: ort::session::Session,
    confidence: f32,
    max_faces: usize,
    anchors: Vec<[f32; 2]>,
}

impl OnnxBlazefaceDetector {
    /// Load a BlazeFace ONNX model with default thresholds.
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_options(model_path, DEFAULT_CONFIDENCE, DEFAULT_MAX_FACES)
    }

    pub fn with_options(
        model_path: &Path,
        confidence: f64,
        max_faces: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(format!("confidence must be within 0.0-1.0, got {confidence}").into());
        }
        if max_faces == 0 {
            return Err("max_faces must be at least 1".into());
        }
        let session = ort::session::Session::builder()?.commit_from_file(model_path)?;
        log::info!(
            "Loaded BlazeFace model {} (confidence={confidence}, max_faces={max_faces})",
            model_path.display()
        );
        Ok(Self {
            session,
            confidence: confidence as f32,
            max_faces,
            anchors: generate_anchors(),
        })
    }
}

impl FaceDetector for OnnxBlazefaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }
        if frame.channels() != 3 {
            return Err(format!("BlazeFace expects RGB input, got {} channels", frame.channels()).into());
        }

        let input = ort::value::Tensor::from_array(preprocess(frame, INPUT_SIZE))?;
        let outputs = self.session.run(ort::inputs![input])?;

        // regressors: [1, 896, 16], classificators: [1, 896, 1]
        if outputs.len() < 2 {
            return Err(
                format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into(),
            );
        }
        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors.as_slice().ok_or("Cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?;

        let candidates = decode(
            reg_data,
            score_data,
            &self.anchors,
            self.confidence,
            (frame.width(), frame.height()),
        );
        let kept = nms(candidates, NMS_IOU_THRESH);

        let regions: Vec<Region> = kept
            .iter()
            .map(|c| c.to_region(frame.width(), frame.height()))
            .filter(|r| !r.is_empty())
            .take(self.max_faces)
            .collect();
        log::debug!("BlazeFace found {} face(s) in frame {}", regions.len(), frame.index());
        Ok(regions)
    }
}

/// Scored box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let iw = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let ih = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = iw * ih;
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }

    fn to_region(self, frame_w: u32, frame_h: u32) -> Region {
        let x = self.x1.round() as i32;
        let y = self.y1.round() as i32;
        let w = (self.x2 - self.x1).round() as i32;
        let h = (self.y2 - self.y1).round() as i32;
        Region::new(x, y, w, h).clamp_to(frame_w, frame_h)
    }
}

/// Resize frame to `size × size` (nearest sample at pixel centers) and
/// normalize to [0,1] NCHW float32.
fn preprocess(frame: &Frame, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let (src_h, src_w) = (frame.height() as usize, frame.width() as usize);
    let s = size as usize;

    ndarray::Array4::<f32>::from_shape_fn((1, 3, s, s), |(_, c, y, x)| {
        let sy = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        let sx = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
        src[[sy, sx, c]] as f32 / 255.0
    })
}

/// Short-range anchors: a 16×16 grid with 2 anchors per cell followed by
/// an 8×8 grid with 6 anchors per cell, centers in unit coordinates.
fn generate_anchors() -> Vec<[f32; 2]> {
    let layers = [(8usize, 2usize), (16, 6)]; // (stride, anchors_per_cell)
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    for (stride, per_cell) in layers {
        let grid = INPUT_SIZE as usize / stride;
        for y in 0..grid {
            for x in 0..grid {
                let center = [
                    (x as f32 + 0.5) / grid as f32,
                    (y as f32 + 0.5) / grid as f32,
                ];
                anchors.extend(std::iter::repeat(center).take(per_cell));
            }
        }
    }
    anchors
}

/// Turns raw model output into frame-space candidates above `confidence`.
fn decode(
    regressors: &[f32],
    scores: &[f32],
    anchors: &[[f32; 2]],
    confidence: f32,
    (frame_w, frame_h): (u32, u32),
) -> Vec<Candidate> {
    let input = INPUT_SIZE as f32;
    let (fw, fh) = (frame_w as f32, frame_h as f32);

    scores
        .iter()
        .zip(anchors)
        .enumerate()
        .filter_map(|(i, (&raw, anchor))| {
            let score = sigmoid(raw);
            let reg = regressors.get(i * REGRESSOR_STRIDE..i * REGRESSOR_STRIDE + 4)?;
            if score < confidence {
                return None;
            }
            let cx = anchor[0] + reg[0] / input;
            let cy = anchor[1] + reg[1] / input;
            let (w, h) = (reg[2] / input, reg[3] / input);
            Some(Candidate {
                x1: ((cx - w / 2.0) * fw).max(0.0),
                y1: ((cy - h / 2.0) * fh).max(0.0),
                x2: ((cx + w / 2.0) * fw).min(fw),
                y2: ((cy + h / 2.0) * fh).min(fh),
                score,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression, highest score first.
fn nms(mut candidates: Vec<Candidate>, iou_thresh: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Candidate> = Vec::new();
    for c in candidates {
        if kept.iter().all(|k| k.iou(&c) <= iou_thresh) {
            kept.push(c);
        }
    }
    kept
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
