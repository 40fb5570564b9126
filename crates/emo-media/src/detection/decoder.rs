//! Decoding of raw detector output into face boxes.
//!
//! Box geometry follows the anchor-free grid encoding: each proposal
//! predicts a sigmoid offset in `[-0.5, 1.5]` around its grid cell and a
//! squared sigmoid size relative to its stride, so no anchor boxes are
//! stored.

use serde::{Deserialize, Serialize};
use tracing::debug;

use emo_models::BoundingBox;

use super::grid::{GridProposal, GridTable};
use super::tensor::RawOutputTensor;
use crate::error::{MediaError, MediaResult};

/// Default minimum `objectness * class score` to keep a proposal.
pub const CONFIDENCE_THRESHOLD: f32 = 0.35;

/// Default IoU above which the lower-confidence box is suppressed.
pub const NMS_THRESHOLD: f32 = 0.45;

/// Box x, y, w, h and objectness.
const BOX_CHANNELS: usize = 5;
const OBJECTNESS: usize = 4;

/// Configuration for detection decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Model input width in pixels
    pub model_width: u32,
    /// Model input height in pixels
    pub model_height: u32,
    /// Head strides, finest first, in output order
    pub strides: Vec<u32>,
    /// Confidence threshold for detections
    pub confidence_threshold: f32,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            model_width: 640,
            model_height: 640,
            strides: vec![8, 16, 32],
            confidence_threshold: CONFIDENCE_THRESHOLD,
            nms_threshold: NMS_THRESHOLD,
        }
    }
}

/// Turns one output tensor into non-overlapping face boxes.
///
/// Holds the grid table for the model's input shape; decoding itself is a
/// pure function of tensor, grid and thresholds.
#[derive(Debug, Clone)]
pub struct DetectionDecoder {
    config: DecoderConfig,
    grid: GridTable,
}

impl DetectionDecoder {
    /// Build the decoder and its grid table.
    pub fn new(config: DecoderConfig) -> MediaResult<Self> {
        if config.model_width == 0 || config.model_height == 0 {
            return Err(MediaError::invalid_config(format!(
                "model input {}x{} is empty",
                config.model_width, config.model_height
            )));
        }
        let grid = GridTable::build(config.model_width, config.model_height, &config.strides)?;
        debug!(
            proposals = grid.len(),
            width = config.model_width,
            height = config.model_height,
            "Detection grid built"
        );
        Ok(Self { config, grid })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn grid(&self) -> &GridTable {
        &self.grid
    }

    /// Decode a tensor into boxes in the pixel space of an
    /// `image_width x image_height` source frame.
    pub fn decode(
        &self,
        tensor: &RawOutputTensor,
        image_width: u32,
        image_height: u32,
    ) -> MediaResult<Vec<BoundingBox>> {
        if tensor.channels() < BOX_CHANNELS {
            return Err(MediaError::shape_mismatch(format!(
                "tensor has {} channels, need at least {}",
                tensor.channels(),
                BOX_CHANNELS
            )));
        }
        self.grid.check_proposals(tensor.proposals())?;
        if image_width == 0 || image_height == 0 {
            return Err(MediaError::invalid_region(format!(
                "source frame {}x{} is empty",
                image_width, image_height
            )));
        }

        let frame = FrameScale {
            sx: image_width as f32 / self.config.model_width as f32,
            sy: image_height as f32 / self.config.model_height as f32,
            width: image_width as f32,
            height: image_height as f32,
        };

        let candidates: Vec<BoundingBox> = self
            .grid
            .proposals()
            .iter()
            .enumerate()
            .filter_map(|(i, proposal)| {
                decode_proposal(tensor, i, proposal, self.config.confidence_threshold, &frame)
            })
            .collect();

        let candidate_count = candidates.len();
        let kept = non_max_suppression(candidates, self.config.nms_threshold);

        debug!(
            proposals = tensor.proposals(),
            candidates = candidate_count,
            kept = kept.len(),
            "Detection decode completed"
        );

        Ok(kept)
    }
}

/// Model-to-frame scale and frame bounds.
struct FrameScale {
    sx: f32,
    sy: f32,
    width: f32,
    height: f32,
}

/// Decode a single proposal, or `None` if it falls below the threshold.
fn decode_proposal(
    tensor: &RawOutputTensor,
    index: usize,
    proposal: &GridProposal,
    threshold: f32,
    frame: &FrameScale,
) -> Option<BoundingBox> {
    let objectness = sigmoid(tensor.value(OBJECTNESS, index));
    let class_score = if tensor.channels() > BOX_CHANNELS {
        (BOX_CHANNELS..tensor.channels())
            .map(|c| sigmoid(tensor.value(c, index)))
            .fold(f32::NEG_INFINITY, f32::max)
    } else {
        1.0
    };
    let confidence = objectness * class_score;

    // Most proposals stop here; NaN scores are rejected too.
    if !(confidence >= threshold) {
        return None;
    }

    let stride = proposal.stride as f32;
    let cx = (sigmoid(tensor.value(0, index)) * 2.0 - 0.5 + proposal.grid_x as f32) * stride;
    let cy = (sigmoid(tensor.value(1, index)) * 2.0 - 0.5 + proposal.grid_y as f32) * stride;
    let w = (sigmoid(tensor.value(2, index)) * 2.0).powi(2) * stride;
    let h = (sigmoid(tensor.value(3, index)) * 2.0).powi(2) * stride;

    let left = (cx - w / 2.0) * frame.sx;
    let top = (cy - h / 2.0) * frame.sy;
    let right = left + w * frame.sx;
    let bottom = top + h * frame.sy;

    if ![left, top, right, bottom].iter().all(|v| v.is_finite()) {
        return None;
    }

    // Keep the box inside the frame with at least one pixel per side.
    let x1 = left.clamp(0.0, (frame.width - 1.0).max(0.0));
    let y1 = top.clamp(0.0, (frame.height - 1.0).max(0.0));
    let x2 = right.clamp(x1 + 1.0, frame.width.max(x1 + 1.0));
    let y2 = bottom.clamp(y1 + 1.0, frame.height.max(y1 + 1.0));

    Some(BoundingBox::new(x1, y1, x2 - x1, y2 - y1, confidence.min(1.0)))
}

/// Logistic function.
#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Greedy class-agnostic non-maximum suppression.
///
/// Boxes are visited by descending confidence; each kept box suppresses
/// every remaining box whose IoU with it exceeds `iou_threshold`.
pub fn non_max_suppression(mut boxes: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    if boxes.is_empty() {
        return boxes;
    }

    boxes.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; boxes.len()];

    for i in 0..boxes.len() {
        if suppressed[i] {
            continue;
        }

        keep.push(boxes[i]);

        for j in (i + 1)..boxes.len() {
            if !suppressed[j] && boxes[i].iou(&boxes[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Inverse sigmoid.
    fn logit(p: f32) -> f32 {
        (p / (1.0 - p)).ln()
    }

    fn single_cell_decoder() -> DetectionDecoder {
        DetectionDecoder::new(DecoderConfig {
            model_width: 32,
            model_height: 32,
            strides: vec![32],
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_config_default() {
        let config = DecoderConfig::default();
        assert_eq!(config.strides, vec![8, 16, 32]);
        assert!((config.confidence_threshold - 0.35).abs() < 1e-6);
        assert!((config.nms_threshold - 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(10.0) > 0.9999);
        assert!(sigmoid(-10.0) < 0.0001);
        assert!((sigmoid(logit(0.9)) - 0.9).abs() < 1e-5);
    }

    #[test]
    fn test_single_proposal_box_at_cell_origin() {
        let decoder = single_cell_decoder();
        let tensor =
            RawOutputTensor::from_shape(&[5, 1], vec![0.0, 0.0, 0.0, 0.0, logit(0.9)]).unwrap();

        let boxes = decoder.decode(&tensor, 32, 32).unwrap();

        assert_eq!(boxes.len(), 1);
        let b = boxes[0];
        // Zero offsets center the box on the cell with size == stride.
        assert!(b.x.abs() < 1e-4 && b.y.abs() < 1e-4);
        assert!((b.width - 32.0).abs() < 1e-4);
        assert!((b.height - 32.0).abs() < 1e-4);
        assert!((b.cx() - 16.0).abs() < 1e-4);
        assert!((b.confidence - 0.9).abs() < 1e-4);
    }

    #[test]
    fn test_scales_to_source_image() {
        let decoder = single_cell_decoder();
        let tensor =
            RawOutputTensor::from_shape(&[5, 1], vec![0.0, 0.0, -1.0, -1.0, logit(0.9)]).unwrap();

        let boxes = decoder.decode(&tensor, 64, 96).unwrap();
        let b = boxes[0];
        // w = (2 * sigmoid(-1))^2 * 32 in model space, then x2 / x3 scale
        let w_model = (2.0 * sigmoid(-1.0)).powi(2) * 32.0;
        assert!((b.width - w_model * 2.0).abs() < 1e-3);
        assert!((b.height - w_model * 3.0).abs() < 1e-3);
        assert!((b.cx() - 32.0).abs() < 1e-3);
        assert!((b.cy() - 48.0).abs() < 1e-3);
    }

    #[test]
    fn test_below_threshold_never_emitted() {
        let decoder = single_cell_decoder();
        for p in [0.01, 0.1, 0.2, 0.3, 0.34] {
            let tensor =
                RawOutputTensor::from_shape(&[5, 1], vec![0.0, 0.0, 0.0, 0.0, logit(p)]).unwrap();
            assert!(decoder.decode(&tensor, 32, 32).unwrap().is_empty(), "p={}", p);
        }
    }

    #[test]
    fn test_class_scores_multiply_objectness() {
        let decoder = single_cell_decoder();
        // objectness 0.9, best class 0.5 -> 0.45 (kept); worse class ignored
        let tensor = RawOutputTensor::from_shape(
            &[7, 1],
            vec![0.0, 0.0, 0.0, 0.0, logit(0.9), logit(0.2), logit(0.5)],
        )
        .unwrap();
        let boxes = decoder.decode(&tensor, 32, 32).unwrap();
        assert_eq!(boxes.len(), 1);
        assert!((boxes[0].confidence - 0.45).abs() < 1e-4);

        // objectness 0.9, best class 0.3 -> 0.27 (dropped)
        let tensor = RawOutputTensor::from_shape(
            &[6, 1],
            vec![0.0, 0.0, 0.0, 0.0, logit(0.9), logit(0.3)],
        )
        .unwrap();
        assert!(decoder.decode(&tensor, 32, 32).unwrap().is_empty());
    }

    #[test]
    fn test_too_few_channels_is_shape_mismatch() {
        let decoder = single_cell_decoder();
        let tensor = RawOutputTensor::from_shape(&[4, 1], vec![0.0; 4]).unwrap();
        assert!(matches!(
            decoder.decode(&tensor, 32, 32),
            Err(MediaError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_proposal_count_must_match_grid() {
        let decoder = single_cell_decoder();
        let tensor = RawOutputTensor::from_shape(&[5, 2], vec![0.0; 10]).unwrap();
        assert!(matches!(
            decoder.decode(&tensor, 32, 32),
            Err(MediaError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_boxes_clamped_inside_frame() {
        // 2x2 cells of stride 16, all confident, with extreme offsets/sizes
        let decoder = DetectionDecoder::new(DecoderConfig {
            model_width: 32,
            model_height: 32,
            strides: vec![16],
            nms_threshold: 1.0,
            ..Default::default()
        })
        .unwrap();
        let n = 4;
        let rows = vec![
            vec![-8.0, 8.0, -8.0, 8.0],
            vec![-8.0, -8.0, 8.0, 8.0],
            vec![8.0; n],
            vec![8.0; n],
            vec![5.0; n],
        ];
        let tensor = RawOutputTensor::from_channels(&rows).unwrap();

        let boxes = decoder.decode(&tensor, 50, 40).unwrap();
        assert_eq!(boxes.len(), n);
        for b in &boxes {
            assert!(b.x >= 0.0 && b.y >= 0.0, "{:?}", b);
            assert!(b.x2() <= 50.0 + 1e-4 && b.y2() <= 40.0 + 1e-4, "{:?}", b);
            assert!(b.width >= 1.0 - 1e-4 && b.height >= 1.0 - 1e-4, "{:?}", b);
        }
    }

    #[test]
    fn test_tiny_box_keeps_one_pixel() {
        let decoder = single_cell_decoder();
        let tensor =
            RawOutputTensor::from_shape(&[5, 1], vec![0.0, 0.0, -30.0, -30.0, logit(0.9)])
                .unwrap();
        let b = decoder.decode(&tensor, 32, 32).unwrap()[0];
        assert!((b.width - 1.0).abs() < 1e-4);
        assert!((b.height - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_nms_keeps_higher_confidence_of_overlapping_pair() {
        // IoU 0.6: 10x10 boxes offset by 2.5 -> inter 75, union 125
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0, 0.8);
        let b = BoundingBox::new(2.5, 0.0, 10.0, 10.0, 0.9);
        assert!((a.iou(&b) - 0.6).abs() < 1e-5);

        let kept = non_max_suppression(vec![a, b], NMS_THRESHOLD);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_disjoint_boxes_sorted() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0, 0.5);
        let b = BoundingBox::new(50.0, 50.0, 10.0, 10.0, 0.9);
        let kept = non_max_suppression(vec![a, b], NMS_THRESHOLD);
        assert_eq!(kept.len(), 2);
        assert!(kept[0].confidence >= kept[1].confidence);
    }

    fn pseudo_random_boxes(count: usize) -> Vec<BoundingBox> {
        // Deterministic LCG so the property holds for a spread of layouts.
        let mut state: u32 = 12345;
        let mut next = move || {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
            (state >> 8) as f32 / (1u32 << 24) as f32
        };
        (0..count)
            .map(|_| {
                BoundingBox::new(
                    next() * 200.0,
                    next() * 200.0,
                    10.0 + next() * 60.0,
                    10.0 + next() * 60.0,
                    next(),
                )
            })
            .collect()
    }

    #[test]
    fn test_nms_output_pairwise_below_threshold() {
        let kept = non_max_suppression(pseudo_random_boxes(200), NMS_THRESHOLD);
        for (i, a) in kept.iter().enumerate() {
            for b in kept.iter().skip(i + 1) {
                assert!(a.iou(b) <= NMS_THRESHOLD);
            }
        }
    }

    #[test]
    fn test_nms_idempotent() {
        let once = non_max_suppression(pseudo_random_boxes(200), NMS_THRESHOLD);
        let twice = non_max_suppression(once.clone(), NMS_THRESHOLD);
        assert_eq!(once, twice);
    }
}
