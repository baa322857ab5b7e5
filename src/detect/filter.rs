//! Class and confidence filtering of raw detections.

use crate::detect::result::{AmbulanceSighting, RawDetection};

/// Keep detections whose label equals `class_filter` (ASCII case-insensitive)
/// and whose confidence is strictly greater than `min_confidence`.
///
/// Input order is preserved and overlapping boxes are not merged.
pub fn filter_detections(
    raw: &[RawDetection],
    class_filter: &str,
    min_confidence: f32,
) -> Vec<AmbulanceSighting> {
    raw.iter()
        .filter(|det| det.label.eq_ignore_ascii_case(class_filter))
        .filter(|det| det.confidence > min_confidence)
        .map(|det| AmbulanceSighting {
            bbox: det.bbox,
            confidence: det.confidence,
        })
        .collect()
}

/// Filter settings captured once at startup.
#[derive(Clone, Debug)]
pub struct DetectionFilter {
    class_filter: String,
    min_confidence: f32,
}

impl DetectionFilter {
    pub fn new(class_filter: impl Into<String>, min_confidence: f32) -> Self {
        Self {
            class_filter: class_filter.into(),
            min_confidence,
        }
    }

    pub fn class_filter(&self) -> &str {
        &self.class_filter
    }

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    pub fn apply(&self, raw: &[RawDetection]) -> Vec<AmbulanceSighting> {
        filter_detections(raw, &self.class_filter, self.min_confidence)
    }
}
