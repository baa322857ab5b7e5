use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;
use crate::frame::Frame;

/// On-disk shape of a detection script.
///
/// ```json
/// {
///   "repeat": true,
///   "frames": [
///     [],
///     [{"label": "ambulance", "confidence": 0.92, "bbox": [40, 60, 300, 260]}]
///   ]
/// }
/// ```
#[derive(Debug, Deserialize)]
struct DetectionScript {
    frames: Vec<Vec<RawDetection>>,
    #[serde(default)]
    repeat: bool,
}

/// Replays a fixed sequence of per-frame detections.
///
/// Used for recorded runs (a `.json` model path), the synthetic demo and
/// tests. Frame `n` of the stream gets entry `n` of the script; past the end
/// the script either wraps (`repeat`) or yields nothing.
pub struct ScriptedBackend {
    frames: Vec<Vec<RawDetection>>,
    repeat: bool,
    cursor: usize,
}

impl ScriptedBackend {
    pub fn new(frames: Vec<Vec<RawDetection>>) -> Self {
        Self {
            frames,
            repeat: false,
            cursor: 0,
        }
    }

    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }

    /// Load a detection script from a JSON file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read detection script {}", path.display()))?;
        let script: DetectionScript = serde_json::from_str(&raw)
            .with_context(|| format!("invalid detection script {}", path.display()))?;
        for (idx, frame) in script.frames.iter().enumerate() {
            for det in frame {
                if det.bbox.x1 >= det.bbox.x2 || det.bbox.y1 >= det.bbox.y2 {
                    return Err(anyhow!(
                        "detection script frame {} has a degenerate box {:?}",
                        idx,
                        det.bbox
                    ));
                }
                if !(0.0..=1.0).contains(&det.confidence) {
                    return Err(anyhow!(
                        "detection script frame {} has confidence {} outside [0, 1]",
                        idx,
                        det.confidence
                    ));
                }
            }
        }
        Ok(Self {
            frames: script.frames,
            repeat: script.repeat,
            cursor: 0,
        })
    }

    /// Number of scripted frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>> {
        if self.frames.is_empty() {
            return Ok(Vec::new());
        }
        let idx = if self.repeat {
            self.cursor % self.frames.len()
        } else {
            self.cursor
        };
        self.cursor += 1;
        Ok(self.frames.get(idx).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;
    use std::io::Write;

    fn ambulance() -> RawDetection {
        RawDetection::new("ambulance", 0.9, BoundingBox::new(1, 1, 5, 5))
    }

    #[test]
    fn replays_then_runs_dry() {
        let mut backend = ScriptedBackend::new(vec![vec![], vec![ambulance()]]);
        let frame = Frame::filled(8, 8, [0, 0, 0], 1);
        assert!(backend.detect(&frame).unwrap().is_empty());
        assert_eq!(backend.detect(&frame).unwrap(), vec![ambulance()]);
        assert!(backend.detect(&frame).unwrap().is_empty());
        assert!(backend.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn repeating_script_wraps() {
        let mut backend = ScriptedBackend::new(vec![vec![ambulance()], vec![]]).repeating();
        let frame = Frame::filled(8, 8, [0, 0, 0], 1);
        let counts: Vec<usize> = (0..4)
            .map(|_| backend.detect(&frame).unwrap().len())
            .collect();
        assert_eq!(counts, vec![1, 0, 1, 0]);
    }

    #[test]
    fn loads_script_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"repeat": false, "frames": [[{{"label": "ambulance", "confidence": 0.8, "bbox": [0, 0, 4, 4]}}], []]}}"#
        )
        .unwrap();
        let backend = ScriptedBackend::from_path(file.path()).unwrap();
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn rejects_degenerate_boxes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"frames": [[{{"label": "ambulance", "confidence": 0.8, "bbox": [4, 0, 4, 4]}}]]}}"#
        )
        .unwrap();
        assert!(ScriptedBackend::from_path(file.path()).is_err());
    }

    #[test]
    fn rejects_confidence_outside_unit_range() {
        for confidence in ["1.5", "-0.1"] {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            write!(
                file,
                r#"{{"frames": [[], [{{"label": "ambulance", "confidence": {}, "bbox": [0, 0, 4, 4]}}]]}}"#,
                confidence
            )
            .unwrap();
            let err = ScriptedBackend::from_path(file.path()).err().unwrap();
            assert!(err.to_string().contains("outside [0, 1]"), "{}", err);
        }
    }
}
