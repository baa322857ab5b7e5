use serde::Deserialize;

/// Axis-aligned box in frame pixel coordinates, `x1 < x2`, `y1 < y2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "[i32; 4]")]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// Clamp to a `width` x `height` frame. Returns `None` when nothing of the
    /// box remains inside the frame.
    pub fn clamped(&self, width: u32, height: u32) -> Option<BoundingBox> {
        if width == 0 || height == 0 {
            return None;
        }
        let max_x = width as i32 - 1;
        let max_y = height as i32 - 1;
        let clamped = BoundingBox {
            x1: self.x1.clamp(0, max_x),
            y1: self.y1.clamp(0, max_y),
            x2: self.x2.clamp(0, max_x),
            y2: self.y2.clamp(0, max_y),
        };
        if clamped.x2 <= clamped.x1 || clamped.y2 <= clamped.y1 {
            None
        } else {
            Some(clamped)
        }
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from(coords: [i32; 4]) -> Self {
        Self::new(coords[0], coords[1], coords[2], coords[3])
    }
}

/// One object reported by the detector for one frame.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RawDetection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl RawDetection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// A detection that passed the class and confidence filter.
///
/// Lives only for the processing of the frame it was found in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AmbulanceSighting {
    pub bbox: BoundingBox,
    pub confidence: f32,
}
