//! Live overlay drawing.
//!
//! The renderer reads snapshots of the signal controller and the statistics
//! and paints onto the frame. It never mutates shared state. Coordinates that
//! fall outside the frame are clamped rather than rejected.

use ab_glyph::{FontVec, PxScale};
use anyhow::Result;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;

use crate::config::OverlaySettings;
use crate::detect::{AmbulanceSighting, BoundingBox};
use crate::error::StartupError;
use crate::frame::Frame;
use crate::signal::SignalSnapshot;
use crate::stats::StatsSnapshot;

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const ACTIVE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const FPS_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

const BOX_THICKNESS: i32 = 2;
const PANEL_WIDTH: i32 = 290;
const PANEL_MARGIN: i32 = 10;
const PANEL_LINE_HEIGHT: i32 = 25;
/// Share of the original pixel kept under the panel (60 % black overlay).
const PANEL_KEEP: f32 = 0.4;
const LABEL_SCALE: f32 = 20.0;
const PANEL_SCALE: f32 = 20.0;
const FPS_SCALE: f32 = 24.0;

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

pub struct OverlayRenderer {
    font: Option<FontVec>,
}

impl OverlayRenderer {
    /// Build a renderer, loading the configured font or the first system font
    /// found. An explicitly configured font that cannot be loaded is a
    /// configuration error; a missing system font only disables text.
    pub fn new(settings: &OverlaySettings) -> Result<Self> {
        if let Some(path) = &settings.font_path {
            let font = load_font(path).ok_or_else(|| {
                StartupError::configuration(format!(
                    "overlay font '{}' could not be loaded",
                    path.display()
                ))
            })?;
            log::info!("overlay font: {}", path.display());
            return Ok(Self { font: Some(font) });
        }

        let found = FONT_CANDIDATES
            .iter()
            .map(Path::new)
            .find_map(|path| load_font(path).map(|font| (path, font)));
        match found {
            Some((path, font)) => {
                log::info!("overlay font: {}", path.display());
                Ok(Self { font: Some(font) })
            }
            None => {
                log::warn!("no overlay font found; labels and status text will not be drawn");
                Ok(Self::without_font())
            }
        }
    }

    /// Renderer that draws boxes and panels only.
    pub fn without_font() -> Self {
        Self { font: None }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Boxes, labels and the status panel.
    pub fn draw_overlay(
        &self,
        frame: &mut Frame,
        sightings: &[AmbulanceSighting],
        signal: &SignalSnapshot,
        stats: &StatsSnapshot,
    ) {
        let image = frame.image_mut();
        for sighting in sightings {
            self.draw_sighting(image, sighting);
        }
        self.draw_status_panel(image, signal, stats);
    }

    /// Smoothed FPS readout in the top-left corner.
    pub fn draw_fps(&self, frame: &mut Frame, average_fps: f64) {
        let text = format!("FPS: {:.1}", average_fps);
        self.draw_text(frame.image_mut(), FPS_COLOR, 10, 10, FPS_SCALE, &text);
    }

    fn draw_sighting(&self, image: &mut RgbImage, sighting: &AmbulanceSighting) {
        let Some(bbox) = sighting.bbox.clamped(image.width(), image.height()) else {
            return;
        };
        draw_box(image, &bbox, BOX_COLOR, BOX_THICKNESS);

        let Some(font) = &self.font else {
            return;
        };
        let label = format!("AMBULANCE {:.2}", sighting.confidence);
        let (tw, th) = text_size(PxScale::from(LABEL_SCALE), font, &label);
        let (tw, th) = (tw as i32, th as i32);
        // Above the box when there is room, otherwise just inside its top edge.
        let label_top = if bbox.y1 - th - 10 >= 0 {
            bbox.y1 - th - 10
        } else {
            bbox.y1 + BOX_THICKNESS
        };
        fill_rect_clamped(image, bbox.x1, label_top, tw + 4, th + 6, BOX_COLOR);
        draw_text_mut(
            image,
            TEXT_COLOR,
            bbox.x1 + 2,
            label_top + 2,
            PxScale::from(LABEL_SCALE),
            font,
            &label,
        );
    }

    fn draw_status_panel(&self, image: &mut RgbImage, signal: &SignalSnapshot, stats: &StatsSnapshot) {
        let emergency = signal.state.is_emergency();
        let mut lines = vec![
            format!("Detections: {}", stats.total_detections),
            format!("Signal Changes: {}", stats.signal_changes),
            format!("Emergency: {}", if emergency { "ACTIVE" } else { "NORMAL" }),
            format!("Signal: {}", signal.light()),
        ];
        if let (true, Some(remaining)) = (emergency, signal.remaining) {
            lines.push(format!("Reset in: {:.0}s", remaining.as_secs_f64().ceil()));
        }

        let width = image.width() as i32;
        let panel_left = width - PANEL_WIDTH - PANEL_MARGIN;
        let panel_height = PANEL_MARGIN * 2 + PANEL_LINE_HEIGHT * lines.len() as i32;
        darken_rect(image, panel_left, PANEL_MARGIN, PANEL_WIDTH, panel_height);

        let status_color = if emergency { ACTIVE_COLOR } else { TEXT_COLOR };
        for (i, text) in lines.iter().enumerate() {
            let color = if text.contains("ACTIVE") || text.contains("GREEN") {
                status_color
            } else {
                TEXT_COLOR
            };
            let y = PANEL_MARGIN * 2 + i as i32 * PANEL_LINE_HEIGHT;
            self.draw_text(image, color, panel_left + 10, y, PANEL_SCALE, text);
        }
    }

    fn draw_text(&self, image: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, scale: f32, text: &str) {
        if let Some(font) = &self.font {
            draw_text_mut(image, color, x, y, PxScale::from(scale), font, text);
        }
    }
}

fn load_font(path: &Path) -> Option<FontVec> {
    let bytes = std::fs::read(path).ok()?;
    match FontVec::try_from_vec(bytes) {
        Ok(font) => Some(font),
        Err(e) => {
            log::debug!("skipping font {}: {}", path.display(), e);
            None
        }
    }
}

/// Hollow box `thickness` pixels wide, growing inwards.
fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>, thickness: i32) {
    for inset in 0..thickness {
        let w = bbox.width() + 1 - 2 * inset;
        let h = bbox.height() + 1 - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(bbox.x1 + inset, bbox.y1 + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(image, rect, color);
    }
}

/// Intersect `(x, y, w, h)` with the image. `None` when nothing is left.
fn clip(image: &RgbImage, x: i32, y: i32, w: i32, h: i32) -> Option<(u32, u32, u32, u32)> {
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + w).min(image.width() as i32);
    let y1 = (y + h).min(image.height() as i32);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
}

fn fill_rect_clamped(image: &mut RgbImage, x: i32, y: i32, w: i32, h: i32, color: Rgb<u8>) {
    if let Some((x, y, w, h)) = clip(image, x, y, w, h) {
        draw_filled_rect_mut(image, Rect::at(x as i32, y as i32).of_size(w, h), color);
    }
}

/// Blend a black rectangle over the image.
fn darken_rect(image: &mut RgbImage, x: i32, y: i32, w: i32, h: i32) {
    let Some((x0, y0, w, h)) = clip(image, x, y, w, h) else {
        return;
    };
    for py in y0..y0 + h {
        for px in x0..x0 + w {
            let pixel = image.get_pixel_mut(px, py);
            for channel in pixel.0.iter_mut() {
                *channel = (*channel as f32 * PANEL_KEEP).round() as u8;
            }
        }
    }
}
