// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame annotation: detection boxes colored by track, per-track center
//! trails, parking-space rectangles, plate labels, and barrier-zone overlays.

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;

use ab_glyph::{FontArc, PxScale};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut,
};
use imageproc::rect::Rect;

use parkhub::wire::NormBox;

use crate::detect::Detection;

const SPACE_FREE: Rgb<u8> = Rgb([40, 200, 40]);
const SPACE_OCCUPIED: Rgb<u8> = Rgb([220, 40, 40]);
const BARRIER_ZONE: Rgb<u8> = Rgb([230, 180, 30]);
const LABEL_TEXT: Rgb<u8> = Rgb([255, 255, 255]);
const LABEL_BACKDROP: Rgb<u8> = Rgb([20, 20, 20]);
const UNTRACKED: Rgb<u8> = Rgb([200, 200, 200]);

/// Distinct colors cycled by track id.
const TRACK_PALETTE: [Rgb<u8>; 8] = [
    Rgb([66, 135, 245]),
    Rgb([245, 130, 48]),
    Rgb([60, 180, 75]),
    Rgb([240, 50, 230]),
    Rgb([70, 240, 240]),
    Rgb([250, 190, 20]),
    Rgb([145, 30, 180]),
    Rgb([128, 200, 0]),
];

const LABEL_SCALE: f32 = 14.0;

/// One space as the annotator should render it: FSM-derived occupancy, not
/// the raw matcher output.
#[derive(Debug, Clone)]
pub struct SpaceRender {
    pub name: String,
    pub bbox: NormBox,
    pub occupied: bool,
    pub plate: Option<String>,
}

struct Trail {
    points: VecDeque<(f32, f32)>,
    last_seen: u64,
}

/// Per-camera overlay renderer.  Owns the track trail history.
pub struct Annotator {
    font: Option<FontArc>,
    trail_length: usize,
    trails: HashMap<u64, Trail>,
    frame_index: u64,
}

impl Annotator {
    /// Without a font, text labels are skipped and only geometry is drawn.
    pub fn new(font: Option<FontArc>, trail_length: usize) -> Self {
        Self { font, trail_length: trail_length.max(1), trails: HashMap::new(), frame_index: 0 }
    }

    /// Load a TTF/OTF label font.
    pub fn load_font(path: &std::path::Path) -> anyhow::Result<FontArc> {
        let bytes = std::fs::read(path)?;
        Ok(FontArc::try_from_vec(bytes)?)
    }

    /// Draw all overlays for one frame in place.
    pub fn annotate(
        &mut self,
        image: &mut RgbImage,
        detections: &[Detection],
        spaces: &[SpaceRender],
        barrier_zones: &[NormBox],
    ) {
        self.frame_index += 1;
        self.record_trails(detections);

        let (w, h) = image.dimensions();

        for zone in barrier_zones {
            if let Some(rect) = norm_rect(zone, w, h) {
                draw_hollow_rect_mut(image, rect, BARRIER_ZONE);
            }
        }

        for space in spaces {
            let color = if space.occupied { SPACE_OCCUPIED } else { SPACE_FREE };
            if let Some(rect) = norm_rect(&space.bbox, w, h) {
                draw_hollow_rect_mut(image, rect, color);
                // Double-stroke so the space outline reads at a distance.
                if let Some(inner) = shrink(rect, w, h) {
                    draw_hollow_rect_mut(image, inner, color);
                }
                let label = match &space.plate {
                    Some(plate) => format!("{} [{}]", space.name, plate),
                    None => space.name.clone(),
                };
                self.label(image, rect.left(), rect.top(), &label);
            }
        }

        for detection in detections {
            let color = track_color(detection.track_id);
            if let Some(rect) = pixel_rect(detection, w, h) {
                draw_hollow_rect_mut(image, rect, color);
                let label = match detection.track_id {
                    Some(id) => format!("{} {:.0}% #{id}", detection.class, detection.confidence * 100.0),
                    None => format!("{} {:.0}%", detection.class, detection.confidence * 100.0),
                };
                self.label(image, rect.left(), rect.top(), &label);
            }
            if let Some(id) = detection.track_id {
                if let Some(trail) = self.trails.get(&id) {
                    draw_trail(image, trail, color);
                }
            }
        }
    }

    /// Number of tracks with live trails.
    pub fn trail_count(&self) -> usize {
        self.trails.len()
    }

    /// Trail points currently held for a track.
    pub fn trail_points(&self, track_id: u64) -> usize {
        self.trails.get(&track_id).map(|t| t.points.len()).unwrap_or(0)
    }

    fn record_trails(&mut self, detections: &[Detection]) {
        for detection in detections {
            let Some(id) = detection.track_id else { continue };
            let trail = self
                .trails
                .entry(id)
                .or_insert_with(|| Trail { points: VecDeque::new(), last_seen: 0 });
            trail.points.push_back(detection.bbox.center());
            while trail.points.len() > self.trail_length {
                trail.points.pop_front();
            }
            trail.last_seen = self.frame_index;
        }

        // Forget tracks that have been gone long enough that their trail is
        // stale anyway.
        let horizon = self.frame_index.saturating_sub(self.trail_length as u64);
        self.trails.retain(|_, trail| trail.last_seen > horizon || trail.last_seen == self.frame_index);
    }

    fn label(&self, image: &mut RgbImage, x: i32, y: i32, text: &str) {
        let Some(ref font) = self.font else { return };
        let scale = PxScale::from(LABEL_SCALE);
        let text_y = (y - LABEL_SCALE as i32 - 2).max(0);
        let backdrop_w = (text.len() as u32 * (LABEL_SCALE as u32 / 2 + 2)).max(1);
        let backdrop = Rect::at(x.max(0), text_y).of_size(backdrop_w, LABEL_SCALE as u32 + 4);
        draw_filled_rect_mut(image, backdrop, LABEL_BACKDROP);
        draw_text_mut(image, LABEL_TEXT, x.max(0) + 2, text_y + 2, scale, font, text);
    }
}

/// JPEG-encode an annotated frame at the configured quality.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> anyhow::Result<Bytes> {
    let mut buf = Cursor::new(Vec::with_capacity(64 * 1024));
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(image)?;
    Ok(Bytes::from(buf.into_inner()))
}

fn track_color(track_id: Option<u64>) -> Rgb<u8> {
    match track_id {
        Some(id) => TRACK_PALETTE[(id % TRACK_PALETTE.len() as u64) as usize],
        None => UNTRACKED,
    }
}

/// Convert a normalized box to a drawable rect clamped to the image.
fn norm_rect(bbox: &NormBox, img_w: u32, img_h: u32) -> Option<Rect> {
    let x = (bbox.x * img_w as f32).round() as i32;
    let y = (bbox.y * img_h as f32).round() as i32;
    let w = (bbox.w * img_w as f32).round() as i32;
    let h = (bbox.h * img_h as f32).round() as i32;
    clamp_rect(x, y, w, h, img_w, img_h)
}

/// Convert a detection's pixel box to a drawable rect clamped to the image.
fn pixel_rect(detection: &Detection, img_w: u32, img_h: u32) -> Option<Rect> {
    let b = &detection.bbox;
    clamp_rect(b.x, b.y, b.w, b.h, img_w, img_h)
}

fn clamp_rect(x: i32, y: i32, w: i32, h: i32, img_w: u32, img_h: u32) -> Option<Rect> {
    let x0 = x.clamp(0, img_w.saturating_sub(1) as i32);
    let y0 = y.clamp(0, img_h.saturating_sub(1) as i32);
    let x1 = (x + w).clamp(0, img_w as i32);
    let y1 = (y + h).clamp(0, img_h as i32);
    let cw = x1 - x0;
    let ch = y1 - y0;
    if cw <= 0 || ch <= 0 {
        return None;
    }
    Some(Rect::at(x0, y0).of_size(cw as u32, ch as u32))
}

fn shrink(rect: Rect, img_w: u32, img_h: u32) -> Option<Rect> {
    clamp_rect(rect.left() + 1, rect.top() + 1, rect.width() as i32 - 2, rect.height() as i32 - 2, img_w, img_h)
}

fn draw_trail(image: &mut RgbImage, trail: &Trail, color: Rgb<u8>) {
    let points: Vec<_> = trail.points.iter().collect();
    for pair in points.windows(2) {
        draw_line_segment_mut(image, *pair[0], *pair[1], color);
    }
}

#[cfg(test)]
#[path = "annotate_tests.rs"]
mod tests;
