// src/render/annotator.rs
//
// Frame layout:
//
//   ┌──────────────────────────────────────────┐
//   │ FEEDBACK (newest first)  │   CORRECT: n  │
//   │                          │ INCORRECT: n  │
//   │                                          │
//   │               skeleton  120°             │
//   │                                          │
//   │ BRAND | EXERCISE                         │
//   └──────────────────────────────────────────┘
//
// Panels are laid out first; the skeleton is clipped out of them so the
// regions never overlap.

use super::canvas::{text_width, Canvas, Rect, GLYPH_SIZE};
use super::skeleton::draw_skeleton;
use crate::analysis::AccumulatorSnapshot;
use crate::types::{Joint, OverlayConfig, Pose, Severity};
use image::{Rgb, RgbImage};

pub mod colors {
    use image::Rgb;

    pub const INFO_GREEN: Rgb<u8> = Rgb([60, 220, 60]);
    pub const WARNING_YELLOW: Rgb<u8> = Rgb([255, 210, 0]);
    pub const ERROR_RED: Rgb<u8> = Rgb([235, 50, 50]);
    pub const CORRECT_GREEN: Rgb<u8> = Rgb([60, 220, 60]);
    pub const INCORRECT_RED: Rgb<u8> = Rgb([235, 50, 50]);
    pub const TEXT_WHITE: Rgb<u8> = Rgb([255, 255, 255]);
    pub const ANGLE_YELLOW: Rgb<u8> = Rgb([255, 255, 0]);
    pub const PANEL_BG: Rgb<u8> = Rgb([0, 0, 0]);
}

const PANEL_ALPHA: f32 = 0.6;

pub fn severity_color(severity: Severity) -> Rgb<u8> {
    match severity {
        Severity::Info => colors::INFO_GREEN,
        Severity::Warning => colors::WARNING_YELLOW,
        Severity::Error => colors::ERROR_RED,
    }
}

/// Cuts `text` to at most `max_chars` characters, ending with "..." when cut.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    if max_chars <= 3 {
        return text.chars().take(max_chars).collect();
    }
    let mut out: String = text.chars().take(max_chars - 3).collect();
    out.push_str("...");
    out
}

/// Pixel regions of the overlay panels for one frame size.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelLayout {
    pub counters: Option<Rect>,
    pub feedback: Option<Rect>,
    pub branding: Option<Rect>,
}

impl PanelLayout {
    pub fn regions(&self) -> Vec<Rect> {
        [self.counters, self.feedback, self.branding]
            .into_iter()
            .flatten()
            .collect()
    }
}

pub struct FrameAnnotator {
    config: OverlayConfig,
    min_visibility: f32,
    /// Joints the angle label may sit next to, first visible one wins.
    angle_vertices: Vec<Joint>,
}

impl FrameAnnotator {
    pub fn new(config: OverlayConfig, min_visibility: f32) -> Self {
        Self {
            config,
            min_visibility,
            angle_vertices: Vec::new(),
        }
    }

    pub fn with_angle_vertices(mut self, joints: Vec<Joint>) -> Self {
        self.angle_vertices = joints;
        self
    }

    /// Text scale: 1 below 480 px on the short side, one more per 240 px.
    pub fn scale_for(width: u32, height: u32) -> u32 {
        (width.min(height) / 240).max(1)
    }

    /// Returns an annotated copy of `image`. Same inputs, same pixels.
    pub fn annotate(
        &self,
        image: &RgbImage,
        pose: Option<&Pose>,
        angle: Option<f32>,
        snapshot: &AccumulatorSnapshot,
        exercise_label: &str,
    ) -> RgbImage {
        let mut out = image.clone();
        let scale = Self::scale_for(out.width(), out.height());

        let counter_lines = [
            (format!("CORRECT: {}", snapshot.correct_count), colors::CORRECT_GREEN),
            (format!("INCORRECT: {}", snapshot.incorrect_count), colors::INCORRECT_RED),
        ];
        let feedback_count = snapshot
            .latest_feedback(self.config.max_feedback_items)
            .count();
        let widest_counter = counter_lines
            .iter()
            .map(|(text, _)| text.as_str())
            .max_by_key(|text| text.chars().count())
            .unwrap_or_default();
        let layout = self.layout(out.width(), out.height(), feedback_count, widest_counter);

        if let Some(pose) = pose {
            let mut canvas = Canvas::with_exclusions(&mut out, layout.regions());
            if self.config.draw_skeleton {
                draw_skeleton(&mut canvas, pose, self.min_visibility, scale);
            }
            if let (true, Some(angle)) = (self.config.draw_angle, angle) {
                self.draw_angle_label(&mut canvas, pose, angle, scale);
            }
        }

        let mut canvas = Canvas::new(&mut out);
        let pad = 4 * scale as i32;
        let line_height = Self::line_height(scale) as i32;

        if let Some(rect) = layout.counters {
            canvas.blend_rect(rect, colors::PANEL_BG, PANEL_ALPHA);
            for (i, (text, color)) in counter_lines.iter().enumerate() {
                // Right-aligned
                let x = rect.right() - pad - text_width(text, scale) as i32;
                let y = rect.y + pad + i as i32 * line_height;
                canvas.draw_text(x, y, text, scale, *color);
            }
        }

        if let Some(rect) = layout.feedback {
            canvas.blend_rect(rect, colors::PANEL_BG, PANEL_ALPHA);
            let fit = ((rect.width as i32 - 2 * pad).max(0) as u32 / (GLYPH_SIZE * scale)) as usize;
            let max_chars = self.config.max_feedback_chars.min(fit);
            let rows = (rect.height as i32 - 2 * pad + 4 * scale as i32) / line_height;

            for (i, message) in snapshot
                .latest_feedback(self.config.max_feedback_items)
                .take(rows.max(0) as usize)
                .enumerate()
            {
                let text = truncate_text(&message.text, max_chars);
                let y = rect.y + pad + i as i32 * line_height;
                canvas.draw_text(rect.x + pad, y, &text, scale, severity_color(message.severity));
            }
        }

        if let Some(rect) = layout.branding {
            canvas.blend_rect(rect, colors::PANEL_BG, PANEL_ALPHA);
            let fit = ((rect.width as i32 - 2 * pad).max(0) as u32 / (GLYPH_SIZE * scale)) as usize;
            let text = truncate_text(&self.brand_line(exercise_label), fit);
            canvas.draw_text(rect.x + pad, rect.y + pad, &text, scale, colors::TEXT_WHITE);
        }

        out
    }

    /// Angle value on a dark backing, right of the first visible vertex.
    /// Skipped when that vertex is off the frame.
    fn draw_angle_label(&self, canvas: &mut Canvas<'_>, pose: &Pose, angle: f32, scale: u32) {
        let Some(vertex) = self
            .angle_vertices
            .iter()
            .find_map(|joint| pose.visible(*joint, self.min_visibility))
        else {
            return;
        };
        let (w, h) = (canvas.width(), canvas.height());
        let (x, y) = vertex.to_pixel(w, h);
        if x < 0 || y < 0 || x >= w as i32 || y >= h as i32 {
            return;
        }

        let text = format!("{}°", angle.round() as i32);
        let pad = 2 * scale as i32;
        let origin_x = x + 5 * scale as i32;
        let origin_y = y - (GLYPH_SIZE * scale) as i32 / 2;
        let backing = Rect::new(
            origin_x - pad,
            origin_y - pad,
            text_width(&text, scale) + 2 * pad as u32,
            GLYPH_SIZE * scale + 2 * pad as u32,
        );
        canvas.blend_rect(backing, colors::PANEL_BG, PANEL_ALPHA);
        canvas.draw_text(origin_x, origin_y, &text, scale, colors::ANGLE_YELLOW);
    }

    fn brand_line(&self, exercise_label: &str) -> String {
        let label = exercise_label.to_uppercase();
        if self.config.brand_text.is_empty() {
            label
        } else {
            format!("{} | {}", self.config.brand_text, label)
        }
    }

    fn line_height(scale: u32) -> u32 {
        GLYPH_SIZE * scale + 4 * scale
    }

    /// Computes the panel rectangles. Panels that do not fit are dropped.
    pub fn layout(
        &self,
        width: u32,
        height: u32,
        feedback_items: usize,
        widest_counter: &str,
    ) -> PanelLayout {
        let scale = Self::scale_for(width, height);
        let pad = 4 * scale;
        let margin = 4 * scale;
        let line_height = Self::line_height(scale);
        let mut layout = PanelLayout::default();

        // Bottom bar first: everything else must end above it
        let mut usable_bottom = height as i32;
        if self.config.draw_branding {
            let bar_height = GLYPH_SIZE * scale + 2 * pad;
            if bar_height < height {
                let rect = Rect::new(0, (height - bar_height) as i32, width, bar_height);
                usable_bottom = rect.y - margin as i32;
                layout.branding = Some(rect);
            }
        }

        let mut feedback_right = width as i32 - margin as i32;
        if self.config.draw_counters {
            let panel_width = text_width(widest_counter, scale) + 2 * pad;
            let panel_height = 2 * line_height + 2 * pad - 4 * scale;
            let x = width as i32 - margin as i32 - panel_width as i32;
            let y = margin as i32;
            if x >= 0 && y + panel_height as i32 <= usable_bottom {
                let rect = Rect::new(x, y, panel_width, panel_height);
                feedback_right = rect.x - margin as i32;
                layout.counters = Some(rect);
            }
        }

        if self.config.draw_feedback && feedback_items > 0 {
            let x = margin as i32;
            let y = margin as i32;
            let panel_width = feedback_right - x;
            let room = usable_bottom - y - 2 * pad as i32 + 4 * scale as i32;
            let rows = (room / line_height as i32).min(feedback_items as i32);
            let min_width = (2 * pad + 4 * GLYPH_SIZE * scale) as i32;
            if rows > 0 && panel_width >= min_width {
                let panel_height = rows as u32 * line_height + 2 * pad - 4 * scale;
                layout.feedback = Some(Rect::new(x, y, panel_width as u32, panel_height));
            }
        }

        layout
    }
}
