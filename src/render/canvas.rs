// src/render/canvas.rs
//
// Minimal raster primitives over an RgbImage. Every write goes through
// set_pixel, which clips to the image and to the exclusion rectangles.

use font8x8::{UnicodeFonts, BASIC_FONTS, LATIN_FONTS};
use image::{Rgb, RgbImage};

pub const GLYPH_SIZE: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Width in pixels of `text` drawn at `scale`.
pub fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * GLYPH_SIZE * scale
}

pub struct Canvas<'a> {
    image: &'a mut RgbImage,
    exclusions: Vec<Rect>,
}

impl<'a> Canvas<'a> {
    pub fn new(image: &'a mut RgbImage) -> Self {
        Self {
            image,
            exclusions: Vec::new(),
        }
    }

    /// Pixels inside any of `exclusions` are never written.
    pub fn with_exclusions(image: &'a mut RgbImage, exclusions: Vec<Rect>) -> Self {
        Self { image, exclusions }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn set_pixel(&mut self, x: i32, y: i32, color: Rgb<u8>) {
        if x < 0 || y < 0 || x >= self.image.width() as i32 || y >= self.image.height() as i32 {
            return;
        }
        if self.exclusions.iter().any(|r| r.contains(x, y)) {
            return;
        }
        self.image.put_pixel(x as u32, y as u32, color);
    }

    /// Bresenham line, clipped to the image before rasterizing so far-off
    /// endpoints cost nothing.
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgb<u8>) {
        let Some((x0, y0, x1, y1)) = clip_segment(x0, y0, x1, y1, self.width(), self.height())
        else {
            return;
        };

        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        let mut x = x0;
        let mut y = y0;

        loop {
            self.set_pixel(x, y, color);

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// Line of roughly `thickness` pixels, stroked by offsetting along the
    /// minor axis.
    pub fn draw_thick_line(
        &mut self,
        x0: i32,
        y0: i32,
        x1: i32,
        y1: i32,
        thickness: u32,
        color: Rgb<u8>,
    ) {
        let thickness = thickness.clamp(1, 64) as i32;
        let half = (thickness - 1) / 2;
        let steep = (y1 as i64 - y0 as i64).abs() > (x1 as i64 - x0 as i64).abs();
        for offset in -half..=(thickness - 1 - half) {
            if steep {
                self.draw_line(
                    x0.saturating_add(offset),
                    y0,
                    x1.saturating_add(offset),
                    y1,
                    color,
                );
            } else {
                self.draw_line(
                    x0,
                    y0.saturating_add(offset),
                    x1,
                    y1.saturating_add(offset),
                    color,
                );
            }
        }
    }

    pub fn fill_circle(&mut self, cx: i32, cy: i32, radius: i32, color: Rgb<u8>) {
        let radius = radius.max(0);
        let (w, h) = (self.width() as i64, self.height() as i64);
        let (cx64, cy64, r64) = (cx as i64, cy as i64, radius as i64);
        if cx64 + r64 < 0 || cy64 + r64 < 0 || cx64 - r64 >= w || cy64 - r64 >= h {
            return;
        }
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.set_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Rgb<u8>) {
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                self.set_pixel(x, y, color);
            }
        }
    }

    /// Mixes `color` into the rectangle with weight `alpha` (0.0 - 1.0).
    pub fn blend_rect(&mut self, rect: Rect, color: Rgb<u8>, alpha: f32) {
        let alpha = alpha.clamp(0.0, 1.0);
        for y in rect.y.max(0)..rect.bottom().min(self.image.height() as i32) {
            for x in rect.x.max(0)..rect.right().min(self.image.width() as i32) {
                let under = *self.image.get_pixel(x as u32, y as u32);
                let mixed = Rgb([
                    mix(under[0], color[0], alpha),
                    mix(under[1], color[1], alpha),
                    mix(under[2], color[2], alpha),
                ]);
                self.set_pixel(x, y, mixed);
            }
        }
    }

    /// Draws `text` with its top-left corner at (x, y). Characters missing
    /// from the ASCII and Latin-1 fonts are drawn as '?'. Returns the drawn
    /// width.
    pub fn draw_text(&mut self, x: i32, y: i32, text: &str, scale: u32, color: Rgb<u8>) -> u32 {
        let scale = scale.max(1) as i32;
        let advance = GLYPH_SIZE as i32 * scale;
        let width = text_width(text, scale as u32);
        let (right, bottom) = (x as i64 + width as i64, y as i64 + advance as i64);
        if right <= 0 || bottom <= 0 || x as i64 >= self.width() as i64 || y as i64 >= self.height() as i64 {
            return width;
        }

        for (i, ch) in text.chars().enumerate() {
            let glyph = BASIC_FONTS
                .get(ch)
                .or_else(|| LATIN_FONTS.get(ch))
                .or_else(|| BASIC_FONTS.get('?'))
                .unwrap_or([0; 8]);
            let origin_x = x + i as i32 * advance;

            for (row, bits) in glyph.iter().enumerate() {
                for col in 0..GLYPH_SIZE as i32 {
                    if (*bits >> col) & 1 == 0 {
                        continue;
                    }
                    let px = origin_x + col * scale;
                    let py = y + row as i32 * scale;
                    for sy in 0..scale {
                        for sx in 0..scale {
                            self.set_pixel(px + sx, py + sy, color);
                        }
                    }
                }
            }
        }
        width
    }
}

/// Liang-Barsky clip of the segment to the pixel grid of a `width` x
/// `height` image. Returns None when nothing of it is on screen.
fn clip_segment(
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
    width: u32,
    height: u32,
) -> Option<(i32, i32, i32, i32)> {
    if width == 0 || height == 0 {
        return None;
    }
    let (fx0, fy0) = (x0 as f64, y0 as f64);
    let dx = x1 as f64 - fx0;
    let dy = y1 as f64 - fy0;
    let (max_x, max_y) = (width as f64 - 1.0, height as f64 - 1.0);

    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;
    for (p, q) in [(-dx, fx0), (dx, max_x - fx0), (-dy, fy0), (dy, max_y - fy0)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }

    Some((
        (fx0 + t0 * dx).round() as i32,
        (fy0 + t0 * dy).round() as i32,
        (fx0 + t1 * dx).round() as i32,
        (fy0 + t1 * dy).round() as i32,
    ))
}

fn mix(under: u8, over: u8, alpha: f32) -> u8 {
    (under as f32 * (1.0 - alpha) + over as f32 * alpha).round() as u8
}
