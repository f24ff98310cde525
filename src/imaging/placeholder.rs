//! Last-resort placeholder images
//!
//! When every provider fails, callers may still want something to render.
//! The placeholder is an abstract pattern derived from the prompt with the
//! prompt text drawn on top, and it is always tagged as such.

use ab_glyph::{FontArc, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use tracing::{debug, warn};

use crate::config::{PlaceholderConfig, MAX_PLACEHOLDER_SIDE};
use crate::imaging::{encode_png, PNG_MIME};

/// Fonts tried when none is configured
const FALLBACK_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

const MAX_TEXT_LINES: usize = 4;

/// A synthesized stand-in for a real generation
#[derive(Debug, Clone)]
pub struct PlaceholderImage {
    pub bitmap: RgbImage,
    /// PNG encoding of `bitmap`
    pub png: Vec<u8>,
    /// Whether the prompt overlay made it onto the bitmap
    pub text_rendered: bool,
    pub seed: u64,
}

impl PlaceholderImage {
    pub fn width(&self) -> u32 {
        self.bitmap.width()
    }

    pub fn height(&self) -> u32 {
        self.bitmap.height()
    }

    pub fn mime_type(&self) -> &'static str {
        PNG_MIME
    }
}

/// Draws placeholder bitmaps of a fixed size
#[derive(Clone)]
pub struct PlaceholderSynthesizer {
    width: u32,
    height: u32,
    max_prompt_chars: usize,
    font: Option<FontArc>,
}

impl PlaceholderSynthesizer {
    pub fn new(width: u32, height: u32, max_prompt_chars: usize, font: Option<FontArc>) -> Self {
        Self {
            width: width.clamp(1, MAX_PLACEHOLDER_SIDE),
            height: height.clamp(1, MAX_PLACEHOLDER_SIDE),
            max_prompt_chars,
            font,
        }
    }

    /// Build from configuration, loading the overlay font if one can be found
    pub fn from_config(config: &PlaceholderConfig) -> Self {
        let font = load_font(config.font_path.as_deref());
        if font.is_none() {
            warn!("No font available, placeholders will be drawn without prompt text");
        }
        Self::new(config.width, config.height, config.max_prompt_chars, font)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Produce a placeholder for `prompt`. Without an explicit seed the
    /// pattern is derived from the prompt, so equal prompts look alike.
    pub fn synthesize(&self, prompt: &str, seed: Option<u64>) -> PlaceholderImage {
        let seed = seed.unwrap_or_else(|| prompt_seed(prompt));
        let mut rng = StdRng::seed_from_u64(seed);
        let mut bitmap = self.draw_pattern(&mut rng);

        let text = truncate_chars(prompt.trim(), self.max_prompt_chars);
        let text_rendered = match &self.font {
            Some(font) if !text.is_empty() => {
                self.draw_caption(&mut bitmap, font, &text);
                true
            }
            _ => false,
        };

        let png = match encode_png(&DynamicImage::ImageRgb8(bitmap.clone())) {
            Ok(png) => png,
            Err(e) => {
                warn!(error = %e, "Failed to encode placeholder as PNG");
                Vec::new()
            }
        };

        debug!(seed, text_rendered, size = png.len(), "Synthesized placeholder image");

        PlaceholderImage {
            bitmap,
            png,
            text_rendered,
            seed,
        }
    }

    fn draw_pattern(&self, rng: &mut StdRng) -> RgbImage {
        let (w, h) = (self.width, self.height);
        let from: [u8; 3] = rng.gen();
        let to: [u8; 3] = rng.gen();

        let mut bitmap = RgbImage::from_fn(w, h, |x, y| {
            // Diagonal gradient, t in [0, 1]
            let t = (x as f32 / w as f32 + y as f32 / h as f32) / 2.0;
            let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t) as u8;
            Rgb([mix(from[0], to[0]), mix(from[1], to[1]), mix(from[2], to[2])])
        });

        let max_radius = (w.min(h) / 4).max(1) as i32;
        for _ in 0..rng.gen_range(4..9) {
            let center = (rng.gen_range(0..w) as i32, rng.gen_range(0..h) as i32);
            let radius = rng.gen_range(1..=max_radius);
            let color: [u8; 3] = rng.gen();
            // Lighten towards white so circles sit softly on the gradient
            let color = Rgb(color.map(|c| c / 2 + 127));
            draw_filled_circle_mut(&mut bitmap, center, radius, color);
        }

        bitmap
    }

    fn draw_caption(&self, bitmap: &mut RgbImage, font: &FontArc, text: &str) {
        let (w, h) = (self.width, self.height);
        let scale = PxScale::from((h as f32 / 20.0).max(8.0));
        let chars_per_line = ((w as f32 * 0.9) / (scale.x * 0.55)).max(1.0) as usize;
        let lines = wrap_words(text, chars_per_line, MAX_TEXT_LINES);

        let line_height = scale.y.ceil() as u32 + 4;
        let block_height = line_height * lines.len() as u32 + 8;
        let top = h.saturating_sub(block_height + h / 16);

        draw_filled_rect_mut(
            bitmap,
            Rect::at(0, top as i32).of_size(w, block_height.min(h)),
            Rgb([20, 20, 28]),
        );

        for (i, line) in lines.iter().enumerate() {
            let (text_w, _) = text_size(scale, font, line);
            let x = (w.saturating_sub(text_w) / 2) as i32;
            let y = (top + 4 + line_height * i as u32) as i32;
            draw_text_mut(bitmap, Rgb([240, 240, 240]), x, y, scale, font, line);
        }
    }
}

/// Load a font from `path`, or from the first usable system font
pub fn load_font(path: Option<&Path>) -> Option<FontArc> {
    let candidates = path
        .map(|p| vec![p.to_path_buf()])
        .unwrap_or_else(|| FALLBACK_FONT_PATHS.iter().map(Into::into).collect());

    candidates.into_iter().find_map(|candidate| {
        let bytes = std::fs::read(&candidate).ok()?;
        match FontArc::try_from_vec(bytes) {
            Ok(font) => {
                debug!(path = ?candidate, "Loaded placeholder font");
                Some(font)
            }
            Err(e) => {
                warn!(path = ?candidate, error = %e, "Unusable placeholder font");
                None
            }
        }
    })
}

fn prompt_seed(prompt: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    prompt.hash(&mut hasher);
    hasher.finish()
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

/// Greedy word wrap; words longer than a line are split
fn wrap_words(text: &str, width: usize, max_lines: usize) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        for chunk in chars.chunks(width) {
            let piece: String = chunk.iter().collect();
            let current_len = current.chars().count();
            if current_len == 0 {
                current = piece;
            } else if current_len + 1 + chunk.len() <= width {
                current.push(' ');
                current.push_str(&piece);
            } else {
                lines.push(std::mem::replace(&mut current, piece));
            }
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    lines.truncate(max_lines);
    lines
}
