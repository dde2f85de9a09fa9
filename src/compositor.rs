//! Caption-band compositing.
//!
//! Fits arbitrary-length caption text to the source image width by shrinking
//! the font and, past a floor, greedy word-wrapping; renders the caption on a
//! white band stacked above the image; returns the canvas plus its PNG bytes.

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};

use crate::constants::{DEFAULT_BUFFER_SCALE, DEFAULT_FONT_SCALE, DEFAULT_MIN_SCALE};
use crate::error::MemeError;

/// Tunable fitting ratios, all expressed as fractions of the image width.
#[derive(Clone, Copy, Debug)]
pub struct CompositorOptions {
    /// Floor for the caption font size.
    pub min_scale: f32,
    /// Band buffer around the caption text.
    pub buffer_scale: f32,
    /// Starting caption font size.
    pub font_scale: f32,
}

impl Default for CompositorOptions {
    fn default() -> Self {
        Self {
            min_scale: DEFAULT_MIN_SCALE,
            buffer_scale: DEFAULT_BUFFER_SCALE,
            font_scale: DEFAULT_FONT_SCALE,
        }
    }
}

/// A finished meme: the stacked canvas and its in-memory PNG encoding.
#[derive(Clone, Debug)]
pub struct ComposedMeme {
    /// Caption band stacked above the source image.
    pub image: RgbaImage,
    /// The canvas encoded as PNG.
    pub png_bytes: Vec<u8>,
}

/// Caption lines and the font size they are rendered at.
#[derive(Clone, Debug, PartialEq)]
struct CaptionLayout {
    lines: Vec<String>,
    font_size: f32,
}

/// Composites the caption band above the source image.
///
/// The same inputs always produce byte-identical output.
pub fn compose_meme(
    image_bytes: &[u8],
    caption: &str,
    font: &FontVec,
    options: &CompositorOptions,
) -> Result<ComposedMeme, MemeError> {
    let source = image::load_from_memory(image_bytes)?.to_rgba8();
    let width = source.width();

    let buffer = (options.buffer_scale * width as f32) as u32;
    let available = width.saturating_sub(2 * buffer);
    let layout = fit_caption(font, caption, width, available, options);
    let band_height = band_height(font, &layout, buffer);

    let scale = PxScale::from(layout.font_size);
    let scaled = font.as_scaled(scale);
    let line_advance = scaled.height() + scaled.line_gap();

    let mut band = RgbaImage::from_pixel(width, band_height, Rgba([255, 255, 255, 255]));
    let block_height = text_block_height(font, &layout);
    let mut y = (band_height as f32 - block_height) / 2.0;
    for line in &layout.lines {
        let line_width = measure_line(font, layout.font_size, line);
        let x = (width as f32 - line_width as f32) / 2.0;
        draw_text_mut(
            &mut band,
            Rgba([0, 0, 0, 255]),
            x.round() as i32,
            y.round() as i32,
            scale,
            font,
            line,
        );
        y += line_advance;
    }

    let mut canvas = RgbaImage::new(width, source.height() + band_height);
    image::imageops::replace(&mut canvas, &band, 0, 0);
    image::imageops::replace(&mut canvas, &source, 0, i64::from(band_height));

    let mut png_bytes = Vec::new();
    canvas.write_to(
        &mut std::io::Cursor::new(&mut png_bytes),
        image::ImageFormat::Png,
    )?;

    Ok(ComposedMeme {
        image: canvas,
        png_bytes,
    })
}

/// Shrinks the font until the caption fits on one line, or past the floor,
/// wraps it instead at the current size.
fn fit_caption(
    font: &FontVec,
    caption: &str,
    width: u32,
    available: u32,
    options: &CompositorOptions,
) -> CaptionLayout {
    let mut font_size = options.font_scale * width as f32;
    let min_size = options.min_scale * width as f32;

    loop {
        if measure_line(font, font_size, caption) <= available {
            return CaptionLayout {
                lines: vec![caption.to_string()],
                font_size,
            };
        }
        font_size *= 0.9;
        if font_size < min_size {
            return CaptionLayout {
                lines: wrap_greedy(font, font_size, caption, available),
                font_size,
            };
        }
    }
}

/// Greedy word-wrap: pack whole words per line, breaking only when the next
/// word would overflow. A single word wider than the bound keeps its own
/// line and is allowed to overflow; there is no hyphenation.
fn wrap_greedy(font: &FontVec, font_size: f32, text: &str, available: u32) -> Vec<String> {
    let mut words = text.split_whitespace();
    let Some(first) = words.next() else {
        return vec![String::new()];
    };

    let mut lines = Vec::new();
    let mut current = first.to_string();
    for word in words {
        let candidate = format!("{current} {word}");
        if measure_line(font, font_size, &candidate) > available {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        } else {
            current = candidate;
        }
    }
    lines.push(current);
    lines
}

/// Rendered pixel width of one line at the given size.
fn measure_line(font: &FontVec, font_size: f32, line: &str) -> u32 {
    if line.is_empty() {
        return 0;
    }
    let (width, _) = text_size(PxScale::from(font_size), font, line);
    width as u32
}

/// Height of the wrapped text block, from the font metrics. An empty caption
/// has no block, leaving a minimal band of slack plus buffers.
fn text_block_height(font: &FontVec, layout: &CaptionLayout) -> f32 {
    if layout.lines.iter().all(|line| line.is_empty()) {
        return 0.0;
    }
    let scaled = font.as_scaled(PxScale::from(layout.font_size));
    let line_count = layout.lines.len() as f32;
    line_count * scaled.height() + (line_count - 1.0) * scaled.line_gap()
}

/// Band height: text block height + 10% of the font size as line-spacing
/// slack + the vertical buffer on both sides.
fn band_height(font: &FontVec, layout: &CaptionLayout, buffer: u32) -> u32 {
    let height =
        text_block_height(font, layout) + 0.1 * layout.font_size + 2.0 * buffer as f32;
    (height.ceil() as u32).max(1)
}
