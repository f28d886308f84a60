//! Drawing of detections onto frames.
//!
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::Rgb;
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};
use rusttype::{Font, Scale};

use crate::{nn::Detection, sensors::Frame};

/// Box colours, picked by class id.
const PALETTE: [[u8; 3]; 20] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [146, 204, 23],
    [61, 219, 134],
    [26, 147, 52],
    [0, 212, 187],
    [44, 153, 168],
    [0, 194, 255],
    [52, 69, 147],
    [100, 115, 255],
    [0, 24, 236],
    [132, 56, 255],
    [82, 0, 133],
    [203, 56, 255],
    [255, 149, 200],
    [255, 55, 199],
];

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

pub struct Annotator {
    font: Option<Font<'static>>,
}

impl Annotator {
    pub fn new(font: Option<Font<'static>>) -> Self {
        Self { font }
    }

    /// Load the label font. Without a font only the boxes are drawn.
    pub fn load(font_path: impl AsRef<Path>) -> Self {
        let font_path = font_path.as_ref();
        match load_font(font_path) {
            Ok(font) => Self::new(Some(font)),
            Err(err) => {
                log::warn!("Labels will not be drawn: {err:#}");
                Self::new(None)
            }
        }
    }

    /// Draw bounding boxes and labels on a copy of `frame`.
    ///
    /// Detections are drawn in the given order, so later boxes may cover earlier ones.
    pub fn annotate(&self, frame: &Frame, detections: &[Detection]) -> Frame {
        let mut canvas = frame.clone();
        let (width, height) = canvas.dimensions();
        if width == 0 || height == 0 {
            return canvas;
        }

        let line_width = line_width(width, height);
        let scale = Scale::uniform((line_width * 6) as f32);

        for detection in detections {
            let color = Rgb(PALETTE[detection.class_id % PALETTE.len()]);
            let [x1, y1, x2, y2] = detection.bbox;
            // Coordinate frame basis is on the top left corner
            let (x_tl, y_tl) = (x1.round() as i32, y1.round() as i32);
            let rect_width = (x2 - x1).round().max(1.0) as u32;
            let rect_height = (y2 - y1).round().max(1.0) as u32;

            for offset in 0..line_width {
                let (inset_width, inset_height) = (
                    rect_width.saturating_sub(2 * offset),
                    rect_height.saturating_sub(2 * offset),
                );
                if inset_width == 0 || inset_height == 0 {
                    break;
                }
                let rect = Rect::at(x_tl + offset as i32, y_tl + offset as i32)
                    .of_size(inset_width, inset_height);
                draw_hollow_rect_mut(&mut canvas, rect, color);
            }

            if let Some(font) = &self.font {
                let text = format!("{} {:.2}", detection.label, detection.confidence);
                let (text_width, text_height) = text_size(scale, font, &text);
                let padding = line_width as i32;
                let tag_height = text_height + 2 * padding;

                // Put the tag above the box, or inside it when the box touches the top edge
                let tag_y = if y_tl >= tag_height {
                    y_tl - tag_height
                } else {
                    y_tl
                };
                let tag = Rect::at(x_tl, tag_y).of_size(
                    (text_width + 2 * padding).max(1) as u32,
                    tag_height.max(1) as u32,
                );
                draw_filled_rect_mut(&mut canvas, tag, color);
                draw_text_mut(
                    &mut canvas,
                    TEXT_COLOR,
                    x_tl + padding,
                    tag_y + padding,
                    scale,
                    font,
                    &text,
                );
            }
        }

        canvas
    }
}

fn load_font(font_path: &Path) -> Result<Font<'static>> {
    let font_data = std::fs::read(font_path)
        .with_context(|| format!("failed to read font {}", font_path.display()))?;
    Font::try_from_vec(font_data)
        .ok_or_else(|| anyhow!("{} is not a valid TrueType font", font_path.display()))
}

/// Line width in pixels, growing with the frame size.
fn line_width(width: u32, height: u32) -> u32 {
    (((width + height) as f32 / 2.0 * 0.003).round() as u32).max(2)
}
