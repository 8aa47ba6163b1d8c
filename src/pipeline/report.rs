//! PDF assembly for the prescription report.
//!
//! [`ReportWriter`] accumulates pages into a `printpdf` document and hands
//! out nothing until [`ReportWriter::finish`] has serialised the whole thing
//! into one buffer. Its states are explicit:
//!
//! ```text
//! Empty ──write_summary_page──▶ Writing(1) ──write_image_page──▶ Writing(2)
//!                                    │                               │
//!                                    └────────────finish─────────────┤
//!                                                                    ▼
//!                                                     Finalizing ──▶ Complete
//! ```
//!
//! `finish` consumes the writer, so a `Complete` document cannot be written
//! to again; the returned [`CompiledReport`] only exposes its bytes.
//!
//! Layout is in PDF points on a US Letter page with one-inch margins. Text
//! uses the built-in Helvetica faces, so no font files ship with the crate;
//! line widths are measured against an upper bound of Helvetica's advance
//! widths so a wrapped line never runs past the right margin.
//!
//! Attachments are decoded with the crate's own `image` (every format the
//! upload side accepts) and handed to printpdf as raw RGB8 pixels.

use crate::error::{AttachmentError, RxScribeError};
use crate::pipeline::encode;
use chrono::NaiveDate;
use printpdf::image_crate::{self, DynamicImage};
use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference,
};
use std::io::BufWriter;
use tracing::{debug, warn};

pub const PAGE_WIDTH_PT: f32 = 612.0;
pub const PAGE_HEIGHT_PT: f32 = 792.0;
const MARGIN_PT: f32 = 72.0;
const TEXT_WIDTH_PT: f32 = PAGE_WIDTH_PT - 2.0 * MARGIN_PT;

const TITLE_SIZE: f32 = 24.0;
const BODY_SIZE: f32 = 14.0;
const LINE_SPACING: f32 = 1.25;

/// Bounding box the prescription image is fitted into.
pub const IMAGE_BOX_PT: (f32, f32) = (450.0, 300.0);

/// Images are downsampled to this many pixels per point of the box before
/// embedding; printpdf stores pixels uncompressed.
const IMAGE_OVERSAMPLE: f32 = 3.0;

pub const TRUNCATION_MARKER: &str = "[transcription truncated]";

fn pt(v: f32) -> Mm {
    Mm(v * 25.4 / 72.0)
}

/// Where a [`ReportWriter`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportState {
    Empty,
    Writing { page: usize },
    Finalizing,
    /// Reached when [`ReportWriter::finish`] returns; the writer is gone and
    /// only the [`CompiledReport`] remains.
    Complete,
}

/// A finished report. Immutable.
#[derive(Debug, Clone)]
pub struct CompiledReport {
    bytes: Vec<u8>,
    page_count: usize,
    warnings: Vec<AttachmentError>,
}

impl CompiledReport {
    /// The complete PDF.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// 1 (text only) or 2 (text + prescription image).
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Why the image page was left out, if it was.
    pub fn warnings(&self) -> &[AttachmentError] {
        &self.warnings
    }
}

/// An attachment that decoded successfully and is ready to embed.
pub struct PreparedImage {
    pixels: DynamicImage,
    media_type: String,
}

impl PreparedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.pixels.width(), self.pixels.height())
    }
}

/// Decode a data URI into pixels, downsampled for embedding.
pub fn prepare_attachment(uri: &str) -> Result<PreparedImage, AttachmentError> {
    let attachment = encode::decode_data_uri(uri)?;
    let undecodable = |detail: String| AttachmentError::UndecodableImage {
        media_type: attachment.media_type.clone(),
        detail,
    };
    let decoded = image::load_from_memory(&attachment.bytes).map_err(|e| undecodable(e.to_string()))?;

    let max_w = (IMAGE_BOX_PT.0 * IMAGE_OVERSAMPLE) as u32;
    let max_h = (IMAGE_BOX_PT.1 * IMAGE_OVERSAMPLE) as u32;
    let decoded = if decoded.width() > max_w || decoded.height() > max_h {
        decoded.thumbnail(max_w, max_h)
    } else {
        decoded
    };

    // Flatten alpha and palette formats; the PDF image is plain DeviceRGB.
    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    let pixels = image_crate::RgbImage::from_raw(width, height, rgb.into_raw())
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| undecodable(format!("pixel buffer does not match {width}x{height}")))?;
    debug!(
        "Prepared {} attachment at {}x{}",
        attachment.media_type,
        pixels.width(),
        pixels.height()
    );
    Ok(PreparedImage {
        pixels,
        media_type: attachment.media_type,
    })
}

/// Scale factor and drawn size that fit `(w, h)` into `bounds`, keeping the
/// aspect ratio. Small images are scaled up.
pub fn fit_within(w: u32, h: u32, bounds: (f32, f32)) -> (f32, f32, f32) {
    let (w, h) = (w.max(1) as f32, h.max(1) as f32);
    let scale = (bounds.0 / w).min(bounds.1 / h);
    (scale, w * scale, h * scale)
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

/// Accumulates report pages; see the module docs for the state machine.
pub struct ReportWriter {
    doc: PdfDocumentReference,
    first_layer: PdfLayerReference,
    fonts: Fonts,
    state: ReportState,
    warnings: Vec<AttachmentError>,
}

impl ReportWriter {
    pub fn new(title: &str) -> Result<Self, RxScribeError> {
        let (doc, page1, layer1) = PdfDocument::new(
            title,
            pt(PAGE_WIDTH_PT),
            pt(PAGE_HEIGHT_PT),
            "Layer 1",
        );
        let first_layer = doc.get_page(page1).get_layer(layer1);
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| RxScribeError::ReportFailed(format!("font error: {e}")))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| RxScribeError::ReportFailed(format!("font error: {e}")))?;

        Ok(Self {
            doc,
            first_layer,
            fonts: Fonts { regular, bold },
            state: ReportState::Empty,
            warnings: Vec::new(),
        })
    }

    pub fn state(&self) -> ReportState {
        self.state
    }

    /// Page 1: title, generation date, transcription.
    pub fn write_summary_page(
        &mut self,
        title: &str,
        date: NaiveDate,
        body: &str,
    ) -> Result<(), RxScribeError> {
        if self.state != ReportState::Empty {
            return Err(self.invalid_transition("write the summary page"));
        }
        let layer = &self.first_layer;
        let mut y = PAGE_HEIGHT_PT - MARGIN_PT - TITLE_SIZE;

        let title = winansi_safe(title);
        let title_x = ((PAGE_WIDTH_PT - text_width(&title, TITLE_SIZE)) / 2.0).max(MARGIN_PT);
        layer.use_text(&title, TITLE_SIZE, pt(title_x), pt(y), &self.fonts.bold);
        y -= TITLE_SIZE * LINE_SPACING * 2.0;

        let date_line = format!("Date: {}", date.format("%B %-d, %Y"));
        layer.use_text(&date_line, BODY_SIZE, pt(MARGIN_PT), pt(y), &self.fonts.regular);
        y -= BODY_SIZE * LINE_SPACING * 3.0;

        let line_height = BODY_SIZE * LINE_SPACING;
        let capacity = ((y - MARGIN_PT) / line_height).floor() as usize + 1;
        let lines = fit_lines(
            layout_text(&winansi_safe(body), TEXT_WIDTH_PT, BODY_SIZE),
            capacity,
        );

        for line in &lines {
            if !line.is_empty() {
                layer.use_text(line, BODY_SIZE, pt(MARGIN_PT), pt(y), &self.fonts.regular);
            }
            y -= line_height;
        }

        self.state = ReportState::Writing { page: 1 };
        Ok(())
    }

    /// Page 2: the prescription image, centered.
    pub fn write_image_page(&mut self, image: PreparedImage) -> Result<(), RxScribeError> {
        if self.state != (ReportState::Writing { page: 1 }) {
            return Err(self.invalid_transition("write the image page"));
        }
        let (w, h) = image.dimensions();
        let (scale, drawn_w, drawn_h) = fit_within(w, h, IMAGE_BOX_PT);

        let (page, layer) = self
            .doc
            .add_page(pt(PAGE_WIDTH_PT), pt(PAGE_HEIGHT_PT), "Layer 1");
        let layer = self.doc.get_page(page).get_layer(layer);

        // At 72 dpi one pixel is one point before scaling.
        Image::from_dynamic_image(&image.pixels).add_to_layer(
            layer,
            ImageTransform {
                translate_x: Some(pt((PAGE_WIDTH_PT - drawn_w) / 2.0)),
                translate_y: Some(pt((PAGE_HEIGHT_PT - drawn_h) / 2.0)),
                scale_x: Some(scale),
                scale_y: Some(scale),
                dpi: Some(72.0),
                ..Default::default()
            },
        );
        debug!(
            "Embedded {} image {}x{} at {:.0}x{:.0}pt",
            image.media_type, w, h, drawn_w, drawn_h
        );

        self.state = ReportState::Writing { page: 2 };
        Ok(())
    }

    /// Record why an attachment was left out.
    pub fn record_warning(&mut self, warning: AttachmentError) {
        self.warnings.push(warning);
    }

    /// Serialise every page into one buffer.
    pub fn finish(mut self) -> Result<CompiledReport, RxScribeError> {
        let page_count = match self.state {
            ReportState::Writing { page } => page,
            _ => return Err(self.invalid_transition("finish")),
        };
        self.state = ReportState::Finalizing;

        let mut buf = BufWriter::new(Vec::new());
        self.doc
            .save(&mut buf)
            .map_err(|e| RxScribeError::ReportFailed(format!("save error: {e}")))?;
        let bytes = buf
            .into_inner()
            .map_err(|e| RxScribeError::ReportFailed(format!("buffer error: {e}")))?;

        debug!("Report complete: {} pages, {} bytes", page_count, bytes.len());
        Ok(CompiledReport {
            bytes,
            page_count,
            warnings: self.warnings,
        })
    }

    fn invalid_transition(&self, action: &str) -> RxScribeError {
        RxScribeError::Internal(format!("cannot {action} in report state {:?}", self.state))
    }
}

// ── Text layout ──────────────────────────────────────────────────────────

/// Advance width of `c` in ems, rounded up from the Helvetica AFM metrics.
/// Characters are grouped by their widest member, so the sum over a line is
/// never narrower than what the viewer draws.
fn char_width_em(c: char) -> f32 {
    match c {
        ' ' | 'i' | 'j' | 'l' | 'I' | '.' | ',' | ':' | ';' | '!' | '\'' | '|' | '/' | '\\' => 0.28,
        'f' | 't' | 'r' | '-' | '(' | ')' | '[' | ']' | '`' => 0.34,
        'm' | 'M' => 0.84,
        'w' => 0.73,
        'W' => 0.95,
        '@' => 1.02,
        '%' => 0.89,
        'A'..='Z' => 0.78,
        'a'..='z' | '0'..='9' => 0.56,
        c if c.is_ascii() => 0.67,
        // Latin-1; Æ is the widest at a full em.
        _ => 1.0,
    }
}

/// Upper bound on the drawn width of `text` in points.
fn text_width(text: &str, size: f32) -> f32 {
    text.chars().map(char_width_em).sum::<f32>() * size
}

/// Wrap each source line to `max_width` points at `size`, keeping blank
/// lines.
pub fn layout_text(text: &str, max_width: f32, size: f32) -> Vec<String> {
    let max_em = max_width / size;
    text.lines().flat_map(|line| wrap_line(line, max_em)).collect()
}

fn wrap_line(line: &str, max_em: f32) -> Vec<String> {
    let width = |s: &str| s.chars().map(char_width_em).sum::<f32>();
    let space = char_width_em(' ');
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_em = 0.0;

    for word in line.split_whitespace() {
        let mut word = word.to_string();
        // Split words wider than a line.
        while width(&word) > max_em {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_em = 0.0;
            }
            let mut head_em = 0.0;
            let split = word
                .char_indices()
                .find(|&(_, c)| {
                    head_em += char_width_em(c);
                    head_em > max_em
                })
                .map(|(i, _)| i)
                .unwrap_or(word.len());
            // Always make progress, even if one glyph is wider than the line.
            let split = if split == 0 {
                word.chars().next().map_or(word.len(), char::len_utf8)
            } else {
                split
            };
            let rest = word.split_off(split);
            lines.push(word);
            word = rest;
        }
        let word_em = width(&word);
        if !current.is_empty() && current_em + space + word_em > max_em {
            lines.push(std::mem::take(&mut current));
            current_em = 0.0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_em += space;
        }
        current.push_str(&word);
        current_em += word_em;
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Keep at most `capacity` lines; the last kept slot becomes the truncation
/// marker when something had to be dropped.
pub fn fit_lines(mut lines: Vec<String>, capacity: usize) -> Vec<String> {
    if lines.len() <= capacity {
        return lines;
    }
    warn!(
        "Transcription has {} lines, page holds {}; truncating",
        lines.len(),
        capacity
    );
    lines.truncate(capacity.saturating_sub(1));
    lines.push(TRUNCATION_MARKER.to_string());
    lines
}

/// Map text onto what the built-in (WinAnsi) fonts can draw.
fn winansi_safe(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\u{2018}' | '\u{2019}' => Some('\''),
            '\u{201C}' | '\u{201D}' => Some('"'),
            '\u{2013}' | '\u{2014}' | '\u{2022}' => Some('-'),
            '\t' => Some(' '),
            '\n' => Some('\n'),
            c if c.is_control() => None,
            c if (c as u32) <= 0xFF => Some(c),
            _ => Some('?'),
        })
        .collect()
}
