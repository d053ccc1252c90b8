//! Document export for single records.
//!
//! A record is first laid out as a flat list of [`Line`]s (title, metadata,
//! then each section heading followed by `label: value` entries). The same
//! lines are rendered either as plain text or as a one-page PDF.
//!
//! The PDF always fits on a single page: the font shrinks until every line
//! fits, down to [`MIN_PDF_FONT_SIZE`]. Anything that still does not fit is
//! dropped and replaced by a trailing `...` line.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::config::{ExportConfig, PageSize};
use crate::error::{Error, Result};
use crate::record::{Record, RecordId, Value};
use crate::schema::{Field, Schema};

/// Smallest font size the PDF renderer will shrink to.
pub const MIN_PDF_FONT_SIZE: f32 = 6.0;

/// Placeholder for fields without a value.
pub const EMPTY_PLACEHOLDER: &str = "-";

const PAGE_MARGIN: f32 = 54.0;
const LEADING: f32 = 1.4;
const TITLE_SCALE: f32 = 1.6;
const HEADING_SCALE: f32 = 1.2;
/// Average Helvetica glyph width as a fraction of the font size.
const AVG_GLYPH_WIDTH: f32 = 0.5;
const OVERFLOW_MARKER: &str = "...";
/// Slack for floating-point error when a shrunk font fills the page exactly.
const FIT_TOLERANCE: f32 = 0.01;

/// Presentation options for exported documents.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    /// Symbol prefixed to monetary values.
    pub currency_symbol: String,
    /// Paper size for PDF output.
    pub page_size: PageSize,
    /// Preferred body font size in points.
    pub font_size: f32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::from(&ExportConfig::default())
    }
}

impl From<&ExportConfig> for ExportOptions {
    fn from(config: &ExportConfig) -> Self {
        Self {
            currency_symbol: config.currency_symbol.clone(),
            page_size: config.page_size,
            font_size: config.font_size,
        }
    }
}

/// One line of an exported document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Document title.
    Title(String),
    /// Record metadata (id, timestamps).
    Meta(String),
    /// Section heading.
    Heading(String),
    /// A field and its formatted value.
    Entry {
        /// Field label.
        label: String,
        /// Formatted value.
        value: String,
    },
}

impl Line {
    /// Plain-text rendering of this line, without decoration.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Title(text) | Self::Meta(text) | Self::Heading(text) => text.clone(),
            Self::Entry { label, value } => format!("{label}: {value}"),
        }
    }

    fn scale(&self) -> f32 {
        match self {
            Self::Title(_) => TITLE_SCALE,
            Self::Heading(_) => HEADING_SCALE,
            Self::Meta(_) | Self::Entry { .. } => 1.0,
        }
    }

    fn is_bold(&self) -> bool {
        matches!(self, Self::Title(_) | Self::Heading(_))
    }
}

/// Format an amount as money: `$1,234.56`, negatives as `-$1,234.56`.
#[must_use]
pub fn format_currency(amount: f64, symbol: &str) -> String {
    if !amount.is_finite() {
        return amount.to_string();
    }

    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let negative = amount < 0.0 && fixed != "0.00";

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!(
        "{}{symbol}{grouped}.{cents}",
        if negative { "-" } else { "" }
    )
}

/// Format a field value for display.
///
/// Currency fields format numbers and numeric text (`"12,000"`) as money;
/// other text is shown as entered.
#[must_use]
pub fn format_value(field: &Field, value: &Value, currency_symbol: &str) -> String {
    if value.is_empty() {
        return EMPTY_PLACEHOLDER.to_string();
    }
    match value.as_amount() {
        Some(amount) if field.is_currency() => format_currency(amount, currency_symbol),
        _ => value.to_string(),
    }
}

/// File name for an exported record: the id with every character other than
/// ASCII letters, digits, `-` and `_` replaced by `_`, plus `extension`.
///
/// The result never contains a path separator.
#[must_use]
pub fn document_file_name(id: &RecordId, extension: &str) -> String {
    let stem: String = id
        .as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = if stem.is_empty() { "record".to_string() } else { stem };
    format!("{stem}.{extension}")
}

/// Lay out a record as document lines.
#[must_use]
pub fn document_lines(schema: &Schema, record: &Record, options: &ExportOptions) -> Vec<Line> {
    let title = if schema.title.is_empty() {
        record.summary(schema)
    } else {
        format!("{}: {}", schema.title, record.summary(schema))
    };
    let mut lines = vec![Line::Title(title)];

    match &record.id {
        Some(id) => lines.push(Line::Meta(format!("Record ID: {id}"))),
        None => lines.push(Line::Meta("Unsaved draft".to_string())),
    }
    if let Some(created) = record.created_at {
        lines.push(Line::Meta(format!(
            "Created: {}",
            created.format("%Y-%m-%d %H:%M UTC")
        )));
    }
    if let Some(updated) = record.updated_at {
        lines.push(Line::Meta(format!(
            "Updated: {}",
            updated.format("%Y-%m-%d %H:%M UTC")
        )));
    }

    for section in &schema.sections {
        let heading = if section.title.is_empty() {
            &section.id
        } else {
            &section.title
        };
        lines.push(Line::Heading(heading.clone()));

        for field in &section.fields {
            let value = record.get(&field.id).cloned().unwrap_or_default();
            lines.push(Line::Entry {
                label: field.display_label().to_string(),
                value: format_value(field, &value, &options.currency_symbol),
            });
        }
    }

    lines
}

/// Render lines as plain text.
#[must_use]
pub fn render_text(lines: &[Line]) -> String {
    let mut out = String::new();
    for line in lines {
        match line {
            Line::Title(text) => {
                out.push_str(text);
                out.push('\n');
                out.push_str(&"=".repeat(text.chars().count()));
                out.push('\n');
            }
            Line::Meta(text) => {
                out.push_str(text);
                out.push('\n');
            }
            Line::Heading(text) => {
                out.push('\n');
                out.push_str(text);
                out.push('\n');
                out.push_str(&"-".repeat(text.chars().count()));
                out.push('\n');
            }
            Line::Entry { .. } => {
                out.push_str("  ");
                out.push_str(&line.text());
                out.push('\n');
            }
        }
    }
    out
}

/// Page layout chosen for a set of lines.
#[derive(Debug, Clone, PartialEq)]
struct Layout {
    font_size: f32,
    /// Number of lines that fit; the rest are replaced by the marker.
    visible: usize,
}

impl Layout {
    fn truncated(&self, total: usize) -> bool {
        self.visible < total
    }
}

fn fit_to_page(lines: &[Line], preferred: f32, page_height: f32) -> Layout {
    let available = page_height - 2.0 * PAGE_MARGIN + FIT_TOLERANCE;
    let total_scale: f32 = lines.iter().map(Line::scale).sum();

    let needed = total_scale * LEADING;
    let font_size = if needed > 0.0 {
        (available / needed).min(preferred).max(MIN_PDF_FONT_SIZE)
    } else {
        preferred
    };

    let step = font_size * LEADING;
    let mut used = 0.0;
    let mut visible = 0;
    for line in lines {
        let height = line.scale() * step;
        if used + height > available {
            break;
        }
        used += height;
        visible += 1;
    }

    if visible < lines.len() {
        // Make room for the overflow marker line.
        while visible > 0 && used + step > available {
            visible -= 1;
            used -= lines[visible].scale() * step;
        }
    }

    Layout { font_size, visible }
}

/// Encode text for a standard Type 1 font; characters outside Latin-1
/// become `?`.
fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => b' ',
            c => u8::try_from(u32::from(c)).unwrap_or(b'?'),
        })
        .collect()
}

fn clip_to_width(text: String, font_size: f32, width: f32) -> String {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let max_chars = (width / (font_size * AVG_GLYPH_WIDTH)).floor().max(1.0) as usize;
    if text.chars().count() <= max_chars {
        return text;
    }
    let keep = max_chars.saturating_sub(OVERFLOW_MARKER.len());
    let mut clipped: String = text.chars().take(keep).collect();
    clipped.push_str(OVERFLOW_MARKER);
    clipped
}

fn text_operations(text: &str, font: &str, size: f32, x: f32, y: f32) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![font.into(), size.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![Object::string_literal(encode_text(text))]),
        Operation::new("ET", vec![]),
    ]
}

/// Render lines as a single-page PDF.
///
/// # Errors
///
/// Returns [`Error::Export`] if the document cannot be encoded.
pub fn render_pdf(lines: &[Line], options: &ExportOptions) -> Result<Vec<u8>> {
    let (page_width, page_height) = options.page_size.dimensions();
    let layout = fit_to_page(lines, options.font_size, page_height);
    let text_width = page_width - 2.0 * PAGE_MARGIN;
    let step = layout.font_size * LEADING;

    let mut operations = Vec::new();
    let mut y = page_height - PAGE_MARGIN;
    for line in &lines[..layout.visible] {
        let size = layout.font_size * line.scale();
        y -= line.scale() * step;
        let (font, x) = match line {
            Line::Entry { .. } => ("F1", PAGE_MARGIN + layout.font_size),
            _ if line.is_bold() => ("F2", PAGE_MARGIN),
            _ => ("F1", PAGE_MARGIN),
        };
        let text = clip_to_width(line.text(), size, text_width - (x - PAGE_MARGIN));
        operations.extend(text_operations(&text, font, size, x, y));
    }
    if layout.truncated(lines.len()) {
        y -= step;
        operations.extend(text_operations(
            OVERFLOW_MARKER,
            "F1",
            layout.font_size,
            PAGE_MARGIN,
            y,
        ));
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let content = Content { operations };
    let encoded = content
        .encode()
        .map_err(|e| Error::export(format!("failed to encode page content: {e}")))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), page_width.into(), page_height.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| Error::export(format!("failed to write PDF: {e}")))?;
    Ok(bytes)
}
