//! Landscape A4 table of the export rows, paginated.

use std::io::BufWriter;

use chrono::NaiveDateTime;
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};

use crate::domain::RequestView;

use super::{cells, ReportError, COLUMNS};

const PAGE_WIDTH: f32 = 297.0;
const PAGE_HEIGHT: f32 = 210.0;
const MARGIN: f32 = 12.0;
const ROW_HEIGHT: f32 = 5.5;
const FONT_SIZE: f32 = 8.0;
/// Approximate Helvetica advance at [`FONT_SIZE`].
const CHAR_WIDTH: f32 = 1.6;

/// Column widths in millimetres, in [`COLUMNS`] order.
const WIDTHS: [f32; 9] = [12.0, 32.0, 30.0, 30.0, 25.0, 25.0, 22.0, 79.0, 18.0];

pub fn render(rows: &[RequestView], generated_at: NaiveDateTime) -> Result<Vec<u8>, ReportError> {
    let title = "Service Requests Export";
    let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ReportError::Pdf(format!("font error: {}", e)))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ReportError::Pdf(format!("font error: {}", e)))?;

    let mut layer = doc.get_page(page).get_layer(layer);
    let mut y = PAGE_HEIGHT - MARGIN;

    layer.use_text(title, 14.0, Mm(MARGIN), Mm(y), &bold);
    y -= 6.0;
    let subtitle = format!(
        "Generated {} UTC, {} request(s)",
        generated_at.format("%Y-%m-%d %H:%M"),
        rows.len()
    );
    layer.use_text(subtitle, 9.0, Mm(MARGIN), Mm(y), &font);
    y -= 8.0;
    write_row(&layer, &COLUMNS.map(String::from), y, &bold);
    y -= ROW_HEIGHT;

    for view in rows {
        if y < MARGIN {
            let (page, next) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            layer = doc.get_page(page).get_layer(next);
            y = PAGE_HEIGHT - MARGIN;
            write_row(&layer, &COLUMNS.map(String::from), y, &bold);
            y -= ROW_HEIGHT;
        }
        write_row(&layer, &cells(view), y, &font);
        y -= ROW_HEIGHT;
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| ReportError::Pdf(format!("save error: {}", e)))?;
    buf.into_inner().map_err(|e| ReportError::Io(e.into_error()))
}

fn write_row(layer: &PdfLayerReference, cells: &[String; 9], y: f32, font: &IndirectFontRef) {
    let mut x = MARGIN;
    for (cell, width) in cells.iter().zip(WIDTHS) {
        layer.use_text(fit(cell, width), FONT_SIZE, Mm(x), Mm(y), font);
        x += width;
    }
}

fn fit(text: &str, width: f32) -> String {
    let max = ((width - 1.0) / CHAR_WIDTH) as usize;
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
