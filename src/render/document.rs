//! PDF document rendering.
//!
//! `templates/report.xml` is rendered by `tera` into layout markup (see
//! [`crate::render::layout`]) and then laid out on A4 pages with `printpdf`.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use printpdf::image_crate::{self, ImageFormat};
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Rect, Rgb,
};
use tera::{Context, Tera};

use crate::error::{ReportError, Result};
use crate::models::{ReportData, Section};
use crate::render::layout::{parse_markup, Block};

// ---

const REPORT_TEMPLATE: &str = "report.xml";
const EMAIL_TEMPLATE: &str = "email.html";

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 20.0;
const CONTENT_W: f32 = PAGE_W - 2.0 * MARGIN;

const KPI_COLUMNS: usize = 3;
const KPI_H: f32 = 17.0;
const ROW_H: f32 = 6.5;
const PT_TO_MM: f32 = 0.3528;

/// Renders report data into a PDF and the mail body.
pub struct DocumentRenderer {
    tera: Tera,
}

impl DocumentRenderer {
    pub fn new() -> Result<Self> {
        // ---
        let mut tera = Tera::default();
        tera.autoescape_on(vec![".xml", ".html"]);
        tera.add_raw_templates(vec![
            (REPORT_TEMPLATE, include_str!("../../templates/report.xml")),
            (EMAIL_TEMPLATE, include_str!("../../templates/email.html")),
        ])?;
        Ok(DocumentRenderer { tera })
    }

    /// Layout markup for `data` with only `sections` emitted.
    pub fn render_markup(&self, data: &ReportData, sections: &[Section]) -> Result<String> {
        // ---
        let mut fields = serde_json::to_value(data).map_err(ReportError::render)?;
        flatten_control_chars(&mut fields);
        let mut ctx = Context::from_value(fields)?;

        let charts: BTreeMap<&str, String> = data
            .charts
            .iter()
            .map(|(name, image)| (name.as_str(), image.to_data_uri()))
            .collect();
        ctx.insert("charts", &charts);

        let show: BTreeMap<&str, bool> = Section::ALL
            .iter()
            .map(|s| (s.as_str(), sections.contains(s)))
            .collect();
        ctx.insert("show", &show);

        Ok(self.tera.render(REPORT_TEMPLATE, &ctx)?)
    }

    /// Render the report to PDF bytes.
    pub fn render(&self, data: &ReportData, sections: &[Section]) -> Result<Vec<u8>> {
        // ---
        let markup = self.render_markup(data, sections)?;
        let blocks = parse_markup(&markup)?;

        let title = format!("Fleet Report - {}", pdf_text(&data.entity_name));
        let mut pdf = PdfWriter::new(&title)?;
        for block in &blocks {
            pdf.block(block)?;
        }
        pdf.finish()
    }

    pub fn render_email_body(&self, data: &ReportData, download_url: &str) -> Result<String> {
        // ---
        let mut ctx = Context::from_serialize(data)?;
        ctx.insert("download_url", download_url);
        Ok(self.tera.render(EMAIL_TEMPLATE, &ctx)?)
    }
}

// ---

/// The layout markup is line-oriented, so no bound string may carry a line
/// break or other control character.
fn flatten_control_chars(value: &mut serde_json::Value) {
    // ---
    match value {
        serde_json::Value::String(s) if s.chars().any(char::is_control) => {
            *s = s.chars().map(|c| if c.is_control() { ' ' } else { c }).collect();
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(flatten_control_chars),
        serde_json::Value::Object(fields) => fields.values_mut().for_each(flatten_control_chars),
        _ => {}
    }
}

/// Builtin PDF fonts only cover WinAnsi; anything else is approximated.
fn pdf_text(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '\u{2013}' | '\u{2014}' => '-',
            '\u{2082}' => '2',
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            c if c.is_control() => ' ',
            c if (c as u32) < 0x100 => c,
            _ => '?',
        })
        .collect()
}

/// Cut `text` so it fits `width_mm` at `size_pt` (Helvetica averages half an em).
fn fit(text: &str, width_mm: f32, size_pt: f32) -> String {
    // ---
    let max_chars = (width_mm / (size_pt * PT_TO_MM * 0.5)).floor().max(1.0) as usize;
    let cleaned = pdf_text(text);
    if cleaned.chars().count() <= max_chars {
        return cleaned;
    }
    let mut cut: String = cleaned.chars().take(max_chars.saturating_sub(2)).collect();
    cut.push_str("..");
    cut
}

fn wrap(text: &str, width_mm: f32, size_pt: f32) -> Vec<String> {
    // ---
    let max_chars = (width_mm / (size_pt * PT_TO_MM * 0.5)).floor().max(8.0) as usize;
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in pdf_text(text).split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn rgb(r: u8, g: u8, b: u8) -> Color {
    Color::Rgb(Rgb::new(
        f32::from(r) / 255.0,
        f32::from(g) / 255.0,
        f32::from(b) / 255.0,
        None,
    ))
}

fn ink() -> Color {
    rgb(15, 23, 42)
}

fn muted() -> Color {
    rgb(100, 116, 139)
}

fn decode_data_uri(src: &str) -> Result<Vec<u8>> {
    // ---
    let (_, payload) = src
        .split_once(";base64,")
        .ok_or_else(|| ReportError::Render("chart image is not a base64 data URI".into()))?;
    STANDARD.decode(payload.trim()).map_err(ReportError::render)
}

/// Cursor-based A4 layout over a `printpdf` document.
struct PdfWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    /// Distance from the bottom edge of the next free line.
    y: f32,
    kpi_col: usize,
    widths: Vec<f32>,
    zebra: bool,
}

impl PdfWriter {
    fn new(title: &str) -> Result<Self> {
        // ---
        let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(ReportError::render)?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(ReportError::render)?;
        let layer = doc.get_page(page).get_layer(layer);

        Ok(PdfWriter {
            doc,
            layer,
            regular,
            bold,
            y: PAGE_H - MARGIN,
            kpi_col: 0,
            widths: Vec::new(),
            zebra: false,
        })
    }

    fn new_page(&mut self) {
        let (page, layer) = self.doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = PAGE_H - MARGIN;
    }

    fn ensure_room(&mut self, height: f32) {
        if self.y - height < MARGIN {
            self.new_page();
        }
    }

    fn text(&self, text: &str, size: f32, x: f32, y: f32, bold: bool, color: Color) {
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.set_fill_color(color);
        self.layer.use_text(text, size, Mm(x), Mm(y), font);
    }

    fn fill_rect(&self, x: f32, y: f32, w: f32, h: f32, color: Color) {
        self.layer.set_fill_color(color);
        self.layer
            .add_rect(Rect::new(Mm(x), Mm(y), Mm(x + w), Mm(y + h)));
    }

    /// Close an open KPI row so the next block starts below it.
    fn end_kpi_row(&mut self) {
        if self.kpi_col > 0 {
            self.y -= KPI_H + 3.0;
            self.kpi_col = 0;
        }
    }

    fn block(&mut self, block: &Block) -> Result<()> {
        // ---
        if !matches!(block, Block::Kpi { .. }) {
            self.end_kpi_row();
        }

        match block {
            Block::Title(text) => {
                self.ensure_room(12.0);
                self.y -= 9.0;
                self.text(&fit(text, CONTENT_W, 22.0), 22.0, MARGIN, self.y, true, ink());
                self.y -= 3.0;
            }
            Block::Subtitle(text) => {
                self.ensure_room(9.0);
                self.y -= 7.0;
                self.text(&fit(text, CONTENT_W, 14.0), 14.0, MARGIN, self.y, false, ink());
                self.y -= 2.0;
            }
            Block::Heading(text) => {
                self.ensure_room(16.0);
                self.y -= 10.0;
                self.text(&fit(text, CONTENT_W, 15.0), 15.0, MARGIN, self.y, true, ink());
                self.fill_rect(MARGIN, self.y - 2.5, CONTENT_W, 0.6, rgb(245, 158, 11));
                self.y -= 6.0;
            }
            Block::Text(text) => {
                for line in wrap(text, CONTENT_W, 10.0) {
                    self.ensure_room(5.5);
                    self.y -= 5.0;
                    self.text(&line, 10.0, MARGIN, self.y, false, muted());
                }
                self.y -= 1.0;
            }
            Block::Kpi { label, value } => self.kpi(label, value),
            Block::Image { src, width_mm } => self.image(src, *width_mm)?,
            Block::TableHeader { widths_mm, cells } => {
                self.widths = widths_mm.clone();
                self.zebra = false;
                self.table_header(cells);
            }
            Block::TableRow(cells) => self.table_row(cells),
            Block::Spacer => self.y -= 5.0,
        }
        Ok(())
    }

    fn kpi(&mut self, label: &str, value: &str) {
        // ---
        if self.kpi_col == 0 {
            self.ensure_room(KPI_H + 3.0);
        }
        let gap = 4.0;
        let w = (CONTENT_W - gap * (KPI_COLUMNS as f32 - 1.0)) / KPI_COLUMNS as f32;
        let x = MARGIN + self.kpi_col as f32 * (w + gap);
        let top = self.y;

        self.fill_rect(x, top - KPI_H, w, KPI_H, rgb(241, 245, 249));
        self.text(&fit(label, w - 6.0, 8.0), 8.0, x + 3.0, top - 5.5, false, muted());
        self.text(&fit(value, w - 6.0, 14.0), 14.0, x + 3.0, top - 13.0, true, ink());

        self.kpi_col += 1;
        if self.kpi_col == KPI_COLUMNS {
            self.end_kpi_row();
        }
    }

    fn image(&mut self, src: &str, width_mm: f32) -> Result<()> {
        // ---
        let bytes = decode_data_uri(src)?;
        let decoded = image_crate::load_from_memory_with_format(&bytes, ImageFormat::Png)
            .map_err(ReportError::render)?;

        let width_mm = width_mm.clamp(10.0, CONTENT_W);
        let (px_w, px_h) = (decoded.width() as f32, decoded.height() as f32);
        let dpi = px_w * 25.4 / width_mm;
        let height_mm = px_h * 25.4 / dpi;

        self.ensure_room(height_mm + 3.0);
        self.y -= height_mm + 2.0;
        let x = MARGIN + (CONTENT_W - width_mm) / 2.0;

        Image::from_dynamic_image(&decoded).add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(x)),
                translate_y: Some(Mm(self.y)),
                dpi: Some(dpi),
                ..Default::default()
            },
        );
        self.y -= 2.0;
        Ok(())
    }

    fn column_widths(&self, n: usize) -> Vec<f32> {
        // ---
        if self.widths.len() == n {
            return self.widths.clone();
        }
        let even = CONTENT_W / n.max(1) as f32;
        vec![even; n]
    }

    fn table_header(&mut self, cells: &[String]) {
        // ---
        self.ensure_room(ROW_H * 2.0);
        self.y -= ROW_H;
        self.fill_rect(MARGIN, self.y - 1.8, CONTENT_W, ROW_H, rgb(15, 23, 42));

        let mut x = MARGIN + 1.5;
        for (cell, w) in cells.iter().zip(self.column_widths(cells.len())) {
            self.text(&fit(cell, w - 2.0, 8.5), 8.5, x, self.y, true, rgb(255, 255, 255));
            x += w;
        }
    }

    fn table_row(&mut self, cells: &[String]) {
        // ---
        if self.y - ROW_H < MARGIN {
            self.new_page();
        }
        self.y -= ROW_H;
        if self.zebra {
            self.fill_rect(MARGIN, self.y - 1.8, CONTENT_W, ROW_H, rgb(248, 250, 252));
        }
        self.zebra = !self.zebra;

        let mut x = MARGIN + 1.5;
        for (cell, w) in cells.iter().zip(self.column_widths(cells.len())) {
            self.text(&fit(cell, w - 2.0, 8.5), 8.5, x, self.y, false, ink());
            x += w;
        }
    }

    fn finish(mut self) -> Result<Vec<u8>> {
        self.end_kpi_row();
        self.doc.save_to_bytes().map_err(ReportError::render)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{DeviceRow, DeviceStatus, FaultRow, TrendPoint};
    use crate::render::charts::generate_all_charts;
    use crate::render::ChartImage;

    fn sample(name: &str) -> ReportData {
        ReportData {
            entity_name: name.to_string(),
            entity_type: "site".into(),
            period: "February 2026".into(),
            generated_date: "01 Mar 2026 06:00 UTC".into(),
            site_count: 1,
            device_count: 2,
            online_count: 1,
            offline_count: 0,
            fault_count: 1,
            energy_kwh: 12.5,
            co2_kg: 3.25,
            energy_trend: vec![TrendPoint { ts: 1_769_904_000_000, value: 6.0 }],
            co2_trend: vec![],
            dim_trend: None,
            daily_avg_kwh: 6.0,
            peak_kwh: 6.0,
            daily_avg_co2: 0.0,
            peak_co2: 0.0,
            interval_label: "daily".into(),
            devices: vec![DeviceRow {
                name: format!("{name} lamp"),
                site: "Depot <A>".into(),
                status: DeviceStatus::Fault,
                last_active: "28 Feb 23:10".into(),
                energy_kwh: 12.5,
                co2_kg: 3.25,
            }],
            faults: vec![FaultRow {
                date: "14 Feb 09:30".into(),
                site: "Depot <A>".into(),
                device: "Lamp \"7\"".into(),
                alarm_type: "Lamp Failure".into(),
                severity: "MAJOR".into(),
                status: "Active".into(),
                duration: "ongoing".into(),
                created_time: 0,
            }],
            alarm_count: 1,
            charts: BTreeMap::new(),
        }
    }

    #[test]
    fn test_markup_escapes_untrusted_names() {
        // ---
        let renderer = DocumentRenderer::new().unwrap();
        let data = sample("<script>&\"x'</script>");

        let markup = renderer.render_markup(&data, &Section::ALL).unwrap();
        assert!(!markup.contains("<script>"));
        assert!(markup.contains("&lt;script&gt;&amp;&quot;x&#x27;&lt;&#x2F;script&gt;"));

        let blocks = parse_markup(&markup).unwrap();
        assert!(blocks.contains(&Block::Subtitle("<script>&\"x'</script>".into())));
    }

    #[test]
    fn test_pdf_for_hostile_names() {
        // ---
        let renderer = DocumentRenderer::new().unwrap();
        for name in ["<b>", "A & B", "\"quoted\"", "O'Brien", "x < y > z", "Zürich \u{2013} Nord"] {
            let pdf = renderer.render(&sample(name), &Section::ALL).unwrap();
            assert!(pdf.starts_with(b"%PDF"), "name {name}");
        }
    }

    #[test]
    fn test_line_breaks_in_names_stay_on_one_line() {
        // ---
        let renderer = DocumentRenderer::new().unwrap();
        for name in ["Lamp\n7", "Depot\r\nNorth", "Tab\there", "Bell\u{7}"] {
            let mut data = sample(name);
            data.faults[0].alarm_type = format!("Lamp\nFailure {name}");
            data.faults[0].site = name.to_string();

            let pdf = renderer.render(&data, &Section::ALL).unwrap();
            assert!(pdf.starts_with(b"%PDF"), "name {name:?}");
        }

        let markup = renderer.render_markup(&sample("Lamp\n7"), &Section::ALL).unwrap();
        let blocks = parse_markup(&markup).unwrap();
        assert!(blocks.contains(&Block::Subtitle("Lamp 7".into())));
    }

    #[test]
    fn test_sections_toggle_markup() {
        // ---
        let renderer = DocumentRenderer::new().unwrap();
        let data = sample("North");

        let faults_only = renderer.render_markup(&data, &[Section::Faults]).unwrap();
        assert!(faults_only.contains("<heading>Faults</heading>"));
        assert!(!faults_only.contains("<heading>Summary</heading>"));
        assert!(!faults_only.contains("<heading>Energy</heading>"));

        let summary = renderer.render_markup(&data, &[Section::Summary]).unwrap();
        assert!(summary.contains("<heading>Devices</heading>"));
        assert!(!summary.contains("<heading>Faults</heading>"));
    }

    #[test]
    fn test_charts_normalised_to_data_uris() {
        // ---
        let renderer = DocumentRenderer::new().unwrap();
        let mut data = sample("North");
        data.charts = generate_all_charts(&data, &Section::ALL).unwrap();
        // pre-converted charts pass through untouched
        let ready = data.charts["energy_trend"].to_data_uri();
        data.charts.insert("co2_trend".into(), ChartImage::DataUri(ready.clone()));

        let markup = renderer.render_markup(&data, &Section::ALL).unwrap();
        assert!(markup.contains("<image src=\"data:image/png;base64,"));
        assert!(markup.contains(&format!("<image src=\"{ready}\"")));

        let pdf = renderer.render(&data, &Section::ALL).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[test]
    fn test_email_body() {
        // ---
        let renderer = DocumentRenderer::new().unwrap();
        let html = renderer
            .render_email_body(&sample("North & South"), "http://reports/api/report/download/rpt-1")
            .unwrap();
        assert!(html.contains("North &amp; South"));
        assert!(html.contains("February 2026"));
    }

    #[test]
    fn test_text_helpers() {
        // ---
        assert_eq!(pdf_text("CO\u{2082} \u{2013} ok"), "CO2 - ok");
        assert_eq!(fit("abcdefghij", 10.0, 10.0), "abc..");
        assert_eq!(wrap("one two three", 15.0, 10.0), vec!["one two", "three"]);
    }
}
