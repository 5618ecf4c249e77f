//! Chart rendering for report documents.
//!
//! Every chart is drawn with `plotters` into an in-memory RGB buffer of a
//! fixed size and encoded as PNG. The chosen [`ChartKind`] is stored in a
//! `tEXt` chunk (`chart-kind`) so the style decision can be checked on the
//! encoded image alone.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::DateTime;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::register_font;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::error::{ReportError, Result};
use crate::models::{ReportData, Section, TrendPoint};

// ---

pub const TREND_SIZE: (u32, u32) = (1500, 600);
pub const DONUT_SIZE: (u32, u32) = (750, 750);

/// Series up to this length are drawn as bars.
pub const BAR_MAX_POINTS: usize = 14;
/// Area charts get point markers up to this length.
pub const MARKER_MAX_POINTS: usize = 31;
/// Bar labels are rotated once there are more bars than this.
const ROTATE_LABELS_ABOVE: usize = 10;

pub const CHART_KIND_KEY: &str = "chart-kind";

const FONT_FAMILY: &str = "sans-serif";
static FONT_BYTES: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

const SLATE_900: RGBColor = RGBColor(15, 23, 42);
const SLATE_400: RGBColor = RGBColor(148, 163, 184);
const GRID: RGBColor = RGBColor(226, 232, 240);
pub const AMBER: RGBColor = RGBColor(245, 158, 11);
pub const EMERALD: RGBColor = RGBColor(5, 150, 105);
const RED_500: RGBColor = RGBColor(239, 68, 68);
const SKY: RGBColor = RGBColor(14, 165, 233);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Bar,
    Area,
    Step,
    Donut,
    Placeholder,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Area => "area",
            ChartKind::Step => "step",
            ChartKind::Donut => "donut",
            ChartKind::Placeholder => "placeholder",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "bar" => Some(ChartKind::Bar),
            "area" => Some(ChartKind::Area),
            "step" => Some(ChartKind::Step),
            "donut" => Some(ChartKind::Donut),
            "placeholder" => Some(ChartKind::Placeholder),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderedChart {
    pub kind: ChartKind,
    pub png: Vec<u8>,
}

/// A chart as handed to the document template: raw PNG bytes, or an
/// already-encoded data URI that passes through untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartImage {
    Png(Vec<u8>),
    DataUri(String),
}

impl ChartImage {
    pub fn to_data_uri(&self) -> String {
        match self {
            ChartImage::Png(bytes) => to_data_uri(bytes),
            ChartImage::DataUri(uri) => uri.clone(),
        }
    }
}

pub fn to_data_uri(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

/// Chart style for a trend series of `points` buckets.
pub fn select_trend_style(points: usize) -> ChartKind {
    match points {
        0 => ChartKind::Placeholder,
        n if n <= BAR_MAX_POINTS => ChartKind::Bar,
        _ => ChartKind::Area,
    }
}

/// Read back the `chart-kind` tag of an encoded chart.
pub fn chart_kind_of(png_bytes: &[u8]) -> Option<ChartKind> {
    // ---
    let reader = png::Decoder::new(png_bytes).read_info().ok()?;
    reader
        .info()
        .uncompressed_latin1_text
        .iter()
        .find(|chunk| chunk.keyword == CHART_KIND_KEY)
        .and_then(|chunk| ChartKind::from_tag(&chunk.text))
}

// ---

fn ensure_font() -> Result<()> {
    // ---
    static REGISTERED: OnceLock<std::result::Result<(), String>> = OnceLock::new();
    REGISTERED
        .get_or_init(|| {
            register_font(FONT_FAMILY, FontStyle::Normal, FONT_BYTES)
                .map_err(|_| "bundled chart font could not be loaded".to_string())
        })
        .clone()
        .map_err(ReportError::Render)
}

fn title_style() -> TextStyle<'static> {
    (FONT_FAMILY, 34)
        .into_font()
        .style(FontStyle::Bold)
        .color(&SLATE_900)
}

fn axis_label_style() -> TextStyle<'static> {
    (FONT_FAMILY, 20).into_font().color(&SLATE_900)
}

fn centered(style: TextStyle<'static>) -> TextStyle<'static> {
    style.pos(Pos::new(HPos::Center, VPos::Center))
}

fn short_date(ts_ms: i64) -> String {
    DateTime::from_timestamp_millis(ts_ms)
        .map(|dt| dt.format("%d %b").to_string())
        .unwrap_or_default()
}

/// Label for the tick at `x`, or nothing when `x` is not on a bucket.
fn index_label(labels: &[String], x: f64, every: usize) -> String {
    // ---
    let idx = x.round();
    if (x - idx).abs() > 0.01 || idx < 0.0 {
        return String::new();
    }
    let idx = idx as usize;
    if idx % every != 0 {
        return String::new();
    }
    labels.get(idx).cloned().unwrap_or_default()
}

fn y_bounds(series: &[TrendPoint]) -> (f64, f64) {
    // ---
    let max = series.iter().map(|p| p.value).fold(0.0, f64::max);
    let min = series.iter().map(|p| p.value).fold(0.0, f64::min);
    let top = if max <= 0.0 { 1.0 } else { max * 1.15 };
    (min * 1.15, top)
}

/// Draw on a fresh white canvas and encode the result as a tagged PNG.
fn render_png<F>(kind: ChartKind, (width, height): (u32, u32), draw: F) -> Result<RenderedChart>
where
    F: FnOnce(&DrawingArea<BitMapBackend<'_>, Shift>) -> Result<()>,
{
    // ---
    ensure_font()?;

    let mut buffer = vec![255u8; (width * height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(ReportError::render)?;
        draw(&root)?;
        root.present().map_err(ReportError::render)?;
    }

    let png = encode_png(&buffer, width, height, kind)?;
    Ok(RenderedChart { kind, png })
}

fn encode_png(rgb: &[u8], width: u32, height: u32, kind: ChartKind) -> Result<Vec<u8>> {
    // ---
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        encoder
            .add_text_chunk(CHART_KIND_KEY.to_string(), kind.as_str().to_string())
            .map_err(ReportError::render)?;
        let mut writer = encoder.write_header().map_err(ReportError::render)?;
        writer.write_image_data(rgb).map_err(ReportError::render)?;
        writer.finish().map_err(ReportError::render)?;
    }
    Ok(out)
}

// ---

/// Trend chart whose style follows the number of buckets.
pub fn trend_chart(
    series: &[TrendPoint],
    title: &str,
    unit: &str,
    color: RGBColor,
) -> Result<RenderedChart> {
    match select_trend_style(series.len()) {
        ChartKind::Bar => bar_chart(series, title, unit, color),
        ChartKind::Area => area_chart(series, title, unit, color),
        _ => placeholder(title),
    }
}

fn bar_chart(series: &[TrendPoint], title: &str, unit: &str, color: RGBColor) -> Result<RenderedChart> {
    // ---
    let n = series.len();
    let labels: Vec<String> = series.iter().map(|p| short_date(p.ts)).collect();
    let rotate = n > ROTATE_LABELS_ABOVE;
    let (y_min, y_max) = y_bounds(series);

    render_png(ChartKind::Bar, TREND_SIZE, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(title, title_style())
            .margin(20)
            .x_label_area_size(if rotate { 110 } else { 50 })
            .y_label_area_size(100)
            .build_cartesian_2d(-0.5f64..(n as f64 - 0.5), y_min..y_max)
            .map_err(ReportError::render)?;

        // slanted labels are drawn after the mesh
        let formatter = |x: &f64| if rotate { String::new() } else { index_label(&labels, *x, 1) };

        chart
            .configure_mesh()
            .disable_x_mesh()
            .bold_line_style(GRID)
            .light_line_style(WHITE)
            .x_labels(n)
            .x_label_formatter(&formatter)
            .x_label_style(axis_label_style())
            .y_label_style(axis_label_style())
            .y_desc(unit)
            .axis_desc_style((FONT_FAMILY, 22))
            .draw()
            .map_err(ReportError::render)?;

        chart
            .draw_series(series.iter().enumerate().map(|(i, p)| {
                let x = i as f64;
                Rectangle::new([(x - 0.35, 0.0), (x + 0.35, p.value)], color.filled())
            }))
            .map_err(ReportError::render)?;

        if rotate {
            for (i, label) in labels.iter().enumerate() {
                let (x, y) = chart.backend_coord(&(i as f64, y_min));
                draw_slanted_label(root, label, (x, y + SLANT_LABEL_GAP))?;
            }
        }
        Ok(())
    })
}

/// Pixels between the x axis and the top end of a slanted label.
const SLANT_LABEL_GAP: i32 = 10;

/// Draw `text` rising at 45° with its top-right corner on `anchor`, so it
/// hangs below and to the left of the tick it labels.
fn draw_slanted_label(
    root: &DrawingArea<BitMapBackend<'_>, Shift>,
    text: &str,
    (ax, ay): (i32, i32),
) -> Result<()> {
    // ---
    if text.is_empty() {
        return Ok(());
    }
    let size = root
        .estimate_text_size(text, &axis_label_style())
        .map_err(ReportError::render)?;
    let bitmap = label_bitmap(text, size)?;
    for (dx, dy, color) in slant_pixels(&bitmap, size) {
        root.draw_pixel((ax + dx, ay + dy), &color)
            .map_err(ReportError::render)?;
    }
    Ok(())
}

/// Render `text` unrotated onto a white RGB buffer of `size`.
fn label_bitmap(text: &str, (width, height): (u32, u32)) -> Result<Vec<u8>> {
    // ---
    let mut buffer = vec![255u8; (width * height * 3) as usize];
    {
        let area = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        area.draw(&Text::new(text, (0, 0), axis_label_style()))
            .map_err(ReportError::render)?;
        area.present().map_err(ReportError::render)?;
    }
    Ok(buffer)
}

/// Offsets and colours of the inked pixels of `bitmap` once it is turned
/// 45° counter-clockwise about its top-right corner.
///
/// Destination pixels are sampled back into the source so the rotated text
/// has no gaps.
fn slant_pixels(bitmap: &[u8], (width, height): (u32, u32)) -> Vec<(i32, i32, RGBColor)> {
    // ---
    let s = std::f64::consts::FRAC_1_SQRT_2;
    let (w, h) = (width as f64, height as f64);

    // corners of the source box relative to the pivot, after rotation
    let corners = [(-w, 0.0), (0.0, 0.0), (-w, h), (0.0, h)].map(|(x, y)| (x * s + y * s, -x * s + y * s));
    let min_x = corners.iter().map(|c| c.0).fold(f64::MAX, f64::min).floor() as i32;
    let max_x = corners.iter().map(|c| c.0).fold(f64::MIN, f64::max).ceil() as i32;
    let min_y = corners.iter().map(|c| c.1).fold(f64::MAX, f64::min).floor() as i32;
    let max_y = corners.iter().map(|c| c.1).fold(f64::MIN, f64::max).ceil() as i32;

    let mut pixels = Vec::new();
    for dy in min_y..=max_y {
        for dx in min_x..=max_x {
            let (fx, fy) = (dx as f64, dy as f64);
            let sx = (fx * s - fy * s + w).floor();
            let sy = (fx * s + fy * s).floor();
            if sx < 0.0 || sy < 0.0 || sx >= w || sy >= h {
                continue;
            }
            let at = ((sy as usize) * width as usize + sx as usize) * 3;
            let (r, g, b) = (bitmap[at], bitmap[at + 1], bitmap[at + 2]);
            if r.min(g).min(b) < 250 {
                pixels.push((dx, dy, RGBColor(r, g, b)));
            }
        }
    }
    pixels
}

fn area_chart(series: &[TrendPoint], title: &str, unit: &str, color: RGBColor) -> Result<RenderedChart> {
    // ---
    let n = series.len();
    let labels: Vec<String> = series.iter().map(|p| short_date(p.ts)).collect();
    // daily ticks while a month fits, weekly beyond that
    let tick_every = if n <= MARKER_MAX_POINTS { 1 } else { 7 };
    let points: Vec<(f64, f64)> = series
        .iter()
        .enumerate()
        .map(|(i, p)| (i as f64, p.value))
        .collect();
    let (y_min, y_max) = y_bounds(series);

    render_png(ChartKind::Area, TREND_SIZE, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(title, title_style())
            .margin(20)
            .x_label_area_size(110)
            .y_label_area_size(100)
            .build_cartesian_2d(-0.5f64..(n as f64 - 0.5), y_min..y_max)
            .map_err(ReportError::render)?;

        let formatter = |x: &f64| index_label(&labels, *x, tick_every);
        chart
            .configure_mesh()
            .disable_x_mesh()
            .bold_line_style(GRID)
            .light_line_style(WHITE)
            .x_labels(n)
            .x_label_formatter(&formatter)
            .x_label_style(axis_label_style().transform(FontTransform::Rotate90))
            .y_label_style(axis_label_style())
            .y_desc(unit)
            .axis_desc_style((FONT_FAMILY, 22))
            .draw()
            .map_err(ReportError::render)?;

        chart
            .draw_series(
                AreaSeries::new(points.iter().copied(), 0.0, color.mix(0.18))
                    .border_style(color.stroke_width(3)),
            )
            .map_err(ReportError::render)?;

        if n <= MARKER_MAX_POINTS {
            chart
                .draw_series(points.iter().map(|&(x, y)| Circle::new((x, y), 5, color.filled())))
                .map_err(ReportError::render)?;
        }
        Ok(())
    })
}

/// Step chart for the 0–100 % dim level control signal.
pub fn dim_step_chart(series: &[TrendPoint]) -> Result<RenderedChart> {
    // ---
    let title = "Average Dim Level";
    if series.is_empty() {
        return placeholder(title);
    }

    let n = series.len();
    let labels: Vec<String> = series.iter().map(|p| short_date(p.ts)).collect();
    let tick_every = if n <= MARKER_MAX_POINTS { 1 } else { 7 };

    // hold each level until the next bucket starts
    let mut path: Vec<(f64, f64)> = Vec::with_capacity(n * 2 + 1);
    for (i, p) in series.iter().enumerate() {
        let x = i as f64 - 0.5;
        if let Some(&(_, prev)) = path.last() {
            path.push((x, prev));
        }
        path.push((x, p.value));
    }
    if let Some(&(_, last)) = path.last() {
        path.push((n as f64 - 0.5, last));
    }

    render_png(ChartKind::Step, TREND_SIZE, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(title, title_style())
            .margin(20)
            .x_label_area_size(110)
            .y_label_area_size(100)
            .build_cartesian_2d(-0.5f64..(n as f64 - 0.5), 0f64..100f64)
            .map_err(ReportError::render)?;

        let formatter = |x: &f64| index_label(&labels, *x, tick_every);
        chart
            .configure_mesh()
            .disable_x_mesh()
            .bold_line_style(GRID)
            .light_line_style(WHITE)
            .x_labels(n)
            .x_label_formatter(&formatter)
            .x_label_style(axis_label_style().transform(FontTransform::Rotate90))
            .y_label_style(axis_label_style())
            .y_desc("Dim level (%)")
            .axis_desc_style((FONT_FAMILY, 22))
            .draw()
            .map_err(ReportError::render)?;

        chart
            .draw_series(LineSeries::new(path.iter().copied(), SKY.stroke_width(3)))
            .map_err(ReportError::render)?;
        Ok(())
    })
}

/// Neutral "No data available" panel.
pub fn placeholder(title: &str) -> Result<RenderedChart> {
    // ---
    let (width, height) = TREND_SIZE;
    render_png(ChartKind::Placeholder, TREND_SIZE, |root| {
        let mid_x = (width / 2) as i32;
        root.draw(&Text::new(title.to_string(), (mid_x, 60), centered(title_style())))
            .map_err(ReportError::render)?;
        root.draw(&Text::new(
            "No data available",
            (mid_x, (height / 2) as i32),
            centered((FONT_FAMILY, 30).into_font().color(&SLATE_400)),
        ))
        .map_err(ReportError::render)?;
        Ok(())
    })
}

/// Online / offline / fault breakdown with the device total in the hole.
///
/// Zero-count slices are left out of both the ring and the legend; with no
/// devices at all a single grey ring is drawn.
pub fn status_donut(online: usize, offline: usize, fault: usize) -> Result<RenderedChart> {
    // ---
    let total = online + offline + fault;
    let slices: Vec<(&str, usize, RGBColor)> = [
        ("Online", online, EMERALD),
        ("Offline", offline, SLATE_400),
        ("Fault", fault, RED_500),
    ]
    .into_iter()
    .filter(|(_, count, _)| *count > 0)
    .collect();

    let (sizes, colors): (Vec<f64>, Vec<RGBColor>) = if slices.is_empty() {
        (vec![1.0], vec![GRID])
    } else {
        slices.iter().map(|(_, count, color)| (*count as f64, *color)).unzip()
    };
    let wedge_labels = vec![""; sizes.len()];

    let (width, _) = DONUT_SIZE;
    let mid_x = (width / 2) as i32;
    let center = (mid_x, 350);
    let radius = 240.0;

    render_png(ChartKind::Donut, DONUT_SIZE, |root| {
        root.draw(&Text::new("Device Status", (mid_x, 45), centered(title_style())))
            .map_err(ReportError::render)?;

        let mut pie = Pie::new(&center, &radius, &sizes, &colors, &wedge_labels);
        pie.start_angle(-90.0);
        pie.donut_hole(radius * 0.6);
        root.draw(&pie).map_err(ReportError::render)?;

        root.draw(&Text::new(
            total.to_string(),
            (mid_x, center.1 - 18),
            centered((FONT_FAMILY, 72).into_font().style(FontStyle::Bold).color(&SLATE_900)),
        ))
        .map_err(ReportError::render)?;
        root.draw(&Text::new(
            "devices",
            (mid_x, center.1 + 40),
            centered((FONT_FAMILY, 26).into_font().color(&SLATE_400)),
        ))
        .map_err(ReportError::render)?;

        let column = 230;
        let left = mid_x - (column * slices.len() as i32) / 2;
        for (i, (name, count, color)) in slices.iter().enumerate() {
            let x = left + column * i as i32 + 20;
            let y = 680;
            root.draw(&Rectangle::new([(x, y - 12), (x + 24, y + 12)], color.filled()))
                .map_err(ReportError::render)?;
            root.draw(&Text::new(
                format!("{name} ({count})"),
                (x + 34, y),
                (FONT_FAMILY, 24)
                    .into_font()
                    .color(&SLATE_900)
                    .pos(Pos::new(HPos::Left, VPos::Center)),
            ))
            .map_err(ReportError::render)?;
        }
        Ok(())
    })
}

/// Charts needed by `sections`, keyed by chart name.
pub fn generate_all_charts(
    data: &ReportData,
    sections: &[Section],
) -> Result<BTreeMap<String, ChartImage>> {
    // ---
    let mut charts = BTreeMap::new();

    if sections.contains(&Section::Energy) {
        let chart = trend_chart(&data.energy_trend, "Energy Consumption", "kWh", AMBER)?;
        charts.insert("energy_trend".to_string(), ChartImage::Png(chart.png));
    }
    if sections.contains(&Section::Co2) {
        let chart = trend_chart(&data.co2_trend, "CO\u{2082} Emissions", "kg", EMERALD)?;
        charts.insert("co2_trend".to_string(), ChartImage::Png(chart.png));
    }

    let donut = status_donut(data.online_count, data.offline_count, data.fault_count)?;
    charts.insert("status_donut".to_string(), ChartImage::Png(donut.png));

    if let Some(dim) = data.dim_trend.as_deref().filter(|s| !s.is_empty()) {
        let chart = dim_step_chart(dim)?;
        charts.insert("dim_trend".to_string(), ChartImage::Png(chart.png));
    }

    Ok(charts)
}
