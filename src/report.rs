//! PDF report rendering for a stored dataset.
//!
//! Layout is computed top-down on A4 pages in millimetres. Missing summary
//! fields are printed as `N/A`.

use std::f32::consts::PI;

use chrono::{DateTime, Utc};
use printpdf::path::{PaintMode, WindingOrder};
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerIndex, PdfLayerReference, PdfPageIndex, Point, Polygon, Rect, Rgb,
};
use tracing::debug;

use crate::analyzer::chart_data;
use crate::domain::{ChartData, Dataset, Summary};
use crate::error::ServiceError;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const ROW_HEIGHT: f32 = 8.0;
const NOT_AVAILABLE: &str = "N/A";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const BRAND: (u8, u8, u8) = (0x1a, 0x54, 0x90);
const BEIGE: (u8, u8, u8) = (245, 245, 220);
const WHITE: (u8, u8, u8) = (255, 255, 255);
const BLACK: (u8, u8, u8) = (0, 0, 0);
const PALETTE: [(u8, u8, u8); 8] = [
    (0x1a, 0x54, 0x90),
    (0xe6, 0x7e, 0x22),
    (0x27, 0xae, 0x60),
    (0xc0, 0x39, 0x2b),
    (0x8e, 0x44, 0xad),
    (0x16, 0xa0, 0x85),
    (0xf1, 0xc4, 0x0f),
    (0x7f, 0x8c, 0x8d),
];

#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub pages: usize,
}

fn report_error(message: impl std::fmt::Display) -> ServiceError {
    ServiceError::Report {
        message: message.to_string(),
    }
}

fn rgb((r, g, b): (u8, u8, u8)) -> Color {
    Color::Rgb(Rgb::new(
        r as f32 / 255.0,
        g as f32 / 255.0,
        b as f32 / 255.0,
        None,
    ))
}

fn point(x: f32, y: f32) -> (Point, bool) {
    (Point::new(Mm(x), Mm(y)), false)
}

fn fixed(value: Option<f64>) -> String {
    value.map_or_else(|| NOT_AVAILABLE.to_string(), |v| format!("{:.2}", v))
}

/// Rows of the summary statistics table: metric, value, min, max.
pub fn summary_rows(summary: &Summary) -> Vec<[String; 4]> {
    let total = summary
        .total_equipment
        .map_or_else(|| NOT_AVAILABLE.to_string(), |n| n.to_string());

    vec![
        [
            "Total Equipment".to_string(),
            total,
            "-".to_string(),
            "-".to_string(),
        ],
        [
            "Average Flowrate".to_string(),
            fixed(summary.average_flowrate),
            fixed(summary.min_flowrate),
            fixed(summary.max_flowrate),
        ],
        [
            "Average Pressure".to_string(),
            fixed(summary.average_pressure),
            fixed(summary.min_pressure),
            fixed(summary.max_pressure),
        ],
        [
            "Average Temperature".to_string(),
            fixed(summary.average_temperature),
            fixed(summary.min_temperature),
            fixed(summary.max_temperature),
        ],
    ]
}

/// Rows of the type distribution table; a single `N/A` row when absent.
pub fn distribution_rows(summary: &Summary) -> Vec<[String; 2]> {
    match &summary.type_distribution {
        Some(dist) if !dist.is_empty() => dist
            .iter()
            .map(|(label, count)| [label.clone(), count.to_string()])
            .collect(),
        _ => vec![[NOT_AVAILABLE.to_string(), NOT_AVAILABLE.to_string()]],
    }
}

fn approx_text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.18
}

/// Vertical layout of the averages chart: the axis offset above the chart
/// bottom and one signed bar height per value. Negative averages hang below
/// the axis.
fn bar_geometry(values: &[Option<f64>], plot_height: f32) -> (f32, Vec<f32>) {
    let present = || values.iter().filter_map(|v| *v);
    let positive = present().fold(0.0f64, |acc, v| acc.max(v));
    let negative = present().fold(0.0f64, |acc, v| acc.max(-v));
    let span = positive + negative;
    if span <= 0.0 {
        return (0.0, vec![0.0; values.len()]);
    }

    let scale = plot_height as f64 / span;
    let heights = values
        .iter()
        .map(|v| v.map_or(0.0, |v| (v * scale) as f32))
        .collect();
    ((negative * scale) as f32, heights)
}

struct PageWriter<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    cursor: f32,
    pages: usize,
}

impl<'a> PageWriter<'a> {
    fn new(
        doc: &'a PdfDocumentReference,
        page: PdfPageIndex,
        layer: PdfLayerIndex,
    ) -> Result<Self, ServiceError> {
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(report_error)?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(report_error)?;

        Ok(Self {
            doc,
            layer: doc.get_page(page).get_layer(layer),
            regular,
            bold,
            cursor: PAGE_HEIGHT - MARGIN,
            pages: 1,
        })
    }

    fn ensure_space(&mut self, height: f32) {
        if self.cursor - height >= MARGIN {
            return;
        }
        self.new_page();
    }

    fn new_page(&mut self) {
        self.pages += 1;
        let (page, layer) = self.doc.add_page(
            Mm(PAGE_WIDTH),
            Mm(PAGE_HEIGHT),
            format!("Page {}", self.pages),
        );
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.cursor = PAGE_HEIGHT - MARGIN;
    }

    fn text(&self, text: &str, size: f32, x: f32, y: f32, bold: bool, color: (u8, u8, u8)) {
        self.layer.set_fill_color(rgb(color));
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.use_text(text, size, Mm(x), Mm(y), font);
    }

    fn filled_rect(&self, x: f32, y: f32, width: f32, height: f32, color: (u8, u8, u8)) {
        self.layer.set_fill_color(rgb(color));
        self.layer.set_outline_color(rgb(BLACK));
        self.layer.set_outline_thickness(0.5);
        self.layer.add_rect(
            Rect::new(Mm(x), Mm(y), Mm(x + width), Mm(y + height))
                .with_mode(PaintMode::FillStroke),
        );
    }

    fn line(&self, points: Vec<(Point, bool)>) {
        self.layer.set_outline_color(rgb(BLACK));
        self.layer.set_outline_thickness(0.5);
        self.layer.add_line(Line {
            points,
            is_closed: false,
        });
    }

    fn polygon(&self, ring: Vec<(Point, bool)>, color: (u8, u8, u8)) {
        self.layer.set_fill_color(rgb(color));
        self.layer.add_polygon(Polygon {
            rings: vec![ring],
            mode: PaintMode::Fill,
            winding_order: WindingOrder::NonZero,
        });
    }

    fn heading(&mut self, title: &str) {
        self.ensure_space(14.0);
        self.cursor -= 8.0;
        self.text(title, 14.0, MARGIN, self.cursor, true, BLACK);
        self.cursor -= 4.0;
    }

    fn table_row(&mut self, cells: &[&str], widths: &[f32], is_header: bool) {
        self.ensure_space(ROW_HEIGHT);
        self.cursor -= ROW_HEIGHT;
        let (fill, color) = if is_header { (BRAND, WHITE) } else { (BEIGE, BLACK) };
        let mut x = MARGIN;
        for (cell, width) in cells.iter().zip(widths) {
            self.filled_rect(x, self.cursor, *width, ROW_HEIGHT, fill);
            self.text(cell, 10.0, x + 2.0, self.cursor + 2.5, is_header, color);
            x += width;
        }
    }

    fn table<const N: usize>(&mut self, header: [&str; N], rows: &[[String; N]], widths: [f32; N]) {
        self.table_row(&header, &widths, true);
        for row in rows {
            let cells: Vec<&str> = row.iter().map(String::as_str).collect();
            self.table_row(&cells, &widths, false);
        }
        self.cursor -= 4.0;
    }

    fn title_block(&mut self) {
        let top = self.cursor;
        let (cx, cy, r) = (MARGIN + 7.0, top - 7.0, 7.0);
        let hexagon = (0..6)
            .map(|i| {
                let angle = PI / 6.0 + i as f32 * PI / 3.0;
                point(cx + r * angle.cos(), cy + r * angle.sin())
            })
            .collect();
        self.polygon(hexagon, BRAND);
        let ring = (0..24)
            .map(|i| {
                let angle = i as f32 * 2.0 * PI / 24.0;
                point(cx + 3.5 * angle.cos(), cy + 3.5 * angle.sin())
            })
            .collect();
        self.polygon(ring, WHITE);

        let title = "Chemical Equipment Parameter Report";
        let x = (PAGE_WIDTH - approx_text_width(title, 20.0)) / 2.0;
        self.cursor = top - 22.0;
        self.text(title, 20.0, x.max(MARGIN), self.cursor, true, BRAND);
        self.cursor -= 6.0;
    }

    fn metadata(&mut self, dataset: &Dataset, generated_at: DateTime<Utc>) {
        let lines = [
            ("Dataset:", dataset.file_name.clone()),
            ("Generated:", generated_at.format(TIMESTAMP_FORMAT).to_string()),
            ("Uploaded:", dataset.uploaded_at.format(TIMESTAMP_FORMAT).to_string()),
        ];
        for (label, value) in lines {
            self.cursor -= 6.0;
            self.text(label, 11.0, MARGIN, self.cursor, true, BLACK);
            self.text(&value, 11.0, MARGIN + 25.0, self.cursor, false, BLACK);
        }
        self.cursor -= 4.0;
    }

    fn bar_chart(&mut self, chart: &ChartData) {
        const HEIGHT: f32 = 55.0;
        const BAR_WIDTH: f32 = 22.0;
        const SPACING: f32 = 40.0;

        let bars = [
            ("Flowrate", chart.averages.flowrate),
            ("Pressure", chart.averages.pressure),
            ("Temperature", chart.averages.temperature),
        ];
        let values: Vec<Option<f64>> = bars.iter().map(|(_, v)| *v).collect();
        let (axis_offset, heights) = bar_geometry(&values, HEIGHT - 12.0);
        let has_negative = heights.iter().any(|h| *h < 0.0);

        self.ensure_space(HEIGHT + 24.0);
        let origin_x = MARGIN + 15.0;
        let bottom = self.cursor - HEIGHT - 8.0;
        let axis_y = bottom + 4.0 + axis_offset;
        let label_y = if has_negative { bottom - 9.0 } else { axis_y - 5.0 };

        self.line(vec![point(origin_x, bottom + HEIGHT), point(origin_x, bottom)]);
        self.line(vec![
            point(origin_x, axis_y),
            point(origin_x + SPACING * 3.0 + 10.0, axis_y),
        ]);

        for (i, ((label, value), height)) in bars.iter().zip(heights).enumerate() {
            let x = origin_x + 10.0 + i as f32 * SPACING;
            if height > 0.0 {
                self.filled_rect(x, axis_y, BAR_WIDTH, height, BRAND);
            } else if height < 0.0 {
                self.filled_rect(x, axis_y + height, BAR_WIDTH, -height, BRAND);
            }

            let value_label = fixed(*value);
            let value_y = if height < 0.0 {
                axis_y + height - 4.0
            } else {
                axis_y + height + 2.0
            };
            let center = x + BAR_WIDTH / 2.0;
            self.text(
                &value_label,
                9.0,
                center - approx_text_width(&value_label, 9.0) / 2.0,
                value_y,
                false,
                BLACK,
            );
            self.text(
                label,
                9.0,
                center - approx_text_width(label, 9.0) / 2.0,
                label_y,
                false,
                BLACK,
            );
        }

        self.cursor = label_y - 5.0;
    }

    fn pie_chart(&mut self, chart: &ChartData) {
        const RADIUS: f32 = 25.0;
        let series = &chart.type_distribution;
        let total: u64 = series.values.iter().sum();

        if total == 0 {
            self.ensure_space(10.0);
            self.cursor -= 8.0;
            self.text(NOT_AVAILABLE, 11.0, MARGIN, self.cursor, false, BLACK);
            return;
        }

        self.ensure_space(RADIUS * 2.0 + 10.0);
        let cx = MARGIN + 10.0 + RADIUS;
        let cy = self.cursor - 5.0 - RADIUS;

        let mut start = PI / 2.0;
        for (i, value) in series.values.iter().enumerate() {
            let sweep = *value as f32 / total as f32 * 2.0 * PI;
            let steps = ((sweep / (PI / 60.0)).ceil() as usize).max(1);
            let mut ring = vec![point(cx, cy)];
            for step in 0..=steps {
                let angle = start - sweep * step as f32 / steps as f32;
                ring.push(point(cx + RADIUS * angle.cos(), cy + RADIUS * angle.sin()));
            }
            self.polygon(ring, PALETTE[i % PALETTE.len()]);
            start -= sweep;
        }

        let mut legend_x = cx + RADIUS + 20.0;
        let mut legend_y = self.cursor - 10.0;
        let mut continued = false;
        for (i, (label, value)) in series.labels.iter().zip(&series.values).enumerate() {
            if legend_y < MARGIN {
                // Remaining entries continue at the top of a fresh page.
                self.new_page();
                legend_x = MARGIN;
                legend_y = self.cursor - 6.0;
                continued = true;
            }
            self.filled_rect(legend_x, legend_y, 4.0, 4.0, PALETTE[i % PALETTE.len()]);
            let share = *value as f64 / total as f64 * 100.0;
            let entry = format!("{} ({}, {:.1}%)", label, value, share);
            self.text(&entry, 10.0, legend_x + 6.0, legend_y + 0.5, false, BLACK);
            legend_y -= 6.0;
        }

        self.cursor = if continued {
            legend_y - 6.0
        } else {
            (cy - RADIUS).min(legend_y) - 6.0
        };
    }
}

/// Renders the PDF report for one dataset.
pub fn render_report(
    dataset: &Dataset,
    generated_at: DateTime<Utc>,
) -> Result<RenderedReport, ServiceError> {
    let (doc, page, layer) = PdfDocument::new(
        format!("Equipment Report {}", dataset.id),
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Page 1",
    );
    let mut writer = PageWriter::new(&doc, page, layer)?;

    let chart = chart_data(&dataset.summary);

    writer.title_block();
    writer.metadata(dataset, generated_at);

    writer.heading("Summary Statistics");
    writer.table(
        ["Metric", "Value", "Min", "Max"],
        &summary_rows(&dataset.summary),
        [60.0, 35.0, 35.0, 35.0],
    );

    writer.heading("Equipment Type Distribution");
    writer.table(
        ["Equipment Type", "Count"],
        &distribution_rows(&dataset.summary),
        [80.0, 40.0],
    );

    writer.heading("Average Parameters Chart");
    writer.bar_chart(&chart);

    writer.heading("Equipment Type Distribution Chart");
    writer.pie_chart(&chart);

    let pages = writer.pages;
    drop(writer);
    let bytes = doc.save_to_bytes().map_err(report_error)?;
    debug!(
        "Rendered report for dataset {} ({} pages, {} bytes)",
        dataset.id,
        pages,
        bytes.len()
    );

    Ok(RenderedReport {
        file_name: format!("equipment_report_{}.pdf", dataset.id),
        bytes,
        pages,
    })
}
