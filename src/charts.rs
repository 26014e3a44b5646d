//! Chart rendering for the expense summaries.
//!
//! Charts are drawn as SVG and rasterized to PNG in memory with resvg.

use std::f64::consts::PI;
use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use resvg::usvg::{self, fontdb};


const CHART_WIDTH: u32 = 800;
const CHART_HEIGHT: u32 = 600;
const BACKGROUND: &str = "#ffffff";
const TEXT_COLOR: &str = "#222222";
const GRID_COLOR: &str = "#dddddd";
const FONT_FAMILY: &str = "sans-serif";

const BAR_COLOR: &str = "#87CEEB";
const BAR_TITLE: &str = "Weekly Expenses";
const BAR_X_LABEL: &str = "Date";
const BAR_Y_LABEL: &str = "Total Spent";

const PIE_COLORS: [&str; 5] = ["#ff9999", "#66b3ff", "#99ff99", "#ffcc99", "#c2c2f0"];
const PIE_TITLE: &str = "Today's Expenses by Category";

// Plot area of the bar chart
const MARGIN_LEFT: f64 = 90.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 70.0;
const MARGIN_BOTTOM: f64 = 80.0;


/// Turns aggregated rows into PNG images.
pub trait ChartRenderer: Send + Sync {
    /// Bar chart with one bar per label, in the order given.
    fn render_bar_chart(&self, labels: &[String], values: &[f64]) -> Result<Vec<u8>>;

    /// Pie chart with one slice per label, annotated with its percentage.
    fn render_pie_chart(&self, labels: &[String], values: &[f64]) -> Result<Vec<u8>>;
}


/// Renderer backed by resvg.
#[derive(Clone)]
pub struct SvgChartRenderer {
    fontdb: Arc<fontdb::Database>,
}

impl SvgChartRenderer {
    /// Load the system fonts once. Without any fonts the charts still render, minus text.
    pub fn new() -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();

        // Generic families default to fonts that may not be installed
        let fallback = db
            .faces()
            .find_map(|face| face.families.first().map(|(name, _)| name.clone()));
        if let Some(family) = fallback {
            if db.query(&fontdb::Query {
                families: &[fontdb::Family::SansSerif],
                ..Default::default()
            })
            .is_none()
            {
                tracing::debug!(%family, "No default sans-serif font, falling back");
                db.set_sans_serif_family(family);
            }
        }

        tracing::debug!(faces = db.len(), "Loaded fonts for chart rendering");

        Self { fontdb: Arc::new(db) }
    }

    fn rasterize(&self, svg: &str) -> Result<Vec<u8>> {
        let mut options = usvg::Options::default();
        options.fontdb = Arc::clone(&self.fontdb);

        let tree = usvg::Tree::from_str(svg, &options).context("Failed to parse SVG")?;

        let size = tree.size();
        let mut pixmap = tiny_skia::Pixmap::new(size.width() as u32, size.height() as u32)
            .context("Failed to create pixmap")?;
        pixmap.fill(tiny_skia::Color::WHITE);

        resvg::render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());

        pixmap.encode_png().context("Failed to encode PNG")
    }
}

impl Default for SvgChartRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChartRenderer for SvgChartRenderer {
    fn render_bar_chart(&self, labels: &[String], values: &[f64]) -> Result<Vec<u8>> {
        check_lengths(labels, values)?;
        self.rasterize(&bar_chart_svg(labels, values))
    }

    fn render_pie_chart(&self, labels: &[String], values: &[f64]) -> Result<Vec<u8>> {
        check_lengths(labels, values)?;
        self.rasterize(&pie_chart_svg(labels, values))
    }
}


fn check_lengths(labels: &[String], values: &[f64]) -> Result<()> {
    if labels.len() != values.len() {
        bail!(
            "Chart needs one value per label (got {} labels, {} values)",
            labels.len(),
            values.len()
        );
    }
    Ok(())
}


/// Open the SVG document with background and title.
fn svg_header(title: &str) -> String {
    let mut svg = format!(
        r#"<svg width="{w}" height="{h}" viewBox="0 0 {w} {h}" xmlns="http://www.w3.org/2000/svg">"#,
        w = CHART_WIDTH,
        h = CHART_HEIGHT
    );
    let _ = write!(
        svg,
        r#"<rect width="{}" height="{}" fill="{}"/>"#,
        CHART_WIDTH, CHART_HEIGHT, BACKGROUND
    );
    let _ = write!(
        svg,
        r#"<text x="{}" y="40" font-family="{}" font-size="20" font-weight="bold" fill="{}" text-anchor="middle">{}</text>"#,
        CHART_WIDTH / 2,
        FONT_FAMILY,
        TEXT_COLOR,
        escape_xml(title)
    );
    svg
}


/// Generate SVG for the weekly bar chart.
fn bar_chart_svg(labels: &[String], values: &[f64]) -> String {
    let mut svg = svg_header(BAR_TITLE);

    let plot_left = MARGIN_LEFT;
    let plot_right = CHART_WIDTH as f64 - MARGIN_RIGHT;
    let plot_top = MARGIN_TOP;
    let plot_bottom = CHART_HEIGHT as f64 - MARGIN_BOTTOM;
    let plot_width = plot_right - plot_left;
    let plot_height = plot_bottom - plot_top;

    let (axis_min, axis_max, step) = value_axis(values);
    let to_y = |v: f64| plot_bottom - (v - axis_min) / (axis_max - axis_min) * plot_height;

    // Gridlines and tick labels
    let ticks = ((axis_max - axis_min) / step).round() as i64;
    for i in 0..=ticks {
        let value = axis_min + i as f64 * step;
        let y = to_y(value);
        let _ = write!(
            svg,
            r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="{}" stroke-width="1"/>"#,
            plot_left, y, plot_right, y, GRID_COLOR
        );
        let _ = write!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" font-family="{}" font-size="12" fill="{}" text-anchor="end">{}</text>"#,
            plot_left - 8.0,
            y + 4.0,
            FONT_FAMILY,
            TEXT_COLOR,
            format_tick(value, step)
        );
    }

    // Bars
    if !values.is_empty() {
        let slot = plot_width / values.len() as f64;
        let bar_width = slot * 0.8;
        let zero_y = to_y(0.0);

        for (i, (label, &value)) in labels.iter().zip(values).enumerate() {
            let x = plot_left + i as f64 * slot + (slot - bar_width) / 2.0;
            let value_y = to_y(value);
            let (top, height) = if value >= 0.0 {
                (value_y, zero_y - value_y)
            } else {
                (zero_y, value_y - zero_y)
            };

            let _ = write!(
                svg,
                r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}"/>"#,
                x, top, bar_width, height, BAR_COLOR
            );
            let _ = write!(
                svg,
                r#"<text x="{:.1}" y="{:.1}" font-family="{}" font-size="12" fill="{}" text-anchor="middle">{}</text>"#,
                x + bar_width / 2.0,
                plot_bottom + 20.0,
                FONT_FAMILY,
                TEXT_COLOR,
                escape_xml(label)
            );
        }
    }

    // Axes
    let _ = write!(
        svg,
        r#"<line x1="{l:.1}" y1="{t:.1}" x2="{l:.1}" y2="{b:.1}" stroke="{c}" stroke-width="1.5"/>"#,
        l = plot_left,
        t = plot_top,
        b = plot_bottom,
        c = TEXT_COLOR
    );
    let _ = write!(
        svg,
        r#"<line x1="{:.1}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="{}" stroke-width="1.5"/>"#,
        plot_left,
        plot_right,
        TEXT_COLOR,
        y = to_y(0.0)
    );

    // Axis labels
    let _ = write!(
        svg,
        r#"<text x="{:.1}" y="{:.1}" font-family="{}" font-size="14" fill="{}" text-anchor="middle">{}</text>"#,
        plot_left + plot_width / 2.0,
        CHART_HEIGHT as f64 - 25.0,
        FONT_FAMILY,
        TEXT_COLOR,
        BAR_X_LABEL
    );
    let label_y = plot_top + plot_height / 2.0;
    let _ = write!(
        svg,
        r#"<text x="25" y="{y:.1}" font-family="{}" font-size="14" fill="{}" text-anchor="middle" transform="rotate(-90 25 {y:.1})">{}</text>"#,
        FONT_FAMILY,
        TEXT_COLOR,
        BAR_Y_LABEL,
        y = label_y
    );

    svg.push_str("</svg>");
    svg
}


/// Generate SVG for the category pie chart.
fn pie_chart_svg(labels: &[String], values: &[f64]) -> String {
    let mut svg = svg_header(PIE_TITLE);

    // Non-positive slices have no area to draw
    let slices: Vec<(usize, &String, f64)> = labels
        .iter()
        .zip(values)
        .enumerate()
        .filter(|(_, (_, v))| **v > 0.0 && v.is_finite())
        .map(|(i, (label, &v))| (i, label, v))
        .collect();
    let total: f64 = slices.iter().map(|(_, _, v)| v).sum();

    let cx = CHART_WIDTH as f64 / 2.0;
    let cy = CHART_HEIGHT as f64 / 2.0 + 25.0;
    let radius = 200.0;
    let point = |angle: f64, r: f64| (cx + r * angle.cos(), cy - r * angle.sin());

    let mut start = 0.0_f64;
    for (index, label, value) in slices.iter().copied() {
        let fraction = value / total;
        let sweep = fraction * 2.0 * PI;
        let end = start + sweep;
        let color = PIE_COLORS[index % PIE_COLORS.len()];

        if slices.len() == 1 {
            let _ = write!(
                svg,
                r#"<circle cx="{:.2}" cy="{:.2}" r="{:.2}" fill="{}"/>"#,
                cx, cy, radius, color
            );
        } else {
            let (x0, y0) = point(start, radius);
            let (x1, y1) = point(end, radius);
            let large_arc = if sweep > PI { 1 } else { 0 };
            // sweep-flag 0: counter-clockwise on screen
            let _ = write!(
                svg,
                r#"<path d="M {:.2} {:.2} L {:.2} {:.2} A {r:.2} {r:.2} 0 {} 0 {:.2} {:.2} Z" fill="{}"/>"#,
                cx, cy, x0, y0, large_arc, x1, y1, color,
                r = radius
            );
        }

        let mid = start + sweep / 2.0;
        let (px, py) = point(mid, radius * 0.6);
        let _ = write!(
            svg,
            r#"<text x="{:.2}" y="{:.2}" font-family="{}" font-size="13" fill="{}" text-anchor="middle">{:.1}%</text>"#,
            px,
            py + 4.0,
            FONT_FAMILY,
            TEXT_COLOR,
            fraction * 100.0
        );

        let (lx, ly) = point(mid, radius * 1.1);
        let anchor = if mid.cos() >= 0.0 { "start" } else { "end" };
        let _ = write!(
            svg,
            r#"<text x="{:.2}" y="{:.2}" font-family="{}" font-size="14" fill="{}" text-anchor="{}">{}</text>"#,
            lx,
            ly + 4.0,
            FONT_FAMILY,
            TEXT_COLOR,
            anchor,
            escape_xml(label)
        );

        start = end;
    }

    svg.push_str("</svg>");
    svg
}


/// Value axis bounds and tick step. Always includes zero.
fn value_axis(values: &[f64]) -> (f64, f64, f64) {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (min, max) = finite.fold((0.0_f64, 0.0_f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let range = if max > min { max - min } else { 1.0 };

    let step = nice_step(range / 5.0);
    let axis_min = (min / step).floor() * step;
    let mut axis_max = (max / step).ceil() * step;
    if axis_max <= axis_min {
        axis_max = axis_min + step;
    }

    (axis_min, axis_max, step)
}


/// Round a raw step up to 1, 2 or 5 times a power of ten.
fn nice_step(raw: f64) -> f64 {
    let magnitude = 10f64.powf(raw.log10().floor());
    let normalized = raw / magnitude;
    let nice = if normalized <= 1.0 {
        1.0
    } else if normalized <= 2.0 {
        2.0
    } else if normalized <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}


fn format_tick(value: f64, step: f64) -> String {
    if step >= 1.0 {
        format!("{:.0}", value)
    } else {
        let decimals = (-step.log10().floor()) as usize;
        format!("{:.*}", decimals, value)
    }
}


fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}


#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_bar_chart_is_png() {
        let renderer = SvgChartRenderer::new();
        let png = renderer
            .render_bar_chart(&labels(&["2024-01-01", "2024-01-02"]), &[10.0, 25.0])
            .unwrap();

        assert!(png.len() > PNG_SIGNATURE.len());
        assert_eq!(&png[..8], &PNG_SIGNATURE);
    }

    #[test]
    fn test_pie_chart_is_png() {
        let renderer = SvgChartRenderer::new();
        let png = renderer
            .render_pie_chart(&labels(&["food", "transport"]), &[12.0, 8.0])
            .unwrap();

        assert_eq!(&png[..8], &PNG_SIGNATURE);
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let renderer = SvgChartRenderer::new();

        assert!(renderer.render_bar_chart(&labels(&["a"]), &[1.0, 2.0]).is_err());
        assert!(renderer.render_pie_chart(&labels(&["a", "b"]), &[1.0]).is_err());
    }

    #[test]
    fn test_bar_chart_styling() {
        let svg = bar_chart_svg(&labels(&["2024-01-01"]), &[42.0]);

        assert!(svg.contains(BAR_COLOR));
        assert!(svg.contains("Weekly Expenses"));
        assert!(svg.contains(">Date<"));
        assert!(svg.contains(">Total Spent<"));
        assert!(svg.contains(r#"width="800" height="600""#));
    }

    #[test]
    fn test_bar_chart_handles_negative_and_zero_values() {
        let renderer = SvgChartRenderer::new();

        assert!(renderer.render_bar_chart(&labels(&["a", "b"]), &[-5.0, 20.0]).is_ok());
        assert!(renderer.render_bar_chart(&labels(&["a"]), &[0.0]).is_ok());
    }

    #[test]
    fn test_pie_palette_cycles_after_five_categories() {
        let names = labels(&["a", "b", "c", "d", "e", "f"]);
        let svg = pie_chart_svg(&names, &[1.0; 6]);

        assert_eq!(svg.matches(PIE_COLORS[0]).count(), 2);
        assert_eq!(svg.matches(PIE_COLORS[4]).count(), 1);
        assert!(svg.contains("16.7%"));
    }

    #[test]
    fn test_pie_percentages() {
        let svg = pie_chart_svg(&labels(&["food", "transport"]), &[12.0, 8.0]);

        assert!(svg.contains("60.0%"));
        assert!(svg.contains("40.0%"));
        assert!(svg.contains(">food<"));
    }

    #[test]
    fn test_single_slice_is_full_circle() {
        let svg = pie_chart_svg(&labels(&["rent"]), &[900.0]);

        assert!(svg.contains("<circle"));
        assert!(svg.contains("100.0%"));
    }

    #[test]
    fn test_pie_skips_non_positive_slices() {
        let svg = pie_chart_svg(&labels(&["refund", "food"]), &[-3.0, 5.0]);

        assert!(!svg.contains("refund"));
        assert!(svg.contains("100.0%"));
    }

    #[test]
    fn test_labels_are_escaped() {
        let svg = pie_chart_svg(&labels(&["<b>&co", "x"]), &[1.0, 1.0]);

        assert!(svg.contains("&lt;b&gt;&amp;co"));
        assert!(usvg::Tree::from_str(&svg, &usvg::Options::default()).is_ok());
    }

    #[test]
    fn test_value_axis_includes_zero() {
        let (min, max, step) = value_axis(&[10.0, 25.0]);
        assert_eq!(min, 0.0);
        assert_eq!(max, 25.0);
        assert_eq!(step, 5.0);

        let (min, max, _) = value_axis(&[-7.0, 3.0]);
        assert!(min <= -7.0);
        assert!(max >= 3.0);
    }

    #[test]
    fn test_nice_step() {
        assert_eq!(nice_step(0.7), 1.0);
        assert_eq!(nice_step(3.0), 5.0);
        assert_eq!(nice_step(18.0), 20.0);
        assert_eq!(nice_step(60.0), 100.0);
    }
}
