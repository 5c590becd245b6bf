//! SVG chart rendering for plotted series.
//!
//! Each plotted series gets its own panel, stacked top to bottom. Missing
//! values break the line into separate polylines.

use crate::domain::error::PineError;
use crate::ports::plot_port::PlotPort;
use std::fs;
use std::path::Path;

const WIDTH: f64 = 500.0;
const PANEL_HEIGHT: f64 = 200.0;
const PADDING: f64 = 40.0;
const COLORS: &[&str] = &["blue", "orange", "green", "red", "purple"];

#[derive(Debug, Clone, PartialEq)]
struct Panel {
    label: String,
    values: Vec<f64>,
}

/// Collects plots and renders them as one SVG document.
#[derive(Debug, Default)]
pub struct SvgPlotAdapter {
    panels: Vec<Panel>,
}

impl SvgPlotAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    pub fn render(&self) -> String {
        let height = PANEL_HEIGHT * self.panels.len().max(1) as f64;
        let mut out = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{:.0}" height="{:.0}" viewBox="0 0 {:.0} {:.0}">"#,
            WIDTH, height, WIDTH, height
        );
        out.push('\n');
        out.push_str(r#"<rect width="100%" height="100%" fill="white"/>"#);
        out.push('\n');
        for (i, panel) in self.panels.iter().enumerate() {
            let color = COLORS[i % COLORS.len()];
            out.push_str(&format_panel(panel, PANEL_HEIGHT * i as f64, color));
        }
        out.push_str("</svg>\n");
        out
    }

    pub fn save(&self, path: &Path) -> Result<(), PineError> {
        fs::write(path, self.render())?;
        tracing::debug!(path = %path.display(), panels = self.panels.len(), "wrote chart");
        Ok(())
    }
}

impl PlotPort for SvgPlotAdapter {
    fn plot(&mut self, series: &[f64], label: Option<&str>) -> Result<(), PineError> {
        if series.is_empty() {
            return Err(PineError::Data {
                reason: "cannot plot an empty series".to_string(),
            });
        }
        let label = match label {
            Some(l) => l.to_string(),
            None => format!("Plot {}", self.panels.len() + 1),
        };
        self.panels.push(Panel {
            label,
            values: series.to_vec(),
        });
        Ok(())
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn format_panel(panel: &Panel, top: f64, color: &str) -> String {
    let finite = panel.values.iter().copied().filter(|v| v.is_finite());
    let min = finite.clone().fold(f64::INFINITY, f64::min);
    let max = finite.fold(f64::NEG_INFINITY, f64::max);

    let plot_width = WIDTH - 2.0 * PADDING;
    let plot_height = PANEL_HEIGHT - 2.0 * PADDING;
    let bottom = top + PANEL_HEIGHT - PADDING;

    let range = max - min;
    let scale_y = if range > 0.0 {
        plot_height / range
    } else {
        1.0
    };
    let scale_x = if panel.values.len() > 1 {
        plot_width / (panel.values.len() - 1) as f64
    } else {
        0.0
    };

    let mut out = format!(
        "<g>\n<text x=\"{:.0}\" y=\"{:.0}\" font-size=\"12\">{}</text>\n",
        PADDING,
        top + PADDING - 10.0,
        escape(&panel.label)
    );
    out.push_str(&format!(
        "<line x1=\"{p:.0}\" y1=\"{t:.0}\" x2=\"{p:.0}\" y2=\"{b:.0}\" stroke=\"black\"/>\n",
        p = PADDING,
        t = top + PADDING,
        b = bottom
    ));
    out.push_str(&format!(
        "<line x1=\"{p:.0}\" y1=\"{b:.0}\" x2=\"{r:.0}\" y2=\"{b:.0}\" stroke=\"black\"/>\n",
        p = PADDING,
        b = bottom,
        r = WIDTH - PADDING
    ));

    let mut segment: Vec<String> = Vec::new();
    let flush = |segment: &mut Vec<String>, out: &mut String| {
        if !segment.is_empty() {
            out.push_str(&format!(
                "<polyline fill=\"none\" stroke=\"{}\" stroke-width=\"1\" points=\"{}\"/>\n",
                color,
                segment.join(" ")
            ));
            segment.clear();
        }
    };
    for (i, value) in panel.values.iter().enumerate() {
        if !value.is_finite() {
            flush(&mut segment, &mut out);
            continue;
        }
        let x = PADDING + i as f64 * scale_x;
        let y = bottom - (value - min) * scale_y;
        segment.push(format!("{:.1},{:.1}", x, y));
    }
    flush(&mut segment, &mut out);
    out.push_str("</g>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_series_is_refused() {
        let mut adapter = SvgPlotAdapter::new();
        assert!(adapter.plot(&[], Some("x")).is_err());
        assert!(adapter.is_empty());
    }

    #[test]
    fn single_series_renders_one_polyline() {
        let mut adapter = SvgPlotAdapter::new();
        adapter.plot(&[1.0, 2.0, 3.0], Some("SMA")).unwrap();
        let svg = adapter.render();

        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("width=\"500\""));
        assert!(svg.contains("height=\"200\""));
        assert!(svg.contains(">SMA</text>"));
        assert_eq!(svg.matches("<polyline").count(), 1);
        assert!(svg.contains("40.0,160.0"));
        assert!(svg.contains("460.0,40.0"));
    }

    #[test]
    fn missing_values_split_the_line() {
        let mut adapter = SvgPlotAdapter::new();
        adapter.plot(&[1.0, 2.0, f64::NAN, 3.0, 4.0], None).unwrap();
        let svg = adapter.render();
        assert_eq!(svg.matches("<polyline").count(), 2);
        assert!(svg.contains(">Plot 1</text>"));
    }

    #[test]
    fn panels_stack_vertically() {
        let mut adapter = SvgPlotAdapter::new();
        adapter.plot(&[1.0, 2.0], Some("a")).unwrap();
        adapter.plot(&[5.0, 5.0], Some("b & c")).unwrap();
        let svg = adapter.render();
        assert_eq!(adapter.len(), 2);
        assert!(svg.contains("height=\"400\""));
        assert!(svg.contains("b &amp; c"));
    }

    #[test]
    fn save_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chart.svg");
        let mut adapter = SvgPlotAdapter::new();
        adapter.plot(&[1.0, 2.0], None).unwrap();
        adapter.save(&path).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("<polyline"));
    }
}
