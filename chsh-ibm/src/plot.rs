//! CHSH witness plot
//!
//! Both witnesses are drawn as markers joined by lines against the sweep
//! angle in units of π. Horizontal lines mark the classical bound ±2
//! (dashed) and the Tsirelson bound ±2√2 (dash-dot); the regions between
//! them, where only entangled states can reach, are shaded.

use crate::error::{ChshError, Result};
use crate::sweep::PhaseSweep;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::f64::consts::SQRT_2;
use std::path::Path;
use tracing::info;

/// Largest |CHSH| reachable by a local hidden-variable model
pub const CLASSICAL_BOUND: f64 = 2.0;

/// Largest |CHSH| reachable by quantum mechanics
pub const TSIRELSON_BOUND: f64 = 2.0 * SQRT_2;

const PLOT_SIZE: (u32, u32) = (1000, 600);
const SERIES_COLORS: [RGBColor; 2] = [RGBColor(31, 119, 180), RGBColor(255, 127, 14)];
const REFERENCE_COLOR: RGBColor = RGBColor(230, 230, 230);
const BAND_COLOR: RGBColor = RGBColor(153, 153, 153);

/// Stroke pattern of a reference line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Solid,
    Dashed,
    DashDot,
}

impl LineStyle {
    /// Alternating on/off lengths as fractions of the line length
    fn pattern(self) -> &'static [f64] {
        match self {
            LineStyle::Solid => &[],
            LineStyle::Dashed => &[0.02, 0.012],
            LineStyle::DashDot => &[0.02, 0.008, 0.004, 0.008],
        }
    }
}

/// A horizontal line at a fixed witness value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceLine {
    pub y: f64,
    pub style: LineStyle,
}

/// Bound markers, independent of the data
pub fn reference_lines() -> [ReferenceLine; 4] {
    [
        ReferenceLine {
            y: CLASSICAL_BOUND,
            style: LineStyle::Dashed,
        },
        ReferenceLine {
            y: -CLASSICAL_BOUND,
            style: LineStyle::Dashed,
        },
        ReferenceLine {
            y: TSIRELSON_BOUND,
            style: LineStyle::DashDot,
        },
        ReferenceLine {
            y: -TSIRELSON_BOUND,
            style: LineStyle::DashDot,
        },
    ]
}

/// Shaded (low, high) bands between the classical and quantum bounds
pub fn shaded_bands() -> [(f64, f64); 2] {
    [
        (CLASSICAL_BOUND, TSIRELSON_BOUND),
        (-TSIRELSON_BOUND, -CLASSICAL_BOUND),
    ]
}

/// Split `[x0, x1]` into the drawn pieces of an on/off pattern
pub fn pattern_segments(x0: f64, x1: f64, pattern: &[f64]) -> Vec<(f64, f64)> {
    let span = x1 - x0;
    if pattern.is_empty() || span <= 0.0 {
        return vec![(x0, x1)];
    }

    let mut segments = Vec::new();
    let mut x = x0;
    let mut i = 0;
    while x < x1 {
        let len = pattern[i % pattern.len()] * span;
        if len <= 0.0 {
            break;
        }
        let end = (x + len).min(x1);
        if i % 2 == 0 {
            segments.push((x, end));
        }
        x = end;
        i += 1;
    }
    segments
}

/// Tick label for a value already divided by π
pub fn format_pi_tick(v: f64) -> String {
    let r = (v * 1e6).round() / 1e6;
    if r == 0.0 {
        "0".to_string()
    } else if r == 1.0 {
        "π".to_string()
    } else if r == -1.0 {
        "-π".to_string()
    } else {
        format!("{}π", r)
    }
}

/// Tick positions every 0.5 (in units of π) covering `[lo, hi]`
pub fn pi_ticks(lo: f64, hi: f64) -> Vec<f64> {
    let mut ticks = Vec::new();
    let mut k = (lo / 0.5 - 1e-9).ceil() as i64;
    while k as f64 * 0.5 <= hi + 1e-9 {
        ticks.push(k as f64 * 0.5);
        k += 1;
    }
    ticks
}

/// Fail early when an output file's directory is missing
pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(ChshError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("output directory {} does not exist", parent.display()),
            )))
        }
        _ => Ok(()),
    }
}

/// Results graph for one sweep
pub struct ResultsPlot<'a> {
    /// Sweep angles in units of π
    x: Vec<f64>,
    chsh1: &'a [f64],
    chsh2: &'a [f64],
}

impl<'a> ResultsPlot<'a> {
    /// Pair the sweep with both witness sequences
    pub fn new(sweep: &PhaseSweep, chsh1: &'a [f64], chsh2: &'a [f64]) -> Result<Self> {
        if sweep.is_empty() {
            return Err(ChshError::InvalidResponse("Nothing to plot".into()));
        }
        if chsh1.len() != sweep.len() || chsh2.len() != sweep.len() {
            return Err(ChshError::InvalidResponse(format!(
                "Witness lengths {} and {} do not match {} sweep points",
                chsh1.len(),
                chsh2.len(),
                sweep.len()
            )));
        }

        Ok(Self {
            x: sweep.in_units_of_pi(),
            chsh1,
            chsh2,
        })
    }

    /// Write the graph; `.svg` paths produce SVG, anything else PNG
    pub fn render(&self, path: &Path) -> Result<()> {
        ensure_parent_dir(path)?;

        let is_svg = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case("svg"));

        if is_svg {
            self.draw(SVGBackend::new(path, PLOT_SIZE).into_drawing_area())?;
        } else {
            self.draw(BitMapBackend::new(path, PLOT_SIZE).into_drawing_area())?;
        }

        info!(path = %path.display(), points = self.x.len(), "results graph written");
        Ok(())
    }

    fn y_range(&self) -> (f64, f64) {
        let (lo, hi) = self
            .chsh1
            .iter()
            .chain(self.chsh2)
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        ((-3.0f64).min(lo - 0.2), 3.0f64.max(hi + 0.2))
    }

    fn draw<DB: DrawingBackend>(&self, root: DrawingArea<DB, Shift>) -> Result<()> {
        root.fill(&WHITE).map_err(ChshError::plot)?;

        let x = &self.x;
        let x_min = x.iter().copied().fold(f64::INFINITY, f64::min);
        let mut x_max = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if x_max <= x_min {
            x_max = x_min + 0.5;
        }
        let (y_min, y_max) = self.y_range();

        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .x_label_area_size(45)
            .y_label_area_size(60)
            .build_cartesian_2d(x_min..x_max, y_min..y_max)
            .map_err(ChshError::plot)?;

        // A label count matching the 0.5π grid makes plotters pick that step
        chart
            .configure_mesh()
            .disable_mesh()
            .x_labels(pi_ticks(x_min, x_max).len())
            .x_desc("Theta")
            .y_desc("CHSH witness")
            .x_label_formatter(&|v| format_pi_tick(*v))
            .draw()
            .map_err(ChshError::plot)?;

        chart
            .draw_series(shaded_bands().iter().map(|&(lo, hi)| {
                Rectangle::new([(x_min, lo), (x_max, hi)], BAND_COLOR.mix(0.7).filled())
            }))
            .map_err(ChshError::plot)?;

        for line in reference_lines() {
            let segments = pattern_segments(x_min, x_max, line.style.pattern());
            chart
                .draw_series(segments.into_iter().map(|(a, b)| {
                    PathElement::new(vec![(a, line.y), (b, line.y)], REFERENCE_COLOR.stroke_width(1))
                }))
                .map_err(ChshError::plot)?;
        }

        for (values, label, color) in [
            (self.chsh1, "CHSH1", SERIES_COLORS[0]),
            (self.chsh2, "CHSH2", SERIES_COLORS[1]),
        ] {
            let points: Vec<(f64, f64)> = x.iter().copied().zip(values.iter().copied()).collect();

            chart
                .draw_series(LineSeries::new(points.clone(), color.stroke_width(2)))
                .map_err(ChshError::plot)?
                .label(label)
                .legend(move |(x, y)| {
                    PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
                });
            chart
                .draw_series(points.into_iter().map(|p| Circle::new(p, 4, color.filled())))
                .map_err(ChshError::plot)?;
        }

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK.mix(0.4))
            .draw()
            .map_err(ChshError::plot)?;

        root.present().map_err(ChshError::plot)?;
        Ok(())
    }
}

/// Whether text can be rendered on this machine
#[cfg(test)]
pub(crate) fn fonts_available() -> bool {
    ("sans-serif", 12).into_font().box_size("x").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_bounds_are_fixed() {
        let lines = reference_lines();
        let ys: Vec<f64> = lines.iter().map(|l| l.y).collect();
        assert_eq!(ys, vec![2.0, -2.0, 2.0 * SQRT_2, -2.0 * SQRT_2]);
        assert_eq!(lines[0].style, LineStyle::Dashed);
        assert_eq!(lines[2].style, LineStyle::DashDot);

        assert_eq!(shaded_bands(), [(2.0, 2.0 * SQRT_2), (-2.0 * SQRT_2, -2.0)]);
    }

    #[test]
    fn test_pi_ticks() {
        assert_eq!(pi_ticks(0.0, 2.0), vec![0.0, 0.5, 1.0, 1.5, 2.0]);
        assert_eq!(pi_ticks(0.2, 1.0), vec![0.5, 1.0]);
        let labels: Vec<String> = pi_ticks(0.0, 2.0).into_iter().map(format_pi_tick).collect();
        assert_eq!(labels, vec!["0", "0.5π", "π", "1.5π", "2π"]);
    }

    #[test]
    fn test_pattern_segments() {
        assert_eq!(pattern_segments(0.0, 2.0, &[]), vec![(0.0, 2.0)]);

        let dashes = pattern_segments(0.0, 1.0, &[0.25, 0.25]);
        assert_eq!(dashes, vec![(0.0, 0.25), (0.5, 0.75)]);

        let dash_dot = pattern_segments(0.0, 2.0, LineStyle::DashDot.pattern());
        assert!(dash_dot.len() > 10);
        assert!(dash_dot.iter().all(|&(a, b)| a < b && b <= 2.0));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let sweep = PhaseSweep::full_turn(3).unwrap();
        assert!(ResultsPlot::new(&sweep, &[1.0, 2.0], &[1.0, 2.0, 3.0]).is_err());
        assert!(ResultsPlot::new(&sweep, &[1.0; 3], &[]).is_err());

        let plot = ResultsPlot::new(&sweep, &[1.0; 3], &[1.0; 3]).unwrap();
        assert_eq!(plot.x, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_missing_directory_fails_before_drawing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("results_graph.png");
        let sweep = PhaseSweep::full_turn(2).unwrap();
        let plot = ResultsPlot::new(&sweep, &[2.0, -2.0], &[2.0, 2.0]).unwrap();

        let err = plot.render(&path).unwrap_err();
        assert!(matches!(err, ChshError::IoError(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_render_png_and_svg() {
        if !fonts_available() {
            return;
        }

        let sweep = PhaseSweep::full_turn(21).unwrap();
        let chsh1: Vec<f64> = sweep
            .values()
            .iter()
            .map(|t| TSIRELSON_BOUND * (t + PI / 4.0).cos())
            .collect();
        let chsh2: Vec<f64> = sweep
            .values()
            .iter()
            .map(|t| TSIRELSON_BOUND * (t - PI / 4.0).cos())
            .collect();
        let plot = ResultsPlot::new(&sweep, &chsh1, &chsh2).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("results_graph.png");
        let svg = dir.path().join("results_graph.svg");
        plot.render(&png).unwrap();
        plot.render(&svg).unwrap();

        assert!(std::fs::metadata(&png).unwrap().len() > 0);
        let svg_text = std::fs::read_to_string(&svg).unwrap();
        assert!(svg_text.contains("CHSH1"));
        assert!(svg_text.contains("Theta"));
        for tick in ["0.5π", "1.5π", "2π"] {
            assert!(svg_text.contains(tick), "missing tick {}", tick);
        }
    }
}
