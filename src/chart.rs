//! Candlestick chart for flagged symbols, written as SVG.

use crate::market_data::PriceBar;
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::Path;
use ta::Next;
use ta::indicators::SimpleMovingAverage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    /// Drawn over the candles, sharing the price axis.
    Price,
    /// Own panel under the candles with its own axis.
    Lower,
}

/// An indicator line aligned with the bars it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub label: String,
    pub color: String,
    pub panel: Panel,
    pub values: Vec<Option<f64>>,
}

#[async_trait]
pub trait ChartRenderer: Send + Sync {
    /// Writes a chart image of `bars` with `overlays` to `output`.
    async fn render(
        &self,
        title: &str,
        bars: &[PriceBar],
        overlays: &[Overlay],
        output: &Path,
    ) -> Result<()>;

    /// File extension of the images this renderer produces.
    fn extension(&self) -> &'static str;
}

const WIDTH: f64 = 1000.0;
const HEIGHT: f64 = 640.0;
const LEFT: f64 = 70.0;
const RIGHT: f64 = 20.0;
const TOP: f64 = 40.0;
const BOTTOM: f64 = 30.0;
const PANEL_GAP: f64 = 20.0;
const VOLUME_HEIGHT: f64 = 70.0;
const LOWER_HEIGHT: f64 = 140.0;

const UP_COLOR: &str = "#26a69a";
const DOWN_COLOR: &str = "#ef5350";
const MA_COLORS: [&str; 3] = ["#1f77b4", "#ff7f0e", "#9467bd"];

pub struct SvgChartRenderer {
    /// Trailing bars shown; indicators are still computed on the full series.
    pub days: usize,
    pub moving_averages: Vec<usize>,
}

impl Default for SvgChartRenderer {
    fn default() -> Self {
        Self {
            days: 50,
            moving_averages: vec![5, 25, 75],
        }
    }
}

impl SvgChartRenderer {
    pub fn new(days: usize) -> Self {
        Self {
            days,
            ..Self::default()
        }
    }

    pub fn to_svg(&self, title: &str, bars: &[PriceBar], overlays: &[Overlay]) -> Result<String> {
        let start = bars.len().saturating_sub(self.days.max(1));
        let visible = &bars[start..];
        if visible.is_empty() {
            bail!("no bars to plot for {title}");
        }

        let has_lower = overlays.iter().any(|o| o.panel == Panel::Lower);
        let plot_width = WIDTH - LEFT - RIGHT;
        let mut price_height = HEIGHT - TOP - BOTTOM - PANEL_GAP - VOLUME_HEIGHT;
        if has_lower {
            price_height -= PANEL_GAP + LOWER_HEIGHT;
        }
        let step = plot_width / visible.len() as f64;
        let x = |i: usize| LEFT + (i as f64 + 0.5) * step;

        let lo = visible.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        let hi = visible.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let price_scale = Scale::new(lo, hi, TOP, price_height);

        let mut svg = String::new();
        writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}">"#
        )?;
        writeln!(svg, r##"<rect width="100%" height="100%" fill="#ffffff"/>"##)?;
        writeln!(
            svg,
            r#"<text x="{}" y="24" font-family="sans-serif" font-size="16" text-anchor="middle">{}</text>"#,
            WIDTH / 2.0,
            escape(title)
        )?;
        axis_labels(&mut svg, &price_scale)?;

        let body_width = (step * 0.6).max(1.0);
        for (i, bar) in visible.iter().enumerate() {
            let color = if bar.close >= bar.open { UP_COLOR } else { DOWN_COLOR };
            let top = price_scale.y(bar.open.max(bar.close));
            let bottom = price_scale.y(bar.open.min(bar.close));
            writeln!(
                svg,
                r#"<line x1="{cx:.2}" y1="{:.2}" x2="{cx:.2}" y2="{:.2}" stroke="{color}"/>"#,
                price_scale.y(bar.high),
                price_scale.y(bar.low),
                cx = x(i),
            )?;
            writeln!(
                svg,
                r#"<rect class="candle" x="{:.2}" y="{top:.2}" width="{body_width:.2}" height="{:.2}" fill="{color}"/>"#,
                x(i) - body_width / 2.0,
                (bottom - top).max(1.0),
            )?;
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        for (period, color) in self.moving_averages.iter().zip(MA_COLORS.iter().cycle()) {
            let values = simple_moving_average(&closes, *period);
            draw_line(&mut svg, &values[start..], &x, &price_scale, color)?;
        }

        for overlay in overlays.iter().filter(|o| o.panel == Panel::Price) {
            let values = tail_aligned(&overlay.values, bars.len(), start);
            draw_line(&mut svg, &values, &x, &price_scale, &overlay.color)?;
        }

        let volume_top = TOP + price_height + PANEL_GAP;
        let max_volume = visible.iter().map(|b| b.volume).fold(0.0_f64, f64::max);
        let volume_scale = Scale::new(0.0, max_volume, volume_top, VOLUME_HEIGHT);
        let volume_bottom = volume_scale.y(0.0);
        for (i, bar) in visible.iter().enumerate() {
            let color = if bar.close >= bar.open { UP_COLOR } else { DOWN_COLOR };
            let top = volume_scale.y(bar.volume.max(0.0));
            writeln!(
                svg,
                r#"<rect class="volume" x="{:.2}" y="{top:.2}" width="{body_width:.2}" height="{:.2}" fill="{color}" fill-opacity="0.5"/>"#,
                x(i) - body_width / 2.0,
                volume_bottom - top,
            )?;
        }
        writeln!(
            svg,
            r#"<text x="{}" y="{:.2}" font-family="sans-serif" font-size="10" text-anchor="end">{max_volume:.0}</text>"#,
            LEFT - 6.0,
            volume_top + 3.0,
        )?;

        if has_lower {
            let lower_top = volume_top + VOLUME_HEIGHT + PANEL_GAP;
            let lower: Vec<(&Overlay, Vec<Option<f64>>)> = overlays
                .iter()
                .filter(|o| o.panel == Panel::Lower)
                .map(|o| (o, tail_aligned(&o.values, bars.len(), start)))
                .collect();
            let (lo, hi) = lower
                .iter()
                .flat_map(|(_, values)| values.iter().flatten())
                .fold((0.0_f64, 0.0_f64), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
            let scale = Scale::new(lo, hi, lower_top, LOWER_HEIGHT);
            writeln!(
                svg,
                r##"<line x1="{LEFT}" y1="{y:.2}" x2="{}" y2="{y:.2}" stroke="#bbbbbb" stroke-dasharray="4 2"/>"##,
                WIDTH - RIGHT,
                y = scale.y(0.0),
            )?;
            axis_labels(&mut svg, &scale)?;
            for (overlay, values) in &lower {
                draw_line(&mut svg, values, &x, &scale, &overlay.color)?;
            }
        }

        legend(&mut svg, &self.moving_averages, overlays)?;
        writeln!(svg, "</svg>")?;
        Ok(svg)
    }
}

#[async_trait]
impl ChartRenderer for SvgChartRenderer {
    async fn render(
        &self,
        title: &str,
        bars: &[PriceBar],
        overlays: &[Overlay],
        output: &Path,
    ) -> Result<()> {
        let svg = self.to_svg(title, bars, overlays)?;
        tokio::fs::write(output, svg).await?;
        Ok(())
    }

    fn extension(&self) -> &'static str {
        "svg"
    }
}

struct Scale {
    lo: f64,
    hi: f64,
    top: f64,
    height: f64,
}

impl Scale {
    fn new(lo: f64, hi: f64, top: f64, height: f64) -> Self {
        let (lo, hi) = if (hi - lo).abs() < f64::EPSILON {
            (lo - 1.0, hi + 1.0)
        } else {
            (lo, hi)
        };
        Self { lo, hi, top, height }
    }

    fn y(&self, value: f64) -> f64 {
        self.top + (self.hi - value) / (self.hi - self.lo) * self.height
    }
}

fn simple_moving_average(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let Ok(mut sma) = SimpleMovingAverage::new(period) else {
        return vec![None; values.len()];
    };
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let avg = sma.next(v);
            (i + 1 >= period).then_some(avg)
        })
        .collect()
}

/// Slice an overlay to the visible window. Overlays shorter than the series
/// are aligned on their last element.
fn tail_aligned(values: &[Option<f64>], total: usize, start: usize) -> Vec<Option<f64>> {
    let offset = total.saturating_sub(values.len());
    (start..total)
        .map(|i| i.checked_sub(offset).and_then(|j| values.get(j).copied().flatten()))
        .collect()
}

/// Runs of consecutive defined values, as (index, value) pairs.
fn segments(values: &[Option<f64>]) -> Vec<Vec<(usize, f64)>> {
    let mut out = Vec::new();
    let mut current = Vec::new();
    for (i, v) in values.iter().enumerate() {
        match v {
            Some(v) if v.is_finite() => current.push((i, *v)),
            _ => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn draw_line(
    svg: &mut String,
    values: &[Option<f64>],
    x: &impl Fn(usize) -> f64,
    scale: &Scale,
    color: &str,
) -> std::fmt::Result {
    for segment in segments(values) {
        let points: Vec<String> = segment
            .iter()
            .map(|(i, v)| format!("{:.2},{:.2}", x(*i), scale.y(*v)))
            .collect();
        writeln!(
            svg,
            r#"<polyline fill="none" stroke="{color}" stroke-width="1.2" points="{}"/>"#,
            points.join(" ")
        )?;
    }
    Ok(())
}

fn axis_labels(svg: &mut String, scale: &Scale) -> std::fmt::Result {
    for value in [scale.hi, (scale.hi + scale.lo) / 2.0, scale.lo] {
        writeln!(
            svg,
            r#"<text x="{}" y="{:.2}" font-family="sans-serif" font-size="10" text-anchor="end">{value:.2}</text>"#,
            LEFT - 6.0,
            scale.y(value) + 3.0,
        )?;
    }
    Ok(())
}

fn legend(svg: &mut String, moving_averages: &[usize], overlays: &[Overlay]) -> std::fmt::Result {
    let mut entries: Vec<(String, &str)> = moving_averages
        .iter()
        .zip(MA_COLORS.iter().cycle())
        .map(|(p, c)| (format!("MA{p}"), *c))
        .collect();
    entries.extend(overlays.iter().map(|o| (o.label.clone(), o.color.as_str())));

    let mut cursor = LEFT;
    for (label, color) in entries {
        writeln!(
            svg,
            r#"<text x="{cursor:.2}" y="{}" font-family="sans-serif" font-size="10" fill="{color}">{}</text>"#,
            HEIGHT - 10.0,
            escape(&label)
        )?;
        cursor += 12.0 + 6.5 * label.len() as f64;
    }
    Ok(())
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
