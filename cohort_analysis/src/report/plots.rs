// src/report/plots.rs
// -----------------------------------------------------------------------------
// PNG figures: Kaplan–Meier curves, stacked percentage bars and count bars
// with Wilson error bars. Callers log failures and carry on.
// -----------------------------------------------------------------------------

use std::path::Path;

use plotters::prelude::*;
use tracing::info;

use crate::error::{AnalysisError, Result};
use crate::models::Pam50Subtype;
use crate::stats::kaplan_meier::KaplanMeierCurve;

const PLOT_WIDTH: u32 = 1000;
const PLOT_HEIGHT: u32 = 700;
const FONT_SIZE_TITLE: u32 = 26;
const FONT_SIZE_AXIS: u32 = 20;
const FONT_SIZE_LABEL: u32 = 16;

// ─── Colours ─────────────────────────────────────────────────────────────────

/// Cohort colours, assigned in label order.
const COHORT_PALETTE: [RGBColor; 9] = [
    RGBColor(0, 119, 182),   // Blue
    RGBColor(217, 72, 1),    // Orange
    RGBColor(0, 153, 136),   // Teal
    RGBColor(153, 0, 153),   // Purple
    RGBColor(230, 159, 0),   // Yellow
    RGBColor(86, 180, 233),  // Sky Blue
    RGBColor(213, 94, 0),    // Vermillion
    RGBColor(0, 158, 115),   // Bluish Green
    RGBColor(204, 121, 167), // Reddish Purple
];

pub fn cohort_colour(index: usize) -> RGBColor {
    COHORT_PALETTE[index % COHORT_PALETTE.len()]
}

pub fn subtype_colour(subtype: Pam50Subtype) -> RGBColor {
    match subtype {
        Pam50Subtype::LumA => RGBColor(0, 119, 182),  // #0077B6
        Pam50Subtype::LumB => RGBColor(106, 13, 173), // #6A0DAD
        Pam50Subtype::Basal => RGBColor(233, 30, 99), // #E91E63
        Pam50Subtype::Her2 => RGBColor(217, 4, 41),   // #D90429
        Pam50Subtype::Normal => RGBColor(0, 128, 128), // #008080
    }
}

/// Subtype colour when `label` is a PAM50 label, palette colour otherwise.
pub fn segment_colour(label: &str, index: usize) -> RGBColor {
    label
        .parse::<Pam50Subtype>()
        .map(subtype_colour)
        .unwrap_or_else(|_| cohort_colour(index))
}

// ─── Kaplan–Meier ────────────────────────────────────────────────────────────

pub struct KmSeries<'a> {
    pub label: String,
    pub curve: &'a KaplanMeierCurve,
}

fn step_points(curve: &KaplanMeierCurve, values: &[f64]) -> Vec<(f64, f64)> {
    let mut points = vec![(0.0, 1.0)];
    let mut previous = 1.0;
    for (&t, &v) in curve.times.iter().zip(values) {
        points.push((t, previous));
        points.push((t, v));
        previous = v;
    }
    points
}

pub fn plot_kaplan_meier(output_path: &Path, title: &str, series: &[KmSeries], footer: &str) -> Result<()> {
    let max_time = series
        .iter()
        .filter_map(|s| s.curve.times.last().copied())
        .fold(0.0f64, f64::max)
        .max(1.0);

    let root = BitMapBackend::new(output_path, (PLOT_WIDTH, PLOT_HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(AnalysisError::plot)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif bold", FONT_SIZE_TITLE))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..max_time * 1.05, 0.0..1.05)
        .map_err(AnalysisError::plot)?;

    chart
        .configure_mesh()
        .x_desc("Time (months)")
        .y_desc("Survival probability")
        .axis_desc_style(("sans-serif", FONT_SIZE_AXIS))
        .label_style(("sans-serif", FONT_SIZE_LABEL))
        .light_line_style(WHITE)
        .draw()
        .map_err(AnalysisError::plot)?;

    for (i, s) in series.iter().enumerate() {
        let colour = cohort_colour(i);

        // confidence band
        let mut band = step_points(s.curve, &s.curve.upper);
        let mut lower = step_points(s.curve, &s.curve.lower);
        lower.reverse();
        band.extend(lower);
        chart
            .draw_series(std::iter::once(Polygon::new(band, colour.mix(0.15).filled())))
            .map_err(AnalysisError::plot)?;

        chart
            .draw_series(LineSeries::new(
                step_points(s.curve, &s.curve.survival),
                colour.stroke_width(3),
            ))
            .map_err(AnalysisError::plot)?
            .label(s.label.clone())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 25, y)], colour.stroke_width(3)));

        chart
            .draw_series(s.curve.censor_times().map(|(t, v)| Cross::new((t, v), 4, colour.stroke_width(2))))
            .map_err(AnalysisError::plot)?;
    }

    chart
        .draw_series(std::iter::once(Text::new(
            footer.to_string(),
            (max_time * 0.05, 0.08),
            ("sans-serif bold", FONT_SIZE_AXIS).into_font(),
        )))
        .map_err(AnalysisError::plot)?;

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(&BLACK)
        .label_font(("sans-serif", FONT_SIZE_LABEL))
        .position(SeriesLabelPosition::UpperRight)
        .draw()
        .map_err(AnalysisError::plot)?;

    root.present().map_err(AnalysisError::plot)?;
    info!("Kaplan-Meier plot saved to {}", output_path.display());
    Ok(())
}

// ─── Bars ────────────────────────────────────────────────────────────────────

/// One segment per entry of `segments`; `segments[k].1[i]` is its height in
/// bar `i`.
pub fn plot_stacked_bars(
    output_path: &Path,
    title: &str,
    categories: &[String],
    segments: &[(String, Vec<f64>)],
    y_desc: &str,
    footer: Option<&str>,
) -> Result<()> {
    let n = categories.len() as u32;
    if n == 0 {
        return Err(AnalysisError::plot("no bars to draw"));
    }
    let y_max = (0..categories.len())
        .map(|i| segments.iter().map(|(_, v)| v.get(i).copied().unwrap_or(0.0)).sum::<f64>())
        .fold(0.0f64, f64::max)
        .max(1.0)
        * 1.1;

    let root = BitMapBackend::new(output_path, (PLOT_WIDTH, PLOT_HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(AnalysisError::plot)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif bold", FONT_SIZE_TITLE))
        .margin(15)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d((0u32..n).into_segmented(), 0.0..y_max)
        .map_err(AnalysisError::plot)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .y_desc(y_desc)
        .x_labels(categories.len())
        .x_label_formatter(&|v| match v {
            SegmentValue::CenterOf(i) => categories.get(*i as usize).cloned().unwrap_or_default(),
            _ => String::new(),
        })
        .axis_desc_style(("sans-serif", FONT_SIZE_AXIS))
        .label_style(("sans-serif", FONT_SIZE_LABEL))
        .draw()
        .map_err(AnalysisError::plot)?;

    let mut bottoms = vec![0.0f64; categories.len()];
    for (k, (label, heights)) in segments.iter().enumerate() {
        let colour = segment_colour(label, k);
        let rects: Vec<_> = (0..categories.len())
            .filter_map(|i| {
                let h = heights.get(i).copied().unwrap_or(0.0);
                if h <= 0.0 {
                    return None;
                }
                let y0 = bottoms[i];
                bottoms[i] += h;
                Some(Rectangle::new(
                    [
                        (SegmentValue::Exact(i as u32), y0),
                        (SegmentValue::Exact(i as u32 + 1), y0 + h),
                    ],
                    colour.filled(),
                ))
            })
            .collect();

        chart
            .draw_series(rects)
            .map_err(AnalysisError::plot)?
            .label(label.clone())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 12, y + 5)], colour.filled()));
    }

    if let Some(footer) = footer {
        chart
            .draw_series(std::iter::once(Text::new(
                footer.to_string(),
                (SegmentValue::Exact(0), y_max * 0.97),
                ("sans-serif bold", FONT_SIZE_AXIS).into_font(),
            )))
            .map_err(AnalysisError::plot)?;
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(&BLACK)
        .label_font(("sans-serif", FONT_SIZE_LABEL))
        .position(SeriesLabelPosition::UpperRight)
        .draw()
        .map_err(AnalysisError::plot)?;

    root.present().map_err(AnalysisError::plot)?;
    info!("Stacked bar chart saved to {}", output_path.display());
    Ok(())
}

/// Count bars with symmetric error bars of `margins` (count scale).
pub fn plot_count_bars(
    output_path: &Path,
    title: &str,
    categories: &[String],
    counts: &[usize],
    margins: &[f64],
    y_desc: &str,
) -> Result<()> {
    let n = categories.len() as u32;
    if n == 0 {
        return Err(AnalysisError::plot("no bars to draw"));
    }
    let total: usize = counts.iter().sum();
    let y_max = counts
        .iter()
        .zip(margins)
        .map(|(&c, &m)| c as f64 + m)
        .fold(1.0f64, f64::max)
        * 1.15;

    let root = BitMapBackend::new(output_path, (PLOT_WIDTH, PLOT_HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(AnalysisError::plot)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif bold", FONT_SIZE_TITLE))
        .margin(15)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d((0u32..n).into_segmented(), 0.0..y_max)
        .map_err(AnalysisError::plot)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .y_desc(y_desc)
        .x_labels(categories.len())
        .x_label_formatter(&|v| match v {
            SegmentValue::CenterOf(i) => categories.get(*i as usize).cloned().unwrap_or_default(),
            _ => String::new(),
        })
        .axis_desc_style(("sans-serif", FONT_SIZE_AXIS))
        .label_style(("sans-serif", FONT_SIZE_LABEL))
        .draw()
        .map_err(AnalysisError::plot)?;

    chart
        .draw_series(counts.iter().enumerate().map(|(i, &c)| {
            Rectangle::new(
                [
                    (SegmentValue::Exact(i as u32), 0.0),
                    (SegmentValue::Exact(i as u32 + 1), c as f64),
                ],
                cohort_colour(i).mix(0.8).filled(),
            )
        }))
        .map_err(AnalysisError::plot)?;

    chart
        .draw_series(counts.iter().zip(margins).enumerate().map(|(i, (&c, &m))| {
            let c = c as f64;
            ErrorBar::new_vertical(
                SegmentValue::CenterOf(i as u32),
                (c - m).max(0.0),
                c,
                c + m,
                BLACK.stroke_width(2),
                12,
            )
        }))
        .map_err(AnalysisError::plot)?;

    chart
        .draw_series(counts.iter().zip(margins).enumerate().map(|(i, (&c, &m))| {
            let pct = if total == 0 { 0.0 } else { 100.0 * c as f64 / total as f64 };
            Text::new(
                format!("n={c} ({pct:.1}%)"),
                (SegmentValue::Exact(i as u32), c as f64 + m + y_max * 0.02),
                ("sans-serif", FONT_SIZE_LABEL).into_font(),
            )
        }))
        .map_err(AnalysisError::plot)?;

    root.present().map_err(AnalysisError::plot)?;
    info!("Count bar chart saved to {}", output_path.display());
    Ok(())
}
