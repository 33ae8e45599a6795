use std::ops::Range;
use std::path::Path;

use anyhow::Result;
use itertools::{Itertools, MinMaxResult};
use plotters::coord::Shift;
use plotters::prelude::*;

use ql::learn::metrics::MetricsSample;
use ql::prelude::QlError;

const IMAGE_SIZE: (u32, u32) = (1024, 960);
const CAPTION_FONT: (&str, i32) = ("sans-serif", 20);

type Panel<'a> = DrawingArea<SVGBackend<'a>, Shift>;
type Points = Vec<(f64, f64)>;

/// Writes the training curves as SVG: batch loss (log scale), mean batch Q and reward with its moving average,
/// each over the step count.
pub fn plot_training_curves(
    samples: &[MetricsSample],
    file: &Path,
) -> Result<()> {
    let steps = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => first.step as f64..f64::max(last.step as f64, first.step as f64 + 1.0),
        _ => return Err(QlError::from("no metrics to plot").into()),
    };

    let loss: Points = samples
        .iter()
        .filter_map(|s| match s.loss {
            Some(l) if l > 0.0 && l.is_finite() => Some((s.step as f64, l as f64)),
            _ => None,
        })
        .collect();
    let mean_q: Points = samples
        .iter()
        .filter_map(|s| s.mean_q.map(|q| (s.step as f64, q as f64)))
        .collect();
    let reward: Points = samples.iter().map(|s| (s.step as f64, s.reward_sum as f64)).collect();
    let reward_avg: Points = samples
        .iter()
        .map(|s| (s.step as f64, s.reward_moving_avg as f64))
        .collect();

    let root = SVGBackend::new(file, IMAGE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((3, 1));

    draw_loss(&panels[0], steps.clone(), &loss)?;
    draw_linear(&panels[1], "mean batch Q", steps.clone(), &[("mean Q", &mean_q, BLUE)])?;
    draw_linear(
        &panels[2],
        "reward",
        steps,
        &[("reward", &reward, RED), ("moving average", &reward_avg, BLACK)],
    )?;

    root.present()?;
    log::info!("training curves written to {}", file.display());
    Ok(())
}

fn draw_loss(
    panel: &Panel,
    steps: Range<f64>,
    loss: &Points,
) -> Result<()> {
    let mut chart = ChartBuilder::on(panel)
        .caption("batch loss", CAPTION_FONT)
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(70)
        .build_cartesian_2d(steps, log_range(loss.iter().map(|p| p.1)).log_scale())?;
    chart.configure_mesh().x_desc("step").draw()?;
    chart.draw_series(LineSeries::new(loss.iter().copied(), &MAGENTA))?;
    Ok(())
}

fn draw_linear(
    panel: &Panel,
    caption: &str,
    steps: Range<f64>,
    series: &[(&str, &Points, RGBColor)],
) -> Result<()> {
    let values = series.iter().flat_map(|(_, points, _)| points.iter().map(|p| p.1));
    let mut chart = ChartBuilder::on(panel)
        .caption(caption, CAPTION_FONT)
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(70)
        .build_cartesian_2d(steps, linear_range(values))?;
    chart.configure_mesh().x_desc("step").draw()?;

    for &(label, points, color) in series {
        chart
            .draw_series(LineSeries::new(points.iter().copied(), &color))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
    }
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    Ok(())
}

fn linear_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    match values.filter(|v| v.is_finite()).minmax_by(f64::total_cmp) {
        MinMaxResult::NoElements => 0.0..1.0,
        MinMaxResult::OneElement(v) => v - 1.0..v + 1.0,
        MinMaxResult::MinMax(lo, hi) if lo == hi => lo - 1.0..hi + 1.0,
        MinMaxResult::MinMax(lo, hi) => {
            let margin = 0.05 * (hi - lo);
            lo - margin..hi + margin
        }
    }
}

/// positive values only
fn log_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    match values.filter(|v| v.is_finite() && *v > 0.0).minmax_by(f64::total_cmp) {
        MinMaxResult::NoElements => 1e-6..1.0,
        MinMaxResult::OneElement(v) => v / 2.0..v * 2.0,
        MinMaxResult::MinMax(lo, hi) if lo == hi => lo / 2.0..hi * 2.0,
        MinMaxResult::MinMax(lo, hi) => lo / 1.2..hi * 1.2,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rstest::rstest;

    use super::*;

    fn samples() -> Vec<MetricsSample> {
        (1..=40)
            .map(|i| MetricsSample {
                step: i * 25,
                episode: i / 10,
                epsilon: 0.9 - i as f64 * 0.01,
                loss: if i < 3 { None } else { Some(1.0 / i as f32) },
                mean_q: if i < 3 { None } else { Some(-0.37 + 0.01 * i as f32) },
                reward_sum: if i % 7 == 0 { -1.0 } else { 0.0 },
                reward_moving_avg: -0.01 * i as f32,
            })
            .collect()
    }

    #[test]
    fn test_plot_training_curves() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("curves.svg");

        plot_training_curves(&samples(), &file).unwrap();

        let svg = fs::read_to_string(&file).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("batch loss"));
        assert!(svg.contains("moving average"));
    }

    #[test]
    fn test_nothing_to_plot() {
        let dir = tempfile::tempdir().unwrap();
        assert!(plot_training_curves(&[], &dir.path().join("empty.svg")).is_err());
    }

    #[rstest]
    #[case(vec![], 0.0..1.0)]
    #[case(vec![2.0], 1.0..3.0)]
    #[case(vec![f64::NAN, 0.0, 10.0], -0.5..10.5)]
    fn test_linear_range(
        #[case] values: Vec<f64>,
        #[case] expected: Range<f64>,
    ) {
        assert_eq!(linear_range(values.into_iter()), expected);
    }

    #[rstest]
    #[case(vec![0.0, -1.0], 1e-6..1.0)]
    #[case(vec![0.5, 0.0], 0.25..1.0)]
    fn test_log_range(
        #[case] values: Vec<f64>,
        #[case] expected: Range<f64>,
    ) {
        assert_eq!(log_range(values.into_iter()), expected);
    }
}
