//! Two-panel comparison chart: bulk-load wall time on the left, mean query
//! latency per backend on the right. Queries that failed on a backend get a
//! marker instead of a bar.

use std::path::Path;

use plotters::prelude::*;

use crate::timing::{LoadComparison, QueryComparison};
use crate::ReportError;

const POSTGRES_COLOR: RGBColor = RGBColor(70, 130, 180);
const MONGO_COLOR: RGBColor = RGBColor(60, 179, 113);

fn chart_err<E: std::fmt::Display>(e: E) -> ReportError {
    ReportError::Chart(e.to_string())
}

/// Renders the comparison chart as a PNG.
///
/// # Errors
///
/// Returns [`ReportError::Chart`] if the backend cannot write the file or
/// any drawing primitive fails.
pub fn render_comparison_chart(
    path: &Path,
    load: &LoadComparison,
    comparisons: &[QueryComparison],
) -> Result<(), ReportError> {
    let root = BitMapBackend::new(path, (1280, 640)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;
    let (left, right) = root.split_horizontally(512);

    draw_load_panel(&left, load)?;
    draw_query_panel(&right, comparisons)?;

    root.present().map_err(chart_err)?;
    tracing::info!(path = %path.display(), "wrote comparison chart");
    Ok(())
}

fn draw_load_panel(
    area: &DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>,
    load: &LoadComparison,
) -> Result<(), ReportError> {
    let y_max = load.postgres_secs.max(load.mongo_secs).max(1.0) * 1.15;
    let mut chart = ChartBuilder::on(area)
        .caption("Bulk load time", ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..2f64, 0f64..y_max)
        .map_err(chart_err)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(2)
        .x_label_formatter(&|x| {
            if *x < 1.0 {
                "PostgreSQL".to_string()
            } else {
                "MongoDB".to_string()
            }
        })
        .y_desc("seconds")
        .draw()
        .map_err(chart_err)?;

    chart
        .draw_series([
            Rectangle::new([(0.2, 0.0), (0.8, load.postgres_secs)], POSTGRES_COLOR.filled()),
            Rectangle::new([(1.2, 0.0), (1.8, load.mongo_secs)], MONGO_COLOR.filled()),
        ])
        .map_err(chart_err)?;
    Ok(())
}

fn draw_query_panel(
    area: &DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>,
    comparisons: &[QueryComparison],
) -> Result<(), ReportError> {
    let names: Vec<&str> = comparisons.iter().map(|c| c.name.as_str()).collect();
    let y_max = comparisons
        .iter()
        .flat_map(|c| [c.postgres.mean_ms(), c.mongo.mean_ms()])
        .flatten()
        .fold(1.0f64, f64::max)
        * 1.15;

    let mut chart = ChartBuilder::on(area)
        .caption("Mean query latency", ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..comparisons.len().max(1) as f64, 0f64..y_max)
        .map_err(chart_err)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(comparisons.len().max(1))
        .x_label_formatter(&|x| {
            let idx = x.floor() as usize;
            names.get(idx).copied().unwrap_or("").to_string()
        })
        .y_desc("milliseconds")
        .draw()
        .map_err(chart_err)?;

    let mut pg_bars = Vec::new();
    let mut mongo_bars = Vec::new();
    let mut failed_marks = Vec::new();
    for (i, cmp) in comparisons.iter().enumerate() {
        let x = i as f64;
        match cmp.postgres.mean_ms() {
            Some(ms) => pg_bars.push(Rectangle::new(
                [(x + 0.10, 0.0), (x + 0.45, ms)],
                POSTGRES_COLOR.filled(),
            )),
            None => failed_marks.push((x + 0.12, y_max * 0.05)),
        }
        match cmp.mongo.mean_ms() {
            Some(ms) => mongo_bars.push(Rectangle::new(
                [(x + 0.55, 0.0), (x + 0.90, ms)],
                MONGO_COLOR.filled(),
            )),
            None => failed_marks.push((x + 0.57, y_max * 0.05)),
        }
    }

    chart
        .draw_series(pg_bars)
        .map_err(chart_err)?
        .label("PostgreSQL")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], POSTGRES_COLOR.filled()));
    chart
        .draw_series(mongo_bars)
        .map_err(chart_err)?
        .label("MongoDB")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], MONGO_COLOR.filled()));
    chart
        .draw_series(failed_marks.into_iter().map(|pos| {
            Text::new("failed", pos, ("sans-serif", 14).into_font().color(&RED))
        }))
        .map_err(chart_err)?;

    chart
        .configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.8))
        .draw()
        .map_err(chart_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn renders_a_png_with_failures_marked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("benchmark_comparison.png");

        let mut trend = QueryComparison::new("price_trend");
        trend.postgres.record_success(Duration::from_millis(14));
        trend.mongo.record_success(Duration::from_millis(40));
        let mut ranks = QueryComparison::new("rank_improvement");
        ranks.postgres.record_success(Duration::from_millis(9));
        ranks.mongo.record_failure();

        let load = LoadComparison {
            postgres_secs: 11.0,
            mongo_secs: 16.5,
        };
        render_comparison_chart(&path, &load, &[trend, ranks]).unwrap();

        let metadata = std::fs::metadata(&path).unwrap();
        assert!(metadata.len() > 0);
    }

    #[test]
    fn renders_with_no_queries_at_all() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.png");
        render_comparison_chart(&path, &LoadComparison::default(), &[]).unwrap();
        assert!(path.exists());
    }
}
