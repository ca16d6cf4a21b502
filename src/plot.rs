use plotters::prelude::*;
use std::path::Path;

/// 学習過程の損失をグラフとしてPNGファイルに出力します。
pub fn plot_loss_history(
    loss_hist: &[f64],
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let log_losses: Vec<f64> = loss_hist
        .iter()
        .map(|v| v.max(f64::MIN_POSITIVE).log10())
        .collect();
    let max_log_loss = log_losses.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min_log_loss = log_losses.iter().copied().fold(f64::INFINITY, f64::min) - 0.5;
    let (min_log_loss, max_log_loss) = if log_losses.is_empty() {
        (-6.0, 0.0)
    } else {
        (min_log_loss, max_log_loss + 0.1)
    };
    let mut chart = ChartBuilder::on(&root)
        .caption("Loss History", ("sans-serif", 40).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0..loss_hist.len().max(1), min_log_loss..max_log_loss)?;
    chart
        .configure_mesh()
        .y_desc("Loss (log10 scale)")
        .x_desc("L-BFGS iterations")
        .draw()?;
    chart
        .draw_series(LineSeries::new(
            log_losses.iter().enumerate().map(|(i, &val)| (i + 1, val)),
            &RED,
        ))?
        .label("Total Loss")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

/// 格子上の u(x, t) をヒートマップとして出力します。
///
/// `values` は t ごとに x を走査する順で `xs.len() * ts.len()` 個並んでいます。
pub fn plot_solution(
    xs: &[f64],
    ts: &[f64],
    values: &[f64],
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let (nx, nt) = (xs.len(), ts.len());
    if nx < 2 || nt < 2 || values.len() != nx * nt {
        return Err(format!("格子の形状が不正です: {nx}x{nt}, 値 {}", values.len()).into());
    }
    let root = BitMapBackend::new(path, (900, 500)).into_drawing_area();
    root.fill(&WHITE)?;
    let v_min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let v_max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = (v_max - v_min).max(f64::EPSILON);

    let mut chart = ChartBuilder::on(&root)
        .caption("u(x, t)", ("sans-serif", 30).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(ts[0]..ts[nt - 1], xs[0]..xs[nx - 1])?;
    chart.configure_mesh().x_desc("t").y_desc("x").draw()?;

    let half = |grid: &[f64], i: usize| {
        let lo = if i == 0 { grid[0] } else { 0.5 * (grid[i - 1] + grid[i]) };
        let hi = if i + 1 == grid.len() { grid[i] } else { 0.5 * (grid[i] + grid[i + 1]) };
        (lo, hi)
    };
    chart.draw_series((0..nt).flat_map(|i| {
        (0..nx).map(move |j| {
            let (t0, t1) = half(ts, i);
            let (x0, x1) = half(xs, j);
            let level = (values[i * nx + j] - v_min) / span;
            let color = HSLColor(0.66 * (1.0 - level), 0.9, 0.5);
            Rectangle::new([(t0, x0), (t1, x1)], color.filled())
        })
    }))?;
    root.present()?;
    Ok(())
}
