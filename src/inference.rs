use crate::SOLUTION_PLOT_FILENAME;
use crate::cli::InferArgs;
use crate::data::{BurgersData, grid_points};
use crate::error::PinnResult;
use crate::pinn::{Pinn, mean_square, relative_l2_error};
use crate::plot::plot_solution;
use burn::backend::NdArray;
use log::{info, warn};
use std::time::Instant;

type MyBackend = NdArray<f32>;

/// データファイルを指定しないときの格子の分割数
const DEFAULT_GRID: usize = 50;

/// `infer`サブコマンドを実行します。
pub fn run(args: &InferArgs) -> PinnResult<()> {
    let device = Default::default();

    info!(
        "保存済みモデルを '{}' からロード中...",
        args.artifact_dir.display()
    );
    let pinn = Pinn::<MyBackend>::load(&args.artifact_dir, &device)?;

    let (xs, ts, exact) = match &args.data {
        Some(path) => {
            let data = BurgersData::load(path)?;
            (data.x, data.t, Some(data.exact))
        }
        None => {
            let (lb, ub) = (pinn.domain().lower(), pinn.domain().upper());
            (
                linspace(lb[0], ub[0], DEFAULT_GRID),
                linspace(lb[1], ub[1], DEFAULT_GRID),
                None,
            )
        }
    };

    info!("推論を実行します - バックエンド: NdArray (CPU)");
    let inference_start = Instant::now();
    let coords = grid_points(&xs, &ts);
    let (u_pred, f_pred) = pinn.predict(&coords);
    let inference_duration = inference_start.elapsed();

    info!(
        "推論が完了しました。入力グリッド数: {}x{}={}",
        ts.len(),
        xs.len(),
        coords.len()
    );
    info!("=> 推論時間: {:.2?}", inference_duration);
    info!("=> 残差の二乗平均: {:.6e}", mean_square(&f_pred));
    if let Some(exact) = exact {
        info!("=> Error u: {:e}", relative_l2_error(&exact, &u_pred));
    }

    let plot_path = args.artifact_dir.join(SOLUTION_PLOT_FILENAME);
    match plot_solution(&xs, &ts, &u_pred, &plot_path) {
        Ok(()) => info!("=> 予測解を '{}' に保存しました。", plot_path.display()),
        Err(e) => warn!("グラフの描画に失敗しました: {e}"),
    }

    Ok(())
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| start + (end - start) * i as f64 / (n - 1) as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linspace_hits_both_ends() {
        let values = linspace(-1.0, 1.0, 5);
        assert_eq!(values, vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
    }
}
