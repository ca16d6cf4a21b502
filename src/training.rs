use crate::cli::TrainArgs;
use crate::config::TrainingConfig;
use crate::data::{BurgersData, collocation_points};
use crate::error::{PinnError, PinnResult};
use crate::pinn::{PhysicsInformedNN, mean_square, relative_l2_error};
use crate::plot::plot_loss_history;
use crate::{LOSS_PLOT_FILENAME, TRAINING_CONFIG_FILENAME};
use burn::backend::{Autodiff, NdArray};
use burn::config::Config;
use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::Path;
use std::time::Instant;

type MyBackend = Autodiff<NdArray<f32>>;

/// `train`サブコマンドを実行します。
pub fn run(args: &TrainArgs) -> PinnResult<()> {
    let config = resolve_config(args.config.as_deref(), args.nu, args.seed)?;
    let device = Default::default();
    let mut rng = StdRng::seed_from_u64(config.seed);

    // --- データセットの準備 ---
    info!("データを '{}' から読み込み中...", args.data.display());
    let data = BurgersData::load(&args.data)?;
    let domain = data.domain()?;
    let labeled = data.boundary_samples().choose(config.n_u, &mut rng)?;
    let collocation = collocation_points(config.n_f, &domain, &labeled, &mut rng);
    let grid = data.grid_points();
    info!(
        "ラベル付き {} 点, コロケーション {} 点, 評価格子 {}x{}",
        labeled.len(),
        collocation.len(),
        data.nt(),
        data.nx()
    );

    // --- モデルの初期化 ---
    let mut model = PhysicsInformedNN::<MyBackend>::new(
        &labeled,
        &collocation,
        &config.layers,
        domain,
        config.nu,
        &mut rng,
        &device,
    )?;
    let residual_before = model.pinn().valid().mean_squared_residual(&grid);

    info!(
        "学習を開始します (Burgers 方程式, nu = {}) - バックエンド: NdArray (CPU)",
        config.nu
    );
    let mut loss_history = Vec::new();
    let training_start = Instant::now();
    let outcome = model.train(&config.optimizer, |_, loss| {
        info!("Loss: {loss:.6e}");
        loss_history.push(loss);
    })?;
    let training_duration = training_start.elapsed();
    info!("学習が完了しました。");
    info!(
        "=> 学習時間: {:.4} 秒 (終了理由: {:?}, 反復 {}, 評価 {})",
        training_duration.as_secs_f64(),
        outcome.termination,
        outcome.iterations,
        outcome.evaluations
    );

    // --- 評価 ---
    let trained = model.pinn().valid();
    let (u_pred, f_pred) = trained.predict(&grid);
    info!("=> Error u: {:e}", relative_l2_error(&data.exact, &u_pred));
    info!(
        "=> 残差の二乗平均: 学習前 {:.6e}, 学習後 {:.6e}",
        residual_before,
        mean_square(&f_pred)
    );

    // --- 結果の保存と描画 ---
    std::fs::create_dir_all(&args.artifact_dir)?;
    let plot_path = args.artifact_dir.join(LOSS_PLOT_FILENAME);
    match plot_loss_history(&loss_history, &plot_path) {
        Ok(()) => info!("=> 損失グラフを '{}' に保存しました。", plot_path.display()),
        Err(e) => warn!("グラフの描画に失敗しました: {e}"),
    }

    info!("学習済みモデルを保存中...");
    trained.save(&args.artifact_dir)?;
    config.save(args.artifact_dir.join(TRAINING_CONFIG_FILENAME))?;
    info!("=> モデルを '{}' に保存しました。", args.artifact_dir.display());

    Ok(())
}

/// 設定ファイルとコマンドライン引数から学習設定を決めます。
///
/// 引数の値が設定ファイルより優先されます。粘性係数はどちらかで必ず指定します。
pub fn resolve_config(
    path: Option<&Path>,
    nu: Option<f64>,
    seed: Option<u64>,
) -> PinnResult<TrainingConfig> {
    let mut config = match (path, nu) {
        (Some(path), _) => {
            TrainingConfig::load(path).map_err(|e| PinnError::Config(e.to_string()))?
        }
        (None, Some(nu)) => TrainingConfig::new(nu),
        (None, None) => return Err(PinnError::MissingViscosity),
    };
    if let Some(nu) = nu {
        config.nu = nu;
    }
    if let Some(seed) = seed {
        config.seed = seed;
    }
    Ok(config)
}
