use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// clapでコマンドラインの構造を定義します。
#[derive(Parser, Debug)]
#[command(author, version, about = "A Physics-Informed Neural Network (PINN) for the viscous Burgers equation with Burn", long_about = None)]
pub struct Cli {
    /// ログのフィルタ (info, debug, burgers_pinn::lbfgs=debug など)。RUST_LOG より優先
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// 実行するサブコマンドを定義します（train または infer）。
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// PINNモデルを学習し、結果をファイルに保存します
    Train(TrainArgs),
    /// 保存されたPINNモデルを使い、推論を実行します
    Infer(InferArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// x, t, usol を含む MATLAB 形式のデータファイル
    #[arg(long, default_value = "Data/burgers_shock.mat")]
    pub data: PathBuf,

    /// 学習設定の JSON ファイル
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 粘性係数 (設定ファイルの値より優先)
    #[arg(long)]
    pub nu: Option<f64>,

    /// 乱数のシード (設定ファイルの値より優先)
    #[arg(long)]
    pub seed: Option<u64>,

    /// 学習済みモデルや図の出力先
    #[arg(long, default_value = "artifacts")]
    pub artifact_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct InferArgs {
    /// 誤差評価に使う MATLAB 形式のデータファイル。省略時は一様格子で推論します
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// 学習済みモデルのあるディレクトリ
    #[arg(long, default_value = "artifacts")]
    pub artifact_dir: PathBuf,
}
