use crate::lbfgs::LbfgsConfig;
use burn::config::Config;

/// 学習設定
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// 粘性係数。既定値はありません
    pub nu: f64,
    /// 層の幅 (入力 2, 出力 1)
    #[config(default = "vec![2, 20, 20, 20, 20, 20, 20, 20, 20, 1]")]
    pub layers: Vec<usize>,
    /// 境界・初期条件から選ぶラベル付きサンプル数
    #[config(default = 100)]
    pub n_u: usize,
    /// コロケーション点の数
    #[config(default = 10000)]
    pub n_f: usize,
    /// 乱数のシード
    #[config(default = 1234)]
    pub seed: u64,
    /// 使用するオプティマイザの設定
    #[config(default = "LbfgsConfig::new()")]
    pub optimizer: LbfgsConfig,
}

/// 推論に必要なモデルの構成。パラメータと一緒に保存します。
#[derive(Config, Debug)]
pub struct ModelConfig {
    pub layers: Vec<usize>,
    pub lower_bound: [f64; 2],
    pub upper_bound: [f64; 2],
    pub nu: f64,
}
