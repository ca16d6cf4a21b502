//! クレート共通のエラー型。
//!
//! データ読み込み・ネットワーク構築・学習・成果物の保存で発生するエラーを
//! `PinnError` に集約します。

use burn::record::RecorderError;
use std::path::PathBuf;
use thiserror::Error;

/// クレート共通の結果型。
pub type PinnResult<T> = Result<T, PinnError>;

#[derive(Debug, Error)]
pub enum PinnError {
    #[error("I/O エラー: {0}")]
    Io(#[from] std::io::Error),

    /// MATファイルとして解析できない
    #[error("MATファイルの解析に失敗しました: {0}")]
    MatFile(String),

    /// 必要な変数が無い、数値型でない等
    #[error("入力データが不正です: {0}")]
    MalformedInput(String),

    #[error("形状が一致しません: {what} (期待値 {expected}, 実際 {actual})")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("ネットワーク構成が不正です: {0}")]
    InvalidTopology(String),

    #[error("ドメイン境界が不正です: lb={lb:?}, ub={ub:?}")]
    InvalidDomain { lb: [f64; 2], ub: [f64; 2] },

    #[error("粘性係数 nu が指定されていません。--nu または設定ファイルで指定してください")]
    MissingViscosity,

    /// 損失または勾配が有限値でなくなった
    #[error("学習が発散しました ({evaluation} 回目の評価で損失 {loss})")]
    Divergence { evaluation: usize, loss: f64 },

    #[error("パラメータの勾配が得られませんでした")]
    MissingGradient,

    #[error("設定ファイルの読み込みに失敗しました: {0}")]
    Config(String),

    #[error("モデルの保存または読み込みに失敗しました: {0}")]
    Record(#[from] RecorderError),

    #[error(
        "モデルファイル '{}' が見つかりません。最初に 'train' コマンドでモデルを学習・保存してください",
        .0.display()
    )]
    MissingModel(PathBuf),
}
