//! # 物理情報ニューラルネットワーク (PINN) ライブラリ
//!
//! `burn` フレームワークを使用して、物理情報ニューラルネットワーク（PINN）を構築し、
//! 1次元の粘性 Burgers 方程式 `u_t + u u_x - nu u_xx = 0` の代理解を学習するための
//! 主要なコンポーネントを提供します。

pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod inference;
pub mod jet;
pub mod lbfgs;
pub mod logging;
pub mod model;
pub mod pinn;
pub mod plot;
pub mod training;

pub use error::{PinnError, PinnResult};
pub use pinn::{PhysicsInformedNN, Pinn};

/// モデルを保存するファイル名
pub const MODEL_FILENAME: &str = "burgers_pinn.mpk";
/// モデル構成を保存するファイル名
pub const MODEL_CONFIG_FILENAME: &str = "model.json";
/// 学習設定を保存するファイル名
pub const TRAINING_CONFIG_FILENAME: &str = "training.json";
pub const LOSS_PLOT_FILENAME: &str = "loss_history.png";
pub const SOLUTION_PLOT_FILENAME: &str = "solution.png";
