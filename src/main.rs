//! # 物理情報ニューラルネットワーク (PINN) プログラム
//!
//! `burn` フレームワークを使用して、粘性 Burgers 方程式の解を学習する PINN です。
//!
//! `clap` クレートを利用して、コマンドラインから`train`（学習）と`infer`（推論）の
//! 機能を個別に実行できます。
//!
//! ## 使い方
//!
//! ### 学習
//! ```bash
//! cargo run --release -- train --data Data/burgers_shock.mat --nu 0.0031831
//! ```
//!
//! ### 推論
//! ```bash
//! cargo run --release -- infer --data Data/burgers_shock.mat
//! ```

use burgers_pinn::cli::{Cli, Commands};
use burgers_pinn::logging::init_logging;
use burgers_pinn::{inference, training};
use clap::Parser;
use log::error;

/// プログラムのエントリーポイント。
///
/// コマンドライン引数を解析し、`train`または`infer`の処理に振り分けます。
fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let result = match &cli.command {
        Commands::Train(args) => training::run(args),
        Commands::Infer(args) => inference::run(args),
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}
