use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

/// ロガーを初期化します。
///
/// 既定は `info` で、その上に `RUST_LOG`、さらに引数のフィルタを重ねます。
/// どちらも `debug` のようなレベル単体か `burgers_pinn::lbfgs=debug` のような
/// モジュール指定を受け付けます。
pub fn init_logging(level: Option<&str>) {
    let env_filters = std::env::var("RUST_LOG").ok();
    builder(level, env_filters.as_deref()).init();
}

fn builder(level: Option<&str>, env_filters: Option<&str>) -> Builder {
    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info);
    // 同じモジュールへの指定は後から足したものが優先される
    for filters in [env_filters, level].into_iter().flatten() {
        builder.parse_filters(filters);
    }
    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{} {:5}] {}",
            buf.timestamp_seconds(),
            record.level(),
            record.args()
        )
    });
    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, Log, Metadata};

    fn enabled(logger: &env_logger::Logger, target: &str, level: Level) -> bool {
        logger.enabled(&Metadata::builder().target(target).level(level).build())
    }

    #[test]
    fn defaults_to_info() {
        let logger = builder(None, None).build();
        assert!(enabled(&logger, "burgers_pinn", Level::Info));
        assert!(!enabled(&logger, "burgers_pinn", Level::Debug));
    }

    #[test]
    fn module_directives_from_env_are_honoured() {
        let logger = builder(None, Some("burgers_pinn::lbfgs=debug")).build();
        assert!(enabled(&logger, "burgers_pinn::lbfgs", Level::Debug));
        assert!(!enabled(&logger, "burgers_pinn::data", Level::Debug));
        assert!(enabled(&logger, "burgers_pinn::data", Level::Info));
    }

    #[test]
    fn argument_overrides_env_level() {
        let logger = builder(Some("warn"), Some("debug")).build();
        assert!(enabled(&logger, "burgers_pinn", Level::Warn));
        assert!(!enabled(&logger, "burgers_pinn", Level::Info));
    }
}
