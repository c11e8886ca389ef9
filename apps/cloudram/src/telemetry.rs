pub mod logging {
    use clap::ValueEnum;
    use std::fs::OpenOptions;
    use std::path::PathBuf;
    use std::sync::OnceLock;
    use tracing::level_filters::LevelFilter;
    use tracing_appender::non_blocking::WorkerGuard;
    use tracing_subscriber::EnvFilter;

    #[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
    pub enum LogLevel {
        Error,
        #[default]
        Warn,
        Info,
        Debug,
        Trace,
    }

    impl LogLevel {
        pub fn as_str(self) -> &'static str {
            match self {
                LogLevel::Error => "error",
                LogLevel::Warn => "warn",
                LogLevel::Info => "info",
                LogLevel::Debug => "debug",
                LogLevel::Trace => "trace",
            }
        }

        pub fn to_filter(self) -> LevelFilter {
            match self {
                LogLevel::Error => LevelFilter::ERROR,
                LogLevel::Warn => LevelFilter::WARN,
                LogLevel::Info => LevelFilter::INFO,
                LogLevel::Debug => LevelFilter::DEBUG,
                LogLevel::Trace => LevelFilter::TRACE,
            }
        }
    }

    #[derive(Clone, Debug, Default)]
    pub struct LogConfig {
        pub level: LogLevel,
        pub file: Option<PathBuf>,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum InitError {
        #[error("failed to open log file {path:?}: {source}")]
        Io {
            path: PathBuf,
            source: std::io::Error,
        },
        #[error("failed to configure logger: {0}")]
        Configure(String),
    }

    static INIT: OnceLock<()> = OnceLock::new();
    static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

    pub fn init(config: &LogConfig) -> Result<(), InitError> {
        if INIT.get().is_some() {
            return Ok(());
        }

        inner_init(config)?;
        INIT.set(()).ok();
        Ok(())
    }

    fn inner_init(config: &LogConfig) -> Result<(), InitError> {
        let env_filter = build_env_filter(config.level);

        let (writer, guard) = match &config.file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| InitError::Io {
                        path: path.clone(),
                        source,
                    })?;
                tracing_appender::non_blocking(file)
            }
            None => tracing_appender::non_blocking(std::io::stderr()),
        };

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_level(true)
            .with_target(config.level >= LogLevel::Debug)
            .with_ansi(config.file.is_none())
            .with_writer(writer)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|err| InitError::Configure(err.to_string()))?;

        // Keep the writer alive for the process; dropping it flushes and stops logging.
        let _ = GUARD.set(guard);
        Ok(())
    }

    fn build_env_filter(level: LogLevel) -> EnvFilter {
        if let Ok(filter) = std::env::var("CLOUDRAM_LOG_FILTER") {
            return EnvFilter::new(filter);
        }
        EnvFilter::new(default_filter_for(level))
    }

    /// Dependency crates stay at `info` unless explicitly asked for more.
    fn default_filter_for(level: LogLevel) -> String {
        let level = level.to_filter();
        if level > LevelFilter::INFO {
            let name = if level == LevelFilter::TRACE { "trace" } else { "debug" };
            format!(
                "info,cloudram={name},cloudram_client_core={name},cloudram_sdk={name}"
            )
        } else {
            level.to_string().to_ascii_lowercase()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn verbose_levels_only_raise_our_crates() {
            assert_eq!(
                default_filter_for(LogLevel::Debug),
                "info,cloudram=debug,cloudram_client_core=debug,cloudram_sdk=debug"
            );
            assert!(default_filter_for(LogLevel::Trace).starts_with("info,cloudram=trace"));
        }

        #[test]
        fn quiet_levels_apply_globally() {
            assert_eq!(default_filter_for(LogLevel::Warn), "warn");
            assert_eq!(default_filter_for(LogLevel::Info), "info");
            assert_eq!(default_filter_for(LogLevel::Error), "error");
        }

        #[test]
        fn level_names_round_trip_through_clap() {
            for level in [LogLevel::Error, LogLevel::Warn, LogLevel::Trace] {
                assert_eq!(LogLevel::from_str(level.as_str(), true).unwrap(), level);
            }
        }
    }
}
