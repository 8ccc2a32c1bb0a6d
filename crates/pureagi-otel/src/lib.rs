//! Tracing setup shared by the PureAGI binaries.

use once_cell::sync::OnceCell;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

/// Target used by the HTTP access-log middleware.
pub const ACCESS_TARGET: &str = "http.access";

static ROLL_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Where the rolling access log goes, when enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollingLog {
    pub dir: String,
    pub prefix: String,
    pub rotation: Rotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Minutely,
    Hourly,
    Daily,
}

impl Rotation {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hourly" => Rotation::Hourly,
            "minutely" => Rotation::Minutely,
            _ => Rotation::Daily,
        }
    }
}

impl RollingLog {
    /// `PUREAGI_LOG_ROLL=1` turns the rolling file on; the remaining
    /// variables pick the directory, file prefix and rotation.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if lookup("PUREAGI_LOG_ROLL").as_deref() != Some("1") {
            return None;
        }
        Some(Self {
            dir: lookup("PUREAGI_LOG_DIR").unwrap_or_else(|| "logs".to_string()),
            prefix: lookup("PUREAGI_LOG_PREFIX").unwrap_or_else(|| "http-access".into()),
            rotation: lookup("PUREAGI_LOG_ROTATION")
                .map(|r| Rotation::parse(&r))
                .unwrap_or(Rotation::Daily),
        })
    }
}

/// Install the global subscriber. `RUST_LOG` controls the console filter
/// (default `info`). Calling this more than once is harmless.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    install(filter, RollingLog::from_env());
}

fn install(filter: EnvFilter, rolling: Option<RollingLog>) {
    let fmt_layer = fmt::layer();
    let registry = tracing_subscriber::registry().with(fmt_layer.with_filter(filter));
    let Some(rolling) = rolling else {
        let _ = registry.try_init();
        return;
    };
    if std::fs::create_dir_all(&rolling.dir).is_err() {
        tracing::warn!(directory = %rolling.dir, "failed to create access log directory");
    }
    let writer = match rolling.rotation {
        Rotation::Hourly => tracing_appender::rolling::hourly(&rolling.dir, &rolling.prefix),
        Rotation::Minutely => tracing_appender::rolling::minutely(&rolling.dir, &rolling.prefix),
        Rotation::Daily => tracing_appender::rolling::daily(&rolling.dir, &rolling.prefix),
    };
    let (nb, guard) = tracing_appender::non_blocking(writer);
    let _ = ROLL_GUARD.set(guard);
    let targets = Targets::new().with_target(ACCESS_TARGET, tracing::Level::INFO);
    let access_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(nb)
        .with_filter(targets);
    let _ = registry.with(access_layer).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn rolling_log_is_opt_in() {
        assert_eq!(RollingLog::from_lookup(lookup(&[])), None);
        assert_eq!(
            RollingLog::from_lookup(lookup(&[("PUREAGI_LOG_ROLL", "0")])),
            None
        );
    }

    #[test]
    fn rolling_log_reads_overrides() {
        let cfg = RollingLog::from_lookup(lookup(&[
            ("PUREAGI_LOG_ROLL", "1"),
            ("PUREAGI_LOG_DIR", "/tmp/pureagi"),
            ("PUREAGI_LOG_ROTATION", "Hourly"),
        ]))
        .unwrap();
        assert_eq!(cfg.dir, "/tmp/pureagi");
        assert_eq!(cfg.prefix, "http-access");
        assert_eq!(cfg.rotation, Rotation::Hourly);
    }

    #[test]
    fn install_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let rolling = RollingLog {
            dir: dir.path().display().to_string(),
            prefix: "test".into(),
            rotation: Rotation::Daily,
        };
        install(EnvFilter::new("warn"), Some(rolling));
        install(EnvFilter::new("warn"), None);
        tracing::info!(target: ACCESS_TARGET, "still fine");
    }
}
