//! tracing subscriber setup: console layer plus an optional rotating file.

use std::io;
use std::path::Path;

use eyre::WrapErr;
use refill_config::Logging;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

use crate::cli::FILE_GUARD;

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn appender(path: &Path, rotation: Option<&str>) -> eyre::Result<RollingFileAppender> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let Some(name) = path.file_name() else {
        eyre::bail!("logging.file {} has no file name", path.display());
    };
    std::fs::create_dir_all(dir)
        .wrap_err_with(|| format!("create log directory {}", dir.display()))?;
    Ok(match rotation.unwrap_or("never") {
        "never" => rolling::never(dir, name),
        "daily" => rolling::daily(dir, name),
        "hourly" => rolling::hourly(dir, name),
        other => eyre::bail!("logging.rotation must be never|daily|hourly, got {other:?}"),
    })
}

/// Install the global subscriber. Console output goes to stderr so stdout
/// stays clean for command results.
pub fn init(json: bool, level: &str, logging: Option<&Logging>) -> eyre::Result<()> {
    let console: Box<dyn Layer<Registry> + Send + Sync> = if json {
        Box::new(
            fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_filter(filter(level)),
        )
    } else {
        Box::new(
            fmt::layer()
                .with_target(false)
                .with_writer(io::stderr)
                .with_filter(filter(level)),
        )
    };

    let file = match logging.and_then(|l| l.file.as_deref().map(|f| (l, f))) {
        Some((l, f)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender(
                Path::new(f),
                l.rotation.as_deref(),
            )?);
            let _ = FILE_GUARD.set(guard);
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(filter(l.level.as_deref().unwrap_or("info"))),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| eyre::eyre!("install tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn unknown_rotation_is_rejected() {
        let dir = tempdir().unwrap();
        let err = appender(&dir.path().join("station.log"), Some("weekly")).unwrap_err();
        assert!(err.to_string().contains("never|daily|hourly"));
    }

    #[test]
    fn appender_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("logs").join("station.log");
        appender(&nested, Some("daily")).unwrap();
        assert!(dir.path().join("logs").is_dir());
    }
}
