use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use hearth_config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber. Logs go to stderr so command output on stdout
/// stays machine readable; `RUST_LOG` wins over the configured level.
///
/// The returned guard flushes the file sink and must outlive the command.
pub fn init_tracing(config: &LoggingConfig, verbosity: u8) -> Result<Option<WorkerGuard>> {
    let level = match verbosity {
        0 => config.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log filter '{level}'"))?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let stderr = fmt::layer().with_writer(std::io::stderr);
    if config.json {
        layers.push(stderr.json().boxed());
    } else {
        layers.push(stderr.with_target(false).boxed());
    }

    let mut guard = None;
    if let Some(path) = &config.file {
        let (directory, file_name) = split_log_path(path)?;
        fs::create_dir_all(directory)
            .with_context(|| format!("failed to create log directory {}", directory.display()))?;
        let appender = tracing_appender::rolling::never(directory, file_name);
        let (writer, worker) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .boxed(),
        );
        guard = Some(worker);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))?;
    Ok(guard)
}

fn split_log_path(path: &Path) -> Result<(&Path, &std::ffi::OsStr)> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("log file path {} has no file name", path.display()))?;
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok((directory, file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_path_without_directory_uses_cwd() {
        let (dir, name) = split_log_path(Path::new("hearth.log")).unwrap();
        assert_eq!(dir, Path::new("."));
        assert_eq!(name, "hearth.log");
        let (dir, _) = split_log_path(Path::new("logs/hearth.log")).unwrap();
        assert_eq!(dir, Path::new("logs"));
        assert!(split_log_path(Path::new("/")).is_err());
    }
}
