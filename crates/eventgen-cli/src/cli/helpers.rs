use super::CliError;
use anyhow::Context;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Replace every `@file` argument with the options listed in the file.
///
/// Each non-blank line not starting with `#` is either `key = value`, which
/// becomes the single argument `--key=value`, or a bare `key`, which becomes
/// the flag `--key`. Keys are lower-cased and `_` is read as `-`.
pub(super) fn expand_arg_files(args: Vec<String>) -> Result<Vec<String>, CliError> {
    let mut expanded = Vec::with_capacity(args.len());
    for arg in args {
        let Some(path) = arg.strip_prefix('@') else {
            expanded.push(arg);
            continue;
        };
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read argument file '{path}'"))?;
        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = match line.split_once('=') {
                Some((key, value)) => (key.trim(), Some(value.trim())),
                None => (line, None),
            };
            if key.is_empty() || key.contains(char::is_whitespace) {
                return Err(CliError::Usage(format!(
                    "{path}:{}: expected 'key = value' or a bare flag, got '{line}'",
                    number + 1
                )));
            }
            let option = format!("--{}", key.to_ascii_lowercase().replace('_', "-"));
            expanded.push(match value {
                Some(value) => format!("{option}={value}"),
                None => option,
            });
        }
    }
    Ok(expanded)
}

/// Install the global subscriber: `RUST_LOG` or `info`, appended to `logfile`
/// when one is configured.
pub(super) fn init_logging(logfile: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = match logfile {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create '{}'", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file '{}'", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|error| anyhow::anyhow!("failed to install logger: {error}"))
}

/// SIGINT/SIGTERM request a shutdown at the next event boundary; repeated
/// signals are ignored.
pub(super) fn install_shutdown_handler() -> anyhow::Result<Arc<AtomicBool>> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        if !flag.swap(true, Ordering::SeqCst) {
            warn!("termination requested, the run will end after the current event");
        }
    })
    .context("failed to install signal handler")?;
    Ok(shutdown)
}
