//! Global tracing subscriber setup, mirroring the teacher's `bin-shared::setup_global_subscriber`:
//! an `EnvFilter::from_default_env()`-driven `fmt` layer on a `tracing_subscriber::Registry`,
//! with `tracing_log::LogTracer` bridging any stray `log` crate output. Unlike the teacher's
//! client binaries this process has no GUI-side log viewer, so a second layer mirrors output
//! into `log_dir` when one is configured.

use std::path::Path;

use tracing_log::LogTracer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

pub fn setup_global_subscriber(log_dir: Option<&Path>) -> anyhow::Result<()> {
    let stdout_layer = fmt::layer().with_filter(EnvFilter::from_default_env());

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join("iwlan-daemon.log"))?;
            let file_layer = fmt::layer()
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .with_filter(EnvFilter::from_default_env());
            Registry::default().with(stdout_layer).with(file_layer).try_init()?;
        }
        None => {
            Registry::default().with(stdout_layer).try_init()?;
        }
    }

    LogTracer::init()?;
    Ok(())
}
