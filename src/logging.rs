//! Process-wide logging setup.
//!
//! One `tracing` subscriber, installed once from `main`, with its default
//! level taken from the CLI's `--loglevel` flag and overridable by
//! `RUST_LOG`. Ported from the teacher's `utils::init_tracing`; trimmed of
//! the Windows ANSI-color special case and the unrelated IPv6 lookup helper
//! it was bundled with (see DESIGN.md).

use std::str::FromStr;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `loglevel` is the CLI's `--loglevel`
/// value (e.g. `"debug"`); unrecognized values fall back to `info` and log a
/// warning once the subscriber is up.
pub fn init(loglevel: &str) {
    let default_level = LevelFilter::from_str(loglevel).unwrap_or(LevelFilter::INFO);

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::builder()
                    .with_default_directive(default_level.into())
                    .from_env_lossy(),
            )
            .with_line_number(true)
            .with_file(true)
            .finish(),
    )
    .expect("global tracing subscriber installed exactly once per process");

    if default_level == LevelFilter::INFO && !loglevel.eq_ignore_ascii_case("info") {
        tracing::warn!(requested = loglevel, "unknown log level, defaulting to info");
    }
}
