//! Crate-scoped tracing output: RFC3339 timestamps, compact lines, only
//! events whose target starts with [`TARGET_PREFIX`].

use std::io::{self, IsTerminal};
use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, filter, fmt};

/// Crate target prefix used to filter only library-originated logs.
pub const TARGET_PREFIX: &str = "ai_llm_service";

/// UTC timestamps with whole seconds, e.g. `2025-09-12T10:20:30Z`.
#[derive(Clone, Debug, Default)]
struct UtcSeconds;

impl FormatTime for UtcSeconds {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        w.write_str(&chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
    }
}

/// Model-call events only, rendered on stderr.
///
/// Compact lines with level, target and `file:line`; instrumented spans
/// report their duration on close, which is how per-request latency shows
/// up. Compose it with the binary's global fmt layer, which should carry
/// [`exclude_this_crate`].
pub fn layer<S>() -> impl Layer<S> + Send + Sync
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    scoped_layer(TARGET_PREFIX)
}

/// Same format as [`layer`] for any target prefix.
pub fn scoped_layer<S>(prefix: &'static str) -> impl Layer<S> + Send + Sync
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let ansi = io::stderr().is_terminal();
    // Timer, level and location live on the event format, not on the layer.
    let format = fmt::format()
        .compact()
        .with_timer(UtcSeconds)
        .with_level(true)
        .with_target(true)
        .with_source_location(true)
        .with_ansi(ansi);
    fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(ansi)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .event_format(format)
        .with_filter(filter::filter_fn(move |meta| meta.target().starts_with(prefix)))
}

/// Level directive for this library only, e.g. `ai_llm_service=debug`.
pub fn level_directive(level: Level) -> Option<Directive> {
    let s = format!("{TARGET_PREFIX}={}", level.as_str().to_lowercase());
    Directive::from_str(&s).ok()
}

/// `EnvFilter` from `RUST_LOG` or `default`, with this library raised to `level`.
pub fn env_filter_with_level(default: &str, level: Level) -> EnvFilter {
    let base = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    match level_directive(level) {
        Some(d) => base.add_directive(d),
        None => base,
    }
}

/// Filter that drops this crate's events. The binary puts it on the global
/// fmt layer so events rendered by [`layer`] are not printed twice.
pub fn exclude_this_crate() -> filter::FilterFn<fn(&tracing::Metadata<'_>) -> bool> {
    fn keep(meta: &tracing::Metadata<'_>) -> bool {
        !meta.target().starts_with(TARGET_PREFIX)
    }
    filter::filter_fn(keep as fn(&tracing::Metadata<'_>) -> bool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_targets_this_crate() {
        let d = level_directive(Level::DEBUG).unwrap();
        assert_eq!(d.to_string(), "ai_llm_service=debug");
    }

    #[test]
    fn timer_writes_rfc3339() {
        let mut out = String::new();
        UtcSeconds.format_time(&mut Writer::new(&mut out)).unwrap();
        assert!(out.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&out).is_ok());
    }
}
