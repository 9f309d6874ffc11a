//! Subscriber setup and component-scoped log macros
//!
//! Events carry a `component` field (`ingress`, `delivery`, `internal`) so
//! one grep isolates a pipeline stage. Filtering is directive-based: the
//! `LOG_LEVEL` env var takes anything `EnvFilter` understands, from a bare
//! level (`info`) to per-target directives (`reach=debug,reach_queue=trace`).

use chrono::Utc;
use tracing_subscriber::{EnvFilter, fmt::time::FormatTime};

/// Millisecond-precision UTC timestamps; hour buckets are UTC, so logs
/// should read in the same clock the limiter counts in.
struct UtcTime;

impl FormatTime for UtcTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
}

#[macro_export]
macro_rules! log {
    ($level:expr, $component:expr, $($msg:tt)+) => {
        $crate::tracing::event!(target: "reach", $level, component = $component, $($msg)+)
    };
}

#[macro_export]
macro_rules! ingress {
    (level = $level:ident, $($msg:tt)+) => {
        $crate::log!($crate::tracing::Level::$level, "ingress", $($msg)+)
    };

    ($($msg:tt)+) => {
        $crate::ingress!(level = TRACE, $($msg)+)
    };
}

#[macro_export]
macro_rules! delivery {
    (level = $level:ident, $($msg:tt)+) => {
        $crate::log!($crate::tracing::Level::$level, "delivery", $($msg)+)
    };

    ($($msg:tt)+) => {
        $crate::delivery!(level = TRACE, $($msg)+)
    };
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:tt)+) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg)+)
    };

    ($($msg:tt)+) => {
        $crate::internal!(level = TRACE, $($msg)+)
    };
}

/// Install the process-wide subscriber.
///
/// `LOG_LEVEL` wins when set and parseable; otherwise debug builds trace the
/// reach crates and release builds log them at info, with everything else
/// silent.
pub fn init() {
    let filter = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| {
            EnvFilter::new(if cfg!(debug_assertions) {
                "reach=trace,reach_api=trace,reach_delivery=trace,reach_queue=trace,reach_store=trace"
            } else {
                "reach=info,reach_api=info,reach_delivery=info,reach_queue=info,reach_store=info"
            })
        });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime)
        .init();
}
