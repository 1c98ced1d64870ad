//! Diagnostic tracing for the CLI.
//!
//! Reads `RUST_LOG`, defaulting to `warn`. Output goes to stderr in compact
//! format so stdout stays reserved for run output.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "warn";

/// Initialize the tracing subscriber.
///
/// `verbose` raises the crate's own targets to `debug` on top of the
/// `RUST_LOG` filter.
///
/// # Example
/// ```bash
/// RUST_LOG=plan_pipeline=debug plan-pipeline run --prompt "Fractions" --grade 4 --subject math
/// ```
pub fn init(verbose: bool) {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    if verbose {
        for directive in ["plan_pipeline=debug", "plan_pipeline_transport=debug"] {
            if let Ok(directive) = directive.parse() {
                filter = filter.add_directive(directive);
            }
        }
    }

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
