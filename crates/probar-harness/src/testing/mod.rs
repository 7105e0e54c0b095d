//! In-memory reference environment.
//!
//! Everything needed to run harnesses without a browser: a [`MockDocument`]
//! tree, a CSS matcher, [`MockElement`] test elements, and [`MockBackend`],
//! an [`EnvironmentBackend`](crate::EnvironmentBackend) that also drives a
//! [`MockChangeDetector`] from the change-detection batcher.
//!
//! ```ignore
//! let document = MockDocument::new();
//! let form = document.append(document.root(), "form").build();
//! document.append(form, "button").class("submit").text("Save").build();
//!
//! let backend = MockBackend::new(document);
//! let button = backend.loader().get_harness(ButtonHarness::query()).await?;
//! ```

mod backend;
mod css;
mod document;
mod element;
#[cfg(test)]
pub(crate) mod fixtures;

pub use backend::{MockBackend, MockChangeDetector, MockEnvironmentOptions, QueryFn};
pub use document::{ElementBuilder, MockDocument, NodeId};
pub use element::MockElement;

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter for [`init_tracing`]
pub const LOG_ENV: &str = "PROBAR_HARNESS_LOG";

/// Environment variable selecting `json` output for [`init_tracing`]
pub const LOG_FORMAT_ENV: &str = "PROBAR_HARNESS_LOG_FORMAT";

/// Install a test-writer tracing subscriber.
///
/// The filter comes from `PROBAR_HARNESS_LOG` (default `warn`). Calling this
/// more than once, or after another subscriber was installed, is a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .with_target(true);
    let installed = match std::env::var(LOG_FORMAT_ENV).as_deref() {
        Ok("json") => builder.json().try_init(),
        _ => builder.compact().try_init(),
    };
    if installed.is_ok() {
        tracing::debug!("tracing initialised");
    }
}
