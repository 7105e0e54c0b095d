//! Probar Harness: component harnesses and test locators
//!
//! Test code rarely wants to know how a component is put together. A
//! *harness* wraps one component instance behind a test-facing API, and the
//! query engine finds harnesses and plain elements anywhere beneath a root:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  test                                                            │
//! │    loader.get_harness(ButtonHarness::with(filters))              │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  HarnessLoader / LocatorFactory        (query API)               │
//! │    HarnessPredicate ── TestElement ── ComponentHarness           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  HarnessEnvironment<B>                 (query engine)            │
//! │    parse ─► candidates ─► match per element ─► dedup ─► order    │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  EnvironmentBackend                    (DOM, framework hooks)    │
//! │    MockBackend for in-memory documents                           │
//! └──────────────────────────────────────────────────────────────────┘
//!            ▲
//!            └── change_detection: one detection pass before and after
//!                every batch of concurrent harness operations
//! ```
//!
//! # Example
//!
//! ```ignore
//! use probar_harness::prelude::*;
//!
//! #[derive(Debug, ComponentHarness)]
//! #[harness(host = "button")]
//! struct ButtonHarness {
//!     locator_factory: Rc<dyn LocatorFactory>,
//! }
//!
//! let backend = MockBackend::new(document);
//! let save = backend
//!     .loader()
//!     .get_harness(ButtonHarness::with(BaseHarnessFilters::new().with_selector(".save")))
//!     .await?;
//! save.host().await.click().await?;
//! ```

#![warn(missing_docs)]

extern crate self as probar_harness;

pub mod change_detection;
mod element;
mod environment;
mod harness;
mod locator;
mod predicate;
mod query;
mod result;
pub mod selector;
/// In-memory reference environment
pub mod testing;

pub use change_detection::{
    handle_status_change, is_change_detection_disabled, run_batched, run_manual, run_parallel,
    stop_handling_status_change, try_run_parallel, ChangeDetectionHandler, ChangeDetectionStatus,
    DetectChangesNow,
};
pub use element::TestElement;
pub use environment::{EnvironmentBackend, HarnessEnvironment};
pub use harness::{ComponentHarness, ContentContainerComponentHarness, HarnessLoader};
pub use locator::{
    locator_for, locator_for_all, locator_for_optional, AsyncFactory, FromLocated, HarnessMatch,
    Located, LocatorFactory,
};
pub use predicate::{
    string_matches, string_matches_async, value_as_string, BaseHarnessFilters, HarnessPredicate,
    TextPattern,
};
pub use query::{AnyHarnessPredicate, HarnessQuery, HarnessType, HarnessTypeQuery, TypedHarnessQuery};
pub use result::{HarnessError, HarnessResult};

/// Derive [`ComponentHarness`] for a struct holding a
/// `locator_factory: Rc<dyn LocatorFactory>` field.
#[cfg(feature = "derive")]
pub use jugar_probar_harness_derive::ComponentHarness;

/// Prelude for convenient imports
pub mod prelude {
    pub use super::change_detection::{run_manual, run_parallel, try_run_parallel};
    pub use super::testing::{MockBackend, MockDocument, MockEnvironmentOptions, NodeId};
    pub use super::{
        AnyHarnessPredicate, BaseHarnessFilters, ComponentHarness, ContentContainerComponentHarness,
        EnvironmentBackend, FromLocated, HarnessEnvironment, HarnessError, HarnessLoader,
        HarnessPredicate, HarnessQuery, HarnessResult, HarnessType, Located, LocatorFactory,
        TestElement, TextPattern,
    };
    pub use std::rc::Rc;
}
