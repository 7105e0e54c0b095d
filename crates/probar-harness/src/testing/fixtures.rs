//! Harnesses shared by unit tests.

use std::rc::Rc;

use super::{MockBackend, MockDocument};
use crate::environment::HarnessEnvironment;
use crate::harness::ComponentHarness;

/// Declare a minimal harness type with the given host selector.
macro_rules! declare_harness {
    ($name:ident, $host:expr) => {
        #[derive(Debug)]
        pub(crate) struct $name {
            locator_factory: ::std::rc::Rc<dyn $crate::locator::LocatorFactory>,
        }

        impl $crate::harness::ComponentHarness for $name {
            const HOST_SELECTOR: &'static str = $host;

            fn new(locator_factory: ::std::rc::Rc<dyn $crate::locator::LocatorFactory>) -> Self {
                Self { locator_factory }
            }

            fn locator_factory(&self) -> &::std::rc::Rc<dyn $crate::locator::LocatorFactory> {
                &self.locator_factory
            }
        }
    };
}
pub(crate) use declare_harness;

declare_harness!(DivHarness, "div");
declare_harness!(ButtonHarness, "button");

/// A harness of type `H` rooted at the `<body>` of an empty document.
pub(crate) fn harness_at<H: ComponentHarness>() -> Rc<H> {
    let backend = MockBackend::new(MockDocument::new());
    let root = backend.document().root();
    Rc::new(H::new(Rc::new(HarnessEnvironment::new(backend, root))))
}
