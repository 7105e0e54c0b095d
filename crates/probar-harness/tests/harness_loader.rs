//! Loader and predicate behaviour through the public API.

#![allow(clippy::unwrap_used)]

use std::cell::RefCell;

use probar_harness::prelude::*;
use probar_harness::{stop_handling_status_change, string_matches_async, AsyncFactory};
use regex::Regex;

#[derive(Debug, ComponentHarness)]
#[harness(host = "app-button")]
struct AppButton {
    locator_factory: Rc<dyn LocatorFactory>,
}

#[derive(Debug, Default)]
struct ButtonFilters {
    base: BaseHarnessFilters,
    text: Option<TextPattern>,
    disabled: Option<bool>,
}

impl AppButton {
    fn with_filters(filters: ButtonFilters) -> HarnessPredicate<Self> {
        Self::with(filters.base)
            .add_option("text", filters.text, |button: Rc<Self>, text| async move {
                string_matches_async(button.label(), Some(&text)).await
            })
            .add_option("disabled", filters.disabled, |button: Rc<Self>, disabled| async move {
                Ok(button.is_disabled().await? == disabled)
            })
    }

    fn label_element(&self) -> AsyncFactory<Rc<dyn TestElement>> {
        self.locator_for([".label"])
    }

    async fn label(&self) -> HarnessResult<String> {
        (self.label_element())().await?.text().await
    }

    async fn is_disabled(&self) -> HarnessResult<bool> {
        Ok(self.host().await.get_attribute("disabled").await?.is_some())
    }

    /// Predicate over the host id, for driving completion order in tests
    fn with_id_check<F, Fut>(check: F) -> HarnessPredicate<Self>
    where
        F: Fn(String) -> Fut + 'static,
        Fut: std::future::Future<Output = HarnessResult<bool>> + 'static,
    {
        let check = Rc::new(check);
        Self::with(BaseHarnessFilters::new()).add("custom", move |button: Rc<Self>| {
            let check = Rc::clone(&check);
            async move { check(button.id().await).await }
        })
    }

    async fn id(&self) -> String {
        self.host()
            .await
            .get_attribute("id")
            .await
            .unwrap()
            .unwrap_or_default()
    }
}

#[derive(Debug, ComponentHarness)]
#[harness(host = "app-toolbar, app-menu", name = "Toolbar")]
struct ToolbarHarness {
    locator_factory: Rc<dyn LocatorFactory>,
}

/// body
/// ├── app-toolbar#main.primary
/// │   ├── app-button#save  (Save)
/// │   └── app-button#load  (Load, disabled)
/// ├── app-menu#menu
/// │   └── app-button#quit  (Quit)
/// └── app-button#help  (Help)
fn toolbar_document() -> MockDocument {
    let document = MockDocument::new();
    let body = document.root();
    let main = document
        .append(body, "app-toolbar")
        .id("main")
        .class("primary")
        .build();
    add_button(&document, main, "save", "Save", false);
    add_button(&document, main, "load", "Load", true);
    let menu = document.append(body, "app-menu").id("menu").build();
    add_button(&document, menu, "quit", "Quit", false);
    add_button(&document, body, "help", "Help", false);
    document
}

fn add_button(document: &MockDocument, parent: NodeId, id: &str, label: &str, disabled: bool) {
    let mut button = document.append(parent, "app-button").id(id);
    if disabled {
        button = button.attr("disabled", "");
    }
    let button = button.build();
    document.append(button, "span").class("label").text(label).build();
}

async fn button_ids(buttons: &[Rc<AppButton>]) -> Vec<String> {
    let mut ids = Vec::new();
    for button in buttons {
        ids.push(button.id().await);
    }
    ids
}

mod loader_tests {
    use super::*;

    #[tokio::test]
    async fn test_get_all_harnesses_in_document_order() {
        let backend = MockBackend::new(toolbar_document());
        let buttons = backend
            .loader()
            .get_all_harnesses(AppButton::query())
            .await
            .unwrap();
        assert_eq!(button_ids(&buttons).await, vec!["save", "load", "quit", "help"]);
        stop_handling_status_change();
    }

    #[tokio::test]
    async fn test_get_harness_returns_first_match() {
        let backend = MockBackend::new(toolbar_document());
        let button = backend.loader().get_harness(AppButton::query()).await.unwrap();
        assert_eq!(button.id().await, "save");
        stop_handling_status_change();
    }

    #[tokio::test]
    async fn test_get_harness_or_null_and_has_harness() {
        let backend = MockBackend::new(toolbar_document());
        let loader = backend.loader();
        let missing = AppButton::with_filters(ButtonFilters {
            text: Some("Print".into()),
            ..ButtonFilters::default()
        });
        assert!(loader.get_harness_or_null(missing.clone()).await.unwrap().is_none());
        assert!(!loader.has_harness(missing).await.unwrap());
        assert!(loader.has_harness(AppButton::query()).await.unwrap());
        stop_handling_status_change();
    }

    #[tokio::test]
    async fn test_get_harness_at_index_and_count() {
        let backend = MockBackend::new(toolbar_document());
        let loader = backend.loader();
        assert_eq!(loader.count_harnesses(AppButton::query()).await.unwrap(), 4);

        let third = loader
            .get_harness_at_index(AppButton::query(), 2)
            .await
            .unwrap();
        assert_eq!(third.id().await, "quit");

        let err = loader
            .get_harness_at_index(AppButton::query(), 9)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::IndexOutOfRange { index: 9, count: 4, .. }
        ));
        stop_handling_status_change();
    }

    #[tokio::test]
    async fn test_child_loaders_scope_queries() {
        let backend = MockBackend::new(toolbar_document());
        let loader = backend.loader();
        let main = loader.get_child_loader("#main").await.unwrap();
        let buttons = main.get_all_harnesses(AppButton::query()).await.unwrap();
        assert_eq!(button_ids(&buttons).await, vec!["save", "load"]);

        let sections = loader
            .get_all_child_loaders("app-toolbar, app-menu")
            .await
            .unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(
            sections[1].count_harnesses(AppButton::query()).await.unwrap(),
            1
        );
        stop_handling_status_change();
    }

    #[tokio::test]
    async fn test_missing_child_loader_error_message() {
        let backend = MockBackend::new(toolbar_document());
        let err = backend.loader().get_child_loader(".nope").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Expected to find element matching selector: \".nope\", but none was found"
        );
        stop_handling_status_change();
    }

    #[tokio::test]
    async fn test_multi_host_selector_harness() {
        let backend = MockBackend::new(toolbar_document());
        let loader = backend.loader();
        assert_eq!(loader.count_harnesses(ToolbarHarness::query()).await.unwrap(), 2);
        assert_eq!(ToolbarHarness::harness_name(), "Toolbar");
        stop_handling_status_change();
    }

    #[tokio::test]
    async fn test_requery_after_mutation() {
        let document = toolbar_document();
        let backend = MockBackend::new(document.clone());
        let loader = backend.loader();
        assert_eq!(loader.count_harnesses(AppButton::query()).await.unwrap(), 4);

        let help = document
            .query_selector_all(document.root(), "#help")
            .unwrap()[0];
        document.remove(help);
        add_button(&document, document.root(), "extra", "Extra", false);

        let buttons = loader.get_all_harnesses(AppButton::query()).await.unwrap();
        assert_eq!(button_ids(&buttons).await, vec!["save", "load", "quit", "extra"]);
        stop_handling_status_change();
    }
}

mod predicate_tests {
    use super::*;

    #[tokio::test]
    async fn test_text_and_disabled_options() {
        let backend = MockBackend::new(toolbar_document());
        let loader = backend.loader();

        let save = loader
            .get_harness(AppButton::with_filters(ButtonFilters {
                text: Some("Save".into()),
                ..ButtonFilters::default()
            }))
            .await
            .unwrap();
        assert_eq!(save.id().await, "save");

        let disabled = loader
            .get_all_harnesses(AppButton::with_filters(ButtonFilters {
                disabled: Some(true),
                ..ButtonFilters::default()
            }))
            .await
            .unwrap();
        assert_eq!(button_ids(&disabled).await, vec!["load"]);

        let by_regex = loader
            .get_all_harnesses(AppButton::with_filters(ButtonFilters {
                text: Some(Regex::new("^(Save|Quit)$").unwrap().into()),
                ..ButtonFilters::default()
            }))
            .await
            .unwrap();
        assert_eq!(button_ids(&by_regex).await, vec!["save", "quit"]);
        stop_handling_status_change();
    }

    #[tokio::test]
    async fn test_selector_and_ancestor_filters() {
        let backend = MockBackend::new(toolbar_document());
        let loader = backend.loader();

        let in_primary = loader
            .get_all_harnesses(AppButton::with(
                BaseHarnessFilters::new().with_ancestor(".primary"),
            ))
            .await
            .unwrap();
        assert_eq!(button_ids(&in_primary).await, vec!["save", "load"]);

        let in_either = loader
            .get_all_harnesses(AppButton::with(
                BaseHarnessFilters::new().with_ancestor("#main, #menu"),
            ))
            .await
            .unwrap();
        assert_eq!(button_ids(&in_either).await, vec!["save", "load", "quit"]);

        let by_selector = loader
            .get_all_harnesses(AppButton::with(
                BaseHarnessFilters::new().with_selector("#help, #quit"),
            ))
            .await
            .unwrap();
        assert_eq!(button_ids(&by_selector).await, vec!["quit", "help"]);
        stop_handling_status_change();
    }

    #[tokio::test]
    async fn test_not_found_message_lists_constraints() {
        let backend = MockBackend::new(toolbar_document());
        let err = backend
            .loader()
            .get_harness(AppButton::with_filters(ButtonFilters {
                base: BaseHarnessFilters::new().with_ancestor("app-menu"),
                text: Some("Save".into()),
                disabled: None,
            }))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to find element matching one of the following queries:\n\
             (AppButton with host element matching selector: \"app-button\" satisfying the \
             constraints: has ancestor matching selector \"app-menu\", text = \"Save\")"
        );
        stop_handling_status_change();
    }

    #[test]
    fn test_regex_option_description() {
        let predicate = AppButton::with_filters(ButtonFilters {
            text: Some(Regex::new("Sa\"ve").unwrap().into()),
            disabled: Some(false),
            ..ButtonFilters::default()
        });
        assert_eq!(
            predicate.get_description(),
            "text = /Sa\"ve/, disabled = false"
        );
    }

    #[tokio::test]
    async fn test_results_independent_of_completion_order() {
        let backend = MockBackend::new(toolbar_document());
        let completed = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&completed);
        // Earlier buttons take longer to answer.
        let predicate = AppButton::with_id_check(move |id| {
            let log = Rc::clone(&log);
            async move {
                let delay = match id.as_str() {
                    "save" => 4,
                    "load" => 3,
                    "quit" => 2,
                    _ => 1,
                };
                for _ in 0..delay {
                    tokio::task::yield_now().await;
                }
                log.borrow_mut().push(id.clone());
                Ok(id != "load")
            }
        });
        let buttons = backend.loader().get_all_harnesses(predicate).await.unwrap();
        assert_eq!(button_ids(&buttons).await, vec!["save", "quit", "help"]);
        assert_eq!(*completed.borrow(), vec!["help", "quit", "load", "save"]);
        stop_handling_status_change();
    }

    #[tokio::test]
    async fn test_predicate_error_fails_the_query() {
        let backend = MockBackend::new(toolbar_document());
        let predicate = AppButton::with(BaseHarnessFilters::new())
            .add("explodes", |_button| async { Err(HarnessError::predicate("boom")) });
        let err = backend
            .loader()
            .get_all_harnesses(predicate)
            .await
            .unwrap_err();
        assert_eq!(err, HarnessError::predicate("boom"));
        stop_handling_status_change();
    }
}
