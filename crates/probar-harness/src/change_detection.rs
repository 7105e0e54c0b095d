//! Change-detection batching.
//!
//! Harness operations frequently fan out into many small async interactions
//! (matching selectors, reading text, evaluating predicates). Each of those
//! would normally cause the host framework to run change detection. This
//! module lets callers switch automatic change detection off for the duration
//! of a batch, and bracket the batch with exactly one detection pass before and
//! one after.
//!
//! # Scheduling model
//!
//! Everything here assumes cooperative, single-threaded scheduling: futures are
//! polled on one thread and only interleave at `.await` points. The shared
//! status and the single handler slot are therefore thread-local, and no lock
//! is needed between publishing a status and delivering it.
//!
//! ```text
//! run_parallel(|| [a, b, c])
//!   ├─ publish {disabled, on_detect_changes_now} ── handler detects, calls back
//!   ├─ poll a, b, c concurrently
//!   └─ publish {enabled,  on_detect_changes_now} ── handler detects, calls back
//! ```

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::{join_all, try_join_all};

/// Callback handed to the handler when a detection pass must complete before
/// the batch may proceed.
pub struct DetectChangesNow {
    sender: oneshot::Sender<()>,
}

impl DetectChangesNow {
    /// Signal that change detection has run.
    pub fn notify(self) {
        // The receiver is gone only when the batch future was dropped.
        let _ = self.sender.send(());
    }
}

impl fmt::Debug for DetectChangesNow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectChangesNow").finish_non_exhaustive()
    }
}

/// A change-detection status transition.
#[derive(Debug)]
pub struct ChangeDetectionStatus {
    /// Whether automatic change detection is disabled
    pub is_disabled: bool,
    /// Present when the publisher waits for a detection pass
    pub on_detect_changes_now: Option<DetectChangesNow>,
}

impl ChangeDetectionStatus {
    const fn without_callback(is_disabled: bool) -> Self {
        Self {
            is_disabled,
            on_detect_changes_now: None,
        }
    }
}

/// Handler receiving every published status.
pub type ChangeDetectionHandler = Rc<dyn Fn(ChangeDetectionStatus)>;

#[derive(Default)]
struct BatchState {
    is_disabled: bool,
    handler: Option<ChangeDetectionHandler>,
}

thread_local! {
    static STATE: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// Install the handler that receives change-detection status transitions.
///
/// Any previously installed handler is removed first, so at most one handler
/// is ever subscribed.
pub fn handle_status_change(handler: impl Fn(ChangeDetectionStatus) + 'static) {
    let previous = STATE.with(|state| {
        let mut state = state.borrow_mut();
        let previous = state.handler.take();
        state.handler = Some(Rc::new(handler));
        previous
    });
    tracing::trace!(
        replaced = previous.is_some(),
        "installed change detection handler"
    );
    drop(previous);
}

/// Remove the installed handler, if any.
pub fn stop_handling_status_change() {
    let previous = STATE.with(|state| state.borrow_mut().handler.take());
    if previous.is_some() {
        tracing::trace!("removed change detection handler");
    }
}

/// Whether a batch is currently holding automatic change detection off.
#[must_use]
pub fn is_change_detection_disabled() -> bool {
    STATE
        .try_with(|state| state.borrow().is_disabled)
        .unwrap_or(false)
}

fn has_handler() -> bool {
    STATE.with(|state| state.borrow().handler.is_some())
}

fn publish(status: ChangeDetectionStatus) {
    let handler = STATE
        .try_with(|state| {
            let mut state = state.borrow_mut();
            state.is_disabled = status.is_disabled;
            state.handler.clone()
        })
        .ok()
        .flatten();
    tracing::trace!(
        is_disabled = status.is_disabled,
        awaits_detection = status.on_detect_changes_now.is_some(),
        "publishing change detection status"
    );
    if let Some(handler) = handler {
        handler(status);
    }
}

/// Publish a status; when `wait` is set, return the receiver that resolves once
/// the handler reports a completed detection pass.
fn publish_transition(is_disabled: bool, wait: bool) -> Option<oneshot::Receiver<()>> {
    if !wait {
        publish(ChangeDetectionStatus::without_callback(is_disabled));
        return None;
    }
    let (sender, receiver) = oneshot::channel();
    publish(ChangeDetectionStatus {
        is_disabled,
        on_detect_changes_now: Some(DetectChangesNow { sender }),
    });
    Some(receiver)
}

async fn detection_pass(receiver: Option<oneshot::Receiver<()>>, is_disabled: bool) {
    if let Some(receiver) = receiver {
        if receiver.await.is_err() {
            tracing::warn!(
                is_disabled,
                "change detection callback dropped without being invoked"
            );
        }
    }
}

fn install_default_handler() {
    handle_status_change(|status| {
        if let Some(detect) = status.on_detect_changes_now {
            detect.notify();
        }
    });
}

/// Re-enables change detection if a batch is abandoned before it finishes,
/// either by a panic inside the batched work or by dropping the batch future.
struct ReenableOnDrop {
    armed: bool,
}

impl ReenableOnDrop {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ReenableOnDrop {
    fn drop(&mut self) {
        if self.armed {
            publish(ChangeDetectionStatus::without_callback(false));
        }
    }
}

/// Run `f` with automatic change detection disabled.
///
/// A call made while another batch is active runs `f` directly; nested batches
/// collapse into the outermost one. When `trigger_before_and_after` is set, a
/// detection pass must complete before `f` starts and another after it
/// finishes, including when `f` resolves to an error.
///
/// The handler must call [`DetectChangesNow::notify`] on every callback it
/// receives. A callback dropped without being notified skips that detection
/// pass: a warning is logged and the batch carries on.
pub async fn run_batched<F, Fut, T>(f: F, trigger_before_and_after: bool) -> T
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    if is_change_detection_disabled() {
        return f().await;
    }
    if !has_handler() {
        install_default_handler();
    }

    let before = publish_transition(true, trigger_before_and_after);
    let guard = ReenableOnDrop { armed: true };
    detection_pass(before, true).await;

    let output = f().await;

    guard.disarm();
    let after = publish_transition(false, trigger_before_and_after);
    detection_pass(after, false).await;
    output
}

/// Run `f` with automatic change detection disabled and no detection passes
/// around it.
pub async fn run_manual<F, Fut, T>(f: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    run_batched(f, false).await
}

/// Resolve the futures produced by `values` concurrently, with one detection
/// pass before and one after the whole group.
///
/// Outputs keep the positional order of the input futures regardless of the
/// order in which they complete.
pub async fn run_parallel<F, I>(values: F) -> Vec<<I::Item as Future>::Output>
where
    F: FnOnce() -> I,
    I: IntoIterator,
    I::Item: Future,
{
    run_batched(|| join_all(values()), true).await
}

/// Fallible variant of [`run_parallel`]: resolves to the first error, if any.
pub async fn try_run_parallel<F, I, T, E>(values: F) -> Result<Vec<T>, E>
where
    F: FnOnce() -> I,
    I: IntoIterator,
    I::Item: Future<Output = Result<T, E>>,
{
    run_batched(|| try_join_all(values()), true).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Records every status as "disable"/"enable" and answers callbacks.
    fn install_spy() -> Rc<RefCell<Vec<String>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        handle_status_change(move |status| {
            let label = if status.is_disabled {
                "disable"
            } else {
                "enable"
            };
            sink.borrow_mut().push(label.to_string());
            if let Some(detect) = status.on_detect_changes_now {
                sink.borrow_mut().push(format!("{label}:detected"));
                detect.notify();
            }
        });
        log
    }

    mod handler_tests {
        use super::*;

        #[test]
        fn test_install_replaces_previous_handler() {
            let first = Rc::new(Cell::new(0));
            let second = Rc::new(Cell::new(0));
            let first_sink = Rc::clone(&first);
            let second_sink = Rc::clone(&second);

            handle_status_change(move |_| first_sink.set(first_sink.get() + 1));
            handle_status_change(move |_| second_sink.set(second_sink.get() + 1));
            publish(ChangeDetectionStatus::without_callback(false));

            assert_eq!(first.get(), 0);
            assert_eq!(second.get(), 1);
            stop_handling_status_change();
        }

        #[test]
        fn test_stop_handling_removes_handler() {
            let calls = Rc::new(Cell::new(0));
            let sink = Rc::clone(&calls);
            handle_status_change(move |_| sink.set(sink.get() + 1));
            stop_handling_status_change();

            publish(ChangeDetectionStatus::without_callback(false));
            assert_eq!(calls.get(), 0);
            assert!(!has_handler());
        }
    }

    mod batching_tests {
        use super::*;

        #[tokio::test]
        async fn test_parallel_triggers_detection_once_around_group() {
            let log = install_spy();
            let values = run_parallel(|| {
                (1..=3).map(|n| {
                    let log = Rc::clone(&log);
                    async move {
                        log.borrow_mut().push(format!("value {n}"));
                        n * 10
                    }
                })
            })
            .await;

            assert_eq!(values, vec![10, 20, 30]);
            assert_eq!(
                *log.borrow(),
                vec![
                    "disable",
                    "disable:detected",
                    "value 1",
                    "value 2",
                    "value 3",
                    "enable",
                    "enable:detected",
                ]
            );
            stop_handling_status_change();
        }

        #[tokio::test]
        async fn test_nested_manual_batches_collapse() {
            let log = install_spy();
            let value = run_manual(|| async {
                assert!(is_change_detection_disabled());
                run_manual(|| async { 7 }).await
            })
            .await;

            assert_eq!(value, 7);
            assert_eq!(*log.borrow(), vec!["disable", "enable"]);
            assert!(!is_change_detection_disabled());
            stop_handling_status_change();
        }

        #[tokio::test]
        async fn test_error_still_reenables() {
            let log = install_spy();
            let result: Result<(), String> =
                run_batched(|| async { Err("boom".to_string()) }, true).await;

            assert_eq!(result, Err("boom".to_string()));
            assert_eq!(log.borrow().last().map(String::as_str), Some("enable:detected"));
            assert!(!is_change_detection_disabled());
            stop_handling_status_change();
        }

        #[tokio::test]
        async fn test_default_handler_installed_lazily() {
            stop_handling_status_change();
            let value =
                run_parallel(|| vec![futures::future::ready(1), futures::future::ready(2)]).await;
            assert_eq!(value, vec![1, 2]);
            assert!(has_handler());
            stop_handling_status_change();
        }

        #[tokio::test]
        async fn test_try_parallel_propagates_error() {
            let log = install_spy();
            let result: Result<Vec<u8>, &str> = try_run_parallel(|| {
                vec![
                    futures::future::ready(Ok(1)),
                    futures::future::ready(Err("nope")),
                ]
            })
            .await;

            assert_eq!(result, Err("nope"));
            assert_eq!(log.borrow().first().map(String::as_str), Some("disable"));
            assert_eq!(log.borrow().last().map(String::as_str), Some("enable:detected"));
            stop_handling_status_change();
        }

        #[tokio::test]
        async fn test_dropped_callback_does_not_stall_batch() {
            handle_status_change(|status| drop(status.on_detect_changes_now));
            let value = run_batched(|| async { "done" }, true).await;
            assert_eq!(value, "done");
            stop_handling_status_change();
        }

        #[test]
        fn test_abandoned_batch_reenables() {
            let log = install_spy();
            let batch = run_manual(|| futures::future::pending::<()>());
            let mut batch = Box::pin(batch);
            let waker = futures::task::noop_waker();
            let mut cx = std::task::Context::from_waker(&waker);
            assert!(batch.as_mut().poll(&mut cx).is_pending());
            assert!(is_change_detection_disabled());

            drop(batch);
            assert!(!is_change_detection_disabled());
            assert_eq!(*log.borrow(), vec!["disable", "enable"]);
            stop_handling_status_change();
        }
    }
}
