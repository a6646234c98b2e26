//! Consumer side of the inbound queue.
//!
//! Messages are taken one at a time and handed to every registered observer
//! in registration order. A failing or panicking observer is logged and the
//! rest still run.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use rover_core::{ObserverError, Telemetry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::queue::InboundReceiver;

/// Handler for inbound telemetry.
#[async_trait]
pub trait MessageObserver: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Handle one message.
    async fn on_message(&self, message: &Telemetry) -> Result<(), ObserverError>;
}

/// Adapter for synchronous closures.
struct FnObserver<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F> MessageObserver for FnObserver<F>
where
    F: Fn(&Telemetry) -> Result<(), ObserverError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_message(&self, message: &Telemetry) -> Result<(), ObserverError> {
        (self.f)(message)
    }
}

/// Processor options.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessorConfig {
    /// Return from `run` when the queue reports end-of-stream instead of
    /// waiting for cancellation.
    pub exit_on_close: bool,
}

/// Why `run` returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessorExit {
    /// The cancellation token fired.
    Cancelled,
    /// The queue closed and `exit_on_close` was set.
    QueueClosed,
}

/// Outcome of one `run`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessorReport {
    /// Why the loop ended.
    pub exit: ProcessorExit,
    /// Messages fully dispatched.
    pub messages: u64,
    /// Observer calls that returned an error or panicked.
    pub failures: u64,
}

/// Dispatches inbound messages to observers.
pub struct Processor {
    config: ProcessorConfig,
    observers: RwLock<Vec<Arc<dyn MessageObserver>>>,
    messages: AtomicU64,
    failures: AtomicU64,
}

impl Processor {
    /// Create a processor with no observers.
    pub fn new(config: ProcessorConfig) -> Self {
        Self {
            config,
            observers: RwLock::new(Vec::new()),
            messages: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Register an observer. Takes effect from the next message.
    pub fn on_message(&self, observer: Arc<dyn MessageObserver>) {
        debug!(observer = observer.name(), "observer registered");
        self.observers.write().push(observer);
    }

    /// Register a synchronous closure as an observer.
    pub fn on_message_fn<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&Telemetry) -> Result<(), ObserverError> + Send + Sync + 'static,
    {
        self.on_message(Arc::new(FnObserver {
            name: name.into(),
            f,
        }));
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Deliver one message to every observer, in order.
    pub async fn dispatch(&self, message: &Telemetry) {
        let observers: Vec<_> = self.observers.read().clone();
        for observer in observers {
            let outcome = AssertUnwindSafe(observer.on_message(message))
                .catch_unwind()
                .await;
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(error)) => error.message,
                Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
            };
            let _ = self.failures.fetch_add(1, Ordering::Relaxed);
            warn!(observer = observer.name(), error = %failure, "observer failed");
        }
        let _ = self.messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Consume `inbound` until cancelled.
    ///
    /// When the queue closes the loop exits only if
    /// [`ProcessorConfig::exit_on_close`] is set; otherwise it parks until
    /// `cancel` fires.
    pub async fn run(
        &self,
        mut inbound: InboundReceiver,
        cancel: CancellationToken,
    ) -> ProcessorReport {
        let exit = loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => break ProcessorExit::Cancelled,
                next = inbound.recv() => next,
            };
            let Some(message) = next else {
                info!("inbound queue closed");
                if self.config.exit_on_close {
                    break ProcessorExit::QueueClosed;
                }
                cancel.cancelled().await;
                break ProcessorExit::Cancelled;
            };
            tokio::select! {
                biased;
                () = cancel.cancelled() => break ProcessorExit::Cancelled,
                () = self.dispatch(&message) => {}
            }
        };
        let report = self.report(exit);
        debug!(?report, "processor stopped");
        report
    }

    fn report(&self, exit: ProcessorExit) -> ProcessorReport {
        ProcessorReport {
            exit,
            messages: self.messages.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;
    use rover_core::logging::capture_logs;

    use super::*;
    use crate::queue::InboundQueue;

    fn t(distance: f64) -> Telemetry {
        Telemetry::with_distance(distance)
    }

    fn recorder(processor: &Processor, name: &'static str, log: &Arc<Mutex<Vec<String>>>) {
        let log = Arc::clone(log);
        processor.on_message_fn(name, move |m| {
            log.lock().push(format!("{name}:{}", m.distance.unwrap_or_default()));
            Ok(())
        });
    }

    struct Panicky;

    #[async_trait]
    impl MessageObserver for Panicky {
        fn name(&self) -> &str {
            "panicky"
        }

        async fn on_message(&self, _message: &Telemetry) -> Result<(), ObserverError> {
            panic!("sensor exploded");
        }
    }

    struct Stalls;

    #[async_trait]
    impl MessageObserver for Stalls {
        fn name(&self) -> &str {
            "stalls"
        }

        async fn on_message(&self, _message: &Telemetry) -> Result<(), ObserverError> {
            futures::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn observers_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let processor = Processor::new(ProcessorConfig::default());
        recorder(&processor, "a", &log);
        recorder(&processor, "b", &log);

        processor.dispatch(&t(1.0)).await;
        processor.dispatch(&t(2.0)).await;

        assert_eq!(*log.lock(), ["a:1", "b:1", "a:2", "b:2"]);
    }

    #[tokio::test]
    async fn failing_observer_does_not_block_others() {
        let (logs, _guard) = capture_logs();
        let log = Arc::new(Mutex::new(Vec::new()));
        let processor = Processor::new(ProcessorConfig::default());
        processor.on_message_fn("broken", |_| Err(ObserverError::new("no map yet")));
        recorder(&processor, "ok", &log);

        processor.dispatch(&t(7.0)).await;

        assert_eq!(*log.lock(), ["ok:7"]);
        assert!(logs.has_event(tracing::Level::WARN, "observer failed"));
        assert_eq!(processor.report(ProcessorExit::Cancelled).failures, 1);
    }

    #[tokio::test]
    async fn panicking_observer_is_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let processor = Processor::new(ProcessorConfig::default());
        processor.on_message(Arc::new(Panicky));
        recorder(&processor, "after", &log);

        processor.dispatch(&t(3.0)).await;
        processor.dispatch(&t(4.0)).await;

        assert_eq!(*log.lock(), ["after:3", "after:4"]);
        let report = processor.report(ProcessorExit::Cancelled);
        assert_eq!(report.failures, 2);
        assert_eq!(report.messages, 2);
    }

    #[tokio::test]
    async fn run_exits_on_close_when_configured() {
        let (tx, rx) = InboundQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let processor = Processor::new(ProcessorConfig {
            exit_on_close: true,
        });
        recorder(&processor, "r", &log);

        for d in [1.0, 2.0, 3.0] {
            tx.push(t(d)).unwrap();
        }
        drop(tx);

        let report = processor.run(rx, CancellationToken::new()).await;
        assert_eq!(report.exit, ProcessorExit::QueueClosed);
        assert_eq!(report.messages, 3);
        assert_eq!(*log.lock(), ["r:1", "r:2", "r:3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_parks_after_close_by_default() {
        let (tx, rx) = InboundQueue::new();
        drop(tx);
        let processor = Arc::new(Processor::new(ProcessorConfig::default()));
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let processor = Arc::clone(&processor);
            let cancel = cancel.clone();
            async move { processor.run(rx, cancel).await }
        });

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!task.is_finished());

        cancel.cancel();
        let report = task.await.unwrap();
        assert_eq!(report.exit, ProcessorExit::Cancelled);
    }

    #[tokio::test]
    async fn cancel_interrupts_in_flight_dispatch() {
        let (tx, rx) = InboundQueue::new();
        let processor = Arc::new(Processor::new(ProcessorConfig::default()));
        processor.on_message(Arc::new(Stalls));
        tx.push(t(1.0)).unwrap();
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let processor = Arc::clone(&processor);
            let cancel = cancel.clone();
            async move { processor.run(rx, cancel).await }
        });
        tokio::task::yield_now().await;
        cancel.cancel();

        let report = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.exit, ProcessorExit::Cancelled);
        assert_eq!(report.messages, 0);
    }

    #[tokio::test]
    async fn observer_registered_mid_run_sees_later_messages() {
        let (tx, rx) = InboundQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let processor = Arc::new(Processor::new(ProcessorConfig {
            exit_on_close: true,
        }));
        recorder(&processor, "first", &log);

        let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
        processor.on_message_fn("signal", move |m| {
            let _ = seen_tx.send(m.distance);
            Ok(())
        });

        let task = tokio::spawn({
            let processor = Arc::clone(&processor);
            async move { processor.run(rx, CancellationToken::new()).await }
        });

        tx.push(t(1.0)).unwrap();
        assert_eq!(seen_rx.recv().await, Some(Some(1.0)));

        recorder(&processor, "late", &log);
        tx.push(t(2.0)).unwrap();
        drop(tx);

        let report = task.await.unwrap();
        assert_eq!(report.exit, ProcessorExit::QueueClosed);
        assert_eq!(*log.lock(), ["first:1", "first:2", "late:2"]);
        assert_eq!(processor.observer_count(), 3);
    }
}
