use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, watch, Notify};
use tracing::{debug, info, warn};

use valet_core::types::{ClassificationResult, Priority, Utterance};

/// Whatever actually services a drained request. The gateway wires this to
/// its cache-fronted classification path.
#[async_trait]
pub trait BatchClassifier: Send + Sync {
    async fn classify_one(&self, utterance: &Utterance) -> ClassificationResult;
}

struct Queued {
    utterance: Utterance,
    priority: Priority,
    respond: oneshot::Sender<ClassificationResult>,
}

/// Priority queue absorbing bursty classification load.
///
/// The drainer processes high, then normal, then low; a partial batch is
/// processed anyway once the batch timeout elapses.
pub struct BatchQueue {
    queue: Mutex<VecDeque<Queued>>,
    notify: Notify,
    batch_size: usize,
    batch_timeout: Duration,
}

impl BatchQueue {
    pub fn new(batch_size: usize, batch_timeout: Duration) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            batch_size: batch_size.max(1),
            batch_timeout,
        }
    }

    /// Enqueue a request; the receiver resolves when the drainer has
    /// classified it. Dropping the receiver cancels delivery harmlessly.
    pub fn submit(
        &self,
        utterance: Utterance,
        priority: Priority,
    ) -> oneshot::Receiver<ClassificationResult> {
        let (tx, rx) = oneshot::channel();
        {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.push_back(Queued {
                utterance,
                priority,
                respond: tx,
            });
            // a full batch or any high-priority arrival wakes the drainer
            // immediately
            if queue.len() >= self.batch_size || priority == Priority::High {
                self.notify.notify_one();
            }
        }
        rx
    }

    pub fn len(&self) -> usize {
        self.queue
            .lock()
            .map(|q| q.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drainer loop. Runs until `shutdown` flips to true; a final drain on
    /// shutdown answers anything still queued.
    pub async fn run(
        self: Arc<Self>,
        classifier: Arc<dyn BatchClassifier>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(batch_size = self.batch_size, "batch drainer started");
        loop {
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(self.batch_timeout) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.drain(&classifier).await;
                        info!("batch drainer stopped");
                        return;
                    }
                }
            }
            self.drain(&classifier).await;
        }
    }

    async fn drain(&self, classifier: &Arc<dyn BatchClassifier>) {
        let mut pending: Vec<Queued> = {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.drain(..).collect()
        };
        if pending.is_empty() {
            return;
        }

        // stable sort: priority classes in order, arrival order within each
        pending.sort_by_key(|q| std::cmp::Reverse(q.priority));
        debug!(count = pending.len(), "draining classification batch");

        for queued in pending {
            let result = classifier.classify_one(&queued.utterance).await;
            if queued.respond.send(result).is_err() {
                warn!("batch requester went away before the result was ready");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use valet_core::types::CommandCategory;

    struct RecordingClassifier {
        order: Mutex<Vec<String>>,
        count: AtomicUsize,
    }

    #[async_trait]
    impl BatchClassifier for RecordingClassifier {
        async fn classify_one(&self, utterance: &Utterance) -> ClassificationResult {
            self.order.lock().unwrap().push(utterance.text.clone());
            self.count.fetch_add(1, Ordering::SeqCst);
            ClassificationResult {
                category: CommandCategory::GeneralConversation,
                intent: CommandCategory::GeneralConversation.intent(),
                confidence: 0.6,
                parameters: HashMap::new(),
                raw_text: utterance.text.clone(),
                normalized_text: utterance.text.to_lowercase(),
                context_used: false,
                preprocessing_ms: 0.0,
                classification_ms: 0.0,
                suggestions: Vec::new(),
            }
        }
    }

    fn utterance(text: &str) -> Utterance {
        Utterance {
            text: text.to_string(),
            user_id: "u".into(),
            session_id: "s".into(),
            use_context: false,
            parameters: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn high_priority_drains_first() {
        let queue = Arc::new(BatchQueue::new(100, Duration::from_millis(500)));
        let classifier = Arc::new(RecordingClassifier {
            order: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
        });
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let low = queue.submit(utterance("low"), Priority::Low);
        let normal = queue.submit(utterance("normal"), Priority::Normal);
        let high = queue.submit(utterance("high"), Priority::High);

        // start the drainer only after all three requests are queued so the
        // drain order is observable
        let drainer = tokio::spawn(
            queue
                .clone()
                .run(classifier.clone() as Arc<dyn BatchClassifier>, shutdown_rx),
        );

        let _ = high.await.unwrap();
        let _ = normal.await.unwrap();
        let _ = low.await.unwrap();

        let order = classifier.order.lock().unwrap().clone();
        assert_eq!(order, vec!["high", "normal", "low"]);
        drainer.abort();
    }

    #[tokio::test]
    async fn partial_batch_drains_after_timeout() {
        let queue = Arc::new(BatchQueue::new(100, Duration::from_millis(10)));
        let classifier = Arc::new(RecordingClassifier {
            order: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
        });
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let drainer = tokio::spawn(
            queue
                .clone()
                .run(classifier.clone() as Arc<dyn BatchClassifier>, shutdown_rx),
        );

        // a single normal-priority request never fills the batch
        let rx = queue.submit(utterance("lonely"), Priority::Normal);
        let result = rx.await.unwrap();
        assert_eq!(result.raw_text, "lonely");
        drainer.abort();
    }

    #[tokio::test]
    async fn shutdown_drains_remaining_requests() {
        let queue = Arc::new(BatchQueue::new(100, Duration::from_secs(3600)));
        let classifier = Arc::new(RecordingClassifier {
            order: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let drainer = tokio::spawn(
            queue
                .clone()
                .run(classifier.clone() as Arc<dyn BatchClassifier>, shutdown_rx),
        );

        let rx = queue.submit(utterance("last words"), Priority::Low);
        shutdown_tx.send(true).unwrap();
        let result = rx.await.unwrap();
        assert_eq!(result.raw_text, "last words");
        drainer.await.unwrap();
    }
}
