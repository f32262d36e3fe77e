use crate::consumer::{cancelled, Consumer, StreamOutcome};
use crate::error::LichessError;
use crate::requester::{ApiRequest, Requester};
use log::{error, info};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

struct Shared {
    cancel: watch::Sender<bool>,
    outcome: watch::Receiver<Option<StreamOutcome>>,
}

/// Handle to one running event stream.
///
/// Clones refer to the same stream. Dropping the last handle cancels it.
#[derive(Clone)]
pub struct Subscription {
    shared: Arc<Shared>,
}

impl Subscription {
    /// Opens `request` as a stream and feeds it to `consumer` on the current tokio runtime.
    pub fn spawn<R: Requester>(
        requester: Arc<R>,
        request: ApiRequest,
        consumer: Consumer,
    ) -> Result<Self, LichessError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| LichessError::NoRuntime)?;
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let (outcome_tx, outcome_rx) = watch::channel(None);

        info!("opening stream {}", request.path);
        runtime.spawn(async move {
            let connect = requester.stream(request);
            let lines = tokio::select! {
                biased;
                _ = cancelled(&mut cancel_rx) => None,
                lines = connect => Some(lines),
            };
            let Some(lines) = lines else {
                let _ = outcome_tx.send(Some(StreamOutcome::Cancelled(consumer.stats())));
                return;
            };

            let outcome = match lines {
                Ok(lines) => consumer.run(lines, cancel_rx).await,
                Err(e) => {
                    error!("could not open stream: {}", e);
                    consumer.fail(e.into())
                }
            };
            let _ = outcome_tx.send(Some(outcome));
        });

        Ok(Self {
            shared: Arc::new(Shared {
                cancel: cancel_tx,
                outcome: outcome_rx,
            }),
        })
    }

    /// Stops the stream. No handler is invoked after this returns,
    /// except one that was already running.
    pub fn cancel(&self) {
        self.shared.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shared.cancel.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.outcome.borrow().is_some()
    }

    pub fn outcome(&self) -> Option<StreamOutcome> {
        self.shared.outcome.borrow().clone()
    }

    /// Waits until the stream has ended.
    pub async fn wait(&self) -> StreamOutcome {
        let mut outcome = self.shared.outcome.clone();
        let result = match outcome.wait_for(Option::is_some).await {
            Ok(done) => done.clone(),
            Err(_) => None,
        };
        result.unwrap_or_else(|| StreamOutcome::Failed {
            stats: Default::default(),
            error: Arc::new(LichessError::TaskFailed(
                "stream task stopped without a result".to_string(),
            )),
        })
    }

    pub fn same_stream(&self, other: &Subscription) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}
