use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::{api::Feed, store::State};

/// A live change feed, applied to the store's thread by a background task
pub(crate) struct Subscription {
    id: u64,
    task: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn spawn(id: u64, mut feed: Feed, state: Arc<Mutex<State>>) -> Subscription {
        let task = tokio::spawn(async move {
            while let Some(e) = feed.next().await {
                let mut state = state.lock();
                // events can still be buffered after the subscription got replaced
                if state.subscription_id() != Some(id) {
                    tracing::debug!(id, "dropping change for a stale subscription");
                    break;
                }
                state.apply_change(e);
            }
            tracing::debug!(id, "change feed ended");
        });
        Subscription { id, task }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn cancel(self) {
        self.task.abort();
    }
}
