//! Snapshot listeners over a specimen collection

use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::specimen::{Fetched, Specimen};
use crate::store::{decode_all, DocumentStore, Query};

/// Handle for an active snapshot listener.
///
/// Every delivery is a full replacement snapshot, never a diff. Call
/// [`Subscription::unsubscribe`] on teardown; dropping the handle also
/// stops delivery.
pub struct Subscription {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stop delivery and wait for the listener task to finish. No callback
    /// runs after this returns.
    pub async fn unsubscribe(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.task).await {
            if e.is_panic() {
                log::error!("Snapshot listener panicked: {}", e);
            }
        }
    }

    /// `false` once the listener has stopped, e.g. because the store closed
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
            self.task.abort();
        }
    }
}

async fn load_snapshot<S: DocumentStore + ?Sized>(
    store: &S,
    collection: &str,
    query: &Query,
) -> Fetched<Vec<Specimen>> {
    match store
        .query(collection, query)
        .await
        .and_then(decode_all::<Specimen>)
    {
        Ok(specimens) => Fetched::ok(specimens),
        Err(e) => {
            log::error!("Failed to load snapshot of {}: {}", collection, e);
            Fetched::failed(e)
        }
    }
}

/// Spawn a listener that delivers the current result of `query` now and
/// again after every change to `collection`. Must be called from within a
/// tokio runtime.
pub(crate) fn spawn_listener<S, F>(
    store: Arc<S>,
    collection: String,
    query: Query,
    mut callback: F,
) -> Subscription
where
    S: DocumentStore + ?Sized + 'static,
    F: FnMut(Fetched<Vec<Specimen>>) + Send + 'static,
{
    // Subscribe before the first read so no change slips between the two
    let mut changes = store.changes();
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        callback(load_snapshot(store.as_ref(), &collection, &query).await);

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                received = changes.recv() => match received {
                    Ok(event) if event.collection == collection => {
                        log::debug!("{:?} on {}, refreshing snapshot", event.kind, collection);
                        callback(load_snapshot(store.as_ref(), &collection, &query).await);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!(
                            "Snapshot listener on {} missed {} changes, resyncing",
                            collection,
                            skipped
                        );
                        callback(load_snapshot(store.as_ref(), &collection, &query).await);
                    }
                    Err(RecvError::Closed) => {
                        log::debug!("Change stream for {} closed", collection);
                        break;
                    }
                },
            }
        }
    });

    Subscription {
        stop: Some(stop_tx),
        task,
    }
}
