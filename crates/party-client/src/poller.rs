use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use party_types::models::Party;

use crate::client::PartiesClient;
use crate::error::ClientError;

pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Keeps one party fresh while its detail view is open.
pub struct PartyPoller {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PartyPoller {
    /// Fetch `party_id` now and every [`POLL_INTERVAL`] after. Each outcome is
    /// delivered on the returned channel.
    pub fn start(client: PartiesClient, party_id: Uuid) -> (Self, mpsc::UnboundedReceiver<Result<Party, ClientError>>) {
        Self::with_interval(client, party_id, POLL_INTERVAL)
    }

    pub fn with_interval(
        client: PartiesClient,
        party_id: Uuid,
        interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<Result<Party, ClientError>>) {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let result = client.get_party(party_id, &token).await;
                if matches!(result, Err(ClientError::Cancelled)) {
                    break;
                }
                if let Err(e) = &result {
                    debug!("Poll of party {} failed: {}", party_id, e);
                }
                if tx.send(result).is_err() {
                    // Nobody is listening any more.
                    break;
                }
            }
            debug!("Stopped polling party {}", party_id);
        });

        (
            Self {
                cancel,
                handle: Some(handle),
            },
            rx,
        )
    }

    /// Stop polling. Any in-flight fetch is cancelled before it can touch the
    /// cache, and the polling task has finished when this returns.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Poller task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for PartyPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
