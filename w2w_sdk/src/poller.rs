use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

use crate::{
    Error,
    protocol::VerificationProtocol,
    retry::RetryPolicy,
    store::{DocumentStore, key_documents},
    transport::{GetMessages, RelayTransport},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Outcome of one [Poller::poll_once]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    /// Messages fetched and decoded
    pub received: usize,
    /// Messages handed to the verification protocol
    pub dispatched: usize,
    /// Messages that could not be decoded, acknowledged so they leave the relay
    pub dropped: usize,
    /// Messages removed from the relay
    pub acknowledged: usize,
}

/// Drives a wallet: fetches its messages from the relay, feeds them to the
/// verification protocol and acknowledges the ones it dispatched
///
/// Messages the protocol does not recognize stay on the relay; messages that
/// cannot be decoded at all are acknowledged and dropped.
pub struct Poller {
    transport: Arc<RelayTransport>,
    protocol: Arc<VerificationProtocol>,
    store: Arc<dyn DocumentStore>,
    interval: Duration,
    limit: Option<usize>,
    retry_policy: RetryPolicy,
}

impl Poller {
    pub fn new(
        transport: Arc<RelayTransport>,
        protocol: Arc<VerificationProtocol>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Poller {
            transport,
            protocol,
            store,
            interval: DEFAULT_POLL_INTERVAL,
            limit: None,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Fetch at most `limit` messages per poll
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Poll the relay once for every DID the wallet holds a key for
    pub async fn poll_once(&self) -> Result<PollReport, Error> {
        let key_docs = key_documents(self.store.as_ref()).await?;

        if key_docs.is_empty() {
            tracing::debug!("wallet holds no keys, nothing to poll");
            return Ok(PollReport::default());
        }

        let inbox = self
            .transport
            .receive_messages(GetMessages {
                key_docs: &key_docs,
                limit: self.limit,
                skip_resolution: false,
            })
            .await?;

        let mut report = PollReport {
            received: inbox.messages.len(),
            dropped: inbox.undecodable.len(),
            ..Default::default()
        };

        // relay ids to acknowledge, per recipient DID
        let mut handled = BTreeMap::<String, Vec<String>>::new();

        for record in inbox.undecodable {
            handled.entry(record.to).or_default().push(record.id);
        }

        for record in inbox.messages {
            let Some(message) = record.to_didcomm() else {
                tracing::debug!("message {} has no type, leaving it on the relay", record.id);
                continue;
            };

            match self.protocol.handle_message(&message) {
                Ok(true) => {
                    report.dispatched += 1;
                    handled.entry(record.to).or_default().push(record.id);
                }
                Ok(false) => {}
                Err(e) => tracing::error!("could not handle message {}: {e}", record.id),
            }
        }

        for (did, message_ids) in handled {
            self.transport.ack_messages(&did, &message_ids).await?;
            report.acknowledged += message_ids.len();
        }

        Ok(report)
    }

    /// Poll until `cancel` fires, backing off while the relay fails
    ///
    /// Gives up with the last error once the retry policy is exhausted.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), Error> {
        let mut failures = 0;

        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                outcome = self.poll_once() => outcome,
            };

            let delay = match outcome {
                Ok(report) => {
                    failures = 0;

                    if report.received + report.dropped > 0 {
                        tracing::debug!(
                            "received {}, dispatched {}, dropped {}, acknowledged {}",
                            report.received,
                            report.dispatched,
                            report.dropped,
                            report.acknowledged
                        );
                    }

                    self.interval
                }
                Err(e) => {
                    let Some(delay) = self.retry_policy.next_timeout(failures) else {
                        tracing::error!("polling failed {failures} times, giving up: {e}");
                        return Err(e);
                    };

                    failures += 1;
                    tracing::warn!("polling failed, retrying in {delay:?}: {e}");

                    delay
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
