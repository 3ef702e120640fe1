use std::collections::HashMap;
use tokio::task::JoinHandle;

use super::ProtocolError;

type Continuation = JoinHandle<Result<(), ProtocolError>>;

/// Background continuations, grouped by the proof request they advance
#[derive(Default)]
pub(crate) struct TaskRegistry {
    tasks: HashMap<String, Vec<Continuation>>,
}

impl TaskRegistry {
    pub(crate) fn insert(&mut self, proof_request_id: &str, task: Continuation) {
        self.prune();

        self.tasks
            .entry(proof_request_id.to_string())
            .or_default()
            .push(task);
    }

    /// Take the continuations of `proof_request_id` out of the registry
    pub(crate) fn take(&mut self, proof_request_id: &str) -> Vec<Continuation> {
        self.tasks.remove(proof_request_id).unwrap_or_default()
    }

    /// Number of continuations still running
    pub(crate) fn pending(&self) -> usize {
        self.tasks
            .values()
            .flatten()
            .filter(|task| !task.is_finished())
            .count()
    }

    // finished continuations already logged their outcome
    fn prune(&mut self) {
        self.tasks.retain(|_, tasks| {
            tasks.retain(|task| !task.is_finished());

            !tasks.is_empty()
        });
    }
}

/// Await `tasks` in order, returning the first failure
pub(crate) async fn join(tasks: Vec<Continuation>) -> Result<(), ProtocolError> {
    let mut outcome = Ok(());

    for task in tasks {
        let result = task
            .await
            .map_err(|e| ProtocolError::Task(e.to_string()))
            .and_then(|result| result);

        if outcome.is_ok() {
            outcome = result;
        }
    }

    outcome
}
