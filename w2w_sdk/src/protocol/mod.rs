//! The wallet-to-wallet verification handshake
//!
//! A verifier invites a holder, the holder acknowledges, the verifier requests
//! a presentation, the holder presents and the verifier answers with the
//! verification result. Each wallet reacts to the message it receives; which
//! side it plays follows from the message kind and the handlers it registered.
//!
//! [VerificationProtocol::handle_message] dispatches the follow-up work (user
//! handler, reply) to a background task and returns at once, so callers can
//! acknowledge relay messages without waiting for slow handlers.

use futures::{FutureExt, future::BoxFuture};
use serde_json::Value;
use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};

use crate::{
    definitions::{DidCommMessage, GoalCode, MessageType, ProofRequestTemplate, VerificationBody},
    store::{DocumentStore, StoreError, add_proof_request_template, proof_request_template},
    transport::RelayError,
};

mod provider;
mod session;
mod tasks;

pub use provider::{MessageProvider, RelayMessageProvider};
pub use session::{Role, Session, SessionEvent, SessionMachine, Stage, StateError};

use session::SessionRegistry;
use tasks::TaskRegistry;

/// Failure reported by an application handler
#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        HandlerError(message.into())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("no {0} handler registered")]
    HandlerNotRegistered(&'static str),
    #[error("proof request template '{0}' not found")]
    TemplateNotFound(String),
    #[error("missing {0}")]
    MissingField(&'static str),
    #[error("handling messages requires a tokio runtime")]
    NoRuntime,
    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),
    #[error("{0}")]
    State(#[from] StateError),
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Relay(#[from] RelayError),
    #[error("(de)serializing message body failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("background task failed: {0}")]
    Task(String),
    #[error("internal error")]
    Internal,
}

impl<T> From<PoisonError<T>> for ProtocolError {
    fn from(_: PoisonError<T>) -> Self {
        Self::Internal
    }
}

/// Holder side: turns a proof request into a presentation
pub type ProofRequestHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, HandlerError>> + Send + Sync>;

/// Verifier side: evaluates `(presentation, proof_request)` into a result
pub type PresentationHandler =
    Arc<dyn Fn(Value, Value) -> BoxFuture<'static, Result<Value, HandlerError>> + Send + Sync>;

/// Holder side: receives the verifier's result
pub type PresentationAckHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

#[derive(Default, Clone)]
struct Handlers {
    proof_request: Option<ProofRequestHandler>,
    presentation: Option<PresentationHandler>,
    presentation_ack: Option<PresentationAckHandler>,
}

/// Work a recognized message asks for
enum Step {
    AcceptInvitation,
    RequestPresentation,
    Present {
        proof_request: Value,
        handler: ProofRequestHandler,
    },
    Verify {
        presentation: Value,
        handler: PresentationHandler,
    },
    Complete {
        presentation_result: Value,
        handler: Option<PresentationAckHandler>,
    },
}

impl Step {
    fn event(&self) -> SessionEvent {
        match self {
            Step::AcceptInvitation => SessionEvent::ReceiveInvitation,
            Step::RequestPresentation => SessionEvent::ReceiveInvitationAck,
            Step::Present { .. } => SessionEvent::ReceiveProofRequest,
            Step::Verify { .. } => SessionEvent::ReceivePresentation,
            Step::Complete { .. } => SessionEvent::ReceivePresentationResult,
        }
    }
}

/// Addressing of the reply to a received message
struct Reply {
    /// The DID the message was sent to, which answers it
    local: String,
    peer: String,
    proof_request_id: String,
}

struct Shared {
    store: Arc<dyn DocumentStore>,
    provider: Arc<dyn MessageProvider>,
    sessions: Mutex<SessionRegistry>,
}

pub struct VerificationProtocol {
    shared: Arc<Shared>,
    handlers: Handlers,
    tasks: Mutex<TaskRegistry>,
}

impl VerificationProtocol {
    pub fn new(store: Arc<dyn DocumentStore>, provider: Arc<dyn MessageProvider>) -> Self {
        VerificationProtocol {
            shared: Arc::new(Shared {
                store,
                provider,
                sessions: Default::default(),
            }),
            handlers: Default::default(),
            tasks: Default::default(),
        }
    }

    pub fn set_proof_request_handler<F, Fut>(&mut self, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.handlers.proof_request = Some(Arc::new(move |request| handler(request).boxed()));
    }

    pub fn set_presentation_handler<F, Fut>(&mut self, handler: F)
    where
        F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.handlers.presentation = Some(Arc::new(move |presentation, request| {
            handler(presentation, request).boxed()
        }));
    }

    pub fn set_presentation_ack_handler<F, Fut>(&mut self, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.handlers.presentation_ack = Some(Arc::new(move |result| handler(result).boxed()));
    }

    /// Store `template` under a fresh id
    pub async fn create_proof_request_template(
        &self,
        template: Value,
    ) -> Result<ProofRequestTemplate, ProtocolError> {
        let template = ProofRequestTemplate::new(uuid::Uuid::new_v4().to_string(), template);

        add_proof_request_template(self.shared.store.as_ref(), &template).await?;

        Ok(template)
    }

    /// Store `template` and invite `holder_did` to prove it, returning the
    /// proof request id
    pub async fn start_verification(
        &self,
        verifier_did: &str,
        holder_did: &str,
        template: Value,
    ) -> Result<String, ProtocolError> {
        let template = self.create_proof_request_template(template).await?;

        self.send_invitation(verifier_did, holder_did, &template.id)
            .await?;

        Ok(template.id)
    }

    /// Invite `holder_did` to the handshake for a stored template
    pub async fn send_invitation(
        &self,
        verifier_did: &str,
        holder_did: &str,
        proof_request_id: &str,
    ) -> Result<(), ProtocolError> {
        if verifier_did.is_empty() {
            return Err(ProtocolError::MissingField("verifier DID"));
        }

        if holder_did.is_empty() {
            return Err(ProtocolError::MissingField("holder DID"));
        }

        if proof_request_template(self.shared.store.as_ref(), proof_request_id)
            .await?
            .is_none()
        {
            return Err(ProtocolError::TemplateNotFound(proof_request_id.to_string()));
        }

        let previous = self.shared.sessions.lock()?.advance(
            proof_request_id,
            SessionEvent::SendInvitation,
            holder_did,
        )?;

        let body = VerificationBody {
            goal_code: Some(GoalCode::WalletToWalletVerification),
            proof_request_id: Some(proof_request_id.to_string()),
            ..Default::default()
        };

        let invitation = DidCommMessage::new(
            MessageType::Invitation,
            verifier_did,
            holder_did,
            serde_json::to_value(body)?,
        );

        if let Err(e) = self.shared.provider.send_message(invitation).await {
            self.shared
                .release(proof_request_id, Role::Verifier, holder_did, previous);

            return Err(e);
        }

        Ok(())
    }

    /// Dispatch a received message
    ///
    /// Returns `Ok(true)` when the message belongs to the handshake and its
    /// follow-up was started (or was already handled), `Ok(false)` for
    /// messages this protocol does not handle. The follow-up runs in the
    /// background; see [wait_for](Self::wait_for).
    pub fn handle_message(&self, message: &DidCommMessage) -> Result<bool, ProtocolError> {
        let Some(kind) = message.kind() else {
            tracing::debug!("ignoring {} message {}", message.message_type, message.id);
            return Ok(false);
        };

        let body: VerificationBody = match serde_json::from_value(message.body.clone()) {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!("ignoring {kind} message {}: {e}", message.id);
                return Ok(false);
            }
        };

        let (Some(peer), Some(local), Some(proof_request_id)) = (
            message.from.clone(),
            message.to.first().cloned(),
            body.proof_request_id.clone(),
        ) else {
            tracing::debug!(
                "ignoring {kind} message {} without sender, recipient or proof request id",
                message.id
            );
            return Ok(false);
        };

        let Some(step) = self.step(kind, body)? else {
            tracing::debug!("ignoring {kind} message {} with unknown goal", message.id);
            return Ok(false);
        };

        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ProtocolError::NoRuntime)?;

        let event = step.event();

        let previous = match self
            .shared
            .sessions
            .lock()?
            .advance(&proof_request_id, event, &peer)
        {
            Ok(previous) => previous,
            Err(StateError::Duplicate { stage, .. }) => {
                tracing::debug!(
                    "{kind} for proof request {proof_request_id} already handled ({stage:?})"
                );
                return Ok(true);
            }
            Err(e) => return Err(e.into()),
        };

        tracing::debug!("dispatching {kind} for proof request {proof_request_id} from {peer}");

        let shared = self.shared.clone();
        let reply = Reply {
            local,
            peer,
            proof_request_id: proof_request_id.clone(),
        };

        let task = runtime.spawn(async move {
            let result = shared.run(step, &reply).await;

            if let Err(e) = &result {
                tracing::error!(
                    "{event:?} for proof request {} failed: {e}",
                    reply.proof_request_id
                );
                shared.release(&reply.proof_request_id, event.role(), &reply.peer, previous);
            }

            result
        });

        self.tasks.lock()?.insert(&proof_request_id, task);

        Ok(true)
    }

    /// Wait for the follow-ups dispatched for `proof_request_id`, returning
    /// the first failure
    pub async fn wait_for(&self, proof_request_id: &str) -> Result<(), ProtocolError> {
        let tasks = self.tasks.lock()?.take(proof_request_id);

        tasks::join(tasks).await
    }

    /// Number of follow-ups still running
    pub fn pending_tasks(&self) -> Result<usize, ProtocolError> {
        Ok(self.tasks.lock()?.pending())
    }

    /// The session this wallet plays as `role` with `peer` for a proof request
    pub fn session(
        &self,
        proof_request_id: &str,
        role: Role,
        peer: &str,
    ) -> Result<Option<Session>, ProtocolError> {
        Ok(self
            .shared
            .sessions
            .lock()?
            .get(proof_request_id, role, peer)
            .cloned())
    }

    pub fn sessions(&self) -> Result<Vec<Session>, ProtocolError> {
        Ok(self.shared.sessions.lock()?.all().to_vec())
    }

    fn step(&self, kind: MessageType, body: VerificationBody) -> Result<Option<Step>, ProtocolError> {
        let step = match (kind, body.goal_code) {
            (MessageType::Invitation, Some(GoalCode::WalletToWalletVerification)) => {
                Some(Step::AcceptInvitation)
            }
            (MessageType::Ack, Some(GoalCode::WalletToWalletVerification)) => {
                Some(Step::RequestPresentation)
            }
            (MessageType::Ack, Some(GoalCode::PresentationAckFromVerifier)) => {
                Some(Step::Complete {
                    presentation_result: body.presentation_result.unwrap_or_default(),
                    handler: self.handlers.presentation_ack.clone(),
                })
            }
            (MessageType::RequestPresentation, _) => {
                let handler = self
                    .handlers
                    .proof_request
                    .clone()
                    .ok_or(ProtocolError::HandlerNotRegistered("proof request"))?;

                body.proof_request.map(|proof_request| Step::Present {
                    proof_request,
                    handler,
                })
            }
            (MessageType::Presentation, _) => {
                let handler = self
                    .handlers
                    .presentation
                    .clone()
                    .ok_or(ProtocolError::HandlerNotRegistered("presentation"))?;

                body.presentation.map(|presentation| Step::Verify {
                    presentation,
                    handler,
                })
            }
            _ => None,
        };

        Ok(step)
    }
}

impl Shared {
    async fn run(&self, step: Step, reply: &Reply) -> Result<(), ProtocolError> {
        let proof_request_id = Some(reply.proof_request_id.clone());

        match step {
            Step::AcceptInvitation => {
                let body = VerificationBody {
                    goal_code: Some(GoalCode::WalletToWalletVerification),
                    proof_request_id,
                    ..Default::default()
                };

                self.reply(reply, MessageType::Ack, body).await
            }
            Step::RequestPresentation => {
                let template = self.template(&reply.proof_request_id).await?;

                let body = VerificationBody {
                    proof_request_id,
                    proof_request: Some(template.template),
                    ..Default::default()
                };

                self.reply(reply, MessageType::RequestPresentation, body)
                    .await
            }
            Step::Present {
                proof_request,
                handler,
            } => {
                let presentation = handler(proof_request).await?;

                let body = VerificationBody {
                    proof_request_id,
                    presentation: Some(presentation),
                    ..Default::default()
                };

                self.reply(reply, MessageType::Presentation, body).await
            }
            Step::Verify {
                presentation,
                handler,
            } => {
                let template = self.template(&reply.proof_request_id).await?;
                let presentation_result = handler(presentation, template.template).await?;

                let body = VerificationBody {
                    goal_code: Some(GoalCode::PresentationAckFromVerifier),
                    proof_request_id,
                    presentation_result: Some(presentation_result),
                    ..Default::default()
                };

                self.reply(reply, MessageType::Ack, body).await
            }
            Step::Complete {
                presentation_result,
                handler,
            } => {
                if let Some(handler) = handler {
                    handler(presentation_result).await?;
                }

                tracing::info!(
                    "verification {} with {} completed",
                    reply.proof_request_id,
                    reply.peer
                );

                Ok(())
            }
        }
    }

    async fn template(&self, proof_request_id: &str) -> Result<ProofRequestTemplate, ProtocolError> {
        proof_request_template(self.store.as_ref(), proof_request_id)
            .await?
            .ok_or_else(|| ProtocolError::TemplateNotFound(proof_request_id.to_string()))
    }

    async fn reply(
        &self,
        reply: &Reply,
        kind: MessageType,
        body: VerificationBody,
    ) -> Result<(), ProtocolError> {
        let message = DidCommMessage::new(
            kind,
            &reply.local,
            &reply.peer,
            serde_json::to_value(body)?,
        );

        self.provider.send_message(message).await
    }

    /// Roll a session back after its follow-up failed
    fn release(&self, proof_request_id: &str, role: Role, peer: &str, previous: Option<Stage>) {
        match self.sessions.lock() {
            Ok(mut sessions) => sessions.revert(proof_request_id, role, peer, previous),
            Err(_) => tracing::error!("session registry poisoned, keeping {proof_request_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDocumentStore;
    use async_trait::async_trait;
    use serde_json::json;

    const VERIFIER: &str = "did:key:verifier";
    const HOLDER: &str = "did:key:holder";

    #[derive(Default)]
    struct RecordingProvider {
        sent: Mutex<Vec<DidCommMessage>>,
    }

    impl RecordingProvider {
        fn take(&self) -> Vec<DidCommMessage> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }
    }

    #[async_trait]
    impl MessageProvider for RecordingProvider {
        async fn send_message(&self, message: DidCommMessage) -> Result<(), ProtocolError> {
            self.sent.lock().unwrap().push(message);

            Ok(())
        }
    }

    fn wallet() -> (VerificationProtocol, Arc<MemoryDocumentStore>, Arc<RecordingProvider>) {
        let store = Arc::new(MemoryDocumentStore::new());
        let provider = Arc::new(RecordingProvider::default());

        (
            VerificationProtocol::new(store.clone(), provider.clone()),
            store,
            provider,
        )
    }

    fn message(kind: MessageType, from: &str, to: &str, body: Value) -> DidCommMessage {
        DidCommMessage::new(kind, from, to, body)
    }

    fn body(message: &DidCommMessage) -> VerificationBody {
        serde_json::from_value(message.body.clone()).unwrap()
    }

    #[tokio::test]
    async fn test_verifier_answers_invitation_ack() {
        let (verifier, store, provider) = wallet();
        let template = json!({ "input_descriptors": [{ "id": "email" }] });

        add_proof_request_template(
            store.as_ref(),
            &ProofRequestTemplate::new("pid-1", template.clone()),
        )
        .await
        .unwrap();

        let ack = message(
            MessageType::Ack,
            "did:key:v1",
            VERIFIER,
            json!({ "goal_code": "wallet-to-wallet-verification", "proofRequestId": "pid-1" }),
        );

        assert!(verifier.handle_message(&ack).unwrap());
        verifier.wait_for("pid-1").await.unwrap();

        let sent = provider.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind(), Some(MessageType::RequestPresentation));
        assert_eq!(sent[0].from.as_deref(), Some(VERIFIER));
        assert_eq!(sent[0].to, vec!["did:key:v1".to_string()]);
        assert_eq!(body(&sent[0]).proof_request_id.as_deref(), Some("pid-1"));
        assert_eq!(body(&sent[0]).proof_request, Some(template));

        // a redelivered ack is acknowledged but not answered twice
        assert!(verifier.handle_message(&ack).unwrap());
        verifier.wait_for("pid-1").await.unwrap();
        assert!(provider.take().is_empty());

        assert_eq!(
            verifier
                .session("pid-1", Role::Verifier, "did:key:v1")
                .unwrap()
                .unwrap()
                .stage,
            Stage::PresentationRequested
        );
    }

    #[tokio::test]
    async fn test_full_handshake() {
        let (mut verifier, _, verifier_outbox) = wallet();
        let (mut holder, _, holder_outbox) = wallet();
        let received = Arc::new(Mutex::new(None));

        let template = json!({ "input_descriptors": [{ "id": "age" }] });

        holder.set_proof_request_handler(|_request| async { Ok(json!({ "fake": "vp" })) });

        let expected = template.clone();
        verifier.set_presentation_handler(move |presentation, request| {
            let verified = presentation == json!({ "fake": "vp" }) && request == expected;
            async move { Ok(json!({ "verified": verified })) }
        });

        let outcome = received.clone();
        holder.set_presentation_ack_handler(move |result| {
            *outcome.lock().unwrap() = Some(result);
            async { Ok(()) }
        });

        let pid = verifier
            .start_verification(VERIFIER, HOLDER, template)
            .await
            .unwrap();

        let expected_kinds = [
            (MessageType::Invitation, MessageType::Ack),
            (MessageType::RequestPresentation, MessageType::Presentation),
        ];

        for (verifier_sends, holder_answers) in expected_kinds {
            let sent = verifier_outbox.take();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].kind(), Some(verifier_sends));

            assert!(holder.handle_message(&sent[0]).unwrap());
            holder.wait_for(&pid).await.unwrap();

            let answered = holder_outbox.take();
            assert_eq!(answered.len(), 1);
            assert_eq!(answered[0].kind(), Some(holder_answers));
            assert_eq!(answered[0].from.as_deref(), Some(HOLDER));
            assert_eq!(answered[0].to, vec![VERIFIER.to_string()]);

            assert!(verifier.handle_message(&answered[0]).unwrap());
            verifier.wait_for(&pid).await.unwrap();
        }

        let result_ack = verifier_outbox.take();
        assert_eq!(result_ack.len(), 1);
        assert_eq!(
            body(&result_ack[0]).goal_code,
            Some(GoalCode::PresentationAckFromVerifier)
        );
        assert_eq!(
            body(&result_ack[0]).presentation_result,
            Some(json!({ "verified": true }))
        );

        assert!(holder.handle_message(&result_ack[0]).unwrap());
        holder.wait_for(&pid).await.unwrap();
        assert!(holder_outbox.take().is_empty());

        assert_eq!(
            *received.lock().unwrap(),
            Some(json!({ "verified": true }))
        );
        assert_eq!(
            holder
                .session(&pid, Role::Holder, VERIFIER)
                .unwrap()
                .unwrap()
                .stage,
            Stage::Completed
        );
        assert_eq!(
            verifier
                .session(&pid, Role::Verifier, HOLDER)
                .unwrap()
                .unwrap()
                .stage,
            Stage::Verified
        );
    }

    #[tokio::test]
    async fn test_one_template_many_holders() {
        let (verifier, _, provider) = wallet();
        let template = verifier
            .create_proof_request_template(json!({ "input_descriptors": [] }))
            .await
            .unwrap();

        for holder in ["did:key:h1", "did:key:h2"] {
            verifier
                .send_invitation(VERIFIER, holder, &template.id)
                .await
                .unwrap();
        }
        assert_eq!(provider.take().len(), 2);

        for holder in ["did:key:h1", "did:key:h2"] {
            let ack = message(
                MessageType::Ack,
                holder,
                VERIFIER,
                json!({ "goal_code": "wallet-to-wallet-verification", "proofRequestId": template.id }),
            );

            assert!(verifier.handle_message(&ack).unwrap());
        }
        verifier.wait_for(&template.id).await.unwrap();

        let mut requested: Vec<_> = provider
            .take()
            .into_iter()
            .inspect(|sent| assert_eq!(sent.kind(), Some(MessageType::RequestPresentation)))
            .flat_map(|sent| sent.to)
            .collect();
        requested.sort();

        assert_eq!(requested, vec!["did:key:h1", "did:key:h2"]);
        assert_eq!(verifier.sessions().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_handler() {
        let (holder, _, provider) = wallet();

        let request = message(
            MessageType::RequestPresentation,
            VERIFIER,
            HOLDER,
            json!({ "proofRequestId": "pid-1", "proofRequest": {} }),
        );

        assert!(matches!(
            holder.handle_message(&request),
            Err(ProtocolError::HandlerNotRegistered(_))
        ));
        assert!(provider.take().is_empty());
        assert!(holder.sessions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_template() {
        let (verifier, store, provider) = wallet();

        let ack = message(
            MessageType::Ack,
            HOLDER,
            VERIFIER,
            json!({ "goal_code": "wallet-to-wallet-verification", "proofRequestId": "pid-2" }),
        );

        assert!(verifier.handle_message(&ack).unwrap());
        assert!(matches!(
            verifier.wait_for("pid-2").await,
            Err(ProtocolError::TemplateNotFound(id)) if id == "pid-2"
        ));
        assert!(provider.take().is_empty());
        assert!(
            verifier
                .session("pid-2", Role::Verifier, HOLDER)
                .unwrap()
                .is_none()
        );

        // once the template exists the redelivered ack is answered
        add_proof_request_template(store.as_ref(), &ProofRequestTemplate::new("pid-2", json!({})))
            .await
            .unwrap();

        assert!(verifier.handle_message(&ack).unwrap());
        verifier.wait_for("pid-2").await.unwrap();
        assert_eq!(provider.take().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_handler_emits_nothing() {
        let (mut verifier, store, provider) = wallet();

        verifier.set_presentation_handler(|_, _| async {
            Err(HandlerError::new("signature does not verify"))
        });

        add_proof_request_template(store.as_ref(), &ProofRequestTemplate::new("pid-3", json!({})))
            .await
            .unwrap();

        let presentation = message(
            MessageType::Presentation,
            HOLDER,
            VERIFIER,
            json!({ "proofRequestId": "pid-3", "presentation": { "fake": "vp" } }),
        );

        assert!(verifier.handle_message(&presentation).unwrap());
        assert!(matches!(
            verifier.wait_for("pid-3").await,
            Err(ProtocolError::Handler(_))
        ));
        assert!(provider.take().is_empty());
        assert_eq!(verifier.pending_tasks().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unrecognized_messages() {
        let (wallet, _, provider) = wallet();

        let other_protocol = DidCommMessage {
            message_type: "https://didcomm.org/basicmessage/2.0/message".to_string(),
            ..message(MessageType::Ack, HOLDER, VERIFIER, json!({ "content": "hi" }))
        };
        let no_goal = message(
            MessageType::Ack,
            HOLDER,
            VERIFIER,
            json!({ "proofRequestId": "pid-1" }),
        );
        let no_proof_request_id = message(
            MessageType::Invitation,
            VERIFIER,
            HOLDER,
            json!({ "goal_code": "wallet-to-wallet-verification" }),
        );
        let not_an_object = message(MessageType::Invitation, VERIFIER, HOLDER, json!("invite"));

        for unrecognized in [other_protocol, no_goal, no_proof_request_id, not_an_object] {
            assert!(!wallet.handle_message(&unrecognized).unwrap());
        }

        assert!(provider.take().is_empty());
    }

    #[tokio::test]
    async fn test_invitation_needs_template() {
        let (verifier, _, provider) = wallet();

        assert!(matches!(
            verifier.send_invitation(VERIFIER, HOLDER, "pid-9").await,
            Err(ProtocolError::TemplateNotFound(_))
        ));
        assert!(matches!(
            verifier.send_invitation("", HOLDER, "pid-9").await,
            Err(ProtocolError::MissingField(_))
        ));
        assert!(provider.take().is_empty());
    }

    #[test]
    fn test_requires_runtime() {
        let (holder, _, _) = wallet();

        let invitation = message(
            MessageType::Invitation,
            VERIFIER,
            HOLDER,
            json!({ "goal_code": "wallet-to-wallet-verification", "proofRequestId": "pid-1" }),
        );

        assert!(matches!(
            holder.handle_message(&invitation),
            Err(ProtocolError::NoRuntime)
        ));
    }
}
