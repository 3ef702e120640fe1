use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// The side of the handshake a wallet plays for one proof request
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    Holder,
    Verifier,
}

/// Progress of one side of a handshake, named after the last message emitted
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    /// Verifier sent the invitation
    Invited,
    /// Verifier sent the presentation request
    PresentationRequested,
    /// Verifier sent the presentation result
    Verified,
    /// Holder acknowledged the invitation
    InvitationAccepted,
    /// Holder sent the presentation
    PresentationSent,
    /// Holder received the presentation result
    Completed,
}

impl Stage {
    pub fn role(&self) -> Role {
        match self {
            Stage::Invited | Stage::PresentationRequested | Stage::Verified => Role::Verifier,
            Stage::InvitationAccepted | Stage::PresentationSent | Stage::Completed => Role::Holder,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Stage::Invited | Stage::InvitationAccepted => 0,
            Stage::PresentationRequested | Stage::PresentationSent => 1,
            Stage::Verified | Stage::Completed => 2,
        }
    }
}

/// Events that move a session forward
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Sending an invitation to a holder.
    SendInvitation,
    /// Receiving an invitation from a verifier.
    ReceiveInvitation,
    /// Receiving the holder's acknowledgement of our invitation.
    ReceiveInvitationAck,
    /// Receiving a presentation request.
    ReceiveProofRequest,
    /// Receiving a presentation.
    ReceivePresentation,
    /// Receiving the verifier's presentation result.
    ReceivePresentationResult,
}

impl SessionEvent {
    pub fn role(&self) -> Role {
        self.target().role()
    }

    /// The stage reached once this event is handled
    fn target(&self) -> Stage {
        match self {
            SessionEvent::SendInvitation => Stage::Invited,
            SessionEvent::ReceiveInvitationAck => Stage::PresentationRequested,
            SessionEvent::ReceivePresentation => Stage::Verified,
            SessionEvent::ReceiveInvitation => Stage::InvitationAccepted,
            SessionEvent::ReceiveProofRequest => Stage::PresentationSent,
            SessionEvent::ReceivePresentationResult => Stage::Completed,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StateError {
    #[error("{event:?} was already handled, session is at {stage:?}")]
    Duplicate { stage: Stage, event: SessionEvent },
    #[error("invalid transition from {from:?} with event {event:?}")]
    InvalidTransition { from: Stage, event: SessionEvent },
}

/// Transitions of a verification session
pub struct SessionMachine;

impl SessionMachine {
    /// The stage after `event`, given the `current` one (`None` for a new session)
    ///
    /// Sessions may start at any step, since the peer drives the handshake and
    /// this wallet might not have seen the earlier messages.
    pub fn transition(current: Option<Stage>, event: SessionEvent) -> Result<Stage, StateError> {
        let target = event.target();

        match current {
            None => Ok(target),
            Some(from) if from.role() != target.role() => {
                Err(StateError::InvalidTransition { from, event })
            }
            // re-sending an invitation that got no answer yet
            Some(Stage::Invited) if event == SessionEvent::SendInvitation => Ok(Stage::Invited),
            Some(stage) if stage.rank() >= target.rank() => {
                Err(StateError::Duplicate { stage, event })
            }
            Some(_) => Ok(target),
        }
    }
}

/// Correlation record of one side of a handshake
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub proof_request_id: String,
    pub role: Role,
    pub stage: Stage,
    /// The DID on the other side
    pub peer: String,
    pub updated: DateTime<Utc>,
}

/// `(proofRequestId, role, peer DID)`
type SessionKey = (String, Role, String);

/// Arena of sessions indexed by `(proofRequestId, role, peer)`
///
/// A verifier may invite several holders with the same template, so each
/// peer gets its own session.
#[derive(Default, Debug)]
pub(crate) struct SessionRegistry {
    sessions: Vec<Session>,
    index: HashMap<SessionKey, usize>,
}

fn session_key(proof_request_id: &str, role: Role, peer: &str) -> SessionKey {
    (proof_request_id.to_string(), role, peer.to_string())
}

impl SessionRegistry {
    /// Apply `event` to the session with `peer`, returning the stage before it
    pub(crate) fn advance(
        &mut self,
        proof_request_id: &str,
        event: SessionEvent,
        peer: &str,
    ) -> Result<Option<Stage>, StateError> {
        let key = session_key(proof_request_id, event.role(), peer);

        match self.index.get(&key) {
            Some(&slot) => {
                let session = &mut self.sessions[slot];
                let previous = session.stage;

                session.stage = SessionMachine::transition(Some(previous), event)?;
                session.updated = Utc::now();

                Ok(Some(previous))
            }
            None => {
                let stage = SessionMachine::transition(None, event)?;

                self.sessions.push(Session {
                    proof_request_id: key.0.clone(),
                    role: key.1,
                    stage,
                    peer: key.2.clone(),
                    updated: Utc::now(),
                });
                self.index.insert(key, self.sessions.len() - 1);

                Ok(None)
            }
        }
    }

    /// Undo an [advance](Self::advance) whose follow-up failed
    pub(crate) fn revert(
        &mut self,
        proof_request_id: &str,
        role: Role,
        peer: &str,
        previous: Option<Stage>,
    ) {
        let key = session_key(proof_request_id, role, peer);

        match previous {
            Some(stage) => {
                if let Some(&slot) = self.index.get(&key) {
                    self.sessions[slot].stage = stage;
                    self.sessions[slot].updated = Utc::now();
                }
            }
            None => {
                let Some(slot) = self.index.remove(&key) else {
                    return;
                };

                self.sessions.swap_remove(slot);

                if let Some(moved) = self.sessions.get(slot) {
                    self.index.insert(
                        (
                            moved.proof_request_id.clone(),
                            moved.role,
                            moved.peer.clone(),
                        ),
                        slot,
                    );
                }
            }
        }
    }

    pub(crate) fn get(&self, proof_request_id: &str, role: Role, peer: &str) -> Option<&Session> {
        self.index
            .get(&session_key(proof_request_id, role, peer))
            .map(|&slot| &self.sessions[slot])
    }

    pub(crate) fn all(&self) -> &[Session] {
        &self.sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verifier_flow() {
        let mut state = SessionMachine::transition(None, SessionEvent::SendInvitation).unwrap();
        assert_eq!(state, Stage::Invited);

        state = SessionMachine::transition(Some(state), SessionEvent::ReceiveInvitationAck).unwrap();
        assert_eq!(state, Stage::PresentationRequested);

        state = SessionMachine::transition(Some(state), SessionEvent::ReceivePresentation).unwrap();
        assert_eq!(state, Stage::Verified);
    }

    #[test]
    fn test_holder_flow() {
        let mut state = SessionMachine::transition(None, SessionEvent::ReceiveInvitation).unwrap();
        assert_eq!(state, Stage::InvitationAccepted);

        state = SessionMachine::transition(Some(state), SessionEvent::ReceiveProofRequest).unwrap();
        assert_eq!(state, Stage::PresentationSent);

        state =
            SessionMachine::transition(Some(state), SessionEvent::ReceivePresentationResult).unwrap();
        assert_eq!(state, Stage::Completed);
    }

    #[test]
    fn test_duplicates() {
        assert_eq!(
            SessionMachine::transition(
                Some(Stage::PresentationRequested),
                SessionEvent::ReceiveInvitationAck
            ),
            Err(StateError::Duplicate {
                stage: Stage::PresentationRequested,
                event: SessionEvent::ReceiveInvitationAck
            })
        );

        // a late invitation ack after the presentation arrived
        assert!(matches!(
            SessionMachine::transition(Some(Stage::Verified), SessionEvent::ReceiveInvitationAck),
            Err(StateError::Duplicate { .. })
        ));

        assert_eq!(
            SessionMachine::transition(Some(Stage::Invited), SessionEvent::SendInvitation),
            Ok(Stage::Invited)
        );
    }

    #[test]
    fn test_role_mismatch() {
        assert!(matches!(
            SessionMachine::transition(Some(Stage::Invited), SessionEvent::ReceiveProofRequest),
            Err(StateError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_late_join() {
        // a verifier that lost its session still answers the holder's ack
        assert_eq!(
            SessionMachine::transition(None, SessionEvent::ReceiveInvitationAck),
            Ok(Stage::PresentationRequested)
        );
    }

    #[test]
    fn test_registry() {
        let mut registry = SessionRegistry::default();

        assert_eq!(
            registry
                .advance("pid-1", SessionEvent::SendInvitation, "did:key:holder")
                .unwrap(),
            None
        );
        registry
            .advance("pid-2", SessionEvent::ReceiveInvitation, "did:key:verifier")
            .unwrap();
        registry
            .advance("pid-3", SessionEvent::ReceiveInvitation, "did:key:verifier")
            .unwrap();

        assert_eq!(
            registry
                .advance("pid-1", SessionEvent::ReceiveInvitationAck, "did:key:holder")
                .unwrap(),
            Some(Stage::Invited)
        );
        assert!(
            registry
                .advance("pid-1", SessionEvent::ReceiveInvitationAck, "did:key:holder")
                .is_err()
        );

        // one wallet may play both roles for the same proof request
        registry
            .advance("pid-1", SessionEvent::ReceiveInvitation, "did:key:verifier")
            .unwrap();
        assert_eq!(registry.all().len(), 4);

        registry.revert("pid-1", Role::Verifier, "did:key:holder", Some(Stage::Invited));
        assert_eq!(
            registry
                .get("pid-1", Role::Verifier, "did:key:holder")
                .unwrap()
                .stage,
            Stage::Invited
        );

        registry.revert("pid-2", Role::Holder, "did:key:verifier", None);
        assert!(registry.get("pid-2", Role::Holder, "did:key:verifier").is_none());
        assert_eq!(registry.all().len(), 3);
        assert_eq!(
            registry
                .get("pid-1", Role::Holder, "did:key:verifier")
                .unwrap()
                .stage,
            Stage::InvitationAccepted
        );
        assert_eq!(
            registry
                .get("pid-3", Role::Holder, "did:key:verifier")
                .unwrap()
                .stage,
            Stage::InvitationAccepted
        );
    }

    #[test]
    fn test_one_template_many_holders() {
        let mut registry = SessionRegistry::default();

        for holder in ["did:key:h1", "did:key:h2"] {
            registry
                .advance("pid-1", SessionEvent::SendInvitation, holder)
                .unwrap();
        }

        registry
            .advance("pid-1", SessionEvent::ReceiveInvitationAck, "did:key:h1")
            .unwrap();

        // the second holder's ack is not a duplicate of the first one
        assert_eq!(
            registry
                .advance("pid-1", SessionEvent::ReceiveInvitationAck, "did:key:h2")
                .unwrap(),
            Some(Stage::Invited)
        );
        assert_eq!(registry.all().len(), 2);
        assert_eq!(
            registry.get("pid-1", Role::Verifier, "did:key:h1").unwrap().peer,
            "did:key:h1"
        );
    }
}
