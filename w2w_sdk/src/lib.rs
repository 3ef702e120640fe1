#![deny(rustdoc::broken_intra_doc_links)]

//! # Wallet-to-wallet verification
//!
//! Identity wallets exchange encrypted, DID-addressed messages through a
//! store-and-forward relay and use them to run a verification handshake
//! between a holder and a verifier, without a central verification server.
//!
//! The [RelayTransport] authenticates every relay call with a short-lived
//! assertion signed by the wallet's own keys, encrypts outbound messages for
//! the recipient's key-agreement key and decodes inbound messages through the
//! [MessageResolver]. The [VerificationProtocol] reacts to decoded messages
//! and answers through a [MessageProvider]; a [Poller] ties the two together.
//!
//! ## Example
//!
//! A holder wallet that answers every proof request it receives:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use w2w_sdk::{
//!     Error, KeyDocument, MemoryDocumentStore, Poller, RelayConfig, RelayMessageProvider,
//!     RelayTransport, VerificationProtocol, store::add_key_document,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let store = Arc::new(MemoryDocumentStore::new());
//!     add_key_document(store.as_ref(), &KeyDocument::generate_did_key()).await?;
//!
//!     let transport = Arc::new(RelayTransport::new(RelayConfig::from_env()?)?);
//!     let provider = Arc::new(RelayMessageProvider::new(transport.clone(), store.clone()));
//!
//!     let mut protocol = VerificationProtocol::new(store.clone(), provider);
//!     protocol.set_proof_request_handler(|_proof_request| async {
//!         Ok(serde_json::json!({ "type": ["VerifiablePresentation"] }))
//!     });
//!
//!     Poller::new(transport, Arc::new(protocol), store)
//!         .run(CancellationToken::new())
//!         .await
//! }
//! ```

/// Authorization payloads: self-signed, time-bounded assertions proving
/// control of a DID to the relay.
pub mod auth;

/// Key agreement and the encrypted message envelope.
pub mod crypto;

/// Key documents, message types and other data shared across the crate.
pub mod definitions;

/// DID documents, the `did:key` method and the [DidResolver] seam.
pub mod did;

mod error;
mod http_client;

pub mod poller;

/// The reactive holder/verifier handshake.
pub mod protocol;

pub mod resolver;
pub mod retry;

/// Wallet document storage.
pub mod store;

/// Client of the store-and-forward relay.
pub mod transport;


pub use definitions::{DidCommMessage, GoalCode, KeyDocument, MessageType, ProofRequestTemplate};
pub use did::{DidDocument, DidResolver, KeyDidResolver};
pub use error::Error;
pub use poller::{PollReport, Poller};
pub use protocol::{
    HandlerError, MessageProvider, ProtocolError, RelayMessageProvider, VerificationProtocol,
};
pub use resolver::MessageResolver;
pub use store::{DocumentStore, MemoryDocumentStore};
pub use transport::{Inbox, RelayConfig, RelayMessage, RelayTransport};
