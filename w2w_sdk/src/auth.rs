//! Self-signed, time bounded assertions proving control of a DID
//!
//! A relay accepts these in place of a session token. The wire form is the
//! JSON array `[subject, issuanceDate, expirationDate, proof]`, standard
//! base64 encoded; a batch is an array of such arrays.

use base64ct::{Base64, Encoding};
use chrono::{DateTime, Months, SubsecRound, Utc};
use serde::{Deserialize, Serialize, Serializer, de::DeserializeOwned};
use serde_json::{Value, json};
use std::collections::BTreeMap;

use crate::{
    crypto::{self, CryptoError},
    definitions::KeyDocument,
    did::{DidDocument, DidError, DidResolver, key::resolve_did_key},
};

pub const PROOF_TYPE: &str = "Ed25519Signature2018";
pub const PROOF_PURPOSE: &str = "assertionMethod";

/// How long an authorization payload stays valid after issuance
pub const VALIDITY: Months = Months::new(12);

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("{0}")]
    Crypto(#[from] CryptoError),
    #[error("{0}")]
    Did(#[from] DidError),
    #[error("(de)serializing authorization payload failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("authorization payload is not base64 encoded")]
    Base64,
    #[error("no key documents to authorize with")]
    MissingKeyDocuments,
    #[error("validity period of the authorization payload cannot be represented")]
    InvalidDate,
    #[error("authorization payload for '{did}' is not valid at {at}")]
    Expired { did: String, at: DateTime<Utc> },
    #[error("authorization payload was signed with '{0}', which does not belong to '{1}'")]
    SignerMismatch(String, String),
    #[error("unsupported proof '{0}'")]
    UnsupportedProof(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub created: DateTime<Utc>,
    pub verification_method: String,
    pub proof_purpose: String,
    pub proof_value: String,
}

/// `[subject, issuanceDate, expirationDate, proof]`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationPayload(
    pub Value,
    pub DateTime<Utc>,
    pub DateTime<Utc>,
    pub Proof,
);

/// A payload together with the DID that signed it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedPayload {
    pub payload: AuthorizationPayload,
    pub did: String,
}

/// Payloads for several local DIDs, `payload[i]` signed by `dids[i]`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedPayloadBatch {
    pub payload: Vec<AuthorizationPayload>,
    pub dids: Vec<String>,
}

impl AuthorizationPayload {
    pub fn subject(&self) -> &Value {
        &self.0
    }

    pub fn issuance_date(&self) -> DateTime<Utc> {
        self.1
    }

    pub fn expiration_date(&self) -> DateTime<Utc> {
        self.2
    }

    pub fn proof(&self) -> &Proof {
        &self.3
    }

    /// Check the signature against the `did:key` identifier `did` and that
    /// `at` lies in the validity period
    pub fn validate(&self, did: &str, at: DateTime<Utc>) -> Result<(), AuthError> {
        self.validate_against(did, &resolve_did_key(did)?, at)
    }

    /// Like [validate](Self::validate), taking the signer's key from the DID
    /// document `resolver` returns
    pub async fn validate_with(
        &self,
        did: &str,
        at: DateTime<Utc>,
        resolver: &dyn DidResolver,
    ) -> Result<(), AuthError> {
        let document = resolver.resolve(did).await?;

        self.validate_against(did, &document, at)
    }

    fn validate_against(
        &self,
        did: &str,
        document: &DidDocument,
        at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let proof = self.proof();

        if proof.proof_type != PROOF_TYPE {
            return Err(AuthError::UnsupportedProof(proof.proof_type.clone()));
        }

        let signer = proof
            .verification_method
            .split('#')
            .next()
            .unwrap_or_default();
        if signer != did {
            return Err(AuthError::SignerMismatch(
                proof.verification_method.clone(),
                did.to_string(),
            ));
        }

        let signature = proof
            .proof_value
            .strip_prefix('z')
            .and_then(|encoded| bs58::decode(encoded).into_vec().ok())
            .ok_or_else(|| AuthError::UnsupportedProof(proof.proof_value.clone()))?;

        let public_key = document
            .verification_key()
            .ok_or_else(|| DidError::MissingVerificationKey(did.to_string()))?;
        let signing_input = signing_input(did, &self.0, self.1, self.2)?;
        crypto::verify(did, public_key, &signing_input, &signature)?;

        if self.issuance_date() <= at && at < self.expiration_date() {
            Ok(())
        } else {
            Err(AuthError::Expired {
                did: did.to_string(),
                at,
            })
        }
    }
}

impl SignedPayload {
    /// Standard base64 of the JSON tuple, as sent to the relay
    pub fn to_base64(&self) -> Result<String, AuthError> {
        encode(&self.payload)
    }
}

impl SignedPayloadBatch {
    pub fn to_base64(&self) -> Result<String, AuthError> {
        encode(&self.payload)
    }

    /// The signer DIDs as a JSON array string
    pub fn dids_json(&self) -> Result<String, AuthError> {
        Ok(serde_json::to_string(&self.dids)?)
    }
}

/// Build a payload asserting `subject`, issued now
pub fn build_payload(key_doc: &KeyDocument, subject: Value) -> Result<SignedPayload, AuthError> {
    build_payload_at(key_doc, subject, Utc::now())
}

/// Build a payload asserting `subject`, issued at `issued`
pub fn build_payload_at(
    key_doc: &KeyDocument,
    subject: Value,
    issued: DateTime<Utc>,
) -> Result<SignedPayload, AuthError> {
    let issuance_date = issued.trunc_subsecs(0);
    let expiration_date = issuance_date
        .checked_add_months(VALIDITY)
        .ok_or(AuthError::InvalidDate)?;

    let did = key_doc.controller.clone();
    let signing_input = signing_input(&did, &subject, issuance_date, expiration_date)?;
    let signature = crypto::sign(key_doc, &signing_input)?;

    let proof = Proof {
        proof_type: PROOF_TYPE.to_string(),
        created: issuance_date,
        verification_method: key_doc.id.clone(),
        proof_purpose: PROOF_PURPOSE.to_string(),
        proof_value: format!("z{}", bs58::encode(signature).into_string()),
    };

    Ok(SignedPayload {
        payload: AuthorizationPayload(subject, issuance_date, expiration_date, proof),
        did,
    })
}

/// One payload per key document, in the same order
pub fn build_payload_batch(
    key_docs: &[KeyDocument],
    subject: Value,
) -> Result<SignedPayloadBatch, AuthError> {
    if key_docs.is_empty() {
        return Err(AuthError::MissingKeyDocuments);
    }

    let now = Utc::now();
    let (payload, dids) = key_docs
        .iter()
        .map(|key_doc| {
            build_payload_at(key_doc, subject.clone(), now)
                .map(|signed| (signed.payload, signed.did))
        })
        .collect::<Result<(Vec<_>, Vec<_>), AuthError>>()?;

    Ok(SignedPayloadBatch { payload, dids })
}

/// Decode a single payload from its base64 wire form
pub fn decode_payload(encoded: &str) -> Result<AuthorizationPayload, AuthError> {
    decode(encoded)
}

/// Decode a batch of payloads from its base64 wire form
pub fn decode_payload_batch(encoded: &str) -> Result<Vec<AuthorizationPayload>, AuthError> {
    decode(encoded)
}

fn signing_input(
    issuer: &str,
    subject: &Value,
    issuance_date: DateTime<Utc>,
    expiration_date: DateTime<Utc>,
) -> Result<Vec<u8>, AuthError> {
    let credential = json!({
        "issuer": issuer,
        "issuanceDate": issuance_date,
        "expirationDate": expiration_date,
        "credentialSubject": subject,
    });

    Ok(serde_json::to_vec(&Canonical(&credential))?)
}

/// Serializes a JSON value with the keys of every object sorted, whatever
/// map ordering serde_json was built with
struct Canonical<'a>(&'a Value);

impl Serialize for Canonical<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Object(fields) => serializer.collect_map(
                fields
                    .iter()
                    .map(|(key, value)| (key, Canonical(value)))
                    .collect::<BTreeMap<_, _>>(),
            ),
            Value::Array(items) => serializer.collect_seq(items.iter().map(Canonical)),
            other => other.serialize(serializer),
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<String, AuthError> {
    Ok(Base64::encode_string(&serde_json::to_vec(value)?))
}

fn decode<T: DeserializeOwned>(encoded: &str) -> Result<T, AuthError> {
    let bytes = Base64::decode_vec(encoded).map_err(|_| AuthError::Base64)?;

    Ok(serde_json::from_slice(&bytes)?)
}
