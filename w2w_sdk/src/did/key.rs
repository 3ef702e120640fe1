use crate::{
    crypto::ed25519_to_x25519_public,
    definitions::{ED25519_KEY_SIZE, KeyType, PublicKeyData},
    did::{DidDocument, DidError, VerificationMethod},
};

pub(crate) const SCHEME: &str = "key";

// multicodec varints for ed25519-pub and x25519-pub
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];
const X25519_MULTICODEC: [u8; 2] = [0xec, 0x01];

const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";

/// Multibase (base58btc) fingerprint of an Ed25519 public key
pub fn ed25519_fingerprint(public_key: &[u8]) -> String {
    multibase(&ED25519_MULTICODEC, public_key)
}

/// Multibase (base58btc) fingerprint of an X25519 public key
pub fn x25519_fingerprint(public_key: &[u8]) -> String {
    multibase(&X25519_MULTICODEC, public_key)
}

/// Encode an Ed25519 public key as `did:key`
pub fn encode_did_key(public_key: &[u8]) -> String {
    format!("did:key:{}", ed25519_fingerprint(public_key))
}

/// Extract the Ed25519 public key embedded in a `did:key` identifier
///
/// A trailing fragment or path is ignored.
pub fn ed25519_public_key_from_did(did: &str) -> Result<PublicKeyData, DidError> {
    let invalid = || DidError::InvalidDid(did.to_string());

    let fingerprint = did
        .strip_prefix("did:key:")
        .and_then(|rest| rest.split(['#', '/', '?']).next())
        .ok_or_else(invalid)?;

    let encoded = fingerprint.strip_prefix('z').ok_or_else(invalid)?;
    let bytes = bs58::decode(encoded)
        .with_alphabet(bs58::Alphabet::BITCOIN)
        .into_vec()
        .map_err(|_| invalid())?;

    match bytes.as_slice() {
        [0xed, 0x01, key @ ..] if key.len() == ED25519_KEY_SIZE => Ok(key.to_vec().into()),
        [0xed, 0x01, ..] => Err(invalid()),
        _ => Err(DidError::ResolveDid(
            did.to_string(),
            "only ed25519 did:key identifiers are supported",
        )),
    }
}

/// Build the DID document of a `did:key` identifier without network access
///
/// The document lists the Ed25519 key for authentication and assertion,
/// and its X25519 conversion for key agreement.
pub fn resolve_did_key(did: &str) -> Result<DidDocument, DidError> {
    let public_key = ed25519_public_key_from_did(did)?;
    let agreement_key = ed25519_to_x25519_public(&public_key)
        .map_err(|_| DidError::InvalidDid(did.to_string()))?;

    let fingerprint = ed25519_fingerprint(&public_key);
    let id = format!("did:key:{fingerprint}");
    let signing_id = format!("{id}#{fingerprint}");
    let agreement_id = format!("{id}#{}", x25519_fingerprint(&agreement_key));

    Ok(DidDocument {
        context: vec![DID_CONTEXT.to_string()],
        verification_method: vec![
            VerificationMethod {
                id: signing_id.clone(),
                controller: id.clone(),
                method_type: KeyType::Ed25519VerificationKey2018.to_string(),
                public_key_base58: Some(public_key),
            },
            VerificationMethod {
                id: agreement_id.clone(),
                controller: id.clone(),
                method_type: KeyType::X25519KeyAgreementKey2019.to_string(),
                public_key_base58: Some(agreement_key),
            },
        ],
        authentication: vec![signing_id.clone()],
        assertion_method: vec![signing_id],
        key_agreement: vec![agreement_id],
        service: vec![],
        id,
    })
}

fn multibase(multicodec: &[u8; 2], public_key: &[u8]) -> String {
    let mut v = Vec::with_capacity(2 + public_key.len());
    v.extend_from_slice(multicodec);
    v.extend_from_slice(public_key);

    let encoded = bs58::encode(&v)
        .with_alphabet(bs58::Alphabet::BITCOIN)
        .into_string();

    format!("z{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{crypto::derive_agreement_key, definitions::KeyDocument};

    #[test]
    fn did_key_round_trip() {
        let key_doc = KeyDocument::generate_did_key();

        assert!(key_doc.controller.starts_with("did:key:z6Mk"));
        assert_eq!(encode_did_key(&key_doc.public_key_base58), key_doc.controller);
        assert_eq!(
            ed25519_public_key_from_did(&key_doc.id).unwrap(),
            key_doc.public_key_base58
        );
    }

    #[test]
    fn known_did_keys() {
        // X25519 ids checked against the birational map u = (1 + y) / (1 - y)
        let vectors = [
            (
                "did:key:z6MkpTHR8VNsBxYAAWHut2Geadd9jSwuBV8xRoAnwWsdvktH",
                "z6LSbysY2xFMRpGMhb7tFTLMpeuPRaqaWM1yECx2AtzE3KCc",
            ),
            (
                "did:key:z6MkiTBz1ymuepAQ4HEHYSF1H8quG5GLVVQR3djdX3mDooWp",
                "z6LShs9GGnqk85isEBzzshkuVWrVKsRp24GnDuHk8QWkARMW",
            ),
        ];

        for (did, agreement_key) in vectors {
            let document = resolve_did_key(did).unwrap();

            assert_eq!(document.key_agreement, vec![format!("{did}#{agreement_key}")]);
        }
    }

    #[test]
    fn document_agreement_key_matches_local_derivation() {
        let key_doc = KeyDocument::generate_did_key();

        let document = resolve_did_key(&key_doc.controller).unwrap();
        let published = document.agreement_key().unwrap();
        let local = derive_agreement_key(&key_doc).unwrap();

        assert_eq!(published, local.public());
    }

    #[test]
    fn malformed_identifiers() {
        for did in [
            "did:key:",
            "did:key:6MkiTBz1ymuepAQ4HEHYSF1H8quG5GLVVQR3djdX3mDooWp",
            "did:key:z0OIl",
            "did:web:example.com",
        ] {
            assert!(ed25519_public_key_from_did(did).is_err(), "{did}");
        }

        let x25519_only = format!("did:key:{}", x25519_fingerprint(&[9u8; 32]));
        assert!(matches!(
            ed25519_public_key_from_did(&x25519_only),
            Err(DidError::ResolveDid(..))
        ));
    }
}
