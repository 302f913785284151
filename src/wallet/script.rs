use bitcoin::hashes::Hash;
use bitcoin::{PubkeyHash, PublicKey, Script};

use crate::error::ScriptResolutionError;

/// What an output script pays to: a raw public key (P2PK) or a key hash
/// (P2PKH, P2WPKH). The two forms are mutually exclusive per script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptIdentity {
    PubKey(PublicKey),
    PubKeyHash(PubkeyHash),
}

impl ScriptIdentity {
    /// Classify an output script.
    pub fn from_script(script: &Script) -> Result<Self, ScriptResolutionError> {
        let bytes = script.as_bytes();

        if script.is_p2pk() {
            // <push 33|65> <key> OP_CHECKSIG
            let key = &bytes[1..bytes.len() - 1];
            return PublicKey::from_slice(key)
                .map(ScriptIdentity::PubKey)
                .map_err(|e| ScriptResolutionError::MalformedPubKey(e.to_string()));
        }

        let hash = if script.is_p2pkh() {
            // OP_DUP OP_HASH160 <20> <hash> OP_EQUALVERIFY OP_CHECKSIG
            &bytes[3..23]
        } else if script.is_p2wpkh() {
            // OP_0 <20> <hash>
            &bytes[2..22]
        } else {
            return Err(ScriptResolutionError::Unsupported(hex::encode(bytes)));
        };

        PubkeyHash::from_slice(hash)
            .map(ScriptIdentity::PubKeyHash)
            .map_err(|e| ScriptResolutionError::Unsupported(e.to_string()))
    }

    /// Key hash used by the reverse address index. A public key and its
    /// hash160 resolve to the same entry.
    pub fn key_hash(&self) -> PubkeyHash {
        match self {
            ScriptIdentity::PubKey(pk) => pk.pubkey_hash(),
            ScriptIdentity::PubKeyHash(hash) => *hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::opcodes::all::OP_CHECKSIG;
    use bitcoin::script::Builder;
    use bitcoin::secp256k1::{Secp256k1, SecretKey};
    use bitcoin::{Address, CompressedPublicKey, Network, ScriptBuf};

    fn test_pubkey() -> PublicKey {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[7u8; 32]).unwrap();
        PublicKey::new(bitcoin::secp256k1::PublicKey::from_secret_key(&secp, &secret))
    }

    #[test]
    fn test_all_supported_forms_share_key_hash() {
        let pk = test_pubkey();
        let compressed = CompressedPublicKey::try_from(pk).unwrap();

        let p2pk = Builder::new()
            .push_slice(pk.inner.serialize())
            .push_opcode(OP_CHECKSIG)
            .into_script();
        let p2pkh = Address::p2pkh(pk.pubkey_hash(), Network::Regtest).script_pubkey();
        let p2wpkh = Address::p2wpkh(&compressed, Network::Regtest).script_pubkey();

        let from_p2pk = ScriptIdentity::from_script(&p2pk).unwrap();
        assert_eq!(from_p2pk, ScriptIdentity::PubKey(pk));

        for script in [p2pk, p2pkh, p2wpkh] {
            let identity = ScriptIdentity::from_script(&script).unwrap();
            assert_eq!(identity.key_hash(), pk.pubkey_hash());
        }
    }

    #[test]
    fn test_unsupported_script() {
        let op_return = ScriptBuf::new_op_return(&[1, 2, 3, 4]);
        let err = ScriptIdentity::from_script(&op_return).unwrap_err();
        assert!(matches!(err, ScriptResolutionError::Unsupported(_)));
    }
}
