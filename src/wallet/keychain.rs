use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv, Xpub};
use bitcoin::secp256k1::{Secp256k1, VerifyOnly};
use bitcoin::{Address, CompressedPublicKey, Network};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ledger::HdAddress;
use super::script::ScriptIdentity;
use crate::config::AddressType;
use crate::error::{DerivationError, WalletError};

/// First hardened child index; chain indices must stay below it.
const HARDENED_OFFSET: u64 = 1 << 31;

/// The two BIP44 chains below the account key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    Receive,
    Change,
}

impl ChainKind {
    pub const ALL: [ChainKind; 2] = [ChainKind::Receive, ChainKind::Change];

    /// Non-hardened child number of the chain below the account key
    pub fn child_index(&self) -> u32 {
        match self {
            ChainKind::Receive => 0,
            ChainKind::Change => 1,
        }
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainKind::Receive => write!(f, "receive"),
            ChainKind::Change => write!(f, "change"),
        }
    }
}

/// Derives addresses from an account-level extended public key.
///
/// Derivation is a pure function of (xpub, chain kind, index): the same
/// inputs always produce the same script identity.
#[derive(Clone)]
pub struct KeyChain {
    xpub: Xpub,
    network: Network,
    address_type: AddressType,
    secp: Secp256k1<VerifyOnly>,
}

impl fmt::Debug for KeyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyChain")
            .field("xpub", &self.xpub.to_string())
            .field("network", &self.network)
            .field("address_type", &self.address_type)
            .finish()
    }
}

impl KeyChain {
    pub fn new(xpub: Xpub, network: Network, address_type: AddressType) -> Self {
        Self {
            xpub,
            network,
            address_type,
            secp: Secp256k1::verification_only(),
        }
    }

    /// Parse an account-level xpub/tpub, or an xprv/tprv of which only the
    /// public half is kept.
    pub fn from_extended_key(
        key: &str,
        network: Network,
        address_type: AddressType,
    ) -> Result<Self, WalletError> {
        let key = key.trim();
        let xpub = match Xpub::from_str(key) {
            Ok(xpub) => xpub,
            Err(pub_err) => {
                let xpriv = Xpriv::from_str(key).map_err(|_| {
                    WalletError::InvalidExtendedKey(pub_err.to_string())
                })?;
                Xpub::from_priv(&Secp256k1::new(), &xpriv)
            }
        };
        if xpub.network != bitcoin::NetworkKind::from(network) {
            log::warn!(
                "Extended key network {:?} does not match configured network {}",
                xpub.network,
                network
            );
        }
        Ok(Self::new(xpub, network, address_type))
    }

    /// Derive the account key from a BIP39 seed at `path`
    pub fn from_seed(
        seed: &[u8],
        path: &str,
        network: Network,
        address_type: AddressType,
    ) -> Result<Self, WalletError> {
        let secp = Secp256k1::new();
        let master_key = Xpriv::new_master(network, seed)
            .map_err(|e| DerivationError::Bip32(e.to_string()))?;
        let derivation_path = DerivationPath::from_str(path)
            .map_err(|e| DerivationError::Bip32(e.to_string()))?;
        let account_key = master_key
            .derive_priv(&secp, &derivation_path)
            .map_err(|e| DerivationError::Bip32(e.to_string()))?;
        Ok(Self::new(
            Xpub::from_priv(&secp, &account_key),
            network,
            address_type,
        ))
    }

    pub fn xpub(&self) -> &Xpub {
        &self.xpub
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn address_type(&self) -> AddressType {
        self.address_type
    }

    /// Derive the address at `index` on `chain`
    pub fn derive_address(&self, chain: ChainKind, index: u32) -> Result<HdAddress, DerivationError> {
        if u64::from(index) >= HARDENED_OFFSET {
            return Err(DerivationError::IndexOverflow {
                chain,
                index: index.into(),
            });
        }
        let path = [
            ChildNumber::from_normal_idx(chain.child_index())
                .map_err(|e| DerivationError::Bip32(e.to_string()))?,
            ChildNumber::from_normal_idx(index)
                .map_err(|e| DerivationError::Bip32(e.to_string()))?,
        ];
        let derived = self
            .xpub
            .derive_pub(&self.secp, &path)
            .map_err(|e| DerivationError::Bip32(e.to_string()))?;

        let pubkey = CompressedPublicKey(derived.public_key);
        let address = match self.address_type {
            AddressType::P2pkh => Address::p2pkh(pubkey.pubkey_hash(), self.network),
            AddressType::P2wpkh => Address::p2wpkh(&pubkey, self.network),
        };

        Ok(HdAddress::new(
            chain,
            index,
            ScriptIdentity::PubKey(bitcoin::PublicKey::new(derived.public_key)),
            address,
        ))
    }

    /// Derive `count` consecutive addresses starting at `from`
    pub fn derive_range(
        &self,
        chain: ChainKind,
        from: u32,
        count: u32,
    ) -> Result<Vec<HdAddress>, DerivationError> {
        let end = u64::from(from) + u64::from(count);
        if count > 0 && end > HARDENED_OFFSET {
            return Err(DerivationError::IndexOverflow { chain, index: end - 1 });
        }
        (from..from + count)
            .map(|index| self.derive_address(chain, index))
            .collect()
    }
}
