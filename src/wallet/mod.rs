pub mod keychain;
pub mod ledger;
pub mod margin;
pub mod reconciler;
pub mod script;
pub mod transaction;

pub use keychain::{ChainKind, KeyChain};
pub use ledger::{
    Account, AccountSnapshot, AddressDescription, AddressSnapshot, Balance, Chain, HdAddress,
};
pub use margin::{MarginManager, MarginOverrun, MarginReport};
pub use reconciler::{amount_for_account, reconcile, AddressDelta, ReconcileReport};
pub use script::ScriptIdentity;
pub use transaction::{Confidence, InputRecord, OutputRecord, TransactionRecord};
