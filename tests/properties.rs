mod common;

use common::*;
use hdreceive::wallet::{reconcile, Account, Balance, ChainKind, Confidence, MarginManager, TransactionRecord};
use proptest::prelude::*;
use std::path::Path;

#[derive(Debug, Clone)]
struct Deposit {
    chain: ChainKind,
    index: u32,
    sats: u64,
    confidence: Confidence,
    /// Spend it to an external address in a later transaction
    spent: bool,
}

fn confidence() -> impl Strategy<Value = Confidence> {
    prop_oneof![
        Just(Confidence::Unknown),
        Just(Confidence::Pending),
        Just(Confidence::Building),
        Just(Confidence::Dead),
    ]
}

fn deposit() -> impl Strategy<Value = Deposit> {
    (any::<bool>(), 0u32..20, 1u64..5_000_000, confidence(), any::<bool>()).prop_map(
        |(change, index, sats, confidence, spent)| Deposit {
            chain: if change { ChainKind::Change } else { ChainKind::Receive },
            index,
            sats,
            confidence,
            spent,
        },
    )
}

fn fixture() -> Account {
    test_account(&test_config(Path::new("/nonexistent")))
}

fn transactions(account: &Account, deposits: &[Deposit]) -> Vec<TransactionRecord> {
    let mut txs = Vec::new();
    for (n, d) in deposits.iter().enumerate() {
        let n = n as u8;
        let funding = payment(n, script_of(account, d.chain, d.index), d.sats, d.confidence);
        if d.spent {
            txs.push(spend(n | 0x80, &funding, vec![(external_script(), d.sats / 2)], Confidence::Building));
        }
        txs.push(funding);
    }
    txs
}

fn address_sum(account: &Account) -> Balance {
    account
        .addresses()
        .fold(Balance::default(), |acc, a| acc + a.balance())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn account_balance_is_sum_of_addresses(deposits in prop::collection::vec(deposit(), 0..12)) {
        let mut account = fixture();
        let txs = transactions(&account, &deposits);
        let report = reconcile(&mut account, &txs);
        prop_assert_eq!(account.balance(), address_sum(&account));
        prop_assert_eq!(report.balance, account.balance());
    }

    #[test]
    fn reconcile_is_idempotent(deposits in prop::collection::vec(deposit(), 0..12)) {
        let mut account = fixture();
        let txs = transactions(&account, &deposits);
        reconcile(&mut account, &txs);
        let first = account.snapshot();
        let report = reconcile(&mut account, &txs);
        prop_assert_eq!(account.snapshot(), first);
        prop_assert!(!report.changed());
    }

    #[test]
    fn dead_transactions_contribute_nothing(deposits in prop::collection::vec(deposit(), 0..12)) {
        let mut with_dead = fixture();
        let txs = transactions(&with_dead, &deposits);
        let live: Vec<TransactionRecord> = txs.iter().filter(|tx| !tx.is_dead()).cloned().collect();

        let mut without_dead = with_dead.clone();
        reconcile(&mut with_dead, &txs);
        reconcile(&mut without_dead, &live);
        prop_assert_eq!(with_dead.snapshot(), without_dead.snapshot());
    }

    #[test]
    fn margin_covers_highest_used(
        deposits in prop::collection::vec(deposit(), 0..12),
        gap_limit in 1u32..25,
    ) {
        let mut account = fixture();
        let txs = transactions(&account, &deposits);
        reconcile(&mut account, &txs);
        MarginManager::new(gap_limit, 10).ensure_margins(&mut account).unwrap();

        for kind in ChainKind::ALL {
            let chain = account.chain(kind);
            let used = chain.highest_used_index().map_or(0, |i| i + 1);
            prop_assert!(chain.len() >= used + gap_limit);
            prop_assert!(chain.margin() >= gap_limit);
        }
    }
}
