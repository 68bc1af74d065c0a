//! Claim scenarios and Merkle properties

use escrow_core::AccountId;
use proptest::prelude::*;
use reward_distributor::merkle::{leaf_hash, verify_proof};
use reward_distributor::{
    Config, Error, MerkleDistribution, MerkleLeaf, MerkleTree, RewardLedger,
};

const E18: u128 = 1_000_000_000_000_000_000;

fn accounts() -> [AccountId; 4] {
    [
        AccountId::derive("a"),
        AccountId::derive("b"),
        AccountId::derive("c"),
        AccountId::derive("d"),
    ]
}

fn distribution(amounts: [u128; 4]) -> MerkleDistribution {
    let leaves: Vec<_> = accounts()
        .iter()
        .zip(amounts)
        .enumerate()
        .map(|(i, (account, amount))| MerkleLeaf {
            index: i as u64,
            account: *account,
            amount,
        })
        .collect();
    MerkleDistribution::build(&leaves).unwrap()
}

fn claim(
    ledger: &mut RewardLedger,
    dist: &MerkleDistribution,
    account: AccountId,
) -> reward_distributor::Result<u128> {
    let c = dist.claim_for(&account).unwrap();
    ledger
        .claim(account, c.index, c.account, c.amount, &c.proof)
        .map(|receipt| receipt.amount)
}

#[test]
fn test_four_leaf_cumulative_claims() {
    let guardian = AccountId::derive("guardian");
    let [a, b, _, _] = accounts();
    let mut ledger = RewardLedger::new(guardian);

    let first = distribution([E18, 2 * E18, 3 * E18, 4 * E18]);
    assert_eq!(ledger.update_root(guardian, first.root).unwrap(), 1);
    assert_eq!(claim(&mut ledger, &first, a).unwrap(), E18);

    let second = distribution([10 * E18, 2 * E18, 3 * E18, 4 * E18]);
    assert_eq!(ledger.update_root(guardian, second.root).unwrap(), 2);
    assert_eq!(claim(&mut ledger, &second, a).unwrap(), 9 * E18);

    let record = ledger.claimed(&a);
    assert_eq!(record.total_claimed, 10 * E18);
    assert_eq!(record.last_claimed_epoch, 2);

    // b skipped epoch 1 and still receives its full cumulative amount
    assert_eq!(claim(&mut ledger, &second, b).unwrap(), 2 * E18);
    assert_eq!(ledger.total_claimed(), 12 * E18);
}

#[test]
fn test_distribution_sorts_leaves_by_index() {
    let [a, b, c, d] = accounts();
    let leaf = |index: u64, account: AccountId| MerkleLeaf {
        index,
        account,
        amount: E18 * (index as u128 + 1),
    };
    let ordered = [leaf(0, a), leaf(1, b), leaf(2, c), leaf(3, d)];
    let swapped = [leaf(0, a), leaf(2, c), leaf(1, b), leaf(3, d)];

    let expected = MerkleDistribution::build(&ordered).unwrap();
    let actual = MerkleDistribution::build(&swapped).unwrap();
    assert_eq!(actual.root, expected.root);
    assert_eq!(
        actual.claims.iter().map(|c| c.index).collect::<Vec<_>>(),
        vec![0, 1, 2, 3]
    );

    let guardian = AccountId::derive("guardian");
    let mut ledger = RewardLedger::new(guardian);
    ledger.update_root(guardian, actual.root).unwrap();
    assert_eq!(claim(&mut ledger, &actual, c).unwrap(), 3 * E18);
}

#[test]
fn test_claim_is_idempotent() {
    let guardian = AccountId::derive("guardian");
    let [a, ..] = accounts();
    let mut ledger = RewardLedger::new(guardian);
    let dist = distribution([5 * E18, E18, E18, E18]);
    ledger.update_root(guardian, dist.root).unwrap();

    assert_eq!(claim(&mut ledger, &dist, a).unwrap(), 5 * E18);
    assert_eq!(claim(&mut ledger, &dist, a).unwrap(), 0);
    assert_eq!(ledger.claimed(&a).total_claimed, 5 * E18);
    assert_eq!(ledger.total_claimed(), 5 * E18);
}

#[test]
fn test_stale_proof_rejected_after_root_update() {
    let guardian = AccountId::derive("guardian");
    let [a, ..] = accounts();
    let mut ledger = RewardLedger::new(guardian);

    let old = distribution([E18, E18, E18, E18]);
    ledger.update_root(guardian, old.root).unwrap();
    let new = distribution([2 * E18, E18, E18, E18]);
    ledger.update_root(guardian, new.root).unwrap();

    assert!(matches!(
        claim(&mut ledger, &old, a),
        Err(Error::InvalidMerkleProof)
    ));
}

#[test]
fn test_claims_survive_reopen() {
    let temp = tempfile::tempdir().unwrap();
    let guardian = AccountId::derive("guardian");
    let [a, ..] = accounts();
    let config = Config {
        guardian,
        state_file: Some(temp.path().join("rewards").join("state.json")),
        ..Config::default()
    };
    let dist = distribution([3 * E18, E18, E18, E18]);

    {
        let mut ledger = RewardLedger::open(&config).unwrap();
        ledger.update_root(guardian, dist.root).unwrap();
        assert_eq!(claim(&mut ledger, &dist, a).unwrap(), 3 * E18);
    }

    let mut reopened = RewardLedger::open(&config).unwrap();
    assert_eq!(reopened.current().epoch, 1);
    assert_eq!(reopened.current().root, dist.root);
    assert_eq!(reopened.claimed(&a).total_claimed, 3 * E18);
    assert_eq!(claim(&mut reopened, &dist, a).unwrap(), 0);
}

fn shuffled_leaves() -> impl Strategy<Value = (Vec<MerkleLeaf>, Vec<MerkleLeaf>)> {
    prop::collection::vec(1u128..1_000_000, 2..30).prop_flat_map(|amounts| {
        let leaves: Vec<_> = amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| MerkleLeaf {
                index: i as u64,
                account: AccountId::derive(&format!("acc{}", i)),
                amount: *amount,
            })
            .collect();
        (Just(leaves.clone()), Just(leaves).prop_shuffle())
    })
}

proptest! {
    #[test]
    fn prop_every_leaf_proves_and_tampering_fails(
        amounts in prop::collection::vec(1u128..=u64::MAX as u128, 1..40),
        bump in 1u128..1_000,
    ) {
        let leaves: Vec<_> = amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| MerkleLeaf {
                index: i as u64,
                account: AccountId::derive(&format!("acc{}", i)),
                amount: *amount,
            })
            .collect();
        let tree = MerkleTree::build(&leaves).unwrap();
        let root = tree.root();

        for leaf in &leaves {
            let proof = tree.proof(leaf.index).unwrap();
            prop_assert!(verify_proof(&proof, &root, &leaf_hash(leaf)));

            let forgeries = [
                MerkleLeaf { amount: leaf.amount + bump, ..*leaf },
                MerkleLeaf { index: leaf.index + amounts.len() as u64, ..*leaf },
                MerkleLeaf { account: AccountId::derive("mallory"), ..*leaf },
            ];
            for forged in &forgeries {
                prop_assert!(!verify_proof(&proof, &root, &leaf_hash(forged)));
            }
        }
    }

    #[test]
    fn prop_root_independent_of_leaf_order((leaves, shuffled) in shuffled_leaves()) {
        let expected = MerkleDistribution::build(&leaves).unwrap();
        let actual = MerkleDistribution::build(&shuffled).unwrap();
        prop_assert_eq!(&actual, &expected);
    }

    #[test]
    fn prop_cumulative_payouts_match_final_amount(
        steps in prop::collection::vec(0u128..1_000_000, 1..8),
    ) {
        let guardian = AccountId::derive("guardian");
        let alice = AccountId::derive("alice");
        let mut ledger = RewardLedger::new(guardian);

        let mut cumulative = 0u128;
        let mut paid = 0u128;
        for step in steps {
            cumulative += step;
            let leaves = [MerkleLeaf { index: 0, account: alice, amount: cumulative }];
            let dist = MerkleDistribution::build(&leaves).unwrap();
            ledger.update_root(guardian, dist.root).unwrap();

            let c = &dist.claims[0];
            let receipt = ledger.claim(alice, 0, alice, c.amount, &c.proof).unwrap();
            prop_assert_eq!(receipt.amount, step);
            paid += receipt.amount;
        }
        prop_assert_eq!(paid, cumulative);
        prop_assert_eq!(ledger.total_claimed(), cumulative);
    }
}
