use api::{Balances, LightningBalance, MillisatAmount, OnchainBalance};

/// Fan a single lightning balance reading out into the full balances view.
///
/// None of the backends report receivable capacity or an onchain figure as part of
/// this reading, so those stay at zero.
pub fn from_lightning_balance(spendable: MillisatAmount) -> Balances {
    Balances {
        onchain: OnchainBalance {
            spendable: 0,
            total: 0,
        },
        lightning: LightningBalance {
            total_spendable: spendable,
            total_receivable: 0,
            next_max_spendable: spendable,
            next_max_receivable: 0,
            next_max_spendable_mpp: spendable,
            next_max_receivable_mpp: 0,
        },
    }
}
