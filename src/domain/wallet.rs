//! Balance ledgers: the read contract every wallet offers, and the simulated
//! wallet used for backtests.

/// Read contract shared by simulated and exchange-backed wallets.
pub trait Wallet {
    /// Spendable capital.
    fn balance(&self) -> f64;

    /// Equity including realized profit; defaults to the spendable balance.
    fn total_balance(&self) -> f64 {
        self.balance()
    }

    /// Mutable access to the simulated ledger, if this wallet is one.
    fn as_simulated_mut(&mut self) -> Option<&mut TestWallet> {
        None
    }

    fn is_simulated(&self) -> bool {
        false
    }
}

/// Simulated wallet: margin is debited on open and credited back with profit on close.
#[derive(Debug, Clone, PartialEq)]
pub struct TestWallet {
    balance: f64,
    total_balance: f64,
}

impl TestWallet {
    pub fn new(initial_balance: f64) -> Self {
        TestWallet {
            balance: initial_balance,
            total_balance: initial_balance,
        }
    }

    /// Reserve margin for a newly opened position.
    pub fn debit(&mut self, investment: f64) {
        self.balance -= investment;
    }

    /// Return a closed position's margin plus its profit (negative on a loss).
    pub fn settle(&mut self, investment: f64, profit: f64) {
        self.balance += investment + profit;
        self.total_balance += profit;
    }

    /// Release margin of a position unwound without a realized result.
    pub fn release(&mut self, investment: f64) {
        self.balance += investment;
    }
}

impl Wallet for TestWallet {
    fn balance(&self) -> f64 {
        self.balance
    }

    fn total_balance(&self) -> f64 {
        self.total_balance
    }

    fn as_simulated_mut(&mut self) -> Option<&mut TestWallet> {
        Some(self)
    }

    fn is_simulated(&self) -> bool {
        true
    }
}
