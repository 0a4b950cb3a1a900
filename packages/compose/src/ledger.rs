//! # Usage Ledger Gate
//!
//! Checks a user's credit balance before a generation starts and takes
//! exactly one credit after it completes.
//!
//! ## Charging
//!
//! ```text
//! pre_check(user) ──► PreCheck { allowed, balance, ticket }
//!                                               │
//!        (generation completes)                 ▼
//!                                        deduct(ticket)
//!                                               │
//!                     ┌─────────────────────────┴──────────────┐
//!                     ▼                                        ▼
//!        decrement_if_positive (atomic)      write_if_at_least(pre_checked - 1, 1)
//!                                                  (when the atomic path errors)
//! ```
//!
//! [`ChargeTicket`] is neither `Clone` nor `Copy` and `deduct` consumes it,
//! so one pre-check can pay for at most one deduction.
//!
//! The fallback write is conditional on the *current* balance being at
//! least 1, not on it still equalling the pre-checked value. Two sessions
//! of the same user deducting through the fallback concurrently can both
//! write `pre_checked - 1`, losing one decrement.

use crate::editor::lock;
use crate::error::LedgerError;
use crate::events::{ComposeEvent, EventBus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        UserId(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        UserId(id)
    }
}

/// External account store holding credit balances
#[async_trait]
pub trait CreditStore: Send + Sync {
    async fn balance(&self, user: &UserId) -> Result<i64, LedgerError>;

    /// Decrement by one if the balance is positive, atomically
    ///
    /// `Ok(None)` when the balance was not positive. Stores without an
    /// atomic primitive return [`LedgerError::Unsupported`].
    async fn decrement_if_positive(&self, user: &UserId) -> Result<Option<i64>, LedgerError>;

    /// Write `value` if the current balance is at least `at_least`
    ///
    /// `Ok(None)` when the condition did not hold.
    async fn write_if_at_least(
        &self,
        user: &UserId,
        value: i64,
        at_least: i64,
    ) -> Result<Option<i64>, LedgerError>;
}

/// Permission to deduct once
#[derive(Debug, PartialEq, Eq)]
pub struct ChargeTicket {
    user: UserId,
    pre_checked_balance: i64,
}

impl ChargeTicket {
    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn pre_checked_balance(&self) -> i64 {
        self.pre_checked_balance
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct PreCheck {
    pub allowed: bool,
    pub balance: i64,
    /// Present only when `allowed`
    pub ticket: Option<ChargeTicket>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeductionPath {
    Atomic,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deduction {
    /// New balance; `None` when the store did not apply the decrement
    pub balance: Option<i64>,
    pub path: DeductionPath,
}

pub struct UsageLedgerGate {
    store: Arc<dyn CreditStore>,
    events: EventBus<ComposeEvent>,
}

impl UsageLedgerGate {
    pub fn new(store: Arc<dyn CreditStore>, events: EventBus<ComposeEvent>) -> Self {
        Self { store, events }
    }

    /// Read the balance and decide whether a generation may start
    pub async fn pre_check(&self, user: &UserId) -> Result<PreCheck, LedgerError> {
        let balance = self.store.balance(user).await?;
        let allowed = balance >= 1;
        tracing::debug!(%user, balance, allowed, "credit pre-check");

        Ok(PreCheck {
            allowed,
            balance,
            ticket: allowed.then(|| ChargeTicket {
                user: user.clone(),
                pre_checked_balance: balance,
            }),
        })
    }

    /// Take one credit for a completed generation
    pub async fn deduct(&self, ticket: ChargeTicket) -> Result<Deduction, LedgerError> {
        let ChargeTicket {
            user,
            pre_checked_balance,
        } = ticket;

        let deduction = match self.store.decrement_if_positive(&user).await {
            Ok(balance) => Deduction {
                balance,
                path: DeductionPath::Atomic,
            },
            Err(e) => {
                tracing::warn!(%user, error = %e, "atomic decrement failed, using conditional write");
                let balance = self
                    .store
                    .write_if_at_least(&user, pre_checked_balance - 1, 1)
                    .await?;
                Deduction {
                    balance,
                    path: DeductionPath::Fallback,
                }
            }
        };

        match deduction.balance {
            Some(balance) => {
                tracing::info!(%user, balance, path = ?deduction.path, "credit deducted")
            }
            None => {
                tracing::warn!(%user, path = ?deduction.path, "deduction not applied by store")
            }
        }

        self.events.publish(ComposeEvent::CreditsChanged {
            user,
            balance: deduction.balance,
        });

        Ok(deduction)
    }
}

/// Process-local credit store
///
/// `atomic` toggles support for the atomic decrement, `failing` makes every
/// call error. Call counters are exposed for inspection.
pub struct InMemoryCreditStore {
    balances: Mutex<HashMap<UserId, i64>>,
    atomic: AtomicBool,
    failing: AtomicBool,
    balance_calls: AtomicUsize,
    decrement_calls: AtomicUsize,
    write_calls: AtomicUsize,
}

impl Default for InMemoryCreditStore {
    fn default() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            atomic: AtomicBool::new(true),
            failing: AtomicBool::new(false),
            balance_calls: AtomicUsize::new(0),
            decrement_calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
        }
    }
}

impl InMemoryCreditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(self, user: impl Into<UserId>, balance: i64) -> Self {
        self.set_balance(user, balance);
        self
    }

    pub fn set_balance(&self, user: impl Into<UserId>, balance: i64) {
        lock(&self.balances).insert(user.into(), balance);
    }

    pub fn current(&self, user: &UserId) -> Option<i64> {
        lock(&self.balances).get(user).copied()
    }

    pub fn set_atomic(&self, supported: bool) {
        self.atomic.store(supported, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    pub fn decrement_calls(&self) -> usize {
        self.decrement_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    fn check_failing(&self) -> Result<(), LedgerError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(LedgerError::Store("credit store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CreditStore for InMemoryCreditStore {
    async fn balance(&self, user: &UserId) -> Result<i64, LedgerError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        self.current(user)
            .ok_or_else(|| LedgerError::AccountNotFound(user.to_string()))
    }

    async fn decrement_if_positive(&self, user: &UserId) -> Result<Option<i64>, LedgerError> {
        self.decrement_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        if !self.atomic.load(Ordering::SeqCst) {
            return Err(LedgerError::Unsupported);
        }

        let mut balances = lock(&self.balances);
        let balance = balances
            .get_mut(user)
            .ok_or_else(|| LedgerError::AccountNotFound(user.to_string()))?;
        if *balance > 0 {
            *balance -= 1;
            Ok(Some(*balance))
        } else {
            Ok(None)
        }
    }

    async fn write_if_at_least(
        &self,
        user: &UserId,
        value: i64,
        at_least: i64,
    ) -> Result<Option<i64>, LedgerError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;

        let mut balances = lock(&self.balances);
        let balance = balances
            .get_mut(user)
            .ok_or_else(|| LedgerError::AccountNotFound(user.to_string()))?;
        if *balance >= at_least {
            *balance = value;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }
}
