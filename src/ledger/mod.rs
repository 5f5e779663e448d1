//! Credit ledger
//!
//! Each user holds a free allowance that refills once per cycle and a paid
//! balance that only grows through purchases.

mod policy;
mod store;
mod types;

pub use policy::CreditPolicy;
pub use store::CreditLedger;
pub(crate) use store::grant_paid_with;
pub use types::{
    Balance, CreditRecord, CreditSource, CreditTransaction, DebitOutcome, Deduction, ToolType,
    TransactionKind, MAX_FREE_CREDITS, RESET_PERIOD_HOURS,
};
