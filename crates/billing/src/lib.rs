//! Billing domain: the bill aggregate, line items, and money.

pub mod bill;
pub mod money;

pub use bill::{Bill, BillStatus, Item};
pub use money::{Currency, MinorUnit, Money};
