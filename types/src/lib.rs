//! Common types used throughout fairreel.
//!
//! Everything here is plain data: no I/O, no randomness, no clocks. The execution crate
//! produces and consumes these types; verifiers only need this crate plus the derivation
//! functions in `fairreel-execution`.

pub mod ledger;
mod money;
pub mod pf;
pub mod slot;

pub use money::{Money, MoneyError, MINOR_UNITS, PAY_SCALE};
