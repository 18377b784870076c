//! Provably-fair session, spin log and audit records, and the verification wire format.

mod payload;
mod session;

pub use payload::*;
pub use session::*;
