//! Session runtime: the session manager plus the gates and locks it
//! leans on.
//!
//! [`broker::SessionManager`] owns the session table and drives each
//! lifecycle call; [`admission::AdmissionController`] budgets the expensive
//! endpoints before a request ever reaches it.

pub mod admission;
pub mod broker;
pub mod cancel;
pub mod session_lock;
