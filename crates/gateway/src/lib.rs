//! CodeRelay gateway: the HTTP surface, the session runtime behind it and
//! the `coderelay` CLI.

pub mod api;
pub mod audit;
pub mod bootstrap;
pub mod cli;
pub mod credentials;
pub mod runtime;
pub mod state;
