//! Admin endpoints: audit log, stats, rate-limit control and credentials.
//!
//! All admin handlers take the `AdminGuard` extractor (see `guard.rs`).
//! `/health` and `/available` live here too but are public.

mod guard;
mod health;
mod logs;
mod ratelimit;
mod tokens;

pub use guard::AdminGuard;

pub use health::{available, health, stats};
pub use logs::logs;
pub use ratelimit::{reset as ratelimit_reset, stats as ratelimit_stats};
pub use tokens::{generate as generate_token, revoke as revoke_token, validate as validate_token};
