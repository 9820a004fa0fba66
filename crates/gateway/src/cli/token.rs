//! `coderelay token issue`: mint a credential offline with the same secret
//! the server uses.

use cr_domain::config::Config;

use crate::credentials::{Scope, TokenSigner};

pub fn issue(
    config: &Config,
    client_id: &str,
    admin: bool,
    ttl_hours: Option<u32>,
) -> anyhow::Result<()> {
    let signer = TokenSigner::from_env(&config.auth.secret_env)?;
    let hours = ttl_hours.unwrap_or(config.auth.token_ttl_hours);
    let scope = if admin { Scope::Admin } else { Scope::Client };

    let (token, claims) = signer.issue(
        client_id,
        scope,
        chrono::Duration::hours(i64::from(hours)),
    )?;

    eprintln!(
        "issued {} credential for {} (expires {}, id {})",
        claims.scope.as_str(),
        claims.sub,
        claims.expires_at().to_rfc3339(),
        claims.jti,
    );
    println!("{token}");
    Ok(())
}
