use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Credentials
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Environment variable holding the HMAC signing secret for bearer
    /// credentials. Startup fails when it is unset or empty.
    #[serde(default = "d_secret_env")]
    pub secret_env: String,

    /// Environment variable holding a static admin bearer token. Optional:
    /// admin-scoped signed credentials work without it.
    #[serde(default = "d_admin_token_env")]
    pub admin_token_env: String,

    /// Lifetime of credentials minted through the admin API or CLI.
    #[serde(default = "d_24")]
    pub token_ttl_hours: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_env: d_secret_env(),
            admin_token_env: d_admin_token_env(),
            token_ttl_hours: 24,
        }
    }
}

fn d_secret_env() -> String {
    "CR_TOKEN_SECRET".into()
}
fn d_admin_token_env() -> String {
    "CR_ADMIN_TOKEN".into()
}
fn d_24() -> u32 {
    24
}
