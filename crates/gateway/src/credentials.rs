//! Signed bearer credentials.
//!
//! A credential is `cr-<payload>.<signature>` where `payload` is the
//! base64url (unpadded) JSON of [`Claims`] and `signature` is the hex
//! HMAC-SHA256 of the payload segment under the server secret. The gateway
//! only reads identity, scope and expiry out of it.
//!
//! Revocation is by credential id (`jti`). Revoked ids are remembered until
//! the credential would have expired on its own, then pruned.

use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use cr_domain::error::{Error, Result};
use cr_domain::trace::TraceEvent;

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "cr-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Client,
    Admin,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Client => "client",
            Scope::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Client identity.
    pub sub: String,
    pub scope: Scope,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
    /// Credential id, used for revocation.
    pub jti: String,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_admin(&self) -> bool {
        self.scope == Scope::Admin
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Signer / verifier
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct TokenSigner {
    key: Vec<u8>,
    /// jti → exp (unix seconds).
    revoked: Mutex<HashMap<String, i64>>,
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self> {
        let key = secret.as_ref().to_vec();
        if key.is_empty() {
            return Err(Error::Config("token secret must not be empty".into()));
        }
        Ok(Self {
            key,
            revoked: Mutex::new(HashMap::new()),
        })
    }

    /// Read the shared secret from the environment variable `var`.
    pub fn from_env(var: &str) -> Result<Self> {
        match std::env::var(var) {
            Ok(secret) if !secret.trim().is_empty() => Self::new(secret.trim()),
            _ => Err(Error::Config(format!(
                "token secret is not set (export {var})"
            ))),
        }
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Mint a credential for `sub` valid for `ttl` from `now`.
    pub fn issue_at(
        &self,
        sub: &str,
        scope: Scope,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<(String, Claims)> {
        if sub.trim().is_empty() {
            return Err(Error::BadRequest("client id must not be empty".into()));
        }
        if ttl <= Duration::zero() {
            return Err(Error::BadRequest("ttl must be positive".into()));
        }
        let expires = now
            .checked_add_signed(ttl)
            .ok_or_else(|| Error::BadRequest("ttl too large".into()))?;
        let claims = Claims {
            sub: sub.to_owned(),
            scope,
            iat: now.timestamp(),
            exp: expires.timestamp(),
            jti: uuid::Uuid::new_v4().simple().to_string(),
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let token = format!("{PREFIX}{payload}.{}", self.sign(&payload));

        TraceEvent::TokenIssued {
            client_id: claims.sub.clone(),
            scope: scope.as_str().into(),
            ttl_secs: ttl.num_seconds(),
        }
        .emit();

        Ok((token, claims))
    }

    pub fn issue(&self, sub: &str, scope: Scope, ttl: Duration) -> Result<(String, Claims)> {
        self.issue_at(sub, scope, ttl, Utc::now())
    }

    /// Check the signature and decode the claims, ignoring expiry and
    /// revocation.
    fn decode(&self, token: &str) -> Result<Claims> {
        let body = token
            .strip_prefix(PREFIX)
            .ok_or_else(|| Error::Auth("malformed credential".into()))?;
        let (payload, sig) = body
            .split_once('.')
            .ok_or_else(|| Error::Auth("malformed credential".into()))?;

        let expected = self.sign(payload);
        if expected.as_bytes().ct_eq(sig.as_bytes()).unwrap_u8() != 1 {
            return Err(Error::Auth("invalid credential signature".into()));
        }

        let raw = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| Error::Auth("malformed credential".into()))?;
        serde_json::from_slice(&raw).map_err(|_| Error::Auth("malformed credential".into()))
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims> {
        let claims = self.decode(token)?;
        if now.timestamp() >= claims.exp {
            return Err(Error::Auth("credential expired".into()));
        }
        if self.revoked.lock().contains_key(&claims.jti) {
            return Err(Error::Auth("credential revoked".into()));
        }
        Ok(claims)
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        self.verify_at(token, Utc::now())
    }

    /// Revoke a credential. It must carry a valid signature; expired
    /// credentials are accepted since revoking them is harmless.
    pub fn revoke(&self, token: &str) -> Result<Claims> {
        let claims = self.decode(token)?;
        self.revoked.lock().insert(claims.jti.clone(), claims.exp);
        Ok(claims)
    }

    /// Drop revocation entries for credentials that have expired anyway.
    pub fn prune_revoked(&self, now: DateTime<Utc>) -> usize {
        let mut revoked = self.revoked.lock();
        let before = revoked.len();
        let cutoff = now.timestamp();
        revoked.retain(|_, exp| *exp > cutoff);
        before - revoked.len()
    }

    pub fn revoked_count(&self) -> usize {
        self.revoked.lock().len()
    }
}
