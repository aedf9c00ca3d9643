use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, warn};

use valet_core::config::{AuthConfig, TOKEN_EXPIRING_SOON_SECS};

use crate::error::{AuthError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Signed bearer claims. `exp`/`iat` are unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: String,
}

impl Claims {
    pub fn time_remaining_secs(&self) -> i64 {
        (self.exp - Utc::now().timestamp()).max(0)
    }

    pub fn is_expiring_soon(&self) -> bool {
        self.time_remaining_secs() < TOKEN_EXPIRING_SOON_SECS
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

/// Gates every tool-facing operation with a bearer credential.
///
/// Tokens are symmetric HMAC-SHA256 capabilities for a single gateway
/// deployment, not federation artifacts: `base64url(claims).hex(mac)`.
pub struct Authenticator {
    config: AuthConfig,
}

impl Authenticator {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Validate an API key against the static catalog and the recognized
    /// external-service keys, then mint a token for the mapped user.
    ///
    /// `client_hint` is policy, not identity: a mobile hint extends the
    /// lifetime to the mobile budget.
    pub fn issue(&self, api_key: &str, client_hint: Option<&str>) -> Result<IssuedToken> {
        let user_id = self
            .config
            .api_keys
            .iter()
            .chain(self.config.service_keys.iter())
            .find(|entry| entry.key == api_key)
            .map(|entry| entry.user_id.clone())
            .ok_or(AuthError::InvalidKey)?;

        let lifetime = if is_mobile_hint(client_hint) {
            self.config.mobile_token_lifetime_secs
        } else {
            self.config.token_lifetime_secs
        };

        let token = self.mint(&user_id, lifetime);
        debug!(user_id = %user_id, expires_in = lifetime, "token issued");
        Ok(IssuedToken {
            access_token: token,
            token_type: "bearer",
            expires_in: lifetime,
        })
    }

    /// Check signature and expiry. Expiry is absolute wall-clock:
    /// a token with `exp <= now` is rejected.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let (claims_b64, sig_hex) = token.split_once('.').ok_or(AuthError::InvalidToken)?;

        let provided = hex::decode(sig_hex).map_err(|_| AuthError::InvalidToken)?;
        let mut mac = HmacSha256::new_from_slice(self.config.secret.as_bytes())
            .map_err(|_| AuthError::InvalidToken)?;
        mac.update(claims_b64.as_bytes());
        if mac.verify_slice(&provided).is_err() {
            warn!("token signature mismatch");
            return Err(AuthError::InvalidToken);
        }

        let claims_json = URL_SAFE_NO_PAD
            .decode(claims_b64)
            .map_err(|_| AuthError::InvalidToken)?;
        let claims: Claims =
            serde_json::from_slice(&claims_json).map_err(|_| AuthError::InvalidToken)?;

        if claims.token_type != "access" {
            return Err(AuthError::InvalidToken);
        }
        if claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::Expired);
        }

        Ok(claims)
    }

    /// Reissue under the same subject with a fresh expiry.
    pub fn refresh(&self, claims: &Claims) -> IssuedToken {
        let lifetime = self.config.token_lifetime_secs;
        IssuedToken {
            access_token: self.mint(&claims.sub, lifetime),
            token_type: "bearer",
            expires_in: lifetime,
        }
    }

    fn mint(&self, user_id: &str, lifetime_secs: i64) -> String {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now + lifetime_secs,
            token_type: "access".to_string(),
        };
        // Claims are plain serializable data; serialization cannot fail.
        let json = serde_json::to_vec(&claims).unwrap_or_default();
        let claims_b64 = URL_SAFE_NO_PAD.encode(json);
        let sig = self.sign(&claims_b64);
        format!("{claims_b64}.{sig}")
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.config.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

fn is_mobile_hint(hint: Option<&str>) -> bool {
    hint.map(|h| {
        let h = h.to_ascii_lowercase();
        h.contains("ios") || h.contains("android") || h.contains("mobile")
    })
    .unwrap_or(false)
}
