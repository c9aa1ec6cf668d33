use std::sync::RwLock;

use anyhow::{Result, anyhow};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{info, warn};
use uuid::Uuid;

use circles_types::api::Claims;
use circles_types::store::AuthContext;

/// Sign a session token for `user_id`, valid for `ttl`.
pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    username: &str,
    ttl: chrono::Duration,
) -> Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// The signed-in user for this process, established from a session token.
pub struct TokenSession {
    secret: String,
    claims: RwLock<Option<Claims>>,
}

impl TokenSession {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            claims: RwLock::new(None),
        }
    }

    /// Validate `token` and make its subject the current user.
    pub fn sign_in(&self, token: &str) -> Result<Uuid> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| anyhow!("Invalid session token: {}", e))?;

        let claims = token_data.claims;
        let user_id = claims.sub;
        info!("{} ({}) signed in", claims.username, user_id);

        let mut slot = self
            .claims
            .write()
            .map_err(|e| anyhow!("Session lock poisoned: {}", e))?;
        *slot = Some(claims);
        Ok(user_id)
    }

    pub fn sign_out(&self) {
        match self.claims.write() {
            Ok(mut slot) => {
                if let Some(claims) = slot.take() {
                    info!("{} ({}) signed out", claims.username, claims.sub);
                }
            }
            Err(e) => warn!("Session lock poisoned on sign out: {}", e),
        }
    }

    pub fn username(&self) -> Option<String> {
        self.claims
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().map(|c| c.username.clone()))
    }
}

impl AuthContext for TokenSession {
    fn current_user(&self) -> Option<Uuid> {
        let slot = self.claims.read().ok()?;
        let claims = slot.as_ref()?;
        // Expired sessions count as signed out
        if (claims.exp as i64) <= chrono::Utc::now().timestamp() {
            return None;
        }
        Some(claims.sub)
    }
}
