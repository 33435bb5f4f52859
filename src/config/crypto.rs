use anyhow::Result;
use std::env;

pub const MIN_SECRET_LEN: usize = 32;

/// Secret behind the unsubscribe-link tokens.
#[derive(Clone)]
pub struct EmailTokenConfig {
    pub secret: String,
}

impl std::fmt::Debug for EmailTokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailTokenConfig")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl EmailTokenConfig {
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return Err(anyhow::anyhow!(
                "EMAIL_TOKEN_SECRET must be at least {} characters",
                MIN_SECRET_LEN
            ));
        }
        Ok(Self { secret })
    }

    pub fn from_env() -> Result<Self> {
        let secret = env::var("EMAIL_TOKEN_SECRET")
            .map_err(|_| anyhow::anyhow!("EMAIL_TOKEN_SECRET environment variable must be set"))?;
        Self::new(secret)
    }
}
