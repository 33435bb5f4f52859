use super::string_env;
use serde::Serialize;
use std::env;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SocialLink {
    pub name: String,
    pub url: String,
    pub icon: String,
}

/// Branding and link targets rendered into every digest.
#[derive(Debug, Clone)]
pub struct DigestConfig {
    pub platform_name: String,
    pub contact_mailing_address: String,
    pub logo_url: String,
    pub digest_logo_url: String,
    pub learning_mfe_url: String,
    pub account_mfe_url: String,
    pub learner_home_mfe_url: String,
    pub icon_base_url: String,
    pub social_links: Vec<SocialLink>,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            platform_name: "Open edX".to_string(),
            contact_mailing_address: String::new(),
            logo_url: String::new(),
            digest_logo_url: String::new(),
            learning_mfe_url: "http://localhost:2000".to_string(),
            account_mfe_url: "http://localhost:1997".to_string(),
            learner_home_mfe_url: "http://localhost:1996".to_string(),
            icon_base_url: "http://localhost:18000/static/images/notifications".to_string(),
            social_links: Vec::new(),
        }
    }
}

impl DigestConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let social_links = match env::var("SOCIAL_MEDIA_LINKS") {
            Ok(raw) => parse_social_links(&raw).unwrap_or_else(|err| {
                tracing::warn!("Invalid SOCIAL_MEDIA_LINKS '{}': {}", raw, err);
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };

        Self {
            platform_name: string_env("PLATFORM_NAME", &defaults.platform_name),
            contact_mailing_address: string_env(
                "CONTACT_MAILING_ADDRESS",
                &defaults.contact_mailing_address,
            ),
            logo_url: string_env("LOGO_URL", &defaults.logo_url),
            digest_logo_url: string_env("NOTIFICATION_DIGEST_LOGO", &defaults.digest_logo_url),
            learning_mfe_url: trim_slash(string_env(
                "LEARNING_MICROFRONTEND_URL",
                &defaults.learning_mfe_url,
            )),
            account_mfe_url: trim_slash(string_env(
                "ACCOUNT_MICROFRONTEND_URL",
                &defaults.account_mfe_url,
            )),
            learner_home_mfe_url: trim_slash(string_env(
                "LEARNER_HOME_MICROFRONTEND_URL",
                &defaults.learner_home_mfe_url,
            )),
            icon_base_url: trim_slash(string_env(
                "NOTIFICATION_ICON_BASE_URL",
                &defaults.icon_base_url,
            )),
            social_links,
        }
    }

    /// Where the digest footer sends users to manage preferences.
    pub fn notification_settings_url(&self) -> String {
        format!("{}/#notifications", self.account_mfe_url)
    }
}

fn trim_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

/// Format: `name=url|icon,name=url|icon`. The icon part is optional.
fn parse_social_links(raw: &str) -> Result<Vec<SocialLink>, String> {
    let mut links = Vec::new();
    for item in raw.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let (name, rest) = item
            .split_once('=')
            .ok_or_else(|| format!("invalid item '{}', expected name=url|icon", item))?;
        let (url, icon) = match rest.split_once('|') {
            Some((url, icon)) => (url.trim(), icon.trim()),
            None => (rest.trim(), ""),
        };
        if name.trim().is_empty() || url.is_empty() {
            return Err(format!("invalid item '{}', name and url are required", item));
        }
        links.push(SocialLink {
            name: name.trim().to_string(),
            url: url.to_string(),
            icon: icon.to_string(),
        });
    }
    Ok(links)
}
