use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub session_ttl_hours: i64,
    /// Serve 503 MAINTENANCE on every /api route (except /health) when set.
    pub maintenance_mode: bool,
    /// Single source of truth for the development auth bypass.
    /// Requests without a bearer token act as a fixed dev admin identity.
    /// Must be set explicitly in the environment; never inferred.
    pub dev_auth_bypass: bool,
    pub payment_secret_key: Option<String>,
    pub payment_publishable_key: Option<String>,
    pub payment_api_base: String,
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let session_ttl_hours = env::var("SESSION_TTL_HOURS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(24);

        let payment_secret_key = env::var("PAYMENT_SECRET_KEY").ok().filter(|s| !s.is_empty());
        let payment_publishable_key = env::var("PAYMENT_PUBLISHABLE_KEY")
            .ok()
            .filter(|s| !s.is_empty());
        let payment_api_base = env::var("PAYMENT_API_BASE")
            .unwrap_or_else(|_| "https://api.stripe.com/v1".to_string());

        Ok(Self {
            database_url,
            bind_addr,
            session_ttl_hours,
            maintenance_mode: env_flag("MAINTENANCE_MODE"),
            dev_auth_bypass: env_flag("DEV_AUTH_BYPASS"),
            payment_secret_key,
            payment_publishable_key,
            payment_api_base,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::env_flag;

    #[test]
    fn flag_parsing() {
        unsafe {
            std::env::set_var("PTLINK_TEST_FLAG", "true");
        }
        assert!(env_flag("PTLINK_TEST_FLAG"));
        unsafe {
            std::env::set_var("PTLINK_TEST_FLAG", "0");
        }
        assert!(!env_flag("PTLINK_TEST_FLAG"));
        assert!(!env_flag("PTLINK_TEST_FLAG_UNSET"));
    }
}
