//! Environment-driven configuration.

use std::env;
use std::time::Duration;

use tracing::warn;

/// Window inside which a repeated idempotency key replays the cached response.
pub const IDEMPOTENCY_TTL: Duration = Duration::from_secs(5 * 60);
/// How often the background sweep evicts expired idempotency records.
pub const IDEMPOTENCY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

const DEFAULT_SEED: &str = "DEFAULT_SEED-25";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub nats_url: Option<String>,
    /// Deployment seed: source of both the platform-fee surcharge and the
    /// HMAC signing secret for idempotent response replay.
    pub platform_seed: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let platform_seed = match env::var("PLATFORM_SEED") {
            Ok(seed) => seed,
            Err(_) => {
                warn!("PLATFORM_SEED is not set; fee surcharge and response signatures use the insecure default");
                DEFAULT_SEED.to_string()
            }
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8084".to_string())
                .parse()?,
            nats_url: env::var("NATS_URL").ok(),
            platform_seed,
        })
    }

    pub fn signing_secret(&self) -> &[u8] {
        self.platform_seed.as_bytes()
    }
}
