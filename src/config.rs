use std::env;
use std::time::Duration;

pub const DEFAULT_EMAIL_DAILY_LIMIT: i64 = 100;
pub const DEFAULT_RECONCILE_POLL_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_RECONCILE_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_CURRENCY: &str = "usd";
pub const DEFAULT_RATE_LIMITER_MILLISECONDS: u64 = 200;
pub const DEFAULT_RATE_LIMITER_BURST: u32 = 20;

#[derive(Debug, Clone)]
pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secret: String,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub from: String,
    pub admin_alert_email: String,
    pub daily_limit: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcileSettings {
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_RECONCILE_POLL_INTERVAL_MS),
            max_attempts: DEFAULT_RECONCILE_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    pub per_millisecond: u64,
    pub burst: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub frontend_origin: String,
    pub admin_api_token: String,
    pub stripe: StripeSettings,
    pub email: EmailSettings,
    pub reconcile: ReconcileSettings,
    pub rate_limit: RateLimitSettings,
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok(); // Load .env file

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let frontend_origin = env::var("FRONTEND_ORIGIN").expect("FRONTEND_ORIGIN must be set");
        let admin_api_token = env::var("ADMIN_API_TOKEN").expect("ADMIN_API_TOKEN must be set");

        let stripe = StripeSettings {
            secret_key: env::var("STRIPE_SECRET_KEY").expect("STRIPE_SECRET_KEY must be set"),
            webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                .expect("STRIPE_WEBHOOK_SECRET must be set"),
            currency: env::var("CURRENCY")
                .ok()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
                .to_ascii_lowercase(),
        };

        let email = EmailSettings {
            from: env::var("EMAIL_FROM").expect("EMAIL_FROM must be set"),
            admin_alert_email: env::var("ADMIN_ALERT_EMAIL")
                .expect("ADMIN_ALERT_EMAIL must be set"),
            daily_limit: parse_or("EMAIL_DAILY_LIMIT", DEFAULT_EMAIL_DAILY_LIMIT),
        };

        let reconcile = ReconcileSettings {
            poll_interval: Duration::from_millis(parse_or(
                "RECONCILE_POLL_INTERVAL_MS",
                DEFAULT_RECONCILE_POLL_INTERVAL_MS,
            )),
            max_attempts: parse_or("RECONCILE_MAX_ATTEMPTS", DEFAULT_RECONCILE_MAX_ATTEMPTS),
        };

        let rate_limit = RateLimitSettings {
            // Default: 200ms/token (~5 req/sec)
            per_millisecond: parse_or(
                "RATE_LIMITER_MILLISECONDS",
                DEFAULT_RATE_LIMITER_MILLISECONDS,
            ),
            burst: parse_or("RATE_LIMITER_BURST", DEFAULT_RATE_LIMITER_BURST),
        };

        Config {
            database_url,
            frontend_origin,
            admin_api_token,
            stripe,
            email,
            reconcile,
            rate_limit,
        }
    }
}
