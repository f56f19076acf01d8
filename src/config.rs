use std::net::SocketAddr;

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    pub tmdb_access_token: String,
    pub tmdb_api_key: String,
    pub tmdb_base_url: String,
    pub tmdb_rps: u32,
    pub max_concurrent: usize,
    pub http_timeout_secs: u64,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 =
            std::env::var("PORT").unwrap_or_else(|_| "5000".to_string()).parse().context("PORT")?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://reelrate.db?mode=rwc".to_string());

        let tmdb_access_token = std::env::var("TMDB_ACCESS_TOKEN").unwrap_or_default();
        let tmdb_api_key = std::env::var("TMDB_API_KEY").unwrap_or_default();
        let tmdb_base_url = std::env::var("TMDB_BASE_URL")
            .unwrap_or_else(|_| "https://api.themoviedb.org/3".to_string());

        let tmdb_rps: u32 =
            std::env::var("TMDB_RPS").ok().and_then(|s| s.parse().ok()).unwrap_or(20);

        let max_concurrent: usize =
            std::env::var("MAX_CONCURRENT_REQUESTS").ok().and_then(|s| s.parse().ok()).unwrap_or(8);

        let http_timeout_secs: u64 =
            std::env::var("HTTP_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()).unwrap_or(30);

        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if jwt_secret.trim().is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }

        let jwt_ttl_hours: i64 =
            std::env::var("JWT_TTL_HOURS").ok().and_then(|s| s.parse().ok()).unwrap_or(24 * 30);

        Ok(Self {
            addr: format!("{host}:{port}").parse().context("HOST/PORT")?,
            database_url,
            tmdb_access_token,
            tmdb_api_key,
            tmdb_base_url,
            tmdb_rps,
            max_concurrent,
            http_timeout_secs,
            jwt_secret,
            jwt_ttl_hours,
        })
    }
}
