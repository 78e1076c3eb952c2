use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreditsConfig {
    /// Upper bound deducted up front before a worker call.
    pub reservation: i64,
    pub topup: i64,
    pub signup: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Base URL objects are publicly served from, without trailing slash.
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub github: GithubConfig,
    pub worker: WorkerConfig,
    pub credits: CreditsConfig,
    pub storage: StorageConfig,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: env_or("JWT_ISSUER", "shards"),
            audience: env_or("JWT_AUDIENCE", "shards-users"),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: env_parse("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };
        let github = GithubConfig {
            client_id: std::env::var("GITHUB_CLIENT_ID")?,
            client_secret: std::env::var("GITHUB_CLIENT_SECRET")?,
            redirect_url: env_or(
                "GITHUB_REDIRECT_URL",
                "http://localhost:8080/api/auth/github/callback",
            ),
        };
        let worker = WorkerConfig {
            url: std::env::var("WORKER_URL")
                .or_else(|_| std::env::var("PYTHON_WORKER_URL"))
                .unwrap_or_else(|_| "http://localhost:8000".into())
                .trim_end_matches('/')
                .to_string(),
            api_key: std::env::var("WORKER_API_KEY")?,
            timeout_secs: env_parse("WORKER_TIMEOUT_SECS", 120),
        };
        let credits = CreditsConfig {
            reservation: env_parse("AI_CREDIT_RESERVATION", 4000),
            topup: env_parse("AI_CREDITS_TOPUP", 10),
            signup: env_parse("AI_SIGNUP_CREDITS", 10_000),
        };
        let storage = StorageConfig {
            endpoint: std::env::var("STORAGE_ENDPOINT")?,
            bucket: env_or("STORAGE_BUCKET", "shard-image-uploads"),
            access_key: std::env::var("STORAGE_ACCESS_KEY")?,
            secret_key: std::env::var("STORAGE_SECRET_KEY")?,
            region: env_or("STORAGE_REGION", "us-east-1"),
            public_url: std::env::var("STORAGE_PUBLIC_URL")?
                .trim_end_matches('/')
                .to_string(),
        };
        Ok(Self {
            database_url,
            jwt,
            github,
            worker,
            credits,
            storage,
        })
    }
}
