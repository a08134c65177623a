use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policy::ThresholdPolicy;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Profiled key lookup: tries `{PROFILE}_{KEY}` first, falls back to `{KEY}`.
///
/// The raw source is a closure so tests can feed a map instead of mutating
/// the process environment.
struct Source<'a> {
    profile: &'a str,
    get: &'a dyn Fn(&str) -> Option<String>,
}

impl Source<'_> {
    fn opt(&self, key: &str) -> Option<String> {
        let lookup = |k: &str| (self.get)(k).filter(|s| !s.is_empty());
        if !self.profile.is_empty() {
            if let Some(v) = lookup(&format!("{}_{}", self.profile, key)) {
                return Some(v);
            }
        }
        lookup(key)
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.opt(key).ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.opt(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub notice: NoticeConfig,
    pub dispatch: DispatchConfig,
    pub discord: DiscordConfig,
    pub schedule: ScheduleConfig,
    pub identity: IdentityConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `RENTWATCH_PROFILE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let profile = env::var("RENTWATCH_PROFILE").unwrap_or_default().to_uppercase();
        Self::from_source(&profile, &|key| env::var(key).ok())
    }

    /// Build config for a named profile from an arbitrary key lookup.
    pub fn from_source(profile: &str, get: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let p = profile.to_uppercase();
        let src = Source { profile: &p, get };
        Ok(Self {
            profile: p.clone(),
            server: ServerConfig::from_source(&src)?,
            postgres: PostgresConfig::from_source(&src)?,
            notice: NoticeConfig::from_source(&src)?,
            dispatch: DispatchConfig::from_source(&src)?,
            discord: DiscordConfig::from_source(&src),
            schedule: ScheduleConfig::from_source(&src),
            identity: IdentityConfig::from_source(&src),
        })
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:    {}:{}", self.server.host, self.server.port);
        tracing::info!("  postgres:  {}", self.postgres.redacted_url());
        tracing::info!(
            "  notice:    margin={} reminder_gate={}s contact={}",
            self.notice.margin, self.notice.reminder_gate_secs, self.notice.contact_user_id
        );
        tracing::info!(
            "  dispatch:  attempts={} delay={}ms concurrency={}",
            self.dispatch.attempts, self.dispatch.retry_delay_ms, self.dispatch.sweep_concurrency
        );
        tracing::info!(
            "  discord:   api={} token={}",
            self.discord.api_base,
            if self.discord.bot_token.is_some() { "set" } else { "(none)" }
        );
        tracing::info!(
            "  identity:  root={}",
            self.identity.root.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "(unrestricted)".into())
        );
        tracing::info!(
            "  schedule:  remind_cron={}",
            self.schedule.remind_cron.as_deref().unwrap_or("(external trigger only)")
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_source(src: &Source<'_>) -> Result<Self, ConfigError> {
        // RENT_DISCORD_BOT_PORT is the older bot's name for the listen port.
        let port = match src.opt("PORT") {
            Some(_) => src.parsed("PORT", 3001)?,
            None => src.parsed("RENT_DISCORD_BOT_PORT", 3001)?,
        };
        Ok(Self {
            host: src.or("HOST", "0.0.0.0"),
            port,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Full URL; takes precedence over the individual fields.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
    /// Deadline applied to every ledger call made by the engine.
    pub storage_timeout_secs: u64,
}

impl PostgresConfig {
    fn from_source(src: &Source<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            url: src.opt("DATABASE_URL").map(|u| u.replace('"', "")),
            host: src.or("PG_HOST", "localhost"),
            port: src.parsed("PG_PORT", 5432)?,
            database: src.or("PG_DATABASE", "rentwatch"),
            username: src.opt("PG_USERNAME"),
            password: src.opt("PG_PASSWORD"),
            ssl_mode: src.or("PG_SSL_MODE", "prefer"),
            max_connections: src.parsed("PG_MAX_CONNECTIONS", 5)?,
            storage_timeout_secs: src.parsed("STORAGE_TIMEOUT_SECS", 10)?,
        })
    }

    pub fn connection_string(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    /// Connection string with the password masked.
    pub fn redacted_url(&self) -> String {
        match &self.url {
            Some(url) => match (url.find("://"), url.rfind('@')) {
                (Some(scheme), Some(at)) if at > scheme => {
                    format!("{}://***{}", &url[..scheme], &url[at..])
                }
                _ => url.clone(),
            },
            None => format!(
                "postgres://{}:***@{}:{}/{}",
                self.username.as_deref().unwrap_or("postgres"),
                self.host,
                self.port,
                self.database
            ),
        }
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }
}

// ── Notice content & thresholds ───────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoticeConfig {
    /// Payee account number printed on the initial notice.
    pub account: String,
    /// Payee branch code printed on the initial notice.
    pub bsb: String,
    /// Messaging identity tenants should contact about issues.
    pub contact_user_id: String,
    /// Forgiveness margin in minor units.
    pub margin: i64,
    pub reminder_gate_secs: i64,
}

impl NoticeConfig {
    fn from_source(src: &Source<'_>) -> Result<Self, ConfigError> {
        let contact_user_id = match src.opt("CONTACT_USER_ID") {
            Some(id) => id,
            // Name used by the older bot deployment.
            None => src.required("DADDY_THANE_USER_ID").map_err(|_| {
                ConfigError::Missing("CONTACT_USER_ID".to_string())
            })?,
        };
        let margin: i64 = src.parsed("NOTICE_MARGIN", 1_000)?;
        if margin < 0 {
            return Err(ConfigError::Invalid {
                key: "NOTICE_MARGIN".into(),
                value: margin.to_string(),
                reason: "must not be negative".into(),
            });
        }
        Ok(Self {
            account: src.required("ACCOUNT")?,
            bsb: src.required("BSB")?,
            contact_user_id,
            margin,
            reminder_gate_secs: src.parsed("REMINDER_GATE_SECS", crate::accrual::SECONDS_IN_DAY)?,
        })
    }

    pub fn policy(&self) -> ThresholdPolicy {
        ThresholdPolicy::new(self.margin).with_reminder_gate(self.reminder_gate_secs)
    }
}

// ── Dispatch ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Total send attempts per message, including the first.
    pub attempts: u32,
    pub retry_delay_ms: u64,
    /// Maximum concurrent sends during a reminder sweep.
    pub sweep_concurrency: usize,
}

impl DispatchConfig {
    fn from_source(src: &Source<'_>) -> Result<Self, ConfigError> {
        let attempts: u32 = src.parsed("DISPATCH_ATTEMPTS", 3)?;
        let sweep_concurrency: usize = src.parsed("SWEEP_CONCURRENCY", 4)?;
        if attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "DISPATCH_ATTEMPTS".into(),
                value: "0".into(),
                reason: "at least one attempt is required".into(),
            });
        }
        if sweep_concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "SWEEP_CONCURRENCY".into(),
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(Self {
            attempts,
            retry_delay_ms: src.parsed("DISPATCH_RETRY_DELAY_MS", 1_000)?,
            sweep_concurrency,
        })
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

// ── Discord ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(skip_serializing)]
    pub bot_token: Option<String>,
    pub api_base: String,
}

impl DiscordConfig {
    fn from_source(src: &Source<'_>) -> Self {
        Self {
            bot_token: src.opt("BOT_TOKEN"),
            api_base: src.or("DISCORD_API_BASE", "https://discord.com/api/v10"),
        }
    }
}

// ── Schedule ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Cron expression for in-process reminder sweeps. `None` leaves
    /// sweeps to the external trigger.
    pub remind_cron: Option<String>,
}

impl ScheduleConfig {
    fn from_source(src: &Source<'_>) -> Self {
        Self {
            remind_cron: src.opt("REMIND_CRON"),
        }
    }
}

// ── Identity records ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// When set, identity record paths must resolve inside this directory.
    pub root: Option<PathBuf>,
}

impl IdentityConfig {
    fn from_source(src: &Source<'_>) -> Self {
        Self {
            root: src.opt("IDENTITY_DIR").map(PathBuf::from),
        }
    }
}
