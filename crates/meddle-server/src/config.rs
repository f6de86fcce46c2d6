use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

use meddle_push::FcmConfig;
use meddle_scheduler::SchedulerConfig;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub scheduler: SchedulerConfig,
    pub push: FcmConfig,
    pub icon_url: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = var("MEDDLE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("MEDDLE_JWT_SECRET is unset or still a placeholder");
        }

        let defaults = SchedulerConfig::default();
        let secs = |key: &str, default: Duration| {
            parse_or(&var, key, default.as_secs()).map(Duration::from_secs)
        };
        let scheduler = SchedulerConfig {
            reconcile_interval: secs(
                "MEDDLE_RECONCILE_INTERVAL_SECS",
                defaults.reconcile_interval,
            )?,
            due_soon_interval: secs("MEDDLE_DUE_SOON_INTERVAL_SECS", defaults.due_soon_interval)?,
            align_due_soon: parse_or(&var, "MEDDLE_DUE_SOON_ALIGN", defaults.align_due_soon)?,
            rollover_hour: parse_or(&var, "MEDDLE_ROLLOVER_HOUR", defaults.rollover_hour)?,
            max_concurrent_dispatches: parse_or(
                &var,
                "MEDDLE_MAX_CONCURRENT_DISPATCHES",
                defaults.max_concurrent_dispatches,
            )?,
        };
        scheduler.validate()?;

        let push_defaults = FcmConfig::default();
        let push = FcmConfig {
            endpoint: var("MEDDLE_FCM_ENDPOINT").unwrap_or(push_defaults.endpoint),
            project_id: var("MEDDLE_FCM_PROJECT_ID"),
            credentials: var("MEDDLE_FCM_CREDENTIALS")
                .or_else(|| var("GOOGLE_APPLICATION_CREDENTIALS"))
                .map(PathBuf::from),
            timeout: secs("MEDDLE_PUSH_TIMEOUT_SECS", push_defaults.timeout)?,
        };

        Ok(Self {
            host: var("MEDDLE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&var, "MEDDLE_PORT", 3000)?,
            db_path: var("MEDDLE_DB_PATH").unwrap_or_else(|| "meddle.db".into()).into(),
            jwt_secret,
            scheduler,
            push,
            icon_url: var("MEDDLE_PUSH_ICON_URL"),
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config = config(&[("MEDDLE_JWT_SECRET", "s3cret")]).unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("meddle.db"));
        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert_eq!(config.push.endpoint, "https://fcm.googleapis.com");
        assert!(config.push.project_id.is_none());
        assert!(config.push.credentials.is_none());
        assert!(config.icon_url.is_none());
    }

    #[test]
    fn placeholder_secret_is_refused() {
        assert!(config(&[]).is_err());
        assert!(config(&[("MEDDLE_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn overrides_are_parsed_and_validated() {
        let config = config(&[
            ("MEDDLE_JWT_SECRET", "s3cret"),
            ("MEDDLE_ROLLOVER_HOUR", "7"),
            ("MEDDLE_DUE_SOON_ALIGN", "false"),
            ("MEDDLE_RECONCILE_INTERVAL_SECS", "30"),
        ])
        .unwrap();
        assert_eq!(config.scheduler.rollover_hour, 7);
        assert!(!config.scheduler.align_due_soon);
        assert_eq!(config.scheduler.reconcile_interval, Duration::from_secs(30));

        let bad = ServerConfig::from_lookup(|key| match key {
            "MEDDLE_JWT_SECRET" => Some("s3cret".into()),
            "MEDDLE_ROLLOVER_HOUR" => Some("24".into()),
            _ => None,
        });
        assert!(bad.is_err());

        let garbage = ServerConfig::from_lookup(|key| match key {
            "MEDDLE_JWT_SECRET" => Some("s3cret".into()),
            "MEDDLE_PORT" => Some("eighty".into()),
            _ => None,
        });
        assert!(garbage.is_err());
    }

    #[test]
    fn fcm_settings_come_from_env() {
        let fallback = config(&[
            ("MEDDLE_JWT_SECRET", "s3cret"),
            ("MEDDLE_FCM_PROJECT_ID", "meddle-prod"),
            ("GOOGLE_APPLICATION_CREDENTIALS", "/etc/meddle/sa.json"),
            ("MEDDLE_PUSH_TIMEOUT_SECS", "3"),
        ])
        .unwrap();
        assert_eq!(fallback.push.project_id.as_deref(), Some("meddle-prod"));
        assert_eq!(fallback.push.credentials, Some(PathBuf::from("/etc/meddle/sa.json")));
        assert_eq!(fallback.push.timeout, Duration::from_secs(3));

        let explicit = config(&[
            ("MEDDLE_JWT_SECRET", "s3cret"),
            ("MEDDLE_FCM_CREDENTIALS", "/run/secrets/fcm.json"),
            ("GOOGLE_APPLICATION_CREDENTIALS", "/etc/meddle/sa.json"),
        ])
        .unwrap();
        assert_eq!(explicit.push.credentials, Some(PathBuf::from("/run/secrets/fcm.json")));
    }
}
