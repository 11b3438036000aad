use std::{
    collections::HashMap, env, fs, io::ErrorKind, ops::Deref, path::PathBuf,
    str::FromStr, sync::Arc, time::Duration,
};

use anyhow::Context;
use chrono::NaiveTime;
use chrono_tz::Tz;
use tracing::warn;

use crate::{
    dao::SubscriptionStore,
    error::Error,
    handler::send_push::PushDispatcher,
    helpers::{parse_list, parse_message_table},
    provider::{PushTransport, VapidKeys, WebPush},
    types::Urgency,
};

#[derive(Debug)]
pub struct AppState<T>(Arc<T>);

impl<T> AppState<T> {
    pub fn new(state: T) -> AppState<T> {
        AppState(Arc::new(state))
    }
}

impl<T> Clone for AppState<T> {
    fn clone(&self) -> AppState<T> {
        AppState(Arc::clone(&self.0))
    }
}

impl<T> Deref for AppState<T> {
    type Target = Arc<T>;

    fn deref(&self) -> &Arc<T> {
        &self.0
    }
}

pub struct State {
    pub config: Config,
    pub store: Arc<SubscriptionStore>,
    pub dispatcher: PushDispatcher,
}

impl State {
    pub fn new(config: Config) -> Result<State, Error> {
        let transport = match &config.vapid {
            Some(keys) => {
                let web_push = WebPush::new(&config, keys)?;
                Some(Arc::new(web_push) as Arc<dyn PushTransport>)
            },
            None => {
                warn!("VAPID keys are not configured, push delivery is disabled");
                None
            },
        };

        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(
        config: Config,
        transport: Option<Arc<dyn PushTransport>>,
    ) -> State {
        let store = Arc::new(SubscriptionStore::new(
            config.subscriptions_file.clone(),
            Duration::from_secs(config.store_lock_timeout),
        ));
        let dispatcher = PushDispatcher::new(store.clone(), transport, &config);

        State {
            config,
            store,
            dispatcher,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub vapid_public_key: Option<String>,
    pub vapid: Option<VapidKeys>,
    pub vapid_subject: String,
    pub subscriptions_file: PathBuf,
    pub store_lock_timeout: u64,
    pub messages: HashMap<String, String>,
    pub default_message: String,
    pub notification: Notification,
    pub notification_time: NaiveTime,
    pub timezone: Tz,
    pub enable_scheduler: bool,
    pub timeout: u64,
    pub max_tasks: usize,
    pub push_ttl: i64,
    pub push_urgency: Urgency,
    pub status_code_to_delete: Vec<u16>,
}

impl Config {
    /// Reminder text for `user`, falling back to the generic one.
    pub fn message_for(&self, user: &str) -> &str {
        self.messages
            .get(user)
            .map(String::as_str)
            .unwrap_or(&self.default_message)
    }
}

pub fn get_configuration() -> Result<Config, Error> {
    parse_configuration(|key| env::var(key).ok())
}

/// Builds the configuration from a key lookup; unset and blank values fall
/// back to defaults, except the VAPID keys which stay unset.
pub fn parse_configuration<F>(lookup: F) -> Result<Config, Error>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str, default: &str| -> String {
        lookup(key)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| default.to_owned())
    };
    let optional = |key: &str| -> Option<String> {
        lookup(key)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    };

    let server_host = get("SERVER_HOST", "0.0.0.0");
    let port: u16 = get("PORT", "8080").parse().context("PORT")?;
    let allowed_origins = parse_list(&get("ALLOWED_ORIGINS", "*"));

    let vapid_public_key = optional("VAPID_PUBLIC_KEY");
    let vapid = match (optional("VAPID_PRIVATE_KEY"), &vapid_public_key) {
        (Some(private_key), Some(public_key)) => {
            Some(VapidKeys::from_base64(&private_key, public_key)?)
        },
        (None, None) => None,
        _ => {
            warn!("Only one of VAPID_PRIVATE_KEY / VAPID_PUBLIC_KEY is set");
            None
        },
    };
    let vapid_subject = get("VAPID_SUBJECT", "mailto:admin@localhost");

    let subscriptions_file =
        PathBuf::from(get("SUBSCRIPTIONS_FILE", "push_subscriptions.json"));
    let store_lock_timeout: u64 = get("STORE_LOCK_TIMEOUT", "5")
        .parse()
        .context("STORE_LOCK_TIMEOUT")?;

    let messages = parse_message_table(&get("PUSH_MESSAGES", ""));
    let default_message =
        get("DEFAULT_MESSAGE", "Don't forget to mark your habits today!");

    let notification = Notification {
        title: get("NOTIFICATION_TITLE", "Habit Tracker"),
        icon: get("NOTIFICATION_ICON", "/icons/icon.svg"),
        badge: get("NOTIFICATION_BADGE", "/icons/icon.svg"),
        tag: get("NOTIFICATION_TAG", "habits-reminder"),
    };

    let notification_time =
        NaiveTime::parse_from_str(&get("NOTIFICATION_TIME", "22:00"), "%H:%M")?;
    let timezone_name = get("NOTIFICATION_TIMEZONE", "Europe/Moscow");
    let timezone = Tz::from_str(&timezone_name).map_err(|e| {
        Error::ConfigurationError(format!(
            "NOTIFICATION_TIMEZONE {}: {}",
            timezone_name, e
        ))
    })?;
    let enable_scheduler = get("ENABLE_SCHEDULER", "true").parse()?;

    let timeout: u64 = get("TIMEOUT", "10").parse().context("TIMEOUT")?;
    let max_tasks: usize = get("MAX_TASKS", "16").parse().context("MAX_TASKS")?;
    if timeout == 0 || max_tasks == 0 {
        return Err(Error::ConfigurationError(String::from(
            "TIMEOUT and MAX_TASKS must be greater than zero",
        )));
    }

    let push_ttl: i64 = get("PUSH_TTL", "86400").parse().context("PUSH_TTL")?;
    let push_urgency = Urgency::from_str(&get("PUSH_URGENCY", "normal"))?;

    let mut status_code_to_delete = vec![];
    for code in parse_list(&get("STATUS_CODE_TO_DELETE", "404,410")) {
        status_code_to_delete.push(code.parse::<u16>()?);
    }

    let config = Config {
        server_host,
        port,
        allowed_origins,
        vapid_public_key,
        vapid,
        vapid_subject,
        subscriptions_file,
        store_lock_timeout,
        messages,
        default_message,
        notification,
        notification_time,
        timezone,
        enable_scheduler,
        timeout,
        max_tasks,
        push_ttl,
        push_urgency,
        status_code_to_delete,
    };

    Ok(config)
}

/// Loads `KEY=VALUE` lines from `.env` in the working directory into the
/// process environment. A missing file is not an error.
pub fn set_configuration() -> Result<(), Error> {
    let config_file: &str = ".env";

    let config_string = match fs::read_to_string(config_file) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    for (key, value) in parse_config_string(&config_string) {
        env::set_var(key, value);
    }

    Ok(())
}

fn parse_config_string(config: &str) -> Vec<(String, String)> {
    config
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            (key.trim().to_owned(), value.to_owned())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::BASE64_URL;
    use base64::Engine;
    use chrono::Timelike;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, Error> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        parse_configuration(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.allowed_origins, vec!["*"]);
        assert!(config.vapid.is_none());
        assert!(config.vapid_public_key.is_none());
        assert_eq!(config.notification_time.hour(), 22);
        assert_eq!(config.notification_time.minute(), 0);
        assert_eq!(config.timezone, chrono_tz::Europe::Moscow);
        assert_eq!(config.status_code_to_delete, vec![404, 410]);
        assert_eq!(config.push_urgency, Urgency::Normal);
        assert!(config.enable_scheduler);
        assert_eq!(
            config.subscriptions_file,
            PathBuf::from("push_subscriptions.json")
        );
    }

    #[test]
    fn test_message_table_and_fallback() {
        let config = config_from(&[
            ("PUSH_MESSAGES", "(gleb,Hi gleb),(dasha,Hi dasha)"),
            ("DEFAULT_MESSAGE", "Generic"),
        ])
        .unwrap();

        assert_eq!(config.message_for("gleb"), "Hi gleb");
        assert_eq!(config.message_for("dasha"), "Hi dasha");
        assert_eq!(config.message_for("someone"), "Generic");
    }

    #[test]
    fn test_schedule_settings() {
        let config = config_from(&[
            ("NOTIFICATION_TIME", "07:30"),
            ("NOTIFICATION_TIMEZONE", "Europe/Berlin"),
        ])
        .unwrap();
        assert_eq!(config.notification_time.hour(), 7);
        assert_eq!(config.notification_time.minute(), 30);
        assert_eq!(config.timezone, chrono_tz::Europe::Berlin);

        assert!(config_from(&[("NOTIFICATION_TIMEZONE", "Mars/Base")]).is_err());
        assert!(config_from(&[("NOTIFICATION_TIME", "25:00")]).is_err());
    }

    #[test]
    fn test_malformed_vapid_key_is_configuration_error() {
        let public = BASE64_URL.encode([4u8; 65]);
        let err = config_from(&[
            ("VAPID_PRIVATE_KEY", "c2hvcnQ"),
            ("VAPID_PUBLIC_KEY", public.as_str()),
        ])
        .unwrap_err();

        assert!(matches!(err, Error::ConfigurationError(_)), "{}", err);
    }

    #[test]
    fn test_single_vapid_key_disables_signing() {
        let public = BASE64_URL.encode([4u8; 65]);
        let config = config_from(&[("VAPID_PUBLIC_KEY", public.as_str())]).unwrap();

        assert!(config.vapid.is_none());
        assert_eq!(config.vapid_public_key.as_deref(), Some(public.as_str()));
    }

    #[test]
    fn test_rejects_zero_limits() {
        assert!(config_from(&[("MAX_TASKS", "0")]).is_err());
        assert!(config_from(&[("TIMEOUT", "0")]).is_err());
    }

    #[test]
    fn test_parse_config_string() {
        let parsed = parse_config_string(
            "# comment\nVAPID_SUBJECT=mailto:me@example.com\n\nPUSH_MESSAGES=\"(a,b=c)\"\nbroken line\n",
        );

        assert_eq!(
            parsed,
            vec![
                (
                    String::from("VAPID_SUBJECT"),
                    String::from("mailto:me@example.com")
                ),
                (String::from("PUSH_MESSAGES"), String::from("(a,b=c)")),
            ]
        );
    }
}
