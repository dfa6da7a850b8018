use crate::engine::EngineSettings;
use crate::engine::challenge::ComebackTrigger;
use crate::engine::time::{DayPolicy, MAX_UTC_OFFSET_MINUTES};
use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveTime;
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const APP_DIR: &str = ".MindTrack";
const CONFIG_FILE: &str = "config.json";
const RECOMMENDATIONS_FILE: &str = "recommendations.json";
const DEFAULT_REPORT_TIME: &str = "21:00";
pub const DEFAULT_API_PORT: u16 = 7891;
pub const AI_KEY_ENV: &str = "MINDTRACK_AI_API_KEY";
const MIN_AI_TIMEOUT_SECONDS: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: PathBuf,
    pub report_dir: PathBuf,
    pub recommendations_path: PathBuf,
    pub api_port: u16,
    pub report_time: String,
    pub utc_offset_minutes: i32,
    pub comeback_trigger: ComebackTrigger,
    pub default_user: Option<String>,
    pub ai_enabled: bool,
    pub ai_api_key: Option<String>,
    pub ai_api_base_url: String,
    pub ai_model: String,
    pub ai_timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        let root = default_root_dir();

        Self {
            db_path: root.join("db").join("mindtrack.db"),
            report_dir: default_report_dir(),
            recommendations_path: root.join(RECOMMENDATIONS_FILE),
            api_port: DEFAULT_API_PORT,
            report_time: DEFAULT_REPORT_TIME.to_string(),
            utc_offset_minutes: 0,
            comeback_trigger: ComebackTrigger::default(),
            default_user: None,
            ai_enabled: false,
            ai_api_key: None,
            ai_api_base_url: "https://api.openai.com/v1".to_string(),
            ai_model: "gpt-4o-mini".to_string(),
            ai_timeout_seconds: 20,
        }
    }
}

impl Config {
    pub fn root_dir() -> Result<PathBuf> {
        Ok(default_root_dir())
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(default_root_dir().join(CONFIG_FILE))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.day_policy()?;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        set_mode_600(config_path)?;

        Ok(())
    }

    pub fn ensure_bootstrap_files(&self) -> Result<()> {
        let root = Self::root_dir()?;
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create root directory: {}", root.display()))?;

        if let Some(parent) = self.db_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        fs::create_dir_all(&self.report_dir).with_context(|| {
            format!(
                "Failed to create report directory: {}",
                self.report_dir.as_path().display()
            )
        })?;

        if !self.recommendations_path.exists() {
            if let Some(parent) = self.recommendations_path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create catalog directory: {}", parent.display())
                })?;
            }
            fs::write(
                &self.recommendations_path,
                include_str!("../assets/recommendations.json"),
            )
            .with_context(|| {
                format!(
                    "Failed to create default recommendation catalog: {}",
                    self.recommendations_path.display()
                )
            })?;
            set_mode_600(&self.recommendations_path)?;
        }

        Ok(())
    }

    pub fn parse_report_time(&self) -> Result<NaiveTime> {
        parse_hhmm(&self.report_time)
    }

    pub fn day_policy(&self) -> Result<DayPolicy> {
        DayPolicy::from_offset_minutes(self.utc_offset_minutes)
    }

    pub fn engine_settings(&self) -> Result<EngineSettings> {
        Ok(EngineSettings {
            policy: self.day_policy()?,
            trigger: self.comeback_trigger,
        })
    }

    /// Config value first, then the environment.
    pub fn resolved_ai_key(&self) -> Option<String> {
        self.ai_api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| {
                std::env::var(AI_KEY_ENV)
                    .ok()
                    .filter(|key| !key.trim().is_empty())
            })
    }

    /// Explicit `--user` wins over `default_user`.
    pub fn resolve_user(&self, explicit: Option<&str>) -> Result<String> {
        explicit
            .map(str::to_string)
            .or_else(|| self.default_user.clone())
            .map(|user| user.trim().to_string())
            .filter(|user| !user.is_empty())
            .ok_or_else(|| {
                anyhow!("No user given. Pass --user or run `mindtrack config set default_user <id>`")
            })
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let normalized = normalize_config_key(key);

        match normalized {
            "db_path" => {
                self.db_path = expand_home(value);
            }
            "report_dir" => {
                self.report_dir = expand_home(value);
            }
            "recommendations_path" => {
                self.recommendations_path = expand_home(value);
            }
            "api_port" => {
                self.api_port = value
                    .parse::<u16>()
                    .map_err(|_| anyhow!("api_port must be a number"))?;
            }
            "report_time" => {
                parse_hhmm(value)?;
                self.report_time = value.to_string();
            }
            "utc_offset_minutes" => {
                let parsed = value
                    .trim()
                    .parse::<i32>()
                    .map_err(|_| anyhow!("utc_offset_minutes must be a whole number"))?;
                if parsed.unsigned_abs() > MAX_UTC_OFFSET_MINUTES.unsigned_abs() {
                    bail!("utc_offset_minutes must be within ±{MAX_UTC_OFFSET_MINUTES}");
                }
                self.utc_offset_minutes = parsed;
            }
            "comeback_trigger" => {
                self.comeback_trigger = ComebackTrigger::parse(value)
                    .ok_or_else(|| anyhow!("comeback_trigger must be zero_streak or chain_break"))?;
            }
            "default_user" => {
                let trimmed = value.trim();
                self.default_user = (!trimmed.is_empty()).then(|| trimmed.to_string());
            }
            "ai_enabled" => {
                self.ai_enabled = value
                    .parse::<bool>()
                    .map_err(|_| anyhow!("ai_enabled must be true/false"))?;
            }
            "ai_api_key" => {
                self.ai_api_key = (!value.trim().is_empty()).then_some(value.to_string());
            }
            "ai_api_base_url" => {
                self.ai_api_base_url = value.trim().trim_end_matches('/').to_string();
            }
            "ai_model" => {
                self.ai_model = value.trim().to_string();
            }
            "ai_timeout_seconds" => {
                self.ai_timeout_seconds = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("ai_timeout_seconds must be a number"))?
                    .max(MIN_AI_TIMEOUT_SECONDS);
            }
            _ => {
                bail!(
                    "Unsupported config key: {key}. Supported keys: db_path|db.path, report_dir|report.dir, recommendations_path|recommendations.path, api_port|api.port, report_time|report.time, utc_offset_minutes|day.utc_offset_minutes, comeback_trigger|comeback.trigger, default_user|user.default, ai_enabled|ai.enabled, ai_api_key|ai.api_key, ai_api_base_url|ai.base_url, ai_model|ai.model, ai_timeout_seconds|ai.timeout_seconds"
                );
            }
        }

        if normalized == "report_dir" {
            fs::create_dir_all(&self.report_dir).with_context(|| {
                format!(
                    "Failed to create report directory: {}",
                    self.report_dir.display()
                )
            })?;
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        match normalize_config_key(key) {
            "db_path" => Some(self.db_path.display().to_string()),
            "report_dir" => Some(self.report_dir.display().to_string()),
            "recommendations_path" => Some(self.recommendations_path.display().to_string()),
            "api_port" => Some(self.api_port.to_string()),
            "report_time" => Some(self.report_time.clone()),
            "utc_offset_minutes" => Some(self.utc_offset_minutes.to_string()),
            "comeback_trigger" => Some(self.comeback_trigger.as_str().to_string()),
            "default_user" => Some(
                self.default_user
                    .clone()
                    .unwrap_or_else(|| "not_set".to_string()),
            ),
            "ai_enabled" => Some(self.ai_enabled.to_string()),
            "ai_api_key" => Some(
                self.ai_api_key
                    .as_ref()
                    .map(|_| "***set***".to_string())
                    .unwrap_or_else(|| "not_set".to_string()),
            ),
            "ai_api_base_url" => Some(self.ai_api_base_url.clone()),
            "ai_model" => Some(self.ai_model.clone()),
            "ai_timeout_seconds" => Some(self.ai_timeout_seconds.to_string()),
            _ => None,
        }
    }
}

fn normalize_config_key(key: &str) -> &str {
    match key {
        "db_path" | "db.path" => "db_path",
        "report_dir" | "report.dir" => "report_dir",
        "recommendations_path" | "recommendations.path" => "recommendations_path",
        "api_port" | "api.port" => "api_port",
        "report_time" | "report.time" => "report_time",
        "utc_offset_minutes" | "day.utc_offset_minutes" => "utc_offset_minutes",
        "comeback_trigger" | "comeback.trigger" => "comeback_trigger",
        "default_user" | "user.default" => "default_user",
        "ai_enabled" | "ai.enabled" => "ai_enabled",
        "ai_api_key" | "ai.api_key" => "ai_api_key",
        "ai_api_base_url" | "ai.base_url" => "ai_api_base_url",
        "ai_model" | "ai.model" => "ai_model",
        "ai_timeout_seconds" | "ai.timeout_seconds" => "ai_timeout_seconds",
        _ => key,
    }
}

pub fn parse_hhmm(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .with_context(|| format!("Invalid time format: {value}. Example: 21:00 (24-hour format)",))
}

pub fn expand_home(raw: &str) -> PathBuf {
    raw.strip_prefix("~/")
        .and_then(|stripped| home_dir().map(|home| home.join(stripped)))
        .unwrap_or_else(|| PathBuf::from(raw))
}

pub fn default_report_dir() -> PathBuf {
    default_root_dir().join("reports")
}

fn default_root_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn set_mode_600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set file permissions: {}", path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Config;
    use crate::engine::challenge::ComebackTrigger;

    #[test]
    fn dotted_aliases_map_to_fields() {
        let mut config = Config::default();

        config.set_value("day.utc_offset_minutes", "-300").unwrap();
        config.set_value("comeback.trigger", "chain_break").unwrap();
        config.set_value("report.time", "07:45").unwrap();
        config.set_value("user.default", "  amy ").unwrap();

        assert_eq!(config.utc_offset_minutes, -300);
        assert_eq!(config.comeback_trigger, ComebackTrigger::ChainBreak);
        assert_eq!(config.get_value("report_time").as_deref(), Some("07:45"));
        assert_eq!(config.default_user.as_deref(), Some("amy"));
        assert_eq!(config.day_policy().unwrap().offset_minutes(), -300);
    }

    #[test]
    fn rejects_out_of_range_and_unknown_values() {
        let mut config = Config::default();

        assert!(config.set_value("utc_offset_minutes", "900").is_err());
        assert!(config.set_value("utc_offset_minutes", "-2147483648").is_err());
        assert!(config.set_value("report_time", "25:00").is_err());
        assert!(config.set_value("comeback_trigger", "never").is_err());
        assert!(config.set_value("polling_seconds", "300").is_err());
        assert_eq!(config.utc_offset_minutes, 0);
    }

    #[test]
    fn ai_key_is_masked_and_timeout_clamped() {
        let mut config = Config::default();
        config.set_value("ai.api_key", "sk-test").unwrap();
        config.set_value("ai.timeout_seconds", "1").unwrap();

        assert_eq!(config.get_value("ai_api_key").as_deref(), Some("***set***"));
        assert_eq!(config.ai_timeout_seconds, 5);
        assert_eq!(config.resolved_ai_key().as_deref(), Some("sk-test"));
    }

    #[test]
    fn explicit_user_beats_default_user() {
        let mut config = Config::default();
        assert!(config.resolve_user(None).is_err());

        config.default_user = Some("amy".to_string());
        assert_eq!(config.resolve_user(None).unwrap(), "amy");
        assert_eq!(config.resolve_user(Some("ben")).unwrap(), "ben");
        assert!(config.resolve_user(Some("   ")).is_err());
    }

    #[test]
    fn save_and_load_round_trip_with_private_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.api_port = 9000;
        config.comeback_trigger = ComebackTrigger::ChainBreak;

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();

        assert_eq!(loaded.api_port, 9000);
        assert_eq!(loaded.comeback_trigger, ComebackTrigger::ChainBreak);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"api_port": 8000}"#).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.api_port, 8000);
        assert_eq!(loaded.report_time, "21:00");
        assert_eq!(loaded.comeback_trigger, ComebackTrigger::ZeroStreak);
    }
}
