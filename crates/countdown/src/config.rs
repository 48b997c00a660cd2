use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use countdown_core::{MessageFormat, TriggerTime, TzOffset, scheduler::DEFAULT_TICK_INTERVAL};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    pub discord: DiscordConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub message: MessageFormat,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DiscordConfig {
    pub token: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: "YOUR_DISCORD_BOT_TOKEN".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StoreConfig {
    /// チャット設定を保存する JSON ファイル
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("store.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// 通知する時 (各チャットのオフセット上)
    pub hour: u32,
    /// 通知する分
    pub minute: u32,
    /// 通知時刻を確認する間隔。1 分より長いと通知を取りこぼすことがある
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// `/start` でオフセット未設定のチャットに適用するオフセット
    pub default_tz_offset: TzOffset,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        let trigger = TriggerTime::default();
        Self {
            hour: trigger.hour,
            minute: trigger.minute,
            interval: DEFAULT_TICK_INTERVAL,
            default_tz_offset: TzOffset::utc(),
        }
    }
}

impl ScheduleConfig {
    pub fn trigger(&self) -> Result<TriggerTime> {
        TriggerTime::new(self.hour, self.minute).with_context(|| {
            format!(
                "Invalid notification time {}:{} (hour must be < 24, minute < 60)",
                self.hour, self.minute
            )
        })
    }
}

pub fn open_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
    let config: Config = toml::from_str(&content).context("Failed to parse configuration file")?;
    config.schedule.trigger()?;
    anyhow::ensure!(
        !config.schedule.interval.is_zero(),
        "schedule.interval must be greater than zero"
    );
    Ok(config)
}

pub fn write_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    let config = Config::default();
    let content = toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
    fs::write(path.as_ref(), content).context("Failed to write configuration file")?;
    Ok(())
}
