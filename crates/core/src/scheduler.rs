//! 毎日決まった時刻に残り日数を通知するスケジューラ。
//!
//! 一定間隔で全チャットを走査し、通知時刻になったチャットに 1 日 1 回だけ送信する。
//! 送信に失敗した場合は `last_notified_iso` を更新しないので、次の tick で再送される。

use std::{fmt, sync::Arc, time::Duration};

use chrono::{DateTime, FixedOffset, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::{
    clock::Clock,
    date::{days_left, local_now},
    message::MessageFormat,
    store::{ChatConfig, SharedStore},
};

/// tick の既定の間隔。
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// 毎日の通知時刻 (各チャットのオフセット上の時:分)。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerTime {
    pub hour: u32,
    pub minute: u32,
}

impl Default for TriggerTime {
    fn default() -> Self {
        Self { hour: 8, minute: 0 }
    }
}

impl fmt::Display for TriggerTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl TriggerTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    /// 分単位で一致するか。
    pub fn matches(&self, local: &DateTime<FixedOffset>) -> bool {
        local.hour() == self.hour && local.minute() == self.minute
    }
}

/// チャットに今通知すべきかを判定し、送るならその日付を返す。
///
/// 通知が有効で目標日があり、オフセット上の時刻が通知時刻と一致し、
/// かつ今日まだ送っていない場合のみ `Some` になる。
pub fn due_date(chat: &ChatConfig, trigger: TriggerTime, now: DateTime<Utc>) -> Option<NaiveDate> {
    if !chat.notify || chat.target_date.is_none() {
        return None;
    }

    let local = local_now(chat.tz_offset, now);
    if !trigger.matches(&local) {
        return None;
    }

    let today = local.date_naive();
    (chat.last_notified_iso != Some(today)).then_some(today)
}

/// チャットにテキストを送る手段。
pub trait Notifier: Send + Sync {
    fn send(&self, chat_id: &str, text: &str) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// 1 回の tick の結果。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub sent: usize,
    pub failed: usize,
}

struct DueNotification {
    chat_id: String,
    today: NaiveDate,
    text: String,
}

pub struct Scheduler<N> {
    store: SharedStore,
    notifier: N,
    clock: Arc<dyn Clock>,
    format: Arc<MessageFormat>,
    trigger: TriggerTime,
    interval: Duration,
}

impl<N: Notifier> Scheduler<N> {
    pub fn new(
        store: SharedStore,
        notifier: N,
        clock: Arc<dyn Clock>,
        format: Arc<MessageFormat>,
        trigger: TriggerTime,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            format,
            trigger,
            interval: DEFAULT_TICK_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// 全チャットを 1 回走査し、通知時刻になったチャットに送信する。
    ///
    /// 送信中はストアのロックを保持しない。
    pub async fn tick(&self) -> TickReport {
        let now = self.clock.now();

        let due: Vec<DueNotification> = {
            let store = self.store.lock().await;
            store
                .iter()
                .filter_map(|(chat_id, chat)| {
                    let today = due_date(chat, self.trigger, now)?;
                    let days = days_left(chat.target_date?, chat.tz_offset, now);
                    Some(DueNotification {
                        chat_id: chat_id.to_string(),
                        today,
                        text: self.format.countdown(days, chat.tz_offset, now),
                    })
                })
                .collect()
        };

        let mut report = TickReport::default();
        for notification in due {
            let chat_id = notification.chat_id.as_str();

            if let Err(e) = self.notifier.send(chat_id, &notification.text).await {
                report.failed += 1;
                warn!(chat_id, error = %e, "Failed to send daily notification");
                continue;
            }

            report.sent += 1;
            info!(chat_id, date = %notification.today, "Daily notification sent");

            let result = self
                .store
                .lock()
                .await
                .mark_notified(chat_id, notification.today);
            if let Err(e) = result {
                error!(chat_id, error = %e, "Failed to persist notification date");
            }
        }

        report
    }

    /// 一定間隔で [`Scheduler::tick`] を呼び続ける。戻らない。
    pub async fn run(self) {
        info!(
            interval = ?self.interval,
            trigger = %self.trigger,
            "Starting daily notification scheduler"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let report = self.tick().await;
            if report != TickReport::default() {
                debug!(sent = report.sent, failed = report.failed, "Scheduler tick finished");
            }
        }
    }
}
