//! ユーザー操作 (コマンド・ボタン) を設定の読み書きと返信文に変換する。
//!
//! メッセンジャーには依存しない。返信の送り方は [`ReplyKind`] で指示する。

use std::sync::Arc;

use tracing::debug;

use crate::{
    clock::Clock,
    date::{TzOffset, days_left, format_date, parse_date},
    message::MessageFormat,
    scheduler::TriggerTime,
    store::{ChatStore, SharedStore, StoreError},
};

/// 返信に付けるボタン。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Left,
    When,
    ToggleNotify,
    TzHelp,
    Clear,
}

impl Button {
    pub const ALL: [Button; 5] = [
        Button::Left,
        Button::When,
        Button::ToggleNotify,
        Button::TzHelp,
        Button::Clear,
    ];

    pub fn custom_id(self) -> &'static str {
        match self {
            Button::Left => "ACTION_LEFT",
            Button::When => "ACTION_WHEN",
            Button::ToggleNotify => "ACTION_TOGGLE_NOTIFY",
            Button::TzHelp => "ACTION_TZ_HELP",
            Button::Clear => "ACTION_CLEAR",
        }
    }

    pub fn from_custom_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.custom_id() == id)
    }
}

/// ユーザー操作。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Start,
    Menu,
    /// `/setdate` の引数
    SetDate(String),
    /// `/tz` の引数
    Tz(String),
    Left,
    When,
    Notify,
    Clear,
    Button(Button),
}

/// 返信の送り方。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// 新しいメッセージを送る
    Send,
    /// ボタンが押されたメッセージを書き換える
    Edit,
    /// ボタン押下への短い応答
    Notice,
}

/// ボタンメニューの状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Menu {
    pub notify: bool,
    pub trigger: TriggerTime,
}

impl Menu {
    pub fn label(&self, button: Button) -> String {
        match button {
            Button::Left => "⏳ Days left".to_string(),
            Button::When => "📅 Target date".to_string(),
            Button::ToggleNotify if self.notify => format!("🔕 Disable {}", self.trigger),
            Button::ToggleNotify => format!("🔔 Enable {}", self.trigger),
            Button::TzHelp => "🌍 Time zone".to_string(),
            Button::Clear => "🧼 Clear date".to_string(),
        }
    }

    pub fn buttons(&self) -> Vec<(Button, String)> {
        Button::ALL
            .into_iter()
            .map(|button| (button, self.label(button)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub kind: ReplyKind,
    pub text: String,
    pub menu: Option<Menu>,
}

impl Reply {
    fn new(kind: ReplyKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            menu: None,
        }
    }

    fn send(text: impl Into<String>) -> Self {
        Self::new(ReplyKind::Send, text)
    }

    fn edit(text: impl Into<String>) -> Self {
        Self::new(ReplyKind::Edit, text)
    }

    fn notice(text: impl Into<String>) -> Self {
        Self::new(ReplyKind::Notice, text)
    }

    fn with_menu(mut self, menu: Menu) -> Self {
        self.menu = Some(menu);
        self
    }
}

pub struct Dispatcher {
    store: SharedStore,
    clock: Arc<dyn Clock>,
    format: Arc<MessageFormat>,
    trigger: TriggerTime,
    default_offset: TzOffset,
}

impl Dispatcher {
    pub fn new(store: SharedStore, clock: Arc<dyn Clock>, format: Arc<MessageFormat>) -> Self {
        Self {
            store,
            clock,
            format,
            trigger: TriggerTime::default(),
            default_offset: TzOffset::utc(),
        }
    }

    pub fn with_trigger(mut self, trigger: TriggerTime) -> Self {
        self.trigger = trigger;
        self
    }

    /// `start` で未設定のチャットに適用するオフセット。
    pub fn with_default_offset(mut self, offset: TzOffset) -> Self {
        self.default_offset = offset;
        self
    }

    /// 操作を処理して返信を返す。
    ///
    /// 入力の誤りや日付未設定は返信文として返す。エラーになるのは保存の失敗だけ。
    pub async fn handle(&self, chat_id: &str, action: Action) -> Result<Reply, StoreError> {
        debug!(chat_id, ?action, "Handling action");

        let mut store = self.store.lock().await;
        store.ensure(chat_id)?;

        let reply = match action {
            Action::Start => {
                store.apply_default_offset(chat_id, self.default_offset)?;
                Reply::send(self.help_text()).with_menu(self.menu(&store, chat_id))
            }
            Action::Menu => Reply::send("Menu:").with_menu(self.menu(&store, chat_id)),
            Action::SetDate(arg) => self.set_date(&mut store, chat_id, &arg)?,
            Action::Tz(arg) => match arg.parse::<TzOffset>() {
                Ok(offset) => {
                    store.set_tz_offset(chat_id, offset)?;
                    Reply::send(format!("Time zone set: {offset}"))
                        .with_menu(self.menu(&store, chat_id))
                }
                Err(_) => Reply::send("Format: /tz +04:00 (or -03:00 and so on)"),
            },
            Action::Left => self
                .countdown(&store, chat_id, Reply::send)
                .unwrap_or_else(|| Reply::send("The date is not set. First: /setdate 2025-09-10")),
            Action::Button(Button::Left) => self
                .countdown(&store, chat_id, Reply::edit)
                .unwrap_or_else(|| Reply::notice("Set a date first: /setdate")),
            Action::When => self
                .target(&store, chat_id, Reply::send)
                .unwrap_or_else(|| Reply::send("The date is not set. /setdate 2025-09-10")),
            Action::Button(Button::When) => self
                .target(&store, chat_id, Reply::edit)
                .unwrap_or_else(|| Reply::notice("The date is not set.")),
            Action::Notify => self.toggle_notify(&mut store, chat_id, Reply::send)?,
            Action::Button(Button::ToggleNotify) => {
                self.toggle_notify(&mut store, chat_id, Reply::edit)?
            }
            Action::Clear => {
                store.clear_target_date(chat_id)?;
                Reply::send("Date cleared.").with_menu(self.menu(&store, chat_id))
            }
            Action::Button(Button::Clear) => {
                store.clear_target_date(chat_id)?;
                Reply::edit("Date cleared.").with_menu(self.menu(&store, chat_id))
            }
            Action::Button(Button::TzHelp) => {
                Reply::send("Set the time zone with a command, for example: /tz +04:00")
            }
        };

        Ok(reply)
    }

    fn help_text(&self) -> String {
        format!(
            "Hi! I count how many days are left until the date you set.\n\
             \n\
             Commands:\n\
             /setdate 2025-09-10  set the date (or 10.09.2025)\n\
             /tz +04:00           set the time zone\n\
             /left                show how many days are left\n\
             /when                show the date\n\
             /notify              turn the daily {} message on/off\n\
             /clear               clear the date\n\
             /menu                show the menu buttons",
            self.trigger
        )
    }

    fn menu(&self, store: &ChatStore, chat_id: &str) -> Menu {
        Menu {
            notify: store.get(chat_id).is_some_and(|chat| chat.notify),
            trigger: self.trigger,
        }
    }

    /// 目標日が設定されていればカウントダウン文面を返す。
    fn countdown_text(&self, store: &ChatStore, chat_id: &str) -> Option<String> {
        let chat = store.get(chat_id)?;
        let now = self.clock.now();
        let days = days_left(chat.target_date?, chat.tz_offset, now);
        Some(self.format.countdown(days, chat.tz_offset, now))
    }

    fn countdown(
        &self,
        store: &ChatStore,
        chat_id: &str,
        reply: fn(String) -> Reply,
    ) -> Option<Reply> {
        let text = self.countdown_text(store, chat_id)?;
        Some(reply(text).with_menu(self.menu(store, chat_id)))
    }

    fn target(
        &self,
        store: &ChatStore,
        chat_id: &str,
        reply: fn(String) -> Reply,
    ) -> Option<Reply> {
        let chat = store.get(chat_id)?;
        let target = chat.target_date?;
        let text = format!("Target date: {} ({})", format_date(target), chat.tz_offset);
        Some(reply(text).with_menu(self.menu(store, chat_id)))
    }

    fn set_date(
        &self,
        store: &mut ChatStore,
        chat_id: &str,
        arg: &str,
    ) -> Result<Reply, StoreError> {
        if arg.trim().is_empty() {
            return Ok(Reply::send("Send a date: /setdate 2025-09-10 or /setdate 10.09.2025"));
        }

        let Ok(date) = parse_date(arg) else {
            return Ok(Reply::send("Invalid date. Example: 2025-09-10"));
        };

        store.set_target_date(chat_id, date)?;

        let text = self.countdown_text(store, chat_id).unwrap_or_default();
        Ok(Reply::send(format!("Date set: {}\n\n{text}", format_date(date)))
            .with_menu(self.menu(store, chat_id)))
    }

    fn toggle_notify(
        &self,
        store: &mut ChatStore,
        chat_id: &str,
        reply: fn(String) -> Reply,
    ) -> Result<Reply, StoreError> {
        let enabled = store.toggle_notify(chat_id)?;
        let state = if enabled { "ON" } else { "OFF" };
        let text = format!("Daily message at {}: {state}.", self.trigger);
        Ok(reply(text).with_menu(self.menu(store, chat_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{DateTime, NaiveDate, Utc};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: SharedStore,
        dispatcher: Dispatcher,
    }

    fn fixture(now: &str) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = ChatStore::load(dir.path().join("store.json")).into_shared();
        let now = DateTime::parse_from_rfc3339(now)
            .unwrap()
            .with_timezone(&Utc);
        let format = MessageFormat {
            template: "{days} {word} left".to_string(),
            phrases: vec![],
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(
            store.clone(),
            Arc::new(FixedClock::new(now)),
            Arc::new(format),
        )
        .with_default_offset("+04:00".parse().unwrap());
        Fixture {
            _dir: dir,
            store,
            dispatcher,
        }
    }

    #[test]
    fn button_ids_round_trip() {
        for button in Button::ALL {
            assert_eq!(Button::from_custom_id(button.custom_id()), Some(button));
        }
        assert_eq!(Button::from_custom_id("ACTION_UNKNOWN"), None);
    }

    #[test]
    fn notify_label_follows_state() {
        let menu = Menu {
            notify: false,
            trigger: TriggerTime::default(),
        };
        assert_eq!(menu.label(Button::ToggleNotify), "🔔 Enable 08:00");
        let menu = Menu {
            notify: true,
            ..menu
        };
        assert_eq!(menu.label(Button::ToggleNotify), "🔕 Disable 08:00");
        assert_eq!(menu.buttons().len(), 5);
    }

    #[tokio::test]
    async fn start_applies_default_offset_once() {
        let f = fixture("2025-09-01T00:00:00+04:00");

        let reply = f.dispatcher.handle("1", Action::Start).await.unwrap();
        assert_eq!(reply.kind, ReplyKind::Send);
        assert!(reply.text.contains("/setdate"));
        assert!(reply.menu.is_some());
        assert_eq!(
            f.store.lock().await.get("1").unwrap().tz_offset.to_string(),
            "+04:00"
        );

        f.dispatcher
            .handle("1", Action::Tz("-03:00".to_string()))
            .await
            .unwrap();
        f.dispatcher.handle("1", Action::Start).await.unwrap();
        assert_eq!(
            f.store.lock().await.get("1").unwrap().tz_offset.to_string(),
            "-03:00"
        );
    }

    #[tokio::test]
    async fn set_date_and_left() {
        let f = fixture("2025-09-01T00:00:00+04:00");
        f.dispatcher
            .handle("1", Action::Tz("+04:00".to_string()))
            .await
            .unwrap();

        let reply = f
            .dispatcher
            .handle("1", Action::SetDate(" 10.09.2025 ".to_string()))
            .await
            .unwrap();
        assert_eq!(reply.text, "Date set: 10.09.2025\n\n9 days left");
        assert_eq!(
            f.store.lock().await.get("1").unwrap().target_date,
            NaiveDate::from_ymd_opt(2025, 9, 10)
        );

        let reply = f.dispatcher.handle("1", Action::Left).await.unwrap();
        assert_eq!(reply.kind, ReplyKind::Send);
        assert_eq!(reply.text, "9 days left");

        let reply = f
            .dispatcher
            .handle("1", Action::Button(Button::Left))
            .await
            .unwrap();
        assert_eq!(reply.kind, ReplyKind::Edit);
        assert_eq!(reply.text, "9 days left");
    }

    #[tokio::test]
    async fn invalid_input_is_answered_not_stored() {
        let f = fixture("2025-09-01T00:00:00Z");

        let reply = f
            .dispatcher
            .handle("1", Action::SetDate("2025/09/10".to_string()))
            .await
            .unwrap();
        assert_eq!(reply.text, "Invalid date. Example: 2025-09-10");

        let reply = f
            .dispatcher
            .handle("1", Action::SetDate("   ".to_string()))
            .await
            .unwrap();
        assert!(reply.text.starts_with("Send a date"));

        let reply = f
            .dispatcher
            .handle("1", Action::Tz("+4:00".to_string()))
            .await
            .unwrap();
        assert!(reply.text.starts_with("Format: /tz"));
        assert!(reply.menu.is_none());

        let chat = f.store.lock().await.get("1").cloned().unwrap();
        assert_eq!(chat.target_date, None);
        assert_eq!(chat.tz_offset, TzOffset::utc());
    }

    #[tokio::test]
    async fn missing_date_guidance() {
        let f = fixture("2025-09-01T00:00:00Z");

        let reply = f.dispatcher.handle("1", Action::Left).await.unwrap();
        assert_eq!(reply.kind, ReplyKind::Send);
        assert!(reply.text.starts_with("The date is not set."));

        let reply = f
            .dispatcher
            .handle("1", Action::Button(Button::Left))
            .await
            .unwrap();
        assert_eq!(reply.kind, ReplyKind::Notice);
        assert!(reply.menu.is_none());

        let reply = f
            .dispatcher
            .handle("1", Action::Button(Button::When))
            .await
            .unwrap();
        assert_eq!(reply, Reply::notice("The date is not set."));
    }

    #[tokio::test]
    async fn when_shows_date_and_offset() {
        let f = fixture("2025-09-01T00:00:00Z");
        f.dispatcher
            .handle("1", Action::SetDate("2025-09-10".to_string()))
            .await
            .unwrap();
        f.dispatcher
            .handle("1", Action::Tz("-03:30".to_string()))
            .await
            .unwrap();

        let reply = f.dispatcher.handle("1", Action::When).await.unwrap();
        assert_eq!(reply.text, "Target date: 10.09.2025 (-03:30)");
    }

    #[tokio::test]
    async fn notify_toggles_and_menu_follows() {
        let f = fixture("2025-09-01T00:00:00Z");

        let reply = f.dispatcher.handle("1", Action::Notify).await.unwrap();
        assert_eq!(reply.text, "Daily message at 08:00: ON.");
        assert_eq!(reply.menu.map(|m| m.notify), Some(true));

        let reply = f
            .dispatcher
            .handle("1", Action::Button(Button::ToggleNotify))
            .await
            .unwrap();
        assert_eq!(reply.kind, ReplyKind::Edit);
        assert_eq!(reply.text, "Daily message at 08:00: OFF.");
        assert_eq!(reply.menu.map(|m| m.notify), Some(false));
        assert!(!f.store.lock().await.get("1").unwrap().notify);
    }

    #[tokio::test]
    async fn clear_removes_date() {
        let f = fixture("2025-09-01T00:00:00Z");
        f.dispatcher
            .handle("1", Action::SetDate("2025-09-10".to_string()))
            .await
            .unwrap();

        let reply = f
            .dispatcher
            .handle("1", Action::Button(Button::Clear))
            .await
            .unwrap();
        assert_eq!(reply.kind, ReplyKind::Edit);
        assert_eq!(reply.text, "Date cleared.");
        assert_eq!(f.store.lock().await.get("1").unwrap().target_date, None);
    }

    #[tokio::test]
    async fn store_failure_is_reported_without_changing_state() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let store = ChatStore::load(blocker.join("store.json")).into_shared();
        let dispatcher = Dispatcher::new(
            store.clone(),
            Arc::new(FixedClock::new(Utc::now())),
            Arc::new(MessageFormat::default()),
        );

        assert!(dispatcher.handle("1", Action::Notify).await.is_err());
        assert!(dispatcher.handle("1", Action::Notify).await.is_err());
        assert!(store.lock().await.get("1").is_none());
    }

    #[tokio::test]
    async fn tz_help_sends_plain_message() {
        let f = fixture("2025-09-01T00:00:00Z");
        let reply = f
            .dispatcher
            .handle("1", Action::Button(Button::TzHelp))
            .await
            .unwrap();
        assert_eq!(reply.kind, ReplyKind::Send);
        assert!(reply.text.contains("/tz +04:00"));
        assert!(reply.menu.is_none());
    }
}
