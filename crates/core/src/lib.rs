//! チャットごとに目標日までの残り日数を管理し、毎日決まった時刻に通知する。
//!
//! メッセンジャーに依存しない部分をまとめたクレート。送信手段は
//! [`scheduler::Notifier`]、時刻源は [`clock::Clock`] として外から渡す。

pub mod clock;
pub mod date;
pub mod dispatch;
pub mod message;
pub mod scheduler;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use date::{DateError, TzOffset};
pub use dispatch::{Action, Button, Dispatcher, Menu, Reply, ReplyKind};
pub use message::{DayForms, MessageFormat, PluralRule};
pub use scheduler::{Notifier, Scheduler, TickReport, TriggerTime};
pub use store::{ChatConfig, ChatStore, SharedStore, StoreError};
