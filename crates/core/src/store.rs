//! チャットごとの設定を永続化するストア。
//!
//! 全チャットの設定をメモリ上に持ち、変更のたびにファイル全体を書き直す。

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::date::TzOffset;

/// イベントハンドラとスケジューラで共有するストア。
pub type SharedStore = Arc<Mutex<ChatStore>>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read chat store {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse chat store {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize chat store: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("Failed to write chat store {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// 1 チャット分の設定。
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatConfig {
    /// 目標日。未設定なら None
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub target_date: Option<NaiveDate>,
    /// 日付計算に使うオフセット
    pub tz_offset: TzOffset,
    /// 毎日の通知が有効か
    pub notify: bool,
    /// 最後に通知を送った日 (オフセット上の日付)
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub last_notified_iso: Option<NaiveDate>,
}

/// チャット ID -> 設定 のストア。
pub struct ChatStore {
    path: PathBuf,
    chats: BTreeMap<String, ChatConfig>,
    /// 読めなかったレコード。上書きされるまでそのまま書き戻す
    rejected: BTreeMap<String, serde_json::Value>,
}

impl ChatStore {
    /// ストアを読み込む。ファイルが存在しない場合は空のストアを作成する。
    ///
    /// 読めないレコードは警告を出して読み飛ばす。他のチャットはそのまま読み込む。
    pub fn try_load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let records: BTreeMap<String, serde_json::Value> = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|source| StoreError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(StoreError::Read {
                    path: path.clone(),
                    source,
                });
            }
        };

        let mut chats = BTreeMap::new();
        let mut rejected = BTreeMap::new();
        for (chat_id, record) in records {
            match ChatConfig::deserialize(&record) {
                Ok(chat) => {
                    chats.insert(chat_id, chat);
                }
                Err(e) => {
                    warn!(chat_id = %chat_id, error = %e, "Skipping unreadable chat record");
                    rejected.insert(chat_id, record);
                }
            }
        }

        Ok(Self {
            path,
            chats,
            rejected,
        })
    }

    /// ストアを読み込む。読めない・壊れている場合は初回起動とみなして空から始める。
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::try_load(path).unwrap_or_else(|e| {
            warn!(error = %e, "Chat store is unreadable, starting empty");
            Self {
                path: path.to_path_buf(),
                chats: BTreeMap::new(),
                rejected: BTreeMap::new(),
            }
        })
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    /// ストアをファイルに保存する。
    ///
    /// 一時ファイルに書いてから rename するので、途中まで書かれたファイルは残らない。
    pub fn save(&self) -> Result<(), StoreError> {
        self.write(&self.chats)
    }

    fn write(&self, chats: &BTreeMap<String, ChatConfig>) -> Result<(), StoreError> {
        let mut records: BTreeMap<&str, serde_json::Value> = self
            .rejected
            .iter()
            .map(|(chat_id, record)| (chat_id.as_str(), record.clone()))
            .collect();
        for (chat_id, chat) in chats {
            let record = serde_json::to_value(chat).map_err(StoreError::Serialize)?;
            records.insert(chat_id.as_str(), record);
        }
        let content = serde_json::to_string_pretty(&records).map_err(StoreError::Serialize)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_error(parent))?;
        }

        let tmp_path = tmp_path_for(&self.path);
        fs::write(&tmp_path, content).map_err(write_error(&tmp_path))?;
        fs::rename(&tmp_path, &self.path).map_err(write_error(&self.path))?;
        Ok(())
    }

    /// 1 チャット分の変更を保存し、成功した場合だけメモリに反映する。
    fn commit(&mut self, chat_id: &str, chat: ChatConfig) -> Result<(), StoreError> {
        let mut chats = self.chats.clone();
        chats.insert(chat_id.to_string(), chat);
        self.write(&chats)?;
        self.chats = chats;
        self.rejected.remove(chat_id);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    pub fn get(&self, chat_id: &str) -> Option<&ChatConfig> {
        self.chats.get(chat_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChatConfig)> {
        self.chats.iter().map(|(id, chat)| (id.as_str(), chat))
    }

    /// チャットの設定がなければデフォルトで作成して保存する。
    pub fn ensure(&mut self, chat_id: &str) -> Result<&ChatConfig, StoreError> {
        if !self.chats.contains_key(chat_id) {
            self.commit(chat_id, ChatConfig::default())?;
            debug!(chat_id, "Chat registered");
        }
        Ok(&self.chats[chat_id])
    }

    /// 設定を変更して保存する。保存に失敗した場合は何も変わらない。
    fn update<R>(
        &mut self,
        chat_id: &str,
        f: impl FnOnce(&mut ChatConfig) -> R,
    ) -> Result<R, StoreError> {
        let mut chat = self.chats.get(chat_id).cloned().unwrap_or_default();
        let result = f(&mut chat);
        self.commit(chat_id, chat)?;
        Ok(result)
    }

    pub fn set_target_date(&mut self, chat_id: &str, date: NaiveDate) -> Result<(), StoreError> {
        self.update(chat_id, |chat| chat.target_date = Some(date))
    }

    pub fn clear_target_date(&mut self, chat_id: &str) -> Result<(), StoreError> {
        self.update(chat_id, |chat| chat.target_date = None)
    }

    pub fn set_tz_offset(&mut self, chat_id: &str, offset: TzOffset) -> Result<(), StoreError> {
        self.update(chat_id, |chat| chat.tz_offset = offset)
    }

    /// 通知の有効・無効を切り替え、切り替え後の状態を返す。
    pub fn toggle_notify(&mut self, chat_id: &str) -> Result<bool, StoreError> {
        self.update(chat_id, |chat| {
            chat.notify = !chat.notify;
            chat.notify
        })
    }

    pub fn mark_notified(&mut self, chat_id: &str, date: NaiveDate) -> Result<(), StoreError> {
        self.update(chat_id, |chat| chat.last_notified_iso = Some(date))
    }

    /// オフセットが初期値 (`+00:00`) のままなら既定のオフセットに置き換える。
    pub fn apply_default_offset(
        &mut self,
        chat_id: &str,
        default: TzOffset,
    ) -> Result<TzOffset, StoreError> {
        let current = self.ensure(chat_id)?.tz_offset;
        if current != TzOffset::utc() || default == current {
            return Ok(current);
        }
        self.set_tz_offset(chat_id, default)?;
        Ok(default)
    }
}

fn write_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Write { path, source }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("store.json");
    path.with_file_name(format!(".{name}.tmp-{}", std::process::id()))
}
