//! 记忆持久化（会话边界）
//!
//! 只在会话开始 / 结束时读写：load(id) -> (facts, 最近消息)，save(id, facts, 最近消息)。
//! JsonFileStore 每个用户一个 JSON 文件；InMemoryStore 用于测试与无盘场景。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::memory::{FactStore, MemoryFact, Message};

/// 持久化记录：标识、最后更新时间、全部事实、最近 N 条对话
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub user_id: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub facts: Vec<MemoryFact>,
    #[serde(default)]
    pub last_conversation: Vec<Message>,
}

impl MemorySnapshot {
    pub fn new(user_id: impl Into<String>, facts: &FactStore, recent: &[Message]) -> Self {
        Self {
            user_id: user_id.into(),
            updated_at: Utc::now(),
            facts: facts.iter().cloned().collect(),
            last_conversation: recent.to_vec(),
        }
    }

    pub fn into_parts(self) -> (FactStore, Vec<Message>) {
        (FactStore::from_facts(self.facts), self.last_conversation)
    }
}

/// 记忆存储后端
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// 不存在时返回 None
    async fn load(&self, id: &str) -> anyhow::Result<Option<MemorySnapshot>>;

    async fn save(&self, snapshot: &MemorySnapshot) -> anyhow::Result<()>;
}

/// JSON 文件存储：`<dir>/<id>_memory.json`
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        let safe: String = id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}_memory.json"))
    }
}

#[async_trait]
impl MemoryStore for JsonFileStore {
    async fn load(&self, id: &str) -> anyhow::Result<Option<MemorySnapshot>> {
        let path = self.path_for(id);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let snapshot: MemorySnapshot = serde_json::from_str(&data)?;
        tracing::info!(
            user_id = %id,
            facts = snapshot.facts.len(),
            messages = snapshot.last_conversation.len(),
            "memory loaded"
        );
        Ok(Some(snapshot))
    }

    /// 先写临时文件再 rename，避免中途失败留下半截 JSON
    async fn save(&self, snapshot: &MemorySnapshot) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&snapshot.user_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(snapshot)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::info!(user_id = %snapshot.user_id, path = %path.display(), "memory saved");
        Ok(())
    }
}

/// 内存存储
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, MemorySnapshot>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn load(&self, id: &str) -> anyhow::Result<Option<MemorySnapshot>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn save(&self, snapshot: &MemorySnapshot) -> anyhow::Result<()> {
        self.records
            .write()
            .await
            .insert(snapshot.user_id.clone(), snapshot.clone());
        Ok(())
    }
}
