//! Filesystem Transcript Store
//!
//! Shared transcripts and their audio live under the data directory:
//!
//! ```text
//! {data_dir}/conversations/{id}/conversation.json
//! {data_dir}/conversations/{id}/audio/message_{index}.mp3
//! {data_dir}/shared_conversations.json
//! ```
//!
//! The share index maps conversation ids to their share metadata and is the
//! authority on expiry.

use async_trait::async_trait;
use chrono::Utc;
use duologue_core::{
    StoreError, TranscriptDocument, TranscriptStore,
    transcript::{
        ShareReference, SharedConversation, audio_asset_index, audio_asset_name,
        is_valid_conversation_id, order_audio_assets,
    },
};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{fs, sync::Mutex};
use tracing::{debug, info, warn};

const INDEX_FILE: &str = "shared_conversations.json";
const DOCUMENT_FILE: &str = "conversation.json";

type ShareIndex = BTreeMap<String, SharedConversation>;

pub struct FsTranscriptStore {
    root: PathBuf,
    public_base_url: String,
    // Serializes read-modify-write cycles on the share index.
    index_lock: Mutex<()>,
}

impl FsTranscriptStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
            index_lock: Mutex::new(()),
        }
    }

    /// Where clients can fetch the shared conversation `id`.
    pub fn share_url(&self, id: &str) -> String {
        format!("{}/conversations/{}", self.public_base_url, id)
    }

    /// Reads one archived audio asset. Only `message_{index}.mp3` names are served.
    pub async fn read_audio(
        &self,
        conversation_id: &str,
        file_name: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(index) = audio_asset_index(file_name) else {
            return Ok(None);
        };
        if audio_asset_name(index) != file_name {
            return Ok(None);
        }
        let path = self.audio_dir(conversation_id)?.join(file_name);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn conversation_dir(&self, id: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_conversation_id(id) {
            return Err(StoreError::InvalidId);
        }
        Ok(self.root.join("conversations").join(id))
    }

    fn audio_dir(&self, id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.conversation_dir(id)?.join("audio"))
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    async fn read_index(&self) -> Result<ShareIndex, StoreError> {
        let bytes = match fs::read(self.index_path()).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ShareIndex::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(index) => Ok(index),
            Err(e) => {
                warn!(error = %e, "Share index is unreadable, starting a new one");
                Ok(ShareIndex::new())
            }
        }
    }

    async fn write_index(&self, index: &ShareIndex) -> Result<(), StoreError> {
        write_json(&self.index_path(), index).await
    }
}

/// Writes pretty JSON through a temporary file so readers never see a partial file.
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl TranscriptStore for FsTranscriptStore {
    async fn persist(&self, document: &TranscriptDocument) -> Result<ShareReference, StoreError> {
        let dir = self.conversation_dir(&document.id)?;
        fs::create_dir_all(dir.join("audio")).await?;

        let shared_at = Utc::now();
        let mut shared = document.clone();
        shared.shared = true;
        shared.shared_at = Some(shared_at);
        write_json(&dir.join(DOCUMENT_FILE), &shared).await?;

        let has_audio = !self.list_audio_assets(&document.id).await?.is_empty();
        let entry = SharedConversation::new(&shared, shared_at, has_audio);
        let expires_at = entry.expires_at;
        {
            let _guard = self.index_lock.lock().await;
            let mut index = self.read_index().await?;
            index.insert(document.id.clone(), entry);
            self.write_index(&index).await?;
        }

        info!(conversation_id = %document.id, has_audio, %expires_at, "Conversation shared");
        Ok(ShareReference {
            url: self.share_url(&document.id),
            expires_at,
        })
    }

    async fn list_audio_assets(&self, conversation_id: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.audio_dir(conversation_id)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(order_audio_assets(names))
    }

    async fn save_audio(
        &self,
        conversation_id: &str,
        message_index: usize,
        audio: &[u8],
    ) -> Result<(), StoreError> {
        let dir = self.audio_dir(conversation_id)?;
        fs::create_dir_all(&dir).await?;
        fs::write(dir.join(audio_asset_name(message_index)), audio).await?;
        debug!(conversation_id, index = message_index, bytes = audio.len(), "Audio archived");
        Ok(())
    }

    async fn load_shared(
        &self,
        conversation_id: &str,
    ) -> Result<Option<TranscriptDocument>, StoreError> {
        let path = self.conversation_dir(conversation_id)?.join(DOCUMENT_FILE);
        let Some(entry) = self.read_index().await?.remove(conversation_id) else {
            return Ok(None);
        };
        if entry.is_expired(Utc::now()) {
            debug!(conversation_id, expires_at = %entry.expires_at, "Shared conversation expired");
            return Ok(None);
        }
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
