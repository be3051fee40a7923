//! On-disk snapshots of the in-memory store
//!
//! Each table is a YAML list in its own file under the data directory.

use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{info, warn};

use crate::moderation::{
    BanRecord, MemoryStore, ModerationResult, PunishmentEntry, WARNING_THRESHOLD, WarningRecord,
};
use crate::settings::ChatSettings;

pub const WARNINGS_FILE: &str = "warnings.yaml";
pub const BANS_FILE: &str = "bans.yaml";
pub const PUNISHMENTS_FILE: &str = "punishments.yaml";
pub const CHAT_SETTINGS_FILE: &str = "chat_settings.yaml";

/// Read one table; a missing file is empty, an unparsable one is skipped
async fn read_table<T: DeserializeOwned>(dir: &Path, file: &str) -> Vec<T> {
    let path = dir.join(file);
    let Ok(content) = tokio::fs::read_to_string(&path).await else {
        return Vec::new();
    };
    match serde_yaml::from_str::<Vec<T>>(&content) {
        Ok(rows) => rows,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Skipping unreadable snapshot file");
            Vec::new()
        }
    }
}

impl MemoryStore {
    /// Load a store from the snapshot files in `dir`
    ///
    /// If the directory or a file does not exist, that table starts empty.
    pub async fn load(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let store = Self::new();

        for record in read_table::<WarningRecord>(dir, WARNINGS_FILE).await {
            if record.count == 0 {
                warn!(user_id = record.user_id, chat_id = record.chat_id, "Skipping empty warning row");
                continue;
            }
            store.warnings.insert(
                (record.user_id, record.chat_id),
                record.count.min(WARNING_THRESHOLD),
            );
        }

        for record in read_table::<BanRecord>(dir, BANS_FILE).await {
            store
                .bans
                .insert((record.user_id, record.chat_id), record.reason);
        }

        let mut punishments = read_table::<PunishmentEntry>(dir, PUNISHMENTS_FILE).await;
        punishments.sort_by_key(|entry| entry.timestamp);
        *store.punishments.write().await = punishments;

        for settings in read_table::<ChatSettings>(dir, CHAT_SETTINGS_FILE).await {
            store.settings.insert(settings.chat_id, settings);
        }

        info!(
            dir = %dir.display(),
            warnings = store.warnings.len(),
            bans = store.bans.len(),
            chats = store.settings.len(),
            "Loaded moderation store"
        );
        store
    }

    /// Write every table to `dir`, creating it if needed
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - The data directory cannot be created
    /// - A table cannot be serialized to YAML
    /// - A file cannot be written
    pub async fn save(&self, dir: impl AsRef<Path>) -> ModerationResult<()> {
        let dir = dir.as_ref();
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let mut warnings = self.warning_records();
        warnings.sort_by_key(|record| (record.chat_id, record.user_id));
        tokio::fs::write(dir.join(WARNINGS_FILE), serde_yaml::to_string(&warnings)?).await?;

        let mut bans = self.ban_records();
        bans.sort_by_key(|record| (record.chat_id, record.user_id));
        tokio::fs::write(dir.join(BANS_FILE), serde_yaml::to_string(&bans)?).await?;

        let punishments = self.punishments().await;
        tokio::fs::write(
            dir.join(PUNISHMENTS_FILE),
            serde_yaml::to_string(&punishments)?,
        )
        .await?;

        let mut settings: Vec<ChatSettings> = self
            .settings
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        settings.sort_by_key(|settings| settings.chat_id);
        tokio::fs::write(
            dir.join(CHAT_SETTINGS_FILE),
            serde_yaml::to_string(&settings)?,
        )
        .await?;

        Ok(())
    }
}
