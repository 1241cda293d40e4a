//! History storage implementations.

use std::{path::Path, sync::Arc};

use promptrun_core::HistoryStore;
use serde::{Deserialize, Serialize};

pub mod jsonl;
pub mod text_log;

#[cfg(feature = "memory")]
pub mod memory;

pub use jsonl::JsonlStore;
pub use text_log::TextLogStore;

#[cfg(feature = "memory")]
pub use memory::MemoryStore;

/// On-disk history format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryFormat {
    /// Marker-delimited text log.
    #[default]
    Text,
    /// One JSON record per line.
    Jsonl,
}

impl HistoryFormat {
    /// Log file name for this format.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Text => "history.log",
            Self::Jsonl => "history.jsonl",
        }
    }

    /// Open a store of this format inside `data_dir`.
    #[must_use]
    pub fn open(self, data_dir: &Path) -> Arc<dyn HistoryStore> {
        let path = data_dir.join(self.file_name());
        match self {
            Self::Text => Arc::new(TextLogStore::new(path)),
            Self::Jsonl => Arc::new(JsonlStore::new(path)),
        }
    }
}
