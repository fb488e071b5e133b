//! Schema snapshot of the reporting view, cached with a TTL.

use crate::Result;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_SCHEMA_TTL: Duration = Duration::from_secs(3600);

/// Something that can describe the reporting view as
/// `view(col:TYPE, col:TYPE, ...)`.
pub trait SchemaSource: Send + Sync {
    fn describe(&self) -> Result<String>;
}

/// Format a column list the way prompts expect it.
pub fn format_schema<'a>(view: &str, columns: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let defs: Vec<String> = columns
        .into_iter()
        .map(|(name, ty)| format!("{}:{}", name, ty))
        .collect();
    format!("{}({})", view, defs.join(", "))
}

/// TTL cache in front of a [`SchemaSource`].
pub struct SchemaCache {
    source: Arc<dyn SchemaSource>,
    ttl: Duration,
    cached: RwLock<Option<(Instant, String)>>,
}

impl SchemaCache {
    pub fn new(source: Arc<dyn SchemaSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// Current schema text, refreshed when older than the TTL.
    ///
    /// A failed refresh serves the previous value if there is one.
    pub fn snapshot(&self) -> Result<String> {
        if let Ok(guard) = self.cached.read() {
            if let Some((fetched_at, text)) = guard.as_ref() {
                if fetched_at.elapsed() < self.ttl {
                    return Ok(text.clone());
                }
            }
        }

        debug!(target: "askdb::db", "Refreshing schema snapshot");
        match self.source.describe() {
            Ok(text) => {
                if let Ok(mut guard) = self.cached.write() {
                    *guard = Some((Instant::now(), text.clone()));
                }
                info!(target: "askdb::db", "Schema snapshot refreshed ({} bytes)", text.len());
                Ok(text)
            }
            Err(e) => {
                let stale = self
                    .cached
                    .read()
                    .ok()
                    .and_then(|guard| guard.as_ref().map(|(_, text)| text.clone()));
                match stale {
                    Some(text) => {
                        warn!(target: "askdb::db", "Schema refresh failed, serving stale snapshot: {}", e);
                        Ok(text)
                    }
                    None => Err(e),
                }
            }
        }
    }
}
