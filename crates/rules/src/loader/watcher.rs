//! Filesystem event handler for the notify watcher (hot-reload).

use std::fs;
use std::sync::Arc;

use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind};
use tracing::{info, warn};

use super::core::{is_yaml, parse_contents, store_key, DocumentStore};

/// Handle a single filesystem event from the notify watcher.
pub(super) fn handle_fs_event(event: &Event, documents: &DocumentStore) {
    for path in &event.paths {
        if !is_yaml(path) {
            continue;
        }

        // Skip dotfiles (editor swap files, temp writes)
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.starts_with('.') {
                continue;
            }
        }

        match &event.kind {
            EventKind::Create(CreateKind::File)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_)) => match fs::read_to_string(path) {
                Ok(contents) => match parse_contents(&contents) {
                    Ok(doc) => {
                        info!(document_id = %doc.id(), path = %path.display(), "hot-reloaded document");
                        documents
                            .write()
                            .expect("documents lock poisoned")
                            .insert(store_key(path), Arc::new(doc));
                    }
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "failed to parse document during hot-reload, keeping previous version"
                        );
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read file during hot-reload");
                }
            },
            EventKind::Remove(RemoveKind::File) => {
                let removed = documents
                    .write()
                    .expect("documents lock poisoned")
                    .remove(&store_key(path));
                if let Some(doc) = removed {
                    info!(document_id = %doc.id(), path = %path.display(), "removed document after file deletion");
                }
            }
            _ => {}
        }
    }
}
