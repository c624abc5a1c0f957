use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::session::UpgradeSession;

/// Opaque key/value persistence for [`UpgradeSession`] values, keyed by a
/// session identifier supplied by the hosting environment. `load` on an id
/// that was never saved yields `None`; callers must treat the workflow as
/// requiring a fresh login in that case.
pub trait SessionStore {
    fn load(&self, session_id: &str) -> Result<Option<UpgradeSession>>;
    fn save(&self, session_id: &str, session: &UpgradeSession) -> Result<()>;
    fn clear(&self, session_id: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileSessionStore {
    state_root: PathBuf,
}

impl FileSessionStore {
    pub fn new(state_root: impl Into<PathBuf>) -> Self {
        Self {
            state_root: state_root.into(),
        }
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.state_root
            .join("sessions")
            .join(format!("{session_id}.json"))
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self, session_id: &str) -> Result<Option<UpgradeSession>> {
        validate_session_id(session_id)?;

        let path = self.session_path(session_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed reading session state: {}", path.display()));
            }
        };

        let session = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing session state: {}", path.display()))?;
        Ok(Some(session))
    }

    fn save(&self, session_id: &str, session: &UpgradeSession) -> Result<()> {
        validate_session_id(session_id)?;

        let path = self.session_path(session_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating session state dir: {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(session)
            .with_context(|| format!("failed serializing session state: {}", path.display()))?;
        fs::write(&path, content)
            .with_context(|| format!("failed writing session state: {}", path.display()))
    }

    fn clear(&self, session_id: &str) -> Result<()> {
        validate_session_id(session_id)?;

        let path = self.session_path(session_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err)
                .with_context(|| format!("failed clearing session state: {}", path.display())),
        }
    }
}

fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty() || session_id.len() > 64 {
        anyhow::bail!("invalid session id: '{session_id}'");
    }

    let valid = session_id
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if !valid {
        anyhow::bail!("invalid session id: '{session_id}'");
    }

    Ok(())
}
