use std::io::Cursor;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use cookie_store::CookieStore;
use reqwest_cookie_store::CookieStoreMutex;

pub(crate) fn new_jar() -> Arc<CookieStoreMutex> {
    Arc::new(CookieStoreMutex::new(CookieStore::default()))
}

/// Serialize the whole jar, session cookies included. The portal issues
/// non-persistent cookies, so the plain save would drop the login.
pub(crate) fn export(jar: &CookieStoreMutex) -> Result<String> {
    let store = jar
        .lock()
        .map_err(|_| anyhow!("cookie jar lock poisoned"))?;
    let mut buffer = Vec::new();
    cookie_store::serde::json::save_incl_expired_and_nonpersistent(&store, &mut buffer)
        .map_err(|err| anyhow!("failed serializing cookie jar: {err}"))?;
    String::from_utf8(buffer).map_err(|err| anyhow!("cookie jar snapshot is not utf-8: {err}"))
}

pub(crate) fn import(snapshot: &str) -> Result<Arc<CookieStoreMutex>> {
    if snapshot.trim().is_empty() {
        return Ok(new_jar());
    }
    let store = cookie_store::serde::json::load_all(Cursor::new(snapshot.as_bytes()))
        .map_err(|err| anyhow!("failed restoring cookie jar: {err}"))?;
    Ok(Arc::new(CookieStoreMutex::new(store)))
}
