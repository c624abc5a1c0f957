mod config;
mod error;
mod product;
mod session;
mod session_store;
mod versions;

pub use config::{BoardConfig, DEFAULT_PORTAL_BASE_URL};
pub use error::{SelectionKind, UpgradeError};
pub use product::{trusts_portal_preselection, Product};
pub use session::{Credentials, FtpConfig, UpgradeSession};
pub use session_store::{FileSessionStore, SessionStore};
pub use versions::{compare_version_ids, sort_version_ids_desc};

#[cfg(test)]
mod tests;
