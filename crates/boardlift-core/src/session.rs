use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{SelectionKind, UpgradeError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub root_path: String,
    pub use_tls: bool,
}

impl FtpConfig {
    /// Fill in the conventional defaults for fields the operator left blank.
    pub fn normalized(mut self) -> Self {
        if self.host.trim().is_empty() {
            self.host = "127.0.0.1".to_string();
        }
        if self.port == 0 {
            self.port = 21;
        }
        self
    }
}

/// Everything the upgrade workflow accumulates across its discrete steps.
/// Persisted between steps through a [`crate::SessionStore`]; only the
/// workflow itself mutates it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeSession {
    pub credentials: Option<Credentials>,
    /// Opaque serialized cookie jar from the portal client. Must survive a
    /// save/load round trip byte for byte.
    #[serde(default)]
    pub cookie_snapshot: String,
    #[serde(default)]
    pub available_products: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub available_versions: Vec<String>,
    pub selected_license: Option<String>,
    pub selected_product: Option<String>,
    pub selected_version: Option<String>,
    #[serde(default)]
    pub ftp_upload: bool,
    pub ftp: Option<FtpConfig>,
}

impl UpgradeSession {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
            ..Self::default()
        }
    }

    /// Product codes discovered for a license. Unknown license ids yield an
    /// empty slice rather than an error; a known id also becomes the
    /// selected license.
    pub fn products_for_license(&mut self, license_id: &str) -> &[String] {
        if !self.available_products.contains_key(license_id) {
            return &[];
        }

        self.selected_license = Some(license_id.to_string());
        self.available_products
            .get(license_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn select_product(&mut self, product: &str) -> Result<(), UpgradeError> {
        let available = self
            .selected_license
            .as_ref()
            .and_then(|license| self.available_products.get(license));

        match available {
            Some(products) if products.iter().any(|code| code == product) => {
                self.selected_product = Some(product.to_string());
                Ok(())
            }
            _ => Err(UpgradeError::InvalidSelection {
                kind: SelectionKind::Product,
                value: product.to_string(),
            }),
        }
    }

    pub fn select_version(&mut self, version_id: &str) -> Result<(), UpgradeError> {
        if !self.available_versions.iter().any(|id| id == version_id) {
            return Err(UpgradeError::InvalidSelection {
                kind: SelectionKind::Version,
                value: version_id.to_string(),
            });
        }

        self.selected_version = Some(version_id.to_string());
        Ok(())
    }

    pub fn set_ftp(&mut self, config: FtpConfig, upload: bool) {
        self.ftp = Some(config.normalized());
        self.ftp_upload = upload;
    }
}
