use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use boardlift_core::{
    compare_version_ids, trusts_portal_preselection, Credentials, Product, UpgradeError,
};
use reqwest::blocking::Client;
use reqwest_cookie_store::CookieStoreMutex;

use crate::cookies;

/// Sent on every portal request so download traffic is attributable.
pub const USER_AGENT: &str = "boardlift upgrade agent";

const LOGIN_PATH: &str = "customers/login";
const CUSTOMER_PATH: &str = "customers";
const DOWNLOAD_PATH: &str = "customers/download";

const DOWNLOAD_STAGE: &str = "downloading the release archive";

pub struct PortalClient {
    http: Client,
    jar: Arc<CookieStoreMutex>,
    base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseInfo {
    pub title: String,
    /// The license title appears inside the configured board title, which
    /// usually means this license covers the installation being upgraded.
    pub likely_current_board: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LicenseListing {
    pub licenses: BTreeMap<String, LicenseInfo>,
    /// licenseId -> product codes offered for download.
    pub products: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionListing {
    /// (version id, display label), most recent first.
    pub versions: Vec<(String, String)>,
    /// The portal's own preselection, when we trust it for this product.
    pub recommended: Option<String>,
}

impl PortalClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_jar(base_url, cookies::new_jar())
    }

    /// Rebuild a client from a jar snapshot taken by [`cookie_snapshot`].
    ///
    /// [`cookie_snapshot`]: PortalClient::cookie_snapshot
    pub fn from_cookie_snapshot(base_url: &str, snapshot: &str) -> Result<Self> {
        Self::with_jar(base_url, cookies::import(snapshot)?)
    }

    fn with_jar(base_url: &str, jar: Arc<CookieStoreMutex>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_provider(Arc::clone(&jar))
            .build()
            .context("failed building portal http client")?;

        Ok(Self {
            http,
            jar,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn cookie_snapshot(&self) -> Result<String> {
        cookies::export(&self.jar)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Submit the login form. Any extra form fields ride along with the
    /// credentials; the portal honors `redirect` to land on another page
    /// after authenticating. Returns the final response body.
    pub fn login(&self, credentials: &Credentials, extra: &[(&str, &str)]) -> Result<String> {
        let mut params: Vec<(&str, &str)> = vec![
            ("email", credentials.email.as_str()),
            ("password", credentials.password.as_str()),
        ];
        params.extend_from_slice(extra);

        let response = self
            .http
            .post(self.endpoint(LOGIN_PATH))
            .form(&params)
            .send()
            .context("portal login request failed")?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(UpgradeError::AuthFailure { status }.into());
        }
        response.text().context("failed reading login response body")
    }

    /// Authenticate and scrape the customer page for licenses and the
    /// products each one offers.
    pub fn fetch_licenses(
        &self,
        credentials: &Credentials,
        board_title: &str,
    ) -> Result<LicenseListing> {
        let body = self.login(credentials, &[("redirect", CUSTOMER_PATH)])?;
        let catalog = boardlift_catalog::parse_license_listing(&body)?;

        let board_title = board_title.to_lowercase();
        let mut listing = LicenseListing {
            products: catalog.products,
            ..LicenseListing::default()
        };
        for (license_id, title) in catalog.titles {
            let likely_current_board = board_title.contains(&title.to_lowercase());
            listing.licenses.insert(
                license_id,
                LicenseInfo {
                    title,
                    likely_current_board,
                },
            );
        }
        Ok(listing)
    }

    /// Fetch the download form for one license/product pair and extract its
    /// version choices. The portal preselects a version; that preselection
    /// is surfaced as `recommended` only when trusted for the product and
    /// installed patch level.
    pub fn fetch_versions(
        &self,
        license_id: &str,
        product: Product,
        installed_version_id: u64,
    ) -> Result<VersionListing> {
        let response = self
            .http
            .get(self.endpoint(DOWNLOAD_PATH))
            .query(&[("l", license_id), ("d", product.as_str())])
            .send()
            .context("download form request failed")?;
        let body = response
            .text()
            .context("failed reading download form body")?;

        let options = boardlift_catalog::parse_version_options(&body)?;
        if options.is_empty() {
            return Err(UpgradeError::EmptyCatalog {
                product: product.as_str().to_string(),
            }
            .into());
        }

        let mut recommended = None;
        if trusts_portal_preselection(product, installed_version_id) {
            recommended = options
                .iter()
                .find(|option| option.marked_selected)
                .map(|option| option.value.clone());
        }

        let mut versions: Vec<(String, String)> = options
            .into_iter()
            .map(|option| (option.value, option.label))
            .collect();
        versions.sort_by(|left, right| compare_version_ids(&right.0, &left.0));

        Ok(VersionListing {
            versions,
            recommended,
        })
    }

    /// Request one release archive and stream the body into `sink`.
    /// Returns the number of bytes written.
    pub fn download_to(
        &self,
        license_id: &str,
        product: Product,
        version_id: &str,
        want_upgrade_package: bool,
        sink: &mut dyn Write,
    ) -> Result<u64> {
        let upgrade_package = if want_upgrade_package { "1" } else { "0" };
        let params = [
            ("agree", "1"),
            ("l", license_id),
            ("d", product.as_str()),
            ("download_version_id", version_id),
            ("options[upgradePackage]", upgrade_package),
        ];

        let mut response = self
            .http
            .post(self.endpoint(DOWNLOAD_PATH))
            .form(&params)
            .send()
            .map_err(|err| transfer_failure(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(transfer_failure(format!("http status {status}")).into());
        }

        response
            .copy_to(sink)
            .map_err(|err| transfer_failure(err.to_string()).into())
    }
}

fn transfer_failure(reason: String) -> UpgradeError {
    UpgradeError::TransferFailure {
        stage: DOWNLOAD_STAGE,
        reason,
    }
}
