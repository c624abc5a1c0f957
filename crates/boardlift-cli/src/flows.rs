use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use boardlift_core::{
    BoardConfig, Credentials, FileSessionStore, FtpConfig, Product, SessionStore, UpgradeSession,
};
use boardlift_pipeline::{
    DurableStore, FtpTarget, LocalStore, PipelineOutcome, RemoteFactory, RemoteTarget,
    UpgradePipeline,
};
use boardlift_portal::{LicenseListing, PortalClient, VersionListing};
use indicatif::ProgressBar;

use crate::RunCommand;

pub fn login(
    config: &BoardConfig,
    sessions: &FileSessionStore,
    session_id: &str,
    email: String,
    password: String,
) -> Result<()> {
    let credentials = Credentials { email, password };
    let client = PortalClient::new(&config.portal_base_url)?;

    let listing = client.fetch_licenses(&credentials, &config.board_title)?;
    if listing.licenses.is_empty() {
        bail!("no licenses found for this account");
    }

    let mut session = UpgradeSession::new(credentials);
    session.available_products = listing.products.clone();
    session.cookie_snapshot = client.cookie_snapshot()?;
    sessions.save(session_id, &session)?;

    for line in format_license_lines(&listing) {
        println!("{line}");
    }
    Ok(())
}

pub fn products(sessions: &FileSessionStore, session_id: &str, license_id: &str) -> Result<()> {
    let mut session = load_session(sessions, session_id)?;

    let codes: Vec<String> = session.products_for_license(license_id).to_vec();
    if codes.is_empty() {
        bail!("license '{license_id}' is not in this account");
    }
    sessions.save(session_id, &session)?;

    for code in &codes {
        println!("{code}  {}", product_label(code));
    }
    Ok(())
}

pub fn versions(
    config: &BoardConfig,
    sessions: &FileSessionStore,
    session_id: &str,
    product_code: &str,
) -> Result<()> {
    let mut session = load_session(sessions, session_id)?;

    let Some(product) = Product::parse(product_code) else {
        bail!("unknown product code: '{product_code}'");
    };
    session.select_product(product.as_str())?;

    let license = session
        .selected_license
        .clone()
        .context("no license selected; run the products step first")?;

    let client =
        PortalClient::from_cookie_snapshot(&config.portal_base_url, &session.cookie_snapshot)?;
    let listing = client.fetch_versions(&license, product, config.installed_version_id)?;

    session.available_versions = listing
        .versions
        .iter()
        .map(|(id, _)| id.clone())
        .collect();
    session.cookie_snapshot = client.cookie_snapshot()?;
    sessions.save(session_id, &session)?;

    for line in format_version_lines(&listing) {
        println!("{line}");
    }
    Ok(())
}

pub fn run(
    config: &BoardConfig,
    sessions: &FileSessionStore,
    session_id: &str,
    command: RunCommand,
) -> Result<()> {
    if !command.agree {
        bail!("the vendor license agreement must be accepted with --agree");
    }

    let mut session = load_session(sessions, session_id)?;
    session.select_version(&command.version)?;
    session.set_ftp(
        FtpConfig {
            host: command.ftp_host,
            port: command.ftp_port,
            username: command.ftp_user,
            password: command.ftp_password,
            root_path: command.ftp_root,
            use_tls: command.ftp_tls,
        },
        command.ftp_upload,
    );
    sessions.save(session_id, &session)?;

    let license = session
        .selected_license
        .clone()
        .context("no license selected; run the products step first")?;
    let product_code = session
        .selected_product
        .clone()
        .context("no product selected; run the versions step first")?;
    let product = Product::parse(&product_code)
        .with_context(|| format!("session holds an unknown product code: '{product_code}'"))?;

    let client =
        PortalClient::from_cookie_snapshot(&config.portal_base_url, &session.cookie_snapshot)?;
    let want_upgrade_package = command.upgrade_package.unwrap_or_else(|| product.is_primary());

    let version = command.version.clone();
    let source = Box::new(move |sink: &mut dyn Write| {
        client.download_to(&license, product, &version, want_upgrade_package, sink)
    });

    // Connection happens inside the deploy step; a dead FTP host must not
    // keep the download and local install from running.
    let remote: Option<Box<dyn RemoteFactory>> = if session.ftp_upload {
        let ftp = session
            .ftp
            .clone()
            .context("ftp upload requested without an ftp configuration")?;
        Some(Box::new(
            move || -> anyhow::Result<Box<dyn RemoteTarget + Send>> {
                Ok(Box::new(FtpTarget::connect(&ftp)?))
            },
        ))
    } else {
        None
    };

    let store: Arc<dyn DurableStore> = Arc::new(LocalStore::new(&config.data_dir));
    let pipeline = Arc::new(UpgradePipeline::new(
        store,
        &config.install_dir,
        config.data_dir.join("work"),
    ));

    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("upgrading to version {}", command.version));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let handle = pipeline.run_detached(command.version.clone(), source, remote)?;
    let result = handle.wait();
    spinner.finish_and_clear();

    match result {
        Ok(outcome) => {
            for line in format_outcome_lines(&outcome) {
                println!("{line}");
            }
            // The workflow is finished; the next upgrade starts fresh.
            sessions.clear(session_id)?;
            Ok(())
        }
        Err(err) => Err(err),
    }
}

pub fn status(config: &BoardConfig, version_id: &str) -> Result<()> {
    let store: Arc<dyn DurableStore> = Arc::new(LocalStore::new(&config.data_dir));
    let pipeline = UpgradePipeline::new(store, &config.install_dir, config.data_dir.join("work"));

    println!("version: {version_id}");
    let staged = pipeline.staged_archive_exists(version_id)?;
    println!("staged archive: {}", if staged { "present" } else { "absent" });

    match pipeline.read_state(version_id)? {
        Some(state) => println!("state: {}", state.as_str()),
        None => println!("state: not started"),
    }

    if let Some(record) = pipeline.read_completion_record(version_id)? {
        println!("last run:");
        for line in record.lines() {
            println!("  {line}");
        }
    }
    Ok(())
}

fn load_session(sessions: &FileSessionStore, session_id: &str) -> Result<UpgradeSession> {
    sessions
        .load(session_id)?
        .with_context(|| format!("no active upgrade session '{session_id}'; run login first"))
}

pub(crate) fn product_label(code: &str) -> &'static str {
    match Product::parse(code) {
        Some(Product::Forum) => "XenForo",
        Some(Product::ResourceManager) => "Resource Manager",
        Some(Product::MediaGallery) => "Media Gallery",
        Some(Product::EnhancedSearch) => "Enhanced Search",
        None => "unknown product",
    }
}

pub(crate) fn format_license_lines(listing: &LicenseListing) -> Vec<String> {
    let mut lines = Vec::new();
    for (license_id, info) in &listing.licenses {
        let marker = if info.likely_current_board {
            "  (this board)"
        } else {
            ""
        };
        lines.push(format!("{license_id}  {}{marker}", info.title));

        if let Some(products) = listing.products.get(license_id) {
            for code in products {
                lines.push(format!("    {code}  {}", product_label(code)));
            }
        }
    }
    lines
}

pub(crate) fn format_version_lines(listing: &VersionListing) -> Vec<String> {
    listing
        .versions
        .iter()
        .map(|(id, label)| {
            let marker = if listing.recommended.as_deref() == Some(id.as_str()) {
                "  (recommended)"
            } else {
                ""
            };
            format!("{id}  {label}{marker}")
        })
        .collect()
}

pub(crate) fn format_outcome_lines(outcome: &PipelineOutcome) -> Vec<String> {
    let mut lines = vec![
        format!("upgraded to version {}", outcome.version_id),
        format!("archive: {} ({})", outcome.staged_path, outcome.download),
        format!("sha256: {}", outcome.staged_sha256),
        format!("expanded files: {}", outcome.expanded_files),
        format!("installed files: {}", outcome.installed_files),
    ];
    match (outcome.deployed_files, &outcome.deploy_error) {
        (Some(count), _) => lines.push(format!("deployed files: {count}")),
        (None, Some(err)) => lines.push(format!("deployment failed: {err}")),
        (None, None) => {}
    }
    lines
}
