use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    compare_version_ids, sort_version_ids_desc, trusts_portal_preselection, BoardConfig,
    Credentials, FileSessionStore, FtpConfig, Product, SelectionKind, SessionStore, UpgradeError,
    UpgradeSession, DEFAULT_PORTAL_BASE_URL,
};

#[test]
fn product_codes_round_trip() {
    for product in [
        Product::Forum,
        Product::ResourceManager,
        Product::MediaGallery,
        Product::EnhancedSearch,
    ] {
        assert_eq!(Product::parse(product.as_str()), Some(product));
    }
    assert_eq!(Product::parse("XENFORO "), Some(Product::Forum));
    assert_eq!(Product::parse("unknown"), None);
    assert!(Product::Forum.is_primary());
    assert!(!Product::MediaGallery.is_primary());
}

#[test]
fn preselection_always_trusted_for_addon_products() {
    assert!(trusts_portal_preselection(Product::MediaGallery, 1020070));
    assert!(trusts_portal_preselection(Product::ResourceManager, 0));
}

#[test]
fn preselection_for_forum_depends_on_installed_release_digit() {
    // sixth digit 8 -> trusted, sixth digit 7 -> not
    assert!(trusts_portal_preselection(Product::Forum, 1020080));
    assert!(!trusts_portal_preselection(Product::Forum, 1020070));
    // ids too short to carry the digit are never trusted
    assert!(!trusts_portal_preselection(Product::Forum, 10200));
}

#[test]
fn version_ordering_is_numeric_for_integer_ids() {
    let mut ids = vec![
        "999999".to_string(),
        "2021370".to_string(),
        "1020070".to_string(),
    ];
    sort_version_ids_desc(&mut ids);
    assert_eq!(ids, vec!["2021370", "1020070", "999999"]);
}

#[test]
fn version_ordering_handles_dotted_ids_descending() {
    let mut ids = vec!["1.0".to_string(), "2.0".to_string(), "1.5".to_string()];
    sort_version_ids_desc(&mut ids);
    assert_eq!(ids, vec!["2.0", "1.5", "1.0"]);
}

#[test]
fn version_ordering_falls_back_to_lexicographic() {
    assert_eq!(
        compare_version_ids("beta-2", "beta-1"),
        std::cmp::Ordering::Greater
    );
}

#[test]
fn session_round_trips_through_json_unchanged() {
    let session = populated_session();

    let raw = serde_json::to_string(&session).expect("must serialize session");
    let restored: UpgradeSession = serde_json::from_str(&raw).expect("must deserialize session");
    assert_eq!(restored, session);
}

#[test]
fn products_for_unknown_license_is_empty_without_error() {
    let mut session = populated_session();
    assert!(session.products_for_license("NOPE").is_empty());
    assert_eq!(session.selected_license.as_deref(), Some("ABC123"));
}

#[test]
fn products_for_known_license_records_selection() {
    let mut session = populated_session();
    session.selected_license = None;

    let products = session.products_for_license("ABC123").to_vec();
    assert_eq!(products, vec!["xenforo", "xfmg"]);
    assert_eq!(session.selected_license.as_deref(), Some("ABC123"));
}

#[test]
fn select_product_outside_available_set_is_invalid() {
    let mut session = populated_session();

    let err = session
        .select_product("xfes")
        .expect_err("must reject product outside the license's set");
    assert!(matches!(
        err,
        UpgradeError::InvalidSelection {
            kind: SelectionKind::Product,
            ..
        }
    ));
    assert_eq!(session.selected_product.as_deref(), Some("xenforo"));
}

#[test]
fn select_product_requires_a_selected_license() {
    let mut session = populated_session();
    session.selected_license = None;

    let err = session
        .select_product("xenforo")
        .expect_err("must reject product selection before a license is chosen");
    assert!(matches!(err, UpgradeError::InvalidSelection { .. }));
}

#[test]
fn select_version_outside_available_set_is_invalid() {
    let mut session = populated_session();

    let err = session
        .select_version("123")
        .expect_err("must reject version outside the available set");
    assert!(matches!(
        err,
        UpgradeError::InvalidSelection {
            kind: SelectionKind::Version,
            ..
        }
    ));

    session
        .select_version("2021370")
        .expect("must accept available version");
    assert_eq!(session.selected_version.as_deref(), Some("2021370"));
}

#[test]
fn ftp_config_normalizes_blank_host_and_port() {
    let config = FtpConfig {
        host: "  ".to_string(),
        port: 0,
        username: "deploy".to_string(),
        password: "secret".to_string(),
        root_path: "/var/www".to_string(),
        use_tls: false,
    }
    .normalized();

    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.port, 21);
}

#[test]
fn board_config_defaults_portal_base_url() {
    let config = BoardConfig::from_toml_str(concat!(
        "board_title = \"Example Forum\"\n",
        "installed_version_id = 1020070\n",
        "install_dir = \"/srv/forum\"\n",
        "data_dir = \"/srv/forum-data\"\n",
    ))
    .expect("must parse config");

    assert_eq!(config.portal_base_url, DEFAULT_PORTAL_BASE_URL);
    assert_eq!(config.installed_version_id, 1020070);
}

#[test]
fn board_config_rejects_missing_fields() {
    let err = BoardConfig::from_toml_str("board_title = \"x\"\n")
        .expect_err("must reject incomplete config");
    assert!(err.to_string().contains("failed parsing board config"));
}

#[test]
fn session_store_load_before_save_is_not_found() {
    let root = test_state_root();
    let store = FileSessionStore::new(&root);

    let loaded = store.load("default").expect("must load");
    assert!(loaded.is_none());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn session_store_save_load_round_trip_is_identical() {
    let root = test_state_root();
    let store = FileSessionStore::new(&root);
    let session = populated_session();

    store.save("default", &session).expect("must save session");
    let loaded = store
        .load("default")
        .expect("must load session")
        .expect("session must exist");
    assert_eq!(loaded, session);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn session_store_clear_is_idempotent() {
    let root = test_state_root();
    let store = FileSessionStore::new(&root);

    store
        .save("default", &populated_session())
        .expect("must save session");
    store.clear("default").expect("must clear session");
    store.clear("default").expect("clear on missing must be ok");
    assert!(store.load("default").expect("must load").is_none());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn session_store_rejects_path_like_ids() {
    let root = test_state_root();
    let store = FileSessionStore::new(&root);

    let err = store
        .load("../escape")
        .expect_err("must reject path-like session id");
    assert!(err.to_string().contains("invalid session id"));

    let _ = fs::remove_dir_all(&root);
}

fn populated_session() -> UpgradeSession {
    let mut products = BTreeMap::new();
    products.insert(
        "ABC123".to_string(),
        vec!["xenforo".to_string(), "xfmg".to_string()],
    );
    products.insert("ZZ9000".to_string(), vec!["xfes".to_string()]);

    UpgradeSession {
        credentials: Some(Credentials {
            email: "admin@example.test".to_string(),
            password: "hunter2".to_string(),
        }),
        cookie_snapshot: "{\"cookies\":[{\"raw\":\"xf_session=abc\"}]}".to_string(),
        available_products: products,
        available_versions: vec!["2021370".to_string(), "1020070".to_string()],
        selected_license: Some("ABC123".to_string()),
        selected_product: Some("xenforo".to_string()),
        selected_version: None,
        ftp_upload: true,
        ftp: Some(FtpConfig {
            host: "ftp.example.test".to_string(),
            port: 21,
            username: "deploy".to_string(),
            password: "secret".to_string(),
            root_path: "/var/www/forum".to_string(),
            use_tls: true,
        }),
    }
}

fn test_state_root() -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    path.push(format!(
        "boardlift-core-tests-{}-{}",
        std::process::id(),
        nanos
    ));
    path
}
