use crate::{parse_license_listing, parse_version_options};

const LICENSE_PAGE: &str = r#"
<html><body>
<div class="licenses">
  <div class="license">
    <h3><a href="/customers/#ABC123">Example Forum License</a></h3>
    <div class="downloads">
      <a href="/customers/download/?l=ABC123&d=xenforo">Download XenForo</a>
      <a href="/customers/download/?l=ABC123&d=xfmg">Download Media Gallery</a>
      <a href="/customers/account">Account</a>
    </div>
  </div>
  <div class="license">
    <h3><a href="/customers/#ZZ9000">Second Board</a></h3>
    <div class="downloads">
      <a href="/customers/download/?l=ZZ9000&d=xfes">Download Enhanced Search</a>
    </div>
  </div>
  <div class="license">
    <div class="downloads">
      <a href="/customers/download/?l=GHOST1&d=xenforo">Download</a>
    </div>
  </div>
</div>
</body></html>
"#;

#[test]
fn license_listing_extracts_products_per_license() {
    let catalog = parse_license_listing(LICENSE_PAGE).expect("must parse listing");

    assert_eq!(
        catalog.products.get("ABC123").map(Vec::as_slice),
        Some(["xenforo".to_string(), "xfmg".to_string()].as_slice())
    );
    assert_eq!(
        catalog.products.get("ZZ9000").map(Vec::as_slice),
        Some(["xfes".to_string()].as_slice())
    );
}

#[test]
fn license_listing_extracts_titles() {
    let catalog = parse_license_listing(LICENSE_PAGE).expect("must parse listing");

    assert_eq!(
        catalog.titles.get("ABC123").map(String::as_str),
        Some("Example Forum License")
    );
    assert_eq!(
        catalog.titles.get("ZZ9000").map(String::as_str),
        Some("Second Board")
    );
}

#[test]
fn untitled_license_block_contributes_nothing() {
    let catalog = parse_license_listing(LICENSE_PAGE).expect("must parse listing");

    assert!(!catalog.titles.contains_key("GHOST1"));
    assert!(!catalog.products.contains_key("GHOST1"));
}

#[test]
fn anchors_outside_the_href_pattern_are_skipped() {
    let html = r#"
    <div class="licenses"><div class="license">
      <h3><a>Title Only</a></h3>
      <a href="/customers/download/?l=lower123&d=xenforo">bad license id</a>
      <a href="/customers/download/?l=ABC123&d=XENFORO">bad product code</a>
      <a href="/customers/download/">no query</a>
    </div></div>
    "#;

    let catalog = parse_license_listing(html).expect("must parse listing");
    assert!(catalog.products.is_empty());
    assert!(catalog.titles.is_empty());
}

#[test]
fn empty_page_yields_empty_catalog() {
    let catalog = parse_license_listing("<html><body></body></html>").expect("must parse");
    assert!(catalog.titles.is_empty());
    assert!(catalog.products.is_empty());
}

#[test]
fn duplicate_product_anchors_are_deduplicated() {
    let html = r#"
    <div class="licenses"><div class="license">
      <h3><a>Title</a></h3>
      <a href="?l=ABC123&d=xenforo">one</a>
      <a href="?l=ABC123&d=xenforo">two</a>
    </div></div>
    "#;

    let catalog = parse_license_listing(html).expect("must parse listing");
    assert_eq!(
        catalog.products.get("ABC123").map(Vec::as_slice),
        Some(["xenforo".to_string()].as_slice())
    );
}

#[test]
fn version_options_preserve_document_order_and_selection_marker() {
    let html = r#"
    <form>
      <select name="download_version_id">
        <option value="1.0">1.0.0</option>
        <option value="2.0" selected="selected">2.0.0</option>
        <option value="1.5">1.5.0</option>
      </select>
    </form>
    "#;

    let options = parse_version_options(html).expect("must parse options");
    let values: Vec<&str> = options.iter().map(|opt| opt.value.as_str()).collect();
    assert_eq!(values, vec!["1.0", "2.0", "1.5"]);

    let selected: Vec<&str> = options
        .iter()
        .filter(|opt| opt.marked_selected)
        .map(|opt| opt.value.as_str())
        .collect();
    assert_eq!(selected, vec!["2.0"]);
    assert_eq!(options[1].label, "2.0.0");
}

#[test]
fn version_options_absent_select_yields_empty() {
    let options = parse_version_options("<html><body><p>no form</p></body></html>")
        .expect("must parse page without a select");
    assert!(options.is_empty());
}

#[test]
fn version_options_ignore_other_selects() {
    let html = r#"
    <select name="something_else"><option value="x">x</option></select>
    <select name="download_version_id"><option value="9">9</option></select>
    "#;

    let options = parse_version_options(html).expect("must parse options");
    assert_eq!(options.len(), 1);
    assert_eq!(options[0].value, "9");
}
