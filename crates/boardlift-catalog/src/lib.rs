//! Structured extraction from the portal's semi-structured customer pages.
//! Pure parsing, no I/O: the portal client hands HTML in, records come out.
//! Ambiguous markup is dropped silently rather than reported, since a
//! license block we cannot attribute is indistinguishable from decoration.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Download anchors carry the license and product in fixed query
/// parameters: `l` is uppercase alphanumeric, `d` is lowercase letters.
const DOWNLOAD_HREF_PATTERN: &str = r"\?l=([A-Z0-9]+)&d=([a-z]+)";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LicenseCatalog {
    /// licenseId -> display title.
    pub titles: BTreeMap<String, String>,
    /// licenseId -> product codes, in discovery order, deduplicated.
    pub products: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionOption {
    pub value: String,
    pub label: String,
    pub marked_selected: bool,
}

/// Parse the customer license listing. Each `.licenses .license` block is
/// scanned for download anchors matching the fixed href pattern; anchors
/// that do not match are skipped. A block whose nested `h3 a` title cannot
/// be resolved contributes nothing, download anchors included.
pub fn parse_license_listing(html: &str) -> Result<LicenseCatalog> {
    let document = Html::parse_document(html);
    let block_selector = selector(".licenses .license")?;
    let anchor_selector = selector("a[href]")?;
    let title_selector = selector("h3 a")?;
    let href_pattern =
        Regex::new(DOWNLOAD_HREF_PATTERN).map_err(|err| anyhow!("invalid href pattern: {err}"))?;

    let mut catalog = LicenseCatalog::default();

    for block in document.select(&block_selector) {
        let Some(title) = block_title(&block, &title_selector) else {
            // Unnamed license block: cannot be attributed, drop it whole.
            continue;
        };

        let mut block_license = None;
        for anchor in block.select(&anchor_selector) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Some(captures) = href_pattern.captures(href) else {
                continue;
            };

            let license_id = captures[1].to_string();
            let product = captures[2].to_string();
            let entry = catalog.products.entry(license_id.clone()).or_default();
            if !entry.contains(&product) {
                entry.push(product);
            }
            block_license = Some(license_id);
        }

        let Some(block_license) = block_license else {
            continue;
        };
        catalog.titles.insert(block_license, title);
    }

    Ok(catalog)
}

/// Extract every option of the version `<select>` in document order.
pub fn parse_version_options(html: &str) -> Result<Vec<VersionOption>> {
    let document = Html::parse_document(html);
    let option_selector = selector("select[name=\"download_version_id\"] option")?;

    let mut options = Vec::new();
    for option in document.select(&option_selector) {
        let Some(value) = option.value().attr("value") else {
            continue;
        };

        options.push(VersionOption {
            value: value.to_string(),
            label: option.text().collect::<String>().trim().to_string(),
            marked_selected: option.value().attr("selected").is_some(),
        });
    }

    Ok(options)
}

fn block_title(block: &ElementRef<'_>, title_selector: &Selector) -> Option<String> {
    let title = block
        .select(title_selector)
        .next()?
        .text()
        .collect::<String>()
        .trim()
        .to_string();

    if title.is_empty() {
        return None;
    }
    Some(title)
}

fn selector(source: &str) -> Result<Selector> {
    Selector::parse(source).map_err(|err| anyhow!("invalid selector '{source}': {err}"))
}

#[cfg(test)]
mod tests;
