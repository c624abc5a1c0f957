#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Product {
    Forum,
    ResourceManager,
    MediaGallery,
    EnhancedSearch,
}

impl Product {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Forum => "xenforo",
            Self::ResourceManager => "xfresource",
            Self::MediaGallery => "xfmg",
            Self::EnhancedSearch => "xfes",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "xenforo" => Some(Self::Forum),
            "xfresource" => Some(Self::ResourceManager),
            "xfmg" => Some(Self::MediaGallery),
            "xfes" => Some(Self::EnhancedSearch),
            _ => None,
        }
    }

    /// The core platform product; addons are everything else.
    pub fn is_primary(self) -> bool {
        matches!(self, Self::Forum)
    }
}

/// Whether the portal's `selected` marker on a version option can be
/// believed. The marker is wrong for the forum product on installations
/// whose version id carries a release digit of 7 or lower at the sixth
/// decimal position, so only newer installations trust it there.
pub fn trusts_portal_preselection(product: Product, installed_version_id: u64) -> bool {
    if !product.is_primary() {
        return true;
    }

    installed_version_id
        .to_string()
        .as_bytes()
        .get(5)
        .map(|digit| digit.wrapping_sub(b'0') > 7)
        .unwrap_or(false)
}
