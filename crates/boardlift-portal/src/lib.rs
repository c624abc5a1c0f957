//! Blocking HTTP client for the vendor customer portal. Authentication is
//! cookie based; the jar can be exported to a string snapshot and restored
//! later so a workflow session survives across processes.

mod client;
mod cookies;

pub use client::{
    LicenseInfo, LicenseListing, PortalClient, VersionListing, USER_AGENT,
};
