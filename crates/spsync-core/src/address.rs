//! Library web URL addressing.
//!
//! URL format: `https://{tenant}.sharepoint.com/sites/{site}/{listName}`
//! or `https://{tenant}.sharepoint.com/sites/{site}/lists/{listName}`.

use crate::error::{Result, SyncError};

const SHAREPOINT_DOMAIN_SUFFIX: &str = ".sharepoint.com";

/// Components of a parsed library web URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryUrl {
    /// Full host, e.g. `contoso.sharepoint.com`
    pub domain: String,
    pub tenant: String,
    pub site: String,
    pub list_name: String,
}

impl LibraryUrl {
    /// Site-relative base used by the legacy REST API.
    pub fn site_url(&self) -> String {
        format!("https://{}/sites/{}", self.domain, self.site)
    }
}

fn invalid(url: &str) -> SyncError {
    SyncError::InvalidUrl(format!(
        "{url}, must be on format https://{{tenant}}.sharepoint.com/sites/{{site}}/{{library}}"
    ))
}

/// Parse a library web URL into tenant, site and list components.
pub fn parse_library_url(url: &str) -> Result<LibraryUrl> {
    let trimmed = url.strip_suffix('/').unwrap_or(url);
    let rest = trimmed.strip_prefix("https://").ok_or_else(|| invalid(url))?;

    let parts: Vec<&str> = rest.split('/').collect();
    let domain = parts[0];
    let tenant = domain
        .strip_suffix(SHAREPOINT_DOMAIN_SUFFIX)
        .filter(|t| !t.is_empty() && !t.contains('.'))
        .ok_or_else(|| invalid(url))?;

    let list_name = match parts.as_slice() {
        [_, "sites", _, list] => *list,
        [_, "sites", _, lists, list] if lists.eq_ignore_ascii_case("lists") => *list,
        _ => return Err(invalid(url)),
    };
    let site = parts[2];

    if site.is_empty() || list_name.is_empty() {
        return Err(invalid(url));
    }

    Ok(LibraryUrl {
        domain: domain.to_string(),
        tenant: tenant.to_string(),
        site: site.to_string(),
        list_name: list_name.to_string(),
    })
}
