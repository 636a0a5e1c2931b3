//! Staging recipient rewriting.

use crate::config::StagingRedirectConfig;
use crate::error::AddressError;

/// Split `user@domain`, rejecting anything without exactly one `@`.
pub fn split_address(addr: &str) -> Result<(&str, &str), AddressError> {
    let mut parts = addr.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(user), Some(domain), None) if !user.is_empty() && !domain.is_empty() => {
            Ok((user, domain))
        }
        _ => Err(AddressError::Malformed(addr.to_string())),
    }
}

/// Substitute `{user}` and `{domain}` of `addr` into `template`.
pub fn apply_template(template: &str, addr: &str) -> Result<String, AddressError> {
    let (user, domain) = split_address(addr)?;
    Ok(template.replace("{user}", user).replace("{domain}", domain))
}

/// Rewrite a `to` recipient into its staging alias.
///
/// Returns the address unchanged when redirection is disabled.
pub fn format_staging_email(
    addr: &str,
    staging: &StagingRedirectConfig,
) -> Result<String, AddressError> {
    if !staging.enabled {
        return Ok(addr.to_string());
    }
    apply_template(&staging.to_template, addr)
}

/// Same as [`format_staging_email`] but with the cc template.
pub fn format_staging_cc(
    addr: &str,
    staging: &StagingRedirectConfig,
) -> Result<String, AddressError> {
    if !staging.enabled {
        return Ok(addr.to_string());
    }
    apply_template(&staging.cc_template, addr)
}
