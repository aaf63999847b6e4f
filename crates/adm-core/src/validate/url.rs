//! URL Validator (spec.md §4.1).
//!
//! Called both at task creation and again immediately before fetch
//! initiation, in case the URL field mutated between the two checks
//! (defense in depth, spec.md §4.1).

use crate::error::ValidationError;

/// Validates a download URL: HTTPS-only, hostname suffix `*.apple.com`
/// (case-insensitive), no IPv4/IPv6 literal hostnames.
pub fn validate_download_url(raw: &str) -> Result<(), ValidationError> {
    let parsed = url::Url::parse(raw).map_err(|_| ValidationError::InvalidUrl)?;

    if parsed.scheme() != "https" {
        return Err(ValidationError::MustUseHttps);
    }

    let host = parsed.host_str().ok_or(ValidationError::InvalidUrl)?;

    if is_ip_literal(host) {
        return Err(ValidationError::IpLiteral);
    }

    if !has_allowed_suffix(host, "apple.com") {
        return Err(ValidationError::DisallowedDomain);
    }

    Ok(())
}

/// True if `host` is a bracketed IPv6 literal or a dotted-decimal IPv4 literal.
fn is_ip_literal(host: &str) -> bool {
    if host.starts_with('[') {
        return true;
    }
    host.parse::<std::net::Ipv4Addr>().is_ok()
}

/// True if `host` equals `suffix` or ends with `.suffix`, case-insensitively.
fn has_allowed_suffix(host: &str, suffix: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let suffix = suffix.to_ascii_lowercase();
    host == suffix || host.ends_with(&format!(".{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_https_apple_subdomain() {
        assert!(validate_download_url("https://a1.phobos.apple.com/x.ipa").is_ok());
        assert!(validate_download_url("https://APPLE.COM/x.ipa").is_ok());
    }

    #[test]
    fn rejects_non_https() {
        assert_eq!(
            validate_download_url("http://a.apple.com/x.ipa"),
            Err(ValidationError::MustUseHttps)
        );
    }

    #[test]
    fn rejects_disallowed_domain() {
        assert_eq!(
            validate_download_url("https://a.example.com/x.ipa"),
            Err(ValidationError::DisallowedDomain)
        );
        assert_eq!(
            validate_download_url("https://notapple.com.evil.net/x.ipa"),
            Err(ValidationError::DisallowedDomain)
        );
    }

    #[test]
    fn rejects_ip_literals() {
        assert_eq!(
            validate_download_url("https://93.184.216.34/x.ipa"),
            Err(ValidationError::IpLiteral)
        );
        assert_eq!(
            validate_download_url("https://[::1]/x.ipa"),
            Err(ValidationError::IpLiteral)
        );
    }

    #[test]
    fn rejects_unparseable_url() {
        assert_eq!(
            validate_download_url("not a url"),
            Err(ValidationError::InvalidUrl)
        );
    }
}
