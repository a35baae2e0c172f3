//! Common validation utilities.

use validator::ValidationError;

lazy_static::lazy_static! {
    /// Salesforce record ids are 15 (case-sensitive) or 18 (case-safe) characters.
    static ref SALESFORCE_ID_REGEX: regex::Regex =
        regex::Regex::new(r"^[a-zA-Z0-9]{15}(?:[a-zA-Z0-9]{3})?$").unwrap();

    /// Scheme and host of an instance URL, optionally followed by a port and a slash.
    static ref INSTANCE_URL_REGEX: regex::Regex =
        regex::Regex::new(r"^(https?)://([A-Za-z0-9.-]+)(?::\d{1,5})?/?$").unwrap();

    /// Metadata API versions look like `59.0`.
    static ref API_VERSION_REGEX: regex::Regex = regex::Regex::new(r"^\d{2,3}\.0$").unwrap();
}

/// Hosts that may be reached over plain HTTP (local development and tests).
const LOOPBACK_HOSTS: [&str; 2] = ["localhost", "127.0.0.1"];

/// Validates a 15 or 18 character Salesforce id.
pub fn validate_salesforce_id(id: &str) -> Result<(), ValidationError> {
    if SALESFORCE_ID_REGEX.is_match(id) {
        Ok(())
    } else {
        let mut err = ValidationError::new("salesforce_id");
        err.message = Some("Must be a 15 or 18 character Salesforce id".into());
        Err(err)
    }
}

/// Validates an org instance URL.
///
/// HTTPS is required except for loopback hosts.
pub fn validate_instance_url(url: &str) -> Result<(), ValidationError> {
    let captures = match INSTANCE_URL_REGEX.captures(url) {
        Some(c) => c,
        None => {
            let mut err = ValidationError::new("instance_url");
            err.message = Some("Instance URL must be a bare scheme://host URL".into());
            return Err(err);
        }
    };

    let scheme = &captures[1];
    let host = &captures[2];
    if scheme == "http" && !LOOPBACK_HOSTS.contains(&host) {
        let mut err = ValidationError::new("instance_url_scheme");
        err.message = Some("Instance URL must use https".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a Salesforce API version string such as `59.0`.
pub fn validate_api_version(version: &str) -> Result<(), ValidationError> {
    if API_VERSION_REGEX.is_match(version) {
        Ok(())
    } else {
        let mut err = ValidationError::new("api_version");
        err.message = Some("API version must look like 59.0".into());
        Err(err)
    }
}
