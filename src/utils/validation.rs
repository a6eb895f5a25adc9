//! Input Format Validation
//!
//! Shared validators for the request surface. Addresses are 20-byte hex
//! strings prefixed with `0x`; asset symbols are 3-10 uppercase
//! alphanumerics.

use validator::ValidationError;

/// Validate a `0x`-prefixed 40-hex-char address.
pub fn validate_address(address: &str) -> Result<(), ValidationError> {
    if is_valid_address(address) {
        Ok(())
    } else {
        let mut err = ValidationError::new("address");
        err.message = Some("address must be a 0x-prefixed 40-character hex string".into());
        Err(err)
    }
}

/// Validate a 3-10 character uppercase alphanumeric asset symbol.
pub fn validate_asset_symbol(asset: &str) -> Result<(), ValidationError> {
    if is_valid_asset_symbol(asset) {
        Ok(())
    } else {
        let mut err = ValidationError::new("asset");
        err.message = Some("asset must be 3-10 uppercase alphanumeric characters".into());
        Err(err)
    }
}

pub fn is_valid_address(address: &str) -> bool {
    let Some(hex) = address.strip_prefix("0x") else {
        return false;
    };
    hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit())
}

pub fn is_valid_asset_symbol(asset: &str) -> bool {
    (3..=10).contains(&asset.len())
        && asset
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

/// Canonical lowercase form of an address.
pub fn normalize_address(address: &str) -> String {
    address.to_lowercase()
}

/// Flatten `validator` derive errors into one human-readable message.
pub fn describe_validation_errors(errors: &validator::ValidationErrors) -> String {
    let mut parts: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(message) => format!("{field}: {message}"),
                None => format!("{field} is invalid"),
            })
        })
        .collect();
    parts.sort();
    parts.join("; ")
}
