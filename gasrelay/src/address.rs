//! Address syntax checks.
//!
//! Addresses arrive from browsers in every casing. All-lowercase and
//! all-uppercase hex are accepted as-is; mixed case must carry a valid
//! EIP-55 checksum, otherwise a mistyped character would silently redirect
//! funds.

use alloy_primitives::Address;

/// Parses a 20-byte hex address, with or without a `0x` prefix.
///
/// Returns `None` if the input is not 40 hex digits or if a mixed-case input
/// fails the EIP-55 checksum.
#[must_use]
pub fn parse_address(input: &str) -> Option<Address> {
    let input = input.trim();
    let body = input.strip_prefix("0x").unwrap_or(input);
    if body.len() != 40 || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let has_upper = body.bytes().any(|b| b.is_ascii_uppercase());
    let has_lower = body.bytes().any(|b| b.is_ascii_lowercase());
    if has_upper && has_lower {
        Address::parse_checksummed(format!("0x{body}"), None).ok()
    } else {
        body.parse().ok()
    }
}

/// Case-normalized key under which an address is recorded by rate limiting.
#[must_use]
pub fn normalized_key(address: &Address) -> String {
    format!("{address:#x}")
}
