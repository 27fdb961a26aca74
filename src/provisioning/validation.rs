//! Request-side and response-side checks.

use std::collections::BTreeSet;

use super::constants::{MAX_LENGTH_ID_TYPE, MAX_LENGTH_SERVER_SEED};
use super::policy::PinPolicy;
use super::types::InputMethod;
use crate::error::{ErrorCode, JcsResult};

/// Protocol identifiers are 1 to 32 printable ASCII characters without spaces.
pub fn validate_id(id: &str) -> JcsResult<()> {
    if id.is_empty() || id.len() > MAX_LENGTH_ID_TYPE {
        return Err(ErrorCode::E208_InvalidValue(
            "id".to_string(),
            format!("length {} outside 1..={MAX_LENGTH_ID_TYPE}", id.len()),
        ));
    }
    if let Some(c) = id.bytes().find(|c| !(0x21..=0x7e).contains(c)) {
        return Err(ErrorCode::E208_InvalidValue(
            "id".to_string(),
            format!("character 0x{c:02x} not allowed"),
        ));
    }
    Ok(())
}

/// Server seeds are limited to 64 bytes.
pub fn validate_server_seed(seed: &[u8]) -> JcsResult<()> {
    if seed.len() > MAX_LENGTH_SERVER_SEED {
        return Err(ErrorCode::E506_PolicyViolation(format!(
            "server seed > {MAX_LENGTH_SERVER_SEED} bytes"
        )));
    }
    Ok(())
}

/// PIN caching is only meaningful behind a trusted GUI.
pub fn validate_pin_caching(enable_pin_caching: bool, pin_policy: Option<&PinPolicy>) -> JcsResult<()> {
    let trusted_gui = pin_policy.and_then(PinPolicy::input_method) == Some(InputMethod::TrustedGui);
    if enable_pin_caching && !trusted_gui {
        return Err(ErrorCode::E506_PolicyViolation(format!(
            "\"enablePinCaching\" must be combined with {}",
            InputMethod::TrustedGui
        )));
    }
    Ok(())
}

/// Every returned item must have been requested.
pub fn validate_subset(
    what: &str,
    requested: &BTreeSet<String>,
    returned: &BTreeSet<String>,
) -> JcsResult<()> {
    match returned.difference(requested).next() {
        Some(extra) => Err(ErrorCode::E208_InvalidValue(
            what.to_string(),
            format!("\"{extra}\" was not requested"),
        )),
        None => Ok(()),
    }
}

/// Both session ids must match the current session.
pub fn validate_session(
    expected_client: &str,
    expected_server: &str,
    client_session_id: &str,
    server_session_id: &str,
) -> JcsResult<()> {
    if expected_client != client_session_id || expected_server != server_session_id {
        return Err(ErrorCode::E501_SessionMismatch);
    }
    Ok(())
}
