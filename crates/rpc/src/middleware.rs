use crate::{RpcError, RpcState};
use axum::http::HeaderMap;

/// Header carrying the admin key for privileged routes.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Guard for admin-only routes: 503 until a key is configured, 403 on a
/// missing or wrong key.
pub fn require_admin(state: &RpcState, headers: &HeaderMap) -> Result<(), RpcError> {
    let Some(expected) = state.admin_key.as_deref() else {
        return Err(RpcError::AdminUnavailable);
    };

    let presented = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if presented != expected {
        return Err(RpcError::Forbidden);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn state_with_key(key: Option<&str>) -> RpcState {
        RpcState::for_tests(key.map(str::to_string))
    }

    #[test]
    fn test_unconfigured_key_is_unavailable() {
        let state = state_with_key(None);
        let headers = HeaderMap::new();
        assert!(matches!(
            require_admin(&state, &headers),
            Err(RpcError::AdminUnavailable)
        ));
    }

    #[test]
    fn test_wrong_key_is_forbidden() {
        let state = state_with_key(Some("sekrit"));
        let mut headers = HeaderMap::new();
        headers.insert(ADMIN_KEY_HEADER, HeaderValue::from_static("nope"));
        assert!(matches!(
            require_admin(&state, &headers),
            Err(RpcError::Forbidden)
        ));
    }

    #[test]
    fn test_right_key_passes() {
        let state = state_with_key(Some("sekrit"));
        let mut headers = HeaderMap::new();
        headers.insert(ADMIN_KEY_HEADER, HeaderValue::from_static("sekrit"));
        assert!(require_admin(&state, &headers).is_ok());
    }
}
