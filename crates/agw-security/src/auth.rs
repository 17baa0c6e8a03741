// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Control-plane client authentication.
//!
//! Static API keys compared in constant time. When client auth is
//! disabled (local testing), every client maps to the anonymous principal.

use subtle::ConstantTimeEq;

/// Principal id used when authentication is disabled.
pub const ANONYMOUS_PRINCIPAL: &str = "anonymous";

/// Verifier over the configured API key set.
#[derive(Clone)]
pub struct ClientKeyVerifier {
    keys: Vec<String>,
    require_auth: bool,
}

impl std::fmt::Debug for ClientKeyVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientKeyVerifier")
            .field("keys", &format!("[{} redacted]", self.keys.len()))
            .field("require_auth", &self.require_auth)
            .finish()
    }
}

impl ClientKeyVerifier {
    pub fn new(keys: Vec<String>, require_auth: bool) -> Self {
        Self { keys, require_auth }
    }

    /// Verifies a presented client key.
    ///
    /// Returns the principal id on success. Each configured key maps to a
    /// stable principal (`client-<index>`), so rate-limit buckets follow
    /// the key rather than the connection.
    pub fn verify(&self, provided: Option<&str>) -> Option<String> {
        if !self.require_auth {
            return Some(ANONYMOUS_PRINCIPAL.to_string());
        }
        let provided = provided?;
        for (i, key) in self.keys.iter().enumerate() {
            if constant_time_equals(key, provided) {
                return Some(format!("client-{i}"));
            }
        }
        None
    }

    /// True when no keys are configured while auth is required. Everything
    /// is rejected in that state; the doctor audit flags it.
    pub fn is_locked_out(&self) -> bool {
        self.require_auth && self.keys.is_empty()
    }
}

fn constant_time_equals(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_key_yields_principal() {
        let verifier = ClientKeyVerifier::new(vec!["k1".into(), "k2".into()], true);
        assert_eq!(verifier.verify(Some("k1")).as_deref(), Some("client-0"));
        assert_eq!(verifier.verify(Some("k2")).as_deref(), Some("client-1"));
    }

    #[test]
    fn invalid_or_missing_key_rejected() {
        let verifier = ClientKeyVerifier::new(vec!["k1".into()], true);
        assert!(verifier.verify(Some("wrong")).is_none());
        assert!(verifier.verify(None).is_none());
    }

    #[test]
    fn auth_disabled_maps_to_anonymous() {
        let verifier = ClientKeyVerifier::new(vec![], false);
        assert_eq!(
            verifier.verify(None).as_deref(),
            Some(ANONYMOUS_PRINCIPAL)
        );
    }

    #[test]
    fn no_keys_with_auth_required_is_locked_out() {
        let verifier = ClientKeyVerifier::new(vec![], true);
        assert!(verifier.is_locked_out());
        assert!(verifier.verify(Some("anything")).is_none());
    }

    #[test]
    fn debug_redacts_keys() {
        let verifier = ClientKeyVerifier::new(vec!["topsecret".into()], true);
        let debug = format!("{verifier:?}");
        assert!(!debug.contains("topsecret"));
    }

    #[test]
    fn keys_of_different_length_do_not_match() {
        let verifier = ClientKeyVerifier::new(vec!["abcdef".into()], true);
        assert!(verifier.verify(Some("abc")).is_none());
        assert!(verifier.verify(Some("abcdefg")).is_none());
    }
}
