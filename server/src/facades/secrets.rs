//! Secrets facade: values are encrypted at rest with Fernet-equivalent
//! authenticated encryption (see `kvault_core::crypto`) before they ever
//! reach the engine.

use std::sync::Arc;

use kvault_core::{crypto, Clock, FernetKey, Value};

use crate::error::EngineError;
use crate::storage::KvEngine;

pub const SECRETS_STORE: &str = "secrets";

/// Resolves the symmetric key used to encrypt/decrypt secret values.
///
/// Production deployments inject a key-management client here; the
/// [`FixedKeyResolver`] below is the fixed test key the original source
/// used as a placeholder for its own (commented-out) key-management call.
pub trait KeyResolver: Send + Sync {
    fn resolve_key(&self) -> FernetKey;
}

/// A resolver that always returns the same, statically-configured key.
/// Grounded on `original_source/plugins/sensitive.py`'s `_resolve_key`,
/// which returns a hardcoded key with a comment noting the production path
/// would call out to a key-management service.
pub struct FixedKeyResolver(FernetKey);

impl FixedKeyResolver {
    pub fn new(key: FernetKey) -> Self {
        Self(key)
    }
}

impl KeyResolver for FixedKeyResolver {
    fn resolve_key(&self) -> FernetKey {
        self.0.clone()
    }
}

pub struct SecretsFacade {
    engine: Arc<KvEngine>,
    clock: Arc<dyn Clock>,
    resolver: Arc<dyn KeyResolver>,
}

impl SecretsFacade {
    pub fn new(engine: Arc<KvEngine>, clock: Arc<dyn Clock>, resolver: Arc<dyn KeyResolver>) -> Self {
        engine.create_store(SECRETS_STORE).expect("creating the secrets store cannot fail");
        Self { engine, clock, resolver }
    }

    /// Encrypts `value` and stores the resulting token as the record's
    /// (opaque byte-string) value. The plaintext never touches the engine.
    pub fn add_confidential_key(&self, key: &str, value: &str, ttl_secs: Option<i64>, readonly: bool) -> Result<(), EngineError> {
        let fernet_key = self.resolver.resolve_key();
        let token = crypto::encrypt(&fernet_key, value.as_bytes(), self.clock.now().max(0) as u64);
        self.engine.add_key(SECRETS_STORE, key, Value::Bytes(token.into_bytes()), ttl_secs, readonly, Default::default())
    }

    /// Reads and decrypts a confidential key. Returns `Ok(None)` for a
    /// missing or expired key, matching [`KvEngine::get_key`]'s hide-on-read
    /// semantics; a present-but-undecryptable record is a [`EngineError::DecodeError`].
    pub fn get_confidential_key(&self, key: &str) -> Result<Option<String>, EngineError> {
        let Some(value) = self.engine.get_key(SECRETS_STORE, key)? else {
            return Ok(None);
        };
        let Value::Bytes(token_bytes) = value else {
            return Err(EngineError::DecodeError(format!("secret {key} was not stored as bytes")));
        };
        let token = String::from_utf8(token_bytes).map_err(|e| EngineError::DecodeError(e.to_string()))?;
        let fernet_key = self.resolver.resolve_key();
        let plaintext = crypto::decrypt(&fernet_key, &token).map_err(|e| EngineError::DecodeError(e.to_string()))?;
        String::from_utf8(plaintext).map(Some).map_err(|e| EngineError::DecodeError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kvault_core::ManualClock;

    use super::*;

    fn facade() -> SecretsFacade {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let engine = Arc::new(KvEngine::new(clock.clone()));
        let key = FernetKey::from_base64("MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=").unwrap();
        SecretsFacade::new(engine, clock, Arc::new(FixedKeyResolver::new(key)))
    }

    #[test]
    fn round_trips_through_encryption() {
        let facade = facade();
        facade.add_confidential_key("pw", "hunter2", None, false).unwrap();
        assert_eq!(facade.get_confidential_key("pw").unwrap(), Some("hunter2".to_string()));
    }

    #[test]
    fn stored_bytes_never_equal_the_plaintext() {
        let facade = facade();
        facade.add_confidential_key("pw", "hunter2", None, false).unwrap();
        let record = facade.engine.get_record(SECRETS_STORE, "pw").unwrap().unwrap();
        let Value::Bytes(stored) = record.value else { panic!("expected bytes") };
        assert_ne!(stored, b"hunter2".to_vec());
    }

    #[test]
    fn two_writes_of_the_same_plaintext_are_non_deterministic() {
        let facade = facade();
        facade.add_confidential_key("a", "same", None, false).unwrap();
        facade.add_confidential_key("b", "same", None, false).unwrap();
        let a = facade.engine.get_record(SECRETS_STORE, "a").unwrap().unwrap();
        let b = facade.engine.get_record(SECRETS_STORE, "b").unwrap().unwrap();
        assert_ne!(a.value, b.value, "random IV must make ciphertexts differ");
    }

    #[test]
    fn missing_key_returns_none() {
        let facade = facade();
        assert_eq!(facade.get_confidential_key("nope").unwrap(), None);
    }
}
