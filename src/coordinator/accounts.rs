//! Account records
//!
//! Password hashes and salts are computed by clients. They arrive base64
//! encoded and are stored as decoded text, never inspected here.

use crate::common::{decode_transport, DirectoryStore, Error, Result, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stored credential triple returned to a client at login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub id: UserId,
    pub password_hash: String,
    pub salt: String,
}

pub struct AccountStore {
    store: Arc<dyn DirectoryStore>,
}

impl AccountStore {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }

    /// Create an account from transport-encoded hash and salt.
    pub fn create_account(
        &self,
        username: &str,
        encoded_hash: &str,
        encoded_salt: &str,
    ) -> Result<UserId> {
        let password_hash = decode_transport(encoded_hash)?;
        let salt = decode_transport(encoded_salt)?;
        let id = self.store.insert_user(username, &password_hash, &salt)?;
        tracing::debug!("Created account {} (id {})", username, id);
        Ok(id)
    }

    pub fn lookup_credentials(&self, username: &str) -> Result<Credentials> {
        self.store
            .find_user(username)?
            .map(|user| Credentials {
                id: user.id,
                password_hash: user.password,
                salt: user.salt,
            })
            .ok_or_else(|| Error::NotFound(format!("user {}", username)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{encode_transport, MemStore};

    fn accounts() -> (AccountStore, Arc<dyn DirectoryStore>) {
        let store: Arc<dyn DirectoryStore> = Arc::new(MemStore::new());
        (AccountStore::new(store.clone()), store)
    }

    #[test]
    fn test_create_then_lookup() {
        let (accounts, _) = accounts();
        let id = accounts
            .create_account(
                "alice",
                &encode_transport("$2b$12$hash"),
                &encode_transport("pepper"),
            )
            .unwrap();

        let creds = accounts.lookup_credentials("alice").unwrap();
        assert_eq!(
            creds,
            Credentials {
                id,
                password_hash: "$2b$12$hash".to_string(),
                salt: "pepper".to_string(),
            }
        );
    }

    #[test]
    fn test_duplicate_username() {
        let (accounts, store) = accounts();
        let h = encode_transport("h");
        let s = encode_transport("s");
        assert!(accounts.create_account("alice", &h, &s).is_ok());
        let err = accounts.create_account("alice", &h, &s).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert_eq!(store.counts().unwrap().users, 1);
    }

    #[test]
    fn test_bad_encoding_stores_nothing() {
        let (accounts, store) = accounts();
        let err = accounts
            .create_account("alice", "%%%", &encode_transport("s"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidEncoding(_)));
        assert_eq!(store.counts().unwrap().users, 0);
    }

    #[test]
    fn test_unknown_user() {
        let (accounts, _) = accounts();
        assert!(matches!(
            accounts.lookup_credentials("nobody"),
            Err(Error::NotFound(_))
        ));
    }
}
