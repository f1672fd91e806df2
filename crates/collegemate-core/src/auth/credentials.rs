//! Registered accounts
//!
//! Accounts are kept as one list under [`KEY_ACCOUNTS`]. Email is the unique
//! key and is compared case-sensitively, exactly as entered.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::AuthError;
use crate::store::{KeyValueStore, KEY_ACCOUNTS};

/// A registered portal user
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub name: String,
    #[serde(default)]
    pub college: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub year: String,
    #[serde(rename = "rollno", default)]
    pub roll_number: String,
    pub email: String,
    /// Compared by exact match; never hashed
    pub password: String,
    #[serde(default)]
    pub is_verified: bool,
}

impl Account {
    /// Minimal account with only the identifying fields set
    pub fn new(name: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn with_college(mut self, college: impl Into<String>) -> Self {
        self.college = college.into();
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_year(mut self, year: impl Into<String>) -> Self {
        self.year = year.into();
        self
    }

    pub fn with_roll_number(mut self, roll_number: impl Into<String>) -> Self {
        self.roll_number = roll_number.into();
        self
    }
}

/// Durable list of registered accounts
pub trait CredentialStore: Send + Sync {
    /// All registered accounts, empty if none
    fn list_accounts(&self) -> Result<Vec<Account>, AuthError>;

    /// Persist `candidate` as verified, rejecting an email already in use
    fn register(&self, candidate: Account) -> Result<Account, AuthError>;

    /// Look up an account by exact email
    fn find_by_email(&self, email: &str) -> Result<Option<Account>, AuthError> {
        Ok(self
            .list_accounts()?
            .into_iter()
            .find(|account| account.email == email))
    }

    /// Look up an account by exact (email, password) pair
    fn find_by_credentials(&self, email: &str, password: &str) -> Result<Option<Account>, AuthError> {
        Ok(self
            .list_accounts()?
            .into_iter()
            .find(|account| account.email == email && account.password == password))
    }

    fn is_registered(&self, email: &str) -> Result<bool, AuthError> {
        Ok(self.find_by_email(email)?.is_some())
    }
}

/// [`CredentialStore`] over a [`KeyValueStore`]
#[derive(Clone)]
pub struct KvCredentialStore {
    store: Arc<dyn KeyValueStore>,
}

impl KvCredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

impl CredentialStore for KvCredentialStore {
    fn list_accounts(&self) -> Result<Vec<Account>, AuthError> {
        Ok(self.store.load_or_default(KEY_ACCOUNTS)?)
    }

    fn register(&self, mut candidate: Account) -> Result<Account, AuthError> {
        let mut accounts = self.list_accounts()?;

        if accounts.iter().any(|a| a.email == candidate.email) {
            warn!(email = %candidate.email, "registration rejected: email already registered");
            return Err(AuthError::DuplicateEmail(candidate.email));
        }

        candidate.is_verified = true;
        accounts.push(candidate.clone());
        self.store.save(KEY_ACCOUNTS, &accounts)?;

        info!(email = %candidate.email, total = accounts.len(), "account registered");
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn test_store() -> KvCredentialStore {
        KvCredentialStore::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_empty_store_lists_nothing() {
        let store = test_store();
        assert!(store.list_accounts().unwrap().is_empty());
    }

    #[test]
    fn test_register_forces_verified() {
        let store = test_store();
        let stored = store
            .register(Account::new("Asha", "asha@college.edu", "pw"))
            .unwrap();
        assert!(stored.is_verified);
        assert!(store.list_accounts().unwrap()[0].is_verified);
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let store = test_store();
        store
            .register(Account::new("Asha", "asha@college.edu", "pw"))
            .unwrap();

        let err = store
            .register(Account::new("Someone Else", "asha@college.edu", "other"))
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail(ref e) if e == "asha@college.edu"));
        assert_eq!(store.list_accounts().unwrap().len(), 1);
    }

    #[test]
    fn test_email_comparison_is_case_sensitive() {
        let store = test_store();
        store
            .register(Account::new("Asha", "asha@college.edu", "pw"))
            .unwrap();
        assert!(store
            .register(Account::new("Asha", "Asha@College.edu", "pw"))
            .is_ok());
        assert_eq!(store.list_accounts().unwrap().len(), 2);
    }

    #[test]
    fn test_find_by_credentials_requires_exact_pair() {
        let store = test_store();
        store
            .register(Account::new("Asha", "asha@college.edu", "secret"))
            .unwrap();

        assert!(store
            .find_by_credentials("asha@college.edu", "secret")
            .unwrap()
            .is_some());
        assert!(store
            .find_by_credentials("asha@college.edu", "Secret")
            .unwrap()
            .is_none());
        assert!(store
            .find_by_credentials("nobody@college.edu", "secret")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_account_json_layout() {
        let account = Account::new("Asha", "asha@college.edu", "pw")
            .with_college("GEC")
            .with_branch("CSE")
            .with_year("3")
            .with_roll_number("21CS042");
        let json = serde_json::to_value(&account).unwrap();

        assert_eq!(json["rollno"], "21CS042");
        assert_eq!(json["isVerified"], false);
        assert!(json.get("roll_number").is_none());
    }
}
