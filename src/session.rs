use std::sync::Arc;

use parking_lot::RwLock;

use crate::data::AccountService;
use crate::error::ApiError;
use crate::model::{Login, PasswordChange, ProfileUpdate, Registration, User};

/// Tracks who is signed in. Credentials themselves live in the client's
/// cookie store; this only caches the profile they belong to.
pub struct Manager {
    accounts: Arc<dyn AccountService>,
    current: RwLock<Option<User>>,
}

impl Manager {
    pub fn new(accounts: Arc<dyn AccountService>) -> Self {
        Self {
            accounts,
            current: RwLock::new(None),
        }
    }

    pub fn current(&self) -> Option<User> {
        self.current.read().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn login(&self, login: &Login) -> Result<User, ApiError> {
        self.accounts.login(login)?;
        let user = self.accounts.profile()?;
        tracing::info!(user = %user.nickname, "signed in");
        *self.current.write() = Some(user.clone());
        Ok(user)
    }

    /// Registration does not sign the user in.
    pub fn register(&self, registration: &Registration) -> Result<(), ApiError> {
        self.accounts.register(registration)
    }

    /// Forgets the local profile even when the server call fails.
    pub fn logout(&self) -> Result<(), ApiError> {
        let result = self.accounts.logout();
        self.current.write().take();
        if let Err(err) = &result {
            tracing::debug!(error = %err, "logout request failed");
        }
        result
    }

    /// Asks the profile endpoint who the held cookies belong to. An
    /// unauthorized answer means signed out and is not an error.
    pub fn restore(&self) -> Result<Option<User>, ApiError> {
        match self.accounts.profile() {
            Ok(user) => {
                *self.current.write() = Some(user.clone());
                Ok(Some(user))
            }
            Err(err) if err.is_unauthorized() => {
                self.current.write().take();
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        let user = self.accounts.update_profile(update)?;
        *self.current.write() = Some(user.clone());
        Ok(user)
    }

    pub fn change_password(&self, change: &PasswordChange) -> Result<(), ApiError> {
        self.accounts.change_password(change)
    }

    pub fn delete_account(&self) -> Result<(), ApiError> {
        self.accounts.delete_account()?;
        self.current.write().take();
        Ok(())
    }
}
