//! Identity provider abstraction.

use parking_lot::RwLock;

/// Tells the engine who is signed in.
pub trait IdentityProvider: Send + Sync {
    /// Returns the current user, or `None` if nobody is signed in.
    fn current_user(&self) -> Option<String>;
}

/// An identity provider holding a fixed, replaceable user.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    user: RwLock<Option<String>>,
}

impl StaticIdentity {
    /// Creates a provider with the given user signed in.
    pub fn signed_in(user: impl Into<String>) -> Self {
        Self {
            user: RwLock::new(Some(user.into())),
        }
    }

    /// Creates a provider with nobody signed in.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Replaces the signed-in user.
    pub fn set_user(&self, user: Option<String>) {
        *self.user.write() = user;
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<String> {
        self.user.read().clone()
    }
}

impl<I: IdentityProvider + ?Sized> IdentityProvider for std::sync::Arc<I> {
    fn current_user(&self) -> Option<String> {
        (**self).current_user()
    }
}
