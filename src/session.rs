//! Current-user provider.

use async_trait::async_trait;

/// Supplies the id of the signed-in user, if any.
///
/// The id stamps `created_by` on new records and scopes remote queries.
#[async_trait]
pub trait CurrentUser: Send + Sync {
    async fn current_user_id(&self) -> Option<String>;
}

/// A user id fixed at construction; `None` means anonymous.
#[derive(Debug, Clone, Default)]
pub struct FixedUser(Option<String>);

impl FixedUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self(Some(id.into()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl From<Option<String>> for FixedUser {
    fn from(id: Option<String>) -> Self {
        Self(id.filter(|id| !id.trim().is_empty()))
    }
}

#[async_trait]
impl CurrentUser for FixedUser {
    async fn current_user_id(&self) -> Option<String> {
        self.0.clone()
    }
}
