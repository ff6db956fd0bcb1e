use std::sync::Arc;

use tracing::info;

use tandem_db::{Database, blocking};
use tandem_types::api::RegisterIdentityRequest;
use tandem_types::error::ChatError;
use tandem_types::ids::IdentityId;
use tandem_types::models::Identity;

const DISPLAY_NAME_MIN: usize = 3;
const DISPLAY_NAME_MAX: usize = 64;

/// Maps authentication subjects to internal identities.
#[derive(Clone)]
pub struct IdentityResolver {
    db: Arc<Database>,
}

impl IdentityResolver {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Internal id of `subject`; `NotFound` if it never onboarded.
    pub async fn resolve(&self, subject: &str) -> Result<IdentityId, ChatError> {
        self.identity(subject).await.map(|identity| identity.id)
    }

    pub async fn identity(&self, subject: &str) -> Result<Identity, ChatError> {
        let key = subject.to_string();
        blocking(&self.db, move |db| db.identity_by_subject(&key))
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("no account for subject {}", subject)))
    }

    /// Onboard `subject`. Re-registering returns the existing identity
    /// unchanged, with `false` for "created".
    pub async fn register(
        &self,
        subject: &str,
        req: RegisterIdentityRequest,
    ) -> Result<(Identity, bool), ChatError> {
        let display_name = req.display_name.trim().to_string();
        let len = display_name.chars().count();
        if !(DISPLAY_NAME_MIN..=DISPLAY_NAME_MAX).contains(&len) {
            return Err(ChatError::InvalidArgument(format!(
                "display_name must be {}-{} characters",
                DISPLAY_NAME_MIN, DISPLAY_NAME_MAX
            )));
        }
        let avatar_url = req
            .avatar_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        let key = subject.to_string();
        let (identity, created) = blocking(&self.db, move |db| {
            db.create_identity(&key, &display_name, avatar_url.as_deref())
        })
        .await?;

        if created {
            info!("Onboarded identity {} for subject {}", identity.id, subject);
        }
        Ok((identity, created))
    }
}
