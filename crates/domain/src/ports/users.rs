use crate::DomainResult;
use crate::users::UserProfile;

pub trait UserDirectory: Send + Sync {
    fn get_profile(
        &self,
        user_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<UserProfile>>>;
}
