use crate::DomainResult;
use crate::alerts::AlertEvent;

pub trait AlertDispatcher: Send + Sync {
    fn dispatch(&self, event: AlertEvent) -> crate::ports::BoxFuture<'_, DomainResult<()>>;
}
