use std::fmt::Display;

use tracing::error;

use domains::error::{DomainError, StoreError};
use domains::ids::AccountId;
use domains::likes::Likeable;
use domains::ports::SocialStore;

/// Converts adapter failures into `Internal`, logging the operation and the
/// entity it was working on.
pub(crate) trait StoreResultExt<T> {
    fn or_internal<D: Display>(self, op: &'static str, id: D) -> Result<T, DomainError>;
}

impl<T> StoreResultExt<T> for Result<T, StoreError> {
    fn or_internal<D: Display>(self, op: &'static str, id: D) -> Result<T, DomainError> {
        self.map_err(|err| store_failure(op, id, err))
    }
}

pub(crate) fn store_failure(op: &'static str, id: impl Display, err: StoreError) -> DomainError {
    error!(op, id = %id, error = %err, "store operation failed");
    DomainError::from(err)
}

/// Raises `Internal` for drift the service cannot work around.
pub(crate) fn invariant_broken(op: &'static str, id: impl Display, detail: &str) -> DomainError {
    error!(op, id = %id, detail, "invariant violated");
    DomainError::Internal(format!("{op} on {id}: {detail}"))
}

/// Whether `viewer` may see `record`. The viewer's account, and with it the
/// set of accounts they follow, is only loaded when the answer depends on it.
pub(crate) async fn can_see<E: Likeable>(
    store: &dyn SocialStore,
    record: &E,
    viewer: Option<AccountId>,
) -> Result<bool, DomainError> {
    if record.visible_to(None) {
        return Ok(true);
    }
    let Some(id) = viewer else {
        return Ok(false);
    };
    let account = store.account(id).await.or_internal("load viewer", id)?;
    Ok(record.visible_to(account.as_ref()))
}
