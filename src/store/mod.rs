//! Persistence seam for group ledgers.

pub mod in_memory;

use crate::core::expense::{Contribution, Expense, Split};
use crate::core::member::{GroupId, MemberId};
use crate::error::EngineError;
use async_trait::async_trait;
use std::sync::Arc;

/// Read access to everything a balance calculation needs for one group.
#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// Members in their stable listing order.
    async fn list_group_members(&self, group: &GroupId) -> Result<Vec<MemberId>, EngineError>;

    async fn list_contributions_for_group(
        &self,
        group: &GroupId,
    ) -> Result<Vec<Contribution>, EngineError>;

    async fn list_splits_for_group(&self, group: &GroupId) -> Result<Vec<Split>, EngineError>;

    async fn list_expenses_for_group(&self, group: &GroupId) -> Result<Vec<Expense>, EngineError>;
}

#[async_trait]
impl<T: GroupRepository + ?Sized> GroupRepository for Arc<T> {
    async fn list_group_members(&self, group: &GroupId) -> Result<Vec<MemberId>, EngineError> {
        (**self).list_group_members(group).await
    }

    async fn list_contributions_for_group(
        &self,
        group: &GroupId,
    ) -> Result<Vec<Contribution>, EngineError> {
        (**self).list_contributions_for_group(group).await
    }

    async fn list_splits_for_group(&self, group: &GroupId) -> Result<Vec<Split>, EngineError> {
        (**self).list_splits_for_group(group).await
    }

    async fn list_expenses_for_group(&self, group: &GroupId) -> Result<Vec<Expense>, EngineError> {
        (**self).list_expenses_for_group(group).await
    }
}
