use crate::allocation::entry::RecordedExpense;
use crate::core::expense::{Contribution, Expense, Split};
use crate::core::member::{GroupId, MemberId};
use crate::error::EngineError;
use crate::store::GroupRepository;
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    members: HashMap<GroupId, Vec<MemberId>>,
    expenses: Vec<Expense>,
    contributions: Vec<Contribution>,
    splits: Vec<Split>,
}

impl Tables {
    fn expense_ids_in(&self, group: &GroupId) -> Vec<Uuid> {
        self.expenses
            .iter()
            .filter(|e| e.group_id() == Some(group))
            .map(|e| e.id())
            .collect()
    }
}

/// In-process ledger store. Clones share the same tables.
///
/// Expenses are kept in insertion order; contributions and splits follow
/// the order they were recorded in.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a member to a group. Adding an existing member is a no-op.
    pub async fn add_member(&self, group: &GroupId, member: MemberId) {
        let mut tables = self.tables.write().await;
        let members = tables.members.entry(group.clone()).or_default();
        if !members.contains(&member) {
            members.push(member);
        }
    }

    /// Remove a member from the listing. Their records stay in place.
    pub async fn remove_member(&self, group: &GroupId, member: &MemberId) {
        if let Some(members) = self.tables.write().await.members.get_mut(group) {
            members.retain(|m| m != member);
        }
    }

    /// Insert or replace an expense.
    ///
    /// Any contributions and splits already stored for the expense are
    /// deleted and the recorded ones written in their place.
    pub async fn save_expense(&self, recorded: RecordedExpense) {
        let id = recorded.expense.id();
        let mut tables = self.tables.write().await;

        tables.contributions.retain(|c| c.expense_id != id);
        tables.splits.retain(|s| s.expense_id != id);
        match tables.expenses.iter_mut().find(|e| e.id() == id) {
            Some(existing) => *existing = recorded.expense,
            None => tables.expenses.push(recorded.expense),
        }
        tables.contributions.extend(recorded.contributions);
        tables.splits.extend(recorded.splits);
        debug!("saved expense {}", id);
    }

    /// Delete an expense with all of its contributions and splits.
    pub async fn delete_expense(&self, id: Uuid) -> Result<(), EngineError> {
        let mut tables = self.tables.write().await;
        let before = tables.expenses.len();
        tables.expenses.retain(|e| e.id() != id);
        if tables.expenses.len() == before {
            return Err(EngineError::ExpenseNotFound(id));
        }
        tables.contributions.retain(|c| c.expense_id != id);
        tables.splits.retain(|s| s.expense_id != id);
        Ok(())
    }

    /// Mark one member's split of an expense as settled.
    pub async fn settle_split(&self, expense_id: Uuid, member: &MemberId) -> Result<(), EngineError> {
        let mut tables = self.tables.write().await;
        let split = tables
            .splits
            .iter_mut()
            .find(|s| s.expense_id == expense_id && &s.member_id == member)
            .ok_or(EngineError::ExpenseNotFound(expense_id))?;
        split.is_settled = true;
        Ok(())
    }
}

#[async_trait]
impl GroupRepository for InMemoryLedgerStore {
    async fn list_group_members(&self, group: &GroupId) -> Result<Vec<MemberId>, EngineError> {
        let tables = self.tables.read().await;
        Ok(tables.members.get(group).cloned().unwrap_or_default())
    }

    async fn list_contributions_for_group(
        &self,
        group: &GroupId,
    ) -> Result<Vec<Contribution>, EngineError> {
        let tables = self.tables.read().await;
        let ids = tables.expense_ids_in(group);
        Ok(tables
            .contributions
            .iter()
            .filter(|c| ids.contains(&c.expense_id))
            .cloned()
            .collect())
    }

    async fn list_splits_for_group(&self, group: &GroupId) -> Result<Vec<Split>, EngineError> {
        let tables = self.tables.read().await;
        let ids = tables.expense_ids_in(group);
        Ok(tables
            .splits
            .iter()
            .filter(|s| ids.contains(&s.expense_id))
            .cloned()
            .collect())
    }

    async fn list_expenses_for_group(&self, group: &GroupId) -> Result<Vec<Expense>, EngineError> {
        let tables = self.tables.read().await;
        Ok(tables
            .expenses
            .iter()
            .filter(|e| e.group_id() == Some(group))
            .cloned()
            .collect())
    }
}
