//! Static invalidation table: which cached views a mutation makes stale.
//!
//! Transactions feed every aggregate, so a transaction change invalidates the
//! dashboard and all budget views. Budgets only affect budget views.
//! Transactions reference categories by id but are not refetched on category
//! edits.

use std::fmt;

use super::key::ResourceType;

/// Resource whose create/update/delete triggers invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutation {
  Category,
  Transaction,
  Budget,
}

const CATEGORY_RULE: &[ResourceType] = &[ResourceType::Categories];

const TRANSACTION_RULE: &[ResourceType] = &[
  ResourceType::Transactions,
  ResourceType::Transaction,
  ResourceType::Dashboard,
  ResourceType::Budgets,
  ResourceType::BudgetCurrent,
  ResourceType::BudgetComparison,
];

const BUDGET_RULE: &[ResourceType] = &[
  ResourceType::Budgets,
  ResourceType::BudgetCurrent,
  ResourceType::BudgetComparison,
];

impl Mutation {
  /// Resource types whose cached entries go stale when this mutation commits.
  pub fn invalidates(self) -> &'static [ResourceType] {
    match self {
      Self::Category => CATEGORY_RULE,
      Self::Transaction => TRANSACTION_RULE,
      Self::Budget => BUDGET_RULE,
    }
  }
}

impl fmt::Display for Mutation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Category => "category",
      Self::Transaction => "transaction",
      Self::Budget => "budget",
    })
  }
}
