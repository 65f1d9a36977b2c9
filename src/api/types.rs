//! Serde types matching the budget-tracker API.
//!
//! Amounts come from decimal columns and arrive as strings ("12.50") on most
//! endpoints but as floats on the aggregate ones, so they are accepted in
//! either form and kept as strings.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Items per page on paginated list endpoints.
pub const PAGE_SIZE: u64 = 20;

fn deserialize_amount<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    Text(String),
    Number(serde_json::Number),
  }

  Ok(match Raw::deserialize(deserializer)? {
    Raw::Text(s) => s,
    Raw::Number(n) => n.to_string(),
  })
}

fn deserialize_optional_amount<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  struct Wrapper(#[serde(deserialize_with = "deserialize_amount")] String);

  Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|w| w.0))
}

// ============================================================================
// Shared enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
  Income,
  Expense,
}

impl TransactionType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Income => "INCOME",
      Self::Expense => "EXPENSE",
    }
  }
}

impl fmt::Display for TransactionType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for TransactionType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_uppercase().as_str() {
      "INCOME" => Ok(Self::Income),
      "EXPENSE" => Ok(Self::Expense),
      other => Err(format!("unknown transaction type '{}'", other)),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetStatus {
  Over,
  Under,
}

// ============================================================================
// Pagination
// ============================================================================

/// A page of results.
///
/// List endpoints answer with either a bare array or a
/// `{count, next, previous, results}` envelope; both decode into `Page`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
  pub count: u64,
  pub next: Option<String>,
  pub previous: Option<String>,
  pub results: Vec<T>,
}

impl<T> Page<T> {
  /// Number of pages at `PAGE_SIZE` items each (at least one).
  pub fn total_pages(&self) -> u64 {
    self.count.div_ceil(PAGE_SIZE).max(1)
  }

  pub fn into_results(self) -> Vec<T> {
    self.results
  }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Page<T> {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListPayload<T> {
      Bare(Vec<T>),
      Envelope {
        count: u64,
        #[serde(default)]
        next: Option<String>,
        #[serde(default)]
        previous: Option<String>,
        results: Vec<T>,
      },
    }

    Ok(match ListPayload::deserialize(deserializer)? {
      ListPayload::Bare(results) => Page {
        count: results.len() as u64,
        next: None,
        previous: None,
        results,
      },
      ListPayload::Envelope {
        count,
        next,
        previous,
        results,
      } => Page {
        count,
        next,
        previous,
        results,
      },
    })
  }
}

// ============================================================================
// Resources
// ============================================================================

fn default_color() -> String {
  "#000000".to_string()
}

fn default_true() -> bool {
  true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
  pub id: u64,
  pub name: String,
  #[serde(rename = "type")]
  pub kind: TransactionType,
  #[serde(default)]
  pub icon: Option<String>,
  #[serde(default = "default_color")]
  pub color: String,
  #[serde(default = "default_true")]
  pub is_active: bool,
  #[serde(default)]
  pub created_at: Option<String>,
  #[serde(default)]
  pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
  pub id: u64,
  #[serde(default)]
  pub category: Option<u64>,
  #[serde(default)]
  pub category_details: Option<Category>,
  #[serde(rename = "type")]
  pub kind: TransactionType,
  #[serde(deserialize_with = "deserialize_amount")]
  pub amount: String,
  #[serde(default)]
  pub description: String,
  pub date: NaiveDate,
  #[serde(default)]
  pub created_at: Option<String>,
  #[serde(default)]
  pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
  pub id: u64,
  pub category: u64,
  #[serde(default)]
  pub category_details: Option<Category>,
  pub month: u32,
  pub year: i32,
  #[serde(deserialize_with = "deserialize_amount")]
  pub allocated_amount: String,
  #[serde(default, deserialize_with = "deserialize_optional_amount")]
  pub spent_amount: Option<String>,
  #[serde(default, deserialize_with = "deserialize_optional_amount")]
  pub remaining_amount: Option<String>,
  #[serde(default)]
  pub percentage_used: Option<f64>,
  #[serde(default)]
  pub created_at: Option<String>,
  #[serde(default)]
  pub updated_at: Option<String>,
}

// ============================================================================
// Aggregates
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
  pub start_date: String,
  pub end_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryTotals {
  pub total_income: f64,
  pub total_expenses: f64,
  pub balance: f64,
  pub transaction_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
  #[serde(rename = "category__name")]
  pub category_name: Option<String>,
  #[serde(rename = "type")]
  pub kind: TransactionType,
  #[serde(deserialize_with = "deserialize_amount")]
  pub total: String,
  pub count: u64,
}

/// Dashboard totals for a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
  pub period: Period,
  pub summary: SummaryTotals,
  #[serde(default)]
  pub category_breakdown: Vec<CategoryBreakdown>,
}

/// Budgets of one month annotated with what was spent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentBudget {
  pub month: u32,
  pub year: i32,
  pub budgets: Vec<Budget>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonOverall {
  pub total_allocated: f64,
  pub total_spent: f64,
  pub total_remaining: f64,
  pub percentage_used: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryComparison {
  pub category: String,
  pub allocated: f64,
  pub spent: f64,
  pub remaining: f64,
  pub percentage_used: f64,
  pub status: BudgetStatus,
}

/// Allocated-vs-spent comparison for one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetComparison {
  /// "month/year"
  pub period: String,
  pub overall: ComparisonOverall,
  #[serde(default)]
  pub by_category: Vec<CategoryComparison>,
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct NewCategory {
  pub name: String,
  #[serde(rename = "type")]
  pub kind: TransactionType,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub color: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewTransaction {
  pub category: Option<u64>,
  #[serde(rename = "type")]
  pub kind: TransactionType,
  pub amount: String,
  pub description: String,
  pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewBudget {
  pub category: u64,
  pub month: u32,
  pub year: i32,
  pub allocated_amount: String,
}

// ============================================================================
// Authentication
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
  pub id: u64,
  pub email: String,
  #[serde(default)]
  pub first_name: String,
  #[serde(default)]
  pub last_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
  pub access: String,
  pub refresh: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
  pub user: User,
  pub tokens: TokenPair,
}

/// Body of a successful token refresh. The refresh token is only present
/// when the server rotates it.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
  pub access: String,
  #[serde(default)]
  pub refresh: Option<String>,
}
