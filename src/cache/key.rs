//! Cache keys: resource type plus normalized filter parameters.

use std::fmt;

/// Kinds of server resources that are cached.
///
/// The prefix is what invalidation rules match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
  Categories,
  Transactions,
  /// A single transaction fetched by id
  Transaction,
  Dashboard,
  Budgets,
  BudgetCurrent,
  BudgetComparison,
}

impl ResourceType {
  pub const ALL: [ResourceType; 7] = [
    Self::Categories,
    Self::Transactions,
    Self::Transaction,
    Self::Dashboard,
    Self::Budgets,
    Self::BudgetCurrent,
    Self::BudgetComparison,
  ];

  pub fn prefix(self) -> &'static str {
    match self {
      Self::Categories => "categories",
      Self::Transactions => "transactions",
      Self::Transaction => "transaction",
      Self::Dashboard => "dashboard",
      Self::Budgets => "budgets",
      Self::BudgetCurrent => "budget-current",
      Self::BudgetComparison => "budget-comparison",
    }
  }
}

impl fmt::Display for ResourceType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.prefix())
  }
}

/// Query-string filters accepted by the list and aggregate endpoints.
///
/// Text fields usually come straight from user input; an empty or
/// whitespace-only value means the same as leaving the field out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
  /// INCOME or EXPENSE (`type` on the wire)
  pub kind: Option<String>,
  /// Category id
  pub category: Option<String>,
  pub start_date: Option<String>,
  pub end_date: Option<String>,
  pub min_amount: Option<String>,
  pub max_amount: Option<String>,
  pub month: Option<u32>,
  pub year: Option<i32>,
  pub page: Option<u32>,
  /// Category name search
  pub search: Option<String>,
  pub is_active: Option<bool>,
}

impl Filters {
  pub fn new() -> Self {
    Self::default()
  }

  /// Filters for a month-scoped budget view.
  pub fn period(month: Option<u32>, year: Option<i32>) -> Self {
    Self {
      month,
      year,
      ..Self::default()
    }
  }

  /// Filters for a date-range aggregate.
  pub fn date_range(start_date: Option<String>, end_date: Option<String>) -> Self {
    Self {
      start_date,
      end_date,
      ..Self::default()
    }
  }

  pub fn kind(mut self, kind: impl Into<String>) -> Self {
    self.kind = Some(kind.into());
    self
  }

  pub fn category(mut self, category: impl Into<String>) -> Self {
    self.category = Some(category.into());
    self
  }

  pub fn page(mut self, page: u32) -> Self {
    self.page = Some(page);
    self
  }

  /// Copy with blank text fields turned into `None` and the rest trimmed.
  pub fn normalized(&self) -> Self {
    fn clean(value: &Option<String>) -> Option<String> {
      value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
    }

    Self {
      kind: clean(&self.kind),
      category: clean(&self.category),
      start_date: clean(&self.start_date),
      end_date: clean(&self.end_date),
      min_amount: clean(&self.min_amount),
      max_amount: clean(&self.max_amount),
      month: self.month,
      year: self.year,
      page: self.page,
      search: clean(&self.search),
      is_active: self.is_active,
    }
  }

  /// Query-string pairs for the present fields, in a fixed order.
  pub fn to_query(&self) -> Vec<(String, String)> {
    let f = self.normalized();
    let mut pairs = Vec::new();

    let mut push = |name: &str, value: Option<String>| {
      if let Some(value) = value {
        pairs.push((name.to_string(), value));
      }
    };

    push("type", f.kind);
    push("category", f.category);
    push("start_date", f.start_date);
    push("end_date", f.end_date);
    push("min_amount", f.min_amount);
    push("max_amount", f.max_amount);
    push("month", f.month.map(|m| m.to_string()));
    push("year", f.year.map(|y| y.to_string()));
    push("page", f.page.map(|p| p.to_string()));
    push("search", f.search);
    push("is_active", f.is_active.map(|a| a.to_string()));

    pairs
  }
}

/// Identifies one cached query result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  resource: ResourceType,
  /// Form-encoded normalized filters
  params: String,
}

impl CacheKey {
  pub fn new(resource: ResourceType, filters: &Filters) -> Self {
    let params = url::form_urlencoded::Serializer::new(String::new())
      .extend_pairs(filters.to_query())
      .finish();

    Self { resource, params }
  }

  /// Key without filters.
  pub fn resource(resource: ResourceType) -> Self {
    Self {
      resource,
      params: String::new(),
    }
  }

  /// Key for a single record.
  pub fn for_id(resource: ResourceType, id: u64) -> Self {
    Self {
      resource,
      params: format!("id={}", id),
    }
  }

  pub fn resource_type(&self) -> ResourceType {
    self.resource
  }

  pub fn params(&self) -> &str {
    &self.params
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.params.is_empty() {
      write!(f, "{}", self.resource)
    } else {
      write!(f, "{}?{}", self.resource, self.params)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_key_display() {
    let key = CacheKey::new(
      ResourceType::Transactions,
      &Filters::new().kind("EXPENSE").page(1),
    );
    assert_eq!(key.to_string(), "transactions?type=EXPENSE&page=1");
    assert_eq!(
      CacheKey::resource(ResourceType::Categories).to_string(),
      "categories"
    );
    assert_eq!(
      CacheKey::for_id(ResourceType::Transaction, 7).to_string(),
      "transaction?id=7"
    );
  }

  #[test]
  fn test_empty_string_equals_absent() {
    let with_blanks = Filters {
      kind: Some("EXPENSE".to_string()),
      category: Some(String::new()),
      start_date: Some("   ".to_string()),
      page: Some(1),
      ..Filters::default()
    };
    let without = Filters::new().kind("EXPENSE").page(1);

    assert_eq!(
      CacheKey::new(ResourceType::Transactions, &with_blanks),
      CacheKey::new(ResourceType::Transactions, &without)
    );
  }

  #[test]
  fn test_different_filters_are_distinct_keys() {
    let page_one = CacheKey::new(ResourceType::Transactions, &Filters::new().page(1));
    let page_two = CacheKey::new(ResourceType::Transactions, &Filters::new().page(2));
    let unfiltered = CacheKey::resource(ResourceType::Transactions);

    assert_ne!(page_one, page_two);
    assert_ne!(page_one, unfiltered);
  }

  #[test]
  fn test_same_filters_different_resource() {
    let filters = Filters::period(Some(3), Some(2024));
    assert_ne!(
      CacheKey::new(ResourceType::Budgets, &filters),
      CacheKey::new(ResourceType::BudgetCurrent, &filters)
    );
  }

  #[test]
  fn test_query_trims_and_orders() {
    let filters = Filters {
      page: Some(2),
      min_amount: Some(" 10 ".to_string()),
      kind: Some("INCOME".to_string()),
      ..Filters::default()
    };

    assert_eq!(
      filters.to_query(),
      vec![
        ("type".to_string(), "INCOME".to_string()),
        ("min_amount".to_string(), "10".to_string()),
        ("page".to_string(), "2".to_string()),
      ]
    );
  }

  #[test]
  fn test_values_are_encoded() {
    let filters = Filters {
      search: Some("food & drink".to_string()),
      ..Filters::default()
    };
    let key = CacheKey::new(ResourceType::Categories, &filters);
    assert_eq!(key.params(), "search=food+%26+drink");
  }
}
