//! Budget-tracker client with transparent caching.
//!
//! Reads go through the cache layer; mutations go straight to the API and,
//! once they succeed, invalidate every cached view that depends on them.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::api::types::{
  Budget, BudgetComparison, Category, CurrentBudget, DashboardSummary, NewBudget, NewCategory,
  NewTransaction, Page, Transaction, User,
};
use crate::api::{ApiError, AuthClient, Result};
use crate::cache::{CacheKey, CacheLayer, Filters, Invalidated, Mutation, ResourceType};

/// Typed access to categories, transactions, budgets, and aggregates.
#[derive(Clone, Debug)]
pub struct Tracker {
  client: AuthClient,
  cache: CacheLayer,
}

impl Tracker {
  pub fn new(client: AuthClient) -> Self {
    Self {
      client,
      cache: CacheLayer::new(),
    }
  }

  pub fn client(&self) -> &AuthClient {
    &self.client
  }

  pub fn cache(&self) -> &CacheLayer {
    &self.cache
  }

  /// Notifications for views that should refetch.
  pub fn subscribe(&self) -> broadcast::Receiver<Invalidated> {
    self.cache.subscribe()
  }

  async fn read<T>(&self, key: CacheKey, path: &str, query: Vec<(String, String)>) -> Result<T>
  where
    T: Serialize + DeserializeOwned,
  {
    let result = self
      .cache
      .fetch(&key, || async move {
        let body = self.client.get(path, query).await?;
        Ok::<T, ApiError>(serde_json::from_value(body)?)
      })
      .await
      .map_err(|e| self.on_error(e))?;

    debug!(%key, source = ?result.source, "read");
    Ok(result.data)
  }

  /// Drop every cached view once a failed refresh has ended the session.
  fn on_error(&self, error: ApiError) -> ApiError {
    if matches!(error, ApiError::RefreshFailed(_)) {
      warn!(%error, "session ended, clearing cache");
      if let Err(clear_err) = self.cache.clear() {
        warn!(error = %clear_err, "failed to clear cache");
      }
    }
    error
  }

  /// Run a mutation; invalidate dependent views only if it succeeded.
  async fn mutate<T, Fut>(&self, mutation: Mutation, request: Fut) -> Result<T>
  where
    T: DeserializeOwned,
    Fut: Future<Output = Result<Value>>,
  {
    let body = request.await.map_err(|e| self.on_error(e))?;
    let stale = self.cache.invalidate(mutation)?;
    debug!(%mutation, stale, "mutation committed");

    Ok(serde_json::from_value(body)?)
  }

  // ==========================================================================
  // Session
  // ==========================================================================

  /// Log in and start from an empty cache.
  pub async fn login(&self, email: &str, password: &str) -> Result<User> {
    let user = self.client.login(email, password).await?;
    self.cache.clear()?;
    Ok(user)
  }

  /// Log out and forget everything cached for the previous user.
  pub fn logout(&self) -> Result<()> {
    self.client.logout()?;
    self.cache.clear()
  }

  pub async fn profile(&self) -> Result<User> {
    self.client.profile().await.map_err(|e| self.on_error(e))
  }

  // ==========================================================================
  // Categories
  // ==========================================================================

  /// List categories. Supports `kind`, `search`, and `is_active` filters.
  pub async fn categories(&self, filters: &Filters) -> Result<Vec<Category>> {
    let key = CacheKey::new(ResourceType::Categories, filters);
    let page: Page<Category> = self.read(key, "categories/", filters.to_query()).await?;
    Ok(page.into_results())
  }

  pub async fn create_category(&self, category: &NewCategory) -> Result<Category> {
    self
      .mutate(Mutation::Category, self.client.post("categories/", category))
      .await
  }

  pub async fn update_category(&self, id: u64, category: &NewCategory) -> Result<Category> {
    let path = format!("categories/{}/", id);
    self
      .mutate(Mutation::Category, self.client.put(&path, category))
      .await
  }

  pub async fn delete_category(&self, id: u64) -> Result<()> {
    let path = format!("categories/{}/", id);
    let _: Value = self
      .mutate(Mutation::Category, self.client.delete(&path))
      .await?;
    Ok(())
  }

  // ==========================================================================
  // Transactions
  // ==========================================================================

  /// One page of transactions matching the filters.
  pub async fn transactions(&self, filters: &Filters) -> Result<Page<Transaction>> {
    let key = CacheKey::new(ResourceType::Transactions, filters);
    self.read(key, "transactions/", filters.to_query()).await
  }

  pub async fn transaction(&self, id: u64) -> Result<Transaction> {
    let key = CacheKey::for_id(ResourceType::Transaction, id);
    let path = format!("transactions/{}/", id);
    self.read(key, &path, Vec::new()).await
  }

  pub async fn create_transaction(&self, transaction: &NewTransaction) -> Result<Transaction> {
    self
      .mutate(
        Mutation::Transaction,
        self.client.post("transactions/", transaction),
      )
      .await
  }

  pub async fn update_transaction(
    &self,
    id: u64,
    transaction: &NewTransaction,
  ) -> Result<Transaction> {
    let path = format!("transactions/{}/", id);
    self
      .mutate(Mutation::Transaction, self.client.put(&path, transaction))
      .await
  }

  pub async fn delete_transaction(&self, id: u64) -> Result<()> {
    let path = format!("transactions/{}/", id);
    let _: Value = self
      .mutate(Mutation::Transaction, self.client.delete(&path))
      .await?;
    Ok(())
  }

  /// Income/expense totals for a date range. The server defaults to the
  /// current month when no dates are given.
  pub async fn dashboard(
    &self,
    start_date: Option<&str>,
    end_date: Option<&str>,
  ) -> Result<DashboardSummary> {
    let filters = Filters::date_range(start_date.map(String::from), end_date.map(String::from));
    let key = CacheKey::new(ResourceType::Dashboard, &filters);
    self
      .read(key, "transactions/summary/", filters.to_query())
      .await
  }

  // ==========================================================================
  // Budgets
  // ==========================================================================

  pub async fn budgets(&self, month: Option<u32>, year: Option<i32>) -> Result<Vec<Budget>> {
    let filters = Filters::period(month, year);
    let key = CacheKey::new(ResourceType::Budgets, &filters);
    let page: Page<Budget> = self.read(key, "budgets/", filters.to_query()).await?;
    Ok(page.into_results())
  }

  /// Budgets of a month with spent and remaining amounts.
  pub async fn current_budget(
    &self,
    month: Option<u32>,
    year: Option<i32>,
  ) -> Result<CurrentBudget> {
    let filters = Filters::period(month, year);
    let key = CacheKey::new(ResourceType::BudgetCurrent, &filters);
    self.read(key, "budgets/current/", filters.to_query()).await
  }

  pub async fn budget_comparison(
    &self,
    month: Option<u32>,
    year: Option<i32>,
  ) -> Result<BudgetComparison> {
    let filters = Filters::period(month, year);
    let key = CacheKey::new(ResourceType::BudgetComparison, &filters);
    self
      .read(key, "budgets/comparison/", filters.to_query())
      .await
  }

  pub async fn create_budget(&self, budget: &NewBudget) -> Result<Budget> {
    self
      .mutate(Mutation::Budget, self.client.post("budgets/", budget))
      .await
  }

  pub async fn update_budget(&self, id: u64, budget: &NewBudget) -> Result<Budget> {
    let path = format!("budgets/{}/", id);
    self
      .mutate(Mutation::Budget, self.client.put(&path, budget))
      .await
  }

  pub async fn delete_budget(&self, id: u64) -> Result<()> {
    let path = format!("budgets/{}/", id);
    let _: Value = self
      .mutate(Mutation::Budget, self.client.delete(&path))
      .await?;
    Ok(())
  }
}
