//! Command-line surface over the tracker.

use chrono::{Datelike, Local, NaiveDate};
use clap::{Args, Subcommand};
use color_eyre::Result;
use serde::Serialize;

use ledgerline::api::types::{NewBudget, NewCategory, NewTransaction, TransactionType};
use ledgerline::config::Config;
use ledgerline::{Filters, Tracker};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Log in and store the session
  Login {
    #[arg(short, long)]
    email: String,
    /// Password (default: $LEDGERLINE_PASSWORD)
    #[arg(short, long)]
    password: Option<String>,
  },
  /// Forget the stored session
  Logout,
  /// Show the logged-in user
  Whoami,
  /// Manage categories
  #[command(subcommand, visible_alias = "c")]
  Categories(CategoryCommand),
  /// Manage transactions
  #[command(subcommand, visible_alias = "t")]
  Transactions(TransactionCommand),
  /// Manage monthly budgets
  #[command(subcommand, visible_alias = "b")]
  Budgets(BudgetCommand),
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommand {
  List {
    /// INCOME or EXPENSE
    #[arg(long = "type")]
    kind: Option<TransactionType>,
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    active: Option<bool>,
  },
  Create(CategoryArgs),
  Update {
    id: u64,
    #[command(flatten)]
    category: CategoryArgs,
  },
  Delete {
    id: u64,
  },
}

#[derive(Args, Debug)]
pub struct CategoryArgs {
  #[arg(long)]
  name: String,
  #[arg(long = "type")]
  kind: TransactionType,
  #[arg(long)]
  icon: Option<String>,
  #[arg(long)]
  color: Option<String>,
  #[arg(long)]
  active: Option<bool>,
}

impl From<CategoryArgs> for NewCategory {
  fn from(args: CategoryArgs) -> Self {
    Self {
      name: args.name,
      kind: args.kind,
      icon: args.icon,
      color: args.color,
      is_active: args.active,
    }
  }
}

#[derive(Subcommand, Debug)]
pub enum TransactionCommand {
  List(TransactionFilterArgs),
  Show {
    id: u64,
  },
  /// Income and expense totals for a date range
  Summary {
    #[arg(long)]
    start_date: Option<NaiveDate>,
    #[arg(long)]
    end_date: Option<NaiveDate>,
  },
  Create(TransactionArgs),
  Update {
    id: u64,
    #[command(flatten)]
    transaction: TransactionArgs,
  },
  Delete {
    id: u64,
  },
}

#[derive(Args, Debug)]
pub struct TransactionFilterArgs {
  #[arg(long = "type")]
  kind: Option<TransactionType>,
  #[arg(long)]
  category: Option<u64>,
  #[arg(long)]
  start_date: Option<NaiveDate>,
  #[arg(long)]
  end_date: Option<NaiveDate>,
  #[arg(long)]
  min_amount: Option<String>,
  #[arg(long)]
  max_amount: Option<String>,
  #[arg(long)]
  page: Option<u32>,
}

impl From<TransactionFilterArgs> for Filters {
  fn from(args: TransactionFilterArgs) -> Self {
    Filters {
      kind: args.kind.map(|k| k.to_string()),
      category: args.category.map(|c| c.to_string()),
      start_date: args.start_date.map(|d| d.to_string()),
      end_date: args.end_date.map(|d| d.to_string()),
      min_amount: args.min_amount,
      max_amount: args.max_amount,
      page: args.page,
      ..Filters::default()
    }
  }
}

#[derive(Args, Debug)]
pub struct TransactionArgs {
  #[arg(long = "type")]
  kind: TransactionType,
  #[arg(long)]
  amount: String,
  #[arg(long)]
  category: Option<u64>,
  #[arg(long, default_value = "")]
  description: String,
  /// Defaults to today
  #[arg(long)]
  date: Option<NaiveDate>,
}

impl From<TransactionArgs> for NewTransaction {
  fn from(args: TransactionArgs) -> Self {
    Self {
      category: args.category,
      kind: args.kind,
      amount: args.amount,
      description: args.description,
      date: args.date.unwrap_or_else(|| Local::now().date_naive()),
    }
  }
}

#[derive(Subcommand, Debug)]
pub enum BudgetCommand {
  List(PeriodArgs),
  /// Budgets of a month with spending
  Current(PeriodArgs),
  /// Allocated against spent, per category
  Comparison(PeriodArgs),
  Create(BudgetArgs),
  Update {
    id: u64,
    #[command(flatten)]
    budget: BudgetArgs,
  },
  Delete {
    id: u64,
  },
}

#[derive(Args, Debug)]
pub struct PeriodArgs {
  #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
  month: Option<u32>,
  #[arg(long)]
  year: Option<i32>,
}

impl PeriodArgs {
  /// Fill in the current month and year where they were not given.
  fn or_current(&self) -> (u32, i32) {
    let today = Local::now().date_naive();
    (
      self.month.unwrap_or_else(|| today.month()),
      self.year.unwrap_or_else(|| today.year()),
    )
  }
}

#[derive(Args, Debug)]
pub struct BudgetArgs {
  #[arg(long)]
  category: u64,
  #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
  month: u32,
  #[arg(long)]
  year: i32,
  #[arg(long)]
  amount: String,
}

impl From<BudgetArgs> for NewBudget {
  fn from(args: BudgetArgs) -> Self {
    Self {
      category: args.category,
      month: args.month,
      year: args.year,
      allocated_amount: args.amount,
    }
  }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn deleted(id: u64) -> Result<()> {
  print(&serde_json::json!({ "deleted": id }))
}

pub async fn run(tracker: &Tracker, command: Command) -> Result<()> {
  match command {
    Command::Login { email, password } => {
      let password = match password {
        Some(p) => p,
        None => Config::get_password()?,
      };
      let user = tracker.login(&email, &password).await?;
      print(&user)
    }
    Command::Logout => {
      tracker.logout()?;
      Ok(())
    }
    Command::Whoami => print(&tracker.profile().await?),
    Command::Categories(cmd) => run_categories(tracker, cmd).await,
    Command::Transactions(cmd) => run_transactions(tracker, cmd).await,
    Command::Budgets(cmd) => run_budgets(tracker, cmd).await,
  }
}

async fn run_categories(tracker: &Tracker, command: CategoryCommand) -> Result<()> {
  match command {
    CategoryCommand::List {
      kind,
      search,
      active,
    } => {
      let filters = Filters {
        kind: kind.map(|k| k.to_string()),
        search,
        is_active: active,
        ..Filters::default()
      };
      print(&tracker.categories(&filters).await?)
    }
    CategoryCommand::Create(args) => print(&tracker.create_category(&args.into()).await?),
    CategoryCommand::Update { id, category } => {
      print(&tracker.update_category(id, &category.into()).await?)
    }
    CategoryCommand::Delete { id } => {
      tracker.delete_category(id).await?;
      deleted(id)
    }
  }
}

async fn run_transactions(tracker: &Tracker, command: TransactionCommand) -> Result<()> {
  match command {
    TransactionCommand::List(args) => print(&tracker.transactions(&args.into()).await?),
    TransactionCommand::Show { id } => print(&tracker.transaction(id).await?),
    TransactionCommand::Summary {
      start_date,
      end_date,
    } => {
      let start = start_date.map(|d| d.to_string());
      let end = end_date.map(|d| d.to_string());
      print(&tracker.dashboard(start.as_deref(), end.as_deref()).await?)
    }
    TransactionCommand::Create(args) => print(&tracker.create_transaction(&args.into()).await?),
    TransactionCommand::Update { id, transaction } => {
      print(&tracker.update_transaction(id, &transaction.into()).await?)
    }
    TransactionCommand::Delete { id } => {
      tracker.delete_transaction(id).await?;
      deleted(id)
    }
  }
}

async fn run_budgets(tracker: &Tracker, command: BudgetCommand) -> Result<()> {
  match command {
    BudgetCommand::List(period) => print(&tracker.budgets(period.month, period.year).await?),
    BudgetCommand::Current(period) => {
      let (month, year) = period.or_current();
      print(&tracker.current_budget(Some(month), Some(year)).await?)
    }
    BudgetCommand::Comparison(period) => {
      let (month, year) = period.or_current();
      print(&tracker.budget_comparison(Some(month), Some(year)).await?)
    }
    BudgetCommand::Create(args) => print(&tracker.create_budget(&args.into()).await?),
    BudgetCommand::Update { id, budget } => {
      print(&tracker.update_budget(id, &budget.into()).await?)
    }
    BudgetCommand::Delete { id } => {
      tracker.delete_budget(id).await?;
      deleted(id)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser, Debug)]
  struct Cli {
    #[command(subcommand)]
    command: Command,
  }

  #[test]
  fn test_transaction_filters_from_args() {
    let cli = Cli::try_parse_from([
      "ledgerline",
      "transactions",
      "list",
      "--type",
      "expense",
      "--category",
      "3",
      "--start-date",
      "2024-01-01",
    ])
    .unwrap();

    let Command::Transactions(TransactionCommand::List(args)) = cli.command else {
      panic!("expected transactions list");
    };
    let filters: Filters = args.into();
    assert_eq!(filters.kind.as_deref(), Some("EXPENSE"));
    assert_eq!(filters.category.as_deref(), Some("3"));
    assert_eq!(filters.start_date.as_deref(), Some("2024-01-01"));
    assert_eq!(filters.end_date, None);
  }

  #[test]
  fn test_budget_month_out_of_range() {
    let result = Cli::try_parse_from([
      "ledgerline",
      "budgets",
      "current",
      "--month",
      "13",
    ]);
    assert!(result.is_err());
  }

  #[test]
  fn test_period_defaults_to_current_month() {
    let period = PeriodArgs {
      month: None,
      year: Some(2023),
    };
    let today = Local::now().date_naive();
    assert_eq!(period.or_current(), (today.month(), 2023));
  }

  #[test]
  fn test_category_alias() {
    let cli = Cli::try_parse_from(["ledgerline", "c", "delete", "7"]).unwrap();
    assert!(matches!(
      cli.command,
      Command::Categories(CategoryCommand::Delete { id: 7 })
    ));
  }
}
