use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod dashboard;
mod error;
mod export;
mod filter;
mod models;
mod progress;
mod projection;
mod refresh;
mod report;
mod roster;
mod session;
mod shell;

use crate::api::{HttpRosterApi, RosterApi, RosterUpload};
use crate::config::{ClientConfig, ConnectionArgs};
use crate::dashboard::Dashboard;
use crate::error::{RosterError, RosterResult};
use crate::filter::FilterState;
use crate::models::{Category, Skill, StudentId};
use crate::projection::{SortDirection, SortKey, SortState, ViewState};
use crate::report::OutputFormat;
use crate::session::SessionStore;

#[derive(Parser)]
#[command(name = "cohort-roster")]
#[command(about = "Coding-progress roster dashboard for Group Scholar cohorts", long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the roster API is reachable
    Health,
    /// Sign in and remember the session
    Login {
        #[arg(long, short)]
        username: String,
        /// Read from the prompt when omitted
        #[arg(long, env = "COHORT_ROSTER_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the saved session
    Logout,
    /// Show the signed-in account
    Whoami,
    /// Print a category's roster through the given filters and sort
    List {
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Upload a roster spreadsheet (.xlsx or .xls) into a category
    Upload {
        #[arg(long, short)]
        category: Category,
        file: PathBuf,
    },
    /// Refresh coding statistics for one student or the whole category
    Refresh {
        #[arg(long, short)]
        category: Category,
        /// Refresh only this student
        #[arg(long)]
        id: Option<String>,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Download the filtered roster as a spreadsheet
    Export {
        #[command(flatten)]
        view: ViewArgs,
        /// File or directory to write to
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Delete every student in a category
    Delete {
        #[arg(long, short)]
        category: Category,
        #[arg(long, short)]
        yes: bool,
    },
    /// Change your password
    Passwd {
        #[arg(long, env = "COHORT_ROSTER_PASSWORD", hide_env_values = true)]
        current: Option<String>,
        #[arg(long)]
        new: Option<String>,
    },
    /// Manage accounts (administrators only)
    #[command(subcommand)]
    Users(UserCommands),
    /// Open an interactive dashboard for a category
    Shell {
        #[arg(long, short)]
        category: Category,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    List,
    Create {
        username: String,
        #[arg(long)]
        password: Option<String>,
    },
    Update {
        username: String,
        #[arg(long)]
        password: Option<String>,
    },
    Delete {
        username: String,
        #[arg(long, short)]
        yes: bool,
    },
}

#[derive(Args)]
struct ViewArgs {
    #[arg(long, short)]
    category: Category,
    /// Match name or roll number, case-insensitively
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    min_lc: Option<String>,
    #[arg(long)]
    min_java: Option<String>,
    #[arg(long)]
    min_python: Option<String>,
    #[arg(long)]
    min_c: Option<String>,
    #[arg(long)]
    min_sql: Option<String>,
    /// name, roll, lc, java, python, c or sql
    #[arg(long)]
    sort: Option<SortKey>,
    #[arg(long)]
    desc: bool,
}

impl ViewArgs {
    fn apply(&self, view: &mut ViewState) {
        let mut filter = FilterState::default();
        if let Some(search) = &self.search {
            filter = filter.with_search(search.clone());
        }
        if let Some(raw) = &self.min_lc {
            filter = filter.with_min_leetcode(raw);
        }
        let stars = [
            (Skill::Java, &self.min_java),
            (Skill::Python, &self.min_python),
            (Skill::C, &self.min_c),
            (Skill::Sql, &self.min_sql),
        ];
        for (skill, raw) in stars {
            if let Some(raw) = raw {
                filter = filter.with_min_stars(skill, raw);
            }
        }
        view.filter = filter;

        let key = self.sort.unwrap_or(view.sort.key);
        let direction = if self.desc {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        };
        view.sort = SortState::new(key, direction);
    }
}

struct App {
    config: ClientConfig,
    api: Arc<dyn RosterApi>,
    session: SessionStore,
    input: Lines<BufReader<Stdin>>,
}

impl App {
    async fn dashboard(&self, category: Category) -> RosterResult<Dashboard> {
        let token = self.session.token()?;
        Dashboard::open(self.api.clone(), token, category, self.config.settle_delay).await
    }

    async fn prompt(&mut self, label: &str) -> RosterResult<String> {
        shell::prompt(&mut self.input, label).await
    }

    async fn confirm(&mut self, question: &str) -> RosterResult<bool> {
        shell::confirm(&mut self.input, question).await
    }

    fn require_admin(&self) -> RosterResult<&str> {
        let token = self.session.token()?;
        match self.session.profile() {
            Some(profile) if profile.is_admin => Ok(token),
            _ => Err(RosterError::validation(
                "account",
                "administrator access required",
            )),
        }
    }

    async fn run(&mut self, command: Commands) -> RosterResult<()> {
        match command {
            // Answered before the session is restored.
            Commands::Health => {}
            Commands::Login { username, password } => {
                let password = match password {
                    Some(password) => password,
                    None => self.prompt("Password: ").await?,
                };
                let profile = self
                    .session
                    .login(self.api.as_ref(), &username, &password)
                    .await?;
                println!("Logged in as {}.", profile.username);
            }
            Commands::Logout => {
                self.session.logout().await?;
                println!("Logged out.");
            }
            Commands::Whoami => match self.session.profile() {
                Some(profile) => {
                    let role = if profile.is_admin { "admin" } else { "member" };
                    println!("{} ({role})", profile.username);
                }
                None => return Err(RosterError::not_logged_in()),
            },
            Commands::List { view, format } => {
                let mut dashboard = self.dashboard(view.category.clone()).await?;
                view.apply(&mut dashboard.view);
                let rows = dashboard.projected();
                let total = dashboard.store().len();
                print!("{}", report::render(format, &rows, &dashboard.view, total)?);
                let uploaded = self
                    .session
                    .profile()
                    .is_some_and(|profile| profile.has_uploaded(dashboard.category()));
                if total == 0 && !uploaded {
                    eprintln!(
                        "No roster uploaded for {} yet; use `cohort-roster upload`.",
                        dashboard.category().label()
                    );
                }
            }
            Commands::Upload { category, file } => {
                let upload = RosterUpload::from_path(&file).await?;
                let dashboard = self.dashboard(category).await?;
                let summary = dashboard.upload(upload).await?;
                println!("{}", summary.message);
                if summary.count == 0 {
                    eprintln!("The spreadsheet contained no student rows.");
                }
                println!(
                    "{} now has {} students.",
                    dashboard.category().label(),
                    dashboard.store().len()
                );
                self.session.refresh_profile(self.api.as_ref()).await?;
            }
            Commands::Refresh { category, id, yes } => {
                let dashboard = self.dashboard(category).await?;
                match id {
                    Some(id) => {
                        let record = dashboard.refresh_student(&StudentId::new(id)).await?;
                        println!("Refreshed {} ({}).", record.name, record.roll_number);
                    }
                    None => {
                        let question = format!(
                            "Refresh all {} students in {}? This can take a while.",
                            dashboard.store().len(),
                            dashboard.category().label()
                        );
                        if !yes && !self.confirm(&question).await? {
                            println!("Nothing refreshed.");
                            return Ok(());
                        }
                        let summary = progress::drive(dashboard.refresh_all()?).await?;
                        println!(
                            "{} of {} refreshed, {} failed{}.",
                            summary.refreshed.len(),
                            summary.total,
                            summary.failed.len(),
                            if summary.cancelled { " (cancelled)" } else { "" }
                        );
                        for (id, reason) in &summary.failed {
                            println!("  {id}: {reason}");
                        }
                    }
                }
            }
            Commands::Export { view, out } => {
                let mut dashboard = self.dashboard(view.category.clone()).await?;
                view.apply(&mut dashboard.view);
                let scope = dashboard.export_scope();
                let file = dashboard.export().await?;
                let path = file.destination(out.as_deref());
                tokio::fs::write(&path, &file.bytes).await?;
                if scope.is_everything() {
                    println!("Exported all {} students to {}.", scope.total, path.display());
                } else {
                    println!(
                        "Exported {} of {} students to {}.",
                        scope.shown,
                        scope.total,
                        path.display()
                    );
                }
            }
            Commands::Delete { category, yes } => {
                let dashboard = self.dashboard(category).await?;
                let question = format!(
                    "Delete all {} students in {}? This cannot be undone.",
                    dashboard.store().len(),
                    dashboard.category().label()
                );
                if !yes && !self.confirm(&question).await? {
                    println!("Nothing deleted.");
                    return Ok(());
                }
                println!("{}", dashboard.delete_all().await?);
                self.session.refresh_profile(self.api.as_ref()).await?;
            }
            Commands::Passwd { current, new } => {
                let token = self.session.token()?.to_string();
                let current = match current {
                    Some(current) => current,
                    None => self.prompt("Current password: ").await?,
                };
                let new = match new {
                    Some(new) => new,
                    None => self.prompt("New password: ").await?,
                };
                if new.is_empty() {
                    return Err(RosterError::validation("password", "must not be empty"));
                }
                let message = self.api.change_password(&token, &current, &new).await?;
                println!("{message}");
            }
            Commands::Users(command) => self.run_users(command).await?,
            Commands::Shell { category } => {
                let mut dashboard = self.dashboard(category).await?;
                shell::run(&mut dashboard, &mut self.input).await?;
            }
        }
        Ok(())
    }

    async fn run_users(&mut self, command: UserCommands) -> RosterResult<()> {
        let token = self.require_admin()?.to_string();
        let token = token.as_str();
        match command {
            UserCommands::List => {
                for user in self.api.list_users(token).await? {
                    let role = if user.is_admin { "admin" } else { "member" };
                    println!("{:<24} {role}", user.username);
                }
            }
            UserCommands::Create { username, password } => {
                let password = match password {
                    Some(password) => password,
                    None => self.prompt("Password for new account: ").await?,
                };
                println!("{}", self.api.create_account(token, &username, &password).await?);
            }
            UserCommands::Update { username, password } => {
                let password = match password {
                    Some(password) => password,
                    None => self.prompt("New password: ").await?,
                };
                println!("{}", self.api.update_user(token, &username, &password).await?);
            }
            UserCommands::Delete { username, yes } => {
                if !yes && !self.confirm(&format!("Delete account `{username}`?")).await? {
                    println!("Nothing deleted.");
                    return Ok(());
                }
                println!("{}", self.api.delete_user(token, &username).await?);
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = ClientConfig::from_args(&cli.connection)?;
    let api: Arc<dyn RosterApi> =
        Arc::new(HttpRosterApi::new(&config).context("failed to build HTTP client")?);

    if let Commands::Health = cli.command {
        let health = api
            .health()
            .await
            .with_context(|| format!("roster API at {} is not reachable", config.api_url))?;
        println!("{}: {}", health.status, health.message);
        return Ok(());
    }

    let session = SessionStore::restore(&config.session_file, api.as_ref())
        .await
        .context("failed to restore saved session")?;
    let mut app = App {
        config,
        api,
        session,
        input: BufReader::new(tokio::io::stdin()).lines(),
    };

    if let Err(err) = app.run(cli.command).await {
        let err = app.session.check(err).await;
        if err.is_auth() {
            return Err(anyhow::Error::new(err).context("not signed in; run `cohort-roster login`"));
        }
        return Err(err.into());
    }
    Ok(())
}
