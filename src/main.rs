use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use dashboard_migrator::walker::describe_count;
use dashboard_migrator::{
    api, fanout, migrate, Config, ConfirmationGate, DuplicationPlan, FanOutOutcome, FilterRewrite,
    HttpClient, MigrateError, MigrationPlan, Outcome, Result, RewriteMode, SessionAuthenticator,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dashboard-migrator")]
#[command(
    author,
    version,
    about = "Bulk dashboard maintenance: rebind reports, rewrite filters, clone per customer"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Account username/email
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Account password
    #[arg(
        short,
        long,
        global = true,
        env = "DASHBOARD_MIGRATOR_PASSWORD",
        hide_env_values = true
    )]
    password: Option<String>,

    /// Server URL (only needed for private cloud instances)
    #[arg(short, long, global = true)]
    server: Option<String>,

    /// Config file (default: nearest .dashboard-migrator/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Run verbosely
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Do not ask for confirmation
    #[arg(short = 'y', long, global = true)]
    yes: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Move every report of a dashboard to another datasource
    Move {
        /// Dashboard id
        #[arg(short, long)]
        dashboard: String,

        /// Datasource id
        #[arg(long)]
        datasource: String,
    },

    /// Move a dashboard's reports to a datasource and replace a filter
    Migrate {
        /// Dashboard id
        #[arg(short, long)]
        dashboard: String,

        /// Datasource id
        #[arg(long)]
        datasource: String,

        /// Filter name to replace (filter_<from>)
        #[arg(long)]
        from: String,

        /// Replacement filter name (filter_<to>)
        #[arg(long)]
        to: String,

        /// Only replace whole filter tokens
        #[arg(long)]
        token_boundary: bool,
    },

    /// Duplicate dashboards for every configured customer
    Duplicate {
        /// Source dashboard ids, separated by commas
        #[arg(short, long, value_delimiter = ',', required = true)]
        dashboards: Vec<String>,

        /// Only replace whole filter tokens
        #[arg(long)]
        token_boundary: bool,
    },

    /// Generate shell completion script
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// A validated unit of work, ready once signed in
enum Job {
    Migrate(MigrationPlan),
    Duplicate(DuplicationPlan),
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    if let Command::Completion { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "dashboard-migrator", &mut std::io::stdout());
        return;
    }

    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(e.exit_code());
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("dashboard_migrator=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn rewrite_mode(token_boundary: bool, config: &Config) -> RewriteMode {
    if token_boundary {
        RewriteMode::TokenBoundary
    } else {
        config.rewrite.mode
    }
}

/// Turn arguments and config into a job without touching the network
fn plan(command: Command, config: &Config) -> Result<Job> {
    match command {
        Command::Move {
            dashboard,
            datasource,
        } => Ok(Job::Migrate(MigrationPlan::move_to(dashboard, datasource))),
        Command::Migrate {
            dashboard,
            datasource,
            from,
            to,
            token_boundary,
        } => {
            let rewrite = FilterRewrite::new(&from, &to, rewrite_mode(token_boundary, config))?;
            Ok(Job::Migrate(
                MigrationPlan::move_to(dashboard, datasource).with_rewrite(rewrite),
            ))
        }
        Command::Duplicate {
            dashboards,
            token_boundary,
        } => {
            config.validate_customers()?;
            let sources: Vec<String> = dashboards
                .into_iter()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect();
            Ok(Job::Duplicate(
                DuplicationPlan::from_config(sources, config)
                    .with_mode(rewrite_mode(token_boundary, config)),
            ))
        }
        Command::Completion { .. } => Err(MigrateError::InvalidInput(
            "completion does not talk to the server".to_string(),
        )),
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::resolve(cli.config.as_deref())?;

    let user = cli
        .user
        .ok_or_else(|| MigrateError::InvalidInput("Missing option: --user".to_string()))?;
    let password = cli.password.filter(|p| !p.is_empty()).ok_or_else(|| {
        MigrateError::InvalidInput(
            "Missing password: pass --password or set DASHBOARD_MIGRATOR_PASSWORD".to_string(),
        )
    })?;
    let job = plan(cli.command, &config)?;

    let server_url = cli.server.unwrap_or_else(|| config.server.url.clone());
    let base_url = api::normalize_base_url(&server_url);
    let agent = api::build_agent(&config.server);

    let session = SessionAuthenticator::new(&base_url, &agent).authenticate(&user, &password)?;
    let client = HttpClient::new(&base_url, agent, session);
    let mut gate = if cli.yes {
        ConfirmationGate::assume_yes()
    } else {
        ConfirmationGate::interactive()
    };

    let result = match &job {
        Job::Migrate(plan) => migrate::run(&client, &mut gate, plan).map(print_migration),
        Job::Duplicate(plan) => fanout::run(&client, &mut gate, plan).map(print_fan_out),
    };

    client.wait_for_background();
    result
}

fn print_migration(outcome: Outcome) {
    if let Outcome::Completed(summary) = outcome {
        println!(
            "{} {} rebound, {} rewritten",
            "Done:".green().bold(),
            describe_count(summary.reports_rebound),
            summary.reports_rewritten
        );
    }
}

fn print_fan_out(outcome: FanOutOutcome) {
    if let FanOutOutcome::Completed(clones) = outcome {
        for clone in &clones {
            println!(
                "   {} {} '{}' for {} ({})",
                "Created".green(),
                clone.clone_id,
                clone.name,
                clone.customer_key,
                describe_count(clone.reports)
            );
        }
        println!("{}", "Duplication finished".green().bold());
    }
}
