use clap::{Parser, Subcommand};

/// Rent accrual and notice service.
#[derive(Parser, Debug)]
#[command(name = "rentwatch", version, about)]
pub struct Cli {
    /// Keep the ledger in memory instead of PostgreSQL.
    #[arg(long, global = true, env = "RENTWATCH_MEMORY")]
    pub memory: bool,

    /// Log notices instead of posting them.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP trigger surface (and the reminder schedule if configured).
    Serve,
    /// Run one accrual check for an identity record.
    Check {
        /// Identity record path (relative to IDENTITY_DIR when set).
        path: String,
    },
    /// Run one reminder sweep.
    Remind,
}
