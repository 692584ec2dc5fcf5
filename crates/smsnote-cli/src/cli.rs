use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use smsnote_core::VERSION;

/// SMS Note - send yourself a note by text message
#[derive(Parser)]
#[command(name = "smsnote")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true, env = "SMSNOTE_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a config file with a fresh signing secret
    Init(InitArgs),

    /// Create an account and log in
    Register(RegisterArgs),

    /// Log in and store the session token
    Login(LoginArgs),

    /// Forget the stored session token
    Logout,

    /// Show the logged-in account
    Whoami {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change username, password or phone number
    Update(UpdateArgs),

    /// Save a note and text it to yourself
    Send(SendArgs),

    /// List notes, newest first
    List(ListArgs),

    /// Show the most recent note
    Latest {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the most recent note if it was sent within the recent window
    Recent {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record an inbound SMS webhook payload as a note
    Inbound(InboundArgs),

    /// Text a password-reset link to an account's phone
    Forgot {
        /// Account username
        #[arg(value_name = "USERNAME")]
        username: String,
    },

    /// Set a new password using a reset link token
    Reset(ResetArgs),

    /// Export your account and notes
    Export(ExportArgs),

    /// Delete your notes and your account
    Erase(EraseArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_name = "SHELL")]
        shell: Shell,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Sqlite,
    Document,
}

/// Arguments for the `init` command
#[derive(Args)]
pub struct InitArgs {
    /// Storage backend
    #[arg(long, value_enum, default_value = "sqlite")]
    pub backend: BackendArg,

    /// Database file (sqlite) or directory (document)
    #[arg(long, value_name = "PATH")]
    pub path: Option<String>,

    /// Link texted for password resets; must contain {token}
    #[arg(long)]
    pub reset_link: Option<String>,

    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `register` command
#[derive(Args)]
pub struct RegisterArgs {
    #[arg(value_name = "USERNAME")]
    pub username: String,

    /// Phone number (E.164, or a US number without country code)
    #[arg(long)]
    pub phone: String,

    /// Read the password from the first line of stdin
    #[arg(long)]
    pub password_stdin: bool,
}

/// Arguments for the `login` command
#[derive(Args)]
pub struct LoginArgs {
    #[arg(value_name = "USERNAME")]
    pub username: String,

    /// Read the password from the first line of stdin
    #[arg(long)]
    pub password_stdin: bool,
}

/// Arguments for the `update` command
#[derive(Args)]
pub struct UpdateArgs {
    /// New username
    #[arg(long)]
    pub username: Option<String>,

    /// New phone number
    #[arg(long)]
    pub phone: Option<String>,

    /// Prompt for a new password
    #[arg(long)]
    pub password: bool,

    /// Read the new password from the first line of stdin
    #[arg(long, requires = "password")]
    pub password_stdin: bool,
}

/// Arguments for the `send` command
#[derive(Args)]
pub struct SendArgs {
    /// Note text (reads stdin when omitted)
    #[arg(value_name = "TEXT")]
    pub text: Option<String>,
}

/// Arguments for the `list` command
#[derive(Args)]
pub struct ListArgs {
    /// Page number, starting at 1
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub page: u64,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `inbound` command
#[derive(Args)]
pub struct InboundArgs {
    /// File holding the payload (reads stdin when omitted)
    #[arg(value_name = "FILE")]
    pub file: Option<String>,
}

/// Arguments for the `reset` command
#[derive(Args)]
pub struct ResetArgs {
    /// Token from the reset link
    #[arg(value_name = "TOKEN")]
    pub token: String,

    /// Read the new password from the first line of stdin
    #[arg(long)]
    pub password_stdin: bool,
}

/// Arguments for the `export` command
#[derive(Args)]
pub struct ExportArgs {
    /// Output format (json, jsonl)
    #[arg(long, default_value = "json")]
    pub format: String,

    /// Write to a file instead of stdout
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<String>,
}

/// Arguments for the `erase` command
#[derive(Args)]
pub struct EraseArgs {
    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,
}
