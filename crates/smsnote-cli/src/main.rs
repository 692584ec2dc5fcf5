//! SMS Note CLI - send yourself a note by text message
//!
//! Command-line front end for the SMS Note core library: accounts, notes,
//! password reset by text message, export and erasure.

use clap::{CommandFactory, Parser};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod app;
mod cli;
mod commands;
mod config;
mod helpers;
mod outbox;
mod output;
mod security;

use app::AppContext;
use cli::{Cli, Commands};
use commands::account::{
    handle_login, handle_logout, handle_register, handle_update, handle_whoami,
};
use commands::data::{handle_erase, handle_export};
use commands::init::handle_init;
use commands::misc::handle_completions;
use commands::notes::{handle_inbound, handle_latest, handle_list, handle_recent, handle_send};
use commands::recovery::{handle_forgot, handle_reset};

/// Log filter variable, e.g. `SMSNOTE_LOG=smsnote_core=debug`.
const LOG_ENV: &str = "SMSNOTE_LOG";

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let ctx = AppContext::new(&cli);

    match &cli.command {
        Some(Commands::Init(args)) => handle_init(&ctx, args),
        Some(Commands::Register(args)) => handle_register(&ctx, args),
        Some(Commands::Login(args)) => handle_login(&ctx, args),
        Some(Commands::Logout) => handle_logout(&ctx),
        Some(Commands::Whoami { json }) => handle_whoami(&ctx, *json),
        Some(Commands::Update(args)) => handle_update(&ctx, args),
        Some(Commands::Send(args)) => handle_send(&ctx, args),
        Some(Commands::List(args)) => handle_list(&ctx, args),
        Some(Commands::Latest { json }) => handle_latest(&ctx, *json),
        Some(Commands::Recent { json }) => handle_recent(&ctx, *json),
        Some(Commands::Inbound(args)) => handle_inbound(&ctx, args),
        Some(Commands::Forgot { username }) => handle_forgot(&ctx, username),
        Some(Commands::Reset(args)) => handle_reset(&ctx, args),
        Some(Commands::Export(args)) => handle_export(&ctx, args),
        Some(Commands::Erase(args)) => handle_erase(&ctx, args),
        Some(Commands::Completions { shell }) => handle_completions(*shell),
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}
