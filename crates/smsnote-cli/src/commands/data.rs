use std::io::{IsTerminal, Write};
use std::path::Path;

use smsnote_core::{write_export, ExportFormat, Exporter, JsonExporter};

use crate::app::{user_error, AppContext};
use crate::cli::{EraseArgs, ExportArgs};
use crate::security::ensure_parent_dir;

pub fn handle_export(ctx: &AppContext, args: &ExportArgs) -> anyhow::Result<()> {
    let format: ExportFormat = args.format.parse().map_err(user_error)?;
    let service = ctx.service()?;
    let token = ctx.require_token()?;
    let (user, notes) = service
        .export_all(&ctx.call()?, &token)
        .map_err(user_error)?;
    let bytes = JsonExporter::new(format)
        .export(&user, &notes)
        .map_err(user_error)?;

    match args.output.as_deref() {
        Some(path) => {
            ensure_parent_dir(Path::new(path))?;
            write_export(Path::new(path), &bytes)
                .map_err(|e| anyhow::anyhow!("Failed to write export {}: {}", path, e))?;
            if !ctx.quiet() {
                println!("Exported {} notes to {}", notes.len(), path);
            }
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&bytes)
                .and_then(|_| stdout.flush())
                .map_err(|e| anyhow::anyhow!("Failed to write export: {}", e))?;
        }
    }
    Ok(())
}

pub fn handle_erase(ctx: &AppContext, args: &EraseArgs) -> anyhow::Result<()> {
    if !args.yes {
        if !std::io::stdin().is_terminal() {
            return Err(anyhow::anyhow!(
                "Refusing to erase without confirmation. Pass --yes."
            ));
        }
        let proceed = dialoguer::Confirm::new()
            .with_prompt("Delete all notes and the account? This cannot be undone")
            .default(false)
            .interact()?;
        if !proceed {
            return Err(anyhow::anyhow!("Erase cancelled"));
        }
    }

    let service = ctx.service()?;
    let token = ctx.require_token()?;
    service
        .erase_all(&ctx.call()?, &token)
        .map_err(user_error)?;
    ctx.clear_session()?;

    if !ctx.quiet() {
        println!("Account and notes erased");
    }
    Ok(())
}
