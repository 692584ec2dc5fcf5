use std::path::Path;

use crate::app::{user_error, AppContext};
use crate::cli::{InboundArgs, ListArgs, SendArgs};
use crate::helpers::{read_note_text, read_stdin_bytes};
use crate::output::{note_json, page_json, print_json, print_note, print_page};

pub fn handle_send(ctx: &AppContext, args: &SendArgs) -> anyhow::Result<()> {
    let service = ctx.service()?;
    let token = ctx.require_token()?;
    let text = read_note_text(args.text.as_deref())?;
    let note = service
        .create_note(&ctx.call()?, &token, &text)
        .map_err(user_error)?;

    if ctx.quiet() {
        println!("{}", note.id);
    } else {
        println!("Sent note {}", note.id);
    }
    Ok(())
}

pub fn handle_list(ctx: &AppContext, args: &ListArgs) -> anyhow::Result<()> {
    let service = ctx.service()?;
    let token = ctx.require_token()?;
    let index = usize::try_from(args.page - 1)
        .map_err(|_| anyhow::anyhow!("Page number too large: {}", args.page))?;
    let page = service
        .list_notes(&ctx.call()?, &token, index)
        .map_err(user_error)?;

    if args.json {
        return print_json(&page_json(&page, args.page));
    }
    print_page(&page, args.page, ctx.quiet());
    Ok(())
}

pub fn handle_latest(ctx: &AppContext, json: bool) -> anyhow::Result<()> {
    let service = ctx.service()?;
    let token = ctx.require_token()?;
    let note = service
        .latest_note(&ctx.call()?, &token)
        .map_err(user_error)?;

    if json {
        return print_json(&note.as_ref().map(note_json).unwrap_or_default());
    }
    match note {
        Some(note) => print_note(&note, ctx.quiet()),
        None if !ctx.quiet() => println!("No notes yet."),
        None => {}
    }
    Ok(())
}

pub fn handle_recent(ctx: &AppContext, json: bool) -> anyhow::Result<()> {
    let service = ctx.service()?;
    let token = ctx.require_token()?;
    let note = service
        .recent_note(&ctx.call()?, &token)
        .map_err(user_error)?;

    if json {
        return print_json(&note.as_ref().map(note_json).unwrap_or_default());
    }
    match note {
        Some(note) => print_note(&note, ctx.quiet()),
        None if !ctx.quiet() => println!(
            "No notes in the last {} minutes.",
            service.config().recent_window.num_minutes()
        ),
        None => {}
    }
    Ok(())
}

/// Record a provider webhook payload. Needs no login: the sender number
/// identifies the account.
pub fn handle_inbound(ctx: &AppContext, args: &InboundArgs) -> anyhow::Result<()> {
    let service = ctx.service()?;
    let payload = match args.file.as_deref() {
        Some(file) => std::fs::read(Path::new(file))
            .map_err(|e| anyhow::anyhow!("Failed to read payload {}: {}", file, e))?,
        None => read_stdin_bytes()?,
    };
    let note = service
        .inbound_sms(&ctx.call()?, &payload)
        .map_err(user_error)?;

    if ctx.quiet() {
        println!("{}", note.id);
    } else {
        println!("Recorded note {}", note.id);
    }
    Ok(())
}
