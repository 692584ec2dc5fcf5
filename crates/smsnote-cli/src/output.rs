//! Output formatting helpers for the CLI.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

use smsnote_core::{Note, NotePage, User};

pub use smsnote_core::export::{note_json, user_json};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn page_json(page: &NotePage, page_number: u64) -> serde_json::Value {
    serde_json::json!({
        "page": page_number,
        "has_more": page.has_more,
        "notes": page.notes.iter().map(note_json).collect::<Vec<_>>(),
    })
}

pub fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| anyhow::anyhow!("Failed to serialize output: {}", e))?;
    println!("{}", text);
    Ok(())
}

pub fn print_user(user: &User, quiet: bool) {
    if quiet {
        println!("{}", user.username);
        return;
    }
    println!("Username: {}", user.username);
    println!("Phone: {}", user.phone);
    println!("ID: {}", user.id);
    println!("Registered: {}", user.created_at.format(TIME_FORMAT));
}

pub fn print_note(note: &Note, quiet: bool) {
    if !quiet {
        println!("ID: {}", note.id);
        println!("Sent: {}", note.created_at.format(TIME_FORMAT));
        println!();
    }
    println!("{}", note.text);
}

pub fn note_table(notes: &[Note]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Sent", "Note", "ID"]);
    for note in notes {
        table.add_row(vec![
            note.created_at.format(TIME_FORMAT).to_string(),
            note.short(),
            note.id.to_string(),
        ]);
    }
    table.to_string()
}

pub fn print_page(page: &NotePage, page_number: u64, quiet: bool) {
    if page.notes.is_empty() {
        if !quiet {
            println!("No notes on page {}.", page_number);
        }
        return;
    }
    if quiet {
        for note in &page.notes {
            println!("{}\t{}", note.id, note.short());
        }
        return;
    }
    println!("{}", note_table(&page.notes));
    if page.has_more {
        println!("More notes: smsnote list --page {}", page_number + 1);
    }
}
