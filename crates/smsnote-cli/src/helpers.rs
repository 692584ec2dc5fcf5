//! Input helper functions for the CLI.

use std::io::{self, BufRead, IsTerminal, Read};

use dialoguer::Password;
use zeroize::Zeroizing;

/// Read a password from the first line of stdin.
fn password_from_stdin() -> anyhow::Result<Zeroizing<String>> {
    let mut line = Zeroizing::new(String::new());
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| anyhow::anyhow!("Failed to read password from stdin: {}", e))?;
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return Err(anyhow::anyhow!("No password provided on stdin"));
    }
    Ok(Zeroizing::new(trimmed.to_string()))
}

fn require_tty() -> anyhow::Result<()> {
    if !io::stdin().is_terminal() {
        return Err(anyhow::anyhow!(
            "No password provided and no TTY available. Use --password-stdin."
        ));
    }
    Ok(())
}

/// Prompt for an existing password.
pub fn prompt_password(from_stdin: bool) -> anyhow::Result<Zeroizing<String>> {
    if from_stdin {
        return password_from_stdin();
    }
    require_tty()?;
    Password::new()
        .with_prompt("Password")
        .interact()
        .map(Zeroizing::new)
        .map_err(|e| anyhow::anyhow!("Failed to read password: {}", e))
}

/// Prompt for a new password with confirmation.
///
/// Returns the password and its confirmation. With `--password-stdin` the
/// single line read serves as both.
pub fn prompt_new_password(
    from_stdin: bool,
) -> anyhow::Result<(Zeroizing<String>, Zeroizing<String>)> {
    if from_stdin {
        let password = password_from_stdin()?;
        let confirm = password.clone();
        return Ok((password, confirm));
    }
    require_tty()?;
    let password = Password::new()
        .with_prompt("New password")
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()
        .map(Zeroizing::new)
        .map_err(|e| anyhow::anyhow!("Failed to read password: {}", e))?;
    let confirm = password.clone();
    Ok((password, confirm))
}

/// Read all of stdin as text (note bodies, webhook payloads).
pub fn read_stdin_bytes() -> anyhow::Result<Vec<u8>> {
    if io::stdin().is_terminal() {
        return Err(anyhow::anyhow!(
            "Nothing to read: pass the input as an argument or pipe it on stdin"
        ));
    }
    let mut buffer = Vec::new();
    io::stdin()
        .read_to_end(&mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to read stdin: {}", e))?;
    Ok(buffer)
}

/// Note text from an argument, or stdin without its trailing newline.
pub fn read_note_text(text: Option<&str>) -> anyhow::Result<String> {
    if let Some(text) = text {
        return Ok(text.to_string());
    }
    let bytes = read_stdin_bytes()?;
    let text = String::from_utf8(bytes)
        .map_err(|_| anyhow::anyhow!("Note text on stdin is not valid UTF-8"))?;
    Ok(text.trim_end_matches(['\r', '\n']).to_string())
}
