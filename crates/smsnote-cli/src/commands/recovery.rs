use crate::app::{user_error, AppContext};
use crate::cli::ResetArgs;
use crate::helpers::prompt_new_password;

pub fn handle_forgot(ctx: &AppContext, username: &str) -> anyhow::Result<()> {
    let service = ctx.service()?;
    service
        .forgot_password(&ctx.call()?, username)
        .map_err(user_error)?;

    if !ctx.quiet() {
        println!("A reset link was texted to the phone on file. It expires in 5 minutes.");
    }
    Ok(())
}

/// Accept either the bare token or the whole link from the text message.
fn token_from_link(input: &str) -> &str {
    let trimmed = input.trim();
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

pub fn handle_reset(ctx: &AppContext, args: &ResetArgs) -> anyhow::Result<()> {
    let service = ctx.service()?;
    let (password, confirm) = prompt_new_password(args.password_stdin)?;
    let user = service
        .reset_password(&ctx.call()?, token_from_link(&args.token), &password, &confirm)
        .map_err(user_error)?;
    ctx.save_session(&user)?;

    if !ctx.quiet() {
        println!("Password updated. Logged in as {}", user.username);
    }
    Ok(())
}
