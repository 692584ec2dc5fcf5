use smsnote_core::ProfileUpdate;

use crate::app::{user_error, AppContext};
use crate::cli::{LoginArgs, RegisterArgs, UpdateArgs};
use crate::helpers::{prompt_new_password, prompt_password};
use crate::output::{print_json, print_user, user_json};

pub fn handle_register(ctx: &AppContext, args: &RegisterArgs) -> anyhow::Result<()> {
    let service = ctx.service()?;
    let (password, confirm) = prompt_new_password(args.password_stdin)?;
    let user = service
        .register(&ctx.call()?, &args.username, &password, &confirm, &args.phone)
        .map_err(user_error)?;
    ctx.save_session(&user)?;

    if !ctx.quiet() {
        println!("Registered {} ({})", user.username, user.phone);
    }
    Ok(())
}

pub fn handle_login(ctx: &AppContext, args: &LoginArgs) -> anyhow::Result<()> {
    let service = ctx.service()?;
    let password = prompt_password(args.password_stdin)?;
    let user = service
        .login(&ctx.call()?, &args.username, &password)
        .map_err(user_error)?;
    ctx.save_session(&user)?;

    if !ctx.quiet() {
        println!("Logged in as {}", user.username);
    }
    Ok(())
}

pub fn handle_logout(ctx: &AppContext) -> anyhow::Result<()> {
    let removed = ctx.clear_session()?;
    if !ctx.quiet() {
        if removed {
            println!("Logged out");
        } else {
            println!("Not logged in");
        }
    }
    Ok(())
}

pub fn handle_whoami(ctx: &AppContext, json: bool) -> anyhow::Result<()> {
    let service = ctx.service()?;
    let token = ctx.require_token()?;
    let user = service
        .current_user(&ctx.call()?, &token)
        .map_err(user_error)?;

    if json {
        return print_json(&user_json(&user));
    }
    print_user(&user, ctx.quiet());
    Ok(())
}

pub fn handle_update(ctx: &AppContext, args: &UpdateArgs) -> anyhow::Result<()> {
    if args.username.is_none() && args.phone.is_none() && !args.password {
        return Err(anyhow::anyhow!(
            "Nothing to update. Pass --username, --phone or --password."
        ));
    }
    let service = ctx.service()?;
    let token = ctx.require_token()?;

    let mut changes = ProfileUpdate {
        username: args.username.clone(),
        phone: args.phone.clone(),
        ..ProfileUpdate::default()
    };
    if args.password {
        let (password, confirm) = prompt_new_password(args.password_stdin)?;
        changes.password = Some(password.as_str().to_string());
        changes.password_confirm = Some(confirm.as_str().to_string());
    }

    let user = service
        .update_profile(&ctx.call()?, &token, &changes)
        .map_err(user_error)?;
    ctx.save_session(&user)?;

    if !ctx.quiet() {
        println!("Updated account {}", user.username);
        print_user(&user, false);
    }
    Ok(())
}
