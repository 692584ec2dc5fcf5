use std::path::PathBuf;

use crate::app::{build_service, AppContext};
use crate::cli::{BackendArg, InitArgs};
use crate::config::{
    default_outbox_path, default_storage_path, write_config, SmsNoteConfig, StorageBackend,
};
use crate::security::generate_secret;

pub fn handle_init(ctx: &AppContext, args: &InitArgs) -> anyhow::Result<()> {
    let config_path = ctx.config_path()?;
    if config_path.exists() && !args.force {
        return Err(anyhow::anyhow!(
            "Config already exists at {} (use --force to overwrite)",
            config_path.display()
        ));
    }

    let backend = match args.backend {
        BackendArg::Sqlite => StorageBackend::Sqlite,
        BackendArg::Document => StorageBackend::Document,
    };
    let storage_path = match args.path.as_deref() {
        Some(path) => PathBuf::from(path),
        None => default_storage_path(backend)?,
    };
    let outbox_path = default_outbox_path()?;
    let secret = generate_secret()?;

    let config = SmsNoteConfig::new(
        backend,
        storage_path.clone(),
        secret.as_str().to_string(),
        args.reset_link.clone(),
        Some(outbox_path.clone()),
    );

    // Opening the store creates the schema and catches bad paths early.
    build_service(&config)?;
    write_config(&config_path, &config)?;

    if !ctx.quiet() {
        println!("Wrote config to {}", config_path.display());
        println!("Storage: {:?} at {}", backend, storage_path.display());
        println!("Outgoing texts go to {}", outbox_path.display());
        println!();
        println!("Next:\n  smsnote register <USERNAME> --phone <NUMBER>");
    }
    Ok(())
}
