//! Application context and composition root for the SMS Note CLI.
//!
//! Resolves the config file, builds the storage backend the config names and
//! wires it into a `NoteService`. Commands only see `AppContext`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use once_cell::unsync::OnceCell;
use secrecy::SecretString;
use zeroize::Zeroizing;

use smsnote_core::{
    CallContext, DocumentNoteStore, LogGateway, NoteService, NoteStore, Security, ServiceConfig,
    SmsGateway, SmsNoteError, SqliteStore, StandardSecurity, User,
};

use crate::cli::Cli;
use crate::config::{
    default_config_path, default_token_path, read_config, SmsNoteConfig, StorageBackend,
};
use crate::outbox::OutboxGateway;
use crate::security::{clear_token_file, read_token_file, write_token_file};

/// Environment variable that overrides the configured signing secret.
pub const SECRET_ENV: &str = "SMSNOTE_SECRET";

pub fn resolve_config_path(cli: &Cli) -> anyhow::Result<PathBuf> {
    if let Some(path) = cli.config.as_deref() {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    default_config_path()
}

pub fn missing_config_hint() -> &'static str {
    "Run:\n  smsnote init\n\nOr point at an existing config:\n  SMSNOTE_CONFIG=/path/to/config.toml smsnote <command>"
}

pub fn exit_not_found_with_hint(message: &str, hint: &str) -> ! {
    eprintln!("Error: {}", message);
    eprintln!("{}", hint);
    std::process::exit(3);
}

fn resolve_secret(config: &SmsNoteConfig) -> anyhow::Result<SecretString> {
    if let Ok(value) = std::env::var(SECRET_ENV) {
        if !value.trim().is_empty() {
            return Ok(SecretString::from(value));
        }
    }
    config
        .security
        .secret
        .clone()
        .filter(|s| !s.trim().is_empty())
        .map(SecretString::from)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No signing secret configured. Set {} or run: smsnote init --force",
                SECRET_ENV
            )
        })
}

fn service_config(config: &SmsNoteConfig) -> ServiceConfig {
    ServiceConfig {
        page_size: config.service.page_size,
        recent_window: chrono::Duration::seconds(config.service.recent_window_seconds),
        reset_link: config.service.reset_link.clone(),
        ..ServiceConfig::default()
    }
}

/// Build the service the config describes.
pub fn build_service(config: &SmsNoteConfig) -> anyhow::Result<NoteService> {
    let secret = resolve_secret(config)?;
    let security: Arc<dyn Security> = Arc::new(
        StandardSecurity::with_cost(secret, config.security.hash_cost())
            .map_err(|e| anyhow::anyhow!("Invalid security settings: {}", e))?,
    );

    let path = Path::new(&config.storage.path);
    let store: Arc<dyn NoteStore> = match config.storage.backend {
        StorageBackend::Sqlite => Arc::new(
            SqliteStore::open(path, security.clone())
                .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", path.display(), e))?,
        ),
        StorageBackend::Document => Arc::new(
            DocumentNoteStore::open(path, security.clone())
                .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", path.display(), e))?,
        ),
    };
    tracing::debug!(backend = ?config.storage.backend, path = %path.display(), "opened store");

    let sms: Arc<dyn SmsGateway> = match config.sms.outbox.as_deref() {
        Some(outbox) => Arc::new(OutboxGateway::new(PathBuf::from(outbox))),
        None => Arc::new(LogGateway),
    };

    NoteService::new(store, security, sms)
        .with_config(service_config(config))
        .map_err(|e| anyhow::anyhow!("Invalid service settings: {}", e))
}

/// Turn a service error into the message a user should see.
pub fn user_error(err: SmsNoteError) -> anyhow::Error {
    match err {
        SmsNoteError::AuthenticationFailed | SmsNoteError::Token => {
            anyhow::anyhow!("Authentication failed. Run: smsnote login <USERNAME>")
        }
        SmsNoteError::Delivery { note_id, .. } => {
            anyhow::anyhow!("Note {} was saved but could not be texted", note_id)
        }
        err if err.is_backend() => {
            tracing::error!(error = %err, "backend failure");
            anyhow::anyhow!("Internal storage error (rerun with SMSNOTE_LOG=debug for details)")
        }
        other => anyhow::anyhow!("{}", other),
    }
}

/// Application context that bundles CLI args with the lazily built service.
pub struct AppContext<'a> {
    cli: &'a Cli,
    config: OnceCell<SmsNoteConfig>,
    service: OnceCell<NoteService>,
}

impl<'a> AppContext<'a> {
    pub fn new(cli: &'a Cli) -> Self {
        Self {
            cli,
            config: OnceCell::new(),
            service: OnceCell::new(),
        }
    }

    pub fn quiet(&self) -> bool {
        self.cli.quiet
    }

    pub fn config_path(&self) -> anyhow::Result<PathBuf> {
        resolve_config_path(self.cli)
    }

    /// The parsed config file; exits with a hint when there is none.
    pub fn config(&self) -> anyhow::Result<&SmsNoteConfig> {
        self.config.get_or_try_init(|| {
            let path = self.config_path()?;
            if !path.exists() {
                exit_not_found_with_hint(
                    &format!("No config found at {}", path.display()),
                    missing_config_hint(),
                );
            }
            read_config(&path)
        })
    }

    pub fn service(&self) -> anyhow::Result<&NoteService> {
        self.service
            .get_or_try_init(|| build_service(self.config()?))
    }

    /// Context for one service call, bounded by the configured timeout.
    pub fn call(&self) -> anyhow::Result<CallContext> {
        let seconds = self.config()?.service.timeout_seconds;
        if seconds == 0 {
            return Ok(CallContext::background());
        }
        Ok(CallContext::with_timeout(Duration::from_secs(seconds)))
    }

    pub fn token_path(&self) -> anyhow::Result<PathBuf> {
        default_token_path()
    }

    /// The stored session token; exits with a hint when logged out.
    pub fn require_token(&self) -> anyhow::Result<Zeroizing<String>> {
        match read_token_file(&self.token_path()?)? {
            Some(token) => Ok(token),
            None => exit_not_found_with_hint(
                "Not logged in",
                "Run:\n  smsnote login <USERNAME>\n\nOr create an account:\n  smsnote register <USERNAME> --phone <NUMBER>",
            ),
        }
    }

    /// Persist the session token carried by `user`.
    pub fn save_session(&self, user: &User) -> anyhow::Result<()> {
        let token = user
            .token()
            .ok_or_else(|| anyhow::anyhow!("Service returned no session token"))?;
        write_token_file(&self.token_path()?, token)
    }

    pub fn clear_session(&self) -> anyhow::Result<bool> {
        clear_token_file(&self.token_path()?)
    }
}
