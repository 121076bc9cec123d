use anyhow::{Context, Result, anyhow};
use chrono::TimeDelta;
use clap::{Args, Parser, Subcommand};
mod auth;
use secuvault::generator::{self, PasswordPolicy};
use secuvault::{Config, ItemUpdate, ListFilter, NewItem, SecuVault, VaultFields, VaultRecord};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "secuvault")]
#[command(
    version,
    about = "Zero-knowledge password vault with per-field encryption and TOTP two-factor login."
)]
struct Cli {
    /// Path to the vault store file
    #[arg(long, global = true, value_name = "PATH", env = "SECUVAULT_PATH")]
    store: Option<PathBuf>,

    /// Account that owns the items
    #[arg(long, global = true, value_name = "ID", env = "SECUVAULT_OWNER")]
    owner: Option<String>,

    /// Two-factor code, required once 2FA is enabled
    #[arg(long, global = true, value_name = "CODE")]
    code: Option<String>,

    /// Issuer shown in authenticator apps
    #[arg(long, global = true, hide = true, env = "SECUVAULT_ISSUER")]
    issuer: Option<String>,

    /// Accepted clock drift, in 30 second steps
    #[arg(long, global = true, hide = true, env = "SECUVAULT_TOTP_WINDOW")]
    totp_window: Option<u32>,

    /// Idle session timeout in seconds
    #[arg(long, global = true, hide = true, env = "SECUVAULT_SESSION_TIMEOUT")]
    session_timeout: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn config(&self) -> Result<Config> {
        let mut config = Config {
            store_path: self.store.clone(),
            ..Default::default()
        };
        if let Some(owner) = &self.owner {
            config.owner_id = owner.clone();
        }
        if let Some(issuer) = &self.issuer {
            config.issuer = issuer.clone();
        }
        if let Some(window) = self.totp_window {
            config.totp_window = window;
        }
        if let Some(secs) = self.session_timeout {
            config.session_timeout = TimeDelta::try_seconds(secs)
                .ok_or_else(|| anyhow!("session timeout out of range: {secs} seconds"))?;
        }
        Ok(config)
    }

    fn unlock(&self) -> Result<SecuVault> {
        let config = self.config()?;
        let storage = config.storage()?;
        let secret = auth::read_master_secret()?;
        if self.code.is_none() && std::io::stdin().is_terminal() {
            return SecuVault::login_prompting(storage, config, secret, || auth::read_code(None));
        }
        SecuVault::login(storage, config, secret, self.code.as_deref())
    }
}

#[derive(Debug, Args)]
struct GenerateArgs {
    /// Number of characters
    #[arg(short, long, default_value_t = 16)]
    length: usize,

    #[arg(long)]
    no_symbols: bool,

    #[arg(long)]
    no_digits: bool,

    /// Allow characters such as l, 1, O and 0
    #[arg(long)]
    allow_lookalikes: bool,
}

impl GenerateArgs {
    fn policy(&self) -> PasswordPolicy {
        PasswordPolicy {
            length: self.length,
            letters: true,
            digits: !self.no_digits,
            symbols: !self.no_symbols,
            exclude_lookalikes: !self.allow_lookalikes,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Stores a new item
    #[command(arg_required_else_help = true)]
    Add {
        title: String,
        username: String,
        /// Secret to store; a random one is generated when omitted
        #[arg(long)]
        secret: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        favorite: bool,
    },

    /// Shows one item, secret included
    #[command(arg_required_else_help = true)]
    Get { id: String },

    /// Lists items, newest change first
    List {
        /// Case-insensitive match on title and username
        #[arg(short, long)]
        search: Option<String>,
        #[arg(short, long)]
        category: Option<String>,
        #[arg(long)]
        favorites: bool,
    },

    /// Changes fields of an item; an empty value clears url or notes
    #[command(arg_required_else_help = true)]
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        secret: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        favorite: Option<bool>,
    },

    /// Removes an item
    #[command(arg_required_else_help = true)]
    Remove { id: String },

    /// Prints a random password
    Generate(GenerateArgs),

    /// Verifies the master password and second factor
    Login,

    /// Shows a summary of the vault
    Info,

    /// Manages two-factor authentication
    #[command(name = "2fa", subcommand)]
    TwoFactor(TwoFactorCommand),
}

#[derive(Debug, Subcommand)]
enum TwoFactorCommand {
    /// Generates a new secret to add to an authenticator app
    Setup {
        /// Account name shown in the authenticator app
        #[arg(long)]
        label: Option<String>,
    },
    /// Enables 2FA with a code from the new secret
    Confirm { code: Option<String> },
    /// Disables 2FA with a code from the active secret
    Disable { code: Option<String> },
    /// Shows whether 2FA is enabled
    Status,
}

fn print_item(item: &VaultRecord) {
    let fields = &item.fields;
    println!("id:        {}", item.id);
    println!("title:     {}", fields.title);
    println!("username:  {}", fields.username);
    println!("secret:    {}", fields.secret);
    if let Some(url) = &fields.url {
        println!("url:       {url}");
    }
    if let Some(notes) = &fields.notes {
        println!("notes:     {notes}");
    }
    println!("category:  {}", item.category);
    println!("favorite:  {}", item.is_favorite);
    println!("updated:   {}", item.updated_at.to_rfc3339());
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "secuvault=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Cli::parse();
    args.config()?.validate()?;

    match &args.command {
        Commands::Generate(gen_args) => {
            let password = generator::generate(&gen_args.policy())?;
            println!("{}", password.as_str());
        }
        Commands::Add {
            title,
            username,
            secret,
            url,
            notes,
            category,
            favorite,
        } => {
            let mut vault = args.unlock()?;
            let secret = match secret {
                Some(s) => s.clone(),
                None => generator::generate(&PasswordPolicy::default())?.to_string(),
            };
            let mut fields = VaultFields::new(title.as_str(), username.as_str(), secret);
            if let Some(url) = url {
                fields = fields.with_url(url.as_str());
            }
            if let Some(notes) = notes {
                fields = fields.with_notes(notes.as_str());
            }
            let mut item = NewItem::new(fields).favorite(*favorite);
            if let Some(category) = category {
                item = item.category(category.as_str());
            }

            let created = vault.create(item)?;
            println!("stored item '{}' ({})", created.fields.title, created.id);
        }
        Commands::Get { id } => {
            let vault = args.unlock()?;
            print_item(&vault.get(id)?);
        }
        Commands::List {
            search,
            category,
            favorites,
        } => {
            let vault = args.unlock()?;
            let listing = vault.list(&ListFilter {
                category: category.clone(),
                favorites_only: *favorites,
                search: search.clone(),
            })?;

            if listing.items.is_empty() {
                println!("No items found.");
            } else {
                let title_width = listing
                    .items
                    .iter()
                    .map(|r| r.fields.title.chars().count())
                    .chain(std::iter::once("Title".len()))
                    .max()
                    .unwrap_or_default();

                println!("{:<24}  {:<title_width$}  Username", "Id", "Title");
                println!("{:-<24}  {:-<title_width$}  {:-<8}", "", "", "");
                for r in &listing.items {
                    let star = if r.is_favorite { " *" } else { "" };
                    println!(
                        "{:<24}  {:<title_width$}  {}{star}",
                        r.id, r.fields.title, r.fields.username
                    );
                }
            }
            if !listing.unreadable.is_empty() {
                eprintln!(
                    "{} item(s) could not be decrypted: {}",
                    listing.unreadable.len(),
                    listing.unreadable.join(", ")
                );
            }
        }
        Commands::Edit {
            id,
            title,
            username,
            secret,
            url,
            notes,
            category,
            favorite,
        } => {
            let update = ItemUpdate {
                title: title.clone(),
                username: username.clone(),
                secret: secret.clone(),
                url: url.clone(),
                notes: notes.clone(),
                category: category.clone(),
                is_favorite: *favorite,
            };
            if update.is_empty() {
                return Err("nothing to change".into());
            }
            let mut vault = args.unlock()?;
            vault.update(id, update)?;
            println!("item '{id}' updated.");
        }
        Commands::Remove { id } => {
            let mut vault = args.unlock()?;
            vault.delete(id)?;
            println!("item '{id}' removed");
        }
        Commands::Login => {
            let vault = args.unlock()?;
            println!("unlocked vault for '{}'", vault.owner_id());
            vault.logout();
        }
        Commands::Info => {
            let vault = args.unlock()?;
            let stats = vault.stats()?;
            println!("Items:            {}", stats.total);
            println!("Favorites:        {}", stats.favorites);
            println!("Weak secrets:     {}", stats.weak_secrets);
            println!("Strong secrets:   {}", stats.strong_secrets);
            println!("Recent (7 days):  {}", stats.recent);
            println!("Avg secret len:   {}", stats.average_secret_length);
            println!("Security score:   {}/100", stats.security_score);
            if stats.unreadable > 0 {
                println!("Unreadable:       {}", stats.unreadable);
            }
            println!("Created:          {}", stats.store_created.to_rfc3339());
            for (category, count) in &stats.by_category {
                println!("  {category}: {count}");
            }
        }
        Commands::TwoFactor(command) => {
            let mut vault = args.unlock()?;
            match command {
                TwoFactorCommand::Setup { label } => {
                    let label = label.clone().unwrap_or_else(|| vault.owner_id().to_string());
                    let (secret, uri) = vault
                        .setup_two_factor(&label)
                        .context("failed to start two-factor setup")?;
                    println!("secret: {}", secret.to_base32());
                    println!("uri:    {uri}");
                    println!("confirm with: secuvault 2fa confirm <code>");
                }
                TwoFactorCommand::Confirm { code } => {
                    let code = auth::read_code(code.clone())?;
                    vault.confirm_two_factor(&code)?;
                    println!("two-factor authentication enabled");
                }
                TwoFactorCommand::Disable { code } => {
                    let code = auth::read_code(code.clone())?;
                    vault.disable_two_factor(&code)?;
                    println!("two-factor authentication disabled");
                }
                TwoFactorCommand::Status => {
                    let status = vault.two_factor_status();
                    let state = match (status.enabled, status.pending) {
                        (true, _) => "enabled",
                        (false, true) => "pending confirmation",
                        (false, false) => "disabled",
                    };
                    println!("two-factor authentication: {state}");
                    if let Some(until) = status.locked_until {
                        println!("locked until: {}", until.to_rfc3339());
                    }
                }
            }
        }
    }

    Ok(())
}
