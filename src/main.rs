use clap::{Arg, ArgMatches, Command};
use log::{error, info};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use reddit_accounts::auth::password::read_password;
use reddit_accounts::auth::{AccountService, Pbkdf2Hasher, RegisterRequest};
use reddit_accounts::config::{AppConfig, MailTransport};
use reddit_accounts::email::{
    LogNotificationSender, NotificationSender, SecureEmailManager, SmtpNotificationSender,
};
use reddit_accounts::storage::JsonDatastore;
use reddit_accounts::utils::logging::initialize_logging;
use reddit_accounts::utils::time::{format_age, format_timestamp};
use reddit_accounts::DEFAULT_CONFIG_FILE;

type Service = AccountService<Pbkdf2Hasher, JsonDatastore, Box<dyn NotificationSender>>;

fn cli() -> Command {
    Command::new("reddit-accounts")
        .about("Account signup and email verification")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .global(true)
                .help("Path to the JSON configuration file"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("signup")
                .about("Register a new, unverified account")
                .arg(Arg::new("username").long("username").short('u').required(true))
                .arg(Arg::new("email").long("email").short('e').required(true))
                .arg(
                    Arg::new("password")
                        .long("password")
                        .short('p')
                        .help("Prompted for when omitted"),
                ),
        )
        .subcommand(
            Command::new("verify")
                .about("Activate the account owning a verification token")
                .arg(Arg::new("token").required(true)),
        )
        .subcommand(
            Command::new("outbox")
                .about("Inspect or flush undelivered notification emails")
                .subcommand_required(true)
                .subcommand(Command::new("list").about("Show pending emails"))
                .subcommand(Command::new("flush").about("Retry delivery of pending emails")),
        )
        .subcommand(
            Command::new("email-setup")
                .about("Store SMTP credentials in the system keyring")
                .arg(Arg::new("host").long("host").required(true))
                .arg(
                    Arg::new("port")
                        .long("port")
                        .default_value("587")
                        .value_parser(clap::value_parser!(u16)),
                )
                .arg(Arg::new("username").long("username").short('u').required(true)),
        )
}

fn main() -> ExitCode {
    let matches = cli().get_matches();

    match run(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = AppConfig::load(&config_path)?;

    if let Err(e) = initialize_logging(&config.log_file) {
        eprintln!("Warning: logging unavailable: {}", e);
    }
    info!("Using configuration from {}", config_path.display());

    match matches.subcommand() {
        Some(("signup", sub)) => signup(&config, sub),
        Some(("verify", sub)) => verify(&config, sub),
        Some(("outbox", sub)) => match sub.subcommand() {
            Some(("list", _)) => list_outbox(&config),
            Some(("flush", _)) => flush_outbox(&config),
            _ => Err("unknown outbox command".into()),
        },
        Some(("email-setup", sub)) => email_setup(sub),
        _ => Err("unknown command".into()),
    }
}

fn build_service(config: &AppConfig) -> Result<Service, Box<dyn Error>> {
    let datastore = JsonDatastore::open(&config.data_file)?;
    let sender: Box<dyn NotificationSender> = match config.mail_transport {
        MailTransport::Smtp => Box::new(SmtpNotificationSender::from_keyring(&config.app_name)?),
        MailTransport::Log => Box::new(LogNotificationSender),
    };

    Ok(AccountService::new(
        Pbkdf2Hasher::with_iterations(config.hash_iterations),
        datastore,
        sender,
        config.activation_settings(),
    ))
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a String, Box<dyn Error>> {
    matches
        .get_one::<String>(name)
        .ok_or_else(|| format!("missing argument '{}'", name).into())
}

fn signup(config: &AppConfig, matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let username = required(matches, "username")?;
    let email = required(matches, "email")?;
    let password = match matches.get_one::<String>("password") {
        Some(password) => password.clone(),
        None => {
            println!("Enter password:");
            read_password()?
        }
    };

    let request = RegisterRequest::new(username, &password, email);
    request.validate()?;

    build_service(config)?.signup(&request)?;
    println!("Account '{}' created. Check {} for the activation link.", username, email);
    Ok(())
}

fn verify(config: &AppConfig, matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let token = required(matches, "token")?;
    build_service(config)?.verify_account(token)?;
    println!("Account Activated Successfully");
    Ok(())
}

fn list_outbox(config: &AppConfig) -> Result<(), Box<dyn Error>> {
    let pending = build_service(config)?.pending_notifications()?;
    if pending.is_empty() {
        println!("No pending emails.");
        return Ok(());
    }

    for entry in pending {
        println!(
            "{}  {}  to={}  subject={:?}  queued {} ago  attempts={}{}",
            entry.id,
            format_timestamp(&entry.enqueued_at),
            entry.email.recipient,
            entry.email.subject,
            format_age(&entry.enqueued_at),
            entry.attempts,
            entry
                .last_error
                .map(|e| format!("  last_error={}", e))
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn flush_outbox(config: &AppConfig) -> Result<(), Box<dyn Error>> {
    let report = build_service(config)?.dispatch_outbox()?;
    println!(
        "Delivered {} email(s), {} failed, {} already being sent elsewhere.",
        report.delivered, report.failed, report.skipped
    );
    Ok(())
}

fn email_setup(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let host = required(matches, "host")?;
    let username = required(matches, "username")?;
    let port = *matches.get_one::<u16>("port").ok_or("missing argument 'port'")?;

    println!("Enter SMTP password (or app-specific password):");
    let password = read_password()?;
    if password.is_empty() {
        return Err("SMTP password cannot be empty".into());
    }

    SecureEmailManager::new()?.store_credentials(username, &password, host, port)?;
    println!("Email credentials stored in the system keyring.");
    Ok(())
}
