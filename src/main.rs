//! DojoFinder CLI - a command-line client for the DojoFinder school
//! directory: session management, school browsing, nearby search, and
//! student profiles.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dojofinder::api::ApiClient;
use dojofinder::auth::{
    CredentialStore, SessionManager, SessionState, SessionStore, TokenRefresher,
};
use dojofinder::config::Config;
use dojofinder::geo;
use dojofinder::models::School;
use dojofinder::utils::{
    cmp_ignore_case, contains_ignore_case, format_date, format_optional, format_phone, truncate,
};

// ============================================================================
// Constants
// ============================================================================

/// Maximum concurrent detail requests for `schools --full`.
/// Limits parallel requests to avoid overwhelming the server.
const MAX_CONCURRENT_REQUESTS: usize = 10;

/// Default search radius for `nearby`, in kilometers.
const DEFAULT_NEARBY_RADIUS_KM: f64 = 10.0;

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn print_usage() {
    eprintln!("DojoFinder - martial-arts school directory client");
    eprintln!();
    eprintln!("Usage: dojofinder <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  login [email] [--remember]     Log in (password prompted or from keychain)");
    eprintln!("  logout [--forget]              Log out; --forget drops the saved password");
    eprintln!("  whoami                         Show the current session");
    eprintln!("  register <username> <email>    Create an account");
    eprintln!("  forgot-password <email>        Request a password reset");
    eprintln!("  schools [--filter <text>] [--full]");
    eprintln!("                                 List schools, optionally with full details");
    eprintln!("  school <id>                    Show one school");
    eprintln!("  nearby <lat> <lon> [km]        Find schools near a coordinate");
    eprintln!("  student <id>                   Show a student profile and progress");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print_usage();
        return Ok(());
    };

    let config = Config::load().unwrap_or_default();
    let store = Arc::new(SessionStore::new(Config::data_dir()?));
    let session = Arc::new(SessionManager::new(config.api_base_url(), store.clone())?);
    let refresher: Arc<dyn TokenRefresher> = session.clone();
    let api = ApiClient::new(config.api_base_url(), store)?.with_refresher(refresher);

    session.bootstrap().await;
    info!(base_url = %config.api_base_url(), "DojoFinder CLI starting");

    match command.as_str() {
        "login" => cmd_login(&session, config, &args[1..]).await,
        "logout" => cmd_logout(&session, &config, &args[1..]).await,
        "whoami" => cmd_whoami(&session).await,
        "register" => cmd_register(&session, &args[1..]).await,
        "forgot-password" => cmd_forgot_password(&session, &args[1..]).await,
        "schools" => cmd_schools(&api, &args[1..]).await,
        "school" => cmd_school(&api, &args[1..]).await,
        "nearby" => cmd_nearby(&api, &args[1..]).await,
        "student" => cmd_student(&api, &args[1..]).await,
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            Ok(())
        }
    }
}

// ============================================================================
// Session commands
// ============================================================================

async fn cmd_login(session: &SessionManager, mut config: Config, args: &[String]) -> Result<()> {
    let remember = args.iter().any(|a| a == "--remember");
    let email = match args.iter().find(|a| !a.starts_with("--")) {
        Some(email) => email.clone(),
        None => match config.last_email.clone() {
            Some(email) => email,
            None => prompt_line("Email: ")?,
        },
    };

    let password = match CredentialStore::saved_password(&email) {
        Some(saved) => {
            info!(%email, "Using saved password from the keychain");
            saved
        }
        None => rpassword::prompt_password("Password: ")?,
    };

    match session.login(&email, &password).await {
        Ok(user) => {
            println!("Logged in as {}", user.display_name());
            if remember {
                if let Err(e) = CredentialStore::remember(&email, &password) {
                    warn!(error = %e, "Could not save the password to the keychain");
                }
            }
            config.last_email = Some(email);
            if let Err(e) = config.save() {
                warn!(error = %e, "Could not save config");
            }
            Ok(())
        }
        Err(e) => bail!("{}", e),
    }
}

async fn cmd_logout(session: &SessionManager, config: &Config, args: &[String]) -> Result<()> {
    session.logout().await;
    if args.iter().any(|a| a == "--forget") {
        if let Some(ref email) = config.last_email {
            CredentialStore::forget(email);
        }
    }
    println!("Logged out.");
    Ok(())
}

async fn cmd_whoami(session: &SessionManager) -> Result<()> {
    match session.current_state().await {
        SessionState::Authenticated(user) => {
            println!("{} <{}>", user.display_name(), user.email);
            if let Some(ref roles) = user.roles {
                println!("Roles: {}", roles.join(", "));
            }
        }
        _ => println!("Not logged in."),
    }
    Ok(())
}

async fn cmd_register(session: &SessionManager, args: &[String]) -> Result<()> {
    let (Some(username), Some(email)) = (args.first(), args.get(1)) else {
        bail!("Usage: dojofinder register <username> <email>");
    };
    let password = rpassword::prompt_password("Password: ")?;

    match session.register(username, email, &password).await {
        Ok(_) => {
            println!("Account created. Check your email, then run `dojofinder login {}`.", email);
            Ok(())
        }
        Err(e) => bail!("{}", e),
    }
}

async fn cmd_forgot_password(session: &SessionManager, args: &[String]) -> Result<()> {
    let Some(email) = args.first() else {
        bail!("Usage: dojofinder forgot-password <email>");
    };

    match session.forgot_password(email).await {
        Ok(_) => {
            println!("Password reset requested for {}.", email);
            Ok(())
        }
        Err(e) => bail!("{}", e),
    }
}

// ============================================================================
// Directory commands
// ============================================================================

async fn cmd_schools(api: &ApiClient, args: &[String]) -> Result<()> {
    let full = args.iter().any(|a| a == "--full");
    let filter = args
        .iter()
        .position(|a| a == "--filter")
        .and_then(|i| args.get(i + 1))
        .cloned();

    let mut schools = api.fetch_schools().await?;
    if let Some(ref needle) = filter {
        schools.retain(|s| {
            contains_ignore_case(&s.name, needle) || contains_ignore_case(&s.address, needle)
        });
    }
    schools.sort_by(|a, b| cmp_ignore_case(&a.name, &b.name));

    if full {
        // Re-fetch each listing for its complete record, a few at a time.
        let mut detailed: Vec<School> = stream::iter(schools.iter().map(|s| s.id.clone()))
            .map(|id| {
                let api = api.clone();
                async move { api.fetch_school(&id).await }
            })
            .buffer_unordered(MAX_CONCURRENT_REQUESTS)
            .filter_map(|result| async move {
                match result {
                    Ok(school) => Some(school),
                    Err(e) => {
                        warn!(error = %e, "Skipping school that failed to load");
                        None
                    }
                }
            })
            .collect()
            .await;

        detailed.sort_by(|a, b| cmp_ignore_case(&a.name, &b.name));
        for school in &detailed {
            print_school(school);
            println!();
        }
    } else {
        for school in &schools {
            print_school_row(school);
        }
    }

    println!("{} schools", schools.len());
    Ok(())
}

async fn cmd_school(api: &ApiClient, args: &[String]) -> Result<()> {
    let Some(id) = args.first() else {
        bail!("Usage: dojofinder school <id>");
    };
    let school = api.fetch_school(id).await?;
    print_school(&school);
    Ok(())
}

async fn cmd_nearby(api: &ApiClient, args: &[String]) -> Result<()> {
    let (Some(lat), Some(lon)) = (args.first(), args.get(1)) else {
        bail!("Usage: dojofinder nearby <lat> <lon> [km]");
    };
    let lat: f64 = lat.parse().context("Latitude is not a number")?;
    let lon: f64 = lon.parse().context("Longitude is not a number")?;
    let radius_km: f64 = match args.get(2) {
        Some(km) => km.parse().context("Radius is not a number")?,
        None => DEFAULT_NEARBY_RADIUS_KM,
    };

    let schools = api
        .fetch_nearby_schools(lat, lon, (radius_km * 1000.0) as u32)
        .await?;
    let ranked = geo::rank_by_distance(schools, lat, lon);

    for item in &ranked {
        let distance = item
            .distance_km
            .map(geo::format_distance)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<32} {:>9}  {}",
            truncate(&item.school.name, 30),
            distance,
            truncate(&item.school.address, 40)
        );
    }
    println!("{} schools within {}", ranked.len(), geo::format_distance(radius_km));
    Ok(())
}

async fn cmd_student(api: &ApiClient, args: &[String]) -> Result<()> {
    let Some(id) = args.first() else {
        bail!("Usage: dojofinder student <id>");
    };

    let student = api.fetch_student(id).await?;
    println!("{}", student.full_name());
    println!("Belt: {}", student.display_belt());
    if let Some(ref email) = student.email {
        println!("Email: {}", email);
    }
    if let Some(ref joined) = student.joined_at {
        println!("Joined: {}", format_date(joined));
    }

    match api.fetch_student_progress(id).await {
        Ok(progress) => {
            if let (Some(current), Some(next)) = (&progress.current_belt, &progress.next_belt) {
                let percent = progress.progress_percent.unwrap_or(0.0);
                println!("Progress: {} -> {} ({:.0}%)", current, next, percent);
            }
            for entry in &progress.entries {
                let name = format_optional(&entry.name, "Unnamed requirement");
                let status = format_optional(&entry.status, "unknown");
                match entry.completed_at {
                    Some(ref date) => println!("  [{}] {} ({})", status, name, format_date(date)),
                    None => println!("  [{}] {}", status, name),
                }
            }
        }
        Err(e) => warn!(error = %e, "No progress data available"),
    }
    Ok(())
}

// ============================================================================
// Output helpers
// ============================================================================

fn print_school_row(school: &School) {
    println!(
        "{:<10} {:<32} {:<28} {}",
        truncate(&school.id, 10),
        truncate(&school.name, 30),
        truncate(&school.address, 26),
        school.display_student_count()
    );
}

fn print_school(school: &School) {
    println!("{} ({})", school.name, school.id);
    println!("Address:  {}", school.address);
    if !school.description.is_empty() {
        println!("About:    {}", school.description);
    }
    if let Some(ref number) = school.contact_number {
        println!("Contact:  {}", format_phone(number));
    }
    println!("Hours:    {}", school.display_schedule());
    println!("Arts:     {}", school.display_martial_arts());
    println!("Students: {}", school.display_student_count());
    if !school.images.is_empty() {
        println!("Photos:   {}", school.images.len());
    }
}

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
