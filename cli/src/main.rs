use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use yxplore_client::api::ApiError;
use yxplore_client::api::auth::AccountType;
use yxplore_client::api::flight::{CabinClass, FlightSearch, Passenger};
use yxplore_client::api::profile::KycSubmission;
use yxplore_client::socket::SocketError;
use yxplore_client::{ApiClient, ClientConfig, ConsoleNotifier, Handlers, Notifier, NotifyOptions};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid {flag} value `{value}`: expected name=value")]
    InvalidPair { flag: &'static str, value: String },
}

#[derive(Parser, Debug)]
#[command(name = "yxplore-cli", about = "YXPLORE platform API and notification CLI")]
struct Cli {
    #[arg(long, env = "YXPLORE_BASE_URL", default_value = "http://127.0.0.1:8000")]
    base_url: String,

    #[arg(long, env = "YXPLORE_CSRF_TOKEN")]
    csrf_token: Option<String>,

    #[arg(long, env = "YXPLORE_SESSION_COOKIE")]
    session_cookie: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Auth(AuthCommand),
    Flight(FlightCommand),
    Kyc(KycCommand),
    Profile(ProfileCommand),
    Listen(ListenArgs),
}

#[derive(Args, Debug)]
struct AuthCommand {
    #[command(subcommand)]
    command: AuthSubcommand,
}

#[derive(Subcommand, Debug)]
enum AuthSubcommand {
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    Register {
        #[arg(long, value_parser = parse_account_type)]
        account_type: AccountType,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

#[derive(Args, Debug)]
struct FlightCommand {
    #[command(subcommand)]
    command: FlightSubcommand,
}

#[derive(Subcommand, Debug)]
enum FlightSubcommand {
    Search {
        #[arg(long)]
        origin: String,
        #[arg(long)]
        destination: String,
        #[arg(long)]
        departure_date: String,
        #[arg(long)]
        return_date: Option<String>,
        #[arg(long, default_value_t = 1)]
        passengers: u8,
        #[arg(long, default_value = "economy", value_parser = parse_cabin_class)]
        cabin_class: CabinClass,
    },
    Agencies,
    Book {
        #[arg(long)]
        offer_id: String,
        #[arg(long)]
        agency_id: String,
        #[arg(long, default_value = "-", help = "Passenger JSONL path, or - for stdin")]
        input: String,
    },
    Pay {
        booking_id: String,
    },
    Cancel {
        booking_id: String,
    },
    Details {
        booking_id: String,
    },
}

#[derive(Args, Debug)]
struct KycCommand {
    #[command(subcommand)]
    command: KycSubcommand,
}

#[derive(Subcommand, Debug)]
enum KycSubcommand {
    Submit {
        #[arg(long, value_parser = parse_account_type)]
        profile_type: AccountType,
        #[arg(long = "field", value_name = "NAME=VALUE")]
        fields: Vec<String>,
        #[arg(long = "document", value_name = "NAME=PATH")]
        documents: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct ProfileCommand {
    #[command(subcommand)]
    command: ProfileSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProfileSubcommand {
    Show,
    Update {
        #[arg(long = "field", value_name = "NAME=VALUE")]
        fields: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct ListenArgs {
    #[arg(long, help = "Notification path, e.g. /ws/booking/42/notification")]
    path: String,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = ClientConfig::new(cli.base_url);
    config.csrf_token = cli.csrf_token;
    config.session_cookie = cli.session_cookie;

    match cli.command {
        Command::Auth(auth) => run_auth(&config, auth).await,
        Command::Flight(flight) => run_flight(&config, flight).await,
        Command::Kyc(kyc) => run_kyc(&config, kyc).await,
        Command::Profile(profile) => run_profile(&config, profile).await,
        Command::Listen(args) => run_listen(&config, args).await,
    }
}

async fn run_auth(config: &ClientConfig, auth: AuthCommand) -> Result<(), CliError> {
    let client = ApiClient::new(config.clone())?;
    let outcome = match auth.command {
        AuthSubcommand::Login { username, password } => client.login(&username, &password).await?,
        AuthSubcommand::Register {
            account_type,
            email,
            password,
        } => client.register(account_type, &email, &password).await?,
    };

    if let Some(message) = &outcome.message {
        println!("{message}");
    }
    if let Some(redirect_url) = &outcome.redirect_url {
        eprintln!("continue at: {redirect_url}");
    }
    Ok(())
}

async fn run_flight(config: &ClientConfig, flight: FlightCommand) -> Result<(), CliError> {
    let client = ApiClient::new(config.clone())?;
    match flight.command {
        FlightSubcommand::Search {
            origin,
            destination,
            departure_date,
            return_date,
            passengers,
            cabin_class,
        } => {
            let mut search = FlightSearch::new(origin, destination, departure_date)
                .with_passengers(passengers)
                .with_cabin_class(cabin_class);
            if let Some(return_date) = return_date {
                search = search.with_return_date(return_date);
            }
            let outcome = client.search_flights(&search).await?;
            if let Some(message) = &outcome.message {
                println!("{message}");
            }
            if let Some(redirect_url) = &outcome.redirect_url {
                println!("results at: {redirect_url}");
            }
            Ok(())
        }
        FlightSubcommand::Agencies => {
            let agencies = client.agencies().await?;
            let listing = agencies
                .iter()
                .map(|agency| {
                    serde_json::json!({
                        "id": agency.id,
                        "name": agency.name,
                        "city": agency.city,
                    })
                })
                .collect::<Vec<_>>();
            print_json(&Value::Array(listing))?;
            Ok(())
        }
        FlightSubcommand::Book {
            offer_id,
            agency_id,
            input,
        } => {
            let passengers = read_passengers(&input)?;
            let booking = client
                .create_booking(&offer_id, &agency_id, &passengers)
                .await?;
            eprintln!(
                "booking created: reference={} status={}",
                booking.booking_reference, booking.status
            );
            Ok(())
        }
        FlightSubcommand::Pay { booking_id } => {
            let receipt = client.pay_booking(&booking_id).await?;
            eprintln!(
                "payment recorded: reference={} status={}",
                receipt.booking_reference, receipt.status
            );
            Ok(())
        }
        FlightSubcommand::Cancel { booking_id } => {
            let message = client.cancel_booking(&booking_id).await?;
            println!(
                "{}",
                message.unwrap_or_else(|| "booking cancelled".to_owned())
            );
            Ok(())
        }
        FlightSubcommand::Details { booking_id } => {
            let details = client.booking_details(&booking_id).await?;
            print_json(&details)?;
            Ok(())
        }
    }
}

async fn run_kyc(config: &ClientConfig, kyc: KycCommand) -> Result<(), CliError> {
    let client = ApiClient::new(config.clone())?;
    match kyc.command {
        KycSubcommand::Submit {
            profile_type,
            fields,
            documents,
        } => {
            let mut submission = KycSubmission::new();
            for raw in &fields {
                let (name, value) = split_pair("--field", raw)?;
                submission = submission.field(name, value);
            }
            for raw in &documents {
                let (name, path) = split_pair("--document", raw)?;
                let bytes = std::fs::read(&path).map_err(|source| CliError::Io {
                    path: path.clone(),
                    source,
                })?;
                let file_name = Path::new(&path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.clone());
                submission = submission.document(name, file_name, bytes);
            }

            let message = client.submit_kyc(profile_type, submission).await?;
            println!(
                "{}",
                message.unwrap_or_else(|| "KYC submission accepted".to_owned())
            );
            Ok(())
        }
    }
}

async fn run_profile(config: &ClientConfig, profile: ProfileCommand) -> Result<(), CliError> {
    let client = ApiClient::new(config.clone())?;
    match profile.command {
        ProfileSubcommand::Show => {
            let data = client.profile_data().await?;
            print_json(&data)?;
            Ok(())
        }
        ProfileSubcommand::Update { fields } => {
            let mut pairs = Vec::with_capacity(fields.len());
            for raw in &fields {
                pairs.push(split_pair("--field", raw)?);
            }
            let message = client.update_profile(&pairs).await?;
            println!("{}", message.unwrap_or_else(|| "profile updated".to_owned()));
            Ok(())
        }
    }
}

async fn run_listen(config: &ClientConfig, args: ListenArgs) -> Result<(), CliError> {
    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);

    let on_message = {
        let notifier = Arc::clone(&notifier);
        move |payload: Value| {
            if let Some(message) = payload.get("message").and_then(Value::as_str) {
                notifier.info(message, NotifyOptions::default());
            } else if let Ok(rendered) = serde_json::to_string_pretty(&payload) {
                println!("{rendered}");
            }
        }
    };
    let on_error = {
        let notifier = Arc::clone(&notifier);
        move |error: &str| notifier.error(error)
    };

    let handlers = Handlers::new()
        .on_message(on_message)
        .on_open(|| tracing::info!("notification channel open"))
        .on_error(on_error)
        .on_close(|_| tracing::info!("notification channel closed, reconnecting"));
    let socket = yxplore_client::connect(config, &args.path, handlers)?;

    eprintln!("listening on {} (ctrl-c to stop)", args.path);
    tokio::signal::ctrl_c()
        .await
        .map_err(|source| CliError::Io {
            path: "ctrl-c".to_owned(),
            source,
        })?;
    socket.stop();
    Ok(())
}

fn parse_account_type(raw: &str) -> Result<AccountType, String> {
    match raw {
        "client" => Ok(AccountType::Client),
        "merchant" => Ok(AccountType::Merchant),
        other => Err(format!("unknown account type `{other}`")),
    }
}

fn parse_cabin_class(raw: &str) -> Result<CabinClass, String> {
    match raw {
        "economy" => Ok(CabinClass::Economy),
        "premium-economy" | "premium_economy" => Ok(CabinClass::PremiumEconomy),
        "business" => Ok(CabinClass::Business),
        "first" => Ok(CabinClass::First),
        other => Err(format!("unknown cabin class `{other}`")),
    }
}

fn split_pair(flag: &'static str, raw: &str) -> Result<(String, String), CliError> {
    let Some((name, value)) = raw.split_once('=') else {
        return Err(CliError::InvalidPair {
            flag,
            value: raw.to_owned(),
        });
    };
    if name.is_empty() || value.is_empty() {
        return Err(CliError::InvalidPair {
            flag,
            value: raw.to_owned(),
        });
    }
    Ok((name.to_owned(), value.to_owned()))
}

fn read_passengers(input: &str) -> Result<Vec<Passenger>, CliError> {
    let reader: Box<dyn BufRead> = if input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = std::fs::File::open(input).map_err(|source| CliError::Io {
            path: input.to_owned(),
            source,
        })?;
        Box::new(BufReader::new(file))
    };

    let mut passengers = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|source| CliError::Io {
            path: input.to_owned(),
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        passengers.push(serde_json::from_str::<Passenger>(trimmed)?);
    }
    Ok(passengers)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
