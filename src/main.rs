use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use notify_rust::Notification;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tabled::{Table, Tabled};

use ecobee::temperature;
use ecobee::{
    ClientConfig, CredentialStore, EcobeeClient, ExchangeOutcome, FileCredentialStore, HoldType,
    HvacMode, PinGrant, TemperatureScale, Thermostat,
};

#[derive(Parser)]
#[command(name = "ecobee")]
#[command(about = "A CLI for controlling ecobee thermostats")]
#[command(version)]
struct Cli {
    /// API key of your ecobee developer app
    #[arg(long, env = "ECOBEE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Credentials file (defaults to ~/.ecobee.yml)
    #[arg(long, env = "ECOBEE_CONFIG")]
    config: Option<PathBuf>,

    /// Temperature scale for output and hold arguments: F, C, K or R
    #[arg(long, env = "ECOBEE_SCALE", default_value = "F")]
    scale: TemperatureScale,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Request a PIN to authorize this app in the ecobee portal
    Login {
        /// Wait until the PIN has been entered
        #[arg(long)]
        wait: bool,
    },
    /// Finish authorization after entering the PIN
    Authorize,
    /// Forget stored tokens
    Logout,
    /// List thermostats registered to the account
    Thermostats {
        /// Skip the response cache
        #[arg(long)]
        refresh: bool,
    },
    /// List built-in and remote sensors
    Sensors,
    /// Set the HVAC mode (auto, auxHeatOnly, cool, heat, off)
    Mode {
        mode: HvacMode,
        /// Thermostat identifier (optional if only one thermostat)
        #[arg(long)]
        thermostat: Option<String>,
    },
    /// Hold heat and cool setpoints
    Hold {
        #[arg(long)]
        cool: f64,
        #[arg(long)]
        heat: f64,
        /// Keep the hold until resumed instead of until the next program change
        #[arg(long)]
        indefinite: bool,
        /// Thermostat identifier (optional if only one thermostat)
        #[arg(long)]
        thermostat: Option<String>,
    },
    /// Hold a comfort setting such as home, away or sleep
    Climate {
        climate: String,
        /// Keep the hold until resumed instead of until the next program change
        #[arg(long)]
        indefinite: bool,
        /// Thermostat identifier (optional if only one thermostat)
        #[arg(long)]
        thermostat: Option<String>,
    },
    /// Cancel the current hold and resume the schedule
    Resume {
        /// Cancel every stacked hold, not just the latest
        #[arg(long)]
        all: bool,
        /// Thermostat identifier (optional if only one thermostat)
        #[arg(long)]
        thermostat: Option<String>,
    },
    /// Poll thermostats and print a line per thermostat each cycle
    Watch {
        /// Seconds between polls
        #[arg(long, default_value_t = 15)]
        interval: u64,
    },
}

#[derive(Tabled)]
struct ThermostatRow {
    #[tabled(rename = "Identifier")]
    identifier: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Fan")]
    fan: String,
    #[tabled(rename = "Climate")]
    climate: String,
    #[tabled(rename = "Temperature")]
    temperature: String,
    #[tabled(rename = "Heat")]
    heat: String,
    #[tabled(rename = "Cool")]
    cool: String,
    #[tabled(rename = "Running")]
    running: String,
}

#[derive(Tabled)]
struct SensorRow {
    #[tabled(rename = "Thermostat")]
    thermostat: String,
    #[tabled(rename = "Sensor")]
    name: String,
    #[tabled(rename = "Code")]
    code: String,
    #[tabled(rename = "Type")]
    sensor_type: String,
    #[tabled(rename = "Temperature")]
    temperature: String,
    #[tabled(rename = "Occupied")]
    occupied: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let store = match &cli.config {
        Some(path) => FileCredentialStore::new(path),
        None => FileCredentialStore::default_location()?,
    };

    let command = match cli.command {
        Commands::Logout if cli.api_key.is_none() && !has_stored_api_key(&store) => {
            // No API key means no client to sign out of; just drop the file.
            store.clear()?;
            println!("Logged out. Run 'ecobee login' to authorize again.");
            return Ok(());
        }
        command => command,
    };

    let api_key = resolve_api_key(cli.api_key, &store)?;
    let config = ClientConfig::from_env()?;
    let client = EcobeeClient::with_config(api_key, Arc::new(store), config)?;
    let scale = cli.scale;

    match command {
        Commands::Login { wait } => {
            let grant = client.request_pin().await?;
            println!("Your ecobee PIN is: {}", grant.pin);
            println!(
                "Go to https://www.ecobee.com/consumerportal, open My Apps, choose Add application, enter the PIN and click Authorize."
            );
            if let Some(minutes) = grant.expires_in {
                println!("The PIN expires in {} minutes.", minutes);
            }

            if wait {
                wait_for_authorization(&client, &grant).await?;
            } else {
                println!("Then run 'ecobee authorize'.");
            }
        }
        Commands::Authorize => match client.complete_authorization().await? {
            ExchangeOutcome::Authorized => println!("Authorized."),
            ExchangeOutcome::Pending => {
                println!("Not authorized yet. Enter the PIN in the ecobee portal and try again.")
            }
        },
        Commands::Logout => {
            client.logout().await;
            println!("Logged out. Run 'ecobee login' to authorize again.");
        }
        Commands::Thermostats { refresh } => {
            info!("Fetching thermostats...");
            let thermostats = client.get_thermostats(refresh).await?;

            if thermostats.is_empty() {
                println!("No thermostats registered to this account.");
                return Ok(());
            }

            let rows: Vec<ThermostatRow> = thermostats
                .iter()
                .map(|t| thermostat_row(t, scale))
                .collect();
            println!("{}", Table::new(&rows));
        }
        Commands::Sensors => {
            let thermostats = client.get_thermostats(false).await?;

            let mut rows: Vec<SensorRow> = Vec::new();
            for thermostat in thermostats.iter() {
                for sensor in thermostat.remote_sensors()? {
                    rows.push(SensorRow {
                        thermostat: thermostat.name.clone(),
                        name: sensor.name.clone(),
                        code: sensor.code.clone().unwrap_or_else(|| "-".to_string()),
                        sensor_type: sensor.sensor_type.clone(),
                        temperature: match sensor.temperature() {
                            Ok(Some(tenths)) => scale.format(tenths),
                            Ok(None) => "unknown".to_string(),
                            Err(_) => "-".to_string(),
                        },
                        occupied: match sensor.occupied() {
                            Ok(true) => "yes".to_string(),
                            Ok(false) => "no".to_string(),
                            Err(_) => "-".to_string(),
                        },
                    });
                }
            }

            if rows.is_empty() {
                println!("No sensors found.");
            } else {
                println!("{}", Table::new(&rows));
            }
        }
        Commands::Mode { mode, thermostat } => {
            let identifier = resolve_thermostat(&client, thermostat).await?;
            client.set_hvac_mode(&identifier, mode).await?;
            println!("Thermostat {} set to {}.", identifier, mode);
        }
        Commands::Hold {
            cool,
            heat,
            indefinite,
            thermostat,
        } => {
            let identifier = resolve_thermostat(&client, thermostat).await?;
            let cool_tenths = setpoint_tenths(cool, scale, "cool")?;
            let heat_tenths = setpoint_tenths(heat, scale, "heat")?;
            debug!(
                "Hold request: cool={} heat={} (tenths of a degree F)",
                cool_tenths, heat_tenths
            );

            client
                .set_hold_temperatures(&identifier, cool_tenths, heat_tenths, hold_type(indefinite))
                .await?;
            println!(
                "Thermostat {} holding heat {} / cool {}.",
                identifier,
                scale.format(heat_tenths),
                scale.format(cool_tenths)
            );
        }
        Commands::Climate {
            climate,
            indefinite,
            thermostat,
        } => {
            let identifier = resolve_thermostat(&client, thermostat).await?;
            client
                .set_climate_hold(&identifier, &climate, hold_type(indefinite))
                .await?;
            println!("Thermostat {} holding climate {}.", identifier, climate);
        }
        Commands::Resume { all, thermostat } => {
            let identifier = resolve_thermostat(&client, thermostat).await?;
            client.resume_program(&identifier, all).await?;
            println!("Thermostat {} resumed its program.", identifier);
        }
        Commands::Watch { interval } => {
            watch(&client, scale, Duration::from_secs(interval.max(1))).await?;
        }
    }

    Ok(())
}

/// An unreadable credentials file counts as having no key, so `login` and
/// `logout` can still replace it.
fn has_stored_api_key(store: &FileCredentialStore) -> bool {
    match store.load() {
        Ok(stored) => stored.map(|c| !c.api_key.is_empty()).unwrap_or(false),
        Err(e) => {
            warn!("Ignoring unreadable credentials file: {}", e);
            false
        }
    }
}

/// The API key from the command line, the stored credentials, or a prompt.
/// `None` means the stored key will be used.
fn resolve_api_key(api_key: Option<String>, store: &FileCredentialStore) -> Result<Option<String>> {
    if let Some(key) = api_key {
        return Ok(Some(key));
    }

    if has_stored_api_key(store) {
        return Ok(None);
    }

    if !std::io::stdin().is_terminal() {
        return Err(anyhow::anyhow!(
            "API key is required. Provide via --api-key or ECOBEE_API_KEY environment variable."
        ));
    }

    let key = rpassword::prompt_password("ecobee API key: ").context("Failed to read API key")?;
    let key = key.trim().to_string();
    if key.is_empty() {
        return Err(anyhow::anyhow!("API key is required."));
    }
    Ok(Some(key))
}

async fn resolve_thermostat(client: &EcobeeClient, thermostat: Option<String>) -> Result<String> {
    if let Some(identifier) = thermostat {
        return Ok(identifier);
    }

    let thermostats = client.get_thermostats(false).await?;
    if thermostats.is_empty() {
        return Err(anyhow::anyhow!("No thermostats registered to this account."));
    }
    if thermostats.len() > 1 {
        return Err(anyhow::anyhow!(
            "Multiple thermostats found. Please specify --thermostat."
        ));
    }
    Ok(thermostats[0].identifier.clone())
}

/// Convert a setpoint given in `scale` to tenths of a degree Fahrenheit,
/// clamped to what the thermostat accepts.
fn setpoint_tenths(value: f64, scale: TemperatureScale, which: &str) -> Result<i32> {
    if !value.is_finite() {
        return Err(anyhow::anyhow!(
            "The {} setpoint must be a finite number, got {}",
            which,
            value
        ));
    }

    let tenths = scale.to_tenths_f(value);
    let clamped = temperature::clamp_setpoint(tenths);
    if clamped != tenths {
        warn!(
            "{} setpoint {} is outside 40-95°F; using {}",
            which,
            scale.format(tenths),
            scale.format(clamped)
        );
    }
    Ok(clamped)
}

fn hold_type(indefinite: bool) -> HoldType {
    if indefinite {
        HoldType::Indefinite
    } else {
        HoldType::NextTransition
    }
}

fn cell<T: ToString>(value: ecobee::Result<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|_| "-".to_string())
}

fn temperature_cell(value: ecobee::Result<i32>, scale: TemperatureScale) -> String {
    value
        .map(|tenths| scale.format(tenths))
        .unwrap_or_else(|_| "-".to_string())
}

fn running_cell(thermostat: &Thermostat) -> String {
    match thermostat.equipment_status() {
        Ok(status) if status.is_empty() => "idle".to_string(),
        Ok(status) => status.join(", "),
        Err(_) => "-".to_string(),
    }
}

fn thermostat_row(thermostat: &Thermostat, scale: TemperatureScale) -> ThermostatRow {
    ThermostatRow {
        identifier: thermostat.identifier.clone(),
        name: thermostat.name.clone(),
        mode: cell(thermostat.hvac_mode()),
        fan: cell(thermostat.fan_mode()),
        climate: cell(thermostat.current_climate_ref()),
        temperature: temperature_cell(thermostat.actual_temperature(), scale),
        heat: temperature_cell(thermostat.desired_heat(), scale),
        cool: temperature_cell(thermostat.desired_cool(), scale),
        running: running_cell(thermostat),
    }
}

fn summary_line(thermostat: &Thermostat, scale: TemperatureScale) -> String {
    format!(
        "{} ({}): {} mode={} heat={} cool={} running={}",
        thermostat.name,
        thermostat.identifier,
        temperature_cell(thermostat.actual_temperature(), scale),
        cell(thermostat.hvac_mode()),
        temperature_cell(thermostat.desired_heat(), scale),
        temperature_cell(thermostat.desired_cool(), scale),
        running_cell(thermostat)
    )
}

/// Poll `complete_authorization` at the interval ecobee suggested until the
/// PIN is entered or expires.
async fn wait_for_authorization(client: &EcobeeClient, grant: &PinGrant) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.green} {msg}")
            .context("Invalid spinner template")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!("Waiting for PIN {} to be entered...", grant.pin));

    let delay = Duration::from_secs(grant.interval.unwrap_or(30).max(1));
    let deadline = Instant::now() + Duration::from_secs(grant.expires_in.unwrap_or(15) * 60);

    loop {
        tokio::time::sleep(delay).await;

        match client.complete_authorization().await {
            Ok(ExchangeOutcome::Authorized) => {
                spinner.finish_with_message("Authorized!");

                if let Err(e) = Notification::new()
                    .summary("ecobee authorized")
                    .body("This app can now read and control your thermostats.")
                    .timeout(5000)
                    .show()
                {
                    warn!("Failed to send notification: {}", e);
                }

                return Ok(());
            }
            Ok(ExchangeOutcome::Pending) => {
                spinner.set_message(format!("Waiting for PIN {} to be entered...", grant.pin));
            }
            Err(e) => {
                spinner.set_message(format!("Error checking authorization: {}", e));
            }
        }

        if Instant::now() >= deadline {
            spinner.finish_and_clear();
            return Err(anyhow::anyhow!(
                "PIN {} expired before it was entered. Run 'ecobee login' again.",
                grant.pin
            ));
        }
    }
}

/// Poll on a fixed interval until Ctrl-C. A failed cycle is logged and the
/// next one runs as usual.
async fn watch(client: &EcobeeClient, scale: TemperatureScale, interval: Duration) -> Result<()> {
    loop {
        match client.get_thermostats(false).await {
            Ok(thermostats) => {
                for thermostat in thermostats.iter() {
                    println!("{}", summary_line(thermostat, scale));
                }
            }
            Err(e) if e.needs_user_authorization() => {
                warn!("Polling needs authorization: {}", e);
                eprintln!("{}", e);
            }
            Err(e) => {
                warn!("Polling cycle failed: {}", e);
                eprintln!("Polling cycle failed: {}", e);
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping watch");
                return Ok(());
            }
        }
    }
}
