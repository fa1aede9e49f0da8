use std::time::Duration;

use anyhow::{bail, Context, Result};
use bluer::Address;
use clap::{ArgGroup, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sonyctl::bluetooth::{self, scanner};
use sonyctl::config::AppConfig;
use sonyctl::device::{AmbientLevel, Command, CommandSet, NoiseCancelMode};
use sonyctl::session::{SessionController, StreamTransport};

#[derive(Parser, Debug)]
#[command(
    name = "sonyctl",
    about = "Control noise cancelling and ambient sound on Sony headphones"
)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .multiple(true)
        .args(["asl", "mode", "status"])
))]
struct Cli {
    /// Ambient sound level, 0-19 (0 and 1 enable noise cancelling)
    #[arg(long, value_name = "LEVEL", allow_negative_numbers = true)]
    asl: Option<i32>,

    /// Enable focus on voice (needs --asl 2 or higher)
    #[arg(long, requires = "asl")]
    fov: bool,

    /// Headset Bluetooth address
    #[arg(long, value_name = "ADDRESS")]
    mac: Option<String>,

    /// Sound control mode: off, nc or ambient
    #[arg(long, value_parser = parse_mode, conflicts_with = "asl")]
    mode: Option<NoiseCancelMode>,

    /// Print the current sound settings
    #[arg(long)]
    status: bool,

    /// RFCOMM channel (skips the service lookup)
    #[arg(long)]
    channel: Option<u8>,

    /// How long to wait for the headset to answer
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Save the headset address to the config file
    #[arg(long)]
    remember: bool,

    /// Log packet traffic
    #[arg(short, long)]
    verbose: bool,
}

fn parse_mode(s: &str) -> Result<NoiseCancelMode, String> {
    NoiseCancelMode::from_str(s)
        .ok_or_else(|| format!("unknown mode '{}' (expected off, nc or ambient)", s))
}

impl Cli {
    /// The settings change to send, checked before anything is connected.
    fn settings_command(&self) -> Result<Option<Command>> {
        if let Some(asl) = self.asl {
            let level = AmbientLevel::new(asl)?;
            if self.fov && !level.supports_focus_on_voice() {
                bail!(
                    "--fov needs --asl {} or higher, got {}",
                    AmbientLevel::FOCUS_ON_VOICE_MIN,
                    level
                );
            }
            return Ok(Some(Command::SetAmbientSound {
                level,
                focus_on_voice: self.fov,
            }));
        }
        Ok(self.mode.map(Command::SetNoiseCancelMode))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sonyctl={},bluer=info", default_level)));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let command = cli.settings_command()?;
    let mut config = AppConfig::load();
    let timeout = cli
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.reply_timeout());

    let bt = bluer::Session::new().await.context("connecting to BlueZ")?;
    let address = find_device(&bt, &cli, &config).await?;
    info!("Using device {}", address);

    let channel = cli.channel.or(config.rfcomm_channel);
    let stream = bluetooth::open(&bt, address, channel, timeout).await?;
    let commands = CommandSet::new(config.ambient_level()?);
    let mut session =
        SessionController::new(StreamTransport::new(stream), commands).with_timeout(timeout);

    if let Some(command) = command {
        session
            .send(command)
            .await
            .with_context(|| format!("{} failed", command.name()))?;
        println!("{}: ok", command.name());
    }

    if cli.status {
        let settings = session
            .query_sound_settings()
            .await
            .context("reading sound settings failed")?;
        println!("{}", settings);
    }

    if cli.remember {
        config.device_address = Some(address.to_string());
        config.save()?;
    }

    Ok(())
}

async fn find_device(bt: &bluer::Session, cli: &Cli, config: &AppConfig) -> Result<Address> {
    if let Some(mac) = cli.mac.as_deref().or(config.device_address.as_deref()) {
        return mac
            .parse::<Address>()
            .map_err(|e| anyhow::anyhow!("invalid Bluetooth address '{}': {}", mac, e));
    }

    let devices = scanner::list_sony_devices(bt).await?;
    let device = scanner::select_device(&devices)?;
    info!("Found {} ({})", device.name, device.address);
    Ok(device.address)
}
