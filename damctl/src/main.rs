// damctl -- CLI tool for operating a dam1021 DAC over its uManager
// serial console. Exclusive access to the serial device is a
// prerequisite.
//
// Usage:
//   damctl volume -14
//   damctl --serial-device /dev/ttyUSB1 flash-volume -22
//   damctl input 0
//   damctl filter linear
//   damctl flash-filter 2
//   damctl mode inverted
//   damctl list-filters --all
//   damctl download firmware.skr --update

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use damlib::dam1021::{
    Dam1021, Dam1021Builder, FilterSet, ListingScope, OperatingMode, DEFAULT_SERIAL_DEVICE,
};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Operate a dam1021 DAC over its uManager serial console.
#[derive(Parser)]
#[command(name = "damctl", version, about)]
struct Cli {
    /// Serial device the DAC is connected to.
    #[arg(short = 's', long, default_value = DEFAULT_SERIAL_DEVICE)]
    serial_device: String,

    /// Base timeout for device responses, in seconds.
    #[arg(short = 't', long, default_value_t = 1.0)]
    timeout: f64,

    /// Force a session close before commands issued at the normal
    /// prompt. Useful when other tooling may have left the console
    /// mid-session.
    #[arg(long)]
    cautious: bool,

    /// Increase output verbosity.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Set the current volume level [-99, 15], or 99 for the
    /// potentiometer.
    Volume {
        #[arg(allow_hyphen_values = true)]
        level: i16,
    },

    /// Store a volume level in flash; it becomes current at power-up.
    FlashVolume {
        #[arg(allow_hyphen_values = true)]
        level: i16,
    },

    /// Select the input source (0 = TOSLINK, 1 = RCA, 2 = BNC).
    Input { index: u8 },

    /// Select the current filter set (1-4, or
    /// linear/mixed/minimum/soft).
    Filter { set: FilterSet },

    /// Store a filter set selection in flash.
    FlashFilter { set: FilterSet },

    /// Store the operating mode in flash (normal or inverted).
    Mode { mode: OperatingMode },

    /// List the filters stored on the device.
    ListFilters {
        /// List every filter bank instead of the current one.
        #[arg(long)]
        all: bool,

        /// Print the device output verbatim instead of the parsed
        /// banks.
        #[arg(long)]
        raw: bool,
    },

    /// Push a firmware or filter image to the device.
    Download {
        /// The image file (.skr) to send.
        file: PathBuf,

        /// Run the self-update handshake after the transfer; the
        /// device resets into the new firmware.
        #[arg(long)]
        update: bool,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut dac = Dam1021Builder::new()
        .serial_device(&cli.serial_device)
        .base_timeout(Duration::from_secs_f64(cli.timeout))
        .cautious(cli.cautious)
        .build()
        .await
        .with_context(|| format!("failed to open {}", cli.serial_device))?;

    let outcome = run(&mut dac, cli.command).await;

    // Release the console no matter how the command went.
    if let Err(e) = dac.close().await {
        tracing::warn!(error = %e, "failed to close the connection cleanly");
    }

    outcome
}

async fn run(dac: &mut Dam1021, command: Command) -> Result<()> {
    match command {
        Command::Volume { level } => dac.set_current_volume(level).await?,
        Command::FlashVolume { level } => dac.set_flash_volume(level).await?,
        Command::Input { index } => dac.set_input_source(index).await?,
        Command::Filter { set } => dac.set_current_filter(set).await?,
        Command::FlashFilter { set } => dac.set_flash_filter(set).await?,
        Command::Mode { mode } => dac.set_operating_mode(mode).await?,
        Command::ListFilters { all, raw } => {
            let scope = if all {
                ListingScope::All
            } else {
                ListingScope::Current
            };
            if raw {
                print!("{}", dac.list_filters_raw(scope).await?);
            } else {
                print!("{}", dac.list_filters(scope).await?);
            }
        }
        Command::Download { file, update } => {
            let payload = std::fs::read(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let digest = dac.download(&payload, update).await?;
            println!("image SHA-1: {digest}");
        }
    }
    Ok(())
}
