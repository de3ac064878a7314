mod device;

use std::path::PathBuf;
use std::thread;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, Context, Result};

use chirp_core::audio::LoopbackBackend;
use chirp_core::physical::frame_sounds;
use chirp_core::{AudioSocket, Layer, ModemConfig};
use device::CpalBackend;

#[derive(Parser, Debug)]
#[command(author, version, about = "Point-to-point acoustic modem", long_about = None)]
struct Cli {
    /// Path to a TOML file overriding the default modem configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Protocol layer to bind the socket to
    #[arg(short, long, value_enum, default_value_t = LayerArg::Transport)]
    layer: LayerArg,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a message through the speaker
    Client {
        message: String,

        /// Render the message's sound sequence to a WAV file instead of
        /// playing it
        #[arg(short, long)]
        wav: Option<PathBuf>,
    },
    /// Wait for one message from the microphone, print it, and exit
    Server,
    /// Run a client and a server over an in-memory audio path in one
    /// process (smoke test, no devices needed)
    Loopback { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LayerArg {
    Physical,
    Link,
    Transport,
}

impl From<LayerArg> for Layer {
    fn from(layer: LayerArg) -> Self {
        match layer {
            LayerArg::Physical => Layer::Physical,
            LayerArg::Link => Layer::Link,
            LayerArg::Transport => Layer::Transport,
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();

    let level = if args.verbose {
        log::Level::Debug
    } else {
        log::Level::Info
    };
    simple_logger::init_with_level(level)?;

    let config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("reading config {}", path.display()))?;
            toml::from_str(&raw).wrap_err_with(|| format!("parsing config {}", path.display()))?
        }
        None => ModemConfig::default(),
    };
    config.validate().map_err(|err| eyre!("{err}"))?;

    match args.command {
        Command::Client { message, wav } => {
            // The terminating NUL travels with the message, so the peer
            // can print it as a C-style string.
            let mut data = message.into_bytes();
            data.push(0);

            if let Some(path) = wav {
                return write_wav(&data, &config, &path);
            }

            let mut socket =
                AudioSocket::new(args.layer.into(), config.clone(), CpalBackend::new(config.sample_rate))?;
            log::info!("sending {} bytes", data.len());
            socket.send(&data)?;
            log::info!("finished sending");
        }

        Command::Server => {
            let mut socket =
                AudioSocket::new(args.layer.into(), config.clone(), CpalBackend::new(config.sample_rate))?;
            let mut buffer = vec![0u8; 1_024];
            let got = socket.recv(&mut buffer)?;
            println!("{}", printable(&buffer[..got]));
        }

        Command::Loopback { message } => {
            let mut data = message.into_bytes();
            data.push(0);

            let (left, right) = LoopbackBackend::pair(config.sample_rate, 1_024);
            let mut client = AudioSocket::new(args.layer.into(), config.clone(), left)?;
            let mut server = AudioSocket::new(args.layer.into(), config.clone(), right)?;

            let receiver = thread::spawn(move || -> chirp_core::Result<Vec<u8>> {
                let mut buffer = vec![0u8; 1_024];
                let got = server.recv(&mut buffer)?;
                buffer.truncate(got);
                Ok(buffer)
            });

            client.send(&data)?;
            let received = receiver
                .join()
                .map_err(|_| eyre!("receiver thread panicked"))??;
            println!("{}", printable(&received));
        }
    }

    Ok(())
}

/// Message bytes up to the first NUL, lossily decoded.
fn printable(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// Render the message as physical-layer sound sequences into a WAV file:
/// one frame per MTU-sized chunk, concatenated.
fn write_wav(data: &[u8], config: &ModemConfig, path: &PathBuf) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: config.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer =
        hound::WavWriter::create(path, spec).wrap_err_with(|| format!("creating {}", path.display()))?;
    let mut total = 0usize;
    for frame in data.chunks(config.phy_mtu) {
        let sounds = frame_sounds(frame, config)?;
        for sample in chirp_core::audio::synthesize_sounds(&sounds, config.sample_rate) {
            writer.write_sample(sample)?;
            total += 1;
        }
    }
    writer.finalize()?;

    log::info!(
        "wrote {} samples ({:.2}s) to {}",
        total,
        total as f64 / f64::from(config.sample_rate),
        path.display()
    );
    Ok(())
}
