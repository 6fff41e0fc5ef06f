//! Command-line surface (§4.12 of the expanded spec): a thin wrapper over
//! the library's open -> set_fingerprint -> set_events -> foreach -> close
//! lifecycle, plus an offline `parse` command for feeding a saved blob
//! straight to a parser without a device round-trip.
//!
//! Every subcommand's transport is `memory:<path>` — a file of
//! pre-recorded device responses played back through `MemoryTransport`.
//! Real serial/BLE backends are a library capability, not a CLI one: the
//! library's BLE transport needs an already-discovered
//! `btleplug::platform::Peripheral`, and discovery/scanning is out of
//! scope, so there is no `ble:` transport spec here.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use divelink::descriptor::{self, Family};
use divelink::device::hw_ostc::{self, HwOstc};
use divelink::device::mares_nemo::MaresNemo;
use divelink::device::reefnet_sensus::ReefnetSensus;
use divelink::device::reefnet_sensuspro::ReefnetSensusPro;
use divelink::device::reefnet_sensusultra::ReefnetSensusUltra;
use divelink::device::suunto_common2::{self, SuuntoCommon2};
use divelink::device::suunto_vyper::{self, SuuntoVyper};
use divelink::device::{Device, EventMask};
use divelink::parser::mares_darwin::{MaresDarwinParser, Model as DarwinModel};
use divelink::parser::reefnet_sensus::ReefnetSensusParser;
use divelink::parser::shearwater::ShearwaterParser;
use divelink::parser::{FieldType, FieldValue, Parser as DiveParser, SampleValue};
use divelink::transport::memory::MemoryTransport;

#[derive(ClapParser)]
#[command(name = "divelink-cli", about = "Talk to recreational dive computers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every known vendor/product/family in the descriptor registry.
    List,
    /// Dump a device's raw memory image to a file.
    Dump {
        #[arg(long, value_enum)]
        family: CliFamily,
        /// `memory:<path>` — a file of recorded device responses.
        #[arg(long)]
        transport: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Enumerate dives (newest first), skipping anything at or before a
    /// fingerprint, and print each as a JSON record.
    Fetch {
        #[arg(long, value_enum)]
        family: CliFamily,
        #[arg(long)]
        transport: String,
        /// Hex-encoded fingerprint of the last dive already downloaded.
        #[arg(long)]
        fingerprint: Option<String>,
    },
    /// Decode a saved dive blob and print its fields and samples as JSON.
    Parse {
        #[arg(long, value_enum)]
        family: CliFamily,
        blob: PathBuf,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliFamily {
    SuuntoVyper,
    SuuntoVyper2,
    SuuntoD9,
    ReefnetSensus,
    ReefnetSensusPro,
    ReefnetSensusUltra,
    MaresNemo,
    MaresDarwin,
    MaresDarwinAir,
    HwOstc,
    HwFrog,
    ShearwaterPredator,
    ShearwaterPetrel,
}

impl From<CliFamily> for Family {
    fn from(f: CliFamily) -> Family {
        match f {
            CliFamily::SuuntoVyper => Family::SuuntoVyper,
            CliFamily::SuuntoVyper2 => Family::SuuntoVyper2,
            CliFamily::SuuntoD9 => Family::SuuntoD9,
            CliFamily::ReefnetSensus => Family::ReefnetSensus,
            CliFamily::ReefnetSensusPro => Family::ReefnetSensusPro,
            CliFamily::ReefnetSensusUltra => Family::ReefnetSensusUltra,
            CliFamily::MaresNemo => Family::MaresNemo,
            CliFamily::MaresDarwin => Family::MaresDarwin,
            CliFamily::MaresDarwinAir => Family::MaresDarwinAir,
            CliFamily::HwOstc => Family::HwOstc,
            CliFamily::HwFrog => Family::HwFrog,
            CliFamily::ShearwaterPredator => Family::ShearwaterPredator,
            CliFamily::ShearwaterPetrel => Family::ShearwaterPetrel,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::List => list(),
        Commands::Dump {
            family,
            transport,
            out,
        } => dump(family.into(), &transport, &out),
        Commands::Fetch {
            family,
            transport,
            fingerprint,
        } => fetch(family.into(), &transport, fingerprint.as_deref()),
        Commands::Parse { family, blob } => parse(family.into(), &blob),
    }
}

fn list() -> Result<()> {
    for d in descriptor::iter() {
        println!(
            "{:<24} {:<16} family={:?} model=0x{:02X} transports={:?}",
            d.vendor, d.product, d.family, d.model, d.transports
        );
    }
    Ok(())
}

/// Parses a `memory:<path>` transport spec and loads its recorded bytes.
fn open_memory_transport(spec: &str) -> Result<MemoryTransport> {
    let path = spec
        .strip_prefix("memory:")
        .context("only memory:<path> transports are supported by the CLI")?;
    let bytes = fs::read(path).with_context(|| format!("reading transport file {path}"))?;
    let mut transport = MemoryTransport::new();
    transport.push_inbound(&bytes);
    Ok(transport)
}

fn open_device(family: Family, transport: MemoryTransport) -> Result<Box<dyn Device>> {
    Ok(match family {
        Family::SuuntoVyper => {
            Box::new(SuuntoVyper::open(transport, suunto_vyper::VYPER_LAYOUT)?)
        }
        Family::SuuntoVyper2 => Box::new(SuuntoCommon2::open(
            transport,
            suunto_common2::D9_LAYOUT,
            false,
        )?),
        Family::SuuntoD9 => Box::new(SuuntoCommon2::open(
            transport,
            suunto_common2::D9TX_LAYOUT,
            true,
        )?),
        Family::ReefnetSensus => Box::new(ReefnetSensus::open(transport)?),
        Family::ReefnetSensusPro => Box::new(ReefnetSensusPro::open(transport)?),
        Family::ReefnetSensusUltra => Box::new(ReefnetSensusUltra::open(transport)?),
        Family::MaresNemo => Box::new(MaresNemo::open(transport)?),
        Family::HwOstc => Box::new(HwOstc::open(transport, hw_ostc::OSTC_LAYOUT)?),
        Family::HwFrog => Box::new(HwOstc::open(transport, hw_ostc::FROG_LAYOUT)?),
        Family::MaresDarwin
        | Family::MaresDarwinAir
        | Family::ShearwaterPredator
        | Family::ShearwaterPetrel => {
            bail!("{family:?} has no device implementation in this crate, only a parser; use `parse` against a pre-recorded blob")
        }
    })
}

fn dump(family: Family, transport_spec: &str, out: &PathBuf) -> Result<()> {
    let transport = open_memory_transport(transport_spec)?;
    let mut device = open_device(family, transport)?;
    let buffer = device.dump().context("device dump failed")?;
    fs::write(out, buffer.data()).with_context(|| format!("writing {}", out.display()))?;
    device.close()?;
    println!("wrote {} bytes to {}", buffer.size(), out.display());
    Ok(())
}

#[derive(Serialize)]
struct DiveRecord {
    fingerprint: String,
    blob_len: usize,
}

fn fetch(family: Family, transport_spec: &str, fingerprint: Option<&str>) -> Result<()> {
    let transport = open_memory_transport(transport_spec)?;
    let mut device = open_device(family, transport)?;

    if let Some(hex) = fingerprint {
        let bytes = decode_hex(hex)?;
        device
            .set_fingerprint(&bytes)
            .context("set_fingerprint rejected")?;
    }
    device.set_events(EventMask::empty(), None)?;

    let mut records = Vec::new();
    device.foreach(&mut |blob, fp| {
        records.push(DiveRecord {
            fingerprint: encode_hex(fp),
            blob_len: blob.len(),
        });
        true
    })?;
    device.close()?;

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

#[derive(Serialize)]
struct ParseOutput {
    fields: Vec<FieldValue>,
    samples: Vec<SampleValue>,
}

fn parse(family: Family, blob_path: &PathBuf) -> Result<()> {
    let data = fs::read(blob_path).with_context(|| format!("reading {}", blob_path.display()))?;

    let mut fields = Vec::new();
    let mut samples = Vec::new();

    macro_rules! run {
        ($parser:expr, $field_types:expr) => {{
            let mut parser = $parser;
            parser.set_data(&data)?;
            for ft in $field_types {
                if let Ok(value) = parser.get_field(ft) {
                    fields.push(value);
                }
            }
            parser.samples_foreach(&mut |s| samples.push(s))?;
        }};
    }

    match family {
        Family::MaresDarwin => run!(
            MaresDarwinParser::new(DarwinModel::Darwin),
            [
                FieldType::DiveTime,
                FieldType::MaxDepth,
                FieldType::GasMixCount,
                FieldType::GasMix(0),
                FieldType::DiveMode,
                FieldType::TemperatureMinimum,
            ]
        ),
        Family::MaresDarwinAir => run!(
            MaresDarwinParser::new(DarwinModel::DarwinAir),
            [
                FieldType::DiveTime,
                FieldType::MaxDepth,
                FieldType::GasMixCount,
                FieldType::GasMix(0),
                FieldType::TankCount,
                FieldType::Tank(0),
                FieldType::DiveMode,
            ]
        ),
        Family::ReefnetSensus | Family::ReefnetSensusPro | Family::ReefnetSensusUltra => {
            run!(ReefnetSensusParser::new(0, 0), [])
        }
        Family::ShearwaterPredator => run!(
            ShearwaterParser::predator(0),
            [
                FieldType::DiveTime,
                FieldType::MaxDepth,
                FieldType::GasMixCount,
                FieldType::Salinity,
                FieldType::Atmospheric,
                FieldType::DiveMode,
            ]
        ),
        Family::ShearwaterPetrel => run!(
            ShearwaterParser::petrel(1),
            [
                FieldType::DiveTime,
                FieldType::MaxDepth,
                FieldType::GasMixCount,
                FieldType::Salinity,
                FieldType::Atmospheric,
                FieldType::DiveMode,
            ]
        ),
        other => bail!("{other:?} has no parser implementation in this crate"),
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&ParseOutput { fields, samples })?
    );
    Ok(())
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        bail!("hex fingerprint must have an even number of digits");
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).context("invalid hex digit"))
        .collect()
}
