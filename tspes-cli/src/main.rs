mod source;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use tracing::{debug, info, trace, warn};
use tracing_subscriber::EnvFilter;
use ts_pes::{
    AdaptationField, AssemblyEvent, PesAssembler, PesSink, TsPacketHeader, WriteSink,
};

use crate::source::PacketSource;

/// Extract one PID's elementary stream from an MPEG-TS file.
#[derive(Debug, Parser)]
#[command(name = "tspes", version, about)]
struct Args {
    /// Input transport stream file
    input: PathBuf,

    /// PID to assemble, decimal or 0x-prefixed hex
    #[arg(long, value_parser = parse_pid)]
    pid: u16,

    /// Write the assembled elementary stream here; omit to only count
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Stop after this many packets
    #[arg(long)]
    limit: Option<u64>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_pid(s: &str) -> Result<u16, String> {
    let pid = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16)
    } else {
        s.parse()
    }
    .map_err(|e| format!("invalid PID {s:?}: {e}"))?;
    if pid > 0x1FFF {
        return Err(format!("PID {pid} out of range (13 bits, max 8191)"));
    }
    Ok(pid)
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[derive(Debug, Default)]
struct Stats {
    packets: u64,
    pid_packets: u64,
    discontinuities: u64,
    duplicates: u64,
    truncated: u64,
    malformed: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    run(args)
}

fn run(args: Args) -> anyhow::Result<()> {
    let data = std::fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    info!(
        input = %args.input.display(),
        len = data.len(),
        pid = args.pid,
        "extracting elementary stream"
    );

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(io::sink()),
    };
    let mut sink = WriteSink::new(writer);

    let mut source = PacketSource::new(Bytes::from(data));
    let mut assembler = PesAssembler::new(args.pid);
    let mut stats = Stats::default();

    for packet in source.by_ref() {
        if args.limit.is_some_and(|limit| stats.packets >= limit) {
            break;
        }
        stats.packets += 1;

        let header = match TsPacketHeader::parse(&packet) {
            Ok(header) => header,
            Err(e) => {
                // The source already verified the sync byte, so this only
                // fires on truncated tail data.
                debug!(error = %e, "skipping undecodable packet");
                continue;
            }
        };
        trace!(
            pid = header.pid,
            pusi = header.payload_unit_start_indicator,
            cc = header.continuity_counter,
            afc = ?header.adaptation_field_control,
            "packet"
        );

        if header.pid != args.pid {
            continue;
        }
        stats.pid_packets += 1;

        // Adaptation metadata is droppable; the payload offset survives.
        let adaptation_field = if header.has_adaptation_field() {
            match AdaptationField::parse(&packet, header.adaptation_field_control) {
                Ok(af) => {
                    if let Some(pcr) = af.pcr {
                        trace!(pcr_secs = pcr.as_secs(), "PCR");
                    }
                    Some(af)
                }
                Err(e) => {
                    debug!(error = %e, "dropping undecodable adaptation field");
                    None
                }
            }
        } else {
            None
        };

        let events = assembler.absorb(&packet, &header, adaptation_field.as_ref())?;
        handle_events(&events, &assembler, &mut sink, &mut stats)?;
    }

    let events = assembler.finish();
    handle_events(&events, &assembler, &mut sink, &mut stats)?;
    sink.flush()?;

    info!(
        packets = stats.packets,
        pid_packets = stats.pid_packets,
        skipped_bytes = source.skipped_bytes(),
        units = sink.units(),
        bytes = sink.bytes(),
        discontinuities = stats.discontinuities,
        duplicates = stats.duplicates,
        truncated = stats.truncated,
        malformed = stats.malformed,
        "done"
    );
    Ok(())
}

fn handle_events(
    events: &[AssemblyEvent],
    assembler: &PesAssembler,
    sink: &mut WriteSink<Box<dyn Write>>,
    stats: &mut Stats,
) -> anyhow::Result<()> {
    for event in events {
        match event {
            AssemblyEvent::Started | AssemblyEvent::Continue => {}
            AssemblyEvent::Finished => {
                if let Some(header) = assembler.header() {
                    sink.deliver(header, assembler.current_buffer())?;
                }
            }
            AssemblyEvent::Discontinuity { expected, actual } => {
                stats.discontinuities += 1;
                warn!(expected, actual, "continuity break");
            }
            AssemblyEvent::Duplicate => {
                stats.duplicates += 1;
                debug!("duplicate packet ignored");
            }
            AssemblyEvent::Truncated { expected, received } => {
                stats.truncated += 1;
                warn!(expected, received, "unit truncated, discarded");
            }
            AssemblyEvent::Overflow {
                expected,
                discarded,
            } => {
                warn!(expected, discarded, "unit overflow, excess discarded");
            }
            AssemblyEvent::UnboundedLengthUnsupported => {
                stats.malformed += 1;
                warn!("unbounded PES packet length, unit skipped");
            }
            AssemblyEvent::MalformedHeader => {
                stats.malformed += 1;
                warn!("malformed PES header, unit skipped");
            }
            AssemblyEvent::UnexpectedPayload => {
                debug!("payload with no unit in progress, dropped");
            }
        }
    }
    Ok(())
}
