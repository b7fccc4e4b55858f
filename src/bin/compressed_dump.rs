//! tof-compressed-dump - print the events of a compressed TOF file
//!
//! Usage:
//!   tof-compressed-dump -i run.tof            # one line per event
//!   tof-compressed-dump -i run.tof -v         # one line per word
//!   tof-compressed-dump -i run.tof --json     # JSON lines
//!   tof-compressed-dump -i run.tof -n 10      # first 10 events

use clap::Parser;
use tof_codec::common::DumpArgs;
use tof_codec::compressed::{CompressedDecoder, CompressedEvent};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Compressed file dumper
#[derive(Parser, Debug)]
#[command(name = "tof-compressed-dump", about = "Print the events of a compressed TOF file")]
#[command(version)]
struct Args {
    #[command(flatten)]
    dump: DumpArgs,
}

fn print_event(event: &CompressedEvent) {
    println!(
        "{:8} drm {:3} event {:4} bunch {:4} frames {:3} hits {:5} fault 0x{:08x}",
        event.offset,
        event.drm_id,
        event.event_counter,
        event.bunch_id,
        event.frames.len(),
        event.n_hits(),
        event.trailer & 0x7FFF_FFFF
    );
}

fn print_words(event: &CompressedEvent) {
    println!(
        "crate header   drm={} event={} bunch={}",
        event.drm_id, event.event_counter, event.bunch_id
    );
    for frame in &event.frames {
        println!(
            "  frame header slot={} frame={} hits={} dbc={}",
            frame.slot_id,
            frame.frame_id,
            frame.hits.len(),
            frame.delta_bc
        );
        for hit in &frame.hits {
            println!(
                "    hit chain={} tdc={:2} chan={} time={:7} tot={:4}",
                hit.chain, hit.tdc_id, hit.channel, hit.time, hit.tot
            );
        }
    }
    let trailer = event.trailer();
    let codes: Vec<String> = (0..10).map(|i| trailer.trm_fault(i).to_string()).collect();
    println!(
        "crate trailer  crate_fault={} trm_faults=[{}]",
        trailer.crate_fault(),
        codes.join(",")
    );
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tof_codec=info".parse()?))
        .init();

    let data = std::fs::read(&args.dump.input)?;
    let max_events = args.dump.max_events.unwrap_or(usize::MAX);

    let mut n_events = 0;
    let mut n_faulty = 0;
    for result in CompressedDecoder::new(&data).take(max_events) {
        let event = match result {
            Ok(event) => event,
            Err(e) if e.is_end_of_input() => {
                warn!(error = %e, "Stream ends inside an event");
                break;
            }
            Err(e) => return Err(e.into()),
        };
        n_events += 1;
        if event.has_fault() {
            n_faulty += 1;
        }

        if args.dump.json {
            println!("{}", serde_json::to_string(&event)?);
        } else if args.dump.common.verbose {
            print_words(&event);
        } else {
            print_event(&event);
        }
    }

    if !args.dump.json {
        println!("{} events, {} with fault", n_events, n_faulty);
    }
    Ok(())
}
