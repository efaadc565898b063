use dali::base::address::{FrameAddress, COMMAND_BIT};
use dali::base::status::GearStatus;
use dali::codec::timing::{BACKWARD_FRAME_DURATION, FORWARD_FRAME_DURATION};
use dali::config::GearConfig;
use dali::defs::gear::cmd;
use dali::drivers::simulator::runtime::{GearRuntime, SimHardware};
use dali::gear::hal::ParamId;
use dali_gear as dali;
use futures::stream::StreamExt;
use log::{debug, error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::time::{self, Duration};

extern crate clap;
use clap::Parser;

#[derive(Parser, Debug)]
// Run a simulated DALI LED gear and send it forward frames
struct CmdArgs {
    /// JSON file overriding the default gear configuration
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,
    /// Short address of the gear, unaddressed if not given
    #[arg(short = 's', long)]
    short_address: Option<u8>,
    /// Forward frames as four hex digits, e.g. 0b90
    #[arg(short = 'f', long, num_args = 1..)]
    frames: Vec<String>,
    /// Fade ticks (ms) to wait for an answer after each frame
    #[arg(short = 't', long, default_value_t = 50)]
    ticks: u64,
}

fn parse_frame(s: &str) -> Option<[u8; 2]> {
    let mut frame = 0u16;
    let mut digits = 0;
    for c in s.chars() {
        if c.is_whitespace() {
            continue;
        }
        if digits == 4 {
            return None;
        }
        frame = (frame << 4) | c.to_digit(16)? as u16;
        digits += 1;
    }
    if digits != 4 {
        return None;
    }
    Some([(frame >> 8) as u8, frame as u8])
}

fn print_answer(frame: [u8; 2], answer: u8) {
    let addressed = !matches!(
        FrameAddress::from_byte(frame[0]),
        FrameAddress::Special(_) | FrameAddress::Extended(_)
    );
    if addressed && frame[0] & COMMAND_BIT != 0 && frame[1] == cmd::QUERY_STATUS {
        println!(
            "{:02x}{:02x}: {:02x} ({})",
            frame[0],
            frame[1],
            answer,
            GearStatus::new(answer)
        );
    } else {
        println!("{:02x}{:02x}: {:02x} ({})", frame[0], frame[1], answer, answer);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let args = CmdArgs::parse();

    let config = match &args.config {
        Some(path) => match GearConfig::load(path).await {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to read configuration: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => GearConfig::default(),
    };

    let mut frames = Vec::new();
    for s in &args.frames {
        match parse_frame(s) {
            Some(f) => frames.push(f),
            None => {
                error!("Invalid frame \"{}\"", s);
                return ExitCode::FAILURE;
            }
        }
    }

    let hw = SimHardware::new(&config);
    if let Some(addr) = args.short_address {
        if addr > 63 {
            error!("Short address out of range");
            return ExitCode::FAILURE;
        }
        hw.params.preset(ParamId::ShortAddress, addr);
    }
    debug!("Configuration: {:?}", config);

    let mut gear = GearRuntime::start(config, hw);
    let mut answers = match gear.backward_stream() {
        Some(s) => s,
        None => {
            error!("No backward frame stream");
            return ExitCode::FAILURE;
        }
    };

    // A repeated configuration command must follow within the repeat window
    let wait = FORWARD_FRAME_DURATION + BACKWARD_FRAME_DURATION + Duration::from_millis(args.ticks);
    for frame in frames {
        if let Err(e) = gear.send(frame).await {
            error!("Failed to send frame: {}", e);
            return ExitCode::FAILURE;
        }
        match time::timeout(wait, answers.next()).await {
            Ok(Some(answer)) => print_answer(frame, answer),
            Ok(None) => break,
            Err(_) => println!("{:02x}{:02x}: -", frame[0], frame[1]),
        }
    }

    match gear.shutdown().await {
        Ok(state) => {
            info!("Gear stopped");
            println!(
                "Actual level {}, status: {}",
                state.actual_level,
                state.gear_status()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Gear task failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
