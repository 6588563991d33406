use std::num::ParseIntError;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, Args, ArgEnum};
use console::{style, StyledObject};
use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use tracing::{error, Level};

use tedium_framer::bridge::bridge;
use tedium_framer::bus::{BusController, RegisterAccess, RegisterAddress, RegisterValue};
use tedium_framer::{BusTiming, FramerConfig};

use framer::FramerEvent;
use framer::dump::{registers_dump_channel, registers_dump_global, timing_dump};
use framer::emulator::EmulatedFramer;
use framer::host::LoopbackHost;
use framer::pump::{pump_transport, pump_trunk, PumpSettings};
use framer::register::CHANNELS_MAX;

use crate::error::{Result, ToolError};

mod error;
mod framer;

#[derive(Parser)]
#[clap(author, version, about, long_about=None)]
pub(crate) struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    #[clap(long, arg_enum, default_value="warn", global=true)]
    pub log_level: LogLevel,
}

#[derive(ArgEnum, Copy, Clone, Debug)]
pub(crate) enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn  => Level::WARN,
            LogLevel::Info  => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

fn parse_number<T>(s: &str, from_str_radix: fn(&str, u32) -> std::result::Result<T, ParseIntError>) -> std::result::Result<T, ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => from_str_radix(hex, 16),
        None => from_str_radix(s, 10),
    }
}

fn parse_address(s: &str) -> std::result::Result<RegisterAddress, ParseIntError> {
    parse_number(s, RegisterAddress::from_str_radix)
}

fn parse_value(s: &str) -> std::result::Result<RegisterValue, ParseIntError> {
    parse_number(s, RegisterValue::from_str_radix)
}

#[derive(Args)]
pub(crate) struct FramerArgs {
    #[clap(long, default_value_t=8)]
    pub channels: usize,

    #[clap(long, default_value_t=24)]
    pub timeslots: usize,

    /// TX and RX FIFO depth, in frames.
    #[clap(long, default_value_t=16)]
    pub fifo_depth: usize,

    #[clap(long, default_value_t=24)]
    pub multiframe: usize,

    /// Leave the serial outputs and RX sync undriven.
    #[clap(long)]
    pub outputs_disabled: bool,

    #[clap(long, default_value_t=20)]
    pub strobe_delay: u32,

    #[clap(long, default_value_t=20)]
    pub ready_delay: u32,

    /// Abandon bus transactions after this many cycles without ready.
    #[clap(long)]
    pub ready_timeout: Option<u64>,

    /// Bus clocks the emulated framer takes to answer a strobe.
    #[clap(long, default_value_t=4)]
    pub ready_latency: u32,
}

impl FramerArgs {
    fn config(&self) -> Result<FramerConfig> {
        if self.channels > CHANNELS_MAX {
            return Err(ToolError::TooManyChannels(self.channels));
        }

        let config = FramerConfig {
            channels: self.channels,
            timeslots_per_frame: self.timeslots,
            fifo_depth_pages: self.fifo_depth,
            frames_per_multiframe: self.multiframe,
            outputs_enabled: !self.outputs_disabled,
            bus: BusTiming {
                strobe_delay_cycles: self.strobe_delay,
                ready_delay_cycles: self.ready_delay,
                ready_timeout_cycles: self.ready_timeout,
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn bus(&self, config: &FramerConfig) -> BusController<EmulatedFramer> {
        let framer = EmulatedFramer::new(config.channels, config.geometry().bits_per_frame(), self.ready_latency);
        BusController::new(framer, config.bus)
    }
}

#[derive(Args)]
pub(crate) struct LoopbackArgs {
    #[clap(flatten)]
    framer: FramerArgs,

    /// Stop after this long. Runs until interrupted otherwise.
    #[clap(long)]
    seconds: Option<u64>,

    /// Trunk clock offset, in parts per million.
    #[clap(long, default_value_t=0.0, allow_hyphen_values=true)]
    trunk_ppm: f64,

    /// Host poll clock offset, in parts per million.
    #[clap(long, default_value_t=0.0, allow_hyphen_values=true)]
    poll_ppm: f64,

    /// Promote the loop threads to real-time priority.
    #[clap(long)]
    realtime: bool,
}

#[derive(Subcommand, Clone)]
pub(crate) enum RegisterOp {
    #[clap(name="read")]
    Read {
        #[clap(parse(try_from_str=parse_address))]
        address: RegisterAddress,
    },

    #[clap(name="write")]
    Write {
        #[clap(parse(try_from_str=parse_address))]
        address: RegisterAddress,
        #[clap(parse(try_from_str=parse_value))]
        value: RegisterValue,
    },

    #[clap(name="dump")]
    Dump {
        #[clap(long)]
        channel: Option<usize>,
    },
}

#[derive(Args)]
pub(crate) struct RegisterArgs {
    #[clap(subcommand)]
    op: RegisterOp,

    #[clap(flatten)]
    framer: FramerArgs,
}

#[derive(Args)]
pub(crate) struct TimingArgs {
    #[clap(long, default_value_t=24)]
    timeslots: usize,

    /// System clocks per serial bit clock period.
    #[clap(long, default_value_t=8)]
    clocks_per_bit: usize,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    #[clap(name="loopback")]
    Loopback(LoopbackArgs),

    #[clap(name="register")]
    Register(RegisterArgs),

    #[clap(name="timing")]
    Timing(TimingArgs),
}

fn main() -> Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(Level::from(args.log_level))
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Commands::Loopback(a) => loopback(a)?,
        Commands::Register(a) => register(a)?,
        Commands::Timing(a) => {
            let config = FramerConfig { timeslots_per_frame: a.timeslots, ..Default::default() };
            config.validate()?;
            timing_dump(config.geometry(), a.clocks_per_bit);
        },
    }

    Ok(())
}

///////////////////////////////////////////////////////////////////////

fn register(args: RegisterArgs) -> Result<()> {
    let config = args.framer.config()?;
    let mut bus = args.framer.bus(&config);

    match args.op {
        RegisterOp::Read { address } => {
            let start = bus.cycles();
            let value = bus.register_read(address)?;
            println!("{address:04x}: {value:02x} ({} cycles)", bus.cycles() - start);
        },
        RegisterOp::Write { address, value } => {
            let start = bus.cycles();
            bus.register_write(address, value)?;
            let cycles = bus.cycles() - start;
            let readback = bus.register_read(address)?;
            println!("{address:04x} <- {value:02x}, reads {readback:02x} ({cycles} cycles)");
        },
        RegisterOp::Dump { channel } => {
            registers_dump_global(&mut bus)?;
            match channel {
                Some(channel) if channel < config.channels => registers_dump_channel(&mut bus, channel)?,
                Some(channel) => return Err(ToolError::TooManyChannels(channel + 1)),
                None => {
                    for channel in 0..config.channels {
                        registers_dump_channel(&mut bus, channel)?;
                    }
                },
            }
            println!("{} transactions, {} cycles", bus.peripheral().transactions(), bus.cycles());
        },
    }

    Ok(())
}

/// Run `pump` on a named thread. Its exit is announced on `events` so the
/// monitor stops waiting; any error comes back through the handle.
fn spawn_pump<F>(name: &'static str, events: Sender<FramerEvent>, pump: F) -> Result<JoinHandle<Result<()>>>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let result = pump();
            if let Err(e) = &result {
                error!("{name}: {e}");
            }
            let _ = events.send(FramerEvent::Exited(name));
            result
        })?;
    Ok(handle)
}

fn join(handle: JoinHandle<Result<()>>, name: &'static str) -> Result<()> {
    handle.join().map_err(|_| ToolError::ThreadPanic(name))?
}

fn loopback(args: LoopbackArgs) -> Result<()> {
    let config = args.framer.config()?;
    let (trunk, transport) = bridge(&config)?;
    let bus = args.framer.bus(&config);

    // Start shedding frames once the TX FIFO is three quarters full.
    let drop_level = (config.fifo_depth_pages * 3 / 4).min(u8::MAX as usize) as u8;
    let host = LoopbackHost::new(config.frame_payload_size(), drop_level);

    let (event_sender, event_receiver) = unbounded();
    let (stop_sender, stop_receiver) = bounded::<()>(0);

    let trunk_thread = spawn_pump("fr_trunk", event_sender.clone(), {
        let settings = PumpSettings { ppm: args.trunk_ppm, realtime: args.realtime };
        let stop = stop_receiver.clone();
        let events = event_sender.clone();
        move || pump_trunk(trunk, bus, settings, stop, events)
    })?;

    let transport_thread = spawn_pump("fr_usb", event_sender.clone(), {
        let settings = PumpSettings { ppm: args.poll_ppm, realtime: args.realtime };
        move || pump_transport(transport, host, settings, stop_receiver, event_sender)
    })?;

    let deadline = args.seconds.map(|s| Instant::now() + Duration::from_secs(s));
    monitor(event_receiver, deadline);

    drop(stop_sender);
    join(trunk_thread, "fr_trunk")?;
    join(transport_thread, "fr_usb")?;

    eprintln!("done: loopback");
    Ok(())
}

///////////////////////////////////////////////////////////////////////

fn counter(count: u64) -> StyledObject<u64> {
    if count == 0 {
        style(count).green()
    } else {
        style(count).red()
    }
}

fn monitor(receiver: Receiver<FramerEvent>, deadline: Option<Instant>) {
    let start = Instant::now();

    loop {
        let event = match deadline {
            Some(deadline) => receiver.recv_deadline(deadline).ok(),
            None => receiver.recv().ok(),
        };
        let event = match event {
            Some(event) => event,
            None => break,
        };

        match event {
            FramerEvent::Trunk { timestamp, stats } => {
                eprintln!("{:8.3} {} frames={} rx_fill={} rx_overflow={} tx_underflow={} tx_slips={}",
                    (timestamp - start).as_secs_f64(),
                    style("trunk").cyan(),
                    stats.frame_count,
                    stats.rx_fifo_fill,
                    counter(stats.rx_fifo_overflow_count),
                    counter(stats.tx_fifo_underflow_count),
                    counter(stats.tx_frame_slip_count),
                );
            },
            FramerEvent::Transport { timestamp, stats } => {
                eprintln!("{:8.3} {} sof={} rx_level={} tx_fill={} rx_underflow={} tx_overflow={} abandoned={} discarded={} out_gaps={}",
                    (timestamp - start).as_secs_f64(),
                    style("usb").cyan(),
                    stats.sof_count,
                    stats.rx_fifo_level,
                    stats.tx_fifo_fill,
                    counter(stats.rx_fifo_underflow_count),
                    counter(stats.tx_fifo_overflow_count),
                    counter(stats.in_abandoned_count),
                    counter(stats.out_discarded_count),
                    counter(stats.out_frame_gap_count),
                );
            },
            FramerEvent::Exited(name) => {
                eprintln!("done: {name}");
                break;
            },
            FramerEvent::Host { timestamp, stats } => {
                eprintln!("{:8.3} {} packets={} looped={} sof_gaps={} frame_gaps={} queue_full={} dropped={} malformed={}",
                    (timestamp - start).as_secs_f64(),
                    style("host").cyan(),
                    stats.packets_in,
                    stats.frames_looped,
                    counter(stats.sof_gaps),
                    counter(stats.frame_gaps),
                    counter(stats.queue_full),
                    counter(stats.frames_dropped),
                    counter(stats.malformed_packets),
                );
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_and_decimal() {
        assert_eq!(parse_address("0x0101"), Ok(0x0101));
        assert_eq!(parse_address("257"), Ok(257));
        assert_eq!(parse_value("0XfF"), Ok(0xff));
        assert!(parse_value("0x100").is_err());
    }

    #[test]
    fn framer_args_build_config() {
        let cli = Cli::parse_from(["tedium-tool", "loopback", "--timeslots", "32", "--ready-timeout", "500", "--trunk-ppm", "-50"]);
        let args = match cli.command {
            Commands::Loopback(args) => args,
            _ => panic!("expected loopback"),
        };
        assert_eq!(args.trunk_ppm, -50.0);

        let config = args.framer.config().unwrap();
        assert_eq!(config.timeslots_per_frame, 32);
        assert_eq!(config.channels, 8);
        assert_eq!(config.bus.ready_timeout_cycles, Some(500));
    }

    #[test]
    fn failed_pump_ends_monitor() {
        let (sender, receiver) = unbounded();
        let handle = spawn_pump("fr_test", sender.clone(), || {
            Err(ToolError::Framer(tedium_framer::Error::BusTimeout { address: 0x0101, cycles: 5 }))
        }).unwrap();

        // `sender` is still alive, so only the exit event can end this.
        monitor(receiver, None);

        let result = join(handle, "fr_test");
        assert!(matches!(result, Err(ToolError::Framer(tedium_framer::Error::BusTimeout { .. }))));
        drop(sender);
    }

    #[test]
    fn rejects_too_many_channels() {
        let cli = Cli::parse_from(["tedium-tool", "register", "--channels", "9", "dump"]);
        let args = match cli.command {
            Commands::Register(args) => args,
            _ => panic!("expected register"),
        };
        assert!(matches!(args.framer.config(), Err(ToolError::TooManyChannels(9))));
    }
}
