use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use emu::cpu::registers::register_names;
use emu::device;
use emu::loader;
use emu::machine::Machine;

const EXIT_USAGE: u8 = 2;
const EXIT_UNKNOWN_DEVICE: u8 = 3;
const EXIT_LOAD: u8 = 4;

/// Runs a flat binary program on an emulated board and dumps the registers.
#[derive(Parser, Debug)]
#[command(name = "run", version, about)]
struct Args {
    /// List the available devices and exit
    #[arg(short, long)]
    list: bool,

    /// Board to emulate
    #[arg(required_unless_present = "list")]
    device: Option<String>,

    /// Program image, loaded at address 0
    #[arg(required_unless_present = "list")]
    program: Option<PathBuf>,

    /// Stop after this many instructions
    max_cycles: Option<u64>,

    /// Print the final state as JSON
    #[arg(long)]
    json: bool,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Serialize)]
struct RegisterDump {
    names: &'static [&'static str],
    value: u32,
}

#[derive(Serialize)]
struct Dump {
    cycles: u64,
    registers: Vec<RegisterDump>,
    cpsr: u32,
}

impl Dump {
    fn new(machine: &Machine) -> Self {
        Self {
            cycles: machine.cycles(),
            registers: machine
                .cpu
                .registers
                .as_array()
                .iter()
                .enumerate()
                .map(|(index, &value)| RegisterDump {
                    names: register_names(index),
                    value,
                })
                .collect(),
            cpsr: machine.cpu.cpsr.dump(),
        }
    }

    fn print(&self, json: bool) {
        if json {
            match serde_json::to_string(self) {
                Ok(text) => println!("{text}"),
                Err(error) => eprintln!("cannot serialize the register dump: {error}"),
            }
            return;
        }

        println!("cycles={}", self.cycles);
        for register in &self.registers {
            println!("{}=0x{:08x}", register.names.join(","), register.value);
        }
    }
}

fn init_logging(log_file: Option<&Path>) -> std::io::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(File::create(path)?);
            builder.with_writer(writer).with_ansi(false).init();
            Ok(Some(guard))
        }
        None => {
            builder.with_writer(std::io::stderr).init();
            Ok(None)
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // flushes the log file on drop
    let _guard = match init_logging(args.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(error) => {
            eprintln!("cannot open the log file: {error}");
            return ExitCode::FAILURE;
        }
    };

    if args.list {
        for name in device::names() {
            println!("{name}");
        }
        return ExitCode::SUCCESS;
    }

    let (Some(name), Some(program)) = (args.device.as_deref(), args.program.as_deref()) else {
        return ExitCode::from(EXIT_USAGE);
    };

    let Some(factory) = device::find(name) else {
        eprintln!(
            "unknown device '{name}', available: {}",
            device::names().join(", ")
        );
        return ExitCode::from(EXIT_UNKNOWN_DEVICE);
    };

    let mut device = factory();
    if let Err(error) = loader::load_program(&mut device.machine, program) {
        eprintln!("{error}");
        return ExitCode::from(EXIT_LOAD);
    }

    tracing::info!(device = name, program = %program.display(), "running");
    let outcome = device.run(args.max_cycles);
    Dump::new(&device.machine).print(args.json);

    match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn arguments() {
        Args::command().debug_assert();

        let args = Args::try_parse_from(["run", "pi", "kernel.img", "100"]).unwrap();
        assert_eq!(args.device.as_deref(), Some("pi"));
        assert_eq!(args.max_cycles, Some(100));

        assert!(Args::try_parse_from(["run", "-l"]).unwrap().list);
        assert!(Args::try_parse_from(["run", "pi"]).is_err());
        assert_eq!(
            Args::try_parse_from(["run"]).unwrap_err().exit_code(),
            i32::from(EXIT_USAGE)
        );
    }

    #[test]
    fn dump_names_registers() {
        let mut machine = Machine::default();
        machine.cpu.registers.set_register_at(13, 0x8000);
        let dump = Dump::new(&machine);

        assert_eq!(dump.registers.len(), 16);
        assert_eq!(dump.registers[13].names, ["r13", "sp"]);
        assert_eq!(dump.registers[13].value, 0x8000);

        let json = serde_json::to_value(&dump).unwrap();
        assert_eq!(json["registers"][15]["names"][1], "pc");
        assert_eq!(json["cycles"], 0);
    }
}
