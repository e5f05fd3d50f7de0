use std::{fs, process::exit};

use clap::{App, Arg, ArgMatches};
use log::error;
use vmsim::{
    executable::ExecutableFile,
    noff::NoffBuilder,
    trace::{parse_trace, run_trace},
    LoadingMode, Machine, MachineConfig, SpaceId,
};

fn number_arg(matches: &ArgMatches, name: &str, default: usize) -> usize {
    match matches.value_of(name) {
        Some(value) => value.parse().unwrap_or_else(|_| {
            eprintln!("--{} expects a number, got \"{}\"", name, value);
            exit(2)
        }),
        None => default,
    }
}

fn config_from(matches: &ArgMatches) -> MachineConfig {
    let defaults = if matches.is_present("linear") {
        MachineConfig::linear()
    } else {
        MachineConfig::default()
    };
    let mut config = defaults
        .clone()
        .with_page_size(number_arg(matches, "page-size", defaults.page_size))
        .with_frames(number_arg(matches, "frames", defaults.num_frames))
        .with_tlb_size(number_arg(matches, "tlb", defaults.tlb_size))
        .with_swap_sectors(number_arg(matches, "swap", defaults.swap_sectors))
        .with_user_stack_size(number_arg(matches, "stack", defaults.user_stack_size))
        .with_read_only_code(matches.is_present("read-only-code"));
    if matches.is_present("demand") {
        config = config.with_loading(LoadingMode::Demand);
    }
    if let Some(name) = matches.value_of("swap-image") {
        config = config.with_swap_image(name);
    }
    config
}

/// Small program used when no executable is given: one page each of code
/// and data, and one page of uninitialized data.
fn demo_image(page_size: usize) -> Vec<u8> {
    NoffBuilder::new()
        .code(&vec![0x11; page_size])
        .init_data(&vec![0x22; page_size])
        .uninit_data(page_size as u32)
        .build()
}

fn run(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let config = config_from(matches);
    let mut machine = Machine::new(config.clone())?;

    let id = match matches.value_of("executable") {
        Some(path) => machine.load(&ExecutableFile::open(path)?)?,
        None => machine.load(&demo_image(config.page_size))?,
    };
    let id: SpaceId = if matches.is_present("fork") {
        machine.fork(id)?
    } else {
        id
    };
    machine.init_registers(id)?;
    machine.switch_to(id)?;

    if let Some(path) = matches.value_of("trace") {
        let accesses = parse_trace(&fs::read_to_string(path)?)?;
        for outcome in run_trace(&mut machine, &accesses) {
            println!("{}", outcome);
        }
    }

    if matches.is_present("page-table") {
        if let Some(space) = machine.space(id) {
            print!("{}", space.dump_page_table());
        }
    }
    if let Some(name) = matches.value_of("dump") {
        machine.memory().dump(name)?;
    }
    println!("{}", machine.stats());
    Ok(())
}

fn main() {
    env_logger::init();

    let matches = App::new("vmsim")
        .about("Demand paged virtual memory simulator")
        .arg(
            Arg::with_name("executable")
                .short("x")
                .long("executable")
                .takes_value(true)
                .help("NOFF executable to load (a built-in demo otherwise)"),
        )
        .arg(
            Arg::with_name("trace")
                .short("t")
                .long("trace")
                .takes_value(true)
                .help("Access trace: lines of `r <addr> <size>` or `w <addr> <size> <value>`"),
        )
        .arg(
            Arg::with_name("linear")
                .long("linear")
                .help("Linear page table translation instead of a TLB"),
        )
        .arg(
            Arg::with_name("demand")
                .long("demand")
                .help("Demand loading with linear translation"),
        )
        .arg(Arg::with_name("page-size").long("page-size").takes_value(true))
        .arg(Arg::with_name("frames").long("frames").takes_value(true))
        .arg(Arg::with_name("tlb").long("tlb").takes_value(true))
        .arg(Arg::with_name("swap").long("swap").takes_value(true))
        .arg(
            Arg::with_name("stack")
                .long("stack")
                .takes_value(true)
                .help("User stack size in bytes"),
        )
        .arg(
            Arg::with_name("swap-image")
                .long("swap-image")
                .takes_value(true)
                .help("Keep swap in the image file DISK_IMAGE_<name>"),
        )
        .arg(
            Arg::with_name("read-only-code")
                .long("read-only-code")
                .help("Map code pages read-only"),
        )
        .arg(
            Arg::with_name("fork")
                .long("fork")
                .help("Run the trace in a forked copy of the program"),
        )
        .arg(
            Arg::with_name("page-table")
                .long("page-table")
                .help("Print the page table when done"),
        )
        .arg(
            Arg::with_name("dump")
                .long("dump")
                .takes_value(true)
                .help("Write main memory to MEMORY_FILE_<name> when done"),
        )
        .get_matches();

    if let Err(e) = run(&matches) {
        error!("{}", e);
        eprintln!("vmsim: {}", e);
        exit(1);
    }
}
