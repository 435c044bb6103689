use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use kernel_stivale2::HeaderTag;
use stivale2_check::harness::{DEFAULT_QEMU, DEFAULT_TIMEOUT};
use stivale2_check::{BootConfig, ImageReport, StderrLogger, check_runs, inspect_image, run_boot};

/// Checks a stivale2 kernel against its boot contract
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Statically inspect a linked kernel ELF
    Image {
        /// Path to the kernel ELF
        kernel: PathBuf,
    },
    /// Boot an image in QEMU and classify the outcome
    Boot(BootOptions),
}

#[derive(clap::Args, Debug)]
struct BootOptions {
    /// Bootable ISO containing the kernel and a stivale2 bootloader
    image: PathBuf,

    /// QEMU system emulator to run
    #[arg(long, env = "QEMU", default_value = DEFAULT_QEMU)]
    qemu: PathBuf,

    /// Seconds to let each boot run
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout: u64,

    /// Number of boots; all must produce the same transcript
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    runs: u32,

    /// Require a framebuffer with every dimension chosen by the bootloader
    #[arg(long)]
    expect_auto_framebuffer: bool,

    /// Extra arguments passed to QEMU
    #[arg(last = true)]
    qemu_args: Vec<OsString>,
}

impl BootOptions {
    fn config(&self) -> BootConfig {
        let mut config = BootConfig::new(&self.image);
        config.qemu.clone_from(&self.qemu);
        config.timeout = Duration::from_secs(self.timeout);
        config.extra_args.clone_from(&self.qemu_args);
        config
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let logger: &'static StderrLogger = Box::leak(Box::new(StderrLogger::new(
        StderrLogger::level_for_verbosity(args.verbose),
    )));
    logger.init().context("Failed to install the logger")?;

    match args.command {
        Command::Image { kernel } => {
            let bytes = fs::read(&kernel)
                .with_context(|| format!("Failed to read {}", kernel.display()))?;
            let report = inspect_image(&bytes)
                .with_context(|| format!("{} violates the boot contract", kernel.display()))?;
            print_report(&report);
        }
        Command::Boot(options) => {
            let config = options.config();
            let runs = options.runs;

            let mut boots = Vec::new();
            for run in 0..runs {
                let boot = run_boot(&config).with_context(|| format!("Boot {run} failed"))?;
                println!("run {run}: {}", boot.outcome);
                if let Some((width, height, bpp)) = boot.framebuffer() {
                    println!("run {run}: framebuffer {width}x{height}x{bpp}");
                }
                boots.push(boot);
            }

            if let Some(first) = boots.first() {
                print!("{}", first.transcript);
            }

            check_runs(&boots, options.expect_auto_framebuffer)?;
            println!("ok: {runs} boot(s) reached the entry point and parked");
        }
    }

    Ok(())
}

fn print_report(report: &ImageReport) {
    let flags = report.contract.flags;
    println!("header      {:#x}", report.header_addr);
    println!("entry point {:#x}", report.header.entry_point);
    println!(
        "stack       {:#x}..{:#x} ({} KiB, {})",
        report.stack.base,
        report.contract.stack_top,
        report.stack.size / 1024,
        if report.stack_zero_fill { "zero-fill" } else { "zeroed file bytes" }
    );
    println!(
        "flags       {:#x} (higher-half: {}, protected ranges: {}, fully virtual: {})",
        flags.into_bits(),
        flags.higher_half_pointers(),
        flags.protected_memory_ranges(),
        flags.fully_virtual_mappings()
    );
    println!("tags        {}", report.contract.tag_count());
    for tag in report.contract.tags() {
        println!("  {}", describe_tag(tag));
    }
    println!("ok: boot contract satisfied");
}

fn describe_tag(tag: &HeaderTag) -> String {
    match tag.identifier() {
        Some(identifier) => format!("{identifier:#018x} {tag:?}"),
        None => format!("{tag:?} (ignored by the bootloader)"),
    }
}
