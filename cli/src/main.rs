mod diff;
mod explore;
mod generate;
mod probe;
mod verify;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use env_logger::{Builder, Target};
use felicity_egtb::Variant;
use log::LevelFilter;

use diff::Diff;
use explore::Explore;
use generate::Generate;
use probe::Probe;
use verify::Verify;

/// clap's `ValueEnum` needs a type it owns; `felicity_egtb::Variant` stays
/// free of a CLI dependency so this thin wrapper carries the `--variant` flag.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum VariantArg {
    Chess,
    Xiangqi,
}

impl From<VariantArg> for Variant {
    fn from(v: VariantArg) -> Self {
        match v {
            VariantArg::Chess => Variant::Chess,
            VariantArg::Xiangqi => Variant::Xiangqi,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
    #[arg(long, value_enum, global = true, default_value_t = VariantArg::Chess)]
    variant: VariantArg,
    #[arg(short, long, action = ArgAction::Count, default_value_t = 2)]
    verbose: u8,
    #[arg(
        long,
        help = "If set, logs will not include a timestamp",
        action = ArgAction::SetTrue
    )]
    no_time: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    Generate(Generate),
    Probe(Probe),
    Verify(Verify),
    Explore(Explore),
    Diff(Diff),
}

impl Cmd {
    fn run(self, variant: Variant) -> i32 {
        match self {
            Self::Generate(cmd) => cmd.run(variant),
            Self::Probe(cmd) => cmd.run(variant),
            Self::Verify(cmd) => cmd.run(variant),
            Self::Explore(cmd) => cmd.run(variant),
            Self::Diff(cmd) => cmd.run(variant),
        }
    }
}

fn main() {
    let args = Cli::parse();
    let mut builder = Builder::new();
    builder
        .filter(
            None,
            match args.verbose {
                0 => LevelFilter::Error,
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            },
        )
        .default_format()
        .target(Target::Stdout);

    if args.no_time {
        builder.format_timestamp(None);
    }
    builder.init();

    let code = args.cmd.run(args.variant.into());
    std::process::exit(code);
}
