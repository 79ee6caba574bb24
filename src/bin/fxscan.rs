use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fxscan", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the kernel chain (or blend plan) between two pixel formats.
    Plan(PlanArgs),
    /// List every pixel format with its interchange family.
    Formats,
    /// Compile a built-in JIT program and print its listings.
    Jit(JitArgs),
}

#[derive(Parser, Debug)]
struct PlanArgs {
    /// Source pixel format, e.g. `bgr24`.
    #[arg(long)]
    src: String,

    /// Destination pixel format.
    #[arg(long)]
    dst: String,

    /// Plan a SrcOver blend of src onto dst instead of a conversion.
    #[arg(long, default_value_t = false)]
    blend: bool,

    /// Print JSON instead of text.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Parser, Debug)]
struct JitArgs {
    /// Program to compile.
    #[arg(long, value_enum)]
    program: ProgramChoice,

    /// Vector registers available to the allocator.
    #[arg(long, default_value_t = 8)]
    vector_registers: u8,

    /// Print JSON instead of text.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProgramChoice {
    SrcOverAl,
    Premultiply,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Plan(args) => cmd_plan(args),
        Command::Formats => cmd_formats(),
        Command::Jit(args) => cmd_jit(args),
    }
}

fn parse_format(s: &str) -> anyhow::Result<fxscan::PixelFormat> {
    s.parse()
        .with_context(|| format!("parse pixel format '{s}'"))
}

fn cmd_plan(args: PlanArgs) -> anyhow::Result<()> {
    let src = parse_format(&args.src)?;
    let dst = parse_format(&args.dst)?;
    let dump = if args.blend {
        fxscan::blend_plan(src, dst).dump(src, dst)
    } else {
        fxscan::conversion_chain(src, dst).dump()
    };
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&dump).context("serialize plan")?
        );
    } else {
        print!("{dump}");
    }
    Ok(())
}

fn cmd_formats() -> anyhow::Result<()> {
    for fmt in fxscan::PixelFormat::ALL {
        let family = fxscan::nearest_interchange_format(fmt);
        let marker = if fxscan::is_interchange_format(fmt) {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {:<16} {:>3} bpp  -> {}",
            fmt.name(),
            fmt.bits_per_pixel(),
            family.pixel_format()
        );
    }
    Ok(())
}

fn cmd_jit(args: JitArgs) -> anyhow::Result<()> {
    let program = match args.program {
        ProgramChoice::SrcOverAl => fxscan::src_over_al_program(),
        ProgramChoice::Premultiply => fxscan::premultiply_program(),
    }
    .context("build program")?;
    let opts = fxscan::CodegenOpts {
        vector_registers: args.vector_registers,
        ..fxscan::CodegenOpts::default()
    };
    let compiled = fxscan::compile(&program, &opts)
        .with_context(|| format!("compile '{}'", program.name()))?;

    if args.json {
        let dump = fxscan::ProgramDump::new(&program, &compiled)?;
        println!(
            "{}",
            serde_json::to_string_pretty(&dump).context("serialize program dump")?
        );
    } else {
        print!("{}", fxscan::dump_program(&program));
        println!();
        print!("{}", fxscan::dump_compiled(&compiled));
    }
    Ok(())
}
