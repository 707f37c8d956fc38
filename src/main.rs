//! Command line front end: run a program image, list it, or assemble one from text.
//!
//! Usage: `um run <PROGRAM> [--dump]`, `um disasm <PROGRAM>`, `um asm <SOURCE> -o <OUTPUT>`

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use um::bytecode::{assemble, disassemble, read_program, write_program};
use um::{Result, UM};

#[derive(Parser, Debug)]
#[command(name = "um")]
#[command(about = "Run, disassemble, or assemble programs for the segmented register machine")]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Execute a program image, using stdin and stdout for Input and Output
  Run {
    /// Path to a program image: big-endian 32 bit words
    program: PathBuf,

    /// Print the final machine state to stderr
    #[arg(long)]
    dump: bool,
  },

  /// Print a listing of a program image
  Disasm {
    program: PathBuf,
  },

  /// Assemble a text listing into a program image
  Asm {
    source: PathBuf,

    /// Where to write the program image
    #[arg(short, long)]
    output: PathBuf,
  },
}

/// Use `RUST_LOG` to override the default filter.
fn init_logging() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("um=info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .init();
}

fn load(path: &Path) -> Result<Vec<u32>> {
  let bytes = fs::read(path)?;
  read_program(&bytes)
}

fn run(path: &Path, dump: bool) -> Result<()> {
  let program = load(path)?;
  info!(path = %path.display(), words = program.len(), "loaded program");

  let stdin  = io::stdin();
  let stdout = io::stdout();
  let mut machine = UM::new(program, stdin.lock(), BufWriter::new(stdout.lock()));

  let outcome = machine.run();
  if dump {
    eprintln!("{}", machine);
  }
  let executed = outcome?;

  info!(executed, "halted");
  Ok(())
}

fn disasm(path: &Path) -> Result<()> {
  let program = load(path)?;
  let stdout  = io::stdout();
  let mut out = stdout.lock();
  out.write_all(disassemble(&program, None).as_bytes())?;
  Ok(())
}

fn asm(source: &Path, output: &Path) -> Result<()> {
  let text = fs::read_to_string(source)?;
  let assembled = assemble(&text)?;
  fs::write(output, write_program(&assembled.words))?;
  info!(
    words = assembled.words.len(),
    labels = assembled.symbols.len(),
    output = %output.display(),
    "assembled"
  );
  Ok(())
}

fn main() {
  init_logging();

  #[cfg(feature = "trace_computation")]
  info!("Computation Tracing ENABLED");

  let cli = Cli::parse();

  let result = match &cli.command {
    Command::Run { program, dump }  => run(program, *dump),
    Command::Disasm { program }     => disasm(program),
    Command::Asm { source, output } => asm(source, output),
  };

  if let Err(e) = result {
    error!("{}", e);
    process::exit(1);
  }
}
