use std::io::Read;

use clap::Parser;
use log::{LevelFilter, Log, Metadata, Record};
use wfalloc::{Heap, HeapSource, SbrkSource, VecSource, program_break};

/// Walks a heap through a few allocations and releases, printing every block
/// after each step.
#[derive(Debug, Parser)]
struct Args {
  /// Grow the heap by moving the real program break instead of using an
  /// in-process arena.
  #[arg(long)]
  sbrk: bool,

  /// Wait for ENTER after each step, e.g. to inspect the process with `pmap`.
  #[arg(long)]
  pause: bool,

  /// Log heap internals to stderr (-v: debug, -vv: trace).
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

struct StderrLogger;

impl Log for StderrLogger {
  fn enabled(
    &self,
    _metadata: &Metadata<'_>,
  ) -> bool {
    true
  }

  fn log(
    &self,
    record: &Record<'_>,
  ) {
    if self.enabled(record.metadata()) {
      eprintln!("[{:>5} {}] {}", record.level(), record.target(), record.args());
    }
  }

  fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

/// Waits until the user presses ENTER.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    program_break(),
  );
}

fn show<S: HeapSource>(
  heap: &Heap<S>,
  title: &str,
  pause: bool,
) {
  println!("{title}");
  print!("{}", heap.dump());
  heap.log_blocks();
  if pause {
    block_until_enter_pressed();
  }
}

fn run<S: HeapSource>(
  heap: &mut Heap<S>,
  pause: bool,
) -> anyhow::Result<()> {
  let a = heap.allocate(4)?;
  let b = heap.allocate(128)?;
  let c = heap.allocate(36)?;
  show(heap, "after allocating 4, 128 and 36 bytes", pause);

  heap.release(a)?;
  heap.release(b)?;
  heap.release(c)?;
  show(heap, "after releasing all three", pause);

  let e = heap.allocate(16)?;
  let f = heap.allocate(4)?;
  let g = heap.allocate(4)?;
  show(heap, "after allocating 16, 4 and 4 bytes", pause);

  heap.release(e)?;
  heap.release(f)?;
  heap.release(g)?;
  show(heap, "after releasing them again", pause);

  heap.verify()?;
  println!("{:#?}", heap.usage());
  Ok(())
}

fn main() -> anyhow::Result<()> {
  let args = Args::parse();

  let level = match args.verbose {
    0 => LevelFilter::Warn,
    1 => LevelFilter::Debug,
    _ => LevelFilter::Trace,
  };
  log::set_logger(&LOGGER).map_err(|e| anyhow::anyhow!("{e}"))?;
  log::set_max_level(level);

  if args.sbrk {
    print_program_break("start");
    let mut heap = Heap::with_source(SbrkSource::new());
    run(&mut heap, args.pause)?;
    println!("heap base = {:?}", heap.source().base());
    print_program_break("end");
  } else {
    run(&mut Heap::with_source(VecSource::new()), args.pause)?;
  }

  Ok(())
}
