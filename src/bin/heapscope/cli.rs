use std::{
    fs,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam::channel::{self, Sender};
use heapscope::{
    CommandSink, Engine, EngineConfig, FileSink, GraphSink, ReconcileStrategy, Session, Trigger,
    WriterSink,
};
use log::{info, warn};

/// Draw a heap snapshot's free lists as a Graphviz graph.
#[derive(Parser, Debug)]
#[command(name = "heapscope", version)]
pub struct Cli {
    /// Snapshot JSON. Read from stdin when omitted.
    pub snapshot: Option<PathBuf>,
    /// Write the output to this file instead of stdout
    #[arg(long, short)]
    pub out: Option<PathBuf>,
    /// Pipe the description into a renderer, e.g. `--render dot -Tsvg -o heap.svg`.
    /// Takes the rest of the command line.
    #[arg(
        long,
        num_args = 1..,
        allow_hyphen_values = true,
        value_name = "CMD",
        conflicts_with_all = ["out", "json"]
    )]
    pub render: Option<Vec<String>>,
    /// How walk entries are split into allocated and free (overrides HEAPSCOPE_STRATEGY)
    #[arg(long)]
    pub strategy: Option<ReconcileStrategy>,
    /// Don't emit invisible edges between same-size allocated chunks
    #[arg(long)]
    pub no_layout_hints: bool,
    /// Dump the graph model as JSON instead of dot
    #[arg(long, conflicts_with = "watch")]
    pub json: bool,
    /// Keep re-reading SNAPSHOT and redraw whenever it changes
    #[arg(long, requires = "snapshot")]
    pub watch: bool,
    #[arg(long, default_value_t = 500)]
    pub interval_ms: u64,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = EngineConfig::from_env().context("reading HEAPSCOPE_* settings")?;
    if let Some(strategy) = cli.strategy {
        config = config.with_strategy(strategy);
    }
    if cli.no_layout_hints {
        config = config.with_layout_hints(false);
    }
    let engine = Engine::new(config);

    if cli.watch {
        return watch(engine, &cli);
    }

    let payload = read_snapshot(cli.snapshot.as_deref())?;
    if cli.json {
        let (graph, _) = engine.model(&payload)?;
        match &cli.out {
            Some(path) => {
                let file = fs::File::create(path)
                    .with_context(|| format!("creating {}", path.display()))?;
                let mut writer = BufWriter::new(file);
                graph.write_json(&mut writer)?;
                writer.flush()?;
            }
            None => {
                let mut stdout = io::stdout().lock();
                graph.write_json(&mut stdout)?;
                writeln!(stdout)?;
            }
        }
        return Ok(());
    }

    let built = engine.build(&payload)?;
    info!(
        "{} chunks, {} allocated ({} walk entries discarded), {} edges",
        built.graph.nr_chunks(),
        built.graph.heads().allocated,
        built.stats.discarded,
        built.graph.nr_edges()
    );
    sink(&cli).render(&built.description)?;
    Ok(())
}

fn read_snapshot(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path).with_context(|| format!("reading {}", path.display())),
        None => io::read_to_string(io::stdin()).context("reading snapshot from stdin"),
    }
}

fn sink(cli: &Cli) -> Box<dyn GraphSink> {
    if let Some(command) = &cli.render {
        // clap guarantees at least one value
        let (program, args) = command.split_first().map_or(("dot", &[][..]), |(p, a)| (p.as_str(), a));
        return Box::new(CommandSink::new(program, args.iter().cloned()));
    }
    match &cli.out {
        Some(path) => Box::new(FileSink::new(path)),
        None => Box::new(WriterSink::new(io::stdout())),
    }
}

fn watch(engine: Engine, cli: &Cli) -> Result<()> {
    let path = cli.snapshot.clone().context("--watch needs a snapshot file")?;
    let interval = Duration::from_millis(cli.interval_ms.max(1));
    let (tx, rx) = channel::bounded(16);
    info!("watching {} every {interval:?}", path.display());
    thread::Builder::new()
        .name("snapshot-poll".into())
        .spawn(move || poll(&path, interval, &tx))
        .context("starting the snapshot poller")?;

    let mut session = Session::new(engine, sink(cli));
    let summary = session.run(&rx);
    info!(
        "watch stopped: {} published, {} failed",
        summary.published, summary.failed
    );
    Ok(())
}

/// Send the file's contents whenever they change. Stops once the session
/// hangs up.
fn poll(path: &Path, interval: Duration, triggers: &Sender<Trigger>) {
    let mut last: Option<String> = None;
    let mut failing = false;
    loop {
        match fs::read_to_string(path) {
            Ok(payload) => {
                failing = false;
                if last.as_deref() != Some(payload.as_str()) {
                    last = Some(payload.clone());
                    if triggers.send(Trigger::Snapshot(payload)).is_err() {
                        return;
                    }
                }
            }
            Err(e) if !failing => {
                warn!("reading {}: {e}", path.display());
                failing = true;
            }
            Err(_) => {}
        }
        thread::sleep(interval);
    }
}
