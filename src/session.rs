//! Driving the engine from outside events.
//!
//! Collaborators (a collector pushing snapshots, a viewer that got resized)
//! send [`Trigger`]s down a `crossbeam` channel. The session drains whatever
//! has queued up, builds only the newest snapshot, and hands the result to a
//! [`GraphSink`]. Every published result carries a generation number that
//! only ever goes up, so an older graph can never replace a newer one.

use std::iter;

use crossbeam::channel::Receiver;
use log::{debug, info, warn};

use crate::{
    pipeline::{Built, Engine},
    render::{GraphSink, RenderError},
    snapshot::ParseError,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// A new snapshot payload is ready
    Snapshot(String),
    /// The render surface changed; redraw the latest snapshot
    Resized,
}

#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

#[derive(Debug)]
pub struct Published {
    pub generation: u64,
    pub built: Built,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub published: usize,
    pub failed: usize,
}

pub struct Session<S> {
    engine: Engine,
    sink: S,
    /// Last payload that built and rendered cleanly
    payload: Option<String>,
    current: Option<Published>,
    generation: u64,
}

impl<S> Session<S>
where
    S: GraphSink,
{
    pub fn new(engine: Engine, sink: S) -> Self {
        Self {
            engine,
            sink,
            payload: None,
            current: None,
            generation: 0,
        }
    }

    /// The newest graph built so far. A failed snapshot leaves this alone.
    pub fn current(&self) -> Option<&Published> {
        self.current.as_ref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Handle one trigger. `Ok(true)` if a new graph was published.
    pub fn handle(&mut self, trigger: Trigger) -> Result<bool, TickError> {
        self.handle_batch(iter::once(trigger))
    }

    /// Handle a burst of triggers as one tick: only the last snapshot is
    /// built, and any number of resizes collapse into one redraw.
    pub fn handle_batch<I>(&mut self, triggers: I) -> Result<bool, TickError>
    where
        I: IntoIterator<Item = Trigger>,
    {
        let mut latest = None;
        let mut resized = false;
        let mut skipped = 0usize;
        for trigger in triggers {
            match trigger {
                Trigger::Snapshot(payload) => {
                    if latest.replace(payload).is_some() {
                        skipped += 1;
                    }
                }
                Trigger::Resized => resized = true,
            }
        }
        if skipped > 0 {
            debug!("superseded {skipped} queued snapshots");
        }

        match latest {
            Some(payload) if !resized && self.payload.as_deref() == Some(payload.as_str()) => {
                debug!("snapshot unchanged, not rebuilding");
                Ok(false)
            }
            Some(payload) => self.rebuild(payload),
            None if resized => match self.payload.clone() {
                Some(payload) => self.rebuild(payload),
                None => Ok(false),
            },
            None => Ok(false),
        }
    }

    fn rebuild(&mut self, payload: String) -> Result<bool, TickError> {
        let built = self.engine.build(&payload)?;
        self.generation += 1;
        let generation = self.generation;
        let rendered = self.sink.render(&built.description);
        info!(
            "tick {generation}: {} chunks ({} allocated), {} edges",
            built.graph.nr_chunks(),
            built.graph.heads().allocated,
            built.graph.nr_edges()
        );
        self.current = Some(Published { generation, built });
        match rendered {
            Ok(()) => {
                self.payload = Some(payload);
                Ok(true)
            }
            Err(e) => {
                // so the same payload is retried next time
                self.payload = None;
                Err(e.into())
            }
        }
    }

    /// Serve triggers until every sender is gone. Failed ticks are logged
    /// and skipped; the previous graph stays current.
    pub fn run(&mut self, triggers: &Receiver<Trigger>) -> RunSummary {
        let mut summary = RunSummary::default();
        while let Ok(first) = triggers.recv() {
            let batch: Vec<Trigger> = iter::once(first).chain(triggers.try_iter()).collect();
            match self.handle_batch(batch) {
                Ok(true) => summary.published += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("tick failed: {e}");
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}
