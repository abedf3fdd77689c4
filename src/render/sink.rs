use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
    process::{Command, Stdio},
};

use log::debug;

/// The serialized graph couldn't be delivered or the renderer refused it.
/// Kept apart from [`ParseError`](crate::snapshot::ParseError) so a bad
/// snapshot and a bad render are never confused.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("render output failed: {0}")]
    Io(#[from] io::Error),
    #[error("renderer rejected the graph ({status}): {stderr}")]
    Rejected {
        status: String,
        stderr: String,
    },
}

/// Something that draws (or stores) a serialized graph.
pub trait GraphSink {
    fn render(&mut self, description: &str) -> Result<(), RenderError>;
}

impl<S> GraphSink for Box<S>
where
    S: GraphSink + ?Sized,
{
    fn render(&mut self, description: &str) -> Result<(), RenderError> {
        (**self).render(description)
    }
}

/// Writes each description to `W` as-is.
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W>
where
    W: Write,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W> GraphSink for WriterSink<W>
where
    W: Write,
{
    fn render(&mut self, description: &str) -> Result<(), RenderError> {
        self.writer.write_all(description.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Replaces the file's contents with every new description.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl GraphSink for FileSink {
    fn render(&mut self, description: &str) -> Result<(), RenderError> {
        fs::write(&self.path, description)?;
        Ok(())
    }
}

/// Pipes each description into an external renderer, e.g.
/// `dot -Tsvg -o heap.svg`. A non-zero exit is [`RenderError::Rejected`].
pub struct CommandSink {
    program: String,
    args: Vec<String>,
}

impl CommandSink {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl GraphSink for CommandSink {
    fn render(&mut self, description: &str) -> Result<(), RenderError> {
        debug!("piping {} bytes into {}", description.len(), self.program);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .spawn()?;
        let stdin = child.stdin.take();
        let joined = crossbeam::thread::scope(|s| {
            let writer = s.spawn(move |_| -> io::Result<()> {
                if let Some(mut stdin) = stdin {
                    stdin.write_all(description.as_bytes())?;
                }
                Ok(())
            });
            // drains stderr while stdin is being fed and always reaps the child
            let output = child.wait_with_output();
            (output, writer.join())
        });
        let (output, written) =
            joined.map_err(|_| io::Error::other("renderer input thread panicked"))?;

        let output = output?;
        if !output.status.success() {
            return Err(RenderError::Rejected {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        written.map_err(|_| io::Error::other("renderer input thread panicked"))??;
        Ok(())
    }
}
