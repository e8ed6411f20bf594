//! Worker side of the slot protocol.
//!
//! A worker owns exactly one environment and answers commands one at a time.
//! It never speaks first and never talks to its siblings.

use super::protocol::{read_frame, write_frame, Command, Reply};
use crate::env::{EnvRegistry, EnvSpec, MultiAgentEnv, Value};
use crate::Result;
use std::io::{BufReader, BufWriter, Read, Write};

/// Transport seen from the worker end of a channel
pub trait WorkerEndpoint {
    /// Next command, or `None` once the dispatcher has gone away
    fn recv_command(&mut self) -> Result<Option<Command>>;

    fn send_reply(&mut self, reply: Reply) -> Result<()>;
}

/// Framed endpoint over a byte stream pair (stdin/stdout for slot processes)
pub struct StreamEndpoint<R: Read, W: Write> {
    reader: BufReader<R>,
    writer: BufWriter<W>,
}

impl<R: Read, W: Write> StreamEndpoint<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
        }
    }

    /// Recover the writer, e.g. to inspect what was sent
    pub fn into_writer(self) -> std::result::Result<W, std::io::Error> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}

impl<R: Read, W: Write> WorkerEndpoint for StreamEndpoint<R, W> {
    fn recv_command(&mut self) -> Result<Option<Command>> {
        read_frame(&mut self.reader)
    }

    fn send_reply(&mut self, reply: Reply) -> Result<()> {
        write_frame(&mut self.writer, &reply)
    }
}

/// Command loop around one environment
pub struct Worker<E: MultiAgentEnv> {
    env: E,
    slot: usize,
}

impl<E: MultiAgentEnv> Worker<E> {
    pub fn new(env: E, slot: usize) -> Self {
        Self { env, slot }
    }

    /// Serve commands until `Close`, end of stream, or a broken channel.
    ///
    /// A frame that cannot be decoded ends the loop with an error; the
    /// dispatcher then observes the channel as broken.
    pub fn run<P: WorkerEndpoint>(mut self, endpoint: &mut P) -> Result<()> {
        tracing::debug!(slot = self.slot, "Worker started");
        loop {
            let command = match endpoint.recv_command() {
                Ok(Some(command)) => command,
                Ok(None) => {
                    tracing::debug!(slot = self.slot, "Dispatcher hung up");
                    self.env.close();
                    return Ok(());
                }
                Err(e) => {
                    tracing::error!(slot = self.slot, error = %e, "Unreadable command, shutting down");
                    self.env.close();
                    return Err(e);
                }
            };

            match self.handle(command) {
                Some(reply) => endpoint.send_reply(reply)?,
                None => {
                    self.env.close();
                    tracing::debug!(slot = self.slot, "Worker closed");
                    return Ok(());
                }
            }
        }
    }

    /// Execute one command. `None` means the worker must exit without replying.
    fn handle(&mut self, command: Command) -> Option<Reply> {
        let reply = match command {
            Command::Step(actions) => match self.env.step(&actions) {
                Ok(step) => Reply::Step(step),
                Err(e) => Reply::Failed(e.to_string()),
            },
            Command::Reset { seed, options } => match self.env.reset(seed, &options) {
                Ok((obs, info)) => Reply::Reset(obs, info),
                Err(e) => Reply::Failed(e.to_string()),
            },
            Command::Render => Reply::Render(self.env.render()),
            Command::Close => return None,
            Command::GetSpaces => Reply::Spaces {
                observation: self.env.observation_space(),
                action: self.env.action_space(),
            },
            Command::EnvMethod { name, args, kwargs } => {
                value_reply(self.env.call_method(&name, &args, &kwargs))
            }
            Command::GetAttr(name) => value_reply(self.env.get_attr(&name)),
            Command::SetAttr(name, value) => value_reply(self.env.set_attr(&name, value)),
            Command::IsWrapped(marker) => Reply::Wrapped(self.env.is_wrapped(&marker)),
        };
        Some(reply)
    }
}

fn value_reply(result: Result<Value>) -> Reply {
    match result {
        Ok(value) => Reply::Value(value),
        Err(e) => Reply::Failed(e.to_string()),
    }
}

/// Entry point of a slot process: build the environment and serve stdin/stdout.
///
/// Nothing else may write to stdout in this process.
pub fn serve_stdio(registry: &EnvRegistry, spec: &EnvSpec, slot: usize) -> Result<()> {
    let env = registry.make(spec, slot)?;
    tracing::info!(slot, env = %spec.id, agents = spec.num_agents, "Serving slot");
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut endpoint = StreamEndpoint::new(stdin.lock(), stdout.lock());
    Worker::new(env, slot).run(&mut endpoint)
}
