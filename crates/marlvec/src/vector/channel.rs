//! Request/reply transports between the dispatcher and one worker.

use super::protocol::{read_frame, write_frame, Command, Reply};
use super::worker::{Worker, WorkerEndpoint};
use crate::env::MultiAgentEnv;
use crate::{MarlError, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Stdio};
use std::thread::JoinHandle;

/// Dispatcher end of a duplex channel to one slot.
///
/// Callers must alternate `send` and `recv`; a second command is never sent
/// before the reply to the first has been received.
pub trait Channel: Send {
    /// Slot index served by this channel
    fn slot(&self) -> usize;

    fn send(&mut self, command: Command) -> Result<()>;

    /// Block until the worker replies
    fn recv(&mut self) -> Result<Reply>;

    /// Wait for the worker to exit after `Close`
    fn join(&mut self) -> Result<()>;

    /// Stop the worker without waiting for outstanding replies
    fn kill(&mut self);
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn slot(&self) -> usize {
        (**self).slot()
    }

    fn send(&mut self, command: Command) -> Result<()> {
        (**self).send(command)
    }

    fn recv(&mut self) -> Result<Reply> {
        (**self).recv()
    }

    fn join(&mut self) -> Result<()> {
        (**self).join()
    }

    fn kill(&mut self) {
        (**self).kill()
    }
}

fn broken(slot: usize, message: impl std::fmt::Display) -> MarlError {
    MarlError::Channel {
        slot,
        message: message.to_string(),
    }
}

/// Channel to a worker running in its own OS process.
///
/// Frames travel over the child's stdin/stdout; the child's stderr is
/// inherited so its log lines reach the parent's terminal.
pub struct ProcessChannel {
    slot: usize,
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stdout: BufReader<ChildStdout>,
    joined: bool,
}

impl ProcessChannel {
    /// Launch `program args...` as the worker for `slot`
    pub fn spawn<S: AsRef<std::ffi::OsStr>>(slot: usize, program: &Path, args: &[S]) -> Result<Self> {
        let mut child = std::process::Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| broken(slot, format!("cannot launch {}: {}", program.display(), e)))?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(broken(slot, "worker pipes were not captured"));
            }
        };
        tracing::debug!(slot, pid = child.id(), "Spawned worker process");

        Ok(Self {
            slot,
            child,
            stdin: Some(BufWriter::new(stdin)),
            stdout: BufReader::new(stdout),
            joined: false,
        })
    }

    /// OS process id of the worker
    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

impl Channel for ProcessChannel {
    fn slot(&self) -> usize {
        self.slot
    }

    fn send(&mut self, command: Command) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| broken(self.slot, "channel already closed"))?;
        write_frame(stdin, &command).map_err(|e| broken(self.slot, e))
    }

    fn recv(&mut self) -> Result<Reply> {
        match read_frame(&mut self.stdout) {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(broken(self.slot, "worker exited")),
            Err(e) => Err(broken(self.slot, e)),
        }
    }

    fn join(&mut self) -> Result<()> {
        if self.joined {
            return Ok(());
        }
        // closing stdin lets a worker that missed `Close` exit on end of stream
        self.stdin.take();
        let status = self.child.wait().map_err(|e| broken(self.slot, e))?;
        self.joined = true;
        if status.success() {
            Ok(())
        } else {
            Err(broken(self.slot, format!("worker exited with {}", status)))
        }
    }

    fn kill(&mut self) {
        if self.joined {
            return;
        }
        self.stdin.take();
        if let Err(e) = self.child.kill() {
            tracing::debug!(slot = self.slot, error = %e, "Kill failed, worker already gone");
        }
        let _ = self.child.wait();
        self.joined = true;
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        if !self.joined {
            if let Ok(None) = self.child.try_wait() {
                tracing::warn!(slot = self.slot, "Worker process still running on drop, killing");
            }
            self.kill();
        }
    }
}

/// Worker end of a `ThreadChannel`
struct ThreadEndpoint {
    slot: usize,
    commands: Receiver<Command>,
    replies: Sender<Reply>,
}

impl WorkerEndpoint for ThreadEndpoint {
    fn recv_command(&mut self) -> Result<Option<Command>> {
        Ok(self.commands.recv().ok())
    }

    fn send_reply(&mut self, reply: Reply) -> Result<()> {
        self.replies
            .send(reply)
            .map_err(|_| broken(self.slot, "dispatcher dropped the reply pipe"))
    }
}

/// Channel to a worker running on a dedicated thread of this process.
///
/// Same protocol as `ProcessChannel` without serialization or isolation;
/// meant for debugging and tests.
pub struct ThreadChannel {
    slot: usize,
    commands: Option<Sender<Command>>,
    replies: Receiver<Reply>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl ThreadChannel {
    /// Start a worker thread that builds its environment with `make_env`
    pub fn spawn<F>(slot: usize, make_env: F) -> Result<Self>
    where
        F: FnOnce() -> Result<Box<dyn MultiAgentEnv>> + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = bounded(1);
        let (reply_tx, reply_rx) = bounded(1);

        let handle = std::thread::Builder::new()
            .name(format!("marlvec-slot-{}", slot))
            .spawn(move || {
                let env = match make_env() {
                    Ok(env) => env,
                    Err(e) => {
                        tracing::error!(slot, error = %e, "Failed to build environment");
                        return Err(e);
                    }
                };
                let mut endpoint = ThreadEndpoint {
                    slot,
                    commands: cmd_rx,
                    replies: reply_tx,
                };
                Worker::new(env, slot).run(&mut endpoint)
            })?;

        Ok(Self {
            slot,
            commands: Some(cmd_tx),
            replies: reply_rx,
            handle: Some(handle),
        })
    }
}

impl Channel for ThreadChannel {
    fn slot(&self) -> usize {
        self.slot
    }

    fn send(&mut self, command: Command) -> Result<()> {
        let commands = self
            .commands
            .as_ref()
            .ok_or_else(|| broken(self.slot, "channel already closed"))?;
        commands
            .send(command)
            .map_err(|_| broken(self.slot, "worker exited"))
    }

    fn recv(&mut self) -> Result<Reply> {
        self.replies
            .recv()
            .map_err(|_| broken(self.slot, "worker exited"))
    }

    fn join(&mut self) -> Result<()> {
        self.commands.take();
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result.map_err(|e| broken(self.slot, e)),
                Err(_) => Err(broken(self.slot, "worker thread panicked")),
            },
            None => Ok(()),
        }
    }

    fn kill(&mut self) {
        // threads cannot be interrupted; the worker exits at its next receive
        self.commands.take();
        self.handle.take();
    }
}

impl Drop for ThreadChannel {
    fn drop(&mut self) {
        self.commands.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Value;
    use crate::testing::Counter;

    fn counter(slot: usize, agents: usize) -> ThreadChannel {
        ThreadChannel::spawn(slot, move || Ok(Box::new(Counter::new(agents)) as Box<dyn MultiAgentEnv>))
            .unwrap()
    }

    #[test]
    fn test_thread_channel_request_reply() {
        let mut channel = counter(4, 2);
        assert_eq!(channel.slot(), 4);

        channel.send(Command::GetAttr("ticks".into())).unwrap();
        assert_eq!(channel.recv().unwrap(), Reply::Value(Value::Int(0)));

        channel.send(Command::Close).unwrap();
        channel.join().unwrap();
        assert!(channel.send(Command::Render).is_err());
    }

    #[test]
    fn test_thread_channel_reports_failed_build_on_recv() {
        let mut channel =
            ThreadChannel::spawn(0, || Err(MarlError::EnvError("boom".into()))).unwrap();
        // the command may or may not be accepted before the thread exits
        let _ = channel.send(Command::GetSpaces);
        assert!(matches!(channel.recv(), Err(MarlError::Channel { slot: 0, .. })));
        assert!(channel.join().is_err());
    }

    #[test]
    fn test_join_without_close_ends_on_hangup() {
        let mut channel = counter(1, 1);
        channel.join().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_process_channel_eof_is_channel_error() {
        let mut channel = ProcessChannel::spawn::<&str>(2, Path::new("true"), &[]).unwrap();
        let err = channel.recv().unwrap_err();
        assert!(matches!(err, MarlError::Channel { slot: 2, .. }));
        channel.join().unwrap();
        // second join is a no-op
        channel.join().unwrap();
    }

    #[test]
    fn test_process_channel_missing_program() {
        let err = ProcessChannel::spawn::<&str>(0, Path::new("/nonexistent/marlvec-worker"), &[])
            .err()
            .unwrap();
        assert!(matches!(err, MarlError::Channel { slot: 0, .. }));
    }
}
