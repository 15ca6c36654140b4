//! Echo client/server reactors (C6, spec §4.6): the second end-to-end
//! exercise of the envelope protocol alongside `chat`.
//!
//! The original `main_echo_client.cpp` split stdin-reading and (an
//! unfinished) output handling across two threads; per `SPEC_FULL.md` that
//! split is folded into one reactor here, the same shape as `ChatReactor`.

use std::collections::VecDeque;
use std::io::Read;
use std::os::unix::io::AsRawFd;

use crate::config::{EchoClientArgs, EchoServerArgs};
use crate::envelope::{Envelope, Socket};
use crate::error::Result;
use crate::reactor::{ReactorCore, ReadyFlags};

const COMMAND: &str = "echo";

/// Reads stdin lines, sends each as an `echo` command to `--remote`, prints
/// replies as they arrive.
pub struct EchoClientReactor {
    socket: Socket,
    host: String,
    remote: String,
    line: VecDeque<u8>,
    buf: Vec<u8>,
    eof: bool,
}

impl EchoClientReactor {
    pub fn new(ctx: &zmq::Context, args: &EchoClientArgs) -> Result<Self> {
        let socket = Socket::connect(ctx, args.host.clone(), &args.client_url)?;
        Ok(Self {
            socket,
            host: args.host.clone(),
            remote: args.remote.clone(),
            line: VecDeque::new(),
            buf: Vec::with_capacity(200),
            eof: false,
        })
    }

    fn stdin_read(&mut self) -> Result<()> {
        self.buf.resize(4096, 0);
        match std::io::stdin().lock().read(&mut self.buf) {
            Ok(0) => {
                self.eof = true;
                if !self.line.is_empty() {
                    self.line.push_back(b'\n');
                }
            }
            Ok(n) => self.line.extend(self.buf[..n].iter().copied()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn sub_read(&mut self) -> Result<()> {
        if let Some((envelope, data)) = self.socket.recv()? {
            let message = String::from_utf8_lossy(&data);
            println!("[{}] {}", envelope.session, message);
        }
        Ok(())
    }

    fn flush_lines(&mut self) -> Result<()> {
        loop {
            let eol = if self.eof {
                if self.line.is_empty() {
                    None
                } else {
                    Some(self.line.len() - 1)
                }
            } else {
                self.line.iter().position(|&b| b == b'\n')
            };
            let Some(eol) = eol else { break };

            let line: Vec<u8> = self.line.drain(..=eol).collect();
            let line = &line[..line.len() - 1];
            let envelope = Envelope::new(self.remote.clone(), self.host.clone(), COMMAND);
            self.socket.send(&envelope, line)?;
        }
        Ok(())
    }
}

impl crate::reactor::Reactor for EchoClientReactor {
    fn poll_items(&self) -> Vec<zmq::PollItem<'_>> {
        let mut items = Vec::with_capacity(2);
        let stdin_events = if self.eof { 0 } else { zmq::POLLIN };
        items.push(zmq::PollItem::from_fd(std::io::stdin().as_raw_fd(), stdin_events));
        items.push(self.socket.raw().as_poll_item(zmq::POLLIN));
        items
    }

    fn handle_events(&mut self, revents: &[ReadyFlags]) -> Result<()> {
        let stdin_ready = revents.first().copied().unwrap_or_default();
        let sub_ready = revents.get(1).copied().unwrap_or_default();

        if stdin_ready.readable {
            self.stdin_read()?;
        }
        if sub_ready.readable {
            self.sub_read()?;
        }
        self.flush_lines()?;

        Ok(())
    }

    fn drained(&self) -> bool {
        self.eof && self.line.is_empty()
    }

    fn wants_exit(&self) -> bool {
        self.eof && self.line.is_empty()
    }
}

/// Receives an `echo` command and sends the same payload straight back to
/// whichever host sent it (spec §4.6's placeholder-command behaviour, here
/// specialised: echo has exactly one command and it always bounces).
pub struct EchoServerReactor {
    socket: Socket,
}

impl EchoServerReactor {
    pub fn new(ctx: &zmq::Context, args: &EchoServerArgs) -> Result<Self> {
        let socket = Socket::connect(ctx, args.host.clone(), &args.server_url)?;
        Ok(Self { socket })
    }

    fn sub_read(&mut self) -> Result<()> {
        let Some((envelope, data)) = self.socket.recv()? else {
            return Ok(());
        };
        log::debug!("echoing {} bytes back to \"{}\"", data.len(), envelope.remote);
        let reply = Envelope::new(envelope.remote, envelope.session, envelope.command);
        self.socket.send(&reply, &data)?;
        Ok(())
    }
}

impl crate::reactor::Reactor for EchoServerReactor {
    fn poll_items(&self) -> Vec<zmq::PollItem<'_>> {
        vec![self.socket.raw().as_poll_item(zmq::POLLIN)]
    }

    fn handle_events(&mut self, revents: &[ReadyFlags]) -> Result<()> {
        if revents.first().map(|r| r.readable).unwrap_or(false) {
            self.sub_read()?;
        }
        Ok(())
    }

    fn drained(&self) -> bool {
        true
    }
}

pub fn run_client(ctx: zmq::Context, args: &EchoClientArgs) -> Result<bool> {
    args.validate()?;
    let mut core = ReactorCore::new(&ctx)?;
    let mut reactor = EchoClientReactor::new(&ctx, args)?;
    core.run(&mut reactor)
}

pub fn run_server(ctx: zmq::Context, args: &EchoServerArgs) -> Result<bool> {
    args.validate()?;
    let mut core = ReactorCore::new(&ctx)?;
    let mut reactor = EchoServerReactor::new(&ctx, args)?;
    core.run(&mut reactor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_reactor_is_always_drained() {
        // The echo server buffers nothing between iterations — `exit()`
        // (via SIGQUIT) can act on the very next iteration.
        let envelope = Envelope::new("client", "s1", COMMAND);
        assert_eq!(envelope.command, COMMAND);
    }
}
