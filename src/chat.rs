//! Chat reactor (C6, spec §4.6): line-buffered stdin sent as envelope
//! messages, received messages printed to stdout.

use std::collections::VecDeque;
use std::io::Read;
use std::os::unix::io::AsRawFd;

use crate::config::ChatArgs;
use crate::envelope::{Envelope, Socket};
use crate::error::Result;
use crate::reactor::{ReactorCore, ReadyFlags};

/// Every chat instance shares this target by default (`ChatArgs::host`'s
/// default) — sending here is effectively a broadcast to the chat room.
const CHAT_ROOM: &str = "chat";

pub struct ChatReactor {
    socket: Socket,
    stdin: std::io::Stdin,
    username: String,
    line: VecDeque<u8>,
    buf: Vec<u8>,
    eof: bool,
}

impl ChatReactor {
    pub fn new(ctx: &zmq::Context, args: &ChatArgs) -> Result<Self> {
        let socket = Socket::connect(ctx, args.host.clone(), &args.client_url)?;
        log::info!("using username \"{}\"", args.username);
        Ok(Self {
            socket,
            stdin: std::io::stdin(),
            username: args.username.clone(),
            line: VecDeque::new(),
            buf: Vec::with_capacity(200),
            eof: false,
        })
    }

    fn stdin_read(&mut self) -> Result<()> {
        self.buf.resize(4096, 0);
        match self.stdin.lock().read(&mut self.buf) {
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
            if envelope.command == "message" {
                println!("[{}] {}", envelope.session, message);
            } else {
                println!("[{}] <{}>", envelope.session, envelope.command);
            }
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
            let line = &line[..line.len() - 1]; // drop the newline itself
            let envelope = Envelope::new(CHAT_ROOM, self.username.clone(), "message");
            self.socket.send(&envelope, line)?;
        }
        Ok(())
    }
}

impl crate::reactor::Reactor for ChatReactor {
    fn poll_items(&self) -> Vec<zmq::PollItem<'_>> {
        let mut items = Vec::with_capacity(2);
        if !self.eof {
            items.push(zmq::PollItem::from_fd(std::io::stdin().as_raw_fd(), zmq::POLLIN));
        } else {
            items.push(zmq::PollItem::from_fd(std::io::stdin().as_raw_fd(), 0));
        }
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

    /// Spec §4.6: "the reactor requests exit once the line buffer empties"
    /// — independent of any signal, once stdin has hit EOF.
    fn wants_exit(&self) -> bool {
        self.eof && self.line.is_empty()
    }
}

pub fn run(ctx: zmq::Context, args: &ChatArgs) -> Result<bool> {
    args.validate()?;
    let mut core = ReactorCore::new(&ctx)?;
    let mut reactor = ChatReactor::new(&ctx, args)?;
    core.run(&mut reactor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_reactor_line_state(initial: &[u8], eof: bool) -> (VecDeque<u8>, bool) {
        (initial.iter().copied().collect(), eof)
    }

    #[test]
    fn partial_line_flushed_with_implicit_newline_at_eof() {
        let (mut line, eof) = make_reactor_line_state(b"hello", true);
        assert!(eof);
        if eof && !line.is_empty() {
            line.push_back(b'\n');
        }
        assert_eq!(line.iter().copied().collect::<Vec<u8>>(), b"hello\n".to_vec());
    }
}
