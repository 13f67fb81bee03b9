use crate::config::Config;
use crate::http::{ParseState, Parser, Response};
use crate::router::Router;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(30);
// Connection tokens start here, listener tokens stay below.
const FIRST_CONNECTION: usize = 1024;

/// Single-threaded event loop; each request runs its gateway to completion
/// before the next one is looked at.
pub struct Server {
    poll: Poll,
    listeners: Vec<TcpListener>,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    router: Router,
}

struct Connection {
    socket: TcpStream,
    parser: Parser,
    response_buf: Vec<u8>,
    is_closing: bool,
    last_activity: Instant,
}

impl Connection {
    fn new(socket: TcpStream) -> Self {
        Connection {
            socket,
            parser: Parser::new(),
            response_buf: Vec::new(),
            is_closing: false,
            last_activity: Instant::now(),
        }
    }

    fn is_finished(&self, now: Instant) -> bool {
        (self.is_closing && self.response_buf.is_empty())
            || now.duration_since(self.last_activity) > TIMEOUT
    }

    fn read_requests(&mut self, router: &Router, buffer: &mut [u8]) {
        loop {
            match self.socket.read(buffer) {
                Ok(0) => {
                    self.is_closing = true;
                    return;
                }
                Ok(n) => {
                    self.parser.parse(&buffer[..n]);
                    match self.parser.state {
                        ParseState::Done => {
                            let response = router.handle(&self.parser.request);
                            self.response_buf.extend_from_slice(&response.to_bytes());
                            self.parser = Parser::new();
                        }
                        ParseState::Error => {
                            log::warn!("malformed request, closing connection");
                            self.response_buf
                                .extend_from_slice(&Response::new(400).to_bytes());
                            self.is_closing = true;
                            return;
                        }
                        _ => {}
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    log::debug!("read failed: {}", e);
                    self.is_closing = true;
                    return;
                }
            }
        }
    }

    fn flush(&mut self) {
        if self.response_buf.is_empty() {
            return;
        }
        match self.socket.write(&self.response_buf) {
            Ok(n) => {
                self.response_buf.drain(..n);
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => {
                log::debug!("write failed: {}", e);
                self.is_closing = true;
            }
        }
    }
}

impl Server {
    pub fn new(config: Config) -> io::Result<Self> {
        let poll = Poll::new()?;
        let mut listeners = Vec::new();

        for server_cfg in &config.servers {
            for port in &server_cfg.ports {
                let addr: SocketAddr = format!("{}:{}", server_cfg.host, port)
                    .parse()
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

                let mut listener = TcpListener::bind(addr)?;
                poll.registry()
                    .register(&mut listener, Token(listeners.len()), Interest::READABLE)?;
                listeners.push(listener);
                log::info!("listening on {}", addr);
            }
        }

        Ok(Server {
            poll,
            listeners,
            connections: HashMap::new(),
            next_token: FIRST_CONNECTION,
            router: Router::new(config),
        })
    }

    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(1024);
        let mut buffer = [0; 4096];

        loop {
            self.poll.poll(&mut events, Some(TIMEOUT))?;

            for event in events.iter() {
                let token = event.token();

                if token.0 < self.listeners.len() {
                    self.accept(token.0)?;
                } else if let Some(connection) = self.connections.get_mut(&token) {
                    connection.last_activity = Instant::now();
                    if event.is_readable() {
                        connection.read_requests(&self.router, &mut buffer);
                    }
                    // Edge-triggered: try the write right away instead of
                    // waiting for another writable event.
                    connection.flush();
                }
            }

            let now = Instant::now();
            self.connections.retain(|_, conn| !conn.is_finished(now));
        }
    }

    fn accept(&mut self, index: usize) -> io::Result<()> {
        loop {
            match self.listeners[index].accept() {
                Ok((mut socket, peer)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    self.poll.registry().register(
                        &mut socket,
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    )?;
                    log::debug!("accepted {}", peer);
                    self.connections.insert(token, Connection::new(socket));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}
