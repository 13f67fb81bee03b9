use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    GET,
    HEAD,
    POST,
    OTHER(String),
}

impl From<&str> for Method {
    fn from(s: &str) -> Self {
        match s {
            "GET" => Method::GET,
            "HEAD" => Method::HEAD,
            "POST" => Method::POST,
            _ => Method::OTHER(s.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct Request {
    pub method: Method,
    /// Request target exactly as sent, query included.
    pub target: String,
    pub path: String,
    pub query: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new() -> Self {
        Request {
            method: Method::GET,
            target: String::new(),
            path: String::new(),
            query: String::new(),
            version: String::new(),
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Header lookup ignoring the case of `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn set_target(&mut self, target: &str) {
        self.target = target.to_string();
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        self.path = path.to_string();
        self.query = query.to_string();
    }
}

#[derive(Debug, PartialEq)]
pub enum ParseState {
    RequestLine,
    Headers,
    Body,
    Done,
    Error,
}

/// Incremental request parser fed straight from the socket.
pub struct Parser {
    pub state: ParseState,
    pub request: Request,
    buffer: Vec<u8>,
    content_length: usize,
}

impl Parser {
    pub fn new() -> Self {
        Parser {
            state: ParseState::RequestLine,
            request: Request::new(),
            buffer: Vec::new(),
            content_length: 0,
        }
    }

    pub fn parse(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        loop {
            match self.state {
                ParseState::RequestLine => {
                    let Some(line) = self.take_line() else { break };
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    match parts.as_slice() {
                        [method, target, version] => {
                            self.request.method = Method::from(*method);
                            self.request.set_target(target);
                            self.request.version = version.to_string();
                            self.state = ParseState::Headers;
                        }
                        _ => self.state = ParseState::Error,
                    }
                }
                ParseState::Headers => {
                    let Some(line) = self.take_line() else { break };
                    if line.is_empty() {
                        self.state = self.body_state();
                    } else if let Some((key, value)) = line.split_once(':') {
                        self.request
                            .headers
                            .insert(key.trim().to_string(), value.trim().to_string());
                    }
                }
                ParseState::Body => {
                    if self.buffer.len() < self.content_length {
                        break;
                    }
                    self.request.body = self.buffer.drain(..self.content_length).collect();
                    self.state = ParseState::Done;
                }
                ParseState::Done | ParseState::Error => break,
            }
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let pos = self.buffer.windows(2).position(|w| w == b"\r\n")?;
        let line = String::from_utf8_lossy(&self.buffer[..pos]).into_owned();
        self.buffer.drain(..pos + 2);
        Some(line)
    }

    // Chunked uploads are never needed by the gateway and are refused.
    fn body_state(&mut self) -> ParseState {
        if self.request.header("Transfer-Encoding").is_some() {
            return ParseState::Error;
        }
        match self.request.header("Content-Length").map(str::parse::<usize>) {
            None | Some(Ok(0)) => ParseState::Done,
            Some(Ok(len)) => {
                self.content_length = len;
                ParseState::Body
            }
            Some(Err(_)) => ParseState::Error,
        }
    }
}

pub struct Response {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status_code: u16) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Server".to_string(), "cgi-gateway/0.1.0".to_string());
        Response {
            status_code,
            headers,
            body: Vec::new(),
        }
    }

    pub fn set_body(&mut self, body: Vec<u8>, content_type: &str) {
        self.body = body;
        self.headers.insert("Content-Type".to_string(), content_type.to_string());
        self.headers.insert("Content-Length".to_string(), self.body.len().to_string());
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let status_text = match self.status_code {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            500 => "Internal Server Error",
            _ => "Unknown",
        };

        let mut resp = format!("HTTP/1.1 {} {}\r\n", self.status_code, status_text).into_bytes();
        for (key, value) in &self.headers {
            resp.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
        }
        resp.extend_from_slice(b"\r\n");
        resp.extend_from_slice(&self.body);
        resp
    }
}
