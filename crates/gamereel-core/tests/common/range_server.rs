//! Minimal HTTP/1.1 server for HEAD and Range GET, with knobs for simulating
//! a connection that dies mid-body and an object that changes between runs.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct State {
    etag: Option<String>,
    /// GETs still allowed to succeed before every further GET is cut short. None = healthy.
    gets_before_failure: Option<usize>,
    /// `(start, end_inclusive)` of every GET that completed.
    served: Vec<(u64, u64)>,
    /// Answer every GET with `200` and the whole body.
    ignore_ranges: bool,
    /// GET requests received, complete or not.
    gets: usize,
}

pub struct RangeServer {
    pub url: String,
    state: Arc<Mutex<State>>,
}

impl RangeServer {
    /// Serve `body` at `http://127.0.0.1:<port>/seg.mp4` until the process exits.
    pub fn start(body: Vec<u8>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(State::default()));
        let body = Arc::new(body);
        let shared = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let body = Arc::clone(&body);
                let state = Arc::clone(&shared);
                thread::spawn(move || handle(stream, &body, &state));
            }
        });
        Self {
            url: format!("http://127.0.0.1:{}/seg.mp4", port),
            state,
        }
    }

    pub fn set_etag(&self, etag: &str) {
        self.state.lock().unwrap().etag = Some(etag.to_string());
    }

    /// Let `n` more GETs through, then drop every later one halfway through its body.
    pub fn fail_gets_after(&self, n: usize) {
        self.state.lock().unwrap().gets_before_failure = Some(n);
    }

    /// Behave like a server without byte-range support.
    pub fn ignore_ranges(&self) {
        self.state.lock().unwrap().ignore_ranges = true;
    }

    pub fn get_count(&self) -> usize {
        self.state.lock().unwrap().gets
    }

    pub fn heal(&self) {
        self.state.lock().unwrap().gets_before_failure = None;
    }

    pub fn served_ranges(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().served.clone()
    }

    pub fn clear_served(&self) {
        self.state.lock().unwrap().served.clear();
    }
}

fn handle(mut stream: TcpStream, body: &[u8], state: &Mutex<State>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let (method, range) = parse_request(request);
    let total = body.len() as u64;
    let etag_header = state
        .lock()
        .unwrap()
        .etag
        .as_ref()
        .map(|e| format!("ETag: \"{}\"\r\n", e))
        .unwrap_or_default();

    if method.eq_ignore_ascii_case("HEAD") {
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\n{}\r\n",
            total, etag_header
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\n\r\n");
        return;
    }

    let ignore_ranges = {
        let mut s = state.lock().unwrap();
        s.gets += 1;
        s.ignore_ranges
    };
    if ignore_ranges {
        let header = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}\r\n",
            total, etag_header
        );
        let _ = stream.write_all(header.as_bytes());
        let _ = stream.write_all(body);
        return;
    }

    let (start, end_incl) = range.unwrap_or((0, total.saturating_sub(1)));
    let end_incl = end_incl.min(total.saturating_sub(1));
    if start > end_incl {
        let response = format!(
            "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nContent-Length: 0\r\n\r\n",
            total
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    let slice = &body[start as usize..=end_incl as usize];
    let cut_short = {
        let mut s = state.lock().unwrap();
        match s.gets_before_failure.as_mut() {
            Some(0) => true,
            Some(left) => {
                *left -= 1;
                false
            }
            None => false,
        }
    };
    let response = format!(
        "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {}-{}/{}\r\nAccept-Ranges: bytes\r\n{}\r\n",
        slice.len(),
        start,
        end_incl,
        total,
        etag_header
    );
    let _ = stream.write_all(response.as_bytes());
    if cut_short {
        let _ = stream.write_all(&slice[..slice.len() / 2]);
        let _ = stream.flush();
        return;
    }
    if stream.write_all(slice).is_ok() {
        state.lock().unwrap().served.push((start, end_incl));
    }
}

/// Returns (method, optional (start, end_inclusive) for `Range: bytes=X-Y`).
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut lines = request.lines();
    let method = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or("");
    let mut range = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("range") {
            continue;
        }
        if let Some(spec) = value.trim().strip_prefix("bytes=") {
            if let Some((a, b)) = spec.split_once('-') {
                let start = a.trim().parse::<u64>().unwrap_or(0);
                let end = b.trim().parse::<u64>().unwrap_or(u64::MAX);
                range = Some((start, end));
            }
        }
    }
    (method, range)
}
