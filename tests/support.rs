use std::ffi::OsStr;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::process::{Command, Output};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

pub struct ServerHandle {
    shutdown: mpsc::Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _send_result = self.shutdown.send(());
        if let Some(handle) = self.thread.take() {
            drop(handle.join());
        }
    }
}

/// Canned reply of the mock HTTP server.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status_line: &'static str,
    pub body: &'static str,
    pub latency: Duration,
}

impl HttpReply {
    #[must_use]
    pub const fn ok(body: &'static str, latency: Duration) -> Self {
        Self {
            status_line: "200 OK",
            body,
            latency,
        }
    }

    #[must_use]
    pub const fn status(status_line: &'static str) -> Self {
        Self {
            status_line,
            body: "",
            latency: Duration::ZERO,
        }
    }
}

/// Spawn a keep-alive HTTP server answering every request with `reply`.
///
/// # Errors
///
/// Returns an error if the listener cannot be created or configured.
pub fn spawn_http_server(reply: HttpReply) -> Result<(String, ServerHandle), String> {
    let (addr, handle) = spawn_acceptor(move |stream| {
        let reply = reply.clone();
        thread::spawn(move || serve_http(stream, &reply));
    })?;
    Ok((format!("http://{}", addr), handle))
}

/// Spawn a TCP server echoing 4-byte big-endian length-prefixed frames.
///
/// # Errors
///
/// Returns an error if the listener cannot be created or configured.
pub fn spawn_echo_server() -> Result<(String, ServerHandle), String> {
    let (addr, handle) = spawn_acceptor(|stream| {
        thread::spawn(move || serve_echo(stream));
    })?;
    Ok((format!("tcp://{}", addr), handle))
}

fn spawn_acceptor<F>(on_accept: F) -> Result<(String, ServerHandle), String>
where
    F: Fn(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .map_err(|err| format!("bind test server failed: {}", err))?;
    let addr = listener
        .local_addr()
        .map_err(|err| format!("server addr failed: {}", err))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| format!("set_nonblocking failed: {}", err))?;

    let (shutdown_tx, shutdown_rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            match listener.accept() {
                Ok((stream, _)) => {
                    if stream.set_nonblocking(false).is_ok() {
                        on_accept(stream);
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(5));
                }
                Err(_) => break,
            }
        }
    });

    Ok((
        addr.to_string(),
        ServerHandle {
            shutdown: shutdown_tx,
            thread: Some(handle),
        },
    ))
}

fn serve_http(mut stream: TcpStream, reply: &HttpReply) {
    let mut pending: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let Some(header_end) = find_header_end(&pending) else {
            match stream.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(read) => {
                    pending.extend_from_slice(chunk.get(..read).unwrap_or_default());
                    continue;
                }
            }
        };
        let body_len = content_length(pending.get(..header_end).unwrap_or_default());
        let total = header_end + body_len;
        while pending.len() < total {
            match stream.read(&mut chunk) {
                Ok(0) | Err(_) => return,
                Ok(read) => pending.extend_from_slice(chunk.get(..read).unwrap_or_default()),
            }
        }
        pending.drain(..total);

        if !reply.latency.is_zero() {
            thread::sleep(reply.latency);
        }
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            reply.status_line,
            reply.body.len(),
            reply.body
        );
        if stream.write_all(response.as_bytes()).is_err() || stream.flush().is_err() {
            break;
        }
    }
    drop(stream.shutdown(Shutdown::Both));
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

fn content_length(head: &[u8]) -> usize {
    String::from_utf8_lossy(head)
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.trim().eq_ignore_ascii_case("content-length") {
                value.trim().parse().ok()
            } else {
                None
            }
        })
        .unwrap_or(0)
}

fn serve_echo(mut stream: TcpStream) {
    loop {
        let mut prefix = [0u8; 4];
        if stream.read_exact(&mut prefix).is_err() {
            break;
        }
        let len = u32::from_be_bytes(prefix) as usize;
        let mut payload = vec![0u8; len];
        if stream.read_exact(&mut payload).is_err() {
            break;
        }
        if stream.write_all(&prefix).is_err() || stream.write_all(&payload).is_err() {
            break;
        }
    }
    drop(stream.shutdown(Shutdown::Both));
}

/// Builds a multi-thread runtime and drives `future` on it.
///
/// # Errors
///
/// Returns an error if the runtime cannot be built or the future fails.
pub fn run_async_test<F>(future: F) -> Result<(), String>
where
    F: std::future::Future<Output = Result<(), String>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .map_err(|err| format!("Failed to build runtime: {}", err))?;
    runtime.block_on(future)
}

/// Run the `loadrig` binary and capture output.
///
/// # Errors
///
/// Returns an error if the binary cannot be executed.
pub fn run_loadrig<I, S>(args: I) -> Result<Output, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let bin = loadrig_bin()?;
    Command::new(bin)
        .args(args)
        .env("LOADRIG_LOG", "error")
        .env_remove("LOADRIG_OPTIONS")
        .output()
        .map_err(|err| format!("run loadrig failed: {}", err))
}

fn loadrig_bin() -> Result<String, String> {
    option_env!("CARGO_BIN_EXE_loadrig").map_or_else(
        || Err("CARGO_BIN_EXE_loadrig missing at compile time.".to_owned()),
        |path| Ok(path.to_owned()),
    )
}
