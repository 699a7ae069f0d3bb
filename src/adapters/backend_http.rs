//! Plain HTTP/1.1 client for the backend.
//!
//! Implements [`BackendHttp`] over `std::net::TcpStream`, which the
//! ESP-IDF newlib/lwIP port provides as well, so the same code runs on
//! device and host. One request per connection (`Connection: close`).

use core::net::Ipv4Addr;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use log::debug;

use crate::app::ports::{BackendHttp, PostError};
use crate::websocket::discovery::{PROBE_PATH, looks_like_backend};

const DATA_PATH: &str = "/api/data";
const POST_TIMEOUT_MS: u32 = 5_000;
const MAX_RESPONSE: usize = 1024;

#[derive(Default)]
pub struct TcpBackendHttp;

impl TcpBackendHttp {
    pub fn new() -> Self {
        Self
    }
}

fn exchange(ip: Ipv4Addr, port: u16, request: &[u8], timeout_ms: u32) -> std::io::Result<String> {
    let timeout = Duration::from_millis(timeout_ms.into());
    let addr = SocketAddr::from((ip, port));
    let mut stream = TcpStream::connect_timeout(&addr, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    stream.write_all(request)?;
    stream.flush()?;

    let mut buf = [0u8; MAX_RESPONSE];
    let mut len = 0;
    while len < buf.len() {
        match stream.read(&mut buf[len..]) {
            Ok(0) => break,
            Ok(n) => len += n,
            Err(e) if len > 0 && e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) if len > 0 && e.kind() == std::io::ErrorKind::TimedOut => break,
            Err(e) => return Err(e),
        }
    }
    Ok(String::from_utf8_lossy(&buf[..len]).into_owned())
}

/// Status code from `HTTP/1.1 200 OK`.
pub fn status_code(response: &str) -> Option<u16> {
    let line = response.lines().next()?;
    let mut parts = line.split_whitespace();
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

impl BackendHttp for TcpBackendHttp {
    fn probe(&mut self, ip: Ipv4Addr, port: u16, timeout_ms: u32) -> bool {
        let request = format!(
            "GET {PROBE_PATH} HTTP/1.1\r\nHost: {ip}:{port}\r\nConnection: close\r\n\r\n"
        );
        match exchange(ip, port, request.as_bytes(), timeout_ms) {
            Ok(response) => looks_like_backend(&response),
            Err(e) => {
                debug!("HTTP: probe {}:{} failed: {}", ip, port, e);
                false
            }
        }
    }

    fn post_data(&mut self, ip: Ipv4Addr, port: u16, body: &[u8]) -> Result<(), PostError> {
        let mut request = format!(
            "POST {DATA_PATH} HTTP/1.1\r\nHost: {ip}:{port}\r\n\
             Content-Type: application/octet-stream\r\nContent-Length: {}\r\n\
             Connection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        request.extend_from_slice(body);

        let response = exchange(ip, port, &request, POST_TIMEOUT_MS).map_err(|e| {
            debug!("HTTP: POST to {}:{} failed: {}", ip, port, e);
            PostError::Unreachable
        })?;
        match status_code(&response) {
            Some(code) if (200..300).contains(&code) => Ok(()),
            Some(code) => Err(PostError::Status(code)),
            None => Err(PostError::Unreachable),
        }
    }
}
