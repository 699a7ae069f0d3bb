//! ESP-IDF HTTP server front for the API handlers.
//!
//! One wildcard handler per method collects the body, locks the
//! orchestrator and hands the request to
//! [`ProtocolOrchestrator::handle_http`].

use std::sync::{Arc, Mutex, PoisonError};

use esp_idf_svc::http::Method as SvcMethod;
use esp_idf_svc::http::server::{Configuration, EspHttpConnection, EspHttpServer, Request};
use esp_idf_svc::io::{EspIOError, Read, Write};
use log::{info, warn};

use crate::adapters::time::SystemClock;
use crate::app::ports::Clock;
use crate::orchestrator::http::{HttpRequest, HttpResponse, Method};
use crate::orchestrator::{HTTP_PORT, ProtocolOrchestrator};
use crate::protocol::codec::MAX_PAYLOAD_SIZE;

/// Largest body read from the socket; a full frame plus its prefix.
const MAX_BODY: usize = MAX_PAYLOAD_SIZE + 16;

pub type SharedOrchestrator = Arc<Mutex<ProtocolOrchestrator>>;

fn serve(
    mut req: Request<&mut EspHttpConnection<'_>>,
    method: Method,
    orch: &SharedOrchestrator,
    clock: &SystemClock,
) -> Result<(), EspIOError> {
    let path = req.uri().to_owned();
    let mut body = Vec::new();
    let mut buf = [0u8; 512];
    let mut overflow = false;
    loop {
        let n = req.read(&mut buf)?;
        if n == 0 {
            break;
        }
        if body.len() + n > MAX_BODY {
            overflow = true;
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }

    let response = if overflow {
        warn!("HTTP: {} body too large", path);
        HttpResponse::error(413, "Request body too large")
    } else {
        let request = HttpRequest { method, path, body };
        let mut guard = orch.lock().unwrap_or_else(PoisonError::into_inner);
        guard.handle_http(&request, clock.now_ms())
    };

    let mut resp = req.into_response(
        response.status,
        None,
        &[("Content-Type", "application/json")],
    )?;
    resp.write_all(response.body.as_bytes())?;
    Ok(())
}

/// Start the API server. Dropping the returned server stops it.
pub fn start(orch: SharedOrchestrator, clock: SystemClock) -> anyhow::Result<EspHttpServer<'static>> {
    let mut server = EspHttpServer::new(&Configuration {
        http_port: HTTP_PORT,
        uri_match_wildcard: true,
        stack_size: 8 * 1024,
        ..Default::default()
    })?;

    for (svc, method) in [
        (SvcMethod::Get, Method::Get),
        (SvcMethod::Post, Method::Post),
        (SvcMethod::Delete, Method::Delete),
    ] {
        let orch = orch.clone();
        server.fn_handler("/*", svc, move |req| serve(req, method, &orch, &clock))?;
    }

    info!("HTTP: API listening on port {}", HTTP_PORT);
    Ok(server)
}
