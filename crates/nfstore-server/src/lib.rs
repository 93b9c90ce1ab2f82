//! Reference orchestrator stub for the OSM package API used by nfstore.
//!
//! Routes:
//! - `POST   /package/onboard`  multipart upload with a `package` file field
//! - `DELETE /package/<id>`
//! - `POST   /vnsf/action`      JSON body with `"action": "set-policies"`
//! - `GET    /health`
//!
//! Uploaded packages are written to `{data_dir}/packages/{filename}`. Response
//! statuses and the id returned on onboarding are configurable at runtime so tests can
//! drive every acceptance and rejection path. Every request is recorded.
//!
//! The [`TestServer`] helper starts a stub on a random port for integration testing.

use mime::Mime;
use multipart::server::Multipart;
use serde::Serialize;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, error, info, warn};

/// How the stub answers each route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Behaviour {
    pub onboard_status: u16,
    /// Returned as `{"id": ...}` in the onboarding response when set.
    pub assigned_id: Option<String>,
    pub delete_status: u16,
    pub policy_status: u16,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            onboard_status: 202,
            assigned_id: None,
            delete_status: 200,
            policy_status: 200,
        }
    }
}

/// One request as seen by the stub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    /// File name of the uploaded `package` field, for onboarding requests.
    pub package: Option<String>,
    /// Parsed JSON body, for policy requests.
    pub payload: Option<serde_json::Value>,
}

pub struct Orchestrator {
    data_dir: PathBuf,
    behaviour: RwLock<Behaviour>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl Orchestrator {
    pub fn new(data_dir: PathBuf) -> Self {
        Self::with_behaviour(data_dir, Behaviour::default())
    }

    pub fn with_behaviour(data_dir: PathBuf, behaviour: Behaviour) -> Self {
        Self {
            data_dir,
            behaviour: RwLock::new(behaviour),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn behaviour(&self) -> Behaviour {
        self.behaviour
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_behaviour(&self, behaviour: Behaviour) {
        *self
            .behaviour
            .write()
            .unwrap_or_else(PoisonError::into_inner) = behaviour;
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, request: RecordedRequest) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.data_dir.join("packages")
    }

    fn store_package(&self, filename: &str, data: &[u8]) -> std::io::Result<()> {
        let dir = self.packages_dir();
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(filename), data)
    }
}

/// Extract the boundary parameter of a `multipart/form-data` content type.
pub fn multipart_boundary(content_type: &str) -> Option<String> {
    let mime: Mime = content_type.parse().ok()?;
    if mime.type_() != mime::MULTIPART || mime.subtype() != mime::FORM_DATA {
        return None;
    }
    mime.get_param(mime::BOUNDARY)
        .map(|b| b.as_str().to_owned())
        .filter(|b| !b.is_empty())
}

/// Read a `multipart/form-data` body and return the file name and content of the
/// field named exactly `field`. Other fields are skipped.
pub fn read_file_field<R: Read>(
    body: R,
    boundary: &str,
    field: &str,
) -> std::io::Result<Option<(String, Vec<u8>)>> {
    let mut form = Multipart::with_body(body, boundary);
    while let Some(mut entry) = form.read_entry()? {
        if &*entry.headers.name != field {
            continue;
        }
        let filename = entry.headers.filename.clone().unwrap_or_default();
        let mut data = Vec::new();
        entry.data.read_to_end(&mut data)?;
        return Ok(Some((filename, data)));
    }
    Ok(None)
}

fn header_value<'a>(req: &'a tiny_http::Request, name: &'static str) -> Option<&'a str> {
    req.headers()
        .iter()
        .find(|h| h.field.equiv(name))
        .map(|h| h.value.as_str())
}

fn respond(req: tiny_http::Request, code: u16, body: impl Into<Vec<u8>>) {
    let mut response = Response::from_data(body.into()).with_status_code(StatusCode(code));
    if let Ok(header) = Header::from_bytes("Content-Type", "application/json") {
        response = response.with_header(header);
    }
    if let Err(e) = req.respond(response) {
        warn!("failed to send response: {e}");
    }
}

fn read_body(req: &mut tiny_http::Request) -> Option<Vec<u8>> {
    let mut body = Vec::new();
    req.as_reader().read_to_end(&mut body).ok()?;
    Some(body)
}

fn handle_onboard(orchestrator: &Orchestrator, mut req: tiny_http::Request) {
    let boundary = header_value(&req, "Content-Type").and_then(multipart_boundary);
    let upload = match boundary {
        Some(boundary) => read_file_field(req.as_reader(), &boundary, "package")
            .unwrap_or_else(|e| {
                warn!("unreadable multipart body: {e}");
                None
            }),
        None => None,
    };
    let Some((filename, data)) = upload else {
        orchestrator.record(RecordedRequest {
            method: "POST".to_owned(),
            path: "/package/onboard".to_owned(),
            package: None,
            payload: None,
        });
        respond(req, 400, r#"{"error":"missing package field"}"#);
        return;
    };

    orchestrator.record(RecordedRequest {
        method: "POST".to_owned(),
        path: "/package/onboard".to_owned(),
        package: Some(filename.clone()),
        payload: None,
    });

    let behaviour = orchestrator.behaviour();
    if behaviour.onboard_status == 202 {
        let safe_name = Path::new(&filename)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("package.tar.gz");
        if let Err(e) = orchestrator.store_package(safe_name, &data) {
            error!("storing {safe_name}: {e}");
            respond(req, 500, format!(r#"{{"error":"write error: {e}"}}"#));
            return;
        }
        info!("onboarded package {safe_name}: {} bytes", data.len());
    }

    let body = match &behaviour.assigned_id {
        Some(id) => serde_json::json!({ "id": id }).to_string(),
        None => String::new(),
    };
    respond(req, behaviour.onboard_status, body);
}

fn handle_delete(orchestrator: &Orchestrator, req: tiny_http::Request, id: &str) {
    orchestrator.record(RecordedRequest {
        method: "DELETE".to_owned(),
        path: format!("/package/{id}"),
        package: None,
        payload: None,
    });
    let status = orchestrator.behaviour().delete_status;
    info!("DELETE package {id}: {status}");
    respond(req, status, "");
}

fn handle_action(orchestrator: &Orchestrator, mut req: tiny_http::Request) {
    let payload = read_body(&mut req)
        .and_then(|body| serde_json::from_slice::<serde_json::Value>(&body).ok());
    orchestrator.record(RecordedRequest {
        method: "POST".to_owned(),
        path: "/vnsf/action".to_owned(),
        package: None,
        payload: payload.clone(),
    });

    let is_policy = payload
        .as_ref()
        .and_then(|p| p.get("action"))
        .and_then(serde_json::Value::as_str)
        == Some("set-policies");
    if !is_policy {
        respond(req, 400, r#"{"error":"unsupported action"}"#);
        return;
    }
    respond(req, orchestrator.behaviour().policy_status, "");
}

/// Handle a single HTTP request, dispatching to the appropriate route handler.
pub fn handle_request(orchestrator: &Orchestrator, req: tiny_http::Request) {
    let method = req.method().clone();
    let url = req.url().to_owned();
    debug!("{method} {url}");

    match (&method, url.as_str()) {
        (Method::Post, "/package/onboard") => handle_onboard(orchestrator, req),
        (Method::Post, "/vnsf/action") => handle_action(orchestrator, req),
        (Method::Get, "/health") => respond(req, 200, r#"{"status":"ok"}"#),
        (Method::Delete, path) => match path.strip_prefix("/package/") {
            Some(id) if !id.is_empty() && !id.contains('/') => {
                handle_delete(orchestrator, req, id);
            }
            _ => respond(req, 404, r#"{"error":"not found"}"#),
        },
        _ => respond(req, 404, r#"{"error":"not found"}"#),
    }
}

/// Start the server loop, blocking the current thread.
pub fn run_server(orchestrator: &Arc<Orchestrator>, addr: &str) -> std::io::Result<()> {
    let server = Server::http(addr).map_err(std::io::Error::other)?;
    for request in server.incoming_requests() {
        handle_request(orchestrator, request);
    }
    Ok(())
}

/// A test helper that starts an orchestrator stub on a random port in a background thread.
///
/// Dropping the `TestServer` stops the server.
pub struct TestServer {
    pub url: String,
    pub port: u16,
    pub orchestrator: Arc<Orchestrator>,
    server: Arc<Server>,
    _handle: std::thread::JoinHandle<()>,
}

impl TestServer {
    /// Start a stub with default behaviour, storing uploads under `data_dir`.
    pub fn start(data_dir: PathBuf) -> Self {
        Self::start_with(data_dir, Behaviour::default())
    }

    pub fn start_with(data_dir: PathBuf, behaviour: Behaviour) -> Self {
        fs::create_dir_all(&data_dir).expect("failed to create test data dir");
        let server =
            Arc::new(Server::http("127.0.0.1:0").expect("failed to bind test HTTP server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let url = format!("http://127.0.0.1:{port}");

        let orchestrator = Arc::new(Orchestrator::with_behaviour(data_dir, behaviour));
        let srv = Arc::clone(&server);
        let orch = Arc::clone(&orchestrator);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                handle_request(&orch, request);
            }
        });

        Self {
            url,
            port,
            orchestrator,
            server,
            _handle: handle,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.orchestrator.requests()
    }

    /// Number of onboarding submissions received so far.
    pub fn onboard_count(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.path == "/package/onboard")
            .count()
    }

    pub fn set_behaviour(&self, behaviour: Behaviour) {
        self.orchestrator.set_behaviour(behaviour);
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(fields: &[(&str, Option<&str>, &[u8])]) -> (String, Vec<u8>) {
        let mut form = multipart::client::lazy::Multipart::new();
        for (name, filename, data) in fields {
            form.add_stream(*name, *data, *filename, None);
        }
        let mut prepared = form.prepare().unwrap();
        let mut body = Vec::new();
        prepared.read_to_end(&mut body).unwrap();
        (prepared.boundary().to_owned(), body)
    }

    #[test]
    fn boundary_is_extracted() {
        assert_eq!(
            multipart_boundary("multipart/form-data; boundary=abc123").as_deref(),
            Some("abc123")
        );
        assert_eq!(
            multipart_boundary("multipart/form-data; charset=utf-8; boundary=q").as_deref(),
            Some("q")
        );
        assert_eq!(multipart_boundary("application/json"), None);
        assert_eq!(multipart_boundary("multipart/form-data"), None);
    }

    #[test]
    fn file_field_is_found_among_others() {
        let (boundary, body) = form(&[
            ("note", None, b"hello"),
            ("package", Some("p.tar.gz"), b"\x1f\x8b\x00"),
        ]);
        let (name, data) = read_file_field(body.as_slice(), &boundary, "package")
            .unwrap()
            .unwrap();
        assert_eq!(name, "p.tar.gz");
        assert_eq!(data, b"\x1f\x8b\x00");
    }

    #[test]
    fn field_name_must_match_exactly() {
        let (boundary, body) = form(&[
            ("package_meta", Some("meta.json"), b"{}"),
            ("package", Some("real.tar.gz"), b"PKG"),
        ]);
        let (name, data) = read_file_field(body.as_slice(), &boundary, "package")
            .unwrap()
            .unwrap();
        assert_eq!(name, "real.tar.gz");
        assert_eq!(data, b"PKG");
    }

    #[test]
    fn form_without_field_is_none() {
        let (boundary, body) = form(&[("package_meta", Some("meta.json"), b"{}")]);
        assert!(read_file_field(body.as_slice(), &boundary, "package")
            .unwrap()
            .is_none());
    }

    #[test]
    fn default_behaviour_accepts_everything() {
        let b = Behaviour::default();
        assert_eq!(b.onboard_status, 202);
        assert_eq!(b.delete_status, 200);
        assert_eq!(b.policy_status, 200);
        assert!(b.assigned_id.is_none());
    }

    #[test]
    fn behaviour_can_be_swapped() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(dir.path().to_path_buf());
        orchestrator.set_behaviour(Behaviour {
            onboard_status: 500,
            ..Behaviour::default()
        });
        assert_eq!(orchestrator.behaviour().onboard_status, 500);
        assert!(orchestrator.requests().is_empty());
    }
}
