use super::request::{self, Parse, Request};
use super::response::{self, Status};
use crate::auth::{CredentialStore, Verdict};
use crate::handler::{Handler, Outcome};
use crate::utils::Buffer;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Serves static files from a document root and handles the login and
/// registration forms.
pub struct HttpHandler {
    root: Arc<PathBuf>,
    store: Arc<dyn CredentialStore>,
    peer: Option<SocketAddr>,
}

impl HttpHandler {
    pub fn new(root: Arc<PathBuf>, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            root,
            store,
            peer: None,
        }
    }

    /// Returns a factory building one handler per accepted client.
    pub fn factory(
        root: impl Into<PathBuf>,
        store: Arc<dyn CredentialStore>,
    ) -> impl Fn(SocketAddr) -> HttpHandler + Send + Sync + 'static {
        let root = Arc::new(root.into());

        move |peer| HttpHandler {
            root: root.clone(),
            store: store.clone(),
            peer: Some(peer),
        }
    }

    /// Rewrites the form targets to the page matching the credential check.
    fn route(&self, request: &mut Request) -> Verdict {
        let is_login = match request.path.as_str() {
            "/login.html" => true,
            "/register.html" => false,
            _ => return Verdict::Denied,
        };

        let form = request.form();
        let username = form.get("username").map_or("", String::as_str);
        let password = form.get("password").map_or("", String::as_str);

        let verdict = if is_login {
            self.store.login(username, password)
        } else {
            self.store.register(username, password)
        };

        info!(user = username, login = is_login, ?verdict, "credential check");

        request.path = if verdict.is_success() {
            "/welcome.html".to_string()
        } else {
            "/error.html".to_string()
        };

        verdict
    }
}

impl Handler for HttpHandler {
    fn handle(&mut self, input: &mut Buffer, output: &mut Buffer) -> Outcome {
        let (path, status, keep_alive) = match request::parse(input) {
            Parse::Incomplete => return Outcome::Incomplete,
            Parse::Invalid => {
                debug!(peer = ?self.peer, "malformed request");
                input.retrieve_all();
                ("/400.html".to_string(), Some(Status::BadRequest), false)
            }
            Parse::Complete(mut request) => {
                if request.method == "POST" {
                    self.route(&mut request);
                }

                let status = request.path.contains("..").then_some(Status::Forbidden);
                let keep_alive = request.keep_alive();
                (request.path, status, keep_alive)
            }
        };

        let (status, body) = response::render(&self.root, &path, status, keep_alive, output);
        debug!(peer = ?self.peer, %path, code = status.code(), "response ready");

        Outcome::Response { body, keep_alive }
    }
}
