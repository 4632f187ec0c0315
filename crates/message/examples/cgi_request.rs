//! Materializes the request of a CGI invocation and logs what was received.
//!
//! Run it with a few CGI variables set, for example:
//!
//! ```text
//! REQUEST_METHOD=POST HTTP_HOST=example.org REQUEST_URI='/form?page=2' \
//!     CONTENT_TYPE=application/x-www-form-urlencoded HTTP_COOKIE='theme=dark' \
//!     cargo run --example cgi_request <<< 'name=Pesho&email=pesho%40example.com'
//! ```

use std::io::{self, Read};

use micro_message::request::{Environment, ServerRequestBuilder};
use micro_message::stream::{MemoryStream, Stream, lock};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).with_writer(io::stderr).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut body = Vec::new();
    if let Err(e) = io::stdin().read_to_end(&mut body) {
        error!(cause = %e, "failed to read request body");
        return;
    }

    let request = match ServerRequestBuilder::new(Environment::from_process())
        .body_stream(MemoryStream::from_bytes(body))
        .cookies_from_header()
        .query_from_uri()
        .parsed_body_from_form()
        .build()
    {
        Ok(request) => request,
        Err(e) => {
            error!(cause = %e, "failed to materialize request");
            return;
        }
    };

    info!(method = %request.method(), uri = %request.uri(), version = ?request.version(), "received request");
    for (name, value) in request.headers() {
        info!(%name, value = ?value, "header");
    }
    info!(cookies = ?request.cookie_params(), query = ?request.query_params(), "parameters");
    info!(parsed_body = ?request.parsed_body(), "parsed body");

    let mut body = lock(request.body());
    info!(size = ?body.size(), body = %body.to_string_lossy(), "raw body");
}
