#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::Router;
use jobgate::{ApiClient, ClientConfig, Effect, MemorySessionStore, SessionCredentials, SessionStore};
use url::Url;

/// Serve `router` on an ephemeral port and return its base URL.
pub async fn spawn(router: Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/").parse().unwrap()
}

/// Effects applied by the client, in order.
#[derive(Clone, Default)]
pub struct Recorded(pub Arc<Mutex<Vec<Effect>>>);

impl Recorded {
    pub fn effects(&self) -> Vec<Effect> {
        self.0.lock().unwrap().clone()
    }
}

pub struct Harness {
    pub client: ApiClient,
    pub session: Arc<MemorySessionStore>,
    pub effects: Recorded,
}

pub fn harness(base: Url, credentials: Option<SessionCredentials>) -> Harness {
    harness_with(ClientConfig::new(base), credentials)
}

/// Route client logs to the test output; `RUST_LOG=jobgate=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn harness_with(config: ClientConfig, credentials: Option<SessionCredentials>) -> Harness {
    init_tracing();
    let session = Arc::new(MemorySessionStore::new());
    if let Some(credentials) = credentials {
        session.set(credentials).unwrap();
    }
    let effects = Recorded::default();
    let sink = {
        let effects = effects.clone();
        move |effect: &Effect| effects.0.lock().unwrap().push(effect.clone())
    };
    let client = ApiClient::new(config, session.clone())
        .unwrap()
        .with_effect_sink(Arc::new(sink));
    Harness {
        client,
        session,
        effects,
    }
}

pub fn creds(access: &str, refresh: Option<&str>) -> SessionCredentials {
    SessionCredentials::new(access, refresh.map(str::to_string))
}
