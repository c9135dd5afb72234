#![allow(dead_code)]
use async_trait::async_trait;
use catalog_browse::{ControllerConfig, ControllerEvent, ControllerEventReceiver};
use http_client::{HttpClient, Request, Response};
use http_types::{Error, StatusCode};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;

pub const BASE_URL: &str = "https://catalog.test";

/// Canned answer for one URL.
#[derive(Clone, Debug)]
pub struct StubResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct StubState {
    routes: HashMap<String, StubResponse>,
    gates: HashMap<String, Arc<Semaphore>>,
    requests: Vec<String>,
}

/// In-memory [`HttpClient`] that answers from a route table.
///
/// Unknown URLs fail like a transport error. A gated URL blocks until the
/// test adds a permit, which keeps a request in flight for as long as needed.
#[derive(Debug, Clone, Default)]
pub struct StubHttpClient {
    state: Arc<Mutex<StubState>>,
}

impl StubHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: &str, response: StubResponse) {
        self.state
            .lock()
            .unwrap()
            .routes
            .insert(url.to_string(), response);
    }

    pub fn route_json(&self, url: &str, body: &str) {
        self.route(
            url,
            StubResponse {
                status: 200,
                body: body.as_bytes().to_vec(),
                headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            },
        );
    }

    pub fn route_bytes(&self, url: &str, body: Vec<u8>) {
        self.route(
            url,
            StubResponse {
                status: 200,
                body,
                headers: Vec::new(),
            },
        );
    }

    pub fn route_status(&self, url: &str, status: u16) {
        self.route(
            url,
            StubResponse {
                status,
                body: Vec::new(),
                headers: Vec::new(),
            },
        );
    }

    /// Hold every request for `url` until a permit is added to the returned
    /// semaphore. Each permit releases one request.
    pub fn gate(&self, url: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.state
            .lock()
            .unwrap()
            .gates
            .insert(url.to_string(), Arc::clone(&gate));
        gate
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|requested| requested.as_str() == url)
            .count()
    }

    /// Wait until `url` has been requested `count` times.
    pub async fn wait_for_requests(&self, url: &str, count: usize) {
        timeout(Duration::from_secs(2), async {
            while self.request_count(url) < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {count} requests to {url}"));
    }
}

#[async_trait]
impl HttpClient for StubHttpClient {
    async fn send(&self, req: Request) -> Result<Response, Error> {
        let url = req.url().to_string();
        let (route, gate) = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(url.clone());
            (state.routes.get(&url).cloned(), state.gates.get(&url).cloned())
        };

        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|e| Error::from_str(StatusCode::InternalServerError, e.to_string()))?
                .forget();
        }

        let route = route.ok_or_else(|| {
            Error::from_str(StatusCode::BadGateway, format!("connection refused: {url}"))
        })?;

        let status = StatusCode::try_from(route.status)
            .map_err(|e| Error::from_str(StatusCode::InternalServerError, e.to_string()))?;
        let mut response = Response::new(status);
        for (name, value) in &route.headers {
            response.insert_header(name.as_str(), value.as_str());
        }
        response.set_body(route.body);
        Ok(response)
    }
}

pub fn test_config() -> ControllerConfig {
    ControllerConfig::new().with_base_url(BASE_URL)
}

pub fn search_url(term: &str) -> String {
    test_config().search_url(term)
}

pub fn artwork_url(name: &str) -> String {
    format!("https://art.test/{name}.png")
}

/// A search body with one result per title, artwork at [`artwork_url`].
pub fn search_body(titles: &[&str]) -> String {
    let results: Vec<serde_json::Value> = titles
        .iter()
        .enumerate()
        .map(|(i, title)| {
            serde_json::json!({
                "wrapperType": "software",
                "trackId": 1000 + i,
                "trackName": title,
                "artistName": "Test Publisher",
                "artworkUrl60": format!("https://art.test/{title}-60.png"),
                "artworkUrl100": artwork_url(title),
            })
        })
        .collect();

    serde_json::json!({ "resultCount": results.len(), "results": results }).to_string()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::new(width, height);
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
    cursor.into_inner()
}

/// Register a search route plus a valid PNG for every result's artwork.
pub fn route_search_with_artwork(stub: &StubHttpClient, term: &str, titles: &[&str]) {
    stub.route_json(&search_url(term), &search_body(titles));
    for title in titles {
        stub.route_bytes(&artwork_url(title), png_bytes(2, 2));
    }
}

/// Receive events until one matches `predicate`.
pub async fn wait_for_event<F>(events: &mut ControllerEventReceiver, predicate: F) -> ControllerEvent
where
    F: Fn(&ControllerEvent) -> bool,
{
    timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for controller event")
}
