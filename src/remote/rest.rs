use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use reqwest::blocking::{Client, Response};
use reqwest::{Method, StatusCode};
use serde_json::{Map, Value};
use url::Url;

use crate::logger::Logger;
use crate::remote::{
    diff_children, internal_error, invalid_argument, permission_denied, unavailable,
    ChildObserver, RemoteError, RemoteResult, RemoteService, RemoteSubscription,
};

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("sync/remote"));

const DEFAULT_POLL_INTERVAL_MILLIS: u64 = 5_000;
// Poll sleeps are spread by +/- this factor so a fleet of clients does not
// align its requests.
const POLL_JITTER_FACTOR: f64 = 0.5;

/// Remote service over an RTDB-style REST surface: `PUT`/`PATCH`/`GET`
/// against `<base>/<path>.json` with the signed-in user's token as an `auth`
/// query parameter.
///
/// The REST surface has no streaming channel, so child subscriptions are
/// served by a background thread that re-reads the collection and diffs its
/// children; events are therefore delayed by up to one poll interval.
pub struct RestRemote {
    client: Client,
    base_url: Url,
    auth: Mutex<Option<AuthBinding>>,
    poll_interval_millis: u64,
}

#[derive(Clone)]
struct AuthBinding {
    user_id: String,
    access_token: String,
}

impl RestRemote {
    pub fn new(raw_url: &str) -> RemoteResult<Self> {
        let mut url = Url::parse(raw_url)
            .map_err(|err| invalid_argument(format!("Invalid remote url '{raw_url}': {err}")))?;

        // A trailing slash keeps Url::join from eating the last path segment.
        if !url.path().ends_with('/') {
            let mut path = url.path().trim_end_matches('/').to_owned();
            path.push('/');
            url.set_path(&path);
        }

        let client = Client::builder()
            .build()
            .map_err(|err| internal_error(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: url,
            auth: Mutex::new(None),
            poll_interval_millis: DEFAULT_POLL_INTERVAL_MILLIS,
        })
    }

    pub fn with_poll_interval_millis(mut self, millis: u64) -> Self {
        self.poll_interval_millis = millis.max(1);
        self
    }

    fn url_for(&self, path: &str) -> RemoteResult<Url> {
        let relative = if path.is_empty() {
            ".json".to_string()
        } else {
            format!("{}.json", path.trim_matches('/'))
        };
        self.base_url
            .join(&relative)
            .map_err(|err| internal_error(format!("Failed to compose remote URL: {err}")))
    }

    fn auth_query(&self) -> Vec<(String, String)> {
        match self.auth.lock().unwrap().as_ref() {
            Some(binding) => vec![("auth".to_string(), binding.access_token.clone())],
            None => Vec::new(),
        }
    }

    fn send(
        &self,
        method: Method,
        path: &str,
        extra_query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> RemoteResult<Response> {
        let mut url = self.url_for(path)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in extra_query {
                pairs.append_pair(key, value);
            }
            for (key, value) in self.auth_query() {
                pairs.append_pair(&key, &value);
            }
        }

        let mut request = self.client.request(method, url);
        if let Some(payload) = body {
            request = request.json(payload);
        }
        request.send().map_err(map_transport_error)
    }

    fn ensure_success(&self, response: Response) -> RemoteResult<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().ok();
            Err(map_http_error(status, body))
        }
    }
}

fn map_transport_error(err: reqwest::Error) -> RemoteError {
    if let Some(status) = err.status() {
        return map_http_error(status, None);
    }
    if err.is_connect() || err.is_timeout() {
        unavailable(format!("Remote service is unreachable: {err}"))
    } else {
        internal_error(format!("Remote request failed: {err}"))
    }
}

fn map_http_error(status: StatusCode, body: Option<String>) -> RemoteError {
    let detail = body
        .filter(|raw| !raw.is_empty())
        .map(|raw| format!(": {raw}"))
        .unwrap_or_default();
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            invalid_argument(format!("Invalid payload{detail}"))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            permission_denied(format!("Permission denied{detail}"))
        }
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::TOO_MANY_REQUESTS => {
            unavailable(format!("Remote service unavailable{detail}"))
        }
        _ => internal_error(format!(
            "Remote request failed with status {}{detail}",
            status.as_str()
        )),
    }
}

fn jittered_sleep_millis(base: u64) -> u64 {
    let spread = rand::thread_rng().gen_range(-POLL_JITTER_FACTOR..=POLL_JITTER_FACTOR);
    let value = (base as f64) * (1.0 + spread);
    value.round().max(1.0) as u64
}

#[async_trait]
impl RemoteService for RestRemote {
    async fn authenticate(&self, user_id: &str, access_token: &str) -> RemoteResult<()> {
        *self.auth.lock().unwrap() = Some(AuthBinding {
            user_id: user_id.to_string(),
            access_token: access_token.to_string(),
        });
        Ok(())
    }

    async fn unauthenticate(&self) -> RemoteResult<()> {
        self.auth.lock().unwrap().take();
        Ok(())
    }

    fn current_user_id(&self) -> Option<String> {
        self.auth
            .lock()
            .unwrap()
            .as_ref()
            .map(|binding| binding.user_id.clone())
    }

    async fn write(&self, path: &str, value: Value) -> RemoteResult<()> {
        let response = self.send(Method::PUT, path, &[("print", "silent")], Some(&value))?;
        self.ensure_success(response).map(|_| ())
    }

    async fn update(&self, path: &str, updates: Map<String, Value>) -> RemoteResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let body = Value::Object(updates);
        let response = self.send(Method::PATCH, path, &[("print", "silent")], Some(&body))?;
        self.ensure_success(response).map(|_| ())
    }

    async fn read(&self, path: &str) -> RemoteResult<Value> {
        let response = self.send(Method::GET, path, &[], None)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Value::Null);
        }
        let response = self.ensure_success(response)?;
        response
            .json()
            .map_err(|err| internal_error(format!("Failed to decode remote response: {err}")))
    }

    /// Derives the clock delta from the `Date` header of a minimal request.
    /// Accuracy is limited to the header's one-second resolution, which is
    /// plenty for ordering user-generated events.
    async fn server_time_offset(&self) -> RemoteResult<i64> {
        let response = self.send(Method::GET, "", &[("shallow", "true")], None)?;
        let response = self.ensure_success(response)?;
        let header = response
            .headers()
            .get(reqwest::header::DATE)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| internal_error("Remote response is missing a Date header"))?;
        let server = DateTime::parse_from_rfc2822(header)
            .map_err(|err| internal_error(format!("Unparseable Date header '{header}': {err}")))?;
        Ok(server.timestamp_millis() - Utc::now().timestamp_millis())
    }

    fn subscribe_child_events(
        &self,
        path: &str,
        observer: ChildObserver,
    ) -> RemoteResult<RemoteSubscription> {
        let url = self.url_for(path)?;
        let client = self.client.clone();
        let auth = self.auth_query();
        let interval = self.poll_interval_millis;
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = stop.clone();
        let label = path.to_string();

        std::thread::spawn(move || {
            let mut last = Value::Null;
            while !stop_for_thread.load(Ordering::SeqCst) {
                let mut polled = url.clone();
                {
                    let mut pairs = polled.query_pairs_mut();
                    for (key, value) in &auth {
                        pairs.append_pair(key, value);
                    }
                }
                match client.get(polled).send() {
                    Ok(response) if response.status().is_success() => {
                        match response.json::<Value>() {
                            Ok(new) => {
                                // The request may have been in flight when the
                                // subscription was detached. Nothing reaches
                                // the observer past that point.
                                if stop_for_thread.load(Ordering::SeqCst) {
                                    break;
                                }
                                diff_children(&last, &new, &observer);
                                last = new;
                            }
                            Err(err) => {
                                LOGGER.warn(format!("Poll of {label} returned bad JSON: {err}"))
                            }
                        }
                    }
                    Ok(response) => LOGGER.warn(format!(
                        "Poll of {label} failed with status {}",
                        response.status()
                    )),
                    Err(err) => LOGGER.warn(format!("Poll of {label} failed: {err}")),
                }
                std::thread::sleep(Duration::from_millis(jittered_sleep_millis(interval)));
            }
        });

        Ok(RemoteSubscription::new(move || {
            stop.store(true, Ordering::SeqCst);
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{ChildEvent, RemoteErrorCode};
    use futures::executor::block_on;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn write_sends_put_with_auth_token() {
        let server = MockServer::start();
        let put_mock = server.mock(|when, then| {
            when.method(PUT)
                .path("/users/u1/my_sessions/abc.json")
                .query_param("print", "silent")
                .query_param("auth", "token-1")
                .json_body(json!({"in_schedule": true, "timestamp": 1000}));
            then.status(200).body("null");
        });

        let remote = RestRemote::new(&server.url("/")).unwrap();
        block_on(async {
            remote.authenticate("u1", "token-1").await.unwrap();
            remote
                .write(
                    "users/u1/my_sessions/abc",
                    json!({"in_schedule": true, "timestamp": 1000}),
                )
                .await
                .unwrap();
        });

        put_mock.assert();
    }

    #[test]
    fn unauthorized_write_maps_to_permission_denied() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(PUT).path("/users/u1/feedback/s1.json");
            then.status(401).body(r#"{"error":"Unauthorized"}"#);
        });

        let remote = RestRemote::new(&server.url("/")).unwrap();
        let err = block_on(remote.write("users/u1/feedback/s1", json!(true))).unwrap_err();
        assert_eq!(err.code, RemoteErrorCode::PermissionDenied);
    }

    #[test]
    fn read_decodes_json_and_missing_as_null() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/users/u1/my_sessions.json");
            then.status(200).body(r#"{"abc":{"in_schedule":true}}"#);
        });
        server.mock(|when, then| {
            when.method(GET).path("/users/u1/feedback.json");
            then.status(404);
        });

        let remote = RestRemote::new(&server.url("/")).unwrap();
        block_on(async {
            assert_eq!(
                remote.read("users/u1/my_sessions").await.unwrap(),
                json!({"abc": {"in_schedule": true}})
            );
            assert_eq!(remote.read("users/u1/feedback").await.unwrap(), Value::Null);
        });
    }

    #[test]
    fn update_sends_patch_body() {
        let server = MockServer::start();
        let patch_mock = server.mock(|when, then| {
            when.method(httpmock::Method::PATCH)
                .path("/users/u1/my_sessions.json")
                .json_body(json!({"abc": {"in_schedule": false}}));
            then.status(200).body("null");
        });

        let remote = RestRemote::new(&server.url("/")).unwrap();
        let mut updates = Map::new();
        updates.insert("abc".to_string(), json!({"in_schedule": false}));
        block_on(remote.update("users/u1/my_sessions", updates)).unwrap();

        patch_mock.assert();
    }

    #[test]
    fn server_time_offset_reads_date_header() {
        let server = MockServer::start();
        let future = Utc::now() + chrono::Duration::seconds(120);
        server.mock(|when, then| {
            when.method(GET).path("/.json");
            then.status(200)
                .header("Date", future.to_rfc2822())
                .body("null");
        });

        let remote = RestRemote::new(&server.url("/")).unwrap();
        let offset = block_on(remote.server_time_offset()).unwrap();
        // One-second header resolution plus test slack.
        assert!((offset - 120_000).abs() < 5_000, "offset was {offset}");
    }

    #[test]
    fn polling_listener_reports_existing_children() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/users/u1/viewed_videos.json");
            then.status(200).body(r#"{"vid1": true}"#);
        });

        let remote = RestRemote::new(&server.url("/"))
            .unwrap()
            .with_poll_interval_millis(25);

        let events: Arc<Mutex<Vec<ChildEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let observer: ChildObserver = Arc::new(move |event| {
            sink.lock().unwrap().push(event);
        });

        let subscription = remote
            .subscribe_child_events("users/u1/viewed_videos", observer)
            .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            if !events.lock().unwrap().is_empty() || std::time::Instant::now() > deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        subscription.detach();

        let events = events.lock().unwrap();
        assert!(
            events.contains(&ChildEvent::Added {
                key: "vid1".into(),
                value: json!(true)
            }),
            "no Added event observed"
        );
    }

    #[test]
    fn detached_listener_drops_a_response_already_in_flight() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/users/u1/my_sessions.json");
            then.status(200)
                .body(r#"{"sess1": true}"#)
                .delay(Duration::from_millis(400));
        });

        let remote = RestRemote::new(&server.url("/"))
            .unwrap()
            .with_poll_interval_millis(60_000);

        let events: Arc<Mutex<Vec<ChildEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let observer: ChildObserver = Arc::new(move |event| {
            sink.lock().unwrap().push(event);
        });

        let subscription = remote
            .subscribe_child_events("users/u1/my_sessions", observer)
            .unwrap();
        // Detach while the first poll is still waiting on the server.
        std::thread::sleep(Duration::from_millis(100));
        subscription.detach();
        std::thread::sleep(Duration::from_millis(600));

        assert!(
            events.lock().unwrap().is_empty(),
            "event delivered after detach"
        );
    }
}
