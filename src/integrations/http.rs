use crate::error::{Result, SessionError};
use crate::integrations::backend::MeetingBackend;
use crate::meeting::{MeetingDetail, Participant, RecognitionProjection};
use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Envelope keys the backend may wrap a payload with.
const ENVELOPE_KEYS: &[&str] = &["data", "message", "status", "success"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusRequest {
    is_start: bool,
    is_ended: bool,
}

/// `MeetingBackend` over the dashboard REST API.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(endpoint)
            .map_err(|e| SessionError::Network(format!("Invalid backend endpoint '{}': {}", endpoint, e)))?;
        if base.cannot_be_a_base() {
            return Err(SessionError::Network(format!(
                "Backend endpoint '{}' cannot be used as a base URL",
                endpoint
            )));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    /// Build `<base>/<segments...>`, escaping each segment.
    pub(crate) fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        url
    }

    fn limit_query(limit: Option<u32>) -> Vec<(&'static str, String)> {
        limit
            .map(|l| vec![("limit", l.to_string())])
            .unwrap_or_default()
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        query: &[(&'static str, String)],
        body: Option<&StatusRequest>,
    ) -> Result<Option<Value>> {
        let mut request = self.client.request(method.clone(), url.clone());
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SessionError::Network(format!("{} {} failed: {}", method, url.path(), e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SessionError::Network(format!(
                "{} {} returned {}: {}",
                method,
                url.path(),
                status,
                error_text
            )));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        // Non-JSON acknowledgements ("OK") are fine for commands.
        Ok(serde_json::from_slice::<Value>(&bytes).ok())
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&'static str, String)],
    ) -> Result<T> {
        let path = url.path().to_string();
        let value = self
            .send(Method::GET, url, query, None)
            .await?
            .ok_or_else(|| SessionError::Decode {
                format: "JSON",
                message: format!("GET {} returned no JSON body", path),
            })?;
        decode(unwrap_envelope(value))
    }

    async fn command(&self, method: Method, url: Url, body: Option<&StatusRequest>) -> Result<()> {
        self.send(method, url, &[], body).await.map(|_| ())
    }
}

/// Accept both bare payloads and `{"data": ...}` envelopes.
pub(crate) fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map)
            if map.contains_key("data") && map.keys().all(|k| ENVELOPE_KEYS.contains(&k.as_str())) =>
        {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

#[async_trait]
impl MeetingBackend for HttpBackend {
    async fn get_session_by_id(&self, meeting_id: &str) -> Result<MeetingDetail> {
        self.fetch(self.url(&["meetings", meeting_id]), &[]).await
    }

    async fn set_session_status(&self, meeting_id: &str, started: bool, ended: bool) -> Result<()> {
        let body = StatusRequest {
            is_start: started,
            is_ended: ended,
        };
        self.command(
            Method::PATCH,
            self.url(&["meetings", meeting_id, "status"]),
            Some(&body),
        )
        .await
    }

    async fn remove_session(&self, meeting_id: &str) -> Result<()> {
        self.command(Method::DELETE, self.url(&["meetings", meeting_id]), None)
            .await
    }

    async fn start_recognition(&self, code: &str) -> Result<()> {
        self.command(
            Method::POST,
            self.url(&["meetings", code, "recognition", "start"]),
            None,
        )
        .await
    }

    async fn stop_recognition(&self, code: &str) -> Result<()> {
        self.command(
            Method::POST,
            self.url(&["meetings", code, "recognition", "stop"]),
            None,
        )
        .await
    }

    async fn get_recognition(
        &self,
        code: &str,
        limit: Option<u32>,
    ) -> Result<RecognitionProjection> {
        self.fetch(self.url(&["recognitions", code]), &Self::limit_query(limit))
            .await
    }

    async fn get_participant_recognition(
        &self,
        code: &str,
        participant_id: &str,
        limit: Option<u32>,
    ) -> Result<RecognitionProjection> {
        self.fetch(
            self.url(&["recognitions", code, participant_id]),
            &Self::limit_query(limit),
        )
        .await
    }

    async fn get_participants(&self, meeting_id: &str) -> Result<Vec<Participant>> {
        self.fetch(self.url(&["meetings", meeting_id, "participants"]), &[])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the raw request.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut request = Vec::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if n == 0 {
                    break;
                }
                let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
                    continue;
                };
                let head = String::from_utf8_lossy(&request[..end]).to_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + body_len {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });
        (format!("http://{}", addr), handle)
    }

    #[test]
    fn test_url_escapes_segments() {
        let backend = HttpBackend::new("http://localhost:5000/api/", Duration::from_secs(1)).unwrap();
        let url = backend.url(&["recognitions", "a b", "u/1"]);
        assert_eq!(url.as_str(), "http://localhost:5000/api/recognitions/a%20b/u%2F1");
    }

    #[test]
    fn test_rejects_invalid_endpoint() {
        let err = HttpBackend::new("not a url", Duration::from_secs(1)).err().unwrap();
        assert!(matches!(err, SessionError::Network(_)));
    }

    #[test]
    fn test_unwrap_envelope() {
        assert_eq!(unwrap_envelope(json!({ "data": [1, 2] })), json!([1, 2]));
        assert_eq!(
            unwrap_envelope(json!({ "success": true, "data": { "code": "x" } })),
            json!({ "code": "x" })
        );
        // a record that merely has a `data` field stays intact
        let record = json!({ "_id": "m1", "data": 3 });
        assert_eq!(unwrap_envelope(record.clone()), record);
    }

    #[tokio::test]
    async fn test_get_session_by_id_decodes_wrapped_detail() {
        let (endpoint, server) = serve_once(
            "200 OK",
            r#"{"data":{"_id":"m1","code":"C0DE","name":"Standup","isStart":true,"isEnded":false}}"#,
        )
        .await;
        let backend = HttpBackend::new(&endpoint, Duration::from_secs(5)).unwrap();

        let detail = backend.get_session_by_id("m1").await.unwrap();
        assert_eq!(detail.code, "C0DE");
        assert!(detail.is_start);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /meetings/m1 "));
    }

    #[tokio::test]
    async fn test_get_recognition_sends_limit() {
        let (endpoint, server) = serve_once(
            "200 OK",
            r#"{"recognitionStream":[],"recognitionsOverview":{},"recognitionsSummary":null}"#,
        )
        .await;
        let backend = HttpBackend::new(&endpoint, Duration::from_secs(5)).unwrap();

        backend.get_recognition("C0DE", Some(10)).await.unwrap();
        let request = server.await.unwrap();
        assert!(request.starts_with("GET /recognitions/C0DE?limit=10 "));
    }

    #[tokio::test]
    async fn test_error_status_is_network_failure() {
        let (endpoint, server) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#).await;
        let backend = HttpBackend::new(&endpoint, Duration::from_secs(5)).unwrap();

        let err = backend.set_session_status("m1", true, false).await.unwrap_err();
        match err {
            SessionError::Network(message) => assert!(message.contains("500")),
            other => panic!("unexpected error: {other:?}"),
        }
        let request = server.await.unwrap();
        assert!(request.starts_with("PATCH /meetings/m1/status "));
    }
}
