//! Predefined camera list published by the stream server.

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use url::Url;

use crate::camera::{CameraDefinition, Source, SourceType};
use crate::error::FleetError;
use crate::event::Event;

pub const PREDEFINED_PATH: &str = "/api/predefined_cameras";

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// The server sends local device indexes as numbers and URLs as strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Locator {
    Index(u64),
    Text(String),
}

impl Locator {
    fn as_text(&self) -> String {
        match self {
            Locator::Index(n) => n.to_string(),
            Locator::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PredefinedCamera {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    url: Locator,
    #[serde(default)]
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct PredefinedResponse {
    success: bool,
    #[serde(default)]
    cameras: Vec<PredefinedCamera>,
    #[serde(default)]
    error: Option<String>,
}

impl PredefinedCamera {
    fn into_definition(self) -> Result<CameraDefinition, FleetError> {
        let kind: SourceType = self.kind.parse()?;
        let source = Source::parse(kind, &self.url.as_text())?;
        Ok(CameraDefinition::new(self.name, source, self.enabled))
    }
}

/// Turn a response body into camera definitions. Disabled entries and
/// entries with an unknown type or unusable source are skipped.
pub fn parse_response(body: &str) -> Result<Vec<CameraDefinition>, FleetError> {
    let response: PredefinedResponse = serde_json::from_str(body)
        .map_err(|e| FleetError::ConfigLoad(format!("invalid predefined camera list: {}", e)))?;
    if !response.success {
        return Err(FleetError::ConfigLoad(format!(
            "server could not list predefined cameras: {}",
            response.error.unwrap_or_else(|| "unknown error".to_string())
        )));
    }

    let mut definitions = Vec::with_capacity(response.cameras.len());
    for camera in response.cameras {
        if !camera.enabled {
            debug!("ignoring disabled predefined camera '{}'", camera.name);
            continue;
        }
        let name = camera.name.clone();
        match camera.into_definition() {
            Ok(definition) => definitions.push(definition),
            Err(e) => warn!("skipping predefined camera '{}': {}", name, e),
        }
    }
    Ok(definitions)
}

/// Fetch the list once
pub async fn fetch(client: &reqwest::Client, server: &Url) -> Result<Vec<CameraDefinition>, FleetError> {
    let url = server
        .join(PREDEFINED_PATH)
        .map_err(|e| FleetError::ConfigLoad(format!("invalid server URL: {}", e)))?;
    debug!(%url, "fetching predefined cameras");

    let body = client
        .get(url)
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| FleetError::ConfigLoad(format!("predefined cameras unavailable: {}", e)))?
        .text()
        .await
        .map_err(|e| FleetError::ConfigLoad(format!("predefined cameras unavailable: {}", e)))?;
    parse_response(&body)
}

/// Fetch in the background and post the result tagged with `revision`
pub fn spawn_fetch(server: Url, revision: u64, events: UnboundedSender<Event>) {
    tokio::spawn(async move {
        let client = reqwest::Client::new();
        let result = fetch(&client, &server).await;
        let _ = events.send(Event::Predefined { revision, result });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_list() {
        let body = r#"{
            "success": true,
            "cameras": [
                {"id": "hikvision_1", "name": "Hikvision", "url": "rtsp://admin:pw@192.168.1.218:554/Streaming/Channels/0101", "type": "rtsp", "enabled": true},
                {"id": "local_0", "name": "Local", "url": 0, "type": "local", "enabled": true},
                {"id": "lobby", "name": "Lobby", "url": "2", "type": "local", "enabled": false}
            ]
        }"#;
        let defs = parse_response(body).unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(
            defs[0].source,
            Source::Rtsp("rtsp://admin:pw@192.168.1.218:554/Streaming/Channels/0101".to_string())
        );
        assert_eq!(defs[1].source, Source::Local(0));
        assert!(defs.iter().all(|d| d.auto_start));
        assert!(defs.iter().all(|d| d.name != "Lobby"));
    }

    #[test]
    fn test_disabled_entries_not_imported() {
        let body = r#"{"success": true, "cameras": [
            {"name": "On", "url": 1, "type": "local", "enabled": true},
            {"name": "Off", "url": 2, "type": "local", "enabled": false},
            {"name": "Unset", "url": 3, "type": "local"}
        ]}"#;
        let names: Vec<_> = parse_response(body).unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["On"]);
    }

    #[test]
    fn test_unknown_type_skipped() {
        let body = r#"{"success": true, "cameras": [
            {"name": "Thermal", "url": "x", "type": "onvif", "enabled": true},
            {"name": "Clip", "url": "/srv/clips/door.mp4", "type": "file", "enabled": true}
        ]}"#;
        let defs = parse_response(body).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "Clip");
    }

    #[test]
    fn test_failure_response() {
        let body = r#"{"success": false, "error": "boom"}"#;
        let err = parse_response(body).unwrap_err();
        assert!(matches!(err, FleetError::ConfigLoad(ref m) if m.contains("boom")));
        assert!(parse_response("<html>").is_err());
    }

    #[test]
    fn test_empty_list() {
        assert!(parse_response(r#"{"success": true, "cameras": []}"#).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_error() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        spawn_fetch(Url::parse("http://127.0.0.1:9/").unwrap(), 4, tx);
        match rx.recv().await.unwrap() {
            Event::Predefined { revision, result } => {
                assert_eq!(revision, 4);
                assert!(result.is_err());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
