//! The engine configuration document shared with go2rtc.

use camsync_types::Stream;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// URL reported for stream entries whose shape cannot be flattened.
pub const COMPLEX_SOURCE_PLACEHOLDER: &str = "complex source";

/// One value of the `streams` mapping.
///
/// go2rtc accepts a single source string or a list of sources. Anything
/// else is kept verbatim so saving the document never drops it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamSource {
    Url(String),
    List(Vec<String>),
    Other(Value),
}

impl StreamSource {
    /// The URL the registry reports for this entry, if it has one.
    pub fn canonical_url(&self) -> Option<&str> {
        match self {
            Self::Url(url) => Some(url),
            Self::List(urls) => urls.first().map(String::as_str),
            Self::Other(_) => None,
        }
    }
}

impl From<&str> for StreamSource {
    fn from(url: &str) -> Self {
        Self::Url(url.to_string())
    }
}

/// Top-level document: `streams` plus every other key, untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default, deserialize_with = "nullable_streams")]
    pub streams: BTreeMap<String, StreamSource>,
    /// Unrelated engine configuration (`api`, `rtsp`, `webrtc`, ...)
    #[serde(flatten)]
    pub rest: Mapping,
}

/// `streams:` with no value is a null node; treat it as empty.
fn nullable_streams<'de, D>(deserializer: D) -> Result<BTreeMap<String, StreamSource>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, StreamSource>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ConfigDocument {
    /// Parse document text. Blank input yields an empty document.
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Flatten the `streams` mapping into registry streams, sorted by name.
    pub fn streams(&self) -> Vec<Stream> {
        self.streams
            .iter()
            .map(|(name, source)| {
                let url = match source.canonical_url() {
                    Some(url) => url.to_string(),
                    None => {
                        warn!(stream = %name, source = ?source, "Stream has an unsupported source shape");
                        COMPLEX_SOURCE_PLACEHOLDER.to_string()
                    }
                };
                Stream::new(name.clone(), url)
            })
            .collect()
    }

    /// Replace the whole `streams` mapping with `name -> url` pairs.
    pub fn replace_streams(&mut self, streams: &[Stream]) {
        self.streams = streams
            .iter()
            .map(|s| (s.name.clone(), StreamSource::Url(s.url.clone())))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GO2RTC_CONFIG: &str = r#"
api:
  listen: ":1984"
rtsp:
  listen: ":8554"
streams:
  front_door: rtsp://10.0.0.5:554/stream1
  garage:
    - rtsp://10.0.0.6:554/main
    - ffmpeg:garage#video=h264
  weird:
    source: rtsp://10.0.0.7
    extra: true
webrtc:
  candidates:
    - stun:8555
"#;

    #[test]
    fn test_blank_document() {
        let doc = ConfigDocument::from_yaml("  \n").unwrap();
        assert!(doc.streams.is_empty());
        assert!(doc.rest.is_empty());
    }

    #[test]
    fn test_null_streams_key() {
        let doc = ConfigDocument::from_yaml("streams:\napi:\n  listen: \":1984\"\n").unwrap();
        assert!(doc.streams.is_empty());
        assert_eq!(doc.rest.len(), 1);
    }

    #[test]
    fn test_legacy_shapes_are_normalized() {
        let doc = ConfigDocument::from_yaml(GO2RTC_CONFIG).unwrap();
        let streams = doc.streams();

        let names: Vec<&str> = streams.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["front_door", "garage", "weird"]);
        assert_eq!(streams[0].url, "rtsp://10.0.0.5:554/stream1");
        assert_eq!(streams[1].url, "rtsp://10.0.0.6:554/main");
        assert_eq!(streams[2].url, COMPLEX_SOURCE_PLACEHOLDER);
    }

    #[test]
    fn test_passthrough_keys_survive_round_trip() {
        let doc = ConfigDocument::from_yaml(GO2RTC_CONFIG).unwrap();
        let reparsed = ConfigDocument::from_yaml(&doc.to_yaml().unwrap()).unwrap();

        assert_eq!(reparsed, doc);
        assert!(reparsed.rest.contains_key("api"));
        assert!(reparsed.rest.contains_key("webrtc"));
        assert!(matches!(
            reparsed.streams.get("weird"),
            Some(StreamSource::Other(_))
        ));
    }

    #[test]
    fn test_replace_streams_keeps_rest() {
        let mut doc = ConfigDocument::from_yaml(GO2RTC_CONFIG).unwrap();
        doc.replace_streams(&[Stream::new("cam1", "rtsp://10.0.0.9/live")]);

        assert_eq!(doc.streams.len(), 1);
        assert_eq!(
            doc.streams.get("cam1"),
            Some(&StreamSource::from("rtsp://10.0.0.9/live"))
        );
        assert_eq!(doc.rest.len(), 3);
    }
}
