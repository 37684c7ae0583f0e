//! Event collection wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status reported by the server for an event.
///
/// Ordered by lifecycle: an ongoing event sorts before a completed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventStatus {
    /// The event has not ended yet.
    Ongoing,
    /// The event is over.
    Completed,
}

/// A single event as returned by `GET /events` and `GET /events/{id}`.
///
/// The detail endpoint returns the same fields as the collection rows, so
/// one type covers both reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Server-assigned identifier.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// When the event begins.
    pub start_date: DateTime<Utc>,
    /// When the event ends.
    pub end_date: DateTime<Utc>,
    /// Venue or city.
    pub location: String,
    /// Lifecycle status.
    pub status: EventStatus,
    /// URL of the uploaded thumbnail, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// Payload for creating or updating an event.
///
/// Travels as multipart form data: text fields `name`, `startDate`,
/// `endDate` (ISO 8601), `location`, plus an optional file part named
/// `thumbnail`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    /// Display name.
    pub name: String,
    /// When the event begins.
    pub start_date: DateTime<Utc>,
    /// When the event ends.
    pub end_date: DateTime<Utc>,
    /// Venue or city.
    pub location: String,
    /// Image to upload alongside the text fields.
    pub thumbnail: Option<Thumbnail>,
}

/// An image attached to a create or update call.
#[derive(Clone, PartialEq)]
pub struct Thumbnail {
    /// File name reported in the multipart part.
    pub file_name: String,
    /// MIME type of the image (e.g. `image/png`).
    pub mime_type: String,
    /// Raw image bytes.
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thumbnail")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("bytes", &format_args!("{} bytes", self.bytes.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_json() -> serde_json::Value {
        json!({
            "id": 7,
            "name": "RustConf",
            "startDate": "2026-09-01T09:00:00.000Z",
            "endDate": "2026-09-03T17:00:00.000Z",
            "location": "Montreal",
            "status": "Ongoing",
            "thumbnailUrl": "https://cdn.example.com/rustconf.png"
        })
    }

    #[test]
    fn event_deserializes_camel_case() {
        let event: Event = serde_json::from_value(sample_json()).unwrap();
        assert_eq!(event.id, 7);
        assert_eq!(event.name, "RustConf");
        assert_eq!(event.status, EventStatus::Ongoing);
        assert_eq!(
            event.thumbnail_url.as_deref(),
            Some("https://cdn.example.com/rustconf.png")
        );
    }

    #[test]
    fn thumbnail_url_is_optional() {
        let mut value = sample_json();
        value.as_object_mut().unwrap().remove("thumbnailUrl");
        let event: Event = serde_json::from_value(value).unwrap();
        assert_eq!(event.thumbnail_url, None);
    }

    #[test]
    fn status_round_trips_as_plain_strings() {
        assert_eq!(
            serde_json::to_value(EventStatus::Completed).unwrap(),
            json!("Completed")
        );
        let status: EventStatus = serde_json::from_value(json!("Ongoing")).unwrap();
        assert_eq!(status, EventStatus::Ongoing);
    }
}
