use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub url: String,
}

/// One agent session as reported by the platform.
///
/// Only `session_id` is required. Any other field with an unexpected shape
/// is read as absent so one odd value never fails the whole fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub status_enum: Option<String>,
    #[serde(default)]
    pub structured_output: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub pull_request: Option<PullRequestRef>,
    #[serde(default, deserialize_with = "lenient")]
    pub updated_at: Option<String>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

impl Session {
    /// Decode a session envelope, unwrapping structured output that arrived
    /// as a JSON-encoded string.
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        let mut session: Session = serde_json::from_str(body)?;
        if let Some(Value::String(raw)) = &session.structured_output
            && let Ok(parsed) = serde_json::from_str::<Value>(raw)
            && parsed.is_object()
        {
            session.structured_output = Some(parsed);
        }
        Ok(session)
    }

    pub fn pull_request_url(&self) -> Option<&str> {
        self.pull_request
            .as_ref()
            .map(|pr| pr.url.as_str())
            .filter(|url| !url.trim().is_empty())
    }

    /// `updated_at` as UTC. Offset-less timestamps are taken to be UTC.
    pub fn updated_at_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.updated_at.as_deref()?.trim();
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Body of a session creation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreateSessionRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlisted: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secret_ids: Vec<String>,
}
