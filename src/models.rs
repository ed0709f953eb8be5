use serde::{Deserialize, Serialize};

/// A stored disposable message. Written once, never updated.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: String,
    pub message: Option<String>,
    pub image_url: Option<String>,
    /// Blob store key of the attached image.
    pub image_path: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Seconds the record stays readable after `created_at`.
    pub display_time: i64,
}

impl MessageRecord {
    /// First instant (epoch millis) at which the record is no longer valid.
    pub fn expires_at(&self) -> i64 {
        self.created_at
            .saturating_add(self.display_time.saturating_mul(1000))
    }

    /// Validity window is `[created_at, expires_at)`.
    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        now_millis.saturating_sub(self.created_at) >= self.display_time.saturating_mul(1000)
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreatedMessage {
    pub id: String,
    pub view_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(created_at: i64, display_time: i64) -> MessageRecord {
        MessageRecord {
            id: "id".into(),
            message: Some("hello".into()),
            image_url: None,
            image_path: None,
            created_at,
            display_time,
        }
    }

    #[test]
    fn window_is_half_open() {
        let r = record(1_000, 2);
        assert_eq!(r.expires_at(), 3_000);
        assert!(!r.is_expired_at(1_000));
        assert!(!r.is_expired_at(2_999));
        assert!(r.is_expired_at(3_000));
        assert!(r.is_expired_at(10_000));
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let json = serde_json::to_value(record(5, 10)).unwrap();
        assert_eq!(json["createdAt"], 5);
        assert_eq!(json["displayTime"], 10);
        assert!(json["imageUrl"].is_null());
        assert!(json["imagePath"].is_null());
        assert_eq!(json["message"], "hello");
    }
}
