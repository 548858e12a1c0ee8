//! Timeline Vocabulary
//!
//! The set of timeline names a client may subscribe to over an open
//! connection. Control frames naming anything else are ignored, so a
//! client cannot grow its topic set with arbitrary keys.

use std::fmt;

/// A known timeline name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeline {
    /// Home timeline of the authenticated account (`user`)
    Home,
    /// Notifications of the authenticated account (`user:notification`)
    Notifications,
    /// Federated public timeline (`public`)
    Public,
    /// Local-only public timeline (`public:local`)
    PublicLocal,
    /// A hashtag timeline (`hashtag`)
    Hashtag,
    /// Local-only hashtag timeline (`hashtag:local`)
    HashtagLocal,
    /// A list timeline (`list`)
    List,
    /// Direct messages (`direct`)
    Direct,
}

/// Timelines a control frame may subscribe to or unsubscribe from.
pub const STATUS_TIMELINES: &[Timeline] = &[
    Timeline::PublicLocal,
    Timeline::Public,
    Timeline::Home,
    Timeline::Direct,
    Timeline::List,
    Timeline::Hashtag,
    Timeline::HashtagLocal,
];

impl Timeline {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeline::Home => "user",
            Timeline::Notifications => "user:notification",
            Timeline::Public => "public",
            Timeline::PublicLocal => "public:local",
            Timeline::Hashtag => "hashtag",
            Timeline::HashtagLocal => "hashtag:local",
            Timeline::List => "list",
            Timeline::Direct => "direct",
        }
    }

    /// Look up a timeline by its wire name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "user" => Some(Timeline::Home),
            "user:notification" => Some(Timeline::Notifications),
            "public" => Some(Timeline::Public),
            "public:local" => Some(Timeline::PublicLocal),
            "hashtag" => Some(Timeline::Hashtag),
            "hashtag:local" => Some(Timeline::HashtagLocal),
            "list" => Some(Timeline::List),
            "direct" => Some(Timeline::Direct),
            _ => None,
        }
    }
}

impl fmt::Display for Timeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check whether `name` may appear in an inbound control frame.
pub fn is_status_timeline(name: &str) -> bool {
    STATUS_TIMELINES.iter().any(|t| t.as_str() == name)
}

/// Join a timeline name and an optional qualifier into a topic key.
///
/// Empty qualifiers are dropped, so `("list", "")` yields `"list"`.
pub fn topic_key(stream: &str, qualifier: Option<&str>) -> String {
    match qualifier {
        Some(q) if !q.is_empty() => format!("{}:{}", stream, q),
        _ => stream.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for t in STATUS_TIMELINES {
            assert_eq!(Timeline::parse(t.as_str()), Some(*t));
        }
        assert_eq!(Timeline::parse("user:notification"), Some(Timeline::Notifications));
    }

    #[test]
    fn test_status_timelines() {
        assert!(is_status_timeline("public"));
        assert!(is_status_timeline("public:local"));
        assert!(is_status_timeline("list"));
        assert!(is_status_timeline("hashtag"));

        assert!(!is_status_timeline("user:notification"));
        assert!(!is_status_timeline(""));
        assert!(!is_status_timeline("list:01H3"));
        assert!(!is_status_timeline("PUBLIC"));
    }

    #[test]
    fn test_topic_key() {
        assert_eq!(topic_key("list", Some("01H3")), "list:01H3");
        assert_eq!(topic_key("list", Some("")), "list");
        assert_eq!(topic_key("public", None), "public");
    }
}
