use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Error type for parsing an ID from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: &'static str,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {} from string", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

// IDs are numeric in storage but travel as JSON strings, matching the
// `previous: string | null` shape callers already consume.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the underlying u64 value
            #[must_use]
            pub const fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<u64>().map(Self::new).map_err(|_| ParseIdError {
                    kind: stringify!($name),
                })
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a Course
    CourseId
);
define_id!(
    /// Unique identifier for a Section within a course
    SectionId
);
define_id!(
    /// Unique identifier for a Video
    VideoId
);
define_id!(
    /// Unique identifier for a learner, as verified by the authentication layer
    LearnerId
);

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_id_display_and_parse() {
        let id = VideoId::new(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!("42".parse::<VideoId>().unwrap(), id);
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = "v-1".parse::<CourseId>().unwrap_err();
        assert_eq!(err.to_string(), "failed to parse CourseId from string");
    }

    #[test]
    fn ids_serialize_as_strings() {
        let json = serde_json::to_string(&Some(VideoId::new(7))).unwrap();
        assert_eq!(json, "\"7\"");

        let back: SectionId = serde_json::from_str("\"9\"").unwrap();
        assert_eq!(back, SectionId::new(9));
    }

    #[test]
    fn debug_names_the_kind() {
        assert_eq!(format!("{:?}", LearnerId::new(3)), "LearnerId(3)");
    }
}
