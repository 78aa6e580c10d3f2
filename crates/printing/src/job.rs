use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::layout::Placement;
use crate::platform::BackendKind;

/// Orientation of a printed label.
/// 標籤列印的方向。
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl Orientation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
        }
    }

    /// Returns `(width, height)` as seen after applying the orientation.
    pub const fn oriented(&self, width: u32, height: u32) -> (u32, u32) {
        match self {
            Orientation::Portrait => (width, height),
            Orientation::Landscape => (height, width),
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOrientationError(String);

impl fmt::Display for ParseOrientationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown orientation '{}' (expected portrait or landscape)",
            self.0
        )
    }
}

impl std::error::Error for ParseOrientationError {}

impl FromStr for Orientation {
    type Err = ParseOrientationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "portrait" => Ok(Orientation::Portrait),
            "landscape" => Ok(Orientation::Landscape),
            _ => Err(ParseOrientationError(value.to_string())),
        }
    }
}

/// Deserializes through `FromStr` so config, query strings and CLI flags
/// accept the same spellings.
#[cfg(feature = "serde")]
pub(crate) fn deserialize_from_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let value = String::deserialize(deserializer)?;
    value.parse().map_err(serde::de::Error::custom)
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for Orientation {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_from_str(deserializer)
    }
}

/// A single print invocation. Immutable once built.
/// 單次列印請求，建立後不可變更。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintRequest {
    source_path: PathBuf,
    device_name: String,
    orientation: Orientation,
}

impl PrintRequest {
    pub fn new(
        source_path: impl Into<PathBuf>,
        device_name: impl Into<String>,
        orientation: Orientation,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            device_name: device_name.into(),
            orientation,
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }
}

/// Dispatcher state markers used in logs.
/// 派送流程的狀態標記，用於紀錄。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Validate,
    Prepare,
    Layout,
    Emit,
    Cleanup,
    Done,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DispatchState::Validate => "validate",
            DispatchState::Prepare => "prepare",
            DispatchState::Layout => "layout",
            DispatchState::Emit => "emit",
            DispatchState::Cleanup => "cleanup",
            DispatchState::Done => "done",
        };
        f.write_str(label)
    }
}

/// Summary of a job the backend accepted.
/// 後端接受列印作業後回傳的摘要。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReceipt {
    pub device: String,
    pub backend: BackendKind,
    pub placement: Placement,
    /// Simulation artifact path, or the spooler's job reference when it returned one.
    pub output: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orientation_parses_case_insensitively() {
        assert_eq!("Landscape".parse(), Ok(Orientation::Landscape));
        assert_eq!(" portrait ".parse(), Ok(Orientation::Portrait));
        assert!("sideways".parse::<Orientation>().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserialization_matches_cli_parsing() {
        let parsed: Orientation = serde_json::from_str("\"Landscape\"").expect("mixed case");
        assert_eq!(parsed, Orientation::Landscape);
        assert_eq!(
            serde_json::to_string(&Orientation::Landscape).expect("serialize"),
            "\"landscape\""
        );
        assert!(serde_json::from_str::<Orientation>("\"sideways\"").is_err());
    }

    #[test]
    fn landscape_swaps_dimensions() {
        assert_eq!(Orientation::Portrait.oriented(400, 200), (400, 200));
        assert_eq!(Orientation::Landscape.oriented(400, 200), (200, 400));
    }
}
