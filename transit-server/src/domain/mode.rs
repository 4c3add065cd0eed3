//! Transport modes.

use std::fmt;

use serde::Serialize;

/// The kind of vehicle (or lack of one) serving a leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Rail,
    Bus,
    Tram,
    Metro,
    Funicular,
    Ferry,
    Cableway,
    Walk,
    Unknown,
}

impl TransportMode {
    /// Map an OJP `PtMode` value to a transport mode.
    ///
    /// Unrecognised values map to `Unknown` rather than failing the leg.
    pub fn from_ojp(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "rail" => Self::Rail,
            "bus" | "coach" | "trolleybus" => Self::Bus,
            "tram" => Self::Tram,
            "metro" | "underground" => Self::Metro,
            "funicular" => Self::Funicular,
            "water" | "ferry" => Self::Ferry,
            "telecabin" | "cableway" => Self::Cableway,
            "walk" => Self::Walk,
            _ => Self::Unknown,
        }
    }

    /// Bus and tram run on the road network and have no live delay coverage,
    /// so they are the only modes the prediction engine handles.
    pub fn is_road_based(self) -> bool {
        matches!(self, Self::Bus | Self::Tram)
    }

    pub fn is_walk(self) -> bool {
        self == Self::Walk
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rail => "rail",
            Self::Bus => "bus",
            Self::Tram => "tram",
            Self::Metro => "metro",
            Self::Funicular => "funicular",
            Self::Ferry => "ferry",
            Self::Cableway => "cableway",
            Self::Walk => "walk",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
