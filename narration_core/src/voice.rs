use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::NarrationError;

/// The fixed voice catalogue of the speech provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    #[default]
    Alloy,
    Ash,
    Ballad,
    Coral,
    Echo,
    Fable,
    Onyx,
    Nova,
    Sage,
    Shimmer,
    Verse,
}

impl Voice {
    pub const ALL: [Voice; 11] = [
        Voice::Alloy,
        Voice::Ash,
        Voice::Ballad,
        Voice::Coral,
        Voice::Echo,
        Voice::Fable,
        Voice::Onyx,
        Voice::Nova,
        Voice::Sage,
        Voice::Shimmer,
        Voice::Verse,
    ];

    /// Provider-side voice id.
    pub fn as_str(self) -> &'static str {
        match self {
            Voice::Alloy => "alloy",
            Voice::Ash => "ash",
            Voice::Ballad => "ballad",
            Voice::Coral => "coral",
            Voice::Echo => "echo",
            Voice::Fable => "fable",
            Voice::Onyx => "onyx",
            Voice::Nova => "nova",
            Voice::Sage => "sage",
            Voice::Shimmer => "shimmer",
            Voice::Verse => "verse",
        }
    }

    /// Display label shown in voice pickers.
    pub fn label(self) -> &'static str {
        match self {
            Voice::Alloy => "Alex (US)",
            Voice::Ash => "Avery (US)",
            Voice::Ballad => "Bella (US)",
            Voice::Coral => "Chloe (US)",
            Voice::Echo => "Ethan (US)",
            Voice::Fable => "Felix (UK)",
            Voice::Onyx => "Oscar (US)",
            Voice::Nova => "Nora (US)",
            Voice::Sage => "Sage (US)",
            Voice::Shimmer => "Selina (US)",
            Voice::Verse => "Victor (US)",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts either the provider id (any case) or the exact display label.
impl FromStr for Voice {
    type Err = NarrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Voice::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(trimmed) || v.label() == trimmed)
            .ok_or_else(|| {
                NarrationError::invalid(format!(
                    "Unsupported voice: {s}. Available voices: {}",
                    Voice::ALL.map(Voice::as_str).join(", ")
                ))
            })
    }
}
