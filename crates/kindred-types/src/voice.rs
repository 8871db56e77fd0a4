//! Voice catalog.
//!
//! Friends speak with one of a fixed set of synthesis voices, chosen to match
//! the generated gender.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Voices available for male friends.
pub const MALE_VOICES: &[&str] = &[
    "aura-orion-en",
    "aura-perseus-en",
    "aura-angus-en",
    "aura-zeus-en",
];

/// Voices available for female friends.
pub const FEMALE_VOICES: &[&str] = &["aura-asteria-en", "aura-luna-en", "aura-stella-en"];

/// Gender of a generated friend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }

    /// The voice catalog for this gender.
    pub fn voices(self) -> &'static [&'static str] {
        match self {
            Self::Male => MALE_VOICES,
            Self::Female => FEMALE_VOICES,
        }
    }

    /// Whether `voice` belongs to this gender's catalog.
    pub fn has_voice(self, voice: &str) -> bool {
        self.voices().contains(&voice)
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown gender: {0}")]
pub struct UnknownGender(pub String);

impl FromStr for Gender {
    type Err = UnknownGender;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "man" | "m" => Ok(Self::Male),
            "female" | "woman" | "f" => Ok(Self::Female),
            _ => Err(UnknownGender(s.to_string())),
        }
    }
}

/// Returns the gender whose catalog contains `voice`, if any.
pub fn gender_of_voice(voice: &str) -> Option<Gender> {
    [Gender::Male, Gender::Female]
        .into_iter()
        .find(|g| g.has_voice(voice))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogs_are_disjoint() {
        for voice in MALE_VOICES {
            assert!(!Gender::Female.has_voice(voice));
        }
        assert_eq!(gender_of_voice("aura-luna-en"), Some(Gender::Female));
        assert_eq!(gender_of_voice("aura-zeus-en"), Some(Gender::Male));
        assert_eq!(gender_of_voice("alloy"), None);
    }

    #[test]
    fn gender_parsing_is_lenient() {
        assert_eq!("Female".parse::<Gender>(), Ok(Gender::Female));
        assert_eq!(" male ".parse::<Gender>(), Ok(Gender::Male));
        assert!("robot".parse::<Gender>().is_err());
    }
}
