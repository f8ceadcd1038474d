use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("unknown_task_type: {0}")]
    UnknownTaskType(String),
    #[error("unknown_gender: {0}")]
    UnknownGender(String),
}

/// Recording protocol; decides which analyzers run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Conversation,
    SustainedVowel,
    Ddk,
    Fluency,
}

impl TaskType {
    pub const ALL: [TaskType; 4] = [
        TaskType::Conversation,
        TaskType::SustainedVowel,
        TaskType::Ddk,
        TaskType::Fluency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Conversation => "conversation",
            TaskType::SustainedVowel => "sustained_vowel",
            TaskType::Ddk => "ddk",
            TaskType::Fluency => "fluency",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TaskError::UnknownTaskType(s.to_string()))
    }
}

/// Speaker gender hint, used only to pick the F0 normalization reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    #[default]
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    pub fn norm(&self) -> GenderNorm {
        match self {
            Gender::Male => GenderNorm { mean: 120, sd: 20 },
            Gender::Female => GenderNorm { mean: 210, sd: 30 },
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            other => Err(TaskError::UnknownGender(other.to_string())),
        }
    }
}

/// Typical F0 (Hz) of a speaker population, in whole hertz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenderNorm {
    pub mean: u32,
    pub sd: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_names_round_trip() {
        for t in TaskType::ALL {
            assert_eq!(t.as_str().parse::<TaskType>(), Ok(t));
            assert_eq!(serde_json::to_string(&t).unwrap(), format!("\"{t}\""));
        }
    }

    #[test]
    fn unknown_task_is_rejected() {
        let err = "unknown".parse::<TaskType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown_task_type: unknown");
        assert!("Conversation".parse::<TaskType>().is_err());
    }

    #[test]
    fn norms_are_fixed() {
        assert_eq!(Gender::Male.norm(), GenderNorm { mean: 120, sd: 20 });
        assert_eq!(Gender::Female.norm(), GenderNorm { mean: 210, sd: 30 });
        assert_eq!(Gender::default(), Gender::Female);
        assert!("other".parse::<Gender>().is_err());
    }

    #[test]
    fn norms_serialize_as_integers() {
        assert_eq!(serde_json::to_string(&Gender::Male.norm()).unwrap(), r#"{"mean":120,"sd":20}"#);
        assert_eq!(serde_json::to_string(&Gender::Female.norm()).unwrap(), r#"{"mean":210,"sd":30}"#);
    }
}
