use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

/// Sample rate the service expects for microphone input.
pub const INPUT_SAMPLE_RATE: u32 = 16000;
/// Sample rate of the PCM16 audio the service streams back.
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;
/// Mime type attached to every outbound realtime audio chunk.
pub const INPUT_AUDIO_MIME_TYPE: &str = "audio/pcm;rate=16000";

pub fn pcm16_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Prebuilt voices offered by the service.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Voice {
    Puck,
    Charon,
    Kore,
    Fenrir,
    Aoede,
    Leda,
    Orus,
    #[default]
    Zephyr,
    Custom(String),
}

impl Voice {
    pub const AVAILABLE: [Voice; 8] = [
        Voice::Puck,
        Voice::Charon,
        Voice::Kore,
        Voice::Fenrir,
        Voice::Aoede,
        Voice::Leda,
        Voice::Orus,
        Voice::Zephyr,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Voice::Puck => "Puck",
            Voice::Charon => "Charon",
            Voice::Kore => "Kore",
            Voice::Fenrir => "Fenrir",
            Voice::Aoede => "Aoede",
            Voice::Leda => "Leda",
            Voice::Orus => "Orus",
            Voice::Zephyr => "Zephyr",
            Voice::Custom(s) => s,
        }
    }
}

impl Serialize for Voice {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for Voice {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Puck" => Voice::Puck,
            "Charon" => Voice::Charon,
            "Kore" => Voice::Kore,
            "Fenrir" => Voice::Fenrir,
            "Aoede" => Voice::Aoede,
            "Leda" => Voice::Leda,
            "Orus" => Voice::Orus,
            "Zephyr" => Voice::Zephyr,
            _ => Voice::Custom(s.to_string()),
        })
    }
}

impl<'de> Deserialize<'de> for Voice {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match Voice::from_str(&s) {
            Ok(voice) => Ok(voice),
            Err(never) => match never {},
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Modality {
    #[serde(rename = "AUDIO")]
    Audio,
    #[serde(rename = "TEXT")]
    Text,
}
