//! Data passed between pipeline stages.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// What the planning stage decided the meme should be.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct MemePlan {
    /// Description handed to the image model
    #[serde(default, deserialize_with = "null_as_default")]
    pub visual_concept: String,
    /// Things that must be in the picture
    #[serde(default, deserialize_with = "null_as_default")]
    pub visual_elements: Vec<String>,
    /// Overall mood
    #[serde(default, deserialize_with = "null_as_default")]
    pub mood: String,
    /// Visual style
    #[serde(default, deserialize_with = "null_as_default")]
    pub style: String,
    /// How many text blocks the joke needs
    #[serde(default = "default_text_blocks", deserialize_with = "text_blocks_or_default")]
    pub text_blocks_needed: u32,
    /// The joke, in a sentence
    #[serde(default, deserialize_with = "null_as_default")]
    pub humor_concept: String,
}

fn default_text_blocks() -> u32 {
    2
}

fn text_blocks_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(Option::deserialize(deserializer)?.unwrap_or_else(default_text_blocks))
}

/// Models sometimes send `null` instead of leaving a field out.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

/// Where a block of text sits on the image.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum TextPosition {
    /// Classic top text
    #[default]
    Top,
    /// Centered
    Middle,
    /// Classic bottom text
    Bottom,
    /// Anything else the model came up with, kept as-is
    Custom(String),
}

impl From<String> for TextPosition {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "top" => Self::Top,
            "middle" | "center" | "centre" => Self::Middle,
            "bottom" => Self::Bottom,
            _ => Self::Custom(value),
        }
    }
}

impl From<TextPosition> for String {
    fn from(value: TextPosition) -> Self {
        match value {
            TextPosition::Top => "top".to_string(),
            TextPosition::Middle => "middle".to_string(),
            TextPosition::Bottom => "bottom".to_string(),
            TextPosition::Custom(other) => other,
        }
    }
}

impl fmt::Display for TextPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Top => f.write_str("top"),
            Self::Middle => f.write_str("middle"),
            Self::Bottom => f.write_str("bottom"),
            Self::Custom(other) => f.write_str(other),
        }
    }
}

/// One piece of overlay text.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct TextBlock {
    /// The words themselves
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    /// Where it goes
    #[serde(default, deserialize_with = "null_as_default")]
    pub position: TextPosition,
    /// Font style hint, eg "bold"
    #[serde(default = "default_style", deserialize_with = "style_or_default")]
    pub style: String,
    /// Fill colour
    #[serde(default = "default_color", deserialize_with = "color_or_default")]
    pub color: String,
}

fn default_style() -> String {
    "bold".to_string()
}

fn default_color() -> String {
    "white".to_string()
}

fn style_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::deserialize(deserializer)?.unwrap_or_else(default_style))
}

fn color_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::deserialize(deserializer)?.unwrap_or_else(default_color))
}

/// Response shape of the meme text stage.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MemeText {
    /// Blocks in display order
    pub text_blocks: Vec<TextBlock>,
}

/// Caller-supplied parameters for a single run.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    /// What the meme is about
    pub theme: String,
    /// eg "absurd", "wholesome"
    pub humor_type: String,
    /// Content guidelines, may be empty
    pub restrictions: String,
    /// 1-based position in the batch, used in file names
    pub index: usize,
}
