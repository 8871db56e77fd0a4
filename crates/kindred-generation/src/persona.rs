//! Prompts for friend creation and conversation, and parsing of the model's
//! friend description.

use crate::GenerationError;
use kindred_types::voice::{FEMALE_VOICES, MALE_VOICES};
use kindred_types::{ChatMessage, Gender};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;

/// A friend as proposed by the language model, before an image exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaDraft {
    pub name: String,
    pub gender: Gender,
    pub voice: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPersona {
    name: Option<String>,
    gender: Option<String>,
    voice: Option<String>,
    description: Option<String>,
}

/// Instruction asking for a random friend as a JSON object.
pub fn persona_prompt() -> String {
    format!(
        "- Generate a random friend's name. First name only. Don't keep using names like \"Maya\" or \"Luna\". There are so many more names out there.\n\
         - The friend can be either male or female.\n\
         - Write a personality description of 2-3 sentences using pronouns that match the gender.\n\
         - Also randomly select a voice based on the friend's gender from this list:\n\
           Male voices: {}\n\
           Female voices: {}\n\
         - Format the response as JSON with 'name', 'gender', 'voice' and 'description' fields.",
        MALE_VOICES.join(", "),
        FEMALE_VOICES.join(", "),
    )
}

/// Parses the model's JSON answer to [`persona_prompt`].
///
/// The gender and voice are normalized: an unrecognized gender is replaced by
/// a random one, and a voice outside that gender's catalog by a random voice
/// from it. Only the name is mandatory.
pub fn parse_persona<R: Rng>(
    content: &str,
    rng: &mut R,
) -> Result<PersonaDraft, GenerationError> {
    let raw: RawPersona = serde_json::from_str(strip_code_fence(content))
        .map_err(|e| GenerationError::Malformed(format!("friend is not valid JSON: {e}")))?;

    let name = raw
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| GenerationError::Malformed("friend has no name".to_string()))?;

    let gender = raw
        .gender
        .as_deref()
        .and_then(|g| g.parse::<Gender>().ok())
        .unwrap_or_else(|| {
            if rng.gen_bool(0.5) {
                Gender::Male
            } else {
                Gender::Female
            }
        });

    let voice = match raw.voice.map(|v| v.trim().to_string()) {
        Some(v) if gender.has_voice(&v) => v,
        other => {
            let picked = gender
                .voices()
                .choose(rng)
                .copied()
                .unwrap_or(gender.voices()[0]);
            tracing::debug!(requested = ?other, %gender, picked, "replacing voice outside catalog");
            picked.to_string()
        }
    };

    let description = raw
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    Ok(PersonaDraft {
        name,
        gender,
        voice,
        description,
    })
}

/// Models sometimes wrap JSON in a markdown fence even in JSON mode.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// Instruction for the profile picture of a drafted friend.
pub fn profile_image_prompt(persona: &PersonaDraft) -> String {
    let context = persona
        .description
        .as_deref()
        .map(|d| format!(" Use this description as context: {d}"))
        .unwrap_or_default();
    format!(
        "Create a profile picture for {name}. Their gender is {gender}.{context}\n\
         Here's a sample prompt:\n\
         \"A photo-realistic and detailed profile picture of a young woman with shoulder-length dark brown hair, wearing a casual outfit. \
         She has warm, natural makeup and a friendly smile. The background is softly blurred with neutral tones, giving a professional yet approachable look. \
         The lighting is soft and flattering, highlighting her facial features.\"\n\
         Make your prompt as detailed as this one.",
        name = persona.name,
        gender = persona.gender,
    )
}

/// Everything the model needs to answer the user's latest line.
#[derive(Debug, Clone)]
pub struct ReplyContext<'a> {
    pub friend_name: &'a str,
    pub friend_description: Option<&'a str>,
    pub user_name: &'a str,
    pub user_message: &'a str,
    pub history: &'a [ChatMessage],
}

impl ReplyContext<'_> {
    /// True for the zero-input turn that opens a conversation.
    pub fn is_greeting(&self) -> bool {
        self.history.is_empty() && self.user_message.trim().is_empty()
    }
}

/// Instruction for the friend's next line.
pub fn reply_prompt(ctx: &ReplyContext<'_>) -> String {
    let history = ctx
        .history
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.message))
        .collect::<Vec<_>>()
        .join("\n");
    let description = ctx
        .friend_description
        .map(|d| format!("\n    <description>{d}</description>"))
        .unwrap_or_default();

    format!(
        "- You are a friend of the user and are in a conversation with them.\n\
         <your_profile>\n    <name>{name}</name>{description}\n</your_profile>\n\
         - User's name: {user}\n\
         - User's latest message: {latest}\n\
         - You need to generate a response to the user's latest message.\n\
         - Previous messages between you and the user (if any) are also given to you as context.\n\
         - Previous messages: {history}\n\
         \n\
         INSTRUCTIONS FOR RESPONSE:\n\
         - Respond as if you are talking to your closest friend.\n\
         - Show genuine emotion and personality.\n\
         - You are allowed to use conversational slang.\n\
         - Make it seem like a natural human like conversation.\n\
         - Don't be too formal, corny, or cheesy.\n\
         - Your response will be converted to speech so make sure it's not super text-like language.\n\
         - Only address the user by name when you are greeting them. Don't overdo it.\n\
         - DO NOT use emojis.\n\
         \n\
         IMPORTANT:\n\
         - If there are no previous messages and user's latest message is also empty, then respond as if you are just starting a conversation.",
        name = ctx.friend_name,
        user = ctx.user_name,
        latest = ctx.user_message,
    )
}
