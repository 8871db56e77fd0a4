//! Speech synthesis for Kindred.
//!
//! A friend's reply is rendered to audio by a hosted text-to-speech API using
//! the friend's catalog voice. The server holds an
//! `Arc<dyn SpeechSynthesizer>`; [`DeepgramClient`] is the production
//! implementation.

pub mod config;
pub mod error;
pub mod tts;

pub use config::SpeechConfig;
pub use error::SpeechError;
pub use tts::{
    fit_for_speech, DeepgramClient, SpeechSynthesizer, SynthesizedSpeech, MAX_TTS_INPUT_CHARS,
};
