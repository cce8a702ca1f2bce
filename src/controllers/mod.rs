pub mod health;
pub mod program;
pub mod tts;
