use serde::{Deserialize, Serialize};

use super::language::LanguageCode;

/// Output encodings a synthesis provider can be asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioEncoding {
    #[default]
    Mp3,
    OggOpus,
    /// 16-bit PCM wrapped in a WAV container
    Linear16,
    /// Raw 16-bit little-endian PCM, no header
    Pcm,
    /// Raw 8-bit mu-law, no header
    Mulaw,
}

impl AudioEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioEncoding::Mp3 => "MP3",
            AudioEncoding::OggOpus => "OGG_OPUS",
            AudioEncoding::Linear16 => "LINEAR16",
            AudioEncoding::Pcm => "PCM",
            AudioEncoding::Mulaw => "MULAW",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AudioEncoding::Mp3 => "mp3",
            AudioEncoding::OggOpus => "ogg",
            AudioEncoding::Linear16 => "wav",
            AudioEncoding::Pcm => "pcm",
            AudioEncoding::Mulaw => "ulaw",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioEncoding::Mp3 => "audio/mpeg",
            AudioEncoding::OggOpus => "audio/ogg",
            AudioEncoding::Linear16 => "audio/wav",
            AudioEncoding::Pcm => "audio/L16",
            AudioEncoding::Mulaw => "audio/basic",
        }
    }

    /// Headerless streams can be joined by plain byte concatenation.
    /// Everything else carries per-file headers and needs a container-aware merge.
    pub fn is_headerless(&self) -> bool {
        matches!(self, AudioEncoding::Pcm | AudioEncoding::Mulaw)
    }
}

impl std::fmt::Display for AudioEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VoiceConfigError {
    #[error("languageCode '{0}' is not a valid BCP-47 tag")]
    LanguageCode(String),
    #[error("speakingRate {0} must be between 0.25 and 4.0")]
    SpeakingRate(f32),
    #[error("pitch {0} must be between -20.0 and 20.0")]
    Pitch(f32),
    #[error("volumeGainDb {0} must be between -96.0 and 16.0")]
    VolumeGain(f32),
    #[error("sampleRateHertz {0} must be between 8000 and 48000")]
    SampleRate(u32),
    #[error("audioEncoding {encoding} is not supported by the {provider} provider")]
    UnsupportedEncoding {
        encoding: AudioEncoding,
        provider: &'static str,
    },
}

/// Voice selection and audio parameters shared by every segment of one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub language_code: String,
    pub voice_name: Option<String>,
    pub encoding: AudioEncoding,
    pub speaking_rate: f32,
    pub pitch: f32,
    pub volume_gain_db: f32,
    pub sample_rate_hertz: Option<u32>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            language_code: LanguageCode::English.bcp47().to_string(),
            voice_name: None,
            encoding: AudioEncoding::Mp3,
            speaking_rate: 1.0,
            pitch: 0.0,
            volume_gain_db: 0.0,
            sample_rate_hertz: None,
        }
    }
}

impl VoiceConfig {
    /// Check every field once, before any synthesis call is made
    pub fn validate(&self, provider: &'static str, supported: &[AudioEncoding]) -> Result<(), VoiceConfigError> {
        if !is_bcp47(&self.language_code) {
            return Err(VoiceConfigError::LanguageCode(self.language_code.clone()));
        }
        if !(0.25..=4.0).contains(&self.speaking_rate) {
            return Err(VoiceConfigError::SpeakingRate(self.speaking_rate));
        }
        if !(-20.0..=20.0).contains(&self.pitch) {
            return Err(VoiceConfigError::Pitch(self.pitch));
        }
        if !(-96.0..=16.0).contains(&self.volume_gain_db) {
            return Err(VoiceConfigError::VolumeGain(self.volume_gain_db));
        }
        if let Some(rate) = self.sample_rate_hertz {
            if !(8000..=48000).contains(&rate) {
                return Err(VoiceConfigError::SampleRate(rate));
            }
        }
        if !supported.contains(&self.encoding) {
            return Err(VoiceConfigError::UnsupportedEncoding {
                encoding: self.encoding,
                provider,
            });
        }
        Ok(())
    }

    /// Detected or requested language, used to pick provider default voices
    pub fn language(&self) -> Option<LanguageCode> {
        LanguageCode::from_bcp47(&self.language_code)
    }

    pub fn has_default_prosody(&self) -> bool {
        self.speaking_rate == 1.0 && self.pitch == 0.0 && self.volume_gain_db == 0.0
    }

    /// Stable key identifying the audio this config produces
    pub fn cache_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.language_code,
            self.voice_name.as_deref().unwrap_or("-"),
            self.encoding,
            self.speaking_rate,
            self.pitch,
            self.volume_gain_db,
            self.sample_rate_hertz.unwrap_or(0),
        )
    }
}

fn is_bcp47(tag: &str) -> bool {
    let mut parts = tag.split('-');
    let primary_ok = parts
        .next()
        .map(|p| (2..=3).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphabetic()))
        .unwrap_or(false);
    primary_ok && parts.all(|p| (2..=8).contains(&p.len()) && p.chars().all(|c| c.is_ascii_alphanumeric()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &[AudioEncoding] = &[
        AudioEncoding::Mp3,
        AudioEncoding::OggOpus,
        AudioEncoding::Linear16,
        AudioEncoding::Pcm,
        AudioEncoding::Mulaw,
    ];

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(VoiceConfig::default().validate("test", ALL), Ok(()));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let config = VoiceConfig {
            speaking_rate: 5.0,
            ..VoiceConfig::default()
        };
        assert_eq!(config.validate("test", ALL), Err(VoiceConfigError::SpeakingRate(5.0)));

        let config = VoiceConfig {
            sample_rate_hertz: Some(4000),
            ..VoiceConfig::default()
        };
        assert_eq!(config.validate("test", ALL), Err(VoiceConfigError::SampleRate(4000)));

        let config = VoiceConfig {
            volume_gain_db: 20.0,
            ..VoiceConfig::default()
        };
        assert!(config.validate("test", ALL).is_err());
    }

    #[test]
    fn test_rejects_malformed_language_code() {
        for tag in ["", "english", "en-", "e1", "en US"] {
            let config = VoiceConfig {
                language_code: tag.to_string(),
                ..VoiceConfig::default()
            };
            assert!(
                matches!(config.validate("test", ALL), Err(VoiceConfigError::LanguageCode(_))),
                "tag {:?} should be rejected",
                tag
            );
        }
    }

    #[test]
    fn test_rejects_encoding_the_provider_cannot_produce() {
        let config = VoiceConfig {
            encoding: AudioEncoding::OggOpus,
            ..VoiceConfig::default()
        };
        assert_eq!(
            config.validate("polly", &[AudioEncoding::Mp3, AudioEncoding::Pcm]),
            Err(VoiceConfigError::UnsupportedEncoding {
                encoding: AudioEncoding::OggOpus,
                provider: "polly",
            })
        );
    }

    #[test]
    fn test_encoding_serializes_with_provider_names() {
        let json = serde_json::to_string(&AudioEncoding::OggOpus).unwrap();
        assert_eq!(json, "\"OGG_OPUS\"");
        let parsed: AudioEncoding = serde_json::from_str("\"LINEAR16\"").unwrap();
        assert_eq!(parsed, AudioEncoding::Linear16);
        assert!(AudioEncoding::Pcm.is_headerless());
        assert!(!AudioEncoding::Mp3.is_headerless());
    }
}
