use super::voice::VoiceConfig;

/// Optional text → markup transform applied to each segment before synthesis.
///
/// `wire_len` must equal `enrich(text, voice).len()`; the segmenter budgets
/// against it so every payload stays under the provider's byte limit.
pub trait MarkupEnricher: Send + Sync {
    fn enrich(&self, text: &str, voice: &VoiceConfig) -> String;

    fn wire_len(&self, text: &str, voice: &VoiceConfig) -> usize {
        self.enrich(text, voice).len()
    }

    /// Whether the payload must be sent to the provider as markup
    fn is_markup(&self) -> bool;
}

/// Sends text unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextEnricher;

impl MarkupEnricher for PlainTextEnricher {
    fn enrich(&self, text: &str, _voice: &VoiceConfig) -> String {
        text.to_string()
    }

    fn wire_len(&self, text: &str, _voice: &VoiceConfig) -> usize {
        text.len()
    }

    fn is_markup(&self) -> bool {
        false
    }
}

/// Escapes text and wraps it in `<speak>`, optionally with a `<prosody>` element
/// for providers that take rate/pitch/volume only through SSML.
#[derive(Debug, Clone, Copy, Default)]
pub struct SsmlEnricher {
    prosody: bool,
}

impl SsmlEnricher {
    pub fn new() -> Self {
        Self { prosody: false }
    }

    pub fn with_prosody() -> Self {
        Self { prosody: true }
    }

    fn open_close(&self, voice: &VoiceConfig) -> (String, &'static str) {
        if self.prosody && !voice.has_default_prosody() {
            let open = format!(
                "<speak><prosody rate=\"{:.0}%\" pitch=\"{:+.1}st\" volume=\"{:+.1}dB\">",
                voice.speaking_rate * 100.0,
                voice.pitch,
                voice.volume_gain_db
            );
            (open, "</prosody></speak>")
        } else {
            ("<speak>".to_string(), "</speak>")
        }
    }
}

impl MarkupEnricher for SsmlEnricher {
    fn enrich(&self, text: &str, voice: &VoiceConfig) -> String {
        let (open, close) = self.open_close(voice);
        let mut out = String::with_capacity(open.len() + escaped_len(text) + close.len());
        out.push_str(&open);
        for ch in text.chars() {
            match escape(ch) {
                Some(entity) => out.push_str(entity),
                None => out.push(ch),
            }
        }
        out.push_str(close);
        out
    }

    fn wire_len(&self, text: &str, voice: &VoiceConfig) -> usize {
        let (open, close) = self.open_close(voice);
        open.len() + escaped_len(text) + close.len()
    }

    fn is_markup(&self) -> bool {
        true
    }
}

fn escape(ch: char) -> Option<&'static str> {
    match ch {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        '"' => Some("&quot;"),
        '\'' => Some("&apos;"),
        _ => None,
    }
}

fn escaped_len(text: &str) -> usize {
    text.chars()
        .map(|ch| escape(ch).map(str::len).unwrap_or_else(|| ch.len_utf8()))
        .sum()
}
