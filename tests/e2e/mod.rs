// End-to-end tests for the long-form TTS API
//
// Each test boots the real router on an ephemeral port. The TTS provider is a
// deterministic in-process stub and the object store is a temp directory, so
// tests need no network or cloud credentials and run in parallel.

mod helpers;
mod test_health;
mod test_program;
mod test_tts;
