//! Tests for configuration management module

#[cfg(test)]
mod tests {
    use super::super::*;

    use tempfile::tempdir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.synthesis_url, "http://localhost:8080/synthesize");
        assert_eq!(settings.default_voice, "nova");
        assert_eq!(settings.autoplay_delay_ms, 2_000);
        assert_eq!(settings.resolve_timeout_ms, 10_000);
        assert_eq!(settings.sample_rate, 24_000);
        assert_eq!(settings.channel_count, 1);
    }

    #[test]
    fn test_settings_save_and_load() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let config_path = dir.path().join("config.json");

        let mut settings = Settings::default();
        settings.synthesis_url = "https://tts.example.com/v1/speech".to_string();
        settings.default_voice = "atlas".to_string();
        settings.autoplay_delay_ms = 500;

        settings.save(&config_path)?;

        assert!(config_path.exists());

        let loaded = Settings::load(&config_path)?;

        assert_eq!(loaded.synthesis_url, "https://tts.example.com/v1/speech");
        assert_eq!(loaded.default_voice, "atlas");
        assert_eq!(loaded.autoplay_delay_ms, 500);
        assert_eq!(loaded.sample_rate, 24_000);

        Ok(())
    }

    #[test]
    fn test_settings_validation() {
        let valid_settings = Settings::default();
        assert!(valid_settings.validate().is_ok());

        let mut empty_url = Settings::default();
        empty_url.synthesis_url = String::new();
        assert!(empty_url.validate().is_err());

        let mut excessive_delay = Settings::default();
        excessive_delay.autoplay_delay_ms = MAX_AUTOPLAY_DELAY_MS + 1;
        assert!(excessive_delay.validate().is_err());

        let mut zero_rate = Settings::default();
        zero_rate.sample_rate = 0;
        assert!(zero_rate.validate().is_err());
    }

    #[test]
    fn test_default_path() {
        let path = Settings::default_path();
        assert!(path.to_str().unwrap().contains(".config/slidecast/config.json"));
    }
}
