use std::path::PathBuf;
use std::time::Duration;

use moodframe_engine::gemini::GeminiSettings;
use moodframe_engine::openai::OpenAiSettings;
use moodframe_engine::replicate::ReplicateSettings;
use moodframe_engine::storage::S3Settings;

pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_VENDOR_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Process configuration resolved once at startup.
#[derive(Clone)]
pub struct AppConfig {
    pub gemini: GeminiSettings,
    pub replicate: ReplicateSettings,
    pub openai: OpenAiSettings,
    pub s3: S3Settings,
    pub vendor_timeout: Duration,
    pub max_body_bytes: usize,
    pub incident_log: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env { lookup: &lookup };

        let gemini_key = env
            .optional("GOOGLE_API_KEY")
            .or_else(|| env.optional("GEMINI_API_KEY"))
            .ok_or(ConfigError::Missing("GOOGLE_API_KEY"))?;
        let replicate_token = env.required("REPLICATE_API_TOKEN")?;
        let openai_key = env.required("OPENAI_API_KEY")?;
        let region = env.required("S3_REGION")?;
        let bucket = env.required("S3_BUCKET_NAME")?;
        let access_key_id = env.required("AWS_ACCESS_KEY_ID")?;
        let secret_access_key = env.required("AWS_SECRET_ACCESS_KEY")?;

        let vendor_timeout = Duration::from_secs(env.parsed(
            "MOODFRAME_VENDOR_TIMEOUT_SECS",
            DEFAULT_VENDOR_TIMEOUT_SECS,
        )?);
        if vendor_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                name: "MOODFRAME_VENDOR_TIMEOUT_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }
        let max_body_bytes = env.parsed("MOODFRAME_MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?;

        let mut replicate = ReplicateSettings::new(replicate_token, vendor_timeout);
        replicate.api_base = env.optional("REPLICATE_API_BASE");
        replicate.model = env.optional("REPLICATE_MODEL");

        Ok(Self {
            gemini: GeminiSettings {
                api_key: gemini_key,
                api_base: env.optional("GEMINI_API_BASE"),
                model: env.optional("GEMINI_IMAGE_MODEL"),
                timeout: vendor_timeout,
            },
            replicate,
            openai: OpenAiSettings {
                api_key: openai_key,
                api_base: env.optional("OPENAI_API_BASE"),
                text_model: env.optional("OPENAI_TEXT_MODEL"),
                timeout: vendor_timeout,
            },
            s3: S3Settings {
                region,
                bucket,
                access_key_id,
                secret_access_key,
                endpoint_url: env.optional("S3_ENDPOINT_URL"),
                public_base_url: env.optional("S3_PUBLIC_BASE_URL"),
                timeout: vendor_timeout,
            },
            vendor_timeout,
            max_body_bytes,
            incident_log: env.optional("MOODFRAME_INCIDENT_LOG").map(PathBuf::from),
        })
    }

    /// Secret-free view for `check-config` and startup logs.
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        let or_default = |value: &Option<String>| {
            value.clone().unwrap_or_else(|| "(default)".to_string())
        };
        vec![
            ("gemini.model", or_default(&self.gemini.model)),
            ("replicate.model", or_default(&self.replicate.model)),
            ("openai.text_model", or_default(&self.openai.text_model)),
            ("s3.region", self.s3.region.clone()),
            ("s3.bucket", self.s3.bucket.clone()),
            ("s3.endpoint_url", or_default(&self.s3.endpoint_url)),
            ("s3.public_base_url", or_default(&self.s3.public_base_url)),
            ("vendor_timeout_secs", self.vendor_timeout.as_secs().to_string()),
            ("max_body_bytes", self.max_body_bytes.to_string()),
            (
                "incident_log",
                self.incident_log
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "(disabled)".to_string()),
            ),
        ]
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn parsed<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|err: T::Err| ConfigError::Invalid {
                name,
                reason: err.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("GOOGLE_API_KEY", "g-key"),
            ("REPLICATE_API_TOKEN", "r-token"),
            ("OPENAI_API_KEY", "sk-key"),
            ("S3_REGION", "ap-northeast-2"),
            ("S3_BUCKET_NAME", "moodframe"),
            ("AWS_ACCESS_KEY_ID", "AKID"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|key| env.get(key).map(|value| value.to_string()))
    }

    #[test]
    fn loads_required_values_with_defaults() -> anyhow::Result<()> {
        let config = load(&base_env())?;
        assert_eq!(config.gemini.api_key, "g-key");
        assert_eq!(config.s3.bucket, "moodframe");
        assert_eq!(config.vendor_timeout, Duration::from_secs(120));
        assert_eq!(config.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert_eq!(config.replicate.timeout, config.vendor_timeout);
        assert!(config.incident_log.is_none());
        assert!(config.s3.endpoint_url.is_none());
        Ok(())
    }

    #[test]
    fn each_required_variable_fails_fast() {
        for name in [
            "REPLICATE_API_TOKEN",
            "OPENAI_API_KEY",
            "S3_REGION",
            "S3_BUCKET_NAME",
            "AWS_ACCESS_KEY_ID",
            "AWS_SECRET_ACCESS_KEY",
        ] {
            let mut env = base_env();
            env.remove(name);
            assert_eq!(load(&env).err(), Some(ConfigError::Missing(name)));
        }
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut env = base_env();
        env.insert("OPENAI_API_KEY", "   ");
        assert_eq!(
            load(&env).err(),
            Some(ConfigError::Missing("OPENAI_API_KEY"))
        );
    }

    #[test]
    fn gemini_key_falls_back_to_alternate_name() -> anyhow::Result<()> {
        let mut env = base_env();
        env.remove("GOOGLE_API_KEY");
        assert_eq!(load(&env).err(), Some(ConfigError::Missing("GOOGLE_API_KEY")));

        env.insert("GEMINI_API_KEY", "alt-key");
        assert_eq!(load(&env)?.gemini.api_key, "alt-key");
        Ok(())
    }

    #[test]
    fn optional_overrides_are_applied() -> anyhow::Result<()> {
        let mut env = base_env();
        env.insert("S3_ENDPOINT_URL", "http://localhost:9000");
        env.insert("OPENAI_TEXT_MODEL", "gpt-4o-mini");
        env.insert("MOODFRAME_VENDOR_TIMEOUT_SECS", "15");
        env.insert("MOODFRAME_MAX_BODY_BYTES", "1024");
        env.insert("MOODFRAME_INCIDENT_LOG", "/tmp/incidents.jsonl");

        let config = load(&env)?;
        assert_eq!(config.s3.endpoint_url.as_deref(), Some("http://localhost:9000"));
        assert_eq!(config.openai.text_model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.openai.timeout, Duration::from_secs(15));
        assert_eq!(config.max_body_bytes, 1024);
        assert_eq!(
            config.incident_log,
            Some(PathBuf::from("/tmp/incidents.jsonl"))
        );
        Ok(())
    }

    #[test]
    fn unparsable_numbers_are_rejected() {
        let mut env = base_env();
        env.insert("MOODFRAME_VENDOR_TIMEOUT_SECS", "soon");
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid {
                name: "MOODFRAME_VENDOR_TIMEOUT_SECS",
                ..
            })
        ));

        env.insert("MOODFRAME_VENDOR_TIMEOUT_SECS", "0");
        assert!(matches!(load(&env), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn summary_never_contains_secrets() -> anyhow::Result<()> {
        let config = load(&base_env())?;
        let rendered = format!("{:?}", config.summary());
        for secret in ["g-key", "r-token", "sk-key", "AKID", "secret"] {
            assert!(!rendered.contains(secret), "summary leaked {secret}");
        }
        Ok(())
    }
}
