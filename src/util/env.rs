//! Process configuration.
//!
//! `Env` is deserialized straight from `(key, value)` pairs with a small serde deserializer in
//! the spirit of the [`envy`] crate, so the same struct can be built from the real environment
//! (plus `.env` through `dotenvy`) or from a plain iterator in tests.
//!
//! [`envy`]: https://github.com/softprops/envy

use std::iter::empty;

use serde::Deserialize;
use serde::de::value::{MapDeserializer, SeqDeserializer};
use serde::de::{self, IntoDeserializer};
use thiserror::Error;

use crate::constants::{
    DEFAULT_CORS_ALLOW_ORIGINS, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL,
    DEFAULT_HELIX_BASE_URL, DEFAULT_PORT, DEFAULT_SERVICE_NAME, DEFAULT_STATIC_DIR,
    DEFAULT_STREAM_LANGUAGE, DEFAULT_TOKEN_URL, DEFAULT_UPSTREAM_TIMEOUT_SECS,
};
use crate::util::secrets::Secret;

pub const VAR_CLIENT_ID: &str = "TWITCH_CLIENT_ID";
pub const VAR_CLIENT_SECRET: &str = "TWITCH_CLIENT_SECRET";
pub const VAR_GEMINI_API_KEY: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Env {
    pub twitch_client_id: Option<String>,
    pub twitch_client_secret: Option<Secret>,
    pub gemini_api_key: Option<Secret>,

    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
    #[serde(default = "default_cors_allow_origins")]
    pub cors_allow_origins: String,
    #[serde(default = "default_stream_language")]
    pub stream_language: String,
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,

    #[serde(default = "default_helix_base_url")]
    pub helix_base_url: String,
    #[serde(default = "default_token_url")]
    pub twitch_token_url: String,
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,

    #[serde(default)]
    pub log_format: LogFormat,
    pub otel_exporter_otlp_endpoint: Option<String>,
    #[serde(default = "default_service_name")]
    pub otel_service_name: String,
}

impl Env {
    pub fn new() -> EnvResult<Self> {
        Ok(from_env::<Env>()?)
    }

    /// Twitch application client id; blank counts as unset.
    pub fn client_id(&self) -> ConfigResult<&str> {
        self.twitch_client_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ConfigError::Missing(VAR_CLIENT_ID))
    }

    pub fn client_secret(&self) -> ConfigResult<&Secret> {
        self.twitch_client_secret
            .as_ref()
            .filter(|secret| !secret.is_empty())
            .ok_or(ConfigError::Missing(VAR_CLIENT_SECRET))
    }

    pub fn gemini_key(&self) -> ConfigResult<&Secret> {
        self.gemini_api_key
            .as_ref()
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::Missing(VAR_GEMINI_API_KEY))
    }

    pub fn otel_endpoint(&self) -> Option<&str> {
        self.otel_exporter_otlp_endpoint
            .as_deref()
            .filter(|url| !url.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_gemini_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_static_dir() -> String {
    DEFAULT_STATIC_DIR.to_string()
}

fn default_cors_allow_origins() -> String {
    DEFAULT_CORS_ALLOW_ORIGINS.to_string()
}

fn default_stream_language() -> String {
    DEFAULT_STREAM_LANGUAGE.to_string()
}

fn default_upstream_timeout_secs() -> u64 {
    DEFAULT_UPSTREAM_TIMEOUT_SECS
}

fn default_helix_base_url() -> String {
    DEFAULT_HELIX_BASE_URL.to_string()
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

fn default_gemini_base_url() -> String {
    DEFAULT_GEMINI_BASE_URL.to_string()
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

// ---
//  Deserializer implementation
// ---

/// A single variable's value, tagged with the variable name for error messages.
struct Val(String, String);

struct EnvDeserializer<Iter: Iterator<Item = (String, String)>> {
    vars: Iter,
}

impl<'de> IntoDeserializer<'de, EnvDeserializeError> for Val {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

macro_rules! forward_parsed {
    ($($ty:ident => $method:ident,)*) => {
        $(
            fn $method<V>(self, visitor: V) -> Result<V::Value, EnvDeserializeError>
            where
                V: de::Visitor<'de>,
            {
                match self.1.trim().parse::<$ty>() {
                    Ok(val) => val.into_deserializer().$method(visitor),
                    Err(e) => Err(de::Error::custom(format_args!(
                        "{e}: while parsing '{}' as {}",
                        self.1, self.0
                    ))),
                }
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for Val {
    type Error = EnvDeserializeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.1.into_deserializer().deserialize_any(visitor)
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        if self.1.is_empty() {
            return SeqDeserializer::new(empty::<Val>()).deserialize_seq(visitor);
        }

        let name = self.0;
        let items: Vec<Val> = self
            .1
            .split(',')
            .map(|item| Val(name.clone(), item.trim().to_owned()))
            .collect();
        SeqDeserializer::new(items.into_iter()).deserialize_seq(visitor)
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V>(
        self,
        _: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V>(
        self,
        _: &'static str,
        _: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_enum(self.1.trim().to_lowercase().into_deserializer())
    }

    forward_parsed! {
        bool => deserialize_bool,
        u8 => deserialize_u8,
        u16 => deserialize_u16,
        u32 => deserialize_u32,
        u64 => deserialize_u64,
        i8 => deserialize_i8,
        i16 => deserialize_i16,
        i32 => deserialize_i32,
        i64 => deserialize_i64,
        f32 => deserialize_f32,
        f64 => deserialize_f64,
    }

    serde::forward_to_deserialize_any! {
        char str string unit bytes byte_buf map
        unit_struct tuple_struct identifier tuple ignored_any struct
    }
}

impl<'de, Iter: Iterator<Item = (String, String)>> de::Deserializer<'de>
    for EnvDeserializer<Iter>
{
    type Error = EnvDeserializeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        let entries = self.vars.map(|(k, v)| (k.clone(), Val(k, v)));
        visitor.visit_map(MapDeserializer::new(entries))
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 u8 u16 u32 u64 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map struct enum identifier ignored_any
    }
}

pub fn from_env<T>() -> Result<T, EnvDeserializeError>
where
    T: de::DeserializeOwned,
{
    from_iter(dotenvy::vars())
}

pub fn from_iter<Iter, T>(iter: Iter) -> Result<T, EnvDeserializeError>
where
    T: de::DeserializeOwned,
    Iter: IntoIterator<Item = (String, String)>,
{
    T::deserialize(EnvDeserializer {
        vars: iter.into_iter(),
    })
}

impl de::Error for EnvDeserializeError {
    fn custom<T>(msg: T) -> Self
    where
        T: std::fmt::Display,
    {
        EnvDeserializeError::Custom(msg.to_string())
    }

    fn missing_field(field: &'static str) -> Self {
        EnvDeserializeError::MissingValue(field.into())
    }
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;
pub type ConfigResult<T> = core::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error(transparent)]
    DeserializationError(#[from] EnvDeserializeError),
}

#[derive(Debug, Error)]
pub enum EnvDeserializeError {
    #[error("env deserialization error: {0}")]
    Custom(String),

    #[error("missing environment variable {0}")]
    MissingValue(String),
}

/// A credential required by an endpoint is not configured.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("server not configured (missing {0})")]
    Missing(&'static str),

    #[error("server misconfigured (invalid {0})")]
    Invalid(&'static str),
}

#[cfg(test)]
pub(crate) fn test_env(vars: &[(&str, &str)]) -> Env {
    from_iter(
        vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string())),
    )
    .expect("test env should deserialize")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults_when_unset() {
        let env = test_env(&[]);

        assert_eq!(env.port, DEFAULT_PORT);
        assert_eq!(env.stream_language, "fr");
        assert_eq!(env.upstream_timeout_secs, 15);
        assert_eq!(env.log_format, LogFormat::Pretty);
        assert_eq!(env.helix_base_url, DEFAULT_HELIX_BASE_URL);
        assert!(env.otel_endpoint().is_none());
    }

    #[test]
    fn test_parses_values() {
        let env = test_env(&[
            ("TWITCH_CLIENT_ID", "abc"),
            ("TWITCH_CLIENT_SECRET", "shh"),
            ("PORT", "8080"),
            ("LOG_FORMAT", "JSON"),
            ("UNRELATED_VARIABLE", "ignored"),
        ]);

        assert_eq!(env.client_id(), Ok("abc"));
        assert_eq!(env.client_secret().map(Secret::expose), Ok("shh"));
        assert_eq!(env.port, 8080);
        assert_eq!(env.log_format, LogFormat::Json);
    }

    #[test]
    fn test_missing_credentials_are_config_errors() {
        let env = test_env(&[("TWITCH_CLIENT_ID", "  "), ("GEMINI_API_KEY", "")]);

        assert_eq!(env.client_id(), Err(ConfigError::Missing(VAR_CLIENT_ID)));
        assert_eq!(
            env.client_secret().map(Secret::expose),
            Err(ConfigError::Missing(VAR_CLIENT_SECRET))
        );
        assert_eq!(
            env.gemini_key().map(Secret::expose),
            Err(ConfigError::Missing(VAR_GEMINI_API_KEY))
        );
    }

    #[test]
    fn test_bad_port_is_rejected() {
        let vars = vec![("PORT".to_string(), "eighty".to_string())];
        let res = from_iter::<_, Env>(vars);

        assert!(matches!(res, Err(EnvDeserializeError::Custom(_))));
    }
}
