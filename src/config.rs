use {
    base64ct::{Base64, Encoding, Error},
    figment::{
        providers::{Env, Format, Toml},
        Figment,
    },
    hmac::{Hmac, NewMac},
    rocket::serde::{de, Deserialize},
    sha2::Sha256,
    std::{fmt, path::PathBuf},
};

/// Largest accepted payment screenshot after base64 decoding, unless configured otherwise.
pub const DEFAULT_MAX_SCREENSHOT_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// The key used for JWT encryption. Should be base64 decodable.
    #[serde(deserialize_with = "deserialize_base64_to_hmac")]
    pub jwt_key: Hmac<Sha256>,

    /// Outgoing mail settings. Without them, notifications are only written to the log.
    #[serde(default)]
    pub mail: Option<MailConfig>,

    /// Directory payment screenshots are stored in and served from.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    #[serde(default = "default_max_screenshot_bytes")]
    pub max_screenshot_bytes: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MailConfig {
    /// The address notifications are sent from.
    pub email: lettre::Address,

    /// Display name next to the sender address.
    #[serde(default = "default_sender_name")]
    pub sender_name: String,

    /// Password for the email.
    pub email_creds: String,

    /// The SMTP server which the email belongs to.
    pub smtp_server: String,
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_screenshot_bytes() -> usize {
    DEFAULT_MAX_SCREENSHOT_BYTES
}

fn default_sender_name() -> String {
    "Book Club".to_string()
}

/// Rocket's own configuration sources, overlaid with `Bookclub.toml` and `BOOKCLUB_`-prefixed
/// environment variables.
#[must_use]
pub fn figment() -> Figment {
    rocket::Config::figment()
        .merge(Toml::file("Bookclub.toml").nested())
        .merge(Env::prefixed("BOOKCLUB_").global())
}

/// Deserializes standard base64 in constant time into a HMAC key.
fn deserialize_base64_to_hmac<'de, D: de::Deserializer<'de>>(
    de: D,
) -> Result<Hmac<Sha256>, D::Error> {
    use de::Unexpected::Str;

    struct Visitor;

    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Hmac<Sha256>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("padded base64 string")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            let bytes = Base64::decode_vec(value).map_err(|err| match err {
                Error::InvalidEncoding | Error::InvalidLength => {
                    E::invalid_value(Str(value), &"a base64 string")
                }
            })?;
            self.visit_bytes(&bytes)
        }

        fn visit_bytes<E: de::Error>(self, value: &[u8]) -> Result<Self::Value, E> {
            Hmac::new_from_slice(value).map_err(|_| E::custom("unusable HMAC key"))
        }
    }

    de.deserialize_any(Visitor)
}
