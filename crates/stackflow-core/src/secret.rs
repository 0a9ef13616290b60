//! Secret provisioning
//!
//! Credentials either come from the operator or are generated during apply
//! by a generator node in the graph. Both paths end up as a `SecretValue`,
//! whose sensitivity cannot be cleared by any transform. Encoding (base64)
//! is a transport format only and keeps the value sensitive.

use crate::deferred::{DeferredValue, Resolution};
use crate::error::{Result, StackError};
use crate::graph::StackBuilder;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;

const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const NUMERIC: &[u8] = b"0123456789";
const DEFAULT_SPECIAL: &str = "!@#$%&*()-_=+[]{}<>:?";
const MAX_LENGTH: usize = 1024;

/// A value whose `Debug`/`Display` never print it. `reveal` is the only way
/// to read the plaintext.
#[derive(Clone, PartialEq, Eq)]
pub struct Sensitive<T>(T);

impl<T> Sensitive<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn reveal(&self) -> &T {
        &self.0
    }

    pub fn into_revealed(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[secret]")
    }
}

impl<T> fmt::Display for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[secret]")
    }
}

/// A deferred string permanently tagged sensitive.
#[derive(Clone)]
pub struct SecretValue(DeferredValue<String>);

impl SecretValue {
    /// Wrap an operator-supplied secret.
    pub fn supplied(value: impl Into<String>) -> Self {
        Self(DeferredValue::known(value.into()).mark_sensitive())
    }

    pub(crate) fn from_deferred(value: DeferredValue<String>) -> Self {
        Self(value.mark_sensitive())
    }

    pub fn value(&self) -> &DeferredValue<String> {
        &self.0
    }

    pub fn into_value(self) -> DeferredValue<String> {
        self.0
    }

    /// Transform the plaintext; the result stays secret.
    pub fn map<F>(&self, f: F) -> SecretValue
    where
        F: FnOnce(String) -> String + Send + 'static,
    {
        Self(self.0.map(f))
    }

    pub fn encoded(&self, encoding: SecretEncoding) -> SecretValue {
        self.map(move |plain| encoding.encode(&plain))
    }

    /// Wait for the secret. The result is wrapped so it cannot be logged by
    /// accident.
    pub async fn resolve(&self) -> Resolution<Sensitive<String>> {
        self.0.resolve().await.map(Sensitive::new)
    }

    pub fn peek(&self) -> Option<Resolution<Sensitive<String>>> {
        self.0.peek().map(|r| r.map(Sensitive::new))
    }
}

impl From<SecretValue> for DeferredValue<String> {
    fn from(secret: SecretValue) -> Self {
        secret.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretValue").field(&"[secret]").finish()
    }
}

/// Reversible transport encoding applied to a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretEncoding {
    Plain,
    Base64,
}

impl SecretEncoding {
    pub fn encode(&self, plain: &str) -> String {
        match self {
            SecretEncoding::Plain => plain.to_string(),
            SecretEncoding::Base64 => STANDARD.encode(plain.as_bytes()),
        }
    }
}

/// Length and character-class rules for a generated secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretPolicy {
    pub length: usize,
    pub lower: bool,
    pub upper: bool,
    pub numeric: bool,
    /// Allowed special characters; `None` disables the class.
    pub special: Option<String>,
    pub min_lower: usize,
    pub min_upper: usize,
    pub min_numeric: usize,
    pub min_special: usize,
}

impl SecretPolicy {
    /// Letters, digits and the default special set.
    pub fn password(length: usize) -> Self {
        Self {
            length,
            lower: true,
            upper: true,
            numeric: true,
            special: Some(DEFAULT_SPECIAL.to_string()),
            min_lower: 0,
            min_upper: 0,
            min_numeric: 0,
            min_special: 0,
        }
    }

    /// Letters and digits only.
    pub fn alphanumeric(length: usize) -> Self {
        Self {
            special: None,
            ..Self::password(length)
        }
    }

    /// Restrict the special characters to `chars`.
    pub fn with_special(mut self, chars: &str) -> Self {
        self.special = Some(chars.to_string());
        self
    }

    pub fn with_minimums(
        mut self,
        lower: usize,
        upper: usize,
        numeric: usize,
        special: usize,
    ) -> Self {
        self.min_lower = lower;
        self.min_upper = upper;
        self.min_numeric = numeric;
        self.min_special = special;
        self
    }

    /// Every character the policy may emit.
    pub fn alphabet(&self) -> Vec<u8> {
        self.classes()
            .into_iter()
            .flat_map(|(chars, _)| chars)
            .collect()
    }

    fn classes(&self) -> Vec<(Vec<u8>, usize)> {
        let mut classes = Vec::new();
        if self.lower {
            classes.push((LOWER.to_vec(), self.min_lower));
        }
        if self.upper {
            classes.push((UPPER.to_vec(), self.min_upper));
        }
        if self.numeric {
            classes.push((NUMERIC.to_vec(), self.min_numeric));
        }
        if let Some(special) = &self.special {
            let mut chars: Vec<u8> = special.bytes().collect();
            chars.sort_unstable();
            chars.dedup();
            classes.push((chars, self.min_special));
        }
        classes
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.length == 0 || self.length > MAX_LENGTH {
            return Err(format!(
                "length {} is outside 1..={}",
                self.length, MAX_LENGTH
            ));
        }
        if let Some(special) = &self.special {
            if special.is_empty() {
                return Err("special character set is empty".to_string());
            }
            if let Some(c) = special
                .chars()
                .find(|c| !c.is_ascii_punctuation())
            {
                return Err(format!("'{}' is not an allowed special character", c));
            }
        }
        if !(self.lower || self.upper || self.numeric || self.special.is_some()) {
            return Err("no character class enabled".to_string());
        }

        let disabled_minimum = (!self.lower && self.min_lower > 0)
            || (!self.upper && self.min_upper > 0)
            || (!self.numeric && self.min_numeric > 0)
            || (self.special.is_none() && self.min_special > 0);
        if disabled_minimum {
            return Err("minimum set for a disabled character class".to_string());
        }

        let required = self.min_lower + self.min_upper + self.min_numeric + self.min_special;
        if required > self.length {
            return Err(format!(
                "minimum counts require {} characters but length is {}",
                required, self.length
            ));
        }
        Ok(())
    }
}

/// Produces random secrets satisfying a `SecretPolicy`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretGenerator;

impl SecretGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, name: &str, policy: &SecretPolicy) -> Result<String> {
        policy
            .validate()
            .map_err(|reason| StackError::SecretGeneration {
                name: name.to_string(),
                reason,
            })?;

        let mut rng = rand::thread_rng();
        let mut out: Vec<u8> = Vec::with_capacity(policy.length);

        let classes = policy.classes();
        for (chars, minimum) in &classes {
            for _ in 0..*minimum {
                out.push(chars[rng.gen_range(0..chars.len())]);
            }
        }

        let alphabet = policy.alphabet();
        while out.len() < policy.length {
            out.push(alphabet[rng.gen_range(0..alphabet.len())]);
        }
        out.shuffle(&mut rng);

        tracing::debug!(secret = %name, length = policy.length, "Generated secret");
        Ok(out.into_iter().map(char::from).collect())
    }
}

/// Use the operator's secret when supplied, otherwise declare a generator
/// node for it.
pub fn provision(
    stack: &mut StackBuilder,
    name: &str,
    supplied: Option<String>,
    policy: SecretPolicy,
) -> Result<SecretValue> {
    match supplied {
        Some(value) => {
            tracing::debug!(secret = %name, "Using operator-supplied secret");
            Ok(SecretValue::supplied(value))
        }
        None => stack.generate_secret(name, policy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restricted_password_policy() {
        let policy = SecretPolicy::password(16).with_special("_%");
        let secret = SecretGenerator::new().generate("db-password", &policy).unwrap();

        assert_eq!(secret.len(), 16);
        assert!(
            secret
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '%')
        );
    }

    #[test]
    fn test_alphanumeric_policy() {
        let policy = SecretPolicy::alphanumeric(64);
        let secret = SecretGenerator::new().generate("secret-key-base", &policy).unwrap();

        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_minimums_are_honoured() {
        let policy = SecretPolicy::password(8)
            .with_special("_")
            .with_minimums(1, 1, 1, 5);
        let secret = SecretGenerator::new().generate("pw", &policy).unwrap();

        assert!(secret.chars().filter(|c| *c == '_').count() >= 5);
        assert!(secret.chars().any(|c| c.is_ascii_lowercase()));
        assert!(secret.chars().any(|c| c.is_ascii_uppercase()));
        assert!(secret.chars().any(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_invalid_policies_are_rejected() {
        let generator = SecretGenerator::new();

        let zero = SecretPolicy::password(0);
        assert!(matches!(
            generator.generate("a", &zero),
            Err(StackError::SecretGeneration { .. })
        ));

        let empty_special = SecretPolicy::password(16).with_special("");
        assert!(generator.generate("b", &empty_special).is_err());

        let whitespace = SecretPolicy::password(16).with_special(" ");
        assert!(generator.generate("c", &whitespace).is_err());

        let too_many = SecretPolicy::password(4).with_minimums(2, 2, 1, 0);
        assert!(generator.generate("d", &too_many).is_err());

        let disabled = SecretPolicy::alphanumeric(16).with_minimums(0, 0, 0, 1);
        assert!(generator.generate("e", &disabled).is_err());

        let nothing = SecretPolicy {
            lower: false,
            upper: false,
            numeric: false,
            special: None,
            ..SecretPolicy::password(16)
        };
        assert!(generator.generate("f", &nothing).is_err());
    }

    #[test]
    fn test_generated_secrets_differ() {
        let generator = SecretGenerator::new();
        let policy = SecretPolicy::alphanumeric(32);
        let a = generator.generate("a", &policy).unwrap();
        let b = generator.generate("b", &policy).unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_encoding_keeps_secret_sensitive() {
        let secret = SecretValue::supplied("key");
        let encoded = secret.encoded(SecretEncoding::Base64);

        assert!(encoded.value().is_sensitive());
        let resolved = encoded.resolve().await.unwrap();
        assert_eq!(resolved.reveal(), "a2V5");
        assert_eq!(format!("{}", resolved), "[secret]");
        assert_eq!(format!("{:?}", resolved), "[secret]");
    }

    #[test]
    fn test_sensitivity_survives_conversion() {
        let secret = SecretValue::supplied("hunter2");
        let upper = secret.map(|s| s.to_uppercase());
        let plain: DeferredValue<String> = upper.into();
        let derived = plain.map(|s| s.len().to_string());

        assert!(derived.is_sensitive());
        assert!(!format!("{:?}", secret).contains("hunter2"));
    }

    #[test]
    fn test_supplied_secret_is_not_regenerated() {
        let mut stack = StackBuilder::new("test");
        let secret = provision(
            &mut stack,
            "db-password",
            Some("operator".to_string()),
            SecretPolicy::password(16),
        )
        .unwrap();

        assert!(secret.value().dependencies().is_empty());
        assert_eq!(
            secret.peek().unwrap().unwrap().into_revealed(),
            "operator".to_string()
        );
        assert_eq!(stack.len(), 0);
    }

    #[test]
    fn test_missing_secret_declares_generator() {
        let mut stack = StackBuilder::new("test");
        let secret =
            provision(&mut stack, "db-password", None, SecretPolicy::password(16)).unwrap();

        assert_eq!(stack.len(), 1);
        assert!(secret.peek().is_none());
        assert!(secret.value().is_sensitive());
    }
}
