//! Account password generation.

use crate::error::SecretError;
use rand::TryRngCore;
use rand::rngs::OsRng;
use std::fmt;
use zeroize::Zeroizing;

pub const DEFAULT_PASSWORD_LENGTH: usize = 12;

/// ASCII letters, digits and punctuation.
pub const PASSWORD_ALPHABET: &str = concat!(
    "abcdefghijklmnopqrstuvwxyz",
    "ABCDEFGHIJKLMNOPQRSTUVWXYZ",
    "0123456789",
    "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~",
);

/// A freshly generated credential.
///
/// Zeroized on drop and redacted in `Debug`; the value is only reachable
/// through [`GeneratedSecret::expose`].
pub struct GeneratedSecret(Zeroizing<String>);

impl GeneratedSecret {
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for GeneratedSecret {
    fn from(value: String) -> Self {
        Self(Zeroizing::new(value))
    }
}

impl fmt::Debug for GeneratedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GeneratedSecret(<redacted>)")
    }
}

/// Generate a password drawn uniformly from [`PASSWORD_ALPHABET`] using the
/// operating system CSPRNG.
pub fn generate_password(length: usize) -> Result<GeneratedSecret, SecretError> {
    if length == 0 {
        return Err(SecretError::InvalidLength);
    }

    let alphabet = PASSWORD_ALPHABET.as_bytes();
    let size = alphabet.len() as u64;
    // Rejection zone keeps every symbol equally likely.
    let zone = (1u64 << 32) - ((1u64 << 32) % size);

    let mut rng = OsRng;
    let mut password = Zeroizing::new(String::with_capacity(length));
    while password.len() < length {
        let value = rng
            .try_next_u32()
            .map_err(|e| SecretError::RandomSource(e.to_string()))? as u64;
        if value < zone {
            password.push(alphabet[(value % size) as usize] as char);
        }
    }

    Ok(GeneratedSecret(password))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_alphabet_has_letters_digits_and_punctuation() {
        assert_eq!(PASSWORD_ALPHABET.len(), 94);
        assert!(PASSWORD_ALPHABET.chars().all(|c| c.is_ascii_graphic()));
        let unique: HashSet<char> = PASSWORD_ALPHABET.chars().collect();
        assert_eq!(unique.len(), PASSWORD_ALPHABET.len());
    }

    #[test]
    fn test_generate_default_length() {
        let secret = generate_password(DEFAULT_PASSWORD_LENGTH).unwrap();
        assert_eq!(secret.len(), 12);
    }

    #[test]
    fn test_generate_exact_length_and_alphabet() {
        for length in [1, 2, 12, 31, 64, 257] {
            let secret = generate_password(length).unwrap();
            assert_eq!(secret.expose().chars().count(), length);
            assert!(
                secret
                    .expose()
                    .chars()
                    .all(|c| PASSWORD_ALPHABET.contains(c))
            );
        }
    }

    #[test]
    fn test_generate_rejects_zero_length() {
        assert!(matches!(
            generate_password(0),
            Err(SecretError::InvalidLength)
        ));
    }

    #[test]
    fn test_generate_no_duplicates_in_1000_runs() {
        let generated: HashSet<String> = (0..1000)
            .map(|_| generate_password(12).unwrap().expose().to_string())
            .collect();
        assert_eq!(generated.len(), 1000);
    }

    #[test]
    fn test_debug_is_redacted() {
        let secret = GeneratedSecret::from("hunter2".to_string());
        let debug = format!("{secret:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("redacted"));
    }
}
