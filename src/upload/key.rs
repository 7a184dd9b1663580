//! Storage key derivation
//!
//! Keys have the shape `<category>/<epoch millis>-<token>-<filename>`. The
//! timestamp only orders keys; uniqueness comes from the random token, so two
//! keys generated within the same millisecond still differ.
//!
//! `category` is used verbatim as a path segment. No traversal sanitization
//! is applied.

use crate::config::KeyFormat;
use chrono::Utc;
use rand::Rng;

/// Folder used when no category is given
pub const DEFAULT_CATEGORY: &str = "uploads";

/// 13 base36 characters, ~67 bits of entropy
pub const TOKEN_LEN: usize = 13;

const TOKEN_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Derives unique storage keys from original filenames
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyGenerator {
    format: KeyFormat,
}

impl KeyGenerator {
    pub fn new(format: KeyFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> KeyFormat {
        self.format
    }

    /// Generate a key for `filename` under `category` (or `uploads/`)
    pub fn generate(&self, filename: &str, category: Option<&str>) -> String {
        let folder = match category {
            Some(c) if !c.is_empty() => c,
            _ => DEFAULT_CATEGORY,
        };

        let tail = match (filename.rsplit_once('.'), self.format) {
            (Some((base_name, extension)), _) => format!("{}.{}", base_name, extension),
            (None, KeyFormat::Standard) => filename.to_string(),
            // Old keys treated the whole name as the extension
            (None, KeyFormat::Legacy) => format!(".{}", filename),
        };

        format!(
            "{}/{}-{}-{}",
            folder,
            Utc::now().timestamp_millis(),
            random_token(),
            tail
        )
    }
}

/// Lowercase alphanumeric token, safe in URLs and on case-insensitive stores
fn random_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LEN)
        .map(|_| char::from(TOKEN_ALPHABET[rng.random_range(0..TOKEN_ALPHABET.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_is_uniform_base36() {
        let tokens: Vec<String> = (0..2000).map(|_| random_token()).collect();
        assert!(tokens.iter().all(|t| t.len() == TOKEN_LEN));

        let chars: Vec<char> = tokens.iter().flat_map(|t| t.chars()).collect();
        assert!(chars
            .iter()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));

        // Digits are 10 of 36 symbols
        let digits = chars.iter().filter(|c| c.is_ascii_digit()).count();
        let share = digits as f64 / chars.len() as f64;
        assert!((0.24..0.32).contains(&share), "digit share {}", share);
    }

    /// Split a key into (folder, millis, token, tail)
    fn parts(key: &str) -> (&str, &str, &str, &str) {
        let (folder, rest) = key.split_once('/').unwrap();
        let mut it = rest.splitn(3, '-');
        (folder, it.next().unwrap(), it.next().unwrap(), it.next().unwrap())
    }

    #[test]
    fn test_key_layout() {
        let key = KeyGenerator::default().generate("photo.png", Some("products"));
        let (folder, millis, token, tail) = parts(&key);

        assert_eq!(folder, "products");
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_eq!(tail, "photo.png");
        assert!(key.ends_with("-photo.png"));
    }

    #[test]
    fn test_default_and_empty_category() {
        let generator = KeyGenerator::default();
        assert!(generator.generate("a.txt", None).starts_with("uploads/"));
        assert!(generator.generate("a.txt", Some("")).starts_with("uploads/"));
    }

    #[test]
    fn test_category_passes_through_unsanitized() {
        let key = KeyGenerator::default().generate("a.txt", Some("../gallery/2024"));
        assert!(key.starts_with("../gallery/2024/"));
    }

    #[test]
    fn test_splits_on_last_dot() {
        let key = KeyGenerator::default().generate("archive.tar.gz", None);
        assert!(key.ends_with("-archive.tar.gz"));
    }

    #[test]
    fn test_extensionless_standard() {
        let key = KeyGenerator::new(KeyFormat::Standard).generate("README", None);
        assert!(key.ends_with("-README"));
        assert!(!key.ends_with('.'));
    }

    #[test]
    fn test_extensionless_legacy() {
        let key = KeyGenerator::new(KeyFormat::Legacy).generate("README", None);
        assert!(key.ends_with("-.README"));
    }

    #[test]
    fn test_no_collisions_in_tight_loop() {
        let generator = KeyGenerator::default();
        let keys: HashSet<String> = (0..10_000)
            .map(|_| generator.generate("photo.png", Some("products")))
            .collect();
        assert_eq!(keys.len(), 10_000);
    }
}
