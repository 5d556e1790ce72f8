//! Key and tag validation
//!
//! Runs before any filesystem access on every operation that takes a key.

use crate::errors::{CacheError, Result};

/// Maximum key length in characters
pub const MAX_KEY_LENGTH: usize = 250;

/// Characters reserved for internal separators
pub const RESERVED_CHARACTERS: &[char] = &['{', '}', '(', ')', '/', '\\', '@', ':'];

/// Cache key validation
pub trait CacheKey: AsRef<str> {
    /// Validate that this is a valid cache key
    fn validate(&self) -> Result<()> {
        validate_name(self.as_ref(), "Key")
    }
}

impl<T: AsRef<str> + ?Sized> CacheKey for T {}

/// Tags share the key rules so tag index names cannot collide with separators
pub fn validate_tag(tag: &str) -> Result<()> {
    validate_name(tag, "Tag")
}

fn validate_name(name: &str, what: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CacheError::invalid_key(
            name,
            format!("{what} cannot be empty"),
            "Provide a non-empty key",
        ));
    }

    let length = name.chars().count();
    if length > MAX_KEY_LENGTH {
        let preview: String = name.chars().take(50).collect();
        return Err(CacheError::invalid_key(
            &format!("{preview}..."),
            format!("{what} is {length} characters, maximum is {MAX_KEY_LENGTH}"),
            "Use a shorter key",
        ));
    }

    if let Some(c) = name.chars().find(|c| RESERVED_CHARACTERS.contains(c)) {
        return Err(CacheError::invalid_key(
            name,
            format!("{what} contains reserved character '{c}'"),
            "Remove any of {}()/\\@: from the key",
        ));
    }

    if name.contains('\0') {
        return Err(CacheError::invalid_key(
            name,
            format!("{what} contains null bytes"),
            "Remove null bytes from key",
        ));
    }

    Ok(())
}
