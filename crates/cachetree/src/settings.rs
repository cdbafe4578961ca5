// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Runtime switches of a cache tree.

use std::borrow::Cow;

/// Attribute prefix under which cached collections are attached by default.
pub const DEFAULT_COLLECTION_PREFIX: &str = "_cached_";

/// Runtime switches.
///
/// # Examples
///
/// ```
/// use cachetree::Settings;
///
/// let settings = Settings::default().invalidation(false).collection_prefix("cached_");
/// assert!(!settings.is_disabled());
/// assert!(!settings.is_invalidation_enabled());
/// assert_eq!(settings.prefix(), "cached_");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(default, deny_unknown_fields))]
pub struct Settings {
    disabled: bool,
    invalidation: bool,
    collection_prefix: Cow<'static, str>,
}

impl Settings {
    /// Caching and invalidation on, cached collections under [`DEFAULT_COLLECTION_PREFIX`].
    pub const DEFAULT: Self = Self {
        disabled: false,
        invalidation: true,
        collection_prefix: Cow::Borrowed(DEFAULT_COLLECTION_PREFIX),
    };

    /// Turns the whole cache off: lookups go straight to the data source and nothing is
    /// invalidated.
    #[must_use]
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Turns invalidation on or off. Lookups still read and fill the cache.
    #[must_use]
    pub fn invalidation(mut self, enabled: bool) -> Self {
        self.invalidation = enabled;
        self
    }

    /// Sets the attribute prefix of cached collections.
    #[must_use]
    pub fn collection_prefix(mut self, prefix: impl Into<Cow<'static, str>>) -> Self {
        self.collection_prefix = prefix.into();
        self
    }

    /// Returns `true` if the cache is turned off.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns `true` if changes invalidate cached trees.
    #[must_use]
    pub fn is_invalidation_enabled(&self) -> bool {
        self.invalidation && !self.disabled
    }

    /// Returns the attribute prefix of cached collections.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.collection_prefix
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_implies_no_invalidation() {
        let settings = Settings::default().disabled(true);
        assert!(settings.is_disabled());
        assert!(!settings.is_invalidation_enabled());
    }

    #[test]
    fn default_prefix() {
        assert_eq!(Settings::default().prefix(), "_cached_");
        assert!(Settings::DEFAULT.is_invalidation_enabled());
    }
}
