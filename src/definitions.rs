//! Fallback message for codes the native library cannot describe.
//!
//! When `TryGetErrorMessage` has nothing for a code, the crate still produces
//! a message: a template with a `{code}` placeholder, applied to the numeric
//! code. The output is fully deterministic, so the same code always yields
//! the same bytes.
//!
//! The default template is English. Hosts with their own string tables pass a
//! translated template through [`Config::with_fallback`](crate::Config::with_fallback).
//!
//! ```rust
//! use platform_errors::FallbackMessages;
//!
//! let english = FallbackMessages::default();
//! assert_eq!(english.format(999), "No system message found for code 999.");
//!
//! let german = FallbackMessages::with_template("Keine Systemmeldung für Code {code}.").unwrap();
//! assert_eq!(german.format(-5), "Keine Systemmeldung für Code -5.");
//! ```

use std::borrow::Cow;
use std::fmt;

/// Placeholder replaced by the numeric error code.
pub const CODE_PLACEHOLDER: &str = "{code}";

/// Built-in English template.
pub const DEFAULT_FALLBACK_TEMPLATE: &str = "No system message found for code {code}.";

/// Template for "no system message" fallbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackMessages {
    template: Cow<'static, str>,
}

impl FallbackMessages {
    /// The built-in English template.
    #[inline]
    pub const fn english() -> Self {
        Self {
            template: Cow::Borrowed(DEFAULT_FALLBACK_TEMPLATE),
        }
    }

    /// A custom template.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingPlaceholder`] if `template` has no `{code}`.
    pub fn with_template(template: impl Into<Cow<'static, str>>) -> Result<Self, ConfigError> {
        let template = template.into();
        if !template.contains(CODE_PLACEHOLDER) {
            return Err(ConfigError::MissingPlaceholder {
                template: template.into_owned(),
            });
        }
        Ok(Self { template })
    }

    /// The raw template.
    #[inline]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Apply the template to `code`.
    pub fn format(&self, code: i32) -> String {
        let mut out = String::with_capacity(self.template.len() + 8);
        // Writing into a String cannot fail.
        let _ = self.write_to(&mut out, code);
        out
    }

    /// Write the message for `code` without an intermediate allocation.
    pub fn write_to(&self, f: &mut impl fmt::Write, code: i32) -> fmt::Result {
        let mut parts = self.template.split(CODE_PLACEHOLDER);
        if let Some(first) = parts.next() {
            f.write_str(first)?;
        }
        for part in parts {
            write!(f, "{}", code)?;
            f.write_str(part)?;
        }
        Ok(())
    }
}

impl Default for FallbackMessages {
    fn default() -> Self {
        Self::english()
    }
}

/// Invalid runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The fallback template has no `{code}` placeholder.
    MissingPlaceholder {
        /// The rejected template.
        template: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPlaceholder { template } => write!(
                f,
                "fallback template '{}' has no {} placeholder",
                template, CODE_PLACEHOLDER
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
