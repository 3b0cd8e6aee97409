//! Command-line scrubbing
//!
//! Redacts the values of sensitive arguments (passwords, tokens, keys) from
//! process command lines before they leave the host. A [`DataScrubber`] is
//! built once from the built-in word list plus any custom words and is
//! immutable afterwards, so it can be shared between checks behind an `Arc`.

use regex::Regex;
use std::borrow::Cow;
use tracing::{debug, warn};

/// Words that are always treated as sensitive, in matching order
pub const DEFAULT_SENSITIVE_WORDS: &[&str] = &[
    "password",
    "passwd",
    "mysql_pwd",
    "access_token",
    "auth_token",
    "api_key",
    "apikey",
    "secret",
    "credentials",
    "stripetoken",
];

/// Replacement for every scrubbed value, whatever its original length
pub const MASK: &str = "********";

const REPLACEMENT: &str = "${key}${delimiter}********";

/// Compiled, read-only redaction ruleset
#[derive(Debug, Clone)]
pub struct DataScrubber {
    enabled: bool,
    patterns: Vec<Regex>,
}

impl Default for DataScrubber {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl DataScrubber {
    pub fn builder() -> DataScrubberBuilder {
        DataScrubberBuilder::new()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Source of every active pattern, in the order they are applied
    pub fn sensitive_patterns(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.as_str()).collect()
    }

    /// Redact sensitive values in a command line.
    ///
    /// The arguments are joined with single spaces, every pattern is applied
    /// in order and the result is split again on single spaces. A command
    /// line that matches nothing is returned as-is, so its original token
    /// boundaries are kept.
    pub fn scrub_cmdline(&self, cmdline: &[String]) -> Vec<String> {
        if !self.enabled {
            return cmdline.to_vec();
        }

        let mut raw = cmdline.join(" ");
        let mut changed = false;

        for pattern in &self.patterns {
            if let Cow::Owned(replaced) = pattern.replace_all(&raw, REPLACEMENT) {
                raw = replaced;
                changed = true;
            }
        }

        if !changed {
            return cmdline.to_vec();
        }

        raw.split(' ').map(str::to_string).collect()
    }
}

/// Two-phase builder: collect words, then compile into a frozen [`DataScrubber`]
#[derive(Debug, Clone)]
pub struct DataScrubberBuilder {
    enabled: bool,
    custom_words: Vec<String>,
}

impl DataScrubberBuilder {
    pub fn new() -> Self {
        Self {
            enabled: true,
            custom_words: Vec::new(),
        }
    }

    /// Enable or disable scrubbing (disabled means identity)
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Append caller-supplied sensitive words after the built-in ones
    pub fn custom_sensitive_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.custom_words.extend(words.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> DataScrubber {
        let mut patterns =
            Vec::with_capacity(DEFAULT_SENSITIVE_WORDS.len() + self.custom_words.len());

        for word in DEFAULT_SENSITIVE_WORDS {
            if let Some(pattern) = compile_word(word) {
                patterns.push(pattern);
            }
        }

        for word in &self.custom_words {
            match compile_word(word) {
                Some(pattern) => patterns.push(pattern),
                None => warn!(
                    word = %word,
                    "Skipping sensitive word: only letters, digits and underscores are allowed"
                ),
            }
        }

        debug!(
            patterns = patterns.len(),
            enabled = self.enabled,
            "Data scrubber compiled"
        );

        DataScrubber {
            enabled: self.enabled,
            patterns,
        }
    }
}

impl Default for DataScrubberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the key/delimiter/value pattern for one word.
///
/// The key must be preceded by a space or a dash and followed by spaces or
/// `=`, so `password` never matches inside `openpassword` or `password1`.
fn compile_word(word: &str) -> Option<Regex> {
    if word.is_empty()
        || !word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return None;
    }

    let source = format!(r"(?P<key>( |-)(?i:{word}))(?P<delimiter> +|=)(?P<value>[^\s]*)");
    Regex::new(&source).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn setup_scrubber() -> DataScrubber {
        DataScrubber::builder()
            .custom_sensitive_words(["consul_token", "dd_password", "blocked_from_yaml"])
            .build()
    }

    fn expected_pattern(word: &str) -> String {
        format!(r"(?P<key>( |-)(?i:{word}))(?P<delimiter> +|=)(?P<value>[^\s]*)")
    }

    #[test]
    fn test_patterns_keep_default_words_first() {
        let scrubber = setup_scrubber();
        assert!(scrubber.is_enabled());

        let expected: Vec<String> = DEFAULT_SENSITIVE_WORDS
            .iter()
            .copied()
            .chain(["consul_token", "dd_password", "blocked_from_yaml"])
            .map(expected_pattern)
            .collect();

        assert_eq!(scrubber.sensitive_patterns(), expected);
    }

    #[test]
    fn test_uncompilable_words_are_dropped() {
        let scrubber = DataScrubber::builder()
            .custom_sensitive_words([
                "consul_token",
                "dd_password",
                "(an_error",
                ")a*",
                "[forbidden]",
                "]a*",
                "blocked_from_yaml",
            ])
            .build();

        let expected: Vec<String> = DEFAULT_SENSITIVE_WORDS
            .iter()
            .copied()
            .chain(["consul_token", "dd_password", "blocked_from_yaml"])
            .map(expected_pattern)
            .collect();

        assert_eq!(scrubber.sensitive_patterns(), expected);

        // Valid words around the broken ones still redact
        assert_eq!(
            scrubber.scrub_cmdline(&args(&["fitz", "-blocked_from_yaml=1234"])),
            args(&["fitz", "-blocked_from_yaml=********"])
        );
        assert_eq!(
            scrubber.scrub_cmdline(&args(&["fitz", "-[forbidden]", "1234"])),
            args(&["fitz", "-[forbidden]", "1234"])
        );
    }

    #[test]
    fn test_sensitive_args_are_scrubbed() {
        let cases: Vec<(Vec<String>, Vec<String>)> = vec![
            (args(&["agent", "-password", "1234"]), args(&["agent", "-password", "********"])),
            (args(&["agent", "--password", "1234"]), args(&["agent", "--password", "********"])),
            (args(&["agent", "-password=1234"]), args(&["agent", "-password=********"])),
            (args(&["agent", "--password=1234"]), args(&["agent", "--password=********"])),
            (args(&["fitz", "-consul_token=1234567890"]), args(&["fitz", "-consul_token=********"])),
            (args(&["fitz", "--consul_token=1234567890"]), args(&["fitz", "--consul_token=********"])),
            (args(&["fitz", "-consul_token", "1234567890"]), args(&["fitz", "-consul_token", "********"])),
            (args(&["fitz", "--consul_token", "1234567890"]), args(&["fitz", "--consul_token", "********"])),
            (
                args(&["python ~/test/run.py --password=1234 -password 1234 -open_password=admin -consul_token 2345 -blocked_from_yaml=1234 &"]),
                args(&[
                    "python", "~/test/run.py", "--password=********", "-password", "********",
                    "-open_password=admin", "-consul_token", "********", "-blocked_from_yaml=********", "&",
                ]),
            ),
            (args(&["agent", "-PASSWORD", "1234"]), args(&["agent", "-PASSWORD", "********"])),
            (args(&["agent", "--PASSword", "1234"]), args(&["agent", "--PASSword", "********"])),
            (args(&["agent", "--PaSsWoRd=1234"]), args(&["agent", "--PaSsWoRd=********"])),
            (
                args(&["java -password      1234"]),
                args(&["java", "-password", "", "", "", "", "", "********"]),
            ),
        ];

        let scrubber = setup_scrubber();
        for (cmdline, expected) in cases {
            assert_eq!(scrubber.scrub_cmdline(&cmdline), expected, "input: {:?}", cmdline);
        }
    }

    #[test]
    fn test_mask_length_is_fixed() {
        let scrubber = setup_scrubber();
        let scrubbed = scrubber.scrub_cmdline(&args(&["agent", "--secret=a"]));
        assert_eq!(scrubbed, args(&["agent", "--secret=********"]));

        let scrubbed = scrubber.scrub_cmdline(&args(&["agent", "--secret", "a-very-long-secret-value"]));
        assert_eq!(scrubbed[2], MASK);
    }

    #[test]
    fn test_disabled_scrubber_is_identity() {
        let scrubber = DataScrubber::builder()
            .custom_sensitive_words(["consul_token"])
            .enabled(false)
            .build();
        assert!(!scrubber.is_enabled());

        let cases = vec![
            args(&["agent", "-password", "1234"]),
            args(&["agent", "--password=1234"]),
            args(&["fitz", "--consul_token", "1234567890"]),
            args(&["agent", "--PaSsWoRd=1234"]),
            args(&["java -password      1234"]),
            args(&["python ~/test/run.py --password=1234 -password 1234 &"]),
        ];

        for cmdline in cases {
            assert_eq!(scrubber.scrub_cmdline(&cmdline), cmdline);
        }
    }

    #[test]
    fn test_non_sensitive_args_are_untouched() {
        let cases = vec![
            args(&["spidly", "--debug_port=2043"]),
            args(&["agent", "start", "-p", "config.cfg"]),
            args(&["p1", "--openpassword=admin"]),
            args(&["p1", "-openpassword", "admin"]),
            args(&["java -openpassword 1234"]),
            args(&["java -open_password 1234"]),
            args(&["java -passwordOpen 1234"]),
            args(&["java -password_open 1234"]),
            args(&["java -password1 1234"]),
            args(&["java -password_1 1234"]),
            args(&["java -1password 1234"]),
            args(&["java -1_password 1234"]),
        ];

        let scrubber = setup_scrubber();
        for cmdline in cases {
            assert_eq!(scrubber.scrub_cmdline(&cmdline), cmdline);
        }
    }

    #[test]
    fn test_default_scrubber_has_only_builtin_words() {
        let scrubber = DataScrubber::default();
        assert!(scrubber.is_enabled());
        assert_eq!(scrubber.sensitive_patterns().len(), DEFAULT_SENSITIVE_WORDS.len());
        assert_eq!(
            scrubber.scrub_cmdline(&args(&["mysql", "--api_key", "abc"])),
            args(&["mysql", "--api_key", "********"])
        );
    }
}
