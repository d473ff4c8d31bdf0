//! HTTP header map with case-insensitive name lookup and comma merging.
//!
//! Field lines are parsed straight off the wire by [`Headers::consume`].
//! Repeated names are folded into a single comma-separated value, the way
//! RFC 9110 §5.3 allows for list-based fields.

use std::fmt;

use thiserror::Error;

use super::CRLF;

/// Errors produced while parsing a single header field line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("malformed header: missing ':' separator")]
    MalformedHeader,

    #[error("malformed header field name")]
    MalformedFieldName,

    #[error("header field value contains CR, LF or NUL")]
    MalformedFieldValue,
}

/// A case-insensitive HTTP header map holding one value per name.
///
/// Names are stored lower-cased. Inserting a name that is already present
/// through [`merge`](Self::merge) appends the new value after a `,`.
/// Entries iterate in the order their name was first inserted.
///
/// # Examples
///
/// ```
/// use rawhttp::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.merge("Content-Type", "text/html").unwrap();
/// headers.merge("X-Custom", "first").unwrap();
/// headers.merge("x-custom", "second").unwrap();
///
/// assert_eq!(headers.get("content-type"), Some("text/html"));
/// assert_eq!(headers.get("X-CUSTOM"), Some("first,second"));
/// assert!(headers.merge("Bad Name", "x").is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits a raw field line (without its CRLF) into a name and a trimmed value.
    ///
    /// The line is split on the first `:`. The name must be a non-empty run of
    /// token characters with no leading or trailing whitespace.
    ///
    /// # Errors
    ///
    /// - [`HeaderError::MalformedHeader`] if there is no `:` or the value is not UTF-8.
    /// - [`HeaderError::MalformedFieldName`] if the name is empty, padded or
    ///   contains a non-token character.
    pub fn parse_field(line: &[u8]) -> Result<(String, String), HeaderError> {
        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or(HeaderError::MalformedHeader)?;

        let (name, value) = (&line[..colon], &line[colon + 1..]);

        check_name(name)?;

        let value = std::str::from_utf8(value.trim_ascii())
            .map_err(|_| HeaderError::MalformedHeader)?;

        // Token characters are ASCII, so the name is valid UTF-8.
        let name = String::from_utf8_lossy(name).into_owned();
        Ok((name, value.to_owned()))
    }

    /// Inserts a value, folding it into an existing entry as `old,new`.
    ///
    /// # Errors
    ///
    /// - [`HeaderError::MalformedFieldName`] if `name` is not a token.
    /// - [`HeaderError::MalformedFieldValue`] if `value` contains CR, LF or NUL.
    pub fn merge(
        &mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<(), HeaderError> {
        let (name, value) = (name.as_ref(), value.as_ref());
        check_field(name, value)?;
        self.merge_valid(name, value);
        Ok(())
    }

    /// Sets the value for `name`, discarding anything stored before.
    ///
    /// # Errors
    ///
    /// Same as [`merge`](Self::merge).
    pub fn replace(
        &mut self,
        name: impl AsRef<str>,
        value: impl Into<String>,
    ) -> Result<(), HeaderError> {
        let (name, value) = (name.as_ref(), value.into());
        check_field(name, &value)?;
        self.replace_valid(name, value);
        Ok(())
    }

    // Callers guarantee `name` is a token and `value` has no line breaks.
    pub(crate) fn merge_valid(&mut self, name: &str, value: &str) {
        let key = name.to_ascii_lowercase();

        match self.inner.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => {
                existing.push(',');
                existing.push_str(value);
            }
            None => self.inner.push((key, value.to_owned())),
        }
    }

    pub(crate) fn replace_valid(&mut self, name: &str, value: String) {
        let key = name.to_ascii_lowercase();

        match self.inner.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.inner.push((key, value)),
        }
    }

    /// Removes the entry for `name`. Returns `true` if one was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.inner.len();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.inner.len() < before
    }

    /// Returns the value for the given name (case-insensitive), or `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the value for `name` parsed as an integer, or `default` when the
    /// header is missing or not a number.
    pub fn get_int(&self, name: &str, default: i64) -> i64 {
        self.get(name)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Returns `true` if the map holds an entry for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns the number of distinct header names.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over all `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parses as many CRLF-terminated field lines from the front of `buf` as
    /// are available.
    ///
    /// Returns the number of bytes consumed and whether the blank line that
    /// closes the header section was reached. Bytes after an incomplete line
    /// are left for the next call.
    ///
    /// Once at least one header has been stored, a malformed line is skipped.
    /// A malformed line before any header was stored fails the whole section
    /// and consumes nothing.
    ///
    /// # Errors
    ///
    /// Returns the [`HeaderError`] of the first line when that line is invalid.
    pub fn consume(&mut self, buf: &[u8]) -> Result<(usize, bool), HeaderError> {
        let mut read = 0;

        while let Some(idx) = find_crlf(&buf[read..]) {
            if idx == 0 {
                read += CRLF.len();
                return Ok((read, true));
            }

            match Self::parse_field(&buf[read..read + idx]) {
                Ok((name, value)) => self.merge_valid(&name, &value),
                Err(err) if self.is_empty() => return Err(err),
                Err(err) => {
                    tracing::debug!(error = %err, "skipping malformed header line");
                }
            }

            read += idx + CRLF.len();
        }

        Ok((read, false))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.inner {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

/// Returns the offset of the first `\r\n` in `buf`.
pub(crate) fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(CRLF.len()).position(|w| w == CRLF)
}

/// A field name must be a non-empty run of token characters.
pub(crate) fn check_name(name: &[u8]) -> Result<(), HeaderError> {
    if name.is_empty() || !name.iter().copied().all(is_token_char) {
        return Err(HeaderError::MalformedFieldName);
    }
    Ok(())
}

fn check_field(name: &str, value: &str) -> Result<(), HeaderError> {
    check_name(name.as_bytes())?;
    if value.bytes().any(|b| matches!(b, b'\r' | b'\n' | b'\0')) {
        return Err(HeaderError::MalformedFieldValue);
    }
    Ok(())
}

/// Returns `true` for `tchar` as defined in RFC 9110 §5.6.2.
fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
