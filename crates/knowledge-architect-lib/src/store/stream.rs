/*!
Tolerant fragment reader for embedding store files.

The producing plugin appends to its files instead of rewriting them, so a
single file may hold several top-level values back to back, separated by
commas, and occasionally a half-written one. The reader pulls one fragment at
a time from the buffer with `serde_json`'s streaming deserializer and, when a
fragment fails to parse, counts it and resynchronizes on the next plausible
fragment start instead of giving up on the file.

Two fragment shapes are recognised:

- a bare JSON value, e.g. `{"key": "a.md", "vec": [..]}`
- a keyed entry, e.g. `"smart_sources:a.md": {..}` (append-JSON form)
*/

use serde_json::{Deserializer, Value};
use thiserror::Error;
use tracing::warn;

/// One top-level item read from a store file.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Bare(Value),
    Keyed { key: String, value: Value },
}

/// Why a fragment failed, with the byte offset (into the whole input) where
/// parsing gave up.
#[derive(Debug, Error)]
enum FragmentError {
    #[error("{source}")]
    Json { source: serde_json::Error, at: usize },
    #[error("expected ':' after entry key")]
    MissingColon { at: usize },
    #[error("unexpected end of input")]
    UnexpectedEnd { at: usize },
}

impl FragmentError {
    fn at(&self) -> usize {
        match self {
            Self::Json { at, .. } | Self::MissingColon { at } | Self::UnexpectedEnd { at } => *at,
        }
    }

    fn shifted(self, by: usize) -> Self {
        match self {
            Self::Json { source, at } => Self::Json { source, at: at + by },
            Self::MissingColon { at } => Self::MissingColon { at: at + by },
            Self::UnexpectedEnd { at } => Self::UnexpectedEnd { at: at + by },
        }
    }
}

/// Iterator over the fragments of one store file.
///
/// Malformed fragments are never yielded; they are counted in [`skipped`](Self::skipped).
pub struct FragmentReader<'a> {
    input: &'a str,
    pos: usize,
    skipped: usize,
}

impl<'a> FragmentReader<'a> {
    pub fn new(input: &'a str) -> Self {
        let input = input.strip_prefix('\u{feff}').unwrap_or(input);
        Self {
            input,
            pos: 0,
            skipped: 0,
        }
    }

    /// Number of fragments that failed to parse so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn skip_separators(&mut self) {
        let rest = &self.input[self.pos..];
        let trimmed = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
        self.pos += rest.len() - trimmed.len();
    }

    /// Parse the fragment starting at `start`, returning it with its byte length.
    fn parse_at(&self, start: usize) -> Result<(Fragment, usize), FragmentError> {
        let rest = &self.input[start..];
        if !rest.starts_with('"') {
            let (value, consumed) = first_value::<Value>(rest).map_err(|e| e.shifted(start))?;
            return Ok((Fragment::Bare(value), consumed));
        }

        let (key, mut offset) = first_value::<String>(rest).map_err(|e| e.shifted(start))?;
        let after_key = &rest[offset..];
        let trimmed = after_key.trim_start();
        offset += after_key.len() - trimmed.len();
        if !trimmed.starts_with(':') {
            return Err(FragmentError::MissingColon { at: start + offset });
        }
        offset += 1;

        let (value, consumed) =
            first_value::<Value>(&rest[offset..]).map_err(|e| e.shifted(start + offset))?;
        Ok((Fragment::Keyed { key, value }, offset + consumed))
    }

    /// Find where to resume after the fragment at `start` failed at `failed_at`.
    ///
    /// Line starts (`{` or `"` in the first column) and `{` directly after a
    /// `}` are taken as is. From just before the failure point on, any other
    /// `{` or `"` is also tried, but only if a whole record parses there and
    /// ends at a line break, the end of input or the next `{`. Candidates that
    /// open an indented line are never tried, so a broken pretty-printed
    /// object does not yield its inner fields. Returns `input.len()` when
    /// nothing is left.
    fn resync(&self, start: usize, failed_at: usize) -> usize {
        let bytes = self.input.as_bytes();
        let from = start + 1;
        let mid_line_from = failed_at.saturating_sub(2).max(from);
        // `}` seen on the current line with only blanks after it.
        let mut after_close = preceded_by_close(bytes, from);
        // A non-blank byte was seen earlier on the current line.
        let mut line_has_content = line_has_content_before(bytes, from);

        for i in from..bytes.len() {
            let b = bytes[i];
            let line_start = bytes[i - 1] == b'\n';
            if line_start {
                line_has_content = false;
            }
            match b {
                b'{' if line_start || after_close => return i,
                b'"' if line_start => return i,
                b'{' | b'"' if line_has_content && i >= mid_line_from && self.is_record_at(i) => {
                    return i;
                }
                _ => {}
            }
            match b {
                b'}' => after_close = true,
                b' ' | b'\t' | b'\r' => continue,
                _ => after_close = false,
            }
            if b != b'\n' {
                line_has_content = true;
            }
        }
        bytes.len()
    }

    /// Whether a complete store record starts at `at`.
    fn is_record_at(&self, at: usize) -> bool {
        let Ok((fragment, consumed)) = self.parse_at(at) else {
            return false;
        };
        let shaped = match &fragment {
            Fragment::Bare(value) => value.is_object(),
            Fragment::Keyed { value, .. } => value.is_object() || value.is_null(),
        };
        let tail = self.input[at + consumed..].trim_start_matches([' ', '\t', '\r', ',']);
        let ends_cleanly = tail.is_empty()
            || tail.starts_with('\n')
            || (tail.starts_with('{') && matches!(fragment, Fragment::Bare(_)));
        shaped && ends_cleanly
    }
}

impl Iterator for FragmentReader<'_> {
    type Item = Fragment;

    fn next(&mut self) -> Option<Fragment> {
        loop {
            self.skip_separators();
            if self.pos >= self.input.len() {
                return None;
            }

            let start = self.pos;
            match self.parse_at(start) {
                Ok((fragment, consumed)) => {
                    self.pos = start + consumed;
                    return Some(fragment);
                }
                Err(err) => {
                    self.skipped += 1;
                    warn!(
                        offset = start,
                        failed_at = err.at(),
                        error = %err,
                        "skipping malformed store fragment"
                    );
                    self.pos = self.resync(start, err.at());
                }
            }
        }
    }
}

/// Deserialize the first JSON value of `input`, returning it and the bytes consumed.
///
/// Error offsets are relative to `input`.
fn first_value<T>(input: &str) -> Result<(T, usize), FragmentError>
where
    T: serde::de::DeserializeOwned,
{
    let mut stream = Deserializer::from_str(input).into_iter::<T>();
    match stream.next() {
        Some(Ok(value)) => Ok((value, stream.byte_offset())),
        Some(Err(source)) => {
            let at = error_offset(input, &source);
            Err(FragmentError::Json { source, at })
        }
        None => Err(FragmentError::UnexpectedEnd { at: input.len() }),
    }
}

/// Byte offset of a `serde_json` error from its 1-based line and column.
fn error_offset(input: &str, err: &serde_json::Error) -> usize {
    let line_start: usize = input
        .split_inclusive('\n')
        .take(err.line().saturating_sub(1))
        .map(str::len)
        .sum();
    (line_start + err.column().saturating_sub(1)).min(input.len())
}

fn preceded_by_close(bytes: &[u8], at: usize) -> bool {
    bytes[..at]
        .iter()
        .rev()
        .find(|b| !matches!(b, b' ' | b'\t' | b'\r'))
        .is_some_and(|b| *b == b'}')
}

fn line_has_content_before(bytes: &[u8], at: usize) -> bool {
    bytes[..at]
        .iter()
        .rev()
        .take_while(|b| **b != b'\n')
        .any(|b| !matches!(b, b' ' | b'\t' | b'\r'))
}
