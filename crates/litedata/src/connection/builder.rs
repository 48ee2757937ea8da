//! Connection string parsing and construction.
//!
//! A connection string is a `;`-separated list of `key=value` pairs. Keys are
//! case-insensitive and ignore inner whitespace, so `Data Source`,
//! `DataSource` and `data source` are the same keyword. Values are trimmed
//! and may be wrapped in single or double quotes; they cannot contain `;`.
//!
//! | Keyword                                | Values                                                 | Default           |
//! |----------------------------------------|--------------------------------------------------------|-------------------|
//! | `Data Source`, `DataSource`, `Filename` | path, `:memory:` or `file:` URI                        | required          |
//! | `Mode`                                 | `ReadWriteCreate`, `ReadWrite`, `ReadOnly`, `Memory`   | `ReadWriteCreate` |
//! | `Cache`                                | `Default`, `Private`, `Shared`                         | `Default`         |
//! | `Default Timeout`                      | busy timeout in whole seconds                          | `30`              |
//! | `Foreign Keys`                         | `True`, `False`                                        | engine default    |

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::native::OpenFlags;

/// Well-known data source for a private in-memory database.
pub const MEMORY_DATA_SOURCE: &str = ":memory:";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How the database file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OpenMode {
    /// Open for reading and writing, creating the file if needed.
    #[default]
    ReadWriteCreate,
    /// Open for reading and writing; the file must exist.
    ReadWrite,
    /// Open read-only; the file must exist.
    ReadOnly,
    /// Purely in-memory database named by the data source.
    Memory,
}

impl OpenMode {
    const fn keyword(self) -> &'static str {
        match self {
            Self::ReadWriteCreate => "ReadWriteCreate",
            Self::ReadWrite => "ReadWrite",
            Self::ReadOnly => "ReadOnly",
            Self::Memory => "Memory",
        }
    }
}

/// Engine page cache sharing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CacheMode {
    #[default]
    Default,
    Private,
    Shared,
}

impl CacheMode {
    const fn keyword(self) -> &'static str {
        match self {
            Self::Default => "Default",
            Self::Private => "Private",
            Self::Shared => "Shared",
        }
    }
}

/// Parsed, validated connection settings.
///
/// # Example
///
/// ```rust,ignore
/// use litedata::{ConnectionStringBuilder, OpenMode};
///
/// let builder = ConnectionStringBuilder::new("app.db")
///     .with_mode(OpenMode::ReadOnly)
///     .with_foreign_keys(true);
/// assert_eq!(
///     builder.to_string(),
///     "Data Source=app.db;Mode=ReadOnly;Foreign Keys=True"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStringBuilder {
    data_source: String,
    mode: OpenMode,
    cache: CacheMode,
    default_timeout: Duration,
    foreign_keys: Option<bool>,
}

impl Default for ConnectionStringBuilder {
    fn default() -> Self {
        Self {
            data_source: String::new(),
            mode: OpenMode::default(),
            cache: CacheMode::default(),
            default_timeout: DEFAULT_TIMEOUT,
            foreign_keys: None,
        }
    }
}

impl ConnectionStringBuilder {
    /// Settings for the given data source with every other keyword at its default.
    #[must_use]
    pub fn new(data_source: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            ..Self::default()
        }
    }

    /// Settings for a private in-memory database.
    #[must_use]
    pub fn memory() -> Self {
        Self::new(MEMORY_DATA_SOURCE)
    }

    #[must_use]
    pub fn with_mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: CacheMode) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = Some(enabled);
        self
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub const fn mode(&self) -> OpenMode {
        self.mode
    }

    pub const fn cache(&self) -> CacheMode {
        self.cache
    }

    pub const fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// `None` leaves the engine's compiled-in default untouched.
    pub const fn foreign_keys(&self) -> Option<bool> {
        self.foreign_keys
    }

    /// True if the data source is a `file:` URI.
    pub fn is_uri(&self) -> bool {
        self.data_source
            .get(..5)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("file:"))
    }

    /// True if the database lives only in memory.
    pub fn is_memory(&self) -> bool {
        self.mode == OpenMode::Memory || self.data_source == MEMORY_DATA_SOURCE
    }

    /// Reject settings that can never open.
    pub fn validate(&self) -> Result<()> {
        if self.data_source.trim().is_empty() {
            return Err(Error::connection_string("the data source is empty"));
        }
        if self.is_uri() {
            Url::parse(&self.data_source).map_err(|err| {
                Error::connection_string(format!("invalid file URI '{}': {err}", self.data_source))
            })?;
        }
        Ok(())
    }

    /// Native open flags for these settings.
    pub fn to_open_flags(&self) -> OpenFlags {
        let mut flags = match self.mode {
            OpenMode::ReadWriteCreate => OpenFlags::READ_WRITE | OpenFlags::CREATE,
            OpenMode::ReadWrite => OpenFlags::READ_WRITE,
            OpenMode::ReadOnly => OpenFlags::READ_ONLY,
            OpenMode::Memory => OpenFlags::READ_WRITE | OpenFlags::CREATE | OpenFlags::MEMORY,
        };
        flags = match self.cache {
            CacheMode::Default => flags,
            CacheMode::Private => flags | OpenFlags::PRIVATE_CACHE,
            CacheMode::Shared => flags | OpenFlags::SHARED_CACHE,
        };
        if self.is_uri() {
            flags = flags | OpenFlags::URI;
        }
        flags
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        let normalized: String = key
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "datasource" | "filename" => self.data_source = value.to_owned(),
            "mode" => self.mode = parse_keyword(key, value, &[
                ("readwritecreate", OpenMode::ReadWriteCreate),
                ("readwrite", OpenMode::ReadWrite),
                ("readonly", OpenMode::ReadOnly),
                ("memory", OpenMode::Memory),
            ])?,
            "cache" => self.cache = parse_keyword(key, value, &[
                ("default", CacheMode::Default),
                ("private", CacheMode::Private),
                ("shared", CacheMode::Shared),
            ])?,
            "defaulttimeout" => {
                let seconds = value.parse::<u64>().map_err(|_| {
                    Error::connection_string(format!("'{key}' must be a whole number of seconds, got '{value}'"))
                })?;
                self.default_timeout = Duration::from_secs(seconds);
            }
            "foreignkeys" => {
                self.foreign_keys = Some(parse_keyword(key, value, &[
                    ("true", true),
                    ("false", false),
                ])?);
            }
            _ => {
                return Err(Error::connection_string(format!("keyword not supported: '{key}'")));
            }
        }
        Ok(())
    }
}

fn parse_keyword<T: Copy>(key: &str, value: &str, choices: &[(&str, T)]) -> Result<T> {
    choices
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(value))
        .map(|(_, choice)| *choice)
        .ok_or_else(|| Error::connection_string(format!("invalid value '{value}' for '{key}'")))
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

impl FromStr for ConnectionStringBuilder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut builder = Self::default();
        for pair in s.split(';').map(str::trim).filter(|pair| !pair.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| Error::connection_string(format!("expected key=value, got '{pair}'")))?;
            builder.apply(key.trim(), unquote(value))?;
        }
        builder.validate()?;
        Ok(builder)
    }
}

impl fmt::Display for ConnectionStringBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Data Source={}", self.data_source)?;
        if self.mode != OpenMode::default() {
            write!(f, ";Mode={}", self.mode.keyword())?;
        }
        if self.cache != CacheMode::default() {
            write!(f, ";Cache={}", self.cache.keyword())?;
        }
        if self.default_timeout != DEFAULT_TIMEOUT {
            write!(f, ";Default Timeout={}", self.default_timeout.as_secs())?;
        }
        if let Some(enabled) = self.foreign_keys {
            write!(f, ";Foreign Keys={}", if enabled { "True" } else { "False" })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let builder: ConnectionStringBuilder = "Data Source=:memory:".parse().unwrap();
        assert_eq!(builder.data_source(), ":memory:");
        assert!(builder.is_memory());
        assert_eq!(builder.mode(), OpenMode::ReadWriteCreate);
        assert_eq!(builder.default_timeout(), Duration::from_secs(30));
        assert_eq!(builder.foreign_keys(), None);
    }

    #[test]
    fn test_parse_all_keywords() {
        let builder: ConnectionStringBuilder =
            " filename = 'my db.sqlite' ; MODE=readonly;cache=Shared; Default Timeout=5;ForeignKeys=TRUE; "
                .parse()
                .unwrap();
        assert_eq!(builder.data_source(), "my db.sqlite");
        assert_eq!(builder.mode(), OpenMode::ReadOnly);
        assert_eq!(builder.cache(), CacheMode::Shared);
        assert_eq!(builder.default_timeout(), Duration::from_secs(5));
        assert_eq!(builder.foreign_keys(), Some(true));

        let flags = builder.to_open_flags();
        assert!(flags.contains(OpenFlags::READ_ONLY));
        assert!(flags.contains(OpenFlags::SHARED_CACHE));
        assert!(!flags.contains(OpenFlags::CREATE));
    }

    #[test]
    fn test_rejects_bad_input() {
        let cases = [
            "",
            "Data Source=",
            "Mode=ReadOnly",
            "Data Source=x.db;Colour=blue",
            "Data Source=x.db;Mode=Sideways",
            "Data Source=x.db;Default Timeout=soon",
            "Data Source=x.db;Foreign Keys=maybe",
            "Data Source",
        ];
        for case in cases {
            let err = case.parse::<ConnectionStringBuilder>().unwrap_err();
            assert!(err.is_connection_string(), "{case}: {err}");
        }
    }

    #[test]
    fn test_file_uri() {
        let builder: ConnectionStringBuilder =
            "Data Source=file:shared.db?mode=memory&cache=shared".parse().unwrap();
        assert!(builder.is_uri());
        assert!(builder.to_open_flags().contains(OpenFlags::URI));
    }

    #[test]
    fn test_memory_mode_flags() {
        let builder = ConnectionStringBuilder::new("named").with_mode(OpenMode::Memory);
        assert!(builder.is_memory());
        assert!(builder.to_open_flags().contains(OpenFlags::MEMORY));
    }

    #[test]
    fn test_display_round_trip() {
        let builder = ConnectionStringBuilder::new("app.db")
            .with_mode(OpenMode::ReadOnly)
            .with_foreign_keys(true);
        let text = builder.to_string();
        assert_eq!(text, "Data Source=app.db;Mode=ReadOnly;Foreign Keys=True");
        assert_eq!(text.parse::<ConnectionStringBuilder>().unwrap(), builder);
    }
}
