use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum DnsError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Query timed out after {0} seconds")]
    Timeout(u64),

    #[error("Could not resolve resolver address: {0}")]
    Lookup(String),

    #[error("No answer from {0}")]
    NoAnswer(String),

    #[error("Response id {got} does not match query id {want}")]
    IdMismatch { want: u16, got: u16 },

    #[error("Server returned {0}")]
    Rcode(&'static str),
}

impl From<std::io::Error> for DnsError {
    fn from(err: std::io::Error) -> Self {
        DnsError::Io(err.to_string())
    }
}

impl From<crate::dns::ParseError> for DnsError {
    fn from(err: crate::dns::ParseError) -> Self {
        DnsError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DnsError>;

/// Errors talking to the time-series store.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Store returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed store response: {0}")]
    Response(String),

    #[error("Query failed: {0}")]
    Query(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Http(err.to_string())
    }
}

/// A stored history row that could not be turned into a typed record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowParseError {
    #[error("missing column {0}")]
    MissingColumn(&'static str),

    #[error("column {column} has unexpected type: {value}")]
    WrongType { column: &'static str, value: String },

    #[error("invalid timestamp {value:?}: {reason}")]
    Timestamp { value: String, reason: String },

    #[error("invalid keytag {0:?}")]
    KeyTag(String),

    #[error("invalid age {0}")]
    Age(String),
}

#[derive(Error, Debug, Clone)]
pub enum HistoryError {
    #[error("history query failed: {0}")]
    Store(#[from] StoreError),

    #[error("corrupt history row for {zone}: {source}")]
    Row {
        zone: String,
        #[source]
        source: RowParseError,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("No zones given")]
    NoZones,

    #[error("No resolver(s) found")]
    NoResolvers,

    #[error("Invalid concurrency: {0}")]
    InvalidConcurrency(usize),

    #[error("Influx server address must be given")]
    MissingInfluxServer,

    #[error("Influx database name must be given")]
    MissingInfluxDb,

    #[error("Influx user and password must be given (not only one)")]
    IncompleteCredentials,

    #[error("Failed to build store client: {0}")]
    Client(String),
}
