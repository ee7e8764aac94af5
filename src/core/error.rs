use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudError {
    #[error(
        "Archive type mismatch: expected cookie {expected} ({expected_name}) but got {found} ({found_name}) instead"
    )]
    TypeMismatch {
        expected: u8,
        expected_name: String,
        found: u8,
        found_name: String,
    },

    #[error("Registry conflict: cookie {cookie} already bound to {existing}, cannot bind {attempted}")]
    RegistryConflict {
        cookie: u8,
        existing: String,
        attempted: String,
    },

    #[error("Invalid extension cookie {cookie} for {type_name} (must be in 128..=190)")]
    InvalidExtensionCookie { cookie: u8, type_name: String },

    #[error("Record {record} is not cached but loading from cache is forced")]
    CacheMissForced { record: String },

    #[error("Cached record {record} holds {found}, cannot load it as {expected}")]
    CacheTypeMismatch {
        record: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected end of archive: needed {needed} bytes, {available} available")]
    UnexpectedEof { needed: usize, available: usize },

    #[error("Size mismatch: expected {expected} elements, archive holds {found}")]
    SizeMismatch { expected: usize, found: usize },

    #[error("Record {0} not found in container")]
    RecordNotFound(String),

    #[error("Record checksum verification failed for {0}")]
    ChecksumMismatch(String),

    #[error("Unknown compression method: {0}")]
    UnknownCompression(u8),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Container fault: {0}")]
    Container(String),

    #[error("Invalid magic number in archive header")]
    InvalidMagic,

    #[error("Unsupported archive version: {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("Invalid value in archive: {0}")]
    InvalidValue(String),

    #[error("Recordlist exhausted while loading {0}")]
    RecordlistExhausted(&'static str),

    #[error("Recordlist not fully consumed: {unconsumed} records left after loading {type_name}")]
    RecordlistMismatch {
        type_name: &'static str,
        unconsumed: usize,
    },

    #[error("Unknown distributed object: {0}")]
    UnknownObject(String),

    #[error("Distributed object {id} is not a {expected}")]
    ObjectTypeMismatch { id: String, expected: &'static str },

    #[error("Archive is not bound to an execution context")]
    NoWorld,

    #[error("Unknown callable: {0}")]
    UnknownCallable(String),

    #[error("Callable {name} is not a {expected}")]
    CallableSignatureMismatch { name: String, expected: &'static str },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
