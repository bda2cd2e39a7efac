use std::time::Duration;

/// Application name
pub const APP_NAME: &str = "Tether";

/// Prefix of the control line that announces a file blob
pub const FILE_MARKER_PREFIX: &str = "FILE:";

/// Control line a peer sends before leaving the session
pub const CLOSE_NOTICE: &str = "CHAT_CLOSE_NOTIFY";

/// Prefix that turns local input into a command
pub const COMMAND_PREFIX: char = '/';

/// Maximum file transfer size in bytes (1 GiB)
pub const MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Room reserved in a blob frame for the name, sender and receiver fields
pub const MAX_BLOB_OVERHEAD: u64 = 64 * 1024;

/// Maximum length of a single text line in bytes (1 MiB), newline excluded
pub const MAX_LINE_LEN: usize = 1024 * 1024;

/// Default TCP listen port
pub const DEFAULT_PORT: u16 = 11451;

/// How long a listening peer waits for someone to dial in
pub const DEFAULT_ACCEPT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long either side waits for the other's handshake line
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Dial attempts before giving up
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;

/// Fixed pause between dial attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Directory received files are written to
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";

/// SQLite file name inside the data directory
pub const DB_FILE_NAME: &str = "chat_history.db";
