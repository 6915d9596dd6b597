/// File name of the download metadata sidecar inside the data directory.
pub const METADATA_FILE: &str = "downloads.json";

/// File name of the offline state database inside the data directory.
pub const DATABASE_FILE: &str = "offline.db";

/// Directory holding filesystem-backed blobs inside the data directory.
pub const BLOB_DIR: &str = "content";
