/// Default configuration file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "rtforge.toml";

/// Number of hex characters kept from a SHA-256 digest for object hashes.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Marker file written into a node prefix once its build procedure succeeded.
pub const NODE_COMPLETE_MARKER: &str = ".rtforge-complete";

/// Environment variable overriding `settings.work_dir`.
pub const ENV_WORK_DIR: &str = "RTFORGE_WORK_DIR";

/// Environment variable overriding `settings.jobs`.
pub const ENV_JOBS: &str = "RTFORGE_JOBS";

/// Reproducible timestamp handed to every build procedure
/// (315532800 = 1980-01-01T00:00:00Z, the ZIP epoch).
pub const SOURCE_DATE_EPOCH: &str = "315532800";

/// `HOME` for build procedures; does not exist, so nothing is read from it.
pub const HOMELESS_HOME: &str = "/homeless-shelter";
