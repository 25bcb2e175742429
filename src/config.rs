//! Configuration types for bucket-tar
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Bucket URL parsing

use crate::archive::Compression;
use crate::error::{ConfigError, StoreError};
use crate::store::{StoreOptions, DELIMITER};
use clap::Parser;
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

/// Maximum reasonable concurrent fetches per level
pub const MAX_WORKERS: usize = 512;

/// Largest page a list call may request
pub const MAX_PAGE_SIZE: usize = 10_000;

/// Regex for parsing bucket URLs
static BUCKET_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    // Matches: scheme://bucket or scheme://bucket/path/prefix
    Regex::new(r"^([a-zA-Z][a-zA-Z0-9+.-]*)://([^/\s]+)(?:/(\S*))?$").expect("Invalid bucket URL regex")
});

/// Save everything under a bucket prefix as one compressed tar archive
#[derive(Parser, Debug, Clone)]
#[command(
    name = "bucket-tar",
    version,
    about = "Save everything under an object-store prefix as one compressed tar archive",
    long_about = "Walks a bucket prefix depth-first, fetching each level's objects concurrently,\n\
                  and streams them into a single tar archive (gzip by default).\n\n\
                  The archive is only written to its destination once every object has been\n\
                  fetched and encoded; any failure leaves the destination untouched.",
    after_help = "EXAMPLES:\n    \
        bucket-tar s3://my-bucket/logs/2024 -o logs.tar.gz\n    \
        bucket-tar s3://my-bucket/data -w 64 --compression zstd -o data.tar.zst\n    \
        bucket-tar s3://minio-bucket/ --endpoint http://localhost:9000 --path-style\n    \
        bucket-tar file://exports/site --local-root /srv -o site.tar.gz"
)]
pub struct CliArgs {
    /// Bucket path to archive (s3://bucket/path/prefix or file://dir/prefix)
    #[arg(value_name = "BUCKET_URL")]
    pub bucket_url: String,

    /// Output archive file
    #[arg(short, long, default_value = "bucket.tar.gz", value_name = "FILE")]
    pub output: PathBuf,

    /// Maximum concurrent fetches per level
    #[arg(
        short = 'w',
        long,
        default_value_t = default_workers(),
        value_name = "NUM"
    )]
    pub workers: usize,

    /// Keys requested per list call
    #[arg(long, default_value = "1000", value_name = "NUM")]
    pub page_size: usize,

    /// Deadline for each list or get call, in seconds
    #[arg(long, default_value = "60", value_name = "SECS")]
    pub fetch_timeout: u64,

    /// Compression applied to the tar stream
    #[arg(short = 'c', long, value_enum, default_value_t = Compression::Gzip)]
    pub compression: Compression,

    /// Compression level (gzip 0-9, zstd 1-22)
    #[arg(long, value_name = "NUM")]
    pub level: Option<i32>,

    /// Maximum prefix depth below the root (unlimited if not set)
    #[arg(short = 'd', long, value_name = "NUM")]
    pub max_depth: Option<usize>,

    /// Skip keys and prefixes matching pattern (can be repeated)
    #[arg(long = "exclude", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Directory holding file:// buckets
    #[arg(long, default_value = ".", value_name = "DIR")]
    pub local_root: PathBuf,

    /// AWS access key (falls back to the environment)
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true, value_name = "KEY")]
    pub aws_access: Option<String>,

    /// AWS secret key (falls back to the environment)
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true, value_name = "KEY")]
    pub aws_secret: Option<String>,

    /// AWS region
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1", value_name = "REGION")]
    pub aws_region: String,

    /// Custom S3-compatible endpoint
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Use path-style bucket addressing
    #[arg(long)]
    pub path_style: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (per-key logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn default_workers() -> usize {
    // Fetches are I/O bound
    (num_cpus::get() * 2).min(MAX_WORKERS)
}

/// Store backend selected by the URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    S3,
    File,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::S3 => "s3",
            Scheme::File => "file",
        }
    }
}

/// Parsed bucket URL components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketUrl {
    pub scheme: Scheme,

    /// Bucket name (directory name for file://)
    pub bucket: String,

    /// Key prefix without a leading `/` (may be empty)
    pub prefix: String,
}

impl BucketUrl {
    /// Parse a bucket URL string
    ///
    /// Accepts formats:
    /// - s3://bucket
    /// - s3://bucket/path/prefix
    /// - file://dir/path/prefix
    pub fn parse(url: &str) -> Result<Self, StoreError> {
        let url = url.trim();
        let invalid = |reason: &str| StoreError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let caps = BUCKET_URL_REGEX
            .captures(url)
            .ok_or_else(|| invalid("Expected format: s3://bucket/path/prefix"))?;

        let scheme = match caps[1].to_ascii_lowercase().as_str() {
            "s3" => Scheme::S3,
            "file" => Scheme::File,
            other => {
                return Err(StoreError::UnsupportedScheme {
                    scheme: other.to_string(),
                })
            }
        };

        let bucket = caps[2].to_string();
        let prefix = caps.get(3).map(|m| m.as_str()).unwrap_or("").to_string();

        if prefix.starts_with(DELIMITER) {
            return Err(invalid("Empty path segment after bucket"));
        }

        Ok(Self {
            scheme,
            bucket,
            prefix,
        })
    }

    /// Prefix the walk starts from: the URL prefix treated as a directory
    ///
    /// `logs/2024` and `logs/2024/` both give `logs/2024/`; an empty
    /// prefix means the whole bucket.
    pub fn walk_root(&self) -> String {
        if self.prefix.is_empty() || self.prefix.ends_with(DELIMITER) {
            self.prefix.clone()
        } else {
            format!("{}{}", self.prefix, DELIMITER)
        }
    }

    /// Format for display
    pub fn to_display_string(&self) -> String {
        format!("{}://{}/{}", self.scheme.as_str(), self.bucket, self.prefix)
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Parsed bucket URL
    pub bucket_url: BucketUrl,

    /// Archive destination
    pub output_path: PathBuf,

    /// Compression codec
    pub compression: Compression,

    /// Compression level (validated for the codec)
    pub level: i32,

    /// Maximum concurrent fetches per level
    pub worker_count: usize,

    /// Keys per list call
    pub page_size: usize,

    /// Deadline for each store call
    pub fetch_timeout: Duration,

    /// Maximum prefix depth below the root
    pub max_depth: Option<usize>,

    /// Compiled exclude patterns
    pub exclude_patterns: Vec<Regex>,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,

    /// Backend settings
    pub store: StoreOptions,
}

impl ArchiveConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let bucket_url = BucketUrl::parse(&args.bucket_url)?;

        // Validate worker count
        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        // Validate page size
        if args.page_size == 0 || args.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::InvalidPageSize {
                size: args.page_size,
                max: MAX_PAGE_SIZE,
            });
        }

        if args.fetch_timeout == 0 {
            return Err(ConfigError::InvalidTimeout {
                secs: args.fetch_timeout,
            });
        }

        // Validate compression level
        let level = args
            .level
            .unwrap_or_else(|| args.compression.default_level());
        let (min, max) = args.compression.level_range();
        if args.compression != Compression::Plain && !(min..=max).contains(&level) {
            return Err(ConfigError::InvalidLevel {
                codec: args.compression.name(),
                level,
                min,
                max,
            });
        }

        // Compile exclude patterns
        let exclude_patterns = args
            .exclude_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::InvalidExcludePattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Validate output path
        if args.output.as_os_str().is_empty() || args.output.is_dir() {
            return Err(ConfigError::InvalidOutputPath {
                path: args.output.clone(),
                reason: "Need a file path to write the archive to".to_string(),
            });
        }
        if let Some(parent) = args.output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidOutputPath {
                    path: args.output.clone(),
                    reason: format!("Parent directory '{}' does not exist", parent.display()),
                });
            }
        }

        Ok(Self {
            bucket_url,
            output_path: args.output,
            compression: args.compression,
            level,
            worker_count: args.workers,
            page_size: args.page_size,
            fetch_timeout: Duration::from_secs(args.fetch_timeout),
            max_depth: args.max_depth,
            exclude_patterns,
            show_progress: !args.quiet,
            verbose: args.verbose,
            store: StoreOptions {
                local_root: args.local_root,
                region: args.aws_region,
                endpoint: args.endpoint,
                access_key: args.aws_access,
                secret_key: args.aws_secret,
                path_style: args.path_style,
            },
        })
    }

    /// Defaults for library use: gzip, 2x CPU workers, no progress output
    pub fn new(bucket_url: BucketUrl, output_path: impl Into<PathBuf>) -> Self {
        Self {
            bucket_url,
            output_path: output_path.into(),
            compression: Compression::Gzip,
            level: Compression::Gzip.default_level(),
            worker_count: default_workers(),
            page_size: 1000,
            fetch_timeout: Duration::from_secs(60),
            max_depth: None,
            exclude_patterns: Vec::new(),
            show_progress: false,
            verbose: false,
            store: StoreOptions::default(),
        }
    }
}
