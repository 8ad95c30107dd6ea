pub const DEFAULT_HELIX_BASE_URL: &str = "https://api.twitch.tv/helix";
pub const DEFAULT_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-preview-09-2025";

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_STATIC_DIR: &str = ".";
pub const DEFAULT_CORS_ALLOW_ORIGINS: &str = "*";
pub const DEFAULT_STREAM_LANGUAGE: &str = "fr";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_SERVICE_NAME: &str = "twitch-stats-server";
pub const DEFAULT_LOG_FILTER: &str = "twitch_stats_server=debug,tower_http=debug,axum=info,info";

pub const TWITCH_CHANNEL_URL: &str = "https://twitch.tv";

// PAGINATION
//
// 2 pages x 100 streams is ~200 of the biggest channels, which is where nearly all of the
// viewers are anyway
pub const STREAMS_PAGE_SIZE: usize = 100;
pub const STREAMS_MAX_PAGES: usize = 2;

// AGGREGATION
pub const TOP_N: usize = 10;
pub const GAME_NAME_LOOKUP_CAP: usize = 50;
pub const GAMES_BATCH_SIZE: usize = 50;
pub const USERS_BATCH_SIZE: usize = 100;

/// Upper bound on in-flight competitor enrichments
pub const NUM_WORKER_TASKS: usize = 25;

pub const GEMINI_FALLBACK_TEXT: &str = "Aucune réponse.";

/// Largest request body the Gemini proxy reads
pub const GEMINI_BODY_LIMIT: usize = 1024 * 1024;
