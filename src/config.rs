//! Configuration types.
//!
//! Every threshold the engine uses is a heuristic tuning value, so all of
//! them live here with defaults and can be overridden from `DISCOVERY_*`
//! environment variables.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Rubric scoring thresholds.
#[derive(Debug, Clone)]
pub struct RubricConfig {
    /// How many trailing turns the scorer looks at.
    pub recent_window: usize,
    /// How many trailing user turns are checked for an ideas request.
    pub intent_window: usize,
    /// Average user-turn length at or below which engagement reads as blocked.
    pub blocked_max_avg_chars: usize,
    /// Average user-turn length at or below which engagement reads as hesitant.
    pub hesitant_max_avg_chars: usize,
    /// Average length below which energy reads as low.
    pub low_energy_max_avg_chars: usize,
    /// Average length at or above which energy reads as high.
    pub high_energy_min_avg_chars: usize,
    /// Total recent user characters needed for detail levels 1, 2 and 3.
    pub detail_bands: [usize; 3],
    /// Distinct insight kinds needed for coverage levels 1, 2 and 3.
    pub coverage_bands: [usize; 3],
    /// Minimum context depth for `ready`.
    pub ready_min_depth: u8,
    /// Saved votes that on their own push readiness to `deciding`.
    pub deciding_saved_votes: usize,
}

impl Default for RubricConfig {
    fn default() -> Self {
        Self {
            recent_window: 12,
            intent_window: 3,
            blocked_max_avg_chars: 20,
            hesitant_max_avg_chars: 60,
            low_energy_max_avg_chars: 30,
            high_energy_min_avg_chars: 150,
            detail_bands: [80, 250, 600],
            coverage_bands: [1, 3, 5],
            ready_min_depth: 2,
            deciding_saved_votes: 2,
        }
    }
}

/// Phase transition thresholds.
#[derive(Debug, Clone)]
pub struct PhaseConfig {
    /// User turns of blocked/hesitant engagement before story-mining seeds a teaser.
    pub story_teaser_turns: usize,
    /// User turns before a stalled pattern-mapping seeds a teaser.
    pub pattern_stall_turns: usize,
    /// User turns before a stalled option-seeding seeds a teaser.
    pub option_stall_turns: usize,
    /// Context depth that substitutes for a constraint insight in story-mining.
    pub story_min_depth: u8,
    /// Context depth required for full coverage in pattern-mapping.
    pub pattern_min_depth: u8,
    /// Distinct kinds that count as full coverage regardless of depth.
    pub rich_kind_count: usize,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            story_teaser_turns: 6,
            pattern_stall_turns: 8,
            option_stall_turns: 10,
            story_min_depth: 2,
            pattern_min_depth: 2,
            rich_kind_count: 5,
        }
    }
}

/// Suggestion gate thresholds.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Unreviewed cards at which the backlog guard engages.
    pub backlog_threshold: usize,
    /// Idle time since the last delivery before the backlog guard engages.
    pub backlog_idle: Duration,
    /// Consecutive blocked rubric reads before a fallback fetch.
    pub fallback_blocked_streak: u32,
    /// User turns since the last batch that re-arm the ready trigger.
    pub turns_between_batches: u32,
    /// Minimum stored insights for a non-forced fetch.
    pub min_insights: usize,
    /// Minimum distinct insight kinds for a non-forced fetch.
    pub min_distinct_kinds: usize,
    /// Minimum user turns for a non-forced fetch.
    pub min_user_turns: usize,
    /// Minimum context depth for a non-forced fetch.
    pub min_context_depth: u8,
    /// Maximum cards requested per batch.
    pub max_cards: usize,
    /// Trailing turns sent to the generator as transcript context.
    pub transcript_turns: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            backlog_threshold: 3,
            backlog_idle: Duration::from_secs(90),
            fallback_blocked_streak: 6,
            turns_between_batches: 4,
            min_insights: 3,
            min_distinct_kinds: 2,
            min_user_turns: 3,
            min_context_depth: 1,
            max_cards: 6,
            transcript_turns: 12,
        }
    }
}

/// Card reveal timing.
#[derive(Debug, Clone)]
pub struct RevealConfig {
    /// Delay before revealing cards in text mode, so the acknowledgement renders first.
    pub text_delay: Duration,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            text_delay: Duration::from_millis(600),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub rubric: RubricConfig,
    pub phase: PhaseConfig,
    pub gate: GateConfig,
    pub reveal: RevealConfig,
    /// Bound on waiting for a sent user message to be acknowledged.
    pub ack_timeout: Duration,
    /// Optimistic assistant line shown while a batch is being generated.
    pub announcement: String,
    /// Assistant line emitted once when the backlog guard engages.
    pub backlog_nudge: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rubric: RubricConfig::default(),
            phase: PhaseConfig::default(),
            gate: GateConfig::default(),
            reveal: RevealConfig::default(),
            ack_timeout: Duration::from_secs(3),
            announcement: "Give me a second, I'm pulling a few ideas together for you.".to_string(),
            backlog_nudge: "Before I find more, take a look at the ideas above. Save, maybe, or skip each one so I know what lands.".to_string(),
        }
    }
}

impl EngineConfig {
    /// Build the config from defaults overlaid with `DISCOVERY_*` env vars.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let rubric = &mut config.rubric;
        rubric.recent_window = env_or("DISCOVERY_RECENT_WINDOW", rubric.recent_window)?;
        rubric.intent_window = env_or("DISCOVERY_INTENT_WINDOW", rubric.intent_window)?;
        rubric.blocked_max_avg_chars =
            env_or("DISCOVERY_BLOCKED_MAX_AVG_CHARS", rubric.blocked_max_avg_chars)?;
        rubric.hesitant_max_avg_chars =
            env_or("DISCOVERY_HESITANT_MAX_AVG_CHARS", rubric.hesitant_max_avg_chars)?;
        rubric.low_energy_max_avg_chars =
            env_or("DISCOVERY_LOW_ENERGY_MAX_AVG_CHARS", rubric.low_energy_max_avg_chars)?;
        rubric.high_energy_min_avg_chars =
            env_or("DISCOVERY_HIGH_ENERGY_MIN_AVG_CHARS", rubric.high_energy_min_avg_chars)?;
        rubric.detail_bands = env_bands("DISCOVERY_DETAIL_BANDS", rubric.detail_bands)?;
        rubric.coverage_bands = env_bands("DISCOVERY_COVERAGE_BANDS", rubric.coverage_bands)?;
        rubric.ready_min_depth = env_or("DISCOVERY_READY_MIN_DEPTH", rubric.ready_min_depth)?;
        rubric.deciding_saved_votes =
            env_or("DISCOVERY_DECIDING_SAVED_VOTES", rubric.deciding_saved_votes)?;

        let phase = &mut config.phase;
        phase.story_teaser_turns = env_or("DISCOVERY_STORY_TEASER_TURNS", phase.story_teaser_turns)?;
        phase.pattern_stall_turns =
            env_or("DISCOVERY_PATTERN_STALL_TURNS", phase.pattern_stall_turns)?;
        phase.option_stall_turns = env_or("DISCOVERY_OPTION_STALL_TURNS", phase.option_stall_turns)?;
        phase.story_min_depth = env_or("DISCOVERY_STORY_MIN_DEPTH", phase.story_min_depth)?;
        phase.pattern_min_depth = env_or("DISCOVERY_PATTERN_MIN_DEPTH", phase.pattern_min_depth)?;
        phase.rich_kind_count = env_or("DISCOVERY_RICH_KIND_COUNT", phase.rich_kind_count)?;

        let gate = &mut config.gate;
        gate.backlog_threshold = env_or("DISCOVERY_BACKLOG_THRESHOLD", gate.backlog_threshold)?;
        gate.backlog_idle = Duration::from_secs(env_or(
            "DISCOVERY_BACKLOG_IDLE_SECS",
            gate.backlog_idle.as_secs(),
        )?);
        gate.fallback_blocked_streak =
            env_or("DISCOVERY_FALLBACK_BLOCKED_STREAK", gate.fallback_blocked_streak)?;
        gate.turns_between_batches =
            env_or("DISCOVERY_TURNS_BETWEEN_BATCHES", gate.turns_between_batches)?;
        gate.min_insights = env_or("DISCOVERY_MIN_INSIGHTS", gate.min_insights)?;
        gate.min_distinct_kinds = env_or("DISCOVERY_MIN_DISTINCT_KINDS", gate.min_distinct_kinds)?;
        gate.min_user_turns = env_or("DISCOVERY_MIN_USER_TURNS", gate.min_user_turns)?;
        gate.min_context_depth = env_or("DISCOVERY_MIN_CONTEXT_DEPTH", gate.min_context_depth)?;
        gate.max_cards = env_or("DISCOVERY_MAX_CARDS", gate.max_cards)?;
        gate.transcript_turns = env_or("DISCOVERY_TRANSCRIPT_TURNS", gate.transcript_turns)?;

        config.reveal.text_delay = Duration::from_millis(env_or(
            "DISCOVERY_TEXT_REVEAL_DELAY_MS",
            config.reveal.text_delay.as_millis() as u64,
        )?);
        config.ack_timeout = Duration::from_millis(env_or(
            "DISCOVERY_ACK_TIMEOUT_MS",
            config.ack_timeout.as_millis() as u64,
        )?);

        Ok(config)
    }
}

/// HTTP surface and collaborator endpoints.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port for the HTTP/WebSocket server.
    pub port: u16,
    /// Insight extractor endpoint.
    pub extractor_url: String,
    /// Recommendation generator endpoint.
    pub generator_url: String,
    /// Bearer key sent to both collaborators, if set.
    pub api_key: Option<SecretString>,
    /// Per-request timeout for collaborator calls.
    pub request_timeout: Duration,
    /// Whether the session runs against a voice channel.
    pub voice: bool,
}

impl ServerConfig {
    /// Read the server config from the environment.
    ///
    /// Both collaborator URLs are required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let extractor_url = required("DISCOVERY_EXTRACTOR_URL", "point it at the insight extractor")?;
        let generator_url =
            required("DISCOVERY_GENERATOR_URL", "point it at the recommendation generator")?;
        let api_key = std::env::var("DISCOVERY_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(SecretString::from);

        Ok(Self {
            port: env_or("DISCOVERY_PORT", 8080)?,
            extractor_url,
            generator_url,
            api_key,
            request_timeout: Duration::from_secs(env_or("DISCOVERY_REQUEST_TIMEOUT_SECS", 30)?),
            voice: env_or("DISCOVERY_VOICE", false)?,
        })
    }
}

fn required(key: &str, hint: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingRequired {
            key: key.to_string(),
            hint: hint.to_string(),
        })
}

/// Parse an env var, falling back to `default` when it is unset.
fn env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Parse a comma-separated triple such as `80,250,600`.
fn env_bands(key: &str, default: [usize; 3]) -> Result<[usize; 3], ConfigError> {
    let Ok(raw) = std::env::var(key) else {
        return Ok(default);
    };
    let invalid = |message: String| ConfigError::InvalidValue {
        key: key.to_string(),
        message,
    };
    let values = raw
        .split(',')
        .map(|part| part.trim().parse::<usize>().map_err(|e| invalid(e.to_string())))
        .collect::<Result<Vec<_>, _>>()?;
    <[usize; 3]>::try_from(values)
        .map_err(|v| invalid(format!("expected 3 comma-separated values, got {}", v.len())))
}
