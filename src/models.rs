use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Run mode selected on the command line or by the scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Operator-triggered run, strict gates, opens the deck when done.
    Manual,
    /// Scheduled run, strict gates, never opens a UI.
    Daily,
    /// Showcase run, bucket quota misses downgrade to WARN-OK.
    Demo,
    /// Short deck with the stricter factual-density gate family.
    Brief,
}

impl RunMode {
    pub fn as_str(&self) -> &str {
        match self {
            RunMode::Manual => "manual",
            RunMode::Daily => "daily",
            RunMode::Demo => "demo",
            RunMode::Brief => "brief",
        }
    }

    /// Bucket quota misses are tolerated (WARN-OK) in these modes.
    pub fn tolerates_quota_miss(&self) -> bool {
        matches!(self, RunMode::Demo | RunMode::Brief)
    }
}

impl std::str::FromStr for RunMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(RunMode::Manual),
            "daily" => Ok(RunMode::Daily),
            "demo" => Ok(RunMode::Demo),
            "brief" => Ok(RunMode::Brief),
            other => anyhow::bail!("unknown run mode: {other}"),
        }
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "FAIL")]
    Fail,
}

impl RunStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Ok => "OK",
            RunStatus::Fail => "FAIL",
        }
    }
}

/// Source platform key; selects the feed parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Rss,
    Atom,
    JsonApi,
    HtmlList,
}

impl Platform {
    pub fn as_str(&self) -> &str {
        match self {
            Platform::Rss => "rss",
            Platform::Atom => "atom",
            Platform::JsonApi => "json_api",
            Platform::HtmlList => "html_list",
        }
    }
}

/// A configured upstream source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub platform: Platform,
    pub endpoint: String,
    /// Reputation weight in [0,1]; feeds the frontier score.
    pub reputation_weight: f64,
    pub enabled: bool,
}

/// Which branch of the date-resolution priority produced `published_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishedAtSource {
    EntryField,
    FeedPubdate,
    HtmlMeta,
    NowUtc,
}

impl PublishedAtSource {
    pub fn as_str(&self) -> &str {
        match self {
            PublishedAtSource::EntryField => "entry_field",
            PublishedAtSource::FeedPubdate => "feed_pubdate",
            PublishedAtSource::HtmlMeta => "html_meta",
            PublishedAtSource::NowUtc => "now_utc",
        }
    }
}

/// A collected candidate item. Created by the collector; only the hydrator
/// may replace `body` afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawItem {
    /// Stable hash id, unique within a run.
    pub id: String,
    pub source_name: String,
    pub platform: Platform,
    pub url: String,
    pub canonical_url: String,
    pub title: String,
    pub body: String,
    pub published_at: DateTime<Utc>,
    pub published_at_source: PublishedAtSource,
    /// Two-letter language code guess.
    pub lang: String,
    /// Composite 0-100 recency/importance/reputation score.
    pub frontier: f64,
    /// Set when the collector could not extract a full body.
    pub needs_fulltext: bool,
}

/// Outcome of one hydration attempt. Exactly one per input item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HydrationStatus {
    Ok,
    Timeout,
    HttpError,
    Blocked,
    ExtractEmpty,
    ExtractLowQuality,
    ConnectionError,
    SkippedPolicy,
}

impl HydrationStatus {
    pub fn as_str(&self) -> &str {
        match self {
            HydrationStatus::Ok => "ok",
            HydrationStatus::Timeout => "timeout",
            HydrationStatus::HttpError => "http_error",
            HydrationStatus::Blocked => "blocked",
            HydrationStatus::ExtractEmpty => "extract_empty",
            HydrationStatus::ExtractLowQuality => "extract_low_quality",
            HydrationStatus::ConnectionError => "connection_error",
            HydrationStatus::SkippedPolicy => "skipped_policy",
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, HydrationStatus::Ok)
    }
}

/// Immutable record of one item's hydration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HydrationResult {
    pub item_id: String,
    pub status: HydrationStatus,
    pub fulltext_len: usize,
    pub final_url: String,
    pub retries: u32,
}

/// One ranked entity mention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMention {
    pub name: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,
}

/// Ranked entities for one item; at most 8, scores descending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entities {
    pub item_id: String,
    pub entities: Vec<EntityMention>,
}

/// Closed 11-label category set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Technology,
    StartupsFunding,
    Ai,
    Finance,
    PolicyRegulation,
    Security,
    HealthBiomed,
    ClimateEnergy,
    ConsumerElectronics,
    GamingEntertainment,
    General,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::Technology,
        Category::StartupsFunding,
        Category::Ai,
        Category::Finance,
        Category::PolicyRegulation,
        Category::Security,
        Category::HealthBiomed,
        Category::ClimateEnergy,
        Category::ConsumerElectronics,
        Category::GamingEntertainment,
        Category::General,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Category::Technology => "technology",
            Category::StartupsFunding => "startups_funding",
            Category::Ai => "ai",
            Category::Finance => "finance",
            Category::PolicyRegulation => "policy_regulation",
            Category::Security => "security",
            Category::HealthBiomed => "health_biomed",
            Category::ClimateEnergy => "climate_energy",
            Category::ConsumerElectronics => "consumer_electronics",
            Category::GamingEntertainment => "gaming_entertainment",
            Category::General => "general",
        }
    }
}

/// Category assignment with reproducible confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub item_id: String,
    pub category: Category,
    /// score_margin / total_score, in [0,1].
    pub confidence: f64,
}

/// Per-item score card. All components in [0,10].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    pub item_id: String,
    pub novelty: f64,
    pub utility: f64,
    pub heat: f64,
    pub feasibility: f64,
    pub final_score: f64,
    /// Near-duplicate pressure from the fingerprint neighborhood, in [0,1].
    pub dup_risk: f64,
    pub ad_flag: bool,
}

/// Selection target buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Product,
    Tech,
    Business,
    Other,
}

impl Bucket {
    pub const QUOTAED: [Bucket; 3] = [Bucket::Product, Bucket::Tech, Bucket::Business];

    pub fn as_str(&self) -> &str {
        match self {
            Bucket::Product => "product",
            Bucket::Tech => "tech",
            Bucket::Business => "business",
            Bucket::Other => "other",
        }
    }
}

/// Which pool tier an event was selected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionOrigin {
    PrimaryPool,
    ExtraPool,
    Backfill,
}

impl SelectionOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionOrigin::PrimaryPool => "primary_pool",
            SelectionOrigin::ExtraPool => "extra_pool",
            SelectionOrigin::Backfill => "backfill",
        }
    }
}

/// A selected headline event, frozen before render.
///
/// `anchors` are verbatim substrings of the source fulltext; q1 and q2 each
/// embed at least one anchor inside 「…」 brackets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub item_id: String,
    pub bucket: Bucket,
    pub origin: SelectionOrigin,
    pub title: String,
    pub canonical_url: String,
    pub source_name: String,
    pub category: Category,
    pub final_score: f64,
    pub frontier: f64,
    pub published_at: DateTime<Utc>,
    pub anchors: Vec<String>,
    pub q1: String,
    pub q2: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q3: Option<String>,
    pub proof: String,
    /// CJK chars / total chars over q1 ∪ q2 ∪ proof.
    pub zh_ratio: f64,
}

/// Run-level metadata, finalized at the end of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    /// `YYYYMMDD_HHMMSS`.
    pub run_id: String,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    /// Gate name -> verdict string, insertion-ordered by evaluation.
    pub gate_results: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_reason: Option<String>,
    pub selected_events: usize,
    pub ai_selected_events: usize,
    pub produced_files: Vec<String>,
    /// sha256 over canonicalized selected event ids + config snapshot.
    pub fingerprint: String,
}

/// Filter threshold profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunProfile {
    Calibration,
    Production,
}

/// LLM assist provider. The pipeline is fully correct with `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmProvider {
    None,
    OpenAiCompatible {
        base_url: String,
        api_key: String,
        model: String,
    },
}

/// Application configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: String,
    pub output_dir: String,

    pub z0_min_total_items: usize,
    pub z0_restore_below_items: usize,
    pub z0_min_frontier85_72h: usize,
    pub z0_allow_degraded: bool,
    pub z0_min_frontier85_72h_fallback: usize,

    pub exec_min_events: usize,
    pub exec_min_product: usize,
    pub exec_min_tech: usize,
    pub exec_min_business: usize,

    pub run_profile: RunProfile,
    pub llm: LlmProvider,

    pub hydrator_workers: usize,
    pub hydrator_politeness_ms: u64,
    pub hydrator_timeout_secs: u64,

    pub language_allowlist: Vec<String>,
    pub max_age_hours: i64,
    pub min_body_len: usize,
    pub min_score: f64,
    pub max_dup_risk: f64,

    /// Override for the source revision recorded on delivery archives.
    pub source_head: Option<String>,

    pub sources: Vec<SourceSpec>,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(false)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let run_profile = match std::env::var("RUN_PROFILE").as_deref() {
            Ok("calibration") => RunProfile::Calibration,
            _ => RunProfile::Production,
        };

        let llm = match std::env::var("LLM_PROVIDER").as_deref() {
            Ok("openai_compatible") => {
                let base_url = std::env::var("LLM_BASE_URL")
                    .map_err(|_| anyhow::anyhow!("LLM_PROVIDER set but LLM_BASE_URL missing"))?;
                let api_key = std::env::var("LLM_API_KEY").unwrap_or_default();
                let model =
                    std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
                LlmProvider::OpenAiCompatible {
                    base_url,
                    api_key,
                    model,
                }
            }
            _ => LlmProvider::None,
        };

        let language_allowlist = std::env::var("LANGUAGE_ALLOWLIST")
            .unwrap_or_else(|_| "en,zh".to_string())
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        // Calibration loosens the filters so threshold sweeps see more pool.
        let (max_age_hours, min_score) = match run_profile {
            RunProfile::Production => (72, 6.0),
            RunProfile::Calibration => (120, 5.0),
        };

        Ok(Self {
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            output_dir: std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "outputs".to_string()),

            z0_min_total_items: env_parse("Z0_MIN_TOTAL_ITEMS", 800),
            z0_restore_below_items: env_parse("Z0_RESTORE_BELOW_ITEMS", 1200),
            z0_min_frontier85_72h: env_parse("Z0_MIN_FRONTIER85_72H", 10),
            z0_allow_degraded: env_flag("Z0_ALLOW_DEGRADED"),
            z0_min_frontier85_72h_fallback: env_parse("Z0_MIN_FRONTIER85_72H_FALLBACK", 4),

            exec_min_events: env_parse("EXEC_MIN_EVENTS", 6),
            exec_min_product: env_parse("EXEC_MIN_PRODUCT", 2),
            exec_min_tech: env_parse("EXEC_MIN_TECH", 2),
            exec_min_business: env_parse("EXEC_MIN_BUSINESS", 2),

            run_profile,
            llm,

            hydrator_workers: env_parse("HYDRATOR_WORKERS", 3),
            hydrator_politeness_ms: env_parse("HYDRATOR_POLITENESS_MS", 500),
            hydrator_timeout_secs: env_parse("HYDRATOR_TIMEOUT_SECS", 15),

            language_allowlist,
            max_age_hours: env_parse("MAX_AGE_HOURS", max_age_hours),
            min_body_len: env_parse("MIN_BODY_LEN", 120),
            min_score: env_parse("MIN_SCORE", min_score),
            max_dup_risk: env_parse("MAX_DUP_RISK", 0.45),

            source_head: std::env::var("SOURCE_HEAD").ok(),

            sources: default_sources(),
        })
    }
}

/// Built-in source list; `BRIEF_SOURCES` (name|platform|url triples separated
/// by `;`) overrides it wholesale.
pub fn default_sources() -> Vec<SourceSpec> {
    if let Ok(raw) = std::env::var("BRIEF_SOURCES") {
        let parsed: Vec<SourceSpec> = raw
            .split(';')
            .filter_map(|entry| {
                let mut parts = entry.splitn(3, '|');
                let name = parts.next()?.trim().to_string();
                let platform = match parts.next()?.trim() {
                    "rss" => Platform::Rss,
                    "atom" => Platform::Atom,
                    "json_api" => Platform::JsonApi,
                    "html_list" => Platform::HtmlList,
                    _ => return None,
                };
                let endpoint = parts.next()?.trim().to_string();
                Some(SourceSpec {
                    name,
                    platform,
                    endpoint,
                    reputation_weight: 0.6,
                    enabled: true,
                })
            })
            .collect();
        if !parsed.is_empty() {
            return parsed;
        }
    }

    let specs = [
        ("techcrunch", Platform::Rss, "https://techcrunch.com/feed/", 0.85),
        ("the-verge", Platform::Rss, "https://www.theverge.com/rss/index.xml", 0.80),
        ("ars-technica", Platform::Rss, "https://feeds.arstechnica.com/arstechnica/index", 0.80),
        ("mit-tech-review", Platform::Rss, "https://www.technologyreview.com/feed/", 0.90),
        ("venturebeat-ai", Platform::Rss, "https://venturebeat.com/category/ai/feed/", 0.75),
        (
            "hn-frontpage",
            Platform::JsonApi,
            "https://hn.algolia.com/api/v1/search?tags=front_page",
            0.70,
        ),
        (
            "arxiv-cs-ai",
            Platform::Atom,
            "http://export.arxiv.org/api/query?search_query=cat:cs.AI&sortBy=submittedDate&sortOrder=descending&max_results=50",
            0.65,
        ),
        ("ai-news-cn", Platform::HtmlList, "https://www.jiqizhixin.com/", 0.60),
    ];

    specs
        .iter()
        .map(|(name, platform, endpoint, rep)| SourceSpec {
            name: (*name).to_string(),
            platform: *platform,
            endpoint: (*endpoint).to_string(),
            reputation_weight: *rep,
            enabled: true,
        })
        .collect()
}

#[cfg(test)]
impl Config {
    /// Production-profile defaults with no sources, for unit tests.
    pub(crate) fn test_default() -> Self {
        Self {
            data_dir: "data".into(),
            output_dir: "outputs".into(),
            z0_min_total_items: 800,
            z0_restore_below_items: 1200,
            z0_min_frontier85_72h: 10,
            z0_allow_degraded: false,
            z0_min_frontier85_72h_fallback: 4,
            exec_min_events: 6,
            exec_min_product: 2,
            exec_min_tech: 2,
            exec_min_business: 2,
            run_profile: RunProfile::Production,
            llm: LlmProvider::None,
            hydrator_workers: 3,
            hydrator_politeness_ms: 500,
            hydrator_timeout_secs: 15,
            language_allowlist: vec!["en".into(), "zh".into()],
            max_age_hours: 72,
            min_body_len: 120,
            min_score: 6.0,
            max_dup_risk: 0.45,
            source_head: None,
            sources: vec![],
        }
    }
}
