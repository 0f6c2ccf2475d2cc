use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Named numeric features, ordered for deterministic vectorization.
pub type FeatureVector = BTreeMap<String, f64>;

/// A single user/item interaction. Raw interactions may repeat per
/// (user, item); the aggregated rating matrix keeps one row per pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: String,
    pub item_id: String,
    /// Rating in [0, 5].
    pub rating: f32,
    pub timestamp: DateTime<Utc>,
}

impl Interaction {
    pub fn new(user_id: &str, item_id: &str, rating: f32, timestamp: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            item_id: item_id.to_string(),
            rating: rating.clamp(0.0, 5.0),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    Personalized,
    Trending,
    Similar,
}

impl RecommendationType {
    pub const ALL: [RecommendationType; 3] = [
        RecommendationType::Personalized,
        RecommendationType::Trending,
        RecommendationType::Similar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationType::Personalized => "personalized",
            RecommendationType::Trending => "trending",
            RecommendationType::Similar => "similar",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "personalized" => Some(RecommendationType::Personalized),
            "trending" => Some(RecommendationType::Trending),
            "similar" => Some(RecommendationType::Similar),
            _ => None,
        }
    }
}

/// Feedback signal types with weights for interest inference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    Click,
    View,
    Save,
    Book,
    Dismiss,
    /// Explicit rating in [0, 5].
    Rate(f32),
}

impl FeedbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackType::Click => "click",
            FeedbackType::View => "view",
            FeedbackType::Save => "save",
            FeedbackType::Book => "book",
            FeedbackType::Dismiss => "dismiss",
            FeedbackType::Rate(_) => "rate",
        }
    }

    /// Weight for offline retraining signals. Explicit ratings are
    /// centered so below-average ratings count against the item.
    pub fn weight(&self) -> f64 {
        match self {
            FeedbackType::Click => 1.0,
            FeedbackType::View => 0.5,
            FeedbackType::Save => 2.5,
            FeedbackType::Book => 5.0,
            FeedbackType::Dismiss => -2.0,
            FeedbackType::Rate(rating) => (rating.clamp(0.0, 5.0) as f64 - 2.5) * 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub id: Uuid,
    pub user_id: String,
    pub item_id: String,
    pub feedback_type: FeedbackType,
    pub timestamp: DateTime<Utc>,
    pub context: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    pub fn from_month(month: u32) -> Self {
        match month {
            12 | 1 | 2 => Season::Winter,
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            _ => Season::Autumn,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Winter => "winter",
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    Clear,
    Cloudy,
    Rain,
    Snow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Mobile,
    Desktop,
    Tablet,
}

/// Stated budget preference, encoded to a float for feature vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetLevel {
    Budget,
    Moderate,
    Premium,
    Luxury,
}

impl BudgetLevel {
    pub fn encoded(&self) -> f64 {
        match self {
            BudgetLevel::Budget => 0.25,
            BudgetLevel::Moderate => 0.5,
            BudgetLevel::Premium => 0.75,
            BudgetLevel::Luxury => 1.0,
        }
    }

    /// Bucket a nightly price into the matching tier.
    pub fn from_price(price: f64) -> Self {
        if price < 75.0 {
            BudgetLevel::Budget
        } else if price < 200.0 {
            BudgetLevel::Moderate
        } else if price < 500.0 {
            BudgetLevel::Premium
        } else {
            BudgetLevel::Luxury
        }
    }
}

/// Request-scoped context signals used for feature extraction and
/// contextual boosting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub timestamp: DateTime<Utc>,
    pub weather: Option<Weather>,
    pub device: Option<DeviceType>,
    pub session_duration_secs: u64,
    pub days_until_travel: Option<u32>,
    pub group_size: u32,
    pub budget_level: Option<BudgetLevel>,
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl RequestContext {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            weather: None,
            device: None,
            session_duration_secs: 0,
            days_until_travel: None,
            group_size: 1,
            budget_level: None,
            extra: HashMap::new(),
        }
    }

    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }

    pub fn is_weekend(&self) -> bool {
        matches!(
            self.timestamp.weekday(),
            chrono::Weekday::Sat | chrono::Weekday::Sun
        )
    }

    pub fn season(&self) -> Season {
        Season::from_month(self.timestamp.month())
    }
}

/// A completed trip in a user's travel history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripRecord {
    pub destination_city: String,
    pub destination_country: String,
    pub style: String,
    pub duration_days: u32,
    /// Satisfaction in [0, 5].
    pub satisfaction: f32,
    pub budget: f64,
    pub ended_at: DateTime<Utc>,
}

/// Batch-populated user record consumed by the feature engineer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub home_city: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub trips: Vec<TripRecord>,
    pub followers: u32,
    pub following: u32,
    /// Lifetime interaction count, from the analytics tables.
    pub interaction_count: u32,
    pub budget_level: Option<BudgetLevel>,
    /// Stated interest scores in [0, 1].
    pub adventure_score: f32,
    pub cultural_score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub rating: f32,
    pub created_at: DateTime<Utc>,
}

/// Batch-populated item record consumed by the feature engineer and
/// the candidate provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: String,
    pub name: String,
    pub item_type: String,
    pub category: String,
    /// Nightly price.
    pub price: f64,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub city: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

/// Request from the (out-of-scope) API layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub user_id: String,
    pub recommendation_type: String,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

/// One scored, explained recommendation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredItem {
    pub item_id: String,
    /// Combined score in [0, 5].
    pub raw_score: f32,
    /// Normalized confidence in [0, 1].
    pub confidence: f32,
    /// Per-algorithm raw contribution.
    pub contributions: HashMap<String, f32>,
    pub explanation: String,
    pub is_fallback: bool,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub recommendations: Vec<ScoredItem>,
    pub total_count: usize,
    pub algorithm_used: String,
    pub cached: bool,
    pub response_time_ms: u64,
}
