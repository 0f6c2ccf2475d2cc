//! Feature engineering: turns raw user/item/context records into
//! normalized numeric feature vectors.
//!
//! Every vector leaving this module is finite — NaN/Inf produced by
//! degenerate inputs (empty histories, zero variance) are scrubbed.

mod text;

pub use text::TfIdfKeywords;

use crate::models::{FeatureVector, ItemRecord, RequestContext, UserRecord};
use chrono::{DateTime, Datelike, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::debug;

/// Window for the recent-review mean, in days.
const RECENT_REVIEW_DAYS: i64 = 90;

/// Category/type label encoder. Unseen labels get a fresh index
/// instead of failing, so serving never rejects a new category.
#[derive(Debug, Default)]
pub struct LabelEncoder {
    labels: RwLock<HashMap<String, usize>>,
}

impl LabelEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&self, label: &str) -> usize {
        if let Some(&idx) = self.labels.read().expect("encoder lock poisoned").get(label) {
            return idx;
        }
        let mut labels = self.labels.write().expect("encoder lock poisoned");
        let next = labels.len();
        *labels.entry(label.to_string()).or_insert(next)
    }

    pub fn len(&self) -> usize {
        self.labels.read().expect("encoder lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Column-wise standardizer (zero mean, unit variance) fitted once and
/// retained so future requests are transformed consistently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    keys: Vec<String>,
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[FeatureVector]) -> Self {
        let mut keys: Vec<String> = rows
            .iter()
            .flat_map(|r| r.keys().cloned())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        keys.sort();

        if rows.is_empty() || keys.is_empty() {
            return Self::default();
        }

        let matrix = Array2::from_shape_fn((rows.len(), keys.len()), |(i, j)| {
            rows[i].get(&keys[j]).copied().unwrap_or(0.0)
        });

        let means = matrix
            .mean_axis(ndarray::Axis(0))
            .map(|m| m.to_vec())
            .unwrap_or_else(|| vec![0.0; keys.len()]);
        let stds = matrix.std_axis(ndarray::Axis(0), 0.0).to_vec();

        Self { keys, means, stds }
    }

    pub fn is_fitted(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Standardize a vector over the fitted columns. Keys unseen at fit
    /// time are dropped so scaled and raw magnitudes never mix in one
    /// vector; zero-variance columns are only centered.
    pub fn transform(&self, features: &FeatureVector) -> FeatureVector {
        if !self.is_fitted() {
            return sanitize(features.clone());
        }

        let mut out = FeatureVector::new();
        for (j, key) in self.keys.iter().enumerate() {
            let raw = features.get(key).copied().unwrap_or(0.0);
            let std = self.stds[j];
            let scaled = if std > f64::EPSILON {
                (raw - self.means[j]) / std
            } else {
                raw - self.means[j]
            };
            out.insert(key.clone(), scaled);
        }
        sanitize(out)
    }
}

/// Replace any non-finite value with 0. No NaN/Inf leaves this module.
fn sanitize(mut features: FeatureVector) -> FeatureVector {
    for value in features.values_mut() {
        if !value.is_finite() {
            *value = 0.0;
        }
    }
    features
}

/// Extracts user, item and request-context feature vectors.
pub struct FeatureEngineer {
    item_type_encoder: LabelEncoder,
    category_encoder: LabelEncoder,
    tfidf: TfIdfKeywords,
    tfidf_top_k: usize,
    user_scaler: StandardScaler,
    item_scaler: StandardScaler,
}

impl FeatureEngineer {
    pub fn new(tfidf_top_k: usize) -> Self {
        Self {
            item_type_encoder: LabelEncoder::new(),
            category_encoder: LabelEncoder::new(),
            tfidf: TfIdfKeywords::new(),
            tfidf_top_k,
            user_scaler: StandardScaler::default(),
            item_scaler: StandardScaler::default(),
        }
    }

    /// Fit the text model and the column scalers over the batch tables.
    /// Context features are normalized to [0, 1] by construction and
    /// need no fitted scaler.
    pub fn fit(&mut self, users: &[UserRecord], items: &[ItemRecord]) {
        let docs: Vec<&str> = items.iter().map(|i| i.description.as_str()).collect();
        self.tfidf.fit(&docs);

        let now = Utc::now();
        let user_rows: Vec<FeatureVector> = users
            .iter()
            .map(|u| self.raw_user_features(u, now))
            .collect();
        let item_rows: Vec<FeatureVector> = items
            .iter()
            .map(|i| self.raw_item_features(i, now))
            .collect();

        self.user_scaler = StandardScaler::fit(&user_rows);
        self.item_scaler = StandardScaler::fit(&item_rows);

        debug!(
            users = users.len(),
            items = items.len(),
            "feature engineer fitted"
        );
    }

    pub fn extract_user_features(&self, user: &UserRecord, now: DateTime<Utc>) -> FeatureVector {
        let raw = self.raw_user_features(user, now);
        self.user_scaler.transform(&raw)
    }

    pub fn extract_item_features(&self, item: &ItemRecord, now: DateTime<Utc>) -> FeatureVector {
        let raw = self.raw_item_features(item, now);
        self.item_scaler.transform(&raw)
    }

    fn raw_user_features(&self, user: &UserRecord, now: DateTime<Utc>) -> FeatureVector {
        let mut f = FeatureVector::new();

        let account_age_days = (now - user.created_at).num_days().max(0) as f64;
        f.insert("account_age_days".into(), account_age_days);

        let optional_fields = [
            user.home_city.is_some(),
            user.bio.is_some(),
            user.avatar_url.is_some(),
            user.budget_level.is_some(),
        ];
        let populated = optional_fields.iter().filter(|&&p| p).count();
        f.insert(
            "profile_completeness".into(),
            populated as f64 / optional_fields.len() as f64,
        );

        let trips = &user.trips;
        f.insert("trip_count".into(), trips.len() as f64);

        let countries: HashSet<&str> = trips
            .iter()
            .map(|t| t.destination_country.as_str())
            .collect();
        let cities: HashSet<&str> = trips.iter().map(|t| t.destination_city.as_str()).collect();
        f.insert("countries_visited".into(), countries.len() as f64);
        f.insert("cities_visited".into(), cities.len() as f64);

        if trips.is_empty() {
            f.insert("avg_trip_duration".into(), 0.0);
            f.insert("avg_satisfaction".into(), 0.0);
            f.insert("days_since_last_trip".into(), account_age_days);
            f.insert("trip_frequency".into(), 0.0);
            f.insert("budget_mean".into(), 0.0);
            f.insert("budget_std".into(), 0.0);
        } else {
            let n = trips.len() as f64;
            f.insert(
                "avg_trip_duration".into(),
                trips.iter().map(|t| t.duration_days as f64).sum::<f64>() / n,
            );
            f.insert(
                "avg_satisfaction".into(),
                trips.iter().map(|t| t.satisfaction as f64).sum::<f64>() / n,
            );
            let last = trips.iter().map(|t| t.ended_at).max().unwrap_or(now);
            f.insert(
                "days_since_last_trip".into(),
                (now - last).num_days().max(0) as f64,
            );
            let years = (account_age_days / 365.0).max(1.0 / 12.0);
            f.insert("trip_frequency".into(), n / years);

            let budget_mean = trips.iter().map(|t| t.budget).sum::<f64>() / n;
            let budget_var =
                trips.iter().map(|t| (t.budget - budget_mean).powi(2)).sum::<f64>() / n;
            f.insert("budget_mean".into(), budget_mean);
            f.insert("budget_std".into(), budget_var.sqrt());

            let mut style_counts: HashMap<&str, usize> = HashMap::new();
            for trip in trips {
                *style_counts.entry(trip.style.as_str()).or_insert(0) += 1;
            }
            for (style, count) in style_counts {
                f.insert(format!("style_ratio_{style}"), count as f64 / n);
            }

            let mut season_counts = [0usize; 4];
            for trip in trips {
                let season = crate::models::Season::from_month(trip.ended_at.month());
                season_counts[season as usize] += 1;
            }
            for (season, count) in ["winter", "spring", "summer", "autumn"]
                .iter()
                .zip(season_counts)
            {
                f.insert(format!("season_pref_{season}"), count as f64 / n);
            }
        }

        f.insert("followers".into(), user.followers as f64);
        f.insert("following".into(), user.following as f64);
        let follower_ratio = user.followers as f64 / (user.following as f64 + 1.0);
        f.insert(
            "influence".into(),
            follower_ratio * (1.0 + user.interaction_count as f64).ln(),
        );

        f.insert(
            "pref_budget".into(),
            user.budget_level.map(|b| b.encoded()).unwrap_or(0.5),
        );
        f.insert("pref_adventure".into(), user.adventure_score as f64);
        f.insert("pref_cultural".into(), user.cultural_score as f64);

        sanitize(f)
    }

    fn raw_item_features(&self, item: &ItemRecord, now: DateTime<Utc>) -> FeatureVector {
        let mut f = FeatureVector::new();

        f.insert(
            "type_encoded".into(),
            self.item_type_encoder.encode(&item.item_type) as f64,
        );
        f.insert(
            "category_encoded".into(),
            self.category_encoder.encode(&item.category) as f64,
        );
        f.insert("price_log".into(), (1.0 + item.price.max(0.0)).ln());

        for amenity in &item.amenities {
            f.insert(format!("amenity_{amenity}"), 1.0);
        }
        for tag in &item.tags {
            f.insert(format!("tag_{tag}"), 1.0);
        }

        f.insert("latitude".into(), item.latitude);
        f.insert("longitude".into(), item.longitude);

        let reviews = &item.reviews;
        if reviews.is_empty() {
            f.insert("review_mean".into(), 0.0);
            f.insert("review_count".into(), 0.0);
            f.insert("review_var".into(), 0.0);
            f.insert("review_recent_mean".into(), 0.0);
        } else {
            let n = reviews.len() as f64;
            let mean = reviews.iter().map(|r| r.rating as f64).sum::<f64>() / n;
            let var = reviews
                .iter()
                .map(|r| (r.rating as f64 - mean).powi(2))
                .sum::<f64>()
                / n;
            f.insert("review_mean".into(), mean);
            f.insert("review_count".into(), n);
            f.insert("review_var".into(), var);

            let cutoff = now - chrono::Duration::days(RECENT_REVIEW_DAYS);
            let recent: Vec<f64> = reviews
                .iter()
                .filter(|r| r.created_at >= cutoff)
                .map(|r| r.rating as f64)
                .collect();
            let recent_mean = if recent.is_empty() {
                mean
            } else {
                recent.iter().sum::<f64>() / recent.len() as f64
            };
            f.insert("review_recent_mean".into(), recent_mean);
        }

        f.insert("desc_length".into(), item.description.len() as f64);
        f.insert(
            "desc_word_count".into(),
            item.description.split_whitespace().count() as f64,
        );
        if self.tfidf.is_fitted() {
            for (token, weight) in self.tfidf.top_k(&item.description, self.tfidf_top_k) {
                f.insert(format!("kw_{token}"), weight);
            }
        }

        sanitize(f)
    }

    /// Context features are normalized into [0, 1] directly.
    pub fn extract_context_features(&self, context: &RequestContext) -> FeatureVector {
        let mut f = FeatureVector::new();

        f.insert("hour".into(), context.hour() as f64 / 23.0);
        f.insert(
            "day_of_week".into(),
            context.timestamp.weekday().num_days_from_monday() as f64 / 6.0,
        );
        f.insert(
            "month".into(),
            (context.timestamp.month() as f64 - 1.0) / 11.0,
        );

        let season = context.season();
        for s in ["winter", "spring", "summer", "autumn"] {
            f.insert(
                format!("season_{s}"),
                if season.as_str() == s { 1.0 } else { 0.0 },
            );
        }

        if let Some(weather) = context.weather {
            let tag = match weather {
                crate::models::Weather::Clear => "clear",
                crate::models::Weather::Cloudy => "cloudy",
                crate::models::Weather::Rain => "rain",
                crate::models::Weather::Snow => "snow",
            };
            f.insert(format!("weather_{tag}"), 1.0);
        }

        if let Some(device) = context.device {
            let tag = match device {
                crate::models::DeviceType::Mobile => "mobile",
                crate::models::DeviceType::Desktop => "desktop",
                crate::models::DeviceType::Tablet => "tablet",
            };
            f.insert(format!("device_{tag}"), 1.0);
        }

        f.insert(
            "session_duration".into(),
            (context.session_duration_secs as f64 / 3600.0).min(1.0),
        );
        f.insert(
            "days_until_travel".into(),
            context
                .days_until_travel
                .map(|d| (d as f64 / 365.0).min(1.0))
                .unwrap_or(0.0),
        );
        f.insert(
            "group_size".into(),
            (context.group_size as f64 / 10.0).min(1.0),
        );
        f.insert(
            "budget_bucket".into(),
            context.budget_level.map(|b| b.encoded()).unwrap_or(0.5),
        );

        sanitize(f)
    }
}
