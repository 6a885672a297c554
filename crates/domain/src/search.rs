use serde::{Deserialize, Serialize};

use crate::activity::{Activity, ActivityStatus, ActivityType, GeoPoint, SkillLevel};
use crate::ports::store::{DocumentQuery, FieldFilter};

pub const DEFAULT_SEARCH_LIMIT: usize = 50;
pub const MAX_SEARCH_LIMIT: usize = 200;
const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchFilter {
    pub query: Option<String>,
    pub sport: Option<String>,
    pub skill_level: Option<SkillLevel>,
    pub activity_type: Option<ActivityType>,
    pub status: Option<ActivityStatus>,
    pub place_name: Option<String>,
    pub date_from_ms: Option<i64>,
    pub date_to_ms: Option<i64>,
    pub location: Option<GeoPoint>,
    pub max_distance_km: Option<f64>,
    pub limit: Option<usize>,
    pub start_after: Option<String>,
}

impl SearchFilter {
    pub fn effective_limit(&self, default_limit: usize) -> usize {
        self.limit
            .unwrap_or(default_limit)
            .clamp(1, MAX_SEARCH_LIMIT)
    }

    /// Store-level part of the filter: equality, date range, cursor, limit.
    /// Without an explicit status only AVAILABLE activities are returned.
    pub fn store_query(&self, default_limit: usize) -> DocumentQuery {
        let mut query = DocumentQuery::new()
            .start_after(self.start_after.clone())
            .limit(self.effective_limit(default_limit));

        let status = self.status.unwrap_or(ActivityStatus::Available);
        query = query.filter(FieldFilter::eq("status", status.as_str()));
        if let Some(sport) = non_blank(&self.sport) {
            query = query.filter(FieldFilter::eq("sport", sport));
        }
        if let Some(level) = self.skill_level {
            query = query.filter(FieldFilter::eq("skillLevel", level.as_str()));
        }
        if let Some(activity_type) = self.activity_type {
            query = query.filter(FieldFilter::eq("type", activity_type.as_str()));
        }
        if let Some(from) = self.date_from_ms {
            query = query.filter(FieldFilter::gte("dateTime", from));
        }
        if let Some(to) = self.date_to_ms {
            query = query.filter(FieldFilter::lte("dateTime", to));
        }
        query
    }

    /// Post-fetch part of the filter: text terms, place name, distance.
    pub fn accepts(&self, activity: &Activity) -> bool {
        if let Some(query) = non_blank(&self.query) {
            if !matches_text(activity, query) {
                return false;
            }
        }
        if let Some(place) = non_blank(&self.place_name) {
            if !activity
                .place_name
                .to_lowercase()
                .contains(&place.to_lowercase())
            {
                return false;
            }
        }
        if let (Some(center), Some(max_distance)) = (self.location, self.max_distance_km) {
            if haversine_km(center, activity.location) > max_distance {
                return false;
            }
        }
        true
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub items: Vec<Activity>,
    /// Id of the last scanned document when the store page was full.
    pub next_cursor: Option<String>,
}

/// Every whitespace-separated term must occur somewhere in the searchable text.
pub fn matches_text(activity: &Activity, query: &str) -> bool {
    let haystack = format!(
        "{} {} {} {}",
        activity.activity_name, activity.description, activity.sport, activity.place_name
    )
    .to_lowercase();
    query
        .to_lowercase()
        .split_whitespace()
        .all(|term| haystack.contains(term))
}

pub fn haversine_km(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();
    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::store::FilterOp;

    fn activity(name: &str, description: &str, location: GeoPoint) -> Activity {
        Activity {
            id: name.into(),
            activity_name: name.into(),
            sport: "volleyball".into(),
            description: description.into(),
            place_name: "Siloso Beach".into(),
            banner_image_url: String::new(),
            activity_type: ActivityType::Event,
            skill_level: SkillLevel::Beginner,
            price: 0,
            location,
            date_time_ms: 0,
            max_participants: 10,
            creator_id: "creator".into(),
            participants: Vec::new(),
            join_requests: Vec::new(),
            status: ActivityStatus::Available,
        }
    }

    #[test]
    fn haversine_matches_known_distance() {
        // One degree of latitude is about 111.19 km on a 6371 km sphere.
        let distance = haversine_km(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0));
        assert!((distance - 111.19).abs() < 0.01, "{distance}");
    }

    #[test]
    fn all_terms_must_appear_as_substrings() {
        let item = activity("Sunset game", "volleyball on the beach", GeoPoint::new(0.0, 0.0));
        assert!(matches_text(&item, "beach volley"));
        assert!(matches_text(&item, "  SILOSO  "));
        assert!(!matches_text(&item, "beach tennis"));
    }

    #[test]
    fn distance_filter_needs_both_center_and_radius() {
        let near = activity("near", "", GeoPoint::new(1.318, 103.80));
        let far = activity("far", "", GeoPoint::new(1.372, 103.80));
        let center = GeoPoint::new(1.30, 103.80);

        let filter = SearchFilter {
            location: Some(center),
            max_distance_km: Some(5.0),
            ..SearchFilter::default()
        };
        assert!(filter.accepts(&near));
        assert!(!filter.accepts(&far));

        let radius_only = SearchFilter {
            max_distance_km: Some(5.0),
            ..SearchFilter::default()
        };
        assert!(radius_only.accepts(&far));
    }

    #[test]
    fn status_defaults_to_available_and_limit_is_clamped() {
        let query = SearchFilter::default().store_query(DEFAULT_SEARCH_LIMIT);
        assert_eq!(query.limit, Some(DEFAULT_SEARCH_LIMIT));
        assert_eq!(query.filters, vec![FieldFilter::eq("status", "available")]);

        let filter = SearchFilter {
            sport: Some("tennis".into()),
            limit: Some(10_000),
            ..SearchFilter::default()
        };
        let query = filter.store_query(DEFAULT_SEARCH_LIMIT);
        assert_eq!(query.limit, Some(MAX_SEARCH_LIMIT));
        assert_eq!(
            query.filters,
            vec![
                FieldFilter::eq("status", "available"),
                FieldFilter::eq("sport", "tennis"),
            ]
        );

        let cancelled = SearchFilter {
            status: Some(ActivityStatus::Cancelled),
            ..SearchFilter::default()
        };
        assert_eq!(
            cancelled.store_query(DEFAULT_SEARCH_LIMIT).filters,
            vec![FieldFilter::eq("status", "cancelled")]
        );

        let zero = SearchFilter {
            limit: Some(0),
            ..SearchFilter::default()
        };
        assert_eq!(zero.effective_limit(DEFAULT_SEARCH_LIMIT), 1);
    }

    #[test]
    fn date_range_is_pushed_down_inclusively() {
        let filter = SearchFilter {
            date_from_ms: Some(100),
            date_to_ms: Some(200),
            ..SearchFilter::default()
        };
        let ops: Vec<_> = filter
            .store_query(DEFAULT_SEARCH_LIMIT)
            .filters
            .into_iter()
            .map(|filter| filter.op)
            .collect();
        assert_eq!(ops, vec![FilterOp::Eq, FilterOp::Gte, FilterOp::Lte]);
    }
}
