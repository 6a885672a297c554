use crate::error::ApiError;
use sportsbuddies_domain::activity::{ActivityStatus, ActivityType, SkillLevel};
use sportsbuddies_domain::util::parse_rfc3339_ms;
use validator::Validate;

pub fn validate<T: Validate>(value: &T) -> Result<(), ApiError> {
    value
        .validate()
        .map_err(|err| ApiError::Validation(err.to_string()))?;
    Ok(())
}

pub fn parse_timestamp(field: &str, value: &str) -> Result<i64, ApiError> {
    parse_rfc3339_ms(value)
        .ok_or_else(|| ApiError::Validation(format!("{field} must be an RFC 3339 timestamp")))
}

pub fn parse_activity_type(value: &str) -> Result<ActivityType, ApiError> {
    ActivityType::parse(value).ok_or_else(|| {
        ApiError::Validation("type must be 'event' or 'coaching session'".into())
    })
}

pub fn parse_skill_level(value: &str) -> Result<SkillLevel, ApiError> {
    SkillLevel::parse(value).ok_or_else(|| {
        ApiError::Validation(
            "skillLevel must be beginner, intermediate, advanced or professional".into(),
        )
    })
}

pub fn parse_status(value: &str) -> Result<ActivityStatus, ApiError> {
    ActivityStatus::parse(value).ok_or_else(|| {
        ApiError::Validation("status must be available, cancelled or expired".into())
    })
}
