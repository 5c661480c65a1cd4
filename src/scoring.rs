use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use crate::models::{Lead, Profile};

/// Engagement history inputs to scoring. Every field defaults to zero when
/// the lead has no associated profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileSnapshot {
    pub login_count: i32,
    pub total_time_on_site_ms: i64,
    pub ai_renderings_count: i32,
}

impl ProfileSnapshot {
    /// Missing profile reads as an all-zero snapshot.
    pub fn from_profile(profile: Option<&Profile>) -> Self {
        match profile {
            Some(p) => Self {
                login_count: p.login_count.max(0),
                total_time_on_site_ms: p.total_time_on_site_ms.max(0),
                ai_renderings_count: p.ai_renderings_count.max(0),
            },
            None => Self::default(),
        }
    }
}

/// Lead attributes consumed by the scoring calculator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadFacts {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub zip_code: String,
    pub render_count: i32,
    pub wants_quote: bool,
    pub social_engaged: bool,
    pub is_repeat_visitor: bool,
    pub created_at: DateTime<Utc>,
}

impl LeadFacts {
    pub fn from_lead(lead: &Lead) -> Self {
        Self {
            name: lead.name.clone(),
            email: lead.email.clone(),
            phone: lead.phone.clone(),
            zip_code: lead.zip_code.clone(),
            render_count: lead.render_count,
            wants_quote: lead.wants_quote,
            social_engaged: lead.social_engaged,
            is_repeat_visitor: lead.is_repeat_visitor,
            created_at: lead.created_at,
        }
    }
}

/// The four sub-scores plus the legacy overall aggregate, each in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreSet {
    pub engagement: i32,
    pub intent: i32,
    pub lead_quality: i32,
    pub probability_to_close: i32,
    pub overall: i32,
}

impl ScoreSet {
    pub fn matches_lead(&self, lead: &Lead) -> bool {
        self.engagement == lead.engagement_score
            && self.intent == lead.intent_score
            && self.lead_quality == lead.lead_quality_score
            && self.probability_to_close == lead.probability_to_close_score
            && self.overall == lead.lead_score
    }
}

/// Named, versioned weighting table. Changing any weight is a versioned
/// behavior change (add a V2), never a runtime variable.
#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    // engagement
    pub points_per_login: i32,
    pub login_cap: i32,
    pub minutes_on_site_divisor: i64,
    pub time_on_site_cap: i32,
    pub points_per_rendering: i32,
    pub rendering_cap: i32,
    pub points_per_extra_render: i32,
    pub extra_render_cap: i32,
    // intent
    pub wants_quote_points: i32,
    pub phone_present_intent_points: i32,
    pub second_render_points: i32,
    pub third_render_points: i32,
    pub social_engaged_points: i32,
    pub repeat_visitor_intent_points: i32,
    // quality
    pub valid_email_points: i32,
    pub invalid_email_penalty: i32,
    pub phone_present_quality_points: i32,
    pub name_present_points: i32,
    pub valid_zip_points: i32,
    pub repeat_visitor_quality_points: i32,
    // probability to close
    pub intent_blend_pct: i32,
    pub quality_blend_pct: i32,
    pub recency_day_points: i32,
    pub recency_half_week_points: i32,
    pub recency_week_points: i32,
    pub recency_month_points: i32,
    pub repeat_visitor_close_points: i32,
    // overall aggregate (percentages, must sum to 100)
    pub overall_engagement_pct: i32,
    pub overall_intent_pct: i32,
    pub overall_quality_pct: i32,
    pub overall_close_pct: i32,
}

impl ScoreWeights {
    /// Initial production weighting.
    pub const V1: ScoreWeights = ScoreWeights {
        points_per_login: 4,
        login_cap: 40,
        minutes_on_site_divisor: 2,
        time_on_site_cap: 30,
        points_per_rendering: 3,
        rendering_cap: 20,
        points_per_extra_render: 5,
        extra_render_cap: 10,
        wants_quote_points: 45,
        phone_present_intent_points: 25,
        second_render_points: 8,
        third_render_points: 15,
        social_engaged_points: 10,
        repeat_visitor_intent_points: 5,
        valid_email_points: 30,
        invalid_email_penalty: 10,
        phone_present_quality_points: 25,
        name_present_points: 15,
        valid_zip_points: 20,
        repeat_visitor_quality_points: 10,
        intent_blend_pct: 40,
        quality_blend_pct: 30,
        recency_day_points: 20,
        recency_half_week_points: 15,
        recency_week_points: 10,
        recency_month_points: 5,
        repeat_visitor_close_points: 10,
        overall_engagement_pct: 25,
        overall_intent_pct: 30,
        overall_quality_pct: 20,
        overall_close_pct: 25,
    };
}

/// Compute all scores for a lead with the current production weights.
///
/// Pure and deterministic: identical `(profile, lead, as_of)` inputs always
/// yield identical outputs. `as_of` exists only for the age-of-lead feature.
pub fn compute_scores(
    profile: &ProfileSnapshot,
    lead: &LeadFacts,
    as_of: DateTime<Utc>,
) -> ScoreSet {
    compute_scores_with(profile, lead, as_of, &ScoreWeights::V1)
}

/// Compute all scores with an explicit weighting table.
pub fn compute_scores_with(
    profile: &ProfileSnapshot,
    lead: &LeadFacts,
    as_of: DateTime<Utc>,
    w: &ScoreWeights,
) -> ScoreSet {
    let engagement = engagement_score(profile, lead, w);
    let intent = intent_score(lead, w);
    let lead_quality = quality_score(lead, w);
    let probability_to_close = close_score(lead, intent, lead_quality, as_of, w);

    let overall = clamp_score(
        (engagement * w.overall_engagement_pct
            + intent * w.overall_intent_pct
            + lead_quality * w.overall_quality_pct
            + probability_to_close * w.overall_close_pct)
            / 100,
    );

    ScoreSet {
        engagement,
        intent,
        lead_quality,
        probability_to_close,
        overall,
    }
}

/// Rises with login count, time on site and rendering activity.
fn engagement_score(profile: &ProfileSnapshot, lead: &LeadFacts, w: &ScoreWeights) -> i32 {
    // Counters arrive straight from INT columns; the multiplies must
    // saturate, not trust the values to stay small.
    let logins = profile
        .login_count
        .max(0)
        .saturating_mul(w.points_per_login)
        .min(w.login_cap);

    let minutes = profile.total_time_on_site_ms.max(0) / 60_000;
    let time = i32::try_from(minutes / w.minutes_on_site_divisor)
        .unwrap_or(w.time_on_site_cap)
        .min(w.time_on_site_cap);

    let renderings = profile
        .ai_renderings_count
        .max(0)
        .saturating_mul(w.points_per_rendering)
        .min(w.rendering_cap);

    // Repeat renders on the lead itself count even for anonymous visitors.
    let extra_renders = lead
        .render_count
        .max(1)
        .saturating_sub(1)
        .saturating_mul(w.points_per_extra_render)
        .min(w.extra_render_cap);

    clamp_score(logins + time + renderings + extra_renders)
}

/// Rises sharply with an explicit quote request and phone presence.
fn intent_score(lead: &LeadFacts, w: &ScoreWeights) -> i32 {
    let mut score = 0;
    if lead.wants_quote {
        score += w.wants_quote_points;
    }
    if has_value(&lead.phone) {
        score += w.phone_present_intent_points;
    }
    score += match lead.render_count {
        i32::MIN..=1 => 0,
        2 => w.second_render_points,
        _ => w.third_render_points,
    };
    if lead.social_engaged {
        score += w.social_engaged_points;
    }
    if lead.is_repeat_visitor {
        score += w.repeat_visitor_intent_points;
    }
    clamp_score(score)
}

/// Rises with contact completeness and a well-formed territory ZIP;
/// obviously invalid emails are penalized.
fn quality_score(lead: &LeadFacts, w: &ScoreWeights) -> i32 {
    let mut score = 0;
    match lead.email.as_deref() {
        Some(email) if is_valid_email(email) => score += w.valid_email_points,
        Some(_) => score -= w.invalid_email_penalty,
        None => {}
    }
    if has_value(&lead.phone) {
        score += w.phone_present_quality_points;
    }
    if has_value(&lead.name) {
        score += w.name_present_points;
    }
    if is_valid_zip(&lead.zip_code) {
        score += w.valid_zip_points;
    }
    if lead.is_repeat_visitor {
        score += w.repeat_visitor_quality_points;
    }
    clamp_score(score)
}

/// Blend of intent and quality, plus recency and repeat-visit signal.
/// Newer leads never score lower than older ones, all else equal.
fn close_score(
    lead: &LeadFacts,
    intent: i32,
    quality: i32,
    as_of: DateTime<Utc>,
    w: &ScoreWeights,
) -> i32 {
    let blended = (intent * w.intent_blend_pct + quality * w.quality_blend_pct) / 100;

    let age_days = (as_of - lead.created_at).num_days().max(0);
    let recency = match age_days {
        0 => w.recency_day_points,
        1..=3 => w.recency_half_week_points,
        4..=7 => w.recency_week_points,
        8..=30 => w.recency_month_points,
        _ => 0,
    };

    let repeat = if lead.is_repeat_visitor {
        w.repeat_visitor_close_points
    } else {
        0
    };

    clamp_score(blended + recency + repeat)
}

fn has_value(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn clamp_score(raw: i32) -> i32 {
    raw.clamp(0, 100)
}

/// Check whether an email address is plausible enough to count toward lead
/// quality. Rejects obvious throwaway patterns before the format check.
pub fn is_valid_email(email: &str) -> bool {
    // Basic checks
    if email.len() < 5 || !email.contains('@') || !email.contains('.') {
        return false;
    }

    // Detect fake patterns (repeated digits typed into a form to get past it)
    let fake_patterns = ["999999", "111111", "000000", "123456789"];
    for pattern in &fake_patterns {
        if email.contains(pattern) {
            return false;
        }
    }

    // RFC 5322 simplified email regex: local@domain.tld
    let email_regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();

    email_regex.is_match(email)
}

/// US territory ZIP: exactly five ASCII digits.
pub fn is_valid_zip(zip: &str) -> bool {
    zip.len() == 5 && zip.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_weights_sum_to_one_hundred() {
        let w = ScoreWeights::V1;
        assert_eq!(
            w.overall_engagement_pct + w.overall_intent_pct + w.overall_quality_pct
                + w.overall_close_pct,
            100
        );
    }

    #[test]
    fn blend_percentages_stay_within_bounds() {
        let w = ScoreWeights::V1;
        // Worst case blended close score plus bonuses must still clamp cleanly.
        assert!(w.intent_blend_pct + w.quality_blend_pct <= 100);
        assert!(w.recency_day_points >= w.recency_half_week_points);
        assert!(w.recency_half_week_points >= w.recency_week_points);
        assert!(w.recency_week_points >= w.recency_month_points);
    }

    #[test]
    fn zip_validation() {
        assert!(is_valid_zip("01701"));
        assert!(is_valid_zip("99999"));
        assert!(!is_valid_zip("0170"));
        assert!(!is_valid_zip("017011"));
        assert!(!is_valid_zip("0170a"));
        assert!(!is_valid_zip(""));
    }
}
