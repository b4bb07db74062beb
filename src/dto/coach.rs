use serde::Serialize;
use utoipa::ToSchema;

use crate::{dao::models::CoachReportEntity, dto::format_system_time};

/// AI coaching report derived from recent touches.
#[derive(Debug, Serialize, ToSchema)]
pub struct CoachReportView {
    /// Short overall assessment.
    pub summary: String,
    /// Detailed analysis of recurring patterns.
    pub detail: String,
    /// Concrete next steps for practice.
    pub action_plan: String,
    pub point_count: u32,
    pub match_count: u32,
    /// RFC 3339 generation timestamp.
    pub generated_at: String,
}

impl From<CoachReportEntity> for CoachReportView {
    fn from(report: CoachReportEntity) -> Self {
        Self {
            summary: report.summary,
            detail: report.detail,
            action_plan: report.action_plan,
            point_count: report.point_count,
            match_count: report.match_count,
            generated_at: format_system_time(report.generated_at),
        }
    }
}
