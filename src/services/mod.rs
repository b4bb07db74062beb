/// AI coaching report generation.
pub mod coach_service;
/// Hosted text-completion client.
pub mod completion;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// OAuth identity provider client.
pub mod identity;
/// Match history and final scores.
pub mod match_service;
/// Point log of a match.
pub mod point_service;
/// Live match sessions.
pub mod session_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events streaming of live sessions.
pub mod sse_service;
/// Match store connection supervision and degraded mode.
pub mod storage_supervisor;
