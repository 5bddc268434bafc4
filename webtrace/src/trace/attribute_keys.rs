//! Well-known attribute names.

/// Full URL of the page or request.
pub const ATTRIBUTE_HTTP_URL: &str = "http.url";
/// Path component of the page or request URL.
pub const ATTRIBUTE_HTTP_PATH: &str = "http.path";
/// User agent of the host.
pub const ATTRIBUTE_HTTP_USER_AGENT: &str = "http.user_agent";
/// Response status code of a request, as a string.
pub const ATTRIBUTE_HTTP_STATUS_CODE: &str = "http.status_code";
/// Request method.
pub const ATTRIBUTE_HTTP_METHOD: &str = "http.method";

/// Event that started an interaction, e.g. `click`.
pub const ATTRIBUTE_EVENT_TYPE: &str = "EventType";
/// Upper-case tag name of the element the interaction started on.
pub const ATTRIBUTE_TARGET_ELEMENT: &str = "TargetElement";
