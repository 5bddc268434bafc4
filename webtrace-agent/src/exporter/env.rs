use std::env;
use std::time::Duration;
use webtrace::wt_warn;

/// Base URL of the agent's trace endpoint, e.g.
/// "http://localhost:55678/v1/trace"
pub(crate) const ENV_ENDPOINT: &str = "WEBTRACE_AGENT_ENDPOINT";

/// Number of root spans buffered before they are sent
pub(crate) const ENV_BUFFER_SIZE: &str = "WEBTRACE_AGENT_BUFFER_SIZE";

/// Milliseconds a root span waits in the buffer at most
pub(crate) const ENV_BUFFER_TIMEOUT: &str = "WEBTRACE_AGENT_BUFFER_TIMEOUT";

/// Service name reported to the agent
pub(crate) const ENV_SERVICE_NAME: &str = "WEBTRACE_SERVICE_NAME";

pub(crate) const DEFAULT_BUFFER_SIZE: usize = 1;
pub(crate) const DEFAULT_BUFFER_TIMEOUT: Duration = Duration::from_millis(2_000);
pub(crate) const DEFAULT_SERVICE_NAME: &str = "webtrace";

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|var| !var.is_empty())
}

pub(crate) fn get_endpoint() -> Option<String> {
    non_empty(ENV_ENDPOINT)
}

pub(crate) fn get_buffer_size() -> usize {
    match non_empty(ENV_BUFFER_SIZE) {
        Some(size) => match size.parse::<usize>() {
            Ok(size) if size > 0 => size,
            _ => {
                wt_warn!(
                    name: "AgentExporter.InvalidConfig",
                    variable = ENV_BUFFER_SIZE,
                    value = size.as_str(),
                    message = "malformed, defaulting to 1"
                );
                DEFAULT_BUFFER_SIZE
            }
        },
        None => DEFAULT_BUFFER_SIZE,
    }
}

pub(crate) fn get_buffer_timeout() -> Duration {
    match non_empty(ENV_BUFFER_TIMEOUT) {
        Some(timeout) => match timeout.parse() {
            Ok(timeout) => Duration::from_millis(timeout),
            Err(_) => {
                wt_warn!(
                    name: "AgentExporter.InvalidConfig",
                    variable = ENV_BUFFER_TIMEOUT,
                    value = timeout.as_str(),
                    message = "malformed, defaulting to 2000"
                );
                DEFAULT_BUFFER_TIMEOUT
            }
        },
        None => DEFAULT_BUFFER_TIMEOUT,
    }
}

pub(crate) fn get_service_name() -> String {
    non_empty(ENV_SERVICE_NAME).unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string())
}
