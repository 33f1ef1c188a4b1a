// ── Destination naming ──
//
// `/topic/<domain>[/<subresource>]` for broadcasts, `/user/queue/<domain>`
// for the authenticated user's private queue, `/app/<domain>/subscribe`
// for action frames.

pub const DASHBOARD: &str = "dashboard";
pub const ALERTS: &str = "alerts";
pub const CONTAINERS: &str = "containers";
pub const CONTAINER_SUMMARY: &str = "containers/summary";
pub const AGENTS: &str = "agents";

pub fn topic(domain: &str) -> String {
    format!("/topic/{}", domain.trim_matches('/'))
}

pub fn user_queue(domain: &str) -> String {
    format!("/user/queue/{}", domain.trim_matches('/'))
}

/// Where `request_feed` publishes its action frame.
pub fn app_subscribe(domain: &str) -> String {
    format!("/app/{}/subscribe", domain.trim_matches('/'))
}

/// Live detail feed for one container.
pub fn container_detail(id: &impl std::fmt::Display) -> String {
    format!("/topic/{CONTAINERS}/{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_conventional_paths() {
        assert_eq!(topic(DASHBOARD), "/topic/dashboard");
        assert_eq!(topic(CONTAINER_SUMMARY), "/topic/containers/summary");
        assert_eq!(user_queue(ALERTS), "/user/queue/alerts");
        assert_eq!(app_subscribe(AGENTS), "/app/agents/subscribe");
        assert_eq!(container_detail(&42), "/topic/containers/42");
        assert_eq!(topic("/agents/"), "/topic/agents");
    }
}
