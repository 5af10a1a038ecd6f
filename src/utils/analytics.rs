use chrono::Utc;
use dashmap::DashSet;
use serde_json::{json, Map, Value};

/// Event kinds that should fire at most once per `(name, path, section, id)`
/// for the lifetime of the dedupe set. These are "viewed once" signals.
pub const DEDUPED_EVENTS: &[&str] = &["hero_view", "section_view", "carousel_view", "results_view"];

pub fn device_type(user_agent: Option<&str>) -> &'static str {
    match user_agent {
        Some(ua)
            if ua.contains("Mobi") || ua.contains("Android") || ua.contains("iPhone")
                || ua.contains("iPad") =>
        {
            "touch"
        }
        _ => "pointer",
    }
}

/// Best-effort emitter towards an external collector. With no collector
/// configured every call is a no-op; collector failures are swallowed.
pub struct AnalyticsEmitter {
    collector: Option<String>,
    debug: bool,
    client: reqwest::Client,
    seen: DashSet<String>,
}

impl AnalyticsEmitter {
    pub fn from_env() -> Self {
        let collector = std::env::var("ANALYTICS_URL")
            .ok()
            .filter(|v| !v.is_empty())
            .and_then(|raw| match url::Url::parse(&raw) {
                Ok(_) => Some(raw),
                Err(e) => {
                    tracing::warn!("Ignoring invalid ANALYTICS_URL {}: {}", raw, e);
                    None
                }
            });
        let debug = matches!(
            std::env::var("ANALYTICS_DEBUG").as_deref(),
            Ok("1") | Ok("true")
        );
        Self::new(collector, debug)
    }

    pub fn new(collector: Option<String>, debug: bool) -> Self {
        Self {
            collector,
            debug,
            client: reqwest::Client::new(),
            seen: DashSet::new(),
        }
    }

    /// Records one UI interaction event. Returns whether an emission was
    /// attempted (`false` for no-collector no-ops and dedupe suppressions).
    pub async fn track(
        &self,
        name: &str,
        path: &str,
        device_type: &str,
        props: Option<Map<String, Value>>,
    ) -> bool {
        let Some(collector) = self.collector.as_deref() else {
            return false;
        };
        let props = props.unwrap_or_default();
        if DEDUPED_EVENTS.contains(&name) && !self.seen.insert(dedupe_key(name, path, &props)) {
            return false;
        }

        let mut payload = Map::new();
        payload.insert("path".to_string(), json!(path));
        payload.insert("ts".to_string(), json!(Utc::now().timestamp_millis()));
        payload.insert("deviceType".to_string(), json!(device_type));
        // Caller props win on conflict
        payload.extend(props);

        if self.debug {
            let rendered = Value::Object(payload.clone());
            tracing::info!("[analytics] {} {}", name, rendered);
        }
        let body = json!({ "name": name, "payload": payload });
        if let Err(e) = self.client.post(collector).json(&body).send().await {
            tracing::debug!("analytics emit failed: {}", e);
        }
        true
    }

    /// Test hook; mirrors a full page reload.
    pub fn reset_dedupe(&self) {
        self.seen.clear();
    }
}

fn dedupe_key(name: &str, path: &str, props: &Map<String, Value>) -> String {
    let text = |key: &str| {
        props
            .get(key)
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default()
    };
    format!("{}|{}|{}|{}", name, path, text("section"), text("id"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    // Unroutable collector: sends fail fast and are swallowed
    fn emitter() -> AnalyticsEmitter {
        AnalyticsEmitter::new(Some("http://127.0.0.1:9/collect".to_string()), false)
    }

    #[tokio::test]
    async fn no_collector_means_no_op() {
        let emitter = AnalyticsEmitter::new(None, false);
        assert!(!emitter.track("cta_click_primary", "/", "pointer", None).await);
    }

    #[tokio::test]
    async fn first_visibility_events_emit_at_most_once() {
        let emitter = emitter();
        let section = props(&[("section", "hero")]);
        assert!(emitter.track("hero_view", "/", "pointer", Some(section.clone())).await);
        assert!(!emitter.track("hero_view", "/", "pointer", Some(section.clone())).await);
        // A different id is a different dedupe key
        let with_id = props(&[("section", "hero"), ("id", "X")]);
        assert!(emitter.track("hero_view", "/", "pointer", Some(with_id)).await);
        // So is a different path
        assert!(emitter.track("hero_view", "/pricing", "pointer", Some(section)).await);
    }

    #[tokio::test]
    async fn debug_mode_still_emits() {
        let emitter = AnalyticsEmitter::new(Some("http://127.0.0.1:9/collect".to_string()), true);
        assert!(emitter.track("cta_click_primary", "/", "pointer", None).await);
        let section = props(&[("section", "hero")]);
        assert!(emitter.track("hero_view", "/", "pointer", Some(section.clone())).await);
        assert!(!emitter.track("hero_view", "/", "pointer", Some(section)).await);
    }

    #[tokio::test]
    async fn non_deduped_events_always_emit() {
        let emitter = emitter();
        assert!(emitter.track("cta_click_primary", "/", "touch", None).await);
        assert!(emitter.track("cta_click_primary", "/", "touch", None).await);
    }

    #[tokio::test]
    async fn reset_clears_the_dedupe_set() {
        let emitter = emitter();
        let section = props(&[("section", "hero")]);
        assert!(emitter.track("hero_view", "/", "pointer", Some(section.clone())).await);
        emitter.reset_dedupe();
        assert!(emitter.track("hero_view", "/", "pointer", Some(section)).await);
    }

    #[test]
    fn device_type_from_user_agent() {
        assert_eq!(device_type(Some("Mozilla/5.0 (iPhone; CPU iPhone OS)")), "touch");
        assert_eq!(device_type(Some("Mozilla/5.0 (X11; Linux x86_64)")), "pointer");
        assert_eq!(device_type(None), "pointer");
    }
}
