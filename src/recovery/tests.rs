#[cfg(test)]
mod tests {
    use crate::error::{BoxError, ClassifiedError, ErrorContext, ResilienceError};
    use crate::recovery::actions::MockBrowserRestarter;
    use crate::recovery::*;
    use serde_json::{json, Map, Value};
    use std::sync::Arc;
    use std::time::Duration;

    fn failure(message: &str) -> BoxError {
        message.to_string().into()
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {}", other),
        }
    }

    fn fast_manager() -> ErrorRecoveryManager {
        ErrorRecoveryManager::from_config(&RecoveryConfig {
            wait_delay: Duration::from_millis(10),
            ..RecoveryConfig::default()
        })
    }

    #[test]
    fn test_can_recover_by_kind() {
        let manager = fast_manager();

        assert!(manager.can_recover(&failure("ETIMEDOUT")));
        assert!(manager.can_recover(&failure("selector not found: .team-name")));
        assert!(!manager.can_recover(&failure("validation failed")));
        assert!(!manager.can_recover(&failure("invalid setting")));
        assert!(!manager.can_recover(&failure("unexpected panic in worker")));

        let system = ClassifiedError::system("fetch failed", ErrorContext::new("fetch"));
        assert!(!manager.can_recover(&system));
    }

    #[test]
    fn test_recovery_catalog() {
        let manager = fast_manager();

        let network: Vec<_> = manager
            .get_recovery_actions(&failure("network timeout"))
            .iter()
            .map(|a| a.action_type())
            .collect();
        assert_eq!(
            network,
            vec![RecoveryActionType::WaitAndRetry, RecoveryActionType::ChangeUserAgent]
        );

        let scraping: Vec<_> = manager
            .get_recovery_actions(&failure("page not loaded"))
            .iter()
            .map(|a| a.action_type())
            .collect();
        assert_eq!(
            scraping,
            vec![RecoveryActionType::FallbackSelector, RecoveryActionType::RestartBrowser]
        );

        assert!(manager.get_recovery_actions(&failure("schema mismatch")).is_empty());
        assert!(manager.get_recovery_actions(&failure("configuration missing")).is_empty());
        assert!(manager.get_recovery_actions(&failure("out of memory")).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_recovery_waits_then_succeeds() {
        let manager = fast_manager();
        let started = tokio::time::Instant::now();

        assert!(manager.execute_recovery(&failure("ECONNREFUSED")).await);
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_nothing_to_recover_returns_false() {
        let manager = fast_manager();
        assert!(!manager.execute_recovery(&failure("validation failed")).await);
        assert!(!manager.execute_recovery(&failure("disk full")).await);
    }

    #[tokio::test]
    async fn test_fallback_selector_recovers_registered_selector() {
        let mut browser = MockBrowserRestarter::new();
        browser.expect_restart().times(0);
        let manager = fast_manager().with_browser_restarter(Arc::new(browser));

        let recovered = manager
            .execute_recovery(&failure("selector not found: .odds-value"))
            .await;
        assert!(recovered);
    }

    #[tokio::test]
    async fn test_browser_restart_when_no_fallback_matches() {
        let mut browser = MockBrowserRestarter::new();
        browser.expect_restart().times(1).returning(|| Ok(()));
        let manager = fast_manager().with_browser_restarter(Arc::new(browser));

        let recovered = manager
            .execute_recovery(&failure("element not found: #live-scores"))
            .await;
        assert!(recovered);
    }

    #[tokio::test]
    async fn test_all_actions_failing_returns_false() {
        let mut browser = MockBrowserRestarter::new();
        browser
            .expect_restart()
            .times(1)
            .returning(|| Err("browser crashed again".into()));
        let manager = fast_manager().with_browser_restarter(Arc::new(browser));

        assert!(!manager.execute_recovery(&failure("waiting for selector #bracket")).await);

        // and without any browser hook at all
        let manager = fast_manager();
        assert!(!manager.execute_recovery(&failure("waiting for selector #bracket")).await);
    }

    #[test]
    fn test_fallback_registry() {
        let manager = fast_manager();

        assert!(manager.get_fallback_selectors(".does-not-exist").is_empty());
        assert_eq!(
            manager.get_fallback_selectors(".odds-value"),
            vec!["[data-testid='odds']", ".odds", "span.price"]
        );

        manager.add_fallback_selector(".standings-row", vec!["tr.standing", "[data-row]"]);
        manager.add_fallback_selector(".standings-row", vec!["[data-row]", "tbody tr", ".standings-row"]);
        assert_eq!(
            manager.get_fallback_selectors(".standings-row"),
            vec!["tr.standing", "[data-row]", "tbody tr"]
        );
    }

    #[test]
    fn test_config_extends_registry() {
        let mut config = RecoveryConfig::default();
        config.fallback_selectors.push(FallbackSelectorEntry {
            primary: ".team-name".to_string(),
            fallbacks: vec![".club".to_string()],
        });
        config.fallback_selectors.push(FallbackSelectorEntry {
            primary: ".score".to_string(),
            fallbacks: vec![".result".to_string()],
        });

        let manager = ErrorRecoveryManager::from_config(&config);
        assert_eq!(
            manager.get_fallback_selectors(".team-name"),
            vec!["[data-testid='team-name']", ".participant__name", ".team", ".club"]
        );
        assert_eq!(manager.get_fallback_selectors(".score"), vec![".result"]);
    }

    #[tokio::test]
    async fn test_partial_data_recovery_accepts_complete_fields() {
        let manager = fast_manager();
        let data = object(json!({"id": 7, "name": "Derby", "venue": ""}));

        let action = manager.create_partial_data_recovery(data.clone(), &["id", "name"]);
        assert_eq!(action.action_type(), RecoveryActionType::SkipOperation);

        let outcome = action.execute().await.unwrap();
        assert_eq!(outcome, RecoveryOutcome::PartialData(data));
    }

    #[tokio::test]
    async fn test_partial_data_recovery_names_missing_fields() {
        let manager = fast_manager();
        let data = object(json!({"id": 7, "name": "", "odds": null}));

        let action = manager.create_partial_data_recovery(data, &["id", "name", "odds", "kickoff"]);
        let err = action.execute().await.unwrap_err();

        let err = err.downcast_ref::<ResilienceError>().unwrap();
        assert_eq!(
            err,
            &ResilienceError::InsufficientPartialData {
                missing: vec!["name".to_string(), "odds".to_string(), "kickoff".to_string()]
            }
        );
        assert!(err.to_string().contains("Insufficient data for partial recovery"));
    }

    #[test]
    fn test_user_agent_rotation() {
        let rotator = UserAgentRotator::default();
        assert_eq!(rotator.pool_size(), 8);

        for _ in 0..20 {
            let before = rotator.current();
            let after = rotator.rotate().unwrap();
            assert_ne!(before, after);
            assert_eq!(rotator.current(), after);
        }

        let single = UserAgentRotator::new(vec!["scraper/1.0".to_string()]);
        assert_eq!(single.rotate(), None);
        assert_eq!(single.current(), "scraper/1.0");
    }

    #[tokio::test]
    async fn test_change_user_agent_action_updates_identity() {
        let manager = fast_manager();
        let identity = manager.identity();
        let before = identity.current();

        let actions = manager.get_recovery_actions(&failure("fetch failed"));
        let change = actions
            .iter()
            .find(|a| a.action_type() == RecoveryActionType::ChangeUserAgent)
            .unwrap();

        assert_eq!(change.execute().await.unwrap(), RecoveryOutcome::Resumed);
        assert_ne!(identity.current(), before);
    }
}
