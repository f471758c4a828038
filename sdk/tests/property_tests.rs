use proptest::prelude::*;
use sdk::errors::{EngineError, ResearchErrorExt};
use sdk::types::Action;

proptest! {
    #[test]
    fn test_error_user_hint_never_echoes_detail(detail in "[a-zA-Z0-9_]{12,40}") {
        let errs = vec![
            EngineError::Config(detail.clone()),
            EngineError::Database(detail.clone()),
            EngineError::LLMProvider(detail.clone()),
            EngineError::Provider(detail.clone()),
            EngineError::Synthesis(detail.clone()),
            EngineError::Persistence(detail.clone()),
            EngineError::RelayExpired(detail.clone()),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            prop_assert!(!hint.contains(&detail));
        }
    }
}

proptest! {
    #[test]
    fn test_search_validation_matches_query_content(query in "\\PC{0,40}") {
        let action = Action::Search { query: query.clone() };
        prop_assert_eq!(action.validate().is_ok(), !query.trim().is_empty());
    }

    #[test]
    fn test_scrape_with_urls_is_valid(
        urls in proptest::collection::vec("https://[a-z]{1,10}\\.com/[a-z]{0,8}", 1..6)
    ) {
        let action = Action::Scrape { urls };
        prop_assert!(action.validate().is_ok());
    }
}
