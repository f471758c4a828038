use async_trait::async_trait;
use deepsearch_engine::llm::decision::{DecisionError, DecisionService};
use deepsearch_engine::providers::search::RawSearchHit;
use deepsearch_engine::providers::{ContentExtractor, Extraction, ProviderError, SearchProvider};
use deepsearch_engine::research::{
    ActionPlanner, Orchestrator, ResearchContext, ResearchExecutor, RetryPolicy, SynthesisMode,
};
use proptest::prelude::*;
use sdk::types::{Action, ActionKind, Decision};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted reply from the decision service
#[derive(Debug, Clone)]
enum Reply {
    Search(u8),
    ScrapeKnown(u8),
    ScrapeUnknown,
    Answer,
    Garbage,
}

fn reply_strategy() -> impl Strategy<Value = Reply> {
    prop_oneof![
        4 => (0u8..5).prop_map(Reply::Search),
        2 => (0u8..5).prop_map(Reply::ScrapeKnown),
        1 => Just(Reply::ScrapeUnknown),
        1 => Just(Reply::Answer),
        2 => Just(Reply::Garbage),
    ]
}

fn page_url(topic: u8) -> String {
    format!("https://docs.example/topic-{}", topic)
}

/// Plays the script, recording each prompt; searches forever once it runs out
struct Script {
    replies: Mutex<VecDeque<Reply>>,
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl DecisionService for Script {
    async fn decide(&self, prompt: &str) -> Result<Decision, DecisionError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Search(0));

        let action = match reply {
            Reply::Search(topic) => Action::Search {
                query: format!("topic {}", topic),
            },
            Reply::ScrapeKnown(topic) => Action::Scrape {
                urls: vec![page_url(topic)],
            },
            Reply::ScrapeUnknown => Action::Scrape {
                urls: vec!["https://elsewhere.example/".to_string()],
            },
            Reply::Answer => Action::Answer,
            Reply::Garbage => return Err(DecisionError::Invalid("not JSON".to_string())),
        };
        Ok(Decision::bare(action))
    }
}

struct TopicSearch;

#[async_trait]
impl SearchProvider for TopicSearch {
    async fn search(&self, query: &str) -> Result<Vec<RawSearchHit>, ProviderError> {
        let topic: u8 = query
            .trim_start_matches("topic ")
            .parse()
            .unwrap_or(0);
        Ok(vec![RawSearchHit {
            title: query.to_string(),
            url: page_url(topic),
            snippet: String::new(),
            date: None,
        }])
    }
}

struct Pages;

#[async_trait]
impl ContentExtractor for Pages {
    async fn extract(&self, url: &str) -> Result<Extraction, ProviderError> {
        Ok(Extraction {
            success: true,
            text: format!("contents of {}", url),
            metadata: Default::default(),
        })
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_loop_respects_budget_and_context_only_grows(
        replies in prop::collection::vec(reply_strategy(), 0..30),
        max_steps in 1u32..8,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let script = Arc::new(Script {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        });
        let planner = ActionPlanner::new(
            Arc::clone(&script) as Arc<dyn DecisionService>,
            RetryPolicy::new(2, Duration::from_millis(1)),
            Duration::from_secs(5),
        );
        let orchestrator = Orchestrator::new(
            planner,
            ResearchExecutor::new(Arc::new(TopicSearch), Arc::new(Pages)),
        );

        let summary = runtime
            .block_on(orchestrator.run(ResearchContext::with_limits("q", max_steps, 200)))
            .unwrap();

        prop_assert!(summary.steps_taken >= 1);
        prop_assert!(summary.steps_taken <= max_steps);
        prop_assert_eq!(summary.trace.len(), summary.steps_taken as usize);
        for (i, entry) in summary.trace.iter().enumerate() {
            prop_assert_eq!(entry.step, i as u32 + 1);
        }

        let answered = summary.trace.iter().filter(|e| e.kind == ActionKind::Answer).count();
        match summary.mode {
            SynthesisMode::Standard => {
                prop_assert_eq!(answered, 1);
                prop_assert_eq!(summary.trace.last().map(|e| e.kind), Some(ActionKind::Answer));
            }
            SynthesisMode::Degraded => {
                prop_assert_eq!(answered, 0);
                prop_assert_eq!(summary.steps_taken, max_steps);
            }
        }

        let searches = summary.trace.iter().filter(|e| e.kind == ActionKind::Search).count();
        prop_assert_eq!(summary.context.query_history().len(), searches);
        for page in summary.context.scrape_history() {
            prop_assert!(summary.context.is_known_url(&page.url));
        }

        let prompts = script.prompts.lock().unwrap();
        let query_counts: Vec<usize> = prompts
            .iter()
            .map(|p| p.matches("### Query:").count())
            .collect();
        prop_assert!(query_counts.windows(2).all(|w| w[0] <= w[1]));
    }
}
