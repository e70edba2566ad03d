//! End-to-end request scenarios against in-process specialists and a
//! scripted model.

use async_trait::async_trait;
use futures::StreamExt;
use pharos_core::config::{EarlySynthesis, LateResults, OrchestratorConfig};
use pharos_core::error::{ErrorKind, ModelCallError, SpecialistError};
use pharos_core::llm::{FragmentStream, ModelCall};
use pharos_core::specialists::{Finding, Specialist, SpecialistKind, SpecialistRegistry};
use pharos_core::swarm::{Coordinator, IntentPlanner, Query, SpecialistState, StreamEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

enum Behaviour {
    Answer(&'static str),
    Fail(&'static str),
    Hang(Option<Arc<AtomicBool>>),
}

struct FakeSpecialist {
    kind: SpecialistKind,
    behaviour: Behaviour,
}

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Specialist for FakeSpecialist {
    fn kind(&self) -> SpecialistKind {
        self.kind
    }

    async fn invoke(&self, _q: &str, _deadline: Duration) -> Result<Finding, SpecialistError> {
        match &self.behaviour {
            Behaviour::Answer(text) => {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(Finding::new(*text))
            }
            Behaviour::Fail(reason) => Err(SpecialistError::Unavailable(reason.to_string())),
            Behaviour::Hang(flag) => {
                let _guard = flag.clone().map(SetOnDrop);
                std::future::pending().await
            }
        }
    }
}

#[derive(Default)]
struct FakeModel {
    fragments: Vec<&'static str>,
    fail_after: Option<&'static str>,
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl ModelCall for FakeModel {
    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, ModelCallError> {
        Ok(self.fragments.concat())
    }

    async fn stream(&self, _system: &str, prompt: &str) -> Result<FragmentStream, ModelCallError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let mut items: Vec<Result<String, ModelCallError>> =
            self.fragments.iter().map(|f| Ok(f.to_string())).collect();
        if let Some(message) = self.fail_after {
            items.push(Err(ModelCallError::Stream(message.to_string())));
            // Anything after the failure must never reach the caller.
            items.push(Ok("unreachable".to_string()));
        }
        Ok(futures::stream::iter(items).boxed())
    }
}

/// Yields one fragment, then stalls until dropped.
struct StallingModel {
    dropped: Arc<AtomicBool>,
}

#[async_trait]
impl ModelCall for StallingModel {
    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, ModelCallError> {
        std::future::pending().await
    }

    async fn stream(&self, _system: &str, _prompt: &str) -> Result<FragmentStream, ModelCallError> {
        let guard = SetOnDrop(self.dropped.clone());
        Ok(futures::stream::iter(vec![Ok("first ".to_string())])
            .chain(futures::stream::pending())
            .map(move |item| {
                let _keep = &guard;
                item
            })
            .boxed())
    }
}

fn registry(adapters: Vec<(SpecialistKind, Behaviour)>) -> SpecialistRegistry {
    adapters
        .into_iter()
        .fold(SpecialistRegistry::new(), |registry, (kind, behaviour)| {
            registry.with(Arc::new(FakeSpecialist { kind, behaviour }))
        })
}

fn model(fragments: Vec<&'static str>) -> Arc<FakeModel> {
    Arc::new(FakeModel {
        fragments,
        ..FakeModel::default()
    })
}

async fn run(coordinator: &Coordinator, text: &str) -> Vec<StreamEvent> {
    coordinator
        .stream(Query::new(text).unwrap())
        .collect()
        .await
}

fn chunks(events: &[StreamEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Chunk { text } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

fn with_state(events: &[StreamEvent], state: SpecialistState) -> Vec<SpecialistKind> {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Status {
                specialist,
                state: s,
                ..
            } if *s == state => Some(*specialist),
            _ => None,
        })
        .collect()
}

fn assert_single_terminal_last(events: &[StreamEvent]) {
    let terminals: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_terminal())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(terminals, vec![events.len() - 1], "events: {:?}", events);
}

const MARKET_AND_PATENT: &str = "What is the market size for metformin and when does its patent expire?";

#[tokio::test]
async fn scenario_a_two_specialists_succeed() {
    let coordinator = Coordinator::with_parts(
        &OrchestratorConfig::default(),
        registry(vec![
            (SpecialistKind::MarketIntelligence, Behaviour::Answer("Market is $5.2B, CAGR 4%.")),
            (SpecialistKind::Patent, Behaviour::Answer("Primary patent expired in 2002.")),
        ]),
        model(vec!["According to market data, ", "metformin is a $5.2B market. ", "Its patents have expired."]),
    );

    let events = run(&coordinator, MARKET_AND_PATENT).await;

    let succeeded = with_state(&events, SpecialistState::Succeeded);
    assert_eq!(succeeded.len(), 2);
    assert!(succeeded.contains(&SpecialistKind::MarketIntelligence));
    assert!(succeeded.contains(&SpecialistKind::Patent));
    assert!(!chunks(&events).is_empty());
    assert_eq!(events.last(), Some(&StreamEvent::Done));
    assert_single_terminal_last(&events);
}

#[tokio::test(start_paused = true)]
async fn scenario_b_one_timeout_still_answers() {
    let mut config = OrchestratorConfig::default();
    config.per_specialist_timeouts.insert(SpecialistKind::Patent, 1);
    let fake_model = model(vec!["Market data and trial records are available; ", "patent data timed out."]);
    let coordinator = Coordinator::with_parts(
        &config,
        registry(vec![
            (SpecialistKind::MarketIntelligence, Behaviour::Answer("Oncology market is $200B.")),
            (SpecialistKind::Patent, Behaviour::Hang(None)),
            (SpecialistKind::ClinicalTrials, Behaviour::Answer("12 phase 3 trials.")),
        ]),
        fake_model.clone(),
    );

    let events = run(
        &coordinator,
        "Compare the oncology market, patent expiry and phase 3 trials for pembrolizumab",
    )
    .await;

    assert_eq!(
        with_state(&events, SpecialistState::TimedOut),
        vec![SpecialistKind::Patent]
    );
    assert_eq!(with_state(&events, SpecialistState::Succeeded).len(), 2);
    assert!(!chunks(&events).concat().is_empty());
    assert!(!events.iter().any(|e| matches!(e, StreamEvent::Error { .. })));
    assert_eq!(events.last(), Some(&StreamEvent::Done));

    let prompts = fake_model.prompts.lock().unwrap();
    assert!(prompts[0].contains("No data available for Patent Landscape"));
}

#[tokio::test]
async fn scenario_c_all_fail_with_required_success() {
    let mut config = OrchestratorConfig::default();
    config.require_success = true;
    let fake_model = model(vec!["should not be streamed"]);
    let coordinator = Coordinator::with_parts(
        &config,
        registry(vec![
            (SpecialistKind::Trade, Behaviour::Fail("trade API down")),
            (SpecialistKind::InternalKnowledge, Behaviour::Fail("document store offline")),
        ]),
        fake_model.clone(),
    );

    let events = run(&coordinator, "Export trends and internal manufacturing strategy for metformin").await;

    assert!(chunks(&events).is_empty());
    let errors: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Error { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect();
    assert_eq!(errors, vec![ErrorKind::AllSpecialistsFailed]);
    assert_single_terminal_last(&events);
    assert!(fake_model.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn scenario_c_without_policy_degrades_to_answer() {
    let coordinator = Coordinator::with_parts(
        &OrchestratorConfig::default(),
        registry(vec![]),
        model(vec!["No specialist data was available."]),
    );

    let events = run(&coordinator, "Export trends for metformin").await;

    assert_eq!(
        with_state(&events, SpecialistState::Failed),
        vec![SpecialistKind::Trade]
    );
    assert_eq!(chunks(&events), vec!["No specialist data was available."]);
    assert_eq!(events.last(), Some(&StreamEvent::Done));
}

#[tokio::test]
async fn scenario_d_model_fails_after_three_fragments() {
    let coordinator = Coordinator::with_parts(
        &OrchestratorConfig::default(),
        registry(vec![
            (SpecialistKind::MarketIntelligence, Behaviour::Answer("Market is $5.2B.")),
            (SpecialistKind::Patent, Behaviour::Answer("Expired.")),
        ]),
        Arc::new(FakeModel {
            fragments: vec!["one ", "two ", "three "],
            fail_after: Some("connection reset"),
            ..FakeModel::default()
        }),
    );

    let events = run(&coordinator, MARKET_AND_PATENT).await;

    assert_eq!(chunks(&events), vec!["one ", "two ", "three "]);
    match events.last() {
        Some(StreamEvent::Error { kind, message }) => {
            assert_eq!(*kind, ErrorKind::SynthesisFailure);
            assert!(message.contains("connection reset"));
        }
        other => panic!("expected synthesis error, got {:?}", other),
    }
    assert_single_terminal_last(&events);
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_events_and_abandons_specialists() {
    let dropped = Arc::new(AtomicBool::new(false));
    let coordinator = Coordinator::with_parts(
        &OrchestratorConfig::default(),
        registry(vec![(SpecialistKind::Patent, Behaviour::Hang(Some(dropped.clone())))]),
        model(vec!["never"]),
    );

    let mut stream = coordinator.stream(Query::new("patent expiry for apixaban").unwrap());
    assert_eq!(
        stream.next().await,
        Some(StreamEvent::status(SpecialistKind::Patent, SpecialistState::Started))
    );

    stream.cancel();
    assert_eq!(stream.next().await, None);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(dropped.load(Ordering::SeqCst), "specialist call was not abandoned");
}

#[tokio::test(start_paused = true)]
async fn dropping_stream_abandons_specialists() {
    let dropped = Arc::new(AtomicBool::new(false));
    let coordinator = Coordinator::with_parts(
        &OrchestratorConfig::default(),
        registry(vec![(SpecialistKind::Trade, Behaviour::Hang(Some(dropped.clone())))]),
        model(vec!["never"]),
    );

    let mut stream = coordinator.stream(Query::new("import sourcing of atorvastatin").unwrap());
    stream.next().await;
    drop(stream);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(dropped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn cancel_during_synthesis_drops_model_stream() {
    let dropped = Arc::new(AtomicBool::new(false));
    let coordinator = Coordinator::with_parts(
        &OrchestratorConfig::default(),
        registry(vec![(SpecialistKind::Patent, Behaviour::Answer("Expired in 2002."))]),
        Arc::new(StallingModel {
            dropped: dropped.clone(),
        }),
    );

    let mut stream = coordinator.stream(Query::new("patent expiry for apixaban").unwrap());
    loop {
        match stream.next().await {
            Some(StreamEvent::Status { .. }) => continue,
            Some(StreamEvent::Chunk { text }) => {
                assert_eq!(text, "first ");
                break;
            }
            other => panic!("expected a chunk, got {:?}", other),
        }
    }
    assert!(!dropped.load(Ordering::SeqCst));

    stream.cancel();
    assert_eq!(stream.next().await, None);

    for _ in 0..50 {
        if dropped.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(dropped.load(Ordering::SeqCst), "model stream was not dropped");
}

#[tokio::test(start_paused = true)]
async fn early_release_abandons_stragglers() {
    let dropped = Arc::new(AtomicBool::new(false));
    let mut config = OrchestratorConfig::default();
    config.early_synthesis = EarlySynthesis::AtLeast(1);
    config.late_results = LateResults::Abandon;
    let coordinator = Coordinator::with_parts(
        &config,
        registry(vec![
            (SpecialistKind::Patent, Behaviour::Answer("Expired in 2002.")),
            (SpecialistKind::Trade, Behaviour::Hang(Some(dropped.clone()))),
        ]),
        model(vec!["Patent data only."]),
    );

    let started = tokio::time::Instant::now();
    let events = run(&coordinator, "Patent expiry and export volumes for metformin").await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(
        with_state(&events, SpecialistState::TimedOut),
        vec![SpecialistKind::Trade]
    );
    assert_eq!(chunks(&events), vec!["Patent data only."]);
    assert_single_terminal_last(&events);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(dropped.load(Ordering::SeqCst), "straggler was not abandoned");
}

#[tokio::test]
async fn every_planned_specialist_settles_exactly_once() {
    let coordinator = Coordinator::with_parts(
        &OrchestratorConfig::default(),
        registry(vec![
            (SpecialistKind::MarketIntelligence, Behaviour::Answer("ok")),
            (SpecialistKind::Patent, Behaviour::Fail("503")),
            (SpecialistKind::ClinicalTrials, Behaviour::Answer("ok")),
            (SpecialistKind::Trade, Behaviour::Fail("404")),
        ]),
        model(vec!["summary"]),
    );

    let events = run(
        &coordinator,
        "Market growth, patent expiry, clinical trials and export volumes for metformin",
    )
    .await;

    let started = with_state(&events, SpecialistState::Started);
    let mut settled: Vec<SpecialistKind> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Status { specialist, state, .. } if state.is_settled() => Some(*specialist),
            _ => None,
        })
        .collect();
    settled.sort();
    assert_eq!(started.len(), 4);
    assert_eq!(settled, started);
    assert_single_terminal_last(&events);
}

#[tokio::test]
async fn answer_assembles_text_and_statuses() {
    let coordinator = Coordinator::with_parts(
        &OrchestratorConfig::default(),
        registry(vec![
            (SpecialistKind::MarketIntelligence, Behaviour::Answer("ok")),
            (SpecialistKind::Patent, Behaviour::Fail("503")),
        ]),
        model(vec!["Hello ", "world"]),
    );

    let report = coordinator.answer(Query::new(MARKET_AND_PATENT).unwrap()).await;

    assert_eq!(report.text, "Hello world");
    assert!(report.error.is_none());
    assert_eq!(report.statuses.len(), 2);
    assert_eq!(report.statuses[0].specialist, SpecialistKind::MarketIntelligence);
    assert_eq!(report.statuses[0].state, SpecialistState::Succeeded);
    assert_eq!(report.statuses[1].state, SpecialistState::Failed);
}

#[tokio::test]
async fn invalid_query_is_rejected_before_dispatch() {
    let fake_model = model(vec!["x"]);
    let coordinator = Coordinator::with_parts(
        &OrchestratorConfig::default(),
        registry(vec![]),
        fake_model.clone(),
    );
    let err = coordinator.stream_text("   ", None).err().map(|e| e.kind());
    assert_eq!(err, Some(ErrorKind::InvalidQuery));
    assert!(fake_model.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn replanning_is_idempotent() {
    let planner = IntentPlanner::from_config(&OrchestratorConfig::default());
    let query = Query::new("Patent cliffs and clinical pipeline for oncology biologics").unwrap();
    let first = planner.plan(&query).await;
    assert!(!first.is_empty());
    for _ in 0..10 {
        assert_eq!(planner.plan(&query).await, first);
    }
}
