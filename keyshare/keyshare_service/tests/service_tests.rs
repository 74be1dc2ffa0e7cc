use blstrs::Scalar;
use chain::mock::{MockChainClient, MockEventSender, MockEventSource, MockShareSource};
use chain::{TxEvent, QUEUED_PUBKEY_EXPIRY_KEY, QUEUED_PUBKEY_KEY};
use ibe::IbeSuite;
use keyshare_service::{Config, KeyshareService, Subscriptions};
use processor::Senders;
use keyshare_types::{KeyShare, Message, ShareIndex};
use std::sync::Arc;
use std::time::Duration;
use task_executor::TaskExecutor;
use tokio::sync::oneshot;
use tokio::time::{sleep, Instant};
use validator_store::ValidatorState;

/// Enable debug logging for tests
const ENABLE_TEST_LOGGING: bool = false;

fn share(value: u64, index: u32) -> KeyShare {
    KeyShare::new(Scalar::from(value), ShareIndex(index)).unwrap()
}

struct TestValidator {
    chain: Arc<MockChainClient>,
    shares: Arc<MockShareSource>,
    state: Arc<ValidatorState>,
}

impl TestValidator {
    fn new(index: usize, current: KeyShare) -> Self {
        let chain = Arc::new(MockChainClient::new(&format!("fairy1validator{index}")));
        let shares = Arc::new(MockShareSource::new(current.clone()));
        let state = Arc::new(ValidatorState::new(
            index,
            chain.clone(),
            shares.clone(),
            current,
        ));
        Self {
            chain,
            shares,
            state,
        }
    }
}

struct TestHarness {
    service: Arc<KeyshareService>,
    events: MockEventSender,
    senders: Senders,
    // dropping the signal would shut the executor down
    _signal: async_channel::Sender<()>,
}

async fn start_service(validators: &[TestValidator], config: Config) -> TestHarness {
    start_service_with_workers(validators, config, 4).await
}

async fn start_service_with_workers(
    validators: &[TestValidator],
    config: Config,
    max_workers: usize,
) -> TestHarness {
    if ENABLE_TEST_LOGGING {
        let _ = tracing_subscriber::fmt()
            .compact()
            .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
            .try_init();
    }

    let handle = tokio::runtime::Handle::current();
    let (signal, exit) = async_channel::bounded(1);
    let (shutdown_tx, _) = futures::channel::mpsc::channel(1);
    let executor = TaskExecutor::new(handle, exit, shutdown_tx);

    let senders = processor::spawn(processor::Config { max_workers }, executor.clone());
    let service = KeyshareService::new(
        validators.iter().map(|v| v.state.clone()).collect(),
        Arc::new(IbeSuite::default()),
        senders.clone(),
        config,
    );
    let (source, events) = MockEventSource::new();
    let subscriptions = Subscriptions::open(&source).await.unwrap();
    service.start(subscriptions, &executor);

    TestHarness {
        service,
        events,
        senders,
        _signal: signal,
    }
}

fn fast_config() -> Config {
    Config {
        confirmation_timeout: Duration::from_millis(200),
        tx_poll_interval: Duration::from_millis(10),
        submit_commitment: true,
    }
}

/// Polls `condition` until it holds, panicking after a second.
async fn wait_until(description: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(1);
    while !condition() {
        if Instant::now() > deadline {
            panic!("timed out waiting until {description}");
        }
        sleep(Duration::from_millis(5)).await;
    }
}

fn queued_pubkey_event(expiry: &str) -> TxEvent {
    let mut event = TxEvent::default();
    event
        .events
        .insert(QUEUED_PUBKEY_KEY.to_string(), vec!["a1b2c3d4".to_string()]);
    event
        .events
        .insert(QUEUED_PUBKEY_EXPIRY_KEY.to_string(), vec![expiry.to_string()]);
    event
}

/// The key `chain` submitted for `height`.
fn submitted_key(chain: &MockChainClient, height: u64) -> Option<String> {
    chain.messages().into_iter().find_map(|m| match m {
        Message::SendKeyshare {
            message,
            block_height,
            ..
        } if block_height == height => Some(message),
        _ => None,
    })
}

fn sorted(mut heights: Vec<u64>) -> Vec<u64> {
    heights.sort_unstable();
    heights
}

#[tokio::test]
async fn submits_key_for_next_height() {
    let validator = TestValidator::new(0, share(0xabcdef, 3));
    let harness = start_service(std::slice::from_ref(&validator), fast_config()).await;

    harness.events.new_block(999);
    wait_until("the keyshare is confirmed", || validator.chain.confirmed() == 1).await;

    let expected = IbeSuite::default()
        .derive(&share(0xabcdef, 3), 1000)
        .unwrap();
    assert_eq!(
        validator.chain.messages(),
        vec![Message::SendKeyshare {
            creator: "fairy1validator0".to_string(),
            message: expected.key_hex,
            key_share_index: 3,
            block_height: 1000,
            commitment: Some(expected.commitment_hex),
        }]
    );
    assert_eq!(harness.service.validators().len(), 1);
}

#[tokio::test]
async fn commitment_can_be_omitted() {
    let validator = TestValidator::new(0, share(5, 1));
    let config = Config {
        submit_commitment: false,
        ..fast_config()
    };
    let harness = start_service(std::slice::from_ref(&validator), config).await;

    harness.events.new_block(10);
    wait_until("the keyshare is broadcast", || {
        validator.chain.submitted_heights() == vec![11]
    })
    .await;

    assert!(matches!(
        &validator.chain.messages()[0],
        Message::SendKeyshare {
            commitment: None,
            ..
        }
    ));
}

#[tokio::test]
async fn failing_validator_does_not_block_others() {
    let a = TestValidator::new(0, share(1, 1));
    let b = TestValidator::new(1, share(2, 2));
    a.chain.fail_height(11);
    let (a_chain, b_chain) = (a.chain.clone(), b.chain.clone());
    let harness = start_service(&[a, b], fast_config()).await;

    harness.events.new_block(10);
    harness.events.new_block(11);

    wait_until("B submitted both heights and A the second one", || {
        sorted(b_chain.submitted_heights()) == vec![11, 12] && a_chain.submitted_heights() == vec![12]
    })
    .await;
    wait_until("the successful submissions are confirmed", || {
        b_chain.confirmed() == 2 && a_chain.confirmed() == 1
    })
    .await;
}

#[tokio::test]
async fn slow_confirmation_does_not_block_next_height() {
    let a = TestValidator::new(0, share(1, 1));
    let b = TestValidator::new(1, share(2, 2));
    a.chain.set_never_confirm(true);
    let (a_chain, b_chain) = (a.chain.clone(), b.chain.clone());
    let config = Config {
        confirmation_timeout: Duration::from_secs(30),
        ..fast_config()
    };
    let harness = start_service(&[a, b], config).await;

    harness.events.new_block(1);
    harness.events.new_block(2);

    wait_until("both heights were broadcast by both validators", || {
        sorted(a_chain.submitted_heights()) == vec![2, 3]
            && sorted(b_chain.submitted_heights()) == vec![2, 3]
    })
    .await;
    wait_until("B's submissions are confirmed", || b_chain.confirmed() == 2).await;
    assert_eq!(a_chain.confirmed(), 0);
}

#[tokio::test]
async fn rejected_transaction_does_not_stop_the_loop() {
    let validator = TestValidator::new(0, share(9, 4));
    validator.chain.set_result_code(18);
    let harness = start_service(std::slice::from_ref(&validator), fast_config()).await;

    harness.events.new_block(50);
    wait_until("the first keyshare is broadcast", || {
        validator.chain.submitted_heights() == vec![51]
    })
    .await;
    harness.events.new_block(51);
    wait_until("the second keyshare is broadcast", || {
        validator.chain.submitted_heights() == vec![51, 52]
    })
    .await;

    assert_eq!(validator.chain.confirmed(), 0);
}

#[tokio::test]
async fn rotation_event_installs_pending_share() {
    let a = TestValidator::new(0, share(1, 1));
    let b = TestValidator::new(1, share(2, 2));
    a.state.set_current_share_expiry_block(500);
    b.state.set_current_share_expiry_block(500);
    a.shares.set_share(share(11, 1));
    // B's share service is down, A must still get its share
    b.shares.set_failing(true);
    let harness = start_service(&[a, b], fast_config()).await;
    let validators = harness.service.validators();

    harness.events.tx(queued_pubkey_event("800"));

    wait_until("A's pending share is installed", || {
        validators[0].snapshot().pending_share == Some(share(11, 1))
    })
    .await;
    let a_record = validators[0].snapshot();
    assert_eq!(a_record.pending_share_expiry_block, 800);
    assert_eq!(a_record.current_share, share(1, 1));

    let b_record = validators[1].snapshot();
    assert_eq!(b_record.pending_share, None);
    assert_eq!(b_record.current_share, share(2, 2));
}

#[tokio::test]
async fn duplicate_rotation_events_converge() {
    let validator = TestValidator::new(0, share(1, 1));
    validator.state.set_current_share_expiry_block(500);
    validator.shares.set_share(share(11, 1));
    let harness = start_service(std::slice::from_ref(&validator), fast_config()).await;

    harness.events.tx(queued_pubkey_event("800"));
    wait_until("the share is fetched once", || {
        validator.shares.get_share_calls() == 1
    })
    .await;
    wait_until("the pending share is installed", || {
        validator.state.snapshot().pending_share.is_some()
    })
    .await;
    let once = validator.state.snapshot();

    harness.events.tx(queued_pubkey_event("800"));
    wait_until("the share is fetched twice", || {
        validator.shares.get_share_calls() == 2
    })
    .await;
    // let the second install land
    sleep(Duration::from_millis(20)).await;

    assert_eq!(validator.state.snapshot(), once);
}

#[tokio::test]
async fn malformed_rotation_event_is_skipped() {
    let validator = TestValidator::new(0, share(1, 1));
    validator.shares.set_share(share(11, 1));
    let harness = start_service(std::slice::from_ref(&validator), fast_config()).await;

    harness.events.tx(queued_pubkey_event("not-a-height"));
    harness.events.tx(TxEvent::default());
    harness.events.tx(queued_pubkey_event("70"));

    wait_until("the valid event is applied", || {
        validator.state.snapshot().pending_share_expiry_block == 70
    })
    .await;
    assert_eq!(validator.shares.get_share_calls(), 1);
}

#[tokio::test]
async fn stale_rotation_event_is_rejected() {
    let validator = TestValidator::new(0, share(1, 1));
    validator.state.set_current_share_expiry_block(500);
    validator.shares.set_share(share(11, 1));
    let harness = start_service(std::slice::from_ref(&validator), fast_config()).await;

    harness.events.tx(queued_pubkey_event("400"));
    wait_until("the share is fetched", || {
        validator.shares.get_share_calls() == 1
    })
    .await;
    sleep(Duration::from_millis(20)).await;

    let record = validator.state.snapshot();
    assert_eq!(record.pending_share, None);
    assert_eq!(record.current_share_expiry_block, 500);
}

#[tokio::test]
async fn blocks_switch_to_pending_share_at_expiry() {
    let validator = TestValidator::new(0, share(1, 1));
    validator.state.set_current_share_expiry_block(500);
    validator.shares.set_share(share(2, 1));
    let harness = start_service(std::slice::from_ref(&validator), fast_config()).await;
    let suite = IbeSuite::default();

    harness.events.tx(queued_pubkey_event("800"));
    wait_until("the pending share is installed", || {
        validator.state.snapshot().pending_share.is_some()
    })
    .await;

    harness.events.new_block(499);
    wait_until("height 500 is submitted", || {
        validator.chain.submitted_heights() == vec![500]
    })
    .await;
    assert_eq!(validator.state.snapshot().current_share, share(1, 1));

    harness.events.new_block(500);
    wait_until("height 501 is submitted", || {
        validator.chain.submitted_heights() == vec![500, 501]
    })
    .await;

    let keys: Vec<String> = validator
        .chain
        .messages()
        .into_iter()
        .filter_map(|m| match m {
            Message::SendKeyshare { message, .. } => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(keys[0], suite.derive(&share(1, 1), 500).unwrap().key_hex);
    assert_eq!(keys[1], suite.derive(&share(2, 1), 501).unwrap().key_hex);

    let record = validator.state.snapshot();
    assert_eq!(record.current_share, share(2, 1));
    assert_eq!(record.current_share_expiry_block, 800);
    assert_eq!(record.pending_share, None);
}

#[tokio::test]
async fn expired_share_without_pending_keeps_submitting() {
    let validator = TestValidator::new(0, share(1, 1));
    validator.state.set_current_share_expiry_block(100);
    let harness = start_service(std::slice::from_ref(&validator), fast_config()).await;

    harness.events.new_block(150);
    wait_until("height 151 is confirmed", || validator.chain.confirmed() == 1).await;

    let record = validator.state.snapshot();
    assert_eq!(record.current_share, share(1, 1));
    assert_eq!(record.current_share_expiry_block, 100);
}

#[tokio::test]
async fn derivation_failure_is_isolated() {
    let zero = KeyShare::new(Scalar::from(0u64), ShareIndex(1)).unwrap();
    let a = TestValidator::new(0, zero);
    let b = TestValidator::new(1, share(2, 2));
    let (a_chain, b_chain) = (a.chain.clone(), b.chain.clone());
    let harness = start_service(&[a, b], fast_config()).await;

    harness.events.new_block(7);
    harness.events.new_block(8);

    wait_until("B submitted both heights", || {
        sorted(b_chain.submitted_heights()) == vec![8, 9]
    })
    .await;
    assert!(a_chain.messages().is_empty());
}

#[tokio::test]
async fn held_back_derivation_keeps_the_share_of_its_height() {
    let validator = TestValidator::new(0, share(1, 1));
    validator.state.set_current_share_expiry_block(500);
    validator.state.set_pending_share(share(2, 1));
    validator.state.set_pending_share_expiry_block(800);
    let harness =
        start_service_with_workers(std::slice::from_ref(&validator), fast_config(), 1).await;
    let suite = IbeSuite::default();

    // occupy the only derivation worker until released
    let (release, held) = oneshot::channel::<()>();
    harness
        .senders
        .key_derivation
        .send_blocking(
            move || {
                let _ = held.blocking_recv();
            },
            "held_derivation",
        )
        .unwrap();

    harness.events.new_block(499);
    harness.events.new_block(500);
    wait_until("the second block rotated the share", || {
        validator.state.snapshot().current_share == share(2, 1)
    })
    .await;
    assert!(validator.chain.messages().is_empty());

    release.send(()).unwrap();
    wait_until("both heights are submitted", || {
        sorted(validator.chain.submitted_heights()) == vec![500, 501]
    })
    .await;

    assert_eq!(
        submitted_key(&validator.chain, 500),
        Some(suite.derive(&share(1, 1), 500).unwrap().key_hex)
    );
    assert_eq!(
        submitted_key(&validator.chain, 501),
        Some(suite.derive(&share(2, 1), 501).unwrap().key_hex)
    );
}
