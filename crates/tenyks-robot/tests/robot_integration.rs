#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! Robot lifecycle against in-memory connections: bootstrap, handshake,
//! supervision, staleness and shutdown.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use tenyks::connection::{Connection, ConnectionTable};
use tenyks::pipeline::{Pipeline, Stage, StageContext};
use tenyks::robot::{ReconnectPolicy, Robot, RobotConfig};
use tenyks_core::OutboundItem;

use common::{MockConnection, config};

fn test_config() -> RobotConfig {
    RobotConfig {
        greeting_timeout: Duration::from_millis(50),
        stale_after: Duration::from_secs(300),
        read_wait: Duration::from_millis(20),
        shutdown_grace: Duration::from_secs(1),
        quit_message: "I'm out!".to_string(),
        reconnect: ReconnectPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        },
    }
}

fn robot_with(
    conns: &[Arc<MockConnection>],
    pipeline: Pipeline,
) -> (Arc<Robot>, mpsc::UnboundedReceiver<OutboundItem>) {
    let table = ConnectionTable::new(
        conns
            .iter()
            .map(|c| Arc::clone(c) as Arc<dyn Connection>),
    );
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(Robot::new(table, pipeline, tx, test_config())), rx)
}

/// Poll `check` until it holds or two seconds pass.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn bootstrap_registers_net1_and_joins_channel() {
    let net1 = Arc::new(MockConnection::new(
        config("net1", "bot", &["#x"]),
        Duration::from_millis(20),
    ));
    let (robot, _rx) = robot_with(&[net1.clone()], Pipeline::default());

    let active = robot.bootstrap().await;

    assert_eq!(active, vec!["net1"]);
    assert_eq!(net1.connects(), 1);
    assert_eq!(
        net1.sent(),
        vec![
            "NICK bot",
            "USER tenyks irc.example.org bla :tenyks IRC bot",
            "JOIN #x",
        ]
    );
}

#[tokio::test]
async fn bootstrap_without_greeting_leaves_connection_out() {
    let good = Arc::new(MockConnection::new(
        config("good", "bot", &[]),
        Duration::from_millis(5),
    ));
    let silent = Arc::new(MockConnection::silent(config("silent", "bot", &["#x"])));
    let (robot, _rx) = robot_with(&[good.clone(), silent.clone()], Pipeline::default());

    let active = robot.start().await;

    assert_eq!(active, vec!["good"]);
    assert!(silent.sent().is_empty());
    assert_eq!(silent.closes(), 1);
    assert_eq!(silent.reconnects(), 0);

    robot.shutdown().await;
}

#[tokio::test]
async fn password_is_sent_before_nick() {
    let mut with_pw = config("net1", "bot", &["#x, hunter2"]);
    with_pw.password = Some("sekrit".to_string());
    let conn = MockConnection::new(with_pw, Duration::ZERO);

    Robot::handshake(&conn).await.unwrap();

    assert_eq!(
        conn.sent(),
        vec![
            "PASS sekrit",
            "NICK bot",
            "USER tenyks irc.example.org bla :tenyks IRC bot",
            "JOIN #x hunter2",
        ]
    );
}

#[tokio::test]
async fn empty_password_is_not_sent() {
    let mut empty_pw = config("net1", "bot", &[]);
    empty_pw.password = Some(String::new());
    let conn = MockConnection::new(empty_pw, Duration::ZERO);

    Robot::handshake(&conn).await.unwrap();

    assert_eq!(conn.sent()[0], "NICK bot");
}

#[tokio::test]
async fn handshake_twice_sends_two_full_sequences() {
    let mut cfg = config("net1", "bot", &[]);
    cfg.password = Some("pw".to_string());
    let conn = MockConnection::new(cfg, Duration::ZERO);

    Robot::handshake(&conn).await.unwrap();
    Robot::handshake(&conn).await.unwrap();

    let sent = conn.sent();
    assert_eq!(sent.len(), 6);
    assert_eq!(sent[..3], sent[3..]);
    assert_eq!(sent.iter().filter(|l| l.starts_with("PASS ")).count(), 2);
}

#[tokio::test]
async fn stale_connection_is_reestablished() {
    let net1 = Arc::new(MockConnection::new(
        config("net1", "bot", &["#x"]),
        Duration::ZERO,
    ));
    let (robot, _rx) = robot_with(&[net1.clone()], Pipeline::default());
    assert_eq!(robot.start().await, vec!["net1"]);

    let silent_since = Instant::now()
        .checked_sub(Duration::from_secs(301))
        .unwrap();
    net1.flags().set_last_liveness(silent_since);
    assert!(!net1.needs_reconnect());

    assert!(eventually(|| net1.reconnects() == 1).await);
    // The handshake runs again after the reconnect.
    assert!(eventually(|| net1.sent().iter().filter(|l| *l == "NICK bot").count() == 2).await);

    robot.shutdown().await;
}

#[tokio::test]
async fn forced_reconnect_is_honoured() {
    let net1 = Arc::new(MockConnection::new(config("net1", "bot", &[]), Duration::ZERO));
    let (robot, _rx) = robot_with(&[net1.clone()], Pipeline::default());
    robot.start().await;

    net1.flags().request_reconnect();

    assert!(eventually(|| net1.reconnects() == 1).await);
    assert!(eventually(|| !net1.needs_reconnect()).await);

    robot.shutdown().await;
}

#[tokio::test]
async fn failed_reestablishment_keeps_retrying() {
    let net1 = Arc::new(MockConnection::new(config("net1", "bot", &[]), Duration::ZERO));
    let (robot, _rx) = robot_with(&[net1.clone()], Pipeline::default());
    robot.start().await;

    net1.fail_next_reconnects(3);
    net1.flags().request_reconnect();

    assert!(eventually(|| net1.reconnects() == 4 && !net1.needs_reconnect()).await);

    robot.shutdown().await;
}

#[tokio::test]
async fn inbound_lines_reach_the_outbound_queue_in_order() {
    let net1 = Arc::new(MockConnection::new(config("net1", "bot", &["#x"]), Duration::ZERO));
    let (robot, mut rx) = robot_with(&[net1.clone()], Pipeline::default());
    robot.start().await;

    net1.push_line(":alice!al@example.org PRIVMSG #x :first");
    net1.push_line("PING :irc.example.org");
    net1.push_line(":alice!al@example.org PRIVMSG #x :second");

    let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first.payload, "first");
    assert_eq!(first.connection, "net1");
    assert_eq!(first.nick, "alice");
    assert_eq!(second.payload, "second");

    robot.shutdown().await;
    assert!(rx.try_recv().is_err());
}

fn reject_everything(_: &StageContext<'_>, _: OutboundItem) -> Option<OutboundItem> {
    None
}

#[tokio::test]
async fn rejected_lines_never_reach_the_queue() {
    let net1 = Arc::new(MockConnection::new(config("net1", "bot", &[]), Duration::ZERO));
    let pipeline = Pipeline::new(vec![Stage {
        name: "reject",
        apply: reject_everything,
    }]);
    let (robot, mut rx) = robot_with(&[net1.clone()], pipeline);
    robot.start().await;

    net1.push_line(":alice!al@h PRIVMSG #x :one");
    net1.push_line(":alice!al@h PRIVMSG #x :two");
    tokio::time::sleep(Duration::from_millis(100)).await;

    robot.shutdown().await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn shutdown_quits_and_closes_every_connection() {
    let net1 = Arc::new(MockConnection::new(config("net1", "bot", &[]), Duration::ZERO));
    let net2 = Arc::new(MockConnection::new(config("net2", "bot", &[]), Duration::ZERO));
    let (robot, _rx) = robot_with(&[net1.clone(), net2.clone()], Pipeline::default());
    robot.start().await;

    robot.shutdown().await;

    for conn in [&net1, &net2] {
        assert!(conn.user_disconnect());
        assert_eq!(conn.sent().last().unwrap(), "QUIT :I'm out!");
        // Once after QUIT and once more after the supervisors are gone.
        assert_eq!(conn.closes(), 2);
    }
}

#[tokio::test]
async fn connection_reopened_during_shutdown_still_gets_quit() {
    let net1 = Arc::new(MockConnection::new(config("net1", "bot", &[]), Duration::ZERO));
    let (robot, _rx) = robot_with(&[net1.clone()], Pipeline::default());
    robot.start().await;

    net1.delay_reconnects(Duration::from_millis(200));
    net1.flags().request_reconnect();
    assert!(eventually(|| net1.reconnects() == 1).await);

    robot.shutdown().await;

    let sent = net1.sent();
    // The fresh socket registered after the first QUIT went out, so it is
    // quit again before the supervisor exits.
    assert_eq!(sent.iter().filter(|l| *l == "NICK bot").count(), 2);
    assert_eq!(sent.iter().filter(|l| l.starts_with("QUIT ")).count(), 2);
    assert_eq!(sent.last().unwrap(), "QUIT :I'm out!");
}

#[tokio::test]
async fn one_failing_connection_does_not_affect_another() {
    let flaky = Arc::new(MockConnection::new(config("flaky", "bot", &[]), Duration::ZERO));
    let steady = Arc::new(MockConnection::new(config("steady", "bot", &[]), Duration::ZERO));
    let (robot, mut rx) = robot_with(&[flaky.clone(), steady.clone()], Pipeline::default());
    robot.start().await;

    flaky.fail_next_reconnects(usize::MAX);
    flaky.flags().request_reconnect();
    steady.push_line(":alice!al@h PRIVMSG #x :still here");

    let item = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.connection, "steady");
    assert!(flaky.reconnects() >= 1);

    robot.shutdown().await;
}
