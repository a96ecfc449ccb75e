use market_common::command::{Command, Response};
use market_common::net::PONG;
use market_common::payload::Snapshot;
use market_common::stock::{Direction, StockSpec};
use market_server::config::EngineConfig;
use market_server::feed_listener::FeedListener;
use market_server::hub::SubscriberSink;
use market_server::receiver::CommandReceiver;
use market_server::session::SessionClock;
use market_server::MarketEngine;
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct CollectingSink {
    frames: Mutex<Vec<Snapshot>>,
}

impl SubscriberSink for CollectingSink {
    fn send(&self, frame: &[u8]) -> io::Result<()> {
        let snapshot: Snapshot = serde_json::from_slice(frame).map_err(io::Error::other)?;
        self.frames.lock().unwrap().push(snapshot);
        Ok(())
    }

    fn close(&self) {}

    fn describe(&self) -> String {
        "collector".to_string()
    }
}

fn stocks() -> Vec<StockSpec> {
    vec![
        StockSpec::new("ACME", "Acme", 100.0, "Tech"),
        StockSpec::new("BOLT", "Bolt", 20.0, "Energy"),
        StockSpec::new("CRUX", "Crux", 50.0, "Tech"),
    ]
}

fn engine() -> Arc<MarketEngine> {
    let config = EngineConfig {
        seed_history_points: 10,
        shock_pacing: false,
        rng_seed: Some(2024),
        ..EngineConfig::default()
    };
    Arc::new(MarketEngine::new(stocks(), config, SessionClock::unbounded()).unwrap())
}

fn price_of(snapshot: &Snapshot, id: &str) -> f64 {
    snapshot
        .stocks
        .iter()
        .find(|s| s.id == id)
        .map(|s| s.price)
        .unwrap()
}

#[test]
fn spike_converges_to_exact_target_through_the_engine() {
    let engine = engine();
    let sink = Arc::new(CollectingSink::default());
    engine.subscribe(sink.clone()).unwrap();

    let (ack, handle) = engine
        .spawn_shock(&["ACME".to_string()], Direction::Spike, 0.5)
        .unwrap();
    assert_eq!(ack.target_multiplier, 1.5);
    handle.join().unwrap();

    assert_eq!(engine.get_price("ACME").unwrap(), 150.0);

    let frames = sink.frames.lock().unwrap();
    assert!(frames.len() > ack.step_count as usize);
    assert_eq!(price_of(&frames[0], "ACME"), 100.0);
    for frame in frames.iter() {
        assert!(price_of(frame, "ACME") <= 159.0 + 1e-9);
        assert_eq!(price_of(frame, "BOLT"), 20.0);
    }
    assert_eq!(price_of(frames.last().unwrap(), "ACME"), 150.0);

    let candles = engine.query_candles("ACME", 2).unwrap();
    assert_eq!(candles.len(), 2);
    assert_eq!(candles[1].close, 150.0);
    assert!(candles.iter().any(|c| c.volume >= 1200));
}

#[test]
fn concurrent_writers_never_tear_snapshots() {
    let engine = engine();
    let market = engine.market().clone();
    market.store.set_price("ACME", 75.0).unwrap();
    market.store.set_price("CRUX", 75.0).unwrap();
    let sink = Arc::new(CollectingSink::default());
    engine.subscribe(sink.clone()).unwrap();

    let (ack, tank) = engine
        .spawn_shock(&["BOLT".to_string()], Direction::Tank, 0.3)
        .unwrap();

    // Each write moves ACME and CRUX together; BOLT belongs to the shock.
    let writers: Vec<_> = (0..4)
        .map(|w| {
            let market = market.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    let value = 60.0 + f64::from(w) * 10.0 + f64::from(i) * 0.01;
                    let records = market
                        .store
                        .update_all(|_, record| match record.id.as_str() {
                            "BOLT" => record.price,
                            _ => value,
                        })
                        .unwrap();
                    market.publish(records);
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }
    tank.join().unwrap();

    let frames = sink.frames.lock().unwrap();
    assert!(frames.len() > 800 + ack.step_count as usize);
    for frame in frames.iter() {
        let ids: Vec<&str> = frame.stocks.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["ACME", "BOLT", "CRUX"]);
        assert_eq!(price_of(frame, "ACME"), price_of(frame, "CRUX"));
        let bolt = price_of(frame, "BOLT");
        assert!(bolt >= 14.0 * 0.94 - 1e-9, "BOLT at {} below the corridor", bolt);
    }
    assert!((engine.get_price("BOLT").unwrap() - 14.0).abs() < 1e-9);
}

#[test]
fn failed_subscriber_does_not_disturb_the_others() {
    struct Broken;
    impl SubscriberSink for Broken {
        fn send(&self, _frame: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
        }
        fn close(&self) {}
        fn describe(&self) -> String {
            "broken".to_string()
        }
    }

    let engine = engine();
    let good = Arc::new(CollectingSink::default());
    engine.subscribe(good.clone()).unwrap();
    assert!(engine.subscribe(Arc::new(Broken)).is_err());
    assert_eq!(engine.market().hub.len(), 1);

    let (_, handle) = engine
        .spawn_shock(&["CRUX".to_string()], Direction::Tank, 0.1)
        .unwrap();
    handle.join().unwrap();
    assert_eq!(engine.market().hub.len(), 1);
    assert!(good.frames.lock().unwrap().len() > 1);
}

#[test]
fn tcp_endpoints_serve_feed_and_commands() {
    let engine = engine();

    let feed = FeedListener::new("127.0.0.1:0").unwrap();
    let feed_addr = feed.local_addr().unwrap();
    feed.start(Arc::clone(&engine));

    let receiver = CommandReceiver::new("127.0.0.1:0").unwrap();
    let command_addr = receiver.local_addr().unwrap();
    let commands_engine = Arc::clone(&engine);
    thread::spawn(move || receiver.receive_loop(commands_engine));

    let subscriber = TcpStream::connect(feed_addr).unwrap();
    subscriber.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut feed_reader = BufReader::new(subscriber.try_clone().unwrap());
    let mut line = String::new();
    feed_reader.read_line(&mut line).unwrap();
    let initial: Snapshot = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(initial.stocks.len(), 3);
    (&subscriber).write_all(format!("{}\n", PONG).as_bytes()).unwrap();

    let mut client = TcpStream::connect(command_addr).unwrap();
    client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut client_reader = BufReader::new(client.try_clone().unwrap());

    client
        .write_all(Command::Price { symbol: "bolt".into() }.to_line().unwrap().as_bytes())
        .unwrap();
    let mut reply = String::new();
    client_reader.read_line(&mut reply).unwrap();
    let response: Response = serde_json::from_str(reply.trim()).unwrap();
    assert_eq!(
        response,
        Response::Price {
            symbol: "bolt".into(),
            price: 20.0
        }
    );

    client.write_all(b"garbage\n").unwrap();
    reply.clear();
    client_reader.read_line(&mut reply).unwrap();
    let response: Response = serde_json::from_str(reply.trim()).unwrap();
    assert!(matches!(response, Response::Error { ref kind, .. } if kind == "invalid_input"));

    client.write_all(Command::Status.to_line().unwrap().as_bytes()).unwrap();
    reply.clear();
    client_reader.read_line(&mut reply).unwrap();
    let response: Response = serde_json::from_str(reply.trim()).unwrap();
    assert!(matches!(response, Response::Session(ref s) if s.open));

    let mut waited = 0;
    while engine.market().hub.is_empty() && waited < 100 {
        thread::sleep(Duration::from_millis(10));
        waited += 1;
    }
    assert_eq!(engine.market().hub.len(), 1);
}
