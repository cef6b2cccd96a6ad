use roda_window::{
    IngestError, IngestStep, Ingestor, ReplayFeed, SharedWindow, WindowOptions, connect,
};
use std::io::Write;
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn shared(capacity: usize, batch_size: usize, columns: usize) -> Arc<SharedWindow> {
    let options = WindowOptions::new(capacity, batch_size, columns).unwrap();
    Arc::new(SharedWindow::in_memory(options).unwrap())
}

#[test]
fn test_tcp_feed_with_fragmented_writes() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let feed = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        for chunk in ["1.0,", "2.0\n3.0,4", ".0\nbad,", "row\n5.0,6.0\n7.0,8.0"] {
            stream.write_all(chunk.as_bytes()).unwrap();
            stream.flush().unwrap();
            thread::sleep(Duration::from_millis(5));
        }
    });

    let window = shared(4, 2, 2);
    let stream = connect(&addr, Duration::from_secs(5)).unwrap();
    let mut ingestor = Ingestor::new(stream, window.clone());
    let stats = ingestor.run(|| true).unwrap();
    feed.join().unwrap();

    assert_eq!(stats.records, 4);
    assert_eq!(stats.discarded, 1);
    assert_eq!(stats.commits, 2);
    assert_eq!(
        window.snapshot().unwrap().as_slice(),
        &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]
    );
}

#[test]
fn test_idle_connection_keeps_polling() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let feed = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        thread::sleep(Duration::from_millis(600));
        drop(stream);
    });

    let window = shared(2, 1, 2);
    let mut ingestor = Ingestor::new(connect(&addr, Duration::from_secs(5)).unwrap(), window);

    let start = Instant::now();
    assert_eq!(ingestor.step().unwrap(), IngestStep::Continue);
    assert!(start.elapsed() < Duration::from_millis(550));

    let deadline = Instant::now() + Duration::from_secs(5);
    while ingestor.step().unwrap() == IngestStep::Continue {
        assert!(Instant::now() < deadline);
    }
    feed.join().unwrap();
}

#[test]
fn test_connect_to_closed_port_fails() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let result = connect(&format!("127.0.0.1:{}", port), Duration::from_millis(500));
    assert!(matches!(result, Err(IngestError::Connect { .. })));
}

#[test]
fn test_replay_feed_over_tcp() {
    let rows: Vec<Vec<f64>> = (1..=12).map(|i| vec![i as f64, -(i as f64)]).collect();
    let feed = ReplayFeed::from_rows(&rows, 5_000.0).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let server = thread::spawn(move || feed.serve(&listener, || true).unwrap());

    let window = shared(6, 3, 2);
    let mut ingestor = Ingestor::new(connect(&addr, Duration::from_secs(5)).unwrap(), window.clone());
    let stats = ingestor.run(|| true).unwrap();

    assert_eq!(server.join().unwrap(), 12);
    assert_eq!(stats.records, 12);
    assert_eq!(stats.commits, 4);
    let snapshot = window.snapshot().unwrap();
    assert_eq!(snapshot.column(0), vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
    assert_eq!(snapshot.column(1), vec![-7.0, -8.0, -9.0, -10.0, -11.0, -12.0]);
}

#[test]
fn test_serve_returns_when_cancelled_before_client() {
    let feed = ReplayFeed::synthetic(2, 1000.0).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let start = Instant::now();
    let deadline = start + Duration::from_millis(50);
    let sent = feed.serve(&listener, || Instant::now() < deadline).unwrap();
    assert_eq!(sent, 0);
    assert!(start.elapsed() < Duration::from_secs(5));
}
