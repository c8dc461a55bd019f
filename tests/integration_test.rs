//! Integration tests for the record-save-load-replay cycle

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use dvdrw::transport::TransportFuture;
use dvdrw::{
    CassetteLibrary, CassetteLoader, Config, ConnectError, DvdError, Failure, Lookup, Matcher,
    MatcherSet, NetworkError, Player, RecordHooks, RequestSnapshot, ResponseSnapshot,
    TimeoutError, Transport,
};

/// Live transport stand-in: answers from a closure and counts calls
struct MockTransport<F> {
    handler: F,
    calls: AtomicUsize,
}

impl<F> MockTransport<F>
where
    F: Fn(&RequestSnapshot) -> Result<ResponseSnapshot, Failure> + Send + Sync,
{
    fn new(handler: F) -> Self {
        Self {
            handler,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<F> Transport for MockTransport<F>
where
    F: Fn(&RequestSnapshot) -> Result<ResponseSnapshot, Failure> + Send + Sync,
{
    fn send<'a>(&'a self, request: &'a RequestSnapshot) -> TransportFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = (self.handler)(request);
        Box::pin(async move { result })
    }
}

fn offline(_request: &RequestSnapshot) -> Result<ResponseSnapshot, Failure> {
    panic!("network must not be hit during replay")
}

fn get(url: &str) -> RequestSnapshot {
    RequestSnapshot::from_url("GET", url).unwrap()
}

fn body(response: &ResponseSnapshot) -> &[u8] {
    response.body.as_deref().unwrap_or_default()
}

fn is_unmatched(err: &Failure) -> bool {
    matches!(
        err.downcast_ref::<DvdError>(),
        Some(DvdError::UnmatchedInReplay { .. })
    )
}

#[tokio::test]
async fn test_record_save_load_replay() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("cycle.json");
    let matchers = MatcherSet::new([Matcher::Host, Matcher::Method, Matcher::Path]);

    // Phase 1: record
    {
        let loader = CassetteLoader::new(&path, matchers.clone());
        let session = loader.open().unwrap();
        let live = MockTransport::new(|request: &RequestSnapshot| {
            Ok(ResponseSnapshot::new(200)
                .with_header("Content-Type", "text/plain")
                .with_body(format!("live {}", request.path)))
        });
        let player = Player::new(session.cassette(), live);

        let first = player.play(&get("https://example.com/a")).await.unwrap();
        let second = player.play(&get("https://example.com/a")).await.unwrap();
        assert_eq!(body(&first), b"live /a");
        assert_eq!(body(&second), b"live /a");
        assert_eq!(player.live().calls(), 2);

        assert!(session.finish().unwrap());
    }

    // Phase 2: replay
    {
        let loader = CassetteLoader::new(&path, matchers);
        let session = loader.open().unwrap();
        let cassette = session.cassette();
        assert!(cassette.is_from_storage());
        assert_eq!(cassette.len(), 2);

        let player = Player::new(cassette, MockTransport::new(offline));

        let first = player.play(&get("https://example.com/a")).await.unwrap();
        assert_eq!(first.status, 200);
        assert_eq!(
            first.headers,
            vec![("Content-Type".to_string(), "text/plain".to_string())]
        );
        assert_eq!(body(&first), b"live /a");
        player.play(&get("https://example.com/a")).await.unwrap();

        let err = player
            .play(&get("https://example.com/a"))
            .await
            .unwrap_err();
        assert!(is_unmatched(&err));

        // nothing recorded, so nothing to save
        assert!(!session.finish().unwrap());
    }
}

#[tokio::test]
async fn test_exception_round_trip_through_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("exceptions.json");

    {
        let loader = CassetteLoader::new(&path, MatcherSet::default());
        let session = loader.open().unwrap();
        let live = MockTransport::new(|request: &RequestSnapshot| {
            if request.path == "/slow" {
                Err(Box::new(TimeoutError::new("read timed out", 1500)) as Failure)
            } else {
                Err(Box::new(ConnectError::new("conn failed")) as Failure)
            }
        });
        let player = Player::new(session.cassette(), live);

        let err = player.play(&get("https://example.com/down")).await.unwrap_err();
        assert!(err.downcast_ref::<ConnectError>().is_some());
        let err = player.play(&get("https://example.com/slow")).await.unwrap_err();
        assert!(err.downcast_ref::<TimeoutError>().is_some());

        session.finish().unwrap();
    }

    let loader = CassetteLoader::new(&path, MatcherSet::default());
    let session = loader.open().unwrap();
    let player = Player::new(session.cassette(), MockTransport::new(offline));

    let err = player.play(&get("https://example.com/down")).await.unwrap_err();
    assert_eq!(
        err.downcast_ref::<ConnectError>().unwrap().message,
        "conn failed"
    );

    let err = player.play(&get("https://example.com/slow")).await.unwrap_err();
    let timeout = err.downcast_ref::<TimeoutError>().unwrap();
    assert_eq!(timeout.message, "read timed out");
    assert_eq!(timeout.timeout_ms, 1500);

    let err = player.play(&get("https://example.com/down")).await.unwrap_err();
    assert!(is_unmatched(&err));
}

#[tokio::test]
async fn test_unknown_failure_kind_falls_back() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("unknown_kind.json");
    std::fs::write(
        &path,
        r#"{
            "version": 1,
            "entries": [{
                "request": {"method": "GET", "scheme": "https", "host": "example.com", "path": "/x"},
                "outcome": {"exception": {"kind": "acme.QuotaExceeded", "message": "quota"}}
            }]
        }"#,
    )
    .unwrap();

    let loader = CassetteLoader::new(&path, MatcherSet::default());
    let session = loader.open().unwrap();
    let player = Player::new(session.cassette(), MockTransport::new(offline));

    let err = player.play(&get("https://example.com/x")).await.unwrap_err();
    let network = err.downcast_ref::<NetworkError>().unwrap();
    assert!(network.is_fallback());
    assert_eq!(network.original_kind(), Some("acme.QuotaExceeded"));
    assert_eq!(network.message(), "quota");
}

#[tokio::test]
async fn test_replay_uses_loader_matchers() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("matchers.json");

    {
        let loader = CassetteLoader::new(&path, MatcherSet::new(Matcher::ALL));
        let cassette = loader.load().unwrap();
        cassette
            .record(
                get("https://example.com/search?q=one"),
                ResponseSnapshot::new(200).with_body("results"),
            )
            .unwrap();
        loader.save().unwrap();
    }

    // Query is not matched on at replay time, so a different query still hits
    let loader = CassetteLoader::new(&path, MatcherSet::new([Matcher::Host, Matcher::Path]));
    let cassette = loader.load().unwrap();
    assert!(matches!(
        cassette.lookup(&get("https://example.com/search?q=two")),
        Lookup::Matched(_)
    ));
}

#[tokio::test]
async fn test_non_recordable_passes_through_in_replay() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("passthrough.json");
    let matchers = MatcherSet::new([Matcher::Host, Matcher::Method, Matcher::Path]);

    {
        let loader = CassetteLoader::new(&path, matchers.clone());
        let session = loader.open().unwrap();
        let live = MockTransport::new(|_: &RequestSnapshot| {
            Ok(ResponseSnapshot::new(200).with_body("replayed"))
        });
        let player = Player::new(session.cassette(), live);
        player.play(&get("https://example.com/replay")).await.unwrap();
    }

    let hooks = RecordHooks::new().before_record_request(|request: RequestSnapshot| {
        matches!(request.path.as_str(), "/replay" | "/missing-recordable").then_some(request)
    });
    let loader = CassetteLoader::new(&path, matchers).with_hooks(hooks);
    let session = loader.open().unwrap();

    let replay = Player::new(session.cassette(), MockTransport::new(offline));
    let replayed = replay.play(&get("https://example.com/replay")).await.unwrap();
    assert_eq!(body(&replayed), b"replayed");

    let live = Player::new(
        session.cassette(),
        MockTransport::new(|_: &RequestSnapshot| Ok(ResponseSnapshot::new(200).with_body("live"))),
    );
    let passed = live.play(&get("https://example.com/live")).await.unwrap();
    assert_eq!(body(&passed), b"live");
    assert_eq!(live.live().calls(), 1);

    let err = replay
        .play(&get("https://example.com/missing-recordable"))
        .await
        .unwrap_err();
    assert!(is_unmatched(&err));
}

#[tokio::test]
async fn test_filtered_headers_never_persisted() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("filtered.json");
    let hooks = RecordHooks::new().filter_headers(["Authorization"]);

    {
        let loader =
            CassetteLoader::new(&path, MatcherSet::new(Matcher::ALL)).with_hooks(hooks.clone());
        let session = loader.open().unwrap();
        let player = Player::new(
            session.cassette(),
            MockTransport::new(|_: &RequestSnapshot| Ok(ResponseSnapshot::new(200))),
        );
        player
            .play(
                &get("https://example.com/api")
                    .with_header("Authorization", "Bearer secret-token")
                    .with_header("X-Other", "1"),
            )
            .await
            .unwrap();
    }

    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(!saved.contains("secret-token"));
    assert!(!saved.to_lowercase().contains("authorization"));

    let loader = CassetteLoader::new(&path, MatcherSet::new(Matcher::ALL)).with_hooks(hooks);
    let session = loader.open().unwrap();
    let player = Player::new(session.cassette(), MockTransport::new(offline));
    player
        .play(
            &get("https://example.com/api")
                .with_header("authorization", "Bearer other-token")
                .with_header("X-Other", "1"),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_response_hook_scrubs_saved_body() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("scrubbed.json");
    let hooks = RecordHooks::new().before_record_response(|mut response: ResponseSnapshot| {
        response
            .headers
            .retain(|(name, _)| !name.eq_ignore_ascii_case("set-cookie"));
        response.with_body(r#"{"token":"REDACTED"}"#)
    });

    {
        let loader = CassetteLoader::new(&path, MatcherSet::default()).with_hooks(hooks);
        let session = loader.open().unwrap();
        let player = Player::new(
            session.cassette(),
            MockTransport::new(|_: &RequestSnapshot| {
                Ok(ResponseSnapshot::new(200)
                    .with_header("Set-Cookie", "sid=abc")
                    .with_body(r#"{"token":"abc123"}"#))
            }),
        );

        // the caller still sees the live response
        let live = player.play(&get("https://example.com/login")).await.unwrap();
        assert_eq!(body(&live), br#"{"token":"abc123"}"#);
    }

    let loader = CassetteLoader::new(&path, MatcherSet::default());
    let cassette = loader.load().unwrap();
    let Lookup::Matched(dvdrw::Outcome::Response(replayed)) =
        cassette.lookup(&get("https://example.com/login"))
    else {
        panic!("expected a recorded response");
    };
    assert_eq!(body(&replayed), br#"{"token":"REDACTED"}"#);
    assert!(replayed.headers.is_empty());
}

#[tokio::test]
async fn test_reused_loader_serves_each_recording_once() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("reused.json");
    let matchers = MatcherSet::default();

    {
        let loader = CassetteLoader::new(&path, matchers.clone());
        let cassette = loader.load().unwrap();
        cassette
            .record(get("https://example.com/once"), ResponseSnapshot::new(200))
            .unwrap();
        loader.save().unwrap();
    }

    let loader = CassetteLoader::new(&path, matchers);

    {
        let session = loader.open_reusable().unwrap();
        let player = Player::new(session.cassette(), MockTransport::new(offline));
        player.play(&get("https://example.com/once")).await.unwrap();
    }

    let session = loader.open_reusable().unwrap();
    let player = Player::new(session.cassette(), MockTransport::new(offline));
    let err = player.play(&get("https://example.com/once")).await.unwrap_err();
    assert!(is_unmatched(&err));
}

#[test]
fn test_concurrent_replay_serves_each_entry_once() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("concurrent.json");

    {
        let loader = CassetteLoader::new(&path, MatcherSet::default());
        let cassette = loader.load().unwrap();
        for i in 0..100 {
            cassette
                .record(
                    get("https://example.com/poll"),
                    ResponseSnapshot::new(200).with_body(i.to_string()),
                )
                .unwrap();
        }
        loader.save().unwrap();
    }

    let loader = CassetteLoader::new(&path, MatcherSet::default());
    let cassette = loader.load().unwrap();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .build()
        .unwrap();

    let served = runtime.block_on(async {
        let player = Arc::new(Player::new(cassette, MockTransport::new(offline)));
        let tasks: Vec<_> = (0..200)
            .map(|_| {
                let player = Arc::clone(&player);
                tokio::spawn(async move { player.play(&get("https://example.com/poll")).await })
            })
            .collect();

        let mut served = Vec::new();
        let mut misses = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(response) => served.push(body(&response).to_vec()),
                Err(err) => {
                    assert!(is_unmatched(&err));
                    misses += 1;
                }
            }
        }
        assert_eq!(misses, 100);
        served
    });

    let mut unique = served.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(served.len(), 100);
    assert_eq!(unique.len(), 100);
}

#[test]
fn test_library_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::new(temp_dir.path());
    config.matching.match_on = vec![Matcher::Method, Matcher::Path];
    config.redaction.filter_headers = vec!["authorization".to_string()];
    config.validate().unwrap();

    let library = CassetteLibrary::from_config(&config);
    let loader = library.get_or_create("login_flow").unwrap();
    let cassette = loader.load().unwrap();
    cassette
        .record(
            get("https://example.com/login").with_header("Authorization", "Bearer t"),
            ResponseSnapshot::new(204),
        )
        .unwrap();

    assert_eq!(library.save_all().unwrap(), 1);
    let saved = std::fs::read_to_string(temp_dir.path().join("login_flow.json")).unwrap();
    assert!(!saved.contains("Bearer t"));

    assert!(matches!(
        library.get_or_create("../escape"),
        Err(DvdError::InvalidCassetteName(_))
    ));

    // replay through the same library entry
    let replay = library.get("login_flow").unwrap().load().unwrap();
    assert!(matches!(
        replay.lookup(&get("https://other.example/login")),
        Lookup::Matched(_)
    ));
}
