use bytes::Bytes;
use futures::StreamExt;
use micro_lite::bind::{Args, Bindings, Params, Rule};
use micro_lite::{
    App, Body, CleanupRegistry, Close, Environ, HandlerError, Response, StartResponse, bound_fn, harness, lighten, lite,
    lite_fn, lite_with, wsgi_fn,
};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

async fn hello(_environ: Environ) -> Result<Response, HandlerError> {
    Ok(Response::text("200 OK", "Hello world!"))
}

async fn legacy_hello(_environ: Environ, start_response: StartResponse) -> Result<Body, HandlerError> {
    start_response.call("200 OK", vec![("Content-Type".to_string(), "text/plain".to_string())])?;
    Ok(Body::from("Hello world!"))
}

#[tokio::test]
async fn lite_app_served_to_a_legacy_caller() {
    let app = lite(App::lite(lite_fn(hello)));

    let captured = harness::run(&app, Environ::new().with_testing_defaults()).await.unwrap();

    assert_eq!(captured.to_string(), "Status: 200 OK\nContent-Type: text/plain\nContent-Length: 12\n\nHello world!");
}

#[tokio::test]
async fn unmarked_apps_are_adapted_per_call() {
    let legacy = App::legacy(wsgi_fn(legacy_hello));
    let simple = App::lite(lite_fn(hello));

    let response = legacy.call_lite(Environ::new()).await.unwrap();
    assert_eq!(response.body.into_bytes().await.unwrap(), Bytes::from("Hello world!"));

    let captured = harness::run(&simple, Environ::new()).await.unwrap();
    assert_eq!(captured.text(), "Hello world!");
}

#[test]
fn adapters_are_total_and_idempotent() {
    let legacy = App::legacy(wsgi_fn(legacy_hello));
    let simple = App::lite(lite_fn(hello));

    for app in [lite(legacy.clone()), lighten(legacy), lite(simple.clone()), lighten(simple)] {
        assert!(app.is_lite());
        assert!(lite(app.clone()).ptr_eq(&app));
        assert!(lighten(app.clone()).ptr_eq(&app));
        assert!(lite(lighten(app.clone())).ptr_eq(&app));
    }
}

#[test]
fn adapted_signatures_show_optional_start_response() {
    let lightened = lighten(App::legacy(wsgi_fn(legacy_hello)));
    assert_eq!(lightened.info().signature(), "legacy_hello(environ, start_response=None)");
    assert_eq!(lite(App::lite(lite_fn(hello))).info().signature(), "hello(environ, start_response=None)");
}

#[derive(Clone)]
struct Session {
    id: u64,
}

async fn whoami(_environ: Environ, args: Args) -> Result<Response, HandlerError> {
    let session = args.parse::<u64>("session")?.unwrap_or_default();
    let user = args.str("user").unwrap_or("anonymous").to_string();
    Ok(Response::text("200 OK", format!("{user}#{session}")))
}

fn session_rule(created: Arc<AtomicU64>) -> Rule {
    Rule::compute(move |environ| {
        let session =
            environ.get_or_insert_extension_with(|| Session { id: created.fetch_add(1, Ordering::SeqCst) + 40 });
        Some(Value::from(session.id))
    })
}

#[tokio::test]
async fn bindings_resolve_alternatives_and_cache_in_environ() {
    let created = Arc::new(AtomicU64::new(0));
    let handler = bound_fn(Params::new().param_with_default("user", "guest").param("session"), whoami);
    let bindings = Bindings::new()
        .bind("user", ["REMOTE_USER", "HTTP_X_FORWARDED_USER"])
        .unwrap()
        .bind("session", session_rule(Arc::clone(&created)))
        .unwrap();
    let app = lite_with(App::lite(handler), &bindings).unwrap();

    let environ = Environ::from_iter([("HTTP_X_FORWARDED_USER", "carol")]);
    let first = app.call_lite(environ.clone()).await.unwrap();
    let second = app.call_lite(environ).await.unwrap();

    assert_eq!(first.body.into_bytes().await.unwrap(), Bytes::from("carol#40"));
    assert_eq!(second.body.into_bytes().await.unwrap(), Bytes::from("carol#40"));
    assert_eq!(created.load(Ordering::SeqCst), 1);

    let response = app.call_lite(Environ::new()).await.unwrap();
    assert_eq!(response.body.into_bytes().await.unwrap(), Bytes::from("guest#41"));
}

#[tokio::test]
async fn unknown_binding_is_rejected_before_any_request() {
    let handler = bound_fn(Params::new().param("user"), whoami);
    let bindings = Bindings::new().bind("session", "HTTP_COOKIE").unwrap();

    let err = lite_with(App::lite(handler), &bindings).unwrap_err();

    assert_eq!(err.to_string(), r#"whoami has no "session" argument"#);
}

struct Connection {
    name: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl Close for Connection {
    fn close(&self) {
        self.log.lock().unwrap().push(self.name);
    }
}

#[tokio::test]
async fn registered_resources_are_released_in_order_at_request_end() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let handler_log = Arc::clone(&log);
    let app = lite(App::lite(lite_fn(move |environ: Environ| {
        let log = Arc::clone(&handler_log);
        async move {
            for name in ["db", "cache"] {
                environ.register_close(Arc::new(Connection { name, log: Arc::clone(&log) }))?;
            }
            Ok::<Response, HandlerError>(Response::text("200 OK", "done"))
        }
    })));

    let response = app.call_lite(Environ::new()).await.unwrap();
    assert!(log.lock().unwrap().is_empty());

    assert_eq!(response.body.into_bytes().await.unwrap(), Bytes::from("done"));
    assert_eq!(*log.lock().unwrap(), vec!["db", "cache"]);
}

#[tokio::test]
async fn abandoned_body_is_released_once() {
    let released = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&released);
    let app = lighten(App::legacy(wsgi_fn(move |_environ: Environ, start_response: StartResponse| {
        let counter = Arc::clone(&counter);
        async move {
            start_response.call("200 OK", vec![])?;
            let body = Body::from_chunks(["one", "two", "three"]).on_close(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            Ok::<Body, HandlerError>(body)
        }
    })));

    let mut body = app.call_lite(Environ::new()).await.unwrap().body;
    assert_eq!(body.next().await.unwrap().unwrap(), Bytes::from("one"));
    drop(body);

    assert_eq!(released.load(Ordering::SeqCst), 1);
}

type Ready = futures::future::Ready<Result<Response, HandlerError>>;

fn counting_cleanup(released: &Arc<AtomicUsize>) -> impl Fn(Environ) -> Ready + Send + Sync + 'static {
    let counter = Arc::clone(released);
    move |environ: Environ| {
        let counter = Arc::clone(&counter);
        let added = environ.add_cleanup(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        futures::future::ready(added.map(|()| Response::text("200 OK", "ok")).map_err(HandlerError::from))
    }
}

#[tokio::test]
async fn enclosing_registry_is_left_to_the_caller() {
    let released = Arc::new(AtomicUsize::new(0));
    let app = lite(App::lite(lite_fn(counting_cleanup(&released))));
    let registry = CleanupRegistry::new();
    let environ = Environ::new().with_cleanup_registry(registry.clone());

    let response = app.call_lite(environ.clone()).await.unwrap();
    response.body.into_bytes().await.unwrap();
    assert_eq!(released.load(Ordering::SeqCst), 0);
    assert!(environ.cleanup_registry().is_some_and(|installed| installed.ptr_eq(&registry)));

    registry.drain();
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn body_release_is_registered_with_enclosing_registry() {
    let released = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&released);
    let app = lighten(App::legacy(wsgi_fn(move |_environ: Environ, start_response: StartResponse| {
        let counter = Arc::clone(&counter);
        async move {
            start_response.call("200 OK", vec![])?;
            let body = Body::from_chunks(["a", "b"]).on_close(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            Ok::<Body, HandlerError>(body)
        }
    })));
    let registry = CleanupRegistry::new();

    let response = app.call_lite(Environ::new().with_cleanup_registry(registry.clone())).await.unwrap();
    registry.drain();
    assert_eq!(released.load(Ordering::SeqCst), 1);

    drop(response);
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn two_requests_on_one_environ_release_twice() {
    let released = Arc::new(AtomicUsize::new(0));
    let app = lite(App::lite(lite_fn(counting_cleanup(&released))));
    let environ = Environ::new();

    for expected in 1..=2 {
        let response = app.call_lite(environ.clone()).await.unwrap();
        assert_eq!(response.body.into_bytes().await.unwrap(), Bytes::from("ok"));
        assert_eq!(released.load(Ordering::SeqCst), expected);
    }

    for expected in 3..=4 {
        harness::run(&app, environ.clone()).await.unwrap();
        assert_eq!(released.load(Ordering::SeqCst), expected);
    }
    assert!(environ.cleanup_registry().is_none());
}
