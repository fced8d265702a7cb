use bytes::Bytes;
use micro_lite::bind::{Args, Bindings, Params};
use micro_lite::{
    App, Body, Environ, HandlerError, Response, StartResponse, bound_fn, harness, lighten, lite, lite_with, wsgi_fn,
};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

/// A simplified handler greeting whoever `PATH_INFO` names.
async fn greet(_environ: Environ, args: Args) -> Result<Response, HandlerError> {
    let name = args.str("name").unwrap_or("world").trim_start_matches('/').to_string();
    Ok(Response::text("200 OK", format!("Hello {name}!")))
}

/// A legacy handler which still pushes part of its output through `write()`.
async fn legacy(_environ: Environ, start_response: StartResponse) -> Result<Body, HandlerError> {
    let write = start_response.call("200 OK", vec![("Content-Type".to_string(), "text/plain".to_string())])?;
    write.write("Hello ").await?;
    Ok(Body::from("world!"))
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::TRACE).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let bindings = Bindings::new().bind("name", "PATH_INFO").expect("fresh binding set");
    let params = Params::new().param_with_default("name", "world");
    let greet = match lite_with(App::lite(bound_fn(params, greet)), &bindings) {
        Ok(app) => app,
        Err(e) => {
            error!(cause = %e, "failed to bind greet");
            return;
        }
    };
    info!(signature = %greet.info(), "greet is ready");

    let environ = Environ::from_iter([("PATH_INFO", "/alice")]).with_testing_defaults();
    match harness::run(&greet, environ).await {
        Ok(captured) => println!("{captured}\n"),
        Err(e) => error!(cause = %e, "greet failed"),
    }

    let legacy = lighten(App::legacy(wsgi_fn(legacy)));
    match legacy.call_lite(Environ::new()).await {
        Ok(response) => {
            let body = response.body.into_bytes().await.unwrap_or_else(|_| Bytes::new());
            info!(status = %response.status, body = ?body, "legacy app called the simplified way");
        }
        Err(e) => error!(cause = %e, "legacy app failed"),
    }

    // wrapping again hands back the same app
    assert!(lite(legacy.clone()).ptr_eq(&legacy));
}
