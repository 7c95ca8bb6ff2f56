use std::{error::Error, io};

use errorcontext::{BaseError, BoxError, chain, collect, collect_from};

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("connection refused by {host}")]
struct ConnectionRefused {
    host: &'static str,
}

#[derive(Debug, thiserror::Error)]
enum FetchError {
    #[error("request failed")]
    Request(#[source] BaseError<Vec<String>>),
}

fn tags(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn flatten(err: &(dyn Error + 'static)) -> Vec<String> {
    collect_from::<BaseError<Vec<String>>>(err)
        .into_iter()
        .flat_map(|e| e.context().iter().cloned())
        .collect()
}

#[test]
fn context_is_collected_outermost_first() {
    let err_a = BaseError::new(ConnectionRefused { host: "db" }, tags(&["x"]));
    let err_b = BaseError::new(err_a, tags(&["y"]));

    assert_eq!(flatten(&err_b), ["y", "x"]);
}

#[test]
fn wrapping_preserves_message_and_cause() {
    let mut err: BoxError = Box::new(ConnectionRefused { host: "db" });
    for depth in 0..10 {
        err = Box::new(BaseError::new(err, vec![format!("depth={depth}")]));
    }

    assert_eq!(err.to_string(), "connection refused by db");

    let err_ref: &(dyn Error + 'static) = &*err;
    let root = chain(Some(err_ref))
        .last()
        .expect("chain is never empty for Some input");
    let refused = root
        .downcast_ref::<ConnectionRefused>()
        .expect("innermost cause keeps its concrete type");
    assert_eq!(refused.host, "db");

    let collected = flatten(&*err);
    assert_eq!(collected.len(), 10);
    assert_eq!(collected.first().map(String::as_str), Some("depth=9"));
    assert_eq!(collected.last().map(String::as_str), Some("depth=0"));
}

#[test]
fn collection_crosses_foreign_error_types() {
    let inner = BaseError::new(io::Error::other("timed out"), tags(&["attempt=1"]));
    let outer = BaseError::new(FetchError::Request(inner), tags(&["url=/a"]));

    assert_eq!(outer.to_string(), "request failed");
    assert_eq!(flatten(&outer), ["url=/a", "attempt=1"]);

    let fetch_errors = collect_from::<FetchError>(&outer);
    assert_eq!(fetch_errors.len(), 1);
}

#[test]
fn collect_of_nothing_is_empty() {
    assert!(collect::<BaseError<Vec<String>>>(None).is_empty());

    let plain = io::Error::other("plain");
    assert!(collect_from::<BaseError<Vec<String>>>(&plain).is_empty());
}

#[test]
fn each_layer_appears_exactly_once() {
    let err = BaseError::new(io::Error::other("base"), tags(&["1"]));
    let err = BaseError::new(err, tags(&["2"]));
    let err = BaseError::new(err, tags(&["3"]));

    let found = collect_from::<BaseError<Vec<String>>>(&err);
    assert_eq!(found.len(), 3);
    for (i, a) in found.iter().enumerate() {
        for b in &found[i + 1..] {
            assert!(!std::ptr::eq(*a, *b));
        }
    }
}
