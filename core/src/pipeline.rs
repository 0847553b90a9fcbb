//! Interceptor chain wrapped around a terminal handler.
//!
//! # Design
//! A `Pipeline` is an ordered list of interceptors behind an `Arc`. `push`
//! never mutates: it builds a new list, so a pipeline captured by an
//! in-flight request cannot change underneath it.
//!
//! Resolution walks the list with `Next`, a borrowed view of "the rest of
//! the chain plus the terminal handler". Running a `Next` invokes the first
//! remaining interceptor with a `Next` over the tail, and the terminal
//! handler once the tail is empty. Nothing runs until an interceptor asks
//! for it, so an interceptor may call `next` once, several times, or never.

use std::fmt;
use std::sync::Arc;

use crate::http::Request;
use crate::outcome::Outcome;

/// The terminal step: performs the request and produces an outcome.
pub type Handler = Arc<dyn Fn(Request) -> Outcome + Send + Sync>;

/// Middleware wrapping the rest of the chain.
pub type Interceptor = Arc<dyn Fn(Request, Next<'_>) -> Outcome + Send + Sync>;

/// The remainder of a pipeline, callable as a handler.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    rest: &'a [Interceptor],
    terminal: &'a (dyn Fn(Request) -> Outcome + Send + Sync),
}

impl Next<'_> {
    pub fn run(&self, request: Request) -> Outcome {
        match self.rest.split_first() {
            Some((first, rest)) => first(
                request,
                Next {
                    rest,
                    terminal: self.terminal,
                },
            ),
            None => (self.terminal)(request),
        }
    }
}

/// Ordered interceptors, applied outermost first.
#[derive(Clone, Default)]
pub struct Pipeline {
    interceptors: Arc<Vec<Interceptor>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new pipeline with `interceptor` appended innermost.
    pub fn push<F>(&self, interceptor: F) -> Pipeline
    where
        F: Fn(Request, Next<'_>) -> Outcome + Send + Sync + 'static,
    {
        self.push_arc(Arc::new(interceptor))
    }

    pub fn push_arc(&self, interceptor: Interceptor) -> Pipeline {
        let mut interceptors = Vec::with_capacity(self.interceptors.len() + 1);
        interceptors.extend(self.interceptors.iter().cloned());
        interceptors.push(interceptor);
        Pipeline {
            interceptors: Arc::new(interceptors),
        }
    }

    /// A new pipeline running `self`'s interceptors, then `inner`'s.
    pub fn chain(&self, inner: &Pipeline) -> Pipeline {
        if inner.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return inner.clone();
        }
        let interceptors = self
            .interceptors
            .iter()
            .chain(inner.interceptors.iter())
            .cloned()
            .collect();
        Pipeline {
            interceptors: Arc::new(interceptors),
        }
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub fn resolve(&self, request: Request, terminal: &Handler) -> Outcome {
        Next {
            rest: &self.interceptors,
            terminal: terminal.as_ref(),
        }
        .run(request)
    }

    /// Collapse the pipeline and `terminal` into one handler.
    pub fn into_handler(self, terminal: Handler) -> Handler {
        if self.is_empty() {
            return terminal;
        }
        Arc::new(move |request| self.resolve(request, &terminal))
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::http::{HttpMethod, Response};

    fn request() -> Request {
        Request::new(HttpMethod::Get, "http://localhost/ok")
    }

    fn terminal(calls: Arc<AtomicUsize>) -> Handler {
        Arc::new(move |_req: Request| {
            calls.fetch_add(1, Ordering::SeqCst);
            Outcome::from_response(Response::new(200))
        })
    }

    fn recorder(
        log: Arc<Mutex<Vec<String>>>,
        name: &'static str,
    ) -> impl Fn(Request, Next<'_>) -> Outcome {
        move |req, next| {
            log.lock().unwrap().push(format!("{name}:in"));
            let outcome = next.run(req);
            log.lock().unwrap().push(format!("{name}:out"));
            outcome
        }
    }

    #[test]
    fn empty_pipeline_calls_terminal() {
        let calls = Arc::new(AtomicUsize::new(0));
        let outcome = Pipeline::new().resolve(request(), &terminal(calls.clone()));
        assert_eq!(outcome.status(), Some(200));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn interceptors_run_in_push_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new()
            .push(recorder(log.clone(), "a"))
            .push(recorder(log.clone(), "b"))
            .push(recorder(log.clone(), "c"));

        pipeline.resolve(request(), &terminal(calls.clone()));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:in", "b:in", "c:in", "c:out", "b:out", "a:out"]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn short_circuit_skips_rest_of_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new()
            .push(|_req, _next| Outcome::from_response(Response::new(304)))
            .push(recorder(log.clone(), "never"));

        let outcome = pipeline.resolve(request(), &terminal(calls.clone()));

        assert_eq!(outcome.status(), Some(304));
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn next_may_run_more_than_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new().push(|req: Request, next: Next<'_>| {
            let first = next.run(req.clone());
            if first.status() == Some(200) {
                return next.run(req);
            }
            first
        });

        pipeline.resolve(request(), &terminal(calls.clone()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn interceptor_can_rewrite_request() {
        let seen = Arc::new(Mutex::new(None));
        let seen_by_terminal = seen.clone();
        let terminal: Handler = Arc::new(move |req: Request| {
            *seen_by_terminal.lock().unwrap() = req.header("x-trace").map(str::to_string);
            Outcome::from_response(Response::new(200))
        });
        let pipeline = Pipeline::new().push(|mut req: Request, next: Next<'_>| {
            req.headers.push(("X-Trace".to_string(), "abc".to_string()));
            next.run(req)
        });

        pipeline.resolve(request(), &terminal);
        assert_eq!(seen.lock().unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn push_leaves_original_untouched() {
        let base = Pipeline::new().push(|req, next: Next<'_>| next.run(req));
        let extended = base.push(|req, next: Next<'_>| next.run(req));
        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);
    }

    #[test]
    fn chain_places_inner_after_outer() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let outer = Pipeline::new().push(recorder(log.clone(), "outer"));
        let inner = Pipeline::new().push(recorder(log.clone(), "inner"));
        let calls = Arc::new(AtomicUsize::new(0));

        outer.chain(&inner).resolve(request(), &terminal(calls));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["outer:in", "inner:in", "inner:out", "outer:out"]
        );
    }

    #[test]
    fn into_handler_resolves_through_chain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let hits = Arc::new(AtomicUsize::new(0));
        let counted = hits.clone();
        let handler = Pipeline::new()
            .push(move |req, next: Next<'_>| {
                counted.fetch_add(1, Ordering::SeqCst);
                next.run(req)
            })
            .into_handler(terminal(calls.clone()));

        handler(request());
        handler(request());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
