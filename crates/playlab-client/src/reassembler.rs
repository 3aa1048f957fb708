//! Reassembly of streamed deltas into a complete message.

use std::io::{self, BufReader};

use tracing::{debug, trace};

use crate::errors::PlaylabError;
use crate::presenter::Presenter;
use crate::sse::{FrameEvents, SseLines};
use crate::transport::{ApiRequest, Transport};

/// Text collected by one in-flight streaming call.
///
/// Each call owns its own instance; nothing here is shared between calls.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccumulatedResponse {
    buffer: String,
    chunk_count: usize,
}

impl AccumulatedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a delta in arrival order.
    pub fn push(&mut self, delta: &str) {
        self.buffer.push_str(delta);
        self.chunk_count += 1;
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// Number of deltas appended so far.
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn into_text(self) -> String {
        self.buffer
    }
}

/// Feeds a fallible line sequence through the frame parser until it ends.
///
/// `on_delta` runs once per delta, after the delta is appended and before the
/// next line is read. A read error aborts the drain with an API error that
/// carries the partial text and `status`; it never yields `Ok`.
pub fn drain_lines<I>(
    lines: I,
    status: Option<u16>,
    on_delta: &mut dyn FnMut(&str),
) -> Result<AccumulatedResponse, PlaylabError>
where
    I: Iterator<Item = io::Result<String>>,
{
    let mut acc = AccumulatedResponse::new();
    for event in FrameEvents::new(lines) {
        match event {
            Ok(event) => {
                acc.push(&event.delta);
                trace!(event = "stream.delta", seq = acc.chunk_count() - 1, len = event.delta.len() as u64);
                on_delta(&event.delta);
            }
            Err(e) => {
                debug!(
                    event = "stream.interrupted",
                    chunks = acc.chunk_count() as u64,
                    received_bytes = acc.text().len() as u64,
                    error = %e
                );
                return Err(PlaylabError::Api {
                    message: format!(
                        "stream interrupted after {} chunks: {e}",
                        acc.chunk_count()
                    ),
                    status,
                    body: None,
                    partial: Some(acc.into_text()),
                });
            }
        }
    }
    Ok(acc)
}

/// Drives one streaming request to completion.
///
/// Deltas go to the caller's sink when one is given. Without a sink they are
/// echoed to the presenter set with [`echo_to`](Self::echo_to), if any.
pub struct StreamReassembler<'a> {
    transport: &'a dyn Transport,
    echo: Option<&'a dyn Presenter>,
}

impl<'a> StreamReassembler<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self {
            transport,
            echo: None,
        }
    }

    /// Echoes deltas to `presenter` as they arrive when no sink is supplied.
    pub fn echo_to(mut self, presenter: &'a dyn Presenter) -> Self {
        self.echo = Some(presenter);
        self
    }

    /// Sends `request`, drains the SSE body and returns the joined text.
    pub fn run(
        &self,
        request: &ApiRequest,
        mut sink: Option<&mut dyn FnMut(&str)>,
    ) -> Result<AccumulatedResponse, PlaylabError> {
        let response = self.transport.execute(request)?;
        let status = response.status;
        debug!(event = "stream.opened", path = %request.path, status);

        let echo = self.echo;
        let mut on_delta = |delta: &str| match sink.as_deref_mut() {
            Some(sink) => sink(delta),
            None => {
                if let Some(presenter) = echo {
                    presenter.write_chunk(delta);
                }
            }
        };
        let lines = SseLines::new(BufReader::new(response.body));
        let acc = drain_lines(lines, Some(status), &mut on_delta)?;

        debug!(
            event = "stream.completed",
            path = %request.path,
            chunks = acc.chunk_count() as u64,
            received_bytes = acc.text().len() as u64
        );
        Ok(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presenter::PlainPresenter;
    use crate::presenter::tests::Captured;
    use crate::transport::{HttpResponse, RequestBody};
    use std::io::Read;
    use std::sync::Mutex;

    fn lines(raw: &[&str]) -> impl Iterator<Item = io::Result<String>> {
        raw.iter()
            .map(|l| Ok(l.to_string()))
            .collect::<Vec<_>>()
            .into_iter()
    }

    fn drain(raw: &[&str]) -> AccumulatedResponse {
        drain_lines(lines(raw), None, &mut |_| {}).expect("drain")
    }

    /// Yields `data` and then fails like a dropped connection.
    struct DroppingReader {
        data: io::Cursor<Vec<u8>>,
    }

    impl Read for DroppingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )),
                n => Ok(n),
            }
        }
    }

    enum Body {
        Complete(&'static str),
        DropsAfter(&'static str),
        Rejected(u16, &'static str),
    }

    struct FakeTransport {
        body: Body,
        requests: Mutex<Vec<ApiRequest>>,
    }

    impl FakeTransport {
        fn new(body: Body) -> Self {
            Self {
                body,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transport for FakeTransport {
        fn execute(&self, request: &ApiRequest) -> Result<HttpResponse, PlaylabError> {
            self.requests.lock().expect("lock").push(request.clone());
            let body: Box<dyn Read + Send> = match self.body {
                Body::Complete(text) => Box::new(io::Cursor::new(text.as_bytes().to_vec())),
                Body::DropsAfter(text) => Box::new(DroppingReader {
                    data: io::Cursor::new(text.as_bytes().to_vec()),
                }),
                Body::Rejected(status, body) => {
                    return Err(PlaylabError::from_status(status, body));
                }
            };
            Ok(HttpResponse { status: 200, body })
        }
    }

    fn request() -> ApiRequest {
        ApiRequest::post(
            "projects/p/conversations/c/messages",
            RequestBody::Json(serde_json::json!({"input": {"message": "hi"}})),
        )
    }

    #[test]
    fn joins_deltas_in_order() {
        let acc = drain(&[r#"data: {"delta": "Hi"}"#, r#"data: {"delta": " there"}"#]);
        assert_eq!(acc.text(), "Hi there");
        assert_eq!(acc.chunk_count(), 2);
    }

    #[test]
    fn empty_object_contributes_nothing() {
        assert_eq!(drain(&["data: {}", r#"data: {"delta":"ok"}"#]).text(), "ok");
    }

    #[test]
    fn malformed_json_is_skipped() {
        assert_eq!(drain(&["data: {not json", r#"data: {"delta":"x"}"#]).text(), "x");
    }

    #[test]
    fn noise_only_stream_yields_empty_text() {
        let acc = drain(&["", "event: done", ": ping", "id: 3"]);
        assert_eq!(acc.text(), "");
        assert_eq!(acc.chunk_count(), 0);
    }

    #[test]
    fn sink_sees_every_delta_exactly_once_in_order() {
        let mut seen = Vec::new();
        let acc = drain_lines(
            lines(&[
                r#"data: {"delta":"a"}"#,
                "data: oops",
                r#"data: {"delta":"b"}"#,
                "",
                r#"data: {"delta":"c"}"#,
            ]),
            None,
            &mut |d| seen.push(d.to_string()),
        )
        .expect("drain");
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(seen.concat(), acc.text());
    }

    #[test]
    fn read_error_fails_with_partial_text() {
        let raw = vec![
            Ok(r#"data: {"delta":"one "}"#.to_string()),
            Ok(r#"data: {"delta":"two"}"#.to_string()),
            Err(io::Error::new(io::ErrorKind::ConnectionAborted, "dropped")),
            Ok(r#"data: {"delta":"never"}"#.to_string()),
        ];
        let err = drain_lines(raw.into_iter(), Some(200), &mut |_| {}).expect_err("must fail");
        assert_eq!(err.partial_text(), Some("one two"));
        assert_eq!(err.status_code(), Some(200));
        assert!(err.to_string().contains("after 2 chunks"));
    }

    #[test]
    fn run_streams_through_transport_and_sink() {
        let transport = FakeTransport::new(Body::Complete(
            "data: {\"delta\":\"Hel\"}\n\ndata: {\"delta\":\"lo\"}\n\n",
        ));
        let mut chunks = Vec::new();
        let mut sink = |d: &str| chunks.push(d.to_string());
        let acc = StreamReassembler::new(&transport)
            .run(&request(), Some(&mut sink))
            .expect("run");
        assert_eq!(acc.into_text(), "Hello");
        assert_eq!(chunks, vec!["Hel", "lo"]);
        assert_eq!(transport.requests.lock().expect("lock").len(), 1);
    }

    #[test]
    fn run_echoes_to_presenter_only_without_sink() {
        let body = "data: {\"delta\":\"a\"}\ndata: {\"delta\":\"b\"}\n";
        let captured = Captured::default();
        let presenter = PlainPresenter::new(Box::new(captured.clone()));

        let transport = FakeTransport::new(Body::Complete(body));
        StreamReassembler::new(&transport)
            .echo_to(&presenter)
            .run(&request(), None)
            .expect("echo run");
        assert_eq!(captured.contents(), "ab");

        let mut sunk = String::new();
        let mut sink = |d: &str| sunk.push_str(d);
        StreamReassembler::new(&transport)
            .echo_to(&presenter)
            .run(&request(), Some(&mut sink))
            .expect("sink run");
        assert_eq!(sunk, "ab");
        assert_eq!(captured.contents(), "ab", "sink suppresses echo");
    }

    #[test]
    fn run_fails_when_connection_drops_mid_stream() {
        let transport = FakeTransport::new(Body::DropsAfter(
            "data: {\"delta\":\"Hi\"}\ndata: {\"delta\":\" th\"}\n",
        ));
        let mut chunks = Vec::new();
        let mut sink = |d: &str| chunks.push(d.to_string());
        let err = StreamReassembler::new(&transport)
            .run(&request(), Some(&mut sink))
            .expect_err("dropped connection");
        assert!(matches!(err, PlaylabError::Api { status: Some(200), .. }));
        assert_eq!(err.partial_text(), Some("Hi th"));
        assert_eq!(chunks, vec!["Hi", " th"]);
    }

    #[test]
    fn run_surfaces_rejections_before_streaming() {
        let transport = FakeTransport::new(Body::Rejected(401, r#"{"error":"bad key"}"#));
        let err = StreamReassembler::new(&transport)
            .run(&request(), None)
            .expect_err("rejected");
        assert_eq!(err, PlaylabError::Authentication("bad key".into()));
    }

    #[test]
    fn independent_calls_never_share_text() {
        let first = FakeTransport::new(Body::Complete("data: {\"delta\":\"first\"}\n"));
        let second = FakeTransport::new(Body::Complete("data: {\"delta\":\"second\"}\n"));
        std::thread::scope(|scope| {
            let a = scope.spawn(|| StreamReassembler::new(&first).run(&request(), None));
            let b = scope.spawn(|| StreamReassembler::new(&second).run(&request(), None));
            let a = a.join().expect("thread a").expect("run a");
            let b = b.join().expect("thread b").expect("run b");
            assert_eq!(a.text(), "first");
            assert_eq!(b.text(), "second");
        });
    }
}
