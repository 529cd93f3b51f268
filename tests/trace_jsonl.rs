use deck_harness::{CallTrace, JsonlTraceSink, TraceSink};
use tempfile::tempdir;

#[derive(Debug, serde::Deserialize)]
struct TraceRow {
    task: String,
    model: String,
    error: Option<String>,
}

fn make_trace(task: &str, error: Option<&str>) -> CallTrace {
    CallTrace {
        timestamp_ms: 0,
        run_id: Some("run-1".to_string()),
        task: task.to_string(),
        model: "openai/gpt-5-mini".to_string(),
        template_slug: task.to_string(),
        prompt_hash: "prompt_hash".to_string(),
        input_tokens: 12,
        output_tokens: 34,
        cost_nanodollars: 56,
        latency_ms: 7,
        error: error.map(str::to_string),
    }
}

#[test]
fn jsonl_trace_sink_writes_events_and_flushes_on_join() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trace.jsonl");

    let (sink, worker) = JsonlTraceSink::new(&path).unwrap();
    sink.record(make_trace("outline", None)).unwrap();
    sink.record(make_trace("slides", Some("invalid response: empty response")))
        .unwrap();

    drop(sink);
    worker.join().unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let rows: Vec<TraceRow> = raw
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].task, "outline");
    assert_eq!(rows[0].model, "openai/gpt-5-mini");
    assert!(rows[0].error.is_none());
    assert_eq!(rows[1].task, "slides");
    assert!(rows[1].error.as_deref().unwrap().contains("empty response"));
}

#[test]
fn cloned_sinks_share_one_writer() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trace.jsonl");

    let (sink, worker) = JsonlTraceSink::new(&path).unwrap();
    let other = sink.clone();
    std::thread::scope(|scope| {
        scope.spawn(|| {
            for _ in 0..10 {
                sink.record(make_trace("image_vision", None)).unwrap();
            }
        });
        scope.spawn(|| {
            for _ in 0..10 {
                other.record(make_trace("image_vision", None)).unwrap();
            }
        });
    });

    drop(sink);
    drop(other);
    worker.join().unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert_eq!(raw.lines().count(), 20);
}
