use std::time::Duration;

use bytes::Bytes;
use futures_util::{stream, StreamExt};
use inference_gateway::backend::BackendStreamFrame;
use inference_gateway::error::GatewayError;
use inference_gateway::stream::{normalize, normalize_with_framer, ChunkFramer};
use serde_json::{json, Value};

fn bytes(chunk: &'static str) -> Result<BackendStreamFrame, GatewayError> {
    Ok(BackendStreamFrame::Bytes(Bytes::from_static(chunk.as_bytes())))
}

async fn run(frames: Vec<Result<BackendStreamFrame, GatewayError>>) -> Vec<Bytes> {
    let framer = ChunkFramer::with_created("chatcmpl-test", "m", 1_700_000_000);
    normalize_with_framer(stream::iter(frames), framer)
        .map(|item| item.expect("frame"))
        .collect()
        .await
}

fn payload(frame: &Bytes) -> String {
    let text = std::str::from_utf8(frame).expect("utf8");
    text.strip_prefix("data: ")
        .and_then(|rest| rest.strip_suffix("\n\n"))
        .expect("sse frame")
        .to_string()
}

fn contents(frames: &[Bytes]) -> Vec<String> {
    frames
        .iter()
        .map(payload)
        .filter(|payload| payload != "[DONE]")
        .filter_map(|payload| {
            let chunk: Value = serde_json::from_str(&payload).expect("chunk json");
            chunk["choices"][0]["delta"]["content"]
                .as_str()
                .map(ToString::to_string)
        })
        .collect()
}

fn assert_terminated(frames: &[Bytes]) {
    let n = frames.len();
    assert!(n >= 2);
    let stop: Value = serde_json::from_str(&payload(&frames[n - 2])).expect("stop json");
    assert_eq!(stop["choices"][0]["delta"], json!({}));
    assert_eq!(stop["choices"][0]["finish_reason"], "stop");
    assert_eq!(frames[n - 1], Bytes::from_static(b"data: [DONE]\n\n"));
}

#[tokio::test]
async fn test_three_data_frames_produce_three_chunks() {
    let frames = run(vec![
        bytes("data: {\"response\":\"tok\"}\n\n"),
        bytes("data: {\"response\":\"tok\"}\n\n"),
        bytes("data: {\"response\":\"tok\"}\n\n"),
    ])
    .await;
    assert_eq!(frames.len(), 5);
    assert_eq!(contents(&frames), vec!["tok", "tok", "tok"]);
    for frame in &frames[..3] {
        let chunk: Value = serde_json::from_str(&payload(frame)).unwrap();
        assert_eq!(chunk["id"], "chatcmpl-test");
        assert_eq!(chunk["model"], "m");
        assert_eq!(chunk["created"], 1_700_000_000);
        assert!(chunk["choices"][0]["finish_reason"].is_null());
    }
    assert_terminated(&frames);
}

#[tokio::test]
async fn test_frame_split_across_reads_is_reassembled() {
    let frames = run(vec![
        bytes("data: {\"respon"),
        bytes("se\":\"x\"}\n\n"),
    ])
    .await;
    assert_eq!(frames.len(), 3);
    assert_eq!(contents(&frames), vec!["x"]);
    assert_terminated(&frames);
}

#[tokio::test]
async fn test_crlf_terminator_split_across_reads() {
    let frames = run(vec![
        bytes("data: {\"response\":\"a\"}\r\n"),
        bytes("\r\ndata: {\"response\":\"b\"}\r\n\r\n"),
    ])
    .await;
    assert_eq!(contents(&frames), vec!["a", "b"]);
}

#[tokio::test]
async fn test_multibyte_text_split_inside_character() {
    let source = vec![
        Ok(BackendStreamFrame::Bytes(Bytes::from(
            b"data: {\"response\":\"caf\xc3".to_vec(),
        ))),
        Ok(BackendStreamFrame::Bytes(Bytes::from(
            b"\xa9\"}\n\n".to_vec(),
        ))),
    ];
    let frames = run(source).await;
    assert_eq!(contents(&frames), vec!["café"]);
}

#[tokio::test]
async fn test_trailing_event_without_blank_line_is_flushed() {
    let frames = run(vec![bytes("data: {\"response\":\"a\"}\n\ndata: {\"response\":\"b\"}")]).await;
    assert_eq!(contents(&frames), vec!["a", "b"]);
    assert_terminated(&frames);
}

#[tokio::test]
async fn test_text_and_json_frames() {
    let frames = run(vec![
        Ok(BackendStreamFrame::Text("hi ".to_string())),
        Ok(BackendStreamFrame::Text(String::new())),
        Ok(BackendStreamFrame::Json(
            json!({"choices": [{"delta": {"content": "there"}}]}),
        )),
        Ok(BackendStreamFrame::Json(json!({"usage": {"prompt_tokens": 4}}))),
    ])
    .await;
    assert_eq!(contents(&frames), vec!["hi ", "there"]);
    assert_eq!(frames.len(), 4);
}

#[tokio::test]
async fn test_unparseable_data_degrades_to_verbatim_text() {
    let frames = run(vec![
        bytes("data: {broken json\n\n"),
        bytes("data: {\"response\":\"ok\"}\n\n"),
    ])
    .await;
    assert_eq!(contents(&frames), vec!["{broken json", "ok"]);
}

#[tokio::test]
async fn test_empty_stream_still_terminates() {
    let frames = run(Vec::new()).await;
    assert_eq!(frames.len(), 2);
    assert_terminated(&frames);
}

#[tokio::test]
async fn test_backend_done_marker_is_not_duplicated() {
    let frames = run(vec![
        bytes("data: {\"response\":\"a\"}\n\ndata: [DONE]\n\n"),
    ])
    .await;
    let done_count = frames
        .iter()
        .filter(|frame| frame.as_ref() == b"data: [DONE]\n\n")
        .count();
    assert_eq!(done_count, 1);
    assert_eq!(frames.len(), 3);
}

#[tokio::test]
async fn test_read_error_ends_stream_after_emitted_frames() {
    let framer = ChunkFramer::with_created("chatcmpl-test", "m", 1);
    let items: Vec<Result<Bytes, GatewayError>> = normalize_with_framer(
        stream::iter(vec![
            bytes("data: {\"response\":\"a\"}\n\n"),
            Err(GatewayError::Stream("connection reset".to_string())),
            bytes("data: {\"response\":\"never\"}\n\n"),
        ]),
        framer,
    )
    .collect()
    .await;
    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert!(matches!(items[1], Err(GatewayError::Stream(_))));
}

#[tokio::test]
async fn test_two_passes_are_byte_identical() {
    let input = [
        "data: {\"response\":\"Hel\"}\n\nda",
        "ta: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        ": keep-alive\n\n{\"result\":{\"response\":\"!\"}}\n\n",
    ];
    let first = run(input.iter().copied().map(bytes).collect()).await;
    let second = run(input.iter().copied().map(bytes).collect()).await;
    assert_eq!(first, second);
    assert_eq!(contents(&first), vec!["Hel", "lo", "!"]);
}

#[tokio::test]
async fn test_normalize_stamps_given_id_and_model() {
    let frames: Vec<Bytes> = normalize(
        stream::iter(vec![bytes("data: {\"response\":\"x\"}\n\n")]),
        "chatcmpl-1-abc".to_string(),
        "@cf/x".to_string(),
    )
    .map(|item| item.expect("frame"))
    .collect()
    .await;
    let chunk: Value = serde_json::from_str(&payload(&frames[0])).unwrap();
    assert_eq!(chunk["id"], "chatcmpl-1-abc");
    assert_eq!(chunk["model"], "@cf/x");
    assert_eq!(chunk["object"], "chat.completion.chunk");
}

#[tokio::test]
async fn test_ndjson_records_are_emitted_while_stream_is_open() {
    let framer = ChunkFramer::with_created("chatcmpl-test", "m", 1_700_000_000);
    let source = stream::iter(vec![bytes("{\"response\":\"o\"}\n{\"response\":\"k\"}\n{\"resp")])
        .chain(stream::pending());
    let mut out = Box::pin(normalize_with_framer(source, framer));

    let mut frames = Vec::new();
    for _ in 0..2 {
        let frame = tokio::time::timeout(Duration::from_millis(500), out.next())
            .await
            .expect("complete record should not wait for end of stream")
            .expect("item")
            .expect("frame");
        frames.push(frame);
    }
    assert_eq!(contents(&frames), vec!["o", "k"]);
}

#[tokio::test]
async fn test_ndjson_split_across_reads_matches_single_read() {
    let whole = run(vec![bytes("{\"response\":\"a\"}\n{\"response\":\"b\"}\n")]).await;
    let split = run(vec![
        bytes("{\"response\":\"a\"}\n{\"res"),
        bytes("ponse\":\"b\"}\n"),
    ])
    .await;
    assert_eq!(contents(&whole), vec!["a", "b"]);
    assert_eq!(whole, split);
    assert_terminated(&split);
}

#[tokio::test]
async fn test_bare_json_scalar_event_is_not_dropped() {
    let frames = run(vec![bytes("42\n\n")]).await;
    assert_eq!(contents(&frames), vec!["42"]);
}
