use crate::e2e::helpers;

use helpers::{TestContext, PUBLIC_BASE_URL};
use hyper::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use test_context::test_context;

fn request(session_id: &str, text: &str) -> Value {
    json!({
        "sessionId": session_id,
        "text": text,
        "voice": { "languageCode": "en-US" },
        "concurrency": 2,
        "maxSegmentBytes": 8
    })
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_synthesize_and_merge_segments_in_order(ctx: &TestContext) {
    let response = ctx
        .client
        .post("/tts", &request("s1", "One. Two. Three."))
        .await
        .unwrap();

    response.assert_status(StatusCode::OK);
    let body = response.body.as_ref().unwrap();

    assert_eq!(body["sessionId"], "s1");
    assert_eq!(body["count"], 3);
    assert_eq!(body["failed"], json!([]));
    assert_eq!(body["summaryBytesApprox"], 30);
    assert_eq!(body["mergedUrl"], format!("{}/s1/merged.mp3", PUBLIC_BASE_URL));

    let indices: Vec<u64> = body["chunks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["index"].as_u64().unwrap())
        .collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert_eq!(body["chunks"][0]["url"], format!("{}/s1/chunk-0.mp3", PUBLIC_BASE_URL));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_accept_the_sync_alias(ctx: &TestContext) {
    let response = ctx
        .client
        .post("/tts/sync", &request("alias", "Hi."))
        .await
        .unwrap();

    response.assert_status(StatusCode::OK);
    assert_eq!(response.body.as_ref().unwrap()["count"], 1);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_report_partial_failures_separately(ctx: &TestContext) {
    let response = ctx
        .client
        .post("/tts", &request("partial", "One. FAIL. Three."))
        .await
        .unwrap();

    response.assert_status(StatusCode::OK);
    let body = response.body.as_ref().unwrap();

    assert_eq!(body["count"], 2);
    assert_eq!(body["failed"], json!([1]));
    assert_eq!(body["summaryBytesApprox"], 20);
    assert!(body["warnings"].as_array().unwrap()[0]
        .as_str()
        .unwrap()
        .contains("segment 1"));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_fail_when_every_segment_fails(ctx: &TestContext) {
    let response = ctx
        .client
        .post("/tts", &request("doomed", "FAIL."))
        .await
        .unwrap();

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.body.as_ref().unwrap();
    assert_eq!(body["failed"], json!([0]));
    response.assert_error_message("segments failed");
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_return_base64_chunks_when_requested(ctx: &TestContext) {
    let mut body = request("b64", "Hi.");
    body["returnBase64"] = json!(true);

    let response = ctx.client.post("/tts", &body).await.unwrap();

    response.assert_status(StatusCode::OK);
    let chunk = &response.body.as_ref().unwrap()["chunks"][0];
    // ten 'H' bytes
    assert_eq!(chunk["base64"], "SEhISEhISEhISA==");
    assert!(chunk.get("url").is_none());
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_read_uploaded_text_when_none_is_inline(ctx: &TestContext) {
    ctx.upload_text("stored", 0, "Alpha.").await;
    ctx.upload_text("stored", 1, "Beta.").await;

    let response = ctx
        .client
        .post(
            "/tts",
            &json!({ "sessionId": "stored", "voice": { "languageCode": "en-US" }, "maxSegmentBytes": 8 }),
        )
        .await
        .unwrap();

    response.assert_status(StatusCode::OK);
    let body = response.body.as_ref().unwrap();
    assert_eq!(body["count"], 2);
    assert_eq!(body["summaryBytesApprox"], 20);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_return_not_found_when_session_has_no_text(ctx: &TestContext) {
    let response = ctx
        .client
        .post("/tts", &json!({ "sessionId": "empty" }))
        .await
        .unwrap();

    response.assert_status(StatusCode::NOT_FOUND);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_reject_invalid_requests(ctx: &TestContext) {
    // missing sessionId
    let response = ctx.client.post("/tts", &json!({ "text": "Hello." })).await.unwrap();
    response.assert_status(StatusCode::BAD_REQUEST);

    // malformed json
    let response = ctx.client.post_raw("/tts", "{ not json").await.unwrap();
    response.assert_status(StatusCode::BAD_REQUEST);

    // unsupported encoding for the provider
    let response = ctx
        .client
        .post(
            "/tts",
            &json!({ "sessionId": "enc", "text": "Hello.", "audioConfig": { "audioEncoding": "OGG_OPUS" } }),
        )
        .await
        .unwrap();
    response.assert_status(StatusCode::BAD_REQUEST);
    response.assert_error_message("not supported");

    // out of range speaking rate
    let response = ctx
        .client
        .post(
            "/tts",
            &json!({ "sessionId": "rate", "text": "Hello.", "audioConfig": { "speakingRate": 9.0 } }),
        )
        .await
        .unwrap();
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_expose_status_and_audio_after_sync_synthesis(ctx: &TestContext) {
    ctx.client
        .post("/tts", &request("s2", "One. Two. Three."))
        .await
        .unwrap()
        .assert_status(StatusCode::OK);

    let status = ctx.client.get("/tts/s2/status").await.unwrap();
    status.assert_status(StatusCode::OK);
    let body = status.body.as_ref().unwrap();
    assert_eq!(body["status"], "done");
    assert_eq!(body["progress"], 100);
    assert_eq!(body["completed"], 3);
    assert_eq!(body["total"], 3);

    let audio = ctx.client.get("/tts/s2/audio").await.unwrap();
    audio.assert_status(StatusCode::OK);
    audio.assert_header("content-type", "audio/mpeg");
    assert_eq!(audio.body_bytes.len(), 30);
    assert_eq!(&audio.body_bytes[..10], &[b'O'; 10]);
    assert_eq!(&audio.body_bytes[10..20], &[b'T'; 10]);
    assert_eq!(&audio.body_bytes[20..], &[b'T'; 10]);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_return_not_found_for_unknown_sessions(ctx: &TestContext) {
    ctx.client
        .get("/tts/nobody/status")
        .await
        .unwrap()
        .assert_status(StatusCode::NOT_FOUND);

    ctx.client
        .get("/tts/nobody/audio")
        .await
        .unwrap()
        .assert_status(StatusCode::NOT_FOUND);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_run_chunked_jobs_in_the_background(ctx: &TestContext) {
    let response = ctx
        .client
        .post("/tts/chunked", &request("bg", "One. Two. Three. Four."))
        .await
        .unwrap();

    response.assert_status(StatusCode::ACCEPTED);
    let body = response.body.as_ref().unwrap();
    assert_eq!(body["sessionId"], "bg");
    assert_eq!(body["statusUrl"], "/tts/bg/status");
    assert_eq!(body["resultUrl"], "/tts/bg/audio");

    let job = ctx.wait_for_job("bg").await;
    assert_eq!(job["status"], "done");
    assert_eq!(job["progress"], 100);
    assert_eq!(job["resultUrl"], format!("{}/bg/merged.mp3", PUBLIC_BASE_URL));

    let audio = ctx.client.get("/tts/bg/audio").await.unwrap();
    audio.assert_status(StatusCode::OK);
    assert_eq!(audio.body_bytes.len(), 40);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_record_failed_background_jobs(ctx: &TestContext) {
    ctx.client
        .post("/tts/chunked", &request("bg-fail", "FAIL."))
        .await
        .unwrap()
        .assert_status(StatusCode::ACCEPTED);

    let job = ctx.wait_for_job("bg-fail").await;
    assert_eq!(job["status"], "error");
    assert_eq!(job["failed"], json!([0]));
    assert!(job["error"].as_str().is_some());
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_reject_a_second_job_while_one_is_running(ctx: &TestContext) {
    ctx.client
        .post("/tts/chunked", &request("busy", "SLOW."))
        .await
        .unwrap()
        .assert_status(StatusCode::ACCEPTED);

    let response = ctx
        .client
        .post("/tts", &request("busy", "Hello."))
        .await
        .unwrap();
    response.assert_status(StatusCode::CONFLICT);

    let job = ctx.wait_for_job("busy").await;
    assert_eq!(job["status"], "done");
}
